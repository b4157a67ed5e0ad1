//! The sha1 hmac checks of SRTP packets is one of the most expensive operations.
//! The sha-1 crate with feature "asm" seems to be the most performant way of doing it,
//! however the "asm" feature doesn't work on windows, where the plain version is used.

use hmac::{Hmac, Mac};

use super::status::SrtpStatus;

type HmacSha1 = Hmac<::sha1::Sha1>;

/// HMAC-SHA1 keyed with a session authentication key.
#[derive(Clone)]
pub struct Sha1(HmacSha1);

impl Sha1 {
    pub fn new(key: &[u8]) -> Result<Self, SrtpStatus> {
        let mac = HmacSha1::new_from_slice(key).map_err(|_| SrtpStatus::BadParam)?;
        Ok(Sha1(mac))
    }

    /// HMAC over the concatenation of `payloads`.
    pub fn hmac(&self, payloads: &[&[u8]]) -> [u8; 20] {
        let mut mac = self.0.clone();
        for payload in payloads {
            mac.update(payload);
        }

        mac.finalize().into_bytes().into()
    }
}
