use once_cell::sync::OnceCell;

use crate::dtls::{SrtpKeys, SrtpMasterKey, SRTP_KEY_LEN, SRTP_SALT_LEN};

mod context;
use context::{derive, Direction, SrtpContext};

mod replay;
mod sha1;

mod status;
pub use status::{CryptoFailure, SrtpStatus};

/// Extra room reserved after every packet handed to a protect operation.
///
/// The authentication tag (and for SRTCP the index) is added in place.
pub const SRTP_HEADROOM: usize = 32;

const MASTER_KEY_LEN: usize = SRTP_KEY_LEN + SRTP_SALT_LEN;

static INIT: OnceCell<bool> = OnceCell::new();

/// Process wide SRTP initialization.
///
/// Runs the self test of the key derivation exactly once, no matter how many
/// threads race to call it. [`SrtpSession`] constructors call this, there is
/// no need to call it up front.
pub fn srtp_init() -> Result<(), CryptoFailure> {
    let ok = INIT.get_or_init(|| {
        let ok = self_test();
        if ok {
            debug!("SRTP init");
        } else {
            warn!("SRTP self test failed");
        }
        ok
    });

    if *ok {
        Ok(())
    } else {
        Err(SrtpStatus::InitFail.into())
    }
}

/// RFC 3711 B.3, the cipher key for label 0.
fn self_test() -> bool {
    let master = SrtpMasterKey {
        key: [
            0xE1, 0xF9, 0x7A, 0x0D, 0x3E, 0x01, 0x8B, 0xE0, //
            0xD6, 0x4F, 0xA3, 0x2C, 0x06, 0xDE, 0x41, 0x39,
        ],
        salt: [
            0x0E, 0xC6, 0x75, 0xAD, 0x49, 0x8A, 0xFE, //
            0xEB, 0xB6, 0x96, 0x0B, 0x3A, 0xAB, 0xE6,
        ],
    };

    const EXPECTED: [u8; 16] = [
        0xC6, 0x1E, 0x7A, 0x93, 0x74, 0x4F, 0x39, 0xEE, //
        0x10, 0x73, 0x4A, 0xFE, 0x3F, 0xF7, 0xA0, 0x87,
    ];

    let mut out = [0; 16];
    derive(&master, 0, &mut out).is_ok() && out == EXPECTED
}

/// SRTP for one peer connection.
///
/// Holds one context for what we send and one for what we receive, keyed
/// independently. Protection is `AES_CM_128_HMAC_SHA1_80` for both RTP and
/// RTCP, for any SSRC.
#[derive(Debug)]
pub struct SrtpSession {
    send: SrtpContext,
    recv: SrtpContext,
}

impl SrtpSession {
    /// Create a session from two master keys.
    ///
    /// Each key is 30 bytes, the 16 byte master key followed by the 14 byte
    /// master salt. See [`SrtpMasterKey::to_bytes`].
    pub fn new(send_key: &[u8], recv_key: &[u8]) -> Result<Self, CryptoFailure> {
        let send = master_key(send_key)?;
        let recv = master_key(recv_key)?;
        Self::from_master_keys(&send, &recv)
    }

    /// Create a session from the keys exported by a DTLS handshake.
    ///
    /// `active` is whether we were the DTLS client. The client sends with the
    /// client key, the server with the server key.
    pub fn from_keys(keys: &SrtpKeys, active: bool) -> Result<Self, CryptoFailure> {
        if active {
            Self::from_master_keys(&keys.client, &keys.server)
        } else {
            Self::from_master_keys(&keys.server, &keys.client)
        }
    }

    fn from_master_keys(send: &SrtpMasterKey, recv: &SrtpMasterKey) -> Result<Self, CryptoFailure> {
        srtp_init()?;

        Ok(SrtpSession {
            send: SrtpContext::new(send, Direction::Outbound)?,
            recv: SrtpContext::new(recv, Direction::Inbound)?,
        })
    }

    /// Encrypt and authenticate an RTP packet.
    pub fn protect_rtp(&mut self, packet: &[u8]) -> Result<Vec<u8>, CryptoFailure> {
        let send = &mut self.send;
        in_place(packet, |buf, len| send.protect_rtp(buf, len))
    }

    /// Verify and decrypt an SRTP packet.
    pub fn unprotect_rtp(&mut self, packet: &[u8]) -> Result<Vec<u8>, CryptoFailure> {
        let recv = &mut self.recv;
        in_place(packet, |buf, len| recv.unprotect_rtp(buf, len))
    }

    /// Encrypt and authenticate a (compound) RTCP packet.
    pub fn protect_rtcp(&mut self, packet: &[u8]) -> Result<Vec<u8>, CryptoFailure> {
        let send = &mut self.send;
        in_place(packet, |buf, len| send.protect_rtcp(buf, len))
    }

    /// Verify and decrypt an SRTCP packet.
    pub fn unprotect_rtcp(&mut self, packet: &[u8]) -> Result<Vec<u8>, CryptoFailure> {
        let recv = &mut self.recv;
        in_place(packet, |buf, len| recv.unprotect_rtcp(buf, len))
    }
}

fn master_key(blob: &[u8]) -> Result<SrtpMasterKey, CryptoFailure> {
    if blob.len() != MASTER_KEY_LEN {
        return Err(SrtpStatus::BadParam.into());
    }

    let mut master = SrtpMasterKey::default();
    master.key.copy_from_slice(&blob[..SRTP_KEY_LEN]);
    master.salt.copy_from_slice(&blob[SRTP_KEY_LEN..]);

    Ok(master)
}

/// Copy `packet` into a buffer with headroom, run `f` over it and return
/// only the part `f` says is valid.
fn in_place<F>(packet: &[u8], f: F) -> Result<Vec<u8>, CryptoFailure>
where
    F: FnOnce(&mut [u8], usize) -> Result<usize, CryptoFailure>,
{
    let mut buf = vec![0; packet.len() + SRTP_HEADROOM];
    buf[..packet.len()].copy_from_slice(packet);

    let len = f(&mut buf, packet.len())?;
    buf.truncate(len);

    Ok(buf)
}
