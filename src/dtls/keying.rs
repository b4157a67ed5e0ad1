use std::fmt;
use std::ops::Deref;

/// Length of an SRTP master key for `SRTP_AES128_CM_SHA1_80`.
pub(crate) const SRTP_KEY_LEN: usize = 16;

/// Length of an SRTP master salt.
pub(crate) const SRTP_SALT_LEN: usize = 14;

/// Bytes exported from the DTLS session, one key and salt per direction.
pub(crate) const KEYING_MATERIAL_LEN: usize = (SRTP_KEY_LEN + SRTP_SALT_LEN) * 2;

/// Keying material used as master keys for SRTP.
///
/// The layout (RFC 5764 4.2) is
/// `client_key(16) | server_key(16) | client_salt(14) | server_salt(14)`.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyingMaterial([u8; KEYING_MATERIAL_LEN]);

impl KeyingMaterial {
    /// Wrap 60 bytes of exported keying material.
    pub fn new(m: [u8; KEYING_MATERIAL_LEN]) -> Self {
        KeyingMaterial(m)
    }

    /// Split into the client and server master keys.
    pub fn split(&self) -> SrtpKeys {
        const ML: usize = SRTP_KEY_LEN;

        let m = &self.0;
        let mut client = SrtpMasterKey::default();
        let mut server = SrtpMasterKey::default();

        client.key.copy_from_slice(&m[0..ML]);
        server.key.copy_from_slice(&m[ML..(ML * 2)]);
        client
            .salt
            .copy_from_slice(&m[(ML * 2)..(ML * 2 + SRTP_SALT_LEN)]);
        server
            .salt
            .copy_from_slice(&m[(ML * 2 + SRTP_SALT_LEN)..KEYING_MATERIAL_LEN]);

        SrtpKeys { client, server }
    }
}

impl Deref for KeyingMaterial {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for KeyingMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyingMaterial")
    }
}

/// SRTP master key and salt for one direction.
#[derive(Default, Clone, PartialEq, Eq)]
pub struct SrtpMasterKey {
    /// Master key.
    pub key: [u8; SRTP_KEY_LEN],
    /// Master salt.
    pub salt: [u8; SRTP_SALT_LEN],
}

impl SrtpMasterKey {
    /// The key followed by the salt.
    ///
    /// This is the blob [`SrtpSession::new`][crate::SrtpSession::new] expects.
    pub fn to_bytes(&self) -> [u8; SRTP_KEY_LEN + SRTP_SALT_LEN] {
        let mut out = [0; SRTP_KEY_LEN + SRTP_SALT_LEN];
        out[..SRTP_KEY_LEN].copy_from_slice(&self.key);
        out[SRTP_KEY_LEN..].copy_from_slice(&self.salt);
        out
    }
}

impl fmt::Debug for SrtpMasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SrtpMasterKey")
    }
}

/// The SRTP master keys of both DTLS roles.
///
/// Media sent by the DTLS client is protected with `client`, media sent by the
/// DTLS server with `server`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrtpKeys {
    /// Keys for media sent by the DTLS client.
    pub client: SrtpMasterKey,
    /// Keys for media sent by the DTLS server.
    pub server: SrtpMasterKey,
}
