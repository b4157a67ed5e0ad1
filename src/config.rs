use crate::dtls::{Dtls, DtlsCert, DtlsError};
use crate::io_buf::DATAGRAM_MTU;

/// Cipher list handed to OpenSSL when nothing else is configured.
pub(crate) const DEFAULT_CIPHER_LIST: &str = "HIGH:!DSS:!aNULL@STRENGTH";

/// The only SRTP protection profile [`SrtpSession`][crate::SrtpSession] speaks.
pub(crate) const DEFAULT_SRTP_PROFILES: &str = "SRTP_AES128_CM_SHA1_80";

/// Largest plaintext a single DTLS record can carry (2^14).
pub(crate) const MAX_RECORD_SIZE: usize = 16_384;

/// Each datagram ought to be ~MTU. If the DTLS layer is not consuming
/// incoming data at that rate, something is off.
pub(crate) const MAX_INCOMING: usize = 30_000;

/// Configuration for a [`Dtls`] instance.
///
/// ```
/// # use dtls_srtp::DtlsConfig;
/// let dtls = DtlsConfig::new()
///     .set_active(false)
///     .set_mtu(1200)
///     .build()
///     .unwrap();
///
/// assert!(!dtls.is_active());
/// ```
///
/// Configs implement [`Clone`] to help create multiple `Dtls` instances from
/// the same credentials.
#[derive(Debug, Clone)]
pub struct DtlsConfig {
    dtls_cert: Option<DtlsCert>,
    active: bool,
    cipher_list: String,
    srtp_profiles: String,
    mtu: usize,
    max_record_size: usize,
    max_incoming: usize,
}

impl DtlsConfig {
    /// Creates a new default config.
    pub fn new() -> Self {
        DtlsConfig::default()
    }

    /// The configured DTLS certificate, if set.
    ///
    /// If not specified, a self signed certificate is created when building
    /// the [`Dtls`] instance.
    pub fn dtls_cert(&self) -> Option<&DtlsCert> {
        self.dtls_cert.as_ref()
    }

    /// Set the certificate and private key used for the handshake.
    pub fn set_dtls_cert(mut self, dtls_cert: DtlsCert) -> Self {
        self.dtls_cert = Some(dtls_cert);
        self
    }

    /// Whether this side initiates the handshake.
    pub fn active(&self) -> bool {
        self.active
    }

    /// Set whether this side is the DTLS client (sends the ClientHello) or
    /// the DTLS server (waits for one).
    ///
    /// Defaults to `true`.
    pub fn set_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// The OpenSSL cipher list.
    pub fn cipher_list(&self) -> &str {
        &self.cipher_list
    }

    /// Set the OpenSSL cipher list string.
    ///
    /// Defaults to `HIGH:!DSS:!aNULL@STRENGTH`.
    pub fn set_cipher_list(mut self, cipher_list: &str) -> Self {
        self.cipher_list = cipher_list.into();
        self
    }

    /// The SRTP protection profiles offered in the `use_srtp` extension.
    pub fn srtp_profiles(&self) -> &str {
        &self.srtp_profiles
    }

    /// Set the colon separated SRTP protection profiles offered in the
    /// `use_srtp` extension.
    ///
    /// Defaults to `SRTP_AES128_CM_SHA1_80`, which is what [`SrtpSession`][crate::SrtpSession]
    /// expects the keying material to be for.
    pub fn set_srtp_profiles(mut self, srtp_profiles: &str) -> Self {
        self.srtp_profiles = srtp_profiles.into();
        self
    }

    /// The MTU reported to the DTLS layer.
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Set the MTU reported to the DTLS layer.
    ///
    /// The path MTU is never discovered dynamically. Defaults to 1500.
    pub fn set_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    /// The largest payload accepted by [`Dtls::encrypt`].
    pub fn max_record_size(&self) -> usize {
        self.max_record_size
    }

    /// Set the largest payload accepted by [`Dtls::encrypt`].
    ///
    /// Payloads are never split over several records. Defaults to 16384.
    pub fn set_max_record_size(mut self, max_record_size: usize) -> Self {
        self.max_record_size = max_record_size.min(MAX_RECORD_SIZE);
        self
    }

    /// Unread inbound bytes tolerated before the inbound queue is reset.
    pub fn max_incoming(&self) -> usize {
        self.max_incoming
    }

    /// Set how many unread inbound bytes are tolerated before the inbound
    /// queue is reset.
    ///
    /// Defaults to 30000.
    pub fn set_max_incoming(mut self, max_incoming: usize) -> Self {
        self.max_incoming = max_incoming;
        self
    }

    /// Create a [`Dtls`] instance using this config.
    pub fn build(self) -> Result<Dtls, DtlsError> {
        Dtls::new_with_config(self)
    }
}

impl Default for DtlsConfig {
    fn default() -> Self {
        Self {
            dtls_cert: None,
            active: true,
            cipher_list: DEFAULT_CIPHER_LIST.into(),
            srtp_profiles: DEFAULT_SRTP_PROFILES.into(),
            mtu: DATAGRAM_MTU,
            max_record_size: MAX_RECORD_SIZE,
            max_incoming: MAX_INCOMING,
        }
    }
}
