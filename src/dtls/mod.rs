use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};

use openssl::error::ErrorStack;
use openssl::ssl::{ErrorCode, SslContext};
use thiserror::Error;

use crate::config::{DtlsConfig, MAX_RECORD_SIZE};
use crate::io_buf::IoBuffer;

mod cert;
pub use cert::DtlsCert;

mod finger;
pub use finger::Fingerprint;

mod keying;
pub use keying::{KeyingMaterial, SrtpKeys, SrtpMasterKey};
pub(crate) use keying::{SRTP_KEY_LEN, SRTP_SALT_LEN};

mod ossl;
use ossl::{dtls_create_ctx, dtls_ssl_create};

mod stream;
use stream::TlsStream;

const DTLS_KEY_LABEL: &str = "EXTRACTOR-dtls_srtp";

/// How often the handshake wants to be re-driven while waiting on the peer.
///
/// OpenSSL's own retransmit timer starts at 1s, this is comfortably below.
const HANDSHAKE_TICK: Duration = Duration::from_millis(500);

/// Errors that can arise in DTLS.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DtlsError {
    /// The operation can't complete until more data has been exchanged.
    #[error("DTLS would block")]
    WouldBlock,

    /// The handshake failed. The instance is closed.
    #[error("DTLS handshake failed: {0}")]
    HandshakeFailed(String),

    /// The instance is closed, by us or by the peer.
    #[error("DTLS transport closed")]
    TransportClosed,

    /// A payload to [`Dtls::encrypt`] was not accepted in full.
    #[error("DTLS write rejected: {len} bytes (max {max})")]
    WriteRejected {
        /// Length of the rejected payload.
        len: usize,
        /// Largest payload that is accepted.
        max: usize,
    },

    /// Keying material can only be exported from an established session.
    #[error("DTLS keying material unavailable")]
    KeyingMaterialUnavailable,

    /// The private key does not belong to the certificate.
    #[error("Private key does not match certificate")]
    KeyMismatch,

    /// Some error from OpenSSL layer (used for DTLS).
    #[error("{0}")]
    OpenSsl(#[from] ErrorStack),

    /// Other IO errors.
    #[error("{0}")]
    Io(#[from] io::Error),
}

impl DtlsError {
    /// Whether this is the non-fatal "try again later" condition.
    pub fn is_would_block(&self) -> bool {
        match self {
            DtlsError::WouldBlock => true,
            DtlsError::Io(e) => e.kind() == io::ErrorKind::WouldBlock,
            _ => false,
        }
    }
}

/// Connection state of a [`Dtls`] instance.
///
/// Moves `Handshaking -> Connected -> Closed`, or straight from `Handshaking`
/// to `Closed` if the handshake fails. Nothing leaves `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtlsState {
    /// Handshake in progress.
    Handshaking,
    /// Handshake done, application data flows.
    Connected,
    /// Terminal.
    Closed,
}

/// Events arising from a [`Dtls`] instance.
pub enum DtlsEvent {
    /// When the DTLS has finished handshaking.
    Connected,

    /// Decrypted data from incoming DTLS traffic.
    Data(Vec<u8>),

    /// A datagram to send to the peer.
    ///
    /// Holds one or more whole DTLS records, never more than the MTU unless a
    /// single record is larger. These must be sent in the order they are polled.
    Transmit(Vec<u8>),
}

/// Encapsulation of DTLS.
pub struct Dtls {
    /// Context belongs together with Fingerprint.
    ///
    /// This just needs to be kept alive since it pins the entire openssl context
    /// from which `Ssl` is created.
    _context: SslContext,

    /// The local fingerprint communicated via signaling to remote.
    fingerprint: Fingerprint,

    /// The actual openssl TLS stream.
    tls: TlsStream<IoBuffer>,

    state: DtlsState,

    max_record_size: usize,

    /// Reused buffer for decrypted records.
    read_buf: Vec<u8>,

    /// Outgoing events, ready to be polled.
    events: VecDeque<DtlsEvent>,
}

impl Dtls {
    /// Creates a new active (client) instance from PEM files.
    ///
    /// For other settings, use [`DtlsConfig`].
    pub fn new(cert_file: impl AsRef<Path>, key_file: impl AsRef<Path>) -> Result<Self, DtlsError> {
        let cert = DtlsCert::from_pem_files(cert_file, key_file)?;
        DtlsConfig::new().set_dtls_cert(cert).build()
    }

    pub(crate) fn new_with_config(config: DtlsConfig) -> Result<Self, DtlsError> {
        let cert = match config.dtls_cert() {
            Some(v) => v.clone(),
            None => DtlsCert::new_self_signed()?,
        };

        let context = dtls_create_ctx(&cert, &config)?;
        let ssl = dtls_ssl_create(&context, &config)?;

        let io = IoBuffer::new(config.mtu(), config.max_incoming());

        Ok(Dtls {
            _context: context,
            fingerprint: cert.fingerprint().clone(),
            tls: TlsStream::new(ssl, io, config.active()),
            state: DtlsState::Handshaking,
            max_record_size: config.max_record_size(),
            read_buf: vec![0; MAX_RECORD_SIZE],
            events: VecDeque::new(),
        })
    }

    /// Current connection state.
    pub fn state(&self) -> DtlsState {
        self.state
    }

    /// Whether the handshake is complete and the instance not closed.
    pub fn is_connected(&self) -> bool {
        self.state == DtlsState::Connected
    }

    /// Whether this side initiates the handshake (DTLS client).
    pub fn is_active(&self) -> bool {
        self.tls.is_active()
    }

    /// The local fingerprint.
    ///
    /// To be communicated to the remote peer. `to_string()` gives the
    /// `sha-256 AB:CD:..` form.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// The fingerprint of the remote peer's certificate.
    ///
    /// Available once connected. This should be checked against the
    /// fingerprint communicated via signaling.
    pub fn remote_fingerprint(&self) -> Option<Fingerprint> {
        let x509 = self.tls.established()?.ssl().peer_certificate()?;
        cert::fingerprint_of(&x509).ok()
    }

    /// Poll for the next event.
    pub fn poll_event(&mut self) -> Option<DtlsEvent> {
        let x = self.events.pop_front();
        if x.is_some() {
            trace!("Poll event: {:?}", x);
        }
        x
    }

    /// When [`Dtls::tick`] should be called next.
    ///
    /// Only while handshaking, retransmission of lost flights happens when
    /// the DTLS layer is driven after its timer expired.
    pub fn poll_timeout(&self, now: Instant) -> Option<Instant> {
        if self.state == DtlsState::Handshaking {
            Some(now + HANDSHAKE_TICK)
        } else {
            None
        }
    }

    /// Handle bytes received from the peer.
    ///
    /// The bytes are queued and the instance progressed as by [`Dtls::tick`].
    /// Does nothing once closed.
    pub fn feed(&mut self, data: &[u8]) -> Result<(), DtlsError> {
        if self.state == DtlsState::Closed {
            trace!("Ignore {} bytes, closed", data.len());
            return Ok(());
        }

        if let Some(io) = self.tls.inner_mut() {
            io.push(data);
        }

        self.tick()
    }

    /// Progress the handshake, or decrypt whatever records are queued.
    ///
    /// Safe to call at any time. Not having enough data is not an error.
    pub fn tick(&mut self) -> Result<(), DtlsError> {
        match self.state {
            DtlsState::Closed => return Ok(()),
            DtlsState::Handshaking => {
                let result = self.tls.complete_handshake_until_block();

                // Flights, or the alert of a failure.
                self.drain_outgoing();

                match result {
                    Ok(true) => {
                        debug!("DTLS connected");
                        self.state = DtlsState::Connected;
                        self.events.push_back(DtlsEvent::Connected);
                    }
                    Ok(false) => {
                        trace!("DTLS handshake would block");
                        return Ok(());
                    }
                    Err(e) => {
                        debug!("DTLS closed during handshake: {}", e);
                        self.state = DtlsState::Closed;
                        if let Some(io) = self.tls.inner_mut() {
                            io.reset();
                        }
                        return Err(e);
                    }
                }
            }
            DtlsState::Connected => {}
        }

        self.read_records();

        Ok(())
    }

    /// Decrypt records until the queue holds no complete one.
    ///
    /// Every way a read can fail ends the burst, none of them close the
    /// instance. A peer close_notify included, only [`Dtls::close`] does that.
    fn read_records(&mut self) {
        loop {
            let Some(stream) = self.tls.established_mut() else {
                return;
            };

            let result = stream.ssl_read(&mut self.read_buf);

            // Reading can produce output, like an alert or a close_notify reply.
            self.drain_outgoing();

            match result {
                Ok(n) => {
                    if n > 0 {
                        trace!("Decrypted record: {}", n);
                        self.events
                            .push_back(DtlsEvent::Data(self.read_buf[..n].to_vec()));
                    }
                }
                Err(e) => {
                    let code = e.code();
                    if code == ErrorCode::WANT_READ {
                        trace!("No more records");
                    } else if code == ErrorCode::ZERO_RETURN {
                        debug!("Peer sent close_notify");
                    } else if code == ErrorCode::SSL {
                        debug!("SSL error when reading: {:?}", e);
                    } else {
                        debug!("Unexpected error when reading: {:?}", e);
                    }
                    break;
                }
            }
        }
    }

    /// Send application data as a single DTLS record.
    ///
    /// The payload is never split, anything larger than the configured max
    /// record size fails with [`DtlsError::WriteRejected`].
    pub fn encrypt(&mut self, data: &[u8]) -> Result<(), DtlsError> {
        match self.state {
            DtlsState::Handshaking => return Err(DtlsError::WouldBlock),
            DtlsState::Closed => return Err(DtlsError::TransportClosed),
            DtlsState::Connected => {}
        }

        let rejected = DtlsError::WriteRejected {
            len: data.len(),
            max: self.max_record_size,
        };

        if data.len() > self.max_record_size {
            return Err(rejected);
        }

        let Some(stream) = self.tls.established_mut() else {
            return Err(DtlsError::TransportClosed);
        };

        let result = stream.ssl_write(data);

        self.drain_outgoing();

        match result {
            Ok(n) if n == data.len() => Ok(()),
            Ok(_) => Err(rejected),
            Err(e) if e.code() == ErrorCode::WANT_READ || e.code() == ErrorCode::WANT_WRITE => {
                Err(DtlsError::WouldBlock)
            }
            Err(e) => match e.ssl_error() {
                Some(stack) => Err(DtlsError::OpenSsl(stack.clone())),
                None => Err(DtlsError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    e.to_string(),
                ))),
            },
        }
    }

    /// Close the instance.
    ///
    /// A close_notify is sent to the peer if the handshake completed. There
    /// is no waiting for the reply.
    pub fn close(&mut self) {
        if self.state == DtlsState::Closed {
            return;
        }

        if let Some(stream) = self.tls.established_mut() {
            if let Err(e) = stream.shutdown() {
                debug!("DTLS shutdown: {:?}", e);
            }
        }

        self.drain_outgoing();

        if let Some(io) = self.tls.inner_mut() {
            io.reset();
        }

        debug!("DTLS closed");
        self.state = DtlsState::Closed;
    }

    /// Export the keying material for SRTP.
    ///
    /// `None` until the handshake completed.
    pub fn export_keying_material(&self) -> Option<KeyingMaterial> {
        let stream = self.tls.established()?;

        let mut buf = [0_u8; keying::KEYING_MATERIAL_LEN];
        if let Err(e) = stream
            .ssl()
            .export_keying_material(&mut buf, DTLS_KEY_LABEL, None)
        {
            debug!("Failed to export keying material: {:?}", e);
            return None;
        }

        Some(KeyingMaterial::new(buf))
    }

    /// The SRTP master keys of both roles.
    pub fn srtp_keys(&self) -> Result<SrtpKeys, DtlsError> {
        self.export_keying_material()
            .map(|m| m.split())
            .ok_or(DtlsError::KeyingMaterialUnavailable)
    }

    /// Move what OpenSSL wrote during the last call into `Transmit` events.
    ///
    /// OpenSSL writes every handshake message as a record of its own. The
    /// records of one call (a whole flight) are packed into as few MTU sized
    /// datagrams as possible, in order.
    fn drain_outgoing(&mut self) {
        let Some(io) = self.tls.inner_mut() else {
            return;
        };

        let mtu = io.mtu();

        let mut datagrams: Vec<Vec<u8>> = vec![];

        while let Some(x) = io.pop_outgoing() {
            match datagrams.last_mut() {
                Some(last) if last.len() + x.len() <= mtu => last.extend_from_slice(&x),
                _ => datagrams.push(x),
            }
        }

        for x in datagrams {
            if x.len() > mtu {
                warn!("DTLS above MTU {}: {}", mtu, x.len());
            }
            trace!("Transmit: {}", x.len());
            self.events.push_back(DtlsEvent::Transmit(x));
        }
    }
}

impl fmt::Debug for DtlsEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "Connected"),
            Self::Data(arg0) => f.debug_tuple("Data").field(&arg0.len()).finish(),
            Self::Transmit(arg0) => f.debug_tuple("Transmit").field(&arg0.len()).finish(),
        }
    }
}

impl fmt::Debug for Dtls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dtls")
            .field("state", &self.state)
            .field("active", &self.is_active())
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}
