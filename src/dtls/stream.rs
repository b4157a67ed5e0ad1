use std::io;
use std::mem;

use openssl::ssl::{ErrorCode, HandshakeError, MidHandshakeSslStream, Ssl, SslStream};

use super::DtlsError;

/// An OpenSSL stream that is driven through the handshake one step at a time.
pub struct TlsStream<S> {
    active: bool,
    state: State<S>,
}

enum State<S> {
    Init(Ssl, S),
    Handshaking(MidHandshakeSslStream<S>),
    Established(SslStream<S>),
    /// The handshake failed. Kept around since the failure might have
    /// produced an alert that still needs to be sent.
    Failed(MidHandshakeSslStream<S>),
    /// Only seen if OpenSSL failed to even set up the handshake.
    Empty,
}

impl<S> TlsStream<S>
where
    S: io::Read + io::Write,
{
    pub fn new(ssl: Ssl, stream: S, active: bool) -> Self {
        TlsStream {
            active,
            state: State::Init(ssl, stream),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Advance the handshake as far as the buffered input allows.
    ///
    /// `Ok(true)` once established, `Ok(false)` if it would block.
    pub fn complete_handshake_until_block(&mut self) -> Result<bool, DtlsError> {
        if matches!(self.state, State::Established(_)) {
            return Ok(true);
        }

        let taken = mem::replace(&mut self.state, State::Empty);

        let result = match taken {
            State::Init(ssl, stream) => {
                if self.active {
                    debug!("Connect");
                    ssl.connect(stream)
                } else {
                    debug!("Accept");
                    ssl.accept(stream)
                }
            }
            State::Handshaking(mid) => mid.handshake(),
            other => {
                // Failed, Empty (Established is handled above).
                self.state = other;
                return Err(DtlsError::TransportClosed);
            }
        };

        match result {
            Ok(v) => {
                debug!("Established version: {}", v.ssl().version_str());
                self.state = State::Established(v);
                Ok(true)
            }
            Err(HandshakeError::WouldBlock(mid)) => {
                self.state = State::Handshaking(mid);
                Ok(false)
            }
            Err(HandshakeError::SetupFailure(e)) => {
                debug!("DTLS setup failed: {:?}", e);
                Err(DtlsError::HandshakeFailed(e.to_string()))
            }
            Err(HandshakeError::Failure(mid)) => {
                let e = mid.error();
                let peer_closed = e.code() == ErrorCode::ZERO_RETURN;
                let reason = e.to_string();
                debug!("DTLS failure: {:?}", e);

                self.state = State::Failed(mid);

                if peer_closed {
                    Err(DtlsError::TransportClosed)
                } else {
                    Err(DtlsError::HandshakeFailed(reason))
                }
            }
        }
    }

    pub fn established(&self) -> Option<&SslStream<S>> {
        match &self.state {
            State::Established(v) => Some(v),
            _ => None,
        }
    }

    pub fn established_mut(&mut self) -> Option<&mut SslStream<S>> {
        match &mut self.state {
            State::Established(v) => Some(v),
            _ => None,
        }
    }

    /// The underlying I/O, unless OpenSSL lost it in a setup failure.
    pub fn inner_mut(&mut self) -> Option<&mut S> {
        match &mut self.state {
            State::Init(_, s) => Some(s),
            State::Handshaking(v) | State::Failed(v) => Some(v.get_mut()),
            State::Established(v) => Some(v.get_mut()),
            State::Empty => None,
        }
    }
}
