//! DTLS and SRTP over a datagram stream you already own.
//!
//! This is a [Sans I/O][sansio] crate. The [`Dtls`] instance never touches a
//! socket. Incoming datagram bytes are handed to it with [`Dtls::feed`], and
//! everything it wants to send comes back out as [`DtlsEvent::Transmit`] from
//! [`Dtls::poll_event`]. That makes it possible to run a DTLS handshake on top
//! of any unreliable datagram channel: a UDP socket, an ICE agent, a relayed
//! TURN allocation or a test harness that drops packets on purpose.
//!
//! Once the handshake completes, the exported keying material seeds an
//! [`SrtpSession`] that protects and unprotects RTP and RTCP packets.
//!
//! ```no_run
//! use dtls_srtp::{Dtls, DtlsEvent, SrtpSession};
//!
//! # fn send_to_peer(_: &[u8]) {}
//! # fn recv_from_peer() -> Vec<u8> { vec![] }
//! let mut dtls = Dtls::new("cert.pem", "key.pem").unwrap();
//!
//! // Kick off the handshake, the ClientHello comes out as a Transmit event.
//! dtls.tick().unwrap();
//!
//! while !dtls.is_connected() {
//!     while let Some(event) = dtls.poll_event() {
//!         if let DtlsEvent::Transmit(datagram) = event {
//!             send_to_peer(&datagram);
//!         }
//!     }
//!     dtls.feed(&recv_from_peer()).unwrap();
//! }
//!
//! let keys = dtls.srtp_keys().unwrap();
//! let mut srtp = SrtpSession::from_keys(&keys, dtls.is_active()).unwrap();
//!
//! # let rtp = vec![0x80, 0x60, 0, 1, 0, 0, 0, 0, 0, 0, 0, 42];
//! let protected = srtp.protect_rtp(&rtp).unwrap();
//! ```
//!
//! # Driving the handshake
//!
//! There is no internal timer. While handshaking, [`Dtls::poll_timeout`] says
//! when [`Dtls::tick`] should be called again so the DTLS layer gets a chance to
//! retransmit lost flights. Calling `tick()` more often than that is harmless.
//!
//! # Threads
//!
//! A [`Dtls`] and the [`SrtpSession`] derived from it belong to a single
//! connection. Neither does any internal locking, if you drive them from
//! several threads, serialize access yourself.
//!
//! [sansio]: https://sans-io.readthedocs.io

#![forbid(unsafe_code)]
#![allow(clippy::new_without_default)]
#![allow(clippy::manual_range_contains)]
#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod config;
pub use config::DtlsConfig;

mod io_buf;
pub use io_buf::DATAGRAM_MTU;

mod dtls;
pub use dtls::{Dtls, DtlsCert, DtlsEvent, DtlsState};
pub use dtls::{Fingerprint, KeyingMaterial, SrtpKeys, SrtpMasterKey};

mod srtp;
pub use srtp::{srtp_init, SrtpSession, SRTP_HEADROOM};

/// Various error types.
pub mod error {
    pub use crate::dtls::DtlsError;
    pub use crate::srtp::{CryptoFailure, SrtpStatus};
}

/// Errors for the whole crate.
///
/// Each half has its own error type, this joins them for callers that drive
/// both the handshake and the media encryption through a single `?`.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// DTLS errors.
    #[error("{0}")]
    Dtls(#[from] error::DtlsError),

    /// SRTP errors.
    #[error("{0}")]
    Srtp(#[from] error::CryptoFailure),
}
