#![allow(unused)]
use std::ops::{Deref, DerefMut};
use std::sync::Once;
use std::thread;
use std::time::{Duration, Instant};

use dtls_srtp::error::DtlsError;
use dtls_srtp::{Dtls, DtlsConfig, DtlsEvent};
use tracing::info_span;
use tracing::Span;

/// One side of a test connection.
pub struct TestDtls {
    pub span: Span,
    pub dtls: Dtls,
    /// Every `Connected` event seen.
    pub connected: usize,
    /// Decrypted data, in order.
    pub data: Vec<Vec<u8>>,
    /// Datagrams to send, not yet handed to the other side.
    pub outgoing: Vec<Vec<u8>>,
    /// Datagrams ever produced.
    pub sent: usize,
}

impl TestDtls {
    pub fn new(span: Span, dtls: Dtls) -> Self {
        TestDtls {
            span,
            dtls,
            connected: 0,
            data: vec![],
            outgoing: vec![],
            sent: 0,
        }
    }

    /// Drain the event queue into the fields above.
    pub fn drain(&mut self) {
        while let Some(e) = self.dtls.poll_event() {
            match e {
                DtlsEvent::Connected => self.connected += 1,
                DtlsEvent::Data(v) => self.data.push(v),
                DtlsEvent::Transmit(v) => {
                    self.sent += 1;
                    self.outgoing.push(v);
                }
            }
        }
    }

    pub fn feed(&mut self, data: &[u8]) -> Result<(), DtlsError> {
        let span = self.span.clone();
        let _g = span.enter();
        let r = self.dtls.feed(data);
        self.drain();
        r
    }

    pub fn tick(&mut self) -> Result<(), DtlsError> {
        let span = self.span.clone();
        let _g = span.enter();
        let r = self.dtls.tick();
        self.drain();
        r
    }

    pub fn encrypt(&mut self, data: &[u8]) -> Result<(), DtlsError> {
        let span = self.span.clone();
        let _g = span.enter();
        let r = self.dtls.encrypt(data);
        self.drain();
        r
    }

    pub fn close(&mut self) {
        let span = self.span.clone();
        let _g = span.enter();
        self.dtls.close();
        self.drain();
    }
}

impl Deref for TestDtls {
    type Target = Dtls;

    fn deref(&self) -> &Self::Target {
        &self.dtls
    }
}

impl DerefMut for TestDtls {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.dtls
    }
}

/// Active (client) on the left, passive (server) on the right.
pub fn pair() -> (TestDtls, TestDtls) {
    pair_with(DtlsConfig::new(), DtlsConfig::new().set_active(false))
}

pub fn pair_with(l: DtlsConfig, r: DtlsConfig) -> (TestDtls, TestDtls) {
    let l = TestDtls::new(info_span!("L"), l.build().unwrap());
    let r = TestDtls::new(info_span!("R"), r.build().unwrap());
    (l, r)
}

/// Hand every datagram `from` wants to send over to `to`.
///
/// `deliver` picks, per datagram, the chunks it arrives in. An empty list
/// drops the datagram. Returns how many datagrams were handed over.
pub fn shuttle<F>(from: &mut TestDtls, to: &mut TestDtls, deliver: &mut F) -> Result<usize, DtlsError>
where
    F: FnMut(&[u8]) -> Vec<Vec<u8>>,
{
    from.drain();
    let outgoing: Vec<_> = from.outgoing.drain(..).collect();
    let mut count = 0;

    for datagram in outgoing {
        let chunks = deliver(&datagram);
        if chunks.is_empty() {
            continue;
        }
        count += 1;
        for chunk in chunks {
            to.feed(&chunk)?;
        }
    }

    Ok(count)
}

/// Deliver every datagram whole.
pub fn whole(datagram: &[u8]) -> Vec<Vec<u8>> {
    vec![datagram.to_vec()]
}

/// Run the handshake until both sides are connected.
///
/// When no datagram moves, both sides are ticked after a pause, which is how
/// lost flights get retransmitted.
pub fn handshake<F>(l: &mut TestDtls, r: &mut TestDtls, deliver: &mut F) -> Result<(), DtlsError>
where
    F: FnMut(&[u8]) -> Vec<Vec<u8>>,
{
    let deadline = Instant::now() + Duration::from_secs(60);

    l.tick()?;

    while !(l.is_connected() && r.is_connected()) {
        assert!(Instant::now() < deadline, "handshake timed out");

        let moved = shuttle(l, r, deliver)? + shuttle(r, l, deliver)?;

        if moved == 0 {
            thread::sleep(Duration::from_millis(50));
            l.tick()?;
            r.tick()?;
        }
    }

    // The last flight from the passive side.
    shuttle(l, r, deliver)?;
    shuttle(r, l, deliver)?;

    Ok(())
}

/// A connected pair.
pub fn connect_l_r() -> (TestDtls, TestDtls) {
    let (mut l, mut r) = pair();
    handshake(&mut l, &mut r, &mut whole).unwrap();
    (l, r)
}

pub fn init_log() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    static START: Once = Once::new();

    START.call_once(|| {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(env_filter)
            .init();
    });
}

/// A minimal RTP packet.
pub fn rtp_packet(seq: u16, ssrc: u32, payload: &[u8]) -> Vec<u8> {
    let mut p = vec![0x80, 0x6f];
    p.extend_from_slice(&seq.to_be_bytes());
    p.extend_from_slice(&(seq as u32 * 960).to_be_bytes());
    p.extend_from_slice(&ssrc.to_be_bytes());
    p.extend_from_slice(payload);
    p
}

/// A receiver report with no report blocks.
pub fn rtcp_packet(ssrc: u32) -> Vec<u8> {
    let mut p = vec![0x80, 0xc9, 0x00, 0x01];
    p.extend_from_slice(&ssrc.to_be_bytes());
    p
}
