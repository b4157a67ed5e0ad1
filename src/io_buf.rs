use std::collections::VecDeque;
use std::io;

/// MTU reported to the DTLS layer.
///
/// Path MTU is never discovered, this is a conservative fixed value.
pub const DATAGRAM_MTU: usize = 1500;

/// Length of a DTLS record header.
///
/// content type (1), version (2), epoch (2), sequence number (6), length (2).
const DTLS_RECORD_HEADER_LEN: usize = 13;

/// change_cipher_spec (20) up to tls12_cid (25).
const DTLS_CONTENT_TYPES: std::ops::RangeInclusive<u8> = 20..=25;

/// First byte of every DTLS version, 1.0 is FEFF and 1.2 FEFD.
const DTLS_VERSION_MAJOR: u8 = 0xfe;

/// 2^14 plaintext plus the most expansion a cipher is allowed (RFC 6347 4.1).
const DTLS_MAX_RECORD_BODY: usize = 16_384 + 2048;

/// The byte queues the DTLS layer uses as its network device.
///
/// Incoming bytes are appended by [`IoBuffer::push`] and consumed front to back
/// by the DTLS layer through [`io::Read`]. Outgoing protocol bytes arrive via
/// [`io::Write`] and are handed onwards untouched, in the order written.
pub(crate) struct IoBuffer {
    /// Received, possibly partially consumed bytes.
    incoming: Vec<u8>,
    /// Read cursor into `incoming`. Always `<= incoming.len()`.
    offset: usize,
    /// Datagrams written by the DTLS layer not yet picked up by [`Dtls`][crate::Dtls].
    outgoing: VecDeque<Vec<u8>>,
    mtu: usize,
    max_incoming: usize,
}

impl IoBuffer {
    pub fn new(mtu: usize, max_incoming: usize) -> Self {
        IoBuffer {
            incoming: Vec::with_capacity(2048),
            offset: 0,
            outgoing: VecDeque::new(),
            mtu,
            max_incoming,
        }
    }

    /// Append received bytes to the inbound queue.
    pub fn push(&mut self, buf: &[u8]) {
        self.compact();

        if self.pending() + buf.len() > self.max_incoming {
            warn!(
                "Incoming DTLS data is not being consumed ({} bytes pending), reset",
                self.pending()
            );
            self.reset();
        }

        self.incoming.extend_from_slice(buf);
    }

    /// Number of received bytes not yet consumed.
    pub fn pending(&self) -> usize {
        self.incoming.len() - self.offset
    }

    /// Drop everything received, consumed or not.
    pub fn reset(&mut self) {
        self.incoming.clear();
        self.offset = 0;
    }

    /// The MTU answered to the DTLS layer.
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Next datagram written by the DTLS layer.
    pub fn pop_outgoing(&mut self) -> Option<Vec<u8>> {
        self.outgoing.pop_front()
    }

    /// Discard the already consumed prefix. Unread bytes are untouched.
    fn compact(&mut self) {
        if self.offset == 0 {
            return;
        }

        if self.offset == self.incoming.len() {
            // The typical case is that the entire input was consumed,
            // which means the happy path is cheap.
            self.incoming.clear();
        } else {
            self.incoming.drain(..self.offset);
        }

        self.offset = 0;
    }

    /// Frame the complete DTLS records at the read cursor that fit in `max`.
    ///
    /// A record that is still being received is never included, the DTLS
    /// layer treats every read as one datagram and would discard a fragment.
    fn frame(&self, max: usize) -> Framing {
        let unread = &self.incoming[self.offset..];
        let mut n = 0;

        loop {
            let rest = &unread[n..];

            if !plausible_header(rest) {
                if n == 0 {
                    return Framing::Garbage(resync(rest));
                }
                break;
            }

            if rest.len() < DTLS_RECORD_HEADER_LEN {
                break;
            }

            let body_len = u16::from_be_bytes([rest[11], rest[12]]) as usize;
            let record_len = DTLS_RECORD_HEADER_LEN + body_len;

            if rest.len() < record_len {
                break;
            }

            if n + record_len > max {
                if n == 0 {
                    return Framing::Oversized(record_len);
                }
                break;
            }

            n += record_len;
        }

        if n == 0 {
            Framing::Incomplete
        } else {
            Framing::Records(n)
        }
    }
}

/// Whether the visible part of `buf` can be the start of a DTLS record.
///
/// An empty `buf` is plausible, there is just nothing to judge yet.
fn plausible_header(buf: &[u8]) -> bool {
    if let Some(t) = buf.first() {
        if !DTLS_CONTENT_TYPES.contains(t) {
            return false;
        }
    }

    if let Some(v) = buf.get(1) {
        if *v != DTLS_VERSION_MAJOR {
            return false;
        }
    }

    if buf.len() >= DTLS_RECORD_HEADER_LEN {
        let body_len = u16::from_be_bytes([buf[11], buf[12]]) as usize;
        if body_len > DTLS_MAX_RECORD_BODY {
            return false;
        }
    }

    true
}

/// Bytes to skip from a bad header to the next place a record could start.
fn resync(buf: &[u8]) -> usize {
    (1..buf.len())
        .find(|i| plausible_header(&buf[*i..]))
        .unwrap_or(buf.len())
}

enum Framing {
    /// This many bytes of whole records are ready.
    Records(usize),
    /// The next record can never be delivered in one read.
    Oversized(usize),
    /// Bytes at the cursor that are not DTLS, skip this many.
    Garbage(usize),
    /// Not a single whole record yet.
    Incomplete,
}

impl io::Read for IoBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.frame(buf.len()) {
                Framing::Records(n) => {
                    buf[..n].copy_from_slice(&self.incoming[self.offset..(self.offset + n)]);
                    self.offset += n;

                    trace!("Read {} bytes, {} pending", n, self.pending());

                    return Ok(n);
                }
                Framing::Oversized(len) => {
                    warn!("Drop DTLS record larger than read buffer: {}", len);
                    self.offset += len;
                }
                Framing::Garbage(len) => {
                    warn!("Skip {} bytes of non-DTLS data", len);
                    self.offset += len;
                }
                Framing::Incomplete => {
                    return Err(io::Error::new(io::ErrorKind::WouldBlock, "WouldBlock"));
                }
            }
        }
    }
}

impl io::Write for IoBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        trace!("Write {} bytes", buf.len());

        self.outgoing.push_back(buf.to_vec());

        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::io::{Read, Write};

    use super::*;

    fn record(content_type: u8, body: &[u8]) -> Vec<u8> {
        let mut r = vec![content_type, 0xfe, 0xfd, 0, 0, 0, 0, 0, 0, 0, 1];
        r.extend_from_slice(&(body.len() as u16).to_be_bytes());
        r.extend_from_slice(body);
        r
    }

    #[test]
    fn empty_read_would_block() {
        let mut io = IoBuffer::new(DATAGRAM_MTU, 30_000);
        let mut buf = [0; 100];
        let err = io.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn partial_record_would_block() {
        let mut io = IoBuffer::new(DATAGRAM_MTU, 30_000);
        let r = record(22, &[1, 2, 3, 4, 5]);
        let mut buf = [0; 100];

        for b in &r[..r.len() - 1] {
            io.push(&[*b]);
            let err = io.read(&mut buf).unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
        }
        assert_eq!(io.pending(), r.len() - 1);

        io.push(&r[r.len() - 1..]);
        let n = io.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], &r[..]);
        assert_eq!(io.pending(), 0);
    }

    #[test]
    fn several_records_in_one_read() {
        let mut io = IoBuffer::new(DATAGRAM_MTU, 30_000);
        let r1 = record(22, &[1; 10]);
        let r2 = record(23, &[2; 20]);
        let r3 = record(23, &[3; 30]);

        io.push(&r1);
        io.push(&r2);
        // Only half of the third.
        io.push(&r3[..20]);

        let mut buf = [0; 200];
        let n = io.read(&mut buf).unwrap();
        assert_eq!(n, r1.len() + r2.len());
        assert_eq!(&buf[..r1.len()], &r1[..]);
        assert_eq!(io.pending(), 20);

        io.push(&r3[20..]);
        let n = io.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], &r3[..]);
    }

    #[test]
    fn read_respects_max_len() {
        let mut io = IoBuffer::new(DATAGRAM_MTU, 30_000);
        let r1 = record(23, &[1; 10]);
        let r2 = record(23, &[2; 10]);
        io.push(&r1);
        io.push(&r2);

        let mut buf = [0; 30];
        let n = io.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], &r1[..]);
        let n = io.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], &r2[..]);
    }

    #[test]
    fn oversized_record_is_dropped() {
        let mut io = IoBuffer::new(DATAGRAM_MTU, 30_000);
        let r1 = record(23, &[1; 50]);
        let r2 = record(23, &[2; 10]);
        io.push(&r1);
        io.push(&r2);

        let mut buf = [0; 30];
        let n = io.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], &r2[..]);
        assert_eq!(io.pending(), 0);
    }

    #[test]
    fn bogus_length_does_not_swallow_later_records() {
        let mut io = IoBuffer::new(DATAGRAM_MTU, 30_000);
        let stray = [23, 0xfe, 0xfd, 0, 1, 0, 0, 0, 0, 0, 9, 0xff, 0xff];
        let r1 = record(23, &[1; 10]);

        io.push(&stray);
        let mut buf = [0; 20_000];
        let err = io.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
        assert_eq!(io.pending(), 0);

        io.push(&r1);
        let n = io.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], &r1[..]);
    }

    #[test]
    fn junk_is_skipped_up_to_next_header() {
        let mut io = IoBuffer::new(DATAGRAM_MTU, 30_000);
        let r1 = record(22, &[1; 10]);
        let r2 = record(23, &[2; 10]);

        io.push(&[0, 1, 2, 0x17]);
        io.push(&r1);
        io.push(&[0xff; 7]);
        io.push(&r2);

        let mut buf = [0; 200];
        let n = io.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], &r1[..]);
        let n = io.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], &r2[..]);
        assert_eq!(io.pending(), 0);
    }

    #[test]
    fn header_judged_before_complete() {
        let mut io = IoBuffer::new(DATAGRAM_MTU, 30_000);
        let mut buf = [0; 200];

        // Unknown content type, rejected from the first byte.
        io.push(&[99]);
        assert!(io.read(&mut buf).is_err());
        assert_eq!(io.pending(), 0);

        // Good content type, bad version.
        io.push(&[22, 0x03]);
        assert!(io.read(&mut buf).is_err());
        assert_eq!(io.pending(), 0);

        // A valid start is kept while waiting for the rest.
        io.push(&[22, 0xfe]);
        assert!(io.read(&mut buf).is_err());
        assert_eq!(io.pending(), 2);
    }

    #[test]
    fn compaction_keeps_unread_bytes() {
        let mut io = IoBuffer::new(DATAGRAM_MTU, 30_000);
        let r1 = record(23, &[1; 10]);
        let r2 = record(23, &[2; 10]);
        io.push(&r1);
        io.push(&r2[..5]);

        let mut buf = [0; 23];
        io.read(&mut buf).unwrap();
        assert_eq!(io.offset, r1.len());

        // Next push compacts.
        io.push(&r2[5..]);
        assert_eq!(io.offset, 0);
        assert_eq!(io.incoming, r2);
    }

    #[test]
    fn reset_clears_everything() {
        let mut io = IoBuffer::new(DATAGRAM_MTU, 30_000);
        io.push(&record(23, &[1; 10]));
        io.reset();
        assert_eq!(io.pending(), 0);
        assert_eq!(io.offset, 0);
    }

    #[test]
    fn overflow_resets_queue() {
        let mut io = IoBuffer::new(DATAGRAM_MTU, 100);
        io.push(&[0; 60]);
        io.push(&[1; 60]);
        assert_eq!(io.pending(), 60);
        assert_eq!(io.incoming, vec![1; 60]);
    }

    #[test]
    fn writes_keep_order() {
        let mut io = IoBuffer::new(DATAGRAM_MTU, 30_000);
        io.write_all(&[1]).unwrap();
        io.write_all(&[2, 2]).unwrap();
        io.write_all(&[3, 3, 3]).unwrap();

        assert_eq!(io.pop_outgoing(), Some(vec![1]));
        assert_eq!(io.pop_outgoing(), Some(vec![2, 2]));
        assert_eq!(io.pop_outgoing(), Some(vec![3, 3, 3]));
        assert_eq!(io.pop_outgoing(), None);
        assert_eq!(io.mtu(), 1500);
    }
}
