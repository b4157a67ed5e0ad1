use std::collections::HashMap;
use std::fmt;

use openssl::cipher::Cipher;
use openssl::cipher_ctx::CipherCtx;
use openssl::error::ErrorStack;
use openssl::symm::{self, Crypter, Mode};

use crate::dtls::{SrtpMasterKey, SRTP_KEY_LEN, SRTP_SALT_LEN};

use super::replay::{estimate_index, ReplayWindow};
use super::sha1::Sha1;
use super::status::{CryptoFailure, SrtpStatus};

/// Length of the authentication tag for `AES_CM_128_HMAC_SHA1_80`.
pub const SRTP_AUTH_TAG_LEN: usize = 10;

const SRTCP_INDEX_LEN: usize = 4;

const RTP_HEADER_LEN: usize = 12;

/// Header plus sender SSRC.
const RTCP_HEADER_LEN: usize = 8;

const SRTCP_E_FLAG: u32 = 0x8000_0000;
const SRTCP_INDEX_MAX: u32 = 0x7fff_ffff;

type AesKey = [u8; SRTP_KEY_LEN];
type RtpSalt = [u8; SRTP_SALT_LEN];
type RtpIv = [u8; 16];

/// Whether a context protects what we send, or unprotects what we receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Any outbound SSRC.
    Outbound,
    /// Any inbound SSRC.
    Inbound,
}

/// One direction of SRTP for every SSRC using it.
///
/// The session keys are derived once, each SSRC gets its own replay state.
pub struct SrtpContext {
    direction: Direction,
    /// Encryption/decryption derived from the master key for RTP.
    rtp: Derived,
    /// Encryption/decryption derived from the master key for RTCP.
    rtcp: Derived,
    streams: HashMap<u32, Stream>,
}

#[derive(Debug, Default)]
struct Stream {
    rtp_replay: ReplayWindow,
    rtcp_replay: ReplayWindow,
    /// Last SRTCP index sent.
    srtcp_index: u32,
}

impl SrtpContext {
    pub fn new(master: &SrtpMasterKey, direction: Direction) -> Result<Self, CryptoFailure> {
        let (rtp, rtcp) = Derived::from_key(master)?;

        Ok(SrtpContext {
            direction,
            rtp,
            rtcp,
            streams: HashMap::new(),
        })
    }

    fn expect_direction(&self, direction: Direction) -> Result<(), SrtpStatus> {
        if self.direction != direction {
            return Err(SrtpStatus::NoCtx);
        }
        Ok(())
    }

    // SRTP layout
    // [header, [rtp, (padding + pad_count)], hmac]

    //     0                   1                   2                   3
    //     0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
    //    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+<+
    //    |V=2|P|X|  CC   |M|     PT      |       sequence number         | |
    //    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+ |
    //    |                           timestamp                           | |
    //    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+ |
    //    |           synchronization source (SSRC) identifier            | |
    //    +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+ |
    //    |            contributing source (CSRC) identifiers             | |
    //    |                               ....                            | |
    //    +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+ |
    //    |                   RTP extension (OPTIONAL)                    | |
    //  +>+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+ |
    //  | |                          payload  ...                         | |
    //  | |                               +-------------------------------+ |
    //  | |                               | RTP padding   | RTP pad count | |
    //  +>+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+<+
    //  | :                 authentication tag (RECOMMENDED)              : |
    //  | +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+ |
    //  |                                                                   |
    //  +- Encrypted Portion*                      Authenticated Portion ---+

    /// Protect the RTP packet in `buf[..len]` in place.
    ///
    /// `buf` must have room for the tag after `len`. Returns the new length.
    pub fn protect_rtp(&mut self, buf: &mut [u8], len: usize) -> Result<usize, CryptoFailure> {
        self.expect_direction(Direction::Outbound)?;

        if buf.len() < len + SRTP_AUTH_TAG_LEN {
            return Err(SrtpStatus::BadParam.into());
        }

        let hlen = rtp_header_len(&buf[..len])?;

        let (seq, ssrc) = rtp_seq_ssrc(buf);

        let stream = self.streams.entry(ssrc).or_default();
        let index = estimate_index(stream.rtp_replay.top(), seq);

        match stream.rtp_replay.check(index) {
            Ok(()) => {}
            // Resending the same packet is allowed.
            Err(SrtpStatus::ReplayFail) => {}
            Err(e) => return Err(e.into()),
        }
        stream.rtp_replay.add(index);

        let iv = rtp_iv(&self.rtp.salt, ssrc, index);
        self.rtp.aes.apply(&iv, &mut buf[hlen..len])?;

        let roc = (index >> 16) as u32;
        let tag = self.rtp.hmac.hmac(&[&buf[..len], &roc.to_be_bytes()]);
        buf[len..(len + SRTP_AUTH_TAG_LEN)].copy_from_slice(&tag[..SRTP_AUTH_TAG_LEN]);

        trace!("Protect RTP ssrc: {} index: {} len: {}", ssrc, index, len);

        Ok(len + SRTP_AUTH_TAG_LEN)
    }

    /// Unprotect the SRTP packet in `buf[..len]` in place.
    ///
    /// Returns the length of the RTP packet.
    pub fn unprotect_rtp(&mut self, buf: &mut [u8], len: usize) -> Result<usize, CryptoFailure> {
        self.expect_direction(Direction::Inbound)?;

        if len < RTP_HEADER_LEN + SRTP_AUTH_TAG_LEN || buf.len() < len {
            return Err(SrtpStatus::BadParam.into());
        }

        let (seq, ssrc) = rtp_seq_ssrc(buf);

        let replay = self
            .streams
            .get(&ssrc)
            .map(|s| &s.rtp_replay)
            .cloned()
            .unwrap_or_default();

        let index = estimate_index(replay.top(), seq);
        replay.check(index)?;

        let tag_start = len - SRTP_AUTH_TAG_LEN;
        let roc = (index >> 16) as u32;
        let tag = self.rtp.hmac.hmac(&[&buf[..tag_start], &roc.to_be_bytes()]);

        if !openssl::memcmp::eq(&tag[..SRTP_AUTH_TAG_LEN], &buf[tag_start..len]) {
            trace!("Unprotect RTP hmac verify fail, ssrc: {}", ssrc);
            return Err(SrtpStatus::AuthFail.into());
        }

        let hlen = rtp_header_len(&buf[..tag_start])?;

        let iv = rtp_iv(&self.rtp.salt, ssrc, index);
        self.rtp.aes.apply(&iv, &mut buf[hlen..tag_start])?;

        let stream = self.streams.entry(ssrc).or_insert_with(|| {
            debug!("New inbound SRTP stream, ssrc: {}", ssrc);
            Stream::default()
        });
        stream.rtp_replay.add(index);

        trace!("Unprotect RTP ssrc: {} index: {} len: {}", ssrc, index, tag_start);

        Ok(tag_start)
    }

    // SRTCP layout
    // ["header", ssrc, payload, ["header", ssrc, payload], ...], ssrtcp_index, hmac]
    //
    // |----------------------------------------------------------------------|
    //                          authenticated (hmac)
    //
    //                  |--------------------------------------|
    //                              encrypted (aes)

    /// Protect the compound RTCP packet in `buf[..len]` in place.
    ///
    /// `buf` must have room for the SRTCP index and tag after `len`.
    pub fn protect_rtcp(&mut self, buf: &mut [u8], len: usize) -> Result<usize, CryptoFailure> {
        self.expect_direction(Direction::Outbound)?;

        let out_len = len + SRTCP_INDEX_LEN + SRTP_AUTH_TAG_LEN;

        if len < RTCP_HEADER_LEN || buf.len() < out_len {
            return Err(SrtpStatus::BadParam.into());
        }

        let ssrc = rtcp_ssrc(buf);

        if ssrc == 0 {
            warn!("SSRC 0 does not make a good SRTCP IV");
        }

        let stream = self.streams.entry(ssrc).or_default();

        // https://tools.ietf.org/html/rfc3711#page-15
        // The SRTCP index MUST be set to zero before the first SRTCP
        // packet is sent, and MUST be incremented by one,
        // modulo 2^31, after each SRTCP packet is sent.
        if stream.srtcp_index >= SRTCP_INDEX_MAX {
            return Err(SrtpStatus::KeyExpired.into());
        }
        stream.srtcp_index += 1;
        let srtcp_index = stream.srtcp_index;

        let iv = rtp_iv(&self.rtcp.salt, ssrc, srtcp_index as u64);
        self.rtcp.aes.apply(&iv, &mut buf[RTCP_HEADER_LEN..len])?;

        // e is always encrypted, rest is 31 bit index.
        let e_and_si = SRTCP_E_FLAG | srtcp_index;
        buf[len..(len + SRTCP_INDEX_LEN)].copy_from_slice(&e_and_si.to_be_bytes());

        let tag_start = len + SRTCP_INDEX_LEN;
        let tag = self.rtcp.hmac.hmac(&[&buf[..tag_start]]);
        buf[tag_start..out_len].copy_from_slice(&tag[..SRTP_AUTH_TAG_LEN]);

        trace!("Protect RTCP ssrc: {} index: {} len: {}", ssrc, srtcp_index, len);

        Ok(out_len)
    }

    /// Unprotect the SRTCP packet in `buf[..len]` in place.
    pub fn unprotect_rtcp(&mut self, buf: &mut [u8], len: usize) -> Result<usize, CryptoFailure> {
        self.expect_direction(Direction::Inbound)?;

        if len < RTCP_HEADER_LEN + SRTCP_INDEX_LEN + SRTP_AUTH_TAG_LEN || buf.len() < len {
            return Err(SrtpStatus::BadParam.into());
        }

        let tag_start = len - SRTP_AUTH_TAG_LEN;
        let idx_start = tag_start - SRTCP_INDEX_LEN;

        let e_and_si = u32::from_be_bytes([
            buf[idx_start],
            buf[idx_start + 1],
            buf[idx_start + 2],
            buf[idx_start + 3],
        ]);
        let is_encrypted = e_and_si & SRTCP_E_FLAG > 0;
        let srtcp_index = e_and_si & SRTCP_INDEX_MAX;

        let ssrc = rtcp_ssrc(buf);

        if let Some(stream) = self.streams.get(&ssrc) {
            stream.rtcp_replay.check(srtcp_index as u64)?;
        }

        let tag = self.rtcp.hmac.hmac(&[&buf[..tag_start]]);

        if !openssl::memcmp::eq(&tag[..SRTP_AUTH_TAG_LEN], &buf[tag_start..len]) {
            trace!("Unprotect RTCP hmac verify fail, ssrc: {}", ssrc);
            return Err(SrtpStatus::AuthFail.into());
        }

        if is_encrypted {
            let iv = rtp_iv(&self.rtcp.salt, ssrc, srtcp_index as u64);
            self.rtcp.aes.apply(&iv, &mut buf[RTCP_HEADER_LEN..idx_start])?;
        }

        let stream = self.streams.entry(ssrc).or_insert_with(|| {
            debug!("New inbound SRTCP stream, ssrc: {}", ssrc);
            Stream::default()
        });
        stream.rtcp_replay.add(srtcp_index as u64);

        trace!("Unprotect RTCP ssrc: {} index: {} len: {}", ssrc, srtcp_index, idx_start);

        Ok(idx_start)
    }
}

/// Length of the RTP header including CSRCs and extension.
fn rtp_header_len(buf: &[u8]) -> Result<usize, SrtpStatus> {
    if buf.len() < RTP_HEADER_LEN {
        return Err(SrtpStatus::BadParam);
    }

    let csrc_count = (buf[0] & 0x0f) as usize;
    let has_extension = buf[0] & 0x10 > 0;

    let mut hlen = RTP_HEADER_LEN + csrc_count * 4;

    if has_extension {
        if buf.len() < hlen + 4 {
            return Err(SrtpStatus::BadParam);
        }
        let words = u16::from_be_bytes([buf[hlen + 2], buf[hlen + 3]]) as usize;
        hlen += 4 + words * 4;
    }

    if buf.len() < hlen {
        return Err(SrtpStatus::BadParam);
    }

    Ok(hlen)
}

fn rtp_seq_ssrc(buf: &[u8]) -> (u16, u32) {
    let seq = u16::from_be_bytes([buf[2], buf[3]]);
    let ssrc = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
    (seq, ssrc)
}

fn rtcp_ssrc(buf: &[u8]) -> u32 {
    u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]])
}

fn rtp_iv(salt: &RtpSalt, ssrc: u32, srtp_index: u64) -> RtpIv {
    let mut iv = [0; 16];

    let ssrc_be = ssrc.to_be_bytes();
    let srtp_be = srtp_index.to_be_bytes();

    iv[4..8].copy_from_slice(&ssrc_be);

    for i in 0..8 {
        iv[i + 6] ^= srtp_be[i];
    }
    for i in 0..SRTP_SALT_LEN {
        iv[i] ^= salt[i];
    }

    iv
}

/// RFC 3711 4.3.1 AES-CM key derivation with a key derivation rate of 0.
pub(crate) fn derive(master: &SrtpMasterKey, label: u8, out: &mut [u8]) -> Result<(), ErrorStack> {
    // input layout: [salt[14] || label, round[2]] (|| is xor 7th byte)
    let mut input = [0; 16];

    input[0..SRTP_SALT_LEN].copy_from_slice(&master.salt[..]);
    input[7] ^= label;

    // AES wants room for an extra block in the output.
    let mut block = [0; 16 + 16];

    for (round, chunk) in out.chunks_mut(16).enumerate() {
        // splice in round at bottom of input
        input[14..].copy_from_slice(&(round as u16).to_be_bytes()[..]);

        let mut aes = Crypter::new(symm::Cipher::aes_128_ecb(), Mode::Encrypt, &master.key, None)?;
        aes.pad(false);

        let count = aes.update(&input[..], &mut block[..])?;
        aes.finalize(&mut block[count..])?;

        chunk.copy_from_slice(&block[..chunk.len()]);
    }

    Ok(())
}

/// Session keys derived from the master key for either RTP or RTCP.
struct Derived {
    hmac: Sha1,
    salt: RtpSalt,
    aes: AesCtr,
}

impl Derived {
    fn from_key(master: &SrtpMasterKey) -> Result<(Self, Self), CryptoFailure> {
        const LABEL_RTP_AES: u8 = 0;
        const LABEL_RTP_HMAC: u8 = 1;
        const LABEL_RTP_SALT: u8 = 2;
        const LABEL_RTCP_AES: u8 = 3;
        const LABEL_RTCP_HMAC: u8 = 4;
        const LABEL_RTCP_SALT: u8 = 5;

        let rtp = Self::derive_one(master, LABEL_RTP_AES, LABEL_RTP_HMAC, LABEL_RTP_SALT)?;
        let rtcp = Self::derive_one(master, LABEL_RTCP_AES, LABEL_RTCP_HMAC, LABEL_RTCP_SALT)?;

        Ok((rtp, rtcp))
    }

    fn derive_one(
        master: &SrtpMasterKey,
        label_aes: u8,
        label_hmac: u8,
        label_salt: u8,
    ) -> Result<Self, CryptoFailure> {
        let mut aes = [0; SRTP_KEY_LEN];
        derive(master, label_aes, &mut aes)?;

        let mut hmac = [0; 20];
        derive(master, label_hmac, &mut hmac)?;

        let mut salt = [0; SRTP_SALT_LEN];
        derive(master, label_salt, &mut salt)?;

        Ok(Derived {
            hmac: Sha1::new(&hmac)?,
            salt,
            aes: AesCtr::new(aes)?,
        })
    }
}

/// AES-128 in counter mode. Encryption and decryption are the same operation.
struct AesCtr {
    ctx: CipherCtx,
    /// Scratch for the input, OpenSSL doesn't do overlapping buffers.
    scratch: Vec<u8>,
}

impl AesCtr {
    fn new(key: AesKey) -> Result<Self, ErrorStack> {
        let mut ctx = CipherCtx::new()?;
        ctx.encrypt_init(Some(Cipher::aes_128_ctr()), Some(&key[..]), None)?;
        Ok(AesCtr {
            ctx,
            scratch: Vec::new(),
        })
    }

    fn apply(&mut self, iv: &RtpIv, data: &mut [u8]) -> Result<(), ErrorStack> {
        self.scratch.clear();
        self.scratch.extend_from_slice(data);

        self.ctx.encrypt_init(None, None, Some(&iv[..]))?;
        let count = self.ctx.cipher_update(&self.scratch, Some(&mut *data))?;
        self.ctx.cipher_final(&mut data[count..])?;

        Ok(())
    }
}

impl fmt::Debug for SrtpContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SrtpContext")
            .field("direction", &self.direction)
            .field("streams", &self.streams.len())
            .finish()
    }
}
