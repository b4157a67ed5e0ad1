use dtls_srtp::error::SrtpStatus;
use dtls_srtp::{SrtpSession, SRTP_HEADROOM};

mod common;
use common::{connect_l_r, init_log, rtcp_packet, rtp_packet, TestDtls};

fn sessions(l: &TestDtls, r: &TestDtls) -> (SrtpSession, SrtpSession) {
    let kl = l.srtp_keys().unwrap();
    let kr = r.srtp_keys().unwrap();
    (
        SrtpSession::from_keys(&kl, l.is_active()).unwrap(),
        SrtpSession::from_keys(&kr, r.is_active()).unwrap(),
    )
}

#[test]
pub fn srtp_round_trip() {
    init_log();

    let (l, r) = connect_l_r();
    let (mut sl, mut sr) = sessions(&l, &r);

    for seq in 0..50 {
        let p = rtp_packet(seq, 42, &[seq as u8; 100]);

        let protected = sl.protect_rtp(&p).unwrap();
        assert!(protected.len() > p.len());
        assert!(protected.len() <= p.len() + SRTP_HEADROOM);
        assert_eq!(sr.unprotect_rtp(&protected).unwrap(), p);

        let protected = sr.protect_rtp(&p).unwrap();
        assert_eq!(sl.unprotect_rtp(&protected).unwrap(), p);
    }

    let rtcp = rtcp_packet(42);
    let protected = sl.protect_rtcp(&rtcp).unwrap();
    assert!(protected.len() <= rtcp.len() + SRTP_HEADROOM);
    assert_eq!(sr.unprotect_rtcp(&protected).unwrap(), rtcp);

    let protected = sr.protect_rtcp(&rtcp).unwrap();
    assert_eq!(sl.unprotect_rtcp(&protected).unwrap(), rtcp);
}

#[test]
pub fn srtp_tamper_any_bit() {
    init_log();

    let (l, r) = connect_l_r();
    let (mut sl, mut sr) = sessions(&l, &r);

    let p = rtp_packet(1, 7, b"the quick brown fox");
    let protected = sl.protect_rtp(&p).unwrap();

    for i in 0..protected.len() * 8 {
        let mut bad = protected.clone();
        bad[i / 8] ^= 1 << (i % 8);

        let err = sr.unprotect_rtp(&bad).unwrap_err();
        assert_eq!(err.kind, SrtpStatus::AuthFail, "bit {}", i);
    }

    let rtcp = rtcp_packet(7);
    let protected = sl.protect_rtcp(&rtcp).unwrap();

    for i in 0..protected.len() * 8 {
        let mut bad = protected.clone();
        bad[i / 8] ^= 1 << (i % 8);

        let err = sr.unprotect_rtcp(&bad).unwrap_err();
        assert_eq!(err.kind, SrtpStatus::AuthFail, "bit {}", i);
    }
}

#[test]
pub fn srtp_tamper_with_replay_window() {
    init_log();

    let (l, r) = connect_l_r();
    let (mut sl, mut sr) = sessions(&l, &r);

    // Sets up the inbound stream.
    let first = sl.protect_rtp(&rtp_packet(40_000, 9, b"first")).unwrap();
    sr.unprotect_rtp(&first).unwrap();

    let p = rtp_packet(40_001, 9, b"jumps over the lazy dog");
    let protected = sl.protect_rtp(&p).unwrap();

    let mut kinds = vec![];

    for i in 0..protected.len() * 8 {
        let mut bad = protected.clone();
        bad[i / 8] ^= 1 << (i % 8);

        let err = sr.unprotect_rtp(&bad).unwrap_err();
        assert!(
            matches!(
                err.kind,
                SrtpStatus::AuthFail | SrtpStatus::ReplayOld | SrtpStatus::ReplayFail
            ),
            "bit {}: {:?}",
            i,
            err
        );
        kinds.push(err.kind);
    }

    // The top bit of the sequence number puts it far behind the window.
    assert!(kinds.contains(&SrtpStatus::ReplayOld));
    assert!(kinds.contains(&SrtpStatus::AuthFail));

    // None of the failures moved the window.
    assert_eq!(sr.unprotect_rtp(&protected).unwrap(), p);
}

#[test]
pub fn srtp_replay() {
    init_log();

    let (l, r) = connect_l_r();
    let (mut sl, mut sr) = sessions(&l, &r);

    let first = sl.protect_rtp(&rtp_packet(10, 1, b"a")).unwrap();
    sr.unprotect_rtp(&first).unwrap();

    let err = sr.unprotect_rtp(&first).unwrap_err();
    assert_eq!(err.kind, SrtpStatus::ReplayFail);

    // Push the window far ahead.
    let later = sl.protect_rtp(&rtp_packet(500, 1, b"b")).unwrap();
    let old = sl.protect_rtp(&rtp_packet(11, 1, b"c")).unwrap_err();
    assert_eq!(old.kind, SrtpStatus::ReplayOld);

    sr.unprotect_rtp(&later).unwrap();

    let rtcp = sl.protect_rtcp(&rtcp_packet(1)).unwrap();
    sr.unprotect_rtcp(&rtcp).unwrap();
    let err = sr.unprotect_rtcp(&rtcp).unwrap_err();
    assert_eq!(err.kind, SrtpStatus::ReplayFail);
}

#[test]
pub fn srtp_same_role_does_not_decrypt() {
    init_log();

    let (l, r) = connect_l_r();
    let keys = l.srtp_keys().unwrap();
    assert_eq!(keys, r.srtp_keys().unwrap());

    // Both think they are the client.
    let mut a = SrtpSession::from_keys(&keys, true).unwrap();
    let mut b = SrtpSession::from_keys(&keys, true).unwrap();

    let protected = a.protect_rtp(&rtp_packet(1, 1, b"x")).unwrap();
    let err = b.unprotect_rtp(&protected).unwrap_err();
    assert_eq!(err.kind, SrtpStatus::AuthFail);
}
