//! Property-based tests for the SRTLA codec
//!
//! Random inputs exercise the round-trip laws (SRTLA data framing, NAK
//! loss-list expansion) and check that classification never panics on
//! arbitrary bytes.

use bytes::BufMut;
use proptest::prelude::*;
use srtla_protocol::sequence::MAX_SEQ_NUMBER;
use srtla_protocol::{
    build_srtla_ack, build_srtla_data, classify, parse_srtla_ack, parse_srtla_data,
    srt_nak_sequences, SeqNumber, SRTLA_ACK_PACKET_LEN, SRTLA_ACK_SEQ_COUNT,
};
use std::net::Ipv4Addr;

fn seq_strategy() -> impl Strategy<Value = SeqNumber> {
    (0..=MAX_SEQ_NUMBER).prop_map(SeqNumber::new)
}

fn ipv4_strategy() -> impl Strategy<Value = Ipv4Addr> {
    any::<[u8; 4]>().prop_map(|o| Ipv4Addr::new(o[0], o[1], o[2], o[3]))
}

fn nak_packet(words: &[u32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + words.len() * 4);
    buf.put_u32(0x8000_0000 | (3u32 << 16));
    buf.put_u32(0);
    buf.put_u32(0);
    buf.put_u32(0);
    for w in words {
        buf.put_u32(*w);
    }
    buf
}

proptest! {
    #[test]
    fn prop_srtla_data_roundtrip(
        ip in ipv4_strategy(),
        seq in seq_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..=512),
    ) {
        let frame = build_srtla_data(ip, seq, &payload);
        let decoded = parse_srtla_data(&frame).unwrap();
        prop_assert_eq!(decoded.virtual_ip, ip);
        prop_assert_eq!(decoded.sequence, seq);
        prop_assert_eq!(decoded.payload, &payload[..]);
    }

    #[test]
    fn prop_srtla_ack_roundtrip(raw in prop::array::uniform10(0..=MAX_SEQ_NUMBER)) {
        let mut seqs = [SeqNumber::new(0); SRTLA_ACK_SEQ_COUNT];
        for (slot, value) in seqs.iter_mut().zip(raw.iter()) {
            *slot = SeqNumber::new(*value);
        }
        let frame = build_srtla_ack(&seqs);
        prop_assert_eq!(frame.len(), SRTLA_ACK_PACKET_LEN);
        prop_assert_eq!(parse_srtla_ack(&frame).unwrap(), seqs);
    }

    #[test]
    fn prop_nak_singles_roundtrip(
        singles in prop::collection::vec(0..0x4000_0000u32, 1..=32),
    ) {
        let packet = nak_packet(&singles);
        let decoded: Vec<u32> = srt_nak_sequences(&packet)
            .iter()
            .map(|s| s.as_raw())
            .collect();
        prop_assert_eq!(decoded, singles);
    }

    #[test]
    fn prop_nak_range_expands_inclusively(
        start in 0..=MAX_SEQ_NUMBER,
        len in 0u32..=64,
    ) {
        let end = SeqNumber::new(start) + len;
        let packet = nak_packet(&[start | 0x8000_0000, end.as_raw()]);
        let decoded = srt_nak_sequences(&packet);

        prop_assert_eq!(decoded.len(), len as usize + 1);
        let mut expected = SeqNumber::new(start);
        for seq in &decoded {
            prop_assert_eq!(*seq, expected);
            expected = expected.next();
        }
    }

    #[test]
    fn prop_classify_never_panics(data in prop::collection::vec(any::<u8>(), 0..=64)) {
        let _ = classify(&data);
        let _ = srt_nak_sequences(&data);
        let _ = parse_srtla_data(&data);
        let _ = parse_srtla_ack(&data);
    }

    #[test]
    fn prop_ack_coverage_is_consistent_with_distance(
        a in seq_strategy(),
        b in seq_strategy(),
    ) {
        // A sequence is covered by an ACK exactly when it does not lie
        // strictly ahead of it. The antipodal pair (distance exactly half
        // the sequence space) is ambiguous by construction and excluded.
        prop_assume!(a.distance_to(b).unsigned_abs() != 0x4000_0000);
        prop_assert_eq!(a.covered_by_ack(b), a.distance_to(b) >= 0);
    }
}
