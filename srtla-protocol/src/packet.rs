//! SRTLA and SRT Packet Framing
//!
//! SRTLA control packets carry a big-endian 16-bit type in their first two
//! bytes (all in the 0x9xxx range). Anything else on the wire is an SRT
//! packet, distinguished by bit 31 of the first 32-bit word: clear for data
//! (the word is the sequence number), set for control (subtype in bits
//! 16–30).
//!
//! Classification is pure and allocation-free. Builders produce the exact
//! on-the-wire frames: REG1/REG2 are 258 bytes, keepalives 10 bytes and
//! SRTLA ACKs 44 bytes.

use crate::sequence::SeqNumber;
use bytes::{Buf, BufMut, BytesMut};
use std::net::Ipv4Addr;
use thiserror::Error;

/// SRTLA control packet types (big-endian u16 prefix).
pub const SRTLA_TYPE_KEEPALIVE: u16 = 0x9000;
pub const SRTLA_TYPE_ACK: u16 = 0x9100;
pub const SRTLA_TYPE_REG1: u16 = 0x9200;
pub const SRTLA_TYPE_REG2: u16 = 0x9201;
pub const SRTLA_TYPE_REG3: u16 = 0x9202;
pub const SRTLA_TYPE_REG_ERR: u16 = 0x9210;
pub const SRTLA_TYPE_REG_NGP: u16 = 0x9211;
pub const SRTLA_TYPE_DATA: u16 = 0x9300;

/// Length of the session id carried by REG1/REG2.
pub const SRTLA_ID_LEN: usize = 256;

/// On-the-wire length of a REG1 or REG2 frame (type + id).
pub const REG_PACKET_LEN: usize = 2 + SRTLA_ID_LEN;

/// On-the-wire length of a keepalive frame (type + 8-byte timestamp).
pub const KEEPALIVE_PACKET_LEN: usize = 10;

/// Number of sequence numbers in one SRTLA ACK frame.
pub const SRTLA_ACK_SEQ_COUNT: usize = 10;

/// On-the-wire length of an SRTLA ACK frame.
pub const SRTLA_ACK_PACKET_LEN: usize = 4 + SRTLA_ACK_SEQ_COUNT * 4;

/// Header length of an SRTLA data frame (type + IPv4 + sequence).
pub const SRTLA_DATA_HEADER_LEN: usize = 2 + 4 + 4;

/// Length of the fixed SRT packet header.
pub const SRT_HEADER_LEN: usize = 16;

/// Upper bound on sequences expanded from one NAK datagram. A malformed
/// loss range could otherwise span the whole 31-bit sequence space.
pub const NAK_EXPANSION_CAP: usize = 1024;

const SRT_CONTROL_FLAG: u32 = 0x8000_0000;
const SRT_SEQ_MASK: u32 = 0x7FFF_FFFF;
const SRT_SUBTYPE_ACK: u16 = 2;
const SRT_SUBTYPE_NAK: u16 = 3;
const SRT_SUBTYPE_SHUTDOWN: u16 = 5;

/// What one received datagram is, as far as the link aggregator cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// SRTLA keepalive (either direction).
    Keepalive,
    /// SRTLA ACK carrying ten acknowledged sequence numbers.
    SrtlaAck,
    /// Registration step 1 (sender → receiver).
    Reg1,
    /// Registration step 2 (either direction).
    Reg2,
    /// Registration confirmed for this path.
    Reg3,
    /// Registration rejected.
    RegErr,
    /// No group available on the receiver.
    RegNgp,
    /// SRT payload framed with a virtual IP and sequence (receiver → sender).
    SrtlaData,
    /// Plain SRT data packet with its sequence number.
    SrtData(SeqNumber),
    /// SRT cumulative ACK.
    SrtAck,
    /// SRT loss report.
    SrtNak,
    /// SRT shutdown.
    SrtShutdown,
    /// Any other SRT control packet.
    SrtControl,
}

/// Framing errors for the structured parsers.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PacketError {
    #[error("datagram too short: expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("unexpected packet type 0x{0:04x}")]
    WrongType(u16),
}

/// Classify a datagram. Returns `None` for fragments too short to carry
/// either an SRTLA type or an SRT header word.
pub fn classify(data: &[u8]) -> Option<PacketKind> {
    if data.len() >= 2 {
        let kind = match u16::from_be_bytes([data[0], data[1]]) {
            SRTLA_TYPE_KEEPALIVE => Some(PacketKind::Keepalive),
            SRTLA_TYPE_ACK => Some(PacketKind::SrtlaAck),
            SRTLA_TYPE_REG1 => Some(PacketKind::Reg1),
            SRTLA_TYPE_REG2 => Some(PacketKind::Reg2),
            SRTLA_TYPE_REG3 => Some(PacketKind::Reg3),
            SRTLA_TYPE_REG_ERR => Some(PacketKind::RegErr),
            SRTLA_TYPE_REG_NGP => Some(PacketKind::RegNgp),
            SRTLA_TYPE_DATA => Some(PacketKind::SrtlaData),
            _ => None,
        };
        if kind.is_some() {
            return kind;
        }
    }

    if data.len() < 4 {
        return None;
    }

    let word = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    if word & SRT_CONTROL_FLAG == 0 {
        return Some(PacketKind::SrtData(SeqNumber::new(word)));
    }

    Some(match ((word >> 16) & 0x7FFF) as u16 {
        SRT_SUBTYPE_ACK => PacketKind::SrtAck,
        SRT_SUBTYPE_NAK => PacketKind::SrtNak,
        SRT_SUBTYPE_SHUTDOWN => PacketKind::SrtShutdown,
        _ => PacketKind::SrtControl,
    })
}

/// Extract the sequence number from an SRT data packet header.
pub fn srt_sequence(data: &[u8]) -> Option<SeqNumber> {
    if data.len() < 4 {
        return None;
    }
    let word = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    if word & SRT_CONTROL_FLAG != 0 {
        return None;
    }
    Some(SeqNumber::new(word & SRT_SEQ_MASK))
}

/// Extract the last-acknowledged sequence number from an SRT ACK packet.
///
/// The control information block begins after the 16-byte SRT header; its
/// first word is the cumulative acknowledgement.
pub fn srt_ack_number(data: &[u8]) -> Option<SeqNumber> {
    if data.len() < SRT_HEADER_LEN + 4 {
        return None;
    }
    let word = u32::from_be_bytes([data[16], data[17], data[18], data[19]]);
    Some(SeqNumber::new(word & SRT_SEQ_MASK))
}

/// Expand the loss list of an SRT NAK packet into individual sequences.
///
/// Each 32-bit word after the 16-byte header is a single lost sequence,
/// unless its bit 31 is set, in which case it opens an inclusive range
/// closed by the following word. Expansion stops at [`NAK_EXPANSION_CAP`]
/// sequences.
pub fn srt_nak_sequences(data: &[u8]) -> Vec<SeqNumber> {
    let mut lost = Vec::new();
    if data.len() < SRT_HEADER_LEN + 4 {
        return lost;
    }

    let mut buf = &data[SRT_HEADER_LEN..];
    while buf.remaining() >= 4 && lost.len() < NAK_EXPANSION_CAP {
        let word = buf.get_u32();
        if word & SRT_CONTROL_FLAG == 0 {
            lost.push(SeqNumber::new(word));
            continue;
        }

        let start = SeqNumber::new(word & SRT_SEQ_MASK);
        if buf.remaining() < 4 {
            // Range opener without a closing word; keep what we have.
            lost.push(start);
            break;
        }
        let end = SeqNumber::new(buf.get_u32() & SRT_SEQ_MASK);

        let mut seq = start;
        loop {
            lost.push(seq);
            if seq == end || lost.len() >= NAK_EXPANSION_CAP {
                break;
            }
            seq = seq.next();
        }
    }

    lost
}

/// Build a REG1 frame carrying the full 256-byte candidate session id.
pub fn build_reg1(session_id: &[u8; SRTLA_ID_LEN]) -> BytesMut {
    build_reg(SRTLA_TYPE_REG1, session_id)
}

/// Build a REG2 frame carrying the committed 256-byte session id.
pub fn build_reg2(session_id: &[u8; SRTLA_ID_LEN]) -> BytesMut {
    build_reg(SRTLA_TYPE_REG2, session_id)
}

fn build_reg(kind: u16, session_id: &[u8; SRTLA_ID_LEN]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(REG_PACKET_LEN);
    buf.put_u16(kind);
    buf.put_slice(session_id);
    buf
}

/// Extract the 256-byte session id from a REG1 or REG2 frame.
pub fn parse_reg2_id(data: &[u8]) -> Result<&[u8; SRTLA_ID_LEN], PacketError> {
    if data.len() < REG_PACKET_LEN {
        return Err(PacketError::Truncated {
            expected: REG_PACKET_LEN,
            actual: data.len(),
        });
    }
    let kind = u16::from_be_bytes([data[0], data[1]]);
    if kind != SRTLA_TYPE_REG1 && kind != SRTLA_TYPE_REG2 {
        return Err(PacketError::WrongType(kind));
    }
    Ok(data[2..2 + SRTLA_ID_LEN].try_into().expect("length checked"))
}

/// Build a keepalive frame. The timestamp is opaque to the peer; the sender
/// uses monotonic milliseconds.
pub fn build_keepalive(now_ms: u64) -> BytesMut {
    let mut buf = BytesMut::with_capacity(KEEPALIVE_PACKET_LEN);
    buf.put_u16(SRTLA_TYPE_KEEPALIVE);
    buf.put_u64(now_ms);
    buf
}

/// Build an SRTLA ACK frame with exactly ten acknowledged sequences.
pub fn build_srtla_ack(seqs: &[SeqNumber; SRTLA_ACK_SEQ_COUNT]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(SRTLA_ACK_PACKET_LEN);
    buf.put_u16(SRTLA_TYPE_ACK);
    buf.put_u16(0);
    for seq in seqs {
        buf.put_u32(seq.as_raw());
    }
    buf
}

/// Parse the ten acknowledged sequences out of an SRTLA ACK frame.
pub fn parse_srtla_ack(data: &[u8]) -> Result<[SeqNumber; SRTLA_ACK_SEQ_COUNT], PacketError> {
    if data.len() < SRTLA_ACK_PACKET_LEN {
        return Err(PacketError::Truncated {
            expected: SRTLA_ACK_PACKET_LEN,
            actual: data.len(),
        });
    }
    let kind = u16::from_be_bytes([data[0], data[1]]);
    if kind != SRTLA_TYPE_ACK {
        return Err(PacketError::WrongType(kind));
    }

    let mut buf = &data[4..];
    let mut seqs = [SeqNumber::new(0); SRTLA_ACK_SEQ_COUNT];
    for slot in seqs.iter_mut() {
        *slot = SeqNumber::new(buf.get_u32());
    }
    Ok(seqs)
}

/// A decoded SRTLA data frame: SRT payload tagged with the path's virtual
/// IP and a link sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SrtlaData<'a> {
    pub virtual_ip: Ipv4Addr,
    pub sequence: SeqNumber,
    pub payload: &'a [u8],
}

/// Build an SRTLA data frame around an SRT packet.
pub fn build_srtla_data(virtual_ip: Ipv4Addr, sequence: SeqNumber, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(SRTLA_DATA_HEADER_LEN + payload.len());
    buf.put_u16(SRTLA_TYPE_DATA);
    buf.put_slice(&virtual_ip.octets());
    buf.put_u32(sequence.as_raw());
    buf.put_slice(payload);
    buf
}

/// Parse an SRTLA data frame, borrowing the embedded SRT payload.
pub fn parse_srtla_data(data: &[u8]) -> Result<SrtlaData<'_>, PacketError> {
    if data.len() < SRTLA_DATA_HEADER_LEN {
        return Err(PacketError::Truncated {
            expected: SRTLA_DATA_HEADER_LEN,
            actual: data.len(),
        });
    }
    let kind = u16::from_be_bytes([data[0], data[1]]);
    if kind != SRTLA_TYPE_DATA {
        return Err(PacketError::WrongType(kind));
    }

    Ok(SrtlaData {
        virtual_ip: Ipv4Addr::new(data[2], data[3], data[4], data[5]),
        sequence: SeqNumber::new(u32::from_be_bytes([data[6], data[7], data[8], data[9]])),
        payload: &data[SRTLA_DATA_HEADER_LEN..],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    fn srt_data_packet(seq: u32, payload_len: usize) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(SRT_HEADER_LEN + payload_len);
        buf.put_u32(seq & SRT_SEQ_MASK);
        buf.put_u32(0); // message number
        buf.put_u32(0); // timestamp
        buf.put_u32(0); // destination socket id
        buf.put_bytes(0xAB, payload_len);
        buf.to_vec()
    }

    fn srt_control_packet(subtype: u16, words: &[u32]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u32(SRT_CONTROL_FLAG | ((subtype as u32) << 16));
        buf.put_u32(0);
        buf.put_u32(0);
        buf.put_u32(0);
        for w in words {
            buf.put_u32(*w);
        }
        buf.to_vec()
    }

    #[test]
    fn classify_srtla_control() {
        assert_eq!(classify(&[0x90, 0x00, 0, 0]), Some(PacketKind::Keepalive));
        assert_eq!(classify(&[0x91, 0x00]), Some(PacketKind::SrtlaAck));
        assert_eq!(classify(&[0x92, 0x00]), Some(PacketKind::Reg1));
        assert_eq!(classify(&[0x92, 0x01]), Some(PacketKind::Reg2));
        assert_eq!(classify(&[0x92, 0x02]), Some(PacketKind::Reg3));
        assert_eq!(classify(&[0x92, 0x10]), Some(PacketKind::RegErr));
        assert_eq!(classify(&[0x92, 0x11]), Some(PacketKind::RegNgp));
        assert_eq!(classify(&[0x93, 0x00]), Some(PacketKind::SrtlaData));
    }

    #[test]
    fn classify_srt_packets() {
        let data = srt_data_packet(12345, 8);
        assert_eq!(classify(&data), Some(PacketKind::SrtData(SeqNumber::new(12345))));

        assert_eq!(classify(&srt_control_packet(2, &[0])), Some(PacketKind::SrtAck));
        assert_eq!(classify(&srt_control_packet(3, &[0])), Some(PacketKind::SrtNak));
        assert_eq!(classify(&srt_control_packet(5, &[])), Some(PacketKind::SrtShutdown));
        assert_eq!(classify(&srt_control_packet(6, &[])), Some(PacketKind::SrtControl));
    }

    #[test]
    fn classify_rejects_fragments() {
        assert_eq!(classify(&[]), None);
        assert_eq!(classify(&[0x12]), None);
        assert_eq!(classify(&[0x00, 0x01, 0x02]), None);
    }

    #[test]
    fn reg_frames_are_258_bytes() {
        let id = [0x5Au8; SRTLA_ID_LEN];
        assert_eq!(build_reg1(&id).len(), REG_PACKET_LEN);
        assert_eq!(build_reg2(&id).len(), REG_PACKET_LEN);

        let reg1 = build_reg1(&id);
        assert_eq!(parse_reg2_id(&reg1).unwrap(), &id);
    }

    #[test]
    fn keepalive_is_10_bytes() {
        let frame = build_keepalive(0x0102_0304_0506_0708);
        assert_eq!(frame.len(), KEEPALIVE_PACKET_LEN);
        assert_eq!(&frame[..2], &[0x90, 0x00]);
        assert_eq!(&frame[2..], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn srtla_ack_is_44_bytes_and_roundtrips() {
        let mut seqs = [SeqNumber::new(0); SRTLA_ACK_SEQ_COUNT];
        for (i, s) in seqs.iter_mut().enumerate() {
            *s = SeqNumber::new(100 + i as u32);
        }
        let frame = build_srtla_ack(&seqs);
        assert_eq!(frame.len(), SRTLA_ACK_PACKET_LEN);
        assert_eq!(parse_srtla_ack(&frame).unwrap(), seqs);
    }

    #[test]
    fn srtla_data_roundtrips() {
        let payload = srt_data_packet(77, 32);
        let frame = build_srtla_data(Ipv4Addr::new(10, 0, 0, 3), SeqNumber::new(77), &payload);
        let decoded = parse_srtla_data(&frame).unwrap();
        assert_eq!(decoded.virtual_ip, Ipv4Addr::new(10, 0, 0, 3));
        assert_eq!(decoded.sequence, SeqNumber::new(77));
        assert_eq!(decoded.payload, &payload[..]);
    }

    #[test]
    fn ack_number_reads_past_header() {
        let packet = srt_control_packet(2, &[4242, 1, 2, 3]);
        assert_eq!(srt_ack_number(&packet), Some(SeqNumber::new(4242)));
        assert_eq!(srt_ack_number(&packet[..12]), None);
    }

    #[test]
    fn nak_singles_and_ranges_expand() {
        // Loss list: single 200, then range 300..=303.
        let packet = srt_control_packet(3, &[200, 300 | SRT_CONTROL_FLAG, 303]);
        let lost = srt_nak_sequences(&packet);
        let raw: Vec<u32> = lost.iter().map(|s| s.as_raw()).collect();
        assert_eq!(raw, vec![200, 300, 301, 302, 303]);
    }

    #[test]
    fn nak_range_across_wrap() {
        let start = crate::sequence::MAX_SEQ_NUMBER - 1;
        let packet = srt_control_packet(3, &[start | SRT_CONTROL_FLAG, 1]);
        let raw: Vec<u32> = srt_nak_sequences(&packet).iter().map(|s| s.as_raw()).collect();
        assert_eq!(raw, vec![start, start + 1, 0, 1]);
    }

    #[test]
    fn nak_expansion_is_capped() {
        // A claimed range covering half the sequence space.
        let packet = srt_control_packet(3, &[SRT_CONTROL_FLAG, 0x3FFF_FFFF]);
        assert_eq!(srt_nak_sequences(&packet).len(), NAK_EXPANSION_CAP);
    }

    #[test]
    fn nak_trailing_opener_kept_as_single() {
        let packet = srt_control_packet(3, &[500 | SRT_CONTROL_FLAG]);
        let raw: Vec<u32> = srt_nak_sequences(&packet).iter().map(|s| s.as_raw()).collect();
        assert_eq!(raw, vec![500]);
    }

    #[test]
    fn sequence_extraction() {
        let data = srt_data_packet(99, 4);
        assert_eq!(srt_sequence(&data), Some(SeqNumber::new(99)));
        let control = srt_control_packet(2, &[0]);
        assert_eq!(srt_sequence(&control), None);
    }
}
