//! SRTLA Wire Protocol
//!
//! This crate implements the framing layer shared by an SRTLA sender and
//! receiver: classification of incoming datagrams, builders for the
//! registration handshake (REG1/REG2) and keepalives, and parsers for the
//! few SRT header fragments the link aggregator has to inspect (data
//! sequence numbers, cumulative ACKs and NAK loss lists).
//!
//! The codec is stateless; every function operates on a byte slice.

pub mod packet;
pub mod sequence;

pub use packet::{
    build_keepalive, build_reg1, build_reg2, build_srtla_ack, build_srtla_data, classify,
    parse_reg2_id, parse_srtla_ack, parse_srtla_data, srt_ack_number, srt_nak_sequences,
    srt_sequence, PacketError, PacketKind, SrtlaData, KEEPALIVE_PACKET_LEN, REG_PACKET_LEN,
    SRTLA_ACK_PACKET_LEN, SRTLA_ACK_SEQ_COUNT, SRTLA_ID_LEN,
};
pub use sequence::SeqNumber;
