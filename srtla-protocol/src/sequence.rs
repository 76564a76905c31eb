//! SRT Sequence Numbers
//!
//! SRT data packets carry a 31-bit sequence number (bit 31 of the first
//! header word is the control flag). Sequence arithmetic has to survive
//! wraparound: a cumulative ACK of 3 may cover a packet numbered
//! 0x7FFF_FFF0. Comparisons therefore use the signed distance between two
//! values rather than their raw ordering.

use std::fmt;
use std::ops::Add;

/// Largest representable sequence number (31 bits).
pub const MAX_SEQ_NUMBER: u32 = 0x7FFF_FFFF;

/// A 31-bit SRT sequence number with wraparound-aware comparison.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct SeqNumber(u32);

impl SeqNumber {
    /// Wrap a raw value into the 31-bit sequence space.
    #[inline]
    pub fn new(value: u32) -> Self {
        SeqNumber(value & MAX_SEQ_NUMBER)
    }

    #[inline]
    pub fn as_raw(self) -> u32 {
        self.0
    }

    /// The sequence number following this one.
    #[inline]
    pub fn next(self) -> Self {
        SeqNumber(self.0.wrapping_add(1) & MAX_SEQ_NUMBER)
    }

    /// Signed distance from `self` to `other`.
    ///
    /// Positive when `other` lies ahead of `self`, negative when behind.
    /// A gap wider than half the sequence space is interpreted as having
    /// wrapped.
    pub fn distance_to(self, other: SeqNumber) -> i32 {
        const HALF: i64 = (MAX_SEQ_NUMBER as i64 + 1) / 2;
        const SPACE: i64 = MAX_SEQ_NUMBER as i64 + 1;

        let diff = (other.0 as i64) - (self.0 as i64);
        if diff > HALF {
            (diff - SPACE) as i32
        } else if diff < -HALF {
            (diff + SPACE) as i32
        } else {
            diff as i32
        }
    }

    /// Whether a cumulative SRT ACK for `ack` covers this sequence number.
    ///
    /// The difference `ack − self` is taken modulo 2³¹ and interpreted as a
    /// signed 31-bit value; the ACK covers every sequence for which it is
    /// non-negative. This holds across the wrap boundary: an ACK of 0
    /// acknowledges sequences just below `MAX_SEQ_NUMBER`.
    #[inline]
    pub fn covered_by_ack(self, ack: SeqNumber) -> bool {
        (ack.0.wrapping_sub(self.0) & MAX_SEQ_NUMBER) < 0x4000_0000
    }

    /// Whether this sequence number precedes `other` in stream order.
    #[inline]
    pub fn precedes(self, other: SeqNumber) -> bool {
        self.distance_to(other) > 0
    }
}

impl fmt::Debug for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeqNumber({})", self.0)
    }
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SeqNumber {
    fn from(value: u32) -> Self {
        SeqNumber::new(value)
    }
}

impl From<SeqNumber> for u32 {
    fn from(seq: SeqNumber) -> u32 {
        seq.0
    }
}

impl Add<u32> for SeqNumber {
    type Output = SeqNumber;

    fn add(self, rhs: u32) -> SeqNumber {
        SeqNumber::new(self.0.wrapping_add(rhs))
    }
}
