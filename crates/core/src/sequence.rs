//! Per-shard sequence numbers.
//!
//! A sequence number is a 128-bit value written in decimal:
//!
//! ```text
//! | version (4) | shard created, s (36) | incarnation (24) | shard index (24) | counter (40) |
//! ```
//!
//! The high bits are fixed for a shard, so numbers grow strictly with the
//! counter. The stream incarnation and shard index keep numbers of different
//! streams and shards apart, even when they were created in the same instant.
//! Counter 0 is the shard's starting sequence number and is never assigned to
//! a record.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

const VERSION: u128 = 2;
const VERSION_SHIFT: u32 = 124;
const TIME_SHIFT: u32 = 88;
const TIME_BITS: u32 = 36;
const INCARNATION_SHIFT: u32 = 64;
const INCARNATION_BITS: u32 = 24;
const SHARD_SHIFT: u32 = 40;
const SHARD_BITS: u32 = 24;
const COUNTER_BITS: u32 = 40;

/// Largest counter a shard can reach.
pub const MAX_COUNTER: u64 = (1 << COUNTER_BITS) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SequenceNumber(u128);

impl SequenceNumber {
    pub fn new(
        shard_created: DateTime<Utc>,
        incarnation: u64,
        shard_index: u32,
        counter: u64,
    ) -> Self {
        Self(prefix(shard_created, incarnation, shard_index) | (counter & MAX_COUNTER) as u128)
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }

    pub fn counter(&self) -> u64 {
        (self.0 & MAX_COUNTER as u128) as u64
    }

    pub fn shard_index(&self) -> u32 {
        ((self.0 >> SHARD_SHIFT) & mask(SHARD_BITS)) as u32
    }

    fn prefix(&self) -> u128 {
        self.0 & !(MAX_COUNTER as u128)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SequenceNumber {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(format!("Invalid sequence number: {}", s));
        }
        s.parse::<u128>()
            .map(SequenceNumber)
            .map_err(|_| format!("Sequence number out of range: {}", s))
    }
}

fn prefix(shard_created: DateTime<Utc>, incarnation: u64, shard_index: u32) -> u128 {
    let seconds = shard_created.timestamp().max(0) as u128 & mask(TIME_BITS);
    let incarnation = incarnation as u128 & mask(INCARNATION_BITS);
    let shard_index = shard_index as u128 & mask(SHARD_BITS);
    (VERSION << VERSION_SHIFT)
        | (seconds << TIME_SHIFT)
        | (incarnation << INCARNATION_SHIFT)
        | (shard_index << SHARD_SHIFT)
}

const fn mask(bits: u32) -> u128 {
    (1u128 << bits) - 1
}

/// Issues sequence numbers for one shard.
#[derive(Debug, Clone)]
pub struct SequenceGenerator {
    prefix: u128,
    next_counter: u64,
}

impl SequenceGenerator {
    pub fn new(shard_created: DateTime<Utc>, incarnation: u64, shard_index: u32) -> Self {
        Self {
            prefix: prefix(shard_created, incarnation, shard_index),
            next_counter: 1,
        }
    }

    /// The shard's starting sequence number (counter 0).
    pub fn starting(&self) -> SequenceNumber {
        SequenceNumber(self.prefix)
    }

    /// Counter the next record will receive; doubles as the log's tail position.
    pub fn next_counter(&self) -> u64 {
        self.next_counter
    }

    /// The most recently issued number, or the starting number if none was issued.
    pub fn last_issued(&self) -> SequenceNumber {
        SequenceNumber(self.prefix | (self.next_counter - 1) as u128)
    }

    pub fn issue(&mut self) -> SequenceNumber {
        assert!(
            self.next_counter <= MAX_COUNTER,
            "sequence counter exhausted for shard prefix {}",
            self.prefix
        );
        let seq = SequenceNumber(self.prefix | self.next_counter as u128);
        self.next_counter += 1;
        seq
    }

    /// Counter of `seq` if it was issued by this generator (or is the starting number).
    pub fn counter_of(&self, seq: SequenceNumber) -> Option<u64> {
        if seq.prefix() != self.prefix || seq.counter() >= self.next_counter {
            return None;
        }
        Some(seq.counter())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn created() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    #[test]
    fn test_sequence_numbers_strictly_increase() {
        let mut generator = SequenceGenerator::new(created(), 1, 3);
        let start = generator.starting();
        let a = generator.issue();
        let b = generator.issue();
        assert!(start < a && a < b);
        assert_eq!(a.counter(), 1);
        assert_eq!(b.counter(), 2);
        assert_eq!(b.shard_index(), 3);
        assert_eq!(generator.last_issued(), b);
    }

    #[test]
    fn test_shards_do_not_share_numbers() {
        let mut first = SequenceGenerator::new(created(), 1, 0);
        let mut second = SequenceGenerator::new(created(), 1, 1);
        let a = first.issue();
        let b = second.issue();
        assert_ne!(a, b);
        assert_eq!(second.counter_of(a), None);
        assert_eq!(first.counter_of(a), Some(1));
    }

    #[test]
    fn test_counter_of_rejects_future_numbers() {
        let mut generator = SequenceGenerator::new(created(), 1, 0);
        let issued = generator.issue();
        let future = SequenceNumber::new(created(), 1, 0, 5);
        assert_eq!(generator.counter_of(issued), Some(1));
        assert_eq!(generator.counter_of(generator.starting()), Some(0));
        assert_eq!(generator.counter_of(future), None);
    }

    #[test]
    fn test_incarnations_do_not_share_numbers() {
        let mut first = SequenceGenerator::new(created(), 1, 0);
        let mut second = SequenceGenerator::new(created(), 2, 0);
        let a = first.issue();
        let b = second.issue();
        assert_ne!(a, b);
        assert_ne!(first.starting(), second.starting());
        assert_eq!(second.counter_of(a), None);
        assert_eq!(a.shard_index(), b.shard_index());
    }

    #[test]
    fn test_parse_and_display() {
        let seq = SequenceNumber::new(created(), 1, 7, 42);
        let text = seq.to_string();
        assert_eq!(text.parse::<SequenceNumber>(), Ok(seq));
        assert!("".parse::<SequenceNumber>().is_err());
        assert!("-1".parse::<SequenceNumber>().is_err());
        assert!("999999999999999999999999999999999999999999"
            .parse::<SequenceNumber>()
            .is_err());
    }

    #[test]
    fn test_last_issued_without_records_is_starting() {
        let generator = SequenceGenerator::new(created(), 1, 0);
        assert_eq!(generator.last_issued(), generator.starting());
    }
}
