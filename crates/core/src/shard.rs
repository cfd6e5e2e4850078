//! Shards: nodes of a stream's lineage tree, stored in an arena indexed by
//! shard number.

use std::fmt;

use chrono::{DateTime, Utc};
use kinesim_types::{SequenceNumberRange, Shard as ShardDescription};
use parking_lot::RwLock;

use crate::log::RecordLog;
use crate::partition::KeyRange;
use crate::sequence::{SequenceGenerator, SequenceNumber};

const SHARD_ID_PREFIX: &str = "shardId-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardStatus {
    Open,
    Closed,
}

impl fmt::Display for ShardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => f.write_str("OPEN"),
            Self::Closed => f.write_str("CLOSED"),
        }
    }
}

/// `shardId-000000000007` for index 7.
pub fn format_shard_id(index: u32) -> String {
    format!("{}{:012}", SHARD_ID_PREFIX, index)
}

/// Accepts either a full shard id or its bare number.
pub fn parse_shard_id(shard_id: &str) -> Option<u32> {
    let digits = shard_id.strip_prefix(SHARD_ID_PREFIX).unwrap_or(shard_id);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[derive(Debug)]
pub struct Shard {
    pub index: u32,
    pub range: KeyRange,
    pub parent: Option<u32>,
    pub adjacent_parent: Option<u32>,
    pub log: RwLock<RecordLog>,
    /// Set when the shard closes; the last sequence number it will ever hold
    ending_sequence: Option<SequenceNumber>,
}

impl Shard {
    /// A new open shard of the stream incarnation `incarnation`.
    pub fn new(index: u32, range: KeyRange, created_at: DateTime<Utc>, incarnation: u64) -> Self {
        Self {
            index,
            range,
            parent: None,
            adjacent_parent: None,
            log: RwLock::new(RecordLog::new(SequenceGenerator::new(
                created_at,
                incarnation,
                index,
            ))),
            ending_sequence: None,
        }
    }

    pub fn with_parents(mut self, parent: u32, adjacent_parent: Option<u32>) -> Self {
        self.parent = Some(parent);
        self.adjacent_parent = adjacent_parent;
        self
    }

    pub fn shard_id(&self) -> String {
        format_shard_id(self.index)
    }

    pub fn status(&self) -> ShardStatus {
        if self.ending_sequence.is_some() {
            ShardStatus::Closed
        } else {
            ShardStatus::Open
        }
    }

    pub fn is_open(&self) -> bool {
        self.status() == ShardStatus::Open
    }

    /// Stop accepting writes. Closing twice keeps the first ending sequence.
    pub fn close(&mut self) {
        if self.ending_sequence.is_none() {
            self.ending_sequence = Some(self.log.read().last_sequence());
        }
    }

    pub fn describe(&self) -> ShardDescription {
        ShardDescription {
            shard_id: self.shard_id(),
            parent_shard_id: self.parent.map(format_shard_id),
            adjacent_parent_shard_id: self.adjacent_parent.map(format_shard_id),
            hash_key_range: self.range.into(),
            sequence_number_range: SequenceNumberRange {
                starting_sequence_number: self.log.read().starting_sequence().to_string(),
                ending_sequence_number: self.ending_sequence.map(|seq| seq.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn test_shard_id_format_and_parse() {
        assert_eq!(format_shard_id(7), "shardId-000000000007");
        assert_eq!(parse_shard_id("shardId-000000000007"), Some(7));
        assert_eq!(parse_shard_id("12"), Some(12));
        assert_eq!(parse_shard_id("shardId-"), None);
        assert_eq!(parse_shard_id("shard-1"), None);
        assert_eq!(parse_shard_id("shardId-99999999999999"), None);
    }

    #[test]
    fn test_close_records_ending_sequence() {
        let now = Utc::now();
        let mut shard = Shard::new(2, KeyRange::FULL, now, 1).with_parents(0, Some(1));
        let seq = shard
            .log
            .write()
            .append("pk".to_string(), Bytes::from_static(b"x"), now, now);

        assert!(shard.is_open());
        shard.close();
        assert_eq!(shard.status(), ShardStatus::Closed);

        let description = shard.describe();
        assert_eq!(description.shard_id, "shardId-000000000002");
        assert_eq!(description.parent_shard_id.as_deref(), Some("shardId-000000000000"));
        assert_eq!(
            description.adjacent_parent_shard_id.as_deref(),
            Some("shardId-000000000001")
        );
        assert_eq!(
            description.sequence_number_range.ending_sequence_number,
            Some(seq.to_string())
        );
        assert!(!description.is_open());
    }
}
