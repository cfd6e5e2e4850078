//! Wire-level types shared by the kinesim engine, protocol server and CLI.
//!
//! Field names follow the Kinesis `Kinesis_20131202` JSON API.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod actions;
pub mod error;
pub mod wire;

pub use actions::*;
pub use error::{ErrorBody, KinesisError, Result};

/// Lifecycle status of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamStatus {
    Creating,
    Active,
    Updating,
    Deleting,
}

impl StreamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "CREATING",
            Self::Active => "ACTIVE",
            Self::Updating => "UPDATING",
            Self::Deleting => "DELETING",
        }
    }

    /// Whether records may be written to and read from the stream.
    pub fn accepts_data(&self) -> bool {
        matches!(self, Self::Active | Self::Updating)
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a shard iterator picks its starting position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShardIteratorType {
    AtSequenceNumber,
    AfterSequenceNumber,
    TrimHorizon,
    Latest,
    AtTimestamp,
}

impl ShardIteratorType {
    pub const ALL: [ShardIteratorType; 5] = [
        Self::AtSequenceNumber,
        Self::AfterSequenceNumber,
        Self::TrimHorizon,
        Self::Latest,
        Self::AtTimestamp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AtSequenceNumber => "AT_SEQUENCE_NUMBER",
            Self::AfterSequenceNumber => "AFTER_SEQUENCE_NUMBER",
            Self::TrimHorizon => "TRIM_HORIZON",
            Self::Latest => "LATEST",
            Self::AtTimestamp => "AT_TIMESTAMP",
        }
    }
}

impl FromStr for ShardIteratorType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown shard iterator type: {}", s))
    }
}

impl fmt::Display for ShardIteratorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive range of the 128-bit hash-key space owned by a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HashKeyRange {
    #[serde(with = "wire::decimal")]
    pub starting_hash_key: u128,
    #[serde(with = "wire::decimal")]
    pub ending_hash_key: u128,
}

/// Sequence numbers covered by a shard; the end is only set once the shard is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SequenceNumberRange {
    pub starting_sequence_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ending_sequence_number: Option<String>,
}

/// A shard as reported by DescribeStream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Shard {
    pub shard_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_shard_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adjacent_parent_shard_id: Option<String>,
    pub hash_key_range: HashKeyRange,
    pub sequence_number_range: SequenceNumberRange,
}

impl Shard {
    pub fn is_open(&self) -> bool {
        self.sequence_number_range.ending_sequence_number.is_none()
    }
}

/// Stream metadata plus one page of shards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StreamDescription {
    pub stream_name: String,
    #[serde(rename = "StreamARN")]
    pub stream_arn: String,
    pub stream_status: StreamStatus,
    pub retention_period_hours: u32,
    #[serde(with = "wire::epoch_seconds")]
    pub stream_creation_timestamp: DateTime<Utc>,
    pub shards: Vec<Shard>,
    pub has_more_shards: bool,
    pub encryption_type: String,
}

/// A record as returned by GetRecords.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Record {
    pub sequence_number: String,
    #[serde(with = "wire::epoch_seconds")]
    pub approximate_arrival_timestamp: DateTime<Utc>,
    #[serde(with = "wire::blob")]
    pub data: Vec<u8>,
    pub partition_key: String,
}

/// A stream tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&StreamStatus::Creating).unwrap(),
            "\"CREATING\""
        );
        assert!(StreamStatus::Updating.accepts_data());
        assert!(!StreamStatus::Deleting.accepts_data());
    }

    #[test]
    fn test_iterator_type_parse() {
        assert_eq!(
            "AFTER_SEQUENCE_NUMBER".parse::<ShardIteratorType>(),
            Ok(ShardIteratorType::AfterSequenceNumber)
        );
        assert!("OLDEST".parse::<ShardIteratorType>().is_err());
        let json: ShardIteratorType = serde_json::from_str("\"AT_TIMESTAMP\"").unwrap();
        assert_eq!(json, ShardIteratorType::AtTimestamp);
    }

    #[test]
    fn test_shard_serialization() {
        let shard = Shard {
            shard_id: "shardId-000000000001".to_string(),
            parent_shard_id: Some("shardId-000000000000".to_string()),
            adjacent_parent_shard_id: None,
            hash_key_range: HashKeyRange {
                starting_hash_key: 0,
                ending_hash_key: 170141183460469231731687303715884105727,
            },
            sequence_number_range: SequenceNumberRange {
                starting_sequence_number: "1".to_string(),
                ending_sequence_number: None,
            },
        };
        let json = serde_json::to_value(&shard).unwrap();
        assert_eq!(json["ParentShardId"], "shardId-000000000000");
        assert!(json.get("AdjacentParentShardId").is_none());
        assert_eq!(
            json["HashKeyRange"]["EndingHashKey"],
            "170141183460469231731687303715884105727"
        );
        assert!(shard.is_open());
    }
}
