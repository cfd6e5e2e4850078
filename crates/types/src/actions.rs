//! Typed request and response payloads, one pair per supported action.
//!
//! [`Action`] is the closed set of requests the engine understands and
//! [`ActionOutput`] the matching results. Actions whose response body is
//! empty on the wire answer with [`ActionOutput::Empty`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{Record, ShardIteratorType, StreamDescription, Tag, wire};

/// API version prefix of the `X-Amz-Target` header.
pub const API_VERSION: &str = "Kinesis_20131202";

/// Supported action names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    AddTagsToStream,
    CreateStream,
    DecreaseStreamRetentionPeriod,
    DeleteStream,
    DescribeStream,
    GetRecords,
    GetShardIterator,
    IncreaseStreamRetentionPeriod,
    ListStreams,
    ListTagsForStream,
    MergeShards,
    PutRecord,
    PutRecords,
    RemoveTagsFromStream,
    SplitShard,
}

impl Operation {
    pub const ALL: [Operation; 15] = [
        Self::AddTagsToStream,
        Self::CreateStream,
        Self::DecreaseStreamRetentionPeriod,
        Self::DeleteStream,
        Self::DescribeStream,
        Self::GetRecords,
        Self::GetShardIterator,
        Self::IncreaseStreamRetentionPeriod,
        Self::ListStreams,
        Self::ListTagsForStream,
        Self::MergeShards,
        Self::PutRecord,
        Self::PutRecords,
        Self::RemoveTagsFromStream,
        Self::SplitShard,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AddTagsToStream => "AddTagsToStream",
            Self::CreateStream => "CreateStream",
            Self::DecreaseStreamRetentionPeriod => "DecreaseStreamRetentionPeriod",
            Self::DeleteStream => "DeleteStream",
            Self::DescribeStream => "DescribeStream",
            Self::GetRecords => "GetRecords",
            Self::GetShardIterator => "GetShardIterator",
            Self::IncreaseStreamRetentionPeriod => "IncreaseStreamRetentionPeriod",
            Self::ListStreams => "ListStreams",
            Self::ListTagsForStream => "ListTagsForStream",
            Self::MergeShards => "MergeShards",
            Self::PutRecord => "PutRecord",
            Self::PutRecords => "PutRecords",
            Self::RemoveTagsFromStream => "RemoveTagsFromStream",
            Self::SplitShard => "SplitShard",
        }
    }

    /// Parse an `X-Amz-Target` header value such as `Kinesis_20131202.PutRecord`.
    pub fn from_target(target: &str) -> Option<Self> {
        let (version, name) = target.split_once('.')?;
        if version != API_VERSION || name.contains('.') {
            return None;
        }
        name.parse().ok()
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| format!("Unknown operation: {}", s))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateStreamInput {
    pub stream_name: String,
    pub shard_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteStreamInput {
    pub stream_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeStreamInput {
    pub stream_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_start_shard_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeStreamOutput {
    pub stream_description: StreamDescription,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListStreamsInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_start_stream_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListStreamsOutput {
    pub stream_names: Vec<String>,
    pub has_more_streams: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MergeShardsInput {
    pub stream_name: String,
    pub shard_to_merge: String,
    pub adjacent_shard_to_merge: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SplitShardInput {
    pub stream_name: String,
    pub shard_to_split: String,
    /// Decimal string; range checking is the engine's job
    pub new_starting_hash_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutRecordInput {
    pub stream_name: String,
    pub partition_key: String,
    #[serde(with = "wire::blob")]
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit_hash_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number_for_ordering: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutRecordOutput {
    pub shard_id: String,
    pub sequence_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutRecordsEntry {
    pub partition_key: String,
    #[serde(with = "wire::blob")]
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explicit_hash_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutRecordsInput {
    pub stream_name: String,
    pub records: Vec<PutRecordsEntry>,
}

/// Outcome of one entry of a PutRecords batch: either a placement or an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutRecordsResultEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutRecordsOutput {
    pub failed_record_count: u32,
    pub records: Vec<PutRecordsResultEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetShardIteratorInput {
    pub stream_name: String,
    pub shard_id: String,
    pub shard_iterator_type: ShardIteratorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_sequence_number: Option<String>,
    #[serde(
        default,
        with = "wire::epoch_seconds::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetShardIteratorOutput {
    pub shard_iterator: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetRecordsInput {
    pub shard_iterator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetRecordsOutput {
    pub records: Vec<Record>,
    /// Absent once a closed shard has been read to its end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_shard_iterator: Option<String>,
    pub millis_behind_latest: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddTagsToStreamInput {
    pub stream_name: String,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoveTagsFromStreamInput {
    pub stream_name: String,
    pub tag_keys: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListTagsForStreamInput {
    pub stream_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclusive_start_tag_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListTagsForStreamOutput {
    pub tags: Vec<Tag>,
    pub has_more_tags: bool,
}

/// Input of both IncreaseStreamRetentionPeriod and DecreaseStreamRetentionPeriod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StreamRetentionInput {
    pub stream_name: String,
    pub retention_period_hours: u32,
}

/// A fully decoded request, ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    AddTagsToStream(AddTagsToStreamInput),
    CreateStream(CreateStreamInput),
    DecreaseStreamRetentionPeriod(StreamRetentionInput),
    DeleteStream(DeleteStreamInput),
    DescribeStream(DescribeStreamInput),
    GetRecords(GetRecordsInput),
    GetShardIterator(GetShardIteratorInput),
    IncreaseStreamRetentionPeriod(StreamRetentionInput),
    ListStreams(ListStreamsInput),
    ListTagsForStream(ListTagsForStreamInput),
    MergeShards(MergeShardsInput),
    PutRecord(PutRecordInput),
    PutRecords(PutRecordsInput),
    RemoveTagsFromStream(RemoveTagsFromStreamInput),
    SplitShard(SplitShardInput),
}

impl Action {
    /// Decode the JSON body of `operation` into its typed input.
    pub fn from_json(operation: Operation, body: JsonValue) -> serde_json::Result<Self> {
        use serde_json::from_value;

        Ok(match operation {
            Operation::AddTagsToStream => Self::AddTagsToStream(from_value(body)?),
            Operation::CreateStream => Self::CreateStream(from_value(body)?),
            Operation::DecreaseStreamRetentionPeriod => {
                Self::DecreaseStreamRetentionPeriod(from_value(body)?)
            }
            Operation::DeleteStream => Self::DeleteStream(from_value(body)?),
            Operation::DescribeStream => Self::DescribeStream(from_value(body)?),
            Operation::GetRecords => Self::GetRecords(from_value(body)?),
            Operation::GetShardIterator => Self::GetShardIterator(from_value(body)?),
            Operation::IncreaseStreamRetentionPeriod => {
                Self::IncreaseStreamRetentionPeriod(from_value(body)?)
            }
            Operation::ListStreams => Self::ListStreams(from_value(body)?),
            Operation::ListTagsForStream => Self::ListTagsForStream(from_value(body)?),
            Operation::MergeShards => Self::MergeShards(from_value(body)?),
            Operation::PutRecord => Self::PutRecord(from_value(body)?),
            Operation::PutRecords => Self::PutRecords(from_value(body)?),
            Operation::RemoveTagsFromStream => Self::RemoveTagsFromStream(from_value(body)?),
            Operation::SplitShard => Self::SplitShard(from_value(body)?),
        })
    }

    pub fn operation(&self) -> Operation {
        match self {
            Self::AddTagsToStream(_) => Operation::AddTagsToStream,
            Self::CreateStream(_) => Operation::CreateStream,
            Self::DecreaseStreamRetentionPeriod(_) => Operation::DecreaseStreamRetentionPeriod,
            Self::DeleteStream(_) => Operation::DeleteStream,
            Self::DescribeStream(_) => Operation::DescribeStream,
            Self::GetRecords(_) => Operation::GetRecords,
            Self::GetShardIterator(_) => Operation::GetShardIterator,
            Self::IncreaseStreamRetentionPeriod(_) => Operation::IncreaseStreamRetentionPeriod,
            Self::ListStreams(_) => Operation::ListStreams,
            Self::ListTagsForStream(_) => Operation::ListTagsForStream,
            Self::MergeShards(_) => Operation::MergeShards,
            Self::PutRecord(_) => Operation::PutRecord,
            Self::PutRecords(_) => Operation::PutRecords,
            Self::RemoveTagsFromStream(_) => Operation::RemoveTagsFromStream,
            Self::SplitShard(_) => Operation::SplitShard,
        }
    }
}

/// Result of a dispatched [`Action`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ActionOutput {
    /// The action answers with an empty body
    Empty,
    DescribeStream(DescribeStreamOutput),
    GetRecords(GetRecordsOutput),
    GetShardIterator(GetShardIteratorOutput),
    ListStreams(ListStreamsOutput),
    ListTagsForStream(ListTagsForStreamOutput),
    PutRecord(PutRecordOutput),
    PutRecords(PutRecordsOutput),
}

impl ActionOutput {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_operation_from_target() {
        assert_eq!(
            Operation::from_target("Kinesis_20131202.PutRecords"),
            Some(Operation::PutRecords)
        );
        assert_eq!(Operation::from_target("Kinesis_20131202.ListStream"), None);
        assert_eq!(Operation::from_target("Kinesis_20131203.ListStreams"), None);
        assert_eq!(Operation::from_target("ListStreams"), None);
        assert_eq!(Operation::from_target("Kinesis_20131202.A.B"), None);
    }

    #[test]
    fn test_action_from_json() {
        let action = Action::from_json(
            Operation::PutRecord,
            json!({"StreamName": "s", "PartitionKey": "pk", "Data": "AAE="}),
        )
        .unwrap();

        match &action {
            Action::PutRecord(input) => {
                assert_eq!(input.stream_name, "s");
                assert_eq!(input.data, vec![0u8, 1]);
                assert_eq!(input.explicit_hash_key, None);
            }
            other => panic!("unexpected action {:?}", other),
        }
        assert_eq!(action.operation(), Operation::PutRecord);
    }

    #[test]
    fn test_action_from_json_type_mismatch() {
        let result = Action::from_json(Operation::CreateStream, json!({"StreamName": 1}));
        assert!(result.is_err());
    }

    #[test]
    fn test_get_shard_iterator_timestamp() {
        let action = Action::from_json(
            Operation::GetShardIterator,
            json!({
                "StreamName": "s",
                "ShardId": "shardId-000000000000",
                "ShardIteratorType": "AT_TIMESTAMP",
                "Timestamp": 1500000000.5
            }),
        )
        .unwrap();
        let Action::GetShardIterator(input) = action else {
            panic!("expected GetShardIterator");
        };
        assert_eq!(input.timestamp.unwrap().timestamp_millis(), 1_500_000_000_500);
    }

    #[test]
    fn test_empty_output_serializes_to_null() {
        assert!(ActionOutput::Empty.is_empty());
        assert_eq!(serde_json::to_value(ActionOutput::Empty).unwrap(), JsonValue::Null);

        let out = ActionOutput::PutRecord(PutRecordOutput {
            shard_id: "shardId-000000000000".to_string(),
            sequence_number: "1".to_string(),
        });
        assert_eq!(
            serde_json::to_value(out).unwrap(),
            json!({"ShardId": "shardId-000000000000", "SequenceNumber": "1"})
        );
    }
}
