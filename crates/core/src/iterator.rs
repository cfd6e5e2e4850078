//! Shard iterator tokens.
//!
//! A token is base64 of a 16-byte checksum followed by the JSON cursor. The
//! checksum is a SHA-256 over a per-registry secret and the cursor, so tokens
//! from another registry, or edited by hand, are rejected.

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use kinesim_types::{KinesisError, Result, ShardIteratorType};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::log::RecordLog;
use crate::sequence::SequenceNumber;

const CHECKSUM_LEN: usize = 16;

/// Where an iterator resumes reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IteratorCursor {
    #[serde(rename = "s")]
    pub stream_name: String,
    #[serde(rename = "i")]
    pub incarnation: u64,
    #[serde(rename = "h")]
    pub shard_index: u32,
    #[serde(rename = "p")]
    pub position: u64,
    #[serde(rename = "t")]
    pub issued_at_ms: i64,
}

/// Signs and verifies iterator tokens.
#[derive(Debug, Clone)]
pub struct IteratorCodec {
    secret: [u8; 16],
}

impl IteratorCodec {
    pub fn new() -> Self {
        Self::with_secret(*Uuid::new_v4().as_bytes())
    }

    pub fn with_secret(secret: [u8; 16]) -> Self {
        Self { secret }
    }

    pub fn encode(&self, cursor: &IteratorCursor) -> String {
        // A struct of strings and integers always serializes
        let payload = serde_json::to_vec(cursor).unwrap_or_default();
        let mut token = Vec::with_capacity(CHECKSUM_LEN + payload.len());
        token.extend_from_slice(&self.checksum(&payload));
        token.extend_from_slice(&payload);
        STANDARD.encode(token)
    }

    pub fn decode(&self, token: &str) -> Result<IteratorCursor> {
        let invalid = || KinesisError::invalid_argument("Invalid ShardIterator.");

        let bytes = STANDARD.decode(token).map_err(|_| invalid())?;
        if bytes.len() <= CHECKSUM_LEN {
            return Err(invalid());
        }
        let (checksum, payload) = bytes.split_at(CHECKSUM_LEN);
        if checksum != self.checksum(payload) {
            return Err(invalid());
        }
        serde_json::from_slice(payload).map_err(|_| invalid())
    }

    fn checksum(&self, payload: &[u8]) -> [u8; CHECKSUM_LEN] {
        let digest = Sha256::new()
            .chain_update(self.secret)
            .chain_update(payload)
            .finalize();
        let mut out = [0u8; CHECKSUM_LEN];
        out.copy_from_slice(&digest[..CHECKSUM_LEN]);
        out
    }
}

impl Default for IteratorCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// A validated GetShardIterator request, before it is pinned to a log position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartingPosition {
    AtSequence(SequenceNumber),
    AfterSequence(SequenceNumber),
    TrimHorizon,
    Latest,
    AtTimestamp(DateTime<Utc>),
}

impl StartingPosition {
    pub fn from_request(
        kind: ShardIteratorType,
        sequence_number: Option<&str>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let sequence = |seq: &str| {
            seq.parse::<SequenceNumber>().map_err(|_| {
                KinesisError::invalid_argument(format!(
                    "StartingSequenceNumber {} used in GetShardIterator is invalid.",
                    seq
                ))
            })
        };

        match (kind, sequence_number, timestamp) {
            (ShardIteratorType::AtSequenceNumber, Some(seq), None) => {
                Ok(Self::AtSequence(sequence(seq)?))
            }
            (ShardIteratorType::AfterSequenceNumber, Some(seq), None) => {
                Ok(Self::AfterSequence(sequence(seq)?))
            }
            (ShardIteratorType::TrimHorizon, None, None) => Ok(Self::TrimHorizon),
            (ShardIteratorType::Latest, None, None) => Ok(Self::Latest),
            (ShardIteratorType::AtTimestamp, None, Some(at)) => Ok(Self::AtTimestamp(at)),
            (ShardIteratorType::AtTimestamp, _, None) => Err(KinesisError::invalid_argument(
                "Must specify timestampInMillis parameter for iterator of type AT_TIMESTAMP. \
                 Current request has no timestamp parameter.",
            )),
            (kind, _, Some(_)) => Err(KinesisError::invalid_argument(format!(
                "Must specify timestampInMillis parameter only for iterator of type AT_TIMESTAMP. \
                 Current request has {} iterator type.",
                kind
            ))),
            (kind, seq, None) => Err(KinesisError::invalid_argument(format!(
                "Must either specify (1) AT_SEQUENCE_NUMBER or AFTER_SEQUENCE_NUMBER and \
                 StartingSequenceNumber or (2) TRIM_HORIZON or LATEST and no \
                 StartingSequenceNumber. Request specified {} and {}StartingSequenceNumber.",
                kind,
                if seq.is_some() { "a " } else { "no " }
            ))),
        }
    }

    /// Pin to a log position. `None` means the sequence number was not issued by this log.
    pub fn resolve(&self, log: &RecordLog, cutoff: DateTime<Utc>) -> Option<u64> {
        match *self {
            Self::AtSequence(seq) => log.position_of(seq),
            Self::AfterSequence(seq) => log.position_of(seq).map(|p| p + 1),
            Self::TrimHorizon => Some(log.trim_horizon(cutoff)),
            Self::Latest => Some(log.tail()),
            Self::AtTimestamp(at) => Some(log.position_at_timestamp(at, cutoff)),
        }
    }
}
