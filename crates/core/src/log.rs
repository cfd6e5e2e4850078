//! Per-shard append-only record log.
//!
//! Positions are sequence counters: the record with counter `n` sits at
//! position `n`, and the tail is the counter the next append will receive.
//! Counters are contiguous, so a position maps straight to a deque index.

use std::collections::VecDeque;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use kinesim_types::Record;

use crate::sequence::{SequenceGenerator, SequenceNumber};

/// Default and maximum number of records returned by one read.
pub const DEFAULT_READ_LIMIT: usize = 10_000;

/// Aggregate payload ceiling of one read.
pub const MAX_READ_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub sequence: SequenceNumber,
    pub partition_key: String,
    pub data: Bytes,
    pub arrived_at: DateTime<Utc>,
}

impl StoredRecord {
    pub fn to_record(&self) -> Record {
        Record {
            sequence_number: self.sequence.to_string(),
            approximate_arrival_timestamp: self.arrived_at,
            data: self.data.to_vec(),
            partition_key: self.partition_key.clone(),
        }
    }
}

/// Records returned by [`RecordLog::read`] and where to resume.
#[derive(Debug, Clone)]
pub struct ReadBatch {
    pub records: Vec<StoredRecord>,
    pub next_position: u64,
    pub millis_behind_latest: u64,
}

#[derive(Debug)]
pub struct RecordLog {
    sequencer: SequenceGenerator,
    records: VecDeque<StoredRecord>,
}

impl RecordLog {
    pub fn new(sequencer: SequenceGenerator) -> Self {
        Self {
            sequencer,
            records: VecDeque::new(),
        }
    }

    pub fn starting_sequence(&self) -> SequenceNumber {
        self.sequencer.starting()
    }

    pub fn last_sequence(&self) -> SequenceNumber {
        self.sequencer.last_issued()
    }

    /// Position the next appended record will occupy.
    pub fn tail(&self) -> u64 {
        self.sequencer.next_counter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Position of `seq` if this log issued it.
    pub fn position_of(&self, seq: SequenceNumber) -> Option<u64> {
        self.sequencer.counter_of(seq)
    }

    /// Append a record, dropping anything older than `cutoff` first.
    ///
    /// Arrival times never go backwards within a log, even if the clock does.
    pub fn append(
        &mut self,
        partition_key: String,
        data: Bytes,
        now: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) -> SequenceNumber {
        self.compact(cutoff);

        let arrived_at = match self.records.back() {
            Some(last) if last.arrived_at > now => last.arrived_at,
            _ => now,
        };
        let sequence = self.sequencer.issue();
        self.records.push_back(StoredRecord {
            sequence,
            partition_key,
            data,
            arrived_at,
        });
        sequence
    }

    /// Physically drop records that arrived before `cutoff`. Returns how many were dropped.
    pub fn compact(&mut self, cutoff: DateTime<Utc>) -> usize {
        let expired = self.first_retained_index(cutoff);
        self.records.drain(..expired);
        expired
    }

    /// Position of the oldest record still inside the retention window.
    pub fn trim_horizon(&self, cutoff: DateTime<Utc>) -> u64 {
        let index = self.first_retained_index(cutoff);
        self.position_at_index(index)
    }

    /// Position of the first retained record that arrived at or after `at`.
    pub fn position_at_timestamp(&self, at: DateTime<Utc>, cutoff: DateTime<Utc>) -> u64 {
        let bound = at.max(cutoff);
        let index = self.records.partition_point(|r| r.arrived_at < bound);
        self.position_at_index(index)
    }

    /// Read up to `limit` retained records at or after `from`.
    ///
    /// The first matching record is always returned; later ones stop the batch
    /// once the aggregate payload would pass [`MAX_READ_BYTES`].
    pub fn read(
        &self,
        from: u64,
        limit: usize,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ReadBatch {
        let start = self
            .index_of(from)
            .max(self.first_retained_index(cutoff));

        let mut records = Vec::new();
        let mut bytes = 0usize;
        for record in self.records.iter().skip(start).take(limit) {
            let size = record.data.len() + record.partition_key.len();
            if !records.is_empty() && bytes + size > MAX_READ_BYTES {
                break;
            }
            bytes += size;
            records.push(record.clone());
        }

        let next_position = match records.last() {
            Some(last) => last.sequence.counter() + 1,
            None => self.tail(),
        };
        let millis_behind_latest = self
            .records
            .get(self.index_of(next_position))
            .map(|pending| (now - pending.arrived_at).num_milliseconds().max(0) as u64)
            .unwrap_or(0);

        ReadBatch {
            records,
            next_position,
            millis_behind_latest,
        }
    }

    fn first_retained_index(&self, cutoff: DateTime<Utc>) -> usize {
        self.records.partition_point(|r| r.arrived_at < cutoff)
    }

    fn head_position(&self) -> u64 {
        self.records
            .front()
            .map(|r| r.sequence.counter())
            .unwrap_or_else(|| self.tail())
    }

    fn index_of(&self, position: u64) -> usize {
        position.saturating_sub(self.head_position()) as usize
    }

    fn position_at_index(&self, index: usize) -> u64 {
        self.records
            .get(index)
            .map(|r| r.sequence.counter())
            .unwrap_or_else(|| self.tail())
    }
}
