//! The stream aggregate: metadata, tags and the shard lineage arena.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use kinesim_types::{
    KinesisError, ListTagsForStreamOutput, Result, StreamDescription, StreamStatus, Tag,
};
use tracing::debug;

use crate::partition::{KeyRange, covers_key_space, even_ranges};
use crate::sequence::SequenceNumber;
use crate::shard::{Shard, format_shard_id, parse_shard_id};

pub const DEFAULT_RETENTION_HOURS: u32 = 24;
pub const MIN_RETENTION_HOURS: u32 = 24;
pub const MAX_RETENTION_HOURS: u32 = 168;
pub const MAX_TAGS: usize = 10;

#[derive(Debug)]
pub struct Stream {
    pub name: String,
    pub arn: String,
    pub account_id: String,
    /// Distinguishes this stream from earlier streams with the same name
    pub incarnation: u64,
    pub status: StreamStatus,
    pub retention_hours: u32,
    pub created_at: DateTime<Utc>,
    pub tags: BTreeMap<String, String>,
    /// Indexed by shard number
    shards: Vec<Shard>,
}

impl Stream {
    pub fn new(
        name: String,
        account_id: String,
        region: &str,
        incarnation: u64,
        shard_count: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let shards = even_ranges(shard_count)
            .into_iter()
            .enumerate()
            .map(|(index, range)| Shard::new(index as u32, range, now, incarnation))
            .collect();

        Self {
            arn: format!("arn:aws:kinesis:{}:{}:stream/{}", region, account_id, name),
            name,
            account_id,
            incarnation,
            status: StreamStatus::Creating,
            retention_hours: DEFAULT_RETENTION_HOURS,
            created_at: now,
            tags: BTreeMap::new(),
            shards,
        }
    }

    pub fn shards(&self) -> &[Shard] {
        &self.shards
    }

    pub fn open_shard_count(&self) -> usize {
        self.shards.iter().filter(|s| s.is_open()).count()
    }

    pub fn open_ranges(&self) -> Vec<KeyRange> {
        self.shards
            .iter()
            .filter(|s| s.is_open())
            .map(|s| s.range)
            .collect()
    }

    /// Records that arrived before this instant are outside the retention window.
    pub fn retention_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::hours(self.retention_hours as i64)
    }

    pub fn shard(&self, index: u32) -> Option<&Shard> {
        self.shards.get(index as usize)
    }

    /// Look up a shard by id, failing with the service's not-found message.
    pub fn find_shard(&self, shard_id: &str) -> Result<&Shard> {
        parse_shard_id(shard_id)
            .and_then(|index| self.shard(index))
            .ok_or_else(|| {
                KinesisError::resource_not_found(format!(
                    "Could not find shard {} in stream {} under account {}.",
                    shard_id, self.name, self.account_id
                ))
            })
    }

    /// The open shard owning `hash_key`.
    pub fn route(&self, hash_key: u128) -> Option<&Shard> {
        self.shards
            .iter()
            .find(|s| s.is_open() && s.range.contains(hash_key))
    }

    /// Append to the open shard owning `hash_key`. Needs only a shared borrow:
    /// the shard's own log lock serializes writers.
    pub fn append(
        &self,
        hash_key: u128,
        partition_key: String,
        data: Bytes,
        now: DateTime<Utc>,
    ) -> Result<(u32, SequenceNumber)> {
        let shard = self.route(hash_key).ok_or_else(|| {
            KinesisError::invalid_argument(format!(
                "No open shard in stream {} owns hash key {}",
                self.name, hash_key
            ))
        })?;
        let cutoff = self.retention_cutoff(now);
        let sequence = shard.log.write().append(partition_key, data, now, cutoff);
        debug!(stream = %self.name, shard = shard.index, sequence = %sequence, "Appended record");
        Ok((shard.index, sequence))
    }

    /// Close `index` and open two children split at `new_starting_key`.
    pub fn split(
        &mut self,
        index: u32,
        new_starting_key: u128,
        now: DateTime<Utc>,
    ) -> Result<(u32, u32)> {
        let target = self.open_target(index, KinesisError::ResourceInUse)?;
        let (low, high) = target.range.split_at(new_starting_key).ok_or_else(|| {
            KinesisError::invalid_argument(format!(
                "NewStartingHashKey {} used in SplitShard() on shard {} in stream {} under \
                 account {} is not both greater than the shard's StartingHashKey {} and no \
                 greater than the shard's EndingHashKey {}.",
                new_starting_key,
                target.shard_id(),
                self.name,
                self.account_id,
                target.range.start,
                target.range.end
            ))
        })?;

        let low_index = self.next_index();
        let high_index = low_index + 1;
        self.shards[index as usize].close();
        self.shards
            .push(Shard::new(low_index, low, now, self.incarnation).with_parents(index, None));
        self.shards
            .push(Shard::new(high_index, high, now, self.incarnation).with_parents(index, None));

        assert!(
            covers_key_space(&self.open_ranges()),
            "open shards of stream {} no longer cover the hash key space after a split",
            self.name
        );
        Ok((low_index, high_index))
    }

    /// Close two adjacent open shards and open one covering both ranges.
    pub fn merge(&mut self, index: u32, adjacent: u32, now: DateTime<Utc>) -> Result<u32> {
        let first = self.open_target(index, KinesisError::InvalidArgument)?.range;
        let second = self.open_target(adjacent, KinesisError::InvalidArgument)?.range;

        if index == adjacent || !first.is_adjacent_to(&second) {
            return Err(KinesisError::invalid_argument(format!(
                "Shards {} and {} in stream {} under account {} are not an adjacent pair of \
                 shards eligible for merging",
                format_shard_id(index),
                format_shard_id(adjacent),
                self.name,
                self.account_id
            )));
        }

        let merged_index = self.next_index();
        self.shards[index as usize].close();
        self.shards[adjacent as usize].close();
        self.shards.push(
            Shard::new(merged_index, first.union(&second), now, self.incarnation)
                .with_parents(index, Some(adjacent)),
        );

        assert!(
            covers_key_space(&self.open_ranges()),
            "open shards of stream {} no longer cover the hash key space after a merge",
            self.name
        );
        Ok(merged_index)
    }

    /// One page of the stream's description. A deleting stream reports no shards.
    pub fn describe(
        &self,
        exclusive_start_shard_id: Option<&str>,
        limit: usize,
    ) -> StreamDescription {
        let mut shards = Vec::new();
        let mut has_more_shards = false;

        if self.status != StreamStatus::Deleting {
            let mut page = self
                .shards
                .iter()
                .map(Shard::describe)
                .filter(|s| exclusive_start_shard_id.is_none_or(|start| s.shard_id.as_str() > start));
            shards.extend(page.by_ref().take(limit));
            has_more_shards = page.next().is_some();
        }

        StreamDescription {
            stream_name: self.name.clone(),
            stream_arn: self.arn.clone(),
            stream_status: self.status,
            retention_period_hours: self.retention_hours,
            stream_creation_timestamp: self.created_at,
            shards,
            has_more_shards,
            encryption_type: "NONE".to_string(),
        }
    }

    pub fn add_tags(&mut self, tags: BTreeMap<String, String>) -> Result<()> {
        let added = tags.keys().filter(|k| !self.tags.contains_key(*k)).count();
        if self.tags.len() + added > MAX_TAGS {
            return Err(KinesisError::limit_exceeded(format!(
                "Failed to add tags to stream {} under account {} because a given stream cannot \
                 have more than {} tags associated with it.",
                self.name, self.account_id, MAX_TAGS
            )));
        }
        self.tags.extend(tags);
        Ok(())
    }

    pub fn remove_tags(&mut self, keys: &[String]) {
        for key in keys {
            self.tags.remove(key);
        }
    }

    pub fn list_tags(&self, exclusive_start_key: Option<&str>, limit: usize) -> ListTagsForStreamOutput {
        let mut page = self
            .tags
            .iter()
            .filter(|(key, _)| exclusive_start_key.is_none_or(|start| key.as_str() > start))
            .map(|(key, value)| Tag {
                key: key.clone(),
                value: Some(value.clone()),
            });
        let tags: Vec<Tag> = page.by_ref().take(limit).collect();
        let has_more_tags = page.next().is_some();

        ListTagsForStreamOutput {
            tags,
            has_more_tags,
        }
    }

    /// Change the retention period. `increase` selects which direction is allowed.
    pub fn set_retention(&mut self, hours: u32, increase: bool) -> Result<()> {
        if !(MIN_RETENTION_HOURS..=MAX_RETENTION_HOURS).contains(&hours) {
            let bound = if hours < MIN_RETENTION_HOURS {
                format!("less than the minimum of {} hours", MIN_RETENTION_HOURS)
            } else {
                format!("greater than the maximum of {} hours", MAX_RETENTION_HOURS)
            };
            return Err(KinesisError::invalid_argument(format!(
                "Minimum allowed retention period is {} hours. Maximum allowed retention period \
                 is {} hours. Requested retention period ({} hours) is {}.",
                MIN_RETENTION_HOURS, MAX_RETENTION_HOURS, hours, bound
            )));
        }

        if increase && hours < self.retention_hours {
            return Err(KinesisError::invalid_argument(format!(
                "Requested retention period ({} hours) for stream {} can not be shorter than \
                 existing retention period ({} hours). Use DecreaseRetentionPeriod API.",
                hours, self.name, self.retention_hours
            )));
        }
        if !increase && hours > self.retention_hours {
            return Err(KinesisError::invalid_argument(format!(
                "Requested retention period ({} hours) for stream {} can not be longer than \
                 existing retention period ({} hours). Use IncreaseRetentionPeriod API.",
                hours, self.name, self.retention_hours
            )));
        }

        self.retention_hours = hours;
        Ok(())
    }

    fn next_index(&self) -> u32 {
        self.shards.len() as u32
    }

    /// The shard at `index` if it exists and is open; a closed shard fails with `closed_err`.
    /// Fails with `ResourceInUseException` unless shard `index` can still be split.
    pub fn check_splittable(&self, index: u32) -> Result<()> {
        self.open_target(index, KinesisError::ResourceInUse).map(|_| ())
    }

    fn open_target(&self, index: u32, closed_err: fn(String) -> KinesisError) -> Result<&Shard> {
        let shard = self.find_shard(&format_shard_id(index))?;
        if !shard.is_open() {
            return Err(closed_err(format!(
                "Shard {} in stream {} under account {} has already been merged or split, and \
                 thus is not eligible for merging or splitting.",
                shard.shard_id(),
                self.name,
                self.account_id
            )));
        }
        Ok(shard)
    }
}
