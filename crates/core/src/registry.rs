//! The stream registry: one public operation per supported action.
//!
//! Lock order is registry map, then stream, then shard log. The scheduler
//! queue is only ever locked on its own.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use kinesim_types::{
    Action, ActionOutput, AddTagsToStreamInput, CreateStreamInput, DeleteStreamInput,
    DescribeStreamInput, DescribeStreamOutput, GetRecordsInput, GetRecordsOutput,
    GetShardIteratorInput, GetShardIteratorOutput, KinesisError, ListStreamsInput,
    ListStreamsOutput, ListTagsForStreamInput, ListTagsForStreamOutput, MergeShardsInput,
    PutRecordInput, PutRecordOutput, PutRecordsInput, PutRecordsOutput, PutRecordsResultEntry,
    RemoveTagsFromStreamInput, Result, SplitShardInput, StreamRetentionInput, StreamStatus,
};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, RegistryConfig};
use crate::iterator::{IteratorCodec, IteratorCursor, StartingPosition};
use crate::log::DEFAULT_READ_LIMIT;
use crate::partition::{hash_partition_key, parse_hash_key};
use crate::scheduler::{Deferred, StatusScheduler, Transition};
use crate::sequence::SequenceNumber;
use crate::shard::format_shard_id;
use crate::stream::Stream;

pub const DEFAULT_LIST_STREAMS_LIMIT: u32 = 100;
pub const DEFAULT_DESCRIBE_LIMIT: u32 = 100;
pub const DEFAULT_LIST_TAGS_LIMIT: u32 = 10;

/// Largest record payload accepted by PutRecord and PutRecords.
pub const MAX_RECORD_BYTES: usize = 1024 * 1024;

type StreamHandle = Arc<RwLock<Stream>>;

/// In-memory registry of streams.
pub struct StreamRegistry {
    config: RegistryConfig,
    clock: Arc<dyn Clock>,
    /// Streams indexed by name
    streams: RwLock<HashMap<String, StreamHandle>>,
    scheduler: Mutex<StatusScheduler>,
    codec: IteratorCodec,
    next_incarnation: AtomicU64,
    /// Open shards across all non-deleting streams
    open_shards: AtomicU32,
    shutdown_tx: broadcast::Sender<()>,
}

impl StreamRegistry {
    /// Create a registry driven by the system clock.
    pub fn new(config: RegistryConfig) -> std::result::Result<Arc<Self>, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: RegistryConfig,
        clock: Arc<dyn Clock>,
    ) -> std::result::Result<Arc<Self>, ConfigError> {
        config.validate()?;
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Arc::new(Self {
            config,
            clock,
            streams: RwLock::new(HashMap::new()),
            scheduler: Mutex::new(StatusScheduler::new()),
            codec: IteratorCodec::new(),
            next_incarnation: AtomicU64::new(1),
            open_shards: AtomicU32::new(0),
            shutdown_tx,
        }))
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Run one decoded request.
    pub fn dispatch(&self, action: Action) -> Result<ActionOutput> {
        match action {
            Action::AddTagsToStream(input) => {
                self.add_tags_to_stream(input).map(|_| ActionOutput::Empty)
            }
            Action::CreateStream(input) => self.create_stream(input).map(|_| ActionOutput::Empty),
            Action::DecreaseStreamRetentionPeriod(input) => self
                .decrease_stream_retention_period(input)
                .map(|_| ActionOutput::Empty),
            Action::DeleteStream(input) => self.delete_stream(input).map(|_| ActionOutput::Empty),
            Action::DescribeStream(input) => {
                self.describe_stream(input).map(ActionOutput::DescribeStream)
            }
            Action::GetRecords(input) => self.get_records(input).map(ActionOutput::GetRecords),
            Action::GetShardIterator(input) => self
                .get_shard_iterator(input)
                .map(ActionOutput::GetShardIterator),
            Action::IncreaseStreamRetentionPeriod(input) => self
                .increase_stream_retention_period(input)
                .map(|_| ActionOutput::Empty),
            Action::ListStreams(input) => self.list_streams(input).map(ActionOutput::ListStreams),
            Action::ListTagsForStream(input) => self
                .list_tags_for_stream(input)
                .map(ActionOutput::ListTagsForStream),
            Action::MergeShards(input) => self.merge_shards(input).map(|_| ActionOutput::Empty),
            Action::PutRecord(input) => self.put_record(input).map(ActionOutput::PutRecord),
            Action::PutRecords(input) => self.put_records(input).map(ActionOutput::PutRecords),
            Action::RemoveTagsFromStream(input) => self
                .remove_tags_from_stream(input)
                .map(|_| ActionOutput::Empty),
            Action::SplitShard(input) => self.split_shard(input).map(|_| ActionOutput::Empty),
        }
    }

    // Control plane

    pub fn create_stream(&self, input: CreateStreamInput) -> Result<()> {
        self.tick();
        let CreateStreamInput {
            stream_name,
            shard_count,
        } = input;

        if shard_count == 0 {
            return Err(KinesisError::limit_exceeded(
                "A stream must have at least one shard.",
            ));
        }

        let mut streams = self.streams.write();
        if streams.contains_key(&stream_name) {
            return Err(KinesisError::resource_in_use(format!(
                "Stream {} under account {} already exists.",
                stream_name, self.config.account_id
            )));
        }
        if streams.len() >= self.config.stream_limit as usize {
            return Err(KinesisError::limit_exceeded(format!(
                "This request would exceed the stream limit for the account {} in {}. Limit: {}.",
                self.config.account_id, self.config.region, self.config.stream_limit
            )));
        }
        self.reserve_shards(shard_count)?;

        let now = self.clock.now();
        let incarnation = self.next_incarnation.fetch_add(1, Ordering::Relaxed);
        let stream = Stream::new(
            stream_name.clone(),
            self.config.account_id.clone(),
            &self.config.region,
            incarnation,
            shard_count,
            now,
        );
        streams.insert(stream_name.clone(), Arc::new(RwLock::new(stream)));
        drop(streams);

        self.schedule(
            self.config.create_stream_ms,
            &stream_name,
            incarnation,
            Transition::Activate {
                from: StreamStatus::Creating,
            },
        );
        info!(stream = %stream_name, shards = shard_count, "Created stream");
        Ok(())
    }

    pub fn delete_stream(&self, input: DeleteStreamInput) -> Result<()> {
        self.tick();
        let handle = self.get_stream(&input.stream_name)?;
        let mut stream = handle.write();

        if stream.status == StreamStatus::Deleting {
            return Err(KinesisError::resource_in_use(format!(
                "Stream {} under account {} is already being deleted.",
                stream.name, stream.account_id
            )));
        }

        stream.status = StreamStatus::Deleting;
        self.release_shards(stream.open_shard_count() as u32);
        self.schedule(
            self.config.delete_stream_ms,
            &stream.name,
            stream.incarnation,
            Transition::Remove,
        );
        info!(stream = %stream.name, "Deleting stream");
        Ok(())
    }

    pub fn describe_stream(&self, input: DescribeStreamInput) -> Result<DescribeStreamOutput> {
        self.tick();
        let handle = self.get_stream(&input.stream_name)?;
        let stream = handle.read();
        let limit = input.limit.unwrap_or(DEFAULT_DESCRIBE_LIMIT) as usize;

        Ok(DescribeStreamOutput {
            stream_description: stream.describe(input.exclusive_start_shard_id.as_deref(), limit),
        })
    }

    pub fn list_streams(&self, input: ListStreamsInput) -> Result<ListStreamsOutput> {
        self.tick();
        let mut names: Vec<String> = {
            let streams = self.streams.read();
            streams
                .keys()
                .filter(|name| {
                    input
                        .exclusive_start_stream_name
                        .as_deref()
                        .is_none_or(|start| name.as_str() > start)
                })
                .cloned()
                .collect()
        };
        names.sort();

        let limit = input.limit.unwrap_or(DEFAULT_LIST_STREAMS_LIMIT) as usize;
        let has_more_streams = names.len() > limit;
        names.truncate(limit);

        Ok(ListStreamsOutput {
            stream_names: names,
            has_more_streams,
        })
    }

    pub fn split_shard(&self, input: SplitShardInput) -> Result<()> {
        self.tick();
        let handle = self.get_stream(&input.stream_name)?;
        let mut stream = handle.write();
        self.require_active(&stream)?;

        let target = stream.find_shard(&input.shard_to_split)?.index;
        let key = parse_hash_key(&input.new_starting_hash_key).ok_or_else(|| {
            KinesisError::invalid_argument(format!(
                "NewStartingHashKey {} used in SplitShard() on shard {} in stream {} under \
                 account {} is not a valid hash key.",
                input.new_starting_hash_key,
                format_shard_id(target),
                stream.name,
                stream.account_id
            ))
        })?;

        stream.check_splittable(target)?;
        self.reserve_shards(1)?;
        let now = self.clock.now();
        let (low, high) = match stream.split(target, key, now) {
            Ok(children) => children,
            Err(err) => {
                self.release_shards(1);
                return Err(err);
            }
        };

        self.begin_update(&mut stream);
        info!(
            stream = %stream.name,
            parent = %format_shard_id(target),
            low = %format_shard_id(low),
            high = %format_shard_id(high),
            "Split shard"
        );
        Ok(())
    }

    pub fn merge_shards(&self, input: MergeShardsInput) -> Result<()> {
        self.tick();
        let handle = self.get_stream(&input.stream_name)?;
        let mut stream = handle.write();
        self.require_active(&stream)?;

        let first = stream.find_shard(&input.shard_to_merge)?.index;
        let second = stream.find_shard(&input.adjacent_shard_to_merge)?.index;
        let merged = stream.merge(first, second, self.clock.now())?;
        self.release_shards(1);

        self.begin_update(&mut stream);
        info!(
            stream = %stream.name,
            shard = %format_shard_id(first),
            adjacent = %format_shard_id(second),
            merged = %format_shard_id(merged),
            "Merged shards"
        );
        Ok(())
    }

    pub fn add_tags_to_stream(&self, input: AddTagsToStreamInput) -> Result<()> {
        self.tick();
        let handle = self.get_stream(&input.stream_name)?;
        let mut stream = handle.write();
        self.require_data_plane(&stream)?;
        stream.add_tags(input.tags)
    }

    pub fn remove_tags_from_stream(&self, input: RemoveTagsFromStreamInput) -> Result<()> {
        self.tick();
        let handle = self.get_stream(&input.stream_name)?;
        let mut stream = handle.write();
        self.require_data_plane(&stream)?;
        stream.remove_tags(&input.tag_keys);
        Ok(())
    }

    pub fn list_tags_for_stream(
        &self,
        input: ListTagsForStreamInput,
    ) -> Result<ListTagsForStreamOutput> {
        self.tick();
        let handle = self.get_stream(&input.stream_name)?;
        let stream = handle.read();
        let limit = input.limit.unwrap_or(DEFAULT_LIST_TAGS_LIMIT) as usize;
        Ok(stream.list_tags(input.exclusive_start_tag_key.as_deref(), limit))
    }

    pub fn increase_stream_retention_period(&self, input: StreamRetentionInput) -> Result<()> {
        self.change_retention(input, true)
    }

    pub fn decrease_stream_retention_period(&self, input: StreamRetentionInput) -> Result<()> {
        self.change_retention(input, false)
    }

    fn change_retention(&self, input: StreamRetentionInput, increase: bool) -> Result<()> {
        self.tick();
        let handle = self.get_stream(&input.stream_name)?;
        let mut stream = handle.write();
        self.require_active(&stream)?;
        stream.set_retention(input.retention_period_hours, increase)?;
        info!(stream = %stream.name, hours = stream.retention_hours, "Changed retention period");
        Ok(())
    }

    // Data plane

    pub fn put_record(&self, input: PutRecordInput) -> Result<PutRecordOutput> {
        self.tick();
        let handle = self.get_stream(&input.stream_name)?;
        let stream = handle.read();
        self.require_data_plane(&stream)?;

        if let Some(ordering) = input.sequence_number_for_ordering.as_deref() {
            ordering.parse::<SequenceNumber>().map_err(|_| {
                KinesisError::invalid_argument(format!(
                    "ExclusiveMinimumSequenceNumber {} used in PutRecord on stream {} under \
                     account {} is invalid.",
                    ordering, stream.name, stream.account_id
                ))
            })?;
        }

        let hash_key = record_hash_key(
            &input.partition_key,
            input.explicit_hash_key.as_deref(),
            input.data.len(),
        )?;
        let (shard, sequence) = stream.append(
            hash_key,
            input.partition_key,
            Bytes::from(input.data),
            self.clock.now(),
        )?;

        Ok(PutRecordOutput {
            shard_id: format_shard_id(shard),
            sequence_number: sequence.to_string(),
        })
    }

    pub fn put_records(&self, input: PutRecordsInput) -> Result<PutRecordsOutput> {
        self.tick();
        let handle = self.get_stream(&input.stream_name)?;
        let stream = handle.read();
        self.require_data_plane(&stream)?;

        // Reject the whole batch before anything is written
        let hash_keys = input
            .records
            .iter()
            .map(|entry| {
                record_hash_key(
                    &entry.partition_key,
                    entry.explicit_hash_key.as_deref(),
                    entry.data.len(),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let now = self.clock.now();
        let mut records = Vec::with_capacity(input.records.len());
        for (entry, hash_key) in input.records.into_iter().zip(hash_keys) {
            let (shard, sequence) =
                stream.append(hash_key, entry.partition_key, Bytes::from(entry.data), now)?;
            records.push(PutRecordsResultEntry {
                sequence_number: Some(sequence.to_string()),
                shard_id: Some(format_shard_id(shard)),
                ..Default::default()
            });
        }

        debug!(stream = %stream.name, count = records.len(), "Put records");
        Ok(PutRecordsOutput {
            failed_record_count: 0,
            records,
        })
    }

    pub fn get_shard_iterator(&self, input: GetShardIteratorInput) -> Result<GetShardIteratorOutput> {
        self.tick();
        let handle = self.get_stream(&input.stream_name)?;
        let stream = handle.read();
        self.require_data_plane(&stream)?;

        let shard = stream.find_shard(&input.shard_id)?;
        let starting = StartingPosition::from_request(
            input.shard_iterator_type,
            input.starting_sequence_number.as_deref(),
            input.timestamp,
        )?;

        let now = self.clock.now();
        if let StartingPosition::AtTimestamp(at) = starting {
            if at > now {
                return Err(KinesisError::invalid_argument(format!(
                    "The timestampInMillis parameter cannot be greater than the \
                     currentTimestampInMillis. timestampInMillis: {}, currentTimestampInMillis: {}",
                    at.timestamp_millis(),
                    now.timestamp_millis()
                )));
            }
        }

        let position = starting
            .resolve(&shard.log.read(), stream.retention_cutoff(now))
            .ok_or_else(|| match starting {
                StartingPosition::AtSequence(seq) | StartingPosition::AfterSequence(seq)
                    if seq.shard_index() != shard.index =>
                {
                    KinesisError::invalid_argument(format!(
                        "Invalid StartingSequenceNumber. It encodes {}, while it was used in a \
                         call to a shard with {}",
                        format_shard_id(seq.shard_index()),
                        shard.shard_id()
                    ))
                }
                _ => KinesisError::invalid_argument(format!(
                    "StartingSequenceNumber {} used in GetShardIterator on shard {} in stream {} \
                     under account {} is invalid because it did not come from this stream.",
                    input.starting_sequence_number.as_deref().unwrap_or_default(),
                    shard.shard_id(),
                    stream.name,
                    stream.account_id
                )),
            })?;

        let cursor = IteratorCursor {
            stream_name: stream.name.clone(),
            incarnation: stream.incarnation,
            shard_index: shard.index,
            position,
            issued_at_ms: now.timestamp_millis(),
        };
        debug!(
            stream = %stream.name,
            shard = %shard.shard_id(),
            kind = %input.shard_iterator_type,
            position,
            "Issued shard iterator"
        );

        Ok(GetShardIteratorOutput {
            shard_iterator: self.codec.encode(&cursor),
        })
    }

    pub fn get_records(&self, input: GetRecordsInput) -> Result<GetRecordsOutput> {
        self.tick();
        let cursor = self.codec.decode(&input.shard_iterator)?;
        let now = self.clock.now();
        self.check_iterator_age(&cursor, now)?;

        let expired = || {
            KinesisError::expired_iterator(format!(
                "Shard iterator for shard {} in stream {} has expired because the stream or \
                 shard no longer exists.",
                format_shard_id(cursor.shard_index),
                cursor.stream_name
            ))
        };

        let handle = self.get_stream(&cursor.stream_name).map_err(|_| expired())?;
        let stream = handle.read();
        if stream.incarnation != cursor.incarnation {
            return Err(expired());
        }
        self.require_data_plane(&stream)?;
        let shard = stream.shard(cursor.shard_index).ok_or_else(expired)?;

        let limit = input
            .limit
            .map(|l| l as usize)
            .unwrap_or(DEFAULT_READ_LIMIT)
            .min(DEFAULT_READ_LIMIT);
        let log = shard.log.read();
        let batch = log.read(cursor.position, limit, stream.retention_cutoff(now), now);

        let drained = !shard.is_open() && batch.next_position >= log.tail();
        let next_shard_iterator = (!drained).then(|| {
            self.codec.encode(&IteratorCursor {
                position: batch.next_position,
                issued_at_ms: now.timestamp_millis(),
                ..cursor.clone()
            })
        });

        debug!(
            stream = %stream.name,
            shard = %shard.shard_id(),
            count = batch.records.len(),
            next = batch.next_position,
            "Read records"
        );

        Ok(GetRecordsOutput {
            records: batch.records.iter().map(|r| r.to_record()).collect(),
            next_shard_iterator,
            millis_behind_latest: batch.millis_behind_latest,
        })
    }

    // Scheduling

    /// Apply every scheduled transition that is due. Returns how many took effect.
    pub fn tick(&self) -> usize {
        let due = self.scheduler.lock().take_due(self.clock.now_millis());
        due.iter().filter(|deferred| self.apply(deferred)).count()
    }

    /// Number of transitions still waiting to fire.
    pub fn pending_transitions(&self) -> usize {
        self.scheduler.lock().len()
    }

    /// Drive scheduled transitions from a background task until [`close`](Self::close)
    /// is called or the registry is dropped.
    pub fn spawn_scheduler(self: &Arc<Self>) -> JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let period = self.config.scheduler_tick();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let Some(registry) = registry.upgrade() else {
                            break;
                        };
                        registry.tick();
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Scheduler received shutdown signal");
                        break;
                    }
                }
            }
        })
    }

    /// Stop the background scheduler task, if one is running.
    pub fn close(&self) {
        // No receivers just means no scheduler was spawned
        let _ = self.shutdown_tx.send(());
        info!("Stream registry closed");
    }

    fn schedule(&self, delay_ms: u64, stream: &str, incarnation: u64, transition: Transition) {
        let delay_ms = i64::try_from(delay_ms).unwrap_or(i64::MAX);
        let fire_at_ms = self.clock.now_millis().saturating_add(delay_ms);
        self.scheduler
            .lock()
            .schedule(fire_at_ms, stream, incarnation, transition);
    }

    fn apply(&self, deferred: &Deferred) -> bool {
        match deferred.transition {
            Transition::Activate { from } => {
                let Some(handle) = self.streams.read().get(&deferred.stream).cloned() else {
                    return false;
                };
                let mut stream = handle.write();
                if stream.incarnation != deferred.incarnation || stream.status != from {
                    return false;
                }
                stream.status = StreamStatus::Active;
                info!(stream = %stream.name, from = %from, "Stream is now ACTIVE");
                true
            }
            Transition::Remove => {
                let mut streams = self.streams.write();
                let is_target = streams.get(&deferred.stream).is_some_and(|handle| {
                    let stream = handle.read();
                    stream.incarnation == deferred.incarnation
                        && stream.status == StreamStatus::Deleting
                });
                if is_target {
                    streams.remove(&deferred.stream);
                    info!(stream = %deferred.stream, "Deleted stream");
                }
                is_target
            }
        }
    }

    // Helpers

    fn get_stream(&self, name: &str) -> Result<StreamHandle> {
        self.streams.read().get(name).cloned().ok_or_else(|| {
            KinesisError::resource_not_found(format!(
                "Stream {} under account {} not found.",
                name, self.config.account_id
            ))
        })
    }

    fn require_active(&self, stream: &Stream) -> Result<()> {
        if stream.status != StreamStatus::Active {
            return Err(stream_in_use(stream));
        }
        Ok(())
    }

    fn require_data_plane(&self, stream: &Stream) -> Result<()> {
        if !stream.status.accepts_data() {
            return Err(stream_in_use(stream));
        }
        Ok(())
    }

    fn begin_update(&self, stream: &mut Stream) {
        stream.status = StreamStatus::Updating;
        self.schedule(
            self.config.update_stream_ms,
            &stream.name,
            stream.incarnation,
            Transition::Activate {
                from: StreamStatus::Updating,
            },
        );
    }

    fn check_iterator_age(&self, cursor: &IteratorCursor, now: DateTime<Utc>) -> Result<()> {
        let age = now.timestamp_millis() - cursor.issued_at_ms;
        if age > self.config.iterator_ttl_ms as i64 {
            return Err(KinesisError::expired_iterator(format!(
                "Iterator expired. The iterator was created at time {} while right now it is {} \
                 which is further in the future than the tolerated delay of {} milliseconds.",
                cursor.issued_at_ms,
                now.timestamp_millis(),
                self.config.iterator_ttl_ms
            )));
        }
        Ok(())
    }

    fn reserve_shards(&self, count: u32) -> Result<()> {
        let limit = self.config.shard_limit;
        self.open_shards
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_add(count).filter(|total| *total <= limit)
            })
            .map(|_| ())
            .map_err(|current| {
                KinesisError::limit_exceeded(format!(
                    "This request would exceed the shard limit for the account {} in {}. \
                     Current shard count for the account: {}. Limit: {}. Number of additional \
                     shards that would have resulted from this request: {}.",
                    self.config.account_id, self.config.region, current, limit, count
                ))
            })
    }

    fn release_shards(&self, count: u32) {
        let _ = self
            .open_shards
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(count))
            });
    }
}

impl Drop for StreamRegistry {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

fn stream_in_use(stream: &Stream) -> KinesisError {
    KinesisError::resource_in_use(format!(
        "Stream {} under account {} not ACTIVE, instead in state {}",
        stream.name, stream.account_id, stream.status
    ))
}

fn record_hash_key(partition_key: &str, explicit: Option<&str>, data_len: usize) -> Result<u128> {
    if data_len > MAX_RECORD_BYTES {
        return Err(KinesisError::invalid_argument(format!(
            "Record data of {} bytes exceeds the maximum of {} bytes.",
            data_len, MAX_RECORD_BYTES
        )));
    }
    match explicit {
        Some(value) => parse_hash_key(value).ok_or_else(|| {
            KinesisError::invalid_argument(format!(
                "Invalid ExplicitHashKey. ExplicitHashKey must be in the range: [0, 2^128-1]. \
                 Specified value was {}",
                value
            ))
        }),
        None => Ok(hash_partition_key(partition_key)),
    }
}
