//! Registry configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("shard_limit must be at least 1")]
    ZeroShardLimit,

    #[error("stream_limit must be at least 1")]
    ZeroStreamLimit,

    #[error("scheduler_tick_ms must be at least 1")]
    ZeroSchedulerTick,

    #[error("account_id must be 12 digits, got {0:?}")]
    InvalidAccountId(String),

    #[error("region must not be empty")]
    EmptyRegion,
}

/// Tunables of a [`StreamRegistry`](crate::StreamRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Delay before a new stream becomes ACTIVE
    pub create_stream_ms: u64,
    /// Delay before a DELETING stream is removed
    pub delete_stream_ms: u64,
    /// Delay before a split or merge returns the stream to ACTIVE
    pub update_stream_ms: u64,
    /// Open shards allowed across all streams
    pub shard_limit: u32,
    pub stream_limit: u32,
    pub account_id: String,
    pub region: String,
    /// How long an iterator stays valid after it is issued
    pub iterator_ttl_ms: u64,
    /// Interval of the background scheduler task
    pub scheduler_tick_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            create_stream_ms: 500,
            delete_stream_ms: 500,
            update_stream_ms: 500,
            shard_limit: 10,
            stream_limit: 1000,
            account_id: "000000000000".to_string(),
            region: "us-east-1".to_string(),
            iterator_ttl_ms: 300_000,
            scheduler_tick_ms: 50,
        }
    }
}

impl RegistryConfig {
    /// All transition delays set to `ms`.
    pub fn with_delays(mut self, ms: u64) -> Self {
        self.create_stream_ms = ms;
        self.delete_stream_ms = ms;
        self.update_stream_ms = ms;
        self
    }

    pub fn with_create_stream_ms(mut self, ms: u64) -> Self {
        self.create_stream_ms = ms;
        self
    }

    pub fn with_delete_stream_ms(mut self, ms: u64) -> Self {
        self.delete_stream_ms = ms;
        self
    }

    pub fn with_update_stream_ms(mut self, ms: u64) -> Self {
        self.update_stream_ms = ms;
        self
    }

    pub fn with_shard_limit(mut self, limit: u32) -> Self {
        self.shard_limit = limit;
        self
    }

    pub fn with_stream_limit(mut self, limit: u32) -> Self {
        self.stream_limit = limit;
        self
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = account_id.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_iterator_ttl_ms(mut self, ms: u64) -> Self {
        self.iterator_ttl_ms = ms;
        self
    }

    pub fn scheduler_tick(&self) -> Duration {
        Duration::from_millis(self.scheduler_tick_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shard_limit == 0 {
            return Err(ConfigError::ZeroShardLimit);
        }
        if self.stream_limit == 0 {
            return Err(ConfigError::ZeroStreamLimit);
        }
        if self.scheduler_tick_ms == 0 {
            return Err(ConfigError::ZeroSchedulerTick);
        }
        if self.account_id.len() != 12 || !self.account_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ConfigError::InvalidAccountId(self.account_id.clone()));
        }
        if self.region.is_empty() {
            return Err(ConfigError::EmptyRegion);
        }
        Ok(())
    }
}
