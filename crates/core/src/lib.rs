//! kinesim stream engine
//!
//! An in-memory model of a shard-based streaming service: streams made of
//! shards that partition a 128-bit hash-key space, per-shard append-only
//! record logs with strictly ordered sequence numbers, resumable reads through
//! signed shard iterators, and delayed status transitions
//! (CREATING → ACTIVE, UPDATING → ACTIVE, DELETING → removed).
//!
//! # Example
//!
//! ```rust,no_run
//! use kinesim_core::{RegistryConfig, StreamRegistry};
//! use kinesim_types::CreateStreamInput;
//!
//! #[tokio::main]
//! async fn main() {
//!     let registry = StreamRegistry::new(RegistryConfig::default()).unwrap();
//!     let scheduler = registry.spawn_scheduler();
//!
//!     registry
//!         .create_stream(CreateStreamInput {
//!             stream_name: "events".to_string(),
//!             shard_count: 2,
//!         })
//!         .unwrap();
//!
//!     registry.close();
//!     scheduler.await.unwrap();
//! }
//! ```

pub mod clock;
pub mod config;
pub mod iterator;
pub mod log;
pub mod partition;
pub mod registry;
pub mod scheduler;
pub mod sequence;
pub mod shard;
pub mod stream;

// Re-export commonly used items
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, RegistryConfig};
pub use partition::{KeyRange, hash_partition_key};
pub use registry::StreamRegistry;
pub use sequence::SequenceNumber;
