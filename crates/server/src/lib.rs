//! kinesim protocol server
//!
//! Serves a [`StreamRegistry`](kinesim_core::StreamRegistry) over the Kinesis
//! `Kinesis_20131202` JSON protocol, so that stock AWS SDKs and CLIs can talk
//! to a local emulator.
//!
//! # Example
//!
//! ```rust,no_run
//! use kinesim_server::{ServerOptions, start_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let options = ServerOptions {
//!         port: 4567,
//!         host: "127.0.0.1".to_string(),
//!         ..Default::default()
//!     };
//!
//!     start_server(options).await.unwrap();
//! }
//! ```
//!
//! # Protocol
//!
//! ```text
//! POST / HTTP/1.1
//! Content-Type: application/x-amz-json-1.1
//! X-Amz-Target: Kinesis_20131202.PutRecord
//! X-Amz-Date: 20150101T000000Z
//! Authorization: AWS4-HMAC-SHA256 Credential=..., SignedHeaders=..., Signature=...
//!
//! {"StreamName": "events", "PartitionKey": "a", "Data": "aGVsbG8="}
//!
//! Response: 200 OK
//! {"ShardId": "shardId-000000000000", "SequenceNumber": "4958..."}
//! ```
//!
//! Errors come back as `{"__type": "ResourceNotFoundException", "message": "..."}`
//! with status 400.

pub mod error;
pub mod options;
pub mod server;
pub mod validation;

// Re-export commonly used items
pub use error::{ProtocolError, ServerError};
pub use options::ServerOptions;
pub use server::{AppState, create_router, start_server};
