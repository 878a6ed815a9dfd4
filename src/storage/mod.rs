//! Storage Module
//!
//! The thread-safe, sharded key-value store with lazy expiry, plus the
//! optional append-log persistence collaborator.
//!
//! ## Features
//!
//! - **Sharded Storage**: 64 independent shards reduce lock contention
//! - **RwLock**: Multiple concurrent readers, exclusive writers
//! - **TTL Support**: Keys can carry an absolute expiry instant
//! - **Lazy Expiry**: Expired keys are removed when next read
//!
//! ## Example
//!
//! ```
//! use minikv::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let engine = StorageEngine::new();
//!
//! engine.set(Bytes::from("name"), Bytes::from("Ariz"));
//! assert_eq!(engine.get(b"name"), Some(Bytes::from("Ariz")));
//!
//! engine.set_with_ttl(
//!     Bytes::from("session"),
//!     Bytes::from("token123"),
//!     Duration::from_secs(3600),
//! );
//! ```

pub mod engine;
pub mod persist;

pub use engine::{Entry, StorageEngine};
pub use persist::{AppendLog, Persistence, ReplayStats};
