//! Storage Engine Module
//!
//! This module provides the core storage functionality for DuoKV: a thread-safe
//! keyspace of strings and dictionaries, the TTL index that tracks expirations,
//! and the background sweeper that evicts expired keys.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │            RwLock { keyspace map + TtlIndex }               │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!                            │ sweep_expired() once per interval
//!              ┌─────────────┴─────────────┐
//!              │     ExpirySweeper         │
//!              │  (Background Tokio Task)  │
//!              └───────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use duokv::storage::{StorageEngine, Ttl};
//! use std::time::Duration;
//!
//! let engine = StorageEngine::new();
//!
//! engine.set_string("name", "Ariz", Ttl::Persist).unwrap();
//! assert_eq!(engine.get_string("name").unwrap(), Some("Ariz".to_string()));
//!
//! // Set with TTL
//! engine
//!     .set_string("session", "token123", Ttl::Expire(Duration::from_secs(3600)))
//!     .unwrap();
//! ```

pub mod engine;
pub mod expiry;
pub mod ttl;

// Re-export commonly used types
pub use engine::{
    Dict, FieldValues, StorageEngine, StorageError, StorageResult, StorageStats, SweepReport,
};
pub use expiry::{ExpiryConfig, ExpirySweeper, DEFAULT_SWEEP_INTERVAL};
pub use ttl::Ttl;
