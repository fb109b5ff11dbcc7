//! # DuoKV - An In-Memory Key-Value Store for Strings and Dictionaries
//!
//! DuoKV keeps two kinds of values under string keys: plain strings and
//! flat string-to-string dictionaries. Keys may carry a time-to-live, and a
//! background sweeper evicts them once it has passed. Clients talk to the
//! server over TCP with a small line-based text protocol.
//!
//! ## Features
//!
//! - **Two value kinds**: Strings and dictionaries, with field-level merge and query
//! - **TTL Support**: Keys expire via a sorted TTL index swept on a fixed cadence
//! - **Write versions**: A rewritten key is never evicted by an older TTL
//! - **Async I/O**: Built on Tokio, one task per client connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              DuoKV                                      │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘                  │
//! │                                               │                         │
//! │                                               ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐   │
//! │  │   Line      │    │              StorageEngine                   │   │
//! │  │   Parser    │    │   RwLock ┌──────────────┐ ┌───────────────┐  │   │
//! │  │             │    │          │ key -> value │ │  TTL index    │  │   │
//! │  └─────────────┘    │          └──────────────┘ └───────────────┘  │   │
//! │                     └──────────────────────────────────────────────┘   │
//! │                                               ▲                         │
//! │                                               │                         │
//! │                     ┌─────────────────────────┴───────────────────────┐ │
//! │                     │           ExpirySweeper                         │ │
//! │                     │      (Background Tokio Task)                    │ │
//! │                     └─────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use duokv::storage::{ExpiryConfig, ExpirySweeper, StorageEngine};
//! use duokv::commands::CommandHandler;
//! use duokv::connection::{handle_connection, ConnectionStats};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = Arc::new(StorageEngine::new());
//!     let _sweeper = ExpirySweeper::start(Arc::clone(&storage), ExpiryConfig::default());
//!     let stats = Arc::new(ConnectionStats::new());
//!
//!     let listener = TcpListener::bind("127.0.0.1:12345").await?;
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await?;
//!         let handler = CommandHandler::new(Arc::clone(&storage));
//!         let stats = Arc::clone(&stats);
//!
//!         tokio::spawn(handle_connection(stream, addr, handler, stats));
//!     }
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `get string <key>`
//! - `get dict <key> [field ...]`
//! - `set string <key> <value> [ttl]`
//! - `set dict <key> <field:value> ... [ttl]`
//! - `delete <key>`
//!
//! A TTL looks like `30s`, `5m`, `2h`, `1d` or `1w`. Zero clears an existing
//! expiration and a negative TTL deletes the key.
//!
//! ## Module Overview
//!
//! - [`protocol`]: Line parser, command grammar and reply framing
//! - [`storage`]: Thread-safe storage engine, TTL index and sweeper
//! - [`commands`]: The command facade over the storage engine
//! - [`connection`]: Client connection management
//! - [`config`]: Command-line configuration
//!
//! ## Expiry
//!
//! Reads never check expiration. An expired key stays readable until the
//! next sweep removes it, so the sweep interval bounds how stale a read can be.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{CommandError, CommandHandler};
pub use config::{Config, ConfigError};
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{parse_command, Command, ParseError, Response};
pub use storage::{ExpiryConfig, ExpirySweeper, StorageEngine, Ttl};

/// The default port DuoKV listens on
pub const DEFAULT_PORT: u16 = 12345;

/// The default host DuoKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of DuoKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
