//! # minikv - A Minimal Redis-Compatible Key-Value Server
//!
//! minikv speaks a subset of the Redis Serialization Protocol (RESP) over TCP
//! and serves four commands from an in-memory store: `PING`, `ECHO`, `SET`
//! and `GET`, with optional per-key expiry.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              minikv                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │                     ┌─────────────┐    ┌──────────────────────────────┐ │
//! │                     │    RESP     │    │        StorageEngine         │ │
//! │                     │   Decoder   │    │  64 RwLock shards, lazy TTL  │ │
//! │                     └─────────────┘    └──────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use minikv::commands::CommandHandler;
//! use minikv::storage::StorageEngine;
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let storage = Arc::new(StorageEngine::new());
//!     let listener = TcpListener::bind("0.0.0.0:6379").await?;
//!
//!     minikv::server::run(listener, CommandHandler::new(storage)).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP value type, parser and stream decoder
//! - [`storage`]: Thread-safe store with lazy expiry, append-log persistence
//! - [`commands`]: Command dispatch and error replies
//! - [`connection`]: Per-client decode/execute/reply loop
//! - [`server`]: Accept loop
//! - [`config`]: Command-line configuration

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

pub use commands::{CommandError, CommandHandler};
pub use config::Config;
pub use connection::{handle_connection, ConnectionError};
pub use protocol::{DecodeError, ParseError, RespDecoder, RespParser, RespValue};
pub use storage::{AppendLog, Persistence, StorageEngine};

/// The default port minikv listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host minikv binds to (all interfaces)
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Version of minikv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
