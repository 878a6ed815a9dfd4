//! Command Module
//!
//! Receives decoded requests, executes them against the storage engine and
//! produces replies.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  RESP Decoder   │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Dispatch     │
//! │  - Validate     │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐      ┌─────────────────┐
//! │ StorageEngine   │      │  Persistence    │  (optional)
//! └─────────────────┘      └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `PING`, `ECHO`, `SET`, `GET`

pub mod error;
pub mod handler;

pub use error::{CommandError, Disposition};
pub use handler::CommandHandler;
