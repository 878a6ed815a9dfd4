//! RESP Protocol Implementation
//!
//! This module implements the subset of the Redis Serialization Protocol
//! (RESP) that minikv speaks: simple strings, bulk strings and arrays on the
//! way in, plus errors and the nil bulk string on the way out.
//!
//! ## Modules
//!
//! - `types`: Defines the `RespValue` enum and serialization
//! - `parser`: Incremental parser over a byte buffer
//! - `decoder`: Async stream decoder built on the parser
//!
//! ## Example
//!
//! ```
//! use minikv::protocol::{parse_message, RespValue};
//!
//! // Parsing incoming data
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (value, consumed) = parse_message(data).unwrap().unwrap();
//! assert_eq!(consumed, data.len());
//!
//! // Creating responses
//! let response = RespValue::bulk_string("Ariz");
//! assert_eq!(response.serialize(), b"$4\r\nAriz\r\n");
//! ```

pub mod decoder;
pub mod parser;
pub mod types;

pub use decoder::{DecodeError, RespDecoder};
pub use parser::{parse_message, ParseError, ParseResult, Parsed, RespParser};
pub use types::RespValue;
