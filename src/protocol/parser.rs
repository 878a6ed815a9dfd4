//! Incremental RESP Parser
//!
//! Parses one RESP unit from the front of a byte buffer. The parser never
//! blocks and never consumes anything itself: it reports how many bytes the
//! unit occupied and the caller advances its buffer.
//!
//! ## How the Parser Works
//!
//! `parse()` returns either:
//! - `Ok(Some((value, consumed)))` - a complete unit occupying `consumed` bytes
//! - `Ok(None)` - the unit is incomplete, more bytes are needed
//! - `Err(ParseError)` - the bytes can never form a valid unit
//!
//! Only simple strings (`+`), bulk strings (`$`) and arrays (`*`) are
//! recognized. Every other type byte, including the reserved integer (`:`)
//! and error (`-`) prefixes, is rejected.
//!
//! A line ends at the first `\n` whose preceding byte is `\r`. A lone `\n`
//! is ordinary payload. Lines (simple strings, lengths and counts) are capped
//! at a small size; only declared bulk payloads may be large.
//!
//! [`RespParser::parse_partial`] additionally reports how many bytes an
//! incomplete unit needs at minimum, so a stream reader can skip re-parsing
//! until that much has arrived.

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The first byte of a unit is not a recognized type prefix
    #[error("invalid type byte: {0:#04x}")]
    InvalidTypeByte(u8),

    /// A bulk length or array count is not a non-negative integer
    #[error("bad length: {0:?}")]
    BadLength(String),

    /// A bulk payload is not followed by CRLF
    #[error("bulk string missing trailing CRLF")]
    MissingTrailingCrlf,

    /// Arrays are nested deeper than the parser allows
    #[error("maximum nesting depth exceeded: {0}")]
    NestingTooDeep(usize),

    /// A bulk payload exceeds the maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// A CRLF-terminated line is longer than the parser allows
    #[error("line too long (max: {max} bytes)")]
    LineTooLong { max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

/// Maximum length of a simple string, bulk length or array count line (64 KB)
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Outcome of a parse attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    /// A complete unit occupying `consumed` bytes
    Complete { value: RespValue, consumed: usize },
    /// The unit cannot complete until the buffer holds at least `needed` bytes
    Incomplete { needed: usize },
}

/// A RESP parser with configurable limits.
///
/// # Example
///
/// ```
/// use minikv::protocol::{RespParser, RespValue};
///
/// let parser = RespParser::new();
/// let buf = b"*1\r\n$4\r\nPING\r\n";
///
/// let (value, consumed) = parser.parse(buf).unwrap().unwrap();
/// assert_eq!(consumed, buf.len());
/// assert_eq!(value, RespValue::array(vec![RespValue::bulk_string("PING")]));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct RespParser {
    max_depth: usize,
    max_bulk_size: usize,
    max_line_length: usize,
}

impl Default for RespParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RespParser {
    /// Creates a parser with the default limits.
    pub fn new() -> Self {
        Self {
            max_depth: MAX_NESTING_DEPTH,
            max_bulk_size: MAX_BULK_SIZE,
            max_line_length: MAX_LINE_LENGTH,
        }
    }

    /// Overrides the maximum array nesting depth.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Overrides the maximum bulk string size.
    pub fn with_max_bulk_size(mut self, max_bulk_size: usize) -> Self {
        self.max_bulk_size = max_bulk_size;
        self
    }

    /// Overrides the maximum line length.
    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    /// The largest bulk payload this parser accepts.
    pub fn max_bulk_size(&self) -> usize {
        self.max_bulk_size
    }

    /// Attempts to parse one RESP value from the front of `buf`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((value, consumed)))` - Successfully parsed a value
    /// - `Ok(None)` - Incomplete data, need more bytes
    /// - `Err(e)` - Parse error
    pub fn parse(&self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        Ok(match self.parse_partial(buf)? {
            Parsed::Complete { value, consumed } => Some((value, consumed)),
            Parsed::Incomplete { .. } => None,
        })
    }

    /// Like [`parse`](Self::parse), but an incomplete result carries the
    /// minimum buffer length at which another attempt can make progress.
    pub fn parse_partial(&self, buf: &[u8]) -> ParseResult<Parsed> {
        self.parse_value(buf, 0)
    }

    fn parse_value(&self, buf: &[u8], depth: usize) -> ParseResult<Parsed> {
        let Some(&type_byte) = buf.first() else {
            return Ok(Parsed::Incomplete { needed: 1 });
        };

        match type_byte {
            prefix::SIMPLE_STRING => self.parse_simple_string(buf),
            prefix::BULK_STRING => self.parse_bulk_string(buf),
            prefix::ARRAY => self.parse_array(buf, depth),
            other => Err(ParseError::InvalidTypeByte(other)),
        }
    }

    /// Parses a simple string: `+<string>\r\n`
    fn parse_simple_string(&self, buf: &[u8]) -> ParseResult<Parsed> {
        debug_assert!(buf[0] == prefix::SIMPLE_STRING);

        match self.find_line_end(&buf[1..])? {
            Some(pos) => {
                let content = Bytes::copy_from_slice(&buf[1..1 + pos]);
                Ok(Parsed::Complete {
                    value: RespValue::SimpleString(content),
                    // +1 for prefix, +2 for CRLF
                    consumed: 1 + pos + 2,
                })
            }
            None => Ok(Parsed::Incomplete {
                needed: buf.len() + 1,
            }),
        }
    }

    /// Parses a bulk string: `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(&self, buf: &[u8]) -> ParseResult<Parsed> {
        debug_assert!(buf[0] == prefix::BULK_STRING);

        let Some((length, header_len)) = self.parse_length_line(buf)? else {
            return Ok(Parsed::Incomplete {
                needed: buf.len() + 1,
            });
        };

        if length > self.max_bulk_size {
            return Err(ParseError::MessageTooLarge {
                size: length,
                max: self.max_bulk_size,
            });
        }

        let total_needed = header_len + length + 2;
        if buf.len() < total_needed {
            return Ok(Parsed::Incomplete {
                needed: total_needed,
            });
        }

        if &buf[header_len + length..total_needed] != CRLF {
            return Err(ParseError::MissingTrailingCrlf);
        }

        let data = Bytes::copy_from_slice(&buf[header_len..header_len + length]);
        Ok(Parsed::Complete {
            value: RespValue::BulkString(data),
            consumed: total_needed,
        })
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    fn parse_array(&self, buf: &[u8], depth: usize) -> ParseResult<Parsed> {
        debug_assert!(buf[0] == prefix::ARRAY);

        if depth >= self.max_depth {
            return Err(ParseError::NestingTooDeep(self.max_depth));
        }

        let Some((count, mut consumed)) = self.parse_length_line(buf)? else {
            return Ok(Parsed::Incomplete {
                needed: buf.len() + 1,
            });
        };

        // The count is untrusted; never preallocate more than the buffer could hold.
        let mut elements = Vec::with_capacity(count.min(buf.len()));

        for _ in 0..count {
            match self.parse_value(&buf[consumed..], depth + 1)? {
                Parsed::Complete {
                    value,
                    consumed: element_consumed,
                } => {
                    elements.push(value);
                    consumed += element_consumed;
                }
                Parsed::Incomplete { needed } => {
                    return Ok(Parsed::Incomplete {
                        needed: consumed + needed,
                    });
                }
            }
        }

        Ok(Parsed::Complete {
            value: RespValue::Array(elements),
            consumed,
        })
    }

    /// Parses the `<prefix><n>\r\n` header shared by bulk strings and arrays.
    ///
    /// Returns the length and the number of header bytes, including the prefix
    /// and CRLF.
    fn parse_length_line(&self, buf: &[u8]) -> ParseResult<Option<(usize, usize)>> {
        let Some(pos) = self.find_line_end(&buf[1..])? else {
            return Ok(None);
        };

        let raw = &buf[1..1 + pos];
        let length = std::str::from_utf8(raw)
            .ok()
            .filter(|s| !s.starts_with('+'))
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or_else(|| ParseError::BadLength(String::from_utf8_lossy(raw).into_owned()))?;

        Ok(Some((length, 1 + pos + 2)))
    }

    /// Finds the CRLF ending a line, scanning no further than the line limit.
    fn find_line_end(&self, buf: &[u8]) -> ParseResult<Option<usize>> {
        let limit = self.max_line_length.saturating_add(2);
        match find_crlf(&buf[..buf.len().min(limit)]) {
            Some(pos) => Ok(Some(pos)),
            None if buf.len() >= limit => Err(ParseError::LineTooLong {
                max: self.max_line_length,
            }),
            None => Ok(None),
        }
    }
}

/// Finds the end of a CRLF-terminated line.
///
/// Returns the position of the `\r` of the first `\n` that is immediately
/// preceded by `\r`, or None if no such line ending is present yet.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.iter()
        .enumerate()
        .skip(1)
        .find(|&(i, &b)| b == b'\n' && buf[i - 1] == b'\r')
        .map(|(i, _)| i - 1)
}

/// Helper function to parse a single RESP message with default limits.
pub fn parse_message(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse(buf)
}
