//! Stream Decoder
//!
//! Drives [`RespParser`] over an async byte stream. TCP may deliver a unit in
//! any number of fragments, so incoming data accumulates in a `BytesMut`
//! buffer until the parser reports a complete unit. Bytes belonging to the
//! next unit stay buffered for the following call. After an incomplete parse
//! the decoder remembers how many bytes the unit needs at minimum and does not
//! parse again until that many are buffered.
//!
//! End-of-stream is reported in two distinct ways:
//! - `Ok(None)` when the stream ends between units (clean close)
//! - `Err(DecodeError::UnexpectedEof)` when it ends inside a unit (short read)

use crate::protocol::parser::{ParseError, Parsed, RespParser};
use crate::protocol::types::RespValue;
use bytes::{Buf, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Slack allowed on top of the largest bulk payload before giving up
const BUFFER_HEADROOM: usize = 64 * 1024;

/// Errors that can occur while decoding from a stream.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The buffered bytes are not valid RESP
    #[error("protocol error: {0}")]
    Parse(#[from] ParseError),

    /// The underlying stream failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended in the middle of a unit
    #[error("unexpected end of stream ({buffered} bytes of an incomplete unit)")]
    UnexpectedEof { buffered: usize },

    /// The buffered bytes exceed what any valid unit could need
    #[error("buffer size limit exceeded: {size} bytes")]
    BufferFull { size: usize },
}

/// Reads RESP units one at a time from an async stream.
///
/// # Example
///
/// ```
/// # tokio_test::block_on(async {
/// use minikv::protocol::{RespDecoder, RespValue};
///
/// let stream: &[u8] = b"+OK\r\n$5\r\nhello\r\n";
/// let mut decoder = RespDecoder::new(stream);
///
/// assert_eq!(decoder.decode().await.unwrap(), Some(RespValue::simple_string("OK")));
/// assert_eq!(decoder.decode().await.unwrap(), Some(RespValue::bulk_string("hello")));
/// assert_eq!(decoder.decode().await.unwrap(), None);
/// # });
/// ```
#[derive(Debug)]
pub struct RespDecoder<R> {
    reader: R,
    buffer: BytesMut,
    parser: RespParser,
    max_buffer_size: usize,
    /// Buffer length below which parsing cannot make progress
    needed: usize,
}

impl<R: AsyncRead + Unpin> RespDecoder<R> {
    /// Creates a decoder with default parser limits.
    pub fn new(reader: R) -> Self {
        Self::with_parser(reader, RespParser::new())
    }

    /// Creates a decoder using the given parser limits.
    pub fn with_parser(reader: R, parser: RespParser) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser,
            max_buffer_size: parser.max_bulk_size().saturating_add(BUFFER_HEADROOM),
            needed: 0,
        }
    }

    /// Number of bytes read from the stream but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Decodes the next complete RESP unit.
    ///
    /// Waits until a full unit is available. Returns `Ok(None)` when the
    /// stream closes cleanly before the first byte of a unit.
    pub async fn decode(&mut self) -> Result<Option<RespValue>, DecodeError> {
        loop {
            if self.buffer.len() >= self.needed {
                match self.parser.parse_partial(&self.buffer)? {
                    Parsed::Complete { value, consumed } => {
                        self.buffer.advance(consumed);
                        self.needed = 0;
                        trace!(
                            consumed = consumed,
                            remaining = self.buffer.len(),
                            "Decoded unit"
                        );
                        return Ok(Some(value));
                    }
                    Parsed::Incomplete { needed } => self.needed = needed,
                }
            }

            if !self.read_more_data().await? {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(DecodeError::UnexpectedEof {
                    buffered: self.buffer.len(),
                });
            }
        }
    }

    /// Reads more data from the stream into the buffer.
    ///
    /// Returns `false` once the stream has reached its end.
    async fn read_more_data(&mut self) -> Result<bool, DecodeError> {
        if self.buffer.len() >= self.max_buffer_size {
            return Err(DecodeError::BufferFull {
                size: self.buffer.len(),
            });
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.reader.read_buf(&mut self.buffer).await?;
        trace!(bytes = n, buffered = self.buffer.len(), "Read data");

        Ok(n > 0)
    }
}
