//! Connection Handler Module
//!
//! This module handles individual client connections.
//! Each client gets its own handler task that runs in a loop,
//! decoding one request, executing it and replying before touching the next.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Reading                 │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Decode one RESP request │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Execute command         │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Send reply              │ │
//!    │  └───────────┬─────────────┘ │
//!    │              │               │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Closed: clean end of stream, malformed input,
//!    or a command error whose policy is to close
//! ```
//!
//! Malformed input is never answered; the client only observes the close.

use crate::commands::{CommandError, CommandHandler, Disposition};
use crate::protocol::{DecodeError, RespDecoder, RespValue};
use std::net::SocketAddr;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, error, info, trace, warn};

/// Handles a single client connection.
pub struct ConnectionHandler {
    /// Decoder over the read half of the socket
    decoder: RespDecoder<OwnedReadHalf>,

    /// Buffered write half of the socket
    writer: BufWriter<OwnedWriteHalf>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// The command handler (shared storage behind it)
    command_handler: CommandHandler,
}

impl ConnectionHandler {
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The TCP stream for this connection
    /// * `addr` - The client's socket address
    /// * `command_handler` - The command handler for executing commands
    pub fn new(stream: TcpStream, addr: SocketAddr, command_handler: CommandHandler) -> Self {
        let (reader, writer) = stream.into_split();

        Self {
            decoder: RespDecoder::new(reader),
            writer: BufWriter::new(writer),
            addr,
            command_handler,
        }
    }

    /// Runs the connection until it closes.
    ///
    /// Returns `Ok(())` for every orderly close, including a clean end of
    /// stream and a command error that closes the connection.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected"),
            Err(ConnectionError::Decode(DecodeError::Parse(e))) => {
                warn!(client = %self.addr, error = %e, "Malformed request, closing connection")
            }
            Err(ConnectionError::Decode(DecodeError::UnexpectedEof { buffered })) => {
                debug!(
                    client = %self.addr,
                    buffered = buffered,
                    "Client disconnected mid-request"
                )
            }
            Err(ConnectionError::Io(io_err))
            | Err(ConnectionError::Decode(DecodeError::Io(io_err)))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        result
    }

    /// The decode-execute-reply loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        while let Some(request) = self.decoder.decode().await? {
            match self.command_handler.execute(request) {
                Ok(reply) => self.send_response(&reply).await?,
                Err(e) => {
                    let sent = self.send_response(&e.to_reply()).await;

                    match e.disposition() {
                        Disposition::KeepOpen => {
                            debug!(client = %self.addr, error = %e, "Command failed");
                            sent?;
                        }
                        Disposition::Close => {
                            debug!(
                                client = %self.addr,
                                error = %e,
                                "Command failed, closing connection"
                            );
                            sent?;
                            return Ok(());
                        }
                        Disposition::Terminate => return Err(ConnectionError::StorageFatal(e)),
                    }
                }
            }
        }

        Ok(())
    }

    /// Sends a reply to the client.
    async fn send_response(&mut self, response: &RespValue) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            "Sent response"
        );
        Ok(())
    }
}

/// Errors that end a connection abnormally.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Reading or decoding a request failed
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Writing a reply failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The persistence collaborator failed; the process must not continue
    #[error("fatal storage error: {0}")]
    StorageFatal(CommandError),
}

/// Handles a client connection.
///
/// Creates a [`ConnectionHandler`] and runs it to completion. A fatal
/// storage error terminates the process with status 1.
///
/// # Arguments
///
/// * `stream` - The TCP stream for this connection
/// * `addr` - The client's socket address
/// * `command_handler` - The command handler for executing commands
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
) {
    let handler = ConnectionHandler::new(stream, addr, command_handler);
    if let Err(ConnectionError::StorageFatal(e)) = handler.run().await {
        let cause = std::error::Error::source(&e)
            .map(ToString::to_string)
            .unwrap_or_default();
        error!(
            client = %addr,
            error = %e,
            cause = %cause,
            "Persisting write failed, terminating"
        );
        std::process::exit(1);
    }
}
