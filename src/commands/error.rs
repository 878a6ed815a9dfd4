//! Command Errors
//!
//! Every command failure is rendered to the client as an `-ERR ...` reply.
//! What happens to the connection afterwards depends on the failure.

use crate::protocol::RespValue;
use std::io;
use thiserror::Error;

/// What the connection does after an error reply has been written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Keep reading requests
    KeepOpen,
    /// Close this connection
    Close,
    /// Terminate the whole process
    Terminate,
}

/// Errors produced while executing a command.
///
/// The `Display` output is the exact text of the error reply.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The request is not an array
    #[error("ERR invalid command format")]
    InvalidFormat,

    /// The request is an empty array
    #[error("ERR empty command")]
    EmptyCommand,

    /// The first element has no string form
    #[error("ERR invalid command name")]
    InvalidCommandName,

    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArity(String),

    /// SET with an argument count it cannot handle
    #[error("ERR handling command: '{0}'")]
    SetArity(String),

    /// An argument has no string form
    #[error("ERR invalid argument for '{0}' command")]
    InvalidArgument(String),

    #[error("ERR invalid expire time in '{0}' command")]
    InvalidExpireTime(String),

    #[error("ERR syntax error")]
    Syntax,

    /// The persistence collaborator failed to record a write
    #[error("ERR handling command: '{name}'")]
    StorageFatal {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl CommandError {
    /// The reply sent to the client for this error.
    pub fn to_reply(&self) -> RespValue {
        RespValue::error(self.to_string())
    }

    /// What the connection does after replying.
    pub fn disposition(&self) -> Disposition {
        match self {
            CommandError::SetArity(_) => Disposition::Close,
            CommandError::StorageFatal { .. } => Disposition::Terminate,
            _ => Disposition::KeepOpen,
        }
    }
}
