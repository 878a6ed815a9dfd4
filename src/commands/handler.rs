//! Command Handler
//!
//! Interprets a decoded request as `[name, arg...]` and executes it against
//! the storage engine.
//!
//! ## Supported Commands
//!
//! - `PING` - Replies `PONG`; any arguments are ignored
//! - `ECHO message` - Replies with `message` as a bulk string
//! - `SET key value [EX seconds | PX milliseconds]` - Stores a value
//! - `GET key` - Returns the stored value, or nil
//!
//! Names match case-insensitively. Error replies quote the name exactly as
//! the client sent it.

use crate::commands::error::CommandError;
use crate::protocol::RespValue;
use crate::storage::{Persistence, StorageEngine};
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::trace;

/// Executes commands against the shared storage engine.
///
/// Cheap to clone; every connection gets its own copy.
#[derive(Clone)]
pub struct CommandHandler {
    storage: Arc<StorageEngine>,
    persistence: Option<Arc<dyn Persistence>>,
}

impl std::fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHandler")
            .field("storage", &self.storage)
            .field("persistence", &self.persistence.is_some())
            .finish()
    }
}

impl CommandHandler {
    /// Creates a new command handler with the given storage engine.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self {
            storage,
            persistence: None,
        }
    }

    /// Attaches a persistence collaborator that records every SET.
    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// The storage engine commands run against.
    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// Executes a request and returns the reply.
    ///
    /// # Arguments
    ///
    /// * `command` - The decoded request (should be an array)
    ///
    /// # Returns
    ///
    /// The reply on success. On failure the caller renders the error with
    /// [`CommandError::to_reply`] and applies its
    /// [`disposition`](CommandError::disposition).
    pub fn execute(&self, command: RespValue) -> Result<RespValue, CommandError> {
        let args = command.into_array().ok_or(CommandError::InvalidFormat)?;

        let (name, args) = args.split_first().ok_or(CommandError::EmptyCommand)?;
        let name = name.as_bytes().ok_or(CommandError::InvalidCommandName)?;
        let name = String::from_utf8_lossy(name);

        trace!(command = %name, args = args.len(), "Executing command");
        self.dispatch(&name, args)
    }

    /// Dispatches a command to its handler.
    fn dispatch(&self, name: &str, args: &[RespValue]) -> Result<RespValue, CommandError> {
        match name.to_ascii_lowercase().as_str() {
            "ping" => Ok(self.cmd_ping()),
            "echo" => self.cmd_echo(name, args),
            "set" => self.cmd_set(name, args),
            "get" => self.cmd_get(name, args),
            _ => Err(CommandError::UnknownCommand(name.to_string())),
        }
    }

    /// Extracts the payload of a string argument.
    fn get_bytes(&self, name: &str, value: &RespValue) -> Result<Bytes, CommandError> {
        value
            .as_bytes()
            .cloned()
            .ok_or_else(|| CommandError::InvalidArgument(name.to_string()))
    }

    /// PING
    fn cmd_ping(&self) -> RespValue {
        RespValue::pong()
    }

    /// ECHO message
    fn cmd_echo(&self, name: &str, args: &[RespValue]) -> Result<RespValue, CommandError> {
        let [message] = args else {
            return Err(CommandError::WrongArity(name.to_string()));
        };

        Ok(RespValue::bulk_string(self.get_bytes(name, message)?))
    }

    /// SET key value [EX seconds | PX milliseconds]
    fn cmd_set(&self, name: &str, args: &[RespValue]) -> Result<RespValue, CommandError> {
        let (key, value, ttl) = match args {
            [key, value] => (key, value, None),
            [key, value, option, amount] => {
                (key, value, Some(self.parse_ttl(name, option, amount)?))
            }
            _ => return Err(CommandError::SetArity(name.to_string())),
        };

        let key = self.get_bytes(name, key)?;
        let value = self.get_bytes(name, value)?;

        // The log keeps wall-clock expiry; the store keeps a monotonic deadline
        let expires_at = ttl.and_then(|ttl| SystemTime::now().checked_add(ttl));

        self.storage
            .set_with(key, value, ttl, |key, value| match &self.persistence {
                Some(persistence) => persistence.record_set(key, value, expires_at),
                None => Ok(()),
            })
            .map_err(|source| CommandError::StorageFatal {
                name: name.to_string(),
                source,
            })?;

        Ok(RespValue::ok())
    }

    /// Parses the `EX seconds` / `PX milliseconds` option pair of SET.
    fn parse_ttl(
        &self,
        name: &str,
        option: &RespValue,
        amount: &RespValue,
    ) -> Result<Duration, CommandError> {
        let option = self.get_bytes(name, option)?;
        let amount = self.get_bytes(name, amount)?;

        let amount = std::str::from_utf8(&amount)
            .ok()
            .and_then(|s| s.parse::<i64>().ok());

        let to_duration: fn(u64) -> Duration = if option.eq_ignore_ascii_case(b"EX") {
            Duration::from_secs
        } else if option.eq_ignore_ascii_case(b"PX") {
            Duration::from_millis
        } else {
            return Err(CommandError::Syntax);
        };

        match amount {
            Some(n) if n > 0 => Ok(to_duration(n as u64)),
            _ => Err(CommandError::InvalidExpireTime(name.to_string())),
        }
    }

    /// GET key
    fn cmd_get(&self, name: &str, args: &[RespValue]) -> Result<RespValue, CommandError> {
        let [key] = args else {
            return Err(CommandError::WrongArity(name.to_string()));
        };

        let key = self.get_bytes(name, key)?;

        Ok(match self.storage.get(&key) {
            // A simple string cannot carry CR or LF
            Some(value) if value.iter().any(|&b| b == b'\r' || b == b'\n') => {
                RespValue::bulk_string(value)
            }
            Some(value) => RespValue::simple_string(value),
            None => RespValue::null(),
        })
    }
}
