//! Append-Log Persistence
//!
//! Durability is a collaborator of the command layer, not of the storage
//! engine: for every SET the command handler hands the pair to a
//! [`Persistence`] implementation while holding the key's shard lock. A
//! failure there is fatal for the process.
//!
//! [`AppendLog`] writes each SET as a RESP array, so keys and values may hold
//! any bytes:
//!
//! ```text
//! *3\r\n$3\r\nSET\r\n$<n>\r\n<key>\r\n$<n>\r\n<value>\r\n
//! *5\r\n ... $4\r\nPXAT\r\n$<n>\r\n<unix-ms>\r\n      (with expiry)
//! ```
//!
//! The expiry is recorded as an absolute wall-clock time. Replay drops
//! records whose expiry has passed and restores the rest with the time left.

use crate::protocol::{RespParser, RespValue};
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Receives every successful write so it can be made durable.
pub trait Persistence: Send + Sync {
    /// Records that `key` now holds `value`, expiring at `expires_at` if set.
    fn record_set(
        &self,
        key: &[u8],
        value: &[u8],
        expires_at: Option<SystemTime>,
    ) -> io::Result<()>;
}

/// Appends SET records to a flat file.
#[derive(Debug)]
pub struct AppendLog {
    path: PathBuf,
    file: Mutex<File>,
}

/// Counts reported by [`AppendLog::replay`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Records applied to the store
    pub applied: usize,
    /// Records dropped because their expiry had passed
    pub expired: usize,
}

impl AppendLog {
    /// Opens (creating if needed) the log at `path` for appending.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!(path = %path.display(), "Append log opened");

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads every record in the log at `path` into `engine`.
    ///
    /// Later records overwrite earlier ones. A missing file loads nothing. A
    /// record cut short at the end of the file (a torn final write) is
    /// ignored; any other malformed data is an `InvalidData` error.
    pub fn replay(path: impl AsRef<Path>, engine: &StorageEngine) -> io::Result<ReplayStats> {
        let path = path.as_ref();
        let contents = match std::fs::read(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ReplayStats::default()),
            Err(e) => return Err(e),
        };

        let parser = RespParser::new();
        let now = SystemTime::now();
        let mut stats = ReplayStats::default();
        let mut offset = 0;

        while offset < contents.len() {
            let parsed = parser
                .parse(&contents[offset..])
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

            let Some((record, consumed)) = parsed else {
                warn!(
                    path = %path.display(),
                    bytes = contents.len() - offset,
                    "Ignoring truncated record at end of append log"
                );
                break;
            };
            offset += consumed;

            let (key, value, expires_at) = decode_record(record).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("malformed append log record at byte {}", offset - consumed),
                )
            })?;

            match expires_at {
                None => {
                    engine.set(key, value);
                    stats.applied += 1;
                }
                Some(at) => match at.duration_since(now) {
                    Ok(left) if !left.is_zero() => {
                        engine.set_with_ttl(key, value, left);
                        stats.applied += 1;
                    }
                    _ => stats.expired += 1,
                },
            }
        }

        debug!(
            path = %path.display(),
            applied = stats.applied,
            expired = stats.expired,
            "Append log replayed"
        );
        Ok(stats)
    }
}

/// Splits a `SET key value [PXAT unix-ms]` record into its parts.
fn decode_record(record: RespValue) -> Option<(Bytes, Bytes, Option<SystemTime>)> {
    let parts = record.into_array()?;
    let (key, value, expiry) = match parts.as_slice() {
        [cmd, key, value] if is_word(cmd, b"SET") => (key, value, None),
        [cmd, key, value, opt, at] if is_word(cmd, b"SET") && is_word(opt, b"PXAT") => {
            let millis = std::str::from_utf8(at.as_bytes()?)
                .ok()?
                .parse::<u64>()
                .ok()?;
            let at = UNIX_EPOCH.checked_add(Duration::from_millis(millis))?;
            (key, value, Some(at))
        }
        _ => return None,
    };

    Some((key.as_bytes()?.clone(), value.as_bytes()?.clone(), expiry))
}

fn is_word(value: &RespValue, word: &[u8]) -> bool {
    value
        .as_bytes()
        .is_some_and(|bytes| bytes.eq_ignore_ascii_case(word))
}

fn encode_record(key: &[u8], value: &[u8], expires_at: Option<SystemTime>) -> Vec<u8> {
    let mut parts = vec![
        RespValue::bulk_string("SET"),
        RespValue::bulk_string(Bytes::copy_from_slice(key)),
        RespValue::bulk_string(Bytes::copy_from_slice(value)),
    ];

    if let Some(at) = expires_at {
        // A time before the epoch is already in the past; zero replays as expired.
        let millis = at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        parts.push(RespValue::bulk_string("PXAT"));
        parts.push(RespValue::bulk_string(millis.to_string()));
    }

    let mut record = Vec::with_capacity(key.len() + value.len() + 64);
    RespValue::array(parts).serialize_into(&mut record);
    record
}

impl Persistence for AppendLog {
    fn record_set(
        &self,
        key: &[u8],
        value: &[u8],
        expires_at: Option<SystemTime>,
    ) -> io::Result<()> {
        let record = encode_record(key, value, expires_at);

        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(&record)?;
        file.flush()
    }
}
