//! Thread-Safe Storage Engine with Lazy Expiry
//!
//! This module implements the key-value store shared by every connection.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Keys are spread across shards, each behind its own lock.
//! 2. **Lazy Expiry**: An expired entry is removed when it is next read. There is
//!    no background sweep, no capacity bound and no eviction policy.
//! 3. **Whole-Entry Writes**: A write replaces value and expiry together, so a
//!    reader never observes a half-updated entry.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use bytes::Bytes;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Number of shards for the storage engine.
const NUM_SHARDS: usize = 64;

/// A stored value with an optional absolute expiry instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The stored value
    pub value: Bytes,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Creates a new entry without expiry.
    pub fn new(value: Bytes) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    /// Creates a new entry that expires `ttl` from now.
    ///
    /// A `ttl` too large to represent as an instant never expires.
    pub fn with_ttl(value: Bytes, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    /// An entry is expired once its expiry instant is not after `now`.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }
}

#[derive(Debug, Default)]
struct Shard {
    data: RwLock<HashMap<Bytes, Entry>>,
}

impl Shard {
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Bytes, Entry>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Bytes, Entry>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The key-value store shared across all client connections.
///
/// Locking is internal; callers only see `get`, `set` and `set_with_ttl`.
/// Wrap it in an `Arc` to share it between tasks.
///
/// # Example
///
/// ```
/// use minikv::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.set(Bytes::from("name"), Bytes::from("Ariz"));
/// assert_eq!(engine.get(b"name"), Some(Bytes::from("Ariz")));
///
/// engine.set_with_ttl(Bytes::from("session"), Bytes::from("abc123"), Duration::from_secs(60));
/// assert_eq!(engine.get(b"session"), Some(Bytes::from("abc123")));
/// ```
pub struct StorageEngine {
    shards: Vec<Shard>,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("keys", &self.len())
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates an empty storage engine.
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS).map(|_| Shard::default()).collect();
        Self { shards }
    }

    #[inline]
    fn get_shard(&self, key: &[u8]) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    /// Stores `value` under `key` with no expiry.
    ///
    /// Replaces any previous entry, including its TTL.
    /// Returns `true` if the key did not exist before.
    pub fn set(&self, key: Bytes, value: Bytes) -> bool {
        self.insert(key, Entry::new(value))
    }

    /// Stores `value` under `key`, expiring `ttl` from now.
    ///
    /// `ttl` must be positive; validating it is the caller's job.
    /// Returns `true` if the key did not exist before.
    pub fn set_with_ttl(&self, key: Bytes, value: Bytes, ttl: Duration) -> bool {
        self.insert(key, Entry::with_ttl(value, ttl))
    }

    /// Stores `value` under `key` once `before_insert` has succeeded.
    ///
    /// The shard's write lock is held across `before_insert` and the insert,
    /// so writes to one key reach both in the same order. If `before_insert`
    /// fails the store is left untouched and its error is returned.
    pub fn set_with<E>(
        &self,
        key: Bytes,
        value: Bytes,
        ttl: Option<Duration>,
        before_insert: impl FnOnce(&[u8], &[u8]) -> Result<(), E>,
    ) -> Result<bool, E> {
        let mut data = self.get_shard(&key).write();
        before_insert(&key, &value)?;

        let entry = match ttl {
            Some(ttl) => Entry::with_ttl(value, ttl),
            None => Entry::new(value),
        };
        Ok(data.insert(key, entry).is_none())
    }

    fn insert(&self, key: Bytes, entry: Entry) -> bool {
        let mut data = self.get_shard(&key).write();
        data.insert(key, entry).is_none()
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired. An expired
    /// entry is removed here, so later lookups are plain misses.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        let shard = self.get_shard(key);

        // Fast path under the read lock
        {
            let data = shard.read();
            match data.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: re-check under the write lock since another writer may have
        // replaced the entry in between.
        let mut data = shard.write();
        match data.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.value.clone()),
            Some(_) => {
                data.remove(key);
                None
            }
            None => None,
        }
    }

    /// Number of entries currently held, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.read().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_set_get() {
        let engine = StorageEngine::new();

        assert!(engine.set(Bytes::from("key"), Bytes::from("value")));
        assert_eq!(engine.get(b"key"), Some(Bytes::from("value")));
    }

    #[test]
    fn test_get_missing() {
        let engine = StorageEngine::new();
        assert_eq!(engine.get(b"nope"), None);
    }

    #[test]
    fn test_set_overwrites() {
        let engine = StorageEngine::new();

        assert!(engine.set(Bytes::from("key"), Bytes::from("one")));
        assert!(!engine.set(Bytes::from("key"), Bytes::from("two")));
        assert_eq!(engine.get(b"key"), Some(Bytes::from("two")));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_empty_value_is_found() {
        let engine = StorageEngine::new();
        engine.set(Bytes::from("key"), Bytes::new());
        assert_eq!(engine.get(b"key"), Some(Bytes::new()));
    }

    #[test]
    fn test_set_with_ttl_visible_before_expiry() {
        let engine = StorageEngine::new();

        engine.set_with_ttl(
            Bytes::from("key"),
            Bytes::from("value"),
            Duration::from_secs(60),
        );
        assert_eq!(engine.get(b"key"), Some(Bytes::from("value")));
    }

    #[test]
    fn test_lazy_expiry_removes_entry() {
        let engine = StorageEngine::new();

        engine.set_with_ttl(
            Bytes::from("key"),
            Bytes::from("value"),
            Duration::from_millis(50),
        );
        assert_eq!(engine.get(b"key"), Some(Bytes::from("value")));

        thread::sleep(Duration::from_millis(100));

        // Still held until something looks at it
        assert_eq!(engine.len(), 1);

        assert_eq!(engine.get(b"key"), None);
        assert_eq!(engine.len(), 0);
        assert!(engine.is_empty());

        // Second lookup is a plain miss
        assert_eq!(engine.get(b"key"), None);
    }

    #[test]
    fn test_set_clears_previous_ttl() {
        let engine = StorageEngine::new();

        engine.set_with_ttl(
            Bytes::from("key"),
            Bytes::from("old"),
            Duration::from_millis(30),
        );
        engine.set(Bytes::from("key"), Bytes::from("new"));

        thread::sleep(Duration::from_millis(60));

        assert_eq!(engine.get(b"key"), Some(Bytes::from("new")));
    }

    #[test]
    fn test_set_with_ttl_replaces_persistent_entry() {
        let engine = StorageEngine::new();

        engine.set(Bytes::from("key"), Bytes::from("old"));
        engine.set_with_ttl(
            Bytes::from("key"),
            Bytes::from("new"),
            Duration::from_millis(30),
        );
        assert_eq!(engine.get(b"key"), Some(Bytes::from("new")));

        thread::sleep(Duration::from_millis(60));

        assert_eq!(engine.get(b"key"), None);
    }

    #[test]
    fn test_entry_expiry_boundary() {
        let now = Instant::now();
        let entry = Entry {
            value: Bytes::from("v"),
            expires_at: Some(now),
        };
        assert!(entry.is_expired_at(now));
        assert!(!entry.is_expired_at(now - Duration::from_millis(1)));
        assert!(!Entry::new(Bytes::from("v")).is_expired());
    }

    #[test]
    fn test_set_with_failure_leaves_store_untouched() {
        let engine = StorageEngine::new();

        let result = engine.set_with(Bytes::from("key"), Bytes::from("v"), None, |_, _| {
            Err("log unavailable")
        });
        assert_eq!(result, Err("log unavailable"));
        assert!(engine.is_empty());

        let result = engine.set_with(
            Bytes::from("key"),
            Bytes::from("v"),
            Some(Duration::from_secs(60)),
            |key, value| {
                assert_eq!((key, value), (&b"key"[..], &b"v"[..]));
                Ok::<_, ()>(())
            },
        );
        assert_eq!(result, Ok(true));
        assert_eq!(engine.get(b"key"), Some(Bytes::from("v")));
    }

    #[test]
    fn test_set_with_orders_writes_to_same_key() {
        let engine = Arc::new(StorageEngine::new());
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let slow = {
            let engine = Arc::clone(&engine);
            let order = Arc::clone(&order);
            thread::spawn(move || {
                engine.set_with(Bytes::from("k"), Bytes::from("a"), None, |_, value| {
                    order.lock().unwrap().push(value.to_vec());
                    thread::sleep(Duration::from_millis(100));
                    Ok::<_, ()>(())
                })
            })
        };

        thread::sleep(Duration::from_millis(20));
        engine
            .set_with(Bytes::from("k"), Bytes::from("b"), None, |_, value| {
                order.lock().unwrap().push(value.to_vec());
                Ok::<_, ()>(())
            })
            .unwrap();
        slow.join().unwrap().unwrap();

        let order = order.lock().unwrap();
        assert_eq!(*order, vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(engine.get(b"k"), Some(Bytes::from("b")));
    }

    #[test]
    fn test_concurrent_access() {
        let engine = Arc::new(StorageEngine::new());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    for i in 0..500 {
                        let key = Bytes::from(format!("key:{}:{}", t, i));
                        engine.set(key.clone(), Bytes::from(format!("{}", i)));
                        assert_eq!(engine.get(&key), Some(Bytes::from(format!("{}", i))));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.len(), 8 * 500);
    }
}
