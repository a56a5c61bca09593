//! Thread-Safe String Keyspace with Expiry Support
//!
//! The key/value half of the store: byte-string keys mapped to byte-string
//! values, each with an optional expiry instant.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Keys are spread over 64 shards, each behind its own
//!    `RwLock`, so writers to unrelated keys rarely contend.
//! 2. **Lazy Expiry**: `get` removes an expired entry it runs into.
//! 3. **Active Expiry**: the [`ExpiryReaper`](crate::storage::ExpiryReaper)
//!    calls [`Keyspace::remove_expired`] on a timer.
//!
//! Both expiry paths use [`Entry::is_expired_at`], so they always agree on
//! whether an entry is dead: an entry whose expiry is at or before "now" is
//! never returned.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Keyspace                             │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::storage::{shard_index, StoreError, NUM_SHARDS};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A stored value with optional expiry time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
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

    /// Creates a new entry that expires `ttl` from now, or `None` if that
    /// instant is not representable.
    pub fn with_ttl(value: Bytes, ttl: Duration) -> Option<Self> {
        let expires_at = Instant::now().checked_add(ttl)?;
        Some(Self {
            value,
            expires_at: Some(expires_at),
        })
    }

    /// Checks if this entry is dead at `now`.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }
}

type Shard = RwLock<HashMap<Bytes, Entry>>;

/// The string keyspace.
///
/// Designed to live inside the process-wide [`Store`](crate::storage::Store)
/// and be shared across all connection tasks. All operations are thread-safe
/// and never hold a lock across an `.await`.
///
/// # Example
///
/// ```
/// use rivulet::storage::Keyspace;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let keyspace = Keyspace::new();
///
/// keyspace.set(Bytes::from("name"), Bytes::from("Ariz"), None).unwrap();
/// assert_eq!(keyspace.get(b"name"), Some(Bytes::from("Ariz")));
///
/// keyspace
///     .set(Bytes::from("session"), Bytes::from("abc123"), Some(Duration::from_secs(60)))
///     .unwrap();
/// assert!(keyspace.exists(b"session"));
/// ```
pub struct Keyspace {
    shards: Vec<Shard>,

    /// Number of stored entries, live or not yet reaped
    key_count: AtomicU64,

    get_count: AtomicU64,
    set_count: AtomicU64,

    /// Entries removed by lazy or active expiry
    expired_count: AtomicU64,
}

impl std::fmt::Debug for Keyspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyspace")
            .field("shards", &self.shards.len())
            .field("key_count", &self.key_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyspace {
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| RwLock::new(HashMap::new())).collect(),
            key_count: AtomicU64::new(0),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    #[inline]
    fn shard(&self, key: &[u8]) -> &Shard {
        &self.shards[shard_index(key)]
    }

    /// Stores `value` under `key`, replacing any previous value and expiry.
    ///
    /// With `ttl` the entry expires `ttl` from now; without it the entry
    /// lives until overwritten. A zero TTL is rejected and the key is left
    /// untouched.
    pub fn set(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.set_unless(key, value, ttl, |_| false)
    }

    /// Like [`set`](Self::set), but refuses with `WrongType` when
    /// `is_taken(key)` holds.
    ///
    /// `is_taken` runs while the shard write lock is held, so no other writer
    /// can bind the key between the check and the insert.
    pub(crate) fn set_unless<F>(
        &self,
        key: Bytes,
        value: Bytes,
        ttl: Option<Duration>,
        is_taken: F,
    ) -> Result<(), StoreError>
    where
        F: FnOnce(&[u8]) -> bool,
    {
        let entry = match ttl {
            Some(ttl) if ttl.is_zero() => return Err(StoreError::InvalidExpiry),
            Some(ttl) => Entry::with_ttl(value, ttl).ok_or(StoreError::InvalidExpiry)?,
            None => Entry::new(value),
        };

        let mut data = self.shard(&key).write();
        if is_taken(&key[..]) {
            return Err(StoreError::WrongType);
        }

        self.set_count.fetch_add(1, Ordering::Relaxed);
        if data.insert(key, entry).is_none() {
            self.key_count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired. An expired
    /// entry is removed on the way out.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let shard = self.shard(key);

        // Fast path: read lock for live or missing keys
        {
            let data = shard.read();
            match data.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired - need write lock to remove it
        let mut data = shard.write();
        let now = Instant::now();
        match data.get(key) {
            Some(entry) if entry.is_expired_at(now) => {
                data.remove(key);
                self.key_count.fetch_sub(1, Ordering::Relaxed);
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                None
            }
            // Another writer replaced the key in between
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Checks if a key holds a live value. Never evicts.
    pub fn exists(&self, key: &[u8]) -> bool {
        self.shard(key)
            .read()
            .get(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    /// Runs `f` with whether `key` holds a live value, keeping the shard read
    /// lock until `f` returns.
    pub(crate) fn with_liveness<R>(&self, key: &[u8], f: impl FnOnce(bool) -> R) -> R {
        let data = self.shard(key).read();
        let live = data.get(key).is_some_and(|entry| !entry.is_expired());
        f(live)
    }

    /// Removes every expired entry from all shards.
    ///
    /// Returns the number of entries removed. Takes each shard's write lock
    /// in turn, so it never observes a half-written entry.
    pub fn remove_expired(&self) -> u64 {
        let mut removed = 0u64;

        for shard in &self.shards {
            let mut data = shard.write();
            let now = Instant::now();
            let before = data.len();
            data.retain(|_, entry| !entry.is_expired_at(now));
            removed += (before - data.len()) as u64;
        }

        if removed > 0 {
            self.key_count.fetch_sub(removed, Ordering::Relaxed);
            self.expired_count.fetch_add(removed, Ordering::Relaxed);
        }

        removed
    }

    /// Number of stored entries, including expired ones not yet reaped.
    pub fn len(&self) -> u64 {
        self.key_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> KeyspaceStats {
        KeyspaceStats {
            keys: self.key_count.load(Ordering::Relaxed),
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }
}

/// Keyspace counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyspaceStats {
    pub keys: u64,
    pub get_ops: u64,
    pub set_ops: u64,
    pub expired: u64,
}
