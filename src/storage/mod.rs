//! Storage Module
//!
//! Everything Rivulet keeps in memory lives here: plain string values with
//! optional expiry, append-only streams, and the background reaper that
//! evicts expired strings nobody reads any more.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                            Store                             │
//! │  ┌──────────────────────────┐  ┌──────────────────────────┐  │
//! │  │         Keyspace         │  │       StreamStore        │  │
//! │  │  64 x RwLock<HashMap>    │  │  64 x RwLock<HashMap>    │  │
//! │  │  Bytes -> Entry (+TTL)   │  │  Bytes -> Stream         │  │
//! │  └──────────────────────────┘  └──────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//!                 ▲
//!                 │ remove_expired()
//!      ┌──────────┴──────────┐
//!      │    ExpiryReaper     │
//!      │ (Background Task)   │
//!      └─────────────────────┘
//! ```
//!
//! Strings and streams share one namespace. [`Store`] enforces that a name
//! is bound to at most one kind of value; when it needs both maps it always
//! locks the keyspace shard before the stream shard.
//!
//! ## Example
//!
//! ```
//! use rivulet::storage::{KeyType, Store};
//! use bytes::Bytes;
//!
//! let store = Store::new();
//! store.set(Bytes::from("name"), Bytes::from("Ariz"), None).unwrap();
//! assert_eq!(store.get(b"name").unwrap(), Some(Bytes::from("Ariz")));
//!
//! let fields = vec![(Bytes::from("temp"), Bytes::from("21"))];
//! store.xadd(Bytes::from("sensor"), b"*", fields).unwrap();
//! assert_eq!(store.key_type(b"sensor"), KeyType::Stream);
//! ```

pub mod error;
pub mod expiry;
pub mod keyspace;
pub mod store;
pub mod stream;

pub use error::StoreError;
pub use expiry::{ExpiryConfig, ExpiryReaper};
pub use keyspace::{Entry, Keyspace, KeyspaceStats};
pub use store::{KeyType, Store};
pub use stream::{Bound, StreamEntry, StreamId, StreamStore};

use std::hash::{DefaultHasher, Hash, Hasher};

/// Number of shards in both the keyspace and the stream store.
/// More shards = less lock contention, but more memory overhead.
pub const NUM_SHARDS: usize = 64;

/// Maps a key to its shard.
#[inline]
pub(crate) fn shard_index(key: &[u8]) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % NUM_SHARDS
}
