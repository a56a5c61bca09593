//! The process-wide store: strings and streams behind one namespace.

use crate::storage::stream::current_millis;
use crate::storage::{Keyspace, StoreError, StreamEntry, StreamId, StreamStore};
use bytes::Bytes;
use std::time::Duration;

/// What a name is bound to, as reported by `TYPE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    String,
    Stream,
    None,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::String => "string",
            KeyType::Stream => "stream",
            KeyType::None => "none",
        }
    }
}

/// Owns the keyspace and the stream store.
///
/// Built once at startup and shared by `Arc` with every connection.
#[derive(Debug, Default)]
pub struct Store {
    keyspace: Keyspace,
    streams: StreamStore,
}

impl Store {
    pub fn new() -> Self {
        Self {
            keyspace: Keyspace::new(),
            streams: StreamStore::new(),
        }
    }

    pub fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    pub fn streams(&self) -> &StreamStore {
        &self.streams
    }

    /// Stores a string value. Fails with `WrongType` if `key` is a stream.
    pub fn set(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) -> Result<(), StoreError> {
        let streams = &self.streams;
        self.keyspace
            .set_unless(key, value, ttl, |key| streams.contains(key))
    }

    /// Reads a string value. Fails with `WrongType` if `key` is a stream.
    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>, StoreError> {
        if self.streams.contains(key) {
            return Err(StoreError::WrongType);
        }
        Ok(self.keyspace.get(key))
    }

    /// Appends to a stream using the wall clock for `*` tokens.
    pub fn xadd(
        &self,
        key: Bytes,
        token: &[u8],
        fields: Vec<(Bytes, Bytes)>,
    ) -> Result<StreamId, StoreError> {
        self.xadd_at(key, token, fields, current_millis())
    }

    /// Appends to a stream. Fails with `WrongType` if `key` holds a live
    /// string.
    pub fn xadd_at(
        &self,
        key: Bytes,
        token: &[u8],
        fields: Vec<(Bytes, Bytes)>,
        now_ms: u64,
    ) -> Result<StreamId, StoreError> {
        let probe = key.clone();
        self.keyspace.with_liveness(&probe, |is_string| {
            if is_string {
                return Err(StoreError::WrongType);
            }
            self.streams.append_at(key, token, fields, now_ms)
        })
    }

    /// Fails with `WrongType` if `key` holds a live string.
    pub fn xrange(
        &self,
        key: &[u8],
        start: StreamId,
        end: StreamId,
        count: Option<usize>,
    ) -> Result<Vec<StreamEntry>, StoreError> {
        self.ensure_not_string(key)?;
        self.streams.range(key, start, end, count)
    }

    /// Reads each `(stream, after)` pair in order. Any failing stream fails
    /// the whole read.
    pub fn xread(
        &self,
        requests: &[(Bytes, StreamId)],
        count: usize,
    ) -> Result<Vec<(Bytes, Vec<StreamEntry>)>, StoreError> {
        requests
            .iter()
            .map(|(key, after)| {
                self.ensure_not_string(key)?;
                let entries = self.streams.read_after(key, *after, count)?;
                Ok((key.clone(), entries))
            })
            .collect()
    }

    /// Entry count, 0 for a missing stream.
    pub fn xlen(&self, key: &[u8]) -> Result<usize, StoreError> {
        self.ensure_not_string(key)?;
        Ok(self.streams.len(key))
    }

    fn ensure_not_string(&self, key: &[u8]) -> Result<(), StoreError> {
        if self.keyspace.exists(key) {
            return Err(StoreError::WrongType);
        }
        Ok(())
    }

    pub fn key_type(&self, key: &[u8]) -> KeyType {
        if self.streams.contains(key) {
            KeyType::Stream
        } else if self.keyspace.exists(key) {
            KeyType::String
        } else {
            KeyType::None
        }
    }

    pub fn exists(&self, key: &[u8]) -> bool {
        self.key_type(key) != KeyType::None
    }

    /// Stored strings plus streams. Expired strings count until reaped.
    pub fn dbsize(&self) -> u64 {
        self.keyspace.len() + self.streams.stream_count() as u64
    }

    /// Removes expired strings. Called by the reaper.
    pub fn remove_expired(&self) -> u64 {
        self.keyspace.remove_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn b(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    fn fields(pairs: &[(&str, &str)]) -> Vec<(Bytes, Bytes)> {
        pairs.iter().map(|(f, v)| (b(f), b(v))).collect()
    }

    #[test]
    fn test_key_type() {
        let store = Store::new();
        store.set(b("s"), b("v"), None).unwrap();
        store.xadd(b("log"), b"1-1", fields(&[("a", "1")])).unwrap();

        assert_eq!(store.key_type(b"s"), KeyType::String);
        assert_eq!(store.key_type(b"log"), KeyType::Stream);
        assert_eq!(store.key_type(b"missing"), KeyType::None);
        assert_eq!(KeyType::Stream.as_str(), "stream");
    }

    #[test]
    fn test_set_on_stream_is_wrong_type() {
        let store = Store::new();
        store.xadd(b("log"), b"1-1", fields(&[("a", "1")])).unwrap();

        assert_eq!(store.set(b("log"), b("v"), None), Err(StoreError::WrongType));
        assert_eq!(store.get(b"log"), Err(StoreError::WrongType));
        assert_eq!(store.xlen(b"log"), Ok(1));
    }

    #[test]
    fn test_xadd_on_string_is_wrong_type() {
        let store = Store::new();
        store.set(b("s"), b("v"), None).unwrap();

        assert_eq!(
            store.xadd(b("s"), b"1-1", fields(&[("a", "1")])),
            Err(StoreError::WrongType)
        );
        assert!(!store.streams().contains(b"s"));
        assert_eq!(store.get(b"s"), Ok(Some(b("v"))));
    }

    #[test]
    fn test_stream_reads_on_string_are_wrong_type() {
        let store = Store::new();
        store.set(b("s"), b("v"), None).unwrap();

        assert_eq!(
            store.xrange(b"s", StreamId::MIN, StreamId::MAX, None),
            Err(StoreError::WrongType)
        );
        assert_eq!(
            store.xread(&[(b("s"), StreamId::MIN)], 1),
            Err(StoreError::WrongType)
        );
        assert_eq!(store.xlen(b"s"), Err(StoreError::WrongType));
        assert_eq!(store.xlen(b"missing"), Ok(0));
    }

    #[test]
    fn test_xadd_over_expired_string() {
        let store = Store::new();
        store
            .set(b("s"), b("v"), Some(Duration::from_millis(10)))
            .unwrap();
        thread::sleep(Duration::from_millis(20));

        let id = store.xadd(b("s"), b"1-1", fields(&[("a", "1")])).unwrap();
        assert_eq!(id, StreamId::new(1, 1));
        assert_eq!(store.key_type(b"s"), KeyType::Stream);
    }

    #[test]
    fn test_expired_string_type_is_none() {
        let store = Store::new();
        store
            .set(b("foo"), b("bar"), Some(Duration::from_millis(100)))
            .unwrap();
        assert_eq!(store.get(b"foo"), Ok(Some(b("bar"))));

        thread::sleep(Duration::from_millis(150));
        assert_eq!(store.get(b"foo"), Ok(None));
        assert_eq!(store.key_type(b"foo"), KeyType::None);
    }

    #[test]
    fn test_xread_multiple_streams() {
        let store = Store::new();
        store.xadd(b("a"), b"1-0", fields(&[("x", "1")])).unwrap();
        store.xadd(b("a"), b"2-0", fields(&[("x", "2")])).unwrap();
        store.xadd(b("b"), b"5-0", fields(&[("y", "1")])).unwrap();

        let result = store
            .xread(&[(b("a"), StreamId::new(1, 0)), (b("b"), StreamId::MIN)], 1)
            .unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].0, b("a"));
        assert_eq!(result[0].1[0].id, StreamId::new(2, 0));
        assert_eq!(result[1].0, b("b"));
        assert_eq!(result[1].1[0].id, StreamId::new(5, 0));

        assert!(matches!(
            store.xread(&[(b("a"), StreamId::MIN), (b("zz"), StreamId::MIN)], 1),
            Err(StoreError::NoSuchStream(_))
        ));
    }

    #[test]
    fn test_exists_and_dbsize() {
        let store = Store::new();
        store.set(b("k1"), b("v"), None).unwrap();
        store.set(b("k2"), b("v"), None).unwrap();
        store.xadd(b("log"), b"1-1", fields(&[("a", "1")])).unwrap();

        assert!(store.exists(b"k1"));
        assert!(store.exists(b"log"));
        assert!(!store.exists(b"nope"));
        assert_eq!(store.dbsize(), 3);
    }

    #[test]
    fn test_concurrent_set_and_xadd_never_bind_both() {
        for round in 0..50 {
            let store = Arc::new(Store::new());
            let name = format!("name{}", round);

            let setter = {
                let store = Arc::clone(&store);
                let name = b(&name);
                thread::spawn(move || store.set(name, b("v"), None).is_ok())
            };
            let adder = {
                let store = Arc::clone(&store);
                let name = b(&name);
                thread::spawn(move || store.xadd(name, b"1-1", fields(&[("a", "1")])).is_ok())
            };

            let set_ok = setter.join().unwrap();
            let add_ok = adder.join().unwrap();

            assert!(set_ok != add_ok, "exactly one writer binds the name");
            assert_eq!(store.dbsize(), 1);
        }
    }
}
