//! Append-Only Streams
//!
//! A stream is a named log of entries. Every entry carries a [`StreamId`]
//! `(ms, seq)` and an ordered list of field/value pairs. IDs inside one
//! stream are strictly increasing, so the log is always sorted and range
//! queries are binary searches.
//!
//! ## ID Resolution
//!
//! `XADD` accepts three kinds of ID token, resolved against the stream's
//! cached `last_id` (`0-0` for a new stream):
//!
//! | Token        | ms                  | seq                                   |
//! |--------------|---------------------|---------------------------------------|
//! | `*`          | wall clock (millis) | `last.seq + 1` if ms == last.ms, else 0 |
//! | `<ms>-*`     | `<ms>`              | `last.seq + 1` if ms == last.ms, else 0 |
//! | `<ms>-<seq>` | `<ms>`              | `<seq>`                               |
//!
//! The resolved ID must be greater than `0-0` and greater than `last_id`.
//! Auto-generated IDs are checked too, so a clock that steps backwards makes
//! `XADD s *` fail instead of breaking the ordering.
//!
//! ## Concurrency
//!
//! Streams are sharded like the keyspace. Resolution and the append happen
//! under the shard write lock, so two appends to the same stream are
//! linearized and the second one always sees the first one's `last_id`.
//! Range and tail reads take the read lock and see an append entirely or not
//! at all.

use crate::storage::{shard_index, StoreError, NUM_SHARDS};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Identifier of a stream entry, ordered by `ms` then `seq`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId {
    pub ms: u64,
    pub seq: u64,
}

/// Which end of a range a bare `<ms>` bound stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Start,
    End,
}

impl StreamId {
    pub const MIN: StreamId = StreamId { ms: 0, seq: 0 };
    pub const MAX: StreamId = StreamId {
        ms: u64::MAX,
        seq: u64::MAX,
    };

    pub const fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }

    /// Parses an explicit `<ms>-<seq>` ID.
    pub fn parse(token: &[u8]) -> Result<Self, StoreError> {
        let (ms, seq) = split_token(token)?;
        let seq = seq.ok_or(StoreError::InvalidIdFormat)?;
        Ok(Self::new(parse_part(ms)?, parse_part(seq)?))
    }

    /// Parses a range bound: `-`, `+`, `<ms>` or `<ms>-<seq>`.
    ///
    /// A bare `<ms>` means the first ID of that millisecond for a start bound
    /// and the last one for an end bound.
    pub fn parse_bound(token: &[u8], bound: Bound) -> Result<Self, StoreError> {
        match token {
            b"-" => return Ok(Self::MIN),
            b"+" => return Ok(Self::MAX),
            _ => {}
        }

        let (ms, seq) = split_token(token)?;
        let ms = parse_part(ms)?;
        let seq = match (seq, bound) {
            (Some(seq), _) => parse_part(seq)?,
            (None, Bound::Start) => 0,
            (None, Bound::End) => u64::MAX,
        };
        Ok(Self::new(ms, seq))
    }

    /// Resolves an `XADD` ID token against the stream's last ID.
    ///
    /// `now_ms` is the wall clock used by `*`.
    pub fn resolve(token: &[u8], last: StreamId, now_ms: u64) -> Result<Self, StoreError> {
        let next_seq = |ms: u64| -> Result<u64, StoreError> {
            if ms != last.ms {
                return Ok(0);
            }
            last.seq.checked_add(1).ok_or(StoreError::IdNotMonotonic)
        };

        let id = if token == b"*" {
            Self::new(now_ms, next_seq(now_ms)?)
        } else {
            let (ms, seq) = split_token(token)?;
            let ms = parse_part(ms)?;
            match seq {
                Some(b"*") => Self::new(ms, next_seq(ms)?),
                Some(seq) => Self::new(ms, parse_part(seq)?),
                None => return Err(StoreError::InvalidIdFormat),
            }
        };

        if id == Self::MIN {
            return Err(StoreError::IdMustExceedZero);
        }
        if id <= last {
            return Err(StoreError::IdNotMonotonic);
        }
        Ok(id)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

/// Splits `<ms>` or `<ms>-<seq>`.
fn split_token(token: &[u8]) -> Result<(&[u8], Option<&[u8]>), StoreError> {
    let mut parts = token.splitn(2, |&b| b == b'-');
    let ms = parts.next().ok_or(StoreError::InvalidIdFormat)?;
    Ok((ms, parts.next()))
}

/// Parses a non-empty run of ASCII digits.
fn parse_part(part: &[u8]) -> Result<u64, StoreError> {
    if part.is_empty() || !part.iter().all(u8::is_ascii_digit) {
        return Err(StoreError::InvalidIdFormat);
    }
    std::str::from_utf8(part)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(StoreError::InvalidIdFormat)
}

/// Milliseconds since the Unix epoch.
pub fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One entry of a stream. Field order is the order the writer supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: StreamId,
    pub fields: Vec<(Bytes, Bytes)>,
}

/// A single stream: entries sorted by ID plus the cached greatest ID.
#[derive(Debug, Default)]
pub struct Stream {
    entries: Vec<StreamEntry>,
    last_id: StreamId,
}

impl Stream {
    pub fn last_id(&self) -> StreamId {
        self.last_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves `token` and appends the entry.
    ///
    /// On error the stream is left unchanged.
    pub fn append(
        &mut self,
        token: &[u8],
        fields: Vec<(Bytes, Bytes)>,
        now_ms: u64,
    ) -> Result<StreamId, StoreError> {
        let id = StreamId::resolve(token, self.last_id, now_ms)?;
        self.entries.push(StreamEntry { id, fields });
        self.last_id = id;
        Ok(id)
    }

    /// Entries with `start <= id <= end`, ascending.
    pub fn range(&self, start: StreamId, end: StreamId, count: Option<usize>) -> Vec<StreamEntry> {
        if start > end {
            return Vec::new();
        }
        let lo = self.entries.partition_point(|e| e.id < start);
        let hi = self.entries.partition_point(|e| e.id <= end);
        let take = count.unwrap_or(usize::MAX);
        self.entries[lo..hi].iter().take(take).cloned().collect()
    }

    /// Up to `count` entries with `id > after`, ascending.
    pub fn entries_after(&self, after: StreamId, count: usize) -> Vec<StreamEntry> {
        let lo = self.entries.partition_point(|e| e.id <= after);
        self.entries[lo..].iter().take(count).cloned().collect()
    }
}

type Shard = RwLock<HashMap<Bytes, Stream>>;

/// All streams of the store.
///
/// # Example
///
/// ```
/// use rivulet::storage::{StreamId, StreamStore};
/// use bytes::Bytes;
///
/// let streams = StreamStore::new();
/// let fields = vec![(Bytes::from("temp"), Bytes::from("25"))];
///
/// let id = streams.append(Bytes::from("sensor"), b"1-1", fields).unwrap();
/// assert_eq!(id, StreamId::new(1, 1));
///
/// let entries = streams.range(b"sensor", StreamId::MIN, StreamId::MAX, None).unwrap();
/// assert_eq!(entries.len(), 1);
/// ```
pub struct StreamStore {
    shards: Vec<Shard>,
}

impl fmt::Debug for StreamStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamStore")
            .field("shards", &self.shards.len())
            .field("streams", &self.stream_count())
            .finish()
    }
}

impl Default for StreamStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamStore {
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    #[inline]
    fn shard(&self, key: &[u8]) -> &Shard {
        &self.shards[shard_index(key)]
    }

    /// Appends an entry using the wall clock for `*` tokens.
    pub fn append(
        &self,
        key: Bytes,
        token: &[u8],
        fields: Vec<(Bytes, Bytes)>,
    ) -> Result<StreamId, StoreError> {
        self.append_at(key, token, fields, current_millis())
    }

    /// Appends an entry, creating the stream on first use.
    ///
    /// A failed append never creates an empty stream.
    pub fn append_at(
        &self,
        key: Bytes,
        token: &[u8],
        fields: Vec<(Bytes, Bytes)>,
        now_ms: u64,
    ) -> Result<StreamId, StoreError> {
        let mut streams = self.shard(&key).write();

        if let Some(stream) = streams.get_mut(&key) {
            return stream.append(token, fields, now_ms);
        }

        let mut stream = Stream::default();
        let id = stream.append(token, fields, now_ms)?;
        streams.insert(key, stream);
        Ok(id)
    }

    /// Entries of `key` between `start` and `end` inclusive.
    pub fn range(
        &self,
        key: &[u8],
        start: StreamId,
        end: StreamId,
        count: Option<usize>,
    ) -> Result<Vec<StreamEntry>, StoreError> {
        let streams = self.shard(key).read();
        let stream = streams
            .get(key)
            .ok_or_else(|| StoreError::no_such_stream(key))?;
        Ok(stream.range(start, end, count))
    }

    /// Up to `count` entries of `key` strictly after `after`.
    ///
    /// Fails with `NoSuchEntry` when nothing newer exists.
    pub fn read_after(
        &self,
        key: &[u8],
        after: StreamId,
        count: usize,
    ) -> Result<Vec<StreamEntry>, StoreError> {
        let streams = self.shard(key).read();
        let stream = streams
            .get(key)
            .ok_or_else(|| StoreError::no_such_stream(key))?;

        let entries = stream.entries_after(after, count);
        if entries.is_empty() {
            return Err(StoreError::NoSuchEntry {
                stream: String::from_utf8_lossy(key).into_owned(),
                after: after.to_string(),
            });
        }
        Ok(entries)
    }

    /// Number of entries in `key`, 0 if it does not exist.
    pub fn len(&self, key: &[u8]) -> usize {
        self.shard(key).read().get(key).map_or(0, Stream::len)
    }

    /// The greatest ID ever appended to `key`.
    pub fn last_id(&self, key: &[u8]) -> Option<StreamId> {
        self.shard(key).read().get(key).map(Stream::last_id)
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.shard(key).read().contains_key(key)
    }

    /// Number of streams.
    pub fn stream_count(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }
}
