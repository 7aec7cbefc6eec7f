//! The map engine: an open-addressed hash table over an append-only record
//! log.
//!
//! Keys and values live as raw bytes in a paged data log; the table itself
//! is two parallel arrays holding each bucket's key hash and record offset.
//! Records are appended at the write cursor and mutated only by flipping
//! their flag from ACTIVE to DELETED in place; space is reclaimed by replay,
//! either when the log or table grows or on compaction. Deleted slots stay
//! behind as tombstones so linear probing can walk past them, and inserts
//! reuse the first tombstone seen on their probe path.
//!
//! The log entry layout is:
//!
//! - Flag as u8: 1 for active, 2 for deleted.
//! - Key hash as little-endian i32.
//! - Expiry time as little-endian u64 epoch-ms, 0 for never.
//! - Key length as little-endian u32, omitted for fixed-length key codecs.
//! - Value length as little-endian u32, omitted for fixed-length value
//!   codecs.
//! - Key and value as raw codec bytes.
//!
//! Log offset 0 is reserved as the index's empty-slot sentinel; the first
//! record begins at offset 1.

mod iter;
mod snapshot;

pub use iter::{Batches, Entries, Keys, Values};

use crate::cache::HotCache;
use crate::codec::{Codec, TagCodec, Value};
use crate::errinput;
use crate::error::{Error, Result};
use crate::event::EventSink;
use crate::hash::HashKey;
use crate::persist::{PersistOptions, Persistence};
use crate::storage::{PagedBytes, DEFAULT_PAGE_BYTES};

/// Record flag: the entry is live.
const FLAG_ACTIVE: u8 = 1;
/// Record flag: the entry has been deleted or superseded.
const FLAG_DELETED: u8 = 2;

/// Flag + hash + expiry.
const HEADER_BYTES: u64 = 1 + 4 + 8;

/// Offset 0 is the index's empty-slot sentinel, so the log starts at 1.
const LOG_START: u64 = 1;

/// Keys at or above this length are compared with the storage's bulk
/// equality primitive; shorter keys byte-by-byte. Purely an optimization
/// knob, never observable.
const BULK_COMPARE_MIN: usize = 48;

/// Default initial bucket count.
const DEFAULT_CAPACITY: usize = 16384;
/// Default initial log size: 10 MiB.
const DEFAULT_LOG_BYTES: u64 = 10 << 20;
/// Smallest log the map will allocate.
const MIN_LOG_BYTES: u64 = 64;

/// Auto-compaction policy, evaluated on mutating operations.
#[derive(Clone, Copy, Debug)]
pub struct CompactionOptions {
    /// Compact automatically when the thresholds below are met.
    pub auto_compact: bool,
    /// Tombstone fraction above which to compact.
    pub threshold: f64,
    /// Minimum live + tombstone population before auto-compaction kicks in.
    pub min_size: usize,
}

impl Default for CompactionOptions {
    fn default() -> Self {
        Self { auto_compact: true, threshold: 0.3, min_size: 1000 }
    }
}

/// Map configuration. Construct with [`Options::new`] (or
/// [`Options::tagged`] for dynamically typed maps) and chain `with_*`
/// builders; everything has a default except the codecs.
pub struct Options<K, V> {
    /// Initial bucket count, rounded up to a power of two.
    pub capacity: usize,
    /// Initial data log size in bytes.
    pub log_bytes: u64,
    /// Page size of the data log.
    pub page_bytes: u64,
    /// Default TTL in milliseconds for entries written without one; 0 means
    /// entries never expire.
    pub ttl: u64,
    /// Hot-cache capacity in entries; 0 disables the cache.
    pub cache_size: usize,
    pub compaction: CompactionOptions,
    pub persistence: Option<PersistOptions>,
    pub key_codec: Box<dyn Codec<K>>,
    pub value_codec: Box<dyn Codec<V>>,
    pub hasher: Box<dyn Fn(&K) -> i32>,
    /// Millisecond clock used for TTL decisions. Tests inject a manual one.
    pub clock: Box<dyn Fn() -> u64>,
}

impl<K, V> Options<K, V> {
    /// Creates options with the given codecs and the default hasher for the
    /// key type.
    pub fn new(
        key_codec: impl Codec<K> + 'static,
        value_codec: impl Codec<V> + 'static,
    ) -> Self
    where
        K: HashKey,
    {
        Self {
            capacity: DEFAULT_CAPACITY,
            log_bytes: DEFAULT_LOG_BYTES,
            page_bytes: DEFAULT_PAGE_BYTES,
            ttl: 0,
            cache_size: 0,
            compaction: CompactionOptions::default(),
            persistence: None,
            key_codec: Box::new(key_codec),
            value_codec: Box::new(value_codec),
            hasher: Box::new(|key: &K| key.hash_key()),
            clock: Box::new(system_now_ms),
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_log_bytes(mut self, log_bytes: u64) -> Self {
        self.log_bytes = log_bytes;
        self
    }

    pub fn with_page_bytes(mut self, page_bytes: u64) -> Self {
        self.page_bytes = page_bytes;
        self
    }

    pub fn with_ttl(mut self, ttl_ms: u64) -> Self {
        self.ttl = ttl_ms;
        self
    }

    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    pub fn with_compaction(mut self, compaction: CompactionOptions) -> Self {
        self.compaction = compaction;
        self
    }

    pub fn with_persistence(mut self, persistence: PersistOptions) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn with_hasher(mut self, hasher: impl Fn(&K) -> i32 + 'static) -> Self {
        self.hasher = Box::new(hasher);
        self
    }

    pub fn with_clock(mut self, clock: impl Fn() -> u64 + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }
}

impl Options<Value, Value> {
    /// Options for a dynamically typed map: tagged codecs on both sides.
    pub fn tagged() -> Self {
        Self::new(TagCodec, TagCodec)
    }
}

/// The current millisecond wall clock.
fn system_now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

/// A parsed record header.
#[derive(Clone, Copy, Debug)]
struct Record {
    offset: u64,
    flag: u8,
    hash: i32,
    expire_at: u64,
    key_len: u32,
    val_len: u32,
    key_offset: u64,
    val_offset: u64,
    /// Offset one past the record; where the next record begins.
    end: u64,
}

/// An embedded key-value map storing all entries in a paged byte log,
/// indexed by an open-addressed hash table with linear probing.
pub struct RogueMap<K, V> {
    /// Key hash per bucket; valid only where the offset is non-zero.
    hashes: Vec<i32>,
    /// Record offset per bucket: 0 empty, positive active, negative a
    /// tombstone pointing at a deleted record.
    offsets: Vec<i64>,
    /// Bucket count minus one; bucket counts are always powers of two.
    mask: usize,
    /// The record log.
    data: PagedBytes,
    /// Where the next record will be appended.
    write_cursor: u64,
    /// Number of buckets holding a live entry.
    live: usize,
    /// Deleted records not yet reclaimed: incremented whenever a record is
    /// flipped to DELETED (delete, expiry, update supersession),
    /// decremented when an insert reuses a tombstone bucket, zeroed by
    /// replay.
    tombstones: usize,
    key_codec: Box<dyn Codec<K>>,
    value_codec: Box<dyn Codec<V>>,
    hasher: Box<dyn Fn(&K) -> i32>,
    clock: Box<dyn Fn() -> u64>,
    fixed_key_len: Option<u32>,
    fixed_val_len: Option<u32>,
    default_ttl: u64,
    compaction: CompactionOptions,
    /// Floor for compaction's log sizing; the configured initial log size.
    min_log_bytes: u64,
    page_bytes: u64,
    cache: Option<HotCache<K, V>>,
    sinks: Vec<Box<dyn EventSink<K, V>>>,
    persistence: Option<Persistence>,
}

impl<K, V> RogueMap<K, V> {
    /// Opens a map with the given options. If persistence is configured
    /// with load-on-open and a snapshot exists, it is loaded; missing
    /// storage starts fresh.
    pub fn open(options: Options<K, V>) -> Result<Self> {
        let Options {
            capacity,
            log_bytes,
            page_bytes,
            ttl,
            cache_size,
            compaction,
            persistence,
            key_codec,
            value_codec,
            hasher,
            clock,
        } = options;

        if !(0.0..=1.0).contains(&compaction.threshold) {
            return errinput!(
                "compaction threshold {} must be between 0 and 1",
                compaction.threshold
            );
        }
        if page_bytes == 0 {
            return errinput!("page size must be non-zero");
        }
        let capacity = capacity.max(2).next_power_of_two();
        let log_bytes = log_bytes.max(MIN_LOG_BYTES);
        let load_on_open = persistence.as_ref().is_some_and(|p| p.load_on_open);

        let mut map = Self {
            hashes: vec![0; capacity],
            offsets: vec![0; capacity],
            mask: capacity - 1,
            data: PagedBytes::new(log_bytes, page_bytes),
            write_cursor: LOG_START,
            live: 0,
            tombstones: 0,
            fixed_key_len: key_codec.fixed_length().map(|n| n as u32),
            fixed_val_len: value_codec.fixed_length().map(|n| n as u32),
            key_codec,
            value_codec,
            hasher,
            clock,
            default_ttl: ttl,
            compaction,
            min_log_bytes: log_bytes,
            page_bytes,
            cache: (cache_size > 0).then(|| HotCache::new(cache_size)),
            sinks: Vec::new(),
            persistence: persistence.map(Persistence::open).transpose()?,
        };
        if load_on_open && map.persistence.is_some() {
            map.load()?;
        }
        log::info!(
            "Opened map with {} buckets and a {}-byte log",
            map.capacity(),
            map.data.len()
        );
        Ok(map)
    }

    /// The number of live entries. Entries past their TTL are dropped from
    /// the count when their expiry is observed by a read, delete, or
    /// compaction.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// The current bucket count.
    pub fn capacity(&self) -> usize {
        self.offsets.len()
    }

    /// The current data log size in bytes.
    pub fn log_len(&self) -> u64 {
        self.data.len()
    }

    /// Registers an event sink. Sinks are invoked in subscription order.
    pub fn subscribe(&mut self, sink: Box<dyn EventSink<K, V>>) {
        self.sinks.push(sink);
    }

    /// Writes a key-value entry, using the default TTL.
    pub fn set(&mut self, key: K, value: V) -> Result<()> {
        self.set_with_ttl(key, value, None)
    }

    /// Writes a key-value entry. A TTL of `Some(0)` means never expire,
    /// overriding any default; `None` uses the map's default TTL.
    pub fn set_with_ttl(&mut self, key: K, value: V, ttl_ms: Option<u64>) -> Result<()> {
        let ttl = ttl_ms.unwrap_or(self.default_ttl);
        let expire_at = if ttl > 0 { self.now() + ttl } else { 0 };

        let key_bytes = self.encode_key(&key)?;
        let val_bytes = self.encode_value(&value)?;

        // Make room up front: growing replays the log and rebuilds the
        // table, so it must happen before any probing or flipping below.
        self.maybe_grow_table();
        let len = self.record_len(key_bytes.len() as u32, val_bytes.len() as u32);
        self.ensure_log_room(len)?;

        let hash = (self.hasher)(&key);
        'probe: loop {
            let start = self.bucket(hash);
            let mut i = start;
            // The earliest tombstone on the probe path, reused on insert.
            let mut reuse = None;
            loop {
                let slot = self.offsets[i];
                if slot == 0 {
                    let target = reuse.unwrap_or(i);
                    let offset = self.append(hash, expire_at, &key_bytes, &val_bytes);
                    if reuse.is_some() {
                        self.tombstones -= 1;
                    }
                    self.hashes[target] = hash;
                    self.offsets[target] = offset as i64;
                    self.live += 1;
                    break 'probe;
                }
                if slot < 0 {
                    if reuse.is_none() {
                        reuse = Some(i);
                    }
                } else if self.hashes[i] == hash {
                    let record = self.read_record(slot as u64);
                    if record.key_len as usize == key_bytes.len()
                        && self.key_matches(&record, &key_bytes)
                    {
                        // Update: flip the old record to a tombstone, then
                        // append the new one and repoint the bucket, so
                        // exactly one active record exists per key at every
                        // step. The superseded record counts toward the
                        // compaction trigger until a replay reclaims it.
                        self.data.write_u8(record.offset, FLAG_DELETED);
                        self.offsets[i] = -(record.offset as i64);
                        self.tombstones += 1;
                        let offset = self.append(hash, expire_at, &key_bytes, &val_bytes);
                        self.hashes[i] = hash;
                        self.offsets[i] = offset as i64;
                        break 'probe;
                    }
                }
                i = (i + 1) & self.mask;
                if i == start {
                    // Wrapped without a slot. Unreachable while the load
                    // factor bound holds, but recoverable: grow and retry.
                    self.rebuild(self.capacity() * 2, self.data.len() * 2);
                    continue 'probe;
                }
            }
        }

        self.emit_set(&key, &value);
        self.cache_insert(key_bytes, key, value, expire_at);
        self.maybe_compact()?;
        self.maybe_autosave();
        Ok(())
    }

    /// Returns whether the key is present and unexpired. Applies the same
    /// lazy expiry as `get`.
    pub fn has(&mut self, key: &K) -> Result<bool> {
        let mut key_bytes = None;
        Ok(self.locate(key, &mut key_bytes)?.is_some())
    }

    /// Deletes a key. Returns false if it was absent or already expired
    /// (expiry is applied first and emits its own event).
    pub fn delete(&mut self, key: &K) -> Result<bool> {
        let mut key_bytes = None;
        let found = self.locate(key, &mut key_bytes)?;
        let deleted = match found {
            Some((i, record)) => {
                self.data.write_u8(record.offset, FLAG_DELETED);
                self.offsets[i] = -(record.offset as i64);
                self.live -= 1;
                self.tombstones += 1;
                if let (Some(cache), Some(kb)) = (&mut self.cache, &key_bytes) {
                    cache.remove(kb);
                }
                self.emit_delete(key);
                true
            }
            None => false,
        };
        self.maybe_compact()?;
        self.maybe_autosave();
        Ok(deleted)
    }

    /// Empties the map. The log allocation is kept; the write cursor
    /// returns to the start.
    pub fn clear(&mut self) {
        self.hashes.fill(0);
        self.offsets.fill(0);
        self.write_cursor = LOG_START;
        self.live = 0;
        self.tombstones = 0;
        if let Some(cache) = &mut self.cache {
            cache.clear();
        }
        self.emit_clear();
    }

    /// Rewrites the log to contain only live entries, dropping deleted
    /// records and expiring entries past their TTL. The new log is sized to
    /// the surviving payload with 20% headroom, floored at the configured
    /// initial size.
    pub fn compact(&mut self) -> Result<()> {
        let now = self.now();
        let mut required = LOG_START;
        let mut offset = LOG_START;
        while offset < self.write_cursor {
            let record = self.read_record(offset);
            if record.flag == FLAG_ACTIVE {
                if record.expire_at != 0 && now > record.expire_at {
                    self.reap(&record)?;
                } else {
                    required += record.end - record.offset;
                }
            }
            offset = record.end;
        }

        let before = self.data.len();
        let new_len = ((required as f64 * 1.2) as u64).max(self.min_log_bytes);
        self.rebuild(self.capacity(), new_len);
        log::info!(
            "Compacted log from {} to {} bytes ({} live entries)",
            before,
            self.data.len(),
            self.live
        );
        Ok(())
    }

    /// Saves a snapshot through the configured persistence adapter.
    pub fn save(&mut self) -> Result<()> {
        if self.persistence.is_none() {
            return errinput!("persistence is not configured");
        }
        let bytes = self.serialize()?;
        if let Some(p) = &mut self.persistence {
            p.adapter.save(&p.name, &bytes)?;
        }
        Ok(())
    }

    /// Loads the saved snapshot, replacing the map's contents. Returns
    /// false (leaving the map untouched) if nothing has been saved yet.
    pub fn load(&mut self) -> Result<bool> {
        let bytes = match &mut self.persistence {
            Some(p) => p.adapter.load(&p.name)?,
            None => return errinput!("persistence is not configured"),
        };
        match bytes {
            Some(bytes) => {
                self.restore(&bytes)?;
                log::info!("Loaded snapshot with {} entries", self.live);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// The current time in epoch milliseconds, per the configured clock.
    fn now(&self) -> u64 {
        (self.clock)()
    }

    /// The bucket a hash's probe sequence starts at.
    fn bucket(&self, hash: i32) -> usize {
        (hash as u32 as usize) & self.mask
    }

    fn encode_key(&self, key: &K) -> Result<Vec<u8>> {
        let mut buf = vec![0; self.key_codec.byte_length(key)];
        let len = self.key_codec.encode(key, &mut buf)?;
        buf.truncate(len);
        if let Some(fixed) = self.fixed_key_len {
            if buf.len() != fixed as usize {
                return errinput!("key codec wrote {} bytes, fixed length is {fixed}", buf.len());
            }
        }
        Ok(buf)
    }

    fn encode_value(&self, value: &V) -> Result<Vec<u8>> {
        let mut buf = vec![0; self.value_codec.byte_length(value)];
        let len = self.value_codec.encode(value, &mut buf)?;
        buf.truncate(len);
        if let Some(fixed) = self.fixed_val_len {
            if buf.len() != fixed as usize {
                return errinput!(
                    "value codec wrote {} bytes, fixed length is {fixed}",
                    buf.len()
                );
            }
        }
        Ok(buf)
    }

    fn decode_key(&self, record: &Record) -> Result<K> {
        match self.data.try_view(record.key_offset, record.key_len as u64) {
            Some(view) => self.key_codec.decode(view),
            None => self
                .key_codec
                .decode(&self.data.read_bytes(record.key_offset, record.key_len as u64)),
        }
    }

    fn decode_value(&self, record: &Record) -> Result<V> {
        match self.data.try_view(record.val_offset, record.val_len as u64) {
            Some(view) => self.value_codec.decode(view),
            None => self
                .value_codec
                .decode(&self.data.read_bytes(record.val_offset, record.val_len as u64)),
        }
    }

    /// Parses the record header at an offset.
    fn read_record(&self, offset: u64) -> Record {
        let flag = self.data.read_u8(offset);
        let hash = self.data.read_i32(offset + 1);
        let expire_at = self.data.read_u64(offset + 5);
        let mut cursor = offset + HEADER_BYTES;
        let key_len = match self.fixed_key_len {
            Some(n) => n,
            None => {
                let n = self.data.read_u32(cursor);
                cursor += 4;
                n
            }
        };
        let val_len = match self.fixed_val_len {
            Some(n) => n,
            None => {
                let n = self.data.read_u32(cursor);
                cursor += 4;
                n
            }
        };
        let key_offset = cursor;
        let val_offset = key_offset + key_len as u64;
        Record {
            offset,
            flag,
            hash,
            expire_at,
            key_len,
            val_len,
            key_offset,
            val_offset,
            end: val_offset + val_len as u64,
        }
    }

    /// The encoded size of a record with the given key and value lengths.
    fn record_len(&self, key_len: u32, val_len: u32) -> u64 {
        let mut len = HEADER_BYTES;
        if self.fixed_key_len.is_none() {
            len += 4;
        }
        if self.fixed_val_len.is_none() {
            len += 4;
        }
        len + key_len as u64 + val_len as u64
    }

    /// Compares a record's stored key bytes against an encoded key. Short
    /// keys compare byte-by-byte; long ones through the storage's bulk
    /// primitive. The caller has already checked the lengths match.
    fn key_matches(&self, record: &Record, key_bytes: &[u8]) -> bool {
        if key_bytes.len() < BULK_COMPARE_MIN {
            for (i, &b) in key_bytes.iter().enumerate() {
                if self.data.read_u8(record.key_offset + i as u64) != b {
                    return false;
                }
            }
            true
        } else {
            self.data.range_eq(record.key_offset, key_bytes)
        }
    }

    /// Probes for a key, returning its bucket and record if present and
    /// unexpired. A present-but-expired entry is reaped here: flipped to
    /// DELETED, its bucket tombstoned, and an expire event emitted.
    ///
    /// The key is encoded lazily into `key_bytes` only once a slot with a
    /// matching hash is found; callers that pre-encoded (for a cache probe)
    /// pass Some and the encoding is reused.
    fn locate(&mut self, key: &K, key_bytes: &mut Option<Vec<u8>>) -> Result<Option<(usize, Record)>> {
        let hash = (self.hasher)(key);
        let start = self.bucket(hash);
        let mut i = start;
        loop {
            let slot = self.offsets[i];
            if slot == 0 {
                return Ok(None);
            }
            if slot > 0 && self.hashes[i] == hash {
                let record = self.read_record(slot as u64);
                if key_bytes.is_none() {
                    *key_bytes = Some(self.encode_key(key)?);
                }
                let kb = key_bytes.as_deref().unwrap_or_default();
                if record.key_len as usize == kb.len() && self.key_matches(&record, kb) {
                    if record.expire_at != 0 && self.now() > record.expire_at {
                        self.data.write_u8(record.offset, FLAG_DELETED);
                        self.offsets[i] = -slot;
                        self.live -= 1;
                        self.tombstones += 1;
                        if let Some(cache) = &mut self.cache {
                            cache.remove(kb);
                        }
                        self.emit_expire(key);
                        return Ok(None);
                    }
                    return Ok(Some((i, record)));
                }
            }
            i = (i + 1) & self.mask;
            if i == start {
                return Ok(None);
            }
        }
    }

    /// Expires an active record found outside a probe: flips it to DELETED,
    /// tombstones its bucket, and emits the expire event. The key is
    /// decoded (only when someone is listening) before anything is
    /// mutated, so a codec error leaves the map untouched.
    fn reap(&mut self, record: &Record) -> Result<()> {
        let key = if self.sinks.is_empty() { None } else { Some(self.decode_key(record)?) };
        self.data.write_u8(record.offset, FLAG_DELETED);
        if let Some(i) = self.find_slot(record) {
            self.offsets[i] = -(record.offset as i64);
            self.tombstones += 1;
        }
        self.live -= 1;
        if self.cache.is_some() {
            let kb = self.data.read_bytes(record.key_offset, record.key_len as u64);
            if let Some(cache) = &mut self.cache {
                cache.remove(&kb);
            }
        }
        if let Some(key) = key {
            self.emit_expire(&key);
        }
        Ok(())
    }

    /// Finds the bucket pointing at a record by probing its stored hash.
    fn find_slot(&self, record: &Record) -> Option<usize> {
        let start = self.bucket(record.hash);
        let mut i = start;
        loop {
            if self.offsets[i] == record.offset as i64 {
                return Some(i);
            }
            if self.offsets[i] == 0 {
                return None;
            }
            i = (i + 1) & self.mask;
            if i == start {
                return None;
            }
        }
    }

    /// Appends an active record at the write cursor. The caller has ensured
    /// room via [`RogueMap::ensure_log_room`].
    fn append(&mut self, hash: i32, expire_at: u64, key_bytes: &[u8], val_bytes: &[u8]) -> u64 {
        let len = self.record_len(key_bytes.len() as u32, val_bytes.len() as u32);
        debug_assert!(self.write_cursor + len <= self.data.len(), "append without room");
        let offset = self.write_cursor;
        self.data.write_u8(offset, FLAG_ACTIVE);
        self.data.write_i32(offset + 1, hash);
        self.data.write_u64(offset + 5, expire_at);
        let mut cursor = offset + HEADER_BYTES;
        if self.fixed_key_len.is_none() {
            self.data.write_u32(cursor, key_bytes.len() as u32);
            cursor += 4;
        }
        if self.fixed_val_len.is_none() {
            self.data.write_u32(cursor, val_bytes.len() as u32);
            cursor += 4;
        }
        self.data.write_bytes(cursor, key_bytes);
        self.data.write_bytes(cursor + key_bytes.len() as u64, val_bytes);
        self.write_cursor += len;
        offset
    }

    /// Doubles the table (and log) when one more insert would push the load
    /// factor past 0.75.
    fn maybe_grow_table(&mut self) {
        if 4 * (self.live + self.tombstones + 1) > 3 * self.capacity() {
            self.rebuild(self.capacity() * 2, self.data.len() * 2);
        }
    }

    /// Grows the log until a record of `len` bytes fits at the write
    /// cursor, doubling (and replaying, which also drops garbage) each
    /// time. Gives up after 3 attempts.
    fn ensure_log_room(&mut self, len: u64) -> Result<()> {
        let mut attempts = 0;
        while self.write_cursor + len > self.data.len() {
            if attempts >= 3 {
                return Err(Error::Capacity(format!(
                    "cannot fit a {len}-byte record after {attempts} log resizes"
                )));
            }
            self.rebuild(self.capacity(), self.data.len() * 2);
            attempts += 1;
        }
        Ok(())
    }

    /// Replays all active records into a fresh log and table. The copy is a
    /// bulk byte move per record, no decode or re-encode; the index is
    /// rebuilt by reprobing each record's stored hash. Deleted records and
    /// tombstones do not survive a rebuild.
    fn rebuild(&mut self, new_capacity: usize, new_log_bytes: u64) {
        let mut hashes = vec![0i32; new_capacity];
        let mut offsets = vec![0i64; new_capacity];
        let mut data = PagedBytes::new(new_log_bytes, self.page_bytes);
        let mask = new_capacity - 1;
        let mut cursor = LOG_START;

        let mut offset = LOG_START;
        while offset < self.write_cursor {
            let record = self.read_record(offset);
            if record.flag == FLAG_ACTIVE {
                let len = record.end - record.offset;
                data.write_bytes(cursor, &self.data.read_bytes(record.offset, len));
                let mut i = (record.hash as u32 as usize) & mask;
                while offsets[i] != 0 {
                    i = (i + 1) & mask;
                }
                hashes[i] = record.hash;
                offsets[i] = cursor as i64;
                cursor += len;
            }
            offset = record.end;
        }

        self.hashes = hashes;
        self.offsets = offsets;
        self.mask = mask;
        self.data = data;
        self.write_cursor = cursor;
        self.tombstones = 0;
    }

    /// Inserts into the hot cache, emitting an evict event if the cache
    /// pushed an entry out. A no-op when the cache is disabled.
    fn cache_insert(&mut self, key_bytes: Vec<u8>, key: K, value: V, expire_at: u64) {
        let Some(cache) = &mut self.cache else { return };
        if let Some((evicted_key, evicted_value)) = cache.insert(key_bytes, key, value, expire_at)
        {
            self.emit_evict(&evicted_key, &evicted_value);
        }
    }

    /// Compacts if auto-compaction is enabled and the tombstone fraction
    /// exceeds the configured threshold.
    fn maybe_compact(&mut self) -> Result<()> {
        if !self.compaction.auto_compact {
            return Ok(());
        }
        let total = self.live + self.tombstones;
        if total >= self.compaction.min_size
            && self.tombstones as f64 / total as f64 > self.compaction.threshold
        {
            self.compact()?;
        }
        Ok(())
    }

    /// Saves if the periodic save interval has elapsed. Failures are
    /// reported but not retried.
    fn maybe_autosave(&mut self) {
        if self.persistence.as_mut().is_some_and(|p| p.save_due()) {
            if let Err(err) = self.save() {
                log::error!("periodic save failed: {err}");
            }
        }
    }

    fn emit_set(&mut self, key: &K, value: &V) {
        for sink in &mut self.sinks {
            sink.on_set(key, value);
        }
    }

    fn emit_delete(&mut self, key: &K) {
        for sink in &mut self.sinks {
            sink.on_delete(key);
        }
    }

    fn emit_expire(&mut self, key: &K) {
        for sink in &mut self.sinks {
            sink.on_expire(key);
        }
    }

    fn emit_evict(&mut self, key: &K, value: &V) {
        for sink in &mut self.sinks {
            sink.on_evict(key, value);
        }
    }

    fn emit_clear(&mut self) {
        for sink in &mut self.sinks {
            sink.on_clear();
        }
    }
}

impl<K: Clone, V: Clone> RogueMap<K, V> {
    /// Looks up a key, returning its decoded value. Entries past their TTL
    /// are reaped on the way: flipped to deleted with an expire event, then
    /// reported as absent. Decoding borrows the stored bytes directly when
    /// they don't straddle a page boundary.
    pub fn get(&mut self, key: &K) -> Result<Option<V>> {
        let mut key_bytes = None;
        if self.cache.is_some() {
            let kb = self.encode_key(key)?;
            let now = self.now();
            if let Some(cache) = &mut self.cache {
                if let Some((_, value)) = cache.get(&kb, now) {
                    return Ok(Some(value.clone()));
                }
            }
            key_bytes = Some(kb);
        }
        let Some((_, record)) = self.locate(key, &mut key_bytes)? else {
            return Ok(None);
        };
        let value = self.decode_value(&record)?;
        if self.cache.is_some() {
            if let Some(kb) = key_bytes.take() {
                self.cache_insert(kb, key.clone(), value.clone(), record.expire_at);
            }
        }
        Ok(Some(value))
    }
}

/// Saves a final snapshot when a map with periodic saving is dropped, so a
/// clean shutdown doesn't lose the tail of the last interval.
impl<K, V> Drop for RogueMap<K, V> {
    fn drop(&mut self) {
        if self.persistence.as_ref().is_some_and(|p| p.autosaves()) {
            if let Err(err) = self.save() {
                log::error!("failed to save map on drop: {err}");
            }
        }
    }
}
