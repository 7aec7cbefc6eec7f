//! Snapshot wire format.
//!
//! A snapshot is a self-describing little-endian byte blob:
//!
//! ```text
//! ┌──────────────┬───────┬──────────────────────────────────────────┐
//! │ Field        │ Bytes │ Meaning                                  │
//! ├──────────────┼───────┼──────────────────────────────────────────┤
//! │ Magic        │ 5     │ ASCII "ROGUE"                            │
//! │ Version      │ 1     │ 2                                        │
//! │ Capacity     │ 4     │ Bucket count (u32)                       │
//! │ Size         │ 4     │ Live count (u32)                         │
//! │ WriteOffset  │ 4     │ Log tail (u32)                           │
//! │ LogLength    │ 4     │ Bytes of log that follow (u32)           │
//! │ Buckets      │ 4×cap │ |offset| per bucket; 0 for empty         │
//! │ Log          │ …     │ Raw log bytes                            │
//! └──────────────┴───────┴──────────────────────────────────────────┘
//! ```
//!
//! Bucket offsets lose their sign on the wire; restore recovers each slot's
//! active/tombstone state from the referenced record's flag, and the slot
//! hash from the record's stored hash. Offsets are 32-bit, so logs past
//! 4 GiB cannot be snapshotted in this version.

use super::{Options, RogueMap, FLAG_ACTIVE, FLAG_DELETED, HEADER_BYTES, LOG_START};
use crate::error::Result;
use crate::storage::PagedBytes;
use crate::{errdata, errinput};

const MAGIC: &[u8; 5] = b"ROGUE";
const VERSION: u8 = 2;

/// Magic + version + the four u32 header fields.
const PREAMBLE_BYTES: usize = 5 + 1 + 4 * 4;

fn read_u32_at(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}

impl<K, V> RogueMap<K, V> {
    /// Serializes the map state to a snapshot blob. Refuses logs whose
    /// write cursor exceeds the format's 32-bit offset space.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        if self.write_cursor > u32::MAX as u64 {
            return errinput!("log of {} bytes exceeds the 4 GiB snapshot limit", self.write_cursor);
        }
        if self.capacity() > u32::MAX as usize {
            return errinput!("bucket count {} exceeds the snapshot limit", self.capacity());
        }

        let log_len = self.write_cursor;
        let mut out = Vec::with_capacity(PREAMBLE_BYTES + self.capacity() * 4 + log_len as usize);
        out.extend_from_slice(MAGIC);
        out.push(VERSION);
        out.extend_from_slice(&(self.capacity() as u32).to_le_bytes());
        out.extend_from_slice(&(self.live as u32).to_le_bytes());
        out.extend_from_slice(&(self.write_cursor as u32).to_le_bytes());
        out.extend_from_slice(&(log_len as u32).to_le_bytes());
        for &offset in &self.offsets {
            out.extend_from_slice(&(offset.unsigned_abs() as u32).to_le_bytes());
        }
        out.extend_from_slice(&self.data.read_bytes(0, log_len));
        Ok(out)
    }

    /// Restores a snapshot into this map, replacing its contents but
    /// keeping its codecs, hasher and configuration. The snapshot is fully
    /// validated and decoded before any state is touched, so a bad blob
    /// leaves the map unchanged.
    pub fn restore(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() < PREAMBLE_BYTES {
            log::error!("Rejecting snapshot: {} bytes is shorter than the header", bytes.len());
            return errdata!("snapshot of {} bytes is too short", bytes.len());
        }
        if &bytes[..5] != MAGIC {
            log::error!("Rejecting snapshot with unknown magic {:02x?}", &bytes[..5]);
            return errdata!("unknown snapshot magic");
        }
        if bytes[5] != VERSION {
            log::error!("Rejecting snapshot with unsupported version {}", bytes[5]);
            return errdata!("unsupported snapshot version {}", bytes[5]);
        }
        let capacity = read_u32_at(bytes, 6) as usize;
        let live = read_u32_at(bytes, 10) as usize;
        let write_cursor = read_u32_at(bytes, 14) as u64;
        let log_len = read_u32_at(bytes, 18) as u64;

        if capacity < 2 || !capacity.is_power_of_two() {
            log::error!("Rejecting snapshot: bucket count {capacity} is not a power of two");
            return errdata!("snapshot bucket count {capacity} is not a power of two");
        }
        let expected = PREAMBLE_BYTES as u64 + capacity as u64 * 4 + log_len;
        if bytes.len() as u64 != expected {
            log::error!(
                "Rejecting truncated snapshot: {} bytes, header implies {expected}",
                bytes.len()
            );
            return errdata!("snapshot length {} does not match header ({expected})", bytes.len());
        }
        if write_cursor < LOG_START || write_cursor > log_len {
            log::error!(
                "Rejecting snapshot: write offset {write_cursor} outside its {log_len}-byte log"
            );
            return errdata!("snapshot write offset {write_cursor} outside log of {log_len} bytes");
        }

        let log = &bytes[PREAMBLE_BYTES + capacity * 4..];
        let mut hashes = vec![0i32; capacity];
        let mut offsets = vec![0i64; capacity];
        for (i, hash_slot) in hashes.iter_mut().enumerate() {
            let raw = read_u32_at(bytes, PREAMBLE_BYTES + i * 4) as u64;
            if raw == 0 {
                continue;
            }
            if raw + HEADER_BYTES > log_len {
                log::error!("Rejecting snapshot: bucket {i} points at offset {raw} outside the log");
                return errdata!("bucket {i} points at offset {raw} outside the log");
            }
            let flag = log[raw as usize];
            let mut hash_bytes = [0u8; 4];
            hash_bytes.copy_from_slice(&log[raw as usize + 1..raw as usize + 5]);
            *hash_slot = i32::from_le_bytes(hash_bytes);
            offsets[i] = match flag {
                FLAG_ACTIVE => raw as i64,
                FLAG_DELETED => -(raw as i64),
                flag => {
                    log::error!(
                        "Rejecting snapshot: bucket {i} points at a record with flag {flag}"
                    );
                    return errdata!("bucket {i} points at a record with flag {flag}");
                }
            };
        }

        let mut data = PagedBytes::new(self.min_log_bytes.max(log_len), self.page_bytes);
        data.write_bytes(0, log);

        self.hashes = hashes;
        self.offsets = offsets;
        self.mask = capacity - 1;
        self.data = data;
        self.write_cursor = write_cursor;
        self.live = live;
        // Snapshots don't carry a tombstone count; it catches up as deletes
        // and the next compaction happen.
        self.tombstones = 0;
        if let Some(cache) = &mut self.cache {
            cache.clear();
        }
        Ok(())
    }

    /// Builds a fresh map from a snapshot and the given options. The
    /// options' codecs and hasher must match those the snapshot was
    /// written with.
    pub fn deserialize(bytes: &[u8], options: Options<K, V>) -> Result<Self> {
        let mut map = Self::open(options)?;
        map.restore(bytes)?;
        Ok(map)
    }
}
