//! Log-scan iterators.
//!
//! Iteration walks the record log from the start to the write cursor,
//! skipping deleted and expired records. Because updates append, the scan
//! yields each live key once, in the order of its most recent write.
//! Iteration is a read-only observation: expired records are skipped, not
//! reaped, and no events fire.

use super::{Record, RogueMap, FLAG_ACTIVE, LOG_START};
use crate::error::Result;

impl<K, V> RogueMap<K, V> {
    /// Iterates over live entries, decoding keys and values.
    pub fn entries(&self) -> Entries<'_, K, V> {
        Entries { scan: Scan::new(self) }
    }

    /// Iterates over live keys, decoding only the key half of each record.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { scan: Scan::new(self) }
    }

    /// Iterates over live values, decoding only the value half.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { scan: Scan::new(self) }
    }

    /// Iterates over live entries in batches of at most `batch`, for
    /// embedding in cooperative schedulers: the caller yields control
    /// between batches, and each batch does bounded work.
    pub fn entries_batched(&self, batch: usize) -> Batches<'_, K, V> {
        Batches { entries: self.entries(), batch: batch.max(1) }
    }
}

/// The shared record walk: yields active, unexpired records in log order.
struct Scan<'a, K, V> {
    map: &'a RogueMap<K, V>,
    offset: u64,
    /// Expiry is judged against the time the scan started.
    now: u64,
}

impl<'a, K, V> Scan<'a, K, V> {
    fn new(map: &'a RogueMap<K, V>) -> Self {
        Self { map, offset: LOG_START, now: map.now() }
    }
}

impl<K, V> Iterator for Scan<'_, K, V> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        while self.offset < self.map.write_cursor {
            let record = self.map.read_record(self.offset);
            self.offset = record.end;
            if record.flag != FLAG_ACTIVE {
                continue;
            }
            if record.expire_at != 0 && self.now > record.expire_at {
                continue;
            }
            return Some(record);
        }
        None
    }
}

pub struct Entries<'a, K, V> {
    scan: Scan<'a, K, V>,
}

impl<K, V> Iterator for Entries<'_, K, V> {
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.scan.next()?;
        let map = self.scan.map;
        Some(map.decode_key(&record).and_then(|key| Ok((key, map.decode_value(&record)?))))
    }
}

pub struct Keys<'a, K, V> {
    scan: Scan<'a, K, V>,
}

impl<K, V> Iterator for Keys<'_, K, V> {
    type Item = Result<K>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.scan.next()?;
        Some(self.scan.map.decode_key(&record))
    }
}

pub struct Values<'a, K, V> {
    scan: Scan<'a, K, V>,
}

impl<K, V> Iterator for Values<'_, K, V> {
    type Item = Result<V>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.scan.next()?;
        Some(self.scan.map.decode_value(&record))
    }
}

pub struct Batches<'a, K, V> {
    entries: Entries<'a, K, V>,
    batch: usize,
}

impl<K, V> Iterator for Batches<'_, K, V> {
    type Item = Result<Vec<(K, V)>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut out = Vec::with_capacity(self.batch);
        for entry in self.entries.by_ref() {
            match entry {
                Ok(entry) => out.push(entry),
                Err(err) => return Some(Err(err)),
            }
            if out.len() == self.batch {
                break;
            }
        }
        if out.is_empty() {
            None
        } else {
            Some(Ok(out))
        }
    }
}
