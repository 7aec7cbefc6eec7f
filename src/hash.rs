//! 32-bit key hashing via XXH32.
//!
//! The bucket index of a key is `hash & mask`, so all that's required of a
//! hash is determinism and reasonable distribution; the map resolves
//! collisions itself. XXH32 is used over the key's natural byte form.

use crate::codec::Value;

/// The XXH32 seed. All hashes in a map must use the same seed, since stored
/// record hashes are compared against freshly computed ones.
const SEED: u32 = 0;

/// One-shot XXH32 over a byte slice, reinterpreted as the map's i32 hash.
#[inline]
pub fn hash_bytes(data: &[u8]) -> i32 {
    xxhash_rust::xxh32::xxh32(data, SEED) as i32
}

/// A key type with a default hash. The map hashes keys before encoding them,
/// so this operates on the key itself rather than its codec bytes.
pub trait HashKey {
    fn hash_key(&self) -> i32;
}

impl HashKey for str {
    fn hash_key(&self) -> i32 {
        hash_bytes(self.as_bytes())
    }
}

impl HashKey for String {
    fn hash_key(&self) -> i32 {
        hash_bytes(self.as_bytes())
    }
}

impl HashKey for [u8] {
    fn hash_key(&self) -> i32 {
        hash_bytes(self)
    }
}

impl HashKey for Vec<u8> {
    fn hash_key(&self) -> i32 {
        hash_bytes(self)
    }
}

impl HashKey for i64 {
    fn hash_key(&self) -> i32 {
        hash_bytes(&self.to_le_bytes())
    }
}

impl HashKey for u64 {
    fn hash_key(&self) -> i32 {
        hash_bytes(&self.to_le_bytes())
    }
}

impl HashKey for i32 {
    fn hash_key(&self) -> i32 {
        hash_bytes(&self.to_le_bytes())
    }
}

impl HashKey for u32 {
    fn hash_key(&self) -> i32 {
        hash_bytes(&self.to_le_bytes())
    }
}

impl HashKey for Value {
    fn hash_key(&self) -> i32 {
        match self {
            Value::Null => hash_bytes(&[]),
            Value::Bool(b) => hash_bytes(&[*b as u8]),
            Value::Integer(i) => i.hash_key(),
            Value::Float(f) => hash_bytes(&f.to_le_bytes()),
            Value::String(s) => s.hash_key(),
            Value::Bytes(b) => b.hash_key(),
            Value::Json(j) => hash_bytes(j.to_string().as_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// XXH32 parity vector: the empty input with seed 0 hashes to 0x02CC5D05.
    #[test]
    fn empty_input_parity() {
        assert_eq!(hash_bytes(b""), 0x02CC5D05);
    }

    #[test]
    fn deterministic() {
        assert_eq!("key".hash_key(), "key".hash_key());
        assert_eq!("key".hash_key(), String::from("key").hash_key());
        assert_ne!("key".hash_key(), "yek".hash_key());
    }

    #[test]
    fn integers_hash_their_bytes() {
        assert_eq!(1i64.hash_key(), hash_bytes(&1i64.to_le_bytes()));
        assert_ne!(1i64.hash_key(), 2i64.hash_key());
    }

    #[test]
    fn values_match_their_scalars() {
        assert_eq!(Value::String("k".into()).hash_key(), "k".hash_key());
        assert_eq!(Value::Integer(7).hash_key(), 7i64.hash_key());
    }
}
