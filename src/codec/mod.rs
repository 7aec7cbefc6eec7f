//! Key and value codecs.
//!
//! The map never interprets key or value bytes itself: everything crossing
//! into or out of the data log goes through a [`Codec`]. A codec that
//! declares a fixed length lets the map omit the per-entry length field.
//!
//! [`TagCodec`] is the default, handling the scalar [`Value`] shapes with a
//! structured JSON fallback. [`BincodeCodec`] encodes any serde type.

pub mod bincode;
mod tagged;

pub use bincode::BincodeCodec;
pub use tagged::{TagCodec, Value};

use crate::errdata;
use crate::error::Result;

/// Encodes and decodes a single type to and from raw bytes.
pub trait Codec<T> {
    /// Encodes the value into the start of `buf`, returning the number of
    /// bytes written. `buf` is at least `byte_length(value)` bytes.
    fn encode(&self, value: &T, buf: &mut [u8]) -> Result<usize>;

    /// Decodes a value from the entirety of `buf`.
    fn decode(&self, buf: &[u8]) -> Result<T>;

    /// The exact number of bytes `encode` will write for this value.
    fn byte_length(&self, value: &T) -> usize;

    /// The length every encoded value has, if constant. When this returns
    /// Some, the map omits the per-entry length field from its records.
    fn fixed_length(&self) -> Option<usize> {
        None
    }
}

/// A UTF-8 string codec.
#[derive(Clone, Copy, Debug, Default)]
pub struct StrCodec;

impl Codec<String> for StrCodec {
    fn encode(&self, value: &String, buf: &mut [u8]) -> Result<usize> {
        buf[..value.len()].copy_from_slice(value.as_bytes());
        Ok(value.len())
    }

    fn decode(&self, buf: &[u8]) -> Result<String> {
        Ok(std::str::from_utf8(buf)?.to_string())
    }

    fn byte_length(&self, value: &String) -> usize {
        value.len()
    }
}

/// A raw byte-string codec.
#[derive(Clone, Copy, Debug, Default)]
pub struct BytesCodec;

impl Codec<Vec<u8>> for BytesCodec {
    fn encode(&self, value: &Vec<u8>, buf: &mut [u8]) -> Result<usize> {
        buf[..value.len()].copy_from_slice(value);
        Ok(value.len())
    }

    fn decode(&self, buf: &[u8]) -> Result<Vec<u8>> {
        Ok(buf.to_vec())
    }

    fn byte_length(&self, value: &Vec<u8>) -> usize {
        value.len()
    }
}

/// A fixed-width i64 codec (8 bytes little-endian). Declares a fixed length,
/// so records carrying it omit the length field.
#[derive(Clone, Copy, Debug, Default)]
pub struct I64Codec;

impl Codec<i64> for I64Codec {
    fn encode(&self, value: &i64, buf: &mut [u8]) -> Result<usize> {
        buf[..8].copy_from_slice(&value.to_le_bytes());
        Ok(8)
    }

    fn decode(&self, buf: &[u8]) -> Result<i64> {
        if buf.len() != 8 {
            return errdata!("expected 8 bytes for i64, got {}", buf.len());
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(buf);
        Ok(i64::from_le_bytes(bytes))
    }

    fn byte_length(&self, _value: &i64) -> usize {
        8
    }

    fn fixed_length(&self) -> Option<usize> {
        Some(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: PartialEq + std::fmt::Debug>(codec: &impl Codec<T>, value: T) {
        let mut buf = vec![0u8; codec.byte_length(&value)];
        let written = codec.encode(&value, &mut buf).unwrap();
        assert_eq!(written, buf.len());
        assert_eq!(codec.decode(&buf).unwrap(), value);
    }

    #[test]
    fn str_codec() {
        roundtrip(&StrCodec, String::new());
        roundtrip(&StrCodec, "hello".to_string());
        roundtrip(&StrCodec, "héllo wörld".to_string());
        assert!(StrCodec.decode(&[0xff, 0xfe]).is_err());
        assert_eq!(StrCodec.fixed_length(), None);
    }

    #[test]
    fn bytes_codec() {
        roundtrip(&BytesCodec, vec![]);
        roundtrip(&BytesCodec, vec![0u8, 255, 128]);
    }

    #[test]
    fn i64_codec_is_fixed_width() {
        roundtrip(&I64Codec, 0);
        roundtrip(&I64Codec, i64::MIN);
        roundtrip(&I64Codec, i64::MAX);
        assert_eq!(I64Codec.fixed_length(), Some(8));
        assert_eq!(I64Codec.byte_length(&42), 8);
        assert!(I64Codec.decode(&[1, 2, 3]).is_err());
    }
}
