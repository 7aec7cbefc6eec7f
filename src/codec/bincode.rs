//! A generic codec for any serde-compatible type, encoded with Bincode.

use super::Codec;
use crate::error::Result;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// Encodes values of any serde type via Bincode. Byte lengths are computed
/// with `bincode::serialized_size`, so `byte_length` and `encode` always
/// agree without buffering the payload twice.
pub struct BincodeCodec<T> {
    _phantom: PhantomData<fn() -> T>,
}

impl<T> BincodeCodec<T> {
    pub fn new() -> Self {
        Self { _phantom: PhantomData }
    }
}

impl<T> Default for BincodeCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for BincodeCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T: Serialize + DeserializeOwned> Codec<T> for BincodeCodec<T> {
    fn encode(&self, value: &T, buf: &mut [u8]) -> Result<usize> {
        let len = self.byte_length(value);
        bincode::serialize_into(&mut buf[..len], value)?;
        Ok(len)
    }

    fn decode(&self, buf: &[u8]) -> Result<T> {
        Ok(bincode::deserialize(buf)?)
    }

    fn byte_length(&self, value: &T) -> usize {
        // A value whose size cannot be computed cannot be encoded either;
        // reporting 0 here makes the subsequent encode surface the error.
        bincode::serialized_size(value).map_or(0, |n| n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        bar: i64,
        name: String,
        tags: Vec<u8>,
    }

    #[test]
    fn roundtrip_struct() {
        let codec = BincodeCodec::<Record>::new();
        let value = Record { bar: 123, name: "foo".into(), tags: vec![1, 2, 3] };
        let mut buf = vec![0u8; codec.byte_length(&value)];
        let written = codec.encode(&value, &mut buf).unwrap();
        assert_eq!(written, buf.len());
        assert_eq!(codec.decode(&buf).unwrap(), value);
    }

    #[test]
    fn decode_garbage_errors() {
        let codec = BincodeCodec::<Record>::new();
        assert!(codec.decode(&[0xff]).is_err());
    }
}
