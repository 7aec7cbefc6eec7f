//! The default tagged codec: one tag byte identifying the scalar shape,
//! then the payload. Structured values fall back to a JSON payload.

use super::Codec;
use crate::errdata;
use crate::error::Result;

use serde::{Deserialize, Serialize};

/// A dynamically typed value, covering the scalar shapes the tagged codec
/// encodes natively plus a JSON fallback for structured data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Bytes(#[serde(with = "serde_bytes")] Vec<u8>),
    /// Structured fallback: anything that isn't a scalar.
    Json(serde_json::Value),
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<serde_json::Value> for Value {
    fn from(j: serde_json::Value) -> Self {
        Value::Json(j)
    }
}

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INTEGER: u8 = 2;
const TAG_FLOAT: u8 = 3;
const TAG_STRING: u8 = 4;
const TAG_BYTES: u8 = 5;
const TAG_JSON: u8 = 6;

/// The default key and value codec: a tag byte followed by the payload.
/// Integers and floats are 8 bytes little-endian, strings UTF-8, bytes raw,
/// and structured values JSON text.
#[derive(Clone, Copy, Debug, Default)]
pub struct TagCodec;

impl Codec<Value> for TagCodec {
    fn encode(&self, value: &Value, buf: &mut [u8]) -> Result<usize> {
        let len = match value {
            Value::Null => {
                buf[0] = TAG_NULL;
                1
            }
            Value::Bool(b) => {
                buf[0] = TAG_BOOL;
                buf[1] = *b as u8;
                2
            }
            Value::Integer(i) => {
                buf[0] = TAG_INTEGER;
                buf[1..9].copy_from_slice(&i.to_le_bytes());
                9
            }
            Value::Float(f) => {
                buf[0] = TAG_FLOAT;
                buf[1..9].copy_from_slice(&f.to_le_bytes());
                9
            }
            Value::String(s) => {
                buf[0] = TAG_STRING;
                buf[1..1 + s.len()].copy_from_slice(s.as_bytes());
                1 + s.len()
            }
            Value::Bytes(b) => {
                buf[0] = TAG_BYTES;
                buf[1..1 + b.len()].copy_from_slice(b);
                1 + b.len()
            }
            Value::Json(j) => {
                let text = serde_json::to_vec(j)?;
                buf[0] = TAG_JSON;
                buf[1..1 + text.len()].copy_from_slice(&text);
                1 + text.len()
            }
        };
        Ok(len)
    }

    fn decode(&self, buf: &[u8]) -> Result<Value> {
        let Some((&tag, payload)) = buf.split_first() else {
            return errdata!("empty tagged value");
        };
        match tag {
            TAG_NULL => Ok(Value::Null),
            TAG_BOOL => match payload {
                [0] => Ok(Value::Bool(false)),
                [1] => Ok(Value::Bool(true)),
                _ => errdata!("invalid boolean payload"),
            },
            TAG_INTEGER => {
                let bytes: [u8; 8] = payload
                    .try_into()
                    .or_else(|_| errdata!("expected 8-byte integer payload"))?;
                Ok(Value::Integer(i64::from_le_bytes(bytes)))
            }
            TAG_FLOAT => {
                let bytes: [u8; 8] = payload
                    .try_into()
                    .or_else(|_| errdata!("expected 8-byte float payload"))?;
                Ok(Value::Float(f64::from_le_bytes(bytes)))
            }
            TAG_STRING => Ok(Value::String(std::str::from_utf8(payload)?.to_string())),
            TAG_BYTES => Ok(Value::Bytes(payload.to_vec())),
            TAG_JSON => Ok(Value::Json(serde_json::from_slice(payload)?)),
            tag => errdata!("unknown value tag {tag}"),
        }
    }

    fn byte_length(&self, value: &Value) -> usize {
        1 + match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Integer(_) | Value::Float(_) => 8,
            Value::String(s) => s.len(),
            Value::Bytes(b) => b.len(),
            Value::Json(j) => j.to_string().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case(Value::Null; "null")]
    #[test_case(Value::Bool(true); "bool true")]
    #[test_case(Value::Bool(false); "bool false")]
    #[test_case(Value::Integer(0); "integer zero")]
    #[test_case(Value::Integer(i64::MIN); "integer min")]
    #[test_case(Value::Float(-1.5); "float")]
    #[test_case(Value::String(String::new()); "empty string")]
    #[test_case(Value::String("world".into()); "string")]
    #[test_case(Value::Bytes(vec![0, 255, 7]); "bytes")]
    #[test_case(Value::Json(json!({"bar": 123})); "json object")]
    fn roundtrip(value: Value) {
        let mut buf = vec![0u8; TagCodec.byte_length(&value)];
        let written = TagCodec.encode(&value, &mut buf).unwrap();
        assert_eq!(written, buf.len());
        assert_eq!(TagCodec.decode(&buf).unwrap(), value);
    }

    #[test]
    fn tags_are_stable() {
        let mut buf = [0u8; 16];
        assert_eq!(TagCodec.encode(&Value::Null, &mut buf).unwrap(), 1);
        assert_eq!(buf[0], 0);
        TagCodec.encode(&Value::Integer(1), &mut buf).unwrap();
        assert_eq!(buf[0], 2);
        TagCodec.encode(&Value::String("x".into()), &mut buf).unwrap();
        assert_eq!(&buf[..2], &[4, b'x']);
    }

    #[test]
    fn decode_rejects_malformed() {
        assert!(TagCodec.decode(&[]).is_err());
        assert!(TagCodec.decode(&[99]).is_err());
        assert!(TagCodec.decode(&[TAG_INTEGER, 1, 2]).is_err());
        assert!(TagCodec.decode(&[TAG_BOOL, 7]).is_err());
        assert!(TagCodec.decode(&[TAG_JSON, b'{']).is_err());
    }
}
