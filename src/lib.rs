#![warn(clippy::all)]
#![allow(clippy::new_without_default)]
#![allow(clippy::too_long_first_doc_paragraph)]

pub mod cache;
pub mod codec;
pub mod error;
pub mod event;
pub mod hash;
pub mod map;
pub mod persist;
pub mod storage;

pub use codec::{BincodeCodec, BytesCodec, Codec, I64Codec, StrCodec, TagCodec, Value};
pub use error::{Error, Result};
pub use event::EventSink;
pub use map::{CompactionOptions, Options, RogueMap};
pub use persist::{Backend, PersistOptions, PersistenceAdapter};
