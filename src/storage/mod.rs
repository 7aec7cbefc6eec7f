//! Byte storage for the map's data log.

mod pages;

pub use pages::{PagedBytes, DEFAULT_PAGE_BYTES};
