//! Pushdown oracles consulted before any column is decoded.
//!
//! Zone maps answer "could this page match" from min/max/null statistics,
//! bloom filters answer equality membership, and bitmap indexes yield the exact
//! rows holding each dictionary value. All of them narrow a [`SparseRange`].

mod bitmap;
mod bloom;
mod sparse_range;
mod zone_map;

pub use bitmap::{BitmapIndex, BitmapIndexIterator};
pub use bloom::{BloomFilter, PageBloomFilter, SipBloomFilter};
pub use sparse_range::{SparseRange, SparseRangeIterator};
pub use zone_map::{PageZoneMap, ZoneMapDetail};
