use std::{fmt, ops::Range, sync::Arc};

use bloomfilter::Bloom;

/// Probabilistic membership test over a page's distinct non-null values.
///
/// `test_bytes` may answer true for absent keys but never false for present
/// ones.
pub trait BloomFilter: Send + Sync + fmt::Debug {
    /// Whether `key` might be present.
    fn test_bytes(&self, key: &[u8]) -> bool;
}

/// SipHash-based filter backed by the `bloomfilter` crate.
pub struct SipBloomFilter {
    filter: Bloom<[u8]>,
    items: usize,
}

impl SipBloomFilter {
    /// Creates a filter sized for `expected_items` at false positive rate `fpp`.
    #[must_use]
    pub fn new(expected_items: usize, fpp: f64) -> Self {
        Self {
            filter: Bloom::new_for_fp_rate(expected_items.max(1), fpp),
            items: 0,
        }
    }

    /// Adds a key.
    #[inline]
    pub fn insert(&mut self, key: &[u8]) {
        self.filter.set(key);
        self.items += 1;
    }

    /// Keys inserted so far.
    #[must_use]
    pub fn items(&self) -> usize {
        self.items
    }
}

impl fmt::Debug for SipBloomFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SipBloomFilter")
            .field("items", &self.items)
            .field("bits", &self.filter.number_of_bits())
            .field("hashes", &self.filter.number_of_hash_functions())
            .finish()
    }
}

impl BloomFilter for SipBloomFilter {
    #[inline]
    fn test_bytes(&self, key: &[u8]) -> bool {
        self.filter.check(key)
    }
}

/// Bloom filter of one page of a segment.
#[derive(Clone, Debug)]
pub struct PageBloomFilter {
    /// Rows of the page.
    pub rows: Range<u32>,
    /// Filter over the page's non-null values.
    pub filter: Arc<dyn BloomFilter>,
}
