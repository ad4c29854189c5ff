//! Fast hashing utilities using xxHash3.
//!
//! Keys for the media cache are derived from the content being compiled,
//! so identical sources share one compiled result.

use std::fmt;

use xxhash_rust::xxh3::{xxh3_64, Xxh3};

/// Separator fed between the parts of a multi-part key.
const PART_SEPARATOR: u8 = 0xff;

/// 64-bit content hash used as a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ContentHash(u64);

impl ContentHash {
    /// Hash a single string.
    #[inline]
    pub fn of(content: &str) -> Self {
        Self(xxh3_64(content.as_bytes()))
    }

    /// Hash several strings as one key.
    ///
    /// `["ab", "c"]` and `["a", "bc"]` produce different keys.
    pub fn of_parts(parts: &[&str]) -> Self {
        let mut hasher = Xxh3::new();
        for part in parts {
            hasher.update(part.as_bytes());
            hasher.update(&[PART_SEPARATOR]);
        }
        Self(hasher.digest())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
