//! Carton - The artist's toolbox for tempera.
//!
//! Foundational utilities shared by every tempera crate, the way a carton
//! (artist's portfolio case) holds the tools an artist reaches for first.
//!
//! # Modules
//!
//! - **hash**: xxHash3 content hashing for cache keys
//! - **cache**: the compiled media cache shared across compilations
//!
//! # Example
//!
//! ```
//! use tempera_carton::{ContentHash, MediaCache};
//!
//! let cache = MediaCache::new();
//! let key = ContentHash::of_parts(&["script", "var a = 1;"]);
//! let out = cache
//!     .get_or_compile(key, || Ok::<_, ()>("var a=1;".to_string()))
//!     .unwrap();
//! assert_eq!(&*out, "var a=1;");
//! ```

pub mod cache;
pub mod hash;

pub use cache::MediaCache;
pub use hash::ContentHash;

// Re-export compact_str::CompactString for convenience
pub use compact_str::{format_compact, CompactString, ToCompactString};

// Re-export smallvec for stack-optimized collections
pub use smallvec::{smallvec, SmallVec};

// Re-export rustc-hash for fast hash maps/sets
pub use rustc_hash::{FxHashMap, FxHashSet};

// Re-export phf for compile-time perfect hash functions
pub use phf::{phf_map, phf_set, Map as PhfMap, Set as PhfSet};
