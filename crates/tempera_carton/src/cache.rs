//! Cache of already-compiled external media.
//!
//! External scripts and stylesheets referenced by many templates are
//! compiled once per distinct content. A key is computed by at most one
//! caller: concurrent requests for an unbuilt key block on the same cell
//! until the first one finishes. Failed compilations are not stored.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;

use crate::hash::ContentHash;

type Slot = Arc<OnceCell<Arc<str>>>;

/// Content-hash keyed store of compiled media.
#[derive(Debug, Default)]
pub struct MediaCache {
    entries: DashMap<ContentHash, Slot>,
}

impl MediaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the compiled output for `key`, running `compile` if no caller
    /// has produced it yet.
    ///
    /// The map shard is released before `compile` runs, so `compile` may
    /// itself use the cache for other keys.
    pub fn get_or_compile<E, F>(&self, key: ContentHash, compile: F) -> Result<Arc<str>, E>
    where
        F: FnOnce() -> Result<String, E>,
    {
        let slot = Arc::clone(
            self.entries
                .entry(key)
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        );
        slot.get_or_try_init(|| compile().map(Arc::from))
            .map(Arc::clone)
    }

    /// Compiled output for `key`, if present.
    pub fn get(&self, key: ContentHash) -> Option<Arc<str>> {
        self.entries
            .get(&key)
            .and_then(|slot| slot.value().get().map(Arc::clone))
    }

    /// Number of compiled entries.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|slot| slot.value().get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop one entry, forcing the next request to recompile.
    pub fn invalidate(&self, key: ContentHash) {
        self.entries.remove(&key);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
