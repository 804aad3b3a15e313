//! Process-wide index of artifact digests.

use crate::build::DigestItem;
use dashmap::DashMap;

/// Maps artifact keys to the digest recorded for them during this process.
///
/// Entries are never evicted. A key is only ever written on behalf of the
/// module owning the artifact, so concurrent writers never disagree and the
/// last write wins.
#[derive(Debug, Default)]
pub struct DigestIndex {
    entries: DashMap<String, DigestItem>,
}

impl DigestIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `item` under `key`, returning the replaced entry.
    pub fn record(&self, key: impl Into<String>, item: DigestItem) -> Option<DigestItem> {
        self.entries.insert(key.into(), item)
    }

    pub fn get(&self, key: &str) -> Option<DigestItem> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
