//! Key -> item lookup structure used by the cache.
//!
//! The cache only talks to the `Index` trait; `HashIndex` is the default
//! (xxhash64-keyed HashMap). Entries are item handles, so an index never holds
//! borrows into the arena.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;

use twox_hash::XxHash64;

use crate::item::ItemRef;

pub trait Index {
    /// Map `key` to `it`, returning the handle it replaced.
    fn insert(&mut self, key: &[u8], it: ItemRef) -> Option<ItemRef>;

    fn lookup(&self, key: &[u8]) -> Option<ItemRef>;

    fn remove(&mut self, key: &[u8]) -> Option<ItemRef>;

    /// Visit every entry. The visitor must not mutate the index.
    fn for_each(&self, f: &mut dyn FnMut(&[u8], ItemRef));

    fn clear(&mut self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct HashIndex {
    map: HashMap<Box<[u8]>, ItemRef, BuildHasherDefault<XxHash64>>,
}

impl HashIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            map: HashMap::with_capacity_and_hasher(n, Default::default()),
        }
    }
}

impl Index for HashIndex {
    fn insert(&mut self, key: &[u8], it: ItemRef) -> Option<ItemRef> {
        if let Some(slot) = self.map.get_mut(key) {
            return Some(std::mem::replace(slot, it));
        }
        self.map.insert(key.into(), it);
        None
    }

    fn lookup(&self, key: &[u8]) -> Option<ItemRef> {
        self.map.get(key).copied()
    }

    fn remove(&mut self, key: &[u8]) -> Option<ItemRef> {
        self.map.remove(key)
    }

    fn for_each(&self, f: &mut dyn FnMut(&[u8], ItemRef)) {
        for (k, &v) in &self.map {
            f(k, v);
        }
    }

    fn clear(&mut self) {
        self.map.clear();
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_and_reports_previous() {
        let mut idx = HashIndex::new();
        assert!(idx.is_empty());
        assert_eq!(idx.insert(b"k", ItemRef(16)), None);
        assert_eq!(idx.insert(b"k", ItemRef(80)), Some(ItemRef(16)));
        assert_eq!(idx.lookup(b"k"), Some(ItemRef(80)));
        assert_eq!(idx.len(), 1);

        let mut seen = Vec::new();
        idx.for_each(&mut |k, v| seen.push((k.to_vec(), v)));
        assert_eq!(seen, vec![(b"k".to_vec(), ItemRef(80))]);

        assert_eq!(idx.remove(b"k"), Some(ItemRef(80)));
        assert_eq!(idx.remove(b"k"), None);
        assert_eq!(idx.lookup(b"k"), None);
    }
}
