//! cache/alloc - chunk allocation, eviction and free-queueing.

use anyhow::Result;
use log::debug;

use crate::consts::ITEM_FLAG_FREEQ;
use crate::error::CacheError;
use crate::item::{item_header_read, item_header_valid, item_set_flags, Item, ItemRef};
use crate::slab::ChunkSource;

use super::Cache;

impl Cache {
    /// A chunk of `class`; evicts at most one slab when the arena is full.
    pub(crate) fn alloc_chunk(&mut self, class: u8, need: usize) -> Result<(u64, bool)> {
        if let Some(got) = self.try_alloc(class) {
            return Ok(got);
        }
        if self.evict_for(class) {
            if let Some(got) = self.try_alloc(class) {
                return Ok(got);
            }
        }
        self.metrics.record_reserve_failure();
        Err(CacheError::OutOfMemory { need }.into())
    }

    fn try_alloc(&mut self, class: u8) -> Option<(u64, bool)> {
        let (off, src) = self.heap.alloc(self.pool.arena_mut(), class)?;
        if src == ChunkSource::NewSlab {
            self.metrics.record_slab_carved();
            debug!("slab {} carved for class {}", self.heap.slab_of(off), class);
        }
        Some((off, src == ChunkSource::FreeList))
    }

    /// Ask the evictor for a victim slab and give it to `class`. A slab
    /// holding RESERVED items is left alone.
    fn evict_for(&mut self, class: u8) -> bool {
        let Some(slab) = self.evictor.choose(self.heap.nslab()) else {
            return false;
        };
        if slab >= self.heap.nslab() {
            return false;
        }

        let cas_size = self.cas_size();
        let arena = self.pool.arena();
        let offs: Vec<u64> = self.heap.chunks(arena, slab).collect();
        let mut linked: Vec<(Vec<u8>, u64)> = Vec::new();
        for &off in &offs {
            let at = off as usize;
            let rec = &arena[at..at + self.heap.chunk_size_at(off)];
            if !item_header_valid(rec) {
                continue;
            }
            let h = item_header_read(rec);
            if h.is_reserved() {
                self.metrics.record_eviction_refused();
                debug!("eviction of slab {} refused: reserved item at {:#x}", slab, off);
                return false;
            }
            if h.is_linked() {
                let key = Item::new(rec, ItemRef(off), cas_size).key().to_vec();
                linked.push((key, off));
            }
        }

        let mut evicted = 0usize;
        for (key, off) in linked {
            if self.index.lookup(&key) == Some(ItemRef(off)) {
                self.index.remove(&key);
                evicted += 1;
            }
            let chunk = self.heap.chunk_size_at(off);
            let at = off as usize;
            item_set_flags(&mut self.pool.arena_mut()[at..at + chunk], ITEM_FLAG_FREEQ);
            self.metrics.record_unlink();
        }

        self.heap.reassign(self.pool.arena_mut(), slab, class);
        self.metrics.record_eviction(evicted);
        debug!(
            "evicted slab {} ({} items) for class {}",
            slab, evicted, class
        );
        true
    }

    /// LINKED/RESERVED -> FREEQ, chunk back to its class free list.
    pub(crate) fn free_item(&mut self, it: ItemRef) {
        item_set_flags(self.rec_mut(it), ITEM_FLAG_FREEQ);
        self.heap.free(it.offset());
        self.metrics.record_free();
    }

    /// Unlink `it` (already removed from the index) and free-queue it.
    pub(crate) fn unlink_item(&mut self, it: ItemRef) {
        self.metrics.record_unlink();
        self.free_item(it);
    }
}
