//! cache - the context that ties datapool, heap, index and eviction together.
//!
//! Submodules:
//! - open.rs  - open/recovery/close
//! - alloc.rs - chunk allocation with one eviction attempt, free-queueing
//! - item.rs  - item operations (reserve/backfill/insert/get/update/annex/...)
//!
//! Mutating operations take `&mut Cache`; `get` and `item` take `&Cache`.
//! Item handles are arena offsets and stay valid across a graceful reopen.

pub mod alloc;
pub mod item;
pub mod open;

use serde::Serialize;

use crate::config::SlabConfig;
use crate::datapool::Datapool;
use crate::evict::Evictor;
use crate::index::Index;
use crate::item::{Item, ItemRef};
use crate::metrics::{MetricsSnapshot, SlabMetrics};
use crate::slab::Heap;

pub struct Cache {
    pub(crate) cfg: SlabConfig,
    pub(crate) pool: Datapool,
    pub(crate) heap: Heap,
    pub(crate) index: Box<dyn Index + Send>,
    pub(crate) evictor: Box<dyn Evictor + Send>,
    pub(crate) metrics: SlabMetrics,
    pub(crate) cas_next: u64,
    pub(crate) fresh: bool,
}

/// Point-in-time shape of the allocator.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub arena_size: usize,
    pub slab_size: usize,
    pub nslab: u32,
    pub max_slabs: u32,
    pub classes: usize,
    pub max_item: usize,
    pub items: usize,
    pub free_chunks: usize,
    pub cas_next: u64,
    pub fresh: bool,
}

impl Cache {
    pub fn config(&self) -> &SlabConfig {
        &self.cfg
    }

    pub fn pool(&self) -> &Datapool {
        &self.pool
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// True if this open started from an empty arena.
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// Number of linked items.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn set_evictor(&mut self, evictor: Box<dyn Evictor + Send>) {
        self.evictor = evictor;
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            arena_size: self.pool.size(),
            slab_size: self.heap.slab_size(),
            nslab: self.heap.nslab(),
            max_slabs: self.heap.max_slabs(),
            classes: self.heap.classes().count(),
            max_item: self.heap.classes().max_chunk(),
            items: self.index.len(),
            free_chunks: self.heap.free_total(),
            cas_next: self.cas_next,
            fresh: self.fresh,
        }
    }

    /// Visit every linked item.
    pub fn for_each_item(&self, f: &mut dyn FnMut(Item<'_>)) {
        self.index.for_each(&mut |_, it| f(self.view(it)));
    }

    pub(crate) fn cas_size(&self) -> usize {
        self.cfg.cas_size()
    }

    pub(crate) fn rec(&self, it: ItemRef) -> &[u8] {
        let chunk = self.heap.chunk_size_at(it.offset());
        &self.pool.arena()[it.at()..it.at() + chunk]
    }

    pub(crate) fn rec_mut(&mut self, it: ItemRef) -> &mut [u8] {
        let chunk = self.heap.chunk_size_at(it.offset());
        &mut self.pool.arena_mut()[it.at()..it.at() + chunk]
    }

    pub(crate) fn view(&self, it: ItemRef) -> Item<'_> {
        Item::new(self.rec(it), it, self.cas_size())
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("pool", &self.pool)
            .field("stats", &self.stats())
            .finish()
    }
}
