//! Per-cache metrics for the slab/item allocator.
//!
//! Atomic counters (Relaxed) owned by a `Cache`; `snapshot()` copies them
//! into a plain serializable struct, `reset()` zeroes them.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct SlabMetrics {
    // ----- Allocation -----
    reserves: AtomicU64,
    reserve_failures: AtomicU64,
    chunks_reused: AtomicU64,
    slabs_carved: AtomicU64,

    // ----- Item lifecycle -----
    inserts: AtomicU64,
    unlinks: AtomicU64,
    frees: AtomicU64,
    backfills: AtomicU64,
    backfill_bytes: AtomicU64,

    // ----- Mutation -----
    updates_in_place: AtomicU64,
    updates_realloc: AtomicU64,
    appends: AtomicU64,
    prepends: AtomicU64,
    annex_realloc: AtomicU64,
    deletes: AtomicU64,
    flushes: AtomicU64,

    // ----- Eviction -----
    evictions: AtomicU64,
    evicted_items: AtomicU64,
    eviction_refusals: AtomicU64,

    // ----- Recovery -----
    recovered_items: AtomicU64,
    recovered_free: AtomicU64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub reserves: u64,
    pub reserve_failures: u64,
    pub chunks_reused: u64,
    pub slabs_carved: u64,

    pub inserts: u64,
    pub unlinks: u64,
    pub frees: u64,
    pub backfills: u64,
    pub backfill_bytes: u64,

    pub updates_in_place: u64,
    pub updates_realloc: u64,
    pub appends: u64,
    pub prepends: u64,
    pub annex_realloc: u64,
    pub deletes: u64,
    pub flushes: u64,

    pub evictions: u64,
    pub evicted_items: u64,
    pub eviction_refusals: u64,

    pub recovered_items: u64,
    pub recovered_free: u64,
}

impl MetricsSnapshot {
    /// Share of reserves served from a free list.
    pub fn reuse_ratio(&self) -> f64 {
        if self.reserves == 0 {
            0.0
        } else {
            self.chunks_reused as f64 / self.reserves as f64
        }
    }

    pub fn in_place_ratio(&self) -> f64 {
        let total = self.updates_in_place + self.updates_realloc;
        if total == 0 {
            0.0
        } else {
            self.updates_in_place as f64 / total as f64
        }
    }
}

#[inline]
fn bump(c: &AtomicU64) {
    c.fetch_add(1, Ordering::Relaxed);
}

impl SlabMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_reserve(&self, reused: bool) {
        bump(&self.reserves);
        if reused {
            bump(&self.chunks_reused);
        }
    }

    pub fn record_reserve_failure(&self) {
        bump(&self.reserve_failures);
    }

    pub fn record_slab_carved(&self) {
        bump(&self.slabs_carved);
    }

    pub fn record_insert(&self) {
        bump(&self.inserts);
    }

    pub fn record_unlink(&self) {
        bump(&self.unlinks);
    }

    pub fn record_free(&self) {
        bump(&self.frees);
    }

    pub fn record_backfill(&self, bytes: usize) {
        bump(&self.backfills);
        self.backfill_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_update(&self, in_place: bool) {
        if in_place {
            bump(&self.updates_in_place);
        } else {
            bump(&self.updates_realloc);
        }
    }

    pub fn record_annex(&self, append: bool, realloc: bool) {
        if append {
            bump(&self.appends);
        } else {
            bump(&self.prepends);
        }
        if realloc {
            bump(&self.annex_realloc);
        }
    }

    pub fn record_delete(&self) {
        bump(&self.deletes);
    }

    pub fn record_flush(&self) {
        bump(&self.flushes);
    }

    pub fn record_eviction(&self, items: usize) {
        bump(&self.evictions);
        self.evicted_items.fetch_add(items as u64, Ordering::Relaxed);
    }

    pub fn record_eviction_refused(&self) {
        bump(&self.eviction_refusals);
    }

    pub fn record_recovery(&self, items: usize, free: usize) {
        self.recovered_items.fetch_add(items as u64, Ordering::Relaxed);
        self.recovered_free.fetch_add(free as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let l = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            reserves: l(&self.reserves),
            reserve_failures: l(&self.reserve_failures),
            chunks_reused: l(&self.chunks_reused),
            slabs_carved: l(&self.slabs_carved),
            inserts: l(&self.inserts),
            unlinks: l(&self.unlinks),
            frees: l(&self.frees),
            backfills: l(&self.backfills),
            backfill_bytes: l(&self.backfill_bytes),
            updates_in_place: l(&self.updates_in_place),
            updates_realloc: l(&self.updates_realloc),
            appends: l(&self.appends),
            prepends: l(&self.prepends),
            annex_realloc: l(&self.annex_realloc),
            deletes: l(&self.deletes),
            flushes: l(&self.flushes),
            evictions: l(&self.evictions),
            evicted_items: l(&self.evicted_items),
            eviction_refusals: l(&self.eviction_refusals),
            recovered_items: l(&self.recovered_items),
            recovered_free: l(&self.recovered_free),
        }
    }

    pub fn reset(&self) {
        for c in [
            &self.reserves,
            &self.reserve_failures,
            &self.chunks_reused,
            &self.slabs_carved,
            &self.inserts,
            &self.unlinks,
            &self.frees,
            &self.backfills,
            &self.backfill_bytes,
            &self.updates_in_place,
            &self.updates_realloc,
            &self.appends,
            &self.prepends,
            &self.annex_realloc,
            &self.deletes,
            &self.flushes,
            &self.evictions,
            &self.evicted_items,
            &self.eviction_refusals,
            &self.recovered_items,
            &self.recovered_free,
        ] {
            c.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_and_reset() {
        let m = SlabMetrics::new();
        m.record_reserve(false);
        m.record_reserve(true);
        m.record_update(true);
        m.record_update(false);
        m.record_annex(false, true);
        let s = m.snapshot();
        assert_eq!(s.reserves, 2);
        assert_eq!(s.prepends, 1);
        assert_eq!(s.annex_realloc, 1);
        assert!((s.reuse_ratio() - 0.5).abs() < 1e-9);
        assert!((s.in_place_ratio() - 0.5).abs() < 1e-9);

        m.reset();
        assert_eq!(m.snapshot().reserves, 0);
    }
}
