//! cache/open - open, recovery scan and graceful close.
//!
//! Recovery on a clean reopen:
//! - the recovery record (slab/meta.rs) must decode and match the geometry;
//! - slabs 0..nslab are adopted in order, their carved chunks scanned:
//!   LINKED -> index, FREEQ -> class free list, RESERVED -> left alone.
//! Any inconsistency drops the arena contents and the cache starts empty.

use anyhow::{anyhow, Result};
use log::{info, warn};

use crate::config::SlabConfig;
use crate::consts::{ITEM_FLAG_FREEQ, SLAB_META_LEN};
use crate::datapool::Datapool;
use crate::evict::{Evictor, NoEviction, RandomEviction};
use crate::index::{HashIndex, Index};
use crate::item::{
    item_fits, item_header_read, item_header_valid, item_set_flags, Item, ItemRef,
};
use crate::metrics::SlabMetrics;
use crate::slab::{Heap, SlabMeta};

use super::Cache;

#[derive(Debug, Default, Clone, Copy)]
struct RecoveryReport {
    slabs: u32,
    linked: usize,
    free: usize,
    reserved: usize,
    duplicates: usize,
}

impl Cache {
    /// Open with the default `HashIndex` and the evictor selected by
    /// `cfg.evict`.
    pub fn open(cfg: SlabConfig) -> Result<Self> {
        Self::open_with_index(cfg, Box::new(HashIndex::new()))
    }

    pub fn open_with_index(cfg: SlabConfig, index: Box<dyn Index + Send>) -> Result<Self> {
        cfg.validate()?;
        let evictor: Box<dyn Evictor + Send> = if cfg.evict {
            Box::new(RandomEviction::new())
        } else {
            Box::new(NoEviction)
        };

        let (pool, fresh) = Datapool::open_with_config(&cfg.datapool, cfg.slab_mem)?;
        let heap = Heap::new(&cfg, pool.size());
        let mut cache = Cache {
            cfg,
            pool,
            heap,
            index,
            evictor,
            metrics: SlabMetrics::new(),
            cas_next: 1,
            fresh,
        };
        cache.index.clear();

        if !cache.fresh {
            match cache.stored_meta() {
                Ok(meta) => match cache.recover(&meta) {
                    Ok(r) => {
                        cache.cas_next = meta.cas_next.max(1);
                        cache.metrics.record_recovery(r.linked, r.free);
                        info!(
                            "slab recovery: {} slabs, {} linked, {} free, {} reserved, {} duplicates",
                            r.slabs, r.linked, r.free, r.reserved, r.duplicates
                        );
                    }
                    Err(e) => {
                        warn!("slab recovery failed ({:#}); starting empty", e);
                        cache.fresh = true;
                    }
                },
                Err(reason) => {
                    warn!("slab recovery record unusable ({}); starting empty", reason);
                    cache.fresh = true;
                }
            }
        }

        if cache.fresh {
            cache.heap.reset();
            cache.index.clear();
            cache.cas_next = 1;
            cache.store_meta()?;
        }

        info!(
            "cache open: {} classes, {} of {} slabs in use, {} items, fresh={}",
            cache.heap.classes().count(),
            cache.heap.nslab(),
            cache.heap.max_slabs(),
            cache.index.len(),
            cache.fresh
        );
        Ok(cache)
    }

    /// Persist the recovery record and close the datapool gracefully.
    pub fn close(mut self) -> Result<()> {
        self.store_meta()?;
        info!(
            "cache close: {} slabs, {} items",
            self.heap.nslab(),
            self.index.len()
        );
        self.pool.close()
    }

    fn stored_meta(&self) -> std::result::Result<SlabMeta, String> {
        let mut buf = [0u8; SLAB_META_LEN];
        self.pool
            .get_user_data(&mut buf)
            .map_err(|e| format!("{:#}", e))?;
        let meta = SlabMeta::decode(&buf).ok_or_else(|| "bad record".to_string())?;
        match meta.incompatibility(&self.cfg, self.pool.size()) {
            Some(reason) => Err(reason),
            None => Ok(meta),
        }
    }

    fn store_meta(&mut self) -> Result<()> {
        let mut meta = SlabMeta::for_config(&self.cfg, self.pool.size());
        meta.nslab = self.heap.nslab();
        meta.cas_next = self.cas_next;
        self.pool.set_user_data(&meta.encode())
    }

    fn recover(&mut self, meta: &SlabMeta) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();
        let res = self.scan_slabs(meta.nslab, &mut report);
        if res.is_err() {
            self.heap.reset();
            self.index.clear();
        }
        res.map(|_| report)
    }

    fn scan_slabs(&mut self, nslab: u32, report: &mut RecoveryReport) -> Result<()> {
        let cas_size = self.cas_size();
        for slab in 0..nslab {
            let hdr = self
                .heap
                .adopt(self.pool.arena(), slab)
                .ok_or_else(|| anyhow!("slab {} has an invalid header", slab))?;
            report.slabs += 1;

            let chunk = hdr.chunk_size as usize;
            let offs: Vec<u64> = self.heap.chunks(self.pool.arena(), slab).collect();
            for off in offs {
                let at = off as usize;
                let rec = &self.pool.arena()[at..at + chunk];
                if !item_header_valid(rec) {
                    return Err(anyhow!(
                        "chunk at {:#x} in slab {} has no item header",
                        off,
                        slab
                    ));
                }
                let h = item_header_read(rec);
                if h.class != hdr.class {
                    return Err(anyhow!(
                        "item at {:#x} claims class {}, slab {} is class {}",
                        off,
                        h.class,
                        slab,
                        hdr.class
                    ));
                }
                if !item_fits(&h, cas_size, chunk) {
                    return Err(anyhow!(
                        "item at {:#x} in slab {} overruns its {} B chunk",
                        off,
                        slab,
                        chunk
                    ));
                }

                let it = ItemRef(off);
                if h.is_linked() {
                    let key = Item::new(rec, it, cas_size).key().to_vec();
                    if let Some(prev) = self.index.insert(&key, it) {
                        // keep the first copy seen
                        self.index.insert(&key, prev);
                        item_set_flags(&mut self.pool.arena_mut()[at..at + chunk], ITEM_FLAG_FREEQ);
                        self.heap.free(off);
                        report.duplicates += 1;
                        report.free += 1;
                    } else {
                        report.linked += 1;
                    }
                } else if h.in_freeq() {
                    self.heap.free(off);
                    report.free += 1;
                } else {
                    report.reserved += 1;
                }
            }
        }
        Ok(())
    }
}
