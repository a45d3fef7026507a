//! cache/item - item operations.
//!
//! Lifecycle: reserve -> (backfill)* -> insert -> delete/flush/replace.
//! In-place writes copy payload bytes first and publish `vlen` last.

use anyhow::Result;
use byteorder::{ByteOrder, LittleEndian};
use log::debug;

use crate::consts::{ITEM_FLAG_LINKED, ITEM_FLAG_RALIGNED, ITEM_HDR_SIZE, ITEM_KEY_MAX};
use crate::error::{kind_of, CacheError};
use crate::item::{
    item_flags, item_header_read, item_header_write, item_ntotal, item_set_flags,
    item_set_vcap, item_set_vlen, Item, ItemHeader, ItemLayout, ItemRef,
};
use crate::util::now_secs;

use super::Cache;

fn check_key(key: &[u8]) -> Result<()> {
    if key.is_empty() || key.len() > ITEM_KEY_MAX {
        return Err(CacheError::InvalidKey { len: key.len() }.into());
    }
    Ok(())
}

impl Cache {
    /// Allocate a RESERVED item for `key` whose value will grow to `vlen`
    /// bytes; `seed` is written as the value prefix.
    ///
    /// `expire_at` is an absolute Unix time in seconds, 0 for never.
    ///
    /// # Panics
    /// If `seed` is longer than `vlen`.
    pub fn reserve(
        &mut self,
        key: &[u8],
        seed: &[u8],
        vlen: usize,
        olen: u8,
        expire_at: u32,
    ) -> Result<ItemRef> {
        check_key(key)?;
        assert!(
            seed.len() <= vlen,
            "value seed of {} B exceeds the declared length {}",
            seed.len(),
            vlen
        );

        let need = item_ntotal(self.cas_size(), olen as usize, key.len(), vlen);
        let class = self.heap.classes().lookup(need).ok_or(CacheError::Oversized {
            need,
            max: self.heap.classes().max_chunk(),
        })?;
        let (off, reused) = self.alloc_chunk(class, need)?;
        let it = ItemRef(off);

        let hdr = ItemHeader {
            flags: 0,
            class,
            klen: key.len() as u8,
            olen,
            vlen: 0,
            vcap: vlen as u32,
            expire_at,
            create_at: now_secs(),
        };
        let cas_size = self.cas_size();
        let rec = self.rec_mut(it);
        item_header_write(rec, &hdr);
        let l = ItemLayout::of(&hdr, cas_size, rec.len());
        rec[l.cas..l.key].fill(0);
        rec[l.key..l.key + key.len()].copy_from_slice(key);
        rec[l.data..l.data + seed.len()].copy_from_slice(seed);
        item_set_vlen(rec, seed.len() as u32);

        self.metrics.record_reserve(reused);
        debug!("reserve {} class {} ({} B)", it, class, need);
        Ok(it)
    }

    /// Copy `more` after the current value and publish the new length.
    ///
    /// # Panics
    /// If the value would exceed the length declared at reserve time.
    pub fn backfill(&mut self, it: ItemRef, more: &[u8]) {
        let cas_size = self.cas_size();
        let rec = self.rec_mut(it);
        let h = item_header_read(rec);
        assert!(!h.is_raligned(), "backfill of a right-aligned item");
        let vlen = h.vlen as usize + more.len();
        assert!(
            vlen <= h.vcap as usize,
            "backfill to {} B exceeds the declared length {}",
            vlen,
            h.vcap
        );
        let l = ItemLayout::of(&h, cas_size, rec.len());
        let at = l.data + h.vlen as usize;
        rec[at..at + more.len()].copy_from_slice(more);
        item_set_vlen(rec, vlen as u32);
        self.metrics.record_backfill(more.len());
    }

    /// Link a RESERVED item under `key`; an item previously linked under the
    /// same key is free-queued.
    ///
    /// # Panics
    /// If `it` is not RESERVED or was reserved under another key.
    pub fn insert(&mut self, it: ItemRef, key: &[u8]) {
        let h = item_header_read(self.rec(it));
        assert!(h.is_reserved(), "insert of an item that is not reserved ({})", it);
        assert!(
            self.view(it).key() == key,
            "insert of {} under a key that differs from the reserved one",
            it
        );

        if self.cas_size() > 0 {
            let cas = self.cas_next;
            self.cas_next += 1;
            let rec = self.rec_mut(it);
            LittleEndian::write_u64(&mut rec[ITEM_HDR_SIZE..ITEM_HDR_SIZE + 8], cas);
        }
        let rec = self.rec_mut(it);
        let flags = item_flags(rec);
        item_set_flags(rec, flags | ITEM_FLAG_LINKED);

        if let Some(prev) = self.index.insert(key, it) {
            if prev != it {
                self.unlink_item(prev);
            }
        }
        self.metrics.record_insert();
    }

    /// The LINKED, unexpired item stored under `key`.
    pub fn get(&self, key: &[u8]) -> Option<Item<'_>> {
        let it = self.index.lookup(key)?;
        let item = self.view(it);
        if !item.is_linked() || item.is_expired(now_secs()) {
            return None;
        }
        Some(item)
    }

    /// View any item handle, linked or not.
    pub fn item(&self, it: ItemRef) -> Item<'_> {
        self.view(it)
    }

    /// Replace the value of `it`. Stays in place if the chunk is large
    /// enough, otherwise a new item is linked under the same key.
    pub fn update(&mut self, it: ItemRef, value: &[u8]) -> Result<ItemRef> {
        let (h, l, chunk) = self.layout_of(it);
        assert!(!h.in_freeq(), "update of a free item ({})", it);
        let start = l.key + h.klen as usize;
        if start + value.len() <= chunk {
            self.write_value(it, &[value], false);
            self.metrics.record_update(true);
            return Ok(it);
        }

        let key = self.view(it).key().to_vec();
        let meta = self.view(it).meta().to_vec();
        let new_it = self.reserve(&key, value, value.len(), h.olen, h.expire_at)?;
        self.meta_mut(new_it).copy_from_slice(&meta);
        if h.is_linked() {
            self.insert(new_it, &key);
        } else {
            self.free_item(it);
        }
        self.metrics.record_update(false);
        Ok(new_it)
    }

    /// Append (or prepend) `extra` to the value of the linked item `it`.
    ///
    /// Appends grow a left-aligned value in place, prepends grow a
    /// right-aligned one in place; existing bytes never move. Otherwise the
    /// value is rebuilt in a new item, right-aligned for prepends, and linked
    /// under `key`.
    pub fn annex(&mut self, it: ItemRef, key: &[u8], extra: &[u8], append: bool) -> Result<ItemRef> {
        let (h, l, chunk) = self.layout_of(it);
        assert!(h.is_linked(), "annex of an item that is not linked ({})", it);
        let vlen = h.vlen as usize;
        let nvlen = vlen + extra.len();
        let free_edge = l.key + h.klen as usize;

        if append && !h.is_raligned() && l.data + nvlen <= chunk {
            let rec = self.rec_mut(it);
            rec[l.data + vlen..l.data + nvlen].copy_from_slice(extra);
            item_set_vcap(rec, h.vcap.max(nvlen as u32));
            item_set_vlen(rec, nvlen as u32);
            self.metrics.record_annex(true, false);
            return Ok(it);
        }
        if !append && h.is_raligned() && free_edge + nvlen <= chunk {
            let rec = self.rec_mut(it);
            let at = chunk - nvlen;
            rec[at..at + extra.len()].copy_from_slice(extra);
            item_set_vcap(rec, h.vcap.max(nvlen as u32));
            item_set_vlen(rec, nvlen as u32);
            self.metrics.record_annex(false, false);
            return Ok(it);
        }

        let old = self.view(it).value().to_vec();
        let meta = self.view(it).meta().to_vec();
        let new_it = match self.reserve(key, &[], nvlen, h.olen, h.expire_at) {
            Ok(n) => n,
            Err(e)
                if matches!(
                    kind_of(&e),
                    Some(CacheError::OutOfMemory { .. } | CacheError::Oversized { .. })
                ) =>
            {
                return Err(CacheError::NotEnoughMemory {
                    need: item_ntotal(self.cas_size(), h.olen as usize, key.len(), nvlen),
                }
                .into());
            }
            Err(e) => return Err(e),
        };
        self.meta_mut(new_it).copy_from_slice(&meta);
        if append {
            self.write_value(new_it, &[&old, extra], false);
        } else {
            self.write_value(new_it, &[extra, &old], true);
        }
        self.insert(new_it, key);
        self.metrics.record_annex(append, true);
        Ok(new_it)
    }

    /// Unlink and free-queue the item under `key`. False if there is none.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        match self.index.remove(key) {
            Some(it) => {
                self.unlink_item(it);
                self.metrics.record_delete();
                true
            }
            None => false,
        }
    }

    /// Unlink every item.
    pub fn flush(&mut self) {
        let mut all = Vec::with_capacity(self.index.len());
        self.index.for_each(&mut |_, it| all.push(it));
        self.index.clear();
        for it in &all {
            self.unlink_item(*it);
        }
        self.metrics.record_flush();
        debug!("flush: {} items unlinked", all.len());
    }

    /// Return a RESERVED item's chunk to the free list.
    ///
    /// # Panics
    /// If `it` is linked or already free.
    pub fn release(&mut self, it: ItemRef) {
        let h = item_header_read(self.rec(it));
        assert!(h.is_reserved(), "release of an item that is not reserved ({})", it);
        self.free_item(it);
    }

    /// Extra metadata bytes of `it`.
    pub fn meta(&self, it: ItemRef) -> &[u8] {
        self.view(it).meta()
    }

    pub fn meta_mut(&mut self, it: ItemRef) -> &mut [u8] {
        let (_, l, _) = self.layout_of(it);
        &mut self.rec_mut(it)[l.meta..l.key]
    }

    fn layout_of(&self, it: ItemRef) -> (ItemHeader, ItemLayout, usize) {
        let rec = self.rec(it);
        let h = item_header_read(rec);
        (h, ItemLayout::of(&h, self.cas_size(), rec.len()), rec.len())
    }

    /// Write `parts` as the whole value, left- or right-aligned, then publish
    /// the length.
    fn write_value(&mut self, it: ItemRef, parts: &[&[u8]], raligned: bool) {
        let (h, l, chunk) = self.layout_of(it);
        let total: usize = parts.iter().map(|p| p.len()).sum();
        let mut at = if raligned {
            chunk - total
        } else {
            l.key + h.klen as usize
        };

        let rec = self.rec_mut(it);
        for p in parts {
            rec[at..at + p.len()].copy_from_slice(p);
            at += p.len();
        }
        let flags = if raligned {
            h.flags | ITEM_FLAG_RALIGNED
        } else {
            h.flags & !ITEM_FLAG_RALIGNED
        };
        item_set_flags(rec, flags);
        item_set_vcap(rec, h.vcap.max(total as u32));
        item_set_vlen(rec, total as u32);
    }
}
