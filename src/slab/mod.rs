//! slab - the arena carved into fixed-size slabs of per-class chunks.
//!
//! Submodules:
//! - class.rs - size class table
//! - meta.rs  - recovery record stored in the datapool user data
//!
//! Slab header (LE, 16 B) at `slab_id * slab_size`:
//! [magic u32 "SLB1"][class u8][pad u8][pad u16][chunk_size u32][nused u32]
//!
//! `Heap` holds only DRAM state (free lists, carve pointers, slab -> class map);
//! the arena itself is passed in by the caller. Allocation order: class free
//! list, then the class's current slab, then a brand new slab.

pub mod class;
pub mod meta;

use byteorder::{ByteOrder, LittleEndian};

use crate::config::SlabConfig;
use crate::consts::{
    CLASS_INVALID, SLAB_HDR_SIZE, SLAB_MAGIC, SLAB_OFF_CHUNK_SIZE, SLAB_OFF_CLASS,
    SLAB_OFF_MAGIC, SLAB_OFF_NUSED,
};

pub use class::SlabClasses;
pub use meta::SlabMeta;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlabHeader {
    pub class: u8,
    pub chunk_size: u32,
    pub nused: u32,
}

pub fn slab_header_read(slab: &[u8]) -> Option<SlabHeader> {
    if LittleEndian::read_u32(&slab[SLAB_OFF_MAGIC..SLAB_OFF_MAGIC + 4]) != SLAB_MAGIC {
        return None;
    }
    Some(SlabHeader {
        class: slab[SLAB_OFF_CLASS],
        chunk_size: LittleEndian::read_u32(&slab[SLAB_OFF_CHUNK_SIZE..SLAB_OFF_CHUNK_SIZE + 4]),
        nused: LittleEndian::read_u32(&slab[SLAB_OFF_NUSED..SLAB_OFF_NUSED + 4]),
    })
}

pub fn slab_header_write(slab: &mut [u8], h: &SlabHeader) {
    slab[..SLAB_HDR_SIZE].fill(0);
    LittleEndian::write_u32(&mut slab[SLAB_OFF_MAGIC..SLAB_OFF_MAGIC + 4], SLAB_MAGIC);
    slab[SLAB_OFF_CLASS] = h.class;
    LittleEndian::write_u32(&mut slab[SLAB_OFF_CHUNK_SIZE..SLAB_OFF_CHUNK_SIZE + 4], h.chunk_size);
    LittleEndian::write_u32(&mut slab[SLAB_OFF_NUSED..SLAB_OFF_NUSED + 4], h.nused);
}

fn slab_set_nused(slab: &mut [u8], nused: u32) {
    LittleEndian::write_u32(&mut slab[SLAB_OFF_NUSED..SLAB_OFF_NUSED + 4], nused);
}

/// Where a chunk came from; reported to metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkSource {
    FreeList,
    Carved,
    NewSlab,
}

#[derive(Debug)]
pub struct Heap {
    slab_size: usize,
    max_slabs: u32,
    nslab: u32,
    classes: SlabClasses,
    /// Free chunk offsets per class (index = class - 1).
    free: Vec<Vec<u64>>,
    /// Partially carved slab per class.
    current: Vec<Option<u32>>,
    /// Class of every carved slab.
    slab_class: Vec<u8>,
}

impl Heap {
    pub fn new(cfg: &SlabConfig, arena_len: usize) -> Self {
        let classes = SlabClasses::new(cfg.slab_size, cfg.item_min, cfg.factor);
        let n = classes.count();
        Self {
            slab_size: cfg.slab_size,
            max_slabs: (arena_len / cfg.slab_size) as u32,
            nslab: 0,
            classes,
            free: vec![Vec::new(); n],
            current: vec![None; n],
            slab_class: Vec::new(),
        }
    }

    /// Forget all DRAM state; the arena is treated as empty.
    pub fn reset(&mut self) {
        self.nslab = 0;
        self.free.iter_mut().for_each(Vec::clear);
        self.current.iter_mut().for_each(|c| *c = None);
        self.slab_class.clear();
    }

    pub fn classes(&self) -> &SlabClasses {
        &self.classes
    }

    pub fn slab_size(&self) -> usize {
        self.slab_size
    }

    pub fn nslab(&self) -> u32 {
        self.nslab
    }

    pub fn max_slabs(&self) -> u32 {
        self.max_slabs
    }

    pub fn free_count(&self, class: u8) -> usize {
        self.free[class as usize - 1].len()
    }

    pub fn free_total(&self) -> usize {
        self.free.iter().map(Vec::len).sum()
    }

    pub fn slab_base(&self, slab: u32) -> usize {
        slab as usize * self.slab_size
    }

    pub fn slab_of(&self, off: u64) -> u32 {
        (off / self.slab_size as u64) as u32
    }

    pub fn slab_class(&self, slab: u32) -> u8 {
        self.slab_class
            .get(slab as usize)
            .copied()
            .unwrap_or(CLASS_INVALID)
    }

    /// Chunk size of the slab that holds `off`.
    pub fn chunk_size_at(&self, off: u64) -> usize {
        self.classes.chunk_size(self.slab_class(self.slab_of(off)))
    }

    /// Byte offsets of every carved chunk in `slab`.
    pub fn chunks(&self, arena: &[u8], slab: u32) -> impl Iterator<Item = u64> {
        let base = self.slab_base(slab);
        let (chunk, nused) = match slab_header_read(&arena[base..base + SLAB_HDR_SIZE]) {
            Some(h) => (h.chunk_size as u64, h.nused as u64),
            None => (1, 0),
        };
        let first = (base + SLAB_HDR_SIZE) as u64;
        (0..nused).map(move |i| first + i * chunk)
    }

    /// Take a chunk of `class`, or None when the arena is exhausted.
    pub fn alloc(&mut self, arena: &mut [u8], class: u8) -> Option<(u64, ChunkSource)> {
        let ci = class as usize - 1;
        if let Some(off) = self.free[ci].pop() {
            return Some((off, ChunkSource::FreeList));
        }
        if let Some(off) = self.carve(arena, class) {
            return Some((off, ChunkSource::Carved));
        }
        if self.nslab < self.max_slabs {
            let slab = self.nslab;
            self.nslab += 1;
            self.slab_class.push(class);
            self.format_slab(arena, slab, class);
            if let Some(off) = self.carve(arena, class) {
                return Some((off, ChunkSource::NewSlab));
            }
        }
        None
    }

    fn carve(&mut self, arena: &mut [u8], class: u8) -> Option<u64> {
        let ci = class as usize - 1;
        let slab = self.current[ci]?;
        let base = self.slab_base(slab);
        let per_slab = self.classes.per_slab(class, self.slab_size);
        let hdr = slab_header_read(&arena[base..base + SLAB_HDR_SIZE])?;
        if hdr.nused >= per_slab {
            self.current[ci] = None;
            return None;
        }
        let off = base + SLAB_HDR_SIZE + hdr.nused as usize * hdr.chunk_size as usize;
        slab_set_nused(&mut arena[base..base + SLAB_HDR_SIZE], hdr.nused + 1);
        if hdr.nused + 1 >= per_slab {
            self.current[ci] = None;
        }
        Some(off as u64)
    }

    fn format_slab(&mut self, arena: &mut [u8], slab: u32, class: u8) {
        let base = self.slab_base(slab);
        let hdr = SlabHeader {
            class,
            chunk_size: self.classes.chunk_size(class) as u32,
            nused: 0,
        };
        slab_header_write(&mut arena[base..base + SLAB_HDR_SIZE], &hdr);
        self.current[class as usize - 1] = Some(slab);
    }

    /// Return a chunk to its class free list.
    pub fn free(&mut self, off: u64) {
        let class = self.slab_class(self.slab_of(off));
        debug_assert!(self.classes.is_valid(class));
        self.free[class as usize - 1].push(off);
    }

    /// Give `slab` to `class`: its free chunks are forgotten, its header is
    /// rewritten with no chunks carved, and it becomes the class's carve slab.
    /// The caller must have unlinked every item in it.
    pub fn reassign(&mut self, arena: &mut [u8], slab: u32, class: u8) {
        let old = self.slab_class(slab);
        if self.classes.is_valid(old) {
            let oi = old as usize - 1;
            let (lo, hi) = (
                self.slab_base(slab) as u64,
                (self.slab_base(slab) + self.slab_size) as u64,
            );
            self.free[oi].retain(|&off| off < lo || off >= hi);
            if self.current[oi] == Some(slab) {
                self.current[oi] = None;
            }
        }
        self.slab_class[slab as usize] = class;
        self.format_slab(arena, slab, class);
    }

    /// Register a slab found in the arena during recovery. Returns its
    /// header, or None if the header does not fit the class table.
    pub fn adopt(&mut self, arena: &[u8], slab: u32) -> Option<SlabHeader> {
        let base = self.slab_base(slab);
        let hdr = slab_header_read(&arena[base..base + SLAB_HDR_SIZE])?;
        if !self.classes.is_valid(hdr.class)
            || hdr.chunk_size as usize != self.classes.chunk_size(hdr.class)
            || hdr.nused > self.classes.per_slab(hdr.class, self.slab_size)
        {
            return None;
        }
        debug_assert_eq!(slab, self.nslab);
        self.nslab += 1;
        self.slab_class.push(hdr.class);
        if hdr.nused < self.classes.per_slab(hdr.class, self.slab_size) {
            self.current[hdr.class as usize - 1] = Some(slab);
        }
        Some(hdr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heap(arena_len: usize) -> (Heap, Vec<u8>) {
        let cfg = SlabConfig::default().with_slab_size(4096).with_item_min(64);
        (Heap::new(&cfg, arena_len), vec![0u8; arena_len])
    }

    #[test]
    fn carve_then_new_slab_then_exhaust() {
        let (mut h, mut arena) = heap(2 * 4096);
        let class = h.classes().count() as u8; // one chunk per slab
        assert_eq!(h.alloc(&mut arena, class), Some((16, ChunkSource::NewSlab)));
        assert_eq!(
            h.alloc(&mut arena, class),
            Some((4096 + 16, ChunkSource::NewSlab))
        );
        assert_eq!(h.alloc(&mut arena, class), None);
        assert_eq!(h.nslab(), 2);

        h.free(16);
        assert_eq!(h.alloc(&mut arena, class), Some((16, ChunkSource::FreeList)));
    }

    #[test]
    fn small_class_carves_sequentially() {
        let (mut h, mut arena) = heap(4096);
        let (a, src) = h.alloc(&mut arena, 1).unwrap();
        assert_eq!((a, src), (16, ChunkSource::NewSlab));
        let (b, src) = h.alloc(&mut arena, 1).unwrap();
        assert_eq!((b, src), (16 + 64, ChunkSource::Carved));
        assert_eq!(h.chunks(&arena, 0).collect::<Vec<_>>(), vec![a, b]);
        assert_eq!(h.chunk_size_at(b), 64);
    }

    #[test]
    fn reassign_drops_old_free_chunks() {
        let (mut h, mut arena) = heap(4096);
        let (a, _) = h.alloc(&mut arena, 1).unwrap();
        h.free(a);
        assert_eq!(h.free_count(1), 1);

        let big = h.classes().count() as u8;
        h.reassign(&mut arena, 0, big);
        assert_eq!(h.free_count(1), 0);
        assert_eq!(h.slab_class(0), big);
        assert_eq!(h.alloc(&mut arena, big), Some((16, ChunkSource::Carved)));
        assert_eq!(h.alloc(&mut arena, 1), None);
    }

    #[test]
    fn adopt_restores_carve_state() {
        let (mut h, mut arena) = heap(4096);
        h.alloc(&mut arena, 1).unwrap();
        h.alloc(&mut arena, 1).unwrap();

        let cfg = SlabConfig::default().with_slab_size(4096).with_item_min(64);
        let mut h2 = Heap::new(&cfg, 4096);
        let hdr = h2.adopt(&arena, 0).unwrap();
        assert_eq!(hdr.nused, 2);
        assert_eq!(
            h2.alloc(&mut arena, 1),
            Some((16 + 2 * 64, ChunkSource::Carved))
        );
    }
}
