//! slab/meta - recovery record kept in the datapool user-data slot.
//!
//! Layout (LE, 56 B):
//! [magic8][ver u32][slab_size u32][item_min u32][factor_milli u32][use_cas u8][pad3]
//! [arena_len u64][nslab u32][pad u32][cas_next u64][crc32 u32]
//!
//! crc32 covers everything before it.

use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher as Crc32;

use crate::config::SlabConfig;
use crate::consts::{SLAB_META_LEN, SLAB_META_MAGIC, SLAB_META_VERSION};

const OFF_MAGIC: usize = 0;
const OFF_VERSION: usize = 8;
const OFF_SLAB_SIZE: usize = 12;
const OFF_ITEM_MIN: usize = 16;
const OFF_FACTOR: usize = 20;
const OFF_USE_CAS: usize = 24;
const OFF_ARENA_LEN: usize = 28;
const OFF_NSLAB: usize = 36;
const OFF_CAS_NEXT: usize = 44;
const OFF_CRC32: usize = 52;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlabMeta {
    pub slab_size: u32,
    pub item_min: u32,
    pub factor_milli: u32,
    pub use_cas: bool,
    pub arena_len: u64,
    pub nslab: u32,
    pub cas_next: u64,
}

impl SlabMeta {
    pub fn for_config(cfg: &SlabConfig, arena_len: usize) -> Self {
        Self {
            slab_size: cfg.slab_size as u32,
            item_min: cfg.item_min as u32,
            factor_milli: cfg.factor_milli(),
            use_cas: cfg.use_cas,
            arena_len: arena_len as u64,
            nslab: 0,
            cas_next: 1,
        }
    }

    pub fn encode(&self) -> [u8; SLAB_META_LEN] {
        let mut buf = [0u8; SLAB_META_LEN];
        buf[OFF_MAGIC..OFF_MAGIC + 8].copy_from_slice(SLAB_META_MAGIC);
        LittleEndian::write_u32(&mut buf[OFF_VERSION..OFF_VERSION + 4], SLAB_META_VERSION);
        LittleEndian::write_u32(&mut buf[OFF_SLAB_SIZE..OFF_SLAB_SIZE + 4], self.slab_size);
        LittleEndian::write_u32(&mut buf[OFF_ITEM_MIN..OFF_ITEM_MIN + 4], self.item_min);
        LittleEndian::write_u32(&mut buf[OFF_FACTOR..OFF_FACTOR + 4], self.factor_milli);
        buf[OFF_USE_CAS] = self.use_cas as u8;
        LittleEndian::write_u64(&mut buf[OFF_ARENA_LEN..OFF_ARENA_LEN + 8], self.arena_len);
        LittleEndian::write_u32(&mut buf[OFF_NSLAB..OFF_NSLAB + 4], self.nslab);
        LittleEndian::write_u64(&mut buf[OFF_CAS_NEXT..OFF_CAS_NEXT + 8], self.cas_next);
        let crc = meta_crc(&buf);
        LittleEndian::write_u32(&mut buf[OFF_CRC32..OFF_CRC32 + 4], crc);
        buf
    }

    /// None if magic, version or crc do not match.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < SLAB_META_LEN || &buf[OFF_MAGIC..OFF_MAGIC + 8] != SLAB_META_MAGIC {
            return None;
        }
        if LittleEndian::read_u32(&buf[OFF_VERSION..OFF_VERSION + 4]) != SLAB_META_VERSION {
            return None;
        }
        if LittleEndian::read_u32(&buf[OFF_CRC32..OFF_CRC32 + 4]) != meta_crc(buf) {
            return None;
        }
        Some(Self {
            slab_size: LittleEndian::read_u32(&buf[OFF_SLAB_SIZE..OFF_SLAB_SIZE + 4]),
            item_min: LittleEndian::read_u32(&buf[OFF_ITEM_MIN..OFF_ITEM_MIN + 4]),
            factor_milli: LittleEndian::read_u32(&buf[OFF_FACTOR..OFF_FACTOR + 4]),
            use_cas: buf[OFF_USE_CAS] != 0,
            arena_len: LittleEndian::read_u64(&buf[OFF_ARENA_LEN..OFF_ARENA_LEN + 8]),
            nslab: LittleEndian::read_u32(&buf[OFF_NSLAB..OFF_NSLAB + 4]),
            cas_next: LittleEndian::read_u64(&buf[OFF_CAS_NEXT..OFF_CAS_NEXT + 8]),
        })
    }

    /// Why a stored record cannot be reused with `cfg` over `arena_len` bytes.
    pub fn incompatibility(&self, cfg: &SlabConfig, arena_len: usize) -> Option<String> {
        let want = Self::for_config(cfg, arena_len);
        if self.slab_size != want.slab_size {
            return Some(format!("slab_size {} != {}", self.slab_size, want.slab_size));
        }
        if self.item_min != want.item_min {
            return Some(format!("item_min {} != {}", self.item_min, want.item_min));
        }
        if self.factor_milli != want.factor_milli {
            return Some(format!(
                "factor {}/1000 != {}/1000",
                self.factor_milli, want.factor_milli
            ));
        }
        if self.use_cas != want.use_cas {
            return Some(format!("use_cas {} != {}", self.use_cas, want.use_cas));
        }
        let used = self.nslab as u64 * self.slab_size as u64;
        if used > arena_len as u64 {
            return Some(format!(
                "{} slabs ({} B) do not fit the arena of {} B",
                self.nslab, used, arena_len
            ));
        }
        None
    }
}

fn meta_crc(buf: &[u8]) -> u32 {
    let mut h = Crc32::new();
    h.update(&buf[..OFF_CRC32]);
    h.finalize()
}
