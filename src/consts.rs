//! Shared format constants (datapool header, slab recovery record, slabs, items).

// -------- Datapool --------
// Header layout (LE), 4096 bytes in front of the arena:
// [signature8][version u64][size u64][flags u64][crc32 u32][reserved ..2048]
// [user tag 48][user data 2000]
pub const POOL_MAGIC: &[u8; 8] = b"P1POOL01";
pub const POOL_VERSION: u64 = 1;

pub const POOL_INTERNAL_HDR_LEN: usize = 2048;
pub const POOL_USER_TAG_LEN: usize = 48;
pub const POOL_USER_HDR_LEN: usize = 2048;
pub const POOL_HDR_LEN: usize = POOL_INTERNAL_HDR_LEN + POOL_USER_HDR_LEN;
pub const POOL_USER_DATA_MAX: usize = POOL_USER_HDR_LEN - POOL_USER_TAG_LEN;

pub const POOL_OFF_SIGNATURE: usize = 0;
pub const POOL_OFF_VERSION: usize = 8;
pub const POOL_OFF_SIZE: usize = 16;
pub const POOL_OFF_FLAGS: usize = 24;
pub const POOL_OFF_CRC32: usize = 32;
pub const POOL_OFF_USER_TAG: usize = POOL_INTERNAL_HDR_LEN;
pub const POOL_OFF_USER_DATA: usize = POOL_INTERNAL_HDR_LEN + POOL_USER_TAG_LEN;

pub const POOL_FLAG_DIRTY: u64 = 1 << 0;
pub const POOL_VALID_FLAGS: u64 = POOL_FLAG_DIRTY;

pub const PAGE_SIZE: usize = 4096;

// -------- Slab recovery record (lives in datapool user data) --------
// [magic8][ver u32][slab_size u32][item_min u32][factor_milli u32][use_cas u8][pad3]
// [arena_len u64][nslab u32][pad u32][cas_next u64][crc32 u32]
pub const SLAB_META_MAGIC: &[u8; 8] = b"P1SLABMD";
pub const SLAB_META_VERSION: u32 = 1;
pub const SLAB_META_LEN: usize = 56;

// -------- Slabs --------
// [magic u32][class u8][pad u8][pad u16][chunk_size u32][nused u32]
pub const SLAB_MAGIC: u32 = 0x3142_4C53; // "SLB1"
pub const SLAB_HDR_SIZE: usize = 16;
pub const SLAB_OFF_MAGIC: usize = 0;
pub const SLAB_OFF_CLASS: usize = 4;
pub const SLAB_OFF_CHUNK_SIZE: usize = 8;
pub const SLAB_OFF_NUSED: usize = 12;

pub const SLAB_SIZE_DEFAULT: usize = 1024 * 1024;
pub const SLAB_SIZE_MIN: usize = 4096;
pub const SLAB_SIZE_MAX: usize = 1 << 30;

/// Class id 0 is never assigned; ids start at 1.
pub const CLASS_INVALID: u8 = 0;
pub const CLASS_MAX_COUNT: usize = 254;

// -------- Items --------
// [magic u16][flags u8][class u8][klen u8][olen u8][pad u16]
// [vlen u32][vcap u32][expire_at u32][create_at u32]
// then [cas u64]? [meta olen][key klen][value]
pub const ITEM_MAGIC: u16 = 0x4954; // "TI" on disk
pub const ITEM_HDR_SIZE: usize = 24;
pub const ITEM_CAS_SIZE: usize = 8;

pub const ITEM_OFF_MAGIC: usize = 0;
pub const ITEM_OFF_FLAGS: usize = 2;
pub const ITEM_OFF_CLASS: usize = 3;
pub const ITEM_OFF_KLEN: usize = 4;
pub const ITEM_OFF_OLEN: usize = 5;
pub const ITEM_OFF_VLEN: usize = 8;
pub const ITEM_OFF_VCAP: usize = 12;
pub const ITEM_OFF_EXPIRE: usize = 16;
pub const ITEM_OFF_CREATE: usize = 20;

pub const ITEM_FLAG_LINKED: u8 = 0x1;
pub const ITEM_FLAG_FREEQ: u8 = 0x2;
pub const ITEM_FLAG_RALIGNED: u8 = 0x4;

pub const ITEM_KEY_MAX: usize = u8::MAX as usize;
pub const ITEM_META_MAX: usize = u8::MAX as usize;
pub const ITEM_MIN_DEFAULT: usize = 48;
