//! item - the self-describing record stored in a chunk.
//!
//! Header (LE, 24 B):
//! [magic u16][flags u8][class u8][klen u8][olen u8][pad u16]
//! [vlen u32][vcap u32][expire_at u32][create_at u32]
//! followed by [cas u64]? [meta olen][key klen][value ...].
//!
//! A left-aligned value starts right after the key; a RALIGNED value ends at
//! the chunk end. `vcap` is the final value length declared at reserve time.

use byteorder::{ByteOrder, LittleEndian};

use crate::consts::{
    ITEM_FLAG_FREEQ, ITEM_FLAG_LINKED, ITEM_FLAG_RALIGNED, ITEM_HDR_SIZE, ITEM_MAGIC,
    ITEM_OFF_CLASS, ITEM_OFF_CREATE, ITEM_OFF_EXPIRE, ITEM_OFF_FLAGS, ITEM_OFF_KLEN,
    ITEM_OFF_MAGIC, ITEM_OFF_OLEN, ITEM_OFF_VCAP, ITEM_OFF_VLEN,
};

/// Handle to an item: its byte offset inside the arena. Stays valid across a
/// graceful reopen of the same pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemRef(pub(crate) u64);

impl ItemRef {
    pub fn offset(self) -> u64 {
        self.0
    }

    pub(crate) fn at(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ItemRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{:#x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemHeader {
    pub flags: u8,
    pub class: u8,
    pub klen: u8,
    pub olen: u8,
    pub vlen: u32,
    pub vcap: u32,
    pub expire_at: u32,
    pub create_at: u32,
}

impl ItemHeader {
    pub fn is_linked(&self) -> bool {
        self.flags & ITEM_FLAG_LINKED != 0
    }

    pub fn in_freeq(&self) -> bool {
        self.flags & ITEM_FLAG_FREEQ != 0
    }

    pub fn is_reserved(&self) -> bool {
        self.flags & (ITEM_FLAG_LINKED | ITEM_FLAG_FREEQ) == 0
    }

    pub fn is_raligned(&self) -> bool {
        self.flags & ITEM_FLAG_RALIGNED != 0
    }
}

pub fn item_header_valid(rec: &[u8]) -> bool {
    LittleEndian::read_u16(&rec[ITEM_OFF_MAGIC..ITEM_OFF_MAGIC + 2]) == ITEM_MAGIC
}

pub fn item_header_read(rec: &[u8]) -> ItemHeader {
    ItemHeader {
        flags: rec[ITEM_OFF_FLAGS],
        class: rec[ITEM_OFF_CLASS],
        klen: rec[ITEM_OFF_KLEN],
        olen: rec[ITEM_OFF_OLEN],
        vlen: LittleEndian::read_u32(&rec[ITEM_OFF_VLEN..ITEM_OFF_VLEN + 4]),
        vcap: LittleEndian::read_u32(&rec[ITEM_OFF_VCAP..ITEM_OFF_VCAP + 4]),
        expire_at: LittleEndian::read_u32(&rec[ITEM_OFF_EXPIRE..ITEM_OFF_EXPIRE + 4]),
        create_at: LittleEndian::read_u32(&rec[ITEM_OFF_CREATE..ITEM_OFF_CREATE + 4]),
    }
}

pub fn item_header_write(rec: &mut [u8], h: &ItemHeader) {
    LittleEndian::write_u16(&mut rec[ITEM_OFF_MAGIC..ITEM_OFF_MAGIC + 2], ITEM_MAGIC);
    rec[ITEM_OFF_FLAGS] = h.flags;
    rec[ITEM_OFF_CLASS] = h.class;
    rec[ITEM_OFF_KLEN] = h.klen;
    rec[ITEM_OFF_OLEN] = h.olen;
    rec[6..8].fill(0);
    LittleEndian::write_u32(&mut rec[ITEM_OFF_VLEN..ITEM_OFF_VLEN + 4], h.vlen);
    LittleEndian::write_u32(&mut rec[ITEM_OFF_VCAP..ITEM_OFF_VCAP + 4], h.vcap);
    LittleEndian::write_u32(&mut rec[ITEM_OFF_EXPIRE..ITEM_OFF_EXPIRE + 4], h.expire_at);
    LittleEndian::write_u32(&mut rec[ITEM_OFF_CREATE..ITEM_OFF_CREATE + 4], h.create_at);
}

pub fn item_flags(rec: &[u8]) -> u8 {
    rec[ITEM_OFF_FLAGS]
}

pub fn item_set_flags(rec: &mut [u8], flags: u8) {
    rec[ITEM_OFF_FLAGS] = flags;
}

pub fn item_set_vlen(rec: &mut [u8], vlen: u32) {
    LittleEndian::write_u32(&mut rec[ITEM_OFF_VLEN..ITEM_OFF_VLEN + 4], vlen);
}

pub fn item_set_vcap(rec: &mut [u8], vcap: u32) {
    LittleEndian::write_u32(&mut rec[ITEM_OFF_VCAP..ITEM_OFF_VCAP + 4], vcap);
}

/// Bytes a record needs in a chunk.
pub fn item_ntotal(cas_size: usize, olen: usize, klen: usize, vlen: usize) -> usize {
    ITEM_HDR_SIZE + cas_size + olen + klen + vlen
}

/// Offsets of the variable parts, relative to the item start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemLayout {
    pub cas: usize,
    pub meta: usize,
    pub key: usize,
    pub data: usize,
}

impl ItemLayout {
    pub fn of(h: &ItemHeader, cas_size: usize, chunk_size: usize) -> Self {
        let meta = ITEM_HDR_SIZE + cas_size;
        let key = meta + h.olen as usize;
        let data = if h.is_raligned() {
            chunk_size.saturating_sub(h.vlen as usize)
        } else {
            key + h.klen as usize
        };
        Self {
            cas: ITEM_HDR_SIZE,
            meta,
            key,
            data,
        }
    }
}

/// Whether the header describes a record that fits a chunk of `chunk_size`
/// bytes. Headers read back from a pool file must pass this before any
/// offset derived from them is used.
pub fn item_fits(h: &ItemHeader, cas_size: usize, chunk_size: usize) -> bool {
    let key_end = ITEM_HDR_SIZE + cas_size + h.olen as usize + h.klen as usize;
    let vlen = h.vlen as usize;
    if key_end > chunk_size || h.vlen > h.vcap {
        return false;
    }
    if h.is_raligned() {
        vlen <= chunk_size - key_end
    } else {
        key_end + h.vcap as usize <= chunk_size
    }
}

/// Read-only view of an item inside the arena.
#[derive(Clone, Copy)]
pub struct Item<'a> {
    rec: &'a [u8],
    handle: ItemRef,
    hdr: ItemHeader,
    layout: ItemLayout,
    cas_size: usize,
}

impl<'a> Item<'a> {
    /// `rec` is the whole chunk starting at the item.
    pub(crate) fn new(rec: &'a [u8], handle: ItemRef, cas_size: usize) -> Self {
        let hdr = item_header_read(rec);
        let layout = ItemLayout::of(&hdr, cas_size, rec.len());
        Self {
            rec,
            handle,
            hdr,
            layout,
            cas_size,
        }
    }

    pub fn handle(&self) -> ItemRef {
        self.handle
    }

    pub fn header(&self) -> &ItemHeader {
        &self.hdr
    }

    pub fn key(&self) -> &'a [u8] {
        &self.rec[self.layout.key..self.layout.key + self.hdr.klen as usize]
    }

    pub fn value(&self) -> &'a [u8] {
        &self.rec[self.layout.data..self.layout.data + self.hdr.vlen as usize]
    }

    /// Extra metadata (client flags region).
    pub fn meta(&self) -> &'a [u8] {
        &self.rec[self.layout.meta..self.layout.key]
    }

    pub fn cas(&self) -> Option<u64> {
        if self.cas_size == 0 {
            return None;
        }
        let c = self.layout.cas;
        Some(LittleEndian::read_u64(&self.rec[c..c + 8]))
    }

    pub fn klen(&self) -> usize {
        self.hdr.klen as usize
    }

    pub fn vlen(&self) -> usize {
        self.hdr.vlen as usize
    }

    pub fn vcap(&self) -> usize {
        self.hdr.vcap as usize
    }

    pub fn olen(&self) -> usize {
        self.hdr.olen as usize
    }

    pub fn class(&self) -> u8 {
        self.hdr.class
    }

    pub fn expire_at(&self) -> u32 {
        self.hdr.expire_at
    }

    pub fn create_at(&self) -> u32 {
        self.hdr.create_at
    }

    /// Distance from the item start to the first value byte.
    pub fn data_offset(&self) -> usize {
        self.layout.data
    }

    /// Chunk length available to this item.
    pub fn chunk_size(&self) -> usize {
        self.rec.len()
    }

    pub fn is_linked(&self) -> bool {
        self.hdr.is_linked()
    }

    pub fn in_freeq(&self) -> bool {
        self.hdr.in_freeq()
    }

    pub fn is_reserved(&self) -> bool {
        self.hdr.is_reserved()
    }

    pub fn is_raligned(&self) -> bool {
        self.hdr.is_raligned()
    }

    pub fn is_expired(&self, now: u32) -> bool {
        self.hdr.expire_at != 0 && self.hdr.expire_at <= now
    }
}

impl std::fmt::Debug for Item<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Item")
            .field("handle", &self.handle)
            .field("header", &self.hdr)
            .field("key", &String::from_utf8_lossy(self.key()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::ITEM_CAS_SIZE;

    fn hdr(flags: u8) -> ItemHeader {
        ItemHeader {
            flags,
            class: 3,
            klen: 3,
            olen: 8,
            vlen: 5,
            vcap: 5,
            expire_at: 0,
            create_at: 1,
        }
    }

    #[test]
    fn view_reads_parts() {
        let mut rec = vec![0u8; 128];
        let h = hdr(ITEM_FLAG_LINKED);
        item_header_write(&mut rec, &h);
        let l = ItemLayout::of(&h, ITEM_CAS_SIZE, rec.len());
        LittleEndian::write_u64(&mut rec[l.cas..l.cas + 8], 42);
        rec[l.meta..l.key].copy_from_slice(b"metameta");
        rec[l.key..l.key + 3].copy_from_slice(b"key");
        rec[l.data..l.data + 5].copy_from_slice(b"value");

        let it = Item::new(&rec, ItemRef(0), ITEM_CAS_SIZE);
        assert!(item_header_valid(&rec));
        assert!(it.is_linked() && !it.is_reserved());
        assert_eq!(it.key(), b"key");
        assert_eq!(it.value(), b"value");
        assert_eq!(it.meta(), b"metameta");
        assert_eq!(it.cas(), Some(42));
        assert_eq!(it.data_offset(), ITEM_HDR_SIZE + ITEM_CAS_SIZE + 8 + 3);
    }

    #[test]
    fn raligned_value_ends_at_chunk_end() {
        let mut rec = vec![0u8; 64];
        let h = hdr(ITEM_FLAG_RALIGNED);
        item_header_write(&mut rec, &h);
        rec[59..64].copy_from_slice(b"tail!");
        let it = Item::new(&rec, ItemRef(0), 0);
        assert!(it.is_reserved() && it.is_raligned());
        assert_eq!(it.data_offset(), 59);
        assert_eq!(it.value(), b"tail!");
        assert_eq!(it.cas(), None);
    }

    #[test]
    fn fits_rejects_overruns() {
        // 24 + 8 + 8 + 3 = 43 bytes before the value
        let h = hdr(ITEM_FLAG_LINKED);
        assert!(item_fits(&h, ITEM_CAS_SIZE, 48));
        assert!(!item_fits(&h, ITEM_CAS_SIZE, 47));

        let mut long_key = hdr(ITEM_FLAG_LINKED);
        long_key.klen = 255;
        assert!(!item_fits(&long_key, ITEM_CAS_SIZE, 64));
        assert_eq!(ItemLayout::of(&long_key, ITEM_CAS_SIZE, 64).key, 40);

        let mut past_cap = hdr(ITEM_FLAG_LINKED);
        past_cap.vlen = 6;
        assert!(!item_fits(&past_cap, ITEM_CAS_SIZE, 128));

        let mut tail = hdr(ITEM_FLAG_RALIGNED);
        tail.vlen = 21;
        tail.vcap = 21;
        assert!(item_fits(&tail, ITEM_CAS_SIZE, 64));
        tail.vlen = 22;
        tail.vcap = 22;
        assert!(!item_fits(&tail, ITEM_CAS_SIZE, 64));
        tail.vlen = 1000;
        tail.vcap = 1000;
        assert_eq!(ItemLayout::of(&tail, ITEM_CAS_SIZE, 64).data, 0);
    }

    #[test]
    fn expiry() {
        let mut h = hdr(ITEM_FLAG_LINKED);
        h.expire_at = 100;
        let mut rec = vec![0u8; 64];
        item_header_write(&mut rec, &h);
        let it = Item::new(&rec, ItemRef(0), 0);
        assert!(!it.is_expired(99));
        assert!(it.is_expired(100));
    }
}
