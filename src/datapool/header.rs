//! datapool/header - the 4 KiB header in front of the arena.
//!
//! Layout (LE), see consts::POOL_*:
//! [signature8][version u64][size u64][flags u64][crc32 u32][reserved]
//! [user tag 48][user data 2000]
//!
//! The crc covers version, size and the user tag. Flags are left out: they flip
//! on every open/close and are a single aligned word.

use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher as Crc32;

use crate::consts::{
    POOL_FLAG_DIRTY, POOL_HDR_LEN, POOL_MAGIC, POOL_OFF_CRC32, POOL_OFF_FLAGS,
    POOL_OFF_SIGNATURE, POOL_OFF_SIZE, POOL_OFF_USER_TAG, POOL_OFF_VERSION, POOL_USER_TAG_LEN,
    POOL_VALID_FLAGS, POOL_VERSION,
};

/// Decoded fixed fields of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolHeader {
    pub version: u64,
    pub size: u64,
    pub flags: u64,
    pub crc32: u32,
}

/// Outcome of header validation. Everything but `Valid` leads to a fresh
/// initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderCheck {
    Valid,
    NoSignature,
    BadVersion(u64),
    BadChecksum,
    ZeroSize,
    Truncated { recorded: u64, mapped: u64 },
    UnknownFlags(u64),
    Dirty,
}

impl std::fmt::Display for HeaderCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeaderCheck::Valid => write!(f, "valid"),
            HeaderCheck::NoSignature => write!(f, "no signature found"),
            HeaderCheck::BadVersion(v) => {
                write!(f, "incompatible version (is: {}, expecting: {})", v, POOL_VERSION)
            }
            HeaderCheck::BadChecksum => write!(f, "header checksum mismatch"),
            HeaderCheck::ZeroSize => write!(f, "recorded size is 0"),
            HeaderCheck::Truncated { recorded, mapped } => write!(
                f,
                "recorded size {} exceeds mapped length {}",
                recorded, mapped
            ),
            HeaderCheck::UnknownFlags(fl) => write!(f, "unknown flags set ({:#x})", fl),
            HeaderCheck::Dirty => write!(f, "valid header but dirty (unclean shutdown)"),
        }
    }
}

pub fn header_read(hdr: &[u8]) -> PoolHeader {
    PoolHeader {
        version: LittleEndian::read_u64(&hdr[POOL_OFF_VERSION..POOL_OFF_VERSION + 8]),
        size: LittleEndian::read_u64(&hdr[POOL_OFF_SIZE..POOL_OFF_SIZE + 8]),
        flags: LittleEndian::read_u64(&hdr[POOL_OFF_FLAGS..POOL_OFF_FLAGS + 8]),
        crc32: LittleEndian::read_u32(&hdr[POOL_OFF_CRC32..POOL_OFF_CRC32 + 4]),
    }
}

pub fn has_signature(hdr: &[u8]) -> bool {
    &hdr[POOL_OFF_SIGNATURE..POOL_OFF_SIGNATURE + 8] == POOL_MAGIC
}

/// crc32 over version, size and the tag slot.
pub fn header_crc(hdr: &[u8]) -> u32 {
    let mut h = Crc32::new();
    h.update(&hdr[POOL_OFF_VERSION..POOL_OFF_SIZE + 8]);
    h.update(&hdr[POOL_OFF_USER_TAG..POOL_OFF_USER_TAG + POOL_USER_TAG_LEN]);
    h.finalize()
}

/// Validate a mapped header against the actual mapping length.
pub fn header_check(hdr: &[u8], mapped_len: usize) -> HeaderCheck {
    if !has_signature(hdr) {
        return HeaderCheck::NoSignature;
    }
    let h = header_read(hdr);
    if h.version != POOL_VERSION {
        return HeaderCheck::BadVersion(h.version);
    }
    if h.crc32 != header_crc(hdr) {
        return HeaderCheck::BadChecksum;
    }
    if h.size == 0 {
        return HeaderCheck::ZeroSize;
    }
    if h.size > mapped_len as u64 {
        return HeaderCheck::Truncated {
            recorded: h.size,
            mapped: mapped_len as u64,
        };
    }
    if h.flags & !POOL_VALID_FLAGS != 0 {
        return HeaderCheck::UnknownFlags(h.flags);
    }
    if h.flags & POOL_FLAG_DIRTY != 0 {
        return HeaderCheck::Dirty;
    }
    HeaderCheck::Valid
}

/// Tag stored in the header, up to the first NUL.
pub fn user_tag(hdr: &[u8]) -> &[u8] {
    let slot = &hdr[POOL_OFF_USER_TAG..POOL_OFF_USER_TAG + POOL_USER_TAG_LEN];
    let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
    &slot[..end]
}

/// Step 2 of initialization: body fields, tag and crc. Signature is written
/// separately, after a sync.
pub fn header_fill_body(hdr: &mut [u8], mapped_len: usize, tag: &str) {
    LittleEndian::write_u64(&mut hdr[POOL_OFF_VERSION..POOL_OFF_VERSION + 8], POOL_VERSION);
    LittleEndian::write_u64(&mut hdr[POOL_OFF_SIZE..POOL_OFF_SIZE + 8], mapped_len as u64);
    LittleEndian::write_u64(&mut hdr[POOL_OFF_FLAGS..POOL_OFF_FLAGS + 8], 0);
    let slot = &mut hdr[POOL_OFF_USER_TAG..POOL_OFF_USER_TAG + POOL_USER_TAG_LEN];
    slot.fill(0);
    slot[..tag.len()].copy_from_slice(tag.as_bytes());
    let crc = header_crc(hdr);
    LittleEndian::write_u32(&mut hdr[POOL_OFF_CRC32..POOL_OFF_CRC32 + 4], crc);
}

pub fn header_write_signature(hdr: &mut [u8]) {
    hdr[POOL_OFF_SIGNATURE..POOL_OFF_SIGNATURE + 8].copy_from_slice(POOL_MAGIC);
}

pub fn header_flags(hdr: &[u8]) -> u64 {
    LittleEndian::read_u64(&hdr[POOL_OFF_FLAGS..POOL_OFF_FLAGS + 8])
}

pub fn header_set_flags(hdr: &mut [u8], flags: u64) {
    LittleEndian::write_u64(&mut hdr[POOL_OFF_FLAGS..POOL_OFF_FLAGS + 8], flags);
}

pub fn header_clear(hdr: &mut [u8]) {
    hdr[..POOL_HDR_LEN].fill(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh(mapped: usize, tag: &str) -> Vec<u8> {
        let mut hdr = vec![0u8; POOL_HDR_LEN];
        header_fill_body(&mut hdr, mapped, tag);
        header_write_signature(&mut hdr);
        hdr
    }

    #[test]
    fn zeroed_header_has_no_signature() {
        let hdr = vec![0u8; POOL_HDR_LEN];
        assert_eq!(header_check(&hdr, 1 << 20), HeaderCheck::NoSignature);
    }

    #[test]
    fn body_without_signature_is_invalid() {
        let mut hdr = vec![0u8; POOL_HDR_LEN];
        header_fill_body(&mut hdr, 1 << 20, "t");
        assert_eq!(header_check(&hdr, 1 << 20), HeaderCheck::NoSignature);
    }

    #[test]
    fn initialized_header_is_valid_until_dirty() {
        let mut hdr = fresh(1 << 20, "cache");
        assert_eq!(header_check(&hdr, 1 << 20), HeaderCheck::Valid);
        assert_eq!(user_tag(&hdr), b"cache");

        header_set_flags(&mut hdr, POOL_FLAG_DIRTY);
        assert_eq!(header_check(&hdr, 1 << 20), HeaderCheck::Dirty);

        header_set_flags(&mut hdr, 0x10);
        assert_eq!(header_check(&hdr, 1 << 20), HeaderCheck::UnknownFlags(0x10));
    }

    #[test]
    fn size_and_version_checks() {
        let hdr = fresh(1 << 20, "cache");
        assert!(matches!(
            header_check(&hdr, (1 << 20) - 1),
            HeaderCheck::Truncated { .. }
        ));
        // a larger mapping is fine
        assert_eq!(header_check(&hdr, 2 << 20), HeaderCheck::Valid);

        let mut bad = hdr.clone();
        LittleEndian::write_u64(&mut bad[POOL_OFF_VERSION..POOL_OFF_VERSION + 8], 7);
        assert_eq!(header_check(&bad, 1 << 20), HeaderCheck::BadVersion(7));

        let mut torn = hdr.clone();
        torn[POOL_OFF_USER_TAG] = b'X';
        assert_eq!(header_check(&torn, 1 << 20), HeaderCheck::BadChecksum);
    }
}
