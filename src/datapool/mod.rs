//! datapool - a fixed-size arena backed by anonymous memory or a mapped file.
//!
//! Submodules:
//! - header.rs - header layout, crc and validation
//! - open.rs   - open/initialize/close, DIRTY handling
//!
//! The first 4 KiB of the mapping hold the header (see consts::POOL_*); the
//! arena handed to the slab layer starts right after it. Dropping a pool
//! without `close()` leaves DIRTY set, which the next open treats as a crash.

pub mod header;
pub mod open;

use std::path::{Path, PathBuf};

use anyhow::Result;
use log::debug;
use memmap2::MmapMut;

use crate::consts::{POOL_HDR_LEN, POOL_OFF_USER_DATA, POOL_USER_DATA_MAX};
use crate::error::CacheError;
use crate::lock::PoolLock;

pub use header::{HeaderCheck, PoolHeader};

/// Where the arena lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolMedium {
    /// Anonymous mapping; nothing survives the process.
    Volatile,
    /// Shared mapping of a regular file.
    File,
}

impl std::fmt::Display for PoolMedium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolMedium::Volatile => write!(f, "volatile"),
            PoolMedium::File => write!(f, "file"),
        }
    }
}

pub struct Datapool {
    map: MmapMut,
    medium: PoolMedium,
    path: Option<PathBuf>,
    _lock: Option<PoolLock>,
    closed: bool,
}

impl Datapool {
    fn header(&self) -> &[u8] {
        &self.map[..POOL_HDR_LEN]
    }

    fn header_mut(&mut self) -> &mut [u8] {
        &mut self.map[..POOL_HDR_LEN]
    }

    /// Usable arena bytes (may exceed the requested size for volatile pools,
    /// which are rounded up to whole pages).
    pub fn size(&self) -> usize {
        self.map.len() - POOL_HDR_LEN
    }

    /// Total mapped length, header included.
    pub fn mapped_len(&self) -> usize {
        self.map.len()
    }

    pub fn arena(&self) -> &[u8] {
        &self.map[POOL_HDR_LEN..]
    }

    pub fn arena_mut(&mut self) -> &mut [u8] {
        &mut self.map[POOL_HDR_LEN..]
    }

    pub fn medium(&self) -> PoolMedium {
        self.medium
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn header_info(&self) -> PoolHeader {
        header::header_read(self.header())
    }

    pub fn user_tag(&self) -> String {
        String::from_utf8_lossy(header::user_tag(self.header())).into_owned()
    }

    /// Copy `data` to the start of the user-data area.
    pub fn set_user_data(&mut self, data: &[u8]) -> Result<()> {
        check_user_data_len(data.len())?;
        let off = POOL_OFF_USER_DATA;
        self.header_mut()[off..off + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Fill `out` from the start of the user-data area.
    pub fn get_user_data(&self, out: &mut [u8]) -> Result<()> {
        check_user_data_len(out.len())?;
        let off = POOL_OFF_USER_DATA;
        out.copy_from_slice(&self.header()[off..off + out.len()]);
        Ok(())
    }
}

fn check_user_data_len(len: usize) -> Result<()> {
    if len > POOL_USER_DATA_MAX {
        return Err(CacheError::InvalidConfig(format!(
            "user data of {} B exceeds {} B",
            len, POOL_USER_DATA_MAX
        ))
        .into());
    }
    Ok(())
}

impl Drop for Datapool {
    fn drop(&mut self) {
        if !self.closed {
            debug!(
                "datapool {} dropped without close; dirty flag stays set",
                self.display_path()
            );
        }
    }
}

impl std::fmt::Debug for Datapool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Datapool")
            .field("medium", &self.medium)
            .field("path", &self.path)
            .field("size", &self.size())
            .field("closed", &self.closed)
            .finish()
    }
}
