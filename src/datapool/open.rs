//! datapool/open - mapping, header initialization, DIRTY flag and close.

use std::fs::{File, OpenOptions};
use std::path::Path;

use anyhow::Result;
use log::{debug, info, warn};
use memmap2::{MmapMut, MmapOptions};

use crate::config::{validate_pool_name, PoolConfig};
use crate::consts::{PAGE_SIZE, POOL_FLAG_DIRTY, POOL_HDR_LEN};
use crate::error::CacheError;
use crate::lock::{try_lock_pool, PoolLock};
use crate::util::round_up;

use super::header::{
    header_check, header_clear, header_fill_body, header_flags, header_set_flags,
    header_write_signature, user_tag, HeaderCheck,
};
use super::{Datapool, PoolMedium};

impl Datapool {
    /// Open (or create) a pool with an arena of at least `size` bytes.
    ///
    /// `path == None` maps anonymous memory. Returns the pool and whether it was
    /// (re)initialized; a pool that was not closed gracefully comes back fresh.
    pub fn open(
        path: Option<&Path>,
        name: &str,
        size: usize,
        prefault: bool,
    ) -> Result<(Self, bool)> {
        validate_pool_name(name)?;
        if size == 0 {
            return Err(CacheError::InvalidConfig("datapool size must be > 0".into()).into());
        }

        let mut pool = match path {
            None => Self::map_volatile(size)?,
            Some(p) => Self::map_file(p, size)?,
        };
        if prefault {
            pool.prefault();
        }

        let fresh = match header_check(pool.header(), pool.map.len()) {
            HeaderCheck::Valid => {
                let found = user_tag(pool.header());
                if found != name.as_bytes() {
                    return Err(CacheError::ForeignPool {
                        expected: name.to_string(),
                        found: String::from_utf8_lossy(found).into_owned(),
                    }
                    .into());
                }
                false
            }
            check => {
                match pool.medium {
                    PoolMedium::Volatile => debug!("datapool: initializing volatile pool"),
                    PoolMedium::File if check == HeaderCheck::NoSignature => {
                        info!("datapool {}: initializing", pool.display_path())
                    }
                    PoolMedium::File => warn!(
                        "datapool {}: {}; re-initializing",
                        pool.display_path(),
                        check
                    ),
                }
                pool.initialize(name)?;
                true
            }
        };

        pool.set_dirty()?;
        info!(
            "datapool {} open: medium={}, arena={} B, fresh={}",
            pool.display_path(),
            pool.medium,
            pool.size(),
            fresh
        );
        Ok((pool, fresh))
    }

    pub fn open_with_config(cfg: &PoolConfig, size: usize) -> Result<(Self, bool)> {
        Self::open(cfg.path.as_deref(), &cfg.name, size, cfg.prefault)
    }

    /// Flush the mapping, clear DIRTY and sync the header.
    pub fn close(mut self) -> Result<()> {
        if self.medium == PoolMedium::File {
            self.map
                .flush()
                .map_err(|e| CacheError::io(format!("flush {}", self.display_path()), e))?;
        }
        let flags = header_flags(self.header());
        header_set_flags(self.header_mut(), flags & !POOL_FLAG_DIRTY);
        self.sync_range(0, POOL_HDR_LEN)?;
        self.closed = true;
        info!("datapool {} closed", self.display_path());
        Ok(())
    }

    fn map_volatile(size: usize) -> Result<Self> {
        let len = round_up(size + POOL_HDR_LEN, PAGE_SIZE);
        let map = MmapMut::map_anon(len)
            .map_err(|e| CacheError::io(format!("map {} B of anonymous memory", len), e))?;
        Ok(Self {
            map,
            medium: PoolMedium::Volatile,
            path: None,
            _lock: None,
            closed: false,
        })
    }

    fn map_file(path: &Path, size: usize) -> Result<Self> {
        let len = size + POOL_HDR_LEN;
        let file = open_pool_file(path)?;
        let lock: PoolLock = try_lock_pool(&file, path)?;
        file.set_len(len as u64)
            .map_err(|e| CacheError::io(format!("resize {} to {} B", path.display(), len), e))?;

        // SAFETY: the file is exclusively locked for the lifetime of the mapping,
        // and its length was just set to `len`.
        let map = unsafe { MmapOptions::new().len(len).map_mut(&file) }
            .map_err(|e| CacheError::io(format!("mmap {}", path.display()), e))?;

        Ok(Self {
            map,
            medium: PoolMedium::File,
            path: Some(path.to_path_buf()),
            _lock: Some(lock),
            closed: false,
        })
    }

    fn prefault(&mut self) {
        let len = self.map.len();
        let mut off = 0;
        while off < len {
            let b = std::hint::black_box(self.map[off]);
            self.map[off] = b;
            off += PAGE_SIZE;
        }
        debug!("datapool: prefaulted {} pages", len.div_ceil(PAGE_SIZE));
    }

    /// zero + sync, body + sync, signature + sync. A crash in between leaves
    /// a header without signature, which is simply initialized again.
    fn initialize(&mut self, name: &str) -> Result<()> {
        let mapped = self.map.len();
        header_clear(self.header_mut());
        self.sync_range(0, POOL_HDR_LEN)?;

        header_fill_body(self.header_mut(), mapped, name);
        self.sync_range(0, POOL_HDR_LEN)?;

        header_write_signature(self.header_mut());
        self.sync_range(0, POOL_HDR_LEN)?;
        Ok(())
    }

    fn set_dirty(&mut self) -> Result<()> {
        let flags = header_flags(self.header());
        assert!(
            flags & POOL_FLAG_DIRTY == 0,
            "datapool dirty flag is already set"
        );
        header_set_flags(self.header_mut(), flags | POOL_FLAG_DIRTY);
        self.sync_range(0, POOL_HDR_LEN)
    }

    fn sync_range(&self, off: usize, len: usize) -> Result<()> {
        if self.medium == PoolMedium::Volatile {
            return Ok(());
        }
        self.map
            .flush_range(off, len)
            .map_err(|e| CacheError::io(format!("sync {}", self.display_path()), e).into())
    }

    pub(crate) fn display_path(&self) -> String {
        self.path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<volatile>".into())
    }
}

fn open_pool_file(path: &Path) -> Result<File> {
    let mut opts = OpenOptions::new();
    opts.read(true).write(true).create(true).truncate(false);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    opts.open(path)
        .map_err(|e| CacheError::io(format!("open {}", path.display()), e).into())
}
