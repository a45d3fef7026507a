//! Centralized configuration for the datapool and the slab allocator.
//!
//! - `PoolConfig`: where the arena lives (anonymous memory or a file), the owner
//!   tag stamped into the header, and whether to prefault pages.
//! - `SlabConfig`: arena size, slab geometry, CAS and the eviction switch.
//!
//! Both read the same `SP_*` environment variables via `from_env()` and can be
//! adjusted with `with_*` setters.

use std::path::PathBuf;

use anyhow::Result;

use crate::consts::{
    ITEM_CAS_SIZE, ITEM_HDR_SIZE, ITEM_MIN_DEFAULT, POOL_USER_TAG_LEN, SLAB_SIZE_DEFAULT,
    SLAB_SIZE_MAX, SLAB_SIZE_MIN,
};
use crate::error::CacheError;

pub const DATAPOOL_NAME_DEFAULT: &str = "slabpool";

/// Datapool location and identity.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Backing file. None maps anonymous (volatile) memory.
    /// Env: SP_DATAPOOL_PATH
    pub path: Option<PathBuf>,

    /// Owner tag written into the header; reopening with another tag fails.
    /// Env: SP_DATAPOOL_NAME (default "slabpool")
    pub name: String,

    /// Touch every page right after mapping.
    /// Env: SP_DATAPOOL_PREFAULT (default false)
    pub prefault: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            path: None,
            name: DATAPOOL_NAME_DEFAULT.to_string(),
            prefault: false,
        }
    }
}

impl PoolConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("SP_DATAPOOL_PATH") {
            let s = v.trim();
            if !s.is_empty() {
                cfg.path = Some(PathBuf::from(s));
            }
        }
        if let Ok(v) = std::env::var("SP_DATAPOOL_NAME") {
            cfg.name = v.trim().to_string();
        }
        if let Ok(v) = std::env::var("SP_DATAPOOL_PREFAULT") {
            cfg.prefault = env_flag(&v);
        }

        cfg
    }

    pub fn with_path<P: Into<PathBuf>>(mut self, path: Option<P>) -> Self {
        self.path = path.map(Into::into);
        self
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_prefault(mut self, on: bool) -> Self {
        self.prefault = on;
        self
    }

    /// Tag must be non-empty, shorter than the tag slot and free of NUL bytes.
    pub fn validate(&self) -> Result<()> {
        validate_pool_name(&self.name)
    }
}

pub(crate) fn validate_pool_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CacheError::InvalidConfig("empty datapool name".into()).into());
    }
    if name.len() >= POOL_USER_TAG_LEN {
        return Err(CacheError::InvalidConfig(format!(
            "datapool name is too long ({} B, max {} B)",
            name.len(),
            POOL_USER_TAG_LEN - 1
        ))
        .into());
    }
    if name.as_bytes().contains(&0) {
        return Err(CacheError::InvalidConfig("datapool name contains NUL".into()).into());
    }
    Ok(())
}

/// Slab allocator configuration.
#[derive(Clone, Debug)]
pub struct SlabConfig {
    pub datapool: PoolConfig,

    /// Requested arena size in bytes.
    /// Env: SP_SLAB_MEM (default 64 MiB)
    pub slab_mem: usize,

    /// Slab size in bytes; the largest item is a little smaller.
    /// Env: SP_SLAB_SIZE (default 1 MiB)
    pub slab_size: usize,

    /// Smallest chunk size.
    /// Env: SP_SLAB_ITEM_MIN (default 48)
    pub item_min: usize,

    /// Growth factor between consecutive size classes.
    /// Env: SP_SLAB_FACTOR (default 1.25)
    pub factor: f64,

    /// Store an 8-byte CAS in every item.
    /// Env: SP_SLAB_USE_CAS (default true)
    pub use_cas: bool,

    /// Reclaim a random slab when an allocation finds no capacity.
    /// Env: SP_SLAB_EVICT (default true)
    pub evict: bool,
}

impl Default for SlabConfig {
    fn default() -> Self {
        Self {
            datapool: PoolConfig::default(),
            slab_mem: 64 * 1024 * 1024,
            slab_size: SLAB_SIZE_DEFAULT,
            item_min: ITEM_MIN_DEFAULT,
            factor: 1.25,
            use_cas: true,
            evict: true,
        }
    }
}

impl SlabConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self {
            datapool: PoolConfig::from_env(),
            ..Self::default()
        };

        if let Ok(v) = std::env::var("SP_SLAB_MEM") {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg.slab_mem = n;
            }
        }
        if let Ok(v) = std::env::var("SP_SLAB_SIZE") {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg.slab_size = n;
            }
        }
        if let Ok(v) = std::env::var("SP_SLAB_ITEM_MIN") {
            if let Ok(n) = v.trim().parse::<usize>() {
                cfg.item_min = n;
            }
        }
        if let Ok(v) = std::env::var("SP_SLAB_FACTOR") {
            if let Ok(f) = v.trim().parse::<f64>() {
                cfg.factor = f;
            }
        }
        if let Ok(v) = std::env::var("SP_SLAB_USE_CAS") {
            cfg.use_cas = env_flag(&v);
        }
        if let Ok(v) = std::env::var("SP_SLAB_EVICT") {
            cfg.evict = env_flag(&v);
        }

        cfg
    }

    pub fn with_datapool(mut self, pool: PoolConfig) -> Self {
        self.datapool = pool;
        self
    }

    pub fn with_slab_mem(mut self, bytes: usize) -> Self {
        self.slab_mem = bytes;
        self
    }

    pub fn with_slab_size(mut self, bytes: usize) -> Self {
        self.slab_size = bytes;
        self
    }

    pub fn with_item_min(mut self, bytes: usize) -> Self {
        self.item_min = bytes;
        self
    }

    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    pub fn with_use_cas(mut self, on: bool) -> Self {
        self.use_cas = on;
        self
    }

    pub fn with_evict(mut self, on: bool) -> Self {
        self.evict = on;
        self
    }

    pub fn cas_size(&self) -> usize {
        if self.use_cas {
            ITEM_CAS_SIZE
        } else {
            0
        }
    }

    /// Growth factor in thousandths, as persisted in the recovery record.
    pub fn factor_milli(&self) -> u32 {
        (self.factor * 1000.0).round() as u32
    }

    pub fn validate(&self) -> Result<()> {
        self.datapool.validate()?;

        if !(SLAB_SIZE_MIN..=SLAB_SIZE_MAX).contains(&self.slab_size) {
            return Err(CacheError::InvalidConfig(format!(
                "slab_size must be in [{} .. {}], got {}",
                SLAB_SIZE_MIN, SLAB_SIZE_MAX, self.slab_size
            ))
            .into());
        }
        if self.slab_mem < self.slab_size {
            return Err(CacheError::InvalidConfig(format!(
                "slab_mem ({} B) must hold at least one slab of {} B",
                self.slab_mem, self.slab_size
            ))
            .into());
        }
        let floor = ITEM_HDR_SIZE + ITEM_CAS_SIZE;
        if self.item_min < floor || self.item_min > self.slab_size / 2 {
            return Err(CacheError::InvalidConfig(format!(
                "item_min must be in [{} .. {}], got {}",
                floor,
                self.slab_size / 2,
                self.item_min
            ))
            .into());
        }
        if !self.factor.is_finite() || self.factor <= 1.0 {
            return Err(CacheError::InvalidConfig(format!(
                "factor must be > 1.0, got {}",
                self.factor
            ))
            .into());
        }
        Ok(())
    }
}

fn env_flag(v: &str) -> bool {
    let s = v.trim().to_ascii_lowercase();
    s == "1" || s == "true" || s == "on" || s == "yes"
}

impl std::fmt::Display for SlabConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SlabConfig {{ path: {}, name: {}, prefault: {}, slab_mem: {}, slab_size: {}, item_min: {}, factor: {}, use_cas: {}, evict: {} }}",
            self.datapool
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<volatile>".into()),
            self.datapool.name,
            self.datapool.prefault,
            self.slab_mem,
            self.slab_size,
            self.item_min,
            self.factor,
            self.use_cas,
            self.evict
        )
    }
}
