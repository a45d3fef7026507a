use std::path::PathBuf;

use anyhow::Result;

use SlabPool::{kind_of, Cache, CacheError, PoolConfig, SlabConfig};

#[test]
fn from_env_then_builder_overrides() -> Result<()> {
    // the only test in this binary that touches SP_* variables
    std::env::set_var("SP_DATAPOOL_PATH", "/tmp/sp-env.pool");
    std::env::set_var("SP_DATAPOOL_NAME", "envtag");
    std::env::set_var("SP_SLAB_MEM", "8388608");
    std::env::set_var("SP_SLAB_SIZE", "65536");
    std::env::set_var("SP_SLAB_FACTOR", "1.5");
    std::env::set_var("SP_SLAB_USE_CAS", "off");
    std::env::set_var("SP_SLAB_EVICT", "0");

    let cfg = SlabConfig::from_env();
    for v in [
        "SP_DATAPOOL_PATH",
        "SP_DATAPOOL_NAME",
        "SP_SLAB_MEM",
        "SP_SLAB_SIZE",
        "SP_SLAB_FACTOR",
        "SP_SLAB_USE_CAS",
        "SP_SLAB_EVICT",
    ] {
        std::env::remove_var(v);
    }

    assert_eq!(cfg.datapool.path, Some(PathBuf::from("/tmp/sp-env.pool")));
    assert_eq!(cfg.datapool.name, "envtag");
    assert_eq!(cfg.slab_mem, 8 * 1024 * 1024);
    assert_eq!(cfg.slab_size, 64 * 1024);
    assert_eq!(cfg.factor_milli(), 1500);
    assert!(!cfg.use_cas);
    assert!(!cfg.evict);
    cfg.validate()?;

    let cfg = cfg
        .with_datapool(PoolConfig::default())
        .with_slab_mem(1024 * 1024)
        .with_use_cas(true);
    assert!(cfg.datapool.path.is_none());
    assert_eq!(cfg.cas_size(), 8);
    cfg.validate()?;
    Ok(())
}

#[test]
fn invalid_config_is_rejected_by_open() {
    let bad = SlabConfig::default().with_slab_size(SlabPool::consts::SLAB_SIZE_MAX * 2);
    let err = Cache::open(bad).unwrap_err();
    assert!(matches!(kind_of(&err), Some(CacheError::InvalidConfig(_))));

    let bad = SlabConfig::default().with_datapool(PoolConfig::default().with_name(""));
    let err = Cache::open(bad).unwrap_err();
    assert!(matches!(kind_of(&err), Some(CacheError::InvalidConfig(_))));
}

#[test]
fn display_names_the_medium() {
    let s = SlabConfig::default().to_string();
    assert!(s.contains("<volatile>"));
    assert!(s.contains("slabpool"));
}
