use anyhow::Result;
use serde::Serialize;

use SlabPool::{CacheStats, MetricsSnapshot};

use super::cli::PoolArgs;
use super::util::with_cache;

#[derive(Serialize)]
struct PoolStatus {
    path: String,
    tag: String,
    medium: String,
    version: u64,
    mapped_len: u64,
    arena_size: usize,
}

#[derive(Serialize)]
struct Status {
    pool: PoolStatus,
    cache: CacheStats,
    metrics: MetricsSnapshot,
}

pub fn exec_with_json(pool: PoolArgs, json: bool) -> Result<()> {
    let path = pool.path.display().to_string();
    let status = with_cache(&pool, |cache| {
        let hdr = cache.pool().header_info();
        Ok(Status {
            pool: PoolStatus {
                path,
                tag: cache.pool().user_tag(),
                medium: cache.pool().medium().to_string(),
                version: hdr.version,
                mapped_len: hdr.size,
                arena_size: cache.pool().size(),
            },
            cache: cache.stats(),
            metrics: cache.metrics(),
        })
    })?;

    if json {
        println!("{}", serde_json::to_string(&status)?);
        return Ok(());
    }

    let p = &status.pool;
    let c = &status.cache;
    println!("Pool:");
    println!("  path        = {}", p.path);
    println!("  tag         = {}", p.tag);
    println!("  medium      = {}", p.medium);
    println!("  version     = {}", p.version);
    println!("  mapped_len  = {} B", p.mapped_len);
    println!("  arena       = {} B", p.arena_size);
    println!("Allocator:");
    println!("  slab_size   = {} B", c.slab_size);
    println!("  slabs       = {} / {}", c.nslab, c.max_slabs);
    println!("  classes     = {} (max item {} B)", c.classes, c.max_item);
    println!("  items       = {}", c.items);
    println!("  free_chunks = {}", c.free_chunks);
    println!("  cas_next    = {}", c.cas_next);
    println!("  fresh       = {}", c.fresh);
    println!("Recovery:");
    println!("  items       = {}", status.metrics.recovered_items);
    println!("  free        = {}", status.metrics.recovered_free);
    Ok(())
}
