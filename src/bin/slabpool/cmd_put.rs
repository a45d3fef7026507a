use anyhow::Result;

use SlabPool::util::now_secs;

use super::cli::PoolArgs;
use super::util::{decode_value_arg, with_cache};

pub fn exec(pool: PoolArgs, key: String, value: String, ttl: u32) -> Result<()> {
    let val = decode_value_arg(&value)?;
    let expire_at = if ttl == 0 {
        0
    } else {
        now_secs().saturating_add(ttl)
    };

    let class = with_cache(&pool, |cache| {
        let it = cache.reserve(key.as_bytes(), &val, val.len(), 0, expire_at)?;
        cache.insert(it, key.as_bytes());
        Ok(cache.item(it).class())
    })?;

    println!(
        "OK put: key='{}' ({} B), value={} B, class={}",
        key,
        key.len(),
        val.len(),
        class
    );
    Ok(())
}
