use anyhow::Result;

use super::cli::PoolArgs;
use super::util::with_cache;

pub fn exec(pool: PoolArgs, key: String) -> Result<()> {
    let existed = with_cache(&pool, |cache| Ok(cache.delete(key.as_bytes())))?;
    if existed {
        println!("DELETED '{}'", key);
    } else {
        println!("NOT FOUND '{}'", key);
    }
    Ok(())
}
