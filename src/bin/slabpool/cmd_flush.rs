use anyhow::Result;

use super::cli::PoolArgs;
use super::util::with_cache;

pub fn exec(pool: PoolArgs) -> Result<()> {
    let n = with_cache(&pool, |cache| {
        let n = cache.len();
        cache.flush();
        Ok(n)
    })?;
    println!("FLUSHED {} items", n);
    Ok(())
}
