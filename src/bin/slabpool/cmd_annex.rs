use anyhow::Result;

use super::cli::PoolArgs;
use super::util::{decode_value_arg, with_cache};

/// append (append = true) or prepend to an existing value.
pub fn exec(pool: PoolArgs, key: String, value: String, append: bool) -> Result<()> {
    let extra = decode_value_arg(&value)?;
    let op = if append { "append" } else { "prepend" };

    let done = with_cache(&pool, |cache| {
        let found = cache.get(key.as_bytes()).map(|it| it.handle());
        let Some(it) = found else {
            return Ok(None);
        };
        let moved = cache.annex(it, key.as_bytes(), &extra, append)?;
        Ok(Some((cache.item(moved).vlen(), moved != it)))
    })?;

    match done {
        Some((vlen, moved)) => println!(
            "OK {}: key='{}' +{} B -> {} B{}",
            op,
            key,
            extra.len(),
            vlen,
            if moved { " (reallocated)" } else { "" }
        ),
        None => println!("NOT FOUND '{}'", key),
    }
    Ok(())
}
