use anyhow::{anyhow, Context, Result};
use log::warn;
use std::fs::OpenOptions;
use std::io::Read;
use std::path::PathBuf;

use SlabPool::{Cache, PoolConfig, SlabConfig};

use super::cli::PoolArgs;

fn open_cache(args: &PoolArgs) -> Result<Cache> {
    let cfg = SlabConfig::from_env()
        .with_datapool(
            PoolConfig::from_env()
                .with_path(Some(args.path.clone()))
                .with_name(args.name.clone()),
        )
        .with_slab_mem(args.mem)
        .with_slab_size(args.slab_size)
        .with_evict(false);
    Cache::open(cfg).with_context(|| format!("open pool {}", args.path.display()))
}

/// Open the pool, run `op` and close it gracefully even when `op` fails, so
/// a rejected command never leaves the pool DIRTY.
pub fn with_cache<T>(args: &PoolArgs, op: impl FnOnce(&mut Cache) -> Result<T>) -> Result<T> {
    let mut cache = open_cache(args)?;
    let res = op(&mut cache);
    let closed = cache
        .close()
        .with_context(|| format!("close pool {}", args.path.display()));
    match (res, closed) {
        (Ok(v), Ok(())) => Ok(v),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(ce)) => {
            warn!("{:#}", ce);
            Err(e)
        }
    }
}

pub fn decode_value_arg(arg: &str) -> Result<Vec<u8>> {
    if arg == "-" {
        let mut buf = Vec::new();
        std::io::stdin().read_to_end(&mut buf)?;
        return Ok(buf);
    }
    if let Some(p) = arg.strip_prefix('@') {
        let path = PathBuf::from(p);
        let mut f = OpenOptions::new()
            .read(true)
            .open(&path)
            .with_context(|| format!("open value file {}", path.display()))?;
        let mut buf = Vec::new();
        f.read_to_end(&mut buf)?;
        return Ok(buf);
    }
    if let Some(hx) = arg.strip_prefix("hex:") {
        return decode_hex(hx);
    }
    Ok(arg.as_bytes().to_vec())
}

pub fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let s = s.trim();
    if s.len() % 2 != 0 {
        return Err(anyhow!("hex string must have even length"));
    }
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(s.len() / 2);
    for i in (0..bytes.len()).step_by(2) {
        let h = (bytes[i] as char)
            .to_digit(16)
            .ok_or_else(|| anyhow!("invalid hex at pos {}", i))?;
        let l = (bytes[i + 1] as char)
            .to_digit(16)
            .ok_or_else(|| anyhow!("invalid hex at pos {}", i + 1))?;
        out.push(((h << 4) | l) as u8);
    }
    Ok(out)
}

pub fn display_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => format!("(binary {} B)", bytes.len()),
    }
}

pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(if i % 16 == 0 { '\n' } else { ' ' });
        }
        out.push_str(&format!("{:02x}", b));
    }
    out
}
