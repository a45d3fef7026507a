use anyhow::{anyhow, Context, Result};
use clap::Parser;
use env_logger::{Builder, Env};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use SlabPool::{Cache, MetricsSnapshot, PoolConfig, SlabConfig};

/// Slab allocator micro-benchmark
///
/// Loads `nentries` entries, then runs `nops` operations drawn from the
/// get/put/rem mix. Examples:
///   slabpool_bench --json
///   slabpool_bench --pool ./bench.pool --entry-min-size 64 --entry-max-size 1024 --nops 1000000
#[derive(Parser, Debug)]
#[command(name = "slabpool_bench", version, about = "SlabPool micro-bench CLI")]
struct Opt {
    /// Minimum entry size (key + value) in bytes
    #[arg(long, default_value_t = 64)]
    entry_min_size: usize,

    /// Maximum entry size (key + value) in bytes
    #[arg(long, default_value_t = 64)]
    entry_max_size: usize,

    /// Number of distinct entries
    #[arg(long, default_value_t = 1000)]
    nentries: usize,

    /// Operations in the measured phase
    #[arg(long, default_value_t = 100_000)]
    nops: usize,

    /// Percentage of gets
    #[arg(long, default_value_t = 80)]
    pct_get: u32,

    /// Percentage of puts
    #[arg(long, default_value_t = 10)]
    pct_put: u32,

    /// Percentage of removes
    #[arg(long, default_value_t = 10)]
    pct_rem: u32,

    /// Arena size in bytes
    #[arg(long, default_value_t = 64 * 1024 * 1024)]
    slab_mem: usize,

    /// Slab size in bytes
    #[arg(long, default_value_t = 1024 * 1024)]
    slab_size: usize,

    /// File-backed pool (volatile memory if not set). Removed before the run.
    #[arg(long)]
    pool: Option<PathBuf>,

    /// Random seed
    #[arg(long, default_value_t = 1234)]
    seed: u64,

    /// JSON output
    #[arg(long, default_value_t = false)]
    json: bool,
}

struct Entry {
    key: Vec<u8>,
    value: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Get,
    Put,
    Rem,
}

#[derive(Debug, Clone, Serialize)]
struct OpStats {
    name: String,
    ops: u64,
    misses: u64,
    p50_us: f64,
    p90_us: f64,
    p99_us: f64,
}

#[derive(Debug, Clone, Serialize)]
struct BenchReport {
    nentries: usize,
    nops: usize,
    pct_get: u32,
    pct_put: u32,
    pct_rem: u32,
    load_sec: f64,
    run_sec: f64,
    avg_op_ns: f64,
    tput_ops: f64,
    ops: Vec<OpStats>,
    metrics: MetricsSnapshot,
}

/// Which op a roll in 0..100 maps to, given cumulative thresholds.
fn pick_op(roll: u32, pct_get: u32, pct_put: u32) -> Op {
    if roll < pct_get {
        Op::Get
    } else if roll < pct_get + pct_put {
        Op::Put
    } else {
        Op::Rem
    }
}

fn main() {
    Builder::from_env(Env::default().default_filter_or("warn"))
        .format_timestamp_millis()
        .init();

    if let Err(e) = run() {
        eprintln!("bench error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let opt = Opt::parse();
    if opt.pct_get + opt.pct_put + opt.pct_rem != 100 {
        return Err(anyhow!(
            "pct_get + pct_put + pct_rem must be 100 (got {})",
            opt.pct_get + opt.pct_put + opt.pct_rem
        ));
    }
    let key_width = format!("{}", opt.nentries).len();
    if opt.entry_min_size <= key_width || opt.entry_min_size > opt.entry_max_size {
        return Err(anyhow!(
            "entry sizes must satisfy {} < min <= max (got {}..{})",
            key_width,
            opt.entry_min_size,
            opt.entry_max_size
        ));
    }

    if let Some(p) = &opt.pool {
        if p.exists() {
            std::fs::remove_file(p).with_context(|| format!("remove {}", p.display()))?;
        }
    }
    let cfg = SlabConfig::default()
        .with_datapool(PoolConfig::default().with_path(opt.pool.clone()))
        .with_slab_mem(opt.slab_mem)
        .with_slab_size(opt.slab_size)
        .with_evict(false);
    let mut cache = Cache::open(cfg)?;

    let mut rng = StdRng::seed_from_u64(opt.seed);
    let entries: Vec<Entry> = (1..=opt.nentries)
        .map(|i| {
            let size = rng.gen_range(opt.entry_min_size..=opt.entry_max_size);
            let key = format!("{}", i).into_bytes();
            let value = vec![b'a'; size - key.len()];
            Entry { key, value }
        })
        .collect();

    // load
    let t0 = Instant::now();
    let mut live: Vec<usize> = Vec::with_capacity(opt.nentries);
    for (i, e) in entries.iter().enumerate() {
        put(&mut cache, e).with_context(|| format!("load entry {}", i + 1))?;
        live.push(i);
    }
    let load = t0.elapsed();

    // `live` is consumed from the back; touched entries go to `touched` until
    // `live` runs dry, removed ones wait in `removed` for the next put.
    let mut touched: Vec<usize> = Vec::with_capacity(opt.nentries);
    let mut removed: Vec<usize> = Vec::new();
    let mut lat: [Vec<Duration>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    let mut misses = [0u64; 3];

    let start = Instant::now();
    for _ in 0..opt.nops {
        if live.is_empty() {
            std::mem::swap(&mut live, &mut touched);
        }
        let op = pick_op(rng.gen_range(0..100), opt.pct_get, opt.pct_put);
        match op {
            Op::Get => {
                let Some(i) = live.pop() else { continue };
                let t = Instant::now();
                let hit = cache.get(&entries[i].key).is_some();
                lat[0].push(t.elapsed());
                misses[0] += (!hit) as u64;
                touched.push(i);
            }
            Op::Put => {
                let i = match removed.pop() {
                    Some(i) => i,
                    None => {
                        let Some(i) = live.pop() else { continue };
                        cache.delete(&entries[i].key);
                        i
                    }
                };
                let t = Instant::now();
                let ok = put(&mut cache, &entries[i]).is_ok();
                lat[1].push(t.elapsed());
                misses[1] += (!ok) as u64;
                touched.push(i);
            }
            Op::Rem => {
                let Some(i) = live.pop() else { continue };
                let t = Instant::now();
                let hit = cache.delete(&entries[i].key);
                lat[2].push(t.elapsed());
                misses[2] += (!hit) as u64;
                removed.push(i);
            }
        }
    }
    let run = start.elapsed();

    let ops: Vec<OpStats> = ["get", "put", "rem"]
        .iter()
        .zip(lat.iter_mut())
        .zip(misses.iter())
        .map(|((name, l), m)| stats(name, l, *m))
        .collect();
    let report = BenchReport {
        nentries: opt.nentries,
        nops: opt.nops,
        pct_get: opt.pct_get,
        pct_put: opt.pct_put,
        pct_rem: opt.pct_rem,
        load_sec: load.as_secs_f64(),
        run_sec: run.as_secs_f64(),
        avg_op_ns: run.as_nanos() as f64 / opt.nops.max(1) as f64,
        tput_ops: if run.as_secs_f64() > 0.0 {
            opt.nops as f64 / run.as_secs_f64()
        } else {
            0.0
        },
        ops,
        metrics: cache.metrics(),
    };
    cache.close()?;

    if opt.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report_human(&report);
    }
    Ok(())
}

fn put(cache: &mut Cache, e: &Entry) -> Result<()> {
    let it = cache.reserve(&e.key, &e.value, e.value.len(), 0, 0)?;
    cache.insert(it, &e.key);
    Ok(())
}

fn stats(name: &str, lat: &mut [Duration], misses: u64) -> OpStats {
    lat.sort_unstable();
    let to_us = |d: Duration| d.as_secs_f64() * 1e6;
    let p = |q: f64| -> f64 {
        if lat.is_empty() {
            return 0.0;
        }
        let idx = ((lat.len() as f64 - 1.0) * q).round() as usize;
        to_us(lat[idx])
    };
    OpStats {
        name: name.to_string(),
        ops: lat.len() as u64,
        misses,
        p50_us: p(0.50),
        p90_us: p(0.90),
        p99_us: p(0.99),
    }
}

fn print_report_human(r: &BenchReport) {
    println!("SlabPool bench report:");
    println!("  entries      = {}", r.nentries);
    println!("  ops          = {}", r.nops);
    println!("  mix          = get {}% / put {}% / rem {}%", r.pct_get, r.pct_put, r.pct_rem);
    println!("  load         = {:.3}s", r.load_sec);
    println!("  runtime      = {:.3}s", r.run_sec);
    println!("  avg latency  = {:.1} ns/op", r.avg_op_ns);
    println!("  throughput   = {:.0} ops/s", r.tput_ops);
    println!("Ops:");
    for s in &r.ops {
        println!(
            "  {:>4}: n={} miss={} p50={:.2}us p90={:.2}us p99={:.2}us",
            s.name, s.ops, s.misses, s.p50_us, s.p90_us, s.p99_us
        );
    }
    let m = &r.metrics;
    println!("Metrics snapshot:");
    println!("  reserves          = {}", m.reserves);
    println!("  reserve_failures  = {}", m.reserve_failures);
    println!("  reuse_ratio       = {:.2}", m.reuse_ratio());
    println!("  slabs_carved      = {}", m.slabs_carved);
    println!("  deletes           = {}", m.deletes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_mix_thresholds() {
        assert_eq!(pick_op(0, 80, 10), Op::Get);
        assert_eq!(pick_op(79, 80, 10), Op::Get);
        assert_eq!(pick_op(80, 80, 10), Op::Put);
        assert_eq!(pick_op(89, 80, 10), Op::Put);
        assert_eq!(pick_op(90, 80, 10), Op::Rem);
        assert_eq!(pick_op(99, 80, 10), Op::Rem);
        assert_eq!(pick_op(99, 100, 0), Op::Get);
    }
}
