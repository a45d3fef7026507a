use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// SlabPool CLI: inspect and edit a file-backed cache pool
#[derive(Parser, Debug)]
#[command(name = "slabpool", version, about = "SlabPool CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

/// Pool location and geometry; must match between runs or the pool starts empty.
#[derive(Args, Debug, Clone)]
pub struct PoolArgs {
    /// Pool file (created if missing)
    #[arg(long)]
    pub path: PathBuf,
    /// Owner tag stored in the pool header
    #[arg(long, default_value = "slabpool")]
    pub name: String,
    /// Arena size in bytes
    #[arg(long, default_value_t = 64 * 1024 * 1024)]
    pub mem: usize,
    /// Slab size in bytes
    #[arg(long, default_value_t = 1024 * 1024)]
    pub slab_size: usize,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Print header, allocator shape and item count
    ///
    /// Example:
    ///   slabpool status --path ./cache.pool --json
    Status {
        #[command(flatten)]
        pool: PoolArgs,
        /// JSON output (single object)
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Store a value (literal, "hex:..", "@file" or "-" for stdin)
    Put {
        #[command(flatten)]
        pool: PoolArgs,
        #[arg(long)]
        key: String,
        #[arg(long)]
        value: String,
        /// Time to live in seconds (0 = never expires)
        #[arg(long, default_value_t = 0)]
        ttl: u32,
    },
    /// Get a value
    Get {
        #[command(flatten)]
        pool: PoolArgs,
        #[arg(long)]
        key: String,
        /// Optional file to write the raw value into
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Delete a key
    Del {
        #[command(flatten)]
        pool: PoolArgs,
        #[arg(long)]
        key: String,
    },
    /// Append bytes to an existing value
    Append {
        #[command(flatten)]
        pool: PoolArgs,
        #[arg(long)]
        key: String,
        #[arg(long)]
        value: String,
    },
    /// Prepend bytes to an existing value
    Prepend {
        #[command(flatten)]
        pool: PoolArgs,
        #[arg(long)]
        key: String,
        #[arg(long)]
        value: String,
    },
    /// Unlink every item
    Flush {
        #[command(flatten)]
        pool: PoolArgs,
    },
}
