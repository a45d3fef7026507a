#![allow(non_snake_case)]

// Base
pub mod consts;
pub mod config;
pub mod error;
pub mod lock;
pub mod metrics;
pub mod util;   // src/util/mod.rs

// Arena
pub mod datapool; // src/datapool/{mod,header,open}.rs

// Allocator
pub mod slab;   // src/slab/{mod,class,meta}.rs
pub mod item;   // src/item/mod.rs
pub mod index;
pub mod evict;
pub mod cache;  // src/cache/{mod,open,alloc,item}.rs

// Re-exports
pub use cache::{Cache, CacheStats};
pub use config::{PoolConfig, SlabConfig};
pub use datapool::{Datapool, PoolMedium};
pub use error::{kind_of, CacheError};
pub use evict::{Evictor, NoEviction, RandomEviction};
pub use index::{HashIndex, Index};
pub use item::{Item, ItemRef};
pub use metrics::MetricsSnapshot;
