use anyhow::Result;

use SlabPool::{kind_of, Cache, CacheError, Evictor, ItemRef, RandomEviction, SlabConfig};

const SLAB: usize = 4096;

fn small_arena(evict: bool) -> SlabConfig {
    let _ = env_logger::builder().is_test(true).try_init();
    SlabConfig::default()
        .with_slab_mem(4 * SLAB)
        .with_slab_size(SLAB)
        .with_evict(evict)
}

fn put(cache: &mut Cache, key: &[u8], val: &[u8]) -> Result<ItemRef> {
    let it = cache.reserve(key, val, val.len(), 0, 0)?;
    cache.insert(it, key);
    Ok(it)
}

/// Always picks the first slab.
struct FirstSlab;

impl Evictor for FirstSlab {
    fn choose(&mut self, nslab: u32) -> Option<u32> {
        (nslab > 0).then_some(0)
    }
}

#[test]
fn full_arena_without_eviction_is_out_of_memory() -> Result<()> {
    let mut cache = Cache::open(small_arena(false))?;
    let big = vec![b'b'; 3000];
    for i in 0..4 {
        put(&mut cache, format!("big{i}").as_bytes(), &big)?;
    }
    assert_eq!(cache.stats().nslab, 4);

    let err = put(&mut cache, b"big4", &big).unwrap_err();
    assert!(matches!(kind_of(&err), Some(CacheError::OutOfMemory { .. })));
    assert_eq!(cache.len(), 4);
    assert_eq!(cache.metrics().reserve_failures, 1);

    // freeing one item makes room again
    assert!(cache.delete(b"big0"));
    put(&mut cache, b"big4", &big)?;
    assert_eq!(cache.len(), 4);
    cache.close()?;
    Ok(())
}

#[test]
fn random_eviction_reclaims_one_slab() -> Result<()> {
    let mut cache = Cache::open(small_arena(true))?;
    cache.set_evictor(Box::new(RandomEviction::with_seed(7)));
    let big = vec![b'b'; 3000];
    for i in 0..4 {
        put(&mut cache, format!("big{i}").as_bytes(), &big)?;
    }
    put(&mut cache, b"big4", &big)?;

    assert_eq!(cache.len(), 4);
    assert!(cache.get(b"big4").is_some());
    let survivors = (0..4)
        .filter(|i| cache.get(format!("big{i}").as_bytes()).is_some())
        .count();
    assert_eq!(survivors, 3);

    let m = cache.metrics();
    assert_eq!(m.evictions, 1);
    assert_eq!(m.evicted_items, 1);
    cache.close()?;
    Ok(())
}

#[test]
fn eviction_moves_a_slab_between_classes() -> Result<()> {
    let mut cache = Cache::open(small_arena(true))?;
    cache.set_evictor(Box::new(FirstSlab));

    let small_class = cache.heap().classes().lookup(48).unwrap_or(0);
    let per_slab = cache.heap().classes().per_slab(small_class, SLAB) as usize;
    for i in 0..4 * per_slab {
        put(&mut cache, format!("s{i}").as_bytes(), b"0123456789")?;
    }
    assert_eq!(cache.stats().nslab, 4);
    assert_eq!(cache.heap().slab_class(0), small_class);

    let big = vec![b'b'; 3000];
    let it = put(&mut cache, b"big", &big)?;
    assert_eq!(cache.heap().slab_of(it.offset()), 0);
    assert_ne!(cache.heap().slab_class(0), small_class);

    assert_eq!(cache.len(), 3 * per_slab + 1);
    assert!(cache.get(b"s0").is_none());
    assert!(cache.get(format!("s{}", per_slab).as_bytes()).is_some());
    assert_eq!(cache.metrics().evicted_items, per_slab as u64);
    cache.close()?;
    Ok(())
}

#[test]
fn slab_with_reserved_item_is_not_evicted() -> Result<()> {
    let mut cache = Cache::open(small_arena(true))?;
    cache.set_evictor(Box::new(FirstSlab));
    let mut held = Vec::new();
    for i in 0..4 {
        held.push(cache.reserve(format!("r{i}").as_bytes(), b"", 3000, 0, 0)?);
    }

    let err = cache.reserve(b"r4", b"", 3000, 0, 0).unwrap_err();
    assert!(matches!(kind_of(&err), Some(CacheError::OutOfMemory { .. })));
    assert_eq!(cache.metrics().eviction_refusals, 1);
    assert!(cache.item(held[0]).is_reserved());

    // once linked, the slab can be reclaimed
    cache.insert(held[0], b"r0");
    cache.reserve(b"r4", b"", 3000, 0, 0)?;
    assert!(cache.get(b"r0").is_none());
    cache.close()?;
    Ok(())
}

#[test]
fn annex_without_room_is_not_enough_memory() -> Result<()> {
    let mut cache = Cache::open(small_arena(false))?;
    let big = vec![b'b'; 3000];
    for i in 0..3 {
        put(&mut cache, format!("big{i}").as_bytes(), &big)?;
    }
    let it = put(&mut cache, b"s0", b"0123456789")?;
    assert_eq!(cache.stats().nslab, 4);

    let err = cache.annex(it, b"s0", &[b'x'; 1000], true).unwrap_err();
    assert!(matches!(kind_of(&err), Some(CacheError::NotEnoughMemory { .. })));
    let value = cache.get(b"s0").map(|i| i.value().to_vec());
    assert_eq!(value.as_deref(), Some(&b"0123456789"[..]));
    cache.close()?;
    Ok(())
}

#[test]
fn annex_past_the_largest_chunk_is_not_enough_memory() -> Result<()> {
    let mut cache = Cache::open(small_arena(false))?;
    let big = vec![b'b'; 3000];
    let it = put(&mut cache, b"big", &big)?;

    let err = cache.annex(it, b"big", &[b'x'; 2000], true).unwrap_err();
    assert!(matches!(kind_of(&err), Some(CacheError::NotEnoughMemory { .. })));
    let value = cache.get(b"big").map(|i| i.value().to_vec());
    assert_eq!(value.as_deref(), Some(&big[..]));
    assert_eq!(cache.len(), 1);
    cache.close()?;
    Ok(())
}
