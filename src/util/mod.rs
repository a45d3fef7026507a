//! util - small shared helpers.
//!
//! - now_secs(): current Unix time in seconds (u32, saturating), used for item
//!   create/expire stamps.
//! - round_up()/align8(): size arithmetic for pages, chunks and records.

/// Current Unix time in seconds, clamped to u32 (saturating).
#[inline]
pub fn now_secs() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    now.as_secs().min(u32::MAX as u64) as u32
}

/// Round `x` up to the next multiple of `d` (d > 0).
#[inline]
pub const fn round_up(x: usize, d: usize) -> usize {
    x + (d - x % d) % d
}

#[inline]
pub const fn align8(x: usize) -> usize {
    round_up(x, 8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_secs_monotonic_nonzero() {
        let a = now_secs();
        let b = now_secs();
        assert!(a > 0);
        assert!(b >= a);
    }

    #[test]
    fn rounding() {
        assert_eq!(round_up(0, 4096), 0);
        assert_eq!(round_up(1, 4096), 4096);
        assert_eq!(round_up(4096, 4096), 4096);
        assert_eq!(align8(41), 48);
        assert_eq!(align8(48), 48);
    }
}
