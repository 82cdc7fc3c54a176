//! Index normalization
//!
//! Relative indices go stale as soon as the top moves, so every routine that
//! pushes before it is done with an index turns it into an absolute one first.

use crate::host::{is_pseudo, RawApi};

/// Absolute position of `idx`; pseudo-indices and absolute indices are
/// returned unchanged.
#[inline]
pub fn abs_index<H: RawApi>(host: &H, idx: i32) -> i32 {
    if idx < 0 && !is_pseudo(idx) {
        idx + host.get_top() + 1
    } else {
        idx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{upvalue_index, GLOBALS_INDEX, REGISTRY_INDEX};
    use crate::memory::MemoryHost;

    fn host_with_depth(depth: usize) -> MemoryHost {
        let mut host = MemoryHost::new();
        for i in 0..depth {
            host.push_number(i as f64);
        }
        host
    }

    #[test]
    fn test_relative_resolves_against_top() {
        for depth in 1..8 {
            let host = host_with_depth(depth);
            let d = depth as i32;
            for i in -d..=-1 {
                assert_eq!(abs_index(&host, i), d + i + 1);
            }
        }
    }

    #[test]
    fn test_idempotent() {
        let host = host_with_depth(5);
        for i in -5..=5 {
            if i == 0 {
                continue;
            }
            let once = abs_index(&host, i);
            assert_eq!(abs_index(&host, once), once);
        }
    }

    #[test]
    fn test_pseudo_indices_untouched() {
        let host = host_with_depth(3);
        assert_eq!(abs_index(&host, REGISTRY_INDEX), REGISTRY_INDEX);
        assert_eq!(abs_index(&host, GLOBALS_INDEX), GLOBALS_INDEX);
        assert_eq!(abs_index(&host, upvalue_index(2)), upvalue_index(2));
        assert_eq!(abs_index(&host, 2), 2);
    }

    #[test]
    fn test_stale_after_push() {
        let mut host = host_with_depth(2);
        let top = abs_index(&host, -1);
        host.push_nil();
        assert_eq!(top, 2);
        assert_eq!(abs_index(&host, -1), 3);
    }
}
