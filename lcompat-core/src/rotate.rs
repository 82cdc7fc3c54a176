//! Stack rotation
//!
//! The host offers no slot swap, so the rotation is built from three
//! reversals whose exchanges each go through two temporary slots.

use tracing::trace;

use crate::error::{CompatError, CompatResult};
use crate::host::RawApi;
use crate::index::abs_index;

/// Exchange slots `a..=b` pairwise from both ends.
fn reverse<H: RawApi>(host: &mut H, mut a: i32, mut b: i32) {
    while a < b {
        host.push_value(a);
        host.push_value(b);
        host.replace(a);
        host.replace(b);
        a += 1;
        b -= 1;
    }
}

/// Rotate the segment `[idx, top]` by `n` positions toward the top.
///
/// Negative `n` rotates toward the bottom. Headroom for the two temporary
/// slots is claimed before the first exchange.
pub fn rotate<H: RawApi>(host: &mut H, idx: i32, n: i32) -> CompatResult<()> {
    let idx = abs_index(host, idx);
    let top = host.get_top();
    let n_elems = top - idx + 1;
    if n_elems <= 0 {
        return Ok(());
    }
    let n = n.rem_euclid(n_elems);
    if n == 0 {
        return Ok(());
    }
    if !host.check_stack(2) {
        return Err(CompatError::no_headroom("not enough stack slots available"));
    }
    trace!(target: "lcompat::rotate", idx, n, n_elems, "rotating segment");
    let split = n_elems - n;
    reverse(host, idx, idx + split - 1);
    reverse(host, idx + split, top);
    reverse(host, idx, top);
    Ok(())
}

/// Move the top value into `idx`, shifting the values above it up.
pub fn insert<H: RawApi>(host: &mut H, idx: i32) -> CompatResult<()> {
    rotate(host, idx, 1)
}

/// Remove the value at `idx`, shifting the values above it down.
pub fn remove<H: RawApi>(host: &mut H, idx: i32) -> CompatResult<()> {
    rotate(host, idx, -1)?;
    host.set_top(-2);
    Ok(())
}
