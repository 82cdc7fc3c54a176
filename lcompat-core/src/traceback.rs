//! Stack traceback
//!
//! The walker emits one line per level. Deep stacks keep a head window of
//! [`LEVELS1`] levels and a tail window of [`LEVELS2`] levels around a single
//! `...` marker. Native functions have no call-site name, so they are looked
//! up among the globals (and one level of nested tables).

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::error::{CompatError, CompatResult};
use crate::host::{Frame, FrameInfo, FrameKind, RawApi, ValueType, GLOBALS_INDEX};

/// Levels shown before the marker
pub const LEVELS1: i32 = 12;
/// Levels shown after the marker
pub const LEVELS2: i32 = 10;

/// Depth of the global name search (`"a.b"` at most)
const NAME_SEARCH_DEPTH: usize = 2;

/// Slots the walker may hold above the caller's top at once
const TRACEBACK_SLOTS: i32 = 12;

/// Number of active levels.
///
/// The host cannot report its depth, so the first missing level is bracketed
/// by doubling and then located by binary search.
pub fn count_levels<H: RawApi>(host: &H) -> i32 {
    if host.get_stack(0).is_none() {
        return 0;
    }
    // invariant: level `present` exists, level `absent` does not
    let (mut present, mut absent) = (0, 1);
    while host.get_stack(absent).is_some() {
        present = absent;
        absent *= 2;
    }
    while absent - present > 1 {
        let mid = present + (absent - present) / 2;
        if host.get_stack(mid).is_some() {
            present = mid;
        } else {
            absent = mid;
        }
    }
    absent
}

/// Push a traceback of the stack starting at `level`, preceded by `msg`.
pub fn traceback<H: RawApi>(host: &mut H, msg: Option<&str>, level: i32) -> CompatResult<()> {
    if !host.check_stack(TRACEBACK_SLOTS) {
        return Err(CompatError::no_headroom("traceback"));
    }
    let top = host.get_top();
    let num_levels = count_levels(host);
    let mark = (num_levels > LEVELS1 + LEVELS2).then_some(LEVELS1);
    debug!(
        target: "lcompat::traceback",
        num_levels,
        truncated = mark.is_some(),
        "building traceback"
    );

    if let Some(msg) = msg {
        host.push_bytes(format!("{msg}\n").as_bytes());
    }
    host.push_bytes(b"stack traceback:");

    let mut level = level;
    while let Some(frame) = host.get_stack(level) {
        if mark == Some(level) {
            host.push_bytes(b"\n\t...");
            level = num_levels - LEVELS2;
            continue;
        }
        let info = host.get_info(&frame);
        host.push_bytes(format!("\n\t{}:", info.short_src).as_bytes());
        if info.current_line > 0 {
            host.push_bytes(format!("{}:", info.current_line).as_bytes());
        }
        host.push_bytes(b" in ");
        push_func_name(host, &frame, &info)?;
        host.concat(host.get_top() - top)?;
        level += 1;
    }
    host.concat(host.get_top() - top)
}

/// Push the description of the function running in `frame`.
fn push_func_name<H: RawApi>(host: &mut H, frame: &Frame, info: &FrameInfo) -> CompatResult<()> {
    let name = if !info.name_what.is_empty() {
        format!("function '{}'", info.name.as_deref().unwrap_or("?"))
    } else {
        match info.kind {
            FrameKind::Main => "main chunk".to_string(),
            FrameKind::Native => match find_global_name(host, frame)? {
                Some(global) => format!("function '{global}'"),
                None => "?".to_string(),
            },
            FrameKind::Script | FrameKind::Tail => {
                format!("function <{}:{}>", info.short_src, info.line_defined)
            }
        }
    };
    host.push_bytes(name.as_bytes());
    Ok(())
}

/// Dotted path under the globals holding the function of `frame`.
///
/// Depth-first over string keys, at most [`NAME_SEARCH_DEPTH`] tables deep.
/// The iteration state of every open table lives on the host stack as a
/// `table, key` pair; the path of keys is kept alongside. Each table is
/// entered once, which also keeps `_G` from being searched again.
fn find_global_name<H: RawApi>(host: &mut H, frame: &Frame) -> CompatResult<Option<String>> {
    let top = host.get_top();
    host.push_frame_function(frame);
    let function = top + 1;
    host.push_value(GLOBALS_INDEX);

    let mut visited = HashSet::new();
    visited.insert(host.to_pointer(-1));
    let mut path: Vec<String> = Vec::new();
    host.push_nil();

    let found = loop {
        // stack: ..., table, key
        if !host.next(-2)? {
            // table exhausted: drop it and resume its parent
            host.set_top(-2);
            if path.pop().is_none() {
                break None;
            }
            continue;
        }
        // stack: ..., table, key, value
        if host.type_of(-2) != ValueType::String {
            host.set_top(-2);
            continue;
        }
        let key = host
            .to_bytes(-2)
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default();
        if host.raw_equal(function, -1) {
            path.push(key);
            break Some(path.join("."));
        }
        if path.len() + 1 < NAME_SEARCH_DEPTH
            && host.type_of(-1) == ValueType::Table
            && visited.insert(host.to_pointer(-1))
        {
            path.push(key);
            host.push_nil();
            continue;
        }
        host.set_top(-2);
    };

    host.set_top(top);
    trace!(target: "lcompat::traceback", name = ?found, "global function name lookup");
    Ok(found)
}
