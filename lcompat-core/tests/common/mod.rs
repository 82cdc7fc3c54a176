//! 测试辅助工具
//!
//! 构造内存宿主、合成调用栈和临时 chunk 文件

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use lcompat_core::{FrameInfo, FrameKind, MemoryHost, RawApi};
use tempfile::TempDir;

/// Host whose stack holds `items` as strings, bottom first
pub fn host_with_strings(items: &[&str]) -> MemoryHost {
    let mut host = MemoryHost::new();
    for item in items {
        host.push_str(item);
    }
    host
}

/// Host whose stack holds `items` as numbers, bottom first
pub fn host_with_numbers(items: &[f64]) -> MemoryHost {
    let mut host = MemoryHost::new();
    for &n in items {
        host.push_number(n);
    }
    host
}

/// Stack contents rendered as strings, bottom first
pub fn rendered(host: &MemoryHost) -> Vec<String> {
    host.values().iter().map(|v| v.to_string()).collect()
}

/// Host with `depth` script frames; frame `i` (outermost first) is `f<i>`
/// running at line `i + 1`.
pub fn host_with_frames(depth: usize) -> MemoryHost {
    let mut host = MemoryHost::new();
    for i in 0..depth {
        host.push_frame(
            FrameInfo::new("app.lua", FrameKind::Script)
                .at_line(i as i32 + 1)
                .named(format!("f{i}"), "global"),
        );
    }
    host
}

/// Traceback text left on top of the stack
pub fn top_string(host: &MemoryHost) -> String {
    host.string_at(-1).unwrap_or_default()
}

/// 临时目录中的 chunk 文件
pub struct ChunkDir {
    dir: TempDir,
}

impl ChunkDir {
    pub fn new() -> Self {
        ChunkDir {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    /// Write `contents` to `name` and return its path.
    pub fn write(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).expect("write chunk");
        path
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }
}

/// Call the function on top with no arguments and return its single result
/// as a string.
pub fn run_loaded(host: &mut MemoryHost) -> String {
    host.call(0, 1).expect("call loaded chunk");
    let out = host.string_at(-1).unwrap_or_default();
    host.set_top(-2);
    out
}
