//! Chunk loading with a binary/text mode restriction
//!
//! A 5.1 host loads whatever it is given. There a restricted mode is
//! enforced by looking at the first byte before the host's loader sees
//! anything: precompiled chunks start with [`SIGNATURE`]. A 5.2 host takes
//! the mode itself.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;

use lcompat_config::LoadMode;
use tracing::debug;

use crate::buffer::BUFFER_SIZE;
use crate::error::{CompatError, CompatResult};
use crate::host::{RawApi, Status, SIGNATURE};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Read-ahead source handed to the host's loader.
///
/// Read errors end the chunk and are kept so the caller can report them once
/// the host returns.
struct ChunkReader<R> {
    inner: R,
    /// Byte to emit before the rest of `inner`
    pending: Option<u8>,
    error: Option<io::Error>,
}

impl<R: BufRead> ChunkReader<R> {
    fn new(inner: R) -> Self {
        ChunkReader {
            inner,
            pending: None,
            error: None,
        }
    }

    /// Skip a UTF-8 byte order mark and a first line starting with `#`.
    ///
    /// The newline ending a skipped line is kept for text chunks so line
    /// numbers do not shift.
    fn skip_prelude(&mut self) -> io::Result<()> {
        if self.inner.fill_buf()?.starts_with(UTF8_BOM) {
            self.inner.consume(UTF8_BOM.len());
        }
        if self.inner.fill_buf()?.first() != Some(&b'#') {
            return Ok(());
        }
        loop {
            let (consumed, found) = {
                let buf = self.inner.fill_buf()?;
                if buf.is_empty() {
                    return Ok(());
                }
                match buf.iter().position(|&b| b == b'\n') {
                    Some(pos) => (pos + 1, true),
                    None => (buf.len(), false),
                }
            };
            self.inner.consume(consumed);
            if found {
                break;
            }
        }
        if self.inner.fill_buf()?.first() != Some(&SIGNATURE) {
            self.pending = Some(b'\n');
        }
        Ok(())
    }

    #[cfg(feature = "lua51")]
    fn first_byte(&mut self) -> io::Result<Option<u8>> {
        if self.pending.is_some() {
            return Ok(self.pending);
        }
        Ok(self.inner.fill_buf()?.first().copied())
    }
}

impl<R: BufRead> Read for ChunkReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        if let Some(byte) = self.pending.take() {
            out[0] = byte;
            return Ok(1);
        }
        match self.inner.read(out) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(e),
            Err(e) => {
                self.error = Some(e);
                Ok(0)
            }
        }
    }
}

fn parse_mode(mode: Option<&str>) -> CompatResult<LoadMode> {
    LoadMode::parse(mode.unwrap_or_default()).map_err(|e| CompatError::Argument(e.to_string()))
}

/// OS error text without the `(os error N)` suffix
fn os_message(err: &io::Error) -> String {
    let text = err.to_string();
    match text.rfind(" (os error ") {
        Some(pos) => text[..pos].to_string(),
        None => text,
    }
}

fn read_failure<H: RawApi>(host: &mut H, display: &str, err: &io::Error) -> Status {
    let msg = format!("cannot read {}: {}", display, os_message(err));
    host.push_bytes(msg.as_bytes());
    Status::ErrFile
}

/// Check the leading byte against `mode`, pushing the violation message.
#[cfg(feature = "lua51")]
fn check_mode<H: RawApi>(host: &mut H, first: Option<u8>, mode: LoadMode) -> bool {
    let binary = first == Some(SIGNATURE);
    let allowed = if binary { mode.binary } else { mode.text };
    if !allowed {
        let kind = if binary { "binary" } else { "text" };
        let msg = format!("attempt to load a {kind} chunk (mode is '{}')", mode.as_str());
        host.push_bytes(msg.as_bytes());
    }
    allowed
}

#[cfg(feature = "lua51")]
fn host_load<H: RawApi, R: BufRead>(
    host: &mut H,
    source: &mut ChunkReader<R>,
    chunkname: &str,
    display: &str,
    allowed: LoadMode,
) -> Status {
    if !allowed.is_unrestricted() {
        let first = match source.first_byte() {
            Ok(first) => first,
            Err(e) => return read_failure(host, display, &e),
        };
        if !check_mode(host, first, allowed) {
            debug!(target: "lcompat::loader", chunkname, mode = %allowed, "chunk rejected by mode");
            return Status::ErrSyntax;
        }
    }
    host.load(source, chunkname)
}

#[cfg(feature = "lua52")]
fn host_load<H: RawApi, R: BufRead>(
    host: &mut H,
    source: &mut ChunkReader<R>,
    chunkname: &str,
    _display: &str,
    allowed: LoadMode,
) -> Status {
    host.load_with_mode(source, chunkname, allowed.as_str())
}

fn load_chunk<H: RawApi, R: BufRead>(
    host: &mut H,
    source: &mut ChunkReader<R>,
    chunkname: &str,
    display: &str,
    mode: Option<&str>,
) -> CompatResult<Status> {
    let allowed = parse_mode(mode)?;
    let status = host_load(host, source, chunkname, display, allowed);
    if let Some(e) = source.error.take() {
        // replace the host's result with the read error
        host.set_top(-2);
        return Ok(read_failure(host, display, &e));
    }
    debug!(target: "lcompat::loader", chunkname, ?status, "chunk loaded");
    Ok(status)
}

/// Load a chunk from `reader`; pushes the compiled function or a message.
///
/// `mode` is `"b"`, `"t"` or `"bt"`; `None` and `""` accept both. A
/// malformed mode is an argument error.
pub fn loadx<H: RawApi, R: Read>(
    host: &mut H,
    reader: R,
    chunkname: &str,
    mode: Option<&str>,
) -> CompatResult<Status> {
    let mut source = ChunkReader::new(BufReader::with_capacity(BUFFER_SIZE, reader));
    let display = chunkname
        .strip_prefix(['=', '@'])
        .unwrap_or(chunkname);
    load_chunk(host, &mut source, chunkname, display, mode)
}

/// Load a chunk held in memory.
pub fn load_bufferx<H: RawApi>(
    host: &mut H,
    buff: &[u8],
    name: &str,
    mode: Option<&str>,
) -> CompatResult<Status> {
    loadx(host, buff, name, mode)
}

/// Load the file at `path`, or standard input when `path` is `None`.
///
/// The chunk is named `@<path>` (`=stdin` for standard input). Failing to
/// open or read the file yields [`Status::ErrFile`] and a message naming the
/// file; the file is closed on every path out.
pub fn load_filex<H: RawApi>(
    host: &mut H,
    path: Option<&Path>,
    mode: Option<&str>,
) -> CompatResult<Status> {
    // validate the mode before touching the file system
    parse_mode(mode)?;
    let (chunkname, display) = match path {
        Some(p) => (format!("@{}", p.display()), p.display().to_string()),
        None => ("=stdin".to_string(), "stdin".to_string()),
    };
    let reader: Box<dyn Read> = match path {
        Some(p) => match File::open(p) {
            Ok(file) => Box::new(file),
            Err(e) => {
                let msg = format!("cannot open {}: {}", display, os_message(&e));
                host.push_bytes(msg.as_bytes());
                return Ok(Status::ErrFile);
            }
        },
        None => Box::new(io::stdin()),
    };
    let mut source = ChunkReader::new(BufReader::with_capacity(BUFFER_SIZE, reader));
    if let Err(e) = source.skip_prelude() {
        return Ok(read_failure(host, &display, &e));
    }
    load_chunk(host, &mut source, &chunkname, &display, mode)
}

/// Push the outcome of a file operation the way library functions report
/// it: `true`, or `nil`, a message and the OS error code.
///
/// Returns the number of values pushed.
pub fn file_result<H: RawApi, T>(host: &mut H, result: &io::Result<T>, fname: Option<&str>) -> i32 {
    match result {
        Ok(_) => {
            host.push_boolean(true);
            1
        }
        Err(e) => {
            host.push_nil();
            let msg = match fname {
                Some(fname) => format!("{}: {}", fname, os_message(e)),
                None => os_message(e),
            };
            host.push_bytes(msg.as_bytes());
            host.push_number(e.raw_os_error().unwrap_or(0) as f64);
            3
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryHost, Value};

    const BINARY_CHUNK: &[u8] = b"\x1bLuaPAYLOAD";

    struct FailingReader {
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
            if !self.served {
                self.served = true;
                out[..6].copy_from_slice(b"return");
                return Ok(6);
            }
            Err(io::Error::new(io::ErrorKind::Other, "device gone"))
        }
    }

    #[test]
    fn test_text_only_rejects_binary() {
        let mut host = MemoryHost::new();
        let status = load_bufferx(&mut host, BINARY_CHUNK, "=chunk", Some("t")).unwrap();
        assert_eq!(status, Status::ErrSyntax);
        assert_eq!(
            host.string_at(-1).as_deref(),
            Some("attempt to load a binary chunk (mode is 't')")
        );
        assert_eq!(host.compile_count(), 0);
    }

    #[test]
    fn test_binary_only_rejects_text() {
        let mut host = MemoryHost::new();
        let status = load_bufferx(&mut host, b"return 1", "=chunk", Some("b")).unwrap();
        assert_eq!(status, Status::ErrSyntax);
        assert_eq!(
            host.string_at(-1).as_deref(),
            Some("attempt to load a text chunk (mode is 'b')")
        );
        assert_eq!(host.compile_count(), 0);

        // an empty chunk is text
        let status = load_bufferx(&mut host, b"", "=chunk", Some("b")).unwrap();
        assert_eq!(status, Status::ErrSyntax);
    }

    #[test]
    fn test_matching_modes_load() {
        for mode in [None, Some(""), Some("bt"), Some("tb")] {
            let mut host = MemoryHost::new();
            assert_eq!(
                load_bufferx(&mut host, BINARY_CHUNK, "=chunk", mode).unwrap(),
                Status::Ok
            );
            assert_eq!(
                load_bufferx(&mut host, b"return 1", "=chunk", mode).unwrap(),
                Status::Ok
            );
            assert_eq!(host.compile_count(), 2);
        }

        let mut host = MemoryHost::new();
        assert_eq!(
            load_bufferx(&mut host, BINARY_CHUNK, "=chunk", Some("b")).unwrap(),
            Status::Ok
        );
        host.call(0, 1).unwrap();
        assert_eq!(host.value(-1), Value::str("PAYLOAD"));
    }

    #[test]
    fn test_invalid_mode_is_argument_error() {
        let mut host = MemoryHost::new();
        let err = load_bufferx(&mut host, b"x", "=chunk", Some("x")).unwrap_err();
        assert_eq!(err.category(), "argument");
        assert_eq!(
            err.to_string(),
            "invalid load mode 'x' (expected 'b', 't' or 'bt')"
        );
        assert_eq!(host.get_top(), 0);
    }

    #[test]
    fn test_host_errors_pass_through() {
        let mut host = MemoryHost::new();
        let status = load_bufferx(&mut host, b"\x1bbad", "=chunk", Some("b")).unwrap();
        assert_eq!(status, Status::ErrSyntax);
        assert_eq!(
            host.string_at(-1).as_deref(),
            Some("chunk: bad header in precompiled chunk")
        );
    }

    #[test]
    fn test_read_error_reported_as_file_error() {
        let mut host = MemoryHost::new();
        let reader = FailingReader { served: false };
        let status = loadx(&mut host, reader, "=device", Some("t")).unwrap();
        assert_eq!(status, Status::ErrFile);
        assert_eq!(host.get_top(), 1);
        assert_eq!(
            host.string_at(-1).as_deref(),
            Some("cannot read device: device gone")
        );
    }

    #[test]
    fn test_skip_prelude() {
        let mut source = ChunkReader::new(&b"\xEF\xBB\xBF#!/usr/bin/lua\nreturn 1"[..]);
        source.skip_prelude().unwrap();
        let mut rest = String::new();
        source.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "\nreturn 1");

        let mut source = ChunkReader::new(&b"#!lua\n\x1bLua"[..]);
        source.skip_prelude().unwrap();
        let mut rest = Vec::new();
        source.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"\x1bLua");

        let mut source = ChunkReader::new(&b"return 2"[..]);
        source.skip_prelude().unwrap();
        let mut rest = Vec::new();
        source.read_to_end(&mut rest).unwrap();
        assert_eq!(rest.first(), Some(&b'r'));
    }

    #[test]
    fn test_file_result() {
        let mut host = MemoryHost::new();
        assert_eq!(file_result(&mut host, &Ok(()), Some("data.txt")), 1);
        assert_eq!(host.value(-1), Value::Boolean(true));
        host.set_top(0);

        let failure: io::Result<()> = Err(io::Error::from_raw_os_error(2));
        assert_eq!(file_result(&mut host, &failure, Some("data.txt")), 3);
        assert!(host.value(1).is_nil());
        let msg = host.string_at(2).unwrap();
        assert!(msg.starts_with("data.txt: "));
        assert!(!msg.contains("os error"));
        assert_eq!(host.number_at(3), Some(2.0));

        host.set_top(0);
        file_result(&mut host, &failure, None);
        assert!(!host.string_at(2).unwrap().starts_with("data.txt"));
    }
}
