//! lcompat core - newer stack API on older host revisions
//!
//! Everything talks to the interpreter through [`RawApi`], the primitive
//! stack interface of the oldest supported revision. [`Compat`] layers the
//! newer revision's functions on top of it for every host.
//!
//! The host revision is chosen at compile time with the `lua51` (default)
//! or `lua52` feature. A 5.2 host supplies the core functions it already
//! has through [`RawApi`]; the 5.1 build fills them in itself. The
//! auxiliary library is filled in on both.

#[cfg(all(feature = "lua51", feature = "lua52"))]
compile_error!("features `lua51` and `lua52` are mutually exclusive");

#[cfg(not(any(feature = "lua51", feature = "lua52")))]
compile_error!("select a host revision with feature `lua51` or `lua52`");

pub mod access;
pub mod buffer;
pub mod compat;
pub mod convert;
pub mod error;
pub mod host;
mod index;
pub mod loader;
pub mod memory;
#[cfg(feature = "lua51")]
pub mod operator;
pub mod registrar;
pub mod rotate;
pub mod traceback;

pub use buffer::{Buffer, BUFFER_SIZE};
pub use compat::Compat;
pub use error::{CompatError, CompatResult};
pub use host::{
    ArithOp, CompareOp, Frame, FrameInfo, FrameKind, NativeFn, RawApi, Status, ValueType,
    ENVIRON_INDEX, GLOBALS_INDEX, MULTRET, REGISTRY_INDEX, SIGNATURE,
};
#[cfg(feature = "lua51")]
pub use index::abs_index;
pub use memory::MemoryHost;

pub use lcompat_config::{Component, HostRevision, LimitConfig, LoadMode};

/// Host revision this build targets
pub fn compiled_revision() -> HostRevision {
    if cfg!(feature = "lua52") {
        HostRevision::Lua52
    } else {
        HostRevision::Lua51
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "lua51")]
    #[test]
    fn test_default_revision() {
        assert_eq!(compiled_revision(), HostRevision::Lua51);
        assert_eq!(compiled_revision().version_num(), 501);
    }
}
