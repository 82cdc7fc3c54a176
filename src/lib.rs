//! lcompat - newer Lua stack API on older interpreter revisions
//!
//! Extension code written against the newer C API keeps working when it is
//! built against an older host: every missing function is provided by the
//! [`Compat`] extension trait on top of the host's primitive [`RawApi`].
//!
//! # Architecture
//!
//! ```text
//! lcompat-config/  - Pure configuration vocabulary (no logic)
//! lcompat-core/    - The shim and the in-memory reference host
//! src/             - Global config, logging and this facade
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use lcompat::{init, Compat, Config, RawApi};
//!
//! init(Config::default())?;
//! let mut host = lcompat::new_host();
//! host.push_str("a");
//! host.push_str("b");
//! host.rotate(1, 1)?;
//! ```

pub mod config;
pub mod logger;

// 重导出常用类型
pub use config::{Config, ConfigError, LogConfig};
pub use lcompat_core::{
    compiled_revision, ArithOp, Buffer, CompareOp, Compat, CompatError, CompatResult, Frame,
    FrameInfo, FrameKind, MemoryHost, NativeFn, RawApi, Status, ValueType, BUFFER_SIZE,
    ENVIRON_INDEX, GLOBALS_INDEX, MULTRET, REGISTRY_INDEX, SIGNATURE,
};
pub use lcompat_config::{Component, HostRevision, LimitConfig, LoadMode, ModeError};
pub use logger::{init_logger, LogFormat, LoggerError};

/// 初始化全局配置
///
/// 只初始化配置，不初始化日志系统。
pub fn init(config: Config) -> Result<(), ConfigError> {
    config::init(config)
}

/// 初始化配置和日志系统
///
/// # Example
/// ```ignore
/// use lcompat::{init_with_logger, Config, LogFormat};
///
/// init_with_logger(Config::default(), LogFormat::Compact)?;
/// ```
pub fn init_with_logger(config: Config, format: LogFormat) -> Result<(), Box<dyn std::error::Error>> {
    config::init(config)?;
    logger::init_with_format(format)?;
    Ok(())
}

/// 按全局配置的限制创建内存宿主
pub fn new_host() -> MemoryHost {
    MemoryHost::with_limits(config::config().limits.clone())
}
