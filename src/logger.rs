//! 日志系统初始化
//!
//! 基于 `tracing` 和 `tracing-subscriber` 实现按组件的日志控制。
//!
//! # 使用示例
//! ```ignore
//! use lcompat::config::{self, Config};
//! use lcompat::logger::init_logger;
//!
//! config::init(Config::default())?;
//! init_logger()?;
//! ```

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Arc;

use lcompat_config::Component;
use thiserror::Error;
use tracing_subscriber::{
    filter::Targets,
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    Layer, Registry,
};

use crate::config;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// 日志输出格式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// 彩色格式化（开发使用）
    #[default]
    Pretty,
    /// 紧凑格式
    Compact,
    /// JSON 格式（工具集成）
    Json,
}

/// 日志初始化错误
#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("cannot open log file: {0}")]
    File(#[from] io::Error),
    #[error("global subscriber already set: {0}")]
    AlreadySet(#[from] TryInitError),
}

/// 初始化日志系统
///
/// 各组件的过滤级别取自 `config::config()`。
pub fn init_logger() -> Result<(), LoggerError> {
    init_with_format(LogFormat::default())
}

/// 使用指定格式初始化日志系统
pub fn init_with_format(format: LogFormat) -> Result<(), LoggerError> {
    init_with_file(format, None::<&str>)
}

/// 使用文件输出初始化日志系统
///
/// # Arguments
/// * `format` - 日志格式
/// * `file` - 日志文件路径（追加写入），None 表示只输出到控制台
pub fn init_with_file<P: AsRef<Path>>(format: LogFormat, file: Option<P>) -> Result<(), LoggerError> {
    let targets = component_targets();

    let mut layers: Vec<BoxedLayer> = vec![create_format_layer(format, io::stdout)
        .with_filter(targets.clone())
        .boxed()];

    if let Some(path) = file {
        let handle = OpenOptions::new().create(true).append(true).open(path)?;
        layers.push(
            create_format_layer(format, Arc::new(handle))
                .with_filter(targets)
                .boxed(),
        );
    }

    tracing_subscriber::registry().with(layers).try_init()?;
    Ok(())
}

/// 构建各组件的目标过滤器
pub fn component_targets() -> Targets {
    let cfg = &config::config().log;
    Component::ALL
        .into_iter()
        .fold(Targets::new().with_default(cfg.global), |targets, component| {
            targets.with_target(component.target(), cfg.level_for(component))
        })
}

/// 根据格式创建 formatter layer
fn create_format_layer<W>(format: LogFormat, make_writer: W) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(true)
            .with_timer(fmt::time::time())
            .with_writer(make_writer)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(false)
            .without_time()
            .with_writer(make_writer)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_timer(fmt::time::time())
            .with_writer(make_writer)
            .boxed(),
    }
}

/// 为当前测试初始化简单日志（仅打印到控制台）
#[cfg(test)]
pub fn init_test_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

/// 检查指定组件的日志是否启用（DEBUG 级别）
#[inline]
pub fn is_enabled(component: Component) -> bool {
    use tracing::Level;
    match component {
        Component::Buffer => tracing::enabled!(target: "lcompat::buffer", Level::DEBUG),
        Component::Rotate => tracing::enabled!(target: "lcompat::rotate", Level::DEBUG),
        Component::Operator => tracing::enabled!(target: "lcompat::operator", Level::DEBUG),
        Component::Traceback => tracing::enabled!(target: "lcompat::traceback", Level::DEBUG),
        Component::Loader => tracing::enabled!(target: "lcompat::loader", Level::DEBUG),
        Component::Registrar => tracing::enabled!(target: "lcompat::registrar", Level::DEBUG),
        Component::Host => tracing::enabled!(target: "lcompat::host", Level::DEBUG),
    }
}
