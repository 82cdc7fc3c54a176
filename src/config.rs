//! 全局配置系统
//!
//! 提供线程安全的全局配置单例，包含各组件的日志级别和宿主限制。
//!
//! # 使用示例
//! ```
//! use lcompat::config::{self, Config, LogConfig};
//! use lcompat::Component;
//! use tracing::Level;
//!
//! let cfg = Config {
//!     log: LogConfig::default().with_component(Component::Loader, Level::DEBUG),
//!     ..Default::default()
//! };
//!
//! config::init(cfg).unwrap();
//! assert_eq!(config::config().log.level_for(Component::Loader), Level::DEBUG);
//! ```

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use lcompat_config::{Component, LimitConfig};
use once_cell::sync::OnceCell;
use serde::Deserialize;
use thiserror::Error;
use tracing::Level;

static GLOBAL_CONFIG: OnceCell<Config> = OnceCell::new();

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config already initialized")]
    AlreadyInitialized,
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown log level '{0}'")]
    UnknownLevel(String),
    #[error("unknown log component '{0}'")]
    UnknownComponent(String),
}

/// 初始化全局配置（只能调用一次）
pub fn init(config: Config) -> Result<(), ConfigError> {
    GLOBAL_CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)
}

/// 获取全局配置引用
///
/// 未初始化时固定为默认配置。
pub fn config() -> &'static Config {
    GLOBAL_CONFIG.get_or_init(Config::default)
}

/// 检查配置是否已初始化
pub fn is_initialized() -> bool {
    GLOBAL_CONFIG.get().is_some()
}

/// 全局配置结构
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// 日志配置
    pub log: LogConfig,
    /// 宿主限制配置
    pub limits: LimitConfig,
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 全局默认日志级别
    pub global: Level,
    /// 各组件的日志级别（缺省使用 global）
    pub components: HashMap<Component, Level>,
}

impl LogConfig {
    /// 获取指定组件的实际日志级别
    pub fn level_for(&self, component: Component) -> Level {
        self.components
            .get(&component)
            .copied()
            .unwrap_or(self.global)
    }

    pub fn with_component(mut self, component: Component, level: Level) -> Self {
        self.components.insert(component, level);
        self
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            global: Level::INFO,
            components: HashMap::new(),
        }
    }
}

/// JSON 形式的配置
///
/// ```json
/// {
///   "log": { "global": "warn", "components": { "loader": "debug" } },
///   "limits": { "max_stack_size": 512 }
/// }
/// ```
#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    log: LogSection,
    limits: LimitConfig,
}

#[derive(Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LogSection {
    global: String,
    components: BTreeMap<String, String>,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            global: "info".to_string(),
            components: BTreeMap::new(),
        }
    }
}

fn parse_level(name: &str) -> Result<Level, ConfigError> {
    Level::from_str(name).map_err(|_| ConfigError::UnknownLevel(name.to_string()))
}

impl Config {
    /// 从 JSON 文本解析配置，缺省字段使用默认值
    pub fn from_json(text: &str) -> Result<Config, ConfigError> {
        let file: ConfigFile = serde_json::from_str(text)?;

        let mut log = LogConfig {
            global: parse_level(&file.log.global)?,
            components: HashMap::new(),
        };
        for (name, level) in &file.log.components {
            let component = Component::from_name(name)
                .ok_or_else(|| ConfigError::UnknownComponent(name.clone()))?;
            log.components.insert(component, parse_level(level)?);
        }

        Ok(Config {
            log,
            limits: file.limits,
        })
    }
}
