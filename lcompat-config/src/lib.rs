//! lcompat Config - Pure configuration data structures
//!
//! This crate contains only data structures, no logic or global state.
//! It serves as the shared configuration vocabulary across all lcompat crates.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Host revision the shim is compiled against
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HostRevision {
    #[serde(rename = "5.1")]
    Lua51,
    #[serde(rename = "5.2")]
    Lua52,
}

impl HostRevision {
    /// Numeric version as reported by the host (`LUA_VERSION_NUM`)
    pub fn version_num(&self) -> u32 {
        match self {
            HostRevision::Lua51 => 501,
            HostRevision::Lua52 => 502,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HostRevision::Lua51 => "5.1",
            HostRevision::Lua52 => "5.2",
        }
    }
}

impl fmt::Display for HostRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for host limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitConfig {
    /// Maximum number of value slots on one stack
    pub max_stack_size: usize,
    /// Maximum nesting of native calls
    pub max_call_depth: usize,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            max_stack_size: 1024,
            max_call_depth: 200,
        }
    }
}

/// Shim component, used to derive log targets
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Component {
    Buffer,
    Rotate,
    Operator,
    Traceback,
    Loader,
    Registrar,
    Host,
}

impl Component {
    pub const ALL: [Component; 7] = [
        Component::Buffer,
        Component::Rotate,
        Component::Operator,
        Component::Traceback,
        Component::Loader,
        Component::Registrar,
        Component::Host,
    ];

    /// Get the string name of the component
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Buffer => "buffer",
            Component::Rotate => "rotate",
            Component::Operator => "operator",
            Component::Traceback => "traceback",
            Component::Loader => "loader",
            Component::Registrar => "registrar",
            Component::Host => "host",
        }
    }

    /// Get the log target name for this component
    pub fn target(&self) -> String {
        format!("lcompat::{}", self.as_str())
    }

    /// Look a component up by its short name
    pub fn from_name(name: &str) -> Option<Component> {
        Component::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

/// Error returned for a malformed chunk-loading mode string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid load mode '{mode}' (expected 'b', 't' or 'bt')")]
pub struct ModeError {
    pub mode: String,
}

/// Which chunk kinds a loader accepts
///
/// The empty string selects the default, which accepts both binary and text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LoadMode {
    pub binary: bool,
    pub text: bool,
}

impl LoadMode {
    pub const BINARY: LoadMode = LoadMode { binary: true, text: false };
    pub const TEXT: LoadMode = LoadMode { binary: false, text: true };
    pub const BOTH: LoadMode = LoadMode { binary: true, text: true };

    /// Parse a mode string made of the characters `b` and `t`.
    pub fn parse(mode: &str) -> Result<LoadMode, ModeError> {
        if mode.is_empty() {
            return Ok(LoadMode::BOTH);
        }
        let mut parsed = LoadMode { binary: false, text: false };
        for c in mode.chars() {
            match c {
                'b' => parsed.binary = true,
                't' => parsed.text = true,
                _ => {
                    return Err(ModeError {
                        mode: mode.to_string(),
                    })
                }
            }
        }
        Ok(parsed)
    }

    pub fn is_unrestricted(&self) -> bool {
        self.binary && self.text
    }

    pub fn as_str(&self) -> &'static str {
        match (self.binary, self.text) {
            (true, true) => "bt",
            (true, false) => "b",
            (false, true) => "t",
            (false, false) => "",
        }
    }
}

impl Default for LoadMode {
    fn default() -> Self {
        LoadMode::BOTH
    }
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for LoadMode {
    type Error = ModeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        LoadMode::parse(&value)
    }
}

impl From<LoadMode> for String {
    fn from(mode: LoadMode) -> Self {
        mode.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limit_config() {
        let cfg = LimitConfig::default();
        assert_eq!(cfg.max_stack_size, 1024);
        assert_eq!(cfg.max_call_depth, 200);
    }

    #[test]
    fn test_component_target() {
        assert_eq!(Component::Buffer.as_str(), "buffer");
        assert_eq!(Component::Traceback.target(), "lcompat::traceback");
        assert_eq!(Component::from_name("loader"), Some(Component::Loader));
        assert_eq!(Component::from_name("lexer"), None);
        assert_eq!(Component::from_name("index"), None);
    }

    #[test]
    fn test_load_mode_parse() {
        assert_eq!(LoadMode::parse("").unwrap(), LoadMode::BOTH);
        assert_eq!(LoadMode::parse("b").unwrap(), LoadMode::BINARY);
        assert_eq!(LoadMode::parse("t").unwrap(), LoadMode::TEXT);
        assert_eq!(LoadMode::parse("tb").unwrap(), LoadMode::BOTH);
        assert!(LoadMode::parse("x").is_err());
        assert!(LoadMode::parse("bx").is_err());
    }

    #[test]
    fn test_load_mode_error_message() {
        let err = LoadMode::parse("rw").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid load mode 'rw' (expected 'b', 't' or 'bt')"
        );
    }

    #[test]
    fn test_serde_forms() {
        let mode: LoadMode = serde_json::from_str("\"t\"").unwrap();
        assert_eq!(mode, LoadMode::TEXT);
        assert!(serde_json::from_str::<LoadMode>("\"q\"").is_err());

        let rev: HostRevision = serde_json::from_str("\"5.2\"").unwrap();
        assert_eq!(rev, HostRevision::Lua52);
        assert_eq!(rev.version_num(), 502);

        let limits: LimitConfig = serde_json::from_str("{\"max_stack_size\": 64}").unwrap();
        assert_eq!(limits.max_stack_size, 64);
        assert_eq!(limits.max_call_depth, 200);
    }
}
