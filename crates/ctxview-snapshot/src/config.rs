use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::logging::LoggingConfig;
use crate::materialize::SchemaOptions;
use crate::resolve::{DEFAULT_BINDING_KEY, DEFAULT_BINDING_PATH};
use crate::walker::WalkLimits;

/// Environment variable naming a config file when none is given explicitly.
pub const CONFIG_ENV_VAR: &str = "CTXVIEW_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CtxviewConfig {
    pub logging: LoggingConfig,
    pub connection: ConnectionConfig,
    pub snapshot: SnapshotConfig,
    pub limits: LimitsConfig,
    pub schema: SchemaOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Per-reply timeout for JDWP commands.
    pub timeout_ms: u64,
    /// How long `--break` waits for the breakpoint to be hit.
    pub breakpoint_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5005,
            timeout_ms: 3_000,
            breakpoint_timeout_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SnapshotConfig {
    /// Instance fields leading from a script's `this` to its variables map.
    pub binding_path: Vec<String>,
    /// Variable looked up when `--binding` is given without a key.
    pub binding_key: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            binding_path: DEFAULT_BINDING_PATH.iter().map(|s| s.to_string()).collect(),
            binding_key: DEFAULT_BINDING_KEY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    pub max_depth: Option<usize>,
    pub max_nodes: Option<usize>,
}

impl From<LimitsConfig> for WalkLimits {
    fn from(limits: LimitsConfig) -> Self {
        WalkLimits {
            max_depth: limits.max_depth,
            max_nodes: limits.max_nodes,
        }
    }
}

impl CtxviewConfig {
    /// Load a config file from TOML.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// The file to load: `explicit` if given, else `$CTXVIEW_CONFIG` if set.
    pub fn discover(explicit: Option<&Path>) -> Option<PathBuf> {
        explicit.map(Path::to_path_buf).or_else(|| {
            std::env::var_os(CONFIG_ENV_VAR)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        })
    }
}
