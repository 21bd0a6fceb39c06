use ctxview_jdwp::JdwpError;
use thiserror::Error;

pub type Result<T, E = SnapshotError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("no paused execution context is available")]
    SessionUnavailable,
    #[error("variable `{name}` not found in the current scope")]
    VariableNotFound { name: String },
    #[error("`{name}` is not an object reference")]
    NotAnObjectReference { name: String },
    #[error("no method {name}{signature} on {type_name}")]
    NoSuchRemoteMethod {
        type_name: String,
        name: String,
        signature: String,
    },
    #[error("remote call {type_name}.{name}{signature} failed: {reason}")]
    RemoteInvocationFailure {
        type_name: String,
        name: String,
        signature: String,
        reason: String,
    },
    #[error("walk exceeded the {limit} limit of {max}")]
    LimitExceeded { limit: &'static str, max: usize },
    #[error("jdwp: {0}")]
    Jdwp(#[from] JdwpError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("selection index {index} is out of range at depth {depth} ({len} children)")]
    OutOfRange {
        depth: usize,
        index: usize,
        len: usize,
    },
    #[error("invalid selection `{0}`: expected dot-separated child indices")]
    InvalidSelection(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        // The default `Display` embeds a source snippet; keep only the message.
        ConfigError::Toml(err.message().to_string())
    }
}
