//! Snapshots of paused JVM variables.
//!
//! A [`RootSource`] names the variable, [`snapshot`] resolves it in a
//! [`PausedFrame`] and walks everything reachable from it into a
//! [`TreeNode`] that no longer refers to the target VM. The
//! [`materialize`] module turns that tree into JSON, a display tree, dotted
//! paths or Groovy class definitions.

mod classify;
mod config;
mod error;
mod invoker;
mod logging;
pub mod materialize;
mod resolve;
mod snapshot;
mod tree;
mod walker;

pub use classify::{
    classify, unbox_spec, Abstraction, PrimitiveKind, Shape, TypeClassifier, UnboxSpec,
    ValueClass, UNBOX,
};
pub use config::{
    ConnectionConfig, CtxviewConfig, LimitsConfig, SnapshotConfig, CONFIG_ENV_VAR,
};
pub use error::{ConfigError, PathError, Result, SnapshotError};
pub use invoker::RemoteInvoker;
pub use logging::{init_tracing, LoggingConfig};
pub use resolve::{PausedFrame, RootSource, DEFAULT_BINDING_KEY, DEFAULT_BINDING_PATH};
pub use snapshot::{snapshot, try_snapshot, Snapshot, SnapshotOptions};
pub use tree::{NodeKind, NodeValue, Scalar, TreeNode};
pub use walker::{AncestorPath, GraphWalker, WalkLimits};
