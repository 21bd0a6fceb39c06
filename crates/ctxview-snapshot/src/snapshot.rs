use ctxview_jdwp::JdwpClient;

use crate::error::{Result, SnapshotError};
use crate::invoker::RemoteInvoker;
use crate::resolve::{PausedFrame, RootSource};
use crate::tree::{NodeValue, TreeNode};
use crate::walker::{GraphWalker, WalkLimits};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SnapshotOptions {
    pub limits: WalkLimits,
}

/// A handle-free copy of one variable, safe to keep after the VM resumes.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub label: String,
    pub root: TreeNode,
}

impl Snapshot {
    /// Whether the walk failed and `root` holds the failure message instead.
    pub fn is_diagnostic(&self) -> bool {
        matches!(self.root.value, NodeValue::Diagnostic(_))
    }
}

/// Resolve `source` in `paused` and walk it, reporting failure as the error.
pub fn try_snapshot<C: JdwpClient + ?Sized>(
    client: &mut C,
    paused: Option<&PausedFrame>,
    source: &RootSource,
    options: &SnapshotOptions,
) -> Result<Snapshot> {
    let paused = paused.ok_or(SnapshotError::SessionUnavailable)?;
    let label = source.label().to_string();
    let span = tracing::debug_span!(
        target: "ctxview.walk",
        "snapshot",
        variable = %label,
        thread = paused.thread,
        frame = paused.frame.id
    );
    let _guard = span.enter();

    let mut invoker = RemoteInvoker::new(paused.thread);
    let root_value = source.resolve(client, paused, &mut invoker)?;

    let mut walker = GraphWalker::with_invoker(client, invoker).with_limits(options.limits);
    let root = walker.walk(&root_value)?.with_label(label.clone());
    tracing::debug!(target: "ctxview.walk", nodes = walker.nodes(), "snapshot complete");

    Ok(Snapshot { label, root })
}

/// Like [`try_snapshot`], but a failure becomes a single diagnostic leaf.
pub fn snapshot<C: JdwpClient + ?Sized>(
    client: &mut C,
    paused: Option<&PausedFrame>,
    source: &RootSource,
    options: &SnapshotOptions,
) -> Snapshot {
    match try_snapshot(client, paused, source, options) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            let label = source.label().to_string();
            tracing::warn!(
                target: "ctxview.walk",
                variable = %label,
                error = %err,
                "snapshot failed"
            );
            let message = format!("failed to snapshot `{label}`: {err}");
            Snapshot {
                root: TreeNode::labeled(label.clone(), NodeValue::Diagnostic(message)),
                label,
            }
        }
    }
}
