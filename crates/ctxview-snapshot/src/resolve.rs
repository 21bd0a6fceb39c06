//! Locating the root value of a snapshot in a paused frame.

use ctxview_jdwp::{
    FrameInfo, JdwpClient, JdwpError, JdwpValue, ObjectRef, ThreadId, VariableInfo,
    ERROR_ABSENT_INFORMATION,
};

use crate::classify::TypeClassifier;
use crate::error::{Result, SnapshotError};
use crate::invoker::{pin_temporary, release_temporary, RemoteInvoker};

/// Field chain from a Groovy script's `this` to its variables map.
pub const DEFAULT_BINDING_PATH: [&str; 2] = ["binding", "variables"];
pub const DEFAULT_BINDING_KEY: &str = "_context";

/// A frame on a thread suspended by an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PausedFrame {
    pub thread: ThreadId,
    pub frame: FrameInfo,
}

impl PausedFrame {
    pub fn new(thread: ThreadId, frame: FrameInfo) -> Self {
        Self { thread, frame }
    }

    /// The `index`th frame (0 = innermost) of `thread`.
    ///
    /// A thread that is running, or has fewer frames, has no paused context.
    pub fn locate<C: JdwpClient + ?Sized>(
        client: &mut C,
        thread: ThreadId,
        index: usize,
    ) -> Result<Self> {
        let frames = match client.frames(thread) {
            Ok(frames) => frames,
            Err(JdwpError::CommandFailed { error_code }) => {
                tracing::debug!(
                    target: "ctxview.walk",
                    thread,
                    error_code,
                    "thread has no readable frames"
                );
                return Err(SnapshotError::SessionUnavailable);
            }
            Err(err) => return Err(err.into()),
        };
        frames
            .get(index)
            .map(|frame| Self::new(thread, *frame))
            .ok_or(SnapshotError::SessionUnavailable)
    }
}

/// Where the root value of a snapshot comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RootSource {
    /// A local variable visible at the frame's current location. `this`
    /// names the receiver of an instance method.
    Local { name: String },
    /// An entry of a variables map reached from `this` through instance
    /// fields, looked up with a remote `Map.get`.
    Binding {
        holder_path: Vec<String>,
        key: String,
    },
}

impl RootSource {
    pub fn local(name: impl Into<String>) -> Self {
        RootSource::Local { name: name.into() }
    }

    /// A Groovy `Binding` variable (`this.binding.variables.get(key)`).
    pub fn binding(key: impl Into<String>) -> Self {
        RootSource::Binding {
            holder_path: DEFAULT_BINDING_PATH.iter().map(|s| s.to_string()).collect(),
            key: key.into(),
        }
    }

    /// Name the snapshot is shown under.
    pub fn label(&self) -> &str {
        match self {
            RootSource::Local { name } => name,
            RootSource::Binding { key, .. } => key,
        }
    }

    pub fn resolve<C: JdwpClient + ?Sized>(
        &self,
        client: &mut C,
        paused: &PausedFrame,
        invoker: &mut RemoteInvoker,
    ) -> Result<JdwpValue> {
        match self {
            RootSource::Local { name } => resolve_local(client, paused, name),
            RootSource::Binding { holder_path, key } => {
                resolve_binding(client, paused, invoker, holder_path, key)
            }
        }
    }
}

fn resolve_local<C: JdwpClient + ?Sized>(
    client: &mut C,
    paused: &PausedFrame,
    name: &str,
) -> Result<JdwpValue> {
    if name == "this" {
        return match client.this_object(paused.thread, paused.frame.id)? {
            Some(this) => Ok(JdwpValue::Object(this)),
            None => Err(SnapshotError::VariableNotFound {
                name: name.to_string(),
            }),
        };
    }

    let location = paused.frame.location;
    let table = match client.variable_table(location.type_id, location.method_id) {
        Ok(table) => table,
        // Compiled without `-g`: no local is resolvable by name.
        Err(JdwpError::CommandFailed {
            error_code: ERROR_ABSENT_INFORMATION,
        }) => Vec::new(),
        Err(err) => return Err(err.into()),
    };

    let variable = visible_variable(&table, name, location.index).ok_or_else(|| {
        SnapshotError::VariableNotFound {
            name: name.to_string(),
        }
    })?;

    let mut values = client.frame_values(
        paused.thread,
        paused.frame.id,
        &[(variable.slot, variable.signature.clone())],
    )?;
    values.pop().ok_or_else(|| {
        JdwpError::Protocol(format!("no value returned for local `{name}`")).into()
    })
}

/// The variable named `name` live at `index`; the innermost scope wins when
/// several are.
fn visible_variable<'t>(
    table: &'t [VariableInfo],
    name: &str,
    index: i64,
) -> Option<&'t VariableInfo> {
    table
        .iter()
        .filter(|var| var.name == name && var.is_live_at(index))
        .max_by_key(|var| var.code_index)
}

fn resolve_binding<C: JdwpClient + ?Sized>(
    client: &mut C,
    paused: &PausedFrame,
    invoker: &mut RemoteInvoker,
    holder_path: &[String],
    key: &str,
) -> Result<JdwpValue> {
    let mut holder = client
        .this_object(paused.thread, paused.frame.id)?
        .ok_or_else(|| SnapshotError::VariableNotFound {
            name: "this".to_string(),
        })?;

    let mut classifier = TypeClassifier::new();
    for field_name in holder_path {
        holder = instance_field(client, &mut classifier, holder, field_name)?;
    }

    let key_ref = client.create_string(key)?;
    tracing::debug!(
        target: "ctxview.walk",
        holder = holder.id,
        key,
        "looking up binding variable"
    );
    // The created key is unreachable from the target until `get` holds it.
    let pinned = pin_temporary(client, key_ref);
    let value = invoker.invoke(
        client,
        holder,
        "get",
        "(Ljava/lang/Object;)Ljava/lang/Object;",
        &[JdwpValue::Object(key_ref)],
    );
    if pinned {
        release_temporary(client, key_ref);
    }
    value
}

/// Read instance field `name` of `object`; the value must be an object.
fn instance_field<C: JdwpClient + ?Sized>(
    client: &mut C,
    classifier: &mut TypeClassifier,
    object: ObjectRef,
    name: &str,
) -> Result<ObjectRef> {
    let ty = client.object_type(object.id)?;
    let field = classifier
        .instance_fields(client, &ty)?
        .into_iter()
        .find(|field| field.name == name)
        .ok_or_else(|| SnapshotError::VariableNotFound {
            name: name.to_string(),
        })?;

    let value = client
        .field_values(object.id, &[field.id])?
        .pop()
        .unwrap_or(JdwpValue::Null);
    value.object().ok_or_else(|| SnapshotError::NotAnObjectReference {
        name: name.to_string(),
    })
}
