//! Java Debug Wire Protocol (JDWP) access layer for ctxview.
//!
//! `ctxview-snapshot` walks remote object graphs through the [`JdwpClient`]
//! trait. Two implementations live here:
//!
//! - [`TcpJdwpClient`], a blocking client speaking JDWP to a real JVM;
//! - [`MockJdwpClient`], a deterministic in-memory VM with JDK-like types and
//!   intrinsic method bodies, used by tests.
//!
//! The trait is deliberately raw: it mirrors individual JDWP commands and
//! leaves method lookup, type classification and graph traversal to callers.

mod mock;
mod tcp;

use std::hash::{Hash, Hasher};
use std::io;

use thiserror::Error;

pub use mock::{InvocationRecord, MockJdwpClient, MockMethodBody};
pub use tcp::{BreakpointHit, TcpJdwpClient};

pub mod wire;

pub type ThreadId = u64;
pub type FrameId = u64;
pub type ObjectId = u64;
pub type ReferenceTypeId = u64;
pub type FieldId = u64;
pub type MethodId = u64;

/// JDWP packet header: length (4), id (4), flags (1), command set + command or error code (2).
pub const JDWP_HEADER_LEN: usize = 11;

/// Upper bound for a single JDWP packet accepted from the peer.
pub const MAX_JDWP_PACKET_BYTES: usize = 16 * 1024 * 1024;

/// `InvokeOptions.INVOKE_SINGLE_THREADED`: only the invoking thread is resumed.
pub const INVOKE_SINGLE_THREADED: u32 = 0x01;

pub const FIELD_MODIFIER_STATIC: u32 = 0x0008;

pub const ERROR_THREAD_NOT_SUSPENDED: u16 = 13;
pub const ERROR_INVALID_OBJECT: u16 = 20;
pub const ERROR_ABSENT_INFORMATION: u16 = 101;
pub const ERROR_NOT_IMPLEMENTED: u16 = 99;

/// Validate a JDWP length prefix before any allocation happens.
pub fn validate_jdwp_packet_length(length: usize) -> Result<(), String> {
    if length < JDWP_HEADER_LEN {
        return Err(format!("invalid packet length {length}"));
    }
    if length > MAX_JDWP_PACKET_BYTES {
        return Err(format!(
            "JDWP packet length {length} exceeds maximum allowed ({MAX_JDWP_PACKET_BYTES} bytes); refusing to allocate"
        ));
    }
    Ok(())
}

/// JDWP value tags (`JDWP.Tag`).
pub mod tag {
    pub const ARRAY: u8 = b'[';
    pub const BYTE: u8 = b'B';
    pub const CHAR: u8 = b'C';
    pub const OBJECT: u8 = b'L';
    pub const FLOAT: u8 = b'F';
    pub const DOUBLE: u8 = b'D';
    pub const INT: u8 = b'I';
    pub const LONG: u8 = b'J';
    pub const SHORT: u8 = b'S';
    pub const VOID: u8 = b'V';
    pub const BOOLEAN: u8 = b'Z';
    pub const STRING: u8 = b's';
    pub const THREAD: u8 = b't';
    pub const THREAD_GROUP: u8 = b'g';
    pub const CLASS_LOADER: u8 = b'l';
    pub const CLASS_OBJECT: u8 = b'c';

    /// Whether values with this tag are transmitted as object ids.
    pub fn is_object(tag: u8) -> bool {
        matches!(
            tag,
            ARRAY | OBJECT | STRING | THREAD | THREAD_GROUP | CLASS_LOADER | CLASS_OBJECT
        )
    }
}

/// Handle to an object living in the target VM.
///
/// Identity is the object id alone; the tag is transport metadata.
#[derive(Clone, Copy, Debug)]
pub struct ObjectRef {
    pub id: ObjectId,
    pub tag: u8,
}

impl ObjectRef {
    pub fn new(id: ObjectId, tag: u8) -> Self {
        Self { id, tag }
    }

    pub fn is_string(&self) -> bool {
        self.tag == tag::STRING
    }

    pub fn is_array(&self) -> bool {
        self.tag == tag::ARRAY
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum JdwpValue {
    Null,
    Void,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// A UTF-16 code unit, as the JVM stores `char`.
    Char(u16),
    Object(ObjectRef),
}

impl JdwpValue {
    pub fn object(&self) -> Option<ObjectRef> {
        match self {
            Self::Object(obj) => Some(*obj),
            _ => None,
        }
    }

    pub fn object_id(&self) -> Option<ObjectId> {
        self.object().map(|obj| obj.id)
    }

    /// The JDWP tag this value is transmitted with.
    ///
    /// `null` travels as an object id of zero tagged `L`.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Null => tag::OBJECT,
            Self::Void => tag::VOID,
            Self::Boolean(_) => tag::BOOLEAN,
            Self::Byte(_) => tag::BYTE,
            Self::Short(_) => tag::SHORT,
            Self::Int(_) => tag::INT,
            Self::Long(_) => tag::LONG,
            Self::Float(_) => tag::FLOAT,
            Self::Double(_) => tag::DOUBLE,
            Self::Char(_) => tag::CHAR,
            Self::Object(obj) => obj.tag,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Class,
    Interface,
    Array,
}

impl TypeKind {
    /// `JDWP.TypeTag` value.
    pub fn type_tag(self) -> u8 {
        match self {
            TypeKind::Class => 1,
            TypeKind::Interface => 2,
            TypeKind::Array => 3,
        }
    }

    pub fn from_type_tag(tag: u8) -> Result<Self, JdwpError> {
        match tag {
            1 => Ok(TypeKind::Class),
            2 => Ok(TypeKind::Interface),
            3 => Ok(TypeKind::Array),
            other => Err(JdwpError::Protocol(format!("unknown type tag {other}"))),
        }
    }
}

/// A loaded reference type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeInfo {
    pub id: ReferenceTypeId,
    pub kind: TypeKind,
    /// Java source name, e.g. `java.util.HashMap` or `int[]`.
    pub name: String,
}

impl TypeInfo {
    pub fn is_array(&self) -> bool {
        self.kind == TypeKind::Array
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldInfo {
    pub id: FieldId,
    pub name: String,
    pub signature: String,
    pub mod_bits: u32,
}

impl FieldInfo {
    pub fn is_static(&self) -> bool {
        self.mod_bits & FIELD_MODIFIER_STATIC != 0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodInfo {
    pub id: MethodId,
    pub name: String,
    pub signature: String,
    pub mod_bits: u32,
}

/// One entry of `Method.VariableTable`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariableInfo {
    pub code_index: i64,
    pub name: String,
    pub signature: String,
    pub length: i64,
    pub slot: u32,
}

impl VariableInfo {
    pub fn is_live_at(&self, index: i64) -> bool {
        let Some(end) = self.code_index.checked_add(self.length) else {
            return false;
        };
        self.code_index <= index && index < end
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub name: String,
    pub suspended: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location {
    pub type_id: ReferenceTypeId,
    pub method_id: MethodId,
    pub index: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameInfo {
    pub id: FrameId,
    pub location: Location,
}

/// Outcome of `ObjectReference.InvokeMethod`.
#[derive(Clone, Debug, PartialEq)]
pub struct InvokeResult {
    pub value: JdwpValue,
    /// The exception thrown by the invoked method, if any.
    pub exception: Option<ObjectRef>,
}

#[derive(Debug, Error)]
pub enum JdwpError {
    #[error("JDWP client is not connected")]
    NotConnected,
    #[error("JDWP operation not implemented")]
    NotImplemented,
    #[error("JDWP protocol error: {0}")]
    Protocol(String),
    #[error("JDWP command failed with error code {error_code}")]
    CommandFailed { error_code: u16 },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("JDWP handshake failed")]
    HandshakeFailed,
    #[error("JDWP string was not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    #[error("invalid object id {0}")]
    InvalidObjectId(ObjectId),
    #[error("timed out waiting for a JDWP event")]
    Timeout,
    #[error("{0}")]
    Other(String),
}

/// Blocking, request/response access to a paused JVM.
///
/// Every call is one (or a few cached) JDWP round trips. Implementations take
/// `&mut self`, so a single client can never issue two commands at once.
pub trait JdwpClient: Send {
    /// `VirtualMachine.AllThreads` plus name and suspension state per thread.
    fn threads(&mut self) -> Result<Vec<ThreadInfo>, JdwpError>;

    /// `ThreadReference.Frames`, innermost frame first.
    fn frames(&mut self, thread: ThreadId) -> Result<Vec<FrameInfo>, JdwpError>;

    /// `StackFrame.ThisObject`; `None` in static methods.
    fn this_object(
        &mut self,
        thread: ThreadId,
        frame: FrameId,
    ) -> Result<Option<ObjectRef>, JdwpError>;

    /// `Method.VariableTable`.
    fn variable_table(
        &mut self,
        type_id: ReferenceTypeId,
        method_id: MethodId,
    ) -> Result<Vec<VariableInfo>, JdwpError>;

    /// `StackFrame.GetValues` for `(slot, signature)` pairs.
    fn frame_values(
        &mut self,
        thread: ThreadId,
        frame: FrameId,
        slots: &[(u32, String)],
    ) -> Result<Vec<JdwpValue>, JdwpError>;

    /// Runtime type of an object (`ObjectReference.ReferenceType` + `Signature`).
    fn object_type(&mut self, object: ObjectId) -> Result<TypeInfo, JdwpError>;

    /// `ClassObjectReference.ReflectedType`: the type a `java.lang.Class`
    /// instance stands for.
    fn reflected_type(&mut self, class_object: ObjectId) -> Result<TypeInfo, JdwpError>;

    /// `VirtualMachine.ClassesBySignature` for a Java source name.
    fn classes_by_name(&mut self, name: &str) -> Result<Vec<TypeInfo>, JdwpError>;

    /// `ClassType.Superclass`; `None` for `java.lang.Object` and interfaces.
    fn superclass(&mut self, class: ReferenceTypeId) -> Result<Option<TypeInfo>, JdwpError>;

    /// `ReferenceType.Interfaces`: directly implemented or extended interfaces.
    fn interfaces(&mut self, type_id: ReferenceTypeId) -> Result<Vec<TypeInfo>, JdwpError>;

    /// `ReferenceType.Fields` in declaration order, statics included.
    fn declared_fields(&mut self, type_id: ReferenceTypeId) -> Result<Vec<FieldInfo>, JdwpError>;

    /// `ReferenceType.Methods` in declaration order.
    fn declared_methods(&mut self, type_id: ReferenceTypeId)
        -> Result<Vec<MethodInfo>, JdwpError>;

    /// `ObjectReference.GetValues`.
    fn field_values(
        &mut self,
        object: ObjectId,
        fields: &[FieldId],
    ) -> Result<Vec<JdwpValue>, JdwpError>;

    /// `StringReference.Value`.
    fn string_value(&mut self, object: ObjectId) -> Result<String, JdwpError>;

    /// All elements of an array (`ArrayReference.Length` + `GetValues`).
    fn array_values(&mut self, array: ObjectId) -> Result<Vec<JdwpValue>, JdwpError>;

    /// `ObjectReference.InvokeMethod` with [`INVOKE_SINGLE_THREADED`].
    ///
    /// `thread` must have been suspended by an event.
    fn invoke_method(
        &mut self,
        object: ObjectId,
        thread: ThreadId,
        class: ReferenceTypeId,
        method: MethodId,
        args: &[JdwpValue],
    ) -> Result<InvokeResult, JdwpError>;

    /// `VirtualMachine.CreateString`.
    fn create_string(&mut self, value: &str) -> Result<ObjectRef, JdwpError>;

    /// `ObjectReference.DisableCollection`.
    ///
    /// Not reference counted: one [`JdwpClient::enable_collection`] undoes any
    /// number of disables, so only pin objects nobody else holds.
    fn disable_collection(&mut self, object: ObjectId) -> Result<(), JdwpError>;

    /// `ObjectReference.EnableCollection`.
    fn enable_collection(&mut self, object: ObjectId) -> Result<(), JdwpError>;
}

/// Convert a Java source name (`com.example.Foo`, `int[]`) into a JDWP signature.
pub fn class_name_to_signature(class: &str) -> String {
    let mut name = class;
    let mut dims = 0usize;
    while let Some(rest) = name.strip_suffix("[]") {
        dims += 1;
        name = rest;
    }

    let base = match name {
        "boolean" => "Z".to_string(),
        "byte" => "B".to_string(),
        "char" => "C".to_string(),
        "short" => "S".to_string(),
        "int" => "I".to_string(),
        "long" => "J".to_string(),
        "float" => "F".to_string(),
        "double" => "D".to_string(),
        "void" => "V".to_string(),
        class => format!("L{};", class.replace('.', "/")),
    };
    format!("{}{base}", "[".repeat(dims))
}

/// Convert a JDWP signature (`Ljava/util/List;`, `[I`) into a Java source name.
pub fn signature_to_type_name(signature: &str) -> String {
    let mut sig = signature;
    let mut dims = 0usize;
    while let Some(rest) = sig.strip_prefix('[') {
        dims += 1;
        sig = rest;
    }

    let base = if let Some(class) = sig.strip_prefix('L').and_then(|s| s.strip_suffix(';')) {
        class.replace('/', ".")
    } else {
        match sig.as_bytes().first().copied() {
            Some(b'B') => "byte".to_string(),
            Some(b'C') => "char".to_string(),
            Some(b'D') => "double".to_string(),
            Some(b'F') => "float".to_string(),
            Some(b'I') => "int".to_string(),
            Some(b'J') => "long".to_string(),
            Some(b'S') => "short".to_string(),
            Some(b'Z') => "boolean".to_string(),
            Some(b'V') => "void".to_string(),
            _ => "<unknown>".to_string(),
        }
    };

    let mut out = base;
    for _ in 0..dims {
        out.push_str("[]");
    }
    out
}

/// First byte of a signature, which doubles as its JDWP value tag.
pub fn signature_to_tag(signature: &str) -> u8 {
    signature.as_bytes().first().copied().unwrap_or(tag::VOID)
}
