use std::collections::{HashMap, HashSet, VecDeque};

use crate::{
    class_name_to_signature, tag, FieldId, FieldInfo, FrameId,
    FrameInfo, InvokeResult, JdwpClient, JdwpError, JdwpValue, Location, MethodId, MethodInfo,
    ObjectId, ObjectRef, ReferenceTypeId, ThreadId, ThreadInfo, TypeInfo, TypeKind,
    VariableInfo, ERROR_ABSENT_INFORMATION, ERROR_THREAD_NOT_SUSPENDED,
};

const ERROR_INVALID_THREAD: u16 = 10;
const ERROR_INVALID_METHODID: u16 = 23;
const ERROR_INVALID_SLOT: u16 = 35;

const FIELD_MODIFIER_PRIVATE_FINAL: u32 = 0x0012;

const OBJECT_CLASS: &str = "java.lang.Object";
const FRAME_CODE_INDEX: i64 = 10;
const FRAME_SCOPE_LENGTH: i64 = 100;

/// Behaviour of a mock method when invoked through [`JdwpClient::invoke_method`].
#[derive(Clone, Debug, PartialEq)]
pub enum MockMethodBody {
    /// No body; virtual dispatch keeps looking in the receiver's type.
    Abstract,
    /// Returns the primitive held by a boxed wrapper.
    Unbox,
    /// `iterator()`: a fresh iterator object of the given class over the receiver's elements.
    Iterator { iterator_class: String },
    /// `entrySet()`: a fresh set object of the given class holding the receiver's entries.
    EntrySet { set_class: String },
    HasNext,
    /// Next iterator element; throws `java.util.NoSuchElementException` when exhausted.
    Next,
    EntryKey,
    EntryValue,
    /// `get(Object)`: string keys compare by content, everything else by identity.
    MapGet,
    /// Throws a new instance of the named exception class.
    Throw(String),
    Return(JdwpValue),
}

/// One call observed by [`MockJdwpClient::invoke_method`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvocationRecord {
    pub object: ObjectId,
    pub thread: ThreadId,
    /// Runtime type of the receiver.
    pub receiver_type: String,
    pub method: String,
    pub signature: String,
}

#[derive(Clone, Debug)]
struct MockMethod {
    info: MethodInfo,
    body: MockMethodBody,
    variables: Vec<VariableInfo>,
    lines: Vec<(i64, u32)>,
}

#[derive(Clone, Debug)]
struct MockType {
    info: TypeInfo,
    superclass: Option<ReferenceTypeId>,
    interfaces: Vec<ReferenceTypeId>,
    fields: Vec<FieldInfo>,
    methods: Vec<MockMethod>,
}

#[derive(Clone, Debug)]
enum Payload {
    Plain,
    String(String),
    Array(Vec<JdwpValue>),
    Boxed(JdwpValue),
    /// Collections and entry sets.
    Elements(Vec<JdwpValue>),
    /// Entry objects in insertion order.
    Map(Vec<ObjectRef>),
    Iterator { items: Vec<JdwpValue>, cursor: usize },
    Entry { key: JdwpValue, value: JdwpValue },
    /// A `java.lang.Class` instance.
    ClassObject(ReferenceTypeId),
}

#[derive(Clone, Debug)]
struct MockObject {
    type_id: ReferenceTypeId,
    tag: u8,
    payload: Payload,
    fields: HashMap<FieldId, JdwpValue>,
}

#[derive(Clone, Debug)]
struct MockFrame {
    info: FrameInfo,
    this: Option<ObjectRef>,
    slots: HashMap<u32, JdwpValue>,
}

#[derive(Clone, Debug)]
struct MockThread {
    id: ThreadId,
    name: String,
    suspended: bool,
    /// Innermost frame first.
    frames: Vec<MockFrame>,
}

/// Deterministic, in-memory JVM used as a JDWP test double.
///
/// Types, objects, threads and frames are fabricated through builder methods.
/// Method invocation performs virtual dispatch over the fabricated type lattice
/// and runs a small set of intrinsic bodies ([`MockMethodBody`]), which is
/// enough to emulate iterators, map entries and boxed primitives.
#[derive(Clone, Debug)]
pub struct MockJdwpClient {
    next_id: u64,
    types: HashMap<ReferenceTypeId, MockType>,
    type_ids: HashMap<String, ReferenceTypeId>,
    objects: HashMap<ObjectId, MockObject>,
    threads: Vec<MockThread>,
    /// Objects allocated by invocation bodies or `CreateString`.
    temporaries: HashSet<ObjectId>,
    /// Objects whose collection is disabled.
    pinned: HashSet<ObjectId>,
    collect_on_invoke: bool,
    pub invocations: Vec<InvocationRecord>,
}

impl Default for MockJdwpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockJdwpClient {
    /// An empty VM that only knows `java.lang.Object`.
    pub fn new() -> Self {
        let mut vm = Self {
            next_id: 1,
            types: HashMap::new(),
            type_ids: HashMap::new(),
            objects: HashMap::new(),
            threads: Vec::new(),
            temporaries: HashSet::new(),
            pinned: HashSet::new(),
            collect_on_invoke: false,
            invocations: Vec::new(),
        };
        vm.insert_type(OBJECT_CLASS, TypeKind::Class, None, Vec::new());
        vm
    }

    /// A VM preloaded with the JDK types a context snapshot usually meets:
    /// strings, the eight wrappers, and the common `java.util` collections.
    pub fn with_jdk_types() -> Self {
        let mut vm = Self::new();

        vm.define_interface("java.io.Serializable", &[]);
        vm.define_interface("java.lang.Comparable", &[]);
        vm.define_interface("java.lang.CharSequence", &[]);
        vm.define_class(
            "java.lang.String",
            Some(OBJECT_CLASS),
            &["java.io.Serializable", "java.lang.Comparable", "java.lang.CharSequence"],
        );
        vm.define_class("java.lang.Number", Some(OBJECT_CLASS), &["java.io.Serializable"]);

        for (class, superclass, method, signature) in [
            ("java.lang.Integer", "java.lang.Number", "intValue", "()I"),
            ("java.lang.Long", "java.lang.Number", "longValue", "()J"),
            ("java.lang.Short", "java.lang.Number", "shortValue", "()S"),
            ("java.lang.Byte", "java.lang.Number", "byteValue", "()B"),
            ("java.lang.Float", "java.lang.Number", "floatValue", "()F"),
            ("java.lang.Double", "java.lang.Number", "doubleValue", "()D"),
            ("java.lang.Character", OBJECT_CLASS, "charValue", "()C"),
            ("java.lang.Boolean", OBJECT_CLASS, "booleanValue", "()Z"),
        ] {
            let id = vm.define_class(
                class,
                Some(superclass),
                &["java.io.Serializable", "java.lang.Comparable"],
            );
            vm.add_field(id, "value", &signature[2..], FIELD_MODIFIER_PRIVATE_FINAL);
            vm.add_method(id, method, signature, MockMethodBody::Unbox);
        }

        vm.define_class("java.lang.Thread", Some(OBJECT_CLASS), &[]);
        vm.define_class("java.lang.Throwable", Some(OBJECT_CLASS), &["java.io.Serializable"]);
        vm.define_class("java.lang.Exception", Some("java.lang.Throwable"), &[]);
        vm.define_class("java.lang.RuntimeException", Some("java.lang.Exception"), &[]);
        vm.define_class(
            "java.lang.IllegalStateException",
            Some("java.lang.RuntimeException"),
            &[],
        );
        vm.define_class(
            "java.util.NoSuchElementException",
            Some("java.lang.RuntimeException"),
            &[],
        );

        let iterator = vm.define_interface("java.util.Iterator", &[]);
        vm.add_method(iterator, "hasNext", "()Z", MockMethodBody::Abstract);
        vm.add_method(iterator, "next", "()Ljava/lang/Object;", MockMethodBody::Abstract);

        let iterable = vm.define_interface("java.lang.Iterable", &[]);
        vm.add_method(iterable, "iterator", "()Ljava/util/Iterator;", MockMethodBody::Abstract);
        let collection = vm.define_interface("java.util.Collection", &["java.lang.Iterable"]);
        vm.add_method(collection, "iterator", "()Ljava/util/Iterator;", MockMethodBody::Abstract);
        vm.define_interface("java.util.List", &["java.util.Collection"]);
        vm.define_interface("java.util.RandomAccess", &[]);
        vm.define_interface("java.util.Set", &["java.util.Collection"]);

        let map = vm.define_interface("java.util.Map", &[]);
        vm.add_method(map, "entrySet", "()Ljava/util/Set;", MockMethodBody::Abstract);
        vm.add_method(
            map,
            "get",
            "(Ljava/lang/Object;)Ljava/lang/Object;",
            MockMethodBody::Abstract,
        );
        let entry = vm.define_interface("java.util.Map$Entry", &[]);
        vm.add_method(entry, "getKey", "()Ljava/lang/Object;", MockMethodBody::Abstract);
        vm.add_method(entry, "getValue", "()Ljava/lang/Object;", MockMethodBody::Abstract);

        for (class, superclass, interfaces) in [
            ("java.util.ArrayList$Itr", OBJECT_CLASS, ["java.util.Iterator"]),
            ("java.util.HashMap$KeyIterator", OBJECT_CLASS, ["java.util.Iterator"]),
            ("java.util.HashMap$EntryIterator", OBJECT_CLASS, ["java.util.Iterator"]),
        ] {
            let id = vm.define_class(class, Some(superclass), &interfaces);
            vm.add_method(id, "hasNext", "()Z", MockMethodBody::HasNext);
            vm.add_method(id, "next", "()Ljava/lang/Object;", MockMethodBody::Next);
        }

        let abstract_collection =
            vm.define_class("java.util.AbstractCollection", Some(OBJECT_CLASS), &["java.util.Collection"]);
        vm.add_method(
            abstract_collection,
            "iterator",
            "()Ljava/util/Iterator;",
            MockMethodBody::Abstract,
        );
        vm.define_class(
            "java.util.AbstractList",
            Some("java.util.AbstractCollection"),
            &["java.util.List"],
        );
        let array_list = vm.define_class(
            "java.util.ArrayList",
            Some("java.util.AbstractList"),
            &["java.util.List", "java.util.RandomAccess", "java.io.Serializable"],
        );
        vm.add_method(
            array_list,
            "iterator",
            "()Ljava/util/Iterator;",
            MockMethodBody::Iterator {
                iterator_class: "java.util.ArrayList$Itr".to_string(),
            },
        );
        vm.define_class(
            "java.util.AbstractSet",
            Some("java.util.AbstractCollection"),
            &["java.util.Set"],
        );
        let hash_set = vm.define_class(
            "java.util.HashSet",
            Some("java.util.AbstractSet"),
            &["java.util.Set", "java.io.Serializable"],
        );
        vm.add_method(
            hash_set,
            "iterator",
            "()Ljava/util/Iterator;",
            MockMethodBody::Iterator {
                iterator_class: "java.util.HashMap$KeyIterator".to_string(),
            },
        );
        let entry_set = vm.define_class("java.util.HashMap$EntrySet", Some("java.util.AbstractSet"), &[]);
        vm.add_method(
            entry_set,
            "iterator",
            "()Ljava/util/Iterator;",
            MockMethodBody::Iterator {
                iterator_class: "java.util.HashMap$EntryIterator".to_string(),
            },
        );

        vm.define_class("java.util.AbstractMap", Some(OBJECT_CLASS), &["java.util.Map"]);
        let hash_map = vm.define_class(
            "java.util.HashMap",
            Some("java.util.AbstractMap"),
            &["java.util.Map", "java.io.Serializable"],
        );
        vm.add_method(
            hash_map,
            "entrySet",
            "()Ljava/util/Set;",
            MockMethodBody::EntrySet {
                set_class: "java.util.HashMap$EntrySet".to_string(),
            },
        );
        vm.add_method(
            hash_map,
            "get",
            "(Ljava/lang/Object;)Ljava/lang/Object;",
            MockMethodBody::MapGet,
        );
        vm.define_class(
            "java.util.LinkedHashMap",
            Some("java.util.HashMap"),
            &["java.util.Map"],
        );
        let node = vm.define_class("java.util.HashMap$Node", Some(OBJECT_CLASS), &["java.util.Map$Entry"]);
        vm.add_method(node, "getKey", "()Ljava/lang/Object;", MockMethodBody::EntryKey);
        vm.add_method(node, "getValue", "()Ljava/lang/Object;", MockMethodBody::EntryValue);

        vm
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn insert_type(
        &mut self,
        name: &str,
        kind: TypeKind,
        superclass: Option<ReferenceTypeId>,
        interfaces: Vec<ReferenceTypeId>,
    ) -> ReferenceTypeId {
        if let Some(id) = self.type_ids.get(name) {
            return *id;
        }
        let id = self.alloc_id();
        self.types.insert(
            id,
            MockType {
                info: TypeInfo {
                    id,
                    kind,
                    name: name.to_string(),
                },
                superclass,
                interfaces,
                fields: Vec::new(),
                methods: Vec::new(),
            },
        );
        self.type_ids.insert(name.to_string(), id);
        id
    }

    fn object_class_id(&self) -> Option<ReferenceTypeId> {
        self.type_ids.get(OBJECT_CLASS).copied()
    }

    /// Define a class. Unknown supertypes are defined on the fly (classes
    /// extending `java.lang.Object`, interfaces extending nothing). Redefining
    /// an existing name returns the existing id.
    pub fn define_class(
        &mut self,
        name: &str,
        superclass: Option<&str>,
        interfaces: &[&str],
    ) -> ReferenceTypeId {
        if let Some(id) = self.type_ids.get(name) {
            return *id;
        }
        let superclass = match superclass {
            Some(parent) => Some(self.define_class(parent, Some(OBJECT_CLASS), &[])),
            None if name == OBJECT_CLASS => None,
            None => self.object_class_id(),
        };
        let interfaces = interfaces
            .iter()
            .map(|iface| self.define_interface(iface, &[]))
            .collect();
        self.insert_type(name, TypeKind::Class, superclass, interfaces)
    }

    pub fn define_interface(&mut self, name: &str, extends: &[&str]) -> ReferenceTypeId {
        if let Some(id) = self.type_ids.get(name) {
            return *id;
        }
        let interfaces = extends
            .iter()
            .map(|iface| self.define_interface(iface, &[]))
            .collect();
        self.insert_type(name, TypeKind::Interface, None, interfaces)
    }

    /// Define an array type such as `int[]` or `java.lang.Object[]`.
    pub fn define_array_type(&mut self, name: &str) -> ReferenceTypeId {
        let object = self.object_class_id();
        self.insert_type(name, TypeKind::Array, object, Vec::new())
    }

    pub fn type_id(&self, name: &str) -> Option<ReferenceTypeId> {
        self.type_ids.get(name).copied()
    }

    pub fn type_info(&self, type_id: ReferenceTypeId) -> Option<TypeInfo> {
        self.types.get(&type_id).map(|ty| ty.info.clone())
    }

    pub fn add_field(
        &mut self,
        type_id: ReferenceTypeId,
        name: &str,
        signature: &str,
        mod_bits: u32,
    ) -> FieldId {
        let id = self.alloc_id();
        if let Some(ty) = self.types.get_mut(&type_id) {
            ty.fields.push(FieldInfo {
                id,
                name: name.to_string(),
                signature: signature.to_string(),
                mod_bits,
            });
        }
        id
    }

    pub fn add_method(
        &mut self,
        type_id: ReferenceTypeId,
        name: &str,
        signature: &str,
        body: MockMethodBody,
    ) -> MethodId {
        let id = self.alloc_id();
        if let Some(ty) = self.types.get_mut(&type_id) {
            ty.methods.push(MockMethod {
                info: MethodInfo {
                    id,
                    name: name.to_string(),
                    signature: signature.to_string(),
                    mod_bits: 0x0001,
                },
                body,
                variables: Vec::new(),
                lines: Vec::new(),
            });
        }
        id
    }

    fn method(&self, type_id: ReferenceTypeId, method_id: MethodId) -> Option<&MockMethod> {
        self.types
            .get(&type_id)?
            .methods
            .iter()
            .find(|m| m.info.id == method_id)
    }

    fn method_mut(
        &mut self,
        type_id: ReferenceTypeId,
        method_id: MethodId,
    ) -> Option<&mut MockMethod> {
        self.types
            .get_mut(&type_id)?
            .methods
            .iter_mut()
            .find(|m| m.info.id == method_id)
    }

    /// `Method.LineTable` entries `(code index, line)` of a method.
    pub fn line_table(&self, type_id: ReferenceTypeId, method_id: MethodId) -> Vec<(i64, u32)> {
        self.method(type_id, method_id)
            .map(|m| m.lines.clone())
            .unwrap_or_default()
    }

    fn alloc_object(&mut self, type_id: ReferenceTypeId, object_tag: u8, payload: Payload) -> ObjectRef {
        let id = self.alloc_id();
        self.objects.insert(
            id,
            MockObject {
                type_id,
                tag: object_tag,
                payload,
                fields: HashMap::new(),
            },
        );
        ObjectRef::new(id, object_tag)
    }

    /// A plain instance of `class` whose fields all hold default values.
    pub fn new_object(&mut self, class: &str) -> ObjectRef {
        let type_id = self.define_class(class, None, &[]);
        self.alloc_object(type_id, tag::OBJECT, Payload::Plain)
    }

    pub fn new_string(&mut self, value: &str) -> ObjectRef {
        let type_id = self.define_class("java.lang.String", None, &[]);
        self.alloc_object(type_id, tag::STRING, Payload::String(value.to_string()))
    }

    /// Box a primitive into its `java.lang` wrapper.
    pub fn new_boxed(&mut self, value: JdwpValue) -> ObjectRef {
        let class = match value {
            JdwpValue::Boolean(_) => "java.lang.Boolean",
            JdwpValue::Byte(_) => "java.lang.Byte",
            JdwpValue::Short(_) => "java.lang.Short",
            JdwpValue::Int(_) => "java.lang.Integer",
            JdwpValue::Long(_) => "java.lang.Long",
            JdwpValue::Float(_) => "java.lang.Float",
            JdwpValue::Double(_) => "java.lang.Double",
            JdwpValue::Char(_) => "java.lang.Character",
            JdwpValue::Null | JdwpValue::Void | JdwpValue::Object(_) => OBJECT_CLASS,
        };
        let type_id = self.define_class(class, None, &[]);
        self.alloc_object(type_id, tag::OBJECT, Payload::Boxed(value))
    }

    /// A collection of `class` (e.g. `java.util.ArrayList`) holding `items` in order.
    pub fn new_collection(&mut self, class: &str, items: Vec<JdwpValue>) -> ObjectRef {
        let type_id = self.define_class(class, None, &[]);
        self.alloc_object(type_id, tag::OBJECT, Payload::Elements(items))
    }

    pub fn new_list(&mut self, items: Vec<JdwpValue>) -> ObjectRef {
        self.new_collection("java.util.ArrayList", items)
    }

    pub fn push_element(&mut self, collection: ObjectRef, value: JdwpValue) {
        if let Some(MockObject {
            payload: Payload::Elements(items),
            ..
        }) = self.objects.get_mut(&collection.id)
        {
            items.push(value);
        }
    }

    /// A map of `class` (e.g. `java.util.LinkedHashMap`) whose entry set
    /// iterates in the order the entries are given.
    pub fn new_map(&mut self, class: &str, entries: Vec<(JdwpValue, JdwpValue)>) -> ObjectRef {
        let type_id = self.define_class(class, None, &[]);
        let map = self.alloc_object(type_id, tag::OBJECT, Payload::Map(Vec::new()));
        for (key, value) in entries {
            self.put_entry(map, key, value);
        }
        map
    }

    /// Insert or replace an entry; replacing keeps the entry's position.
    pub fn put_entry(&mut self, map: ObjectRef, key: JdwpValue, value: JdwpValue) {
        let existing = match self.objects.get(&map.id) {
            Some(MockObject {
                payload: Payload::Map(entries),
                ..
            }) => entries
                .iter()
                .copied()
                .find(|entry| match self.objects.get(&entry.id) {
                    Some(MockObject {
                        payload: Payload::Entry { key: k, .. },
                        ..
                    }) => self.keys_equal(k, &key),
                    _ => false,
                }),
            _ => return,
        };

        if let Some(entry) = existing {
            if let Some(MockObject {
                payload: Payload::Entry { value: v, .. },
                ..
            }) = self.objects.get_mut(&entry.id)
            {
                *v = value;
            }
            return;
        }

        let node_type = self.define_class("java.util.HashMap$Node", None, &[]);
        let entry = self.alloc_object(node_type, tag::OBJECT, Payload::Entry { key, value });
        if let Some(MockObject {
            payload: Payload::Map(entries),
            ..
        }) = self.objects.get_mut(&map.id)
        {
            entries.push(entry);
        }
    }

    /// The `java.lang.Class` instance standing for `class`.
    pub fn new_class_object(&mut self, class: &str) -> ObjectRef {
        let reflected = self.define_class(class, None, &[]);
        let type_id = self.define_class("java.lang.Class", None, &[]);
        self.alloc_object(type_id, tag::CLASS_OBJECT, Payload::ClassObject(reflected))
    }

    /// An array whose runtime type is `element_type[]`.
    pub fn new_array(&mut self, element_type: &str, items: Vec<JdwpValue>) -> ObjectRef {
        let type_id = self.define_array_type(&format!("{element_type}[]"));
        self.alloc_object(type_id, tag::ARRAY, Payload::Array(items))
    }

    pub fn set_array_element(&mut self, array: ObjectRef, index: usize, value: JdwpValue) {
        if let Some(MockObject {
            payload: Payload::Array(items),
            ..
        }) = self.objects.get_mut(&array.id)
        {
            if let Some(slot) = items.get_mut(index) {
                *slot = value;
            }
        }
    }

    /// Set an instance field by name, searching the runtime class and its
    /// superclasses. A field that does not exist yet is declared on the
    /// runtime class.
    pub fn set_field(&mut self, object: ObjectRef, name: &str, value: JdwpValue) {
        let Some(type_id) = self.objects.get(&object.id).map(|o| o.type_id) else {
            return;
        };
        let field_id = match self.find_field(type_id, name) {
            Some(id) => id,
            None => {
                let signature = self.signature_of(&value);
                self.add_field(type_id, name, &signature, 0)
            }
        };
        if let Some(obj) = self.objects.get_mut(&object.id) {
            obj.fields.insert(field_id, value);
        }
    }

    fn find_field(&self, type_id: ReferenceTypeId, name: &str) -> Option<FieldId> {
        let mut current = Some(type_id);
        while let Some(id) = current {
            let ty = self.types.get(&id)?;
            if let Some(field) = ty.fields.iter().find(|f| f.name == name && !f.is_static()) {
                return Some(field.id);
            }
            current = ty.superclass;
        }
        None
    }

    fn signature_of(&self, value: &JdwpValue) -> String {
        match value {
            JdwpValue::Object(obj) => self
                .objects
                .get(&obj.id)
                .and_then(|o| self.types.get(&o.type_id))
                .map(|ty| class_name_to_signature(&ty.info.name))
                .unwrap_or_else(|| "Ljava/lang/Object;".to_string()),
            JdwpValue::Null => "Ljava/lang/Object;".to_string(),
            other => char::from(other.tag()).to_string(),
        }
    }

    /// Simulate garbage collection: later accesses fail with `InvalidObjectId`.
    pub fn collect_object(&mut self, object: ObjectId) {
        self.objects.remove(&object);
        self.temporaries.remove(&object);
        self.pinned.remove(&object);
    }

    /// When enabled, every invocation first collects the temporaries
    /// (iterators, entry sets, created strings, thrown exceptions) whose
    /// collection is not disabled, as a GC running while the thread resumes.
    pub fn set_collect_on_invoke(&mut self, enabled: bool) {
        self.collect_on_invoke = enabled;
    }

    pub fn is_pinned(&self, object: ObjectId) -> bool {
        self.pinned.contains(&object)
    }

    /// Objects whose collection is currently disabled.
    pub fn pinned_objects(&self) -> Vec<ObjectId> {
        let mut pinned: Vec<_> = self.pinned.iter().copied().collect();
        pinned.sort_unstable();
        pinned
    }

    fn collect_unpinned_temporaries(&mut self) {
        let doomed: Vec<_> = self
            .temporaries
            .iter()
            .copied()
            .filter(|id| !self.pinned.contains(id))
            .collect();
        for id in doomed {
            self.collect_object(id);
        }
    }

    pub fn add_thread(&mut self, name: &str, suspended: bool) -> ThreadId {
        let type_id = self.define_class("java.lang.Thread", None, &[]);
        let thread = self.alloc_object(type_id, tag::THREAD, Payload::Plain);
        self.threads.push(MockThread {
            id: thread.id,
            name: name.to_string(),
            suspended,
            frames: Vec::new(),
        });
        thread.id
    }

    pub fn set_thread_suspended(&mut self, thread: ThreadId, suspended: bool) {
        if let Some(t) = self.threads.iter_mut().find(|t| t.id == thread) {
            t.suspended = suspended;
        }
    }

    /// Push a new innermost frame executing `class.method` at `line`.
    ///
    /// Each local gets its own slot (after `this`, as javac assigns them) and
    /// a scope covering the frame's current code index.
    pub fn push_frame(
        &mut self,
        thread: ThreadId,
        class: &str,
        method: &str,
        line: u32,
        this: Option<ObjectRef>,
        locals: &[(&str, JdwpValue)],
    ) -> FrameId {
        let type_id = self.define_class(class, None, &[]);
        let method_id = self.add_method(type_id, method, "()V", MockMethodBody::Return(JdwpValue::Void));
        let frame_id = self.alloc_id();

        let first_slot = u32::from(this.is_some());
        let mut variables = Vec::new();
        let mut slots = HashMap::new();
        for (offset, (name, value)) in locals.iter().enumerate() {
            let slot = first_slot + offset as u32;
            variables.push(VariableInfo {
                code_index: 0,
                name: name.to_string(),
                signature: self.signature_of(value),
                length: FRAME_SCOPE_LENGTH,
                slot,
            });
            slots.insert(slot, value.clone());
        }

        if let Some(m) = self.method_mut(type_id, method_id) {
            m.variables = variables;
            m.lines = vec![(0, line)];
        }

        let frame = MockFrame {
            info: FrameInfo {
                id: frame_id,
                location: Location {
                    type_id,
                    method_id,
                    index: FRAME_CODE_INDEX,
                },
            },
            this,
            slots,
        };
        if let Some(t) = self.threads.iter_mut().find(|t| t.id == thread) {
            t.frames.insert(0, frame);
        }
        frame_id
    }

    /// Declare an extra local in `frame`'s method with an explicit scope,
    /// for exercising scope shadowing. Returns the slot.
    pub fn add_scoped_local(
        &mut self,
        frame: FrameId,
        name: &str,
        code_index: i64,
        length: i64,
        value: JdwpValue,
    ) -> u32 {
        let signature = self.signature_of(&value);
        let Some(location) = self.find_frame(frame).map(|f| f.info.location) else {
            return 0;
        };
        let slot = self
            .method(location.type_id, location.method_id)
            .map(|m| m.variables.iter().map(|v| v.slot + 1).max().unwrap_or(0))
            .unwrap_or(0);
        if let Some(m) = self.method_mut(location.type_id, location.method_id) {
            m.variables.push(VariableInfo {
                code_index,
                name: name.to_string(),
                signature,
                length,
                slot,
            });
        }
        if let Some(f) = self.find_frame_mut(frame) {
            f.slots.insert(slot, value);
        }
        slot
    }

    fn find_frame(&self, frame: FrameId) -> Option<&MockFrame> {
        self.threads
            .iter()
            .flat_map(|t| t.frames.iter())
            .find(|f| f.info.id == frame)
    }

    fn find_frame_mut(&mut self, frame: FrameId) -> Option<&mut MockFrame> {
        self.threads
            .iter_mut()
            .flat_map(|t| t.frames.iter_mut())
            .find(|f| f.info.id == frame)
    }

    fn object(&self, object: ObjectId) -> Result<&MockObject, JdwpError> {
        self.objects
            .get(&object)
            .ok_or(JdwpError::InvalidObjectId(object))
    }

    fn type_ref(&self, type_id: ReferenceTypeId) -> Result<&MockType, JdwpError> {
        self.types
            .get(&type_id)
            .ok_or_else(|| JdwpError::Other(format!("no mock type with id {type_id}")))
    }

    fn keys_equal(&self, a: &JdwpValue, b: &JdwpValue) -> bool {
        match (a, b) {
            (JdwpValue::Object(x), JdwpValue::Object(y)) => {
                if x.id == y.id {
                    return true;
                }
                match (self.objects.get(&x.id), self.objects.get(&y.id)) {
                    (
                        Some(MockObject {
                            payload: Payload::String(l),
                            ..
                        }),
                        Some(MockObject {
                            payload: Payload::String(r),
                            ..
                        }),
                    ) => l == r,
                    _ => false,
                }
            }
            (a, b) => a == b,
        }
    }

    /// Virtual dispatch: concrete bodies along the superclass chain first,
    /// then default bodies on the interfaces, breadth first.
    fn dispatch(
        &self,
        runtime_type: ReferenceTypeId,
        name: &str,
        signature: &str,
    ) -> Option<&MockMethod> {
        fn concrete<'t>(ty: &'t MockType, name: &str, signature: &str) -> Option<&'t MockMethod> {
            ty.methods.iter().find(|m| {
                m.info.name == name
                    && m.info.signature == signature
                    && m.body != MockMethodBody::Abstract
            })
        }

        let mut queue = VecDeque::new();
        let mut current = Some(runtime_type);
        while let Some(id) = current {
            let ty = self.types.get(&id)?;
            if let Some(m) = concrete(ty, name, signature) {
                return Some(m);
            }
            queue.extend(ty.interfaces.iter().copied());
            current = ty.superclass;
        }

        let mut seen = HashSet::new();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            let ty = self.types.get(&id)?;
            if let Some(m) = concrete(ty, name, signature) {
                return Some(m);
            }
            queue.extend(ty.interfaces.iter().copied());
        }
        None
    }

    fn throw(&mut self, class: &str) -> InvokeResult {
        let exception = self.new_object(class);
        InvokeResult {
            value: JdwpValue::Null,
            exception: Some(exception),
        }
    }

    fn returning(value: JdwpValue) -> InvokeResult {
        InvokeResult {
            value,
            exception: None,
        }
    }

    fn run_body(
        &mut self,
        body: MockMethodBody,
        receiver: ObjectId,
        args: &[JdwpValue],
    ) -> Result<InvokeResult, JdwpError> {
        let unexpected = |what: &str| {
            JdwpError::Other(format!("mock object {receiver} cannot run `{what}`"))
        };

        match body {
            MockMethodBody::Abstract => Err(unexpected("an abstract method")),
            MockMethodBody::Return(value) => Ok(Self::returning(value)),
            MockMethodBody::Throw(class) => Ok(self.throw(&class)),
            MockMethodBody::Unbox => match &self.object(receiver)?.payload {
                Payload::Boxed(value) => Ok(Self::returning(value.clone())),
                _ => Err(unexpected("unbox")),
            },
            MockMethodBody::Iterator { iterator_class } => {
                let items = match &self.object(receiver)?.payload {
                    Payload::Elements(items) => items.clone(),
                    _ => return Err(unexpected("iterator")),
                };
                let type_id = self.define_class(&iterator_class, None, &[]);
                let iterator =
                    self.alloc_object(type_id, tag::OBJECT, Payload::Iterator { items, cursor: 0 });
                Ok(Self::returning(JdwpValue::Object(iterator)))
            }
            MockMethodBody::EntrySet { set_class } => {
                let entries = match &self.object(receiver)?.payload {
                    Payload::Map(entries) => entries
                        .iter()
                        .map(|entry| JdwpValue::Object(*entry))
                        .collect(),
                    _ => return Err(unexpected("entrySet")),
                };
                let type_id = self.define_class(&set_class, None, &[]);
                let set = self.alloc_object(type_id, tag::OBJECT, Payload::Elements(entries));
                Ok(Self::returning(JdwpValue::Object(set)))
            }
            MockMethodBody::HasNext => match &self.object(receiver)?.payload {
                Payload::Iterator { items, cursor } => {
                    Ok(Self::returning(JdwpValue::Boolean(*cursor < items.len())))
                }
                _ => Err(unexpected("hasNext")),
            },
            MockMethodBody::Next => {
                let next = match self.objects.get_mut(&receiver).map(|o| &mut o.payload) {
                    Some(Payload::Iterator { items, cursor }) => {
                        let item = items.get(*cursor).cloned();
                        if item.is_some() {
                            *cursor += 1;
                        }
                        item
                    }
                    Some(_) => return Err(unexpected("next")),
                    None => return Err(JdwpError::InvalidObjectId(receiver)),
                };
                match next {
                    Some(value) => Ok(Self::returning(value)),
                    None => Ok(self.throw("java.util.NoSuchElementException")),
                }
            }
            MockMethodBody::EntryKey => match &self.object(receiver)?.payload {
                Payload::Entry { key, .. } => Ok(Self::returning(key.clone())),
                _ => Err(unexpected("getKey")),
            },
            MockMethodBody::EntryValue => match &self.object(receiver)?.payload {
                Payload::Entry { value, .. } => Ok(Self::returning(value.clone())),
                _ => Err(unexpected("getValue")),
            },
            MockMethodBody::MapGet => {
                let key = args.first().cloned().unwrap_or(JdwpValue::Null);
                let entries = match &self.object(receiver)?.payload {
                    Payload::Map(entries) => entries.clone(),
                    _ => return Err(unexpected("get")),
                };
                for entry in entries {
                    if let Some(MockObject {
                        payload: Payload::Entry { key: k, value },
                        ..
                    }) = self.objects.get(&entry.id)
                    {
                        if self.keys_equal(k, &key) {
                            return Ok(Self::returning(value.clone()));
                        }
                    }
                }
                Ok(Self::returning(JdwpValue::Null))
            }
        }
    }

    fn default_value(signature: &str) -> JdwpValue {
        match signature.as_bytes().first().copied() {
            Some(tag::BOOLEAN) => JdwpValue::Boolean(false),
            Some(tag::BYTE) => JdwpValue::Byte(0),
            Some(tag::CHAR) => JdwpValue::Char(0),
            Some(tag::SHORT) => JdwpValue::Short(0),
            Some(tag::INT) => JdwpValue::Int(0),
            Some(tag::LONG) => JdwpValue::Long(0),
            Some(tag::FLOAT) => JdwpValue::Float(0.0),
            Some(tag::DOUBLE) => JdwpValue::Double(0.0),
            _ => JdwpValue::Null,
        }
    }

    fn field_signature(&self, field: FieldId) -> Option<&str> {
        self.types
            .values()
            .flat_map(|ty| ty.fields.iter())
            .find(|f| f.id == field)
            .map(|f| f.signature.as_str())
    }
}

impl JdwpClient for MockJdwpClient {
    fn threads(&mut self) -> Result<Vec<ThreadInfo>, JdwpError> {
        Ok(self
            .threads
            .iter()
            .map(|t| ThreadInfo {
                id: t.id,
                name: t.name.clone(),
                suspended: t.suspended,
            })
            .collect())
    }

    fn frames(&mut self, thread: ThreadId) -> Result<Vec<FrameInfo>, JdwpError> {
        let t = self
            .threads
            .iter()
            .find(|t| t.id == thread)
            .ok_or(JdwpError::CommandFailed {
                error_code: ERROR_INVALID_THREAD,
            })?;
        if !t.suspended {
            return Err(JdwpError::CommandFailed {
                error_code: ERROR_THREAD_NOT_SUSPENDED,
            });
        }
        Ok(t.frames.iter().map(|f| f.info).collect())
    }

    fn this_object(
        &mut self,
        _thread: ThreadId,
        frame: FrameId,
    ) -> Result<Option<ObjectRef>, JdwpError> {
        self.find_frame(frame)
            .map(|f| f.this)
            .ok_or_else(|| JdwpError::Other(format!("no mock frame {frame}")))
    }

    fn variable_table(
        &mut self,
        type_id: ReferenceTypeId,
        method_id: MethodId,
    ) -> Result<Vec<VariableInfo>, JdwpError> {
        match self.method(type_id, method_id) {
            Some(m) if !m.variables.is_empty() => Ok(m.variables.clone()),
            _ => Err(JdwpError::CommandFailed {
                error_code: ERROR_ABSENT_INFORMATION,
            }),
        }
    }

    fn frame_values(
        &mut self,
        _thread: ThreadId,
        frame: FrameId,
        slots: &[(u32, String)],
    ) -> Result<Vec<JdwpValue>, JdwpError> {
        let f = self
            .find_frame(frame)
            .ok_or_else(|| JdwpError::Other(format!("no mock frame {frame}")))?;
        slots
            .iter()
            .map(|(slot, _signature)| {
                f.slots.get(slot).cloned().ok_or(JdwpError::CommandFailed {
                    error_code: ERROR_INVALID_SLOT,
                })
            })
            .collect()
    }

    fn object_type(&mut self, object: ObjectId) -> Result<TypeInfo, JdwpError> {
        let type_id = self.object(object)?.type_id;
        Ok(self.type_ref(type_id)?.info.clone())
    }

    fn reflected_type(&mut self, class_object: ObjectId) -> Result<TypeInfo, JdwpError> {
        match &self.object(class_object)?.payload {
            Payload::ClassObject(type_id) => Ok(self.type_ref(*type_id)?.info.clone()),
            _ => Err(JdwpError::Other(format!(
                "mock object {class_object} is not a class object"
            ))),
        }
    }

    fn classes_by_name(&mut self, name: &str) -> Result<Vec<TypeInfo>, JdwpError> {
        Ok(self
            .type_ids
            .get(name)
            .and_then(|id| self.types.get(id))
            .map(|ty| vec![ty.info.clone()])
            .unwrap_or_default())
    }

    fn superclass(&mut self, class: ReferenceTypeId) -> Result<Option<TypeInfo>, JdwpError> {
        let superclass = self.type_ref(class)?.superclass;
        Ok(superclass.and_then(|id| self.type_info(id)))
    }

    fn interfaces(&mut self, type_id: ReferenceTypeId) -> Result<Vec<TypeInfo>, JdwpError> {
        let ty = self.type_ref(type_id)?;
        Ok(ty
            .interfaces
            .iter()
            .filter_map(|id| self.type_info(*id))
            .collect())
    }

    fn declared_fields(&mut self, type_id: ReferenceTypeId) -> Result<Vec<FieldInfo>, JdwpError> {
        Ok(self.type_ref(type_id)?.fields.clone())
    }

    fn declared_methods(
        &mut self,
        type_id: ReferenceTypeId,
    ) -> Result<Vec<MethodInfo>, JdwpError> {
        Ok(self
            .type_ref(type_id)?
            .methods
            .iter()
            .map(|m| m.info.clone())
            .collect())
    }

    fn field_values(
        &mut self,
        object: ObjectId,
        fields: &[FieldId],
    ) -> Result<Vec<JdwpValue>, JdwpError> {
        let obj = self.object(object)?;
        fields
            .iter()
            .map(|field| match obj.fields.get(field) {
                Some(value) => Ok(value.clone()),
                None => self
                    .field_signature(*field)
                    .map(Self::default_value)
                    .ok_or_else(|| JdwpError::Other(format!("no mock field {field}"))),
            })
            .collect()
    }

    fn string_value(&mut self, object: ObjectId) -> Result<String, JdwpError> {
        match &self.object(object)?.payload {
            Payload::String(value) => Ok(value.clone()),
            _ => Err(JdwpError::Other(format!("mock object {object} is not a string"))),
        }
    }

    fn array_values(&mut self, array: ObjectId) -> Result<Vec<JdwpValue>, JdwpError> {
        match &self.object(array)?.payload {
            Payload::Array(items) => Ok(items.clone()),
            _ => Err(JdwpError::Other(format!("mock object {array} is not an array"))),
        }
    }

    fn invoke_method(
        &mut self,
        object: ObjectId,
        thread: ThreadId,
        class: ReferenceTypeId,
        method: MethodId,
        args: &[JdwpValue],
    ) -> Result<InvokeResult, JdwpError> {
        let t = self
            .threads
            .iter()
            .find(|t| t.id == thread)
            .ok_or(JdwpError::CommandFailed {
                error_code: ERROR_INVALID_THREAD,
            })?;
        if !t.suspended {
            return Err(JdwpError::CommandFailed {
                error_code: ERROR_THREAD_NOT_SUSPENDED,
            });
        }
        if self.collect_on_invoke {
            self.collect_unpinned_temporaries();
        }

        let runtime_type = self.object(object)?.type_id;
        let declared = self
            .method(class, method)
            .map(|m| m.info.clone())
            .ok_or(JdwpError::CommandFailed {
                error_code: ERROR_INVALID_METHODID,
            })?;
        let body = self
            .dispatch(runtime_type, &declared.name, &declared.signature)
            .map(|m| m.body.clone())
            .ok_or_else(|| {
                JdwpError::Other(format!(
                    "no concrete implementation of {}{} for mock object {object}",
                    declared.name, declared.signature
                ))
            })?;

        let receiver_type = self
            .type_info(runtime_type)
            .map(|info| info.name)
            .unwrap_or_else(|| "<unknown>".to_string());
        self.invocations.push(InvocationRecord {
            object,
            thread,
            receiver_type,
            method: declared.name,
            signature: declared.signature,
        });

        let first_new = self.next_id;
        let result = self.run_body(body, object, args);
        let allocated: Vec<_> = self
            .objects
            .keys()
            .copied()
            .filter(|id| *id >= first_new)
            .collect();
        self.temporaries.extend(allocated);
        result
    }

    fn create_string(&mut self, value: &str) -> Result<ObjectRef, JdwpError> {
        let string = self.new_string(value);
        self.temporaries.insert(string.id);
        Ok(string)
    }

    fn disable_collection(&mut self, object: ObjectId) -> Result<(), JdwpError> {
        self.object(object)?;
        self.pinned.insert(object);
        Ok(())
    }

    fn enable_collection(&mut self, object: ObjectId) -> Result<(), JdwpError> {
        self.object(object)?;
        self.pinned.remove(&object);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suspended_vm() -> (MockJdwpClient, ThreadId) {
        let mut vm = MockJdwpClient::with_jdk_types();
        let thread = vm.add_thread("main", true);
        (vm, thread)
    }

    fn call(
        vm: &mut MockJdwpClient,
        thread: ThreadId,
        receiver: ObjectRef,
        declaring: &str,
        name: &str,
        signature: &str,
        args: &[JdwpValue],
    ) -> InvokeResult {
        let class = vm.type_id(declaring).unwrap();
        let method = vm
            .declared_methods(class)
            .unwrap()
            .into_iter()
            .find(|m| m.name == name && m.signature == signature)
            .unwrap();
        vm.invoke_method(receiver.id, thread, class, method.id, args)
            .unwrap()
    }

    #[test]
    fn iterator_dispatches_through_interface_declaration() {
        let (mut vm, thread) = suspended_vm();
        let list = vm.new_list(vec![JdwpValue::Int(1), JdwpValue::Int(2)]);

        let iterator = call(&mut vm, thread, list, "java.util.Collection", "iterator", "()Ljava/util/Iterator;", &[])
            .value
            .object()
            .unwrap();
        let mut seen = Vec::new();
        while call(&mut vm, thread, iterator, "java.util.Iterator", "hasNext", "()Z", &[]).value
            == JdwpValue::Boolean(true)
        {
            seen.push(call(&mut vm, thread, iterator, "java.util.Iterator", "next", "()Ljava/lang/Object;", &[]).value);
        }
        assert_eq!(seen, vec![JdwpValue::Int(1), JdwpValue::Int(2)]);

        let exhausted = call(&mut vm, thread, iterator, "java.util.Iterator", "next", "()Ljava/lang/Object;", &[]);
        let exception = exhausted.exception.unwrap();
        assert_eq!(
            vm.object_type(exception.id).unwrap().name,
            "java.util.NoSuchElementException"
        );
    }

    #[test]
    fn put_entry_replaces_value_in_place() {
        let (mut vm, thread) = suspended_vm();
        let a = vm.new_string("a");
        let b = vm.new_string("b");
        let map = vm.new_map(
            "java.util.LinkedHashMap",
            vec![
                (JdwpValue::Object(a), JdwpValue::Int(1)),
                (JdwpValue::Object(b), JdwpValue::Int(2)),
            ],
        );
        let a_again = vm.new_string("a");
        vm.put_entry(map, JdwpValue::Object(a_again), JdwpValue::Int(3));

        let key = vm.new_string("a");
        let got = call(
            &mut vm,
            thread,
            map,
            "java.util.Map",
            "get",
            "(Ljava/lang/Object;)Ljava/lang/Object;",
            &[JdwpValue::Object(key)],
        );
        assert_eq!(got.value, JdwpValue::Int(3));
        assert_eq!(vm.invocations.last().unwrap().receiver_type, "java.util.LinkedHashMap");
    }

    #[test]
    fn invoke_requires_suspended_thread() {
        let mut vm = MockJdwpClient::with_jdk_types();
        let running = vm.add_thread("worker", false);
        let boxed = vm.new_boxed(JdwpValue::Long(5));
        let class = vm.type_id("java.lang.Long").unwrap();
        let method = vm.declared_methods(class).unwrap()[0].id;

        let err = vm
            .invoke_method(boxed.id, running, class, method, &[])
            .unwrap_err();
        assert!(matches!(
            err,
            JdwpError::CommandFailed {
                error_code: ERROR_THREAD_NOT_SUSPENDED
            }
        ));
    }

    #[test]
    fn collected_objects_are_invalid() {
        let (mut vm, _thread) = suspended_vm();
        let obj = vm.new_object("com.example.Thing");
        vm.collect_object(obj.id);
        assert!(matches!(
            vm.object_type(obj.id),
            Err(JdwpError::InvalidObjectId(id)) if id == obj.id
        ));
    }

    #[test]
    fn unpinned_iterator_is_collected_by_the_next_invoke() {
        let (mut vm, thread) = suspended_vm();
        vm.set_collect_on_invoke(true);
        let list = vm.new_list(vec![JdwpValue::Int(1), JdwpValue::Int(2)]);
        let iterator_call = |vm: &mut MockJdwpClient| {
            call(vm, thread, list, "java.util.Collection", "iterator", "()Ljava/util/Iterator;", &[])
                .value
                .object()
                .unwrap()
        };
        let has_next = |vm: &mut MockJdwpClient, iterator: ObjectRef| {
            let class = vm.type_id("java.util.Iterator").unwrap();
            let method = vm
                .declared_methods(class)
                .unwrap()
                .into_iter()
                .find(|m| m.name == "hasNext")
                .unwrap();
            vm.invoke_method(iterator.id, thread, class, method.id, &[])
        };

        let loose = iterator_call(&mut vm);
        assert!(matches!(
            has_next(&mut vm, loose),
            Err(JdwpError::InvalidObjectId(id)) if id == loose.id
        ));

        let pinned = iterator_call(&mut vm);
        vm.disable_collection(pinned.id).unwrap();
        assert_eq!(has_next(&mut vm, pinned).unwrap().value, JdwpValue::Boolean(true));
        assert_eq!(has_next(&mut vm, pinned).unwrap().value, JdwpValue::Boolean(true));
        assert_eq!(vm.pinned_objects(), vec![pinned.id]);

        vm.enable_collection(pinned.id).unwrap();
        assert!(vm.pinned_objects().is_empty());
        assert!(has_next(&mut vm, pinned).is_err());
        // Fabricated objects are never temporaries.
        assert!(vm.object_type(list.id).is_ok());
    }

    #[test]
    fn created_strings_are_temporaries() {
        let (mut vm, thread) = suspended_vm();
        vm.set_collect_on_invoke(true);
        let boxed = vm.new_boxed(JdwpValue::Int(3));
        let key = vm.create_string("k").unwrap();
        call(&mut vm, thread, boxed, "java.lang.Integer", "intValue", "()I", &[]);
        assert!(vm.string_value(key.id).is_err());
        assert!(matches!(
            vm.disable_collection(key.id),
            Err(JdwpError::InvalidObjectId(_))
        ));
    }

    #[test]
    fn unset_fields_read_as_defaults() {
        let (mut vm, _thread) = suspended_vm();
        let class = vm.define_class("com.example.Point", None, &[]);
        let x = vm.add_field(class, "x", "I", 0);
        let label = vm.add_field(class, "label", "Ljava/lang/String;", 0);
        let point = vm.new_object("com.example.Point");

        assert_eq!(
            vm.field_values(point.id, &[x, label]).unwrap(),
            vec![JdwpValue::Int(0), JdwpValue::Null]
        );
    }

    #[test]
    fn frames_expose_locals_through_variable_table() {
        let (mut vm, thread) = suspended_vm();
        let this = vm.new_object("com.example.Script");
        let frame = vm.push_frame(thread, "com.example.Script", "run", 12, Some(this), &[("x", JdwpValue::Int(5))]);

        let frames = vm.frames(thread).unwrap();
        assert_eq!(frames[0].id, frame);
        let loc = frames[0].location;
        let vars = vm.variable_table(loc.type_id, loc.method_id).unwrap();
        assert_eq!(vars[0].name, "x");
        assert_eq!(vars[0].slot, 1);
        assert!(vars[0].is_live_at(loc.index));
        assert_eq!(
            vm.frame_values(thread, frame, &[(1, "I".to_string())]).unwrap(),
            vec![JdwpValue::Int(5)]
        );
        assert_eq!(vm.this_object(thread, frame).unwrap(), Some(this));
        assert_eq!(vm.line_table(loc.type_id, loc.method_id), vec![(0, 12)]);
    }
}
