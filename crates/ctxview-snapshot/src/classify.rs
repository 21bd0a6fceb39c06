//! Structural classification of remote values.
//!
//! Classification happens in two steps. [`classify`] looks only at the value
//! itself (its JDWP tag) and needs no round trip. Object handles are then
//! refined into a [`Shape`] by [`TypeClassifier::shape`], which inspects the
//! runtime type and, for collections and maps, searches its supertype
//! lattice.

use std::collections::{HashMap, HashSet, VecDeque};

use ctxview_jdwp::{FieldInfo, JdwpClient, JdwpError, JdwpValue, ObjectRef, ReferenceTypeId, TypeInfo, TypeKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Boolean,
    Char,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
}

/// What a value is, before any remote type inspection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueClass {
    Null,
    String(ObjectRef),
    Primitive(PrimitiveKind),
    Object(ObjectRef),
}

pub fn classify(value: &JdwpValue) -> ValueClass {
    match value {
        JdwpValue::Null | JdwpValue::Void => ValueClass::Null,
        JdwpValue::Boolean(_) => ValueClass::Primitive(PrimitiveKind::Boolean),
        JdwpValue::Char(_) => ValueClass::Primitive(PrimitiveKind::Char),
        JdwpValue::Byte(_) => ValueClass::Primitive(PrimitiveKind::Byte),
        JdwpValue::Short(_) => ValueClass::Primitive(PrimitiveKind::Short),
        JdwpValue::Int(_) => ValueClass::Primitive(PrimitiveKind::Int),
        JdwpValue::Long(_) => ValueClass::Primitive(PrimitiveKind::Long),
        JdwpValue::Float(_) => ValueClass::Primitive(PrimitiveKind::Float),
        JdwpValue::Double(_) => ValueClass::Primitive(PrimitiveKind::Double),
        JdwpValue::Object(obj) if obj.is_string() => ValueClass::String(*obj),
        JdwpValue::Object(obj) => ValueClass::Object(*obj),
    }
}

/// Accessor that unboxes one primitive wrapper type.
#[derive(Debug, PartialEq, Eq)]
pub struct UnboxSpec {
    pub wrapper: &'static str,
    pub method: &'static str,
    pub signature: &'static str,
    pub kind: PrimitiveKind,
}

pub static UNBOX: [UnboxSpec; 8] = [
    UnboxSpec {
        wrapper: "java.lang.Integer",
        method: "intValue",
        signature: "()I",
        kind: PrimitiveKind::Int,
    },
    UnboxSpec {
        wrapper: "java.lang.Long",
        method: "longValue",
        signature: "()J",
        kind: PrimitiveKind::Long,
    },
    UnboxSpec {
        wrapper: "java.lang.Short",
        method: "shortValue",
        signature: "()S",
        kind: PrimitiveKind::Short,
    },
    UnboxSpec {
        wrapper: "java.lang.Byte",
        method: "byteValue",
        signature: "()B",
        kind: PrimitiveKind::Byte,
    },
    UnboxSpec {
        wrapper: "java.lang.Float",
        method: "floatValue",
        signature: "()F",
        kind: PrimitiveKind::Float,
    },
    UnboxSpec {
        wrapper: "java.lang.Double",
        method: "doubleValue",
        signature: "()D",
        kind: PrimitiveKind::Double,
    },
    UnboxSpec {
        wrapper: "java.lang.Character",
        method: "charValue",
        signature: "()C",
        kind: PrimitiveKind::Char,
    },
    UnboxSpec {
        wrapper: "java.lang.Boolean",
        method: "booleanValue",
        signature: "()Z",
        kind: PrimitiveKind::Boolean,
    },
];

pub fn unbox_spec(type_name: &str) -> Option<&'static UnboxSpec> {
    UNBOX.iter().find(|spec| spec.wrapper == type_name)
}

/// Well-known abstractions the walker traverses through remote calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Abstraction {
    Collection,
    Map,
}

impl Abstraction {
    pub fn type_name(self) -> &'static str {
        match self {
            Abstraction::Collection => "java.util.Collection",
            Abstraction::Map => "java.util.Map",
        }
    }
}

/// Traversal strategy for an object handle, computed once per node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    Wrapper(&'static UnboxSpec),
    Collection,
    Map,
    Array,
    Plain,
}

/// Memoizing type-lattice inspector.
///
/// Caches live for one walk; nothing here outlives the paused session.
#[derive(Debug, Default)]
pub struct TypeClassifier {
    assignable: HashMap<(ReferenceTypeId, Abstraction), bool>,
    loaded: HashMap<Abstraction, bool>,
    fields: HashMap<ReferenceTypeId, Vec<FieldInfo>>,
}

impl TypeClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shape<C: JdwpClient + ?Sized>(
        &mut self,
        client: &mut C,
        ty: &TypeInfo,
    ) -> Result<Shape, JdwpError> {
        if let Some(spec) = unbox_spec(&ty.name) {
            return Ok(Shape::Wrapper(spec));
        }
        // Array types only implement `Cloneable` and `Serializable`; skip the lattice search.
        if ty.is_array() {
            return Ok(Shape::Array);
        }
        if self.is_assignable(client, ty, Abstraction::Collection)? {
            return Ok(Shape::Collection);
        }
        if self.is_assignable(client, ty, Abstraction::Map)? {
            return Ok(Shape::Map);
        }
        Ok(Shape::Plain)
    }

    /// Whether `ty` is, extends, or implements `target`.
    ///
    /// Searches breadth-first: direct interfaces, then the superclass, for
    /// every type dequeued. An abstraction the target VM never loaded cannot
    /// have implementations, so the search is skipped entirely.
    pub fn is_assignable<C: JdwpClient + ?Sized>(
        &mut self,
        client: &mut C,
        ty: &TypeInfo,
        target: Abstraction,
    ) -> Result<bool, JdwpError> {
        if let Some(hit) = self.assignable.get(&(ty.id, target)) {
            return Ok(*hit);
        }
        if !self.is_loaded(client, target)? {
            self.assignable.insert((ty.id, target), false);
            return Ok(false);
        }

        let target_name = target.type_name();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([ty.clone()]);
        let mut found = false;
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.name.clone()) {
                continue;
            }
            if current.name == target_name {
                found = true;
                break;
            }
            if let Some(known) = self.assignable.get(&(current.id, target)) {
                if *known {
                    found = true;
                    break;
                }
                continue;
            }
            queue.extend(client.interfaces(current.id)?);
            if current.kind == TypeKind::Class {
                if let Some(parent) = client.superclass(current.id)? {
                    queue.push_back(parent);
                }
            }
        }

        tracing::trace!(
            target: "ctxview.walk",
            type_name = %ty.name,
            abstraction = target_name,
            assignable = found,
            "type lattice search"
        );
        self.assignable.insert((ty.id, target), found);
        Ok(found)
    }

    fn is_loaded<C: JdwpClient + ?Sized>(
        &mut self,
        client: &mut C,
        target: Abstraction,
    ) -> Result<bool, JdwpError> {
        if let Some(loaded) = self.loaded.get(&target) {
            return Ok(*loaded);
        }
        let loaded = !client.classes_by_name(target.type_name())?.is_empty();
        self.loaded.insert(target, loaded);
        Ok(loaded)
    }

    /// Non-static fields of `ty` and its superclasses, most-derived first.
    pub fn instance_fields<C: JdwpClient + ?Sized>(
        &mut self,
        client: &mut C,
        ty: &TypeInfo,
    ) -> Result<Vec<FieldInfo>, JdwpError> {
        if let Some(fields) = self.fields.get(&ty.id) {
            return Ok(fields.clone());
        }

        let mut fields = Vec::new();
        let mut current = Some(ty.clone());
        while let Some(class) = current {
            fields.extend(
                client
                    .declared_fields(class.id)?
                    .into_iter()
                    .filter(|field| !field.is_static()),
            );
            current = match class.kind {
                TypeKind::Class => client.superclass(class.id)?,
                TypeKind::Interface | TypeKind::Array => None,
            };
        }

        self.fields.insert(ty.id, fields.clone());
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxview_jdwp::{MockJdwpClient, FIELD_MODIFIER_STATIC};

    fn type_of(vm: &mut MockJdwpClient, obj: ObjectRef) -> TypeInfo {
        vm.object_type(obj.id).unwrap()
    }

    #[test]
    fn classify_uses_the_value_tag() {
        let mut vm = MockJdwpClient::with_jdk_types();
        let s = vm.new_string("hi");
        let list = vm.new_list(Vec::new());

        assert_eq!(classify(&JdwpValue::Null), ValueClass::Null);
        assert_eq!(
            classify(&JdwpValue::Int(3)),
            ValueClass::Primitive(PrimitiveKind::Int)
        );
        assert_eq!(
            classify(&JdwpValue::Char(u16::from(b'x'))),
            ValueClass::Primitive(PrimitiveKind::Char)
        );
        assert_eq!(classify(&JdwpValue::Object(s)), ValueClass::String(s));
        assert_eq!(classify(&JdwpValue::Object(list)), ValueClass::Object(list));
    }

    #[test]
    fn unbox_table_covers_all_wrappers() {
        assert_eq!(UNBOX.len(), 8);
        let spec = unbox_spec("java.lang.Character").unwrap();
        assert_eq!((spec.method, spec.signature), ("charValue", "()C"));
        assert!(unbox_spec("java.lang.Number").is_none());
    }

    #[test]
    fn shapes_of_jdk_types() {
        let mut vm = MockJdwpClient::with_jdk_types();
        let boxed = vm.new_boxed(JdwpValue::Long(7));
        let list = vm.new_list(Vec::new());
        let set = vm.new_collection("java.util.HashSet", Vec::new());
        let map = vm.new_map("java.util.LinkedHashMap", Vec::new());
        let array = vm.new_array("int", Vec::new());
        let plain = vm.new_object("com.example.Order");

        let mut classifier = TypeClassifier::new();
        let mut shape = |vm: &mut MockJdwpClient, obj| {
            let ty = type_of(vm, obj);
            classifier.shape(vm, &ty).unwrap()
        };

        assert_eq!(shape(&mut vm, boxed), Shape::Wrapper(&UNBOX[1]));
        assert_eq!(shape(&mut vm, list), Shape::Collection);
        assert_eq!(shape(&mut vm, set), Shape::Collection);
        assert_eq!(shape(&mut vm, map), Shape::Map);
        assert_eq!(shape(&mut vm, array), Shape::Array);
        assert_eq!(shape(&mut vm, plain), Shape::Plain);
    }

    #[test]
    fn assignability_follows_superclass_then_interfaces() {
        let mut vm = MockJdwpClient::with_jdk_types();
        vm.define_interface("com.example.Bag", &["java.util.List"]);
        vm.define_class("com.example.BaseBag", None, &["com.example.Bag"]);
        vm.define_class("com.example.TaggedBag", Some("com.example.BaseBag"), &[]);
        let bag = vm.new_object("com.example.TaggedBag");

        let ty = type_of(&mut vm, bag);
        let mut classifier = TypeClassifier::new();
        assert!(classifier
            .is_assignable(&mut vm, &ty, Abstraction::Collection)
            .unwrap());
        assert!(!classifier
            .is_assignable(&mut vm, &ty, Abstraction::Map)
            .unwrap());
    }

    #[test]
    fn interface_cycles_terminate() {
        let mut vm = MockJdwpClient::with_jdk_types();
        vm.define_interface("com.example.A", &["com.example.B"]);
        vm.define_interface("com.example.B", &["com.example.A"]);
        vm.define_class("com.example.Loop", None, &["com.example.A"]);
        let obj = vm.new_object("com.example.Loop");

        let ty = type_of(&mut vm, obj);
        let mut classifier = TypeClassifier::new();
        assert!(!classifier
            .is_assignable(&mut vm, &ty, Abstraction::Map)
            .unwrap());
    }

    #[test]
    fn unloaded_abstraction_is_never_assignable() {
        let mut vm = MockJdwpClient::new();
        let obj = vm.new_object("com.example.Widget");

        let ty = type_of(&mut vm, obj);
        let mut classifier = TypeClassifier::new();
        assert!(!classifier
            .is_assignable(&mut vm, &ty, Abstraction::Collection)
            .unwrap());
        assert_eq!(classifier.shape(&mut vm, &ty).unwrap(), Shape::Plain);
    }

    #[test]
    fn instance_fields_are_most_derived_first_without_statics() {
        let mut vm = MockJdwpClient::with_jdk_types();
        let base = vm.define_class("com.example.Base", None, &[]);
        let derived = vm.define_class("com.example.Derived", Some("com.example.Base"), &[]);
        vm.add_field(base, "id", "J", 0);
        vm.add_field(derived, "name", "Ljava/lang/String;", 0);
        vm.add_field(derived, "COUNT", "I", FIELD_MODIFIER_STATIC);
        vm.add_field(derived, "flag", "Z", 0);
        let obj = vm.new_object("com.example.Derived");

        let ty = type_of(&mut vm, obj);
        let mut classifier = TypeClassifier::new();
        let names: Vec<_> = classifier
            .instance_fields(&mut vm, &ty)
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, ["name", "flag", "id"]);
    }
}
