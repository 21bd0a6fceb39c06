//! Recursive conversion of remote values into [`TreeNode`]s.

use std::collections::HashSet;

use ctxview_jdwp::{tag, JdwpClient, JdwpValue, ObjectId, ObjectRef, ThreadId, TypeInfo};
use indexmap::IndexMap;

use crate::classify::{classify, Shape, TypeClassifier, UnboxSpec, ValueClass};
use crate::error::{Result, SnapshotError};
use crate::invoker::{pin_temporary, release_temporary, RemoteInvoker};
use crate::tree::{NodeValue, Scalar, TreeNode};

/// Identities being expanded on the active recursion chain.
///
/// Only ancestors are tracked: an object reachable through two disjoint paths
/// is expanded in full on both.
#[derive(Debug, Default)]
pub struct AncestorPath {
    ids: HashSet<ObjectId>,
}

impl AncestorPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.ids.contains(&id)
    }

    /// Returns `false` if `id` was already on the path.
    pub fn enter(&mut self, id: ObjectId) -> bool {
        self.ids.insert(id)
    }

    pub fn leave(&mut self, id: ObjectId) {
        self.ids.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Optional bounds on a single walk. Unbounded by default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WalkLimits {
    /// Maximum container nesting below the root.
    pub max_depth: Option<usize>,
    /// Maximum number of tree nodes produced.
    pub max_nodes: Option<usize>,
}

/// Converts remote values into handle-free trees.
///
/// Every remote access goes through `client` sequentially; invocations run on
/// the paused thread the walker was created for.
pub struct GraphWalker<'a, C: JdwpClient + ?Sized> {
    client: &'a mut C,
    invoker: RemoteInvoker,
    classifier: TypeClassifier,
    limits: WalkLimits,
    nodes: usize,
}

impl<'a, C: JdwpClient + ?Sized> GraphWalker<'a, C> {
    pub fn new(client: &'a mut C, thread: ThreadId) -> Self {
        Self::with_invoker(client, RemoteInvoker::new(thread))
    }

    pub fn with_invoker(client: &'a mut C, invoker: RemoteInvoker) -> Self {
        Self {
            client,
            invoker,
            classifier: TypeClassifier::new(),
            limits: WalkLimits::default(),
            nodes: 0,
        }
    }

    pub fn with_limits(mut self, limits: WalkLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Nodes produced so far.
    pub fn nodes(&self) -> usize {
        self.nodes
    }

    /// Walk `value` from a fresh ancestor path.
    pub fn walk(&mut self, value: &JdwpValue) -> Result<TreeNode> {
        let mut path = AncestorPath::new();
        self.convert(value, &mut path, 0)
    }

    /// Convert one value. `path` is left exactly as it was found, whether
    /// the conversion succeeds or fails.
    pub fn convert(
        &mut self,
        value: &JdwpValue,
        path: &mut AncestorPath,
        depth: usize,
    ) -> Result<TreeNode> {
        self.nodes += 1;
        if let Some(max) = self.limits.max_nodes {
            if self.nodes > max {
                return Err(SnapshotError::LimitExceeded { limit: "node", max });
            }
        }
        if let Some(max) = self.limits.max_depth {
            if depth > max {
                return Err(SnapshotError::LimitExceeded { limit: "depth", max });
            }
        }
        self.convert_value(value, path, depth).map(TreeNode::new)
    }

    fn convert_value(
        &mut self,
        value: &JdwpValue,
        path: &mut AncestorPath,
        depth: usize,
    ) -> Result<NodeValue> {
        let obj = match classify(value) {
            ValueClass::Null => return Ok(NodeValue::Null),
            ValueClass::String(obj) => {
                let text = self.client.string_value(obj.id)?;
                return Ok(NodeValue::Scalar(Scalar::String(text)));
            }
            ValueClass::Primitive(_) => {
                return Ok(primitive_scalar(value).map_or(NodeValue::Null, NodeValue::Scalar));
            }
            ValueClass::Object(obj) => obj,
        };

        if path.contains(obj.id) {
            tracing::trace!(target: "ctxview.walk", object = obj.id, "circular reference");
            return Ok(NodeValue::Circular { object_id: obj.id });
        }

        path.enter(obj.id);
        let expanded = self.expand(obj, path, depth);
        path.leave(obj.id);
        expanded
    }

    fn expand(
        &mut self,
        obj: ObjectRef,
        path: &mut AncestorPath,
        depth: usize,
    ) -> Result<NodeValue> {
        let ty = self.client.object_type(obj.id)?;
        let shape = self.classifier.shape(&mut *self.client, &ty)?;
        tracing::trace!(
            target: "ctxview.walk",
            object = obj.id,
            type_name = %ty.name,
            ?shape,
            depth,
            "expanding object"
        );

        match shape {
            Shape::Wrapper(spec) => self.unbox(obj, spec, path, depth),
            Shape::Collection => self.expand_collection(obj, path, depth),
            Shape::Map => self.expand_map(obj, path, depth),
            Shape::Array => self.expand_array(obj, path, depth),
            Shape::Plain => self.expand_fields(obj, &ty, path, depth),
        }
    }

    fn unbox(
        &mut self,
        obj: ObjectRef,
        spec: &'static UnboxSpec,
        path: &mut AncestorPath,
        depth: usize,
    ) -> Result<NodeValue> {
        let value = self
            .invoker
            .invoke(&mut *self.client, obj, spec.method, spec.signature, &[])?;
        self.convert_value(&value, path, depth)
    }

    fn expand_collection(
        &mut self,
        obj: ObjectRef,
        path: &mut AncestorPath,
        depth: usize,
    ) -> Result<NodeValue> {
        let iterator = self.call_for_object(obj, "iterator", "()Ljava/util/Iterator;")?;
        self.with_pinned(iterator, |walker| {
            let mut children = Vec::new();
            while walker.has_next(iterator)? {
                let element = walker.invoker.invoke(
                    &mut *walker.client,
                    iterator,
                    "next",
                    "()Ljava/lang/Object;",
                    &[],
                )?;
                children.push(walker.convert(&element, path, depth + 1)?);
            }
            Ok(NodeValue::Array(children))
        })
    }

    fn expand_map(
        &mut self,
        obj: ObjectRef,
        path: &mut AncestorPath,
        depth: usize,
    ) -> Result<NodeValue> {
        let entries = self.call_for_object(obj, "entrySet", "()Ljava/util/Set;")?;
        self.with_pinned(entries, |walker| {
            let iterator =
                walker.call_for_object(entries, "iterator", "()Ljava/util/Iterator;")?;
            walker.with_pinned(iterator, |walker| {
                let mut children: IndexMap<String, TreeNode> = IndexMap::new();
                while walker.has_next(iterator)? {
                    let entry =
                        walker.call_for_object(iterator, "next", "()Ljava/lang/Object;")?;
                    let (key, value) = walker.with_pinned(entry, |walker| {
                        let key = walker.invoker.invoke(
                            &mut *walker.client,
                            entry,
                            "getKey",
                            "()Ljava/lang/Object;",
                            &[],
                        )?;
                        let value = walker.invoker.invoke(
                            &mut *walker.client,
                            entry,
                            "getValue",
                            "()Ljava/lang/Object;",
                            &[],
                        )?;
                        Ok((key, value))
                    })?;
                    let label = walker.key_label(&key)?;
                    let child = walker.convert(&value, path, depth + 1)?;
                    // Re-inserting an existing label keeps its position and takes the new value.
                    children.insert(label, child);
                }
                Ok(labeled_object(children))
            })
        })
    }

    /// Run `f` with collection of the temporary `object` disabled.
    fn with_pinned<T>(
        &mut self,
        object: ObjectRef,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let pinned = pin_temporary(&mut *self.client, object);
        let result = f(self);
        if pinned {
            release_temporary(&mut *self.client, object);
        }
        result
    }

    fn expand_array(
        &mut self,
        obj: ObjectRef,
        path: &mut AncestorPath,
        depth: usize,
    ) -> Result<NodeValue> {
        let elements = self.client.array_values(obj.id)?;
        let mut children = Vec::with_capacity(elements.len());
        for element in &elements {
            children.push(self.convert(element, path, depth + 1)?);
        }
        Ok(NodeValue::Array(children))
    }

    fn expand_fields(
        &mut self,
        obj: ObjectRef,
        ty: &TypeInfo,
        path: &mut AncestorPath,
        depth: usize,
    ) -> Result<NodeValue> {
        let fields = self.classifier.instance_fields(&mut *self.client, ty)?;
        if fields.is_empty() {
            return Ok(NodeValue::Object(Vec::new()));
        }

        let ids: Vec<_> = fields.iter().map(|field| field.id).collect();
        let values = self.client.field_values(obj.id, &ids)?;

        let mut children: IndexMap<String, TreeNode> = IndexMap::new();
        for (field, value) in fields.into_iter().zip(&values) {
            let child = self.convert(value, path, depth + 1)?;
            children.insert(field.name, child);
        }
        Ok(labeled_object(children))
    }

    fn has_next(&mut self, iterator: ObjectRef) -> Result<bool> {
        match self
            .invoker
            .invoke(&mut *self.client, iterator, "hasNext", "()Z", &[])?
        {
            JdwpValue::Boolean(more) => Ok(more),
            other => {
                let type_name = self
                    .client
                    .object_type(iterator.id)
                    .map(|ty| ty.name)
                    .unwrap_or_else(|_| "java.util.Iterator".to_string());
                Err(SnapshotError::RemoteInvocationFailure {
                    type_name,
                    name: "hasNext".to_string(),
                    signature: "()Z".to_string(),
                    reason: format!("returned {other:?} instead of a boolean"),
                })
            }
        }
    }

    /// Invoke a method whose result must be a non-null object.
    fn call_for_object(
        &mut self,
        target: ObjectRef,
        name: &'static str,
        signature: &'static str,
    ) -> Result<ObjectRef> {
        let value = self
            .invoker
            .invoke(&mut *self.client, target, name, signature, &[])?;
        value.object().ok_or_else(|| SnapshotError::NotAnObjectReference {
            name: format!("{name}()"),
        })
    }

    /// Text a map key is shown under: strings verbatim, anything else in the
    /// debugger's default `toString` form.
    fn key_label(&mut self, key: &JdwpValue) -> Result<String> {
        Ok(match classify(key) {
            ValueClass::Null => "null".to_string(),
            ValueClass::String(obj) => self.client.string_value(obj.id)?,
            ValueClass::Primitive(_) => primitive_scalar(key)
                .map(|scalar| scalar.to_string())
                .unwrap_or_default(),
            ValueClass::Object(obj) => self.object_label(obj)?,
        })
    }

    fn object_label(&mut self, obj: ObjectRef) -> Result<String> {
        let ty = self.client.object_type(obj.id)?;
        if ty.is_array() {
            let length = self.client.array_values(obj.id)?.len();
            let component = ty.name.strip_suffix("[]").unwrap_or(&ty.name);
            return Ok(format!("instance of {component}[{length}] (id={})", obj.id));
        }

        match obj.tag {
            tag::CLASS_OBJECT => {
                let reflected = self.client.reflected_type(obj.id)?;
                Ok(format!(
                    "instance of {}(reflected class={}, id={})",
                    ty.name, reflected.name, obj.id
                ))
            }
            tag::THREAD => {
                let name = self
                    .client
                    .threads()?
                    .into_iter()
                    .find(|thread| thread.id == obj.id)
                    .map(|thread| thread.name);
                Ok(match name {
                    Some(name) => format!("instance of {}(name='{name}', id={})", ty.name, obj.id),
                    None => format!("instance of {}(id={})", ty.name, obj.id),
                })
            }
            _ => Ok(format!("instance of {}(id={})", ty.name, obj.id)),
        }
    }
}

fn labeled_object(children: IndexMap<String, TreeNode>) -> NodeValue {
    NodeValue::Object(
        children
            .into_iter()
            .map(|(label, node)| node.with_label(label))
            .collect(),
    )
}

pub(crate) fn primitive_scalar(value: &JdwpValue) -> Option<Scalar> {
    Some(match value {
        JdwpValue::Boolean(v) => Scalar::Boolean(*v),
        JdwpValue::Char(v) => {
            Scalar::Char(char::from_u32(u32::from(*v)).unwrap_or(char::REPLACEMENT_CHARACTER))
        }
        JdwpValue::Byte(v) => Scalar::Byte(*v),
        JdwpValue::Short(v) => Scalar::Short(*v),
        JdwpValue::Int(v) => Scalar::Int(*v),
        JdwpValue::Long(v) => Scalar::Long(*v),
        JdwpValue::Float(v) => Scalar::Float(*v),
        JdwpValue::Double(v) => Scalar::Double(*v),
        JdwpValue::Null | JdwpValue::Void | JdwpValue::Object(_) => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::NodeKind;
    use ctxview_jdwp::MockJdwpClient;
    use pretty_assertions::assert_eq;

    fn paused_vm() -> (MockJdwpClient, ThreadId) {
        let mut vm = MockJdwpClient::with_jdk_types();
        let thread = vm.add_thread("main", true);
        (vm, thread)
    }

    fn string(vm: &mut MockJdwpClient, text: &str) -> JdwpValue {
        JdwpValue::Object(vm.new_string(text))
    }

    fn int(value: i32) -> NodeValue {
        NodeValue::Scalar(Scalar::Int(value))
    }

    fn walk(vm: &mut MockJdwpClient, thread: ThreadId, value: JdwpValue) -> TreeNode {
        GraphWalker::new(vm, thread).walk(&value).unwrap()
    }

    #[test]
    fn scalars_and_null_are_leaves() {
        let (mut vm, thread) = paused_vm();
        let hi = string(&mut vm, "hi");

        assert_eq!(walk(&mut vm, thread, JdwpValue::Null).value, NodeValue::Null);
        assert_eq!(walk(&mut vm, thread, JdwpValue::Int(5)).value, int(5));
        assert_eq!(
            walk(&mut vm, thread, JdwpValue::Char(u16::from(b'q'))).value,
            NodeValue::Scalar(Scalar::Char('q'))
        );
        assert_eq!(
            walk(&mut vm, thread, hi).value,
            NodeValue::Scalar(Scalar::String("hi".to_string()))
        );
        assert!(vm.invocations.is_empty());
    }

    #[test]
    fn map_of_scalars_and_list() {
        let (mut vm, thread) = paused_vm();
        let one = JdwpValue::Object(vm.new_boxed(JdwpValue::Int(1)));
        let yes = JdwpValue::Object(vm.new_boxed(JdwpValue::Boolean(true)));
        let list = vm.new_list(vec![yes, JdwpValue::Null]);
        let a = string(&mut vm, "a");
        let b = string(&mut vm, "b");
        let map = vm.new_map(
            "java.util.LinkedHashMap",
            vec![(a, one), (b, JdwpValue::Object(list))],
        );

        let tree = walk(&mut vm, thread, JdwpValue::Object(map));
        assert_eq!(
            tree.value,
            NodeValue::Object(vec![
                TreeNode::labeled("a", int(1)),
                TreeNode::labeled(
                    "b",
                    NodeValue::Array(vec![
                        TreeNode::new(NodeValue::Scalar(Scalar::Boolean(true))),
                        TreeNode::new(NodeValue::Null),
                    ])
                ),
            ])
        );
    }

    #[test]
    fn self_referential_list_yields_one_circular_leaf() {
        let (mut vm, thread) = paused_vm();
        let list = vm.new_list(Vec::new());
        vm.push_element(list, JdwpValue::Object(list));

        let tree = walk(&mut vm, thread, JdwpValue::Object(list));
        assert_eq!(
            tree.value,
            NodeValue::Array(vec![TreeNode::new(NodeValue::Circular {
                object_id: list.id
            })])
        );
    }

    #[test]
    fn shared_but_acyclic_values_are_expanded_on_every_path() {
        let (mut vm, thread) = paused_vm();
        let point = vm.new_object("com.example.Point");
        vm.set_field(point, "x", JdwpValue::Int(1));
        vm.set_field(point, "y", JdwpValue::Int(2));
        let array = vm.new_array(
            "com.example.Point",
            vec![JdwpValue::Object(point), JdwpValue::Object(point)],
        );

        let tree = walk(&mut vm, thread, JdwpValue::Object(array));
        let expected = TreeNode::new(NodeValue::Object(vec![
            TreeNode::labeled("x", int(1)),
            TreeNode::labeled("y", int(2)),
        ]));
        assert_eq!(tree.value, NodeValue::Array(vec![expected.clone(), expected]));
    }

    #[test]
    fn mutual_cycle_through_fields() {
        let (mut vm, thread) = paused_vm();
        let parent = vm.new_object("com.example.Node");
        let child = vm.new_object("com.example.Node");
        vm.set_field(parent, "next", JdwpValue::Object(child));
        vm.set_field(child, "next", JdwpValue::Object(parent));

        let tree = walk(&mut vm, thread, JdwpValue::Object(parent));
        let next = tree.get("next").unwrap();
        assert_eq!(
            next.get("next").map(|n| n.value.clone()),
            Some(NodeValue::Circular {
                object_id: parent.id
            })
        );
    }

    #[test]
    fn every_wrapper_unboxes_to_a_bare_scalar() {
        let (mut vm, thread) = paused_vm();
        let cases = [
            (JdwpValue::Int(-4), Scalar::Int(-4)),
            (JdwpValue::Long(9), Scalar::Long(9)),
            (JdwpValue::Short(3), Scalar::Short(3)),
            (JdwpValue::Byte(-1), Scalar::Byte(-1)),
            (JdwpValue::Float(1.5), Scalar::Float(1.5)),
            (JdwpValue::Double(2.0), Scalar::Double(2.0)),
            (JdwpValue::Char(u16::from(b'z')), Scalar::Char('z')),
            (JdwpValue::Boolean(false), Scalar::Boolean(false)),
        ];
        for (primitive, expected) in cases {
            let boxed = vm.new_boxed(primitive);
            let tree = walk(&mut vm, thread, JdwpValue::Object(boxed));
            assert_eq!(tree.value, NodeValue::Scalar(expected));
        }
        assert_eq!(vm.invocations.len(), 8);
    }

    #[test]
    fn plain_object_fields_in_declaration_order() {
        let (mut vm, thread) = paused_vm();
        let obj = vm.new_object("com.example.Greeting");
        let hi = string(&mut vm, "hi");
        vm.set_field(obj, "x", JdwpValue::Int(5));
        vm.set_field(obj, "name", hi);

        let tree = walk(&mut vm, thread, JdwpValue::Object(obj));
        assert_eq!(
            tree.value,
            NodeValue::Object(vec![
                TreeNode::labeled("x", int(5)),
                TreeNode::labeled("name", NodeValue::Scalar(Scalar::String("hi".into()))),
            ])
        );
    }

    #[test]
    fn inherited_fields_follow_own_fields() {
        let (mut vm, thread) = paused_vm();
        let base = vm.define_class("com.example.Entity", None, &[]);
        vm.add_field(base, "id", "J", 0);
        let order = vm.define_class("com.example.Order", Some("com.example.Entity"), &[]);
        vm.add_field(order, "total", "I", 0);
        let obj = vm.new_object("com.example.Order");
        vm.set_field(obj, "id", JdwpValue::Long(10));
        vm.set_field(obj, "total", JdwpValue::Int(99));

        let tree = walk(&mut vm, thread, JdwpValue::Object(obj));
        let labels: Vec<_> = tree
            .children()
            .iter()
            .filter_map(|c| c.label.clone())
            .collect();
        assert_eq!(labels, ["total", "id"]);
    }

    #[test]
    fn non_string_keys_use_default_text_and_collisions_keep_first_position() {
        let (mut vm, thread) = paused_vm();
        let boxed_key = vm.new_boxed(JdwpValue::Int(7));
        let text_key = string(&mut vm, "null");
        let map = vm.new_map(
            "java.util.LinkedHashMap",
            vec![
                (JdwpValue::Null, JdwpValue::Int(1)),
                (JdwpValue::Object(boxed_key), JdwpValue::Int(2)),
                (text_key, JdwpValue::Int(3)),
            ],
        );

        let tree = walk(&mut vm, thread, JdwpValue::Object(map));
        assert_eq!(
            tree.value,
            NodeValue::Object(vec![
                TreeNode::labeled("null", int(3)),
                TreeNode::labeled(
                    format!("instance of java.lang.Integer(id={})", boxed_key.id),
                    int(2)
                ),
            ])
        );
    }

    #[test]
    fn array_class_and_thread_keys_use_their_debugger_text() {
        let (mut vm, thread) = paused_vm();
        let array = vm.new_array("int", vec![JdwpValue::Int(1), JdwpValue::Int(2)]);
        let class_object = vm.new_class_object("java.util.HashMap");
        let thread_ref = ObjectRef::new(thread, tag::THREAD);
        let map = vm.new_map(
            "java.util.LinkedHashMap",
            vec![
                (JdwpValue::Object(array), JdwpValue::Int(1)),
                (JdwpValue::Object(class_object), JdwpValue::Int(2)),
                (JdwpValue::Object(thread_ref), JdwpValue::Int(3)),
            ],
        );

        let tree = walk(&mut vm, thread, JdwpValue::Object(map));
        let labels: Vec<_> = tree
            .children()
            .iter()
            .filter_map(|c| c.label.clone())
            .collect();
        assert_eq!(
            labels,
            [
                format!("instance of int[2] (id={})", array.id),
                format!(
                    "instance of java.lang.Class(reflected class=java.util.HashMap, id={})",
                    class_object.id
                ),
                format!("instance of java.lang.Thread(name='main', id={thread})"),
            ]
        );
    }

    #[test]
    fn temporaries_stay_pinned_while_their_loop_runs() {
        let (mut vm, thread) = paused_vm();
        vm.set_collect_on_invoke(true);
        let one = JdwpValue::Object(vm.new_boxed(JdwpValue::Int(1)));
        let two = JdwpValue::Object(vm.new_boxed(JdwpValue::Int(2)));
        let list = vm.new_list(vec![one, two]);
        let key = string(&mut vm, "items");
        let three = JdwpValue::Object(vm.new_boxed(JdwpValue::Int(3)));
        let other = string(&mut vm, "count");
        let map = vm.new_map(
            "java.util.HashMap",
            vec![(key, JdwpValue::Object(list)), (other, three)],
        );

        let tree = walk(&mut vm, thread, JdwpValue::Object(map));
        assert_eq!(
            tree.value,
            NodeValue::Object(vec![
                TreeNode::labeled(
                    "items",
                    NodeValue::Array(vec![TreeNode::new(int(1)), TreeNode::new(int(2))])
                ),
                TreeNode::labeled("count", int(3)),
            ])
        );
        assert!(vm.pinned_objects().is_empty());
    }

    #[test]
    fn non_boolean_has_next_reports_the_iterator_class() {
        let (mut vm, thread) = paused_vm();
        let iterator = vm.define_class("com.example.OddIterator", None, &["java.util.Iterator"]);
        vm.add_method(
            iterator,
            "hasNext",
            "()Z",
            ctxview_jdwp::MockMethodBody::Return(JdwpValue::Int(1)),
        );
        let list = vm.define_class("com.example.OddList", Some("java.util.AbstractList"), &[]);
        vm.add_method(
            list,
            "iterator",
            "()Ljava/util/Iterator;",
            ctxview_jdwp::MockMethodBody::Iterator {
                iterator_class: "com.example.OddIterator".to_string(),
            },
        );
        let odd = vm.new_collection("com.example.OddList", vec![JdwpValue::Int(1)]);

        let err = GraphWalker::new(&mut vm, thread)
            .walk(&JdwpValue::Object(odd))
            .unwrap_err();
        assert!(matches!(
            &err,
            SnapshotError::RemoteInvocationFailure { type_name, name, .. }
                if type_name == "com.example.OddIterator" && name == "hasNext"
        ));
    }

    #[test]
    fn unfamiliar_types_fall_back_to_fields() {
        let (mut vm, thread) = paused_vm();
        let obj = vm.new_object("org.acme.Unheard");
        vm.set_field(obj, "count", JdwpValue::Short(2));

        let tree = walk(&mut vm, thread, JdwpValue::Object(obj));
        assert_eq!(tree.kind(), NodeKind::Object);
        assert_eq!(
            tree.get("count").and_then(TreeNode::scalar),
            Some(&Scalar::Short(2))
        );
    }

    #[test]
    fn failed_branch_leaves_the_ancestor_path_clean() {
        let (mut vm, thread) = paused_vm();
        let inner = vm.new_object("com.example.Inner");
        let outer = vm.new_object("com.example.Outer");
        vm.set_field(outer, "inner", JdwpValue::Object(inner));
        vm.collect_object(inner.id);

        let mut path = AncestorPath::new();
        let mut walker = GraphWalker::new(&mut vm, thread);
        let err = walker
            .convert(&JdwpValue::Object(outer), &mut path, 0)
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Jdwp(_)));
        assert!(path.is_empty());
    }

    #[test]
    fn failing_iterator_aborts_the_walk() {
        let (mut vm, thread) = paused_vm();
        let class = vm.define_class(
            "com.example.BrokenList",
            Some("java.util.AbstractList"),
            &[],
        );
        vm.add_method(
            class,
            "iterator",
            "()Ljava/util/Iterator;",
            ctxview_jdwp::MockMethodBody::Throw("java.lang.IllegalStateException".to_string()),
        );
        let list = vm.new_object("com.example.BrokenList");

        let err = GraphWalker::new(&mut vm, thread)
            .walk(&JdwpValue::Object(list))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "remote call com.example.BrokenList.iterator()Ljava/util/Iterator; failed: \
             threw java.lang.IllegalStateException"
        );
    }

    #[test]
    fn limits_bound_depth_and_node_count() {
        let (mut vm, thread) = paused_vm();
        let inner = vm.new_list(vec![JdwpValue::Int(1), JdwpValue::Int(2)]);
        let outer = vm.new_list(vec![JdwpValue::Object(inner)]);

        let err = GraphWalker::new(&mut vm, thread)
            .with_limits(WalkLimits {
                max_depth: Some(1),
                max_nodes: None,
            })
            .walk(&JdwpValue::Object(outer))
            .unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::LimitExceeded { limit: "depth", max: 1 }
        ));

        let err = GraphWalker::new(&mut vm, thread)
            .with_limits(WalkLimits {
                max_depth: None,
                max_nodes: Some(3),
            })
            .walk(&JdwpValue::Object(outer))
            .unwrap_err();
        assert!(matches!(
            err,
            SnapshotError::LimitExceeded { limit: "node", max: 3 }
        ));

        let mut walker = GraphWalker::new(&mut vm, thread).with_limits(WalkLimits {
            max_depth: Some(2),
            max_nodes: Some(4),
        });
        let tree = walker.walk(&JdwpValue::Object(outer)).unwrap();
        assert_eq!(tree.node_count(), 4);
        assert_eq!(walker.nodes(), 4);
    }
}
