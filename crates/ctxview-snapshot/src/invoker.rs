use std::collections::{HashMap, HashSet, VecDeque};

use ctxview_jdwp::{
    JdwpClient, JdwpValue, MethodId, ObjectRef, ReferenceTypeId, ThreadId, TypeInfo, TypeKind,
};

use crate::error::{Result, SnapshotError};

type MethodKey = (ReferenceTypeId, &'static str, &'static str);

/// Issues single-threaded method calls on the paused thread.
///
/// Lookup follows `ReferenceType.methodsByName`: methods declared on the
/// runtime type, then on each superclass, then on the interface lattice
/// (default methods). The first match wins; there is no overload resolution
/// beyond the exact name and signature.
#[derive(Debug)]
pub struct RemoteInvoker {
    thread: ThreadId,
    methods: HashMap<MethodKey, Option<(ReferenceTypeId, MethodId)>>,
}

impl RemoteInvoker {
    pub fn new(thread: ThreadId) -> Self {
        Self {
            thread,
            methods: HashMap::new(),
        }
    }

    /// Call `name` with `signature` on `target`.
    pub fn invoke<C: JdwpClient + ?Sized>(
        &mut self,
        client: &mut C,
        target: ObjectRef,
        name: &'static str,
        signature: &'static str,
        args: &[JdwpValue],
    ) -> Result<JdwpValue> {
        let ty = client.object_type(target.id)?;
        let Some((class, method)) = self.find_method(client, &ty, name, signature)? else {
            return Err(SnapshotError::NoSuchRemoteMethod {
                type_name: ty.name,
                name: name.to_string(),
                signature: signature.to_string(),
            });
        };

        tracing::trace!(
            target: "ctxview.invoke",
            object = target.id,
            type_name = %ty.name,
            method = name,
            signature,
            "invoking remote method"
        );

        let failure = |reason: String| SnapshotError::RemoteInvocationFailure {
            type_name: ty.name.clone(),
            name: name.to_string(),
            signature: signature.to_string(),
            reason,
        };

        let result = client
            .invoke_method(target.id, self.thread, class, method, args)
            .map_err(|err| failure(err.to_string()))?;

        if let Some(exception) = result.exception {
            let exception_type = client
                .object_type(exception.id)
                .map(|ty| ty.name)
                .unwrap_or_else(|_| "<unknown exception>".to_string());
            tracing::debug!(
                target: "ctxview.invoke",
                type_name = %ty.name,
                method = name,
                exception = %exception_type,
                "remote method threw"
            );
            return Err(failure(format!("threw {exception_type}")));
        }

        Ok(result.value)
    }

    /// Resolve `name`/`signature` against the lattice of `ty`.
    ///
    /// Returns the declaring type and method id of the first match.
    pub fn find_method<C: JdwpClient + ?Sized>(
        &mut self,
        client: &mut C,
        ty: &TypeInfo,
        name: &'static str,
        signature: &'static str,
    ) -> Result<Option<(ReferenceTypeId, MethodId)>> {
        let key = (ty.id, name, signature);
        if let Some(hit) = self.methods.get(&key) {
            return Ok(*hit);
        }

        let mut classes = Vec::new();
        let mut current = Some(ty.clone());
        while let Some(class) = current {
            current = match class.kind {
                TypeKind::Class => client.superclass(class.id)?,
                TypeKind::Interface | TypeKind::Array => None,
            };
            classes.push(class);
        }

        let mut found = None;
        for class in &classes {
            if let Some(method) = declared_match(client, class.id, name, signature)? {
                found = Some((class.id, method));
                break;
            }
        }

        if found.is_none() {
            let mut visited = HashSet::new();
            let mut queue = VecDeque::new();
            for class in &classes {
                queue.extend(client.interfaces(class.id)?);
            }
            while let Some(iface) = queue.pop_front() {
                if !visited.insert(iface.id) {
                    continue;
                }
                if let Some(method) = declared_match(client, iface.id, name, signature)? {
                    found = Some((iface.id, method));
                    break;
                }
                queue.extend(client.interfaces(iface.id)?);
            }
        }

        self.methods.insert(key, found);
        Ok(found)
    }
}

/// Disable collection of an object returned by an invocation so it survives
/// the invocations that follow. Best effort: failures are logged and ignored.
///
/// Returns whether the pin took, i.e. whether [`release_temporary`] is owed.
/// Only pin temporaries: enable/disable is not reference counted, so releasing
/// would also undo a pin someone else holds.
pub(crate) fn pin_temporary<C: JdwpClient + ?Sized>(client: &mut C, object: ObjectRef) -> bool {
    if object.id == 0 {
        return false;
    }
    match client.disable_collection(object.id) {
        Ok(()) => true,
        Err(err) => {
            tracing::trace!(
                target: "ctxview.invoke",
                object = object.id,
                error = %err,
                "failed to disable collection"
            );
            false
        }
    }
}

pub(crate) fn release_temporary<C: JdwpClient + ?Sized>(client: &mut C, object: ObjectRef) {
    if let Err(err) = client.enable_collection(object.id) {
        tracing::trace!(
            target: "ctxview.invoke",
            object = object.id,
            error = %err,
            "failed to re-enable collection"
        );
    }
}

fn declared_match<C: JdwpClient + ?Sized>(
    client: &mut C,
    type_id: ReferenceTypeId,
    name: &str,
    signature: &str,
) -> Result<Option<MethodId>> {
    Ok(client
        .declared_methods(type_id)?
        .into_iter()
        .find(|m| m.name == name && m.signature == signature)
        .map(|m| m.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxview_jdwp::{MockJdwpClient, MockMethodBody};
    use pretty_assertions::assert_eq;

    fn paused_vm() -> (MockJdwpClient, ThreadId) {
        let mut vm = MockJdwpClient::with_jdk_types();
        let thread = vm.add_thread("main", true);
        (vm, thread)
    }

    #[test]
    fn unboxes_through_the_declared_accessor() {
        let (mut vm, thread) = paused_vm();
        let boxed = vm.new_boxed(JdwpValue::Int(42));

        let mut invoker = RemoteInvoker::new(thread);
        let value = invoker
            .invoke(&mut vm, boxed, "intValue", "()I", &[])
            .unwrap();
        assert_eq!(value, JdwpValue::Int(42));

        let call = vm.invocations.last().unwrap();
        assert_eq!(call.thread, thread);
        assert_eq!(call.method, "intValue");
        assert_eq!(call.signature, "()I");
    }

    #[test]
    fn lookup_prefers_the_most_derived_declaration() {
        let (mut vm, _) = paused_vm();
        let linked = vm.new_map("java.util.LinkedHashMap", Vec::new());
        let ty = vm.object_type(linked.id).unwrap();
        let hash_map = vm.type_id("java.util.HashMap").unwrap();

        let mut invoker = RemoteInvoker::new(1);
        let (declaring, _) = invoker
            .find_method(&mut vm, &ty, "entrySet", "()Ljava/util/Set;")
            .unwrap()
            .unwrap();
        assert_eq!(declaring, hash_map);
    }

    #[test]
    fn lookup_falls_back_to_interface_methods() {
        let (mut vm, thread) = paused_vm();
        let greeter = vm.define_interface("com.example.Greeter", &[]);
        vm.add_method(
            greeter,
            "greeting",
            "()I",
            MockMethodBody::Return(JdwpValue::Int(7)),
        );
        vm.define_class("com.example.Impl", None, &["com.example.Greeter"]);
        let obj = vm.new_object("com.example.Impl");

        let mut invoker = RemoteInvoker::new(thread);
        let value = invoker.invoke(&mut vm, obj, "greeting", "()I", &[]).unwrap();
        assert_eq!(value, JdwpValue::Int(7));
    }

    #[test]
    fn missing_method_names_type_and_signature() {
        let (mut vm, thread) = paused_vm();
        let obj = vm.new_object("com.example.Opaque");

        let mut invoker = RemoteInvoker::new(thread);
        let err = invoker
            .invoke(&mut vm, obj, "iterator", "()Ljava/util/Iterator;", &[])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "no method iterator()Ljava/util/Iterator; on com.example.Opaque"
        );
    }

    #[test]
    fn thrown_exception_reports_its_type() {
        let (mut vm, thread) = paused_vm();
        let class = vm.define_class("com.example.Fragile", None, &[]);
        vm.add_method(
            class,
            "size",
            "()I",
            MockMethodBody::Throw("java.lang.IllegalStateException".to_string()),
        );
        let obj = vm.new_object("com.example.Fragile");

        let mut invoker = RemoteInvoker::new(thread);
        let err = invoker.invoke(&mut vm, obj, "size", "()I", &[]).unwrap_err();
        match err {
            SnapshotError::RemoteInvocationFailure {
                type_name, reason, ..
            } => {
                assert_eq!(type_name, "com.example.Fragile");
                assert_eq!(reason, "threw java.lang.IllegalStateException");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn running_thread_is_an_invocation_failure() {
        let mut vm = MockJdwpClient::with_jdk_types();
        let thread = vm.add_thread("worker", false);
        let boxed = vm.new_boxed(JdwpValue::Boolean(true));

        let mut invoker = RemoteInvoker::new(thread);
        let err = invoker
            .invoke(&mut vm, boxed, "booleanValue", "()Z", &[])
            .unwrap_err();
        assert!(matches!(err, SnapshotError::RemoteInvocationFailure { .. }));
    }
}
