//! Snapshots taken through a real JDWP connection to the in-process mock VM.

use ctxview_jdwp::wire::mock::MockJdwpServer;
use ctxview_jdwp::{JdwpClient, JdwpValue, MockJdwpClient, TcpJdwpClient, ThreadId};
use ctxview_snapshot::materialize::{display_tree, dotted_path, to_json, SchemaGenerator, SchemaOptions};
use ctxview_snapshot::{snapshot, try_snapshot, PausedFrame, RootSource, SnapshotOptions};
use pretty_assertions::assert_eq;
use serde_json::json;

/// A Groovy script paused in `run()` with `_context` bound to an order.
fn script_vm() -> (MockJdwpClient, ThreadId) {
    let mut vm = MockJdwpClient::with_jdk_types();
    let thread = vm.add_thread("main", true);
    vm.add_thread("Signal Dispatcher", false);

    let order = vm.new_object("com.example.Order");
    let id = vm.new_boxed(JdwpValue::Long(7));
    let customer = vm.new_string("ada");
    vm.set_field(order, "id", JdwpValue::Object(id));
    vm.set_field(order, "customer", JdwpValue::Object(customer));

    let sku = vm.new_string("A-1");
    let qty = vm.new_boxed(JdwpValue::Int(2));
    let sku_key = vm.new_string("sku");
    let qty_key = vm.new_string("qty");
    let line = vm.new_map(
        "java.util.LinkedHashMap",
        vec![
            (JdwpValue::Object(sku_key), JdwpValue::Object(sku)),
            (JdwpValue::Object(qty_key), JdwpValue::Object(qty)),
        ],
    );
    let lines = vm.new_list(vec![JdwpValue::Object(line)]);
    vm.set_field(order, "lines", JdwpValue::Object(lines));
    let scores = vm.new_array("double", vec![JdwpValue::Double(0.5), JdwpValue::Double(2.0)]);
    vm.set_field(order, "scores", JdwpValue::Object(scores));
    vm.set_field(order, "self", JdwpValue::Object(order));

    let context_key = vm.new_string("_context");
    let variables = vm.new_map(
        "java.util.LinkedHashMap",
        vec![(JdwpValue::Object(context_key), JdwpValue::Object(order))],
    );
    let binding = vm.new_object("groovy.lang.Binding");
    vm.set_field(binding, "variables", JdwpValue::Object(variables));
    let script = vm.new_object("Script1");
    vm.set_field(script, "binding", JdwpValue::Object(binding));
    vm.push_frame(
        thread,
        "Script1",
        "run",
        14,
        Some(script),
        &[("order", JdwpValue::Object(order))],
    );
    (vm, thread)
}

fn connect(server: &MockJdwpServer) -> TcpJdwpClient {
    let mut client = TcpJdwpClient::new();
    client
        .connect("127.0.0.1", server.addr().port())
        .expect("connect to mock JDWP server");
    client
}

#[test]
fn binding_snapshot_over_the_wire() {
    let (vm, thread) = script_vm();
    let server = MockJdwpServer::spawn(vm).unwrap();
    let mut client = connect(&server);

    let paused = PausedFrame::locate(&mut client, thread, 0).unwrap();
    let snap = try_snapshot(
        &mut client,
        Some(&paused),
        &RootSource::binding("_context"),
        &SnapshotOptions::default(),
    )
    .unwrap();

    let order_id = server.with_vm(|vm| {
        let frames = vm.frames(thread).unwrap();
        let values = vm
            .frame_values(thread, frames[0].id, &[(1, "Lcom/example/Order;".to_string())])
            .unwrap();
        values[0].object_id().unwrap()
    });

    assert_eq!(
        to_json(&snap.root),
        json!({
            "id": 7,
            "customer": "ada",
            "lines": [{"sku": "A-1", "qty": 2}],
            "scores": [0.5, 2.0],
            "self": format!("<<CIRCULAR_REFERENCE_TO_ID:{order_id}>>"),
        })
    );
    assert_eq!(dotted_path(&snap, &[2, 0, 1]).unwrap(), "_context.lines.qty");

    let tree = display_tree(&snap).render();
    assert!(tree.starts_with("_context\n  id\n    7\n  customer\n    ada\n  lines\n    sku\n"));

    let schema = SchemaGenerator::generate(SchemaOptions::default(), &snap.root);
    assert!(schema.contains("class ContextRoot {\n    long id\n    String customer\n    List<Line> lines\n"));
    assert!(schema.contains("class Line {\n    String sku\n    int qty\n}"));
}

#[test]
fn local_and_binding_roots_agree_over_the_wire() {
    let (vm, thread) = script_vm();
    let server = MockJdwpServer::spawn(vm).unwrap();
    let mut client = connect(&server);
    let paused = PausedFrame::locate(&mut client, thread, 0).unwrap();
    let options = SnapshotOptions::default();

    let local = snapshot(&mut client, Some(&paused), &RootSource::local("order"), &options);
    let bound = snapshot(&mut client, Some(&paused), &RootSource::binding("_context"), &options);
    assert!(!local.is_diagnostic());
    assert_eq!(to_json(&local.root), to_json(&bound.root));
}

#[test]
fn running_thread_yields_a_diagnostic() {
    let (vm, _) = script_vm();
    let server = MockJdwpServer::spawn(vm).unwrap();
    let mut client = connect(&server);

    let running = client
        .threads()
        .unwrap()
        .into_iter()
        .find(|t| !t.suspended)
        .unwrap();
    let paused = PausedFrame::locate(&mut client, running.id, 0).ok();
    let snap = snapshot(
        &mut client,
        paused.as_ref(),
        &RootSource::local("order"),
        &SnapshotOptions::default(),
    );
    assert!(snap.is_diagnostic());
    assert_eq!(
        to_json(&snap.root),
        json!("failed to snapshot `order`: no paused execution context is available")
    );
}
