use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use super::codec::{encode_command, encode_reply, read_packet, IdSizes, JdwpReader, JdwpWriter, Packet, HANDSHAKE};
use crate::{
    class_name_to_signature, signature_to_type_name, tag, JdwpClient, JdwpError, JdwpValue,
    MockJdwpClient, ThreadId, ERROR_INVALID_OBJECT, ERROR_NOT_IMPLEMENTED,
};

const ERROR_INTERNAL: u16 = 113;
const CLASS_STATUS_INITIALIZED: u32 = 7;
const THREAD_STATUS_RUNNING: i32 = 1;
const EVENT_KIND_BREAKPOINT: u8 = 2;
const SUSPEND_POLICY_NONE: u8 = 0;
const SUSPEND_POLICY_ALL: u8 = 2;
const MODIFIER_COUNT: u8 = 1;
const MODIFIER_THREAD_ONLY: u8 = 3;
const MODIFIER_CLASS_MATCH: u8 = 5;
const MODIFIER_LOCATION_ONLY: u8 = 7;

#[derive(Clone, Debug, Default)]
pub struct MockJdwpServerConfig {
    /// Thread that hits the first installed breakpoint on the next
    /// `VirtualMachine.Resume`. The request's suspend policy is applied and a
    /// composite breakpoint event is sent; at most one event is emitted per
    /// request.
    pub breakpoint_thread: Option<ThreadId>,
}

/// A tiny JDWP server that exposes a [`MockJdwpClient`] over TCP.
///
/// It supports the subset of JDWP that `TcpJdwpClient` speaks, which lets the
/// whole stack (client, walker, CLI) be exercised without a JDK installed.
/// Connections are served one at a time on a background thread.
pub struct MockJdwpServer {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct State {
    vm: MockJdwpClient,
    config: MockJdwpServerConfig,
    /// `(request id, suspend policy)` of each live breakpoint request.
    breakpoint_requests: Vec<(u32, u8)>,
    emitted: Vec<u32>,
    next_request_id: u32,
    next_packet_id: u32,
    commands: Vec<(u8, u8)>,
    breakpoint_policies: Vec<u8>,
}

impl MockJdwpServer {
    pub fn spawn(vm: MockJdwpClient) -> io::Result<Self> {
        Self::spawn_with_config(vm, MockJdwpServerConfig::default())
    }

    pub fn spawn_with_config(vm: MockJdwpClient, config: MockJdwpServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0))?;
        let addr = listener.local_addr()?;
        let state = Arc::new(Mutex::new(State {
            vm,
            config,
            breakpoint_requests: Vec::new(),
            emitted: Vec::new(),
            next_request_id: 1,
            next_packet_id: 0x4000_0000,
            commands: Vec::new(),
            breakpoint_policies: Vec::new(),
        }));
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = {
            let state = Arc::clone(&state);
            let shutdown = Arc::clone(&shutdown);
            thread::Builder::new()
                .name("mock-jdwp-server".to_string())
                .spawn(move || {
                    for stream in listener.incoming() {
                        if shutdown.load(Ordering::SeqCst) {
                            break;
                        }
                        let Ok(stream) = stream else {
                            continue;
                        };
                        if let Err(err) = serve(stream, &state) {
                            tracing::debug!(target: "ctxview.jdwp", error = %err, "mock JDWP connection closed");
                        }
                    }
                })?
        };

        Ok(Self {
            addr,
            state,
            shutdown,
            handle: Some(handle),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Run `f` against the served VM, e.g. to add objects after spawning.
    pub fn with_vm<R>(&self, f: impl FnOnce(&mut MockJdwpClient) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state.vm)
    }

    /// Suspend policy of every breakpoint request received so far, in order.
    pub fn breakpoint_suspend_policies(&self) -> Vec<u8> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.breakpoint_policies.clone()
    }

    /// `(command_set, command)` of every command received so far.
    pub fn commands(&self) -> Vec<(u8, u8)> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.commands.clone()
    }
}

impl Drop for MockJdwpServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Wake the accept loop so it can observe the shutdown flag.
        let _ = TcpStream::connect(self.addr);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn serve(mut stream: TcpStream, state: &Mutex<State>) -> Result<(), JdwpError> {
    let mut hs = [0u8; HANDSHAKE.len()];
    stream.read_exact(&mut hs)?;
    if hs != HANDSHAKE {
        return Err(JdwpError::HandshakeFailed);
    }
    stream.write_all(HANDSHAKE)?;
    stream.flush()?;

    loop {
        let packet = match read_packet(&mut stream) {
            Ok(packet) => packet,
            Err(JdwpError::Io(err))
                if matches!(
                    err.kind(),
                    io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionReset
                ) =>
            {
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        let Packet::Command {
            id,
            command_set,
            command,
            data,
        } = packet
        else {
            return Err(JdwpError::Protocol(
                "unexpected reply packet from client".to_string(),
            ));
        };

        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        state.commands.push((command_set, command));

        let reply = match handle_command(&mut state, command_set, command, &data) {
            Ok(payload) => encode_reply(id, 0, &payload)?,
            Err(err) => encode_reply(id, error_code(&err), &[])?,
        };
        stream.write_all(&reply)?;

        if (command_set, command) == (1, 9) {
            if let Some(event) = take_breakpoint_event(&mut state)? {
                stream.write_all(&event)?;
            }
        }
        stream.flush()?;

        if (command_set, command) == (1, 6) {
            return Ok(());
        }
    }
}

fn error_code(err: &JdwpError) -> u16 {
    match err {
        JdwpError::CommandFailed { error_code } => *error_code,
        JdwpError::InvalidObjectId(_) => ERROR_INVALID_OBJECT,
        JdwpError::NotImplemented => ERROR_NOT_IMPLEMENTED,
        _ => ERROR_INTERNAL,
    }
}

fn take_breakpoint_event(state: &mut State) -> Result<Option<Vec<u8>>, JdwpError> {
    let Some(thread) = state.config.breakpoint_thread else {
        return Ok(None);
    };
    let Some((request_id, suspend_policy)) = state
        .breakpoint_requests
        .iter()
        .copied()
        .find(|(id, _)| !state.emitted.contains(id))
    else {
        return Ok(None);
    };

    match suspend_policy {
        SUSPEND_POLICY_NONE => {}
        SUSPEND_POLICY_ALL => {
            for t in state.vm.threads()? {
                state.vm.set_thread_suspended(t.id, true);
            }
        }
        _ => state.vm.set_thread_suspended(thread, true),
    }
    let Some(frame) = state.vm.frames(thread)?.into_iter().next() else {
        return Ok(None);
    };
    state.emitted.push(request_id);

    let sizes = IdSizes::default();
    let mut w = JdwpWriter::new();
    w.write_u8(suspend_policy);
    w.write_u32(1);
    w.write_u8(EVENT_KIND_BREAKPOINT);
    w.write_u32(request_id);
    w.write_id(thread, sizes.object_id);
    w.write_location(1, &frame.location, &sizes);

    let id = state.next_packet_id;
    state.next_packet_id = state.next_packet_id.wrapping_add(1);
    Ok(Some(encode_command(id, 64, 100, &w.into_vec())?))
}

fn handle_command(
    state: &mut State,
    command_set: u8,
    command: u8,
    data: &[u8],
) -> Result<Vec<u8>, JdwpError> {
    let sizes = IdSizes::default();
    let mut r = JdwpReader::new(data);
    let mut w = JdwpWriter::new();
    let vm = &mut state.vm;

    match (command_set, command) {
        // VirtualMachine.ClassesBySignature
        (1, 2) => {
            let signature = r.read_string()?;
            let types = vm.classes_by_name(&signature_to_type_name(&signature))?;
            w.write_u32(types.len() as u32);
            for ty in types {
                w.write_u8(ty.kind.type_tag());
                w.write_id(ty.id, sizes.reference_type_id);
                w.write_u32(CLASS_STATUS_INITIALIZED);
            }
        }
        // VirtualMachine.AllThreads
        (1, 4) => {
            let threads = vm.threads()?;
            w.write_u32(threads.len() as u32);
            for t in threads {
                w.write_id(t.id, sizes.object_id);
            }
        }
        // VirtualMachine.Dispose
        (1, 6) => {
            state.breakpoint_requests.clear();
        }
        // VirtualMachine.IDSizes
        (1, 7) => {
            for size in [
                sizes.field_id,
                sizes.method_id,
                sizes.object_id,
                sizes.reference_type_id,
                sizes.frame_id,
            ] {
                w.write_u32(size as u32);
            }
        }
        // VirtualMachine.Suspend / Resume
        (1, 8) | (1, 9) => {
            let suspended = command == 8;
            for t in vm.threads()? {
                vm.set_thread_suspended(t.id, suspended);
            }
        }
        // VirtualMachine.CreateString
        (1, 11) => {
            let value = r.read_string()?;
            let s = vm.create_string(&value)?;
            w.write_id(s.id, sizes.object_id);
        }
        // ReferenceType.Signature
        (2, 1) => {
            let type_id = r.read_id(sizes.reference_type_id)?;
            let info = vm.type_info(type_id).ok_or(JdwpError::CommandFailed {
                error_code: 21, // INVALID_CLASS
            })?;
            w.write_string(&class_name_to_signature(&info.name));
        }
        // ReferenceType.Fields
        (2, 4) => {
            let type_id = r.read_id(sizes.reference_type_id)?;
            let fields = vm.declared_fields(type_id)?;
            w.write_u32(fields.len() as u32);
            for f in fields {
                w.write_id(f.id, sizes.field_id);
                w.write_string(&f.name);
                w.write_string(&f.signature);
                w.write_u32(f.mod_bits);
            }
        }
        // ReferenceType.Methods
        (2, 5) => {
            let type_id = r.read_id(sizes.reference_type_id)?;
            let methods = vm.declared_methods(type_id)?;
            w.write_u32(methods.len() as u32);
            for m in methods {
                w.write_id(m.id, sizes.method_id);
                w.write_string(&m.name);
                w.write_string(&m.signature);
                w.write_u32(m.mod_bits);
            }
        }
        // ReferenceType.Interfaces
        (2, 10) => {
            let type_id = r.read_id(sizes.reference_type_id)?;
            let interfaces = vm.interfaces(type_id)?;
            w.write_u32(interfaces.len() as u32);
            for iface in interfaces {
                w.write_id(iface.id, sizes.reference_type_id);
            }
        }
        // ClassType.Superclass
        (3, 1) => {
            let type_id = r.read_id(sizes.reference_type_id)?;
            let superclass = vm.superclass(type_id)?.map(|s| s.id).unwrap_or(0);
            w.write_id(superclass, sizes.reference_type_id);
        }
        // Method.LineTable
        (6, 1) => {
            let type_id = r.read_id(sizes.reference_type_id)?;
            let method_id = r.read_id(sizes.method_id)?;
            let lines = vm.line_table(type_id, method_id);
            if lines.is_empty() {
                return Err(JdwpError::CommandFailed {
                    error_code: crate::ERROR_ABSENT_INFORMATION,
                });
            }
            w.write_i64(0);
            w.write_i64(lines.iter().map(|(index, _)| *index).max().unwrap_or(0));
            w.write_u32(lines.len() as u32);
            for (index, line) in lines {
                w.write_i64(index);
                w.write_u32(line);
            }
        }
        // Method.VariableTable
        (6, 2) => {
            let type_id = r.read_id(sizes.reference_type_id)?;
            let method_id = r.read_id(sizes.method_id)?;
            let vars = vm.variable_table(type_id, method_id)?;
            w.write_u32(0); // argCnt
            w.write_u32(vars.len() as u32);
            for v in vars {
                w.write_i64(v.code_index);
                w.write_string(&v.name);
                w.write_string(&v.signature);
                w.write_u32(v.length as u32);
                w.write_u32(v.slot);
            }
        }
        // ObjectReference.ReferenceType
        (9, 1) => {
            let object = r.read_id(sizes.object_id)?;
            let info = vm.object_type(object)?;
            w.write_u8(info.kind.type_tag());
            w.write_id(info.id, sizes.reference_type_id);
        }
        // ObjectReference.GetValues
        (9, 2) => {
            let object = r.read_id(sizes.object_id)?;
            let count = r.read_u32()? as usize;
            let mut fields = Vec::new();
            for _ in 0..count {
                fields.push(r.read_id(sizes.field_id)?);
            }
            let values = vm.field_values(object, &fields)?;
            w.write_u32(values.len() as u32);
            for v in &values {
                w.write_tagged_value(v, &sizes);
            }
        }
        // ObjectReference.InvokeMethod
        (9, 6) => {
            let object = r.read_id(sizes.object_id)?;
            let thread = r.read_id(sizes.object_id)?;
            let class = r.read_id(sizes.reference_type_id)?;
            let method = r.read_id(sizes.method_id)?;
            let arg_count = r.read_u32()? as usize;
            let mut args = Vec::new();
            for _ in 0..arg_count {
                args.push(r.read_tagged_value(&sizes)?);
            }
            let _options = r.read_u32()?;

            let result = vm.invoke_method(object, thread, class, method, &args)?;
            w.write_tagged_value(&result.value, &sizes);
            match result.exception {
                Some(exception) => {
                    w.write_u8(exception.tag);
                    w.write_id(exception.id, sizes.object_id);
                }
                None => {
                    w.write_u8(tag::OBJECT);
                    w.write_id(0, sizes.object_id);
                }
            }
        }
        // ObjectReference.DisableCollection
        (9, 7) => {
            let object = r.read_id(sizes.object_id)?;
            vm.disable_collection(object)?;
        }
        // ObjectReference.EnableCollection
        (9, 8) => {
            let object = r.read_id(sizes.object_id)?;
            vm.enable_collection(object)?;
        }
        // ClassObjectReference.ReflectedType
        (17, 1) => {
            let object = r.read_id(sizes.object_id)?;
            let info = vm.reflected_type(object)?;
            w.write_u8(info.kind.type_tag());
            w.write_id(info.id, sizes.reference_type_id);
        }
        // StringReference.Value
        (10, 1) => {
            let object = r.read_id(sizes.object_id)?;
            w.write_string(&vm.string_value(object)?);
        }
        // ThreadReference.Name
        (11, 1) => {
            let thread = r.read_id(sizes.object_id)?;
            let t = vm
                .threads()?
                .into_iter()
                .find(|t| t.id == thread)
                .ok_or(JdwpError::InvalidObjectId(thread))?;
            w.write_string(&t.name);
        }
        // ThreadReference.Status
        (11, 4) => {
            let thread = r.read_id(sizes.object_id)?;
            let t = vm
                .threads()?
                .into_iter()
                .find(|t| t.id == thread)
                .ok_or(JdwpError::InvalidObjectId(thread))?;
            w.write_i32(THREAD_STATUS_RUNNING);
            w.write_i32(i32::from(t.suspended));
        }
        // ThreadReference.Frames
        (11, 6) => {
            let thread = r.read_id(sizes.object_id)?;
            let start = r.read_i32()?.max(0) as usize;
            let length = r.read_i32()?;
            let frames: Vec<_> = vm.frames(thread)?.into_iter().skip(start).collect();
            let take = if length < 0 {
                frames.len()
            } else {
                (length as usize).min(frames.len())
            };
            w.write_u32(take as u32);
            for frame in frames.iter().take(take) {
                w.write_id(frame.id, sizes.frame_id);
                w.write_location(1, &frame.location, &sizes);
            }
        }
        // ArrayReference.Length
        (13, 1) => {
            let array = r.read_id(sizes.object_id)?;
            w.write_i32(vm.array_values(array)?.len() as i32);
        }
        // ArrayReference.GetValues
        (13, 2) => {
            let array = r.read_id(sizes.object_id)?;
            let first = r.read_i32()?.max(0) as usize;
            let length = r.read_i32()?.max(0) as usize;
            let element_signature = class_name_to_signature(&vm.object_type(array)?.name)
                .chars()
                .skip(1)
                .collect::<String>();
            let region_tag = crate::signature_to_tag(&element_signature);
            let values = vm.array_values(array)?;
            let region: Vec<&JdwpValue> = values.iter().skip(first).take(length).collect();

            w.write_u8(region_tag);
            w.write_u32(region.len() as u32);
            for v in region {
                if tag::is_object(region_tag) {
                    w.write_tagged_value(v, &sizes);
                } else {
                    w.write_value(v, &sizes);
                }
            }
        }
        // EventRequest.Set
        (15, 1) => {
            let kind = r.read_u8()?;
            let suspend_policy = r.read_u8()?;
            let modifiers = r.read_u32()?;
            for _ in 0..modifiers {
                match r.read_u8()? {
                    MODIFIER_COUNT => {
                        r.read_i32()?;
                    }
                    MODIFIER_THREAD_ONLY => {
                        r.read_id(sizes.object_id)?;
                    }
                    MODIFIER_CLASS_MATCH => {
                        r.read_string()?;
                    }
                    MODIFIER_LOCATION_ONLY => {
                        r.read_location(&sizes)?;
                    }
                    _ => return Err(JdwpError::NotImplemented),
                }
            }
            let request_id = state.next_request_id;
            state.next_request_id += 1;
            if kind == EVENT_KIND_BREAKPOINT {
                state.breakpoint_requests.push((request_id, suspend_policy));
                state.breakpoint_policies.push(suspend_policy);
            }
            w.write_u32(request_id);
        }
        // EventRequest.Clear
        (15, 2) => {
            let _kind = r.read_u8()?;
            let request_id = r.read_u32()?;
            state.breakpoint_requests.retain(|(id, _)| *id != request_id);
        }
        // StackFrame.GetValues
        (16, 1) => {
            let thread = r.read_id(sizes.object_id)?;
            let frame = r.read_id(sizes.frame_id)?;
            let count = r.read_u32()? as usize;
            let mut slots = Vec::new();
            for _ in 0..count {
                let slot = r.read_u32()?;
                let sig_tag = r.read_u8()?;
                slots.push((slot, char::from(sig_tag).to_string()));
            }
            let values = vm.frame_values(thread, frame, &slots)?;
            w.write_u32(values.len() as u32);
            for v in &values {
                w.write_tagged_value(v, &sizes);
            }
        }
        // StackFrame.ThisObject
        (16, 3) => {
            let thread = r.read_id(sizes.object_id)?;
            let frame = r.read_id(sizes.frame_id)?;
            match vm.this_object(thread, frame)? {
                Some(this) => {
                    w.write_u8(this.tag);
                    w.write_id(this.id, sizes.object_id);
                }
                None => {
                    w.write_u8(tag::OBJECT);
                    w.write_id(0, sizes.object_id);
                }
            }
        }
        _ => return Err(JdwpError::NotImplemented),
    }

    Ok(w.into_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send(stream: &mut TcpStream, id: u32, command_set: u8, command: u8, payload: &[u8]) -> Packet {
        stream
            .write_all(&encode_command(id, command_set, command, payload).unwrap())
            .unwrap();
        read_packet(stream).unwrap()
    }

    fn handshake(server: &MockJdwpServer) -> TcpStream {
        let mut stream = TcpStream::connect(server.addr()).unwrap();
        stream.write_all(HANDSHAKE).unwrap();
        let mut reply = [0u8; HANDSHAKE.len()];
        stream.read_exact(&mut reply).unwrap();
        assert_eq!(&reply, HANDSHAKE);
        stream
    }

    #[test]
    fn unsupported_commands_reply_not_implemented() {
        let server = MockJdwpServer::spawn(MockJdwpClient::new()).unwrap();
        let mut stream = handshake(&server);

        match send(&mut stream, 1, 1, 1, &[]) {
            Packet::Reply { id, error_code, .. } => {
                assert_eq!(id, 1);
                assert_eq!(error_code, ERROR_NOT_IMPLEMENTED);
            }
            other => panic!("expected reply, got {other:?}"),
        }
        assert_eq!(server.commands(), vec![(1, 1)]);
    }

    #[test]
    fn primitive_array_regions_are_untagged() {
        let mut vm = MockJdwpClient::new();
        let array = vm.new_array("short", vec![JdwpValue::Short(3), JdwpValue::Short(4)]);
        let server = MockJdwpServer::spawn(vm).unwrap();
        let mut stream = handshake(&server);

        let mut w = JdwpWriter::new();
        w.write_id(array.id, 8);
        w.write_i32(0);
        w.write_i32(2);
        let Packet::Reply { data, error_code, .. } = send(&mut stream, 2, 13, 2, &w.into_vec()) else {
            panic!("expected reply");
        };
        assert_eq!(error_code, 0);
        assert_eq!(data, vec![b'S', 0, 0, 0, 2, 0, 3, 0, 4]);
    }

    #[test]
    fn with_vm_mutates_served_state() {
        let server = MockJdwpServer::spawn(MockJdwpClient::with_jdk_types()).unwrap();
        let s = server.with_vm(|vm| vm.new_string("late"));
        let mut stream = handshake(&server);

        let mut w = JdwpWriter::new();
        w.write_id(s.id, 8);
        let Packet::Reply { data, .. } = send(&mut stream, 3, 10, 1, &w.into_vec()) else {
            panic!("expected reply");
        };
        assert_eq!(JdwpReader::new(&data).read_string().unwrap(), "late");
    }
}
