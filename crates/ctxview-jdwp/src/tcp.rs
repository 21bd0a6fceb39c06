use std::collections::{BTreeSet, HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use crate::wire::codec::{encode_command, read_packet, IdSizes, JdwpReader, JdwpWriter, Packet, HANDSHAKE};
use crate::{
    class_name_to_signature, signature_to_tag, signature_to_type_name, tag, FieldId, FieldInfo,
    FrameId, FrameInfo, InvokeResult, JdwpClient, JdwpError, JdwpValue, Location, MethodId,
    MethodInfo, ObjectId, ObjectRef, ReferenceTypeId, ThreadId, ThreadInfo, TypeInfo, TypeKind,
    VariableInfo, ERROR_INVALID_OBJECT, INVOKE_SINGLE_THREADED,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

const EVENT_KIND_SINGLE_STEP: u8 = 1;
const EVENT_KIND_BREAKPOINT: u8 = 2;
const EVENT_KIND_THREAD_START: u8 = 6;
const EVENT_KIND_THREAD_DEATH: u8 = 7;
const EVENT_KIND_VM_START: u8 = 90;
const EVENT_KIND_VM_DEATH: u8 = 99;

const SUSPEND_POLICY_ALL: u8 = 2;
const MODIFIER_LOCATION_ONLY: u8 = 7;
const SUSPEND_STATUS_SUSPENDED: i32 = 0x1;

/// A breakpoint event delivered by the target VM. The reporting thread is
/// suspended and can be used for method invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointHit {
    pub request_id: u32,
    pub thread: ThreadId,
    pub location: Location,
}

/// Blocking JDWP client over a single TCP connection.
///
/// Commands are strictly request/response. Event packets that arrive while a
/// reply is awaited are queued and surfaced by [`TcpJdwpClient::wait_for_breakpoint`].
pub struct TcpJdwpClient {
    stream: Option<TcpStream>,
    timeout: Duration,
    next_packet_id: u32,
    id_sizes: IdSizes,
    cache: Cache,
    pending_breakpoints: VecDeque<BreakpointHit>,
    vm_dead: bool,
}

#[derive(Debug, Default)]
struct Cache {
    classes_by_signature: HashMap<String, Vec<TypeInfo>>,
    signatures: HashMap<ReferenceTypeId, String>,
    superclasses: HashMap<ReferenceTypeId, Option<ReferenceTypeId>>,
    interfaces: HashMap<ReferenceTypeId, Vec<ReferenceTypeId>>,
    fields: HashMap<ReferenceTypeId, Vec<FieldInfo>>,
    methods: HashMap<ReferenceTypeId, Vec<MethodInfo>>,
    line_tables: HashMap<(ReferenceTypeId, MethodId), Vec<(i64, u32)>>,
    variable_tables: HashMap<(ReferenceTypeId, MethodId), Vec<VariableInfo>>,
}

impl TcpJdwpClient {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// A client whose connect, read and write operations give up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            stream: None,
            timeout,
            next_packet_id: 1,
            id_sizes: IdSizes::default(),
            cache: Cache::default(),
            pending_breakpoints: VecDeque::new(),
            vm_dead: false,
        }
    }

    pub fn id_sizes(&self) -> IdSizes {
        self.id_sizes
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn connect(&mut self, host: &str, port: u16) -> Result<(), JdwpError> {
        let mut unique = BTreeSet::new();
        for addr in (host, port).to_socket_addrs()? {
            unique.insert(addr);
        }

        // `SocketAddr` orders IPv4 before IPv6, so `localhost` prefers `127.0.0.1` over `::1`.
        // Still try all candidates in case the debuggee only listens on one family.
        let addrs: Vec<SocketAddr> = unique.into_iter().collect();
        if addrs.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "invalid JDWP address").into());
        }

        let mut last_err: Option<JdwpError> = None;
        for addr in addrs {
            tracing::debug!(target: "ctxview.jdwp", %addr, "connecting to JDWP agent");
            match self.try_connect(addr) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::debug!(target: "ctxview.jdwp", %addr, error = %err, "JDWP connect attempt failed");
                    self.stream = None;
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "invalid JDWP address").into()
        }))
    }

    fn try_connect(&mut self, addr: SocketAddr) -> Result<(), JdwpError> {
        let mut stream = TcpStream::connect_timeout(&addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        stream.set_nodelay(true)?;
        Self::perform_handshake(&mut stream)?;

        self.stream = Some(stream);
        self.id_sizes = self.query_id_sizes()?;
        tracing::debug!(target: "ctxview.jdwp", id_sizes = ?self.id_sizes, "JDWP session established");
        Ok(())
    }

    fn stream_mut(&mut self) -> Result<&mut TcpStream, JdwpError> {
        self.stream.as_mut().ok_or(JdwpError::NotConnected)
    }

    fn perform_handshake(stream: &mut TcpStream) -> Result<(), JdwpError> {
        stream.write_all(HANDSHAKE)?;
        stream.flush()?;

        let mut reply = [0u8; HANDSHAKE.len()];
        stream.read_exact(&mut reply)?;
        if reply != HANDSHAKE {
            return Err(JdwpError::HandshakeFailed);
        }
        Ok(())
    }

    fn send_command(
        &mut self,
        command_set: u8,
        command: u8,
        data: &[u8],
    ) -> Result<Vec<u8>, JdwpError> {
        let id = self.next_packet_id;
        self.next_packet_id = self.next_packet_id.wrapping_add(1);

        let packet = encode_command(id, command_set, command, data)?;
        tracing::trace!(target: "ctxview.jdwp", id, command_set, command, len = data.len(), "sending JDWP command");
        {
            let stream = self.stream_mut()?;
            stream.write_all(&packet)?;
            stream.flush()?;
        }

        loop {
            let packet = {
                let stream = self.stream_mut()?;
                read_packet(stream)?
            };

            match packet {
                Packet::Reply {
                    id: reply_id,
                    error_code,
                    data,
                } => {
                    if reply_id != id {
                        return Err(JdwpError::Protocol(format!(
                            "unexpected reply id {reply_id}, expected {id}"
                        )));
                    }
                    if error_code != 0 {
                        tracing::trace!(target: "ctxview.jdwp", id, command_set, command, error_code, "JDWP command failed");
                        return Err(JdwpError::CommandFailed { error_code });
                    }
                    return Ok(data);
                }
                Packet::Command {
                    command_set,
                    command,
                    data,
                    ..
                } => {
                    // The VM can deliver events (e.g. breakpoint hits) between
                    // our command and its reply. Queue them for later.
                    self.handle_command_packet(command_set, command, &data)?;
                }
            }
        }
    }

    /// Like [`Self::send_command`], mapping `INVALID_OBJECT` to [`JdwpError::InvalidObjectId`].
    fn send_object_command(
        &mut self,
        command_set: u8,
        command: u8,
        object_id: ObjectId,
        data: &[u8],
    ) -> Result<Vec<u8>, JdwpError> {
        match self.send_command(command_set, command, data) {
            Err(JdwpError::CommandFailed { error_code }) if error_code == ERROR_INVALID_OBJECT => {
                Err(JdwpError::InvalidObjectId(object_id))
            }
            other => other,
        }
    }

    fn writer(&self) -> JdwpWriter {
        JdwpWriter::new()
    }

    fn query_id_sizes(&mut self) -> Result<IdSizes, JdwpError> {
        // VirtualMachine.IDSizes
        let reply = self.send_command(1, 7, &[])?;
        let mut r = JdwpReader::new(&reply);
        Ok(IdSizes {
            field_id: r.read_u32()? as usize,
            method_id: r.read_u32()? as usize,
            object_id: r.read_u32()? as usize,
            reference_type_id: r.read_u32()? as usize,
            frame_id: r.read_u32()? as usize,
        })
    }

    fn signature_for_type(&mut self, type_id: ReferenceTypeId) -> Result<String, JdwpError> {
        if let Some(signature) = self.cache.signatures.get(&type_id) {
            return Ok(signature.clone());
        }

        let mut w = self.writer();
        w.write_id(type_id, self.id_sizes.reference_type_id);

        // ReferenceType.Signature
        let reply = self.send_command(2, 1, &w.into_vec())?;
        let signature = JdwpReader::new(&reply).read_string()?;
        self.cache.signatures.insert(type_id, signature.clone());
        Ok(signature)
    }

    fn type_info(&mut self, type_id: ReferenceTypeId, kind: TypeKind) -> Result<TypeInfo, JdwpError> {
        let signature = self.signature_for_type(type_id)?;
        Ok(TypeInfo {
            id: type_id,
            kind,
            name: signature_to_type_name(&signature),
        })
    }

    fn line_table(
        &mut self,
        type_id: ReferenceTypeId,
        method_id: MethodId,
    ) -> Result<Vec<(i64, u32)>, JdwpError> {
        if let Some(table) = self.cache.line_tables.get(&(type_id, method_id)) {
            return Ok(table.clone());
        }

        let mut w = self.writer();
        w.write_id(type_id, self.id_sizes.reference_type_id);
        w.write_id(method_id, self.id_sizes.method_id);

        // Method.LineTable
        let reply = self.send_command(6, 1, &w.into_vec())?;
        let mut r = JdwpReader::new(&reply);
        let _start = r.read_i64()?;
        let _end = r.read_i64()?;
        let count = r.read_u32()? as usize;

        let mut entries = Vec::new();
        for _ in 0..count {
            let code_index = r.read_i64()?;
            let line = r.read_u32()?;
            entries.push((code_index, line));
        }
        self.cache
            .line_tables
            .insert((type_id, method_id), entries.clone());
        Ok(entries)
    }

    /// Pick the executable location closest to `line` across all methods of `class`.
    fn resolve_location(&mut self, class: &str, line: u32) -> Result<Option<Location>, JdwpError> {
        let Some(info) = self.classes_by_name(class)?.into_iter().next() else {
            return Ok(None);
        };

        let mut best: Option<(u32, Location)> = None;
        for method in self.declared_methods(info.id)? {
            // Abstract and native methods have no line table.
            let Ok(table) = self.line_table(info.id, method.id) else {
                continue;
            };

            let mut best_entry: Option<(u32, i64)> = None;
            for (code_index, entry_line) in table {
                let dist = entry_line.abs_diff(line);
                match best_entry {
                    None => best_entry = Some((dist, code_index)),
                    Some((best_dist, _)) => {
                        if dist < best_dist || (dist == best_dist && entry_line >= line) {
                            best_entry = Some((dist, code_index));
                        }
                    }
                }
            }

            if let Some((dist, index)) = best_entry {
                let loc = Location {
                    type_id: info.id,
                    method_id: method.id,
                    index,
                };
                match &best {
                    Some((best_dist, _)) if dist >= *best_dist => {}
                    _ => best = Some((dist, loc)),
                }
            }
        }

        Ok(best.map(|(_, loc)| loc))
    }

    /// Install a breakpoint at `class:line` that suspends the whole VM when hit,
    /// so no other thread can mutate the graph while it is walked.
    ///
    /// Returns the event request id.
    pub fn set_line_breakpoint(&mut self, class: &str, line: u32) -> Result<u32, JdwpError> {
        let Some(location) = self.resolve_location(class, line)? else {
            return Err(JdwpError::Protocol(format!(
                "unable to resolve breakpoint location for {class}:{line}"
            )));
        };

        // EventRequest.Set(BREAKPOINT)
        let mut w = self.writer();
        w.write_u8(EVENT_KIND_BREAKPOINT);
        w.write_u8(SUSPEND_POLICY_ALL);
        w.write_u32(1); // modifiers
        w.write_u8(MODIFIER_LOCATION_ONLY);
        w.write_location(TypeKind::Class.type_tag(), &location, &self.id_sizes);

        let reply = self.send_command(15, 1, &w.into_vec())?;
        let request_id = JdwpReader::new(&reply).read_u32()?;
        tracing::debug!(target: "ctxview.jdwp", class, line, request_id, ?location, "breakpoint installed");
        Ok(request_id)
    }

    pub fn clear_breakpoint(&mut self, request_id: u32) -> Result<(), JdwpError> {
        let mut w = self.writer();
        w.write_u8(EVENT_KIND_BREAKPOINT);
        w.write_u32(request_id);
        // EventRequest.Clear
        let _ = self.send_command(15, 2, &w.into_vec())?;
        Ok(())
    }

    pub fn suspend_vm(&mut self) -> Result<(), JdwpError> {
        let _ = self.send_command(1, 8, &[])?;
        Ok(())
    }

    pub fn resume_vm(&mut self) -> Result<(), JdwpError> {
        let _ = self.send_command(1, 9, &[])?;
        Ok(())
    }

    /// `VirtualMachine.Dispose`: drop all requests and let the VM run freely.
    pub fn dispose(&mut self) -> Result<(), JdwpError> {
        let _ = self.send_command(1, 6, &[])?;
        self.stream = None;
        Ok(())
    }

    /// Block until a breakpoint event arrives or `timeout` elapses.
    pub fn wait_for_breakpoint(&mut self, timeout: Duration) -> Result<BreakpointHit, JdwpError> {
        let deadline = Instant::now() + timeout;
        let io_timeout = self.timeout;

        loop {
            if let Some(hit) = self.pending_breakpoints.pop_front() {
                return Ok(hit);
            }
            if self.vm_dead {
                return Err(JdwpError::Other("target VM terminated".to_string()));
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(JdwpError::Timeout);
            }

            let packet = {
                let stream = self.stream_mut()?;
                stream.set_read_timeout(Some(remaining))?;
                let packet = read_packet(stream);
                stream.set_read_timeout(Some(io_timeout))?;
                packet
            };

            match packet {
                Ok(Packet::Command {
                    command_set,
                    command,
                    data,
                    ..
                }) => self.handle_command_packet(command_set, command, &data)?,
                Ok(Packet::Reply { id, .. }) => {
                    return Err(JdwpError::Protocol(format!(
                        "unexpected reply id {id} while waiting for events"
                    )));
                }
                Err(JdwpError::Io(err))
                    if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    return Err(JdwpError::Timeout);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn handle_command_packet(
        &mut self,
        command_set: u8,
        command: u8,
        data: &[u8],
    ) -> Result<(), JdwpError> {
        // Event.Composite
        if command_set != 64 || command != 100 {
            tracing::debug!(target: "ctxview.jdwp", command_set, command, "ignoring unexpected command packet from VM");
            return Ok(());
        }

        let mut r = JdwpReader::new(data);
        let _suspend_policy = r.read_u8()?;
        let events = r.read_u32()? as usize;

        for _ in 0..events {
            let kind = r.read_u8()?;
            let request_id = r.read_u32()?;

            match kind {
                EVENT_KIND_BREAKPOINT | EVENT_KIND_SINGLE_STEP => {
                    let thread = r.read_id(self.id_sizes.object_id)?;
                    let (_type_tag, location) = r.read_location(&self.id_sizes)?;
                    if kind == EVENT_KIND_BREAKPOINT {
                        tracing::debug!(target: "ctxview.jdwp", request_id, thread, ?location, "breakpoint hit");
                        self.pending_breakpoints.push_back(BreakpointHit {
                            request_id,
                            thread,
                            location,
                        });
                    }
                }
                EVENT_KIND_VM_START | EVENT_KIND_THREAD_START | EVENT_KIND_THREAD_DEATH => {
                    let _thread = r.read_id(self.id_sizes.object_id)?;
                }
                EVENT_KIND_VM_DEATH => {
                    tracing::debug!(target: "ctxview.jdwp", "target VM terminated");
                    self.vm_dead = true;
                }
                other => {
                    // Without knowing this event's layout the rest of the composite
                    // cannot be decoded.
                    tracing::debug!(target: "ctxview.jdwp", kind = other, "skipping unsupported JDWP event");
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    fn read_array_region(&self, reply: &[u8]) -> Result<Vec<JdwpValue>, JdwpError> {
        let mut r = JdwpReader::new(reply);
        let region_tag = r.read_u8()?;
        let count = r.read_u32()? as usize;
        let mut values = Vec::new();
        values.try_reserve_exact(count).map_err(|_| {
            JdwpError::Protocol(format!("unable to allocate array region ({count} values)"))
        })?;
        for _ in 0..count {
            // Primitive regions are untagged; object regions tag every element.
            let value = if tag::is_object(region_tag) {
                r.read_tagged_value(&self.id_sizes)?
            } else {
                r.read_value(region_tag, &self.id_sizes)?
            };
            values.push(value);
        }
        Ok(values)
    }
}

impl Default for TcpJdwpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl JdwpClient for TcpJdwpClient {
    fn threads(&mut self) -> Result<Vec<ThreadInfo>, JdwpError> {
        // VirtualMachine.AllThreads
        let reply = self.send_command(1, 4, &[])?;
        let mut r = JdwpReader::new(&reply);
        let count = r.read_u32()? as usize;
        let mut ids = Vec::new();
        for _ in 0..count {
            ids.push(r.read_id(self.id_sizes.object_id)?);
        }

        let mut threads = Vec::new();
        for id in ids {
            let mut w = self.writer();
            w.write_id(id, self.id_sizes.object_id);
            let body = w.into_vec();

            // ThreadReference.Name
            let name_reply = self.send_object_command(11, 1, id, &body)?;
            let name = JdwpReader::new(&name_reply).read_string()?;

            // ThreadReference.Status
            let status_reply = self.send_object_command(11, 4, id, &body)?;
            let mut status = JdwpReader::new(&status_reply);
            let _thread_status = status.read_i32()?;
            let suspend_status = status.read_i32()?;

            threads.push(ThreadInfo {
                id,
                name,
                suspended: suspend_status & SUSPEND_STATUS_SUSPENDED != 0,
            });
        }
        Ok(threads)
    }

    fn frames(&mut self, thread: ThreadId) -> Result<Vec<FrameInfo>, JdwpError> {
        let mut w = self.writer();
        w.write_id(thread, self.id_sizes.object_id);
        w.write_i32(0); // startFrame
        w.write_i32(-1); // all remaining frames

        // ThreadReference.Frames
        let reply = self.send_object_command(11, 6, thread, &w.into_vec())?;
        let mut r = JdwpReader::new(&reply);
        let count = r.read_u32()? as usize;
        let mut frames = Vec::new();
        for _ in 0..count {
            let id = r.read_id(self.id_sizes.frame_id)?;
            let (_type_tag, location) = r.read_location(&self.id_sizes)?;
            frames.push(FrameInfo { id, location });
        }
        Ok(frames)
    }

    fn this_object(
        &mut self,
        thread: ThreadId,
        frame: FrameId,
    ) -> Result<Option<ObjectRef>, JdwpError> {
        let mut w = self.writer();
        w.write_id(thread, self.id_sizes.object_id);
        w.write_id(frame, self.id_sizes.frame_id);

        // StackFrame.ThisObject
        let reply = self.send_command(16, 3, &w.into_vec())?;
        JdwpReader::new(&reply).read_tagged_object(&self.id_sizes)
    }

    fn variable_table(
        &mut self,
        type_id: ReferenceTypeId,
        method_id: MethodId,
    ) -> Result<Vec<VariableInfo>, JdwpError> {
        if let Some(vars) = self.cache.variable_tables.get(&(type_id, method_id)) {
            return Ok(vars.clone());
        }

        let mut w = self.writer();
        w.write_id(type_id, self.id_sizes.reference_type_id);
        w.write_id(method_id, self.id_sizes.method_id);

        // Method.VariableTable
        let reply = self.send_command(6, 2, &w.into_vec())?;
        let mut r = JdwpReader::new(&reply);
        let _arg_count = r.read_u32()?;
        let count = r.read_u32()? as usize;
        let mut vars = Vec::new();
        for _ in 0..count {
            let code_index = r.read_i64()?;
            let name = r.read_string()?;
            let signature = r.read_string()?;
            let length = i64::from(r.read_u32()?);
            let slot = r.read_u32()?;
            vars.push(VariableInfo {
                code_index,
                name,
                signature,
                length,
                slot,
            });
        }
        self.cache
            .variable_tables
            .insert((type_id, method_id), vars.clone());
        Ok(vars)
    }

    fn frame_values(
        &mut self,
        thread: ThreadId,
        frame: FrameId,
        slots: &[(u32, String)],
    ) -> Result<Vec<JdwpValue>, JdwpError> {
        let mut w = self.writer();
        w.write_id(thread, self.id_sizes.object_id);
        w.write_id(frame, self.id_sizes.frame_id);
        w.write_u32(slots.len() as u32);
        for (slot, signature) in slots {
            w.write_u32(*slot);
            w.write_u8(signature_to_tag(signature));
        }

        // StackFrame.GetValues
        let reply = self.send_command(16, 1, &w.into_vec())?;
        let mut r = JdwpReader::new(&reply);
        let count = r.read_u32()? as usize;
        let mut values = Vec::new();
        for _ in 0..count {
            values.push(r.read_tagged_value(&self.id_sizes)?);
        }
        Ok(values)
    }

    fn object_type(&mut self, object: ObjectId) -> Result<TypeInfo, JdwpError> {
        let mut w = self.writer();
        w.write_id(object, self.id_sizes.object_id);

        // ObjectReference.ReferenceType
        let reply = self.send_object_command(9, 1, object, &w.into_vec())?;
        let mut r = JdwpReader::new(&reply);
        let kind = TypeKind::from_type_tag(r.read_u8()?)?;
        let type_id = r.read_id(self.id_sizes.reference_type_id)?;
        self.type_info(type_id, kind)
    }

    fn reflected_type(&mut self, class_object: ObjectId) -> Result<TypeInfo, JdwpError> {
        let mut w = self.writer();
        w.write_id(class_object, self.id_sizes.object_id);

        // ClassObjectReference.ReflectedType
        let reply = self.send_object_command(17, 1, class_object, &w.into_vec())?;
        let mut r = JdwpReader::new(&reply);
        let kind = TypeKind::from_type_tag(r.read_u8()?)?;
        let type_id = r.read_id(self.id_sizes.reference_type_id)?;
        self.type_info(type_id, kind)
    }

    fn classes_by_name(&mut self, name: &str) -> Result<Vec<TypeInfo>, JdwpError> {
        let signature = class_name_to_signature(name);
        if let Some(types) = self.cache.classes_by_signature.get(&signature) {
            return Ok(types.clone());
        }

        let mut w = self.writer();
        w.write_string(&signature);

        // VirtualMachine.ClassesBySignature
        let reply = self.send_command(1, 2, &w.into_vec())?;
        let mut r = JdwpReader::new(&reply);
        let count = r.read_u32()? as usize;
        let mut types = Vec::new();
        for _ in 0..count {
            let kind = TypeKind::from_type_tag(r.read_u8()?)?;
            let id = r.read_id(self.id_sizes.reference_type_id)?;
            let _status = r.read_u32()?;
            types.push(TypeInfo {
                id,
                kind,
                name: name.to_string(),
            });
        }

        // Not-yet-loaded classes may load later; only remember hits.
        if !types.is_empty() {
            self.cache
                .classes_by_signature
                .insert(signature.clone(), types.clone());
            for ty in &types {
                self.cache.signatures.insert(ty.id, signature.clone());
            }
        }
        Ok(types)
    }

    fn superclass(&mut self, class: ReferenceTypeId) -> Result<Option<TypeInfo>, JdwpError> {
        let superclass = match self.cache.superclasses.get(&class) {
            Some(cached) => *cached,
            None => {
                let mut w = self.writer();
                w.write_id(class, self.id_sizes.reference_type_id);

                // ClassType.Superclass
                let reply = self.send_command(3, 1, &w.into_vec())?;
                let id = JdwpReader::new(&reply).read_id(self.id_sizes.reference_type_id)?;
                let superclass = (id != 0).then_some(id);
                self.cache.superclasses.insert(class, superclass);
                superclass
            }
        };

        superclass
            .map(|id| self.type_info(id, TypeKind::Class))
            .transpose()
    }

    fn interfaces(&mut self, type_id: ReferenceTypeId) -> Result<Vec<TypeInfo>, JdwpError> {
        let ids = match self.cache.interfaces.get(&type_id) {
            Some(cached) => cached.clone(),
            None => {
                let mut w = self.writer();
                w.write_id(type_id, self.id_sizes.reference_type_id);

                // ReferenceType.Interfaces
                let reply = self.send_command(2, 10, &w.into_vec())?;
                let mut r = JdwpReader::new(&reply);
                let count = r.read_u32()? as usize;
                let mut ids = Vec::new();
                for _ in 0..count {
                    ids.push(r.read_id(self.id_sizes.reference_type_id)?);
                }
                self.cache.interfaces.insert(type_id, ids.clone());
                ids
            }
        };

        ids.into_iter()
            .map(|id| self.type_info(id, TypeKind::Interface))
            .collect()
    }

    fn declared_fields(&mut self, type_id: ReferenceTypeId) -> Result<Vec<FieldInfo>, JdwpError> {
        if let Some(fields) = self.cache.fields.get(&type_id) {
            return Ok(fields.clone());
        }

        let mut w = self.writer();
        w.write_id(type_id, self.id_sizes.reference_type_id);

        // ReferenceType.Fields
        let reply = self.send_command(2, 4, &w.into_vec())?;
        let mut r = JdwpReader::new(&reply);
        let count = r.read_u32()? as usize;
        let mut fields = Vec::new();
        for _ in 0..count {
            fields.push(FieldInfo {
                id: r.read_id(self.id_sizes.field_id)?,
                name: r.read_string()?,
                signature: r.read_string()?,
                mod_bits: r.read_u32()?,
            });
        }
        self.cache.fields.insert(type_id, fields.clone());
        Ok(fields)
    }

    fn declared_methods(
        &mut self,
        type_id: ReferenceTypeId,
    ) -> Result<Vec<MethodInfo>, JdwpError> {
        if let Some(methods) = self.cache.methods.get(&type_id) {
            return Ok(methods.clone());
        }

        let mut w = self.writer();
        w.write_id(type_id, self.id_sizes.reference_type_id);

        // ReferenceType.Methods
        let reply = self.send_command(2, 5, &w.into_vec())?;
        let mut r = JdwpReader::new(&reply);
        let count = r.read_u32()? as usize;
        let mut methods = Vec::new();
        for _ in 0..count {
            methods.push(MethodInfo {
                id: r.read_id(self.id_sizes.method_id)?,
                name: r.read_string()?,
                signature: r.read_string()?,
                mod_bits: r.read_u32()?,
            });
        }
        self.cache.methods.insert(type_id, methods.clone());
        Ok(methods)
    }

    fn field_values(
        &mut self,
        object: ObjectId,
        fields: &[FieldId],
    ) -> Result<Vec<JdwpValue>, JdwpError> {
        let mut w = self.writer();
        w.write_id(object, self.id_sizes.object_id);
        w.write_u32(fields.len() as u32);
        for field in fields {
            w.write_id(*field, self.id_sizes.field_id);
        }

        // ObjectReference.GetValues
        let reply = self.send_object_command(9, 2, object, &w.into_vec())?;
        let mut r = JdwpReader::new(&reply);
        let count = r.read_u32()? as usize;
        let mut values = Vec::new();
        for _ in 0..count {
            values.push(r.read_tagged_value(&self.id_sizes)?);
        }
        Ok(values)
    }

    fn string_value(&mut self, object: ObjectId) -> Result<String, JdwpError> {
        let mut w = self.writer();
        w.write_id(object, self.id_sizes.object_id);

        // StringReference.Value
        let reply = self.send_object_command(10, 1, object, &w.into_vec())?;
        JdwpReader::new(&reply).read_string()
    }

    fn array_values(&mut self, array: ObjectId) -> Result<Vec<JdwpValue>, JdwpError> {
        let mut w = self.writer();
        w.write_id(array, self.id_sizes.object_id);
        let body = w.into_vec();

        // ArrayReference.Length
        let reply = self.send_object_command(13, 1, array, &body)?;
        let length = JdwpReader::new(&reply).read_i32()?;
        if length <= 0 {
            return Ok(Vec::new());
        }

        let mut w = self.writer();
        w.write_id(array, self.id_sizes.object_id);
        w.write_i32(0); // firstIndex
        w.write_i32(length);

        // ArrayReference.GetValues
        let reply = self.send_object_command(13, 2, array, &w.into_vec())?;
        self.read_array_region(&reply)
    }

    fn invoke_method(
        &mut self,
        object: ObjectId,
        thread: ThreadId,
        class: ReferenceTypeId,
        method: MethodId,
        args: &[JdwpValue],
    ) -> Result<InvokeResult, JdwpError> {
        let mut w = self.writer();
        w.write_id(object, self.id_sizes.object_id);
        w.write_id(thread, self.id_sizes.object_id);
        w.write_id(class, self.id_sizes.reference_type_id);
        w.write_id(method, self.id_sizes.method_id);
        w.write_u32(args.len() as u32);
        for arg in args {
            w.write_tagged_value(arg, &self.id_sizes);
        }
        w.write_u32(INVOKE_SINGLE_THREADED);

        // ObjectReference.InvokeMethod
        let reply = self.send_object_command(9, 6, object, &w.into_vec())?;
        let mut r = JdwpReader::new(&reply);
        let value = r.read_tagged_value(&self.id_sizes)?;
        let exception = r.read_tagged_object(&self.id_sizes)?;
        Ok(InvokeResult { value, exception })
    }

    fn create_string(&mut self, value: &str) -> Result<ObjectRef, JdwpError> {
        let mut w = self.writer();
        w.write_string(value);

        // VirtualMachine.CreateString
        let reply = self.send_command(1, 11, &w.into_vec())?;
        let id = JdwpReader::new(&reply).read_id(self.id_sizes.object_id)?;
        Ok(ObjectRef::new(id, tag::STRING))
    }

    fn disable_collection(&mut self, object: ObjectId) -> Result<(), JdwpError> {
        let mut w = self.writer();
        w.write_id(object, self.id_sizes.object_id);

        // ObjectReference.DisableCollection
        self.send_object_command(9, 7, object, &w.into_vec())?;
        Ok(())
    }

    fn enable_collection(&mut self, object: ObjectId) -> Result<(), JdwpError> {
        let mut w = self.writer();
        w.write_id(object, self.id_sizes.object_id);

        // ObjectReference.EnableCollection
        self.send_object_command(9, 8, object, &w.into_vec())?;
        Ok(())
    }
}
