use std::io::Read;

use crate::{tag, JdwpError, JdwpValue, Location, ObjectRef, JDWP_HEADER_LEN};

pub const HANDSHAKE: &[u8] = b"JDWP-Handshake";
pub const FLAG_REPLY: u8 = 0x80;

type Result<T> = std::result::Result<T, JdwpError>;

/// Identifier widths reported by `VirtualMachine.IDSizes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdSizes {
    pub field_id: usize,
    pub method_id: usize,
    pub object_id: usize,
    pub reference_type_id: usize,
    pub frame_id: usize,
}

impl Default for IdSizes {
    fn default() -> Self {
        // Most modern JVMs use 8-byte ids; the real sizes are queried after the handshake.
        Self {
            field_id: 8,
            method_id: 8,
            object_id: 8,
            reference_type_id: 8,
            frame_id: 8,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Packet {
    Reply {
        id: u32,
        error_code: u16,
        data: Vec<u8>,
    },
    Command {
        id: u32,
        command_set: u8,
        command: u8,
        data: Vec<u8>,
    },
}

pub fn read_packet(reader: &mut impl Read) -> Result<Packet> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let length = u32::from_be_bytes(len_buf) as usize;
    crate::validate_jdwp_packet_length(length).map_err(JdwpError::Protocol)?;

    // Remainder of the fixed header:
    //   u32 id, u8 flags, u16 error_code | (u8 command_set, u8 command)
    let mut header = [0u8; 7];
    reader.read_exact(&mut header)?;

    let id = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);
    let flags = header[4];

    let payload_len = length - JDWP_HEADER_LEN;
    let mut payload = Vec::new();
    payload.try_reserve_exact(payload_len).map_err(|_| {
        JdwpError::Protocol(format!(
            "unable to allocate packet buffer ({payload_len} bytes)"
        ))
    })?;
    payload.resize(payload_len, 0);
    reader.read_exact(&mut payload)?;

    if flags & FLAG_REPLY != 0 {
        Ok(Packet::Reply {
            id,
            error_code: u16::from_be_bytes([header[5], header[6]]),
            data: payload,
        })
    } else {
        Ok(Packet::Command {
            id,
            command_set: header[5],
            command: header[6],
            data: payload,
        })
    }
}

fn checked_length(payload: &[u8]) -> Result<u32> {
    let length = JDWP_HEADER_LEN
        .checked_add(payload.len())
        .ok_or_else(|| JdwpError::Protocol("packet too large".to_string()))?;
    if length > crate::MAX_JDWP_PACKET_BYTES {
        return Err(JdwpError::Protocol(format!(
            "packet too large ({length} bytes, max {})",
            crate::MAX_JDWP_PACKET_BYTES
        )));
    }
    Ok(length as u32)
}

pub fn encode_command(id: u32, command_set: u8, command: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let length = checked_length(payload)?;
    let mut out = Vec::with_capacity(length as usize);
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(&id.to_be_bytes());
    out.push(0); // flags
    out.push(command_set);
    out.push(command);
    out.extend_from_slice(payload);
    Ok(out)
}

pub fn encode_reply(id: u32, error_code: u16, payload: &[u8]) -> Result<Vec<u8>> {
    let length = checked_length(payload)?;
    let mut out = Vec::with_capacity(length as usize);
    out.extend_from_slice(&length.to_be_bytes());
    out.extend_from_slice(&id.to_be_bytes());
    out.push(FLAG_REPLY);
    out.extend_from_slice(&error_code.to_be_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

#[derive(Default)]
pub struct JdwpWriter {
    buf: Vec<u8>,
}

impl JdwpWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(u8::from(v));
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_string(&mut self, s: &str) {
        // JDWP strings are length-prefixed with a u32 number of bytes.
        self.write_u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn write_id(&mut self, id: u64, size: usize) {
        let be = id.to_be_bytes();
        let start = be.len().saturating_sub(size);
        self.buf.extend_from_slice(&be[start..]);
    }

    pub fn write_location(&mut self, type_tag: u8, loc: &Location, sizes: &IdSizes) {
        self.write_u8(type_tag);
        self.write_id(loc.type_id, sizes.reference_type_id);
        self.write_id(loc.method_id, sizes.method_id);
        self.write_i64(loc.index);
    }

    /// Write a value without its tag (array regions of primitives, untagged args).
    pub fn write_value(&mut self, v: &JdwpValue, sizes: &IdSizes) {
        match *v {
            JdwpValue::Null => self.write_id(0, sizes.object_id),
            JdwpValue::Void => {}
            JdwpValue::Boolean(v) => self.write_bool(v),
            JdwpValue::Byte(v) => self.write_u8(v as u8),
            JdwpValue::Char(v) => self.write_u16(v),
            JdwpValue::Short(v) => self.write_u16(v as u16),
            JdwpValue::Int(v) => self.write_i32(v),
            JdwpValue::Long(v) => self.write_i64(v),
            JdwpValue::Float(v) => self.write_f32(v),
            JdwpValue::Double(v) => self.write_f64(v),
            JdwpValue::Object(obj) => self.write_id(obj.id, sizes.object_id),
        }
    }

    pub fn write_tagged_value(&mut self, v: &JdwpValue, sizes: &IdSizes) {
        self.write_u8(v.tag());
        self.write_value(v, sizes);
    }
}

/// Bounds-checked reader over a packet payload.
pub struct JdwpReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> JdwpReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn read_exact(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or_else(|| JdwpError::Protocol("unexpected end of packet".to_string()))?;
        if end > self.buf.len() {
            return Err(JdwpError::Protocol(format!(
                "unexpected end of packet: need {len} bytes at {}, have {}",
                self.pos,
                self.buf.len()
            )));
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_exact(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_exact(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(u64::from_be_bytes(self.read_array()?)))
    }

    pub fn read_id(&mut self, size: usize) -> Result<u64> {
        if size == 0 || size > 8 {
            return Err(JdwpError::Protocol(format!("invalid id size: {size}")));
        }
        let bytes = self.read_exact(size)?;
        let mut be = [0u8; 8];
        be[8 - size..].copy_from_slice(bytes);
        Ok(u64::from_be_bytes(be))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_exact(len)?;
        let mut out = Vec::new();
        out.try_reserve_exact(len).map_err(|_| {
            JdwpError::Protocol(format!("unable to allocate string buffer ({len} bytes)"))
        })?;
        out.extend_from_slice(bytes);
        Ok(String::from_utf8(out)?)
    }

    pub fn read_location(&mut self, sizes: &IdSizes) -> Result<(u8, Location)> {
        let type_tag = self.read_u8()?;
        let location = Location {
            type_id: self.read_id(sizes.reference_type_id)?,
            method_id: self.read_id(sizes.method_id)?,
            index: self.read_i64()?,
        };
        Ok((type_tag, location))
    }

    /// Read an untagged value whose tag is known from context.
    pub fn read_value(&mut self, value_tag: u8, sizes: &IdSizes) -> Result<JdwpValue> {
        let v = match value_tag {
            tag::BOOLEAN => JdwpValue::Boolean(self.read_bool()?),
            tag::BYTE => JdwpValue::Byte(self.read_u8()? as i8),
            tag::CHAR => JdwpValue::Char(self.read_u16()?),
            tag::SHORT => JdwpValue::Short(self.read_u16()? as i16),
            tag::INT => JdwpValue::Int(self.read_i32()?),
            tag::LONG => JdwpValue::Long(self.read_i64()?),
            tag::FLOAT => JdwpValue::Float(self.read_f32()?),
            tag::DOUBLE => JdwpValue::Double(self.read_f64()?),
            tag::VOID => JdwpValue::Void,
            other if tag::is_object(other) => {
                let id = self.read_id(sizes.object_id)?;
                if id == 0 {
                    JdwpValue::Null
                } else {
                    JdwpValue::Object(ObjectRef::new(id, other))
                }
            }
            other => {
                return Err(JdwpError::Protocol(format!("unknown value tag {other:#04x}")));
            }
        };
        Ok(v)
    }

    pub fn read_tagged_value(&mut self, sizes: &IdSizes) -> Result<JdwpValue> {
        let value_tag = self.read_u8()?;
        self.read_value(value_tag, sizes)
    }

    /// Read a tagged object id, mapping id 0 to `None`.
    pub fn read_tagged_object(&mut self, sizes: &IdSizes) -> Result<Option<ObjectRef>> {
        let value_tag = self.read_u8()?;
        let id = self.read_id(sizes.object_id)?;
        Ok((id != 0).then(|| ObjectRef::new(id, value_tag)))
    }
}
