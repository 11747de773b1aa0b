//! Thrift binary protocol encoding.
//!
//! Only the subset of the protocol spoken by HiveServer2 is implemented:
//! strict message headers, structs, lists, maps and the scalar types. Values
//! are written big-endian as the binary protocol requires.

use thiserror::Error;

const VERSION_1: u32 = 0x8001_0000;
const VERSION_MASK: u32 = 0xffff_0000;
const MAX_SKIP_DEPTH: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of message")]
    UnexpectedEof,

    #[error("invalid thrift type id {0}")]
    InvalidType(u8),

    #[error("invalid message type {0}")]
    InvalidMessageType(u8),

    #[error("bad protocol version {0:#x}")]
    BadVersion(u32),

    #[error("negative size {0}")]
    NegativeSize(i32),

    #[error("string field is not valid UTF-8")]
    InvalidUtf8,

    #[error("nesting exceeds {MAX_SKIP_DEPTH} levels")]
    DepthLimit,

    #[error("required field {structure}.{field} is missing")]
    MissingField {
        structure: &'static str,
        field: &'static str,
    },
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Thrift wire types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TType {
    Stop,
    Void,
    Bool,
    Byte,
    Double,
    I16,
    I32,
    I64,
    /// Strings and binary share the same wire type
    String,
    Struct,
    Map,
    Set,
    List,
    Uuid,
}

impl TType {
    fn from_u8(value: u8) -> CodecResult<Self> {
        Ok(match value {
            0 => Self::Stop,
            1 => Self::Void,
            2 => Self::Bool,
            3 => Self::Byte,
            4 => Self::Double,
            6 => Self::I16,
            8 => Self::I32,
            10 => Self::I64,
            11 => Self::String,
            12 => Self::Struct,
            13 => Self::Map,
            14 => Self::Set,
            15 => Self::List,
            16 => Self::Uuid,
            other => return Err(CodecError::InvalidType(other)),
        })
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Stop => 0,
            Self::Void => 1,
            Self::Bool => 2,
            Self::Byte => 3,
            Self::Double => 4,
            Self::I16 => 6,
            Self::I32 => 8,
            Self::I64 => 10,
            Self::String => 11,
            Self::Struct => 12,
            Self::Map => 13,
            Self::Set => 14,
            Self::List => 15,
            Self::Uuid => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Call,
    Reply,
    Exception,
    Oneway,
}

impl MessageType {
    fn from_u8(value: u8) -> CodecResult<Self> {
        match value {
            1 => Ok(Self::Call),
            2 => Ok(Self::Reply),
            3 => Ok(Self::Exception),
            4 => Ok(Self::Oneway),
            other => Err(CodecError::InvalidMessageType(other)),
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Call => 1,
            Self::Reply => 2,
            Self::Exception => 3,
            Self::Oneway => 4,
        }
    }
}

/// Header of a thrift message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub name: String,
    pub message_type: MessageType,
    pub sequence: i32,
}

/// Types that serialize themselves as a thrift struct body.
pub trait ThriftEncode {
    /// Write the struct fields followed by the stop marker.
    fn encode(&self, w: &mut ThriftWriter);
}

/// Types that deserialize from a thrift struct body.
pub trait ThriftDecode: Sized {
    fn decode(r: &mut ThriftReader<'_>) -> CodecResult<Self>;
}

/// Unwrap a required field collected while decoding a struct.
pub fn required<T>(value: Option<T>, structure: &'static str, field: &'static str) -> CodecResult<T> {
    value.ok_or(CodecError::MissingField { structure, field })
}

/// Append-only writer producing a binary protocol buffer.
#[derive(Debug, Default)]
pub struct ThriftWriter {
    buf: Vec<u8>,
}

impl ThriftWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn message_begin(&mut self, name: &str, message_type: MessageType, sequence: i32) {
        let version = VERSION_1 | u32::from(message_type.as_u8());
        self.buf.extend_from_slice(&version.to_be_bytes());
        self.write_string(name);
        self.write_i32(sequence);
    }

    pub fn field_begin(&mut self, field_type: TType, id: i16) {
        self.buf.push(field_type.as_u8());
        self.write_i16(id);
    }

    pub fn field_stop(&mut self) {
        self.buf.push(TType::Stop.as_u8());
    }

    pub fn list_begin(&mut self, element_type: TType, size: usize) {
        self.buf.push(element_type.as_u8());
        self.write_size(size);
    }

    pub fn map_begin(&mut self, key_type: TType, value_type: TType, size: usize) {
        self.buf.push(key_type.as_u8());
        self.buf.push(value_type.as_u8());
        self.write_size(size);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn write_byte(&mut self, value: i8) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_double(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_bits().to_be_bytes());
    }

    pub fn write_string(&mut self, value: &str) {
        self.write_binary(value.as_bytes());
    }

    pub fn write_binary(&mut self, value: &[u8]) {
        self.write_size(value.len());
        self.buf.extend_from_slice(value);
    }

    /// Write a nested struct as field `id`.
    pub fn write_struct_field<T: ThriftEncode>(&mut self, id: i16, value: &T) {
        self.field_begin(TType::Struct, id);
        value.encode(self);
    }

    pub fn write_string_field(&mut self, id: i16, value: &str) {
        self.field_begin(TType::String, id);
        self.write_string(value);
    }

    pub fn write_string_map_field<'a, I>(&mut self, id: i16, entries: I)
    where
        I: ExactSizeIterator<Item = (&'a String, &'a String)>,
    {
        self.field_begin(TType::Map, id);
        self.map_begin(TType::String, TType::String, entries.len());
        for (key, value) in entries {
            self.write_string(key);
            self.write_string(value);
        }
    }

    fn write_size(&mut self, size: usize) {
        // Sizes above i32::MAX cannot be represented on the wire.
        let size = i32::try_from(size).unwrap_or(i32::MAX);
        self.write_i32(size);
    }
}

/// Cursor over a binary protocol buffer.
#[derive(Debug)]
pub struct ThriftReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ThriftReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(CodecError::UnexpectedEof)?;
        let bytes = self
            .buf
            .get(self.pos..end)
            .ok_or(CodecError::UnexpectedEof)?;
        self.pos = end;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_message_begin(&mut self) -> CodecResult<MessageHeader> {
        let first = self.read_i32()?;
        if first < 0 {
            let word = first as u32;
            if word & VERSION_MASK != VERSION_1 {
                return Err(CodecError::BadVersion(word));
            }
            let message_type = MessageType::from_u8((word & 0xff) as u8)?;
            let name = self.read_string()?;
            let sequence = self.read_i32()?;
            Ok(MessageHeader {
                name,
                message_type,
                sequence,
            })
        } else {
            // Non-strict header: the first word is the name length.
            let name_bytes = self.take(first as usize)?;
            let name = String::from_utf8(name_bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)?;
            let message_type = MessageType::from_u8(self.read_u8()?)?;
            let sequence = self.read_i32()?;
            Ok(MessageHeader {
                name,
                message_type,
                sequence,
            })
        }
    }

    /// Read a field header. The id is 0 for the stop marker.
    pub fn read_field_begin(&mut self) -> CodecResult<(TType, i16)> {
        let field_type = TType::from_u8(self.read_u8()?)?;
        if field_type == TType::Stop {
            return Ok((TType::Stop, 0));
        }
        Ok((field_type, self.read_i16()?))
    }

    pub fn read_list_begin(&mut self) -> CodecResult<(TType, usize)> {
        let element_type = TType::from_u8(self.read_u8()?)?;
        let size = self.read_size()?;
        Ok((element_type, size))
    }

    pub fn read_map_begin(&mut self) -> CodecResult<(TType, TType, usize)> {
        let key_type = TType::from_u8(self.read_u8()?)?;
        let value_type = TType::from_u8(self.read_u8()?)?;
        let size = self.read_size()?;
        Ok((key_type, value_type, size))
    }

    fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> CodecResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_byte(&mut self) -> CodecResult<i8> {
        Ok(i8::from_be_bytes(self.take_array()?))
    }

    pub fn read_i16(&mut self) -> CodecResult<i16> {
        Ok(i16::from_be_bytes(self.take_array()?))
    }

    pub fn read_i32(&mut self) -> CodecResult<i32> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn read_i64(&mut self) -> CodecResult<i64> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    pub fn read_double(&mut self) -> CodecResult<f64> {
        Ok(f64::from_bits(u64::from_be_bytes(self.take_array()?)))
    }

    pub fn read_binary(&mut self) -> CodecResult<Vec<u8>> {
        let len = self.read_size()?;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_string(&mut self) -> CodecResult<String> {
        String::from_utf8(self.read_binary()?).map_err(|_| CodecError::InvalidUtf8)
    }

    fn read_size(&mut self) -> CodecResult<usize> {
        let size = self.read_i32()?;
        usize::try_from(size).map_err(|_| CodecError::NegativeSize(size))
    }

    /// Skip a value of the given type, including nested containers.
    pub fn skip(&mut self, field_type: TType) -> CodecResult<()> {
        self.skip_depth(field_type, 0)
    }

    fn skip_depth(&mut self, field_type: TType, depth: usize) -> CodecResult<()> {
        if depth > MAX_SKIP_DEPTH {
            return Err(CodecError::DepthLimit);
        }
        match field_type {
            TType::Stop | TType::Void => {}
            TType::Bool | TType::Byte => {
                self.take(1)?;
            }
            TType::I16 => {
                self.take(2)?;
            }
            TType::I32 => {
                self.take(4)?;
            }
            TType::I64 | TType::Double => {
                self.take(8)?;
            }
            TType::Uuid => {
                self.take(16)?;
            }
            TType::String => {
                let len = self.read_size()?;
                self.take(len)?;
            }
            TType::Struct => loop {
                let (inner, _) = self.read_field_begin()?;
                if inner == TType::Stop {
                    break;
                }
                self.skip_depth(inner, depth + 1)?;
            },
            TType::List | TType::Set => {
                let (element_type, size) = self.read_list_begin()?;
                for _ in 0..size {
                    self.skip_depth(element_type, depth + 1)?;
                }
            }
            TType::Map => {
                let (key_type, value_type, size) = self.read_map_begin()?;
                for _ in 0..size {
                    self.skip_depth(key_type, depth + 1)?;
                    self.skip_depth(value_type, depth + 1)?;
                }
            }
        }
        Ok(())
    }
}

/// Length of the first complete message in `buf`, or `UnexpectedEof` if
/// more bytes are needed.
pub fn message_len(buf: &[u8]) -> CodecResult<usize> {
    let mut r = ThriftReader::new(buf);
    r.read_message_begin()?;
    r.skip(TType::Struct)?;
    Ok(r.position())
}
