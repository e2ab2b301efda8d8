//! Field kind definitions and the fixed per-kind codec table

use serde::{Deserialize, Serialize};

use super::ByteOrder;

/// Closed set of field kinds.
///
/// Discriminants are part of the wire contract and must not change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum Kind {
    /// No value; used by empty and purely structural fields
    #[default]
    Invalid = 0,
    Bool = 1,
    Int8 = 2,
    Int16 = 3,
    Int32 = 4,
    Int64 = 5,
    Uint8 = 6,
    Uint16 = 7,
    Uint32 = 8,
    Uint64 = 9,
    Float32 = 10,
    Float64 = 11,
    /// Variable-length UTF-8 string, sized by content
    String = 12,
    /// NUL-terminated string inside a fixed-size buffer
    CString = 13,
}

impl Kind {
    /// Every kind, in wire-id order.
    pub const ALL: [Kind; 14] = [
        Kind::Invalid,
        Kind::Bool,
        Kind::Int8,
        Kind::Int16,
        Kind::Int32,
        Kind::Int64,
        Kind::Uint8,
        Kind::Uint16,
        Kind::Uint32,
        Kind::Uint64,
        Kind::Float32,
        Kind::Float64,
        Kind::String,
        Kind::CString,
    ];

    /// Width in bytes for fixed-size kinds, `None` for strings and `Invalid`.
    pub const fn size(&self) -> Option<usize> {
        match self {
            Kind::Bool | Kind::Int8 | Kind::Uint8 => Some(1),
            Kind::Int16 | Kind::Uint16 => Some(2),
            Kind::Int32 | Kind::Uint32 | Kind::Float32 => Some(4),
            Kind::Int64 | Kind::Uint64 | Kind::Float64 => Some(8),
            Kind::Invalid | Kind::String | Kind::CString => None,
        }
    }

    /// Returns true for string kinds.
    pub const fn is_text(&self) -> bool {
        matches!(self, Kind::String | Kind::CString)
    }

    /// Wire identifier.
    pub const fn id(&self) -> u32 {
        *self as u32
    }

    /// Maps a wire identifier back to a kind.
    pub fn from_id(id: u32) -> Option<Kind> {
        Kind::ALL.get(id as usize).copied()
    }
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

/// Runtime value of a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    CString(String),
}

macro_rules! decode_fixed {
    ($ty:ty, $bytes:expr, $order:expr) => {{
        let raw: [u8; std::mem::size_of::<$ty>()] = $bytes.try_into().ok()?;
        match $order {
            ByteOrder::LittleEndian => <$ty>::from_le_bytes(raw),
            ByteOrder::BigEndian => <$ty>::from_be_bytes(raw),
        }
    }};
}

macro_rules! encode_fixed {
    ($value:expr, $order:expr) => {
        match $order {
            ByteOrder::LittleEndian => $value.to_le_bytes().to_vec(),
            ByteOrder::BigEndian => $value.to_be_bytes().to_vec(),
        }
    };
}

impl Value {
    /// Kind this value encodes as.
    pub fn kind(&self) -> Kind {
        match self {
            Value::Bool(_) => Kind::Bool,
            Value::Int8(_) => Kind::Int8,
            Value::Int16(_) => Kind::Int16,
            Value::Int32(_) => Kind::Int32,
            Value::Int64(_) => Kind::Int64,
            Value::Uint8(_) => Kind::Uint8,
            Value::Uint16(_) => Kind::Uint16,
            Value::Uint32(_) => Kind::Uint32,
            Value::Uint64(_) => Kind::Uint64,
            Value::Float32(_) => Kind::Float32,
            Value::Float64(_) => Kind::Float64,
            Value::String(_) => Kind::String,
            Value::CString(_) => Kind::CString,
        }
    }

    /// Encodes the value in the given byte order.
    ///
    /// Strings are encoded as their UTF-8 bytes without terminator.
    pub fn encode(&self, order: ByteOrder) -> Vec<u8> {
        match self {
            Value::Bool(v) => vec![u8::from(*v)],
            Value::Int8(v) => encode_fixed!(v, order),
            Value::Int16(v) => encode_fixed!(v, order),
            Value::Int32(v) => encode_fixed!(v, order),
            Value::Int64(v) => encode_fixed!(v, order),
            Value::Uint8(v) => vec![*v],
            Value::Uint16(v) => encode_fixed!(v, order),
            Value::Uint32(v) => encode_fixed!(v, order),
            Value::Uint64(v) => encode_fixed!(v, order),
            Value::Float32(v) => encode_fixed!(v, order),
            Value::Float64(v) => encode_fixed!(v, order),
            Value::String(v) | Value::CString(v) => v.as_bytes().to_vec(),
        }
    }

    /// Decodes a value of `kind` from `bytes`.
    ///
    /// Fixed-size kinds require exactly their width. `CString` stops at the
    /// first NUL. Returns `None` for `Kind::Invalid`, a width mismatch or
    /// text that is not valid UTF-8.
    pub fn decode(kind: Kind, bytes: &[u8], order: ByteOrder) -> Option<Value> {
        let value = match kind {
            Kind::Invalid => return None,
            Kind::Bool => Value::Bool(*single(bytes)? != 0),
            Kind::Int8 => Value::Int8(*single(bytes)? as i8),
            Kind::Uint8 => Value::Uint8(*single(bytes)?),
            Kind::Int16 => Value::Int16(decode_fixed!(i16, bytes, order)),
            Kind::Int32 => Value::Int32(decode_fixed!(i32, bytes, order)),
            Kind::Int64 => Value::Int64(decode_fixed!(i64, bytes, order)),
            Kind::Uint16 => Value::Uint16(decode_fixed!(u16, bytes, order)),
            Kind::Uint32 => Value::Uint32(decode_fixed!(u32, bytes, order)),
            Kind::Uint64 => Value::Uint64(decode_fixed!(u64, bytes, order)),
            Kind::Float32 => Value::Float32(decode_fixed!(f32, bytes, order)),
            Kind::Float64 => Value::Float64(decode_fixed!(f64, bytes, order)),
            Kind::String => Value::String(std::str::from_utf8(bytes).ok()?.to_owned()),
            Kind::CString => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                Value::CString(std::str::from_utf8(&bytes[..end]).ok()?.to_owned())
            }
        };
        Some(value)
    }
}

fn single(bytes: &[u8]) -> Option<&u8> {
    match bytes {
        [b] => Some(b),
        _ => None,
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int8(v) => write!(f, "{v}"),
            Value::Int16(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Uint8(v) => write!(f, "{v}"),
            Value::Uint16(v) => write!(f, "{v}"),
            Value::Uint32(v) => write!(f, "{v}"),
            Value::Uint64(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::String(v) | Value::CString(v) => f.write_str(v),
        }
    }
}
