//! Byte order and source cardinality

use serde::{Deserialize, Serialize};

/// Byte order used to encode every fixed-size field of a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    /// Byte order of the host.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") { ByteOrder::BigEndian } else { ByteOrder::LittleEndian }
    }

    pub const fn is_big_endian(&self) -> bool {
        matches!(self, ByteOrder::BigEndian)
    }
}

impl Default for ByteOrder {
    fn default() -> Self {
        Self::native()
    }
}

/// Cardinality of the packets a data source produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum SourceKind {
    /// One record per packet
    Single = 0,
    /// A batch of records per packet
    Array = 1,
}

impl SourceKind {
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(SourceKind::Single),
            1 => Some(SourceKind::Array),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Single => f.write_str("single"),
            SourceKind::Array => f.write_str("array"),
        }
    }
}
