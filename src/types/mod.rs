//! Core types for runtime-defined event records.
//!
//! ## Architecture
//!
//! - [`Kind`] is the closed set of field kinds, each with a fixed width (or none
//!   for strings) and a wire identifier
//! - [`Value`] is the dynamically typed value of one field; it encodes and
//!   decodes itself in an explicit [`ByteOrder`]
//! - [`FieldValue`] maps Rust scalar types onto kinds for typed access
//! - [`Field`] is one schema entry; [`FieldFlags`] marks its structural role
//! - [`Data`], [`DataArray`] and [`Packet`] hold record bytes
//!
//! ## Usage Example
//!
//! ```rust
//! use fieldstream::types::{ByteOrder, Kind, Value};
//!
//! let bytes = Value::Uint32(4500).encode(ByteOrder::BigEndian);
//! assert_eq!(bytes, vec![0x00, 0x00, 0x11, 0x94]);
//!
//! let decoded = Value::decode(Kind::Uint32, &bytes, ByteOrder::BigEndian);
//! assert_eq!(decoded, Some(Value::Uint32(4500)));
//! ```

mod byte_order;
mod field;
mod flags;
mod kind;
mod record;
mod value;

pub use byte_order::{ByteOrder, SourceKind};
pub use field::{Field, FieldOptions, StaticField};
pub(crate) use field::push_unique;
pub use flags::FieldFlags;
pub use kind::{Kind, Value};
pub use record::{Data, DataArray, Packet};
pub use value::FieldValue;
