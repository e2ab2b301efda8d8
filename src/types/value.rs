//! Typed field value conversion trait and implementations

use super::{Kind, Value};

/// Rust types that can be read from and written to a field.
pub trait FieldValue: Sized {
    /// Extracts `Self` from a decoded value, `None` on kind mismatch.
    fn from_value(value: Value) -> Option<Self>;

    /// Wraps `self` as a value of `kind`, `None` if `Self` cannot be stored as `kind`.
    fn into_value(self, kind: Kind) -> Option<Value>;
}

macro_rules! impl_field_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FieldValue for $ty {
                fn from_value(value: Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                fn into_value(self, kind: Kind) -> Option<Value> {
                    (kind == Kind::$variant).then_some(Value::$variant(self))
                }
            }
        )*
    };
}

impl_field_value! {
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => Uint8,
    u16 => Uint16,
    u32 => Uint32,
    u64 => Uint64,
    f32 => Float32,
    f64 => Float64,
}

impl FieldValue for String {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(v) | Value::CString(v) => Some(v),
            _ => None,
        }
    }

    fn into_value(self, kind: Kind) -> Option<Value> {
        match kind {
            Kind::String => Some(Value::String(self)),
            Kind::CString => Some(Value::CString(self)),
            _ => None,
        }
    }
}

impl FieldValue for Value {
    fn from_value(value: Value) -> Option<Self> {
        Some(value)
    }

    fn into_value(self, kind: Kind) -> Option<Value> {
        match (&self, kind) {
            (Value::String(s), Kind::CString) => Some(Value::CString(s.clone())),
            (Value::CString(s), Kind::String) => Some(Value::String(s.clone())),
            _ if self.kind() == kind => Some(self),
            _ => None,
        }
    }
}
