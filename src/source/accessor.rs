//! Bounded, typed views onto one field of a record
//!
//! An accessor captures the field definition and the source byte order at
//! creation time. Every read and write is bounded by the field's slot, offset
//! and size; malformed records produce errors, never panics.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use crate::types::{ByteOrder, Data, Field, FieldFlags, FieldValue, Kind, Value};
use crate::{DataSourceError, Result};

/// Handle for reading and writing one field of records from a data source.
#[derive(Debug, Clone)]
pub struct FieldAccessor {
    field: Arc<Field>,
    order: ByteOrder,
}

impl FieldAccessor {
    pub(crate) fn new(field: Arc<Field>, order: ByteOrder) -> Self {
        Self { field, order }
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    pub fn name(&self) -> &str {
        &self.field.name
    }

    pub fn full_name(&self) -> &str {
        &self.field.full_name
    }

    pub fn kind(&self) -> Kind {
        self.field.kind
    }

    pub fn size(&self) -> u32 {
        self.field.size
    }

    pub fn flags(&self) -> FieldFlags {
        self.field.flags
    }

    pub fn tags(&self) -> &[String] {
        &self.field.tags
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.field.annotations
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    fn label(&self) -> String {
        if self.field.is_container() {
            format!("<container {}>", self.field.payload_index)
        } else {
            self.field.full_name.clone()
        }
    }

    /// Byte window inside the slot, `None` when the field spans the whole slot.
    fn window(&self) -> Option<Range<usize>> {
        if self.field.is_static_member() || self.field.is_container() {
            let start = self.field.offs as usize;
            return Some(start..start + self.field.size as usize);
        }
        self.field.kind.size().map(|width| 0..width)
    }

    fn check_payload(&self) -> Result<()> {
        if self.field.is_empty() {
            return Err(DataSourceError::NoPayload { field: self.label() });
        }
        Ok(())
    }

    /// Returns the raw bytes of this field.
    pub fn get_bytes<'a>(&self, data: &'a Data) -> Result<&'a [u8]> {
        self.check_payload()?;
        let slot = data.slot(self.field.payload_index).unwrap_or_default();

        match self.window() {
            Some(range) => slot.get(range.clone()).ok_or_else(|| DataSourceError::InvalidSize {
                field: self.label(),
                needed: range.end,
                available: slot.len(),
            }),
            None if (self.field.payload_index as usize) < data.slot_count() => Ok(slot),
            None => Err(DataSourceError::InvalidSize {
                field: self.label(),
                needed: 0,
                available: 0,
            }),
        }
    }

    /// Writes raw bytes into this field.
    ///
    /// Fields with a fixed window are zero-padded when `bytes` is shorter.
    /// Fields owning their slot (including containers) grow it as needed;
    /// static members must fit the slot as allocated.
    pub fn set_bytes(&self, data: &mut Data, bytes: &[u8]) -> Result<()> {
        self.check_payload()?;
        let label = self.label();
        let owns_slot = !self.field.is_static_member();
        let slot = data
            .payload
            .get_mut(self.field.payload_index as usize)
            .ok_or_else(|| DataSourceError::InvalidSize {
                field: label.clone(),
                needed: self.field.extent() as usize,
                available: 0,
            })?;

        let Some(range) = self.window() else {
            *slot = bytes.to_vec();
            return Ok(());
        };

        if bytes.len() > range.len() {
            return Err(DataSourceError::ValueTooWide {
                field: label,
                width: bytes.len(),
                size: range.len(),
            });
        }
        if slot.len() < range.end {
            if owns_slot {
                slot.resize(range.end, 0);
            } else {
                return Err(DataSourceError::InvalidSize {
                    field: label,
                    needed: range.end,
                    available: slot.len(),
                });
            }
        }

        let window = &mut slot[range];
        let (head, tail) = window.split_at_mut(bytes.len());
        head.copy_from_slice(bytes);
        tail.fill(0);
        Ok(())
    }

    /// Decodes the field's value in the source byte order.
    pub fn get_value(&self, data: &Data) -> Result<Value> {
        let kind = self.field.kind;
        if kind == Kind::Invalid {
            return Err(DataSourceError::TypeConversion {
                details: format!("field {:?} has no value kind", self.label()),
            });
        }

        let bytes = self.get_bytes(data)?;
        let bytes = match kind.size() {
            Some(width) => bytes.get(..width).ok_or_else(|| DataSourceError::InvalidSize {
                field: self.label(),
                needed: width,
                available: bytes.len(),
            })?,
            // Fixed-size text windows are NUL padded.
            None if self.field.is_static_member() => until_nul(bytes),
            None => bytes,
        };

        Value::decode(kind, bytes, self.order).ok_or_else(|| DataSourceError::TypeConversion {
            details: format!("cannot decode {} bytes as {}", bytes.len(), kind),
        })
    }

    /// Encodes `value` into the field. Strings and C strings are interchangeable;
    /// every other kind must match exactly.
    pub fn set_value(&self, data: &mut Data, value: Value) -> Result<()> {
        if self.field.is_container() {
            return Err(DataSourceError::TypeConversion {
                details: "containers hold raw bytes, use set_bytes".to_string(),
            });
        }
        let kind = self.field.kind;
        let given = value.kind();
        let value = value.into_value(kind).ok_or_else(|| DataSourceError::TypeConversion {
            details: format!("field {:?} is {}, value is {}", self.label(), kind, given),
        })?;
        self.set_bytes(data, &value.encode(self.order))
    }

    /// Reads the field as `T`.
    ///
    /// ```rust
    /// use fieldstream::{DataSource, FieldOptions, Kind, SourceKind};
    ///
    /// let source = DataSource::new("events", SourceKind::Single);
    /// let pid = source.add_field("pid", Kind::Uint32, FieldOptions::new()).unwrap();
    /// let mut data = source.new_data();
    /// pid.set(&mut data, 4242u32).unwrap();
    /// assert_eq!(pid.get::<u32>(&data).unwrap(), 4242);
    /// assert!(pid.get::<i32>(&data).is_err());
    /// ```
    pub fn get<T: FieldValue>(&self, data: &Data) -> Result<T> {
        let value = self.get_value(data)?;
        let kind = value.kind();
        T::from_value(value).ok_or_else(|| DataSourceError::TypeConversion {
            details: format!(
                "field {:?} is {}, requested {}",
                self.label(),
                kind,
                std::any::type_name::<T>()
            ),
        })
    }

    /// Writes `value` into the field.
    pub fn set<T: FieldValue>(&self, data: &mut Data, value: T) -> Result<()> {
        let kind = self.field.kind;
        let value = value.into_value(kind).ok_or_else(|| DataSourceError::TypeConversion {
            details: format!(
                "field {:?} is {}, cannot store {}",
                self.label(),
                kind,
                std::any::type_name::<T>()
            ),
        })?;
        self.set_value(data, value)
    }

    /// Reads a text field.
    pub fn string(&self, data: &Data) -> Result<String> {
        self.get(data)
    }
}

fn until_nul(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldFlags;

    fn field(kind: Kind, flags: FieldFlags, offs: u32, size: u32) -> Arc<Field> {
        Arc::new(Field {
            index: 0,
            name: "f".into(),
            full_name: "f".into(),
            kind,
            size,
            offs,
            payload_index: 0,
            parent: None,
            flags,
            tags: Vec::new(),
            annotations: BTreeMap::new(),
        })
    }

    #[test]
    fn owned_fixed_field_roundtrip_both_orders() {
        for order in [ByteOrder::LittleEndian, ByteOrder::BigEndian] {
            let acc = FieldAccessor::new(field(Kind::Int16, FieldFlags::empty(), 0, 2), order);
            let mut data = Data::from_payload(vec![vec![0; 2]]);
            acc.set(&mut data, -2i16).unwrap();
            assert_eq!(acc.get::<i16>(&data).unwrap(), -2);
            let expected = match order {
                ByteOrder::LittleEndian => (-2i16).to_le_bytes(),
                ByteOrder::BigEndian => (-2i16).to_be_bytes(),
            };
            assert_eq!(acc.get_bytes(&data).unwrap(), expected.as_slice());
        }
    }

    #[test]
    fn big_endian_bytes_are_laid_out_msb_first() {
        let acc = FieldAccessor::new(field(Kind::Uint32, FieldFlags::empty(), 0, 4), ByteOrder::BigEndian);
        let mut data = Data::from_payload(vec![vec![0; 4]]);
        acc.set(&mut data, 0x0102_0304u32).unwrap();
        assert_eq!(data.payload()[0], vec![1, 2, 3, 4]);
    }

    #[test]
    fn truncated_slot_reports_invalid_size() {
        let acc = FieldAccessor::new(
            field(Kind::Uint32, FieldFlags::STATIC_MEMBER, 4, 4),
            ByteOrder::LittleEndian,
        );
        let data = Data::from_payload(vec![vec![0; 6]]);
        let err = acc.get::<u32>(&data).unwrap_err();
        assert!(matches!(err, DataSourceError::InvalidSize { needed: 8, available: 6, .. }));

        let missing = Data::from_payload(Vec::new());
        assert!(matches!(acc.get_value(&missing), Err(DataSourceError::InvalidSize { .. })));
    }

    #[test]
    fn static_text_is_nul_padded() {
        let acc = FieldAccessor::new(
            field(Kind::CString, FieldFlags::STATIC_MEMBER, 4, 8),
            ByteOrder::LittleEndian,
        );
        let mut data = Data::from_payload(vec![vec![0xff; 12]]);
        acc.set(&mut data, "bash".to_string()).unwrap();
        assert_eq!(&data.payload()[0][4..12], b"bash\0\0\0\0");
        assert_eq!(acc.string(&data).unwrap(), "bash");

        let err = acc.set(&mut data, "much-too-long".to_string()).unwrap_err();
        assert!(matches!(err, DataSourceError::ValueTooWide { width: 13, size: 8, .. }));
    }

    #[test]
    fn dynamic_string_replaces_slot() {
        let acc = FieldAccessor::new(field(Kind::String, FieldFlags::empty(), 0, 0), ByteOrder::native());
        let mut data = Data::from_payload(vec![Vec::new()]);
        acc.set(&mut data, "hello world".to_string()).unwrap();
        assert_eq!(acc.string(&data).unwrap(), "hello world");
        acc.set(&mut data, "hi".to_string()).unwrap();
        assert_eq!(data.payload()[0], b"hi".to_vec());
    }

    #[test]
    fn invalid_utf8_is_an_error_but_raw_bytes_survive() {
        let acc = FieldAccessor::new(field(Kind::String, FieldFlags::empty(), 0, 0), ByteOrder::native());
        let data = Data::from_payload(vec![vec![b'a', 0xc3, 0x28]]);
        assert!(matches!(acc.get_value(&data), Err(DataSourceError::TypeConversion { .. })));
        assert!(acc.string(&data).is_err());
        assert_eq!(acc.get_bytes(&data).unwrap(), [b'a', 0xc3, 0x28].as_slice());
    }

    #[test]
    fn kind_mismatch_is_type_conversion() {
        let acc = FieldAccessor::new(field(Kind::Uint8, FieldFlags::empty(), 0, 1), ByteOrder::native());
        let mut data = Data::from_payload(vec![vec![0]]);
        assert!(matches!(acc.set(&mut data, 1u16), Err(DataSourceError::TypeConversion { .. })));
        assert!(matches!(acc.get::<bool>(&data), Err(DataSourceError::TypeConversion { .. })));
        assert!(matches!(
            acc.set_value(&mut data, Value::String("x".into())),
            Err(DataSourceError::TypeConversion { .. })
        ));
    }

    #[test]
    fn empty_fields_have_no_payload() {
        let acc = FieldAccessor::new(field(Kind::Invalid, FieldFlags::EMPTY, 0, 0), ByteOrder::native());
        let mut data = Data::from_payload(vec![vec![1]]);
        assert!(matches!(acc.get_bytes(&data), Err(DataSourceError::NoPayload { .. })));
        assert!(matches!(acc.set_bytes(&mut data, &[1]), Err(DataSourceError::NoPayload { .. })));
    }

    #[test]
    fn container_set_bytes_pads_and_grows() {
        let mut container = (*field(Kind::Invalid, FieldFlags::CONTAINER, 0, 6)).clone();
        container.index = Field::UNREGISTERED;
        let acc = FieldAccessor::new(Arc::new(container), ByteOrder::native());

        let mut data = Data::from_payload(vec![vec![9; 2]]);
        acc.set_bytes(&mut data, &[1, 2, 3]).unwrap();
        assert_eq!(data.payload()[0], vec![1, 2, 3, 0, 0, 0]);
        assert_eq!(acc.get_bytes(&data).unwrap().len(), 6);

        let err = acc.set_bytes(&mut data, &[0; 7]).unwrap_err();
        assert!(matches!(err, DataSourceError::ValueTooWide { .. }));
        assert!(acc.set_value(&mut data, Value::Uint8(1)).is_err());
    }

    #[test]
    fn wider_member_decodes_leading_kind_width() {
        let acc = FieldAccessor::new(
            field(Kind::Uint16, FieldFlags::STATIC_MEMBER, 0, 4),
            ByteOrder::LittleEndian,
        );
        let data = Data::from_payload(vec![vec![0x34, 0x12, 0xff, 0xff]]);
        assert_eq!(acc.get::<u16>(&data).unwrap(), 0x1234);
    }
}
