//! Protobuf wire envelope for records, packets and schema descriptors
//!
//! Messages are declared directly with `prost` derives. Field numbers are part
//! of the wire contract with remote consumers and must not change.

use std::collections::BTreeMap;

use prost::Message;

use crate::types::{Data, DataArray, Field, FieldFlags, Kind, Packet};
use crate::{DataSourceError, Result};

/// Descriptor flag: fixed-size fields are big-endian.
pub const FLAG_BIG_ENDIAN: u32 = 1 << 0;

#[derive(Clone, PartialEq, Message)]
pub struct WireData {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub payload: Vec<Vec<u8>>,
    #[prost(uint32, tag = "2")]
    pub seq: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireDataArray {
    #[prost(message, repeated, tag = "1")]
    pub records: Vec<WireData>,
    #[prost(uint32, tag = "2")]
    pub seq: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireField {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub full_name: String,
    #[prost(uint32, tag = "3")]
    pub index: u32,
    #[prost(uint32, tag = "4")]
    pub payload_index: u32,
    #[prost(uint32, tag = "5")]
    pub kind: u32,
    #[prost(uint32, tag = "6")]
    pub size: u32,
    #[prost(uint32, tag = "7")]
    pub offs: u32,
    /// Only meaningful when the `HAS_PARENT` flag is set
    #[prost(uint32, tag = "8")]
    pub parent: u32,
    #[prost(uint32, tag = "9")]
    pub flags: u32,
    #[prost(string, repeated, tag = "10")]
    pub tags: Vec<String>,
    #[prost(btree_map = "string, string", tag = "11")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct WireDataSource {
    #[prost(string, tag = "1")]
    pub name: String,
    /// Source cardinality, see [`SourceKind`](crate::SourceKind)
    #[prost(uint32, tag = "2")]
    pub kind: u32,
    #[prost(message, repeated, tag = "3")]
    pub fields: Vec<WireField>,
    #[prost(string, repeated, tag = "4")]
    pub tags: Vec<String>,
    #[prost(btree_map = "string, string", tag = "5")]
    pub annotations: BTreeMap<String, String>,
    #[prost(uint32, tag = "6")]
    pub flags: u32,
}

impl From<&Data> for WireData {
    fn from(data: &Data) -> Self {
        Self { payload: data.payload.clone(), seq: data.seq }
    }
}

impl From<WireData> for Data {
    fn from(wire: WireData) -> Self {
        Data { payload: wire.payload, seq: wire.seq }
    }
}

impl From<&DataArray> for WireDataArray {
    fn from(array: &DataArray) -> Self {
        Self { records: array.iter().map(WireData::from).collect(), seq: array.seq }
    }
}

impl From<WireDataArray> for DataArray {
    fn from(wire: WireDataArray) -> Self {
        DataArray { records: wire.records.into_iter().map(Data::from).collect(), seq: wire.seq }
    }
}

impl From<&Field> for WireField {
    fn from(field: &Field) -> Self {
        Self {
            name: field.name.clone(),
            full_name: field.full_name.clone(),
            index: field.index,
            payload_index: field.payload_index,
            kind: field.kind.id(),
            size: field.size,
            offs: field.offs,
            parent: field.parent.unwrap_or(0),
            flags: field.flags.bits(),
            tags: field.tags.clone(),
            annotations: field.annotations.clone(),
        }
    }
}

impl TryFrom<WireField> for Field {
    type Error = DataSourceError;

    fn try_from(wire: WireField) -> Result<Self> {
        let kind = Kind::from_id(wire.kind).ok_or_else(|| {
            DataSourceError::schema(format!("field {:?} has unknown kind id {}", wire.name, wire.kind))
        })?;
        let flags = FieldFlags::from_bits(wire.flags).ok_or_else(|| {
            DataSourceError::schema(format!("field {:?} has unknown flag bits {:#x}", wire.name, wire.flags))
        })?;
        let parent = flags.contains(FieldFlags::HAS_PARENT).then_some(wire.parent);

        Ok(Field {
            index: wire.index,
            name: wire.name,
            full_name: wire.full_name,
            kind,
            size: wire.size,
            offs: wire.offs,
            payload_index: wire.payload_index,
            parent,
            flags,
            tags: wire.tags,
            annotations: wire.annotations,
        })
    }
}

impl Data {
    pub fn marshal(&self) -> Vec<u8> {
        WireData::from(self).encode_to_vec()
    }
}

impl DataArray {
    pub fn marshal(&self) -> Vec<u8> {
        WireDataArray::from(self).encode_to_vec()
    }
}

impl Packet {
    /// Encodes the packet with the wire message matching its shape.
    pub fn marshal(&self) -> Vec<u8> {
        match self {
            Packet::Single(data) => data.marshal(),
            Packet::Array(array) => array.marshal(),
        }
    }
}

/// Decodes a single record without checking it against any schema.
pub fn decode_data(bytes: &[u8]) -> Result<Data> {
    WireData::decode(bytes)
        .map(Data::from)
        .map_err(|e| DataSourceError::Deserialization { context: "data record", source: Some(e) })
}

/// Decodes a record array without checking it against any schema.
pub fn decode_data_array(bytes: &[u8]) -> Result<DataArray> {
    WireDataArray::decode(bytes)
        .map(DataArray::from)
        .map_err(|e| DataSourceError::Deserialization { context: "data array", source: Some(e) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_bytes_survive_encoding() {
        let mut data = Data::from_payload(vec![vec![1, 2, 3], Vec::new(), vec![0; 16]]);
        data.set_seq(41);
        let decoded = decode_data(&data.marshal()).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn array_keeps_order_and_seq() {
        let mut array = DataArray::new();
        array.push(Data::from_payload(vec![vec![1]]));
        array.push(Data::from_payload(vec![vec![2]]));
        array.set_seq(77);
        let decoded = decode_data_array(&Packet::Array(array.clone()).marshal()).unwrap();
        assert_eq!(decoded, array);
    }

    #[test]
    fn garbage_is_a_deserialization_error() {
        // Truncated length-delimited field.
        let err = decode_data(&[0x0a, 0x05, 0x01]).unwrap_err();
        assert!(matches!(err, DataSourceError::Deserialization { context: "data record", .. }));
        assert!(decode_data_array(&[0x0a, 0xff]).is_err());
    }

    #[test]
    fn field_conversion_rejects_unknown_ids() {
        let wire = WireField { name: "x".into(), kind: 99, ..Default::default() };
        assert!(Field::try_from(wire).is_err());

        let wire = WireField { name: "x".into(), kind: 1, flags: 1 << 20, ..Default::default() };
        assert!(Field::try_from(wire).is_err());
    }

    #[test]
    fn parent_is_only_read_with_flag() {
        let wire = WireField { name: "x".into(), kind: 1, parent: 3, ..Default::default() };
        assert_eq!(Field::try_from(wire).unwrap().parent, None);

        let wire = WireField {
            name: "x".into(),
            kind: 1,
            parent: 3,
            flags: FieldFlags::HAS_PARENT.bits(),
            ..Default::default()
        };
        assert_eq!(Field::try_from(wire).unwrap().parent, Some(3));
    }
}
