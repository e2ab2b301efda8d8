//! Schema descriptors: exporting a registry and rebuilding it remotely

use prost::Message;
use tracing::{debug, warn};

use super::DataSource;
use super::schema::Schema;
use crate::types::{ByteOrder, Field, SourceKind};
use crate::wire::{FLAG_BIG_ENDIAN, WireDataSource, WireField};
use crate::{DataSourceError, Result};

impl DataSource {
    /// Describes this source's schema for a remote consumer.
    pub fn descriptor(&self) -> WireDataSource {
        let schema = self.schema.read();
        WireDataSource {
            name: self.name.clone(),
            kind: self.kind as u32,
            fields: schema.fields().iter().map(|f| WireField::from(f.as_ref())).collect(),
            tags: schema.tags.clone(),
            annotations: schema.annotations.clone(),
            flags: if self.byte_order.is_big_endian() { FLAG_BIG_ENDIAN } else { 0 },
        }
    }

    pub fn to_descriptor_bytes(&self) -> Vec<u8> {
        self.descriptor().encode_to_vec()
    }

    /// Rebuilds a source from a descriptor, keeping every offset and payload
    /// index as sent. The declared byte order is honored regardless of the
    /// local host.
    pub fn from_descriptor(descriptor: &WireDataSource) -> Result<Self> {
        let kind = SourceKind::from_id(descriptor.kind).ok_or_else(|| {
            DataSourceError::schema(format!("unknown source kind id {}", descriptor.kind))
        })?;
        let byte_order = if descriptor.flags & FLAG_BIG_ENDIAN != 0 {
            ByteOrder::BigEndian
        } else {
            ByteOrder::LittleEndian
        };

        let fields = descriptor
            .fields
            .iter()
            .cloned()
            .map(Field::try_from)
            .collect::<Result<Vec<_>>>()?;

        let mut schema = Schema::from_fields(fields).inspect_err(|e| {
            warn!(source = %descriptor.name, error = %e, "Rejected schema descriptor");
        })?;
        schema.tags = descriptor.tags.clone();
        schema.annotations = descriptor.annotations.clone();

        debug!(
            source = %descriptor.name,
            fields = descriptor.fields.len(),
            ?byte_order,
            "Rebuilt data source from descriptor"
        );
        Ok(Self::from_schema(descriptor.name.clone(), kind, byte_order, schema))
    }

    pub fn from_descriptor_bytes(bytes: &[u8]) -> Result<Self> {
        let descriptor = WireDataSource::decode(bytes).map_err(|e| DataSourceError::Deserialization {
            context: "data source descriptor",
            source: Some(e),
        })?;
        Self::from_descriptor(&descriptor)
    }
}
