//! The data source registry
//!
//! A [`DataSource`] owns a schema of fields, allocates records shaped for it
//! and runs emitted packets through its subscribers. Setup (adding fields and
//! subscribers) happens on one thread; once the first packet is emitted the
//! schema is sealed and the source may be shared freely behind an `Arc`.
//!
//! ## Usage Example
//!
//! ```rust
//! use fieldstream::{DataSource, FieldOptions, Kind, Outcome, SourceKind, StaticField};
//!
//! let source = DataSource::new("exec", SourceKind::Single);
//! let container = source
//!     .add_static_fields(20, &[
//!         StaticField::new("pid", Kind::Uint32, 0),
//!         StaticField::new("comm", Kind::CString, 4).with_size(16),
//!     ])
//!     .unwrap();
//! let comm = source.get_field("comm").unwrap();
//!
//! source
//!     .subscribe(move |_, data| match comm.string(data) {
//!         Ok(name) if name == "sshd" => Outcome::Discard,
//!         _ => Outcome::Continue,
//!     }, 0)
//!     .unwrap();
//!
//! let mut packet = source.new_packet_single().unwrap();
//! if let Some(data) = packet.as_single_mut() {
//!     container.set_bytes(data, &[7, 0, 0, 0, b'b', b'a', b's', b'h']).unwrap();
//! }
//! source.emit_and_release(packet).unwrap();
//! assert!(source.is_sealed());
//! ```

mod accessor;
mod dispatch;
mod dump;
mod remote;
mod schema;

pub use accessor::FieldAccessor;
pub use dispatch::Outcome;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::types::{
    ByteOrder, Data, DataArray, Field, FieldOptions, Kind, Packet, SourceKind, StaticField,
    push_unique,
};
use crate::{DataSourceError, Result};

use dispatch::Subscribers;
use schema::Schema;

/// A named stream of records sharing one runtime-defined schema.
#[derive(Debug)]
pub struct DataSource {
    name: String,
    kind: SourceKind,
    byte_order: ByteOrder,
    schema: RwLock<Schema>,
    subscribers: Subscribers,
    sealed: AtomicBool,
    lost: AtomicU64,
}

impl DataSource {
    /// Creates an empty source using the host byte order.
    pub fn new(name: impl Into<String>, kind: SourceKind) -> Self {
        Self::with_byte_order(name, kind, ByteOrder::native())
    }

    pub fn with_byte_order(name: impl Into<String>, kind: SourceKind, byte_order: ByteOrder) -> Self {
        Self::from_schema(name.into(), kind, byte_order, Schema::default())
    }

    fn from_schema(name: String, kind: SourceKind, byte_order: ByteOrder, schema: Schema) -> Self {
        debug!(source = %name, kind = %kind, ?byte_order, "Created data source");
        Self {
            name,
            kind,
            byte_order,
            schema: RwLock::new(schema),
            subscribers: Subscribers::default(),
            sealed: AtomicBool::new(false),
            lost: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Number of payload slots every record of this source carries.
    pub fn payload_count(&self) -> u32 {
        self.schema.read().payload_count()
    }

    pub fn field_count(&self) -> usize {
        self.schema.read().fields().len()
    }

    fn accessor(&self, field: Arc<Field>) -> FieldAccessor {
        FieldAccessor::new(field, self.byte_order)
    }

    fn ensure_unsealed(&self) -> Result<()> {
        if self.sealed.load(Ordering::Acquire) {
            return Err(DataSourceError::Sealed { source_name: self.name.clone() });
        }
        Ok(())
    }

    /// Adds a field with a dynamically sized payload slot of its own.
    ///
    /// Empty fields (see [`FieldOptions::empty`]) get no slot and serve as
    /// grouping parents.
    pub fn add_field(&self, name: &str, kind: Kind, options: FieldOptions) -> Result<FieldAccessor> {
        let mut schema = self.schema.write();
        self.ensure_unsealed()?;
        let field = schema.add_field(name, kind, options)?;
        Ok(self.accessor(field))
    }

    /// Adds a batch of fields sharing one fixed-size payload slot.
    ///
    /// The batch is validated as a whole: on any error nothing is added.
    /// The returned accessor covers the entire container slot.
    pub fn add_static_fields(&self, size: u32, fields: &[StaticField]) -> Result<FieldAccessor> {
        let mut schema = self.schema.write();
        self.ensure_unsealed()?;
        let container = schema.add_static_fields(size, fields)?;
        Ok(self.accessor(container))
    }

    /// Looks a field up by full name, then by short name.
    pub fn get_field(&self, name: &str) -> Option<FieldAccessor> {
        let field = self.schema.read().get(name).cloned();
        field.map(|f| self.accessor(f))
    }

    /// Returns the fields carrying any of `tags`, in registration order.
    pub fn get_fields_with_tag(&self, tags: &[&str]) -> Vec<FieldAccessor> {
        let matching: Vec<_> = self
            .schema
            .read()
            .fields()
            .iter()
            .filter(|f| tags.iter().any(|t| f.has_tag(t)))
            .cloned()
            .collect();
        matching.into_iter().map(|f| self.accessor(f)).collect()
    }

    /// Snapshot of every field definition.
    pub fn fields(&self) -> Vec<Field> {
        self.schema.read().fields().iter().map(|f| (**f).clone()).collect()
    }

    /// Accessors for every field, or only root fields when `root_only` is set.
    pub fn accessors(&self, root_only: bool) -> Vec<FieldAccessor> {
        let fields: Vec<_> = self
            .schema
            .read()
            .fields()
            .iter()
            .filter(|f| !root_only || !f.has_parent())
            .cloned()
            .collect();
        fields.into_iter().map(|f| self.accessor(f)).collect()
    }

    pub fn tags(&self) -> Vec<String> {
        self.schema.read().tags.clone()
    }

    pub fn add_tag(&self, tag: impl Into<String>) {
        push_unique(&mut self.schema.write().tags, tag.into());
    }

    pub fn annotations(&self) -> BTreeMap<String, String> {
        self.schema.read().annotations.clone()
    }

    pub fn add_annotation(&self, key: impl Into<String>, value: impl Into<String>) {
        self.schema.write().annotations.insert(key.into(), value.into());
    }

    /// Freezes the schema. Idempotent; `emit_and_release` calls it.
    pub fn seal(&self) {
        if self.sealed.load(Ordering::Acquire) {
            return;
        }
        // Serializes with in-flight add_field calls.
        let schema = self.schema.write();
        if !self.sealed.swap(true, Ordering::AcqRel) {
            debug!(
                source = %self.name,
                fields = schema.fields().len(),
                payload_count = schema.payload_count(),
                "Sealed data source schema"
            );
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Allocates a record with every slot sized for the current schema.
    pub fn new_data(&self) -> Data {
        self.schema.read().new_data()
    }

    pub fn new_packet_single(&self) -> Result<Packet> {
        if self.kind != SourceKind::Single {
            return Err(DataSourceError::CardinalityMismatch {
                expected: SourceKind::Single,
                operation: "create single packets",
            });
        }
        Ok(Packet::Single(self.new_data()))
    }

    pub fn new_packet_array(&self) -> Result<Packet> {
        if self.kind != SourceKind::Array {
            return Err(DataSourceError::CardinalityMismatch {
                expected: SourceKind::Array,
                operation: "create array packets",
            });
        }
        Ok(Packet::Array(DataArray::new()))
    }

    /// Rehydrates a serialized single-record packet, checking its shape.
    pub fn new_packet_single_from_raw(&self, bytes: &[u8]) -> Result<Packet> {
        if self.kind != SourceKind::Single {
            return Err(DataSourceError::CardinalityMismatch {
                expected: SourceKind::Single,
                operation: "decode single packets",
            });
        }
        let data = crate::wire::decode_data(bytes)?;
        self.check_record(&data)?;
        Ok(Packet::Single(data))
    }

    /// Rehydrates a serialized array packet, checking every record's shape.
    pub fn new_packet_array_from_raw(&self, bytes: &[u8]) -> Result<Packet> {
        if self.kind != SourceKind::Array {
            return Err(DataSourceError::CardinalityMismatch {
                expected: SourceKind::Array,
                operation: "decode array packets",
            });
        }
        let array = crate::wire::decode_data_array(bytes)?;
        for data in &array {
            self.check_record(data)?;
        }
        Ok(Packet::Array(array))
    }

    fn check_record(&self, data: &Data) -> Result<()> {
        self.schema.read().validate_data(data).inspect_err(|e| {
            warn!(source = %self.name, error = %e, "Rejected record with mismatched payload");
        })
    }

    /// Returns a packet to the source once a consumer is done with it.
    pub fn release(&self, packet: Packet) {
        trace!(source = %self.name, seq = packet.seq(), records = packet.len(), "Released packet");
        drop(packet);
    }

    /// Records that `count` events were dropped before reaching this source.
    pub fn report_lost_data(&self, count: u64) {
        let total = self.lost.fetch_add(count, Ordering::Relaxed).saturating_add(count);
        warn!(source = %self.name, count, total, "Lost data");
    }

    /// Total number of events reported lost so far.
    pub fn lost_data(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }
}
