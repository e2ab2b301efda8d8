//! Structural state of a data source: the field arena and its indices
//!
//! Every mutation here validates completely before touching `self`, so a
//! failed call leaves the schema exactly as it was.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::types::{Data, Field, FieldFlags, FieldOptions, Kind, StaticField, push_unique};
use crate::{DataSourceError, Result};

#[derive(Debug, Clone, Default)]
pub(crate) struct Schema {
    fields: Vec<Arc<Field>>,
    names: HashMap<String, usize>,
    full_names: HashMap<String, usize>,
    pub(crate) tags: Vec<String>,
    pub(crate) annotations: BTreeMap<String, String>,
    payload_count: u32,
    /// Payload index of each static container and the byte size of its slot
    containers: BTreeMap<u32, u32>,
}

impl Schema {
    pub(crate) fn fields(&self) -> &[Arc<Field>] {
        &self.fields
    }

    pub(crate) fn payload_count(&self) -> u32 {
        self.payload_count
    }

    #[cfg(test)]
    pub(crate) fn container_size(&self, payload_index: u32) -> Option<u32> {
        self.containers.get(&payload_index).copied()
    }

    /// Looks a field up by full name, falling back to its short name.
    pub(crate) fn get(&self, name: &str) -> Option<&Arc<Field>> {
        self.full_names
            .get(name)
            .or_else(|| self.names.get(name))
            .and_then(|&index| self.fields.get(index))
    }

    fn check_unique(&self, name: &str, full_name: &str) -> Result<()> {
        if self.names.contains_key(name) || self.full_names.contains_key(name) {
            return Err(DataSourceError::duplicate_field(name));
        }
        if self.full_names.contains_key(full_name) || self.names.contains_key(full_name) {
            return Err(DataSourceError::duplicate_field(full_name));
        }
        Ok(())
    }

    pub(crate) fn add_field(
        &mut self,
        name: &str,
        kind: Kind,
        options: FieldOptions,
    ) -> Result<Arc<Field>> {
        validate_name(name)?;

        if options.flags.intersects(FieldFlags::STRUCTURAL) {
            return Err(DataSourceError::schema(format!(
                "field {name:?} requests structural flags {:?}",
                options.flags & FieldFlags::STRUCTURAL
            )));
        }

        let empty = options.flags.contains(FieldFlags::EMPTY);
        if kind == Kind::Invalid && !empty {
            return Err(DataSourceError::schema(format!(
                "field {name:?} has no kind but is not marked empty"
            )));
        }

        let mut flags = options.flags;
        let full_name = match options.parent {
            Some(parent_index) => {
                let parent = self.fields.get(parent_index as usize).ok_or_else(|| {
                    DataSourceError::InvalidParent {
                        field: name.to_string(),
                        reason: format!("no field with index {parent_index}"),
                    }
                })?;
                flags |= FieldFlags::HAS_PARENT;
                format!("{}.{}", parent.full_name, name)
            }
            None => name.to_string(),
        };

        self.check_unique(name, &full_name)?;

        let payload_index = if empty {
            0
        } else {
            let index = self.payload_count;
            self.payload_count += 1;
            index
        };

        let field = Arc::new(Field {
            index: self.fields.len() as u32,
            name: name.to_string(),
            full_name,
            kind,
            size: kind.size().map(|s| s as u32).unwrap_or(0),
            offs: 0,
            payload_index,
            parent: options.parent,
            flags,
            tags: options.tags,
            annotations: options.annotations,
        });

        debug!(
            name = %field.full_name,
            kind = %kind,
            payload_index = field.payload_index,
            empty,
            "Added field"
        );

        self.insert(Arc::clone(&field));
        Ok(field)
    }

    pub(crate) fn add_static_fields(
        &mut self,
        container_size: u32,
        specs: &[StaticField],
    ) -> Result<Arc<Field>> {
        if specs.is_empty() {
            return Err(DataSourceError::schema("static container needs at least one member"));
        }

        let base = self.fields.len();
        let payload_index = self.payload_count;

        let mut batch: Vec<Field> = Vec::with_capacity(specs.len());
        let mut batch_names = HashSet::with_capacity(specs.len());

        for (i, spec) in specs.iter().enumerate() {
            validate_name(&spec.name)?;

            if self.names.contains_key(&spec.name)
                || self.full_names.contains_key(&spec.name)
                || !batch_names.insert(spec.name.as_str())
            {
                return Err(DataSourceError::duplicate_field(&spec.name));
            }

            let size = spec.effective_size();
            if let Some(width) = spec.kind.size() {
                if width as u32 > size {
                    return Err(DataSourceError::schema(format!(
                        "field {:?} of kind {} needs {} bytes, declared size is {}",
                        spec.name, spec.kind, width, size
                    )));
                }
            } else if spec.kind.is_text() && size == 0 {
                return Err(DataSourceError::schema(format!(
                    "text field {:?} in a static container needs a size",
                    spec.name
                )));
            }

            if u64::from(spec.offs) + u64::from(size) > u64::from(container_size) {
                return Err(DataSourceError::ContainerOverflow {
                    field: spec.name.clone(),
                    offs: spec.offs,
                    size,
                    container_size,
                });
            }

            let mut flags = FieldFlags::STATIC_MEMBER;
            if spec.hidden {
                flags |= FieldFlags::HIDDEN;
            }

            let parent = match spec.parent {
                Some(p) if p >= specs.len() || p == i => {
                    return Err(DataSourceError::InvalidParent {
                        field: spec.name.clone(),
                        reason: format!("index {p} is not another member of this batch"),
                    });
                }
                Some(p) => {
                    flags |= FieldFlags::HAS_PARENT;
                    Some((base + p) as u32)
                }
                None => None,
            };

            let mut tags = Vec::with_capacity(spec.tags.len());
            for tag in &spec.tags {
                push_unique(&mut tags, tag.clone());
            }

            batch.push(Field {
                index: (base + i) as u32,
                name: spec.name.clone(),
                full_name: String::new(),
                kind: spec.kind,
                size,
                offs: spec.offs,
                payload_index,
                parent,
                flags,
                tags,
                annotations: spec.annotations.clone(),
            });
        }

        for spec in specs {
            if let Some(p) = spec.parent {
                batch[p].flags |= FieldFlags::UNREFERENCED;
            }
        }

        let full_names = resolve_full_names(&batch, base)?;
        for (field, full_name) in batch.iter_mut().zip(full_names) {
            if field.has_parent() {
                self.check_unique(&field.name, &full_name)?;
            }
            field.full_name = full_name;
        }

        // Validation complete; commit.
        for field in batch {
            self.insert(Arc::new(field));
        }
        self.containers.insert(payload_index, container_size);
        self.payload_count += 1;

        debug!(
            members = specs.len(),
            container_size, payload_index, "Added static container"
        );

        Ok(Arc::new(Field {
            index: Field::UNREGISTERED,
            name: String::new(),
            full_name: String::new(),
            kind: Kind::Invalid,
            size: container_size,
            offs: 0,
            payload_index,
            parent: None,
            flags: FieldFlags::CONTAINER,
            tags: Vec::new(),
            annotations: BTreeMap::new(),
        }))
    }

    fn insert(&mut self, field: Arc<Field>) {
        let index = self.fields.len();
        self.names.insert(field.name.clone(), index);
        self.full_names.insert(field.full_name.clone(), index);
        self.fields.push(field);
    }

    /// Rebuilds a schema from a field list produced by another registry.
    ///
    /// Offsets and payload indices are taken as given; only their
    /// consistency is checked. Every slot must have exactly one owner and
    /// every full name must follow from the parent chain.
    pub(crate) fn from_fields(fields: Vec<Field>) -> Result<Self> {
        let mut schema = Schema::default();
        let count = fields.len();

        for (position, field) in fields.iter().enumerate() {
            if field.index as usize != position {
                return Err(DataSourceError::UnknownField { id: field.index });
            }
            if let Some(parent) = field.parent {
                if parent as usize >= count || parent as usize == position {
                    return Err(DataSourceError::InvalidParent {
                        field: field.name.clone(),
                        reason: format!("no field with index {parent}"),
                    });
                }
            }
            validate_name(&field.name)?;
            if field.is_container() {
                return Err(DataSourceError::schema(format!(
                    "field {:?} is a container handle, not a field",
                    field.name
                )));
            }
        }

        let mut owners: BTreeMap<u32, SlotOwner> = BTreeMap::new();
        for field in fields.iter().filter(|f| !f.is_empty()) {
            let claim = if field.is_static_member() {
                SlotOwner::Container
            } else {
                SlotOwner::Field(field.index)
            };
            match owners.entry(field.payload_index) {
                Entry::Vacant(slot) => {
                    slot.insert(claim);
                }
                Entry::Occupied(slot)
                    if *slot.get() == SlotOwner::Container && claim == SlotOwner::Container => {}
                Entry::Occupied(slot) => {
                    let owner = match *slot.get() {
                        SlotOwner::Field(index) => format!("field {:?}", fields[index as usize].name),
                        SlotOwner::Container => "a static container".to_string(),
                    };
                    return Err(DataSourceError::schema(format!(
                        "field {:?} claims payload slot {}, already owned by {}",
                        field.name,
                        slot.key(),
                        owner
                    )));
                }
            }
        }
        // Payload slots must be dense: every index below the count is used.
        if let Some(&max) = owners.keys().next_back() {
            if owners.len() as u64 != u64::from(max) + 1 {
                return Err(DataSourceError::schema("payload indices are not dense"));
            }
            schema.payload_count = max + 1;
        }

        let paths = resolve_full_names(&fields, 0)?;
        for (field, path) in fields.iter().zip(&paths) {
            if field.full_name != *path {
                return Err(DataSourceError::InvalidParent {
                    field: field.name.clone(),
                    reason: format!(
                        "full name {:?} does not match parent path {:?}",
                        field.full_name, path
                    ),
                });
            }
        }

        for field in fields {
            if !field.is_empty() && field.is_static_member() {
                let end = u32::try_from(field.extent()).map_err(|_| {
                    DataSourceError::schema(format!("field {:?} extends past 4 GiB", field.name))
                })?;
                let size = schema.containers.entry(field.payload_index).or_insert(0);
                *size = (*size).max(end);
            } else if field.owns_payload() && field.kind == Kind::Invalid {
                return Err(DataSourceError::schema(format!(
                    "field {:?} owns a payload slot but has no kind",
                    field.name
                )));
            }

            if schema.names.contains_key(&field.name) {
                return Err(DataSourceError::duplicate_field(&field.name));
            }
            if schema.full_names.contains_key(&field.full_name) {
                return Err(DataSourceError::duplicate_field(&field.full_name));
            }
            schema.insert(Arc::new(field));
        }

        Ok(schema)
    }

    /// Allocates a record shaped for this schema.
    pub(crate) fn new_data(&self) -> Data {
        let mut payload = vec![Vec::new(); self.payload_count as usize];

        for field in self.fields.iter().filter(|f| f.owns_payload()) {
            if let (Some(width), Some(slot)) =
                (field.kind.size(), payload.get_mut(field.payload_index as usize))
            {
                *slot = vec![0; width];
            }
        }

        for (&index, &size) in &self.containers {
            if let Some(slot) = payload.get_mut(index as usize) {
                *slot = vec![0; size as usize];
            }
        }

        Data::from_payload(payload)
    }

    /// Checks that a record (typically deserialized) matches this schema's shape.
    pub(crate) fn validate_data(&self, data: &Data) -> Result<()> {
        if data.slot_count() != self.payload_count as usize {
            return Err(DataSourceError::payload_mismatch(format!(
                "record has {} payload slots, schema has {}",
                data.slot_count(),
                self.payload_count
            )));
        }

        for field in self.fields.iter().filter(|f| f.owns_payload()) {
            let Some(width) = field.kind.size() else { continue };
            let len = data.slot(field.payload_index).map_or(0, <[u8]>::len);
            if len != width {
                return Err(DataSourceError::payload_mismatch(format!(
                    "field {:?} needs {} bytes, slot {} holds {}",
                    field.full_name, width, field.payload_index, len
                )));
            }
        }

        for (&index, &size) in &self.containers {
            let len = data.slot(index).map_or(0, <[u8]>::len);
            if len < size as usize {
                return Err(DataSourceError::payload_mismatch(format!(
                    "container slot {index} needs {size} bytes, holds {len}"
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotOwner {
    Field(u32),
    Container,
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(DataSourceError::schema("field name must not be empty"));
    }
    if name.contains('.') {
        return Err(DataSourceError::schema(format!(
            "field name {name:?} must not contain '.', it separates path components"
        )));
    }
    Ok(())
}

/// Resolves the dotted full name of every member of a batch by walking
/// parent links. Parents are absolute indices; `base` is the index of the
/// first batch member.
fn resolve_full_names(batch: &[Field], base: usize) -> Result<Vec<String>> {
    let mut out = Vec::with_capacity(batch.len());

    for field in batch {
        let mut path = vec![field.name.as_str()];
        let mut current = field;
        let mut hops = 0;

        while let Some(parent) = current.parent {
            hops += 1;
            if hops > batch.len() {
                return Err(DataSourceError::InvalidParent {
                    field: field.name.clone(),
                    reason: "parent chain forms a cycle".to_string(),
                });
            }
            current = (parent as usize)
                .checked_sub(base)
                .and_then(|local| batch.get(local))
                .ok_or_else(|| DataSourceError::InvalidParent {
                    field: field.name.clone(),
                    reason: format!("parent {parent} not found"),
                })?;
            path.push(current.name.as_str());
        }

        path.reverse();
        out.push(path.join("."));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members() -> Vec<StaticField> {
        vec![
            StaticField::new("pid", Kind::Uint32, 0),
            StaticField::new("comm", Kind::CString, 4).with_size(16),
        ]
    }

    #[test]
    fn add_field_assigns_dense_payload_indices() {
        let mut schema = Schema::default();
        let a = schema.add_field("a", Kind::Uint32, FieldOptions::new()).unwrap();
        let group = schema.add_field("group", Kind::Invalid, FieldOptions::new().empty()).unwrap();
        let b = schema.add_field("b", Kind::String, FieldOptions::new()).unwrap();

        assert_eq!(a.payload_index, 0);
        assert!(group.is_empty());
        assert_eq!(b.payload_index, 1);
        assert_eq!(schema.payload_count(), 2);
    }

    #[test]
    fn add_field_rejects_structural_flags_and_kindless_payloads() {
        let mut schema = Schema::default();
        let err = schema
            .add_field("x", Kind::Uint8, FieldOptions::new().flags(FieldFlags::STATIC_MEMBER))
            .unwrap_err();
        assert!(matches!(err, DataSourceError::Schema { .. }));

        let err = schema.add_field("y", Kind::Invalid, FieldOptions::new()).unwrap_err();
        assert!(matches!(err, DataSourceError::Schema { .. }));
        assert!(schema.fields().is_empty());
    }

    #[test]
    fn static_batch_commits_atomically() {
        let mut schema = Schema::default();
        schema.add_field("existing", Kind::Uint8, FieldOptions::new()).unwrap();

        let mut specs = members();
        specs.push(StaticField::new("existing", Kind::Uint8, 20));
        let err = schema.add_static_fields(24, &specs).unwrap_err();
        assert!(matches!(err, DataSourceError::DuplicateField { .. }));

        assert_eq!(schema.fields().len(), 1);
        assert_eq!(schema.payload_count(), 1);
        assert!(schema.get("pid").is_none());
        assert!(schema.container_size(1).is_none());
    }

    #[test]
    fn static_batch_rejects_duplicates_inside_the_batch() {
        let mut schema = Schema::default();
        let specs = vec![
            StaticField::new("x", Kind::Uint8, 0),
            StaticField::new("x", Kind::Uint8, 1),
        ];
        let err = schema.add_static_fields(2, &specs).unwrap_err();
        assert!(matches!(err, DataSourceError::DuplicateField { .. }));
    }

    #[test]
    fn static_batch_detects_parent_cycles() {
        let mut schema = Schema::default();
        let specs = vec![
            StaticField::new("a", Kind::Uint8, 0).with_parent(1),
            StaticField::new("b", Kind::Uint8, 1).with_parent(0),
        ];
        let err = schema.add_static_fields(2, &specs).unwrap_err();
        assert!(matches!(err, DataSourceError::InvalidParent { .. }));
        assert!(schema.fields().is_empty());
    }

    #[test]
    fn static_batch_rejects_kind_wider_than_size() {
        let mut schema = Schema::default();
        let specs = vec![StaticField::new("wide", Kind::Uint64, 0).with_size(4)];
        let err = schema.add_static_fields(8, &specs).unwrap_err();
        assert!(matches!(err, DataSourceError::Schema { .. }));
    }

    #[test]
    fn nested_members_get_dotted_names_and_parents_are_unreferenced() {
        let mut schema = Schema::default();
        schema.add_field("first", Kind::Uint8, FieldOptions::new()).unwrap();

        let specs = vec![
            StaticField::new("task", Kind::Invalid, 0).with_size(20),
            StaticField::new("pid", Kind::Uint32, 0).with_parent(0),
            StaticField::new("comm", Kind::CString, 4).with_size(16).with_parent(0),
        ];
        let container = schema.add_static_fields(20, &specs).unwrap();
        assert!(container.is_container());
        assert_eq!(container.payload_index, 1);

        let task = schema.get("task").unwrap();
        assert!(task.flags.contains(FieldFlags::UNREFERENCED));
        assert_eq!(task.index, 1);

        let pid = schema.get("task.pid").unwrap();
        assert_eq!(pid.full_name, "task.pid");
        assert_eq!(pid.parent, Some(1));
        assert!(pid.has_parent());
        assert!(Arc::ptr_eq(pid, schema.get("pid").unwrap()));
    }

    #[test]
    fn new_data_sizes_slots_from_schema() {
        let mut schema = Schema::default();
        schema.add_field("flag", Kind::Bool, FieldOptions::new()).unwrap();
        schema.add_field("name", Kind::String, FieldOptions::new()).unwrap();
        schema.add_static_fields(20, &members()).unwrap();

        let data = schema.new_data();
        assert_eq!(data.slot_count(), 3);
        assert_eq!(data.slot(0).map(<[u8]>::len), Some(1));
        assert_eq!(data.slot(1).map(<[u8]>::len), Some(0));
        assert_eq!(data.slot(2).map(<[u8]>::len), Some(20));
        assert!(schema.validate_data(&data).is_ok());
    }

    #[test]
    fn validate_data_rejects_diverging_shapes() {
        let mut schema = Schema::default();
        schema.add_field("pid", Kind::Uint32, FieldOptions::new()).unwrap();
        schema.add_static_fields(20, &members_renamed()).unwrap();

        let short_slot = Data::from_payload(vec![vec![0; 3], vec![0; 20]]);
        assert!(matches!(
            schema.validate_data(&short_slot),
            Err(DataSourceError::PayloadMismatch { .. })
        ));

        let missing_slot = Data::from_payload(vec![vec![0; 4]]);
        assert!(schema.validate_data(&missing_slot).is_err());

        let short_container = Data::from_payload(vec![vec![0; 4], vec![0; 8]]);
        assert!(schema.validate_data(&short_container).is_err());
    }

    fn members_renamed() -> Vec<StaticField> {
        vec![
            StaticField::new("tid", Kind::Uint32, 0),
            StaticField::new("comm", Kind::CString, 4).with_size(16),
        ]
    }

    #[test]
    fn from_fields_recovers_container_extent() {
        let mut source = Schema::default();
        source.add_field("ts", Kind::Uint64, FieldOptions::new()).unwrap();
        source.add_static_fields(32, &members()).unwrap();

        let fields: Vec<Field> = source.fields().iter().map(|f| (**f).clone()).collect();
        let rebuilt = Schema::from_fields(fields).unwrap();

        assert_eq!(rebuilt.payload_count(), 2);
        // Declared size was 32, members only reach 20.
        assert_eq!(rebuilt.container_size(1), Some(20));
        assert_eq!(rebuilt.get("comm").map(|f| f.offs), Some(4));
    }

    #[test]
    fn from_fields_rejects_sparse_payload_indices() {
        let mut source = Schema::default();
        source.add_field("a", Kind::Uint8, FieldOptions::new()).unwrap();
        let mut fields: Vec<Field> = source.fields().iter().map(|f| (**f).clone()).collect();
        fields[0].payload_index = 3;
        assert!(Schema::from_fields(fields).is_err());
    }
}
