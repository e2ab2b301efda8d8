//! Field definitions and the option types used to add them

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{FieldFlags, Kind};

/// One named, typed element of a record schema.
///
/// Fields live in a flat arena inside the registry; `parent` is an index into
/// that arena, never a pointer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Position in the registry's field list
    pub index: u32,
    /// Short name, unique within the registry
    pub name: String,
    /// Dotted path from the root ancestor, unique within the registry
    pub full_name: String,
    pub kind: Kind,
    /// Byte size inside a container slot (0 for dynamically sized fields)
    pub size: u32,
    /// Byte offset inside a container slot
    pub offs: u32,
    /// Record slot holding this field's bytes
    pub payload_index: u32,
    /// Index of the containing field, if any
    pub parent: Option<u32>,
    pub flags: FieldFlags,
    pub tags: Vec<String>,
    pub annotations: BTreeMap<String, String>,
}

impl Field {
    /// Index used by synthetic container handles that are not part of the field list.
    pub const UNREGISTERED: u32 = u32::MAX;

    pub fn has_parent(&self) -> bool {
        self.flags.contains(FieldFlags::HAS_PARENT)
    }

    pub fn is_static_member(&self) -> bool {
        self.flags.contains(FieldFlags::STATIC_MEMBER)
    }

    pub fn is_container(&self) -> bool {
        self.flags.contains(FieldFlags::CONTAINER)
    }

    pub fn is_empty(&self) -> bool {
        self.flags.contains(FieldFlags::EMPTY)
    }

    pub fn is_hidden(&self) -> bool {
        self.flags.contains(FieldFlags::HIDDEN)
    }

    /// Returns true if the field owns a payload slot of its own.
    pub fn owns_payload(&self) -> bool {
        self.flags.owns_payload()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// End offset of the field inside its slot.
    pub fn extent(&self) -> u64 {
        u64::from(self.offs) + u64::from(self.size)
    }
}

/// Options for [`DataSource::add_field`](crate::DataSource::add_field).
#[derive(Debug, Clone, Default)]
pub struct FieldOptions {
    pub(crate) flags: FieldFlags,
    pub(crate) tags: Vec<String>,
    pub(crate) annotations: BTreeMap<String, String>,
    pub(crate) parent: Option<u32>,
}

impl FieldOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds presentation flags. Structural flags are rejected by `add_field`.
    pub fn flags(mut self, flags: FieldFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn hidden(self) -> Self {
        self.flags(FieldFlags::HIDDEN)
    }

    /// Marks the field as carrying no payload (a grouping parent).
    pub fn empty(self) -> Self {
        self.flags(FieldFlags::EMPTY)
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        push_unique(&mut self.tags, tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            push_unique(&mut self.tags, tag.into());
        }
        self
    }

    pub fn annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Nests the new field below an already registered field.
    pub fn parent(mut self, parent: &crate::FieldAccessor) -> Self {
        self.parent = Some(parent.field().index);
        self
    }
}

/// Specification of one member of a static container.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticField {
    pub name: String,
    pub kind: Kind,
    pub offs: u32,
    /// Byte size; 0 means the width of `kind`
    pub size: u32,
    /// Index of the parent inside the same batch
    pub parent: Option<usize>,
    pub hidden: bool,
    pub tags: Vec<String>,
    pub annotations: BTreeMap<String, String>,
}

impl StaticField {
    pub fn new(name: impl Into<String>, kind: Kind, offs: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            offs,
            size: 0,
            parent: None,
            hidden: false,
            tags: Vec::new(),
            annotations: BTreeMap::new(),
        }
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    pub fn with_parent(mut self, parent: usize) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        push_unique(&mut self.tags, tag.into());
        self
    }

    pub fn annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Size the member occupies, defaulting to the kind width.
    pub fn effective_size(&self) -> u32 {
        if self.size > 0 {
            return self.size;
        }
        self.kind.size().map(|s| s as u32).unwrap_or(0)
    }
}

pub(crate) fn push_unique(tags: &mut Vec<String>, tag: String) {
    if !tags.contains(&tag) {
        tags.push(tag);
    }
}
