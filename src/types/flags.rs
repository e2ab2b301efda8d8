//! Field flag bitset

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Structural and presentation flags of a field.
    ///
    /// Bit values are part of the wire descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct FieldFlags: u32 {
        /// Field carries no payload of its own
        const EMPTY = 1 << 0;
        /// Field is the synthetic handle for a static container
        const CONTAINER = 1 << 1;
        /// Field should not be shown by default
        const HIDDEN = 1 << 2;
        /// `parent` is meaningful
        const HAS_PARENT = 1 << 3;
        /// Field lives at an offset inside a static container slot
        const STATIC_MEMBER = 1 << 4;
        /// Field is a parent inside a static batch and is not addressed directly
        const UNREFERENCED = 1 << 5;
    }
}

impl FieldFlags {
    /// Flags the registry assigns itself; callers may not pass them in.
    pub const STRUCTURAL: FieldFlags = FieldFlags::CONTAINER
        .union(FieldFlags::HAS_PARENT)
        .union(FieldFlags::STATIC_MEMBER)
        .union(FieldFlags::UNREFERENCED);

    /// Returns true if the field owns a payload slot of its own.
    pub fn owns_payload(&self) -> bool {
        !self.intersects(FieldFlags::EMPTY | FieldFlags::STATIC_MEMBER | FieldFlags::CONTAINER)
    }
}
