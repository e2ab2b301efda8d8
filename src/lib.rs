//! Runtime-defined binary event schemas with priority-ordered dispatch.
//!
//! fieldstream moves records whose shape is only known at runtime between
//! the stages of a telemetry pipeline. Producers and enrichers cooperatively
//! build a [`DataSource`] schema during setup; records are then filled through
//! bounded [`FieldAccessor`]s and pushed through three priority-ordered
//! subscriber chains.
//!
//! # Features
//!
//! - **Cooperative schemas**: dynamic fields, nested fields and fixed-layout
//!   static containers, all validated atomically
//! - **Safe access**: every read and write is bounded by the field's slot,
//!   offset and size, in an explicit byte order
//! - **Filtering dispatch**: per-record, per-array and per-packet subscribers
//!   that can continue, discard or fail
//! - **Remote schemas**: protobuf descriptors rebuild an identical layout in
//!   another process
//!
//! # Quick Start
//!
//! ```rust
//! use fieldstream::{DataSource, FieldOptions, Kind, Outcome, Packet, SourceKind};
//!
//! # fn main() -> fieldstream::Result<()> {
//! let source = DataSource::new("events", SourceKind::Array);
//! let pid = source.add_field("pid", Kind::Uint32, FieldOptions::new())?;
//!
//! let filter = pid.clone();
//! source.subscribe(move |_, data| match filter.get::<u32>(data) {
//!     Ok(0) => Outcome::Discard,
//!     _ => Outcome::Continue,
//! }, 10)?;
//! source.subscribe_packet(|_, packet| {
//!     assert_eq!(packet.len(), 2);
//!     Outcome::Continue
//! }, 0)?;
//!
//! let mut packet = source.new_packet_array()?;
//! if let Packet::Array(array) = &mut packet {
//!     for value in [7u32, 0, 9] {
//!         let mut data = source.new_data();
//!         pid.set(&mut data, value)?;
//!         array.push(data);
//!     }
//! }
//! source.emit_and_release(packet)?;
//! # Ok(())
//! # }
//! ```

mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

mod source;
pub mod wire;

// Configuration and async edges
pub mod config;
pub mod driver;
pub mod forward;
pub mod provider;

pub use error::*;
pub use source::{DataSource, FieldAccessor, Outcome};
pub use types::*;

pub use config::{DataSourceConfig, DriverConfig};
pub use driver::{Driver, DriverHandle, DriverStats, StopReason};
pub use forward::{ForwardedPacket, PacketForwarder};
pub use provider::{PacketProvider, RawPacketProvider};
