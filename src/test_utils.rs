//! Shared builders for tests and benchmarks
//!
//! Most tests need the same small process-event schema; these helpers build
//! it and fill batches for it so each test only states what it checks.

#![cfg(any(test, feature = "benchmark"))]

use std::collections::VecDeque;

use crate::provider::PacketProvider;
use crate::types::{FieldOptions, Kind, Packet, SourceKind};
use crate::{DataSource, FieldAccessor, Result};

/// Accessors of the `events` schema.
#[derive(Debug, Clone)]
pub struct EventFields {
    pub pid: FieldAccessor,
    pub comm: FieldAccessor,
}

/// Array source `events` with `pid: uint32` and `comm: cstring`.
pub fn events_source() -> (DataSource, EventFields) {
    let source = DataSource::new("events", SourceKind::Array);
    let pid = source
        .add_field("pid", Kind::Uint32, FieldOptions::new().tag("process"))
        .expect("pid field");
    let comm = source
        .add_field("comm", Kind::CString, FieldOptions::new().tag("process"))
        .expect("comm field");
    (source, EventFields { pid, comm })
}

/// Builds an array packet with one record per `(pid, comm)` pair.
pub fn events_batch(
    source: &DataSource,
    fields: &EventFields,
    records: &[(u32, &str)],
    seq: u32,
) -> Packet {
    let mut packet = source.new_packet_array().expect("array source");
    if let Some(array) = packet.as_array_mut() {
        for &(pid, comm) in records {
            let mut data = source.new_data();
            fields.pid.set(&mut data, pid).expect("set pid");
            fields.comm.set(&mut data, comm.to_string()).expect("set comm");
            array.push(data);
        }
    }
    packet.set_seq(seq);
    packet
}

/// Provider replaying a fixed script of results, then ending the stream.
pub struct ScriptedProvider {
    script: VecDeque<Result<Option<Packet>>>,
    hang_when_done: bool,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<Option<Packet>>>) -> Self {
        Self { script: script.into(), hang_when_done: false }
    }

    /// A provider that never yields.
    pub fn pending() -> Self {
        Self { script: VecDeque::new(), hang_when_done: true }
    }
}

#[async_trait::async_trait]
impl PacketProvider for ScriptedProvider {
    async fn next_packet(&mut self, _source: &DataSource) -> Result<Option<Packet>> {
        match self.script.pop_front() {
            Some(next) => next,
            None if self.hang_when_done => std::future::pending().await,
            None => Ok(None),
        }
    }
}
