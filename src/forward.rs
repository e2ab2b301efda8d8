//! Buffered hand-off from synchronous dispatch to async consumers
//!
//! Dispatch runs subscribers inline on the producer's thread, so a
//! transport must never block inside its callback. [`PacketForwarder`]
//! marshals each packet and pushes it into a bounded channel without
//! waiting; when the channel is full the packet is dropped and counted as
//! lost on the source.

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, trace, warn};

use crate::error::DataSourceError;
use crate::{DataSource, Outcome, Result};

/// A packet serialized for transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedPacket {
    pub seq: u32,
    /// Records carried (after any discards)
    pub records: usize,
    /// Wire encoding of the packet
    pub bytes: Vec<u8>,
}

pub struct PacketForwarder;

impl PacketForwarder {
    /// Runs after ordinary packet subscribers.
    pub const DEFAULT_PRIORITY: i32 = 1_000_000;

    /// Subscribes a forwarder to `source` and returns the stream of
    /// forwarded packets. Dropping the stream stops forwarding silently.
    pub fn attach(
        source: &DataSource,
        capacity: usize,
        priority: i32,
    ) -> Result<ReceiverStream<ForwardedPacket>> {
        if capacity == 0 {
            return Err(DataSourceError::Config {
                context: "packet forwarder".to_string(),
                details: "capacity must be at least 1".to_string(),
            });
        }

        let (tx, rx) = mpsc::channel(capacity);
        source.subscribe_packet(
            move |src, packet| {
                let forwarded = ForwardedPacket {
                    seq: packet.seq(),
                    records: packet.len(),
                    bytes: packet.marshal(),
                };
                match tx.try_send(forwarded) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(dropped)) => {
                        warn!(source = %src.name(), seq = dropped.seq, "Forward buffer full, dropping packet");
                        src.report_lost_data(dropped.records as u64);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        trace!(source = %src.name(), "Forward receiver gone");
                    }
                }
                Outcome::Continue
            },
            priority,
        )?;

        debug!(source = %source.name(), capacity, priority, "Attached packet forwarder");
        Ok(ReceiverStream::new(rx))
    }
}
