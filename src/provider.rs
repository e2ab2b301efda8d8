//! Packet providers feeding the driver loop

use tokio::sync::mpsc;
use tracing::trace;

use crate::types::{Packet, SourceKind};
use crate::{DataSource, DataSourceError, Result};

/// Source of packets for a [`Driver`](crate::Driver).
///
/// Providers handle their own pacing; the driver simply awaits the next
/// packet and emits it.
#[async_trait::async_trait]
pub trait PacketProvider: Send + 'static {
    /// Produces the next packet for `source`.
    ///
    /// Returns:
    /// - `Ok(Some(packet))` - a packet ready to emit
    /// - `Ok(None)` - the stream ended (normal termination)
    /// - `Err(e)` - a failure; the driver backs off and retries
    async fn next_packet(&mut self, source: &DataSource) -> Result<Option<Packet>>;
}

/// Provider fed with serialized packets, for clients consuming a remote
/// producer's stream.
///
/// Every packet is rehydrated with the raw constructors and so checked
/// against the local schema before it is handed out.
#[derive(Debug)]
pub struct RawPacketProvider {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl RawPacketProvider {
    pub fn new(rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self { rx }
    }

    /// Creates a provider and the sender feeding it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(rx))
    }
}

#[async_trait::async_trait]
impl PacketProvider for RawPacketProvider {
    async fn next_packet(&mut self, source: &DataSource) -> Result<Option<Packet>> {
        let Some(bytes) = self.rx.recv().await else {
            trace!(source = %source.name(), "Raw packet channel closed");
            return Ok(None);
        };

        let packet = match source.kind() {
            SourceKind::Single => source.new_packet_single_from_raw(&bytes),
            SourceKind::Array => source.new_packet_array_from_raw(&bytes),
        };

        packet.map(Some).map_err(|e| {
            DataSourceError::provider_with_source(
                format!("rejected {} byte packet", bytes.len()),
                Box::new(e),
            )
        })
    }
}
