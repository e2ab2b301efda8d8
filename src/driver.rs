//! Driver spawns and manages the producer loop for one data source

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::DriverConfig;
use crate::provider::PacketProvider;
use crate::{DataSource, DataSourceError, Result};

/// Why the producer loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    /// The provider reported the end of its stream
    Exhausted,
    TooManyErrors,
}

/// Running counters published by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    /// Packets that completed a dispatch pass
    pub emitted: u64,
    /// Passes aborted by a failing subscriber
    pub subscriber_errors: u64,
    /// Total provider errors, consecutive or not
    pub provider_errors: u64,
    pub stopped: Option<StopReason>,
}

/// Handle to a running driver task.
pub struct DriverHandle {
    /// Receiver for progress updates
    pub stats: watch::Receiver<DriverStats>,
    /// Cancellation token for graceful shutdown
    pub cancel: CancellationToken,
    task: JoinHandle<DriverStats>,
}

impl DriverHandle {
    /// Requests the loop to stop after the current packet.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Waits for the loop to end and returns its final counters.
    pub async fn join(self) -> Result<DriverStats> {
        self.task
            .await
            .map_err(|e| DataSourceError::provider_with_source("driver task failed", Box::new(e)))
    }
}

/// Pulls packets from a provider and emits them on a data source.
///
/// Subscriber failures are logged and skipped: the failed packet is dropped
/// and the loop continues with the next one. Provider errors back off
/// exponentially; after `max_errors` consecutive failures the loop stops.
pub struct Driver;

impl Driver {
    pub fn spawn<P>(provider: P, source: Arc<DataSource>, config: DriverConfig) -> DriverHandle
    where
        P: PacketProvider,
    {
        let (stats_tx, stats_rx) = watch::channel(DriverStats::default());
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            Self::producer_task(provider, source, config, stats_tx, task_cancel).await
        });

        DriverHandle { stats: stats_rx, cancel, task }
    }

    async fn producer_task<P>(
        mut provider: P,
        source: Arc<DataSource>,
        config: DriverConfig,
        stats_tx: watch::Sender<DriverStats>,
        cancel: CancellationToken,
    ) -> DriverStats
    where
        P: PacketProvider,
    {
        info!(source = %source.name(), "Producer task started");
        let mut stats = DriverStats::default();
        let mut error_count = 0u32;

        let reason = loop {
            if cancel.is_cancelled() {
                break StopReason::Cancelled;
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(source = %source.name(), "Producer cancelled during read");
                    break StopReason::Cancelled;
                }
                result = provider.next_packet(&source) => result,
            };

            match result {
                Ok(Some(packet)) => {
                    error_count = 0;
                    let seq = packet.seq();
                    match source.emit_and_release(packet) {
                        Ok(()) => {
                            stats.emitted += 1;
                            trace!(source = %source.name(), seq, "Emitted packet");
                        }
                        Err(e) => {
                            stats.subscriber_errors += 1;
                            warn!(source = %source.name(), seq, error = %e, "Dispatch failed, skipping packet");
                        }
                    }
                    stats_tx.send_replace(stats);
                }
                Ok(None) => {
                    info!(source = %source.name(), emitted = stats.emitted, "Provider stream ended");
                    break StopReason::Exhausted;
                }
                Err(e) => {
                    error_count += 1;
                    stats.provider_errors += 1;
                    stats_tx.send_replace(stats);
                    error!(
                        source = %source.name(),
                        error = %e,
                        "Provider error ({}/{})",
                        error_count,
                        config.max_errors
                    );

                    if error_count >= config.max_errors {
                        error!(source = %source.name(), "Too many provider errors, shutting down");
                        break StopReason::TooManyErrors;
                    }

                    let backoff = config.backoff(error_count);
                    tokio::select! {
                        _ = cancel.cancelled() => break StopReason::Cancelled,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        };

        stats.stopped = Some(reason);
        stats_tx.send_replace(stats);
        info!(source = %source.name(), ?reason, emitted = stats.emitted, "Producer task ended");
        stats
    }
}
