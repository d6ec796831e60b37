//! # Backlog Processor
//!
//! Background task that replays the backlog on an interval or on demand.
//!
//! ## Processing Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Backlog Processor Loop                              │
//! │                                                                         │
//! │  ┌──────────────┐                                                       │
//! │  │ interval tick│──┐                                                    │
//! │  └──────────────┘  │     ┌──────────────────────────┐                  │
//! │                    ├────►│ engine.sync_backlog()    │                  │
//! │  ┌──────────────┐  │     │  load_unsynced           │                  │
//! │  │ sync_now()   │──┘     │  upload each             │                  │
//! │  └──────────────┘        │  mark_synced confirmed   │                  │
//! │                          └──────────────────────────┘                  │
//! │  ┌──────────────┐                                                       │
//! │  │ shutdown()   │──────► loop exits                                     │
//! │  └──────────────┘                                                       │
//! │                                                                         │
//! │  TIMING:                                                               │
//! │  • Interval: 300 seconds (configurable)                                │
//! │  • Missed ticks are delayed, never bunched                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::engine::{BacklogReport, RemoteSyncEngine};
use crate::error::{SyncError, SyncResult};

/// Periodically replays the backlog through a [`RemoteSyncEngine`].
pub struct BacklogProcessor {
    engine: Arc<RemoteSyncEngine>,
    interval: Duration,
    trigger_rx: mpsc::Receiver<oneshot::Sender<SyncResult<BacklogReport>>>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for controlling the backlog processor.
#[derive(Clone)]
pub struct BacklogProcessorHandle {
    trigger_tx: mpsc::Sender<oneshot::Sender<SyncResult<BacklogReport>>>,
    shutdown_tx: mpsc::Sender<()>,
}

impl BacklogProcessorHandle {
    /// Runs a pass now and waits for its report.
    pub async fn sync_now(&self) -> SyncResult<BacklogReport> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.trigger_tx
            .send(reply_tx)
            .await
            .map_err(|_| SyncError::ShuttingDown)?;
        reply_rx.await.map_err(|_| SyncError::ShuttingDown)?
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ShuttingDown)
    }
}

impl BacklogProcessor {
    /// Creates a new processor and returns a handle.
    pub fn new(engine: Arc<RemoteSyncEngine>, interval: Duration) -> (Self, BacklogProcessorHandle) {
        let (trigger_tx, trigger_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let processor = BacklogProcessor {
            engine,
            interval,
            trigger_rx,
            shutdown_rx,
        };

        let handle = BacklogProcessorHandle {
            trigger_tx,
            shutdown_tx,
        };

        (processor, handle)
    }

    /// Runs the processor loop.
    ///
    /// This should be spawned as a background task. The first tick fires
    /// immediately so a backlog left by the previous run is replayed on
    /// startup.
    pub async fn run(mut self) {
        info!(interval_secs = self.interval.as_secs(), "Backlog processor starting");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.engine.sync_backlog().await {
                        error!(?e, "Backlog pass failed");
                    }
                }

                Some(reply) = self.trigger_rx.recv() => {
                    debug!("Manual backlog pass requested");
                    let result = self.engine.sync_backlog().await;
                    if let Err(ref e) = result {
                        error!(?e, "Manual backlog pass failed");
                    }
                    let _ = reply.send(result);
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Backlog processor shutting down");
                    break;
                }
            }
        }

        info!("Backlog processor stopped");
    }
}

// =============================================================================
// Tests
// =============================================================================
