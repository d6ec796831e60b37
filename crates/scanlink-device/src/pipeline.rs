//! # Scan Ingest Pipeline
//!
//! The per-device read loop.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  loop every poll interval (10ms)                                        │
//! │    stop flag set? ──────────────────────────────► Stopped               │
//! │    FrameReader.poll()                                                   │
//! │      ├─ Err(Transient) ──► log, keep polling                            │
//! │      ├─ Err(Fatal) ─────────────────────────────► Failed(err)           │
//! │      └─ lines ──► ScanEvent ──► DedupFilter                             │
//! │                     New ............ count, record, emit                │
//! │                     DuplicateDaily . count, emit                        │
//! │                     DuplicateWindow  emit                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lines of one device are handled in arrival order; the backlog append
//! for a line completes before the next line is looked at.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::dedup::DedupFilter;
use crate::error::{ConnectionError, ErrorClass};
use crate::event::{EventSender, ManagerEvent, SharedStatus};
use crate::reader::FrameReader;
use crate::recorder::{RecordOutcome, ScanRecorder};
use scanlink_core::{DedupDecision, ScanEvent};

/// Why a pipeline returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineExit {
    /// The stop flag was set.
    Stopped,
    /// A fatal read error; the port needs reopening.
    Failed(ConnectionError),
}

/// Everything a pipeline needs besides its reader. Survives reconnects.
#[derive(Debug, Clone)]
pub(crate) struct IngestContext {
    pub device_id: u32,
    pub port: String,
    pub dedup: DedupFilter,
    pub recorder: ScanRecorder,
    pub events: EventSender,
    pub status: SharedStatus,
    pub total_scans: Arc<AtomicU64>,
    pub poll_interval: Duration,
}

impl IngestContext {
    pub fn emit(&self, event: ManagerEvent) {
        // A closed channel only means nobody is listening.
        let _ = self.events.send(event);
    }

    pub fn error_event(&self, message: impl Into<String>) -> ManagerEvent {
        ManagerEvent::Error {
            device_id: self.device_id,
            port: self.port.clone(),
            message: message.into(),
        }
    }
}

/// Reads, filters and records the scans of one connected device.
pub(crate) struct ScanIngestPipeline {
    ctx: IngestContext,
    reader: FrameReader,
    stop: Arc<AtomicBool>,
}

impl ScanIngestPipeline {
    pub fn new(ctx: IngestContext, reader: FrameReader, stop: Arc<AtomicBool>) -> Self {
        Self { ctx, reader, stop }
    }

    /// Runs until the stop flag is set or a fatal error occurs.
    pub async fn run(mut self) -> PipelineExit {
        info!(port = %self.ctx.port, "Scanning started");

        loop {
            if self.stop.load(Ordering::Acquire) {
                debug!(port = %self.ctx.port, "Stop flag observed");
                return PipelineExit::Stopped;
            }

            match self.reader.poll() {
                Ok(lines) => {
                    for line in lines {
                        self.ingest(line).await;
                    }
                }
                Err(e) => match e.class() {
                    ErrorClass::Transient => {
                        warn!(port = %self.ctx.port, error = %e, "Transient read error");
                    }
                    ErrorClass::Fatal => {
                        error!(port = %self.ctx.port, error = %e, "Read failed, leaving scan loop");
                        return PipelineExit::Failed(e);
                    }
                },
            }

            tokio::time::sleep(self.ctx.poll_interval).await;
        }
    }

    /// Handles one framed line.
    pub async fn ingest(&mut self, line: String) -> DedupDecision {
        let observed_at = Local::now();
        let event = ScanEvent::from_line(line, self.ctx.port.as_str(), observed_at);

        let decision = self
            .ctx
            .dedup
            .accept(
                &event.device_port,
                &event.raw_line,
                Instant::now(),
                observed_at.date_naive(),
            )
            .await;

        match decision {
            DedupDecision::DuplicateWindow => {
                debug!(port = %self.ctx.port, payload = %event.raw_line, "Repeat within window filtered");
            }
            DedupDecision::DuplicateDaily => {
                info!(port = %self.ctx.port, payload = %event.raw_line, "Already scanned today, not recorded");
                self.count(&event).await;
            }
            DedupDecision::New => {
                self.count(&event).await;
                self.record(&event).await;
            }
        }

        self.ctx.emit(ManagerEvent::Scan {
            device_id: self.ctx.device_id,
            event,
            decision,
        });
        decision
    }

    async fn count(&self, event: &ScanEvent) {
        self.ctx.total_scans.fetch_add(1, Ordering::Relaxed);
        let mut status = self.ctx.status.write().await;
        status.scan_count += 1;
        status.last_scan = Some(event.observed_at);
    }

    async fn record(&self, event: &ScanEvent) {
        match self.ctx.recorder.record(event).await {
            Ok(RecordOutcome::LocalOnly) => self.ctx.emit(ManagerEvent::Warning {
                device_id: self.ctx.device_id,
                port: self.ctx.port.clone(),
                message: format!("{} has no status prefix, kept locally only", event.barcode),
            }),
            Ok(outcome) => {
                debug!(port = %self.ctx.port, barcode = %event.barcode, ?outcome, "Scan recorded");
            }
            Err(e) => {
                error!(port = %self.ctx.port, barcode = %event.barcode, error = %e, "Scan not recorded");
                self.ctx
                    .emit(self.ctx.error_event(format!("{} not recorded: {}", event.barcode, e)));
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
