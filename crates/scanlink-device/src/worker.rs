//! # Device Worker
//!
//! One task per registered device. It is the only writer of the device's
//! [`DeviceStatus`](crate::event::DeviceStatus) state and owns its session
//! and reconnect supervisor.
//!
//! ## Worker Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   select! ─┬─ command ───► Connect / Disconnect / Shutdown              │
//! │            │                                                            │
//! │            └─ pipeline exit ─► Failed(fatal) ─► recover()               │
//! │                                                                         │
//! │   recover():                                                            │
//! │     Reconnecting ─► sleep 2s×n ─► close ─► sleep 1s ─► open             │
//! │        ▲                                                │               │
//! │        └──────────── open failed (bounded) ◄────────────┤               │
//! │                                                         ▼               │
//! │                                            Connected ─► Scanning        │
//! │                                                                         │
//! │   Every sleep also listens for commands: an operator Disconnect or      │
//! │   Connect cuts a pending reconnect short.                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::error::{ConnectionError, DeviceError, DeviceResult};
use crate::event::ManagerEvent;
use crate::pipeline::{IngestContext, PipelineExit, ScanIngestPipeline};
use crate::session::DeviceSession;
use crate::supervisor::{ReconnectStep, ReconnectSupervisor};
use scanlink_core::ConnectionState;

/// Commands the manager sends to a worker.
#[derive(Debug)]
pub(crate) enum DeviceCommand {
    Connect(oneshot::Sender<DeviceResult<()>>),
    Disconnect(oneshot::Sender<()>),
    Shutdown,
}

pub(crate) struct DeviceWorker {
    session: DeviceSession,
    supervisor: ReconnectSupervisor,
    ctx: IngestContext,
    commands: mpsc::Receiver<DeviceCommand>,
    /// Pause before the single retry of a manual connect.
    retry_delay: Duration,
}

impl DeviceWorker {
    pub fn new(
        session: DeviceSession,
        supervisor: ReconnectSupervisor,
        ctx: IngestContext,
        commands: mpsc::Receiver<DeviceCommand>,
        retry_delay: Duration,
    ) -> Self {
        Self {
            session,
            supervisor,
            ctx,
            commands,
            retry_delay,
        }
    }

    /// Runs until `Shutdown` or until the manager drops the command sender.
    pub async fn run(mut self) {
        debug!(port = %self.ctx.port, device_id = self.ctx.device_id, "Device worker started");

        let mut pending: Option<DeviceCommand> = None;
        loop {
            let command = match pending.take() {
                Some(command) => command,
                None => tokio::select! {
                    command = self.commands.recv() => command.unwrap_or(DeviceCommand::Shutdown),
                    exit = self.session.pipeline_exit() => {
                        pending = self.on_pipeline_exit(exit).await;
                        continue;
                    }
                },
            };

            match command {
                DeviceCommand::Connect(reply) => {
                    let result = self.connect().await;
                    let fatal = matches!(&result, Err(e) if e.is_fatal());
                    let _ = reply.send(result.map_err(|source| DeviceError::Connection {
                        port: self.ctx.port.clone(),
                        source,
                    }));
                    if fatal {
                        pending = self.recover().await;
                    }
                }
                DeviceCommand::Disconnect(reply) => {
                    self.disconnect().await;
                    let _ = reply.send(());
                }
                DeviceCommand::Shutdown => break,
            }
        }

        self.disconnect().await;
        debug!(port = %self.ctx.port, "Device worker stopped");
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Opens the port, retrying once after a forced close, and starts
    /// scanning.
    async fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.session.is_open() && self.session.has_pipeline() {
            debug!(port = %self.ctx.port, "Already connected");
            return Ok(());
        }

        self.supervisor.reset();
        self.ctx.status.write().await.reconnect_attempts = 0;
        self.set_state(ConnectionState::Connecting).await;
        self.session.close().await;

        if let Err(first) = self.session.open().await {
            warn!(port = %self.ctx.port, error = %first, "Connect failed, retrying once");
            self.session.close().await;
            tokio::time::sleep(self.retry_delay).await;

            if let Err(second) = self.session.open().await {
                error!(
                    port = %self.ctx.port,
                    first = %first,
                    second = %second,
                    "Connect retry failed"
                );
                self.note_error(&second).await;
                self.set_state(ConnectionState::Failed).await;
                return Err(second);
            }
        }

        self.ctx.status.write().await.last_error = None;
        self.start_scanning().await;
        info!(port = %self.ctx.port, "Device connected");
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.supervisor.reset();
        self.session.close().await;
        self.ctx.status.write().await.reconnect_attempts = 0;
        self.set_state(ConnectionState::Disconnected).await;
    }

    async fn start_scanning(&mut self) {
        self.set_state(ConnectionState::Connected).await;
        let ctx = self.ctx.clone();
        self.session
            .spawn_pipeline(move |reader, stop| ScanIngestPipeline::new(ctx, reader, stop).run());
        self.set_state(ConnectionState::Scanning).await;
    }

    // =========================================================================
    // Failure Handling
    // =========================================================================

    async fn on_pipeline_exit(&mut self, exit: PipelineExit) -> Option<DeviceCommand> {
        match exit {
            PipelineExit::Stopped => {
                debug!(port = %self.ctx.port, "Pipeline stopped on its own");
                self.session.close().await;
                self.set_state(ConnectionState::Disconnected).await;
                None
            }
            PipelineExit::Failed(e) => {
                self.note_error(&e).await;
                self.session.close().await;
                self.set_state(ConnectionState::Failed).await;
                if e.is_fatal() {
                    self.recover().await
                } else {
                    None
                }
            }
        }
    }

    /// Drives bounded reconnection. Returns a command that interrupted it.
    async fn recover(&mut self) -> Option<DeviceCommand> {
        let mut step = self.supervisor.on_fatal(Instant::now());

        loop {
            match step {
                ReconnectStep::Skip => {
                    debug!(port = %self.ctx.port, "Reconnect triggered moments ago, skipping");
                    return None;
                }
                ReconnectStep::Exhausted { attempts } => {
                    error!(
                        port = %self.ctx.port,
                        attempts,
                        "Reconnect attempts exhausted, manual reconnect required"
                    );
                    self.ctx.status.write().await.reconnect_attempts = attempts;
                    self.ctx.emit(self.ctx.error_event(format!(
                        "gave up after {} reconnect attempts",
                        attempts
                    )));
                    self.set_state(ConnectionState::Failed).await;
                    return None;
                }
                ReconnectStep::Retry { attempt, delay } => {
                    self.ctx.status.write().await.reconnect_attempts = attempt;
                    self.set_state(ConnectionState::Reconnecting).await;
                    info!(
                        port = %self.ctx.port,
                        attempt,
                        max = self.supervisor.policy().max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Reconnecting"
                    );

                    if let Some(command) = self.pause(delay).await {
                        return Some(command);
                    }
                    self.session.close().await;
                    let settle = self.supervisor.policy().settle;
                    if let Some(command) = self.pause(settle).await {
                        return Some(command);
                    }

                    match self.session.open().await {
                        Ok(()) => {
                            self.supervisor.on_success();
                            {
                                let mut status = self.ctx.status.write().await;
                                status.reconnect_attempts = 0;
                                status.last_error = None;
                            }
                            info!(port = %self.ctx.port, attempt, "Reconnected");
                            self.start_scanning().await;
                            return None;
                        }
                        Err(e) => {
                            warn!(port = %self.ctx.port, attempt, error = %e, "Reconnect attempt failed");
                            self.note_error(&e).await;
                            self.set_state(ConnectionState::Failed).await;
                            step = self.supervisor.on_retry_failed();
                        }
                    }
                }
            }
        }
    }

    /// Sleeps for `delay` unless a command arrives first.
    async fn pause(&mut self, delay: Duration) -> Option<DeviceCommand> {
        tokio::select! {
            _ = tokio::time::sleep(delay) => None,
            command = self.commands.recv() => Some(command.unwrap_or(DeviceCommand::Shutdown)),
        }
    }

    // =========================================================================
    // Status
    // =========================================================================

    async fn set_state(&self, state: ConnectionState) {
        let changed = {
            let mut status = self.ctx.status.write().await;
            let changed = status.state != state;
            status.state = state;
            changed
        };
        if changed {
            debug!(port = %self.ctx.port, %state, "Device state changed");
            self.ctx.emit(ManagerEvent::StateChanged {
                device_id: self.ctx.device_id,
                port: self.ctx.port.clone(),
                state,
            });
        }
    }

    async fn note_error(&self, error: &ConnectionError) {
        self.ctx.status.write().await.last_error = Some(error.to_string());
        self.ctx.emit(self.ctx.error_event(error.to_string()));
    }
}
