//! # scanlink-device: Serial Scanner Lifecycle
//!
//! Runs every configured scanner: opens its port, frames and filters what
//! it sends, records accepted scans and brings the device back after the
//! cable is pulled.
//!
//! ## Per-Device Data Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  serial bytes                                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  FrameReader ── CR/LF framing, UTF-8 → GBK → ASCII decoding             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DedupFilter ── 5s per-device window, then today's set (all devices)    │
//! │       │                                                                 │
//! │       ▼ New                                                             │
//! │  ScanRecorder ── backlog append (always) ──► RemoteSyncEngine.dispatch  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ManagerEvent::Scan ──► event consumer                                  │
//! │                                                                         │
//! │  fatal read error ──► DeviceWorker.recover() (ReconnectSupervisor)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`manager`] - Device registry and command routing
//! - [`session`] - Port open/close and the hardware traits
//! - [`reader`] - Line reader over a session
//! - [`dedup`] - Two-tier duplicate filter
//! - [`pipeline`] - Per-device read loop
//! - [`supervisor`] - Reconnect schedule
//! - [`recorder`] - Backlog and upload fan-out
//! - [`event`] - Events and device status
//! - [`error`] - Connection and manager errors

pub mod dedup;
pub mod error;
pub mod event;
pub mod manager;
pub mod pipeline;
pub mod reader;
pub mod recorder;
pub mod session;
pub mod supervisor;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use dedup::DedupFilter;
pub use error::{classify, ConnectionError, DeviceError, DeviceResult, ErrorClass};
pub use event::{DeviceSnapshot, DeviceStatus, EventReceiver, ManagerEvent};
pub use manager::{DeviceManager, ManagerSettings};
pub use pipeline::PipelineExit;
pub use reader::FrameReader;
pub use recorder::{RecordOutcome, ScanRecorder};
pub use session::{available_ports, DeviceSession, PortInfo, PortOpener, SerialLink, SessionTiming, SystemPortOpener};
pub use supervisor::{ReconnectPolicy, ReconnectStep, ReconnectSupervisor};
