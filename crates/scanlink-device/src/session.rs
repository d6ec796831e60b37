//! # Device Session
//!
//! Owns one serial connection: opening it, handing a [`FrameReader`] to the
//! ingest pipeline and tearing everything down again.
//!
//! ## Close Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  close()                                                                │
//! │    1. set the pipeline's stop flag                                      │
//! │    2. wait for the pipeline task (bounded, then abort)                  │
//! │    3. cancel in-flight I/O if the link supports it                      │
//! │    4. clear input and output buffers                                    │
//! │    5. drop the handle (closes the port)                                 │
//! │    6. sleep the grace period so the OS releases the port                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `close()` never fails and is a no-op when nothing is open.
//!
//! The hardware is behind two traits, [`PortOpener`] and [`SerialLink`].
//! [`SystemPortOpener`] implements them with `serialport`.

use std::future::Future;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ConnectionError, DeviceError, DeviceResult};
use crate::pipeline::PipelineExit;
use crate::reader::FrameReader;
use scanlink_core::{Parity, ScannerDeviceConfig, StopBits};

// =============================================================================
// Hardware Seams
// =============================================================================

/// An open serial connection.
pub trait SerialLink: Send {
    /// Reads whatever is buffered, without waiting. `Ok(0)` means no data.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, ConnectionError>;

    /// Discards pending input and output.
    fn clear_buffers(&mut self) -> Result<(), ConnectionError>;

    /// Cancels in-flight reads and writes. Returns `false` when unsupported.
    fn cancel_io(&mut self) -> bool {
        false
    }
}

/// Opens serial connections for a device config.
pub trait PortOpener: Send + Sync {
    fn open(&self, config: &ScannerDeviceConfig) -> Result<Box<dyn SerialLink>, ConnectionError>;
}

/// Link slot shared between a session and its reader.
pub(crate) type SharedLink = Arc<Mutex<Option<Box<dyn SerialLink>>>>;

pub(crate) fn lock_link(link: &SharedLink) -> MutexGuard<'_, Option<Box<dyn SerialLink>>> {
    link.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// serialport Implementation
// =============================================================================

/// Opens real ports through the `serialport` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPortOpener;

struct SystemSerialLink {
    port: Box<dyn serialport::SerialPort>,
}

fn data_bits(bits: u8) -> serialport::DataBits {
    match bits {
        5 => serialport::DataBits::Five,
        6 => serialport::DataBits::Six,
        7 => serialport::DataBits::Seven,
        _ => serialport::DataBits::Eight,
    }
}

fn parity(parity: Parity, port: &str) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Even => serialport::Parity::Even,
        Parity::Odd => serialport::Parity::Odd,
        Parity::Mark | Parity::Space => {
            warn!(port, parity = %parity.letter(), "Mark/space parity unsupported, using none");
            serialport::Parity::None
        }
    }
}

fn stop_bits(bits: StopBits, port: &str) -> serialport::StopBits {
    match bits {
        StopBits::One => serialport::StopBits::One,
        StopBits::Two => serialport::StopBits::Two,
        StopBits::OnePointFive => {
            warn!(port, "1.5 stop bits unsupported, using 2");
            serialport::StopBits::Two
        }
    }
}

impl PortOpener for SystemPortOpener {
    fn open(&self, config: &ScannerDeviceConfig) -> Result<Box<dyn SerialLink>, ConnectionError> {
        let port = serialport::new(config.port.as_str(), config.baud_rate)
            .data_bits(data_bits(config.data_bits))
            .parity(parity(config.parity, &config.port))
            .stop_bits(stop_bits(config.stop_bits, &config.port))
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .open()?;

        Ok(Box::new(SystemSerialLink { port }))
    }
}

impl SerialLink for SystemSerialLink {
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, ConnectionError> {
        let available = self.port.bytes_to_read()? as usize;
        if available == 0 {
            return Ok(0);
        }
        let want = available.min(buf.len());
        match self.port.read(&mut buf[..want]) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn clear_buffers(&mut self) -> Result<(), ConnectionError> {
        self.port.clear(serialport::ClearBuffer::All)?;
        Ok(())
    }
}

// =============================================================================
// Port Listing
// =============================================================================

/// A serial port the OS reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub name: String,
    pub description: String,
}

/// Lists the serial ports currently present.
pub fn available_ports() -> DeviceResult<Vec<PortInfo>> {
    let ports = serialport::available_ports().map_err(|e| DeviceError::PortListing(e.to_string()))?;

    Ok(ports
        .into_iter()
        .map(|p| {
            let description = match p.port_type {
                serialport::SerialPortType::UsbPort(usb) => {
                    let product = usb.product.unwrap_or_else(|| "USB serial".to_string());
                    format!("{} ({:04x}:{:04x})", product, usb.vid, usb.pid)
                }
                serialport::SerialPortType::PciPort => "PCI serial".to_string(),
                serialport::SerialPortType::BluetoothPort => "Bluetooth serial".to_string(),
                serialport::SerialPortType::Unknown => "serial".to_string(),
            };
            PortInfo {
                name: p.port_name,
                description,
            }
        })
        .collect())
}

// =============================================================================
// Device Session
// =============================================================================

/// Timing knobs for [`DeviceSession::close`].
#[derive(Debug, Clone, Copy)]
pub struct SessionTiming {
    /// How long to wait for the pipeline to stop.
    pub stop_timeout: Duration,
    /// Sleep after closing so the OS frees the port.
    pub close_grace: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_secs(2),
            close_grace: Duration::from_millis(200),
        }
    }
}

/// One device's serial connection and the pipeline reading from it.
pub struct DeviceSession {
    config: ScannerDeviceConfig,
    opener: Arc<dyn PortOpener>,
    timing: SessionTiming,
    link: SharedLink,
    stop: Arc<AtomicBool>,
    pipeline: Option<JoinHandle<PipelineExit>>,
}

impl DeviceSession {
    pub fn new(config: ScannerDeviceConfig, opener: Arc<dyn PortOpener>, timing: SessionTiming) -> Self {
        Self {
            config,
            opener,
            timing,
            link: Arc::new(Mutex::new(None)),
            stop: Arc::new(AtomicBool::new(false)),
            pipeline: None,
        }
    }

    pub fn config(&self) -> &ScannerDeviceConfig {
        &self.config
    }

    pub fn port(&self) -> &str {
        &self.config.port
    }

    pub fn is_open(&self) -> bool {
        lock_link(&self.link).is_some()
    }

    pub fn has_pipeline(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Opens the port. The OS call runs on the blocking pool.
    pub async fn open(&mut self) -> Result<(), ConnectionError> {
        let opener = Arc::clone(&self.opener);
        let config = self.config.clone();
        let link = tokio::task::spawn_blocking(move || opener.open(&config))
            .await
            .map_err(|e| ConnectionError::Unknown(format!("open task failed: {}", e)))??;

        *lock_link(&self.link) = Some(link);
        info!(
            port = %self.config.port,
            baud = self.config.baud_rate,
            data_bits = self.config.data_bits,
            parity = %self.config.parity.letter(),
            stop_bits = f32::from(self.config.stop_bits),
            "Port opened"
        );
        Ok(())
    }

    /// Spawns the pipeline task with a fresh reader and stop flag.
    pub fn spawn_pipeline<F, Fut>(&mut self, start: F)
    where
        F: FnOnce(FrameReader, Arc<AtomicBool>) -> Fut,
        Fut: Future<Output = PipelineExit> + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        self.stop = Arc::clone(&stop);
        let reader = FrameReader::new(self.config.port.clone(), Arc::clone(&self.link));
        self.pipeline = Some(tokio::spawn(start(reader, stop)));
    }

    /// Resolves when the running pipeline exits on its own. Pending forever
    /// when no pipeline runs. Safe to drop and call again.
    pub async fn pipeline_exit(&mut self) -> PipelineExit {
        let Some(handle) = self.pipeline.as_mut() else {
            return std::future::pending().await;
        };
        let exit = match handle.await {
            Ok(exit) => exit,
            Err(e) => PipelineExit::Failed(ConnectionError::Unknown(format!(
                "pipeline task ended: {}",
                e
            ))),
        };
        self.pipeline = None;
        exit
    }

    /// Stops the pipeline and closes the port. Idempotent.
    pub async fn close(&mut self) {
        self.stop.store(true, Ordering::Release);

        if let Some(mut handle) = self.pipeline.take() {
            match tokio::time::timeout(self.timing.stop_timeout, &mut handle).await {
                Ok(_) => debug!(port = %self.config.port, "Pipeline stopped"),
                Err(_) => {
                    warn!(
                        port = %self.config.port,
                        timeout_ms = self.timing.stop_timeout.as_millis() as u64,
                        "Pipeline did not stop in time, aborting"
                    );
                    handle.abort();
                }
            }
        }

        let link = lock_link(&self.link).take();
        let Some(mut link) = link else {
            return;
        };

        if !link.cancel_io() {
            debug!(port = %self.config.port, "I/O cancellation unsupported");
        }
        if let Err(e) = link.clear_buffers() {
            debug!(port = %self.config.port, error = %e, "Could not clear buffers");
        }
        drop(link);

        tokio::time::sleep(self.timing.close_grace).await;
        info!(port = %self.config.port, "Port closed");
    }
}

impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceSession")
            .field("port", &self.config.port)
            .field("open", &self.is_open())
            .field("pipeline", &self.pipeline.is_some())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockOpener, MockPort};

    fn session(opener: Arc<MockOpener>) -> DeviceSession {
        DeviceSession::new(
            ScannerDeviceConfig::new("COM3"),
            opener,
            SessionTiming {
                stop_timeout: Duration::from_millis(200),
                close_grace: Duration::from_millis(1),
            },
        )
    }

    #[tokio::test]
    async fn test_open_and_close() {
        let port = MockPort::new();
        let opener = Arc::new(MockOpener::new());
        opener.attach("COM3", port.clone());

        let mut session = session(opener.clone());
        session.open().await.unwrap();
        assert!(session.is_open());

        session.close().await;
        assert!(!session.is_open());
        assert_eq!(port.clear_count(), 1);

        // Second close is a no-op.
        session.close().await;
        assert_eq!(port.clear_count(), 1);
    }

    #[tokio::test]
    async fn test_open_failure_is_classified() {
        let opener = Arc::new(MockOpener::new());
        let mut session = session(opener);

        let err = session.open().await.unwrap_err();
        assert!(err.is_fatal());
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn test_close_stops_pipeline() {
        let port = MockPort::new();
        let opener = Arc::new(MockOpener::new());
        opener.attach("COM3", port.clone());

        let mut session = session(opener);
        session.open().await.unwrap();
        session.spawn_pipeline(|_reader, stop| async move {
            while !stop.load(Ordering::Acquire) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            PipelineExit::Stopped
        });
        assert!(session.has_pipeline());

        session.close().await;
        assert!(!session.has_pipeline());
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn test_close_aborts_stuck_pipeline() {
        let port = MockPort::new();
        let opener = Arc::new(MockOpener::new());
        opener.attach("COM3", port);

        let mut session = session(opener);
        session.open().await.unwrap();
        session.spawn_pipeline(|_reader, _stop| async move {
            std::future::pending::<()>().await;
            PipelineExit::Stopped
        });

        session.close().await;
        assert!(!session.has_pipeline());
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn test_pipeline_exit_reports_failure() {
        let port = MockPort::new();
        let opener = Arc::new(MockOpener::new());
        opener.attach("COM3", port);

        let mut session = session(opener);
        session.open().await.unwrap();
        session.spawn_pipeline(|_reader, _stop| async move {
            PipelineExit::Failed(ConnectionError::DeviceRemoved("unplugged".into()))
        });

        let exit = session.pipeline_exit().await;
        assert!(matches!(exit, PipelineExit::Failed(ConnectionError::DeviceRemoved(_))));
        assert!(!session.has_pipeline());
    }
}
