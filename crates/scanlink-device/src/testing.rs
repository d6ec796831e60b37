//! In-memory serial ports for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::ConnectionError;
use crate::session::{PortOpener, SerialLink};
use scanlink_core::ScannerDeviceConfig;

#[derive(Debug, Default)]
struct PortState {
    input: VecDeque<u8>,
    read_errors: VecDeque<ConnectionError>,
    unplugged: bool,
    clears: usize,
}

/// A fake device. Clones share the same line.
#[derive(Debug, Clone, Default)]
pub struct MockPort {
    state: Arc<Mutex<PortState>>,
}

impl MockPort {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, PortState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Bytes the scanner "sends".
    pub fn push(&self, bytes: &[u8]) {
        self.state().input.extend(bytes.iter().copied());
    }

    pub fn fail_next_read(&self, err: ConnectionError) {
        self.state().read_errors.push_back(err);
    }

    /// Every read fails as if the cable was pulled, until `replug`.
    pub fn unplug(&self) {
        self.state().unplugged = true;
    }

    pub fn replug(&self) {
        self.state().unplugged = false;
    }

    pub fn clear_count(&self) -> usize {
        self.state().clears
    }

    pub fn link(&self) -> MockLink {
        MockLink { port: self.clone() }
    }
}

pub struct MockLink {
    port: MockPort,
}

impl SerialLink for MockLink {
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, ConnectionError> {
        let mut state = self.port.state();
        if state.unplugged {
            return Err(ConnectionError::DeviceRemoved(
                "A device attached to the system is not functioning.".into(),
            ));
        }
        if let Some(err) = state.read_errors.pop_front() {
            return Err(err);
        }
        let n = buf.len().min(state.input.len());
        for (slot, byte) in buf.iter_mut().zip(state.input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn clear_buffers(&mut self) -> Result<(), ConnectionError> {
        let mut state = self.port.state();
        state.input.clear();
        state.clears += 1;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct OpenerState {
    ports: HashMap<String, MockPort>,
    open_errors: HashMap<String, VecDeque<ConnectionError>>,
    opens: HashMap<String, usize>,
}

/// Opens [`MockPort`]s by name. Unknown names fail as "device not found".
#[derive(Debug, Default)]
pub struct MockOpener {
    state: Mutex<OpenerState>,
}

impl MockOpener {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, OpenerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn attach(&self, name: &str, port: MockPort) {
        self.state().ports.insert(name.to_string(), port);
    }

    pub fn detach(&self, name: &str) {
        self.state().ports.remove(name);
    }

    /// Queues an error for the next open of `name`.
    pub fn fail_open(&self, name: &str, err: ConnectionError) {
        self.state()
            .open_errors
            .entry(name.to_string())
            .or_default()
            .push_back(err);
    }

    /// Open attempts for `name`, failed ones included.
    pub fn open_count(&self, name: &str) -> usize {
        self.state().opens.get(name).copied().unwrap_or(0)
    }
}

impl PortOpener for MockOpener {
    fn open(&self, config: &ScannerDeviceConfig) -> Result<Box<dyn SerialLink>, ConnectionError> {
        let mut state = self.state();
        *state.opens.entry(config.port.clone()).or_default() += 1;

        if let Some(err) = state
            .open_errors
            .get_mut(&config.port)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        match state.ports.get(&config.port) {
            Some(port) => Ok(Box::new(port.link())),
            None => Err(ConnectionError::DeviceRemoved(format!(
                "could not open port '{}': device not found",
                config.port
            ))),
        }
    }
}
