//! Frame reader: pulls bytes from a session's link and turns them into
//! trimmed scan lines.
//!
//! Partial lines are kept across polls. [`FrameReader::reset`] drops them,
//! so a reader can be restarted on a fresh connection.

use tracing::trace;

use crate::error::ConnectionError;
use crate::session::{lock_link, SharedLink};
use scanlink_core::framing::FrameDecoder;

const READ_CHUNK: usize = 1024;

/// Reads framed lines from one device.
pub struct FrameReader {
    port: String,
    link: SharedLink,
    decoder: FrameDecoder,
    buf: Vec<u8>,
}

impl FrameReader {
    pub(crate) fn new(port: String, link: SharedLink) -> Self {
        Self {
            port,
            link,
            decoder: FrameDecoder::new(),
            buf: vec![0; READ_CHUNK],
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    /// Reads what the link has buffered and returns every completed line.
    ///
    /// Returns an empty list when nothing arrived. A closed link is
    /// reported as [`ConnectionError::PortUnavailable`].
    pub fn poll(&mut self) -> Result<Vec<String>, ConnectionError> {
        let read = {
            let mut guard = lock_link(&self.link);
            let link = guard
                .as_mut()
                .ok_or_else(|| ConnectionError::PortUnavailable(format!("{} is not open", self.port)))?;
            link.read_available(&mut self.buf)?
        };

        if read == 0 {
            return Ok(Vec::new());
        }

        trace!(port = %self.port, bytes = read, "Serial data received");
        Ok(self.decoder.feed(&self.buf[..read]))
    }

    /// Bytes held back waiting for a line terminator.
    pub fn pending(&self) -> usize {
        self.decoder.pending()
    }

    pub fn reset(&mut self) {
        self.decoder.reset();
    }
}
