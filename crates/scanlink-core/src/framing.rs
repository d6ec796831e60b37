//! # Framing
//!
//! Turns the raw byte stream of a scanner into trimmed text lines.
//!
//! ## Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  bytes ──► LineFramer ──► complete line bytes ──► DecodeChain ──► trim  │
//! │              │                                     │                    │
//! │              │ partial tail kept                   ├─ UTF-8             │
//! │              ▼ for the next read                   ├─ GBK               │
//! │          [buffer]                                  └─ ASCII (lossy)     │
//! │                                                                         │
//! │  Delimiters: "\r\n" (one delimiter), "\n", "\r"                         │
//! │  Empty lines after trimming are dropped.                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lines are split on bytes before they are decoded. CR and LF never occur
//! inside a multi-byte UTF-8 or GBK sequence, so a character split across two
//! reads is reassembled before any decoder sees it.

use crate::error::DecodeError;

// =============================================================================
// Decoders
// =============================================================================

/// One decoding strategy in the fallback chain.
pub trait ByteDecoder: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Decodes the whole slice or fails without partial output.
    fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError>;
}

/// Strict UTF-8.
#[derive(Debug, Default, Clone, Copy)]
pub struct Utf8Decoder;

impl ByteDecoder for Utf8Decoder {
    fn name(&self) -> &'static str {
        "utf-8"
    }

    fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError> {
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DecodeError {
                decoder: self.name(),
                len: bytes.len(),
            })
    }
}

/// Strict GBK, the regional 8-bit encoding some scanners are configured for.
#[derive(Debug, Default, Clone, Copy)]
pub struct GbkDecoder;

impl ByteDecoder for GbkDecoder {
    fn name(&self) -> &'static str {
        "gbk"
    }

    fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError> {
        encoding_rs::GBK
            .decode_without_bom_handling_and_without_replacement(bytes)
            .map(|text| text.into_owned())
            .ok_or(DecodeError {
                decoder: self.name(),
                len: bytes.len(),
            })
    }
}

/// ASCII with every non-ASCII byte dropped. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct AsciiLossyDecoder;

impl ByteDecoder for AsciiLossyDecoder {
    fn name(&self) -> &'static str {
        "ascii-lossy"
    }

    fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError> {
        Ok(bytes
            .iter()
            .filter(|b| b.is_ascii())
            .map(|&b| b as char)
            .collect())
    }
}

/// Ordered list of decoders tried until one succeeds.
///
/// The lossy ASCII decoder always runs last, so [`DecodeChain::decode`]
/// cannot fail.
pub struct DecodeChain {
    decoders: Vec<Box<dyn ByteDecoder>>,
    fallback: AsciiLossyDecoder,
}

impl DecodeChain {
    /// Chain with the given strict decoders, in order.
    pub fn new(decoders: Vec<Box<dyn ByteDecoder>>) -> Self {
        Self {
            decoders,
            fallback: AsciiLossyDecoder,
        }
    }

    /// Decodes `bytes` with the first decoder that accepts them.
    pub fn decode(&self, bytes: &[u8]) -> String {
        for decoder in &self.decoders {
            if let Ok(text) = decoder.decode(bytes) {
                return text;
            }
        }
        self.fallback.decode(bytes).unwrap_or_default()
    }
}

impl Default for DecodeChain {
    /// UTF-8, then GBK, then lossy ASCII.
    fn default() -> Self {
        Self::new(vec![Box::new(Utf8Decoder), Box::new(GbkDecoder)])
    }
}

impl std::fmt::Debug for DecodeChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.decoders.iter().map(|d| d.name()).collect();
        f.debug_struct("DecodeChain")
            .field("decoders", &names)
            .finish()
    }
}

// =============================================================================
// Line Framer
// =============================================================================

/// Splits a byte stream at CR, LF or CRLF, keeping the unterminated tail.
#[derive(Debug, Default, Clone)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `bytes` and returns every line completed so far, without
    /// delimiters. Lines may be empty.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut i = 0;
        while i < self.buffer.len() {
            match self.buffer[i] {
                b'\n' => {
                    lines.push(self.buffer[start..i].to_vec());
                    i += 1;
                    start = i;
                }
                b'\r' => {
                    lines.push(self.buffer[start..i].to_vec());
                    i += 1;
                    if self.buffer.get(i) == Some(&b'\n') {
                        i += 1;
                    }
                    start = i;
                }
                _ => i += 1,
            }
        }
        self.buffer.drain(..start);
        lines
    }

    /// Bytes waiting for a delimiter.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drops the partial tail (after a reconnect).
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

// =============================================================================
// Frame Decoder
// =============================================================================

/// [`LineFramer`] plus [`DecodeChain`]: bytes in, trimmed non-empty lines out.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    framer: LineFramer,
    chain: DecodeChain,
}

impl FrameDecoder {
    /// Decoder with the default UTF-8 → GBK → ASCII chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder with a custom chain.
    pub fn with_chain(chain: DecodeChain) -> Self {
        Self {
            framer: LineFramer::new(),
            chain,
        }
    }

    /// Feeds one read and returns the complete lines it finished.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.framer
            .push(bytes)
            .into_iter()
            .filter_map(|line| {
                let text = self.chain.decode(&line);
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
            .collect()
    }

    /// Bytes of the unterminated tail.
    pub fn pending(&self) -> usize {
        self.framer.pending()
    }

    /// Forgets the unterminated tail.
    pub fn reset(&mut self) {
        self.framer.clear();
    }
}
