//! Response framing.
//!
//! ```text
//! status / count   "%d\n"
//! channel mask     "%08x\n"
//! attribute read   "%d\n" <payload> "\r\n"
//! discovery text   "%d\n" <text> "\n"
//! sample chunk     raw bytes, no terminator
//! ```
//!
//! The attribute payload ends in `\r\n` while text and masks end in `\n`.
//! Existing clients parse exactly this, so the asymmetry stays.

use core::fmt::Write as _;

use super::transport::Transport;
use crate::error::{Errno, ProtocolError, Result};

/// Longest numeric line: sign, 20 digits, newline.
const NUM_LINE_CAP: usize = 24;

pub struct ResponseWriter<'a, T: Transport> {
    transport: &'a mut T,
}

impl<'a, T: Transport> ResponseWriter<'a, T> {
    pub fn new(transport: &'a mut T) -> Self {
        Self { transport }
    }

    /// Write every byte of `data`, retrying partial writes.
    pub fn raw(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let n = self
                .transport
                .write(data)
                .map_err(ProtocolError::transport)?;
            if n == 0 {
                return Err(ProtocolError::Transport("write returned zero".into()));
            }
            data = &data[n.min(data.len())..];
        }
        Ok(())
    }

    /// Signed decimal value line.
    pub fn value(&mut self, v: i64) -> Result<()> {
        let mut line: heapless::String<NUM_LINE_CAP> = heapless::String::new();
        // Cannot overflow: NUM_LINE_CAP covers i64::MIN plus newline.
        let _ = writeln!(line, "{v}");
        self.raw(line.as_bytes())
    }

    /// Unsigned count line.
    pub fn count(&mut self, n: usize) -> Result<()> {
        self.value(n as i64)
    }

    /// Negative status line.
    pub fn status(&mut self, e: Errno) -> Result<()> {
        self.value(i64::from(e.code()))
    }

    /// Eight lowercase hex digits.
    pub fn mask(&mut self, mask: u32) -> Result<()> {
        let mut line: heapless::String<NUM_LINE_CAP> = heapless::String::new();
        let _ = writeln!(line, "{mask:08x}");
        self.raw(line.as_bytes())
    }

    /// Length-prefixed attribute payload.
    pub fn attribute(&mut self, data: &[u8]) -> Result<()> {
        self.count(data.len())?;
        self.raw(data)?;
        self.raw(b"\r\n")
    }

    /// Length-prefixed text block.
    pub fn text(&mut self, text: &str) -> Result<()> {
        self.count(text.len())?;
        self.raw(text.as_bytes())?;
        self.raw(b"\n")
    }

    pub fn flush(&mut self) -> Result<()> {
        self.transport.flush().map_err(ProtocolError::transport)
    }
}
