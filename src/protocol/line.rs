//! Bounded line reader.
//!
//! Pulls one newline-terminated command off a [`Transport`]. Transports that
//! frame lines themselves are asked for a whole line at once; everything
//! else is read byte by byte until `\n`.
//!
//! The reader never truncates: a line longer than the configured maximum is
//! an error, since silently cutting it would desynchronize the stream.

use super::transport::Transport;
use crate::error::{ProtocolError, Result};

/// Room for a trailing `\r\n` on top of the command text.
const TERMINATOR_SLACK: usize = 2;

pub struct LineReader {
    buf: Vec<u8>,
    max_len: usize,
}

impl LineReader {
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::with_capacity(max_len + TERMINATOR_SLACK),
            max_len,
        }
    }

    /// Read the next command line, without its terminator.
    ///
    /// Leading CR/LF left over from a previous exchange are skipped. The
    /// returned slice stays valid until the next call.
    pub fn read_line<T: Transport>(&mut self, transport: &mut T) -> Result<&[u8]> {
        self.buf.clear();
        self.buf.resize(self.max_len + TERMINATOR_SLACK, 0);

        match transport.read_line(&mut self.buf) {
            Some(Ok(0)) => Err(ProtocolError::Disconnected),
            Some(Ok(n)) => self.framed(n),
            Some(Err(e)) => Err(ProtocolError::transport(e)),
            None => self.bytewise(transport),
        }
    }

    fn framed(&mut self, n: usize) -> Result<&[u8]> {
        let line = &self.buf[..n];
        if line.last() != Some(&b'\n') {
            // A short unterminated read means the peer went away mid-line.
            return Err(if n == self.buf.len() {
                ProtocolError::LineTooLong { max: self.max_len }
            } else {
                ProtocolError::Disconnected
            });
        }
        let start = line
            .iter()
            .position(|b| !is_terminator(*b))
            .unwrap_or(n);
        let end = line
            .iter()
            .rposition(|b| !is_terminator(*b))
            .map_or(start, |p| p + 1);
        if end - start > self.max_len {
            return Err(ProtocolError::LineTooLong { max: self.max_len });
        }
        Ok(&self.buf[start..end])
    }

    fn bytewise<T: Transport>(&mut self, transport: &mut T) -> Result<&[u8]> {
        self.buf.clear();
        let mut byte = [0u8; 1];
        loop {
            match transport.read(&mut byte) {
                Ok(0) => return Err(ProtocolError::Disconnected),
                Ok(_) => {}
                Err(e) => return Err(ProtocolError::transport(e)),
            }
            let b = byte[0];
            if self.buf.is_empty() && is_terminator(b) {
                continue;
            }
            if b == b'\n' {
                break;
            }
            // One extra byte is tolerated only as the `\r` of a `\r\n` pair.
            if self.buf.len() > self.max_len || (self.buf.len() == self.max_len && b != b'\r') {
                return Err(ProtocolError::LineTooLong { max: self.max_len });
            }
            self.buf.push(b);
        }
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        Ok(&self.buf)
    }
}

fn is_terminator(b: u8) -> bool {
    b == b'\r' || b == b'\n'
}
