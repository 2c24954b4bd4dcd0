//! Transport abstraction — any blocking byte-oriented channel.
//!
//! Concrete implementations:
//! - [`IoTransport`]: any `std::io::Read + Write` stream (TCP socket,
//!   UART / USB-CDC device node, pipe)
//! - [`MemoryTransport`]: scripted input and captured output, for tests and
//!   fuzzing
//!
//! The session loop is generic over `Transport`, so adding a new transport
//! requires zero changes to the protocol logic.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};

/// Byte-oriented transport channel with blocking semantics.
pub trait Transport {
    /// Error type for this transport.
    type Error: core::fmt::Debug;

    /// Read up to `buf.len()` bytes into `buf`, blocking until at least one
    /// byte is available. Returns 0 once the peer has gone away.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write `data` to the transport.
    /// Returns the number of bytes actually written.
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;

    /// Flush any buffered output.
    fn flush(&mut self) -> Result<(), Self::Error>;

    /// Read one already-framed line into `buf`.
    ///
    /// Transports that frame lines themselves (a UART driver with line
    /// discipline, a message-oriented socket) override this. `None` means
    /// the capability is absent and the caller falls back to byte reads.
    fn read_line(&mut self, _buf: &mut [u8]) -> Option<Result<usize, Self::Error>> {
        None
    }
}

/// Fill `buf` unless the peer goes away first. Returns the bytes read.
pub fn read_full<T: Transport + ?Sized>(t: &mut T, buf: &mut [u8]) -> Result<usize, T::Error> {
    let mut n = 0;
    while n < buf.len() {
        let got = t.read(&mut buf[n..])?;
        if got == 0 {
            break;
        }
        n += got.min(buf.len() - n);
    }
    Ok(n)
}

/// Read and drop `count` bytes through `scratch`. Returns the bytes dropped.
pub fn discard<T: Transport + ?Sized>(
    t: &mut T,
    mut count: usize,
    scratch: &mut [u8],
) -> Result<usize, T::Error> {
    let mut dropped = 0;
    while count > 0 && !scratch.is_empty() {
        let want = count.min(scratch.len());
        let got = read_full(t, &mut scratch[..want])?;
        dropped += got;
        count -= got;
        if got < want {
            break;
        }
    }
    Ok(dropped)
}

// ───────────────────────────────────────────────────────────────
// std::io adapter
// ───────────────────────────────────────────────────────────────

/// Adapter over any blocking `std::io` stream.
///
/// Reads go through an internal buffer, which also lets the adapter frame
/// lines itself instead of being polled one byte at a time.
pub struct IoTransport<S> {
    stream: BufReader<S>,
}

impl<S: Read + Write> IoTransport<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }
}

impl<S: Read + Write> Transport for IoTransport<S> {
    type Error = std::io::Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        loop {
            match self.stream.read(buf) {
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                other => return other,
            }
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        loop {
            match self.stream.get_mut().write(data) {
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                other => return other,
            }
        }
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.stream.get_mut().flush()
    }

    fn read_line(&mut self, buf: &mut [u8]) -> Option<Result<usize, Self::Error>> {
        let mut n = 0;
        while n < buf.len() {
            let available = match self.stream.fill_buf() {
                Ok(a) => a,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Some(Err(e)),
            };
            if available.is_empty() {
                break;
            }
            let room = buf.len() - n;
            let (take, done) = match available.iter().take(room).position(|&b| b == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (available.len().min(room), false),
            };
            buf[n..n + take].copy_from_slice(&available[..take]);
            self.stream.consume(take);
            n += take;
            if done {
                break;
            }
        }
        Some(Ok(n))
    }
}

// ───────────────────────────────────────────────────────────────
// In-memory transport
// ───────────────────────────────────────────────────────────────

/// Failure injected into a [`MemoryTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteRefused;

/// A transport backed by an input queue and an output buffer.
///
/// Reads drain the queue and return 0 once it is empty, which the engine
/// treats as a disconnect.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    input: VecDeque<u8>,
    output: Vec<u8>,
    /// Upper bound on bytes handed out per `read` call (0 = unbounded).
    max_read: usize,
    line_framed: bool,
    refuse_writes: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport pre-loaded with `input`.
    pub fn with_input(input: impl AsRef<[u8]>) -> Self {
        let mut t = Self::new();
        t.push_input(input);
        t
    }

    /// Queue more client bytes.
    pub fn push_input(&mut self, data: impl AsRef<[u8]>) {
        self.input.extend(data.as_ref());
    }

    /// Hand out at most `n` bytes per `read`, simulating a fragmenting link.
    pub fn set_max_read(&mut self, n: usize) {
        self.max_read = n;
    }

    /// Expose the framed `read_line` capability.
    pub fn set_line_framed(&mut self, on: bool) {
        self.line_framed = on;
    }

    /// Make every subsequent write fail.
    pub fn refuse_writes(&mut self) {
        self.refuse_writes = true;
    }

    /// Everything the engine has written so far.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Take the output written so far, leaving the buffer empty.
    pub fn take_output(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.output)
    }

    /// Bytes queued but not yet consumed.
    pub fn pending_input(&self) -> usize {
        self.input.len()
    }
}

impl Transport for MemoryTransport {
    type Error = WriteRefused;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut n = buf.len().min(self.input.len());
        if self.max_read > 0 {
            n = n.min(self.max_read);
        }
        for (slot, byte) in buf.iter_mut().zip(self.input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        if self.refuse_writes {
            return Err(WriteRefused);
        }
        self.output.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.refuse_writes {
            return Err(WriteRefused);
        }
        Ok(())
    }

    fn read_line(&mut self, buf: &mut [u8]) -> Option<Result<usize, Self::Error>> {
        if !self.line_framed {
            return None;
        }
        let mut n = 0;
        while n < buf.len() {
            let Some(byte) = self.input.pop_front() else {
                break;
            };
            buf[n] = byte;
            n += 1;
            if byte == b'\n' {
                break;
            }
        }
        Some(Ok(n))
    }
}
