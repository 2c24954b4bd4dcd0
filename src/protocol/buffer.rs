//! Chunked READBUF / WRITEBUF transfers.
//!
//! ```text
//! READBUF dev N                      WRITEBUF dev N
//!   ◀── count₁ \n                      ◀── N \n
//!   ◀── mask %08x \n  (first only)     ──▶ up to chunk_size bytes
//!   ◀── count₁ raw bytes               ──▶ ...
//!   ◀── count₂ \n                      ◀── total \n
//!   ◀── count₂ raw bytes
//! ```
//!
//! Both directions advance by what the backend reports, never by what was
//! requested. Responses are written here; the caller only sees the final
//! [`Transfer`] record or a session-fatal error.

use log::{debug, warn};

use super::response::ResponseWriter;
use super::session::SessionId;
use super::transport::{Transport, discard};
use crate::backend::Backend;
use crate::error::{Errno, ProtocolError, Result};

// ── Transfer bookkeeping ─────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Transferring,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Device to client (READBUF).
    ToClient,
    /// Client to device (WRITEBUF).
    FromClient,
}

/// Progress of one buffer transfer. `total` is fixed when the transfer
/// begins; `done` only grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub direction: Direction,
    pub total: usize,
    pub done: usize,
    pub chunks: usize,
    pub state: TransferState,
}

impl Transfer {
    pub fn idle(direction: Direction) -> Self {
        Self {
            direction,
            total: 0,
            done: 0,
            chunks: 0,
            state: TransferState::Idle,
        }
    }

    pub fn begin(direction: Direction, total: usize) -> Self {
        Self {
            total,
            state: TransferState::Transferring,
            ..Self::idle(direction)
        }
    }

    /// Record one chunk of `n` bytes. Clamped to what is left.
    pub fn advance(&mut self, n: usize) {
        self.done += n.min(self.remaining());
        self.chunks += 1;
    }

    pub fn remaining(&self) -> usize {
        self.total - self.done
    }

    pub fn complete(&mut self) {
        self.state = TransferState::Complete;
    }

    pub fn fail(&mut self) {
        self.state = TransferState::Failed;
    }
}

// ── READBUF ──────────────────────────────────────────────────

/// Stream `len` captured bytes of `device` to the client.
///
/// A backend failure is written as the status line and ends the transfer
/// with [`TransferState::Failed`]; only transport failures are returned.
pub fn read_buffer<T, B>(
    sid: SessionId,
    device: &str,
    len: usize,
    chunk: &mut [u8],
    transport: &mut T,
    backend: &mut B,
) -> Result<Transfer>
where
    T: Transport,
    B: Backend + ?Sized,
{
    let mut transfer = Transfer::begin(Direction::ToClient, len);
    let mut out = ResponseWriter::new(transport);

    let mask = match backend.get_mask(sid, device) {
        Ok(mask) => mask,
        Err(e) => return abort(&mut out, &mut transfer, e),
    };

    if let Some(Err(e)) = backend.transfer_dev_to_mem(sid, device, len) {
        return abort(&mut out, &mut transfer, e);
    }

    while transfer.remaining() > 0 {
        let want = transfer.remaining().min(chunk.len());
        let n = match backend.read_data(sid, device, &mut chunk[..want], transfer.done) {
            Ok(0) => {
                warn!("IIOD[{}]: {} stalled after {} bytes", sid, device, transfer.done);
                return abort(&mut out, &mut transfer, Errno::EIO);
            }
            Ok(n) => n.min(want),
            Err(e) => return abort(&mut out, &mut transfer, e),
        };
        out.count(n)?;
        if transfer.chunks == 0 {
            out.mask(mask)?;
        }
        out.raw(&chunk[..n])?;
        transfer.advance(n);
    }

    transfer.complete();
    Ok(transfer)
}

// ── WRITEBUF ─────────────────────────────────────────────────

/// Stage `len` client bytes into `device`, then push them to hardware.
///
/// The byte count is acknowledged before any payload is read. A backend
/// failure drains the rest of the declared payload and is answered with
/// its status line; a peer that stops sending, or a backend that stops
/// consuming, is [`ProtocolError::IncompleteTransfer`].
pub fn write_buffer<T, B>(
    sid: SessionId,
    device: &str,
    len: usize,
    chunk: &mut [u8],
    transport: &mut T,
    backend: &mut B,
) -> Result<Transfer>
where
    T: Transport,
    B: Backend + ?Sized,
{
    let mut transfer = Transfer::begin(Direction::FromClient, len);
    {
        let mut out = ResponseWriter::new(transport);
        out.count(len)?;
        out.flush()?;
    }

    // Bytes taken off the wire; can run ahead of `done` on short writes.
    let mut received = 0usize;
    while transfer.remaining() > 0 {
        let want = transfer.remaining().min(chunk.len());
        let got = transport
            .read(&mut chunk[..want])
            .map_err(ProtocolError::transport)?
            .min(want);
        if got == 0 {
            transfer.fail();
            return Err(ProtocolError::IncompleteTransfer {
                expected: len,
                transferred: transfer.done,
            });
        }
        received += got;

        match backend.write_data(sid, device, &chunk[..got], transfer.done) {
            Ok(0) => {
                transfer.fail();
                return Err(ProtocolError::IncompleteTransfer {
                    expected: len,
                    transferred: transfer.done,
                });
            }
            Ok(n) => {
                if n < got {
                    warn!(
                        "IIOD[{}]: {} accepted {} of {} bytes, rest dropped",
                        sid, device, n, got
                    );
                }
                transfer.advance(n.min(got));
            }
            Err(e) => {
                let left = len.saturating_sub(received);
                discard(transport, left, chunk).map_err(ProtocolError::transport)?;
                return abort(&mut ResponseWriter::new(transport), &mut transfer, e);
            }
        }
    }

    let mut out = ResponseWriter::new(transport);
    if let Some(Err(e)) = backend.transfer_mem_to_dev(sid, device, len) {
        return abort(&mut out, &mut transfer, e);
    }
    out.count(transfer.done)?;
    transfer.complete();
    debug!(
        "IIOD[{}]: {} staged {} bytes in {} chunks",
        sid, device, transfer.done, transfer.chunks
    );
    Ok(transfer)
}

fn abort<T: Transport>(
    out: &mut ResponseWriter<'_, T>,
    transfer: &mut Transfer,
    e: Errno,
) -> Result<Transfer> {
    out.status(e)?;
    transfer.fail();
    Ok(*transfer)
}
