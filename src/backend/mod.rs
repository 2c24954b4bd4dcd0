//! Backend port — the boundary between protocol logic and device logic.
//!
//! ```text
//!   Session (dispatcher) ──▶ Backend trait ──▶ device driver / registry
//! ```
//!
//! The engine only ever talks to a device through [`Backend`]. Register
//! maps, calibration and transport bring-up all live on the far side of this
//! trait, which keeps the engine testable against a mock.
//!
//! Every call carries the [`SessionId`] of the client it is made for, so one
//! backend can serve several sessions. Single-session deployments pass
//! [`SessionId::SINGLE`] and may ignore it.
//!
//! Failures are `Err(Errno)` holding the backend's own negative code; the
//! engine forwards it to the client verbatim.

pub mod registry;
pub mod shared;

pub use registry::{AttrValue, ChannelDescriptor, DeviceDescriptor, DeviceRegistry};
pub use shared::SharedBackend;

use crate::error::Errno;
use crate::protocol::session::SessionId;

/// Result of a backend call.
pub type BackendResult<T> = Result<T, Errno>;

/// Which non-channel attribute table an attribute read/write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrKind {
    Device,
    Debug,
    Buffer,
}

// ───────────────────────────────────────────────────────────────
// Capability table
// ───────────────────────────────────────────────────────────────

/// The set of device operations the protocol engine relies on.
///
/// Optional capabilities return `None` when the backend does not provide
/// them; the engine then skips the step (or answers `0` for `TIMEOUT`).
pub trait Backend {
    /// Read a device-, debug- or buffer-scoped attribute into `out`.
    /// Returns the number of valid bytes in `out`.
    fn read_attr(
        &mut self,
        sid: SessionId,
        device: &str,
        attr: &str,
        out: &mut [u8],
        kind: AttrKind,
    ) -> BackendResult<usize>;

    /// Write a device-, debug- or buffer-scoped attribute.
    fn write_attr(
        &mut self,
        sid: SessionId,
        device: &str,
        attr: &str,
        data: &[u8],
        kind: AttrKind,
    ) -> BackendResult<usize>;

    /// Read a channel attribute into `out`.
    fn ch_read_attr(
        &mut self,
        sid: SessionId,
        device: &str,
        channel: &str,
        is_output: bool,
        attr: &str,
        out: &mut [u8],
    ) -> BackendResult<usize>;

    /// Write a channel attribute.
    fn ch_write_attr(
        &mut self,
        sid: SessionId,
        device: &str,
        channel: &str,
        is_output: bool,
        attr: &str,
        data: &[u8],
    ) -> BackendResult<usize>;

    /// Create a sampling context for `device`.
    fn open(&mut self, sid: SessionId, device: &str, sample_size: usize, mask: u32)
    -> BackendResult<()>;

    /// Destroy the sampling context of `device`.
    fn close(&mut self, sid: SessionId, device: &str) -> BackendResult<()>;

    /// Currently active channel mask of `device`.
    fn get_mask(&mut self, sid: SessionId, device: &str) -> BackendResult<u32>;

    /// Start a hardware capture of `bytes` bytes before chunked reads.
    fn transfer_dev_to_mem(
        &mut self,
        _sid: SessionId,
        _device: &str,
        _bytes: usize,
    ) -> Option<BackendResult<usize>> {
        None
    }

    /// Copy up to `buf.len()` captured bytes starting at `offset`.
    fn read_data(
        &mut self,
        sid: SessionId,
        device: &str,
        buf: &mut [u8],
        offset: usize,
    ) -> BackendResult<usize>;

    /// Push `bytes` staged bytes out to the hardware after chunked writes.
    fn transfer_mem_to_dev(
        &mut self,
        _sid: SessionId,
        _device: &str,
        _bytes: usize,
    ) -> Option<BackendResult<usize>> {
        None
    }

    /// Stage `data` at `offset`. Returns how many bytes were consumed.
    fn write_data(
        &mut self,
        sid: SessionId,
        device: &str,
        data: &[u8],
        offset: usize,
    ) -> BackendResult<usize>;

    /// Configure the backend I/O timeout in milliseconds.
    fn set_timeout(&mut self, _sid: SessionId, _timeout_ms: u32) -> Option<BackendResult<()>> {
        None
    }

    /// Opaque device-description document returned by `PRINT`.
    fn discovery_text(&mut self, sid: SessionId) -> String;
}

macro_rules! forward_backend {
    ($($ty:ty),*) => {$(
        impl<B: Backend + ?Sized> Backend for $ty {
            fn read_attr(&mut self, sid: SessionId, device: &str, attr: &str, out: &mut [u8], kind: AttrKind) -> BackendResult<usize> {
                (**self).read_attr(sid, device, attr, out, kind)
            }
            fn write_attr(&mut self, sid: SessionId, device: &str, attr: &str, data: &[u8], kind: AttrKind) -> BackendResult<usize> {
                (**self).write_attr(sid, device, attr, data, kind)
            }
            fn ch_read_attr(&mut self, sid: SessionId, device: &str, channel: &str, is_output: bool, attr: &str, out: &mut [u8]) -> BackendResult<usize> {
                (**self).ch_read_attr(sid, device, channel, is_output, attr, out)
            }
            fn ch_write_attr(&mut self, sid: SessionId, device: &str, channel: &str, is_output: bool, attr: &str, data: &[u8]) -> BackendResult<usize> {
                (**self).ch_write_attr(sid, device, channel, is_output, attr, data)
            }
            fn open(&mut self, sid: SessionId, device: &str, sample_size: usize, mask: u32) -> BackendResult<()> {
                (**self).open(sid, device, sample_size, mask)
            }
            fn close(&mut self, sid: SessionId, device: &str) -> BackendResult<()> {
                (**self).close(sid, device)
            }
            fn get_mask(&mut self, sid: SessionId, device: &str) -> BackendResult<u32> {
                (**self).get_mask(sid, device)
            }
            fn transfer_dev_to_mem(&mut self, sid: SessionId, device: &str, bytes: usize) -> Option<BackendResult<usize>> {
                (**self).transfer_dev_to_mem(sid, device, bytes)
            }
            fn read_data(&mut self, sid: SessionId, device: &str, buf: &mut [u8], offset: usize) -> BackendResult<usize> {
                (**self).read_data(sid, device, buf, offset)
            }
            fn transfer_mem_to_dev(&mut self, sid: SessionId, device: &str, bytes: usize) -> Option<BackendResult<usize>> {
                (**self).transfer_mem_to_dev(sid, device, bytes)
            }
            fn write_data(&mut self, sid: SessionId, device: &str, data: &[u8], offset: usize) -> BackendResult<usize> {
                (**self).write_data(sid, device, data, offset)
            }
            fn set_timeout(&mut self, sid: SessionId, timeout_ms: u32) -> Option<BackendResult<()>> {
                (**self).set_timeout(sid, timeout_ms)
            }
            fn discovery_text(&mut self, sid: SessionId) -> String {
                (**self).discovery_text(sid)
            }
        }
    )*};
}

forward_backend!(&mut B, Box<B>);
