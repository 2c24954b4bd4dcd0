//! Backend shared between sessions running on different threads.
//!
//! Each session owns a clone of [`SharedBackend`]; every backend call takes
//! the lock for exactly its own duration, so calls from different sessions
//! are serialized but may interleave between commands.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{AttrKind, Backend, BackendResult};
use crate::protocol::session::SessionId;

/// Clonable handle serializing access to one backend.
pub struct SharedBackend<B> {
    inner: Arc<Mutex<B>>,
}

impl<B> Clone for SharedBackend<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Backend> SharedBackend<B> {
    pub fn new(backend: B) -> Self {
        Self {
            inner: Arc::new(Mutex::new(backend)),
        }
    }

    /// Run `f` with exclusive access to the backend.
    pub fn with<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut *guard)
    }
}

impl<B: Backend> Backend for SharedBackend<B> {
    fn read_attr(
        &mut self,
        sid: SessionId,
        device: &str,
        attr: &str,
        out: &mut [u8],
        kind: AttrKind,
    ) -> BackendResult<usize> {
        self.inner.lock().read_attr(sid, device, attr, out, kind)
    }

    fn write_attr(
        &mut self,
        sid: SessionId,
        device: &str,
        attr: &str,
        data: &[u8],
        kind: AttrKind,
    ) -> BackendResult<usize> {
        self.inner.lock().write_attr(sid, device, attr, data, kind)
    }

    fn ch_read_attr(
        &mut self,
        sid: SessionId,
        device: &str,
        channel: &str,
        is_output: bool,
        attr: &str,
        out: &mut [u8],
    ) -> BackendResult<usize> {
        self.inner
            .lock()
            .ch_read_attr(sid, device, channel, is_output, attr, out)
    }

    fn ch_write_attr(
        &mut self,
        sid: SessionId,
        device: &str,
        channel: &str,
        is_output: bool,
        attr: &str,
        data: &[u8],
    ) -> BackendResult<usize> {
        self.inner
            .lock()
            .ch_write_attr(sid, device, channel, is_output, attr, data)
    }

    fn open(&mut self, sid: SessionId, device: &str, sample_size: usize, mask: u32) -> BackendResult<()> {
        self.inner.lock().open(sid, device, sample_size, mask)
    }

    fn close(&mut self, sid: SessionId, device: &str) -> BackendResult<()> {
        self.inner.lock().close(sid, device)
    }

    fn get_mask(&mut self, sid: SessionId, device: &str) -> BackendResult<u32> {
        self.inner.lock().get_mask(sid, device)
    }

    fn transfer_dev_to_mem(
        &mut self,
        sid: SessionId,
        device: &str,
        bytes: usize,
    ) -> Option<BackendResult<usize>> {
        self.inner.lock().transfer_dev_to_mem(sid, device, bytes)
    }

    fn read_data(
        &mut self,
        sid: SessionId,
        device: &str,
        buf: &mut [u8],
        offset: usize,
    ) -> BackendResult<usize> {
        self.inner.lock().read_data(sid, device, buf, offset)
    }

    fn transfer_mem_to_dev(
        &mut self,
        sid: SessionId,
        device: &str,
        bytes: usize,
    ) -> Option<BackendResult<usize>> {
        self.inner.lock().transfer_mem_to_dev(sid, device, bytes)
    }

    fn write_data(
        &mut self,
        sid: SessionId,
        device: &str,
        data: &[u8],
        offset: usize,
    ) -> BackendResult<usize> {
        self.inner.lock().write_data(sid, device, data, offset)
    }

    fn set_timeout(&mut self, sid: SessionId, timeout_ms: u32) -> Option<BackendResult<()>> {
        self.inner.lock().set_timeout(sid, timeout_ms)
    }

    fn discovery_text(&mut self, sid: SessionId) -> String {
        self.inner.lock().discovery_text(sid)
    }
}
