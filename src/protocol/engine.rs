//! Session dispatcher — one client's command loop.
//!
//! A [`Session`] owns its transport, its scratch buffers and the sampling
//! contexts it opened. The backend is borrowed per call so the same backend
//! can be driven by several sessions in turn (or, wrapped in a
//! [`SharedBackend`](crate::backend::SharedBackend), from several threads).
//!
//! Each [`Session::step`] reads one line, dispatches it, writes and flushes
//! the response. Command-level failures are answered on the wire and the
//! loop goes on; only session-fatal errors come back as `Err`.

use log::{debug, info, warn};

use super::buffer::{self, Transfer, TransferState};
use super::command::{self, AttrScope, AttrTarget, Command};
use super::line::LineReader;
use super::response::ResponseWriter;
use super::session::{ContextTable, SamplingContext, SessionId};
use super::transport::{Transport, discard, read_full};
use crate::backend::{AttrKind, Backend};
use crate::config::EngineConfig;
use crate::error::{Errno, ProtocolError, Result};

/// What the caller should do after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct Session<T: Transport> {
    id: SessionId,
    transport: T,
    config: EngineConfig,
    reader: LineReader,
    attr_buf: Vec<u8>,
    chunk_buf: Vec<u8>,
    contexts: ContextTable,
    last_transfer: Option<Transfer>,
    closed: bool,
}

impl<T: Transport> Session<T> {
    pub fn new(id: SessionId, transport: T, config: EngineConfig) -> Self {
        Self {
            id,
            transport,
            reader: LineReader::new(config.max_line_len),
            attr_buf: vec![0; config.attr_buf_size],
            chunk_buf: vec![0; config.chunk_size],
            contexts: ContextTable::new(),
            last_transfer: None,
            closed: false,
            config,
        }
    }

    /// Session for a deployment with exactly one client.
    pub fn single(transport: T) -> Self {
        Self::new(SessionId::SINGLE, transport, EngineConfig::default())
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Sampling contexts this session currently holds.
    pub fn contexts(&self) -> &ContextTable {
        &self.contexts
    }

    /// Outcome of the most recent READBUF/WRITEBUF.
    pub fn last_transfer(&self) -> Option<&Transfer> {
        self.last_transfer.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Serve commands until `EXIT` or until the transport goes away.
    ///
    /// Both end the session cleanly. Any other fatal error is reported to
    /// the client when possible and returned. Open contexts are closed on
    /// every exit path.
    pub fn run<B: Backend + ?Sized>(&mut self, backend: &mut B) -> Result<()> {
        info!("IIOD[{}]: session started", self.id);
        let result = loop {
            match self.step(backend) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit) => break Ok(()),
                Err(ProtocolError::Disconnected) => {
                    info!("IIOD[{}]: peer disconnected", self.id);
                    break Ok(());
                }
                Err(e) => {
                    warn!("IIOD[{}]: session aborted: {}", self.id, e);
                    if !matches!(e, ProtocolError::Transport(_)) {
                        let mut out = ResponseWriter::new(&mut self.transport);
                        let _ = out.status(e.errno()).and_then(|()| out.flush());
                    }
                    break Err(e);
                }
            }
        };
        self.teardown(backend);
        result
    }

    /// Read, dispatch and answer one command line.
    pub fn step<B: Backend + ?Sized>(&mut self, backend: &mut B) -> Result<Flow> {
        if self.closed {
            return Err(ProtocolError::Disconnected);
        }
        let line = self.reader.read_line(&mut self.transport)?;
        let cmd = match command::parse_bytes(line) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!(
                    "IIOD[{}]: rejected '{}'",
                    self.id,
                    String::from_utf8_lossy(line)
                );
                let mut out = ResponseWriter::new(&mut self.transport);
                out.status(e.errno())?;
                out.flush()?;
                return Ok(Flow::Continue);
            }
        };
        if cmd == Command::Noop {
            return Ok(Flow::Continue);
        }
        let verb = cmd.verb();
        debug!("IIOD[{}]: {}", self.id, verb);

        let flow = match self.dispatch(cmd, backend) {
            Ok(flow) => flow,
            Err(e) if !e.is_fatal() => {
                warn!("IIOD[{}]: {} failed: {}", self.id, verb, e);
                ResponseWriter::new(&mut self.transport).status(e.errno())?;
                Flow::Continue
            }
            Err(e) => return Err(e),
        };
        if flow == Flow::Continue {
            ResponseWriter::new(&mut self.transport).flush()?;
        }
        Ok(flow)
    }

    /// Close every context still open. Safe to call more than once.
    pub fn teardown<B: Backend + ?Sized>(&mut self, backend: &mut B) {
        for ctx in self.contexts.drain() {
            match backend.close(self.id, &ctx.device) {
                Ok(()) => info!("IIOD[{}]: closed '{}' on teardown", self.id, ctx.device),
                Err(e) => warn!(
                    "IIOD[{}]: close '{}' on teardown failed: {}",
                    self.id, ctx.device, e
                ),
            }
        }
        self.closed = true;
    }

    fn dispatch<B: Backend + ?Sized>(&mut self, cmd: Command, backend: &mut B) -> Result<Flow> {
        let sid = self.id;
        match cmd {
            Command::Noop => {}
            Command::Version => {
                let line = format!("{}\n", self.config.version);
                ResponseWriter::new(&mut self.transport).raw(line.as_bytes())?;
            }
            Command::Print => {
                let text = backend.discovery_text(sid);
                ResponseWriter::new(&mut self.transport).text(&text)?;
            }
            Command::Read(target) => self.read_attr(&target, backend)?,
            Command::Write { target, len } => self.write_attr(&target, len, backend)?,
            Command::Open {
                device,
                samples,
                mask,
            } => {
                if self.contexts.contains(&device) {
                    return Err(Errno::EBUSY.into());
                }
                backend.open(sid, &device, samples, mask)?;
                info!(
                    "IIOD[{}]: open '{}' samples={} mask={:08x}",
                    sid, device, samples, mask
                );
                self.contexts.insert(SamplingContext {
                    device,
                    samples,
                    mask,
                });
                self.ok()?;
            }
            Command::Close { device } => {
                backend.close(sid, &device)?;
                info!("IIOD[{}]: close '{}'", sid, device);
                self.contexts.remove(&device);
                self.ok()?;
            }
            Command::ReadBuf { device, len } => self.stream(&device, len, backend, false)?,
            Command::WriteBuf { device, len } => self.stream(&device, len, backend, true)?,
            Command::Timeout { ms } => {
                backend.set_timeout(sid, ms).unwrap_or(Ok(()))?;
                self.ok()?;
            }
            Command::Exit => {
                info!("IIOD[{}]: EXIT", sid);
                return Ok(Flow::Exit);
            }
            Command::GetTrig => return Err(Errno::ENODEV.into()),
        }
        Ok(Flow::Continue)
    }

    fn ok(&mut self) -> Result<()> {
        ResponseWriter::new(&mut self.transport).value(0)
    }

    fn read_attr<B: Backend + ?Sized>(&mut self, target: &AttrTarget, backend: &mut B) -> Result<()> {
        let sid = self.id;
        let AttrTarget {
            device,
            scope,
            attr,
        } = target;
        let buf = self.attr_buf.as_mut_slice();
        let n = match scope {
            AttrScope::Device => backend.read_attr(sid, device, attr, buf, AttrKind::Device),
            AttrScope::Debug => backend.read_attr(sid, device, attr, buf, AttrKind::Debug),
            AttrScope::Buffer => backend.read_attr(sid, device, attr, buf, AttrKind::Buffer),
            AttrScope::Channel { name, output } => {
                backend.ch_read_attr(sid, device, name, *output, attr, buf)
            }
        }?;
        ResponseWriter::new(&mut self.transport)
            .attribute(&self.attr_buf[..n.min(self.attr_buf.len())])
    }

    fn write_attr<B: Backend + ?Sized>(
        &mut self,
        target: &AttrTarget,
        len: usize,
        backend: &mut B,
    ) -> Result<()> {
        let sid = self.id;
        if len > self.attr_buf.len() {
            warn!(
                "IIOD[{}]: WRITE payload of {} bytes exceeds {}",
                sid,
                len,
                self.attr_buf.len()
            );
            let dropped = discard(&mut self.transport, len, &mut self.attr_buf)
                .map_err(ProtocolError::transport)?;
            if dropped < len {
                return Err(ProtocolError::Disconnected);
            }
            return Err(Errno::EFBIG.into());
        }

        let got = read_full(&mut self.transport, &mut self.attr_buf[..len])
            .map_err(ProtocolError::transport)?;
        if got < len {
            return Err(ProtocolError::Disconnected);
        }

        let AttrTarget {
            device,
            scope,
            attr,
        } = target;
        let data = &self.attr_buf[..len];
        let n = match scope {
            AttrScope::Device => backend.write_attr(sid, device, attr, data, AttrKind::Device),
            AttrScope::Debug => backend.write_attr(sid, device, attr, data, AttrKind::Debug),
            AttrScope::Buffer => backend.write_attr(sid, device, attr, data, AttrKind::Buffer),
            AttrScope::Channel { name, output } => {
                backend.ch_write_attr(sid, device, name, *output, attr, data)
            }
        }?;
        ResponseWriter::new(&mut self.transport).count(n)
    }

    fn stream<B: Backend + ?Sized>(
        &mut self,
        device: &str,
        len: usize,
        backend: &mut B,
        to_device: bool,
    ) -> Result<()> {
        if !self.contexts.contains(device) {
            return Err(Errno::EBADF.into());
        }
        let result = if to_device {
            buffer::write_buffer(
                self.id,
                device,
                len,
                &mut self.chunk_buf,
                &mut self.transport,
                backend,
            )
        } else {
            buffer::read_buffer(
                self.id,
                device,
                len,
                &mut self.chunk_buf,
                &mut self.transport,
                backend,
            )
        };
        let transfer = result?;
        if transfer.state == TransferState::Failed {
            warn!(
                "IIOD[{}]: '{}' transfer failed after {} of {} bytes",
                self.id, device, transfer.done, transfer.total
            );
        }
        self.last_transfer = Some(transfer);
        Ok(())
    }
}
