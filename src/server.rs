//! TCP daemon. One thread per client, one shared backend.
//!
//! ```text
//!  accept loop ──▶ SessionTable::attach ──▶ thread "iiod-<sid>"
//!                                             Session<IoTransport<TcpStream>>
//!                                                  │
//!                                                  ▼
//!                                          SharedBackend<B> (mutex)
//! ```
//!
//! A client that arrives while every session slot is taken gets a single
//! `-EBUSY` line and is disconnected.

use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::{error, info, warn};
use parking_lot::Mutex;

use crate::backend::{Backend, SharedBackend};
use crate::config::{DaemonConfig, EngineConfig};
use crate::error::Errno;
use crate::protocol::session::{SessionId, SessionTable};
use crate::protocol::{IoTransport, Session};

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const ACCEPT_BACKOFF: Duration = Duration::from_millis(200);

/// Stops a running [`Server::serve`] loop from another thread.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Server<B> {
    listener: TcpListener,
    backend: SharedBackend<B>,
    sessions: Arc<Mutex<SessionTable>>,
    engine: EngineConfig,
    running: Arc<AtomicBool>,
}

impl<B: Backend + Send + 'static> Server<B> {
    /// Bind the listening socket described by `config`.
    pub fn bind(config: &DaemonConfig, backend: SharedBackend<B>) -> io::Result<Self> {
        let listener = TcpListener::bind(config.listen_addr.as_str())?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            backend,
            sessions: Arc::new(Mutex::new(SessionTable::new(config.max_sessions))),
            engine: config.engine.clone(),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.running.clone())
    }

    /// Number of clients currently being served.
    pub fn active_sessions(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Accept clients until [`ShutdownHandle::shutdown`] is called.
    ///
    /// Sessions already running are left to finish on their own threads.
    pub fn serve(&self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("IIOD: listening on {}", addr);
        }
        while self.running.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, addr)) => self.spawn_session(stream, addr),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(e) => {
                    error!("IIOD: accept error: {}", e);
                    thread::sleep(ACCEPT_BACKOFF);
                }
            }
        }
        info!("IIOD: accept loop stopped");
    }

    fn spawn_session(&self, mut stream: TcpStream, addr: SocketAddr) {
        let Some(sid) = self.sessions.lock().attach() else {
            warn!("IIOD: rejecting {}: all session slots busy", addr);
            let line = format!("{}\n", Errno::EBUSY.code());
            let _ = stream.write_all(line.as_bytes());
            return;
        };
        info!(
            "IIOD[{}]: client {} attached ({} active)",
            sid,
            addr,
            self.active_sessions()
        );

        let backend = self.backend.clone();
        let sessions = self.sessions.clone();
        let config = self.engine.clone();
        let spawned = thread::Builder::new()
            .name(format!("iiod-{sid}"))
            .spawn(move || serve_client(sid, stream, backend, config, &sessions));
        if let Err(e) = spawned {
            error!("IIOD[{}]: failed to spawn session thread: {}", sid, e);
            self.sessions.lock().detach(sid);
        }
    }
}

/// Releases a session slot when dropped, including during unwinding.
struct SlotGuard<'a> {
    sid: SessionId,
    sessions: &'a Mutex<SessionTable>,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.sessions.lock().detach(self.sid);
        info!("IIOD[{}]: client detached", self.sid);
    }
}

fn serve_client<B: Backend>(
    sid: SessionId,
    stream: TcpStream,
    mut backend: SharedBackend<B>,
    config: EngineConfig,
    sessions: &Mutex<SessionTable>,
) {
    // Accepted sockets may inherit the listener's non-blocking flag.
    if let Err(e) = stream.set_nonblocking(false) {
        warn!("IIOD[{}]: cannot make socket blocking: {}", sid, e);
    }
    if let Err(e) = stream.set_nodelay(true) {
        warn!("IIOD[{}]: failed to set TCP_NODELAY: {}", sid, e);
    }

    let mut session = Session::new(sid, IoTransport::new(stream), config);
    // Dropped before the session, so the slot is free once the socket closes.
    let _slot = SlotGuard { sid, sessions };
    if let Err(e) = session.run(&mut backend) {
        warn!("IIOD[{}]: session ended with error: {}", sid, e);
    }
}
