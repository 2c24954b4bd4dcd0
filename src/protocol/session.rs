//! Session identity and per-session bookkeeping.
//!
//! A session is one client's command stream. When a single transport
//! implies a single client the id is [`SessionId::SINGLE`]; a daemon that
//! multiplexes several transports over one backend allocates ids from a
//! [`SessionTable`] so backend calls can be told apart.

use core::fmt;

/// Opaque identifier of one client's command stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u32);

impl SessionId {
    /// Id used when one engine serves exactly one transport.
    pub const SINGLE: Self = Self(0);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Session table for multi-client support ───────────────────

/// Bounded table of registered sessions.
///
/// Ids are handed out in increasing order and skip any id still
/// registered, so an id is never shared by two live clients.
pub struct SessionTable {
    active: Vec<SessionId>,
    capacity: usize,
    next: u32,
}

impl SessionTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            active: Vec::with_capacity(capacity),
            capacity,
            next: 1,
        }
    }

    /// Register a new session. `None` when the table is full.
    pub fn attach(&mut self) -> Option<SessionId> {
        if self.active.len() >= self.capacity {
            return None;
        }
        loop {
            let id = SessionId(self.next);
            self.next = self.next.wrapping_add(1).max(1);
            if !self.active.contains(&id) {
                self.active.push(id);
                return Some(id);
            }
        }
    }

    /// Release a session. Returns `false` if it was not registered.
    pub fn detach(&mut self, id: SessionId) -> bool {
        match self.active.iter().position(|s| *s == id) {
            Some(idx) => {
                self.active.swap_remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, id: SessionId) -> bool {
        self.active.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ── Sampling contexts ────────────────────────────────────────

/// A sampling context opened by this session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplingContext {
    pub device: String,
    pub samples: usize,
    pub mask: u32,
}

/// Sampling contexts currently open in one session, at most one per device.
#[derive(Debug, Default)]
pub struct ContextTable {
    open: Vec<SamplingContext>,
}

impl ContextTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, device: &str) -> bool {
        self.open.iter().any(|c| c.device == device)
    }

    /// Record a context. Returns `false` if `device` already has one.
    pub fn insert(&mut self, ctx: SamplingContext) -> bool {
        if self.contains(&ctx.device) {
            return false;
        }
        self.open.push(ctx);
        true
    }

    pub fn remove(&mut self, device: &str) -> Option<SamplingContext> {
        let idx = self.open.iter().position(|c| c.device == device)?;
        Some(self.open.remove(idx))
    }

    /// Remove and return every context.
    pub fn drain(&mut self) -> Vec<SamplingContext> {
        core::mem::take(&mut self.open)
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}
