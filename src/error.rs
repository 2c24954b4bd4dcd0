//! Unified error types for the protocol engine.
//!
//! Two families live here:
//!
//! - [`Errno`]: the negative status codes that travel on the wire. Backends
//!   produce them, the engine forwards them verbatim.
//! - [`ProtocolError`]: what the engine itself can fail with. Each variant is
//!   classified as either recoverable at command granularity (the session
//!   answers with an errno line and reads the next command) or fatal to the
//!   session (propagated to whoever owns the session loop).

use core::fmt;

// ---------------------------------------------------------------------------
// Wire status codes
// ---------------------------------------------------------------------------

/// A negative status code as written on the wire (`-22` for `EINVAL`).
///
/// The wrapped value is the raw code, sign included. Backends may return any
/// negative value (including the bare `-1` some drivers use as a generic
/// failure); the engine never reinterprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Errno(i32);

impl Errno {
    pub const ENOENT: Self = Self(-2);
    pub const EIO: Self = Self(-5);
    pub const EBADF: Self = Self(-9);
    pub const ENOMEM: Self = Self(-12);
    pub const EACCES: Self = Self(-13);
    pub const EBUSY: Self = Self(-16);
    pub const EEXIST: Self = Self(-17);
    pub const ENODEV: Self = Self(-19);
    pub const EINVAL: Self = Self(-22);
    pub const EFBIG: Self = Self(-27);

    /// Wrap a raw code. Non-negative input is folded to `-EIO` since a
    /// success value can never be an error.
    pub const fn from_code(code: i32) -> Self {
        if code < 0 { Self(code) } else { Self::EIO }
    }

    /// The raw (negative) code.
    pub const fn code(self) -> i32 {
        self.0
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match *self {
            Self::ENOENT => "ENOENT",
            Self::EIO => "EIO",
            Self::EBADF => "EBADF",
            Self::ENOMEM => "ENOMEM",
            Self::EACCES => "EACCES",
            Self::EBUSY => "EBUSY",
            Self::EEXIST => "EEXIST",
            Self::ENODEV => "ENODEV",
            Self::EINVAL => "EINVAL",
            Self::EFBIG => "EFBIG",
            _ => return write!(f, "error {}", self.0),
        };
        write!(f, "{name} ({})", self.0)
    }
}

impl core::error::Error for Errno {}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

/// Every fallible engine operation funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Bad grammar, wrong operand count or malformed number.
    InvalidCommand,
    /// The backend rejected the request.
    Backend(Errno),
    /// A command line grew past the configured maximum without a terminator.
    LineTooLong { max: usize },
    /// The transport returned a zero-length read.
    Disconnected,
    /// The transport reported an error.
    Transport(String),
    /// A declared buffer transfer could not be completed.
    IncompleteTransfer { expected: usize, transferred: usize },
}

impl ProtocolError {
    /// Wrap a transport-level error value.
    pub fn transport(err: impl fmt::Debug) -> Self {
        Self::Transport(format!("{err:?}"))
    }

    /// Whether the session must be torn down after this error.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::InvalidCommand | Self::Backend(_) => false,
            Self::LineTooLong { .. }
            | Self::Disconnected
            | Self::Transport(_)
            | Self::IncompleteTransfer { .. } => true,
        }
    }

    /// The status code that represents this error on the wire.
    pub fn errno(&self) -> Errno {
        match self {
            Self::InvalidCommand => Errno::EINVAL,
            Self::Backend(e) => *e,
            Self::LineTooLong { .. }
            | Self::Disconnected
            | Self::Transport(_)
            | Self::IncompleteTransfer { .. } => Errno::EIO,
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCommand => write!(f, "invalid command"),
            Self::Backend(e) => write!(f, "backend: {e}"),
            Self::LineTooLong { max } => write!(f, "command line exceeds {max} bytes"),
            Self::Disconnected => write!(f, "transport disconnected"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::IncompleteTransfer {
                expected,
                transferred,
            } => write!(
                f,
                "incomplete transfer: {transferred} of {expected} bytes"
            ),
        }
    }
}

impl core::error::Error for ProtocolError {}

impl From<Errno> for ProtocolError {
    fn from(e: Errno) -> Self {
        Self::Backend(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Engine-wide `Result` alias.
pub type Result<T> = core::result::Result<T, ProtocolError>;
