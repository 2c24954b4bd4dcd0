//! iiod-lite: a small IIO device-control protocol engine.
//!
//! The engine reads line commands from any byte transport and drives an
//! abstract [`Backend`]. The crate ships an in-memory
//! [`DeviceRegistry`] backend and a threaded TCP [`Server`].

#![deny(unused_must_use)]

pub mod backend;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;

pub use backend::{Backend, BackendResult, DeviceRegistry, SharedBackend};
pub use config::{DaemonConfig, EngineConfig};
pub use error::{Errno, ProtocolError};
pub use protocol::{Session, SessionId};
pub use server::Server;
