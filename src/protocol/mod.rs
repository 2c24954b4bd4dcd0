//! Line-oriented device-control protocol.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       Protocol Stack                         │
//! │                                                              │
//! │  ┌───────────┐   ┌────────────┐   ┌───────────────────────┐  │
//! │  │ Transport │──▶│ LineReader │──▶│ command::parse        │  │
//! │  │ (trait)   │   │ (bounded)  │   └──────────┬────────────┘  │
//! │  └───────────┘   └────────────┘              ▼               │
//! │       ▲                          ┌───────────────────────┐   │
//! │       │                          │ Session (dispatcher)  │──▶ Backend
//! │       │                          │  + buffer streaming   │   │
//! │       │                          └──────────┬────────────┘   │
//! │  ┌────┴───────────┐                         │                │
//! │  │ ResponseWriter │◀────────────────────────┘                │
//! │  └────────────────┘                                          │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod buffer;
pub mod command;
pub mod engine;
pub mod line;
pub mod response;
pub mod session;
pub mod transport;

pub use engine::{Flow, Session};
pub use session::SessionId;
pub use transport::{IoTransport, MemoryTransport, Transport};
