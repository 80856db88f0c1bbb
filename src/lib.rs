//! webterm - attach the local terminal to a web-terminal session.
//!
//! This crate provides the reconnecting terminal transport that keeps the
//! local terminal synchronized with a remote pseudo-terminal hosted by a
//! web-terminal server.
//!
//! # Architecture
//!
//! ```text
//!   CrosstermSurface ──UserInput/Resized──►┐
//!                                          │
//!   ws reader task ───Transport*──────────►├──► ConnectionMachine::handle()
//!                                          │            │
//!   reconnect timer ──ReconnectTimerFired─►┘            ▼
//!                                                   Vec<Effect>
//!                                                       │
//!   Driver executes effects: send / write / clear / open / close / schedule
//!
//!   StatusPoller ──watch<SessionInfo>──► Driver ──► title + notices
//! ```
//!
//! # Modules
//!
//! - [`protocol`] - Wire envelope codec
//! - [`surface`] - Terminal surface abstraction and implementations
//! - [`connection`] - Connection state machine and its tokio driver
//! - [`status`] - Session status side channel and display formatting
//! - [`ws`] - Shared WebSocket transport
//! - [`config`] - Configuration loading

// Library modules
pub mod config;
pub mod connection;
pub mod constants;
pub mod env;
pub mod protocol;
pub mod status;
pub mod surface;
pub mod ws;

// Re-export commonly used types
pub use config::Config;
pub use connection::{AttachOutcome, ConnectionMachine, ConnectionState, ViewStatus};
pub use protocol::{Envelope, TerminalSize};
pub use status::{SessionInfo, StatusClient, StatusPoller};
pub use surface::TerminalSurface;
