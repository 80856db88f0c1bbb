//! Reconnecting terminal connection.
//!
//! This module owns the single live transport of a session view and hides
//! connection churn from the rest of the application.
//!
//! # Architecture
//!
//! ```text
//! ConnectionMachine (sans-IO)
//!     │  handle(ConnectionEvent) -> Vec<Effect>
//!     │
//!     ├── Backoff            min(base * 2^attempt, max), attempt ceiling
//!     │
//! Driver (tokio)
//!     ├── ws::connect        one transport per generation
//!     ├── reader task        frames → TransportMessage / TransportClosed
//!     ├── timer task         ReconnectTimerFired (aborted on teardown)
//!     └── TerminalSurface    write / clear / title / notices
//! ```
//!
//! The machine never performs I/O. Transport open/message/close/error and
//! timer expiry arrive as discrete [`ConnectionEvent`]s, which makes every
//! transition testable without a network.
//!
//! # States
//!
//! ```text
//! Connecting ──open──► Open ──lost──► Reconnecting ──timer──► Connecting
//!     │                 │                  │
//!     └──lost, ceiling reached──► Disconnected
//!                       │
//!   closed envelope / teardown (from any state) ──► Closed (absorbing)
//! ```

// Rust guideline compliant 2026-02

mod backoff;
pub mod driver;
mod machine;

pub use backoff::Backoff;
pub use driver::{run_attach, AttachOptions};
pub use machine::{ConnectionEvent, ConnectionMachine, Effect};

/// Connection state of one session view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// A transport open request is in flight.
    #[default]
    Connecting,
    /// The transport is live.
    Open,
    /// Waiting for the backoff timer before the next attempt.
    Reconnecting,
    /// Attempt ceiling exhausted; manual intervention required.
    Disconnected,
    /// Session ended remotely or view torn down locally. Absorbing.
    Closed,
}

impl ConnectionState {
    /// Returns `true` for states that no event can leave automatically.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Closed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Connectivity as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewStatus {
    /// First connection in progress.
    Connecting,
    /// Transport is live.
    Connected,
    /// Connection lost; retrying.
    Reconnecting {
        /// Attempt number being waited for or made (1-based).
        attempt: u32,
        /// Attempt ceiling.
        max_attempts: u32,
    },
    /// Gave up reconnecting; the user must re-run the command.
    Disconnected,
    /// The remote process ended.
    SessionEnded,
    /// The local view was torn down (detach or signal).
    Detached,
}

impl ViewStatus {
    /// Short label for titles and status lines.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Connecting => "connecting".to_string(),
            Self::Connected => "connected".to_string(),
            Self::Reconnecting {
                attempt,
                max_attempts,
            } => format!("reconnecting {attempt}/{max_attempts}"),
            Self::Disconnected => "disconnected".to_string(),
            Self::SessionEnded => "session ended".to_string(),
            Self::Detached => "detached".to_string(),
        }
    }
}

impl std::fmt::Display for ViewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

/// How an attach run finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// The remote process ended.
    SessionEnded,
    /// The user detached or the process was asked to stop.
    Detached,
    /// Reconnect attempts were exhausted.
    Disconnected,
}

impl AttachOutcome {
    /// Process exit code for this outcome.
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            Self::SessionEnded | Self::Detached => 0,
            Self::Disconnected => 1,
        }
    }
}

/// Errors raised by the transport layer.
///
/// Every variant routes into the reconnect path unless the view is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The WebSocket handshake failed.
    ConnectFailed(String),
    /// The handshake did not finish in time.
    ConnectTimeout,
    /// Writing a frame failed.
    SendFailed(String),
    /// Reading from the transport failed.
    ReadFailed(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectFailed(msg) => write!(f, "Connection failed: {msg}"),
            Self::ConnectTimeout => write!(f, "Connection timed out"),
            Self::SendFailed(msg) => write!(f, "Send failed: {msg}"),
            Self::ReadFailed(msg) => write!(f, "Read failed: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}
