//! Application-wide constants for webterm.
//!
//! This module centralizes all magic numbers and configuration defaults
//! to improve maintainability and discoverability. Constants are grouped
//! by domain with documentation explaining their purpose.
//!
//! # Categories
//!
//! - **Timeouts**: Network and operation timeouts
//! - **Reconnect**: Backoff defaults for the connection state machine
//! - **Polling**: Status side channel interval
//! - **Terminal**: Keys and escape sequences used by the surface

use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// HTTP client request timeout for the status side channel.
///
/// A poll that takes longer than the poll interval is worthless, so this
/// stays below [`STATUS_POLL_INTERVAL`].
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(4);

/// Upper bound on a single WebSocket handshake.
///
/// A handshake that hangs is treated as a transport failure and routed into
/// the reconnect path like any other failed open.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a close handshake may take before the socket is just dropped.
pub const TRANSPORT_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

// ============================================================================
// Reconnect
// ============================================================================

/// Delay before the first reconnect attempt.
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Ceiling for the exponential reconnect delay.
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Consecutive failed reconnect attempts before giving up.
pub const RECONNECT_MAX_ATTEMPTS: u32 = 10;

// ============================================================================
// Polling
// ============================================================================

/// How often the status poller refreshes session metadata.
pub const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(5);

// ============================================================================
// Terminal
// ============================================================================

/// Detach key: Ctrl+] (ASCII 0x1d), same as telnet / docker attach.
pub const DETACH_KEY: u8 = 0x1d;

/// Size assumed when the local terminal cannot be measured.
pub const FALLBACK_TERMINAL_SIZE: (u16, u16) = (80, 24);

/// Read buffer size for the stdin reader thread.
pub const STDIN_READ_BUFFER: usize = 4096;
