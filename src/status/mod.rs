//! Session status side channel.
//!
//! The status poller periodically asks the server for the session list and
//! republishes the record for the attached session. It never touches the
//! connection: a deleted session or a failed poll simply means "no update
//! this tick".
//!
//! - [`client`] - HTTP client for `GET /api/sessions`
//! - [`poller`] - Interval task publishing on a `watch` channel
//! - [`display`] - Relative timestamps, titles and status lines

// Rust guideline compliant 2026-02

pub mod client;
pub mod display;
pub mod poller;

pub use client::{PollError, SessionInfo, StatusClient};
pub use poller::StatusPoller;
