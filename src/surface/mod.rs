//! Terminal surface abstraction.
//!
//! A [`TerminalSurface`] is whatever renders remote output and produces user
//! keystrokes and size changes. The connection driver only talks to this
//! trait, so the local terminal ([`CrosstermSurface`]) and the in-memory
//! surface used in tests ([`MemorySurface`]) are interchangeable.
//!
//! # Listener contract
//!
//! `on_data` and `on_resize` are single-slot registrations: registering again
//! replaces the previous listener, so listeners are wired once per view and
//! never duplicated across reconnects.

// Rust guideline compliant 2026-02

mod memory;
mod terminal;

pub use memory::{MemorySurface, SurfaceEvent};
pub use terminal::CrosstermSurface;

use crate::connection::ViewStatus;
use crate::protocol::TerminalSize;

/// Listener for chunks of user-typed bytes.
pub type DataCallback = Box<dyn FnMut(&[u8]) + Send>;

/// Listener for measured grid size changes.
pub type ResizeCallback = Box<dyn FnMut(TerminalSize) + Send>;

/// Renderable terminal used by a session view.
pub trait TerminalSurface {
    /// Take over the display and start observing size changes.
    ///
    /// The initial fit is reported to the resize listener.
    fn attach(&mut self) -> anyhow::Result<()>;

    /// Append output bytes. No-op before [`attach`](Self::attach).
    fn write(&mut self, bytes: &[u8]);

    /// Clear the display before scrollback is retransmitted.
    fn clear(&mut self);

    /// Replace the user input listener.
    fn on_data(&mut self, callback: DataCallback);

    /// Replace the resize listener.
    ///
    /// When already attached, the current size is reported immediately.
    fn on_resize(&mut self, callback: ResizeCallback);

    /// Set the window title.
    fn set_title(&mut self, title: &str);

    /// Show a connectivity change to the user.
    fn notify(&mut self, status: &ViewStatus);

    /// Show the one-line session summary (name, age, liveness and view
    /// connectivity). Called when the session record or the view status
    /// changes.
    fn show_status(&mut self, line: &str);

    /// Release the display and stop observation. Idempotent.
    fn dispose(&mut self);
}
