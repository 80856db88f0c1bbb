//! In-memory terminal surface.
//!
//! Records everything the driver does to it and lets callers inject user
//! input and size changes. Clones share state, so a test can keep one handle
//! while the driver owns another.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{DataCallback, ResizeCallback, TerminalSurface};
use crate::connection::ViewStatus;
use crate::protocol::TerminalSize;

/// Something the driver did to the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// Output bytes written.
    Write(Vec<u8>),
    /// Display cleared.
    Clear,
    /// Title changed.
    Title(String),
    /// Status notice shown.
    Notice(ViewStatus),
    /// Session status line shown.
    StatusLine(String),
}

#[derive(Default)]
struct MemoryState {
    attached: bool,
    disposed: bool,
    size: Option<TerminalSize>,
    events: Vec<SurfaceEvent>,
    data: Option<DataCallback>,
    resize: Option<ResizeCallback>,
}

/// Surface that keeps output in memory.
#[derive(Clone, Default)]
pub struct MemorySurface {
    state: Arc<Mutex<MemoryState>>,
}

impl std::fmt::Debug for MemorySurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MemorySurface")
            .field("attached", &state.attached)
            .field("disposed", &state.disposed)
            .field("size", &state.size)
            .field("events", &state.events.len())
            .finish_non_exhaustive()
    }
}

impl MemorySurface {
    /// Create an unmeasured surface.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a surface whose initial fit is `cols` x `rows`.
    #[must_use]
    pub fn with_size(cols: u16, rows: u16) -> Self {
        let surface = Self::default();
        surface.lock().size = Some(TerminalSize::new(cols, rows));
        surface
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Everything recorded so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<SurfaceEvent> {
        self.lock().events.clone()
    }

    /// Concatenation of all output written.
    #[must_use]
    pub fn written(&self) -> Vec<u8> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                SurfaceEvent::Write(bytes) => Some(bytes.as_slice()),
                _ => None,
            })
            .flatten()
            .copied()
            .collect()
    }

    /// Number of clear actions.
    #[must_use]
    pub fn clear_count(&self) -> usize {
        self.lock()
            .events
            .iter()
            .filter(|e| matches!(e, SurfaceEvent::Clear))
            .count()
    }

    /// Most recent title.
    #[must_use]
    pub fn title(&self) -> Option<String> {
        self.lock().events.iter().rev().find_map(|e| match e {
            SurfaceEvent::Title(title) => Some(title.clone()),
            _ => None,
        })
    }

    /// Most recent session status line.
    #[must_use]
    pub fn status_line(&self) -> Option<String> {
        self.lock().events.iter().rev().find_map(|e| match e {
            SurfaceEvent::StatusLine(line) => Some(line.clone()),
            _ => None,
        })
    }

    /// Whether `attach` ran.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.lock().attached
    }

    /// Whether `dispose` ran.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    /// Simulate the user typing `bytes`. Returns `false` without a listener.
    pub fn emit_data(&self, bytes: &[u8]) -> bool {
        let mut state = self.lock();
        match state.data.as_mut() {
            Some(callback) => {
                callback(bytes);
                true
            }
            None => false,
        }
    }

    /// Simulate the display being resized to `size`.
    pub fn emit_resize(&self, size: TerminalSize) -> bool {
        let mut state = self.lock();
        state.size = Some(size);
        match state.resize.as_mut() {
            Some(callback) => {
                callback(size);
                true
            }
            None => false,
        }
    }
}

impl TerminalSurface for MemorySurface {
    fn attach(&mut self) -> anyhow::Result<()> {
        let mut state = self.lock();
        if state.attached || state.disposed {
            return Ok(());
        }
        state.attached = true;
        if let Some(size) = state.size {
            if let Some(callback) = state.resize.as_mut() {
                callback(size);
            }
        }
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) {
        let mut state = self.lock();
        if state.attached && !state.disposed {
            state.events.push(SurfaceEvent::Write(bytes.to_vec()));
        }
    }

    fn clear(&mut self) {
        let mut state = self.lock();
        if state.attached && !state.disposed {
            state.events.push(SurfaceEvent::Clear);
        }
    }

    fn on_data(&mut self, callback: DataCallback) {
        self.lock().data = Some(callback);
    }

    fn on_resize(&mut self, mut callback: ResizeCallback) {
        let mut state = self.lock();
        if state.attached {
            if let Some(size) = state.size {
                callback(size);
            }
        }
        state.resize = Some(callback);
    }

    fn set_title(&mut self, title: &str) {
        self.lock().events.push(SurfaceEvent::Title(title.to_string()));
    }

    fn notify(&mut self, status: &ViewStatus) {
        self.lock().events.push(SurfaceEvent::Notice(*status));
    }

    fn show_status(&mut self, line: &str) {
        self.lock()
            .events
            .push(SurfaceEvent::StatusLine(line.to_string()));
    }

    fn dispose(&mut self) {
        let mut state = self.lock();
        state.disposed = true;
        state.attached = false;
        state.data = None;
        state.resize = None;
    }
}
