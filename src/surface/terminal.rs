//! Local terminal surface backed by crossterm.
//!
//! `attach` puts the terminal in raw mode on the alternate screen, reads
//! stdin on a helper thread and watches SIGWINCH on another. Helper threads
//! only invoke the registered listeners; they never touch connection state.
//!
//! The remote program owns the screen, so the session status line goes to
//! the window title. Once a status line is known it replaces the short
//! title.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use crossterm::{
    cursor, execute, queue,
    style::{Attribute, Print, SetAttribute},
    terminal::{
        self, disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
    },
};

use super::{DataCallback, ResizeCallback, TerminalSurface};
use crate::connection::ViewStatus;
use crate::constants;
use crate::protocol::TerminalSize;

type Slot<T> = Arc<Mutex<Option<T>>>;

fn lock<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Restores the terminal on drop, including on panic.
struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(std::io::stdout(), LeaveAlternateScreen, cursor::Show);
    }
}

/// Measure the local terminal, falling back to 80x24.
fn measure() -> TerminalSize {
    match terminal::size() {
        Ok((cols, rows)) if cols > 0 && rows > 0 => TerminalSize::new(cols, rows),
        _ => {
            let (cols, rows) = constants::FALLBACK_TERMINAL_SIZE;
            TerminalSize::new(cols, rows)
        }
    }
}

/// Notice printed into the terminal stream for `status`, if any.
fn notice_text(status: &ViewStatus) -> Option<String> {
    match status {
        ViewStatus::Reconnecting { .. } => Some(status.label()),
        ViewStatus::Disconnected => Some(format!(
            "{}; run the command again to reattach",
            status.label()
        )),
        ViewStatus::SessionEnded => Some("session ended".to_string()),
        ViewStatus::Connecting | ViewStatus::Connected | ViewStatus::Detached => None,
    }
}

/// Print a highlighted notice line into the terminal stream.
fn print_notice(text: &str) {
    let mut stdout = std::io::stdout();
    let result = queue!(
        stdout,
        Print("\r\n"),
        SetAttribute(Attribute::Reverse),
        Print(format!(" webterm: {text} ")),
        SetAttribute(Attribute::Reset),
        Print("\r\n"),
    )
    .and_then(|()| stdout.flush());
    if let Err(e) = result {
        log::debug!("[Surface] Failed to print notice: {e}");
    }
}

fn write_title(title: &str) {
    if let Err(e) = execute!(std::io::stdout(), terminal::SetTitle(title)) {
        log::debug!("[Surface] Failed to set title: {e}");
    }
}

/// Surface that renders into the process's own terminal.
pub struct CrosstermSurface {
    guard: Option<TerminalGuard>,
    disposed: bool,
    stopping: Arc<AtomicBool>,
    data: Slot<DataCallback>,
    resize: Slot<ResizeCallback>,
    size: Arc<Mutex<Option<TerminalSize>>>,
    status_line: Option<String>,
    #[cfg(unix)]
    winch: Option<(signal_hook::iterator::Handle, JoinHandle<()>)>,
    stdin_thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for CrosstermSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrosstermSurface")
            .field("attached", &self.guard.is_some())
            .field("disposed", &self.disposed)
            .field("size", &*lock(&self.size))
            .finish_non_exhaustive()
    }
}

impl Default for CrosstermSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl CrosstermSurface {
    /// Create a detached surface. Nothing touches the terminal until
    /// [`attach`](TerminalSurface::attach).
    #[must_use]
    pub fn new() -> Self {
        Self {
            guard: None,
            disposed: false,
            stopping: Arc::new(AtomicBool::new(false)),
            data: Arc::new(Mutex::new(None)),
            resize: Arc::new(Mutex::new(None)),
            size: Arc::new(Mutex::new(None)),
            status_line: None,
            #[cfg(unix)]
            winch: None,
            stdin_thread: None,
        }
    }

    fn is_attached(&self) -> bool {
        self.guard.is_some()
    }

    fn spawn_stdin_reader(&mut self) -> Result<()> {
        let data = Arc::clone(&self.data);
        let stopping = Arc::clone(&self.stopping);
        let handle = std::thread::Builder::new()
            .name("webterm-stdin".to_string())
            .spawn(move || {
                let mut stdin = std::io::stdin().lock();
                let mut buf = [0u8; constants::STDIN_READ_BUFFER];
                loop {
                    let n = match stdin.read(&mut buf) {
                        Ok(0) => break,
                        Ok(n) => n,
                        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            log::warn!("[Surface] stdin read failed: {e}");
                            break;
                        }
                    };
                    if stopping.load(Ordering::Relaxed) {
                        break;
                    }
                    if let Some(callback) = lock(&data).as_mut() {
                        callback(&buf[..n]);
                    }
                }
                log::debug!("[Surface] stdin reader exiting");
            })
            .context("failed to spawn stdin reader")?;
        self.stdin_thread = Some(handle);
        Ok(())
    }

    #[cfg(unix)]
    fn spawn_winch_watcher(&mut self) -> Result<()> {
        use signal_hook::consts::signal::SIGWINCH;
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGWINCH]).context("failed to watch SIGWINCH")?;
        let handle = signals.handle();
        let resize = Arc::clone(&self.resize);
        let size = Arc::clone(&self.size);

        let thread = std::thread::Builder::new()
            .name("webterm-winch".to_string())
            .spawn(move || {
                for _ in signals.forever() {
                    let measured = measure();
                    let changed = lock(&size).replace(measured) != Some(measured);
                    if changed {
                        log::debug!("[Surface] Resized to {measured}");
                        if let Some(callback) = lock(&resize).as_mut() {
                            callback(measured);
                        }
                    }
                }
            })
            .context("failed to spawn SIGWINCH watcher")?;
        self.winch = Some((handle, thread));
        Ok(())
    }
}

impl TerminalSurface for CrosstermSurface {
    fn attach(&mut self) -> Result<()> {
        if self.is_attached() || self.disposed {
            return Ok(());
        }

        let initial = measure();
        enable_raw_mode().context("failed to enable raw mode")?;
        let guard = TerminalGuard;
        execute!(std::io::stdout(), EnterAlternateScreen)
            .context("failed to enter alternate screen")?;
        self.guard = Some(guard);

        *lock(&self.size) = Some(initial);
        if let Some(callback) = lock(&self.resize).as_mut() {
            callback(initial);
        }

        #[cfg(unix)]
        self.spawn_winch_watcher()?;
        self.spawn_stdin_reader()?;

        log::info!("[Surface] Attached at {initial}");
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) {
        if !self.is_attached() {
            return;
        }
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = stdout.write_all(bytes).and_then(|()| stdout.flush()) {
            log::warn!("[Surface] Failed to write output: {e}");
        }
    }

    fn clear(&mut self) {
        if !self.is_attached() {
            return;
        }
        let result = execute!(
            std::io::stdout(),
            terminal::Clear(terminal::ClearType::All),
            terminal::Clear(terminal::ClearType::Purge),
            cursor::MoveTo(0, 0),
        );
        if let Err(e) = result {
            log::warn!("[Surface] Failed to clear: {e}");
        }
    }

    fn on_data(&mut self, callback: DataCallback) {
        *lock(&self.data) = Some(callback);
    }

    fn on_resize(&mut self, mut callback: ResizeCallback) {
        if self.is_attached() {
            if let Some(size) = *lock(&self.size) {
                callback(size);
            }
        }
        *lock(&self.resize) = Some(callback);
    }

    fn set_title(&mut self, title: &str) {
        if self.status_line.is_none() {
            write_title(title);
        }
    }

    fn notify(&mut self, status: &ViewStatus) {
        if !self.is_attached() {
            return;
        }
        if let Some(text) = notice_text(status) {
            print_notice(&text);
        }
    }

    fn show_status(&mut self, line: &str) {
        log::debug!("[Surface] Status: {line}");
        write_title(line);
        self.status_line = Some(line.to_string());
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.stopping.store(true, Ordering::Relaxed);
        lock(&self.data).take();
        lock(&self.resize).take();

        #[cfg(unix)]
        if let Some((handle, thread)) = self.winch.take() {
            handle.close();
            let _ = thread.join();
        }

        // The stdin thread stays blocked in read() until the next keystroke
        // or EOF; it exits on its own once it sees the stop flag.
        self.stdin_thread.take();
        self.guard.take();
        log::debug!("[Surface] Disposed");
    }
}

impl Drop for CrosstermSurface {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispose_without_attach_is_safe() {
        let mut surface = CrosstermSurface::new();
        surface.dispose();
        surface.dispose();
        assert!(!surface.is_attached());
    }

    #[test]
    fn test_write_before_attach_is_noop() {
        let mut surface = CrosstermSurface::new();
        surface.write(b"ignored");
        surface.clear();
        surface.notify(&ViewStatus::Disconnected);
    }

    #[test]
    fn test_disconnected_notice_tells_how_to_reattach() {
        assert_eq!(
            notice_text(&ViewStatus::Disconnected).as_deref(),
            Some("disconnected; run the command again to reattach")
        );
        assert_eq!(
            notice_text(&ViewStatus::Reconnecting {
                attempt: 2,
                max_attempts: 10
            })
            .as_deref(),
            Some("reconnecting 2/10")
        );
        assert_eq!(notice_text(&ViewStatus::Connected), None);
    }

    #[test]
    fn test_measure_never_returns_zero() {
        assert!(measure().is_measured());
    }
}
