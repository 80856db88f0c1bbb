//! Sans-IO connection state machine.
//!
//! [`ConnectionMachine`] is the single writer of connection state, the
//! reconnect attempt counter and the last measured terminal size. The driver
//! feeds it [`ConnectionEvent`]s in delivery order and performs the returned
//! [`Effect`]s in order.

// Rust guideline compliant 2026-02

use std::time::Duration;

use super::{AttachOutcome, Backoff, ConnectionState, TransportError, ViewStatus};
use crate::protocol::{self, Envelope, TerminalSize, WireTag};

/// Input to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Begin the first connection.
    Start,
    /// Transport `generation` finished its handshake.
    TransportOpened {
        /// Transport generation.
        generation: u64,
    },
    /// Text frame received on transport `generation`.
    TransportMessage {
        /// Transport generation.
        generation: u64,
        /// Raw frame text.
        text: String,
    },
    /// Transport `generation` closed.
    TransportClosed {
        /// Transport generation.
        generation: u64,
        /// WebSocket close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// Transport `generation` failed to open, send or read.
    TransportError {
        /// Transport generation.
        generation: u64,
        /// What went wrong.
        error: TransportError,
    },
    /// Reconnect timer `token` expired.
    ReconnectTimerFired {
        /// Token issued with [`Effect::ScheduleReconnect`].
        token: u64,
    },
    /// User typed bytes into the surface.
    UserInput(Vec<u8>),
    /// Text pasted into the view as one input frame.
    Paste(String),
    /// Surface measured a new grid size.
    Resized(TerminalSize),
    /// Local deliberate teardown (detach or signal).
    Teardown,
}

/// Instruction for the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Open a new transport tagged with `generation`.
    OpenTransport {
        /// Generation of the new transport.
        generation: u64,
    },
    /// Close transport `generation` if it is still held.
    CloseTransport {
        /// Generation to close.
        generation: u64,
    },
    /// Send a text frame on transport `generation`.
    Send {
        /// Generation to send on.
        generation: u64,
        /// Encoded envelope.
        frame: String,
    },
    /// Write output bytes to the surface.
    WriteSurface(Vec<u8>),
    /// Clear the surface before scrollback is retransmitted.
    ClearSurface,
    /// Fire [`ConnectionEvent::ReconnectTimerFired`] with `token` after `delay`.
    ScheduleReconnect {
        /// Timer token.
        token: u64,
        /// Delay before the next attempt.
        delay: Duration,
    },
    /// Cancel the pending reconnect timer.
    CancelReconnect,
    /// Publish a new visible status.
    Status(ViewStatus),
}

/// Connection state machine for one session view.
#[derive(Debug)]
pub struct ConnectionMachine {
    state: ConnectionState,
    backoff: Backoff,
    wire_tag: WireTag,
    started: bool,
    attempts: u32,
    generation: u64,
    has_connected: bool,
    last_size: Option<TerminalSize>,
    deliberate_close: bool,
    session_ended: bool,
    next_token: u64,
    pending_timer: Option<u64>,
}

impl ConnectionMachine {
    /// Create a machine in [`ConnectionState::Connecting`] that has not yet
    /// issued its first open.
    #[must_use]
    pub fn new(backoff: Backoff, wire_tag: WireTag) -> Self {
        Self {
            state: ConnectionState::Connecting,
            backoff,
            wire_tag,
            started: false,
            attempts: 0,
            generation: 0,
            has_connected: false,
            last_size: None,
            deliberate_close: false,
            session_ended: false,
            next_token: 0,
            pending_timer: None,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failed attempts since the last successful open.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Generation of the current (or last) transport.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Last measured terminal size, if any.
    #[must_use]
    pub fn last_size(&self) -> Option<TerminalSize> {
        self.last_size
    }

    /// Whether the view was torn down locally.
    #[must_use]
    pub fn is_deliberate_close(&self) -> bool {
        self.deliberate_close
    }

    /// Whether a reconnect timer is pending.
    #[must_use]
    pub fn has_pending_timer(&self) -> bool {
        self.pending_timer.is_some()
    }

    /// How the run finished, once the machine reached a terminal state.
    #[must_use]
    pub fn outcome(&self) -> Option<AttachOutcome> {
        if !self.state.is_terminal() {
            return None;
        }
        Some(match self.state {
            ConnectionState::Disconnected => AttachOutcome::Disconnected,
            _ if self.session_ended => AttachOutcome::SessionEnded,
            _ => AttachOutcome::Detached,
        })
    }

    /// Process one event and return the effects to perform, in order.
    pub fn handle(&mut self, event: ConnectionEvent) -> Vec<Effect> {
        match event {
            ConnectionEvent::Start => self.on_start(),
            ConnectionEvent::TransportOpened { generation } => self.on_opened(generation),
            ConnectionEvent::TransportMessage { generation, text } => {
                self.on_message(generation, &text)
            }
            ConnectionEvent::TransportClosed {
                generation,
                code,
                reason,
            } => {
                if self.is_live(generation) {
                    log::info!("[Connection] Transport closed (code={code}, reason={reason:?})");
                }
                self.on_lost(generation)
            }
            ConnectionEvent::TransportError { generation, error } => {
                if self.is_live(generation) {
                    log::warn!("[Connection] Transport error: {error}");
                }
                self.on_lost(generation)
            }
            ConnectionEvent::ReconnectTimerFired { token } => self.on_timer(token),
            ConnectionEvent::UserInput(bytes) => self.on_input(Envelope::Input(bytes)),
            ConnectionEvent::Paste(text) => self.on_input(Envelope::input_text(&text)),
            ConnectionEvent::Resized(size) => self.on_resize(size),
            ConnectionEvent::Teardown => self.on_teardown(),
        }
    }

    fn is_live(&self, generation: u64) -> bool {
        generation == self.generation
            && matches!(
                self.state,
                ConnectionState::Connecting | ConnectionState::Open
            )
            && !self.deliberate_close
    }

    fn on_start(&mut self) -> Vec<Effect> {
        if self.started || self.state != ConnectionState::Connecting {
            return Vec::new();
        }
        self.started = true;
        self.generation += 1;
        log::info!("[Connection] Connecting (generation {})", self.generation);
        vec![
            Effect::Status(ViewStatus::Connecting),
            Effect::OpenTransport {
                generation: self.generation,
            },
        ]
    }

    fn on_opened(&mut self, generation: u64) -> Vec<Effect> {
        if generation != self.generation || self.state != ConnectionState::Connecting {
            log::debug!("[Connection] Closing stale transport (generation {generation})");
            return vec![Effect::CloseTransport { generation }];
        }

        self.state = ConnectionState::Open;
        self.attempts = 0;

        let mut effects = vec![Effect::Status(ViewStatus::Connected)];
        if self.has_connected {
            log::info!("[Connection] Reconnected (generation {generation})");
            effects.push(Effect::ClearSurface);
        } else {
            log::info!("[Connection] Connected (generation {generation})");
        }
        self.has_connected = true;

        if let Some(size) = self.last_size {
            effects.push(self.send(&Envelope::Resize(size)));
        }
        effects
    }

    fn on_message(&mut self, generation: u64, text: &str) -> Vec<Effect> {
        if generation != self.generation || self.state != ConnectionState::Open {
            return Vec::new();
        }

        match protocol::decode(text) {
            Ok(Envelope::Output(bytes)) => vec![Effect::WriteSurface(bytes)],
            Ok(Envelope::Closed) => {
                log::info!("[Connection] Session ended by server");
                self.session_ended = true;
                self.state = ConnectionState::Closed;
                let mut effects = self.cancel_timer();
                effects.push(Effect::CloseTransport { generation });
                effects.push(Effect::Status(ViewStatus::SessionEnded));
                effects
            }
            Ok(other) => {
                log::debug!("[Connection] Ignoring {} envelope from server", other.kind());
                Vec::new()
            }
            Err(e) => {
                log::debug!("[Connection] Dropping malformed frame: {e}");
                Vec::new()
            }
        }
    }

    fn on_lost(&mut self, generation: u64) -> Vec<Effect> {
        if !self.is_live(generation) {
            return Vec::new();
        }

        let mut effects = vec![Effect::CloseTransport { generation }];
        let max_attempts = self.backoff.max_attempts();

        if self.attempts >= max_attempts {
            log::warn!("[Connection] Giving up after {} reconnect attempts", self.attempts);
            self.state = ConnectionState::Disconnected;
            effects.push(Effect::Status(ViewStatus::Disconnected));
            return effects;
        }

        let delay = self.backoff.delay(self.attempts);
        self.next_token += 1;
        let token = self.next_token;
        self.pending_timer = Some(token);
        self.state = ConnectionState::Reconnecting;

        log::info!(
            "[Connection] Reconnecting in {delay:?} (attempt {}/{max_attempts})",
            self.attempts + 1
        );
        effects.push(Effect::ScheduleReconnect { token, delay });
        effects.push(Effect::Status(ViewStatus::Reconnecting {
            attempt: self.attempts + 1,
            max_attempts,
        }));
        effects
    }

    fn on_timer(&mut self, token: u64) -> Vec<Effect> {
        if self.pending_timer != Some(token) || self.state != ConnectionState::Reconnecting {
            return Vec::new();
        }
        self.pending_timer = None;
        self.attempts += 1;
        self.generation += 1;
        self.state = ConnectionState::Connecting;
        log::debug!(
            "[Connection] Reconnect attempt {} (generation {})",
            self.attempts,
            self.generation
        );
        vec![Effect::OpenTransport {
            generation: self.generation,
        }]
    }

    fn on_input(&mut self, envelope: Envelope) -> Vec<Effect> {
        let empty = matches!(&envelope, Envelope::Input(bytes) if bytes.is_empty());
        if self.state != ConnectionState::Open || empty {
            return Vec::new();
        }
        vec![self.send(&envelope)]
    }

    fn on_resize(&mut self, size: TerminalSize) -> Vec<Effect> {
        if !size.is_measured() {
            return Vec::new();
        }
        self.last_size = Some(size);
        if self.state != ConnectionState::Open {
            return Vec::new();
        }
        vec![self.send(&Envelope::Resize(size))]
    }

    fn on_teardown(&mut self) -> Vec<Effect> {
        if self.state == ConnectionState::Closed {
            return Vec::new();
        }
        self.deliberate_close = true;
        let previous = self.state;
        self.state = ConnectionState::Closed;
        log::info!("[Connection] Torn down locally (was {previous})");

        let mut effects = self.cancel_timer();
        if matches!(previous, ConnectionState::Connecting | ConnectionState::Open) && self.started
        {
            effects.push(Effect::CloseTransport {
                generation: self.generation,
            });
        }
        effects.push(Effect::Status(ViewStatus::Detached));
        effects
    }

    fn cancel_timer(&mut self) -> Vec<Effect> {
        match self.pending_timer.take() {
            Some(_) => vec![Effect::CancelReconnect],
            None => Vec::new(),
        }
    }

    fn send(&self, envelope: &Envelope) -> Effect {
        Effect::Send {
            generation: self.generation,
            frame: envelope.to_wire(self.wire_tag),
        }
    }
}
