//! Tokio driver for [`ConnectionMachine`].
//!
//! The driver owns the machine, the writer half of the live transport, the
//! reconnect timer and the surface. Everything else (connect/reader tasks,
//! timer tasks, surface threads, the signal watcher and the status poller)
//! only sends [`DriverEvent`]s on one unbounded channel, so all state changes
//! happen in a single loop in delivery order.
//!
//! The latest [`SessionInfo`] from the poller is merged with the view's
//! [`ViewStatus`] into the title and the surface status line whenever either
//! side changes. Server pings are answered by tungstenite itself.

// Rust guideline compliant 2026-02

use std::collections::VecDeque;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::{
    AttachOutcome, Backoff, ConnectionEvent, ConnectionMachine, ConnectionState, Effect,
    TransportError, ViewStatus,
};
use crate::config::Config;
use crate::constants;
use crate::protocol::WireTag;
use crate::status::{display, SessionInfo};
use crate::surface::TerminalSurface;
use crate::ws::{self, WsMessage, WsReader, WsWriter};

/// Parameters of one attach run.
#[derive(Debug, Clone)]
pub struct AttachOptions {
    /// WebSocket URL of the session transport.
    pub url: String,
    /// Session identifier, used as the title until the poller reports a name.
    pub session_id: String,
    /// Reconnect policy.
    pub backoff: Backoff,
    /// Discriminator written on outgoing frames.
    pub wire_tag: WireTag,
    /// Handshake timeout per attempt.
    pub connect_timeout: Duration,
    /// Byte that detaches the view, if any.
    pub detach_key: Option<u8>,
    /// Text pasted into the session once the first transport opens.
    pub paste: Option<String>,
}

impl AttachOptions {
    /// Options with default policy for `url`.
    pub fn new(url: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            session_id: session_id.into(),
            backoff: Backoff::default(),
            wire_tag: WireTag::default(),
            connect_timeout: constants::CONNECT_TIMEOUT,
            detach_key: Some(constants::DETACH_KEY),
            paste: None,
        }
    }

    /// Options for attaching to `session_id` on the configured server.
    pub fn from_config(config: &Config, session_id: &str) -> Self {
        Self {
            backoff: config.backoff(),
            wire_tag: config.wire_tag,
            ..Self::new(config.session_ws_url(session_id), session_id)
        }
    }
}

/// Message delivered to the driver loop.
enum DriverEvent {
    Machine(ConnectionEvent),
    Connected { generation: u64, writer: WsWriter },
    Session(SessionInfo),
    Detach,
}

type EventSender = mpsc::UnboundedSender<DriverEvent>;

/// Run a session view until it ends, is detached, or gives up.
///
/// The surface should already be attached; listeners are registered here
/// exactly once for the whole run regardless of how many transports are
/// opened. `status` carries session records from a
/// [`StatusPoller`](crate::status::StatusPoller) for the title and status line.
pub async fn run_attach<S>(
    surface: &mut S,
    options: AttachOptions,
    status: Option<watch::Receiver<Option<SessionInfo>>>,
) -> AttachOutcome
where
    S: TerminalSurface + ?Sized,
{
    let (tx, mut rx) = mpsc::unbounded_channel();

    install_listeners(surface, &tx, options.detach_key);
    let signals = SignalListener::spawn(tx.clone());
    let status_task = status.map(|receiver| spawn_status_forwarder(receiver, tx.clone()));

    let mut driver = Driver {
        machine: ConnectionMachine::new(options.backoff, options.wire_tag),
        view_status: ViewStatus::Connecting,
        session: None,
        status_line: None,
        paste: options.paste.clone(),
        options,
        surface,
        tx,
        writer: None,
        transport_task: None,
        timer: None,
    };

    log::info!("[Connection] Attaching to {}", driver.options.url);
    driver.dispatch(ConnectionEvent::Start).await;

    let outcome = loop {
        if let Some(outcome) = driver.machine.outcome() {
            break outcome;
        }
        match rx.recv().await {
            Some(event) => driver.on_event(event).await,
            None => break AttachOutcome::Detached,
        }
    };

    driver.shutdown().await;
    if let Some(task) = status_task {
        task.abort();
    }
    signals.stop();

    log::info!("[Connection] Attach finished: {outcome:?}");
    outcome
}

/// Wire the surface listeners to the driver channel.
fn install_listeners<S>(surface: &mut S, tx: &EventSender, detach_key: Option<u8>)
where
    S: TerminalSurface + ?Sized,
{
    let data_tx = tx.clone();
    surface.on_data(Box::new(move |bytes| {
        forward_input(&data_tx, bytes, detach_key);
    }));

    let resize_tx = tx.clone();
    surface.on_resize(Box::new(move |size| {
        let _ = resize_tx.send(DriverEvent::Machine(ConnectionEvent::Resized(size)));
    }));
}

/// Forward typed bytes, splitting off the detach key.
///
/// Bytes typed before the detach key in the same chunk are still sent.
fn forward_input(tx: &EventSender, bytes: &[u8], detach_key: Option<u8>) {
    let detach_at = detach_key.and_then(|key| bytes.iter().position(|b| *b == key));
    let (input, detach) = match detach_at {
        Some(pos) => (&bytes[..pos], true),
        None => (bytes, false),
    };
    if !input.is_empty() {
        let _ = tx.send(DriverEvent::Machine(ConnectionEvent::UserInput(
            input.to_vec(),
        )));
    }
    if detach {
        let _ = tx.send(DriverEvent::Detach);
    }
}

fn spawn_status_forwarder(
    mut receiver: watch::Receiver<Option<SessionInfo>>,
    tx: EventSender,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let latest = receiver.borrow_and_update().clone();
            if let Some(session) = latest {
                if tx.send(DriverEvent::Session(session)).is_err() {
                    break;
                }
            }
            if receiver.changed().await.is_err() {
                break;
            }
        }
    })
}

/// Drain one transport until it closes or fails.
async fn pump_transport(generation: u64, mut reader: WsReader, tx: EventSender) {
    loop {
        let event = match reader.recv().await {
            Some(Ok(WsMessage::Text(text))) => ConnectionEvent::TransportMessage { generation, text },
            Some(Ok(WsMessage::Binary(data))) => {
                log::debug!("[Connection] Ignoring {}-byte binary frame", data.len());
                continue;
            }
            Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => continue,
            Some(Ok(WsMessage::Close { code, reason })) => ConnectionEvent::TransportClosed {
                generation,
                code,
                reason,
            },
            Some(Err(e)) => ConnectionEvent::TransportError {
                generation,
                error: TransportError::ReadFailed(format!("{e:#}")),
            },
            None => ConnectionEvent::TransportClosed {
                generation,
                code: ws::CLOSE_ABNORMAL,
                reason: "stream ended".to_string(),
            },
        };

        let terminal = !matches!(event, ConnectionEvent::TransportMessage { .. });
        if tx.send(DriverEvent::Machine(event)).is_err() || terminal {
            return;
        }
    }
}

async fn close_writer(generation: u64, mut writer: WsWriter) {
    match tokio::time::timeout(constants::TRANSPORT_CLOSE_TIMEOUT, writer.close()).await {
        Ok(Ok(())) => log::debug!("[Connection] Closed transport (generation {generation})"),
        Ok(Err(e)) => log::debug!("[Connection] Close failed (generation {generation}): {e:#}"),
        Err(_elapsed) => log::debug!("[Connection] Close timed out (generation {generation})"),
    }
}

struct Driver<'a, S: TerminalSurface + ?Sized> {
    machine: ConnectionMachine,
    options: AttachOptions,
    surface: &'a mut S,
    tx: EventSender,
    writer: Option<(u64, WsWriter)>,
    transport_task: Option<(u64, JoinHandle<()>)>,
    timer: Option<JoinHandle<()>>,
    view_status: ViewStatus,
    session: Option<SessionInfo>,
    status_line: Option<String>,
    paste: Option<String>,
}

impl<S: TerminalSurface + ?Sized> Driver<'_, S> {
    async fn on_event(&mut self, event: DriverEvent) {
        match event {
            DriverEvent::Machine(event) => self.dispatch(event).await,
            DriverEvent::Connected { generation, writer } => {
                let current = generation == self.machine.generation()
                    && self.machine.state() == ConnectionState::Connecting;
                if !current {
                    close_writer(generation, writer).await;
                    return;
                }
                self.writer = Some((generation, writer));
                self.dispatch(ConnectionEvent::TransportOpened { generation })
                    .await;
            }
            DriverEvent::Session(session) => {
                if self.session.as_ref() == Some(&session) {
                    return;
                }
                let renamed = session.name != self.session_name();
                if renamed {
                    log::debug!("[Connection] Session name is now {:?}", session.name);
                }
                self.session = Some(session);
                if renamed {
                    self.refresh_title();
                }
                self.refresh_status_line();
            }
            DriverEvent::Detach => {
                log::info!("[Connection] Detach requested");
                self.dispatch(ConnectionEvent::Teardown).await;
            }
        }
    }

    /// Feed `event` to the machine and perform the effects, including any
    /// follow-up events the effects produce.
    async fn dispatch(&mut self, event: ConnectionEvent) {
        let mut pending = VecDeque::from([event]);
        while let Some(event) = pending.pop_front() {
            for effect in self.machine.handle(event) {
                if let Some(follow_up) = self.execute(effect).await {
                    pending.push_back(follow_up);
                }
            }
        }
    }

    async fn execute(&mut self, effect: Effect) -> Option<ConnectionEvent> {
        match effect {
            Effect::OpenTransport { generation } => self.open_transport(generation),
            Effect::CloseTransport { generation } => self.close_transport(generation).await,
            Effect::Send { generation, frame } => return self.send(generation, frame).await,
            Effect::WriteSurface(bytes) => self.surface.write(&bytes),
            Effect::ClearSurface => self.surface.clear(),
            Effect::ScheduleReconnect { token, delay } => self.schedule_reconnect(token, delay),
            Effect::CancelReconnect => self.cancel_reconnect(),
            Effect::Status(status) => {
                self.view_status = status;
                self.surface.notify(&status);
                self.refresh_title();
                self.refresh_status_line();
                if status == ViewStatus::Connected {
                    return self.paste.take().map(ConnectionEvent::Paste);
                }
            }
        }
        None
    }

    fn open_transport(&mut self, generation: u64) {
        if let Some((_, task)) = self.transport_task.take() {
            task.abort();
        }

        let tx = self.tx.clone();
        let url = self.options.url.clone();
        let timeout = self.options.connect_timeout;

        let task = tokio::spawn(async move {
            match ws::connect(&url, timeout).await {
                Ok((writer, reader)) => {
                    if tx
                        .send(DriverEvent::Connected { generation, writer })
                        .is_ok()
                    {
                        pump_transport(generation, reader, tx).await;
                    }
                }
                Err(error) => {
                    let _ = tx.send(DriverEvent::Machine(ConnectionEvent::TransportError {
                        generation,
                        error,
                    }));
                }
            }
        });
        self.transport_task = Some((generation, task));
    }

    async fn close_transport(&mut self, generation: u64) {
        if matches!(self.writer, Some((g, _)) if g == generation) {
            if let Some((_, writer)) = self.writer.take() {
                close_writer(generation, writer).await;
            }
        }
        if matches!(self.transport_task, Some((g, _)) if g == generation) {
            if let Some((_, task)) = self.transport_task.take() {
                task.abort();
            }
        }
    }

    async fn send(&mut self, generation: u64, frame: String) -> Option<ConnectionEvent> {
        let Some((_, writer)) = self.writer.as_mut().filter(|(g, _)| *g == generation) else {
            log::debug!("[Connection] Dropping frame for closed transport {generation}");
            return None;
        };
        let result = writer.send_text(frame).await;
        match result {
            Ok(()) => None,
            Err(e) => {
                self.writer = None;
                Some(ConnectionEvent::TransportError {
                    generation,
                    error: TransportError::SendFailed(format!("{e:#}")),
                })
            }
        }
    }

    fn schedule_reconnect(&mut self, token: u64, delay: Duration) {
        self.cancel_reconnect();
        let tx = self.tx.clone();
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(DriverEvent::Machine(ConnectionEvent::ReconnectTimerFired {
                token,
            }));
        }));
    }

    fn cancel_reconnect(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Name shown for the view: the session name once known, else its id.
    fn session_name(&self) -> &str {
        self.session
            .as_ref()
            .map_or(self.options.session_id.as_str(), |s| s.name.as_str())
    }

    fn refresh_title(&mut self) {
        let title = display::title_for(self.session_name(), &self.view_status);
        self.surface.set_title(&title);
    }

    fn refresh_status_line(&mut self) {
        let Some(session) = &self.session else {
            return;
        };
        let line = display::status_line(session, Some(&self.view_status), Utc::now());
        if self.status_line.as_deref() == Some(line.as_str()) {
            return;
        }
        self.surface.show_status(&line);
        self.status_line = Some(line);
    }

    async fn shutdown(&mut self) {
        self.cancel_reconnect();
        if let Some((generation, writer)) = self.writer.take() {
            close_writer(generation, writer).await;
        }
        if let Some((_, task)) = self.transport_task.take() {
            task.abort();
        }
    }
}

/// SIGTERM/SIGHUP watcher that detaches the view.
struct SignalListener {
    #[cfg(unix)]
    handle: Option<signal_hook::iterator::Handle>,
}

impl SignalListener {
    #[cfg(unix)]
    fn spawn(tx: EventSender) -> Self {
        use signal_hook::consts::signal::{SIGHUP, SIGTERM};
        use signal_hook::iterator::Signals;

        let mut signals = match Signals::new([SIGTERM, SIGHUP]) {
            Ok(signals) => signals,
            Err(e) => {
                log::warn!("[Connection] Failed to watch SIGTERM/SIGHUP: {e}");
                return Self { handle: None };
            }
        };
        let handle = signals.handle();

        let spawned = std::thread::Builder::new()
            .name("webterm-signals".to_string())
            .spawn(move || {
                if let Some(signal) = signals.forever().next() {
                    log::info!("[Connection] Received signal {signal}");
                    let _ = tx.send(DriverEvent::Detach);
                }
            });

        match spawned {
            Ok(_) => Self {
                handle: Some(handle),
            },
            Err(e) => {
                log::warn!("[Connection] Failed to spawn signal watcher: {e}");
                handle.close();
                Self { handle: None }
            }
        }
    }

    #[cfg(not(unix))]
    fn spawn(_tx: EventSender) -> Self {
        Self {}
    }

    fn stop(self) {
        #[cfg(unix)]
        if let Some(handle) = self.handle {
            handle.close();
        }
    }
}
