// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection lifecycle, heartbeat, reconnection and outbound buffering.
//!
//! Every live link has a generation number. Reader, writer and heartbeat
//! tasks carry the generation they were spawned for and go inert once the
//! link they belong to has been replaced, so a late close from an old socket
//! can never tear down a newer one.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use switchboard_auth::{CredentialCoordinator, SessionEvent};
use switchboard_bus::{EventBus, StateCell, Subscription};
use switchboard_core::protocol::InboundEvent;
use switchboard_core::traits::connector::{FrameSink, FrameStream};
use switchboard_core::{ConnectionState, Envelope, EventKind, PushConnector, PushSocket, SwitchboardError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::debounce::SendDebounce;
use crate::settings::TransportSettings;

/// What happened to a frame handed to [`TransportManager::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written to the live connection.
    Sent,
    /// Buffered; it goes out, in order, once a connection is up.
    Queued,
}

#[derive(Default)]
struct Link {
    generation: u64,
    writer: Option<mpsc::UnboundedSender<String>>,
    outbound: VecDeque<String>,
    attempts: u32,
    manual_close: bool,
    tasks: Vec<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

impl Link {
    /// Detach the current socket and advance the generation.
    fn retire(&mut self) {
        self.generation += 1;
        self.writer = None;
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

struct Inner {
    settings: TransportSettings,
    connector: Arc<dyn PushConnector>,
    credentials: Arc<CredentialCoordinator>,
    state: StateCell<ConnectionState>,
    events: EventBus<Envelope>,
    link: Mutex<Link>,
    debounce: Mutex<SendDebounce>,
    last_pong: Mutex<Instant>,
}

/// Cloneable handle to the push channel.
#[derive(Clone)]
pub struct TransportManager {
    inner: Arc<Inner>,
}

impl TransportManager {
    pub fn new(
        settings: TransportSettings,
        connector: Arc<dyn PushConnector>,
        credentials: Arc<CredentialCoordinator>,
    ) -> Self {
        let debounce = SendDebounce::new(settings.send_debounce, settings.debounce_prune_threshold);
        Self {
            inner: Arc::new(Inner {
                settings,
                connector,
                credentials,
                state: StateCell::new(ConnectionState::Disconnected),
                events: EventBus::default(),
                link: Mutex::new(Link::default()),
                debounce: Mutex::new(debounce),
                last_pong: Mutex::new(Instant::now()),
            }),
        }
    }

    fn link(&self) -> MutexGuard<'_, Link> {
        self.inner.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch_pong(&self) {
        *self
            .inner
            .last_pong
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn since_pong(&self) -> std::time::Duration {
        self.inner
            .last_pong
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Live inbound events, optionally restricted to one type.
    pub fn on_event(&self, kind: Option<EventKind>) -> Subscription<Envelope> {
        match kind {
            None => self.inner.events.subscribe(),
            Some(kind) => self
                .inner
                .events
                .subscribe_filtered(move |env: &Envelope| env.kind() == Some(kind)),
        }
    }

    /// Frames waiting for a connection.
    pub fn buffered(&self) -> usize {
        self.link().outbound.len()
    }

    /// React to session changes until `cancel` fires.
    ///
    /// Login connects, refresh reconnects with the new token, logout disconnects.
    pub fn spawn_session_listener(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let this = self.clone();
        let mut sessions = self.inner.credentials.subscribe_events();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = sessions.recv() => match event {
                        Some(SessionEvent::LoggedIn) => {
                            if let Err(e) = this.connect().await {
                                warn!(error = %e, "connect after login failed");
                            }
                        }
                        Some(SessionEvent::Refreshed) => this.reset_and_reconnect(),
                        Some(SessionEvent::LoggedOut) => this.disconnect(),
                        None => break,
                    },
                }
            }
            debug!("session listener stopped");
        })
    }

    /// Open the connection. No-op while connecting or connected.
    ///
    /// Clears a previous manual [`disconnect`](Self::disconnect). A failed
    /// attempt is returned to the caller and also hands off to the background
    /// reconnect schedule.
    pub async fn connect(&self) -> Result<(), SwitchboardError> {
        self.connect_inner(true).await
    }

    async fn connect_inner(&self, explicit: bool) -> Result<(), SwitchboardError> {
        {
            let mut link = self.link();
            if explicit {
                link.manual_close = false;
            } else if link.manual_close {
                return Ok(());
            }
        }

        let began = self.inner.state.update(|state| {
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !began {
            return Ok(());
        }

        let Some(token) = self.inner.credentials.token() else {
            self.inner.state.set(ConnectionState::Disconnected);
            return Err(SwitchboardError::NoCredential);
        };

        let url = match connection_url(&self.inner.settings.ws_url, &token) {
            Ok(url) => url,
            Err(e) => {
                self.inner.state.set(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let generation = {
            let mut link = self.link();
            link.retire();
            link.generation
        };

        debug!(generation, "opening push connection");
        let timeout = self.inner.settings.connect_timeout;
        let opened = match tokio::time::timeout(timeout, self.inner.connector.open(url.as_str())).await {
            Ok(result) => result,
            Err(_) => Err(SwitchboardError::Timeout { duration: timeout }),
        };

        match opened {
            Ok(socket) => self.install(socket, generation),
            Err(e) => {
                warn!(error = %e, "push connection failed");
                let current = self.link().generation == generation;
                if current {
                    self.inner.state.set(ConnectionState::Disconnected);
                    self.schedule_reconnect();
                }
                Err(e)
            }
        }
    }

    /// Wire up a freshly opened socket. Buffered frames are queued to the
    /// writer before the state flips to connected.
    fn install(&self, socket: PushSocket, generation: u64) -> Result<(), SwitchboardError> {
        let PushSocket { sink, stream } = socket;
        let (tx, rx) = mpsc::unbounded_channel();

        let mut link = self.link();
        if link.generation != generation || link.manual_close {
            debug!(generation, "connection superseded before it was installed");
            return Err(SwitchboardError::transport("connection attempt superseded"));
        }

        let flushed = link.outbound.len();
        for frame in link.outbound.drain(..) {
            let _ = tx.send(frame);
        }
        link.writer = Some(tx);
        link.attempts = 0;
        self.touch_pong();

        link.tasks.push(tokio::spawn(self.clone().run_writer(generation, sink, rx)));
        link.tasks.push(tokio::spawn(self.clone().run_reader(generation, stream)));
        link.tasks.push(tokio::spawn(self.clone().run_heartbeat(generation)));
        self.inner.state.set(ConnectionState::Connected);
        drop(link);

        info!(generation, flushed, "push channel connected");
        Ok(())
    }

    async fn run_writer(
        self,
        generation: u64,
        mut sink: FrameSink,
        mut rx: mpsc::UnboundedReceiver<String>,
    ) {
        while let Some(frame) = rx.recv().await {
            if let Err(e) = sink.send(frame.clone()).await {
                warn!(generation, error = %e, "push write failed, requeueing");
                rx.close();
                let mut pending = vec![frame];
                while let Ok(next) = rx.try_recv() {
                    pending.push(next);
                }
                self.requeue(generation, pending);
                self.connection_lost(generation);
                return;
            }
        }
        let _ = sink.close().await;
    }

    async fn run_reader(self, generation: u64, mut stream: FrameStream) {
        while let Some(item) = stream.next().await {
            match item {
                Ok(text) => self.handle_frame(&text).await,
                Err(e) => {
                    debug!(generation, error = %e, "push stream ended with error");
                    break;
                }
            }
        }
        self.connection_lost(generation);
    }

    async fn run_heartbeat(self, generation: u64) {
        let period = self.inner.settings.heartbeat_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let silent = self.since_pong();
            if silent > self.inner.settings.pong_timeout {
                warn!(generation, silent_ms = silent.as_millis() as u64, "no pong, forcing reconnect");
                self.force_reconnect(generation);
                return;
            }
            if let Ok(frame) = Envelope::new(EventKind::Ping, Value::Null).encode() {
                self.write_live(generation, frame);
            }
        }
    }

    async fn handle_frame(&self, text: &str) {
        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                return;
            }
        };

        match envelope.kind() {
            Some(EventKind::Pong) => self.touch_pong(),
            Some(EventKind::AgentStatusUpdated) => match InboundEvent::try_from(&envelope) {
                Ok(InboundEvent::AgentStatusUpdated(agent)) => {
                    self.inner.credentials.update_identity(agent).await;
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "ignoring agent status update"),
            },
            Some(_) => {}
            None => debug!(event_type = %envelope.event_type, "unrecognized event type"),
        }
        self.inner.events.emit(envelope);
    }

    /// Write straight to the live link, bypassing the buffer. Heartbeats only.
    fn write_live(&self, generation: u64, frame: String) {
        let link = self.link();
        if link.generation != generation {
            return;
        }
        if let Some(writer) = &link.writer {
            let _ = writer.send(frame);
        }
    }

    /// Put frames the writer for `generation` could not deliver back in line,
    /// ahead of newer ones. A newer link takes them directly.
    fn requeue(&self, generation: u64, frames: Vec<String>) {
        let mut link = self.link();
        if link.generation != generation {
            if let Some(writer) = &link.writer {
                for frame in frames {
                    let _ = writer.send(frame);
                }
                return;
            }
        } else {
            link.writer = None;
        }
        for frame in frames.into_iter().rev() {
            link.outbound.push_front(frame);
        }
    }

    fn connection_lost(&self, generation: u64) {
        let reconnect = {
            let mut link = self.link();
            if link.generation != generation {
                return;
            }
            link.retire();
            !link.manual_close
        };
        info!(generation, "push channel disconnected");
        self.inner.state.set(ConnectionState::Disconnected);
        if reconnect {
            self.schedule_reconnect();
        }
    }

    /// Queue the next automatic attempt with linear backoff, within budget.
    fn schedule_reconnect(&self) {
        if !self.inner.credentials.is_logged_in() {
            debug!("not logged in, skipping reconnect");
            return;
        }
        let mut link = self.link();
        if link.manual_close || link.reconnect.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        let max = self.inner.settings.max_reconnect_attempts;
        if link.attempts >= max {
            warn!(attempts = link.attempts, "reconnect budget exhausted, staying disconnected");
            return;
        }
        link.attempts += 1;
        let attempt = link.attempts;
        let delay = self.inner.settings.backoff(attempt);
        info!(attempt, max, delay_ms = delay.as_millis() as u64, "scheduling reconnect");

        let this = self.clone();
        link.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.link().reconnect = None;
            if let Err(e) = this.connect_inner(false).await {
                debug!(attempt, error = %e, "reconnect attempt failed");
            }
        }));
    }

    /// Drop the link for `generation` and reopen after the settle delay.
    fn force_reconnect(&self, generation: u64) {
        {
            let mut link = self.link();
            if link.generation != generation {
                return;
            }
            link.retire();
            if let Some(pending) = link.reconnect.take() {
                pending.abort();
            }
        }
        self.inner.state.set(ConnectionState::Disconnected);
        self.reopen_after_delay();
    }

    fn reopen_after_delay(&self) {
        let this = self.clone();
        let delay = self.inner.settings.reconnect_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.link().reconnect = None;
            if let Err(e) = this.connect_inner(false).await {
                debug!(error = %e, "forced reconnect failed");
            }
        });
        if let Some(previous) = self.link().reconnect.replace(handle) {
            previous.abort();
        }
    }

    /// Credential changed: reset the attempt budget and reconnect with the new token.
    pub fn reset_and_reconnect(&self) {
        let generation = {
            let mut link = self.link();
            link.attempts = 0;
            if link.manual_close {
                return;
            }
            link.generation
        };
        info!("credential refreshed, reconnecting");
        if self.state() == ConnectionState::Disconnected {
            self.reopen_after_delay();
        } else {
            self.force_reconnect(generation);
        }
    }

    /// External trigger after the budget ran out: reset and connect now.
    pub async fn reconnect_now(&self) -> Result<(), SwitchboardError> {
        self.link().attempts = 0;
        self.connect().await
    }

    /// Close the connection and suppress reconnection until the next `connect()`.
    ///
    /// Buffered frames are kept and flushed by the next connection.
    pub fn disconnect(&self) {
        {
            let mut link = self.link();
            link.manual_close = true;
            link.retire();
            if let Some(pending) = link.reconnect.take() {
                pending.abort();
            }
        }
        self.inner.state.set(ConnectionState::Disconnected);
        info!("push channel closed by request");
    }

    /// Send an event, or buffer it until a connection is available.
    ///
    /// A buffered send kicks off a connection attempt unless the link was
    /// closed with [`disconnect`](Self::disconnect).
    ///
    /// `message:send` payloads must carry `conversationId` and `message`, and
    /// a second send for the same conversation inside the debounce window is
    /// refused with [`SwitchboardError::DuplicateSuppressed`].
    pub fn send(&self, kind: EventKind, payload: Value) -> Result<SendOutcome, SwitchboardError> {
        if kind == EventKind::MessageSend {
            let conversation_id = validate_message_send(&payload)?;
            let admitted = self
                .inner
                .debounce
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .admit(conversation_id, Instant::now());
            if !admitted {
                debug!(conversation_id, "duplicate send suppressed");
                return Err(SwitchboardError::DuplicateSuppressed(conversation_id.to_string()));
            }
        }

        let frame = Envelope::new(kind, payload).encode()?;
        {
            let mut link = self.link();
            let frame = match &link.writer {
                Some(writer) => match writer.send(frame) {
                    Ok(()) => return Ok(SendOutcome::Sent),
                    Err(mpsc::error::SendError(frame)) => frame,
                },
                None => frame,
            };
            link.outbound.push_back(frame);
        }

        debug!(event_type = %kind, "not connected, frame buffered");
        if self.state() == ConnectionState::Disconnected {
            let this = self.clone();
            tokio::spawn(async move {
                if let Err(e) = this.connect_inner(false).await {
                    debug!(error = %e, "connect triggered by send failed");
                }
            });
        }
        Ok(SendOutcome::Queued)
    }
}

impl std::fmt::Debug for TransportManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let link = self.link();
        f.debug_struct("TransportManager")
            .field("state", &self.inner.state.get())
            .field("generation", &link.generation)
            .field("buffered", &link.outbound.len())
            .field("attempts", &link.attempts)
            .finish()
    }
}

fn connection_url(base: &str, token: &SecretString) -> Result<url::Url, SwitchboardError> {
    let mut url = url::Url::parse(base)
        .map_err(|e| SwitchboardError::Config(format!("invalid push url `{base}`: {e}")))?;
    url.query_pairs_mut()
        .append_pair("token", token.expose_secret());
    Ok(url)
}

fn validate_message_send(payload: &Value) -> Result<&str, SwitchboardError> {
    let conversation_id = payload
        .get("conversationId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            SwitchboardError::ValidationRejected("message:send requires conversationId".into())
        })?;
    let has_message = match payload.get("message") {
        None | Some(Value::Null) => false,
        Some(Value::String(text)) => !text.trim().is_empty(),
        Some(_) => true,
    };
    if !has_message {
        return Err(SwitchboardError::ValidationRejected(
            "message:send requires message".into(),
        ));
    }
    Ok(conversation_id)
}
