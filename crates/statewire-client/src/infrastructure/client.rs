//! The relay client: one owning task per session.
//!
//! Every interaction – host dispatches, trigger transitions, inbound monitor
//! commands, transport lifecycle events – arrives as a [`ClientCommand`] on
//! a single queue and is processed by one task that owns the [`Host`], the
//! [`Session`], and the registry. That queue *is* the cooperative scheduler:
//! a trigger fired by a dispatch enqueues its transition and therefore runs
//! on a later turn, never inside the host's own reducer call.
//!
//! Nothing in this module returns an error to the host application. Failures
//! degrade to "not relaying" and a log line.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use statewire_core::protocol::codec::{self, Value};
use statewire_core::protocol::frames::{EMIT_LOG, EMIT_LOG_NOID};
use statewire_core::{ConnectionState, Filter, RelayMessage, Role, Session, Snapshot};

use crate::application::{handle_inbound, relay, triggers, Effect, ErrorReporter, Identity, TriggerEffect};
use crate::domain::{ActionRegistry, ConfigError, Host, RelayConfig, SendOnError};
use crate::infrastructure::http_fallback;
use crate::infrastructure::socket::{self, SocketConfig, SocketEvent, SocketRequest};

/// Commands processed by the client loop, one per scheduler turn.
#[derive(Debug)]
pub enum ClientCommand {
    /// Dispatch an action through the host and relay the result.
    Dispatch(Value),
    /// Begin monitoring (connect and log in if needed).
    Start,
    /// Stop monitoring; optionally keep the transport for a fast resume.
    Stop { keep_connected: bool },
    /// Push the current filtered history (relay or HTTP fallback).
    Send,
    /// Report an error, with duplicate suppression.
    ReportError(String),
    /// A relay message delivered on a subscribed channel.
    Inbound(RelayMessage),
    /// Transport lifecycle notification from the connection supervisor.
    SocketEvent(SocketEvent),
    /// Tear the client down.
    Shutdown,
}

// ── Public handle ─────────────────────────────────────────────────────────────

/// Cloneable handle the host application keeps.
///
/// Every method is fire-and-forget: the relay never raises into the host's
/// control flow, so a dead client simply means the command goes nowhere.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    commands: mpsc::UnboundedSender<ClientCommand>,
}

impl RelayHandle {
    /// Dispatches an action through the host's normal path.
    pub fn dispatch(&self, action: Value) {
        let _ = self.commands.send(ClientCommand::Dispatch(action));
    }

    /// Starts monitoring.
    pub fn start(&self) {
        let _ = self.commands.send(ClientCommand::Start);
    }

    /// Stops monitoring and closes the transport.
    pub fn stop(&self) {
        let _ = self.commands.send(ClientCommand::Stop { keep_connected: false });
    }

    /// Stops monitoring but keeps the transport open for a fast resume.
    pub fn stop_keep_connected(&self) {
        let _ = self.commands.send(ClientCommand::Stop { keep_connected: true });
    }

    /// Pushes the current filtered history out-of-band.
    pub fn send(&self) {
        let _ = self.commands.send(ClientCommand::Send);
    }

    /// Reports an error; identical consecutive texts are suppressed.
    pub fn report_error(&self, text: impl Into<String>) {
        let _ = self.commands.send(ClientCommand::ReportError(text.into()));
    }

    /// Shuts the client down.
    pub fn shutdown(&self) {
        let _ = self.commands.send(ClientCommand::Shutdown);
    }
}

// ── Client construction ───────────────────────────────────────────────────────

/// Entry point: validates the configuration, spawns the connection
/// supervisor and the client loop, and returns the handle.
pub struct RelayClient;

impl RelayClient {
    /// Connects a host application to the relay.
    ///
    /// With `realtime` enabled (the default) the client starts monitoring
    /// immediately; otherwise it waits for a trigger, an explicit
    /// [`RelayHandle::start`], or a monitor's `START`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configuration fails validation.
    /// This is the only fallible moment; everything after construction
    /// degrades instead of raising.
    pub fn connect<H: Host>(
        config: RelayConfig,
        host: H,
        registry: ActionRegistry,
    ) -> Result<RelayHandle, ConfigError> {
        config.validate()?;

        let (commands, queue) = mpsc::unbounded_channel();
        let socket = socket::spawn(
            SocketConfig {
                url: config.socket_url(),
                auto_reconnect: config.auto_reconnect,
                jitter_ms: config.auto_reconnect_jitter_ms,
            },
            commands.clone(),
        );

        let realtime = config.realtime;
        let client = ClientLoop::new(config, host, registry, socket, commands.clone());
        tokio::spawn(client.run(queue));

        if realtime {
            let _ = commands.send(ClientCommand::Start);
        }
        Ok(RelayHandle { commands })
    }
}

// ── The loop ──────────────────────────────────────────────────────────────────

pub(crate) struct ClientLoop<H: Host> {
    config: RelayConfig,
    filter: Filter,
    identity: Identity,
    session: Session,
    host: H,
    registry: ActionRegistry,
    reporter: ErrorReporter,
    socket: mpsc::UnboundedSender<SocketRequest>,
    self_queue: mpsc::UnboundedSender<ClientCommand>,
    http: reqwest::Client,
    /// Highest record id already relayed; dispatches only relay newer ones.
    last_relayed_id: u64,
    /// Set when a monitoring session was cut by a transport drop, so the
    /// automatic reconnect resumes relaying after the fresh login.
    resume_on_login: bool,
}

impl<H: Host> ClientLoop<H> {
    pub(crate) fn new(
        config: RelayConfig,
        host: H,
        registry: ActionRegistry,
        socket: mpsc::UnboundedSender<SocketRequest>,
        self_queue: mpsc::UnboundedSender<ClientCommand>,
    ) -> Self {
        let instance_id = uuid::Uuid::new_v4().to_string();
        let name = config
            .name
            .clone()
            .unwrap_or_else(|| format!("statewire-{}", &instance_id[..8]));
        let filter = config.filter();
        Self {
            filter,
            identity: Identity { name, instance_id },
            session: Session::new(Role::Master),
            config,
            host,
            registry,
            reporter: ErrorReporter::new(),
            socket,
            self_queue,
            http: reqwest::Client::new(),
            last_relayed_id: 0,
            resume_on_login: false,
        }
    }

    pub(crate) async fn run(mut self, mut queue: mpsc::UnboundedReceiver<ClientCommand>) {
        while let Some(command) = queue.recv().await {
            if !self.handle_command(command) {
                break;
            }
        }
        debug!("relay client loop ended");
    }

    /// Processes one command; returns false to end the loop.
    pub(crate) fn handle_command(&mut self, command: ClientCommand) -> bool {
        match command {
            ClientCommand::Dispatch(action) => {
                self.host.dispatch(action);
                self.after_dispatch();
            }
            ClientCommand::Start => self.handle_start(),
            ClientCommand::Stop { keep_connected } => self.handle_stop(keep_connected),
            ClientCommand::Send => self.handle_send(),
            ClientCommand::ReportError(text) => self.handle_report_error(text),
            ClientCommand::Inbound(message) => {
                for effect in handle_inbound(message, self.session.id(), &self.registry) {
                    self.execute(effect);
                }
            }
            ClientCommand::SocketEvent(event) => self.handle_socket_event(event),
            ClientCommand::Shutdown => {
                let _ = self.socket.send(SocketRequest::Close);
                return false;
            }
        }
        true
    }

    // ── Dispatch path ─────────────────────────────────────────────────────────

    /// Relays the records the last dispatch appended, maintains the excess
    /// flag, applies the reducer-error policy, and enqueues any triggered
    /// transitions for the next turn.
    fn after_dispatch(&mut self) {
        let (new_records, over_window) = {
            let history = self.host.history();
            let over = history.len() > self.config.max_age;
            let mut new = Vec::new();
            for (pos, record) in history.records().enumerate() {
                if record.id > self.last_relayed_id {
                    let snapshot = history
                        .snapshot_at(pos)
                        .cloned()
                        .unwrap_or_else(|| Snapshot::ok(Value::Null));
                    new.push((record.clone(), snapshot));
                }
            }
            (new, over)
        };

        // The excess flag is set on the append path, before the messages for
        // these records are built, so the record that crossed the window
        // already carries it.
        if over_window {
            self.session.mark_excess();
        }

        for (record, snapshot) in new_records {
            self.last_relayed_id = record.id;
            let action_type = record.action_type().to_string();

            if self.session.state() == ConnectionState::Monitoring {
                if let Some(message) = relay::action_message(
                    &self.identity,
                    &self.session,
                    &self.filter,
                    &record,
                    &snapshot.state,
                ) {
                    self.emit(message);
                }
            }

            if let Some(error) = &snapshot.error {
                self.handle_reducer_error(error);
            }

            for effect in triggers::evaluate(&self.config, &action_type, self.session.state()) {
                let command = match effect {
                    TriggerEffect::Start => ClientCommand::Start,
                    TriggerEffect::Stop => ClientCommand::Stop { keep_connected: false },
                    TriggerEffect::Send => ClientCommand::Send,
                };
                self.enqueue(command);
            }
        }
    }

    fn handle_reducer_error(&mut self, error: &str) {
        match self.config.send_on_error {
            SendOnError::Off => {}
            SendOnError::Always | SendOnError::OnReducerError => {
                if self.session.state() == ConnectionState::Monitoring {
                    let message = relay::error_message(&self.identity, &self.session, error);
                    self.emit(message);
                } else {
                    self.enqueue(ClientCommand::Send);
                }
            }
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    fn handle_start(&mut self) {
        if self.session.state() != ConnectionState::Stopped {
            debug!("start ignored in state {:?}", self.session.state());
            return;
        }
        self.session.begin_connecting();
        if self.session.id().is_some() {
            // Fast resume: the login identity survived a keep-connected
            // stop, so no handshake is needed.
            if let Some(channel) = self.session.private_channel().map(str::to_string) {
                let _ = self.socket.send(SocketRequest::Subscribe { channel });
            }
            self.session.resume_monitoring();
            self.send_init();
        } else {
            let _ = self.socket.send(SocketRequest::Connect);
        }
    }

    fn handle_stop(&mut self, keep_connected: bool) {
        if let Some(channel) = self.session.private_channel().map(str::to_string) {
            let _ = self.socket.send(SocketRequest::Unsubscribe { channel });
        }
        if keep_connected {
            self.session.stop_keep_connected();
        } else {
            self.session.stop();
            let _ = self.socket.send(SocketRequest::Close);
        }
    }

    fn handle_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::LoggedIn { session_id, channel } => {
                let starting = self.session.state() == ConnectionState::Connecting;
                let resume = starting || std::mem::take(&mut self.resume_on_login);
                info!("logged in as {session_id} on channel {channel}");
                self.session.complete_login(session_id, channel.clone());
                let _ = self.socket.send(SocketRequest::Subscribe { channel });
                if resume {
                    self.send_init();
                } else {
                    // An auto-reconnect while stopped: keep the identity but
                    // wait for a trigger, a START, or an explicit start.
                    self.session.stop_keep_connected();
                }
            }
            SocketEvent::LoginFailed(error) => {
                warn!("broker rejected login: {error}");
                self.session.stop();
            }
            SocketEvent::Disconnected => {
                // A drop mid-monitoring or mid-start resumes after the
                // supervisor's reconnect; a drop while stopped stays stopped.
                self.resume_on_login = self.config.auto_reconnect
                    && matches!(
                        self.session.state(),
                        ConnectionState::Monitoring | ConnectionState::Connecting
                    );
                self.session.stop();
            }
        }
    }

    // ── Inbound effects ───────────────────────────────────────────────────────

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::DispatchAction(action) => {
                // Remote actions re-enter through the normal dispatch path
                // on the next turn, like any local dispatch.
                self.enqueue(ClientCommand::Dispatch(action));
            }
            Effect::ApplyCommand(command) => match self.host.apply(command) {
                Ok(()) => {
                    if self.session.state() == ConnectionState::Monitoring {
                        self.emit_state();
                    }
                }
                Err(error) => warn!("history command failed: {error}"),
            },
            Effect::StartMonitoring => {
                match self.session.state() {
                    ConnectionState::Stopped if self.session.id().is_some() => {
                        self.session.begin_connecting();
                        self.session.resume_monitoring();
                        self.emit_state();
                    }
                    ConnectionState::Monitoring => {
                        // Duplicate delivery of START; already relaying.
                    }
                    state => debug!("inbound START ignored in state {state:?}"),
                }
            }
            Effect::StopMonitoring => {
                if self.session.state() == ConnectionState::Monitoring {
                    self.handle_stop(true);
                }
            }
            Effect::SendState => {
                if self.session.state() == ConnectionState::Monitoring {
                    self.emit_state();
                }
            }
            Effect::ReplyError(text) => {
                let message = relay::error_message(&self.identity, &self.session, &text);
                self.emit(message);
            }
        }
    }

    // ── Out-of-band delivery ──────────────────────────────────────────────────

    fn handle_send(&mut self) {
        if self.session.state() == ConnectionState::Monitoring {
            self.emit_state();
            return;
        }
        // No live monitoring session: best-effort HTTP fallback.
        let payload = codec::encode(&self.host.history().filtered(&self.filter).to_value());
        let url = self.config.fallback_url();
        let id = self.session.id().cloned();
        let name = self.identity.name.clone();
        let http = self.http.clone();
        tokio::spawn(async move {
            if let Err(error) =
                http_fallback::post_state(&http, &url, id.as_ref(), &name, &payload).await
            {
                debug!("fallback delivery to {url} failed: {error}");
            }
        });
    }

    fn handle_report_error(&mut self, text: String) {
        if !self.reporter.should_report(&text) {
            return;
        }
        // Surface the error in the host like any other action, then deliver
        // it to whoever is watching.
        let error_action = Value::object([
            ("type", Value::from("ERROR")),
            ("message", Value::from(text.as_str())),
        ]);
        self.enqueue(ClientCommand::Dispatch(error_action));

        if self.session.state() == ConnectionState::Monitoring {
            let message = relay::error_message(&self.identity, &self.session, &text);
            self.emit(message);
        } else {
            self.enqueue(ClientCommand::Send);
        }
    }

    // ── Emission helpers ──────────────────────────────────────────────────────

    fn emit(&self, message: RelayMessage) {
        let event = if self.session.id().is_some() { EMIT_LOG } else { EMIT_LOG_NOID };
        let _ = self.socket.send(SocketRequest::Emit { event: event.to_string(), message });
    }

    fn emit_state(&mut self) {
        let message = relay::state_message(
            &self.identity,
            &self.session,
            &self.filter,
            self.host.history(),
        );
        self.emit(message);
    }

    fn send_init(&mut self) {
        let state = self.host.history().current_state().cloned().unwrap_or(Value::Null);
        let message = relay::init_message(&self.identity, &self.session, &state);
        self.emit(message);
    }

    fn enqueue(&self, command: ClientCommand) {
        let _ = self.self_queue.send(command);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
