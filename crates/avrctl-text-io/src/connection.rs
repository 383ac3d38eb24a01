//! Connection lifecycle manager.
//!
//! [`AvrConnection`] owns the TCP stream to a receiver and the three tasks
//! that run for the life of each session:
//!
//! - the **reader**, which splits incoming bytes into lines, hands each line
//!   to the [`DeviceProtocol`], merges the resulting state update into the
//!   [`StateSink`] and resolves any waiting command;
//! - the **drain**, which pops the highest-priority queued command every
//!   `message_interval` and writes it;
//! - the **heartbeat**, which probes a silent link and declares it dead if
//!   the probe goes unanswered.
//!
//! Any I/O error, EOF or failed heartbeat tears the session down. With
//! auto-reconnect on, a background loop then retries at a fixed delay until
//! it succeeds or [`AvrConnection::disconnect`] cancels it.
//!
//! ```text
//! Disconnected --connect--> Connected --error--> Reconnecting --ok--> Connected
//!       ^                       |                     |
//!       +------disconnect-------+-----disconnect------+
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use avrctl_core::error::{Error, Result};
use avrctl_core::events::AvrEvent;
use avrctl_core::{
    CommandInstance, CommandLookup, CommandTable, ConnectionState, QOS_LEVELS, StateSink,
};

use crate::correlation::{
    Correlator, DEFAULT_COMMAND_EXPIRATION, DEFAULT_COMMAND_TIMEOUT, PendingResponse, RetryPolicy,
};
use crate::message::{ParsedMessage, SuggestedCommand};
use crate::protocol::{DecodeResult, MAX_BUF, decode_line, encode_line};

/// Default telnet control port.
pub const DEFAULT_PORT: u16 = 23;

/// Default minimum spacing between transmitted commands.
pub const DEFAULT_MESSAGE_INTERVAL: Duration = Duration::from_millis(50);

/// Default idle time before a heartbeat is sent.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Default time a heartbeat has to provoke some traffic.
pub const DEFAULT_HEARTBEAT_GRACE: Duration = Duration::from_secs(5);

/// Default wait between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(10);

/// Default TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long teardown waits for a session task before aborting it.
const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

const READ_CHUNK: usize = 1024;

// ---------------------------------------------------------------------------
// DeviceProtocol
// ---------------------------------------------------------------------------

/// What a device family plugs into the connection manager.
pub trait DeviceProtocol: Send + Sync + 'static {
    /// The command registry for this family.
    fn load_table(&self) -> CommandTable;

    /// Build named commands from the registry.
    fn build_lookup(&self, table: &CommandTable) -> CommandLookup;

    /// Tokenize and decode one incoming line.
    fn handle_line(&self, line: &str, table: &CommandTable) -> ParsedMessage;

    /// A side-effect free command used to probe an idle link.
    ///
    /// Defaults to a QoS 0 query of the `power` command.
    fn heartbeat_command(&self, lookup: &CommandLookup) -> Option<CommandInstance> {
        lookup.get("power").map(|power| power.query(0))
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Receiver host name or address.
    pub host: String,
    /// Control port.
    pub port: u16,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Idle time before a heartbeat is sent; `None` disables heartbeats.
    pub heartbeat_interval: Option<Duration>,
    /// Time a heartbeat has to provoke some traffic.
    pub heartbeat_grace: Duration,
    /// Minimum spacing between transmitted commands.
    pub message_interval: Duration,
    /// Wait after each transmission before an unanswered command is resent.
    pub command_timeout: Duration,
    /// Lifetime of an awaited command, from its first transmission.
    pub command_expiration: Duration,
    /// Wait between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Number of QoS tiers.
    pub qos_levels: u8,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            host: String::new(),
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            heartbeat_interval: Some(DEFAULT_HEARTBEAT_INTERVAL),
            heartbeat_grace: DEFAULT_HEARTBEAT_GRACE,
            message_interval: DEFAULT_MESSAGE_INTERVAL,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            command_expiration: DEFAULT_COMMAND_EXPIRATION,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            qos_levels: QOS_LEVELS,
        }
    }
}

impl ConnectionConfig {
    /// Settings for `host` with every other value at its default.
    pub fn new(host: &str) -> Self {
        ConnectionConfig {
            host: host.to_string(),
            ..Self::default()
        }
    }

    /// `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Reject settings the session tasks cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(Error::InvalidParameter(msg.into()));
        if self.host.trim().is_empty() {
            return invalid("host is required");
        }
        if self.qos_levels == 0 {
            return invalid("qos_levels must be at least 1");
        }
        if self.message_interval.is_zero() {
            return invalid("message_interval must be non-zero");
        }
        if self.command_timeout.is_zero() {
            return invalid("command_timeout must be non-zero");
        }
        if self.heartbeat_interval.is_some_and(|i| i.is_zero()) {
            return invalid("heartbeat_interval must be non-zero");
        }
        Ok(())
    }

    /// Resend and expiry timing.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            command_timeout: self.command_timeout,
            command_expiration: self.command_expiration,
        }
    }
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

struct Session {
    id: u64,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    async fn shutdown(self) {
        self.cancel.cancel();
        for mut task in self.tasks {
            if tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, &mut task)
                .await
                .is_err()
            {
                task.abort();
            }
        }
    }
}

struct Lifecycle {
    session: Option<Session>,
    reconnect: Option<JoinHandle<()>>,
    auto_reconnect: bool,
    reconnect_delay: Duration,
    /// Bumped by every explicit connect and disconnect so that a stale
    /// reconnect loop never installs a session.
    generation: u64,
    next_session: u64,
}

struct Inner {
    config: ConnectionConfig,
    protocol: Arc<dyn DeviceProtocol>,
    table: CommandTable,
    lookup: CommandLookup,
    correlator: Correlator,
    sink: Arc<dyn StateSink>,
    state_tx: watch::Sender<ConnectionState>,
    event_tx: broadcast::Sender<AvrEvent>,
    lifecycle: Mutex<Lifecycle>,
    epoch: Instant,
    /// Milliseconds since `epoch` at which data last arrived.
    last_activity: AtomicU64,
    learned: std::sync::Mutex<Vec<SuggestedCommand>>,
}

// ---------------------------------------------------------------------------
// AvrConnection
// ---------------------------------------------------------------------------

/// A managed connection to one receiver.
///
/// Cheap to clone; all clones share the same connection.
#[derive(Clone)]
pub struct AvrConnection {
    inner: Arc<Inner>,
}

impl AvrConnection {
    /// Create an unconnected manager.
    ///
    /// The command table is loaded and the lookup built once, here. State
    /// updates go to `sink`; events are published on `events`.
    pub fn new(
        config: ConnectionConfig,
        protocol: Arc<dyn DeviceProtocol>,
        sink: Arc<dyn StateSink>,
        events: broadcast::Sender<AvrEvent>,
    ) -> Self {
        let table = protocol.load_table();
        let lookup = protocol.build_lookup(&table);
        let correlator = Correlator::new(config.qos_levels, config.retry_policy());
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        AvrConnection {
            inner: Arc::new(Inner {
                lifecycle: Mutex::new(Lifecycle {
                    session: None,
                    reconnect: None,
                    auto_reconnect: false,
                    reconnect_delay: config.reconnect_delay,
                    generation: 0,
                    next_session: 0,
                }),
                config,
                protocol,
                table,
                lookup,
                correlator,
                sink,
                state_tx,
                event_tx: events,
                epoch: Instant::now(),
                last_activity: AtomicU64::new(0),
                learned: std::sync::Mutex::new(Vec::new()),
            }),
        }
    }

    /// Connect for the first time.
    pub async fn init(&self, auto_reconnect: bool, reconnect_delay: Duration) -> Result<()> {
        self.connect(auto_reconnect, reconnect_delay).await
    }

    /// Open the connection and start the session tasks.
    ///
    /// Does nothing if already connected. Settings rejected by
    /// [`ConnectionConfig::validate`] fail before any I/O. A failed attempt
    /// is returned to the caller and leaves the connection `Disconnected`;
    /// `auto_reconnect` only applies to connections lost after this call
    /// succeeds.
    pub async fn connect(&self, auto_reconnect: bool, reconnect_delay: Duration) -> Result<()> {
        self.inner.config.validate()?;
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if lifecycle.session.is_some() {
            debug!(host = %self.inner.config.host, "already connected");
            return Ok(());
        }

        lifecycle.generation += 1;
        lifecycle.auto_reconnect = false;
        if let Some(handle) = lifecycle.reconnect.take() {
            handle.abort();
            let _ = handle.await;
        }

        match self.open_stream().await {
            Ok(stream) => {
                lifecycle.auto_reconnect = auto_reconnect;
                lifecycle.reconnect_delay = reconnect_delay;
                self.install(&mut lifecycle, stream);
                Ok(())
            }
            Err(e) => {
                warn!(host = %self.inner.config.host, error = %e, "connect failed");
                self.inner.state_tx.send_replace(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Tear everything down.
    ///
    /// Cancels any reconnect loop and the session tasks, waits for them to
    /// finish, and resolves every pending response to `None`. Calling it
    /// again is harmless.
    pub async fn disconnect(&self) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        lifecycle.generation += 1;
        lifecycle.auto_reconnect = false;

        if let Some(handle) = lifecycle.reconnect.take() {
            handle.abort();
            let _ = handle.await;
        }
        if let Some(session) = lifecycle.session.take() {
            session.shutdown().await;
        }
        self.inner.correlator.reset().await;

        let previous = self
            .inner
            .state_tx
            .send_replace(ConnectionState::Disconnected);
        if previous != ConnectionState::Disconnected {
            info!(host = %self.inner.config.host, "disconnected");
            let _ = self.inner.event_tx.send(AvrEvent::Disconnected);
        }
    }

    /// Queue a command without waiting for its response.
    ///
    /// Commands are dropped while not connected, except heartbeats.
    pub async fn send_command(&self, command: CommandInstance, heartbeat: bool) -> Result<()> {
        self.check_qos(&command)?;
        let lifecycle = self.inner.lifecycle.lock().await;
        if lifecycle.session.is_none() && !heartbeat {
            debug!(command = %command, "not connected, dropping command");
            return Ok(());
        }
        self.inner.correlator.submit_silent(command).await
    }

    /// Queue a command and return a handle resolving to its response.
    ///
    /// Fails with [`Error::NotConnected`] when disconnected. While
    /// reconnecting the handle resolves to `None` immediately.
    pub async fn send_command_awaitable(&self, command: CommandInstance) -> Result<PendingResponse> {
        self.check_qos(&command)?;
        let lifecycle = self.inner.lifecycle.lock().await;
        match self.current_state() {
            ConnectionState::Connected if lifecycle.session.is_some() => {
                self.inner.correlator.submit(command).await
            }
            ConnectionState::Reconnecting => {
                debug!(command = %command, "reconnecting, not sending");
                Ok(PendingResponse::resolved())
            }
            _ => Err(Error::NotConnected),
        }
    }

    fn check_qos(&self, command: &CommandInstance) -> Result<()> {
        if command.qos() >= self.inner.config.qos_levels {
            return Err(Error::QosOutOfRange {
                qos: command.qos(),
                levels: self.inner.config.qos_levels,
            });
        }
        Ok(())
    }

    /// Current lifecycle state.
    pub fn current_state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Watch lifecycle state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Subscribe to connection and state events.
    pub fn subscribe(&self) -> broadcast::Receiver<AvrEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Named commands for this receiver.
    pub fn commands(&self) -> &CommandLookup {
        &self.inner.lookup
    }

    /// The command registry in use.
    pub fn table(&self) -> &CommandTable {
        &self.inner.table
    }

    /// Settings in use.
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Commands seen on the wire that the registry does not describe.
    pub fn learned_commands(&self) -> Vec<SuggestedCommand> {
        self.inner
            .learned
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Awaited commands still waiting for a response.
    pub async fn pending_responses(&self) -> usize {
        self.inner.correlator.pending_len().await
    }

    /// Commands waiting to be transmitted.
    pub async fn queued_commands(&self) -> usize {
        self.inner.correlator.queued_len().await
    }

    // -----------------------------------------------------------------------
    // Session management
    // -----------------------------------------------------------------------

    async fn open_stream(&self) -> Result<TcpStream> {
        let addr = self.inner.config.address();
        debug!(addr = %addr, "connecting");
        let stream = tokio::time::timeout(self.inner.config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| Error::ConnectTimeout(addr.clone()))?
            .map_err(|e| Error::Connect(format!("{addr}: {e}")))?;

        // Disable Nagle for low-latency command/response.
        let _ = stream.set_nodelay(true);
        Ok(stream)
    }

    fn install(&self, lifecycle: &mut Lifecycle, stream: TcpStream) {
        lifecycle.next_session += 1;
        let id = lifecycle.next_session;
        let cancel = CancellationToken::new();
        let (reader, writer) = stream.into_split();
        self.touch();

        let mut tasks = vec![
            tokio::spawn(self.clone().read_loop(id, reader, cancel.clone())),
            tokio::spawn(self.clone().drain_loop(id, writer, cancel.clone())),
        ];
        if let Some(interval) = self.inner.config.heartbeat_interval {
            tasks.push(tokio::spawn(
                self.clone().heartbeat_loop(id, interval, cancel.clone()),
            ));
        }

        lifecycle.session = Some(Session { id, cancel, tasks });
        self.inner.state_tx.send_replace(ConnectionState::Connected);
        info!(host = %self.inner.config.host, session = id, "connected");
        let _ = self.inner.event_tx.send(AvrEvent::Connected);
    }

    fn report_error(&self, session: u64, reason: Error) {
        tokio::spawn(self.clone().handle_connection_error(session, reason));
    }

    async fn handle_connection_error(self, session: u64, reason: Error) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        let current = match lifecycle.session.take() {
            Some(current) if current.id == session => current,
            other => {
                lifecycle.session = other;
                debug!(session, error = %reason, "ignoring error from stale session");
                return;
            }
        };

        warn!(host = %self.inner.config.host, error = %reason, "connection lost");
        current.shutdown().await;
        self.inner.correlator.reset().await;

        if lifecycle.auto_reconnect {
            self.inner
                .state_tx
                .send_replace(ConnectionState::Reconnecting);
            let _ = self.inner.event_tx.send(AvrEvent::Disconnected);
            let generation = lifecycle.generation;
            let delay = lifecycle.reconnect_delay;
            lifecycle.reconnect = Some(tokio::spawn(self.clone().reconnect_loop(generation, delay)));
        } else {
            self.inner
                .state_tx
                .send_replace(ConnectionState::Disconnected);
            let _ = self.inner.event_tx.send(AvrEvent::Disconnected);
        }
    }

    async fn reconnect_loop(self, generation: u64, delay: Duration) {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let _ = self.inner.event_tx.send(AvrEvent::Reconnecting { attempt });

            let stream = match self.open_stream().await {
                Ok(stream) => stream,
                Err(e) => {
                    debug!(attempt, error = %e, "reconnect attempt failed");
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            let mut lifecycle = self.inner.lifecycle.lock().await;
            if lifecycle.generation != generation || lifecycle.session.is_some() {
                return;
            }
            // This task's own handle; dropping it detaches without aborting.
            lifecycle.reconnect = None;
            info!(attempt, "reconnected");
            self.install(&mut lifecycle, stream);
            return;
        }
    }

    // -----------------------------------------------------------------------
    // Activity tracking
    // -----------------------------------------------------------------------

    fn now_millis(&self) -> u64 {
        self.inner.epoch.elapsed().as_millis() as u64
    }

    fn touch(&self) {
        self.inner
            .last_activity
            .store(self.now_millis(), Ordering::SeqCst);
    }

    fn last_activity(&self) -> u64 {
        self.inner.last_activity.load(Ordering::SeqCst)
    }

    fn idle(&self) -> Duration {
        Duration::from_millis(self.now_millis().saturating_sub(self.last_activity()))
    }

    fn learn(&self, suggestion: &SuggestedCommand) {
        let mut learned = self
            .inner
            .learned
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !learned.contains(suggestion) {
            learned.push(suggestion.clone());
        }
    }

    // -----------------------------------------------------------------------
    // Session tasks
    // -----------------------------------------------------------------------

    async fn read_loop(self, session: u64, mut reader: OwnedReadHalf, cancel: CancellationToken) {
        let mut buf: Vec<u8> = Vec::with_capacity(READ_CHUNK);
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                read = reader.read(&mut chunk) => read,
            };

            match read {
                Ok(0) => {
                    self.report_error(session, Error::ConnectionLost);
                    return;
                }
                Ok(n) => {
                    self.touch();
                    buf.extend_from_slice(&chunk[..n]);
                    while let DecodeResult::Line { text, consumed } = decode_line(&buf) {
                        buf.drain(..consumed);
                        if !text.is_empty() {
                            self.process_line(&text).await;
                        }
                    }
                    if buf.len() > MAX_BUF {
                        warn!(len = buf.len(), "discarding unterminated input");
                        buf.clear();
                    }
                }
                Err(e) => {
                    self.report_error(session, Error::Io(e));
                    return;
                }
            }
        }
    }

    async fn process_line(&self, line: &str) {
        trace!(line, "received");
        let parsed = self.inner.protocol.handle_line(line, &self.inner.table);

        if let Some(suggestion) = parsed.suggested_command() {
            self.learn(suggestion);
        }
        if let Some(update) = parsed.state_update() {
            if self.inner.sink.merge(&update) {
                let _ = self.inner.event_tx.send(AvrEvent::StateUpdated {
                    attribute: update.attribute,
                    value: update.value,
                    message: parsed.message().to_string(),
                });
            }
        }
        self.inner.correlator.resolve(&parsed).await;
    }

    async fn drain_loop(self, session: u64, mut writer: OwnedWriteHalf, cancel: CancellationToken) {
        let interval = self.inner.config.message_interval;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_sent: Option<tokio::time::Instant> = None;

        loop {
            let tick = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                tick = ticker.tick() => tick,
            };
            if last_sent.is_some_and(|t| tick.duration_since(t) < interval) {
                continue;
            }

            let Some(command) = self.inner.correlator.pop().await else {
                continue;
            };

            trace!(message = %command, qos = command.qos(), "sending");
            let line = encode_line(command.body());
            let written = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                written = writer.write_all(&line) => written,
            };
            if let Err(e) = written {
                self.report_error(session, Error::Io(e));
                return;
            }

            last_sent = Some(tick);
            self.inner
                .correlator
                .mark_sent(&command, Instant::now())
                .await;
        }
    }

    async fn heartbeat_loop(self, session: u64, interval: Duration, cancel: CancellationToken) {
        loop {
            let idle = self.idle();
            if idle < interval {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(interval - idle) => continue,
                }
            }

            let Some(command) = self.inner.protocol.heartbeat_command(&self.inner.lookup) else {
                debug!("no heartbeat command, heartbeat disabled");
                return;
            };
            debug!(message = %command, idle = ?idle, "sending heartbeat");
            let seen = self.last_activity();
            if let Err(e) = self.inner.correlator.submit_silent(command).await {
                warn!(error = %e, "failed to queue heartbeat");
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.inner.config.heartbeat_grace) => {}
            }
            if self.last_activity() == seen {
                self.report_error(session, Error::HeartbeatTimeout);
                return;
            }
        }
    }
}
