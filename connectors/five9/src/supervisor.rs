//! Connection supervision.
//!
//! A single actor task owns all per-session state: the discovered metadata,
//! the attribute schema, the socket and the heartbeat. Everything that can
//! change that state (commands, establishment progress, socket frames,
//! heartbeat ticks, scheduled retries) is funnelled through one `select!`
//! loop, so state transitions never interleave.
//!
//! Lifecycle of one epoch:
//!
//! ```text
//! Idle -> Establishing -> Open -> Closed
//!            |                      |
//!            +---- failure ---------+--> revive (new epoch) -> Establishing
//! ```
//!
//! Establishment (discovery, schema fetch, socket connect) runs in its own
//! task and reports back with epoch-tagged progress events. Progress from an
//! older epoch is discarded.

use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, error, info, warn};

use crate::attributes::CallAttributeResolver;
use crate::config::{Five9Config, Settings, WEB_SOCKET_RESOURCE};
use crate::decoder;
use crate::discovery::EndpointResolver;
use crate::error::{Five9Error, Five9Result, LossCause};
use crate::heartbeat::{HeartbeatCounter, Pulse};
use crate::http::{ResourceFetcher, join_url};
use crate::sink::NotificationSink;
use crate::transport::{SocketConnector, SocketEvent, SocketPair, SocketReader, SocketWriter};
use crate::types::{AttributeSchema, EventKind, SessionMetadata};

/// Text frame sent as heartbeat.
pub const PING_FRAME: &str = "ping";

/// Upper bound on a graceful close of a socket being discarded.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Supervisor phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing running and nothing scheduled.
    Idle,
    /// Discovery, schema fetch or socket connect in flight.
    Establishing,
    /// Socket open, heartbeat running.
    Open,
    /// Socket gone; a retry may be scheduled.
    Closed,
    /// `stop()` was called.
    Stopped,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Establishing => write!(f, "establishing"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Snapshot of the supervisor, published after every state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorStatus {
    pub phase: Phase,
    /// Current connection epoch; advanced by every revival and stop.
    pub epoch: u64,
    /// Revivals triggered by a lost connection.
    pub revivals: u64,
    /// Sockets successfully opened since spawn.
    pub sockets_opened: u64,
    /// Heartbeats sent since the last acknowledgment.
    pub skipped_beats: u32,
    pub has_metadata: bool,
    pub has_schema: bool,
}

/// Everything the supervisor needs to run.
pub struct SupervisorContext {
    pub config: Five9Config,
    pub settings: Settings,
    pub user_id: String,
    pub fetcher: Arc<dyn ResourceFetcher>,
    pub connector: Arc<dyn SocketConnector>,
    pub sink: Arc<dyn NotificationSink>,
}

/// Handle to a running connection supervisor.
///
/// Dropping the handle stops the supervisor: the socket is closed and all
/// timers are cancelled.
#[derive(Debug)]
pub struct ConnectionSupervisor {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SupervisorStatus>,
    task: JoinHandle<()>,
}

impl ConnectionSupervisor {
    /// Spawn the supervisor task. It stays idle until [`start`](Self::start).
    ///
    /// # Errors
    /// Returns `Five9Error::Configuration` if the discovery resource is
    /// missing or the settings are invalid.
    pub fn spawn(context: SupervisorContext) -> Five9Result<Self> {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (actor, status_rx) = SupervisorActor::new(context, command_rx)?;
        let task = tokio::spawn(actor.run());

        Ok(Self {
            commands: command_tx,
            status: status_rx,
            task,
        })
    }

    /// Start connecting. No-op while a socket is open or being established.
    ///
    /// # Errors
    /// Returns `Five9Error::SupervisorGone` if the supervisor task has exited.
    pub async fn start(&self) -> Five9Result<()> {
        self.request(Command::Start).await
    }

    /// Close the socket, cancel all timers and drop session state.
    ///
    /// # Errors
    /// Returns `Five9Error::SupervisorGone` if the supervisor task has exited.
    pub async fn stop(&self) -> Five9Result<()> {
        self.request(Command::Stop).await
    }

    /// Watch supervisor status changes.
    #[must_use]
    pub fn status(&self) -> watch::Receiver<SupervisorStatus> {
        self.status.clone()
    }

    /// Current status.
    #[must_use]
    pub fn snapshot(&self) -> SupervisorStatus {
        self.status.borrow().clone()
    }

    /// Stop and wait for the supervisor task to finish.
    ///
    /// # Errors
    /// Returns `Five9Error::SupervisorGone` if the task panicked.
    pub async fn shutdown(self) -> Five9Result<()> {
        let Self { commands, task, .. } = self;
        drop(commands);
        task.await.map_err(|_| Five9Error::SupervisorGone)
    }

    async fn request(&self, make: fn(oneshot::Sender<()>) -> Command) -> Five9Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .await
            .map_err(|_| Five9Error::SupervisorGone)?;
        reply_rx.await.map_err(|_| Five9Error::SupervisorGone)
    }
}

enum Command {
    Start(oneshot::Sender<()>),
    Stop(oneshot::Sender<()>),
}

/// Epoch-tagged report from an establishment task.
enum Progress {
    Discovered {
        epoch: u64,
        metadata: SessionMetadata,
    },
    SchemaResolved {
        epoch: u64,
        schema: Arc<AttributeSchema>,
    },
    Connected {
        epoch: u64,
        pair: SocketPair,
    },
    Failed {
        epoch: u64,
        error: Five9Error,
    },
}

impl Progress {
    const fn epoch(&self) -> u64 {
        match self {
            Self::Discovered { epoch, .. }
            | Self::SchemaResolved { epoch, .. }
            | Self::Connected { epoch, .. }
            | Self::Failed { epoch, .. } => *epoch,
        }
    }
}

/// Runs the discover -> schema -> connect sequence for one epoch.
struct Establisher {
    endpoints: EndpointResolver,
    attributes: CallAttributeResolver,
    connector: Arc<dyn SocketConnector>,
    socket_path: Option<String>,
    user_id: String,
    ws_scheme: &'static str,
}

impl Establisher {
    fn new(context: &SupervisorContext) -> Five9Result<Self> {
        Ok(Self {
            endpoints: EndpointResolver::new(
                &context.config,
                &context.settings,
                Arc::clone(&context.fetcher),
            )?,
            attributes: CallAttributeResolver::new(
                &context.config,
                &context.settings,
                Arc::clone(&context.fetcher),
            ),
            connector: Arc::clone(&context.connector),
            socket_path: context
                .config
                .resources
                .get(WEB_SOCKET_RESOURCE)
                .map(|descriptor| descriptor.resource_url.clone()),
            user_id: context.user_id.clone(),
            ws_scheme: context.settings.ws_scheme(),
        })
    }

    fn socket_url(&self, metadata: &SessionMetadata) -> Five9Result<String> {
        let path = self.socket_path.as_deref().ok_or_else(|| {
            Five9Error::Configuration(format!("missing required resource '{WEB_SOCKET_RESOURCE}'"))
        })?;
        let host = metadata.primary_host().ok_or_else(|| {
            Five9Error::Configuration("session metadata has no API host".into())
        })?;
        Ok(join_url(self.ws_scheme, host, &[path, &self.user_id]))
    }

    async fn run(self: Arc<Self>, epoch: u64, progress: mpsc::UnboundedSender<Progress>) {
        let metadata = self.endpoints.resolve().await;
        // Send failures mean the actor is gone; nothing left to report to.
        let _ = progress.send(Progress::Discovered {
            epoch,
            metadata: metadata.clone(),
        });

        let report = match self.connect(epoch, &metadata, &progress).await {
            Ok(pair) => Progress::Connected { epoch, pair },
            Err(error) => Progress::Failed { epoch, error },
        };
        let _ = progress.send(report);
    }

    async fn connect(
        &self,
        epoch: u64,
        metadata: &SessionMetadata,
        progress: &mpsc::UnboundedSender<Progress>,
    ) -> Five9Result<SocketPair> {
        let schema = self.attributes.resolve(metadata).await?;
        let _ = progress.send(Progress::SchemaResolved {
            epoch,
            schema: Arc::new(schema),
        });

        let url = self.socket_url(metadata)?;
        info!(url = %url, epoch, "Opening event socket");
        self.connector.connect(&url).await
    }
}

/// An open socket owned by the supervisor.
struct Connection {
    writer: Box<dyn SocketWriter>,
    reader: Box<dyn SocketReader>,
}

/// All per-session state. Only the actor touches it.
struct SessionState {
    phase: Phase,
    epoch: u64,
    metadata: Option<SessionMetadata>,
    schema: Option<Arc<AttributeSchema>>,
    connection: Option<Connection>,
    heartbeat: HeartbeatCounter,
    heartbeat_timer: Option<Interval>,
    establishing: Option<JoinHandle<()>>,
    retry_at: Option<Pin<Box<Sleep>>>,
    revivals: u64,
    sockets_opened: u64,
    max_skipped_beats: u32,
}

impl SessionState {
    const fn new(max_skipped_beats: u32) -> Self {
        Self {
            phase: Phase::Idle,
            epoch: 0,
            metadata: None,
            schema: None,
            connection: None,
            heartbeat: HeartbeatCounter::new(max_skipped_beats),
            heartbeat_timer: None,
            establishing: None,
            retry_at: None,
            revivals: 0,
            sockets_opened: 0,
            max_skipped_beats,
        }
    }

    fn snapshot(&self) -> SupervisorStatus {
        SupervisorStatus {
            phase: self.phase,
            epoch: self.epoch,
            revivals: self.revivals,
            sockets_opened: self.sockets_opened,
            skipped_beats: self.heartbeat.skipped(),
            has_metadata: self.metadata.is_some(),
            has_schema: self.schema.is_some(),
        }
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        if let Some(task) = self.establishing.take() {
            task.abort();
        }
    }
}

enum Step {
    Command(Option<Command>),
    Progress(Progress),
    Socket(SocketEvent),
    Beat,
    Retry,
}

struct SupervisorActor {
    establisher: Arc<Establisher>,
    settings: Settings,
    sink: Arc<dyn NotificationSink>,
    commands: mpsc::Receiver<Command>,
    progress_tx: mpsc::UnboundedSender<Progress>,
    progress_rx: mpsc::UnboundedReceiver<Progress>,
    status: watch::Sender<SupervisorStatus>,
    state: SessionState,
}

impl SupervisorActor {
    fn new(
        context: SupervisorContext,
        commands: mpsc::Receiver<Command>,
    ) -> Five9Result<(Self, watch::Receiver<SupervisorStatus>)> {
        context.settings.validate()?;
        let establisher = Arc::new(Establisher::new(&context)?);

        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let state = SessionState::new(context.settings.max_skipped_beats);
        let (status_tx, status_rx) = watch::channel(state.snapshot());

        let actor = Self {
            establisher,
            settings: context.settings,
            sink: context.sink,
            commands,
            progress_tx,
            progress_rx,
            status: status_tx,
            state,
        };
        Ok((actor, status_rx))
    }

    async fn run(mut self) {
        loop {
            let state = &mut self.state;
            let step = tokio::select! {
                command = self.commands.recv() => Step::Command(command),
                Some(progress) = self.progress_rx.recv() => Step::Progress(progress),
                event = next_socket_event(state.connection.as_mut()) => Step::Socket(event),
                () = next_beat(state.heartbeat_timer.as_mut()) => Step::Beat,
                () = retry_due(state.retry_at.as_mut()) => Step::Retry,
            };

            match step {
                Step::Command(Some(Command::Start(reply))) => {
                    if self.state.phase == Phase::Closed {
                        self.discard_epoch().await;
                    }
                    self.start();
                    let _ = reply.send(());
                }
                Step::Command(Some(Command::Stop(reply))) => {
                    self.stop().await;
                    let _ = reply.send(());
                }
                Step::Command(None) => {
                    self.stop().await;
                    debug!("Supervisor handle dropped, exiting");
                    return;
                }
                Step::Progress(progress) => self.on_progress(progress).await,
                Step::Socket(SocketEvent::Text(text)) => self.on_message(&text),
                Step::Socket(SocketEvent::Closed { frame, detail }) => {
                    self.on_close(frame.map(|f| f.code), &detail).await;
                }
                Step::Beat => self.on_beat().await,
                Step::Retry => {
                    self.state.retry_at = None;
                    info!(epoch = self.state.epoch, "Retrying connection establishment");
                    self.discard_epoch().await;
                    self.start();
                }
            }
        }
    }

    fn publish(&self) {
        self.status.send_replace(self.state.snapshot());
    }

    /// Begin establishing unless a socket exists or establishment is running.
    fn start(&mut self) {
        if self.state.connection.is_some() || self.state.establishing.is_some() {
            debug!(phase = %self.state.phase, "Start ignored, connection already active");
            return;
        }

        self.state.retry_at = None;
        self.state.phase = Phase::Establishing;
        let epoch = self.state.epoch;
        info!(epoch, "Establishing connection");

        let establisher = Arc::clone(&self.establisher);
        let progress = self.progress_tx.clone();
        self.state.establishing = Some(tokio::spawn(establisher.run(epoch, progress)));
        self.publish();
    }

    async fn stop(&mut self) {
        self.discard_epoch().await;
        self.state.phase = Phase::Stopped;
        info!(epoch = self.state.epoch, "Connection supervisor stopped");
        self.publish();
    }

    /// Tear down a lost connection and start over.
    async fn revive(&mut self, cause: LossCause) {
        let lost = Five9Error::ConnectionLost { cause };
        warn!(error = %lost, epoch = self.state.epoch, "Reviving connection");
        self.state.revivals += 1;
        self.discard_epoch().await;
        self.start();
    }

    /// Drop everything that belongs to the current epoch and advance it.
    async fn discard_epoch(&mut self) {
        let state = &mut self.state;
        if let Some(task) = state.establishing.take() {
            task.abort();
        }
        state.retry_at = None;
        state.metadata = None;
        state.schema = None;
        state.heartbeat_timer = None;
        state.heartbeat = HeartbeatCounter::new(state.max_skipped_beats);
        if let Some(connection) = state.connection.take() {
            close_quietly(connection.writer).await;
        }
        state.epoch += 1;
        state.phase = Phase::Idle;
    }

    async fn on_progress(&mut self, progress: Progress) {
        if progress.epoch() != self.state.epoch {
            debug!(
                stale_epoch = progress.epoch(),
                epoch = self.state.epoch,
                "Discarding stale establishment result"
            );
            if let Progress::Connected { pair, .. } = progress {
                close_quietly(pair.writer).await;
            }
            return;
        }

        match progress {
            Progress::Discovered { metadata, .. } => {
                self.state.metadata = Some(metadata);
            }
            Progress::SchemaResolved { schema, .. } => {
                self.state.schema = Some(schema);
            }
            Progress::Connected { pair, .. } => {
                self.state.establishing = None;
                self.on_open(pair);
            }
            Progress::Failed { error, .. } => {
                self.state.establishing = None;
                self.on_establish_failed(&error);
            }
        }
        self.publish();
    }

    fn on_open(&mut self, pair: SocketPair) {
        let period = self.settings.heartbeat_interval();
        let mut timer = tokio::time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let state = &mut self.state;
        state.connection = Some(Connection {
            writer: pair.writer,
            reader: pair.reader,
        });
        state.heartbeat = HeartbeatCounter::new(state.max_skipped_beats);
        state.heartbeat_timer = Some(timer);
        state.sockets_opened += 1;
        state.phase = Phase::Open;
        info!(epoch = state.epoch, "Connection open, heartbeat started");
    }

    fn on_establish_failed(&mut self, error: &Five9Error) {
        if !error.is_retryable() {
            error!(error = %error, "Connection establishment failed, not retrying");
            self.state.metadata = None;
            self.state.schema = None;
            self.state.phase = Phase::Idle;
            return;
        }

        let delay = self.settings.establish_retry();
        warn!(error = %error, retry_in = ?delay, "Connection establishment failed");
        self.state.phase = Phase::Closed;
        self.state.retry_at = Some(Box::pin(tokio::time::sleep(delay)));
    }

    fn on_message(&mut self, text: &str) {
        let Some(notification) = decoder::decode(text, self.state.schema.as_deref()) else {
            return;
        };
        if notification.kind == EventKind::HeartbeatAck {
            self.state.heartbeat.acknowledge();
            debug!("Heartbeat acknowledged");
            self.publish();
        }
        self.sink.on_notification(notification);
    }

    async fn on_close(&mut self, code: Option<u16>, detail: &str) {
        let state = &mut self.state;
        state.heartbeat_timer = None;
        state.connection = None;
        state.phase = Phase::Closed;
        info!(code = ?code, detail = %detail, epoch = state.epoch, "Socket closed");

        if self.settings.revives_on_close(code) {
            let cause = match code {
                Some(code) if self.settings.revive_close_codes.contains(&code) => {
                    LossCause::ForcedClose { code }
                }
                _ => LossCause::UnexpectedClose { code },
            };
            self.revive(cause).await;
        } else {
            warn!(code = ?code, "Socket closed without a revivable close code, staying down");
            self.publish();
        }
    }

    async fn on_beat(&mut self) {
        let pulse = self.state.heartbeat.record_send();
        if let Some(connection) = self.state.connection.as_mut() {
            match connection.writer.send_text(PING_FRAME).await {
                Ok(()) => debug!(skipped = self.state.heartbeat.skipped(), "Sent heartbeat"),
                Err(e) => warn!(error = %e, "Failed to send heartbeat"),
            }
        }
        self.publish();

        if let Pulse::Flatlined { skipped_beats } = pulse {
            self.revive(LossCause::HeartbeatTimeout { skipped_beats })
                .await;
        }
    }
}

async fn close_quietly(mut writer: Box<dyn SocketWriter>) {
    match tokio::time::timeout(CLOSE_TIMEOUT, writer.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "Error closing discarded socket"),
        Err(_) => debug!("Timed out closing discarded socket"),
    }
}

async fn next_socket_event(connection: Option<&mut Connection>) -> SocketEvent {
    match connection {
        Some(connection) => connection.reader.next_event().await,
        None => std::future::pending().await,
    }
}

async fn next_beat(timer: Option<&mut Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn retry_due(sleep: Option<&mut Pin<Box<Sleep>>>) {
    match sleep {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
