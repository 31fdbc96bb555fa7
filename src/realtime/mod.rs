//! Realtime channel manager.
//!
//! Holds at most one live connection, opened when a session authenticates
//! and released when it ends. [`RealtimeChannel`] is registered with the
//! session core as a [`SessionObserver`], so open/close run inside the
//! session transition itself.
//!
//! The connection is an owned resource: [`Connection`] cancels its driver
//! task on drop, which covers logout, 401 expiry, shutdown and dropping the
//! channel. The driver then sends a Close frame; a driver still running after
//! `CLOSE_GRACE` is aborted. A driver that outlives its connection (between
//! cancellation and abort) cannot publish anything because every write is
//! checked against the current generation.

mod backoff;
mod events;
mod transport;

pub use backoff::ReconnectPolicy;
pub use events::{PushEvent, TICKET_UPDATE, decode_frame};
pub use transport::{Frame, FrameStream, Transport, WsTransport};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::credential::Credential;
use crate::session::{EndReason, SessionId, SessionObserver};

/// Interval between keep-alive pings on an open connection.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// A connection with no pong for this long is considered lost.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// How long a cancelled driver may take to close its socket.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No session, no connection.
    Idle,
    Connecting,
    Connected,
    /// Connection lost or refused; a reconnect may be pending.
    Disconnected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Idle => "idle",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected { reason: String },
    ConnectError { message: String },
    Push(PushEvent),
}

/// The live connection of one session.
pub struct Connection {
    id: Uuid,
    session: SessionId,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Connection {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn session(&self) -> SessionId {
        self.session
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move {
                        let abort = task.abort_handle();
                        if tokio::time::timeout(CLOSE_GRACE, task).await.is_err() {
                            tracing::debug!("realtime driver did not stop in time, aborting");
                            abort.abort();
                        }
                    });
                }
                Err(_) => task.abort(),
            }
        }
        tracing::debug!(connection = %self.id, session = %self.session, "realtime connection released");
    }
}

pub struct RealtimeChannel {
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    slot: Mutex<Option<Connection>>,
    events: broadcast::Sender<ChannelEvent>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    generation: Arc<AtomicU64>,
    opened: AtomicU64,
}

impl RealtimeChannel {
    pub fn new(transport: Arc<dyn Transport>, policy: ReconnectPolicy) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (status, _) = watch::channel(ConnectionStatus::Idle);
        Self {
            transport,
            policy,
            slot: Mutex::new(None),
            events,
            status: Arc::new(status),
            generation: Arc::new(AtomicU64::new(0)),
            opened: AtomicU64::new(0),
        }
    }

    /// Open a connection for `session`, replacing any existing one.
    ///
    /// Must be called from within a tokio runtime; outside one the call is
    /// logged and nothing is opened.
    pub fn open(&self, session: SessionId, credential: Credential) {
        let mut slot = self.lock();
        drop(slot.take());

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(session = %session, "no async runtime, realtime channel not opened");
            self.status.send_replace(ConnectionStatus::Idle);
            return;
        };

        let cancel = CancellationToken::new();
        let driver = Driver {
            transport: self.transport.clone(),
            credential,
            policy: self.policy,
            publisher: Publisher {
                generation,
                current: self.generation.clone(),
                events: self.events.clone(),
                status: self.status.clone(),
            },
            cancel: cancel.clone(),
        };
        let task = runtime.spawn(driver.run());

        let connection = Connection {
            id: Uuid::new_v4(),
            session,
            cancel,
            task: Some(task),
        };
        tracing::debug!(connection = %connection.id, session = %session, "realtime connection opened");
        *slot = Some(connection);
        self.opened.fetch_add(1, Ordering::SeqCst);
    }

    /// Release the current connection, if any.
    pub fn close(&self) {
        let mut slot = self.lock();
        let previous = slot.take();
        self.generation.fetch_add(1, Ordering::SeqCst);
        drop(previous);
        self.status.send_replace(ConnectionStatus::Idle);
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// Number of live connections; zero or one.
    pub fn connection_count(&self) -> usize {
        usize::from(self.is_open())
    }

    pub fn active_session(&self) -> Option<SessionId> {
        self.lock().as_ref().map(Connection::session)
    }

    /// Total connections opened over the channel's lifetime.
    pub fn opened_total(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Events from every connection this channel opens.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Connection>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionObserver for RealtimeChannel {
    fn on_authenticated(&self, id: SessionId, credential: &Credential) {
        self.open(id, credential.clone());
    }

    fn on_ended(&self, _id: Option<SessionId>, reason: EndReason) {
        if self.is_open() {
            tracing::debug!(reason = %reason, "closing realtime connection");
        }
        self.close();
    }
}

/// Write side of a driver; silent once its generation is no longer current.
struct Publisher {
    generation: u64,
    current: Arc<AtomicU64>,
    events: broadcast::Sender<ChannelEvent>,
    status: Arc<watch::Sender<ConnectionStatus>>,
}

impl Publisher {
    fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    fn status(&self, status: ConnectionStatus) {
        // Checked under the watch lock so a concurrent close() always wins.
        self.status.send_if_modified(|current| {
            if !self.is_current() || *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    fn event(&self, event: ChannelEvent) {
        if self.is_current() {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
    }
}

enum Exit {
    Cancelled,
    Lost(String),
}

struct Driver {
    transport: Arc<dyn Transport>,
    credential: Credential,
    policy: ReconnectPolicy,
    publisher: Publisher,
    cancel: CancellationToken,
}

impl Driver {
    async fn run(self) {
        let mut attempt: u32 = 0;

        loop {
            self.publisher.status(ConnectionStatus::Connecting);
            let connected = tokio::select! {
                _ = self.cancel.cancelled() => return,
                result = self.transport.connect(&self.credential) => result,
            };

            match connected {
                Ok(mut stream) => {
                    attempt = 0;
                    self.publisher.status(ConnectionStatus::Connected);
                    self.publisher.event(ChannelEvent::Connected);

                    match self.pump(stream.as_mut()).await {
                        Exit::Cancelled => {
                            let _ = stream.close().await;
                            return;
                        }
                        Exit::Lost(reason) => {
                            tracing::info!(%reason, "realtime connection lost");
                            self.publisher.status(ConnectionStatus::Disconnected);
                            self.publisher
                                .event(ChannelEvent::Disconnected { reason });
                        }
                    }
                }
                Err(e) => {
                    tracing::info!(error = %e, "realtime connect failed");
                    self.publisher.status(ConnectionStatus::Disconnected);
                    self.publisher.event(ChannelEvent::ConnectError {
                        message: e.to_string(),
                    });
                }
            }

            attempt += 1;
            let Some(delay) = self.policy.delay_for(attempt) else {
                tracing::warn!(attempts = attempt, "realtime reconnect attempts exhausted");
                return;
            };
            tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "realtime reconnect scheduled");
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Read frames until the connection ends or the driver is cancelled.
    async fn pump(&self, stream: &mut dyn FrameStream) -> Exit {
        enum Step {
            Cancel,
            Frame(Option<Result<Frame, crate::errors::RealtimeError>>),
            Ping,
        }

        let mut ping_interval = tokio::time::interval(PING_INTERVAL);
        // First tick is immediate.
        ping_interval.tick().await;
        let mut last_pong = Instant::now();

        loop {
            let step = tokio::select! {
                _ = self.cancel.cancelled() => Step::Cancel,
                frame = stream.next_frame() => Step::Frame(frame),
                _ = ping_interval.tick() => Step::Ping,
            };

            match step {
                Step::Cancel => return Exit::Cancelled,
                Step::Frame(None) => return Exit::Lost("connection closed by server".to_string()),
                Step::Frame(Some(Err(e))) => return Exit::Lost(e.to_string()),
                Step::Frame(Some(Ok(Frame::Pong))) => last_pong = Instant::now(),
                Step::Frame(Some(Ok(Frame::Text(text)))) => match decode_frame(&text) {
                    Ok(Some(event)) => {
                        tracing::debug!(event = event.name(), "push event");
                        self.publisher.event(ChannelEvent::Push(event));
                    }
                    Ok(None) => tracing::debug!("ignoring unhandled realtime event"),
                    Err(e) => tracing::warn!(error = %e, "ignoring malformed realtime frame"),
                },
                Step::Ping => {
                    if last_pong.elapsed() > PONG_TIMEOUT {
                        return Exit::Lost("pong timeout".to_string());
                    }
                    if let Err(e) = stream.ping().await {
                        return Exit::Lost(e.to_string());
                    }
                }
            }
        }
    }
}
