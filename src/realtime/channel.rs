//! Long-lived push subscription with automatic reconnect.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::backoff::ReconnectPolicy;
use super::event::RealtimeEvent;
use super::protocol::{self, HubMessage};
use super::transport::{Connector, Transport};
use crate::error::ChannelError;

/// Connection state shown to the user as a passive indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelStatus {
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// Closed by the owner, or retries exhausted.
    Disconnected,
}

/// Parameters of one channel.
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Hub URL, already carrying the bearer token.
    pub url: Url,
    /// Subject announced by the join call after every connect.
    pub subject_id: String,
    pub join_method: String,
    pub reconnect: ReconnectPolicy,
    /// Interval between client pings. `None` disables them.
    pub keep_alive: Option<Duration>,
    /// Longest the server may stay silent before the connection counts as
    /// lost. `None` waits forever.
    pub server_timeout: Option<Duration>,
}

impl ChannelOptions {
    pub fn new(url: Url, subject_id: impl Into<String>) -> Self {
        Self {
            url,
            subject_id: subject_id.into(),
            join_method: "JoinGroup".to_string(),
            reconnect: ReconnectPolicy::default(),
            keep_alive: Some(Duration::from_secs(15)),
            server_timeout: Some(Duration::from_secs(30)),
        }
    }

    pub fn with_join_method(mut self, method: impl Into<String>) -> Self {
        self.join_method = method.into();
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_keep_alive(mut self, interval: Option<Duration>) -> Self {
        self.keep_alive = interval;
        self
    }

    pub fn with_server_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.server_timeout = timeout;
        self
    }
}

#[derive(Debug)]
struct Shared {
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
    status: watch::Sender<ChannelStatus>,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn set_status(&self, status: ChannelStatus) {
        // a closed channel stays Disconnected
        if self.is_closed() && status != ChannelStatus::Disconnected {
            return;
        }
        self.status.send_replace(status);
    }
}

/// Owner's side of a channel: status and teardown.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    shared: Arc<Shared>,
}

impl ChannelHandle {
    pub fn status(&self) -> ChannelStatus {
        self.shared.status.borrow().clone()
    }

    /// Receiver that observes every status change.
    pub fn watch_status(&self) -> watch::Receiver<ChannelStatus> {
        self.shared.status.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Closes the channel. No event is delivered afterwards, including ones
    /// already queued. Closing twice is a no-op.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.shutdown.send_replace(true);
        self.shared.status.send_replace(ChannelStatus::Disconnected);
        debug!("realtime channel closed by owner");
    }

    /// Closes the channel and waits for the connection task to finish.
    pub async fn shutdown(&self) {
        self.close();
        let task = self.shared.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "realtime channel task ended abnormally");
            }
        }
    }
}

/// Consumer's side of a channel.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<RealtimeEvent>,
    shared: Arc<Shared>,
}

impl EventStream {
    /// Next event, or `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<RealtimeEvent> {
        if self.shared.is_closed() {
            return None;
        }
        let event = self.rx.recv().await?;
        // the owner may have closed while we were waiting
        (!self.shared.is_closed()).then_some(event)
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<RealtimeEvent> {
        if self.shared.is_closed() {
            return None;
        }
        self.rx.try_recv().ok()
    }
}

/// Entry point for opening channels.
pub struct RealtimeChannel;

impl RealtimeChannel {
    /// Spawns the connection task. Must be called inside a tokio runtime.
    pub fn open<C: Connector>(
        connector: C,
        options: ChannelOptions,
    ) -> (ChannelHandle, EventStream) {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (status, _) = watch::channel(ChannelStatus::Connecting);
        let (tx, rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            closed: AtomicBool::new(false),
            shutdown,
            status,
            task: parking_lot::Mutex::new(None),
        });

        let worker = Worker {
            connector,
            options,
            shared: Arc::clone(&shared),
            events: tx,
            next_invocation: AtomicU64::new(0),
        };
        let task = tokio::spawn(worker.run(shutdown_rx));
        *shared.task.lock() = Some(task);

        (
            ChannelHandle {
                shared: Arc::clone(&shared),
            },
            EventStream { rx, shared },
        )
    }
}

enum Disconnect {
    Shutdown,
    Lost(ChannelError),
    ServerClosed { error: Option<String>, allow_reconnect: bool },
}

struct Connection {
    transport: Box<dyn Transport>,
    pending: VecDeque<String>,
}

impl Connection {
    async fn next_frame(&mut self) -> Result<String, ChannelError> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(frame);
            }
            match self.transport.recv_text().await {
                Some(Ok(payload)) => self
                    .pending
                    .extend(protocol::split_frames(&payload).map(str::to_string)),
                Some(Err(e)) => return Err(e),
                None => return Err(ChannelError::Closed("peer closed the connection".to_string())),
            }
        }
    }
}

struct Worker<C> {
    connector: C,
    options: ChannelOptions,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<RealtimeEvent>,
    next_invocation: AtomicU64,
}

impl<C: Connector> Worker<C> {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut attempt: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let established = tokio::select! {
                _ = shutdown.changed() => break,
                result = self.establish() => result,
            };

            let reason = match established {
                Ok(conn) => {
                    attempt = 0;
                    self.shared.set_status(ChannelStatus::Connected);
                    info!(subject = %self.options.subject_id, "realtime channel connected");
                    self.pump(conn, &mut shutdown).await
                }
                Err(e) => Disconnect::Lost(e),
            };

            match reason {
                Disconnect::Shutdown => break,
                Disconnect::ServerClosed {
                    error,
                    allow_reconnect: false,
                } => {
                    warn!(?error, "server closed the realtime channel");
                    break;
                }
                Disconnect::ServerClosed { error, .. } => {
                    warn!(?error, "server closed the realtime channel, reconnecting");
                }
                Disconnect::Lost(e) => warn!(error = %e, "realtime channel lost"),
            }

            attempt += 1;
            let Some(delay) = self.options.reconnect.delay_for_attempt(attempt) else {
                warn!(attempts = attempt - 1, "giving up on realtime channel");
                break;
            };
            self.shared.set_status(ChannelStatus::Reconnecting { attempt });
            debug!(attempt, ?delay, "reconnecting realtime channel");

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.shared.set_status(ChannelStatus::Disconnected);
    }

    /// Connects, completes the handshake, and joins as the subject.
    async fn establish(&self) -> Result<Connection, ChannelError> {
        let transport = self.connector.connect(&self.options.url).await?;
        let mut conn = Connection {
            transport,
            pending: VecDeque::new(),
        };

        conn.transport.send_text(protocol::handshake_request()).await?;
        protocol::parse_handshake_response(&conn.next_frame().await?)?;

        // join only once the handshake has resolved
        let id = self.next_invocation.fetch_add(1, Ordering::Relaxed).to_string();
        let join = protocol::invocation(
            &id,
            &self.options.join_method,
            &[Value::String(self.options.subject_id.clone())],
        )?;
        conn.transport.send_text(join).await?;

        loop {
            match protocol::parse_message(&conn.next_frame().await?)? {
                HubMessage::Completion {
                    invocation_id,
                    error,
                    ..
                } if invocation_id == id => {
                    return match error {
                        Some(error) => Err(ChannelError::Join(error)),
                        None => Ok(conn),
                    };
                }
                HubMessage::Invocation {
                    target, arguments, ..
                } => self.deliver(&target, arguments),
                HubMessage::Close { error, .. } => {
                    let reason = error.unwrap_or_else(|| "closed during join".to_string());
                    return Err(ChannelError::Closed(reason));
                }
                _ => {}
            }
        }
    }

    async fn pump(&self, mut conn: Connection, shutdown: &mut watch::Receiver<bool>) -> Disconnect {
        let mut keep_alive = self.options.keep_alive.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        let mut last_frame = Instant::now();

        loop {
            let deadline = self.options.server_timeout.map(|timeout| last_frame + timeout);
            let server_silent = async move {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };
            let ping_due = async {
                match keep_alive.as_mut() {
                    Some(ticker) => {
                        ticker.tick().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = shutdown.changed() => {
                    conn.transport.close().await;
                    return Disconnect::Shutdown;
                }
                _ = server_silent => {
                    conn.transport.close().await;
                    return Disconnect::Lost(ChannelError::Closed("server timeout".to_string()));
                }
                _ = ping_due => {
                    if let Err(e) = conn.transport.send_text(protocol::ping()).await {
                        return Disconnect::Lost(e);
                    }
                }
                frame = conn.next_frame() => {
                    let frame = match frame {
                        Ok(frame) => frame,
                        Err(e) => return Disconnect::Lost(e),
                    };
                    last_frame = Instant::now();
                    match protocol::parse_message(&frame) {
                        Ok(HubMessage::Invocation { target, arguments, .. }) => {
                            self.deliver(&target, arguments)
                        }
                        Ok(HubMessage::Close { error, allow_reconnect }) => {
                            return Disconnect::ServerClosed { error, allow_reconnect };
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "dropping unreadable hub frame"),
                    }
                }
            }
        }
    }

    fn deliver(&self, target: &str, arguments: Vec<Value>) {
        if self.shared.is_closed() {
            return;
        }
        match RealtimeEvent::from_invocation(target, arguments) {
            Ok(Some(event)) => {
                if self.events.send(event).is_err() {
                    // the consumer dropped its stream: treat as unmount
                    debug!("event stream dropped, closing realtime channel");
                    self.shared.closed.store(true, Ordering::Release);
                    self.shared.shutdown.send_replace(true);
                }
            }
            Ok(None) => debug!(target, "ignoring unknown hub method"),
            Err(e) => warn!(error = %e, "dropping malformed hub event"),
        }
    }
}
