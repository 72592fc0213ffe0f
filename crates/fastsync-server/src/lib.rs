//! Fastsync production server.
//!
//! Room-based WebSocket relay: clients join a room by key, exchange JSON
//! control messages, and stream binary state that the server merges into one
//! buffer per room and pushes back to every member at a fixed rate.
//!
//! # Architecture
//!
//! The [`ServerDriver`] follows the Sans-IO pattern: it consumes
//! [`ServerEvent`]s and returns [`ServerAction`]s without touching sockets or
//! clocks. [`Server`] is the production glue that owns the WebSocket listener,
//! the heartbeat and sync timers, and one writer task per session, and
//! executes the driver's actions.
//!
//! # Components
//!
//! - [`ServerDriver`]: Action-based orchestrator (pure logic, no I/O)
//! - [`Server`]: Production runtime that executes ServerDriver actions
//! - [`WsTransport`]: WebSocket listener via tokio-tungstenite
//! - [`Installations`]: One server per bind address, shared across callers

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod directory;
mod driver;
mod error;
mod server_error;
mod transport;

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use bytes::Bytes;
pub use directory::RoomDirectory;
pub use driver::{
    DriverConfig, LogLevel, OutboundMessage, ServerAction, ServerDriver, ServerEvent,
};
pub use error::ServerError;
use fastsync_core::ConnId;
use futures_util::{SinkExt, StreamExt};
pub use server_error::{DriverError, ExecutorError};
use tokio::{
    sync::{Mutex, Notify, RwLock, mpsc},
    time::MissedTickBehavior,
};
use tokio_tungstenite::tungstenite::Message;
pub use transport::{PendingConnection, WsStream, WsTransport};

/// Outbound half of one session, owned by the runtime.
struct SessionHandle {
    /// Queue drained by the session's writer task
    tx: mpsc::UnboundedSender<Message>,
    /// Wakes the session's reader to force termination
    kill: Arc<Notify>,
}

/// Shared state for all connections.
///
/// Maps session ids to their writer queues for message routing.
struct SharedState {
    sessions: RwLock<HashMap<ConnId, SessionHandle>>,
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:8080")
    pub bind_address: String,
    /// Driver configuration (debug diagnostics, intervals, eviction)
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0:8080".to_string(), driver: DriverConfig::default() }
    }
}

/// Production fastsync server.
///
/// Wraps `ServerDriver` with the WebSocket transport and Tokio timers.
pub struct Server {
    /// The action-based server driver
    driver: Arc<Mutex<ServerDriver>>,
    /// WebSocket listener
    transport: WsTransport,
    /// Session writer queues
    shared: Arc<SharedState>,
    /// Configuration the server was bound with
    config: ServerRuntimeConfig,
    /// Set while `run` is active
    running: AtomicBool,
    /// Stops `run`
    shutdown: Notify,
}

impl Server {
    /// Create and bind a new server.
    pub async fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        if config.driver.heartbeat_interval.is_zero() {
            return Err(ServerError::Config("heartbeat interval must be non-zero".to_string()));
        }
        if config.driver.sync_interval.is_zero() {
            return Err(ServerError::Config("sync interval must be non-zero".to_string()));
        }

        let transport = WsTransport::bind(&config.bind_address).await?;
        let driver = ServerDriver::new(config.driver.clone());

        Ok(Self {
            driver: Arc::new(Mutex::new(driver)),
            transport,
            shared: Arc::new(SharedState { sessions: RwLock::new(HashMap::new()) }),
            config,
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
        })
    }

    /// Run the server, accepting connections and driving both timers.
    ///
    /// Runs until [`Server::shutdown`] is called. Calling `run` while it is
    /// already running returns immediately.
    pub async fn run(&self) -> Result<(), ServerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::debug!("Server on {} already running", self.config.bind_address);
            return Ok(());
        }

        tracing::info!("Server starting on {}", self.transport.local_addr()?);

        let heartbeat = run_ticker(
            Arc::clone(&self.driver),
            Arc::clone(&self.shared),
            self.config.driver.heartbeat_interval,
            ServerEvent::HeartbeatTick,
        );
        let sync = run_ticker(
            Arc::clone(&self.driver),
            Arc::clone(&self.shared),
            self.config.driver.sync_interval,
            ServerEvent::SyncTick,
        );

        tokio::select! {
            () = self.accept_loop() => {},
            () = heartbeat => {},
            () = sync => {},
            () = self.shutdown.notified() => {
                tracing::info!("Server on {} shutting down", self.config.bind_address);
            },
        }

        // Force every remaining session closed. Readers woken by `kill` do not
        // report the close themselves, so disconnect them here.
        let mut driver = self.driver.lock().await;
        let mut sessions = self.shared.sessions.write().await;
        for (session_id, handle) in sessions.drain() {
            let reason = "server shutdown".to_string();
            if let Err(e) = driver.process_event(ServerEvent::ConnectionClosed { session_id, reason })
            {
                tracing::warn!("Shutdown disconnect error for {}: {}", session_id, e);
            }
            handle.kill.notify_one();
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Stop a running server and terminate its sessions.
    ///
    /// If the server is not running yet, the next `run` returns right away.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    async fn accept_loop(&self) {
        loop {
            match self.transport.accept().await {
                Ok(pending) => {
                    let driver = Arc::clone(&self.driver);
                    let shared = Arc::clone(&self.shared);

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(pending, driver, shared).await {
                            tracing::debug!("Connection error: {}", e);
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Configuration the server was bound with.
    pub fn config(&self) -> &ServerRuntimeConfig {
        &self.config
    }

    /// Whether `run` is currently active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.driver.lock().await.connection_count()
    }

    /// Members of a room in join order.
    pub async fn members(&self, room_key: &str) -> Vec<ConnId> {
        self.driver.lock().await.members(room_key)
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("bind_address", &self.config.bind_address)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Installed servers keyed by bind address.
///
/// Installing twice on the same address returns the same [`Server`], so every
/// caller shares one driver and one set of rooms.
#[derive(Default)]
pub struct Installations {
    servers: Mutex<HashMap<String, Arc<Server>>>,
}

impl Installations {
    /// Create an empty installation cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Server for `config.bind_address`, binding a new one on first use.
    ///
    /// The rest of `config` is ignored when a server is already installed.
    pub async fn install(&self, config: ServerRuntimeConfig) -> Result<Arc<Server>, ServerError> {
        let mut servers = self.servers.lock().await;

        if let Some(server) = servers.get(&config.bind_address) {
            return Ok(Arc::clone(server));
        }

        let bind_address = config.bind_address.clone();
        let server = Arc::new(Server::bind(config).await?);
        servers.insert(bind_address, Arc::clone(&server));

        Ok(server)
    }

    /// Remove and shut down the server installed on `bind_address`.
    pub async fn uninstall(&self, bind_address: &str) -> Option<Arc<Server>> {
        let server = self.servers.lock().await.remove(bind_address)?;
        server.shutdown();
        Some(server)
    }

    /// Number of installed servers.
    pub async fn len(&self) -> usize {
        self.servers.lock().await.len()
    }

    /// No servers installed.
    pub async fn is_empty(&self) -> bool {
        self.servers.lock().await.is_empty()
    }
}

/// Feed `event` to the driver every `period`.
async fn run_ticker(
    driver: Arc<Mutex<ServerDriver>>,
    shared: Arc<SharedState>,
    period: Duration,
    event: ServerEvent,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // First tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if let Err(e) = dispatch(&driver, &shared, event.clone()).await {
            tracing::warn!("Tick processing error: {}", e);
        }
    }
}

/// Handle a single WebSocket connection.
async fn handle_connection(
    pending: PendingConnection,
    driver: Arc<Mutex<ServerDriver>>,
    shared: Arc<SharedState>,
) -> Result<(), ServerError> {
    let peer = pending.peer_addr();
    let ws = pending.upgrade().await?;
    let (mut sink, mut stream) = ws.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let kill = Arc::new(Notify::new());

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = sink.send(msg).await {
                tracing::debug!("Writer send error: {}", e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Register the writer before the handshake goes out
    let session_id = {
        let mut driver = driver.lock().await;
        let (session_id, actions) = driver.accept();
        let handle = SessionHandle { tx, kill: Arc::clone(&kill) };
        shared.sessions.write().await.insert(session_id, handle);
        execute_actions(actions, &shared).await;
        session_id
    };

    tracing::debug!("New connection {} from {}", session_id, peer);

    let reason = loop {
        let event = tokio::select! {
            () = kill.notified() => break None,
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    ServerEvent::TextReceived { session_id, text }
                },
                Some(Ok(Message::Binary(data))) => {
                    ServerEvent::BinaryReceived { session_id, data: Bytes::from(data) }
                },
                Some(Ok(Message::Pong(_))) => ServerEvent::PongReceived { session_id },
                Some(Ok(Message::Close(_))) => break Some("closed by peer".to_string()),
                // Pings are answered by tungstenite
                Some(Ok(_)) => continue,
                Some(Err(e)) => break Some(format!("read error: {e}")),
                None => break Some("stream ended".to_string()),
            },
        };

        match dispatch_session(&driver, &shared, session_id, &kill, event).await {
            Ok(true) => {},
            Ok(false) => break None,
            Err(e) => tracing::debug!("Event processing error for {}: {}", session_id, e),
        }
    };

    let Some(reason) = reason else {
        // Terminated: the disconnect procedure already ran
        writer.abort();
        tracing::debug!("Connection {} terminated", session_id);
        return Ok(());
    };

    close_session(&driver, &shared, session_id, &kill, reason).await
}

/// Process one event and execute the resulting actions.
///
/// The driver lock is held while actions execute so that messages from
/// consecutive events are queued in the order the driver produced them.
async fn dispatch(
    driver: &Mutex<ServerDriver>,
    shared: &SharedState,
    event: ServerEvent,
) -> Result<(), ServerError> {
    let mut driver = driver.lock().await;
    let actions = driver.process_event(event)?;
    execute_actions(actions, shared).await;
    Ok(())
}

/// Like [`dispatch`], for an event read from a session's socket.
///
/// Returns `Ok(false)` without processing if the session was terminated in
/// the meantime. Its id may already belong to a newer connection.
async fn dispatch_session(
    driver: &Mutex<ServerDriver>,
    shared: &SharedState,
    session_id: ConnId,
    kill: &Arc<Notify>,
    event: ServerEvent,
) -> Result<bool, ServerError> {
    let mut driver = driver.lock().await;
    if !owns_session(&*shared.sessions.read().await, session_id, kill) {
        return Ok(false);
    }

    let actions = driver.process_event(event)?;
    execute_actions(actions, shared).await;
    Ok(true)
}

/// Unregister a session's writer and run the disconnect procedure, unless
/// the session was already terminated.
async fn close_session(
    driver: &Mutex<ServerDriver>,
    shared: &SharedState,
    session_id: ConnId,
    kill: &Arc<Notify>,
    reason: String,
) -> Result<(), ServerError> {
    let mut driver = driver.lock().await;
    {
        let mut sessions = shared.sessions.write().await;
        if !owns_session(&sessions, session_id, kill) {
            return Ok(());
        }
        sessions.remove(&session_id);
    }

    let actions = driver.process_event(ServerEvent::ConnectionClosed { session_id, reason })?;
    execute_actions(actions, shared).await;
    Ok(())
}

/// `kill` identifies the handle registered by one particular connection.
fn owns_session(
    sessions: &HashMap<ConnId, SessionHandle>,
    session_id: ConnId,
    kill: &Arc<Notify>,
) -> bool {
    sessions.get(&session_id).is_some_and(|handle| Arc::ptr_eq(&handle.kill, kill))
}

/// Execute server actions.
///
/// Delivery failures are logged per session and never abort the batch.
async fn execute_actions(actions: Vec<ServerAction>, shared: &SharedState) {
    for action in actions {
        match action {
            ServerAction::SendToSession { session_id, message } => {
                let sessions = shared.sessions.read().await;
                report(deliver(&sessions, session_id, to_ws_message(message)));
            },

            ServerAction::Broadcast { session_ids, message } => {
                let message = to_ws_message(message);
                let sessions = shared.sessions.read().await;
                for session_id in session_ids {
                    report(deliver(&sessions, session_id, message.clone()));
                }
            },

            ServerAction::Terminate { session_id, reason } => {
                tracing::info!("Terminating connection {}: {}", session_id, reason);
                let mut sessions = shared.sessions.write().await;
                if let Some(handle) = sessions.remove(&session_id) {
                    handle.kill.notify_one();
                }
            },

            ServerAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
        }
    }
}

/// Queue `message` on a session's writer.
fn deliver(
    sessions: &HashMap<ConnId, SessionHandle>,
    session_id: ConnId,
    message: Message,
) -> Result<(), ExecutorError> {
    let handle = sessions.get(&session_id).ok_or(ExecutorError::UnknownSession(session_id))?;

    handle
        .tx
        .send(message)
        .map_err(|e| ExecutorError::SendFailed { session_id, reason: e.to_string() })
}

fn report(result: Result<(), ExecutorError>) {
    match result {
        Ok(()) => {},
        // Session closed between the driver's decision and delivery
        Err(e @ ExecutorError::UnknownSession(_)) => tracing::debug!("{}", e),
        Err(e) => tracing::warn!("{}", e),
    }
}

fn to_ws_message(message: OutboundMessage) -> Message {
    match message {
        OutboundMessage::Text(text) => Message::Text(text),
        OutboundMessage::Binary(data) => Message::Binary(data.to_vec()),
        OutboundMessage::Ping => Message::Ping(Vec::new()),
    }
}
