use crate::core::errors::{ErrorClass, ExchangeError};
use crate::core::kernel::codec::WsCodec;
use crate::core::types::ConnectionState;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, instrument, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connection configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Connection timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Application-level keep-alive interval in milliseconds
    pub keepalive_interval_ms: u64,
    /// How long `request` style helpers wait for a correlated reply
    pub request_timeout_ms: u64,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,     // 10 seconds
            keepalive_interval_ms: 180_000, // 3 minutes
            request_timeout_ms: 10_000,
        }
    }
}

impl WsConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// WebSocket session trait - pure transport layer
#[async_trait]
pub trait WsSession<C: WsCodec>: Send {
    /// Connect to the WebSocket; resolves once the transport reports open
    async fn connect(&mut self) -> Result<(), ExchangeError>;

    /// Send a raw message
    async fn send_raw(&mut self, msg: Message) -> Result<(), ExchangeError>;

    /// Receive the next data frame. `None` once the peer closed the socket.
    async fn next_raw(&mut self) -> Option<Result<Message, ExchangeError>>;

    /// Close the connection
    async fn close(&mut self) -> Result<(), ExchangeError>;

    /// Check if the connection is alive
    fn is_connected(&self) -> bool;

    /// Codec used by [`WsSession::next_message`]
    fn codec(&self) -> &C;

    /// Get the next decoded message, skipping frames the codec filters out
    async fn next_message(&mut self) -> Option<Result<C::Message, ExchangeError>> {
        loop {
            match self.next_raw().await? {
                Ok(raw) => match self.codec().decode_message(raw) {
                    Ok(Some(decoded)) => return Some(Ok(decoded)),
                    Ok(None) => {}
                    Err(e) => return Some(Err(e)),
                },
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Tungstenite-based WebSocket implementation
pub struct TungsteniteWs<C: WsCodec> {
    url: String,
    write: Option<SplitSink<WsStream, Message>>,
    read: Option<SplitStream<WsStream>>,
    connected: bool,
    exchange_name: String,
    codec: C,
    config: WsConfig,
}

impl<C: WsCodec> TungsteniteWs<C> {
    /// Create a new WebSocket session with the specified codec
    ///
    /// # Arguments
    /// * `url` - The WebSocket URL to connect to
    /// * `exchange_name` - Name of the exchange for logging/tracing
    /// * `codec` - The codec to handle message decoding
    pub fn new(url: String, exchange_name: String, codec: C) -> Self {
        Self {
            url,
            write: None,
            read: None,
            connected: false,
            exchange_name,
            codec,
            config: WsConfig::default(),
        }
    }

    /// Set custom WebSocket configuration
    pub fn with_config(mut self, config: WsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl<C: WsCodec> WsSession<C> for TungsteniteWs<C> {
    #[instrument(skip(self), fields(exchange = %self.exchange_name, url = %self.url))]
    async fn connect(&mut self) -> Result<(), ExchangeError> {
        let (ws_stream, _) = tokio::time::timeout(
            self.config.connect_timeout(),
            connect_async(self.url.as_str()),
        )
        .await
        .map_err(|_| ExchangeError::ConnectionTimeout("WebSocket connection timeout".to_string()))?
        .map_err(|e| ExchangeError::NetworkError(format!("WebSocket connection failed: {}", e)))?;

        let (write, read) = ws_stream.split();
        self.write = Some(write);
        self.read = Some(read);
        self.connected = true;
        Ok(())
    }

    #[instrument(skip(self, msg), fields(exchange = %self.exchange_name))]
    async fn send_raw(&mut self, msg: Message) -> Result<(), ExchangeError> {
        if !self.connected {
            return Err(ExchangeError::NotConnected(
                "WebSocket not connected".to_string(),
            ));
        }

        let write = self.write.as_mut().ok_or_else(|| {
            ExchangeError::NotConnected("WebSocket write stream not available".to_string())
        })?;

        if let Err(e) = write.send(msg).await {
            self.connected = false;
            return Err(ExchangeError::NetworkError(format!(
                "Failed to send WebSocket message: {}",
                e
            )));
        }
        Ok(())
    }

    async fn next_raw(&mut self) -> Option<Result<Message, ExchangeError>> {
        loop {
            let read = self.read.as_mut()?;
            match read.next().await {
                Some(Ok(Message::Ping(data))) => {
                    // transport-level pings are answered here, never surfaced
                    if let Some(write) = self.write.as_mut() {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            warn!("Failed to send pong response: {}", e);
                        }
                    }
                }
                Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "close frame received");
                    self.connected = false;
                    return None;
                }
                Some(Ok(message)) => return Some(Ok(message)),
                Some(Err(e)) => {
                    self.connected = false;
                    return Some(Err(ExchangeError::NetworkError(format!(
                        "WebSocket error: {}",
                        e
                    ))));
                }
                None => {
                    self.connected = false;
                    return None;
                }
            }
        }
    }

    #[instrument(skip(self), fields(exchange = %self.exchange_name))]
    async fn close(&mut self) -> Result<(), ExchangeError> {
        if let Some(write) = self.write.as_mut() {
            let _ = write.send(Message::Close(None)).await;
        }
        self.connected = false;
        self.write = None;
        self.read = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn codec(&self) -> &C {
        &self.codec
    }
}

/// Frame sent periodically for the life of a connection
#[derive(Debug, Clone)]
pub struct Keepalive {
    pub interval: Duration,
    pub frame: Message,
}

/// Fires once a connection has stopped, for whatever reason.
///
/// Observers created after the fact still see it.
#[derive(Debug, Clone)]
pub struct ShutdownSignal(watch::Receiver<bool>);

impl ShutdownSignal {
    /// Resolve once the connection is stopped or its owner is gone
    pub async fn wait(&mut self) {
        while !*self.0.borrow_and_update() {
            if self.0.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }
}

/// Owner of a running connection.
///
/// Holds the outbound queue, the shutdown signal, and every task started for
/// the connection (the driver and any timers attached with
/// [`ConnectionHandle::attach`]). Dropping the handle stops all of them.
pub struct ConnectionHandle {
    label: String,
    outbound: mpsc::UnboundedSender<Message>,
    shutdown: Arc<watch::Sender<bool>>,
    state: watch::Receiver<ConnectionState>,
    driver: Option<JoinHandle<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("label", &self.label)
            .field("state", &*self.state.borrow())
            .field("tasks", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl ConnectionHandle {
    /// Queue a frame for the driver. Never waits for the network.
    pub fn send(&self, msg: Message) -> Result<(), ExchangeError> {
        if *self.state.borrow() != ConnectionState::Open {
            return Err(ExchangeError::NotConnected(format!(
                "{} connection is {}",
                self.label,
                *self.state.borrow()
            )));
        }
        self.outbound.send(msg).map_err(|_| {
            ExchangeError::NotConnected(format!("{} connection driver stopped", self.label))
        })
    }

    /// Signal fired when the connection stops for any reason
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        ShutdownSignal(self.shutdown.subscribe())
    }

    /// Tie a task's lifetime to this connection
    pub fn attach(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Stop the driver and every attached task, closing the socket cleanly.
    pub async fn close(mut self) {
        self.shutdown.send_replace(true);
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.await {
                if !e.is_cancelled() {
                    warn!(label = %self.label, "connection driver failed: {}", e);
                }
            }
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Start the driver task for an already-open session.
///
/// The driver is the only task touching the socket: it writes queued frames,
/// sends the keep-alive frame (first one immediately), and hands each decoded
/// inbound message to `on_message` in arrival order. Malformed frames are logged
/// and dropped. A transport failure or remote close moves `state` to
/// `Disconnected`; a shutdown request moves it to `Closed`. Either way the
/// shutdown signal fires on exit so attached timers stop with it.
pub fn spawn_connection<C, S, F>(
    label: impl Into<String>,
    session: S,
    state: Arc<watch::Sender<ConnectionState>>,
    keepalive: Option<Keepalive>,
    on_message: F,
) -> ConnectionHandle
where
    C: WsCodec,
    S: WsSession<C> + 'static,
    F: FnMut(C::Message) + Send + 'static,
{
    let label = label.into();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    state.send_replace(ConnectionState::Open);
    let state_rx = state.subscribe();

    let driver = tokio::spawn(drive(
        label.clone(),
        session,
        outbound_rx,
        Arc::clone(&shutdown_tx),
        ShutdownSignal(shutdown_rx),
        state,
        keepalive,
        on_message,
    ));

    ConnectionHandle {
        label,
        outbound: outbound_tx,
        shutdown: shutdown_tx,
        state: state_rx,
        driver: Some(driver),
        tasks: Vec::new(),
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn drive<C, S, F>(
    label: String,
    mut session: S,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    mut shutdown_rx: ShutdownSignal,
    state: Arc<watch::Sender<ConnectionState>>,
    keepalive: Option<Keepalive>,
    mut on_message: F,
) where
    C: WsCodec,
    S: WsSession<C>,
    F: FnMut(C::Message) + Send,
{
    let mut ticker = keepalive.as_ref().map(|k| {
        let mut ticker = interval(k.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    let final_state = loop {
        tokio::select! {
            biased;
            () = shutdown_rx.wait() => {
                debug!(%label, "shutdown requested");
                let _ = session.close().await;
                break ConnectionState::Closed;
            }
            Some(frame) = outbound.recv() => {
                if let Err(e) = session.send_raw(frame).await {
                    error!(%label, "send failed: {}", e);
                    break ConnectionState::Disconnected;
                }
            }
            () = next_tick(&mut ticker) => {
                if let Some(keepalive) = &keepalive {
                    debug!(%label, "sending keep-alive");
                    if let Err(e) = session.send_raw(keepalive.frame.clone()).await {
                        error!(%label, "keep-alive failed: {}", e);
                        break ConnectionState::Disconnected;
                    }
                }
            }
            incoming = session.next_message() => match incoming {
                Some(Ok(message)) => on_message(message),
                Some(Err(e)) if e.class() == ErrorClass::Protocol => {
                    warn!(%label, "dropping malformed frame: {}", e);
                }
                Some(Err(e)) => {
                    error!(%label, "socket error: {}", e);
                    break ConnectionState::Disconnected;
                }
                None => {
                    info!(%label, "socket closed by peer");
                    break ConnectionState::Disconnected;
                }
            },
        }
    };

    state.send_replace(final_state);
    // stop sibling timers even when the peer ended the connection
    shutdown_tx.send_replace(true);
    info!(%label, state = %final_state, "connection stopped");
}
