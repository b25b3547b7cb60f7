use crate::core::errors::ExchangeError;
use crate::core::events::{EventBus, SubscriptionId};
use crate::core::kernel::{
    spawn_connection, ConnectionHandle, RestClient, ShutdownSignal, TungsteniteWs, WsConfig,
    WsSession,
};
use crate::core::types::ConnectionState;
use crate::exchanges::binance_us::codec::{
    subscription_frame, StreamCodec, SUBSCRIBE_ID, UNSUBSCRIBE_ID,
};
use crate::exchanges::binance_us::rest::BinanceUsRest;
use crate::exchanges::binance_us::types::StreamEvent;
use crate::exchanges::binance_us::EXCHANGE_NAME;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

/// Listen keys expire after 60 minutes without a keep-alive
pub const LISTEN_KEY_RENEWAL_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Market data and user data stream for one symbol.
///
/// Inbound payloads are classified (see [`crate::exchanges::binance_us::codec::classify`])
/// and emitted on [`DataStream::events`] under the resulting event name:
/// literal `e` values such as `trade` or `kline`, `bookTicker`, `depth`, or
/// `BID_<status>` / `ASK_<status>` for this symbol's execution reports.
pub struct DataStream<R: RestClient + 'static> {
    symbol: String,
    stream_url: String,
    rest: Arc<BinanceUsRest<R>>,
    config: WsConfig,
    renewal_interval: Duration,
    events: Arc<EventBus>,
    state: Arc<watch::Sender<ConnectionState>>,
    listen_key: Option<String>,
    connection: Option<ConnectionHandle>,
}

impl<R: RestClient + 'static> std::fmt::Debug for DataStream<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataStream")
            .field("symbol", &self.symbol)
            .field("state", &self.state())
            .field("has_listen_key", &self.listen_key.is_some())
            .finish_non_exhaustive()
    }
}

impl<R: RestClient + 'static> DataStream<R> {
    pub fn new(symbol: &str, stream_url: String, rest: Arc<BinanceUsRest<R>>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            symbol: symbol.to_lowercase(),
            stream_url: stream_url.trim_end_matches('/').to_string(),
            rest,
            config: WsConfig::default(),
            renewal_interval: LISTEN_KEY_RENEWAL_INTERVAL,
            events: Arc::new(EventBus::new()),
            state: Arc::new(state),
            listen_key: None,
            connection: None,
        }
    }

    pub fn with_config(mut self, config: WsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_renewal_interval(mut self, every: Duration) -> Self {
        self.renewal_interval = every;
        self
    }

    /// Bound symbol, lowercase
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn rest(&self) -> &BinanceUsRest<R> {
        &self.rest
    }

    pub fn listen_key(&self) -> Option<&str> {
        self.listen_key.as_deref()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn on<F>(&self, event: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.events.on(event, handler)
    }

    /// Acquire a listen key, open the stream and start listen key renewal.
    pub async fn connect(&mut self) -> Result<(), ExchangeError> {
        let codec = StreamCodec::new(&self.symbol);
        let config = self.config.clone();
        self.connect_with(move |url| {
            TungsteniteWs::new(url, EXCHANGE_NAME.to_string(), codec).with_config(config)
        })
        .await
    }

    /// Like [`DataStream::connect`], opening whatever session `make_session`
    /// builds for the stream URL.
    #[instrument(skip(self, make_session), fields(exchange = EXCHANGE_NAME, symbol = %self.symbol))]
    pub async fn connect_with<S, F>(&mut self, make_session: F) -> Result<(), ExchangeError>
    where
        S: WsSession<StreamCodec> + 'static,
        F: FnOnce(String) -> S,
    {
        if let Some(previous) = self.connection.take() {
            previous.close().await;
        }

        self.state.send_replace(ConnectionState::Connecting);
        let listen_key = match self.rest.create_listen_key().await {
            Ok(key) => key,
            Err(e) => {
                self.state.send_replace(ConnectionState::Disconnected);
                return Err(e);
            }
        };
        self.replace_listen_key(&listen_key).await;

        let mut session = make_session(format!("{}/{}", self.stream_url, listen_key));
        if let Err(e) = session.connect().await {
            self.state.send_replace(ConnectionState::Disconnected);
            return Err(e);
        }

        let events = Arc::clone(&self.events);
        let mut connection = spawn_connection::<StreamCodec, _, _>(
            "stream",
            session,
            Arc::clone(&self.state),
            None,
            move |event: StreamEvent| {
                events.emit(&event.name, &event.payload);
            },
        );

        let renewal = tokio::spawn(renew_listen_key(
            Arc::clone(&self.rest),
            listen_key.clone(),
            self.renewal_interval,
            connection.shutdown_signal(),
        ));
        connection.attach(renewal);

        self.connection = Some(connection);
        info!("data stream connected");
        Ok(())
    }

    /// Record the key for this connection. A key left over from an earlier
    /// connection is deleted unless the exchange handed the same one back.
    async fn replace_listen_key(&mut self, listen_key: &str) {
        if let Some(previous) = self.listen_key.replace(listen_key.to_string()) {
            if previous != listen_key {
                if let Err(e) = self.rest.close_listen_key(&previous).await {
                    warn!("closing previous listen key failed: {}", e);
                }
            }
        }
    }

    fn stream_name(&self, stream: &str) -> String {
        format!("{}@{}", self.symbol, stream)
    }

    fn send_subscription(&self, method: &str, id: u64, stream: &str) -> Result<(), ExchangeError> {
        let connection = self.connection.as_ref().ok_or_else(|| {
            ExchangeError::NotConnected("data stream is not connected".to_string())
        })?;
        let streams = [self.stream_name(stream)];
        debug!(method, stream = %streams[0], "stream subscription");
        connection.send(subscription_frame(method, id, &streams))
    }

    /// Subscribe to `<symbol>@<stream>`, e.g. `trade`, `kline_1m`, `depth5@100ms`.
    ///
    /// Stream names are passed through unchecked.
    pub fn subscribe(&self, stream: &str) -> Result<(), ExchangeError> {
        self.send_subscription("SUBSCRIBE", SUBSCRIBE_ID, stream)
    }

    pub fn unsubscribe(&self, stream: &str) -> Result<(), ExchangeError> {
        self.send_subscription("UNSUBSCRIBE", UNSUBSCRIBE_ID, stream)
    }

    /// Stop renewal, close the socket, then delete the listen key.
    pub async fn close(&mut self) -> Result<(), ExchangeError> {
        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }
        self.state.send_replace(ConnectionState::Closed);

        match self.listen_key.take() {
            Some(key) => self.rest.close_listen_key(&key).await,
            None => Ok(()),
        }
    }
}

/// Renew `listen_key` every `every` until the connection stops.
///
/// Failures are logged; the stream keeps running on the existing key.
async fn renew_listen_key<R: RestClient>(
    rest: Arc<BinanceUsRest<R>>,
    listen_key: String,
    every: Duration,
    mut shutdown: ShutdownSignal,
) {
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = shutdown.wait() => {
                debug!("listen key renewal stopped");
                break;
            }
            _ = ticker.tick() => {
                match rest.keepalive_listen_key(&listen_key).await {
                    Ok(()) => debug!("listen key renewed"),
                    Err(e) => warn!("listen key renewal failed: {}", e),
                }
            }
        }
    }
}
