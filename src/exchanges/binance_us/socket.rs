use crate::core::errors::ExchangeError;
use crate::core::events::{EventBus, SubscriptionId};
use crate::core::kernel::{
    get_timestamp, spawn_connection, ConnectionHandle, Keepalive, Signer, TungsteniteWs, WsConfig,
    WsSession,
};
use crate::core::types::{ConnectionState, KlineInterval, Params, SymbolSelector};
use crate::exchanges::binance_us::codec::{ping_frame, request_frame, ApiCodec, ApiFrame, PING_ID};
use crate::exchanges::binance_us::requests::{self, HistoryRange};
use crate::exchanges::binance_us::types::{
    ApiResponse, OrderRef, OrderRequest, ReplaceOrderRequest, RequestId,
};
use crate::exchanges::binance_us::EXCHANGE_NAME;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, instrument};

/// Persistent connection to the WebSocket API.
///
/// Requests are framed and queued without waiting; responses are emitted on
/// [`RequestSocket::events`] under the request id. A ping request goes out as
/// soon as the socket opens and then every keep-alive interval until the
/// connection ends.
///
/// Ids are not checked for uniqueness. Two in-flight requests sharing an id
/// both receive every response carrying it.
pub struct RequestSocket {
    url: String,
    signer: Option<Arc<dyn Signer>>,
    recv_window: u64,
    config: WsConfig,
    events: Arc<EventBus>,
    state: Arc<watch::Sender<ConnectionState>>,
    connection: Option<ConnectionHandle>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for RequestSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSocket")
            .field("url", &self.url)
            .field("state", &self.state())
            .field("has_signer", &self.signer.is_some())
            .finish_non_exhaustive()
    }
}

impl RequestSocket {
    pub fn new(url: String, signer: Option<Arc<dyn Signer>>, recv_window: u64) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            url,
            signer,
            recv_window,
            config: WsConfig::default(),
            events: Arc::new(EventBus::new()),
            state: Arc::new(state),
            connection: None,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_config(mut self, config: WsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state transitions
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Bus on which responses are emitted, keyed by request id
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn on<F>(&self, id: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.events.on(id, handler)
    }

    /// Open the socket and start the keep-alive.
    pub async fn connect(&mut self) -> Result<(), ExchangeError> {
        let session = TungsteniteWs::new(self.url.clone(), EXCHANGE_NAME.to_string(), ApiCodec)
            .with_config(self.config.clone());
        self.connect_with(session).await
    }

    /// Open the given session and drive it.
    ///
    /// Any previous connection is closed first; its timers never outlive it.
    #[instrument(skip(self, session), fields(exchange = EXCHANGE_NAME, url = %self.url))]
    pub async fn connect_with<S>(&mut self, mut session: S) -> Result<(), ExchangeError>
    where
        S: WsSession<ApiCodec> + 'static,
    {
        if let Some(previous) = self.connection.take() {
            previous.close().await;
        }

        self.state.send_replace(ConnectionState::Connecting);
        if let Err(e) = session.connect().await {
            self.state.send_replace(ConnectionState::Disconnected);
            return Err(e);
        }

        let events = Arc::clone(&self.events);
        let keepalive = Keepalive {
            interval: self.config.keepalive_interval(),
            frame: ping_frame(),
        };
        self.connection = Some(spawn_connection::<ApiCodec, _, _>(
            "ws-api",
            session,
            Arc::clone(&self.state),
            Some(keepalive),
            move |frame: ApiFrame| {
                events.emit(&frame.key, &frame.payload);
            },
        ));
        info!("WebSocket API connected");
        Ok(())
    }

    /// Stop the keep-alive and close the socket.
    pub async fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }
        self.state.send_replace(ConnectionState::Closed);
    }

    /// Allocate a numeric request id
    pub fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Frame and queue a request. Never waits for the network.
    ///
    /// Signed requests carry `apiKey`, `timestamp`, `recvWindow` and `signature`
    /// inside `params`.
    pub fn send(
        &self,
        method: &str,
        id: impl Into<RequestId>,
        params: Params,
        signed: bool,
    ) -> Result<(), ExchangeError> {
        let connection = self.connection.as_ref().ok_or_else(|| {
            ExchangeError::NotConnected("WebSocket API socket is not connected".to_string())
        })?;

        let params = if signed {
            let signer = self.signer.as_ref().ok_or_else(|| {
                ExchangeError::AuthError("signed request requires credentials".to_string())
            })?;
            let params = params.with("apiKey", signer.api_key());
            signer
                .sign_with_timestamp(&params, get_timestamp()?, self.recv_window)?
                .params
        } else {
            params.compact()
        };

        let id = id.into();
        debug!(%id, method, signed, "sending request");
        connection.send(request_frame(&id, method, Some(params.to_json())))
    }

    /// Send a request under a fresh id and wait for its response.
    ///
    /// Returns the `result` of a 200 response; any other status becomes
    /// [`ExchangeError::ApiError`].
    pub async fn request(
        &self,
        method: &str,
        params: Params,
        signed: bool,
    ) -> Result<Value, ExchangeError> {
        let id = self.next_request_id();
        // register before sending so a fast reply is not missed
        let reply = self.events.once(id.to_string());
        self.send(method, id, params, signed)?;

        let payload = tokio::time::timeout(self.config.request_timeout(), reply)
            .await
            .map_err(|_| {
                ExchangeError::ConnectionTimeout(format!("no response to {} (id {})", method, id))
            })?
            .ok_or_else(|| ExchangeError::NotConnected(format!("{} abandoned", method)))?;

        let response: ApiResponse = serde_json::from_value(payload).map_err(|e| {
            ExchangeError::DeserializationError(format!("Invalid API response: {}", e))
        })?;
        response.into_result()
    }

    // General

    pub fn send_ping(&self) -> Result<(), ExchangeError> {
        self.send("ping", PING_ID, Params::new(), false)
    }

    pub fn get_server_time(&self) -> Result<(), ExchangeError> {
        self.send("time", "serverTime", Params::new(), false)
    }

    pub fn get_exchange_info(&self, symbols: Option<SymbolSelector>) -> Result<(), ExchangeError> {
        self.send(
            "exchangeInfo",
            "exchangeInformation",
            requests::symbols(symbols),
            false,
        )
    }

    // Market data

    pub fn get_recent_trades(&self, symbol: &str, limit: Option<u32>) -> Result<(), ExchangeError> {
        self.send(
            "trades.recent",
            "recentTrades",
            requests::recent_trades(symbol, limit),
            false,
        )
    }

    pub fn get_historical_trades(
        &self,
        symbol: &str,
        limit: Option<u32>,
        from_id: Option<u64>,
    ) -> Result<(), ExchangeError> {
        self.send(
            "trades.historical",
            "historicalTrades",
            requests::historical_trades(symbol, limit, from_id),
            false,
        )
    }

    pub fn get_aggregate_trades(
        &self,
        symbol: &str,
        range: &HistoryRange,
    ) -> Result<(), ExchangeError> {
        self.send(
            "trades.aggregate",
            "aggregateTrades",
            requests::aggregate_trades(symbol, range),
            false,
        )
    }

    pub fn get_order_book_depth(
        &self,
        symbol: &str,
        limit: Option<u32>,
    ) -> Result<(), ExchangeError> {
        self.send(
            "depth",
            "orderBookDepth",
            requests::depth(symbol, limit),
            false,
        )
    }

    pub fn get_klines(
        &self,
        symbol: &str,
        interval: KlineInterval,
        range: &HistoryRange,
    ) -> Result<(), ExchangeError> {
        self.send(
            "klines",
            "candleStickData",
            requests::klines(symbol, interval, range),
            false,
        )
    }

    pub fn get_ticker_price(&self, symbols: Option<SymbolSelector>) -> Result<(), ExchangeError> {
        self.send(
            "ticker.price",
            "liveTickerPrice",
            requests::symbols(symbols),
            false,
        )
    }

    pub fn get_average_price(&self, symbol: &str) -> Result<(), ExchangeError> {
        self.send("avgPrice", "averagePrice", requests::symbol(symbol), false)
    }

    pub fn get_book_ticker(&self, symbols: Option<SymbolSelector>) -> Result<(), ExchangeError> {
        self.send(
            "ticker.book",
            "orderBookTicker",
            requests::symbols(symbols),
            false,
        )
    }

    pub fn get_24hr_stats(&self, symbols: Option<SymbolSelector>) -> Result<(), ExchangeError> {
        self.send(
            "ticker.24hr",
            "priceChangeStatistics",
            requests::symbols(symbols),
            false,
        )
    }

    pub fn get_rolling_window_stats(
        &self,
        symbols: Option<SymbolSelector>,
        window_size: Option<&str>,
        ticker_type: Option<&str>,
    ) -> Result<(), ExchangeError> {
        self.send(
            "ticker",
            "rollingWindowPriceChangeStatistics",
            requests::rolling_window(symbols, window_size, ticker_type),
            false,
        )
    }

    // Account

    pub fn get_account_info(&self) -> Result<(), ExchangeError> {
        self.send(
            "account.status",
            "accountInformation",
            Params::new(),
            true,
        )
    }

    pub fn get_order_rate_limits(&self) -> Result<(), ExchangeError> {
        self.send(
            "account.rateLimits.orders",
            "orderRateLimits",
            Params::new(),
            true,
        )
    }

    // Trading

    pub fn create_order(&self, order: &OrderRequest) -> Result<(), ExchangeError> {
        self.send("order.place", "createOrder", order.to_params(), true)
    }

    pub fn get_order(&self, symbol: &str, order: &OrderRef) -> Result<(), ExchangeError> {
        self.send(
            "order.status",
            "orderStatus",
            requests::order_status(symbol, order),
            true,
        )
    }

    pub fn get_open_orders(&self, symbol: Option<&str>) -> Result<(), ExchangeError> {
        self.send(
            "openOrders.status",
            "openOrders",
            requests::optional_symbol(symbol),
            true,
        )
    }

    pub fn cancel_order(
        &self,
        symbol: &str,
        order: &OrderRef,
        new_client_order_id: Option<&str>,
        cancel_restrictions: Option<&str>,
    ) -> Result<(), ExchangeError> {
        self.send(
            "order.cancel",
            "cancelOrder",
            requests::cancel_order(symbol, order, new_client_order_id, cancel_restrictions),
            true,
        )
    }

    pub fn cancel_open_orders(&self, symbol: &str) -> Result<(), ExchangeError> {
        self.send(
            "openOrders.cancelAll",
            "cancelOpenOrders",
            requests::symbol(symbol),
            true,
        )
    }

    pub fn replace_order(&self, request: &ReplaceOrderRequest) -> Result<(), ExchangeError> {
        self.send(
            "order.cancelReplace",
            "orderReplace",
            request.to_params(),
            true,
        )
    }

    pub fn get_prevented_matches(
        &self,
        symbol: &str,
        limit: Option<u32>,
        order_id: Option<u64>,
        prevented_match_id: Option<u64>,
        from_prevented_match_id: Option<u64>,
    ) -> Result<(), ExchangeError> {
        self.send(
            "myPreventedMatches",
            "preventedMatches",
            requests::prevented_matches(
                symbol,
                limit,
                order_id,
                prevented_match_id,
                from_prevented_match_id,
            ),
            true,
        )
    }

    pub fn get_all_orders(&self, symbol: &str, range: &HistoryRange) -> Result<(), ExchangeError> {
        self.send(
            "allOrders",
            "allOrders",
            requests::all_orders(symbol, range),
            true,
        )
    }
}
