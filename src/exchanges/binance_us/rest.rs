use crate::core::errors::ExchangeError;
use crate::core::kernel::{RestClient, Security};
use crate::core::types::{KlineInterval, Params, SymbolSelector};
use crate::exchanges::binance_us::converters::coerce_numbers;
use crate::exchanges::binance_us::requests::{self, HistoryRange};
use crate::exchanges::binance_us::types::{
    ListenKeyResponse, OrderRef, OrderRequest, ReplaceOrderRequest, ServerTime,
};
use reqwest::Method;
use serde_json::Value;
use tracing::instrument;

/// Typed wrapper around `RestClient` for the Binance.US REST API
///
/// One method per documented operation; each is a single HTTP request. With
/// [`BinanceUsRest::with_number_coercion`] decimal strings in responses are
/// turned into JSON numbers where that is lossless.
#[derive(Debug)]
pub struct BinanceUsRest<R: RestClient> {
    client: R,
    coerce_numbers: bool,
}

impl<R: RestClient> BinanceUsRest<R> {
    pub fn new(client: R) -> Self {
        Self {
            client,
            coerce_numbers: false,
        }
    }

    pub fn with_number_coercion(mut self, enabled: bool) -> Self {
        self.coerce_numbers = enabled;
        self
    }

    pub fn client(&self) -> &R {
        &self.client
    }

    async fn call(
        &self,
        method: Method,
        endpoint: &str,
        params: Params,
        security: Security,
    ) -> Result<Value, ExchangeError> {
        let value = self
            .client
            .request(method, endpoint, &params, security)
            .await?;
        Ok(if self.coerce_numbers {
            coerce_numbers(value)
        } else {
            value
        })
    }

    async fn public(&self, endpoint: &str, params: Params) -> Result<Value, ExchangeError> {
        self.call(Method::GET, endpoint, params, Security::None)
            .await
    }

    async fn signed(
        &self,
        method: Method,
        endpoint: &str,
        params: Params,
    ) -> Result<Value, ExchangeError> {
        self.call(method, endpoint, params, Security::Signed).await
    }

    // Market data

    pub async fn get_server_time(&self) -> Result<ServerTime, ExchangeError> {
        self.client
            .request_json(Method::GET, "/api/v3/time", &Params::new(), Security::None)
            .await
    }

    pub async fn get_system_status(&self) -> Result<Value, ExchangeError> {
        self.signed(Method::GET, "/sapi/v1/system/status", Params::new())
            .await
    }

    pub async fn get_exchange_info(
        &self,
        symbols: Option<SymbolSelector>,
    ) -> Result<Value, ExchangeError> {
        self.public("/api/v3/exchangeInfo", requests::symbols(symbols))
            .await
    }

    pub async fn get_recent_trades(
        &self,
        symbol: &str,
        limit: Option<u32>,
    ) -> Result<Value, ExchangeError> {
        self.public("/api/v3/trades", requests::recent_trades(symbol, limit))
            .await
    }

    /// Older trades; requires the API key header but no signature.
    pub async fn get_historical_trades(
        &self,
        symbol: &str,
        limit: Option<u32>,
        from_id: Option<u64>,
    ) -> Result<Value, ExchangeError> {
        self.call(
            Method::GET,
            "/api/v3/historicalTrades",
            requests::historical_trades(symbol, limit, from_id),
            Security::ApiKey,
        )
        .await
    }

    pub async fn get_aggregate_trades(
        &self,
        symbol: &str,
        range: &HistoryRange,
    ) -> Result<Value, ExchangeError> {
        self.public("/api/v3/aggTrades", requests::aggregate_trades(symbol, range))
            .await
    }

    pub async fn get_order_book_depth(
        &self,
        symbol: &str,
        limit: Option<u32>,
    ) -> Result<Value, ExchangeError> {
        self.public("/api/v3/depth", requests::depth(symbol, limit))
            .await
    }

    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: KlineInterval,
        range: &HistoryRange,
    ) -> Result<Value, ExchangeError> {
        self.public("/api/v3/klines", requests::klines(symbol, interval, range))
            .await
    }

    pub async fn get_ticker_price(
        &self,
        symbols: Option<SymbolSelector>,
    ) -> Result<Value, ExchangeError> {
        self.public("/api/v3/ticker/price", requests::symbols(symbols))
            .await
    }

    pub async fn get_average_price(&self, symbol: &str) -> Result<Value, ExchangeError> {
        self.public("/api/v3/avgPrice", requests::symbol(symbol))
            .await
    }

    pub async fn get_book_ticker(
        &self,
        symbols: Option<SymbolSelector>,
    ) -> Result<Value, ExchangeError> {
        self.public("/api/v3/ticker/bookTicker", requests::symbols(symbols))
            .await
    }

    pub async fn get_24hr_stats(
        &self,
        symbols: Option<SymbolSelector>,
    ) -> Result<Value, ExchangeError> {
        self.public("/api/v3/ticker/24hr", requests::symbols(symbols))
            .await
    }

    pub async fn get_rolling_window_stats(
        &self,
        symbols: Option<SymbolSelector>,
        window_size: Option<&str>,
        ticker_type: Option<&str>,
    ) -> Result<Value, ExchangeError> {
        self.public(
            "/api/v3/ticker",
            requests::rolling_window(symbols, window_size, ticker_type),
        )
        .await
    }

    // Account

    #[instrument(skip(self), fields(exchange = "binance_us"))]
    pub async fn get_account_info(&self) -> Result<Value, ExchangeError> {
        self.signed(Method::GET, "/api/v3/account", Params::new())
            .await
    }

    pub async fn get_account_status(&self) -> Result<Value, ExchangeError> {
        self.signed(Method::GET, "/sapi/v3/accountStatus", Params::new())
            .await
    }

    pub async fn get_api_trading_status(&self) -> Result<Value, ExchangeError> {
        self.signed(Method::GET, "/sapi/v3/apiTradingStatus", Params::new())
            .await
    }

    pub async fn get_asset_distribution_history(
        &self,
        asset: Option<&str>,
        category: Option<&str>,
        limit: Option<u32>,
        start_time: Option<u64>,
        end_time: Option<u64>,
    ) -> Result<Value, ExchangeError> {
        self.signed(
            Method::GET,
            "/sapi/v1/asset/assetDistributionHistory",
            requests::asset_distribution(asset, category, limit, start_time, end_time),
        )
        .await
    }

    pub async fn get_trade_fee(&self, symbol: Option<&str>) -> Result<Value, ExchangeError> {
        self.signed(
            Method::GET,
            "/sapi/v1/asset/query/trading-fee",
            requests::optional_symbol(symbol),
        )
        .await
    }

    /// Trading volume over the past 30 days
    pub async fn get_trading_volume(&self) -> Result<Value, ExchangeError> {
        self.signed(
            Method::GET,
            "/sapi/v1/asset/query/trading-volume",
            Params::new(),
        )
        .await
    }

    pub async fn get_order_rate_limits(&self) -> Result<Value, ExchangeError> {
        self.signed(Method::GET, "/api/v3/rateLimit/order", Params::new())
            .await
    }

    // Trading

    #[instrument(skip(self, order), fields(exchange = "binance_us", symbol = %order.symbol, side = order.side.as_str()))]
    pub async fn create_order(&self, order: &OrderRequest) -> Result<Value, ExchangeError> {
        self.signed(Method::POST, "/api/v3/order", order.to_params())
            .await
    }

    pub async fn get_order(&self, symbol: &str, order: &OrderRef) -> Result<Value, ExchangeError> {
        self.signed(
            Method::GET,
            "/api/v3/order",
            requests::order_status(symbol, order),
        )
        .await
    }

    pub async fn get_open_orders(&self, symbol: Option<&str>) -> Result<Value, ExchangeError> {
        self.signed(
            Method::GET,
            "/api/v3/openOrders",
            requests::optional_symbol(symbol),
        )
        .await
    }

    #[instrument(skip(self), fields(exchange = "binance_us"))]
    pub async fn cancel_order(
        &self,
        symbol: &str,
        order: &OrderRef,
        new_client_order_id: Option<&str>,
        cancel_restrictions: Option<&str>,
    ) -> Result<Value, ExchangeError> {
        self.signed(
            Method::DELETE,
            "/api/v3/order",
            requests::cancel_order(symbol, order, new_client_order_id, cancel_restrictions),
        )
        .await
    }

    pub async fn cancel_open_orders(&self, symbol: &str) -> Result<Value, ExchangeError> {
        self.signed(Method::DELETE, "/api/v3/openOrders", requests::symbol(symbol))
            .await
    }

    pub async fn replace_order(
        &self,
        request: &ReplaceOrderRequest,
    ) -> Result<Value, ExchangeError> {
        self.signed(Method::POST, "/api/v3/order/cancelReplace", request.to_params())
            .await
    }

    pub async fn get_my_trades(
        &self,
        symbol: &str,
        range: &HistoryRange,
    ) -> Result<Value, ExchangeError> {
        self.signed(
            Method::GET,
            "/api/v3/myTrades",
            requests::my_trades(symbol, range),
        )
        .await
    }

    pub async fn get_prevented_matches(
        &self,
        symbol: &str,
        limit: Option<u32>,
        order_id: Option<u64>,
        prevented_match_id: Option<u64>,
        from_prevented_match_id: Option<u64>,
    ) -> Result<Value, ExchangeError> {
        self.signed(
            Method::GET,
            "/api/v3/myPreventedMatches",
            requests::prevented_matches(
                symbol,
                limit,
                order_id,
                prevented_match_id,
                from_prevented_match_id,
            ),
        )
        .await
    }

    pub async fn get_all_orders(
        &self,
        symbol: &str,
        range: &HistoryRange,
    ) -> Result<Value, ExchangeError> {
        self.signed(
            Method::GET,
            "/api/v3/allOrders",
            requests::all_orders(symbol, range),
        )
        .await
    }

    // User data stream

    /// Start a user data stream and return its listen key
    #[instrument(skip(self), fields(exchange = "binance_us"))]
    pub async fn create_listen_key(&self) -> Result<String, ExchangeError> {
        let response: ListenKeyResponse = self
            .client
            .request_json(
                Method::POST,
                "/api/v3/userDataStream",
                &Params::new(),
                Security::ApiKey,
            )
            .await?;
        Ok(response.listen_key)
    }

    /// Extend a listen key's validity by another 60 minutes
    pub async fn keepalive_listen_key(&self, listen_key: &str) -> Result<(), ExchangeError> {
        self.client
            .request(
                Method::PUT,
                "/api/v3/userDataStream",
                &Params::new().with("listenKey", listen_key),
                Security::ApiKey,
            )
            .await
            .map(|_| ())
    }

    pub async fn close_listen_key(&self, listen_key: &str) -> Result<(), ExchangeError> {
        self.client
            .request(
                Method::DELETE,
                "/api/v3/userDataStream",
                &Params::new().with("listenKey", listen_key),
                Security::ApiKey,
            )
            .await
            .map(|_| ())
    }
}
