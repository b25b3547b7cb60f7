use crate::core::errors::ExchangeError;
use crate::core::types::{OrderSide, OrderType, Params, TimeInForce};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identifier correlating a WebSocket API request with its response.
///
/// The exchange echoes it back verbatim; responses are emitted on the event bus
/// under its [`fmt::Display`] form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Num(u64),
    Text(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        Self::Num(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}

/// Inbound WebSocket API response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub id: Option<RequestId>,
    pub status: u16,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
    #[serde(rename = "rateLimits", default)]
    pub rate_limits: Option<Vec<Value>>,
}

impl ApiResponse {
    /// `result` for a 200 response, otherwise the exchange rejection.
    pub fn into_result(self) -> Result<Value, ExchangeError> {
        if self.status == 200 {
            return Ok(self.result.unwrap_or(Value::Null));
        }
        let (code, message) = match self.error {
            Some(error) => (Some(error.code), error.msg),
            None => (None, format!("request failed with status {}", self.status)),
        };
        Err(ExchangeError::ApiError {
            status: self.status,
            code,
            message,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenKeyResponse {
    #[serde(rename = "listenKey")]
    pub listen_key: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ServerTime {
    #[serde(rename = "serverTime")]
    pub server_time: u64,
}

/// A classified data stream payload
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    /// Event name the payload is emitted under
    pub name: String,
    pub payload: Value,
}

/// Identifies an existing order either by exchange id or client id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderRef {
    Id(u64),
    ClientId(String),
}

impl OrderRef {
    fn apply(&self, params: Params) -> Params {
        match self {
            Self::Id(id) => params.with("orderId", *id),
            Self::ClientId(id) => params.with("origClientOrderId", id.as_str()),
        }
    }

    pub(crate) fn into_params(&self, symbol: &str) -> Params {
        self.apply(Params::new().with("symbol", symbol))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelReplaceMode {
    #[default]
    StopOnFailure,
    AllowFailure,
}

impl CancelReplaceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StopOnFailure => "STOP_ON_FAILURE",
            Self::AllowFailure => "ALLOW_FAILURE",
        }
    }
}

/// New order parameters.
///
/// Defaults to a `LIMIT` order with `GTC` time in force, matching the exchange's
/// most common order shape. Use [`OrderRequest::market`] for market orders.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub time_in_force: Option<TimeInForce>,
    pub price: Option<Decimal>,
    pub quantity: Option<Decimal>,
    pub quote_order_qty: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub trailing_delta: Option<u64>,
    pub iceberg_qty: Option<Decimal>,
    pub new_client_order_id: Option<String>,
}

impl OrderRequest {
    pub fn limit(symbol: &str, side: OrderSide, price: Decimal, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            side,
            order_type: OrderType::Limit,
            time_in_force: Some(TimeInForce::GTC),
            price: Some(price),
            quantity: Some(quantity),
            quote_order_qty: None,
            stop_price: None,
            trailing_delta: None,
            iceberg_qty: None,
            new_client_order_id: None,
        }
    }

    pub fn market(symbol: &str, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            order_type: OrderType::Market,
            time_in_force: None,
            price: None,
            ..Self::limit(symbol, side, Decimal::ZERO, quantity)
        }
    }

    /// Market order sized in the quote asset
    pub fn market_quote(symbol: &str, side: OrderSide, quote_order_qty: Decimal) -> Self {
        Self {
            quantity: None,
            quote_order_qty: Some(quote_order_qty),
            ..Self::market(symbol, side, Decimal::ZERO)
        }
    }

    pub fn with_type(mut self, order_type: OrderType) -> Self {
        self.order_type = order_type;
        self
    }

    pub fn with_time_in_force(mut self, tif: Option<TimeInForce>) -> Self {
        self.time_in_force = tif;
        self
    }

    pub fn with_stop_price(mut self, stop_price: Decimal) -> Self {
        self.stop_price = Some(stop_price);
        self
    }

    pub fn with_trailing_delta(mut self, trailing_delta: u64) -> Self {
        self.trailing_delta = Some(trailing_delta);
        self
    }

    pub fn with_iceberg_qty(mut self, iceberg_qty: Decimal) -> Self {
        self.iceberg_qty = Some(iceberg_qty);
        self
    }

    pub fn with_client_order_id(mut self, id: impl Into<String>) -> Self {
        self.new_client_order_id = Some(id.into());
        self
    }

    pub fn to_params(&self) -> Params {
        Params::new()
            .with("symbol", self.symbol.as_str())
            .with("side", self.side.as_str())
            .with("type", self.order_type.as_str())
            .with_opt("timeInForce", self.time_in_force.map(|t| t.as_str()))
            .with_opt("price", self.price)
            .with_opt("quantity", self.quantity)
            .with_opt("quoteOrderQty", self.quote_order_qty)
            .with_opt("stopPrice", self.stop_price)
            .with_opt("trailingDelta", self.trailing_delta)
            .with_opt("icebergQty", self.iceberg_qty)
            .with_opt("newClientOrderId", self.new_client_order_id.as_deref())
    }
}

/// Cancel an existing order and place a new one in a single request
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaceOrderRequest {
    pub cancel: OrderRef,
    pub cancel_new_client_order_id: Option<String>,
    pub order: OrderRequest,
    pub mode: CancelReplaceMode,
}

impl ReplaceOrderRequest {
    pub fn new(cancel: OrderRef, order: OrderRequest) -> Self {
        Self {
            cancel,
            cancel_new_client_order_id: None,
            order,
            mode: CancelReplaceMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: CancelReplaceMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn to_params(&self) -> Params {
        let params = self
            .order
            .to_params()
            .with("cancelReplaceMode", self.mode.as_str())
            .with_opt(
                "cancelNewClientOrderId",
                self.cancel_new_client_order_id.as_deref(),
            );
        match &self.cancel {
            OrderRef::Id(id) => params.with("cancelOrderId", *id),
            OrderRef::ClientId(id) => params.with("cancelOrigClientOrderId", id.as_str()),
        }
    }
}
