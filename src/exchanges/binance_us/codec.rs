use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::{decode_json_frame, WsCodec};
use crate::core::types::{OrderSide, OrderStatus};
use crate::exchanges::binance_us::types::{RequestId, StreamEvent};
use serde_json::{json, Map, Value};
use tokio_tungstenite::tungstenite::Message;
use tracing::trace;

/// Id of the keep-alive request; responses arrive under this key
pub const PING_ID: &str = "ping";
pub const SUBSCRIBE_ID: u64 = 1;
pub const UNSUBSCRIBE_ID: u64 = 2;

/// A WebSocket API response keyed by its echoed request id
#[derive(Debug, Clone, PartialEq)]
pub struct ApiFrame {
    pub key: String,
    pub payload: Value,
}

/// Event bus key for an inbound `id` field. Frames without an id (the exchange
/// answers unparseable requests with `"id": null`) land under `"null"`.
pub fn id_key(id: Option<&Value>) -> String {
    match id {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => Value::Null.to_string(),
    }
}

/// Codec for the request/response WebSocket API
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiCodec;

impl WsCodec for ApiCodec {
    type Message = ApiFrame;

    fn decode_message(&self, message: Message) -> Result<Option<Self::Message>, ExchangeError> {
        Ok(decode_json_frame(message)?.map(|payload| ApiFrame {
            key: id_key(payload.get("id")),
            payload,
        }))
    }
}

/// Frame a WebSocket API request. `params` is omitted when empty.
pub fn request_frame(id: &RequestId, method: &str, params: Option<Value>) -> Message {
    let mut frame = Map::new();
    frame.insert("id".to_string(), json!(id));
    frame.insert("method".to_string(), Value::String(method.to_string()));
    if let Some(params) = params.filter(|p| p.as_object().map_or(true, |o| !o.is_empty())) {
        frame.insert("params".to_string(), params);
    }
    Message::Text(Value::Object(frame).to_string())
}

/// Keep-alive request sent on connect and every keep-alive interval
pub fn ping_frame() -> Message {
    request_frame(&RequestId::from(PING_ID), "ping", None)
}

/// SUBSCRIBE / UNSUBSCRIBE frame for the data stream
pub fn subscription_frame(method: &str, id: u64, streams: &[String]) -> Message {
    Message::Text(
        json!({
            "id": id,
            "method": method,
            "params": streams,
        })
        .to_string(),
    )
}

/// Codec for a data stream bound to one symbol
#[derive(Debug, Clone)]
pub struct StreamCodec {
    symbol: String,
}

impl StreamCodec {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_lowercase(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }
}

impl WsCodec for StreamCodec {
    type Message = StreamEvent;

    fn decode_message(&self, message: Message) -> Result<Option<Self::Message>, ExchangeError> {
        Ok(decode_json_frame(message)?.and_then(|payload| classify(&self.symbol, payload)))
    }
}

/// Name the event a stream payload is emitted under.
///
/// Payloads can carry several of the tested fields at once, so the checks run in
/// a fixed order and the first hit wins:
/// 1. `e == "executionReport"` goes through [`classify_order_update`]
/// 2. any other `e` is used verbatim
/// 3. `u` means a book ticker update
/// 4. `lastUpdateId` means a depth snapshot
///
/// Anything else is dropped.
pub fn classify(symbol: &str, payload: Value) -> Option<StreamEvent> {
    let name = match payload.get("e").and_then(Value::as_str) {
        Some("executionReport") => classify_order_update(symbol, &payload)?,
        Some(event_type) => event_type.to_string(),
        None if payload.get("u").is_some() => "bookTicker".to_string(),
        None if payload.get("lastUpdateId").is_some() => "depth".to_string(),
        None => {
            trace!(?payload, "unclassified stream payload dropped");
            return None;
        }
    };
    Some(StreamEvent { name, payload })
}

/// `BID_<status>` / `ASK_<status>` for execution reports on the bound symbol
///
/// The status is passed through verbatim, so codes without an [`OrderStatus`]
/// variant still get an event name.
pub fn classify_order_update(symbol: &str, payload: &Value) -> Option<String> {
    let order_symbol = payload.get("s").and_then(Value::as_str)?;
    if !order_symbol.eq_ignore_ascii_case(symbol) {
        return None;
    }
    let status = payload.get("X").and_then(Value::as_str)?;
    let side = match payload.get("S").and_then(Value::as_str)? {
        "BUY" => OrderSide::Buy,
        "SELL" => OrderSide::Sell,
        _ => return None,
    };
    Some(format!("{}_{}", book_side(side), status))
}

/// Event name a data stream emits for an execution report with this side and status
pub fn order_event_name(side: OrderSide, status: OrderStatus) -> String {
    format!("{}_{}", book_side(side), status.as_str())
}

fn book_side(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "BID",
        OrderSide::Sell => "ASK",
    }
}
