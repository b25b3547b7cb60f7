pub mod builder;
pub mod codec;
pub mod converters;
pub mod requests;
pub mod rest;
pub mod socket;
pub mod stream;
pub mod types;

/// Name used in tracing fields and HTTP client config
pub const EXCHANGE_NAME: &str = "binance_us";

// Re-export main types for easier importing
pub use builder::{build_data_stream, build_request_socket, build_rest};
pub use codec::{classify, order_event_name, ApiCodec, ApiFrame, StreamCodec};
pub use converters::coerce_numbers;
pub use requests::HistoryRange;
pub use rest::BinanceUsRest;
pub use socket::RequestSocket;
pub use stream::{DataStream, LISTEN_KEY_RENEWAL_INTERVAL};
pub use types::{
    ApiResponse, CancelReplaceMode, ListenKeyResponse, OrderRef, OrderRequest,
    ReplaceOrderRequest, RequestId, ServerTime, StreamEvent,
};
