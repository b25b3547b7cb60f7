pub mod core;
pub mod exchanges;

pub use crate::core::{errors::ExchangeError, events::EventBus, types::*};
pub use exchanges::binance_us::{BinanceUsRest, DataStream, RequestSocket};
