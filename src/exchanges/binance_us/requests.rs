//! Parameter sets shared by the REST and WebSocket API surfaces.
//!
//! Both surfaces take the same arguments for the same operation; only the
//! transport differs. Defaults applied here: `limit` 500 for trade and order
//! history, 100 for depth, 20 for asset distribution, rolling window `1d`/`FULL`.

use crate::core::types::{KlineInterval, Params, SymbolSelector};
use crate::exchanges::binance_us::types::OrderRef;

pub const DEFAULT_HISTORY_LIMIT: u32 = 500;
pub const DEFAULT_DEPTH_LIMIT: u32 = 100;
pub const DEFAULT_DISTRIBUTION_LIMIT: u32 = 20;
pub const DEFAULT_WINDOW_SIZE: &str = "1d";
pub const DEFAULT_TICKER_TYPE: &str = "FULL";

/// Optional id/time bounds for history queries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryRange {
    pub limit: Option<u32>,
    pub from_id: Option<u64>,
    pub order_id: Option<u64>,
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
}

impl HistoryRange {
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn from_id(mut self, from_id: u64) -> Self {
        self.from_id = Some(from_id);
        self
    }

    pub fn order_id(mut self, order_id: u64) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn between(mut self, start_time: u64, end_time: u64) -> Self {
        self.start_time = Some(start_time);
        self.end_time = Some(end_time);
        self
    }

    fn limit_or_default(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_HISTORY_LIMIT)
    }

    fn with_times(&self, params: Params) -> Params {
        params
            .with_opt("startTime", self.start_time)
            .with_opt("endTime", self.end_time)
    }
}

pub fn symbols(selector: Option<SymbolSelector>) -> Params {
    Params::new().with_symbols(selector)
}

pub fn symbol(symbol: &str) -> Params {
    Params::new().with("symbol", symbol)
}

pub fn optional_symbol(symbol: Option<&str>) -> Params {
    Params::new().with_opt("symbol", symbol)
}

pub fn recent_trades(symbol: &str, limit: Option<u32>) -> Params {
    Params::new()
        .with("symbol", symbol)
        .with("limit", limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
}

pub fn historical_trades(symbol: &str, limit: Option<u32>, from_id: Option<u64>) -> Params {
    recent_trades(symbol, limit).with_opt("fromId", from_id)
}

pub fn aggregate_trades(symbol: &str, range: &HistoryRange) -> Params {
    let params = Params::new()
        .with("symbol", symbol)
        .with("limit", range.limit_or_default())
        .with_opt("fromId", range.from_id);
    range.with_times(params)
}

pub fn depth(symbol: &str, limit: Option<u32>) -> Params {
    Params::new()
        .with("symbol", symbol)
        .with("limit", limit.unwrap_or(DEFAULT_DEPTH_LIMIT))
}

pub fn klines(symbol: &str, interval: KlineInterval, range: &HistoryRange) -> Params {
    let params = Params::new()
        .with("symbol", symbol)
        .with("interval", interval.as_str())
        .with("limit", range.limit_or_default());
    range.with_times(params)
}

pub fn rolling_window(
    selector: Option<SymbolSelector>,
    window_size: Option<&str>,
    ticker_type: Option<&str>,
) -> Params {
    Params::new()
        .with("windowSize", window_size.unwrap_or(DEFAULT_WINDOW_SIZE))
        .with("type", ticker_type.unwrap_or(DEFAULT_TICKER_TYPE))
        .with_symbols(selector)
}

pub fn asset_distribution(
    asset: Option<&str>,
    category: Option<&str>,
    limit: Option<u32>,
    start_time: Option<u64>,
    end_time: Option<u64>,
) -> Params {
    Params::new()
        .with("limit", limit.unwrap_or(DEFAULT_DISTRIBUTION_LIMIT))
        .with_opt("asset", asset)
        .with_opt("category", category)
        .with_opt("startTime", start_time)
        .with_opt("endTime", end_time)
}

pub fn order_status(symbol: &str, order: &OrderRef) -> Params {
    order.into_params(symbol)
}

pub fn cancel_order(
    symbol: &str,
    order: &OrderRef,
    new_client_order_id: Option<&str>,
    cancel_restrictions: Option<&str>,
) -> Params {
    order
        .into_params(symbol)
        .with_opt("newClientOrderId", new_client_order_id)
        .with_opt("cancelRestrictions", cancel_restrictions)
}

pub fn my_trades(symbol: &str, range: &HistoryRange) -> Params {
    let params = Params::new()
        .with("symbol", symbol)
        .with("limit", range.limit_or_default())
        .with_opt("orderId", range.order_id)
        .with_opt("fromId", range.from_id);
    range.with_times(params)
}

pub fn prevented_matches(
    symbol: &str,
    limit: Option<u32>,
    order_id: Option<u64>,
    prevented_match_id: Option<u64>,
    from_prevented_match_id: Option<u64>,
) -> Params {
    Params::new()
        .with("symbol", symbol)
        .with("limit", limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
        .with_opt("orderId", order_id)
        .with_opt("preventedMatchId", prevented_match_id)
        .with_opt("fromPreventedMatchId", from_prevented_match_id)
}

pub fn all_orders(symbol: &str, range: &HistoryRange) -> Params {
    let params = Params::new()
        .with("symbol", symbol)
        .with("limit", range.limit_or_default())
        .with_opt("orderId", range.order_id);
    range.with_times(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        assert_eq!(
            recent_trades("BTCUSD", None).to_query_string(),
            "limit=500&symbol=BTCUSD"
        );
        assert_eq!(
            depth("BTCUSD", None).to_query_string(),
            "limit=100&symbol=BTCUSD"
        );
        assert_eq!(
            asset_distribution(None, None, None, None, None).to_query_string(),
            "limit=20"
        );
    }

    #[test]
    fn test_rolling_window_defaults_and_symbols() {
        let params = rolling_window(Some(["BTCUSD", "ETHUSD"].into()), None, None);
        assert_eq!(params.get("windowSize").unwrap().to_string(), "1d");
        assert_eq!(params.get("type").unwrap().to_string(), "FULL");
        assert_eq!(
            params.get("symbols").unwrap().to_string(),
            r#"["BTCUSD","ETHUSD"]"#
        );
        assert!(!params.contains_key("symbol"));
    }

    #[test]
    fn test_history_range_only_sends_what_endpoint_takes() {
        let range = HistoryRange::default()
            .limit(10)
            .order_id(5)
            .from_id(3)
            .between(1, 2);
        let agg = aggregate_trades("BTCUSD", &range);
        assert!(!agg.contains_key("orderId"));
        assert!(agg.contains_key("fromId"));

        let orders = all_orders("BTCUSD", &range);
        assert!(!orders.contains_key("fromId"));
        assert_eq!(
            orders.to_query_string(),
            "endTime=2&limit=10&orderId=5&startTime=1&symbol=BTCUSD"
        );
    }

    #[test]
    fn test_cancel_by_client_id() {
        let params = cancel_order(
            "BTCUSD",
            &OrderRef::ClientId("abc".to_string()),
            None,
            Some("ONLY_NEW"),
        );
        assert_eq!(
            params.to_query_string(),
            "cancelRestrictions=ONLY_NEW&origClientOrderId=abc&symbol=BTCUSD"
        );
    }
}
