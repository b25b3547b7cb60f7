use crate::core::config::ExchangeConfig;
use crate::core::errors::ExchangeError;
use crate::core::kernel::{HmacSigner, ReqwestRest, RestClientBuilder, RestClientConfig, Signer};
use crate::exchanges::binance_us::rest::BinanceUsRest;
use crate::exchanges::binance_us::socket::RequestSocket;
use crate::exchanges::binance_us::stream::DataStream;
use crate::exchanges::binance_us::EXCHANGE_NAME;
use std::sync::Arc;

fn signer(config: &ExchangeConfig) -> Option<Arc<dyn Signer>> {
    if config.has_credentials() {
        Some(Arc::new(HmacSigner::new(
            config.api_key().to_string(),
            config.secret_key().to_string(),
        )))
    } else {
        None
    }
}

/// Create the REST client; signed endpoints need credentials in `config`
pub fn build_rest(config: &ExchangeConfig) -> Result<BinanceUsRest<ReqwestRest>, ExchangeError> {
    let rest_config = RestClientConfig::new(config.rest_url().to_string(), EXCHANGE_NAME.to_string())
        .with_timeout(30)
        .with_recv_window(config.recv_window);

    let mut rest_builder = RestClientBuilder::new(rest_config);
    if let Some(signer) = signer(config) {
        rest_builder = rest_builder.with_signer(signer);
    }

    Ok(BinanceUsRest::new(rest_builder.build()?))
}

/// Create an unconnected WebSocket API client
pub fn build_request_socket(config: &ExchangeConfig) -> RequestSocket {
    RequestSocket::new(
        config.ws_api_endpoint().to_string(),
        signer(config),
        config.recv_window,
    )
}

/// Create an unconnected data stream bound to `symbol`
///
/// The listen key is requested on `connect`, so `config` must carry an API key.
pub fn build_data_stream(
    config: &ExchangeConfig,
    symbol: &str,
) -> Result<DataStream<ReqwestRest>, ExchangeError> {
    if !config.has_credentials() {
        return Err(ExchangeError::AuthError(
            "data stream needs an API key for its listen key".to_string(),
        ));
    }
    let rest = Arc::new(build_rest(config)?);
    Ok(DataStream::new(
        symbol,
        config.stream_endpoint().to_string(),
        rest,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ConnectionState;

    #[test]
    fn test_data_stream_requires_credentials() {
        let err = build_data_stream(&ExchangeConfig::read_only(), "BTCUSD").unwrap_err();
        assert!(matches!(err, ExchangeError::AuthError(_)));
    }

    #[test]
    fn test_builders_use_config_endpoints() {
        let config = ExchangeConfig::new("key".into(), "secret".into())
            .stream_url("ws://127.0.0.1:9000/ws".into());
        let stream = build_data_stream(&config, "BTCUSD").unwrap();
        assert_eq!(stream.symbol(), "btcusd");
        assert_eq!(stream.state(), ConnectionState::Disconnected);

        let socket = build_request_socket(&config);
        assert_eq!(socket.state(), ConnectionState::Disconnected);
    }
}
