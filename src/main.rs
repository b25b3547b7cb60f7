use anyhow::Context;
use binance_us_kit::core::config::ExchangeConfig;
use binance_us_kit::core::types::{OrderSide, OrderStatus, Params};
use binance_us_kit::exchanges::binance_us::{
    build_data_stream, build_request_socket, build_rest, order_event_name,
};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Credentials are optional; without them only public endpoints work.
    #[cfg(feature = "env-file")]
    let loaded = ExchangeConfig::from_env_file("BINANCE_US");
    #[cfg(not(feature = "env-file"))]
    let loaded = ExchangeConfig::from_env("BINANCE_US");
    let config = loaded.unwrap_or_else(|e| {
        warn!("{}; continuing with public endpoints only", e);
        ExchangeConfig::read_only()
    });

    let rest = build_rest(&config)?.with_number_coercion(true);
    let time = rest.get_server_time().await.context("fetching server time")?;
    info!(server_time = time.server_time, "REST reachable");

    let ticker = rest.get_ticker_price(Some("BTCUSD".into())).await?;
    info!(%ticker, "ticker price");

    let mut socket = build_request_socket(&config);
    socket.connect().await.context("connecting WebSocket API")?;
    let response = socket
        .request("time", Params::new(), false)
        .await
        .context("WebSocket API time")?;
    info!(%response, "WebSocket API reachable");
    socket.close().await;

    if config.has_credentials() {
        let mut stream = build_data_stream(&config, "BTCUSD")?;
        stream.on("trade", |trade| info!(%trade, "trade"));
        stream.on(
            order_event_name(OrderSide::Buy, OrderStatus::Filled),
            |report| info!(%report, "buy filled"),
        );
        stream.connect().await.context("connecting data stream")?;
        stream.subscribe("trade")?;

        tokio::time::sleep(Duration::from_secs(10)).await;
        stream.close().await?;
    }

    Ok(())
}
