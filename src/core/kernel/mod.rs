//! Kernel - transport layer shared by every Binance.US surface
//!
//! The kernel knows nothing about individual endpoints. It provides:
//!
//! ## Transport Layer
//! - `RestClient`: HTTP interface with per-request [`Security`]
//! - `WsSession`: WebSocket connection primitive
//! - `spawn_connection` / `ConnectionHandle`: a single driver task per socket
//!   owning writes, keep-alive and inbound dispatch
//!
//! ## Authentication
//! - `Signer`: canonical query signing
//! - `HmacSigner`: HMAC-SHA256 with hex output
//!
//! ## Message Handling
//! - `WsCodec`: turns raw frames into typed messages
//!
//! # Example
//! ```rust,no_run
//! use binance_us_kit::core::kernel::*;
//! use binance_us_kit::core::types::Params;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let rest_config = RestClientConfig::new(
//!     "https://api.binance.us".to_string(),
//!     "binance_us".to_string(),
//! );
//! let signer = Arc::new(HmacSigner::new("api_key".to_string(), "secret".to_string()));
//! let rest = RestClientBuilder::new(rest_config).with_signer(signer).build()?;
//!
//! let account = rest.get("/api/v3/account", &Params::new(), true).await?;
//! println!("{}", account);
//! # Ok(())
//! # }
//! ```
pub mod codec;
pub mod rest;
pub mod signer;
pub mod ws;

// Re-export key types for convenience
pub use codec::{decode_json_frame, WsCodec};
pub use rest::{ReqwestRest, RestClient, RestClientBuilder, RestClientConfig, Security};
pub use signer::{get_timestamp, HmacSigner, SignatureResult, SignedParams, Signer, API_KEY_HEADER};
pub use ws::{
    spawn_connection, ConnectionHandle, Keepalive, ShutdownSignal, TungsteniteWs, WsConfig,
    WsSession,
};
