#![allow(dead_code)]

use async_trait::async_trait;
use binance_us_kit::core::errors::ExchangeError;
use binance_us_kit::core::kernel::{RestClient, Security, WsCodec, WsSession};
use binance_us_kit::core::types::Params;
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

pub const TEST_API_KEY: &str = "test-api-key";
pub const TEST_SECRET: &str = "test-secret-key";
pub const TEST_LISTEN_KEY: &str = "pqia91ma19a5s61cv6a81va65sdf19v8a65a1a5s61cv6a81va65sdf19v8a65a1";

/// In-memory WebSocket: frames pushed through the peer arrive as inbound
/// messages, everything the client sends is recorded.
pub struct ScriptedSession<C: WsCodec> {
    codec: C,
    inbound: mpsc::UnboundedReceiver<Message>,
    sent: Arc<Mutex<Vec<Message>>>,
    connected: bool,
    refuse_connect: bool,
}

/// Test-side end of a [`ScriptedSession`]
pub struct ScriptedPeer {
    inbound: Option<mpsc::UnboundedSender<Message>>,
    sent: Arc<Mutex<Vec<Message>>>,
}

pub fn scripted<C: WsCodec>(codec: C) -> (ScriptedSession<C>, ScriptedPeer) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sent = Arc::new(Mutex::new(Vec::new()));
    (
        ScriptedSession {
            codec,
            inbound: rx,
            sent: Arc::clone(&sent),
            connected: false,
            refuse_connect: false,
        },
        ScriptedPeer {
            inbound: Some(tx),
            sent,
        },
    )
}

impl<C: WsCodec> ScriptedSession<C> {
    pub fn refusing(mut self) -> Self {
        self.refuse_connect = true;
        self
    }
}

impl ScriptedPeer {
    /// Deliver a JSON text frame to the client
    pub fn push(&self, value: Value) {
        self.push_raw(Message::Text(value.to_string()));
    }

    pub fn push_raw(&self, message: Message) {
        if let Some(tx) = &self.inbound {
            tx.send(message).unwrap();
        }
    }

    /// Simulate the peer closing the socket
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Every text frame the client sent, parsed
    pub fn sent_json(&self) -> Vec<Value> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| match m {
                Message::Text(t) => serde_json::from_str(t).ok(),
                _ => None,
            })
            .collect()
    }

    pub fn sent_with_method(&self, method: &str) -> Vec<Value> {
        self.sent_json()
            .into_iter()
            .filter(|f| f["method"] == method)
            .collect()
    }

    pub fn ping_count(&self) -> usize {
        self.sent_with_method("ping").len()
    }
}

#[async_trait]
impl<C: WsCodec> WsSession<C> for ScriptedSession<C> {
    async fn connect(&mut self) -> Result<(), ExchangeError> {
        if self.refuse_connect {
            return Err(ExchangeError::NetworkError("connection refused".to_string()));
        }
        self.connected = true;
        Ok(())
    }

    async fn send_raw(&mut self, msg: Message) -> Result<(), ExchangeError> {
        if !self.connected {
            return Err(ExchangeError::NotConnected("closed".to_string()));
        }
        self.sent.lock().unwrap().push(msg);
        Ok(())
    }

    async fn next_raw(&mut self) -> Option<Result<Message, ExchangeError>> {
        if !self.connected {
            return None;
        }
        self.inbound.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), ExchangeError> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn codec(&self) -> &C {
        &self.codec
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub endpoint: String,
    pub params: Params,
    pub security: Security,
}

/// `RestClient` that records calls and answers the user data stream endpoints
#[derive(Default)]
pub struct MockRest {
    calls: Mutex<Vec<RecordedCall>>,
    fail_renewal: AtomicBool,
    fail_listen_key: AtomicBool,
    rotate_keys: AtomicBool,
    issued: AtomicUsize,
}

impl MockRest {
    pub fn failing_renewal() -> Self {
        let rest = Self::default();
        rest.fail_renewal.store(true, Ordering::SeqCst);
        rest
    }

    pub fn failing_listen_key() -> Self {
        let rest = Self::default();
        rest.fail_listen_key.store(true, Ordering::SeqCst);
        rest
    }

    /// Hand out a fresh listen key on every create
    pub fn rotating_keys() -> Self {
        let rest = Self::default();
        rest.rotate_keys.store(true, Ordering::SeqCst);
        rest
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_with(&self, method: Method) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method)
            .collect()
    }
}

#[async_trait]
impl RestClient for MockRest {
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: &Params,
        security: Security,
    ) -> Result<Value, ExchangeError> {
        self.calls.lock().unwrap().push(RecordedCall {
            method: method.clone(),
            endpoint: endpoint.to_string(),
            params: params.clone(),
            security,
        });

        let rejected = || ExchangeError::ApiError {
            status: 400,
            code: Some(-1125),
            message: r#"{"code":-1125,"msg":"This listenKey does not exist."}"#.to_string(),
        };

        match (method, endpoint) {
            (Method::POST, "/api/v3/userDataStream") => {
                if self.fail_listen_key.load(Ordering::SeqCst) {
                    Err(rejected())
                } else if self.rotate_keys.load(Ordering::SeqCst) {
                    let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok(json!({ "listenKey": format!("{}-{}", TEST_LISTEN_KEY, n) }))
                } else {
                    Ok(json!({ "listenKey": TEST_LISTEN_KEY }))
                }
            }
            (Method::PUT, "/api/v3/userDataStream") if self.fail_renewal.load(Ordering::SeqCst) => {
                Err(rejected())
            }
            _ => Ok(json!({})),
        }
    }
}

/// Recompute the signature the exchange would expect for a signed WebSocket
/// API params object.
pub fn expected_ws_signature(params: &Value) -> String {
    use binance_us_kit::core::kernel::{HmacSigner, Signer};

    let mut pairs: Vec<(String, String)> = params
        .as_object()
        .unwrap()
        .iter()
        .filter(|(k, _)| k.as_str() != "signature")
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), value)
        })
        .collect();
    pairs.sort();

    let canonical = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    HmacSigner::new(TEST_API_KEY.to_string(), TEST_SECRET.to_string())
        .digest(&canonical)
        .unwrap()
}
