use crate::core::config::DEFAULT_RECV_WINDOW;
use crate::core::errors::ExchangeError;
use crate::core::kernel::signer::{get_timestamp, Signer, API_KEY_HEADER};
use crate::core::types::Params;
use async_trait::async_trait;
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{instrument, trace};

/// Authentication required by an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    /// Public endpoint
    None,
    /// `X-MBX-APIKEY` header only (user data stream management)
    ApiKey,
    /// Header plus `timestamp`, `recvWindow` and `signature` query fields
    Signed,
}

impl From<bool> for Security {
    fn from(signed: bool) -> Self {
        if signed {
            Self::Signed
        } else {
            Self::None
        }
    }
}

/// REST client trait for making HTTP requests
///
/// All parameters travel in the query string. Implementations never retry.
#[async_trait]
pub trait RestClient: Send + Sync {
    /// Perform a request and return the parsed JSON body
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `endpoint` - The API endpoint path, e.g. `/api/v3/order`
    /// * `params` - Query parameters; unset entries are omitted
    /// * `security` - Authentication required by the endpoint
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: &Params,
        security: Security,
    ) -> Result<Value, ExchangeError>;

    /// Perform a request and deserialize the body into `T`
    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        params: &Params,
        security: Security,
    ) -> Result<T, ExchangeError> {
        let value = self.request(method, endpoint, params, security).await?;
        serde_json::from_value(value).map_err(|e| {
            ExchangeError::DeserializationError(format!("Failed to deserialize JSON: {}", e))
        })
    }

    async fn get(
        &self,
        endpoint: &str,
        params: &Params,
        signed: bool,
    ) -> Result<Value, ExchangeError> {
        self.request(Method::GET, endpoint, params, signed.into())
            .await
    }

    async fn post(
        &self,
        endpoint: &str,
        params: &Params,
        signed: bool,
    ) -> Result<Value, ExchangeError> {
        self.request(Method::POST, endpoint, params, signed.into())
            .await
    }

    async fn put(
        &self,
        endpoint: &str,
        params: &Params,
        signed: bool,
    ) -> Result<Value, ExchangeError> {
        self.request(Method::PUT, endpoint, params, signed.into())
            .await
    }

    async fn delete(
        &self,
        endpoint: &str,
        params: &Params,
        signed: bool,
    ) -> Result<Value, ExchangeError> {
        self.request(Method::DELETE, endpoint, params, signed.into())
            .await
    }
}

/// Configuration for the REST client
#[derive(Clone, Debug)]
pub struct RestClientConfig {
    /// Base URL for the API
    pub base_url: String,
    /// Exchange name for logging and tracing
    pub exchange_name: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string to include in requests
    pub user_agent: String,
    /// `recvWindow` injected into signed requests, in milliseconds
    pub recv_window: u64,
}

impl RestClientConfig {
    /// Create a new configuration
    ///
    /// # Arguments
    /// * `base_url` - Base URL for the API
    /// * `exchange_name` - Name of the exchange
    pub fn new(base_url: String, exchange_name: String) -> Self {
        Self {
            base_url,
            exchange_name,
            timeout_seconds: 30,
            user_agent: concat!("binance-us-kit/", env!("CARGO_PKG_VERSION")).to_string(),
            recv_window: DEFAULT_RECV_WINDOW,
        }
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Set the user agent string
    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    /// Set the `recvWindow` used for signed requests
    pub fn with_recv_window(mut self, recv_window: u64) -> Self {
        self.recv_window = recv_window;
        self
    }
}

/// Builder for creating REST client instances
pub struct RestClientBuilder {
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
}

impl RestClientBuilder {
    /// Create a new builder with the given configuration
    pub fn new(config: RestClientConfig) -> Self {
        Self {
            config,
            signer: None,
        }
    }

    /// Set the signer for keyed and signed requests
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Build the REST client
    pub fn build(self) -> Result<ReqwestRest, ExchangeError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(self.config.timeout_seconds))
            .user_agent(&self.config.user_agent)
            .build()
            .map_err(|e| {
                ExchangeError::ConfigurationError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(ReqwestRest {
            client,
            config: self.config,
            signer: self.signer,
        })
    }
}

/// Implementation of `RestClient` using reqwest
#[derive(Clone)]
pub struct ReqwestRest {
    client: Client,
    config: RestClientConfig,
    signer: Option<Arc<dyn Signer>>,
}

impl std::fmt::Debug for ReqwestRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestRest")
            .field("config", &self.config)
            .field("has_signer", &self.signer.is_some())
            .finish_non_exhaustive()
    }
}

impl ReqwestRest {
    pub fn config(&self) -> &RestClientConfig {
        &self.config
    }

    fn signer(&self) -> Result<&Arc<dyn Signer>, ExchangeError> {
        self.signer.as_ref().ok_or_else(|| {
            ExchangeError::AuthError("Authentication required but no signer provided".to_string())
        })
    }

    /// Build the full URL for an endpoint and an already encoded query string
    fn build_url(&self, endpoint: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}{}", self.config.base_url, endpoint)
        } else {
            format!("{}{}?{}", self.config.base_url, endpoint, query)
        }
    }

    /// Handle the response and extract JSON
    #[instrument(skip(self, response), fields(exchange = %self.config.exchange_name, status = %response.status()))]
    async fn handle_response(&self, response: Response) -> Result<Value, ExchangeError> {
        let status = response.status();
        let response_text = response.text().await.map_err(|e| {
            ExchangeError::NetworkError(format!("Failed to read response body: {}", e))
        })?;

        trace!("Response body: {}", response_text);

        if !status.is_success() {
            return Err(ExchangeError::from_response(
                status.as_u16(),
                response_text,
            ));
        }
        if response_text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&response_text).map_err(|e| {
            ExchangeError::DeserializationError(format!("Failed to parse JSON response: {}", e))
        })
    }
}

#[async_trait]
impl RestClient for ReqwestRest {
    #[instrument(skip(self, params), fields(exchange = %self.config.exchange_name, method = %method, endpoint = %endpoint, param_count = params.len()))]
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: &Params,
        security: Security,
    ) -> Result<Value, ExchangeError> {
        let (url, api_key) = match security {
            Security::None => (self.build_url(endpoint, &params.to_query_string()), None),
            Security::ApiKey => {
                let signer = self.signer()?;
                (
                    self.build_url(endpoint, &params.to_query_string()),
                    Some(signer.api_key().to_string()),
                )
            }
            Security::Signed => {
                let signer = self.signer()?;
                let signed =
                    signer.sign_with_timestamp(params, get_timestamp()?, self.config.recv_window)?;
                // send exactly the bytes that were signed
                (
                    self.build_url(endpoint, &signed.query),
                    Some(signer.api_key().to_string()),
                )
            }
        };

        let mut request = self.client.request(method, &url);
        if let Some(api_key) = api_key {
            request = request.header(API_KEY_HEADER, api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExchangeError::NetworkError(format!("Request failed: {}", e)))?;

        self.handle_response(response).await
    }
}
