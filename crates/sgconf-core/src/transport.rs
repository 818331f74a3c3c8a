//! HTTP collaborator used by URL loading and trust pruning

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::settings::HttpSettings;

pub const HEADER_KEY_HASH: &str = "x-key-hash";
pub const HEADER_NONCE: &str = "x-nonce";
pub const HEADER_ITERATIONS: &str = "x-iterations";
pub const HEADER_STATE: &str = "x-state";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    /// Sent comma-joined as `Authorization`
    pub tokens: Vec<String>,
    /// Sent comma-joined as `X-KEY-HASH`
    pub key_hashes: Vec<String>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    /// Lowercased header names
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

/// Fetches a URL. Failing to connect is an `Err`; any HTTP status is `Ok`.
pub trait Transport: Send + Sync {
    fn fetch(
        &self,
        request: FetchRequest,
    ) -> impl Future<Output = ConfigResult<FetchResponse>> + Send;
}

/// [`Transport`] over reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(settings: &HttpSettings) -> ConfigResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| ConfigError::Transport(format!("building HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    async fn fetch(&self, request: FetchRequest) -> ConfigResult<FetchResponse> {
        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| ConfigError::Transport(format!("invalid url {}: {e}", request.url)))?;
        let mut builder = self.client.get(url);
        if !request.tokens.is_empty() {
            builder = builder.header(reqwest::header::AUTHORIZATION, request.tokens.join(","));
        }
        if !request.key_hashes.is_empty() {
            builder = builder.header(HEADER_KEY_HASH, request.key_hashes.join(","));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ConfigError::Transport(format!("GET {}: {e}", request.url)))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| ConfigError::Transport(format!("reading body of {}: {e}", request.url)))?
            .to_vec();
        debug!(url = %request.url, status, bytes = body.len(), "fetched");
        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}
