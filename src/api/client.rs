//! HTTP client for the marketplace order API.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client as HttpClient, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::remote::{RemoteOrder, RemoteOrderPage};
use super::{BackendError, FetchQuery, OrderBackend, RemotePage, Result, StatusUpdate};
use crate::config::BackendConfig;
use crate::domain::{CanonicalStatus, CartSnapshot, Order};

/// Default HTTP request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for creating an [`HttpBackend`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Bearer token; requests are sent unauthenticated when empty.
    pub auth_token: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: auth_token.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Response envelope used by every endpoint.
#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Serialize)]
struct StatusBody<'a> {
    status: CanonicalStatus,
    at: String,
    idempotency_key: &'a str,
}

/// HttpBackend talks JSON over HTTP to the marketplace backend.
pub struct HttpBackend {
    config: ClientConfig,
    http_client: HttpClient,
}

impl HttpBackend {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if !config.auth_token.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", config.auth_token))
                .map_err(|e| BackendError::Config(format!("auth token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http_client = HttpClient::builder()
            .timeout(if config.timeout.is_zero() {
                DEFAULT_TIMEOUT
            } else {
                config.timeout
            })
            .default_headers(headers)
            .build()?;

        Ok(Self {
            config,
            http_client,
        })
    }

    /// Creates a client from the backend section of the config.
    pub fn from_config(backend: &BackendConfig) -> Result<Self> {
        let mut config = ClientConfig::new(backend.base_url.clone(), backend.auth_token.clone());
        config.timeout = backend.timeout;
        Self::new(config)
    }

    /// Sends one request and returns the raw body of a 2xx response.
    async fn request(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, String)],
        body: Option<String>,
        idempotency_key: Option<&str>,
    ) -> Result<Vec<u8>> {
        let query = build_query(params);
        let url = if query.is_empty() {
            format!("{}{}", self.config.base_url, endpoint)
        } else {
            format!("{}{}?{}", self.config.base_url, endpoint, query)
        };

        let mut request = self.http_client.request(method.clone(), &url);
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        debug!(method = %method, endpoint = %endpoint, "sending request");

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout(self.config.timeout)
            } else {
                BackendError::Request(e)
            }
        })?;

        let status = response.status();
        let body = response.bytes().await?;

        if status.is_client_error() || status.is_server_error() {
            return Err(parse_error_response(status, &body));
        }

        Ok(body.to_vec())
    }
}

/// Percent-encodes parameters in the order given.
fn build_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Turns an error response into a [`BackendError::Api`].
fn parse_error_response(status: StatusCode, body: &[u8]) -> BackendError {
    #[derive(Deserialize)]
    struct ErrorResponse {
        message: Option<String>,
        error: Option<String>,
    }

    let message = serde_json::from_slice::<ErrorResponse>(body)
        .ok()
        .and_then(|resp| resp.message.or(resp.error))
        .unwrap_or_else(|| String::from_utf8_lossy(body).to_string());

    warn!(status = status.as_u16(), message = %message, "backend api error");

    BackendError::Api {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl OrderBackend for HttpBackend {
    async fn fetch_orders(&self, query: &FetchQuery) -> Result<RemotePage> {
        let mut params = vec![
            ("role", query.role.to_string()),
            ("user_id", query.user_id.clone()),
            ("page", query.page.to_string()),
            ("limit", query.page_size.to_string()),
        ];
        if let Some(status) = query.status {
            params.push(("status", status.to_string()));
        }

        let body = self
            .request(Method::GET, "/orders", &params, None, None)
            .await?;
        let page: RemoteOrderPage = serde_json::from_slice(&body)?;

        let received_at = chrono::Utc::now();
        let mut orders = Vec::with_capacity(page.data.len());
        for remote in page.data {
            match remote.into_order(received_at) {
                Ok(order) => orders.push(order),
                // one malformed order must not hide the rest of the page
                Err(e) => warn!(error = %e, "skipping remote order"),
            }
        }

        Ok(RemotePage {
            orders,
            deleted: page.deleted_ids,
            has_more: page.has_more,
        })
    }

    async fn push_status_update(&self, update: &StatusUpdate) -> Result<()> {
        let endpoint = format!(
            "/orders/{}/status",
            urlencoding::encode(update.order_id.as_str())
        );
        let body = serde_json::to_string(&StatusBody {
            status: update.status,
            at: update.at.to_rfc3339(),
            idempotency_key: &update.idempotency_key,
        })?;

        self.request(
            Method::POST,
            &endpoint,
            &[],
            Some(body),
            Some(&update.idempotency_key),
        )
        .await?;
        Ok(())
    }

    async fn submit_checkout(&self, cart: &CartSnapshot) -> Result<Order> {
        let body = serde_json::to_string(cart)?;
        let response = self
            .request(Method::POST, "/checkout", &[], Some(body), None)
            .await?;
        let envelope: Envelope<RemoteOrder> = serde_json::from_slice(&response)?;
        envelope.data.into_order(chrono::Utc::now())
    }

    fn name(&self) -> &str {
        "http"
    }
}
