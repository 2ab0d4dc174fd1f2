//! HTTP client for the ad platform gateway with secure token handling and safe logging.

use std::sync::Arc;
use std::time::Instant;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};
use url::Url;

use crate::config::OrchestratorConfig;
use crate::error::AppError;
use crate::remote::error_payload::RemoteErrorPayload;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// User agent string for all gateway requests.
const CLIENT_USER_AGENT: &str = concat!("ads-bulk/", env!("CARGO_PKG_VERSION"));

/// Query parameter keys (case-insensitive) that should have their values redacted.
const SENSITIVE_QUERY_PARAMS: &[&str] = &[
    "access_token",
    "refresh_token",
    "client_secret",
    "code",
    "token",
    "session",
    "authorization",
];

// ─────────────────────────────────────────────────────────────────────────────
// LoggingMode
// ─────────────────────────────────────────────────────────────────────────────

/// Controls how URLs are sanitized for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoggingMode {
    /// Log only the path component. Strips scheme, host, query, and fragment.
    #[default]
    PathOnly,

    /// Log path and query parameters, but redact sensitive values.
    PathAndQueryRedacted,
}

// ─────────────────────────────────────────────────────────────────────────────
// URL Sanitization
// ─────────────────────────────────────────────────────────────────────────────

/// Determines if a query parameter key is sensitive and should be redacted.
fn is_sensitive_param(key: &str) -> bool {
    let key_lower = key.to_ascii_lowercase();
    SENSITIVE_QUERY_PARAMS
        .iter()
        .any(|&sensitive| key_lower == sensitive)
}

/// Sanitizes a URL for safe logging based on the specified mode.
///
/// The result never contains the scheme, host, or fragment.
pub fn sanitize_url_for_logs(url: &Url, mode: LoggingMode) -> String {
    let path = url.path();

    match mode {
        LoggingMode::PathOnly => path.to_string(),
        LoggingMode::PathAndQueryRedacted => {
            let query_pairs: Vec<_> = url.query_pairs().collect();
            if query_pairs.is_empty() {
                return path.to_string();
            }

            let redacted_pairs: Vec<String> = query_pairs
                .into_iter()
                .map(|(key, value)| {
                    if is_sensitive_param(&key) {
                        format!("{}=***", key)
                    } else {
                        format!("{}={}", key, value)
                    }
                })
                .collect();

            format!("{}?{}", path, redacted_pairs.join("&"))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ApiClient
// ─────────────────────────────────────────────────────────────────────────────

/// Thread-safe HTTP client for the ad platform gateway.
///
/// The access token is supplied by the host application and kept in a
/// `SecretString`; it is attached as a bearer token and never logged.
#[derive(Clone)]
pub struct ApiClient {
    /// The underlying HTTP client.
    http: reqwest::Client,
    /// Gateway base URL.
    base_url: Url,
    /// Current access token. Replaced when the host re-authenticates.
    access_token: Arc<RwLock<SecretString>>,
    /// Controls URL sanitization for logging.
    logging_mode: LoggingMode,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("access_token", &"[REDACTED]")
            .field("logging_mode", &self.logging_mode)
            .finish()
    }
}

impl ApiClient {
    /// Creates a new client for the configured gateway.
    ///
    /// # Errors
    ///
    /// - `AppError::NotAuthenticated` - the host supplied an empty token
    /// - `AppError::Internal` - the HTTP client fails to initialize
    pub fn new(config: &OrchestratorConfig, access_token: SecretString) -> Result<Self, AppError> {
        if access_token.expose_secret().trim().is_empty() {
            return Err(AppError::NotAuthenticated);
        }
        let http = build_http_client(config)?;
        Ok(Self {
            http,
            base_url: config.api_base_url.clone(),
            access_token: Arc::new(RwLock::new(access_token)),
            logging_mode: LoggingMode::default(),
        })
    }

    /// Updates the logging mode for URL sanitization.
    pub fn with_logging_mode(mut self, mode: LoggingMode) -> Self {
        self.logging_mode = mode;
        self
    }

    /// Replaces the access token (e.g., after the host re-authenticates).
    pub async fn update_access_token(&self, token: SecretString) {
        let mut guard = self.access_token.write().await;
        *guard = token;
    }

    /// Builds a full URL by joining the path with the gateway base URL.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if the URL cannot be built.
    pub fn build_url(&self, path: &str) -> Result<Url, AppError> {
        self.base_url
            .join(path)
            .map_err(|_| AppError::Internal(format!("Invalid path: {}", path)))
    }

    /// POSTs a JSON body and decodes a JSON response.
    ///
    /// # Errors
    ///
    /// - `AppError::RemoteApi` - non-success status (message from the priority chain)
    /// - `AppError::RateLimited` - HTTP 429
    /// - `AppError::ConnectionFailed` - network error
    pub async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, AppError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.build_url(path)?;
        let request = self.http.post(url.as_str()).json(body);
        let response = self.execute(Method::POST, url, request).await?;
        decode_json(response).await
    }

    /// POSTs a multipart form and decodes a JSON response.
    ///
    /// File parts are streamed; their contents are never logged.
    pub async fn post_multipart<R>(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<R, AppError>
    where
        R: DeserializeOwned,
    {
        let url = self.build_url(path)?;
        let request = self.http.post(url.as_str()).multipart(form);
        let response = self.execute(Method::POST, url, request).await?;
        decode_json(response).await
    }

    /// Opens a long-lived `text/event-stream` response.
    ///
    /// The caller owns the returned response and reads it as a byte stream.
    pub async fn open_event_stream(&self, path: &str) -> Result<Response, AppError> {
        let url = self.build_url(path)?;
        let request = self
            .http
            .get(url.as_str())
            .header(ACCEPT, "text/event-stream");
        self.execute(Method::GET, url, request).await
    }

    /// Attaches the bearer token, sends the request, logs the outcome and maps
    /// non-success statuses to errors.
    ///
    /// # Security
    ///
    /// - Never logs the Authorization header
    /// - Never logs request/response bodies
    /// - Sanitizes URLs before logging
    async fn execute(
        &self,
        method: Method,
        url: Url,
        request: RequestBuilder,
    ) -> Result<Response, AppError> {
        let start = Instant::now();
        let sanitized_url = sanitize_url_for_logs(&url, self.logging_mode);

        let request = {
            let token = self.access_token.read().await;
            request.bearer_auth(token.expose_secret())
        };

        let result = request.send().await;
        let duration_ms = start.elapsed().as_millis();

        let response = match result {
            Ok(response) => response,
            Err(_) => {
                // The raw reqwest error may embed the full URL, so it is not surfaced
                info!(
                    "[ADS-API] {} {} FAILED {}ms",
                    method, sanitized_url, duration_ms
                );
                return Err(AppError::ConnectionFailed(
                    "Connection to the ad platform failed".to_string(),
                ));
            }
        };

        let status = response.status();
        let x_request_id = response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string();

        info!(
            "[ADS-API] {} {} {} {}ms {}",
            method,
            sanitized_url,
            status.as_u16(),
            duration_ms,
            x_request_id
        );

        if !status.is_success() {
            return Err(parse_error_response(response, status).await);
        }

        Ok(response)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Builds the configured HTTP client.
fn build_http_client(config: &OrchestratorConfig) -> Result<reqwest::Client, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

    let mut builder = reqwest::Client::builder().default_headers(headers);
    if let Some(timeout) = config.request_timeout {
        builder = builder.timeout(timeout);
    }

    builder
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}

async fn decode_json<R: DeserializeOwned>(response: Response) -> Result<R, AppError> {
    response.json::<R>().await.map_err(|e| AppError::RemoteApi {
        status: None,
        message: format!("Unexpected response from the ad platform: {}", e),
    })
}

/// Maps an error response to the appropriate `AppError`.
async fn parse_error_response(response: Response, status: StatusCode) -> AppError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        let body = read_body(response, status).await;
        let payload = RemoteErrorPayload::from_response(status.as_u16(), &body);
        return AppError::RateLimited {
            retry_after_secs: retry_after,
            message: payload.has_message().then(|| payload.extract_message()),
        };
    }

    let body = read_body(response, status).await;
    RemoteErrorPayload::from_response(status.as_u16(), &body).into_app_error()
}

async fn read_body(response: Response, status: StatusCode) -> String {
    match response.text().await {
        Ok(body) => body,
        Err(_) => {
            warn!("[ADS-API] Unable to read error body for {}", status.as_u16());
            String::new()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
