//! Orchestrator configuration loaded from environment variables.
//!
//! Every field has a default suitable for local development. A `.env` file in
//! the working directory is honoured when present.

use std::time::Duration;

use url::Url;

use crate::error::AppError;

const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_CHANNEL_SETTLE_MS: u64 = 500;
const DEFAULT_PROGRESS_LINGER_MS: u64 = 2_000;
const DEFAULT_PROGRESS_DRAIN_MS: u64 = 5_000;
const DEFAULT_ERROR_PREVIEW: usize = 5;

/// Tunables shared by the upload coordinator, progress consumer and executor.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Base URL of the remote API gateway.
    pub api_base_url: Url,
    /// Per-request timeout. `None` leaves the transport default in place.
    pub request_timeout: Option<Duration>,
    /// Wait between opening the progress channel and the first upload request.
    pub channel_settle_delay: Duration,
    /// How long a finished file's progress state stays visible.
    pub progress_linger: Duration,
    /// How long to wait for `session-complete` after all upload groups settle.
    pub progress_drain_timeout: Duration,
    /// Number of error messages shown in a summary preview.
    pub error_preview_limit: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            // Constant input, parsing cannot fail
            api_base_url: Url::parse(DEFAULT_API_BASE_URL).expect("default base URL is valid"),
            request_timeout: None,
            channel_settle_delay: Duration::from_millis(DEFAULT_CHANNEL_SETTLE_MS),
            progress_linger: Duration::from_millis(DEFAULT_PROGRESS_LINGER_MS),
            progress_drain_timeout: Duration::from_millis(DEFAULT_PROGRESS_DRAIN_MS),
            error_preview_limit: DEFAULT_ERROR_PREVIEW,
        }
    }
}

impl OrchestratorConfig {
    /// Loads configuration from the process environment.
    ///
    /// | Env Var                         | Default                 |
    /// |---------------------------------|-------------------------|
    /// | `ADS_BULK_API_BASE_URL`         | `http://localhost:3000` |
    /// | `ADS_BULK_REQUEST_TIMEOUT_SECS` | unset (no timeout)      |
    /// | `ADS_BULK_CHANNEL_SETTLE_MS`    | `500`                   |
    /// | `ADS_BULK_PROGRESS_LINGER_MS`   | `2000`                  |
    /// | `ADS_BULK_PROGRESS_DRAIN_MS`    | `5000`                  |
    /// | `ADS_BULK_ERROR_PREVIEW`        | `5`                     |
    ///
    /// # Errors
    ///
    /// Returns `AppError::InvalidConfig` naming the first variable that fails to parse.
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_base_url = match lookup("ADS_BULK_API_BASE_URL") {
            Some(raw) => Url::parse(raw.trim()).map_err(|e| {
                AppError::InvalidConfig(format!("ADS_BULK_API_BASE_URL is not a valid URL: {}", e))
            })?,
            None => defaults.api_base_url,
        };

        let request_timeout = lookup("ADS_BULK_REQUEST_TIMEOUT_SECS")
            .map(|raw| parse_u64("ADS_BULK_REQUEST_TIMEOUT_SECS", &raw))
            .transpose()?
            .map(Duration::from_secs);

        let channel_settle_delay = millis_or(
            &lookup,
            "ADS_BULK_CHANNEL_SETTLE_MS",
            defaults.channel_settle_delay,
        )?;
        let progress_linger =
            millis_or(&lookup, "ADS_BULK_PROGRESS_LINGER_MS", defaults.progress_linger)?;
        let progress_drain_timeout = millis_or(
            &lookup,
            "ADS_BULK_PROGRESS_DRAIN_MS",
            defaults.progress_drain_timeout,
        )?;

        let error_preview_limit = match lookup("ADS_BULK_ERROR_PREVIEW") {
            Some(raw) => parse_u64("ADS_BULK_ERROR_PREVIEW", &raw)? as usize,
            None => defaults.error_preview_limit,
        };

        Ok(Self {
            api_base_url,
            request_timeout,
            channel_settle_delay,
            progress_linger,
            progress_drain_timeout,
            error_preview_limit,
        })
    }
}

fn parse_u64(key: &str, raw: &str) -> Result<u64, AppError> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| AppError::InvalidConfig(format!("{} must be a non-negative integer", key)))
}

fn millis_or<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => Ok(Duration::from_millis(parse_u64(key, &raw)?)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = OrchestratorConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.api_base_url.as_str(), "http://localhost:3000/");
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.channel_settle_delay, Duration::from_millis(500));
        assert_eq!(config.progress_linger, Duration::from_secs(2));
        assert_eq!(config.progress_drain_timeout, Duration::from_secs(5));
        assert_eq!(config.error_preview_limit, 5);
    }

    #[test]
    fn overrides_are_applied() {
        let config = OrchestratorConfig::from_lookup(lookup_from(&[
            ("ADS_BULK_API_BASE_URL", "https://ads.example.com"),
            ("ADS_BULK_REQUEST_TIMEOUT_SECS", "90"),
            ("ADS_BULK_CHANNEL_SETTLE_MS", "250"),
            ("ADS_BULK_ERROR_PREVIEW", " 3 "),
        ]))
        .unwrap();

        assert_eq!(config.api_base_url.host_str(), Some("ads.example.com"));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(90)));
        assert_eq!(config.channel_settle_delay, Duration::from_millis(250));
        assert_eq!(config.error_preview_limit, 3);
    }

    #[test]
    fn invalid_number_names_the_variable() {
        let err = OrchestratorConfig::from_lookup(lookup_from(&[(
            "ADS_BULK_PROGRESS_LINGER_MS",
            "soon",
        )]))
        .unwrap_err();

        match err {
            AppError::InvalidConfig(msg) => assert!(msg.contains("ADS_BULK_PROGRESS_LINGER_MS")),
            other => panic!("expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn invalid_url_is_rejected() {
        let err = OrchestratorConfig::from_lookup(lookup_from(&[(
            "ADS_BULK_API_BASE_URL",
            "not a url",
        )]))
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidConfig(_)));
    }
}
