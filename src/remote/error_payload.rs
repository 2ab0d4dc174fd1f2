//! Extraction of a human-readable message from raw remote error payloads.
//!
//! The ad platform nests its error text inconsistently across endpoints, so
//! every failed target and every failed file goes through the same priority
//! chain:
//!
//! 1. `error_user_msg`
//! 2. HTTP 403 with a re-authentication flag
//! 3. HTTP 403
//! 4. HTTP 401
//! 5. `error`
//! 6. `details`
//! 7. generic fallback

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AppError;

pub const REAUTH_REQUIRED_MESSAGE: &str =
    "Your ad account connection needs to be re-authorized. Please reconnect your account and try again.";
pub const AUTH_FAILED_MESSAGE: &str = "Authentication failed. Please log in again.";
pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please log in again.";
pub const FALLBACK_MESSAGE: &str = "An unexpected error occurred. Please try again.";

/// Keys accepted as the "needs re-authentication" flag.
const REAUTH_FLAGS: &[&str] = &["requires_reauth", "needsReauth", "reauth_required"];

/// Normalized view of an error returned by the remote API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteErrorPayload {
    /// HTTP status of the response, when the error came from one.
    pub status: Option<u16>,
    /// Platform-provided text intended for end users.
    pub error_user_msg: Option<String>,
    /// Whether the platform asked for the account to be reconnected.
    pub requires_reauth: bool,
    /// Generic error text.
    pub error: Option<String>,
    /// Additional diagnostic details.
    pub details: Option<String>,
}

impl RemoteErrorPayload {
    /// Builds a payload from a response status and its (possibly non-JSON) body.
    pub fn from_response(status: u16, body: &str) -> Self {
        let mut payload = match serde_json::from_str::<Value>(body) {
            Ok(value) => Self::from_value(&value),
            Err(_) => Self {
                error: non_empty(body.trim()),
                ..Self::default()
            },
        };
        payload.status = Some(status);
        payload
    }

    /// Builds a payload from an arbitrary JSON error value.
    ///
    /// Accepts a bare string, a flat object, or an object with a nested
    /// `error` object (`error.error_user_msg`, `error.message`).
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(s) => Self {
                error: non_empty(s),
                ..Self::default()
            },
            Value::Object(map) => {
                let nested = map.get("error").and_then(Value::as_object);

                let error_user_msg = string_field(map.get("error_user_msg")).or_else(|| {
                    nested.and_then(|n| string_field(n.get("error_user_msg")))
                });

                let error = match map.get("error") {
                    Some(Value::String(s)) => non_empty(s),
                    Some(Value::Object(n)) => string_field(n.get("message")),
                    _ => None,
                }
                .or_else(|| string_field(map.get("message")));

                let details = match map.get("details") {
                    Some(Value::String(s)) => non_empty(s),
                    Some(Value::Null) | None => None,
                    Some(other) => Some(other.to_string()),
                };

                let requires_reauth = REAUTH_FLAGS.iter().any(|flag| {
                    map.get(*flag).and_then(Value::as_bool).unwrap_or(false)
                        || nested
                            .and_then(|n| n.get(*flag))
                            .and_then(Value::as_bool)
                            .unwrap_or(false)
                });

                let status = map
                    .get("status")
                    .and_then(Value::as_u64)
                    .and_then(|s| u16::try_from(s).ok());

                Self {
                    status,
                    error_user_msg,
                    requires_reauth,
                    error,
                    details,
                }
            }
            Value::Null => Self::default(),
            other => Self {
                error: Some(other.to_string()),
                ..Self::default()
            },
        }
    }

    /// Selects the most actionable message available.
    pub fn extract_message(&self) -> String {
        if let Some(msg) = &self.error_user_msg {
            return msg.clone();
        }
        match self.status {
            Some(403) if self.requires_reauth => return REAUTH_REQUIRED_MESSAGE.to_string(),
            Some(403) => return AUTH_FAILED_MESSAGE.to_string(),
            Some(401) => return SESSION_EXPIRED_MESSAGE.to_string(),
            _ => {}
        }
        if let Some(msg) = &self.error {
            return msg.clone();
        }
        if let Some(msg) = &self.details {
            return msg.clone();
        }
        FALLBACK_MESSAGE.to_string()
    }

    /// Whether the body carried any text of its own.
    pub fn has_message(&self) -> bool {
        self.error_user_msg.is_some() || self.error.is_some() || self.details.is_some()
    }

    /// Converts the payload into the crate error carried by a failed target.
    ///
    /// A 401 with no user-facing text becomes `AppError::SessionExpired`.
    pub fn into_app_error(self) -> AppError {
        if self.status == Some(401) && self.error_user_msg.is_none() {
            return AppError::SessionExpired;
        }
        AppError::RemoteApi {
            status: self.status,
            message: self.extract_message(),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn string_field(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).and_then(non_empty)
}
