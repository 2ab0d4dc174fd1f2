use serde::Serialize;
use thiserror::Error;

use crate::remote::error_payload::SESSION_EXPIRED_MESSAGE;

/// Patterns (lowercase) that indicate sensitive data not safe for UI display.
/// Used by `contains_sensitive()` for case-insensitive matching.
pub(crate) const SENSITIVE_PATTERNS: &[&str] = &[
    "bearer ",
    "access_token",
    "refresh_token",
    "client_secret",
    "authorization:",
];

/// Returns true if the message contains any sensitive pattern (case-insensitive).
fn contains_sensitive(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Sanitizes a message for UI display.
/// If sensitive content is detected, returns the fallback instead.
fn sanitize_message(msg: &str, fallback: &str) -> String {
    if contains_sensitive(msg) {
        fallback.into()
    } else {
        msg.to_string()
    }
}

/// Recorded against targets skipped because the batch was cancelled.
pub const CANCELLED_BEFORE_START: &str = "Cancelled before it started";

const RATE_LIMITED_MESSAGE: &str = "The ad platform is limiting requests.";

/// User-friendly error presentation for the hosting UI.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPresentation {
    pub title: String,
    pub message: String,
    pub action: Option<String>,
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Auth ──────────────────────────────────────────────────────────────────
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Session expired")]
    SessionExpired,

    // ── Remote API ────────────────────────────────────────────────────────────
    #[error("Remote API error: {message}")]
    RemoteApi { status: Option<u16>, message: String },

    #[error("Rate limited")]
    RateLimited {
        retry_after_secs: Option<u64>,
        /// Text chosen by the message extraction chain, when the body had one.
        message: Option<String>,
    },

    // ── Batch ─────────────────────────────────────────────────────────────────
    #[error("Batch cannot start: {}", .0.join("; "))]
    Precondition(Vec<String>),

    #[error("Warnings must be acknowledged before the batch can start")]
    WarningsNotAcknowledged(Vec<String>),

    #[error("Operation cancelled")]
    Cancelled,

    // ── Upload ────────────────────────────────────────────────────────────────
    #[error("Upload of {file} failed: {message}")]
    UploadFailed { file: String, message: String },

    #[error("Progress channel error: {0}")]
    ChannelFailed(String),

    // ── Network ───────────────────────────────────────────────────────────────
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    // ── Configuration ─────────────────────────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Converts the error into a user-friendly presentation suitable for UI display.
    /// Never leaks secrets, tokens, or sensitive URL parameters.
    pub fn to_presentation(&self) -> ErrorPresentation {
        match self {
            // ── Auth ──────────────────────────────────────────────────────────
            AppError::NotAuthenticated => ErrorPresentation {
                title: "Not Logged In".into(),
                message: "You need to connect your ad account to continue.".into(),
                action: Some("Log in and reconnect".into()),
            },

            AppError::SessionExpired => ErrorPresentation {
                title: "Session Expired".into(),
                message: SESSION_EXPIRED_MESSAGE.into(),
                action: Some("Log in again".into()),
            },

            // ── Remote API ────────────────────────────────────────────────────
            AppError::RemoteApi { message, .. } => ErrorPresentation {
                title: "Ad Platform Error".into(),
                message: sanitize_message(message, "The ad platform rejected the request."),
                action: None,
            },

            AppError::RateLimited {
                retry_after_secs,
                message,
            } => {
                let wait_msg = match retry_after_secs {
                    Some(secs) => format!("Please wait {} seconds before trying again.", secs),
                    None => "Please wait a moment before trying again.".into(),
                };
                let reason = match message {
                    Some(m) => sanitize_message(m, RATE_LIMITED_MESSAGE),
                    None => RATE_LIMITED_MESSAGE.to_string(),
                };
                ErrorPresentation {
                    title: "Too Many Requests".into(),
                    message: format!("{} {}", reason, wait_msg),
                    action: Some("Wait and retry".into()),
                }
            }

            // ── Batch ─────────────────────────────────────────────────────────
            AppError::Precondition(errors) => ErrorPresentation {
                title: "Incompatible Selection".into(),
                message: sanitize_message(
                    &errors.join(" "),
                    "The selected targets cannot be processed together.",
                ),
                action: Some("Change your selection and try again".into()),
            },

            AppError::WarningsNotAcknowledged(warnings) => ErrorPresentation {
                title: "Review Warnings".into(),
                message: sanitize_message(
                    &warnings.join(" "),
                    "Some selected targets may be rejected by the ad platform.",
                ),
                action: Some("Acknowledge the warnings to continue".into()),
            },

            AppError::Cancelled => ErrorPresentation {
                title: "Cancelled".into(),
                message: CANCELLED_BEFORE_START.into(),
                action: None,
            },

            // ── Upload ────────────────────────────────────────────────────────
            AppError::UploadFailed { file, message } => ErrorPresentation {
                title: "Upload Failed".into(),
                message: sanitize_message(
                    &format!("{}: {}", file, message),
                    "A file could not be uploaded.",
                ),
                action: Some("Check the file and upload it again".into()),
            },

            AppError::ChannelFailed(_) => ErrorPresentation {
                title: "Live Progress Unavailable".into(),
                message: "Upload progress could not be displayed. Results will still be reported when the upload finishes.".into(),
                action: None,
            },

            // ── Network ───────────────────────────────────────────────────────
            AppError::ConnectionFailed(_) => ErrorPresentation {
                title: "Connection Failed".into(),
                message: "Could not reach the ad platform. Please check your internet connection.".into(),
                action: Some("Check network and retry".into()),
            },

            // ── Configuration ─────────────────────────────────────────────────
            AppError::InvalidConfig(msg) => ErrorPresentation {
                title: "Configuration Error".into(),
                message: sanitize_message(msg, "The application is misconfigured."),
                action: Some("Fix the configuration and restart".into()),
            },

            // ── Generic ───────────────────────────────────────────────────────
            AppError::Internal(_) => ErrorPresentation {
                title: "Unexpected Error".into(),
                message: "Something went wrong. Please try again.".into(),
                action: Some("Try again".into()),
            },
        }
    }

    /// Message recorded against a failed target or file in batch summaries.
    ///
    /// Remote errors keep the text chosen by the message extraction chain;
    /// everything else falls back to the presentation message.
    pub fn user_message(&self) -> String {
        match self {
            AppError::RemoteApi { message, .. } => {
                sanitize_message(message, "The ad platform rejected the request.")
            }
            AppError::UploadFailed { message, .. } => {
                sanitize_message(message, "The file could not be uploaded.")
            }
            AppError::RateLimited {
                message: Some(message),
                ..
            } => sanitize_message(message, RATE_LIMITED_MESSAGE),
            other => other.to_presentation().message,
        }
    }

    /// HTTP status attached to the error, if it came from a remote response.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            AppError::RemoteApi { status, .. } => *status,
            AppError::SessionExpired => Some(401),
            AppError::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_presentation().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns all AppError variants for exhaustive testing.
    fn all_variants() -> Vec<AppError> {
        vec![
            // Auth
            AppError::NotAuthenticated,
            AppError::SessionExpired,
            // Remote
            AppError::RemoteApi { status: Some(400), message: "Invalid budget".into() },
            AppError::RemoteApi { status: None, message: "bad".into() },
            AppError::RateLimited { retry_after_secs: Some(30), message: None },
            AppError::RateLimited {
                retry_after_secs: None,
                message: Some("Too many ads created this hour".into()),
            },
            // Batch
            AppError::Precondition(vec!["Targets span 2 ad accounts".into()]),
            AppError::WarningsNotAcknowledged(vec!["Objectives differ".into()]),
            AppError::Cancelled,
            // Upload
            AppError::UploadFailed { file: "hero.mp4".into(), message: "too large".into() },
            AppError::ChannelFailed("stream closed".into()),
            // Network
            AppError::ConnectionFailed("timeout".into()),
            // Config
            AppError::InvalidConfig("ADS_BULK_API_BASE_URL is not a URL".into()),
            // Generic
            AppError::Internal("something broke".into()),
        ]
    }

    #[test]
    fn all_variants_have_nonempty_title_and_message() {
        for variant in all_variants() {
            let presentation = variant.to_presentation();
            assert!(
                !presentation.title.trim().is_empty(),
                "Empty title for {:?}",
                variant
            );
            assert!(
                !presentation.message.trim().is_empty(),
                "Empty message for {:?}",
                variant
            );
        }
    }

    #[test]
    fn actionable_errors_have_actions() {
        let actionable = vec![
            AppError::NotAuthenticated,
            AppError::SessionExpired,
            AppError::RateLimited { retry_after_secs: None, message: None },
            AppError::Precondition(vec!["x".into()]),
            AppError::WarningsNotAcknowledged(vec!["y".into()]),
            AppError::ConnectionFailed("network error".into()),
        ];

        for variant in actionable {
            let presentation = variant.to_presentation();
            let action = presentation
                .action
                .unwrap_or_else(|| panic!("Expected action for {:?}", variant));
            assert!(!action.trim().is_empty(), "Empty action for {:?}", variant);
        }
    }

    #[test]
    fn remote_api_user_message_keeps_extracted_text() {
        let err = AppError::RemoteApi {
            status: Some(400),
            message: "Budget is too low for this objective".into(),
        };
        assert_eq!(err.user_message(), "Budget is too low for this objective");
        assert_eq!(err.http_status(), Some(400));
    }

    #[test]
    fn non_remote_user_message_uses_presentation() {
        let err = AppError::Cancelled;
        assert_eq!(err.user_message(), CANCELLED_BEFORE_START);
        assert_eq!(err.http_status(), None);
    }

    #[test]
    fn rate_limited_keeps_extracted_message() {
        let err = AppError::RateLimited {
            retry_after_secs: Some(60),
            message: Some("Too many ads created this hour".into()),
        };
        assert_eq!(err.user_message(), "Too many ads created this hour");
        assert_eq!(err.http_status(), Some(429));
        let presentation = err.to_presentation();
        assert!(presentation.message.starts_with("Too many ads created this hour"));
        assert!(presentation.message.contains("60 seconds"));

        let bare = AppError::RateLimited {
            retry_after_secs: None,
            message: None,
        };
        assert!(bare.user_message().starts_with(RATE_LIMITED_MESSAGE));
    }

    #[test]
    fn session_expired_uses_chain_text() {
        assert_eq!(AppError::SessionExpired.user_message(), SESSION_EXPIRED_MESSAGE);
        assert_eq!(AppError::SessionExpired.http_status(), Some(401));
    }

    #[test]
    fn precondition_message_lists_every_error() {
        let err = AppError::Precondition(vec![
            "Targets span 2 ad accounts.".into(),
            "Target c2 has no campaign.".into(),
        ]);
        let message = err.to_presentation().message;
        assert!(message.contains("2 ad accounts"));
        assert!(message.contains("c2"));
    }

    #[test]
    fn serialization_produces_valid_json_with_required_fields() {
        for variant in all_variants() {
            let json = serde_json::to_string(&variant)
                .unwrap_or_else(|_| panic!("Failed to serialize {:?}", variant));
            let parsed: serde_json::Value = serde_json::from_str(&json)
                .unwrap_or_else(|_| panic!("Failed to parse JSON for {:?}", variant));

            assert!(parsed.get("title").is_some(), "{:?} missing 'title'", variant);
            assert!(parsed.get("message").is_some(), "{:?} missing 'message'", variant);
            assert!(parsed.get("action").is_some(), "{:?} missing 'action'", variant);
        }
    }

    #[test]
    fn no_secret_leakage_in_presentation() {
        let test_cases: Vec<(&str, AppError)> = vec![
            (
                "RemoteApi",
                AppError::RemoteApi {
                    status: Some(400),
                    message: "Authorization: Bearer abc123".into(),
                },
            ),
            (
                "UploadFailed",
                AppError::UploadFailed {
                    file: "a.png".into(),
                    message: "access_token=xyz rejected".into(),
                },
            ),
            ("ConnectionFailed", AppError::ConnectionFailed("client_secret=abc".into())),
            ("Internal", AppError::Internal("refresh_token leaked".into())),
        ];

        for (label, variant) in test_cases {
            let presentation = variant.to_presentation();
            let output_lower = format!(
                "{} {} {} {}",
                presentation.title,
                presentation.message,
                presentation.action.as_deref().unwrap_or(""),
                variant.user_message()
            )
            .to_ascii_lowercase();

            for pattern in SENSITIVE_PATTERNS {
                assert!(
                    !output_lower.contains(pattern),
                    "{} presentation contains sensitive pattern",
                    label
                );
            }
        }
    }
}
