//! Typed progress events carried by the upload progress stream.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::progress::sse::SseFrame;

/// Lifecycle event for one upload session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProgressEvent {
    Connected,
    SessionStart {
        total: usize,
    },
    FileStart {
        index: usize,
        name: String,
    },
    FileProgress {
        index: usize,
        /// Always within 0..=100.
        percent: u8,
        stage: Option<String>,
    },
    FileComplete {
        index: usize,
        name: String,
    },
    FileError {
        index: usize,
        name: String,
        message: String,
    },
    SessionComplete,
}

/// Loose view of an event payload; the server is not consistent about which
/// fields it sends.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPayload {
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(alias = "fileIndex")]
    index: Option<usize>,
    #[serde(alias = "fileName")]
    name: Option<String>,
    percent: Option<f64>,
    stage: Option<String>,
    #[serde(alias = "error")]
    message: Option<String>,
    #[serde(alias = "totalItems")]
    total: Option<usize>,
}

impl ProgressEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::Connected => "connected",
            ProgressEvent::SessionStart { .. } => "session-start",
            ProgressEvent::FileStart { .. } => "file-start",
            ProgressEvent::FileProgress { .. } => "file-progress",
            ProgressEvent::FileComplete { .. } => "file-complete",
            ProgressEvent::FileError { .. } => "file-error",
            ProgressEvent::SessionComplete => "session-complete",
        }
    }

    /// File index the event refers to, if any.
    pub fn file_index(&self) -> Option<usize> {
        match self {
            ProgressEvent::FileStart { index, .. }
            | ProgressEvent::FileProgress { index, .. }
            | ProgressEvent::FileComplete { index, .. }
            | ProgressEvent::FileError { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Converts a decoded SSE frame into an event.
    ///
    /// The event name comes from the `event:` field, or from the payload's
    /// `type` field when that is absent. Unknown names and malformed payloads
    /// yield `None`.
    pub fn from_frame(frame: &SseFrame) -> Option<Self> {
        let raw: RawPayload = if frame.data.trim().is_empty() {
            RawPayload::default()
        } else {
            match serde_json::from_str(&frame.data) {
                Ok(raw) => raw,
                Err(e) => {
                    debug!("[PROGRESS] Ignoring malformed event payload: {}", e);
                    return None;
                }
            }
        };

        let name = frame
            .event
            .as_deref()
            .filter(|e| !e.is_empty())
            .or(raw.kind.as_deref())?
            .to_string();

        let event = match name.as_str() {
            "connected" => ProgressEvent::Connected,
            "session-start" => ProgressEvent::SessionStart {
                total: raw.total.unwrap_or(0),
            },
            "file-start" => ProgressEvent::FileStart {
                index: raw.index?,
                name: raw.name.unwrap_or_default(),
            },
            "file-progress" => ProgressEvent::FileProgress {
                index: raw.index?,
                percent: clamp_percent(raw.percent.unwrap_or(0.0)),
                stage: raw.stage,
            },
            "file-complete" => ProgressEvent::FileComplete {
                index: raw.index?,
                name: raw.name.unwrap_or_default(),
            },
            "file-error" => ProgressEvent::FileError {
                index: raw.index?,
                name: raw.name.unwrap_or_default(),
                message: raw
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "Upload failed".to_string()),
            },
            "session-complete" => ProgressEvent::SessionComplete,
            other => {
                debug!("[PROGRESS] Ignoring unknown event '{}'", other);
                return None;
            }
        };
        Some(event)
    }
}

fn clamp_percent(percent: f64) -> u8 {
    if percent.is_nan() {
        return 0;
    }
    percent.round().clamp(0.0, 100.0) as u8
}
