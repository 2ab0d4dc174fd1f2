//! Request and response types for the remote API gateway.
//!
//! Field names follow the gateway's JSON (camelCase) exactly.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::remote::error_payload::RemoteErrorPayload;

// ─────────────────────────────────────────────────────────────────────────────
// Shared Enums
// ─────────────────────────────────────────────────────────────────────────────

/// Status given to a duplicated entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusOption {
    Active,
    #[default]
    Paused,
    /// Keep whatever status the source entity has.
    InheritedFromSource,
}

/// Per-file upload status reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Success,
    #[serde(alias = "error")]
    Failed,
}

// ─────────────────────────────────────────────────────────────────────────────
// Upload Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateUploadSessionRequest {
    pub total_items: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateUploadSessionResponse {
    pub session_id: String,
}

/// Request body for fetching third-party drive files into the ad account.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FetchRemoteFilesRequest<'a> {
    pub file_ids: Vec<&'a str>,
    pub account_id: &'a str,
    pub session_id: &'a str,
}

/// Outcome of one file inside an upload request.
///
/// The same shape is returned by the image, video and remote-file endpoints;
/// images carry `imageHash`, videos carry `data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUploadResult {
    /// File name as reported by the gateway.
    pub file: String,
    /// Media type for remote files (`image` or `video`).
    #[serde(default, rename = "type")]
    pub media_type: Option<String>,
    pub status: UploadStatus,
    #[serde(default)]
    pub image_hash: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    /// Raw error, either a string or an object.
    #[serde(default)]
    pub error: Option<Value>,
}

impl FileUploadResult {
    pub fn is_success(&self) -> bool {
        self.status == UploadStatus::Success
    }

    /// Identifier of the uploaded asset: the image hash, or the video id.
    pub fn asset_id(&self) -> Option<String> {
        self.image_hash.clone().or_else(|| {
            self.data
                .as_ref()
                .and_then(|d| d.get("id"))
                .and_then(|id| match id {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
        })
    }

    /// Message for a failed file, selected through the error priority chain.
    pub fn error_message(&self) -> Option<String> {
        if self.is_success() {
            return None;
        }
        let payload = self
            .error
            .as_ref()
            .map(RemoteErrorPayload::from_value)
            .unwrap_or_default();
        Some(payload.extract_message())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Duplication Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateCampaignRequest {
    pub campaign_id: String,
    pub new_name: String,
    pub deep_copy: bool,
    pub status_option: StatusOption,
    pub account_id: String,
}

/// Response from campaign duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicatedCampaign {
    pub id: String,
    #[serde(default)]
    pub objective: Option<String>,
    /// Duplication mode; `async` means children are still being copied.
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub structure: Option<Value>,
}

impl DuplicatedCampaign {
    /// Whether child ad sets and ads may not exist remotely yet.
    pub fn children_pending(&self) -> bool {
        self.mode
            .as_deref()
            .map(|m| m.eq_ignore_ascii_case("async") || m.eq_ignore_ascii_case("batch"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateAdSetRequest {
    pub ad_set_id: String,
    pub new_name: String,
    pub deep_copy: bool,
    pub status_option: StatusOption,
    pub campaign_id: Option<String>,
    pub account_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicatedAdSet {
    pub id: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Creation Types
// ─────────────────────────────────────────────────────────────────────────────

/// Request for creating the same ad set under several campaigns.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAdSetMultipleRequest {
    pub campaign_ids: Vec<String>,
    pub account_id: String,
    /// Ad set fields (name, budget, targeting, ...) passed through unchanged.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedAdSet {
    pub campaign_id: String,
    #[serde(alias = "adsetId", alias = "adSetId")]
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedAdSet {
    pub campaign_id: String,
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAdSetMultipleResponse {
    pub total_created: u32,
    pub total_failed: u32,
    #[serde(default)]
    pub created_adsets: Vec<CreatedAdSet>,
    #[serde(default)]
    pub failed_adsets: Vec<FailedAdSet>,
}

/// An already-uploaded creative referenced by an ad.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CreativeAsset {
    Image {
        #[serde(rename = "imageHash")]
        image_hash: String,
    },
    Video {
        #[serde(rename = "videoId")]
        video_id: String,
    },
}

/// Request for creating one ad per creative asset inside an ad set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAdCreativeMultipleRequest {
    pub adset_id: String,
    pub account_id: String,
    /// Ad copy fields (primary text, headline, link, call to action, ...).
    pub ad_copy: Map<String, Value>,
    pub assets: Vec<CreativeAsset>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettledStatus {
    Fulfilled,
    Rejected,
}

/// One settled ad creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettledAd {
    pub status: SettledStatus,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub reason: Option<Value>,
}
