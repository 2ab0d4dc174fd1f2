//! Remote ad platform gateway: HTTP client, request types and error extraction.

use std::future::Future;
use std::pin::Pin;

use crate::error::AppError;

pub mod client;
pub mod error_payload;
pub mod gateway;
pub mod types;

pub use client::{sanitize_url_for_logs, ApiClient, LoggingMode};
pub use error_payload::RemoteErrorPayload;
pub use gateway::AdsGateway;

/// Boxed future returned by gateway seams so they stay object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AppError>> + Send + 'a>>;

/// Gateway endpoint paths, relative to the configured base URL.
pub mod paths {
    pub const UPLOAD_SESSION: &str = "/api/upload/session";
    pub const UPLOAD_IMAGES: &str = "/api/upload/images";
    pub const UPLOAD_VIDEOS: &str = "/api/upload/videos";
    pub const UPLOAD_REMOTE: &str = "/api/upload/drive";
    pub const CREATE_AD_SETS: &str = "/api/adsets/multiple";
    pub const CREATE_ADS: &str = "/api/ads/multiple";

    pub fn duplicate_campaign(campaign_id: &str) -> String {
        format!("/api/campaigns/{}/duplicate", campaign_id)
    }

    pub fn duplicate_ad_set(ad_set_id: &str) -> String {
        format!("/api/adsets/{}/duplicate", ad_set_id)
    }

    pub fn upload_progress(session_id: &str) -> String {
        format!("/api/upload/progress/{}", session_id)
    }
}
