//! The remote API gateway seam.
//!
//! `AdsGateway` lists every mutating call the orchestrator makes. `ApiClient`
//! implements it over HTTP; tests provide in-memory fakes.

use reqwest::multipart::{Form, Part};
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::error::AppError;
use crate::logging::redact_id;
use crate::remote::client::ApiClient;
use crate::remote::types::{
    CreateAdCreativeMultipleRequest, CreateAdSetMultipleRequest, CreateAdSetMultipleResponse,
    CreateUploadSessionRequest, CreateUploadSessionResponse, DuplicateAdSetRequest,
    DuplicateCampaignRequest, DuplicatedAdSet, DuplicatedCampaign, FetchRemoteFilesRequest,
    FileUploadResult, SettledAd,
};
use crate::remote::{paths, BoxFuture};
use crate::upload::files::{LocalFile, RemoteFile};

// ─────────────────────────────────────────────────────────────────────────────
// Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Logical operations offered by the remote API gateway.
///
/// None of these calls are idempotent: retrying one creates a duplicate
/// remote entity.
pub trait AdsGateway: Send + Sync {
    /// Allocates a progress session for `total_items` files.
    fn create_upload_session(&self, total_items: usize) -> BoxFuture<'_, String>;

    /// Uploads local images. Images do not report progress events.
    fn upload_images<'a>(
        &'a self,
        files: &'a [LocalFile],
        account_id: &'a str,
    ) -> BoxFuture<'a, Vec<FileUploadResult>>;

    /// Uploads local videos, reporting progress under `session_id`.
    fn upload_videos<'a>(
        &'a self,
        files: &'a [LocalFile],
        account_id: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, Vec<FileUploadResult>>;

    /// Fetches third-party drive files and uploads them, reporting progress
    /// under `session_id`.
    fn fetch_and_upload_remote_files<'a>(
        &'a self,
        files: &'a [RemoteFile],
        account_id: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, Vec<FileUploadResult>>;

    fn duplicate_campaign(&self, req: DuplicateCampaignRequest)
        -> BoxFuture<'_, DuplicatedCampaign>;

    fn duplicate_ad_set(&self, req: DuplicateAdSetRequest) -> BoxFuture<'_, DuplicatedAdSet>;

    fn create_ad_set_multiple(
        &self,
        req: CreateAdSetMultipleRequest,
    ) -> BoxFuture<'_, CreateAdSetMultipleResponse>;

    fn create_ad_creative_multiple(
        &self,
        req: CreateAdCreativeMultipleRequest,
    ) -> BoxFuture<'_, Vec<SettledAd>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl AdsGateway for ApiClient {
    fn create_upload_session(&self, total_items: usize) -> BoxFuture<'_, String> {
        Box::pin(async move {
            info!("[ADS-API] Creating upload session for {} items", total_items);
            let response: CreateUploadSessionResponse = self
                .post_json(paths::UPLOAD_SESSION, &CreateUploadSessionRequest { total_items })
                .await?;
            Ok(response.session_id)
        })
    }

    fn upload_images<'a>(
        &'a self,
        files: &'a [LocalFile],
        account_id: &'a str,
    ) -> BoxFuture<'a, Vec<FileUploadResult>> {
        Box::pin(async move {
            info!(
                "[ADS-API] Uploading {} images to account {}",
                files.len(),
                redact_id(account_id)
            );
            let form = build_file_form("images", files)
                .await?
                .text("accountId", account_id.to_string());
            self.post_multipart(paths::UPLOAD_IMAGES, form).await
        })
    }

    fn upload_videos<'a>(
        &'a self,
        files: &'a [LocalFile],
        account_id: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, Vec<FileUploadResult>> {
        Box::pin(async move {
            info!(
                "[ADS-API] Uploading {} videos to account {} (session {})",
                files.len(),
                redact_id(account_id),
                redact_id(session_id)
            );
            let form = build_file_form("videos", files)
                .await?
                .text("accountId", account_id.to_string())
                .text("sessionId", session_id.to_string());
            self.post_multipart(paths::UPLOAD_VIDEOS, form).await
        })
    }

    fn fetch_and_upload_remote_files<'a>(
        &'a self,
        files: &'a [RemoteFile],
        account_id: &'a str,
        session_id: &'a str,
    ) -> BoxFuture<'a, Vec<FileUploadResult>> {
        Box::pin(async move {
            info!(
                "[ADS-API] Fetching {} drive files into account {} (session {})",
                files.len(),
                redact_id(account_id),
                redact_id(session_id)
            );
            let body = FetchRemoteFilesRequest {
                file_ids: files.iter().map(|f| f.file_id.as_str()).collect(),
                account_id,
                session_id,
            };
            self.post_json(paths::UPLOAD_REMOTE, &body).await
        })
    }

    fn duplicate_campaign(
        &self,
        req: DuplicateCampaignRequest,
    ) -> BoxFuture<'_, DuplicatedCampaign> {
        Box::pin(async move {
            let path = paths::duplicate_campaign(&req.campaign_id);
            self.post_json(&path, &req).await
        })
    }

    fn duplicate_ad_set(&self, req: DuplicateAdSetRequest) -> BoxFuture<'_, DuplicatedAdSet> {
        Box::pin(async move {
            let path = paths::duplicate_ad_set(&req.ad_set_id);
            self.post_json(&path, &req).await
        })
    }

    fn create_ad_set_multiple(
        &self,
        req: CreateAdSetMultipleRequest,
    ) -> BoxFuture<'_, CreateAdSetMultipleResponse> {
        Box::pin(async move { self.post_json(paths::CREATE_AD_SETS, &req).await })
    }

    fn create_ad_creative_multiple(
        &self,
        req: CreateAdCreativeMultipleRequest,
    ) -> BoxFuture<'_, Vec<SettledAd>> {
        Box::pin(async move { self.post_json(paths::CREATE_ADS, &req).await })
    }
}

/// Builds a multipart form with one streamed part per file under `field`.
async fn build_file_form(field: &'static str, files: &[LocalFile]) -> Result<Form, AppError> {
    let mut form = Form::new();
    for file in files {
        let handle = tokio::fs::File::open(&file.path).await.map_err(|e| {
            AppError::UploadFailed {
                file: file.name.clone(),
                message: format!("Failed to open file: {}", e),
            }
        })?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(handle));
        let part = Part::stream_with_length(body, file.size)
            .file_name(file.name.clone())
            .mime_str(&file.content_type)
            .map_err(|_| AppError::UploadFailed {
                file: file.name.clone(),
                message: format!("Unsupported content type: {}", file.content_type),
            })?;
        form = form.part(field, part);
    }
    Ok(form)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
