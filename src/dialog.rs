//! Per-dialog batch context.
//!
//! A `BatchDialog` is created when the user opens a batch dialog and owns
//! everything that interaction needs: the selection, its validation report,
//! the cancellation token and the UI callbacks. Nothing is shared between
//! dialogs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::batch::{
    summarize, summarize_uploads, validate, BatchExecutor, BatchJob, BatchKind, BatchSummary,
    CampaignMeta, CreateAdOp, CreateAdSetOp, DuplicateAdSetOp, DuplicateCampaignOp,
    DuplicateOptions, ItemFailure, TargetDescriptor, TargetProgressListener, TargetResult,
    UploadCreativesOp, ValidationReport,
};
use crate::config::OrchestratorConfig;
use crate::error::AppError;
use crate::progress::{CompletionListener, FileProgressListener, ProgressSource};
use crate::remote::types::CreativeAsset;
use crate::remote::AdsGateway;
use crate::upload::{CreativeFile, UploadCoordinator};

/// Callback invoked once with the final summary.
pub type BatchCompleteListener = Arc<dyn Fn(&BatchSummary) + Send + Sync>;

/// What to do to every target, with the inputs each kind needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchRequest {
    DuplicateCampaign {
        #[serde(default)]
        options: DuplicateOptions,
    },
    DuplicateAdSet {
        #[serde(default)]
        options: DuplicateOptions,
        #[serde(default)]
        destination_campaign_id: Option<String>,
    },
    CreateAdSetMulti {
        fields: Map<String, Value>,
    },
    CreateAdMulti {
        ad_copy: Map<String, Value>,
        /// Already uploaded creatives.
        #[serde(default)]
        assets: Vec<CreativeAsset>,
        /// Creatives to upload before the ads are created.
        #[serde(default)]
        new_files: Vec<CreativeFile>,
    },
    UploadCreatives {
        files: Vec<CreativeFile>,
    },
}

impl BatchRequest {
    pub fn kind(&self) -> BatchKind {
        match self {
            BatchRequest::DuplicateCampaign { .. } => BatchKind::DuplicateCampaign,
            BatchRequest::DuplicateAdSet { .. } => BatchKind::DuplicateAdSet,
            BatchRequest::CreateAdSetMulti { .. } => BatchKind::CreateAdSetMulti,
            BatchRequest::CreateAdMulti { .. } => BatchKind::CreateAdMulti,
            BatchRequest::UploadCreatives { .. } => BatchKind::UploadCreatives,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dialog
// ─────────────────────────────────────────────────────────────────────────────

pub struct BatchDialog<G: AdsGateway, P: ProgressSource> {
    gateway: Arc<G>,
    progress: Arc<P>,
    config: OrchestratorConfig,
    kind: BatchKind,
    targets: Vec<TargetDescriptor>,
    validation: ValidationReport,
    warnings_acknowledged: bool,
    cancel: CancellationToken,
    on_target_progress: Option<TargetProgressListener>,
    on_file_progress: Option<FileProgressListener>,
    on_upload_complete: Option<CompletionListener>,
    on_batch_complete: Option<BatchCompleteListener>,
}

/// Opens a dialog for `kind` over `targets` and pre-validates the selection.
///
/// `campaigns` is the metadata already loaded for the referenced campaigns.
pub fn open_batch_dialog<G, P>(
    gateway: Arc<G>,
    progress: Arc<P>,
    config: OrchestratorConfig,
    kind: BatchKind,
    targets: Vec<TargetDescriptor>,
    campaigns: &[CampaignMeta],
) -> BatchDialog<G, P>
where
    G: AdsGateway + 'static,
    P: ProgressSource + 'static,
{
    let validation = validate(&targets, kind, campaigns);
    info!(
        "[BATCH] Dialog opened: {} over {} targets ({} errors, {} warnings)",
        kind.as_str(),
        targets.len(),
        validation.hard_errors.len(),
        validation.soft_warnings.len()
    );

    BatchDialog {
        gateway,
        progress,
        config,
        kind,
        targets,
        validation,
        warnings_acknowledged: false,
        cancel: CancellationToken::new(),
        on_target_progress: None,
        on_file_progress: None,
        on_upload_complete: None,
        on_batch_complete: None,
    }
}

impl<G: AdsGateway + 'static, P: ProgressSource + 'static> BatchDialog<G, P> {
    pub fn kind(&self) -> BatchKind {
        self.kind
    }

    pub fn targets(&self) -> &[TargetDescriptor] {
        &self.targets
    }

    pub fn validation(&self) -> &ValidationReport {
        &self.validation
    }

    pub fn on_target_progress(&mut self, listener: TargetProgressListener) {
        self.on_target_progress = Some(listener);
    }

    pub fn on_file_progress(&mut self, listener: FileProgressListener) {
        self.on_file_progress = Some(listener);
    }

    /// Called with `(has_errors, errors)` when an upload's progress stream
    /// reports `session-complete`.
    pub fn on_upload_complete(&mut self, listener: CompletionListener) {
        self.on_upload_complete = Some(listener);
    }

    pub fn on_batch_complete(&mut self, listener: BatchCompleteListener) {
        self.on_batch_complete = Some(listener);
    }

    /// Confirms the user has seen the soft warnings.
    pub fn acknowledge_warnings(&mut self) {
        self.warnings_acknowledged = true;
    }

    /// Requests cancellation. Targets not yet started are marked failed;
    /// the in-flight call is not interrupted.
    pub fn cancel(&self) {
        info!("[BATCH] Cancellation requested");
        self.cancel.cancel();
    }

    /// Failure lines to show under the summary, capped at the configured
    /// preview size.
    pub fn error_preview(&self, summary: &BatchSummary) -> Vec<String> {
        summary.error_preview(self.config.error_preview_limit)
    }

    /// Checks the selection may start.
    fn ensure_ready(&self, request: &BatchRequest) -> Result<(), AppError> {
        if request.kind() != self.kind {
            return Err(AppError::Internal(format!(
                "Request for {} sent to a {} dialog",
                request.kind().as_str(),
                self.kind.as_str()
            )));
        }
        if !self.validation.ok {
            return Err(AppError::Precondition(self.validation.error_messages()));
        }
        if !self.validation.soft_warnings.is_empty() && !self.warnings_acknowledged {
            return Err(AppError::WarningsNotAcknowledged(
                self.validation.warning_messages(),
            ));
        }
        Ok(())
    }

    /// Runs the batch to completion and returns its summary.
    ///
    /// # Errors
    ///
    /// - `AppError::Precondition` - hard validation errors, or no creatives
    ///   left to build ads from
    /// - `AppError::WarningsNotAcknowledged` - soft warnings not acknowledged
    ///
    /// Per-target and per-file failures are reported in the summary, never
    /// as an error.
    pub async fn execute(&self, request: BatchRequest) -> Result<BatchSummary, AppError> {
        self.ensure_ready(&request)?;

        let mut job = BatchJob::new(self.kind, self.targets.clone())?;
        let executor = BatchExecutor::new(self.cancel.clone())
            .with_progress_listener(self.on_target_progress.clone());
        let coordinator = Arc::new(
            UploadCoordinator::new(self.gateway.clone(), self.progress.clone(), &self.config)
                .with_listeners(
                    self.on_file_progress.clone(),
                    self.on_upload_complete.clone(),
                ),
        );

        let mut item_failures: Vec<ItemFailure> = Vec::new();
        let results: Vec<TargetResult> = match request {
            BatchRequest::DuplicateCampaign { options } => {
                let op = DuplicateCampaignOp::new(self.gateway.clone(), options);
                executor.run(&mut job, &op).await?
            }
            BatchRequest::DuplicateAdSet {
                options,
                destination_campaign_id,
            } => {
                let op =
                    DuplicateAdSetOp::new(self.gateway.clone(), options, destination_campaign_id);
                executor.run(&mut job, &op).await?
            }
            BatchRequest::CreateAdSetMulti { fields } => {
                let op = CreateAdSetOp::new(self.gateway.clone(), fields);
                executor.run(&mut job, &op).await?
            }
            BatchRequest::CreateAdMulti {
                ad_copy,
                mut assets,
                new_files,
            } => {
                if !new_files.is_empty() {
                    // Validation guarantees one account for this kind
                    let account_id = job.targets[0].account_id.clone();
                    let report = coordinator.upload(new_files, &account_id).await?;
                    item_failures = summarize_uploads(std::slice::from_ref(&report));
                    assets.extend(report.assets());
                }
                if assets.is_empty() {
                    return Err(AppError::Precondition(vec![
                        "No creatives are available to build the ads from".to_string(),
                    ]));
                }
                let op = CreateAdOp::new(self.gateway.clone(), ad_copy, assets);
                executor.run(&mut job, &op).await?
            }
            BatchRequest::UploadCreatives { files } => {
                let op = UploadCreativesOp::new(coordinator.clone(), files);
                let results = executor.run(&mut job, &op).await?;
                item_failures = summarize_uploads(&op.reports().await);
                results
            }
        };

        let summary = summarize(&results).with_item_failures(item_failures);
        if summary.failed > 0 || !summary.item_failures.is_empty() {
            warn!("[BATCH] Job {} {}", job.short_id(), summary.headline());
            for line in self.error_preview(&summary) {
                warn!("[BATCH]   {}", line);
            }
        } else {
            info!("[BATCH] Job {} {}", job.short_id(), summary.headline());
        }

        if let Some(listener) = &self.on_batch_complete {
            listener(&summary);
        }
        Ok(summary)
    }
}
