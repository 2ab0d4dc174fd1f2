//! Concrete per-target operations for each batch kind.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::info;

use crate::batch::executor::{TargetOperation, TargetOutcome};
use crate::batch::job::TargetDescriptor;
use crate::error::AppError;
use crate::logging::redact_id;
use crate::progress::ProgressSource;
use crate::remote::error_payload::RemoteErrorPayload;
use crate::remote::types::{
    CreateAdCreativeMultipleRequest, CreateAdSetMultipleRequest, CreativeAsset,
    DuplicateAdSetRequest, DuplicateCampaignRequest, SettledStatus, StatusOption,
};
use crate::remote::{AdsGateway, BoxFuture};
use crate::upload::coordinator::{UploadCoordinator, UploadReport};
use crate::upload::files::CreativeFile;

/// Options shared by both duplicate operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateOptions {
    /// Name for every copy. Defaults to "<source> (Copy)".
    #[serde(default)]
    pub new_name: Option<String>,
    #[serde(default)]
    pub deep_copy: bool,
    #[serde(default)]
    pub status_option: StatusOption,
}

impl DuplicateOptions {
    fn name_for(&self, target: &TargetDescriptor) -> String {
        match &self.new_name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!("{} (Copy)", target.display_name()),
        }
    }
}

/// Fails the target when the id its operation needs is missing.
fn require<'a>(
    value: Option<&'a str>,
    what: &str,
    target: &TargetDescriptor,
) -> Result<&'a str, AppError> {
    value.ok_or_else(|| {
        AppError::Precondition(vec![format!("{} has no {}", target.display_name(), what)])
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Duplication
// ─────────────────────────────────────────────────────────────────────────────

pub struct DuplicateCampaignOp<G: AdsGateway> {
    gateway: Arc<G>,
    options: DuplicateOptions,
}

impl<G: AdsGateway> DuplicateCampaignOp<G> {
    pub fn new(gateway: Arc<G>, options: DuplicateOptions) -> Self {
        Self { gateway, options }
    }
}

impl<G: AdsGateway> TargetOperation for DuplicateCampaignOp<G> {
    fn execute<'a>(&'a self, target: &'a TargetDescriptor) -> BoxFuture<'a, TargetOutcome> {
        Box::pin(async move {
            let campaign_id = require(target.campaign_id.as_deref(), "campaign", target)?;
            let copy = self
                .gateway
                .duplicate_campaign(DuplicateCampaignRequest {
                    campaign_id: campaign_id.to_string(),
                    new_name: self.options.name_for(target),
                    deep_copy: self.options.deep_copy,
                    status_option: self.options.status_option,
                    account_id: target.account_id.clone(),
                })
                .await?;

            if copy.children_pending() {
                info!(
                    "[BATCH] Campaign {} copied as {}, children still being copied",
                    redact_id(campaign_id),
                    redact_id(&copy.id)
                );
                Ok(TargetOutcome::deferred(copy.id))
            } else {
                Ok(TargetOutcome::created(copy.id))
            }
        })
    }
}

pub struct DuplicateAdSetOp<G: AdsGateway> {
    gateway: Arc<G>,
    options: DuplicateOptions,
    /// Campaign to copy into; the source campaign when `None`.
    destination_campaign_id: Option<String>,
}

impl<G: AdsGateway> DuplicateAdSetOp<G> {
    pub fn new(
        gateway: Arc<G>,
        options: DuplicateOptions,
        destination_campaign_id: Option<String>,
    ) -> Self {
        Self {
            gateway,
            options,
            destination_campaign_id,
        }
    }
}

impl<G: AdsGateway> TargetOperation for DuplicateAdSetOp<G> {
    fn execute<'a>(&'a self, target: &'a TargetDescriptor) -> BoxFuture<'a, TargetOutcome> {
        Box::pin(async move {
            let ad_set_id = require(target.ad_set_id.as_deref(), "ad set", target)?;
            let copy = self
                .gateway
                .duplicate_ad_set(DuplicateAdSetRequest {
                    ad_set_id: ad_set_id.to_string(),
                    new_name: self.options.name_for(target),
                    deep_copy: self.options.deep_copy,
                    status_option: self.options.status_option,
                    campaign_id: self
                        .destination_campaign_id
                        .clone()
                        .or_else(|| target.campaign_id.clone()),
                    account_id: target.account_id.clone(),
                })
                .await?;
            Ok(TargetOutcome::created(copy.id))
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Creation
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the same ad set under each target campaign, one call per campaign.
pub struct CreateAdSetOp<G: AdsGateway> {
    gateway: Arc<G>,
    fields: Map<String, Value>,
}

impl<G: AdsGateway> CreateAdSetOp<G> {
    pub fn new(gateway: Arc<G>, fields: Map<String, Value>) -> Self {
        Self { gateway, fields }
    }
}

impl<G: AdsGateway> TargetOperation for CreateAdSetOp<G> {
    fn execute<'a>(&'a self, target: &'a TargetDescriptor) -> BoxFuture<'a, TargetOutcome> {
        Box::pin(async move {
            let campaign_id = require(target.campaign_id.as_deref(), "campaign", target)?;
            let response = self
                .gateway
                .create_ad_set_multiple(CreateAdSetMultipleRequest {
                    campaign_ids: vec![campaign_id.to_string()],
                    account_id: target.account_id.clone(),
                    fields: self.fields.clone(),
                })
                .await?;

            if let Some(created) = response.created_adsets.into_iter().next() {
                return Ok(TargetOutcome::created(created.id));
            }

            let payload = response
                .failed_adsets
                .into_iter()
                .next()
                .and_then(|f| f.error)
                .map(|e| RemoteErrorPayload::from_value(&e))
                .unwrap_or_default();
            Err(payload.into_app_error())
        })
    }
}

/// Creates one ad per creative asset inside each target ad set.
pub struct CreateAdOp<G: AdsGateway> {
    gateway: Arc<G>,
    ad_copy: Map<String, Value>,
    assets: Vec<CreativeAsset>,
}

impl<G: AdsGateway> CreateAdOp<G> {
    pub fn new(gateway: Arc<G>, ad_copy: Map<String, Value>, assets: Vec<CreativeAsset>) -> Self {
        Self {
            gateway,
            ad_copy,
            assets,
        }
    }
}

impl<G: AdsGateway> TargetOperation for CreateAdOp<G> {
    fn execute<'a>(&'a self, target: &'a TargetDescriptor) -> BoxFuture<'a, TargetOutcome> {
        Box::pin(async move {
            let ad_set_id = require(target.ad_set_id.as_deref(), "ad set", target)?;
            let settled = self
                .gateway
                .create_ad_creative_multiple(CreateAdCreativeMultipleRequest {
                    adset_id: ad_set_id.to_string(),
                    account_id: target.account_id.clone(),
                    ad_copy: self.ad_copy.clone(),
                    assets: self.assets.clone(),
                })
                .await?;

            if settled.is_empty() {
                return Err(AppError::RemoteApi {
                    status: None,
                    message: "No ads were created".to_string(),
                });
            }

            let rejected: Vec<_> = settled
                .iter()
                .filter(|s| s.status == SettledStatus::Rejected)
                .collect();
            if let Some(first) = rejected.first() {
                let reason = first
                    .reason
                    .as_ref()
                    .map(RemoteErrorPayload::from_value)
                    .unwrap_or_default()
                    .extract_message();
                return Err(AppError::RemoteApi {
                    status: None,
                    message: format!(
                        "{} of {} ads failed: {}",
                        rejected.len(),
                        settled.len(),
                        reason
                    ),
                });
            }

            let entity_id = settled
                .iter()
                .filter_map(|s| s.value.as_ref())
                .filter_map(|v| v.get("id"))
                .find_map(|id| match id {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .unwrap_or_else(|| ad_set_id.to_string());
            Ok(TargetOutcome::created(entity_id))
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Upload
// ─────────────────────────────────────────────────────────────────────────────

/// Uploads the same files into each target account, one session per account.
///
/// Every report is kept so per-file failures reach the summary.
pub struct UploadCreativesOp<G: AdsGateway, P: ProgressSource> {
    coordinator: Arc<UploadCoordinator<G, P>>,
    files: Vec<CreativeFile>,
    reports: Arc<Mutex<Vec<UploadReport>>>,
}

impl<G: AdsGateway + 'static, P: ProgressSource + 'static> UploadCreativesOp<G, P> {
    pub fn new(coordinator: Arc<UploadCoordinator<G, P>>, files: Vec<CreativeFile>) -> Self {
        Self {
            coordinator,
            files,
            reports: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Reports collected so far, one per executed account.
    pub async fn reports(&self) -> Vec<UploadReport> {
        self.reports.lock().await.clone()
    }
}

impl<G: AdsGateway + 'static, P: ProgressSource + 'static> TargetOperation
    for UploadCreativesOp<G, P>
{
    fn execute<'a>(&'a self, target: &'a TargetDescriptor) -> BoxFuture<'a, TargetOutcome> {
        Box::pin(async move {
            let report = self
                .coordinator
                .upload(self.files.clone(), &target.account_id)
                .await?;

            let total = report.files.len();
            let failed = report.failures().count();
            let asset_ids: Vec<String> = report
                .files
                .iter()
                .filter_map(|f| f.asset_id.clone())
                .collect();
            self.reports.lock().await.push(report);

            if failed > 0 {
                return Err(AppError::UploadFailed {
                    file: format!("{} files", total),
                    message: format!("{} of {} files failed to upload", failed, total),
                });
            }
            Ok(TargetOutcome::created(asset_ids.join(",")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::progress::ProgressSubscription;
    use crate::remote::types::{
        CreateAdSetMultipleResponse, CreatedAdSet, DuplicatedAdSet, DuplicatedCampaign,
        FailedAdSet, FileUploadResult, SettledAd, UploadStatus,
    };
    use crate::upload::files::{LocalFile, RemoteFile};
    use serde_json::json;
    use std::path::PathBuf;
    use std::sync::Mutex as StdMutex;

    /// Gateway fake that records requests and replays canned responses.
    #[derive(Default)]
    struct FakeGateway {
        campaign_requests: StdMutex<Vec<DuplicateCampaignRequest>>,
        ad_set_requests: StdMutex<Vec<DuplicateAdSetRequest>>,
        create_ad_set_requests: StdMutex<Vec<CreateAdSetMultipleRequest>>,
        campaign_mode: Option<String>,
        ad_set_response: Option<CreateAdSetMultipleResponse>,
        settled: Vec<SettledAd>,
        failing_image: Option<String>,
    }

    impl AdsGateway for FakeGateway {
        fn create_upload_session(&self, _total_items: usize) -> BoxFuture<'_, String> {
            Box::pin(async { Ok("sess".to_string()) })
        }

        fn upload_images<'a>(
            &'a self,
            files: &'a [LocalFile],
            _account_id: &'a str,
        ) -> BoxFuture<'a, Vec<FileUploadResult>> {
            let results = files
                .iter()
                .map(|f| {
                    let failed = self.failing_image.as_deref() == Some(f.name.as_str());
                    FileUploadResult {
                        file: f.name.clone(),
                        media_type: None,
                        status: if failed {
                            UploadStatus::Failed
                        } else {
                            UploadStatus::Success
                        },
                        image_hash: (!failed).then(|| format!("hash-{}", f.name)),
                        data: None,
                        error: failed.then(|| json!("Image too small")),
                    }
                })
                .collect();
            Box::pin(async move { Ok(results) })
        }

        fn upload_videos<'a>(
            &'a self,
            _files: &'a [LocalFile],
            _account_id: &'a str,
            _session_id: &'a str,
        ) -> BoxFuture<'a, Vec<FileUploadResult>> {
            Box::pin(async { Ok(vec![]) })
        }

        fn fetch_and_upload_remote_files<'a>(
            &'a self,
            _files: &'a [RemoteFile],
            _account_id: &'a str,
            _session_id: &'a str,
        ) -> BoxFuture<'a, Vec<FileUploadResult>> {
            Box::pin(async { Ok(vec![]) })
        }

        fn duplicate_campaign(
            &self,
            req: DuplicateCampaignRequest,
        ) -> BoxFuture<'_, DuplicatedCampaign> {
            let id = format!("{}-copy", req.campaign_id);
            self.campaign_requests.lock().unwrap().push(req);
            let mode = self.campaign_mode.clone();
            Box::pin(async move {
                Ok(DuplicatedCampaign {
                    id,
                    objective: None,
                    mode,
                    structure: None,
                })
            })
        }

        fn duplicate_ad_set(&self, req: DuplicateAdSetRequest) -> BoxFuture<'_, DuplicatedAdSet> {
            let id = format!("{}-copy", req.ad_set_id);
            self.ad_set_requests.lock().unwrap().push(req);
            Box::pin(async move { Ok(DuplicatedAdSet { id }) })
        }

        fn create_ad_set_multiple(
            &self,
            req: CreateAdSetMultipleRequest,
        ) -> BoxFuture<'_, CreateAdSetMultipleResponse> {
            self.create_ad_set_requests.lock().unwrap().push(req);
            let response = self.ad_set_response.clone();
            Box::pin(async move {
                response.ok_or_else(|| AppError::Internal("no canned response".into()))
            })
        }

        fn create_ad_creative_multiple(
            &self,
            _req: CreateAdCreativeMultipleRequest,
        ) -> BoxFuture<'_, Vec<SettledAd>> {
            let settled = self.settled.clone();
            Box::pin(async move { Ok(settled) })
        }
    }

    struct NoProgress;

    impl ProgressSource for NoProgress {
        fn subscribe<'a>(&'a self, _session_id: &'a str) -> BoxFuture<'a, ProgressSubscription> {
            Box::pin(async { Err(AppError::ChannelFailed("unavailable".into())) })
        }
    }

    fn settled(status: SettledStatus, value: Option<Value>, reason: Option<Value>) -> SettledAd {
        SettledAd {
            status,
            value,
            reason,
        }
    }

    #[tokio::test]
    async fn duplicate_campaign_defaults_name_and_defers() {
        let gateway = Arc::new(FakeGateway {
            campaign_mode: Some("async".into()),
            ..FakeGateway::default()
        });
        let op = DuplicateCampaignOp::new(gateway.clone(), DuplicateOptions::default());
        let target = TargetDescriptor::campaign("act_1", "c1").with_label("Spring Sale");

        let outcome = op.execute(&target).await.unwrap();
        assert_eq!(outcome, TargetOutcome::deferred("c1-copy"));

        let requests = gateway.campaign_requests.lock().unwrap();
        assert_eq!(requests[0].new_name, "Spring Sale (Copy)");
        assert_eq!(requests[0].status_option, StatusOption::Paused);
        assert_eq!(requests[0].account_id, "act_1");
    }

    #[tokio::test]
    async fn duplicate_campaign_without_campaign_fails() {
        let op = DuplicateCampaignOp::new(Arc::new(FakeGateway::default()), DuplicateOptions::default());
        let err = op.execute(&TargetDescriptor::account("act_1")).await.unwrap_err();
        assert!(matches!(err, AppError::Precondition(_)));
    }

    #[tokio::test]
    async fn duplicate_ad_set_prefers_destination_campaign() {
        let gateway = Arc::new(FakeGateway::default());
        let op = DuplicateAdSetOp::new(
            gateway.clone(),
            DuplicateOptions {
                new_name: Some("Retargeting v2".into()),
                deep_copy: true,
                status_option: StatusOption::Active,
            },
            Some("c9".into()),
        );
        let target = TargetDescriptor::ad_set("act_1", Some("c1".into()), "as1");

        let outcome = op.execute(&target).await.unwrap();
        assert_eq!(outcome, TargetOutcome::created("as1-copy"));

        let requests = gateway.ad_set_requests.lock().unwrap();
        assert_eq!(requests[0].campaign_id.as_deref(), Some("c9"));
        assert_eq!(requests[0].new_name, "Retargeting v2");
        assert!(requests[0].deep_copy);
    }

    #[tokio::test]
    async fn create_ad_set_success_and_failure() {
        let created = Arc::new(FakeGateway {
            ad_set_response: Some(CreateAdSetMultipleResponse {
                total_created: 1,
                total_failed: 0,
                created_adsets: vec![CreatedAdSet {
                    campaign_id: "c1".into(),
                    id: "as-new".into(),
                }],
                failed_adsets: vec![],
            }),
            ..FakeGateway::default()
        });
        let mut fields = Map::new();
        fields.insert("name".into(), json!("Prospecting"));
        let op = CreateAdSetOp::new(created.clone(), fields);
        let outcome = op
            .execute(&TargetDescriptor::campaign("act_1", "c1"))
            .await
            .unwrap();
        assert_eq!(outcome.remote_entity_id, "as-new");
        assert_eq!(
            created.create_ad_set_requests.lock().unwrap()[0].campaign_ids,
            vec!["c1".to_string()]
        );

        let rejected = Arc::new(FakeGateway {
            ad_set_response: Some(CreateAdSetMultipleResponse {
                total_created: 0,
                total_failed: 1,
                created_adsets: vec![],
                failed_adsets: vec![FailedAdSet {
                    campaign_id: "c1".into(),
                    error: Some(json!({ "error_user_msg": "Budget below minimum" })),
                }],
            }),
            ..FakeGateway::default()
        });
        let err = CreateAdSetOp::new(rejected, Map::new())
            .execute(&TargetDescriptor::campaign("act_1", "c1"))
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Budget below minimum");
    }

    #[tokio::test]
    async fn create_ad_partial_rejection_fails_target() {
        let gateway = Arc::new(FakeGateway {
            settled: vec![
                settled(SettledStatus::Fulfilled, Some(json!({ "id": "ad-1" })), None),
                settled(
                    SettledStatus::Rejected,
                    None,
                    Some(json!({ "error": "Invalid link" })),
                ),
            ],
            ..FakeGateway::default()
        });
        let op = CreateAdOp::new(gateway, Map::new(), vec![]);
        let err = op
            .execute(&TargetDescriptor::ad_set("act_1", None, "as1"))
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "1 of 2 ads failed: Invalid link");
    }

    #[tokio::test]
    async fn create_ad_all_fulfilled_uses_first_ad_id() {
        let gateway = Arc::new(FakeGateway {
            settled: vec![
                settled(SettledStatus::Fulfilled, Some(json!({ "id": 42 })), None),
                settled(SettledStatus::Fulfilled, Some(json!({ "id": 43 })), None),
            ],
            ..FakeGateway::default()
        });
        let outcome = CreateAdOp::new(gateway, Map::new(), vec![])
            .execute(&TargetDescriptor::ad_set("act_1", None, "as1"))
            .await
            .unwrap();
        assert_eq!(outcome.remote_entity_id, "42");
    }

    #[tokio::test]
    async fn upload_op_keeps_reports_and_fails_on_file_errors() {
        let gateway = Arc::new(FakeGateway {
            failing_image: Some("b.png".into()),
            ..FakeGateway::default()
        });
        let coordinator = Arc::new(UploadCoordinator::new(
            gateway,
            Arc::new(NoProgress),
            &OrchestratorConfig::default(),
        ));
        let files = ["a.png", "b.png"]
            .iter()
            .map(|name| {
                CreativeFile::Local(LocalFile {
                    path: PathBuf::from(name),
                    name: name.to_string(),
                    content_type: "image/png".into(),
                    size: 1,
                })
            })
            .collect();
        let op = UploadCreativesOp::new(coordinator, files);

        let err = op
            .execute(&TargetDescriptor::account("act_1"))
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "1 of 2 files failed to upload");

        let reports = op.reports().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(
            reports[0].failures().next().unwrap().error.as_deref(),
            Some("Image too small")
        );
    }
}
