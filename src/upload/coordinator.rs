//! Upload session coordination.
//!
//! Allocates a progress session when the batch needs one, opens the progress
//! stream before the first upload request, dispatches the image, video and
//! remote-file groups concurrently, and folds every group's response into one
//! outcome per file.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::batch::job::current_timestamp;
use crate::config::OrchestratorConfig;
use crate::error::AppError;
use crate::logging::redact_id;
use crate::progress::{
    CompletionListener, FileProgressListener, ProgressConsumer, ProgressSource,
    UploadProgressReport,
};
use crate::remote::types::{CreativeAsset, FileUploadResult};
use crate::remote::AdsGateway;
use crate::upload::files::{CreativeFile, FileGroups, LocalFile, MediaKind, RemoteFile};

/// Message for a file the gateway response did not mention.
const MISSING_RESULT_MESSAGE: &str = "No upload result was reported for this file";

/// Message for videos and remote files dispatched without a session.
const NO_SESSION_MESSAGE: &str = "Videos and remote files need an upload session";

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// A server-issued progress session shared by every group of one upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadSession {
    pub session_id: String,
    pub total_items: usize,
    pub created_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadGroup {
    Images,
    Videos,
    Remote,
}

/// Final outcome for one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutcome {
    pub file: String,
    pub group: UploadGroup,
    pub kind: Option<MediaKind>,
    /// Image hash or video id on success.
    pub asset_id: Option<String>,
    pub error: Option<String>,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.asset_id.is_some()
    }

    /// The uploaded asset, in the form ad creation expects.
    pub fn creative_asset(&self) -> Option<CreativeAsset> {
        if !self.is_success() {
            return None;
        }
        let id = self.asset_id.clone()?;
        match self.kind? {
            MediaKind::Image => Some(CreativeAsset::Image { image_hash: id }),
            MediaKind::Video => Some(CreativeAsset::Video { video_id: id }),
        }
    }
}

/// Everything one upload produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadReport {
    pub account_id: String,
    pub session: Option<UploadSession>,
    /// One entry per input file, grouped images, videos, remote.
    pub files: Vec<FileOutcome>,
    /// `None` when no progress stream was consumed.
    pub progress: Option<UploadProgressReport>,
}

impl UploadReport {
    pub fn succeeded(&self) -> usize {
        self.files.iter().filter(|f| f.is_success()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files.iter().filter(|f| !f.is_success())
    }

    pub fn has_errors(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn assets(&self) -> Vec<CreativeAsset> {
        self.files.iter().filter_map(FileOutcome::creative_asset).collect()
    }
}

/// Response of one group request.
struct GroupResult {
    group: UploadGroup,
    /// Name and kind of each file sent, in request order.
    files: Vec<(String, Option<MediaKind>)>,
    result: Result<Vec<FileUploadResult>, AppError>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Coordinator
// ─────────────────────────────────────────────────────────────────────────────

pub struct UploadCoordinator<G: AdsGateway, P: ProgressSource> {
    gateway: Arc<G>,
    progress: Arc<P>,
    settle_delay: Duration,
    linger: Duration,
    drain_timeout: Duration,
    on_file: Option<FileProgressListener>,
    on_complete: Option<CompletionListener>,
}

impl<G: AdsGateway + 'static, P: ProgressSource + 'static> UploadCoordinator<G, P> {
    pub fn new(gateway: Arc<G>, progress: Arc<P>, config: &OrchestratorConfig) -> Self {
        Self {
            gateway,
            progress,
            settle_delay: config.channel_settle_delay,
            linger: config.progress_linger,
            drain_timeout: config.progress_drain_timeout,
            on_file: None,
            on_complete: None,
        }
    }

    pub fn with_listeners(
        mut self,
        on_file: Option<FileProgressListener>,
        on_complete: Option<CompletionListener>,
    ) -> Self {
        self.on_file = on_file;
        self.on_complete = on_complete;
        self
    }

    /// Allocates a progress session for `total_items` files.
    pub async fn begin_session(&self, total_items: usize) -> Result<UploadSession, AppError> {
        let session_id = self.gateway.create_upload_session(total_items).await?;
        info!(
            "[UPLOAD] Session {} created for {} items",
            redact_id(&session_id),
            total_items
        );
        Ok(UploadSession {
            session_id,
            total_items,
            created_at: current_timestamp(),
        })
    }

    /// Uploads `files` into `account_id`.
    ///
    /// Group failures are reported per file and never abort the other groups.
    ///
    /// # Errors
    ///
    /// - `AppError::Precondition` - a local file is neither image nor video
    /// - any gateway error from allocating the session
    pub async fn upload(
        &self,
        files: Vec<CreativeFile>,
        account_id: &str,
    ) -> Result<UploadReport, AppError> {
        let groups = FileGroups::partition(files)?;
        let mut report = UploadReport {
            account_id: account_id.to_string(),
            ..UploadReport::default()
        };
        if groups.is_empty() {
            return Ok(report);
        }

        info!(
            "[UPLOAD] Uploading {} images, {} videos, {} remote files to {}",
            groups.images.len(),
            groups.videos.len(),
            groups.remote.len(),
            redact_id(account_id)
        );

        // Pure-image batches report no progress, so they skip the session
        let mut consumer_task = None;
        if groups.needs_session() {
            let session = self.begin_session(groups.total_items()).await?;

            match self.progress.subscribe(&session.session_id).await {
                Ok(subscription) => {
                    let close_handle = subscription.close_handle();
                    let consumer = ProgressConsumer::new(self.linger)
                        .with_file_listener(self.on_file.clone())
                        .with_completion_listener(self.on_complete.clone());
                    let handle = tokio::spawn(consumer.run(subscription));
                    consumer_task = Some((handle, close_handle));
                }
                Err(e) => {
                    warn!("[UPLOAD] Progress stream unavailable, continuing: {}", e);
                }
            }

            tokio::time::sleep(self.settle_delay).await;
            report.session = Some(session);
        }

        report.files = self
            .dispatch(groups, account_id, report.session.as_ref())
            .await;

        if let Some((mut handle, close_handle)) = consumer_task {
            let progress = match tokio::time::timeout(self.drain_timeout, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("[UPLOAD] No session-complete within drain timeout, closing stream");
                    close_handle.cancel();
                    handle.await
                }
            };
            report.progress = Some(progress.unwrap_or_else(|e| {
                warn!("[UPLOAD] Progress consumer task failed: {}", e);
                UploadProgressReport {
                    degraded: true,
                    ..UploadProgressReport::default()
                }
            }));
        }

        info!(
            "[UPLOAD] Finished: {} of {} files uploaded",
            report.succeeded(),
            report.files.len()
        );
        Ok(report)
    }

    /// Issues one request per non-empty group, all concurrently, and returns
    /// one outcome per file in group order.
    ///
    /// Videos and remote files need `session`; without one they come back as
    /// failed outcomes and no request is sent for them.
    pub async fn dispatch(
        &self,
        groups: FileGroups,
        account_id: &str,
        session: Option<&UploadSession>,
    ) -> Vec<FileOutcome> {
        let mut join_set: JoinSet<GroupResult> = JoinSet::new();
        let mut sent: Vec<(UploadGroup, Vec<(String, Option<MediaKind>)>)> = Vec::new();
        let mut settled: Vec<GroupResult> = Vec::with_capacity(3);
        let FileGroups {
            images,
            videos,
            remote,
        } = groups;

        if !images.is_empty() {
            let gateway = self.gateway.clone();
            let account = account_id.to_string();
            let files = local_names(&images, MediaKind::Image);
            sent.push((UploadGroup::Images, files.clone()));
            join_set.spawn(async move {
                let result = gateway.upload_images(&images, &account).await;
                GroupResult {
                    group: UploadGroup::Images,
                    files,
                    result,
                }
            });
        }

        match session.map(|s| s.session_id.clone()) {
            Some(session_id) => {
                if !videos.is_empty() {
                    let gateway = self.gateway.clone();
                    let account = account_id.to_string();
                    let session = session_id.clone();
                    let files = local_names(&videos, MediaKind::Video);
                    sent.push((UploadGroup::Videos, files.clone()));
                    join_set.spawn(async move {
                        let result = gateway.upload_videos(&videos, &account, &session).await;
                        GroupResult {
                            group: UploadGroup::Videos,
                            files,
                            result,
                        }
                    });
                }

                if !remote.is_empty() {
                    let gateway = self.gateway.clone();
                    let account = account_id.to_string();
                    let files = remote_names(&remote);
                    sent.push((UploadGroup::Remote, files.clone()));
                    join_set.spawn(async move {
                        let result = gateway
                            .fetch_and_upload_remote_files(&remote, &account, &session_id)
                            .await;
                        GroupResult {
                            group: UploadGroup::Remote,
                            files,
                            result,
                        }
                    });
                }
            }
            None => {
                let skipped = [
                    (UploadGroup::Videos, local_names(&videos, MediaKind::Video)),
                    (UploadGroup::Remote, remote_names(&remote)),
                ];
                for (group, files) in skipped {
                    if files.is_empty() {
                        continue;
                    }
                    warn!("[UPLOAD] {:?} group has no progress session, not sent", group);
                    settled.push(GroupResult {
                        group,
                        files,
                        result: Err(AppError::Precondition(vec![
                            NO_SESSION_MESSAGE.to_string()
                        ])),
                    });
                }
            }
        }

        let mut join_failure: Option<String> = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(group_result) => settled.push(group_result),
                Err(e) => {
                    warn!("[UPLOAD] Group task join error: {:?}", e);
                    join_failure = Some(e.to_string());
                }
            }
        }

        // A group whose task died still owes one outcome per file
        if let Some(reason) = join_failure {
            for (group, files) in sent {
                if settled.iter().any(|g| g.group == group) {
                    continue;
                }
                settled.push(GroupResult {
                    group,
                    files,
                    result: Err(AppError::Internal(format!(
                        "Upload task stopped unexpectedly: {}",
                        reason
                    ))),
                });
            }
        }

        settled.sort_by_key(|g| g.group);
        settled.into_iter().flat_map(outcomes_for_group).collect()
    }
}

fn local_names(files: &[LocalFile], kind: MediaKind) -> Vec<(String, Option<MediaKind>)> {
    files.iter().map(|f| (f.name.clone(), Some(kind))).collect()
}

fn remote_names(files: &[RemoteFile]) -> Vec<(String, Option<MediaKind>)> {
    files.iter().map(|f| (f.name.clone(), f.kind())).collect()
}

/// Pairs each sent file with its entry in the group response.
///
/// Entries are matched by the file name they carry. A file with no entry of
/// its name takes the entry at its own position when that entry is unclaimed
/// and the response has one entry per file. A failed request fails every file
/// in the group.
fn outcomes_for_group(group_result: GroupResult) -> Vec<FileOutcome> {
    let GroupResult {
        group,
        files,
        result,
    } = group_result;

    let results = match result {
        Ok(results) => results,
        Err(e) => {
            let message = e.user_message();
            warn!("[UPLOAD] {:?} group failed: {}", group, message);
            return files
                .into_iter()
                .map(|(file, kind)| FileOutcome {
                    file,
                    group,
                    kind,
                    asset_id: None,
                    error: Some(message.clone()),
                })
                .collect();
        }
    };

    let mut used = vec![false; results.len()];
    let mut matched: Vec<Option<usize>> = files
        .iter()
        .map(|(file, _)| {
            let j = results
                .iter()
                .enumerate()
                .position(|(j, r)| !used[j] && &r.file == file)?;
            used[j] = true;
            Some(j)
        })
        .collect();

    if results.len() == files.len() {
        for (i, slot) in matched.iter_mut().enumerate() {
            if slot.is_none() && !used[i] {
                used[i] = true;
                *slot = Some(i);
            }
        }
    }

    files
        .into_iter()
        .zip(matched)
        .map(|((file, kind), matched)| match matched {
            Some(j) => {
                let r = &results[j];
                let kind = r
                    .media_type
                    .as_deref()
                    .and_then(|t| match t {
                        "image" => Some(MediaKind::Image),
                        "video" => Some(MediaKind::Video),
                        _ => None,
                    })
                    .or(kind);
                let error = r.error_message().or_else(|| {
                    r.asset_id()
                        .is_none()
                        .then(|| MISSING_RESULT_MESSAGE.to_string())
                });
                FileOutcome {
                    file,
                    group,
                    kind,
                    asset_id: if error.is_none() { r.asset_id() } else { None },
                    error,
                }
            }
            None => FileOutcome {
                file,
                group,
                kind,
                asset_id: None,
                error: Some(MISSING_RESULT_MESSAGE.to_string()),
            },
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
