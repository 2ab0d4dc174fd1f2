//! Batch job model: kinds, targets, per-target results and their states.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Kinds and Targets
// ─────────────────────────────────────────────────────────────────────────────

/// The one operation a batch applies to every target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchKind {
    DuplicateCampaign,
    DuplicateAdSet,
    CreateAdSetMulti,
    CreateAdMulti,
    UploadCreatives,
}

impl BatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchKind::DuplicateCampaign => "DUPLICATE_CAMPAIGN",
            BatchKind::DuplicateAdSet => "DUPLICATE_AD_SET",
            BatchKind::CreateAdSetMulti => "CREATE_AD_SET_MULTI",
            BatchKind::CreateAdMulti => "CREATE_AD_MULTI",
            BatchKind::UploadCreatives => "UPLOAD_CREATIVES",
        }
    }

    /// Kinds whose targets must all live in one ad account.
    pub fn requires_single_account(&self) -> bool {
        matches!(self, BatchKind::CreateAdSetMulti | BatchKind::CreateAdMulti)
    }
}

/// One entity a batch operation is applied to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDescriptor {
    pub account_id: String,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub ad_set_id: Option<String>,
    /// Display name shown in progress and summaries.
    #[serde(default)]
    pub label: Option<String>,
}

impl TargetDescriptor {
    pub fn account(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            campaign_id: None,
            ad_set_id: None,
            label: None,
        }
    }

    pub fn campaign(account_id: impl Into<String>, campaign_id: impl Into<String>) -> Self {
        Self {
            campaign_id: Some(campaign_id.into()),
            ..Self::account(account_id)
        }
    }

    pub fn ad_set(
        account_id: impl Into<String>,
        campaign_id: Option<String>,
        ad_set_id: impl Into<String>,
    ) -> Self {
        Self {
            campaign_id,
            ad_set_id: Some(ad_set_id.into()),
            ..Self::account(account_id)
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The most specific id: ad set, else campaign, else account.
    pub fn target_id(&self) -> &str {
        self.ad_set_id
            .as_deref()
            .or(self.campaign_id.as_deref())
            .unwrap_or(&self.account_id)
    }

    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or_else(|| self.target_id())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// States
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Created,
    Running,
    Completed,
    PartiallyCompleted,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "CREATED",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::PartiallyCompleted => "PARTIALLY_COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    /// Final status for a finished run. An empty run counts as completed.
    pub fn from_counts(succeeded: usize, failed: usize) -> Self {
        if failed == 0 {
            JobStatus::Completed
        } else if succeeded == 0 {
            JobStatus::Failed
        } else {
            JobStatus::PartiallyCompleted
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::PartiallyCompleted | JobStatus::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl TargetStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TargetStatus::Success | TargetStatus::Failed)
    }

    /// Whether moving from `self` to `next` keeps status monotonic.
    ///
    /// A pending target may fail without being processed (cancellation).
    pub fn can_transition_to(&self, next: TargetStatus) -> bool {
        matches!(
            (self, next),
            (TargetStatus::Pending, TargetStatus::Processing)
                | (TargetStatus::Pending, TargetStatus::Failed)
                | (TargetStatus::Processing, TargetStatus::Success)
                | (TargetStatus::Processing, TargetStatus::Failed)
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Results
// ─────────────────────────────────────────────────────────────────────────────

/// User-facing error recorded against a failed target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetError {
    pub message: String,
    pub status: Option<u16>,
}

impl From<&AppError> for TargetError {
    fn from(err: &AppError) -> Self {
        Self {
            message: err.user_message(),
            status: err.http_status(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetResult {
    pub target_id: String,
    pub label: Option<String>,
    pub status: TargetStatus,
    pub remote_entity_id: Option<String>,
    pub error: Option<TargetError>,
    /// Child entities are still being copied remotely.
    pub deferred_children: bool,
}

impl TargetResult {
    pub fn pending(target: &TargetDescriptor) -> Self {
        Self {
            target_id: target.target_id().to_string(),
            label: target.label.clone(),
            status: TargetStatus::Pending,
            remote_entity_id: None,
            error: None,
            deferred_children: false,
        }
    }

    /// Applies a status change, rejecting regressions.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if the target already finished or the
    /// transition would move backwards.
    pub fn transition(&mut self, next: TargetStatus) -> Result<(), AppError> {
        if self.status.is_terminal() {
            return Err(AppError::Internal(format!(
                "Target {} already finished as {:?}",
                self.target_id, self.status
            )));
        }
        if !self.status.can_transition_to(next) {
            return Err(AppError::Internal(format!(
                "Illegal target transition {:?} -> {:?} for {}",
                self.status, next, self.target_id
            )));
        }
        self.status = next;
        Ok(())
    }

    pub fn succeed(&mut self, entity_id: String, deferred_children: bool) -> Result<(), AppError> {
        self.transition(TargetStatus::Success)?;
        self.remote_entity_id = Some(entity_id);
        self.deferred_children = deferred_children;
        Ok(())
    }

    pub fn fail(&mut self, error: TargetError) -> Result<(), AppError> {
        self.transition(TargetStatus::Failed)?;
        self.error = Some(error);
        Ok(())
    }

    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.target_id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Job
// ─────────────────────────────────────────────────────────────────────────────

/// One logical bulk operation over an ordered set of targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJob {
    pub id: Uuid,
    pub kind: BatchKind,
    pub targets: Vec<TargetDescriptor>,
    pub status: JobStatus,
    pub created_at: u64,
}

impl BatchJob {
    /// # Errors
    ///
    /// Returns `AppError::Precondition` when `targets` is empty.
    pub fn new(kind: BatchKind, targets: Vec<TargetDescriptor>) -> Result<Self, AppError> {
        if targets.is_empty() {
            return Err(AppError::Precondition(vec![
                "Select at least one target".to_string()
            ]));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            kind,
            targets,
            status: JobStatus::Created,
            created_at: current_timestamp(),
        })
    }

    /// Short id for log lines.
    pub fn short_id(&self) -> String {
        self.id.simple().to_string()[..8].to_string()
    }
}

/// Returns current unix timestamp in seconds.
pub(crate) fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
