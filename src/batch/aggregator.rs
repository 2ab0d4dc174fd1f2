//! Reduction of per-target and per-file outcomes into a batch summary.

use serde::Serialize;

use crate::batch::job::{JobStatus, TargetResult, TargetStatus};
use crate::upload::coordinator::UploadReport;

/// Shown when any duplicated entity is still receiving its children.
pub const DEFERRED_CHILDREN_NOTICE: &str =
    "Some copies are still being populated by the ad platform. Check back in a few minutes to see all of their ad sets and ads.";

const UNKNOWN_ERROR: &str = "Unknown error";

/// One failed target, as listed in the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedTarget {
    pub target_id: String,
    pub label: Option<String>,
    pub message: String,
    pub status: Option<u16>,
}

impl FailedTarget {
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.target_id)
    }
}

/// One file that failed to upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFailure {
    pub account_id: String,
    pub file: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub status: JobStatus,
    /// Failed targets in execution order.
    pub failed_details: Vec<FailedTarget>,
    /// Per-file upload failures.
    pub item_failures: Vec<ItemFailure>,
    pub notice: Option<String>,
}

impl BatchSummary {
    pub fn is_partial(&self) -> bool {
        self.status == JobStatus::PartiallyCompleted
    }

    /// One-line outcome, worded differently for partial and total failure.
    pub fn headline(&self) -> String {
        match self.status {
            JobStatus::PartiallyCompleted => format!(
                "Partially completed. Succeeded: {}, Failed: {}",
                self.succeeded, self.failed
            ),
            JobStatus::Failed => format!(
                "Batch failed. Succeeded: 0, Failed: {}",
                self.failed
            ),
            _ => format!("Succeeded: {}, Failed: 0", self.succeeded),
        }
    }

    /// The first `limit` failure messages, followed by a count of the rest.
    ///
    /// Target failures come first, then file failures.
    pub fn error_preview(&self, limit: usize) -> Vec<String> {
        let all: Vec<String> = self
            .failed_details
            .iter()
            .map(|f| format!("{}: {}", f.display_name(), f.message))
            .chain(
                self.item_failures
                    .iter()
                    .map(|f| format!("{}: {}", f.file, f.message)),
            )
            .collect();

        let remaining = all.len().saturating_sub(limit);
        let mut preview: Vec<String> = all.into_iter().take(limit).collect();
        if remaining > 0 {
            preview.push(format!("...and {} more", remaining));
        }
        preview
    }

    pub fn with_item_failures(mut self, item_failures: Vec<ItemFailure>) -> Self {
        self.item_failures = item_failures;
        self
    }
}

/// Reduces target results to a summary. Pure and deterministic.
pub fn summarize(results: &[TargetResult]) -> BatchSummary {
    let succeeded = results
        .iter()
        .filter(|r| r.status == TargetStatus::Success)
        .count();

    let failed_details: Vec<FailedTarget> = results
        .iter()
        .filter(|r| r.status != TargetStatus::Success)
        .map(|r| {
            let (message, status) = match &r.error {
                Some(e) => (e.message.clone(), e.status),
                None => (UNKNOWN_ERROR.to_string(), None),
            };
            FailedTarget {
                target_id: r.target_id.clone(),
                label: r.label.clone(),
                message,
                status,
            }
        })
        .collect();

    let failed = failed_details.len();
    let notice = results
        .iter()
        .any(|r| r.status == TargetStatus::Success && r.deferred_children)
        .then(|| DEFERRED_CHILDREN_NOTICE.to_string());

    BatchSummary {
        total: results.len(),
        succeeded,
        failed,
        status: JobStatus::from_counts(succeeded, failed),
        failed_details,
        item_failures: Vec::new(),
        notice,
    }
}

/// Collects every failed file across upload reports.
pub fn summarize_uploads(reports: &[UploadReport]) -> Vec<ItemFailure> {
    reports
        .iter()
        .flat_map(|report| {
            report.failures().map(move |f| ItemFailure {
                account_id: report.account_id.clone(),
                file: f.file.clone(),
                message: f.error.clone().unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::job::{TargetDescriptor, TargetError};
    use crate::upload::coordinator::{FileOutcome, UploadGroup};

    fn success(id: &str, deferred: bool) -> TargetResult {
        let mut r = TargetResult::pending(&TargetDescriptor::campaign("act_1", id));
        r.transition(TargetStatus::Processing).unwrap();
        r.succeed(format!("{}-copy", id), deferred).unwrap();
        r
    }

    fn failure(id: &str, message: &str) -> TargetResult {
        let mut r = TargetResult::pending(&TargetDescriptor::campaign("act_1", id));
        r.transition(TargetStatus::Processing).unwrap();
        r.fail(TargetError {
            message: message.to_string(),
            status: Some(400),
        })
        .unwrap();
        r
    }

    #[test]
    fn all_success_is_completed() {
        let summary = summarize(&[success("c1", false), success("c2", false), success("c3", false)]);
        assert_eq!(summary.status, JobStatus::Completed);
        assert_eq!((summary.succeeded, summary.failed), (3, 0));
        assert!(summary.failed_details.is_empty());
        assert_eq!(summary.notice, None);
        assert_eq!(summary.headline(), "Succeeded: 3, Failed: 0");
    }

    #[test]
    fn middle_failure_is_partial() {
        let summary = summarize(&[
            success("c1", false),
            failure("c2", "Budget too low"),
            success("c3", false),
        ]);
        assert_eq!(summary.status, JobStatus::PartiallyCompleted);
        assert!(summary.is_partial());
        assert_eq!(summary.failed_details.len(), 1);
        assert_eq!(summary.failed_details[0].target_id, "c2");
        assert_eq!(summary.failed_details[0].message, "Budget too low");
        assert_eq!(
            summary.headline(),
            "Partially completed. Succeeded: 2, Failed: 1"
        );
    }

    #[test]
    fn all_failed_is_failed() {
        let summary = summarize(&[failure("c1", "x"), failure("c2", "y")]);
        assert_eq!(summary.status, JobStatus::Failed);
        assert_eq!(summary.headline(), "Batch failed. Succeeded: 0, Failed: 2");
    }

    #[test]
    fn summarize_is_idempotent() {
        let results = vec![success("c1", true), failure("c2", "nope")];
        assert_eq!(summarize(&results), summarize(&results));
    }

    #[test]
    fn deferred_children_add_notice() {
        let summary = summarize(&[success("c1", true)]);
        assert_eq!(summary.notice.as_deref(), Some(DEFERRED_CHILDREN_NOTICE));
    }

    #[test]
    fn preview_truncates_with_count() {
        let results: Vec<_> = (0..7)
            .map(|i| failure(&format!("c{}", i), "rejected"))
            .collect();
        let preview = summarize(&results).error_preview(5);
        assert_eq!(preview.len(), 6);
        assert_eq!(preview[0], "c0: rejected");
        assert_eq!(preview[5], "...and 2 more");
    }

    #[test]
    fn upload_failures_are_collected() {
        let report = UploadReport {
            account_id: "act_1".into(),
            session: None,
            files: vec![
                FileOutcome {
                    file: "a.png".into(),
                    group: UploadGroup::Images,
                    kind: None,
                    asset_id: Some("h".into()),
                    error: None,
                },
                FileOutcome {
                    file: "b.mp4".into(),
                    group: UploadGroup::Videos,
                    kind: None,
                    asset_id: None,
                    error: Some("Too large".into()),
                },
            ],
            progress: None,
        };
        let failures = summarize_uploads(&[report]);
        assert_eq!(
            failures,
            vec![ItemFailure {
                account_id: "act_1".into(),
                file: "b.mp4".into(),
                message: "Too large".into()
            }]
        );

        let summary = summarize(&[success("act_1", false)]).with_item_failures(failures);
        assert_eq!(summary.error_preview(5), vec!["b.mp4: Too large".to_string()]);
    }
}
