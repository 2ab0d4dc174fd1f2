//! Batch operation orchestrator for bulk ad platform operations.
//!
//! Duplicates campaigns and ad sets, creates ad sets and ads, and uploads
//! creatives across many targets at once. Uploads stream live per-file
//! progress; batch targets run one at a time and every failure is reported
//! per target without aborting the batch.

pub mod batch;
pub mod config;
pub mod dialog;
pub mod error;
pub mod logging;
pub mod progress;
pub mod remote;
pub mod upload;

pub use batch::{BatchKind, BatchSummary, JobStatus, TargetDescriptor};
pub use config::OrchestratorConfig;
pub use dialog::{open_batch_dialog, BatchDialog, BatchRequest};
pub use error::{AppError, ErrorPresentation};
pub use remote::ApiClient;
