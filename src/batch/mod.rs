//! Batch execution: job model, pre-validation, sequential executor, concrete
//! operations and result aggregation.

pub mod aggregator;
pub mod executor;
pub mod job;
pub mod operations;
pub mod validator;

pub use aggregator::{summarize, summarize_uploads, BatchSummary, FailedTarget, ItemFailure};
pub use executor::{
    from_fn, BatchExecutor, TargetOperation, TargetOutcome, TargetProgress, TargetProgressListener,
};
pub use job::{
    BatchJob, BatchKind, JobStatus, TargetDescriptor, TargetError, TargetResult, TargetStatus,
};
pub use operations::{
    CreateAdOp, CreateAdSetOp, DuplicateAdSetOp, DuplicateCampaignOp, DuplicateOptions,
    UploadCreativesOp,
};
pub use validator::{validate, CampaignMeta, CompatibilityConstraint, ValidationReport};
