//! Upload progress stream: SSE decoding, typed events, subscription and
//! per-file state tracking.

pub mod channel;
pub mod consumer;
pub mod events;
pub mod sse;

pub use channel::{ProgressMessage, ProgressSource, ProgressSubscription};
pub use consumer::{
    CompletionListener, FileFailure, FileProgressListener, FileProgressState, FileStage,
    ProgressConsumer, UploadProgressReport,
};
pub use events::ProgressEvent;
