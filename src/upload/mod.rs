//! Creative uploads: file grouping and session coordination.

pub mod coordinator;
pub mod files;

pub use coordinator::{FileOutcome, UploadCoordinator, UploadGroup, UploadReport, UploadSession};
pub use files::{CreativeFile, FileGroups, LocalFile, MediaKind, RemoteFile};
