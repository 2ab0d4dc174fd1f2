//! Creative file descriptors and their partition into upload groups.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

const IMAGE_EXTENSIONS: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
];

const VIDEO_EXTENSIONS: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("m4v", "video/x-m4v"),
    ("mov", "video/quicktime"),
    ("avi", "video/x-msvideo"),
    ("webm", "video/webm"),
    ("mkv", "video/x-matroska"),
];

/// Whether a creative is an image or a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Detects the kind from a MIME type, falling back to the file extension.
    pub fn detect(content_type: Option<&str>, name: &str) -> Option<Self> {
        let from_type = content_type.and_then(|ct| {
            let ct = ct.trim().to_ascii_lowercase();
            if ct.starts_with("image/") {
                Some(MediaKind::Image)
            } else if ct.starts_with("video/") {
                Some(MediaKind::Video)
            } else {
                None
            }
        });
        from_type.or_else(|| guess_content_type(name).and_then(|ct| Self::detect(Some(ct), "")))
    }
}

/// Maps a file name's extension to a known creative MIME type.
fn guess_content_type(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
    IMAGE_EXTENSIONS
        .iter()
        .chain(VIDEO_EXTENSIONS)
        .find(|(e, _)| *e == ext)
        .map(|(_, ct)| *ct)
}

// ─────────────────────────────────────────────────────────────────────────────
// File Descriptors
// ─────────────────────────────────────────────────────────────────────────────

/// A creative file on the local disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFile {
    pub path: PathBuf,
    pub name: String,
    pub content_type: String,
    pub size: u64,
}

impl LocalFile {
    /// Describes a file on disk, guessing its content type from the extension.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UploadFailed` if the file cannot be stat'ed or is not
    /// a regular file.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| AppError::UploadFailed {
                file: name.clone(),
                message: format!("Cannot read file: {}", e),
            })?;
        if !metadata.is_file() {
            return Err(AppError::UploadFailed {
                file: name,
                message: "Not a regular file".to_string(),
            });
        }

        let content_type = guess_content_type(&name)
            .unwrap_or("application/octet-stream")
            .to_string();

        Ok(Self {
            path: path.to_path_buf(),
            name,
            content_type,
            size: metadata.len(),
        })
    }

    pub fn kind(&self) -> Option<MediaKind> {
        MediaKind::detect(Some(&self.content_type), &self.name)
    }
}

/// A file held by a third-party drive, fetched server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub file_id: String,
    pub name: String,
    pub mime_type: Option<String>,
}

impl RemoteFile {
    pub fn new(file_id: impl Into<String>, name: impl Into<String>, mime_type: Option<&str>) -> Self {
        Self {
            file_id: file_id.into(),
            name: name.into(),
            mime_type: mime_type.map(str::to_string),
        }
    }

    pub fn kind(&self) -> Option<MediaKind> {
        MediaKind::detect(self.mime_type.as_deref(), &self.name)
    }
}

/// Any creative the user picked for upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum CreativeFile {
    Local(LocalFile),
    Remote(RemoteFile),
}

impl CreativeFile {
    pub fn name(&self) -> &str {
        match self {
            CreativeFile::Local(f) => &f.name,
            CreativeFile::Remote(f) => &f.name,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Grouping
// ─────────────────────────────────────────────────────────────────────────────

/// Files split into independently dispatchable upload groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileGroups {
    pub images: Vec<LocalFile>,
    pub videos: Vec<LocalFile>,
    pub remote: Vec<RemoteFile>,
}

impl FileGroups {
    /// Splits files into local images, local videos and remote files,
    /// preserving input order within each group.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Precondition` listing every local file that is
    /// neither an image nor a video.
    pub fn partition(files: Vec<CreativeFile>) -> Result<Self, AppError> {
        let mut groups = FileGroups::default();
        let mut unsupported = Vec::new();

        for file in files {
            match file {
                CreativeFile::Local(local) => match local.kind() {
                    Some(MediaKind::Image) => groups.images.push(local),
                    Some(MediaKind::Video) => groups.videos.push(local),
                    None => unsupported.push(format!("Unsupported file type: {}", local.name)),
                },
                // The drive endpoint sorts images from videos itself
                CreativeFile::Remote(remote) => groups.remote.push(remote),
            }
        }

        if !unsupported.is_empty() {
            return Err(AppError::Precondition(unsupported));
        }
        Ok(groups)
    }

    /// Videos and remote files report progress, so they need a session.
    pub fn needs_session(&self) -> bool {
        !self.videos.is_empty() || !self.remote.is_empty()
    }

    pub fn total_items(&self) -> usize {
        self.images.len() + self.videos.len() + self.remote.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_items() == 0
    }
}
