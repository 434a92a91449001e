use std::path::PathBuf;
use thiserror::Error;

/// Failures of the face annotation pipeline and its metadata store.
#[derive(Debug, Error)]
pub enum FaceError {
    #[error("face detection credentials are not configured")]
    CredentialsMissing,

    #[error("face detection provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("failed to decode image: {0}")]
    ImageDecodeFailed(String),

    #[error("image too large: {size} bytes (max {max})")]
    ImageTooLarge { size: usize, max: usize },

    #[error("metadata record {path:?} is corrupt: {reason}")]
    MetadataCorrupt { path: PathBuf, reason: String },

    #[error("artifact not found: {0:?}")]
    ArtifactNotFound(PathBuf),

    #[error("invalid face box: {0}")]
    InvalidBox(String),

    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    #[error("invalid QQ number: {0}")]
    InvalidAccount(String),

    #[error("background job queue closed")]
    QueueClosed,

    #[error("failed to encode image: {0}")]
    Encode(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FaceError {
    /// Maps `NotFound` I/O failures on a known path to `ArtifactNotFound`.
    pub fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            FaceError::ArtifactNotFound(path.to_path_buf())
        } else {
            FaceError::Io(err)
        }
    }
}

pub type FaceResult<T> = Result<T, FaceError>;
