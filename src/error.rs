use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the core reports. Kinds stay distinct so the caller can
/// map each one to its own response.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },
    #[error("failed liveness checks")]
    LivenessRejected,
    #[error("no face detected")]
    NoFaceDetected,
    #[error("embedding extraction failed: {0:#}")]
    Extraction(anyhow::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl Error {
    /// Rejections are caused by the submitted image rather than by a
    /// fault in the system.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::Decode(_) | Error::LivenessRejected | Error::NoFaceDetected
        )
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed record: {0}")]
    Codec(#[from] postcard::Error),
    #[error("store lock poisoned")]
    Poisoned,
}
