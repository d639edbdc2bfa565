use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single classification call.
///
/// A classification error is scoped to the frame or still image that produced it; callers
/// treat any variant as "no result" and keep going.
#[derive(Error, Debug)]
pub enum ClassifyError {
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("unsupported frame layout: {0}")]
    UnsupportedFrame(String),
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("inference failed: {0}")]
    Inference(String),
}

impl ClassifyError {
    /// True when the caller should render the "model unavailable" state.
    pub fn is_model_unavailable(&self) -> bool {
        matches!(self, ClassifyError::ModelUnavailable(_))
    }
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("storage unavailable at {path:?}: {source}")]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("record {0} is already in the ledger")]
    DuplicateId(String),
    #[error("corrupt ledger snapshot: {0}")]
    CorruptSnapshot(String),
}

impl LedgerError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LedgerError::StorageUnavailable {
            path: path.into(),
            source,
        }
    }

    /// Storage failures can be retried; the in-memory ledger is left untouched by them.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::StorageUnavailable { .. })
    }
}
