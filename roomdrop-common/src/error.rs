use thiserror::Error;

/// Failure conditions shared by the storage adapters, the upload path and
/// the room listing path.
///
/// None of these are fatal: every variant is reported back to whoever
/// issued the request and the process keeps serving.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// Missing file, empty payload or bad room identifier. Raised before any
    /// backend call is made.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Network or credential failure talking to the storage provider.
    #[error("Storage backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The provider answered but reported failure, or its response lacked
    /// an expected field.
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    /// A listing cycle failed as a whole.
    #[error("Listing failed: {0}")]
    ListPartial(String),
}

impl StorageError {
    pub fn validation(msg: impl Into<String>) -> Self {
        StorageError::Validation(msg.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, StorageError::Validation(_))
    }
}
