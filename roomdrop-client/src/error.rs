use thiserror::Error;

use roomdrop_common::error::StorageError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-2xx status and an `{error}` body.
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("No room joined")]
    NoRoom,

    #[error("Invalid share link: {0}")]
    InvalidLink(String),
}
