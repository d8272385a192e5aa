use thiserror::Error;

/// Failures of the user save codec.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to read user save: {0}")]
    Read(#[source] std::io::Error),
    #[error("failed to decode UserSave JSON: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("failed to encode user save: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to write user save: {0}")]
    Write(#[source] std::io::Error),
}

impl CodecError {
    /// True when the input itself was at fault, as opposed to the I/O around it.
    pub fn is_client_fault(&self) -> bool {
        matches!(self, CodecError::Decode(_))
    }
}

/// Reasons a verified identifier cannot be used as a storage key.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidUserId {
    #[error("user id is empty")]
    Empty,
    #[error("user id is a relative path component")]
    Relative,
    #[error("user id contains forbidden character {0:?}")]
    ForbiddenChar(char),
}
