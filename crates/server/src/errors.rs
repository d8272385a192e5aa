use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use models::CodecError;
use service::storage::StoreError;
use thiserror::Error;
use tracing::{debug, error};

/// Everything a request on the user-save resource can fail with.
/// Bodies are plain text.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no token provided")]
    MissingToken,
    #[error("token invalid")]
    InvalidToken,
    #[error("No UserSave for this user")]
    NoUserSave,
    #[error("invalid request body: {0}")]
    InvalidBody(String),
    #[error("failed to fetch user save: {0}")]
    Fetch(#[source] StoreError),
    #[error("failed to store user save: {0}")]
    Save(#[source] StoreError),
    #[error("failed to encode user save: {0}")]
    Encode(#[source] CodecError),
    #[error("not implemented")]
    NotImplemented,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingToken => StatusCode::FORBIDDEN,
            ApiError::InvalidToken => StatusCode::UNAUTHORIZED,
            ApiError::NoUserSave => StatusCode::NOT_FOUND,
            ApiError::InvalidBody(_) => StatusCode::BAD_REQUEST,
            ApiError::Fetch(_) | ApiError::Save(_) | ApiError::Encode(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        }
    }
}

impl From<CodecError> for ApiError {
    fn from(e: CodecError) -> Self {
        if e.is_client_fault() {
            return ApiError::InvalidBody(e.to_string());
        }
        match e {
            CodecError::Read(io) | CodecError::Write(io) => ApiError::Save(StoreError::Io(io)),
            other => ApiError::Encode(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
            // Storage internals stay in the log.
            "internal server error".to_string()
        } else {
            if status == StatusCode::NOT_FOUND {
                debug!(error = %self, "no user save stored");
            }
            self.to_string()
        };
        (status, body).into_response()
    }
}
