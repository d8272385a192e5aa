use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};
use models::usersave;
use service::storage::{StoreError, USER_SAVE_CONTENT_TYPE};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::{auth::AuthenticatedUser, errors::ApiError, state::AppState};

const ALLOWED_METHODS: &str = "GET, POST, DELETE";
const ALLOWED_HEADERS: &str = "Content-Type, Token";
const PREFLIGHT_MAX_AGE: &str = "3600";

/// GET: stream the stored document back unchanged.
pub async fn fetch(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
) -> Result<Response, ApiError> {
    let reader = state.store.fetch(&user_id).await.map_err(|e| match e {
        StoreError::NotFound => ApiError::NoUserSave,
        other => ApiError::Fetch(other),
    })?;
    debug!(user_id = %user_id, "sending user save");

    // Headers go out before the body; a read error past this point truncates the response.
    let body = Body::from_stream(ReaderStream::new(reader));
    Ok(([(header::CONTENT_TYPE, HeaderValue::from_static(USER_SAVE_CONTENT_TYPE))], body).into_response())
}

/// POST: validate, re-encode canonically, overwrite, echo.
pub async fn save(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
    body: Bytes,
) -> Result<Response, ApiError> {
    if body.is_empty() {
        return Err(ApiError::InvalidBody("missing request body".into()));
    }
    let document = usersave::decode(body.as_ref()).await?;

    let mut encoded = Vec::with_capacity(body.len());
    usersave::encode(&document, &mut encoded).await?;

    let mut sink = state.store.save(&user_id).await.map_err(ApiError::Save)?;
    sink.write_all(&encoded).await.map_err(|e| ApiError::Save(StoreError::Io(e)))?;
    sink.flush().await.map_err(|e| ApiError::Save(StoreError::Io(e)))?;
    sink.commit().await.map_err(ApiError::Save)?;

    info!(user_id = %user_id, bytes = encoded.len(), "user save stored");
    Ok(([(header::CONTENT_TYPE, HeaderValue::from_static(USER_SAVE_CONTENT_TYPE))], encoded).into_response())
}

/// DELETE: routed and authenticated, no backing operation yet.
pub async fn delete(
    Extension(AuthenticatedUser(user_id)): Extension<AuthenticatedUser>,
) -> ApiError {
    debug!(user_id = %user_id, "delete requested");
    ApiError::NotImplemented
}

/// OPTIONS: CORS preflight, no auth.
pub async fn preflight() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_METHODS, ALLOWED_METHODS),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOWED_HEADERS),
            (header::ACCESS_CONTROL_MAX_AGE, PREFLIGHT_MAX_AGE),
        ],
    )
}

pub async fn invalid_method() -> impl IntoResponse {
    (StatusCode::METHOD_NOT_ALLOWED, "invalid method")
}

pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}
