//! Token gate for the user-save resource.
//!
//! `Token` header missing or empty: 403. Present but rejected: 401.
//! Accepted: the resolved [`UserId`] is attached as [`AuthenticatedUser`]
//! and the wrapped handler runs.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use models::UserId;
use service::token::TokenChecker;
use tracing::{debug, error, warn};

use crate::errors::ApiError;

pub const TOKEN_HEADER: &str = "Token";

/// Identity established by [`require_token`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub UserId);

pub async fn require_token(
    State(checker): State<Arc<dyn TokenChecker>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = req.uri().path().to_string();
    let raw = match req.headers().get(TOKEN_HEADER) {
        Some(v) if !v.is_empty() => v,
        _ => {
            debug!(path = %path, "request without token");
            return Err(ApiError::MissingToken);
        }
    };
    let token = raw.to_str().map_err(|_| {
        warn!(path = %path, "token header is not visible ascii");
        ApiError::InvalidToken
    })?;

    let subject = checker.validate(token).await.map_err(|e| {
        warn!(path = %path, error = %e, "token rejected");
        ApiError::InvalidToken
    })?;

    let user_id = UserId::parse(subject).map_err(|e| {
        error!(
            event = "unidentifiable_principal",
            path = %path,
            error = %e,
            "token checker accepted a token without a usable user id"
        );
        ApiError::InvalidToken
    })?;

    debug!(user_id = %user_id, "authenticated");
    req.extensions_mut().insert(AuthenticatedUser(user_id));
    Ok(next.run(req).await)
}
