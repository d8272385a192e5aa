use std::sync::Arc;

use axum::http::{header::InvalidHeaderValue, HeaderValue};
use service::{storage::UserSaveStore, token::TokenChecker};

/// Read-only handles shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserSaveStore>,
    pub checker: Arc<dyn TokenChecker>,
    /// Value of `Access-Control-Allow-Origin` on the user-save resource.
    pub allowed_origin: HeaderValue,
}

impl AppState {
    pub fn new(
        store: Arc<dyn UserSaveStore>,
        checker: Arc<dyn TokenChecker>,
        allowed_origin: &str,
    ) -> Result<Self, InvalidHeaderValue> {
        Ok(Self { store, checker, allowed_origin: HeaderValue::from_str(allowed_origin)? })
    }
}
