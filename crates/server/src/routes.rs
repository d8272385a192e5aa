use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{header, Request},
    middleware,
    routing::{get, MethodRouter},
    Router,
};
use tower_http::{
    set_header::SetResponseHeaderLayer,
    trace::{DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{info_span, Level, Span};

use crate::{auth, correlation, correlation::CorrelationId, handlers, state::AppState};

pub const USERSAVE_PATH: &str = "/v1/usersave";

/// Largest accepted save body; bigger uploads get 413 before decoding.
pub const MAX_SAVE_BYTES: usize = 2 * 1024 * 1024;

/// GET/POST/DELETE behind the token gate, OPTIONS open, everything else 405.
/// Every response on this path carries the configured allow-origin.
fn usersave_routes(state: &AppState) -> MethodRouter<AppState> {
    get(handlers::fetch)
        .post(handlers::save)
        .delete(handlers::delete)
        .route_layer(middleware::from_fn_with_state(
            state.checker.clone(),
            auth::require_token,
        ))
        .options(handlers::preflight)
        // Without this axum would answer HEAD with the GET handler.
        .head(handlers::invalid_method)
        .fallback(handlers::invalid_method)
        .layer::<_, std::convert::Infallible>(DefaultBodyLimit::max(MAX_SAVE_BYTES))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            state.allowed_origin.clone(),
        ))
}

fn request_span(req: &Request<Body>) -> Span {
    let correlation_id = req
        .extensions()
        .get::<CorrelationId>()
        .map(ToString::to_string)
        .unwrap_or_default();
    let header_str = |name: header::HeaderName| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    };
    info_span!(
        "request",
        correlation_id = %correlation_id,
        method = %req.method(),
        uri = %req.uri(),
        host = %header_str(header::HOST),
        user_agent = %header_str(header::USER_AGENT),
    )
}

/// Build the full application router
pub fn build_router(state: AppState) -> Router {
    let usersave = usersave_routes(&state);

    Router::new()
        .route(USERSAVE_PATH, usersave)
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .include_headers(false),
                )
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
        // Outermost, so the id exists before the span is opened.
        .layer(middleware::from_fn(correlation::assign_correlation_id))
}
