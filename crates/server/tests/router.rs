use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use server::{routes::build_router, AppState};
use service::{storage::MemoryStore, token::mock::StaticTokenChecker};
use tower::ServiceExt;

fn app() -> Router {
    let state = AppState::new(
        Arc::new(MemoryStore::new()),
        Arc::new(StaticTokenChecker::new().with_token("abc", "u1")),
        "*",
    )
    .unwrap();
    build_router(state)
}

async fn send(method: Method, uri: &str, token: Option<&str>) -> anyhow::Result<(StatusCode, String)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        builder = builder.header("Token", t);
    }
    let res = app().oneshot(builder.body(Body::empty())?).await?;
    let status = res.status();
    let body = to_bytes(res.into_body(), usize::MAX).await?;
    Ok((status, String::from_utf8(body.to_vec())?))
}

#[tokio::test]
async fn unknown_paths_are_not_found_for_every_method() -> anyhow::Result<()> {
    for path in ["/", "/v1", "/v1/usersave/extra", "/v1/usersaves", "/health"] {
        for method in [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS, Method::PUT] {
            let (status, body) = send(method.clone(), path, Some("abc")).await?;
            assert_eq!(status, StatusCode::NOT_FOUND, "{method} {path}");
            assert_eq!(body, "not found");
        }
    }
    Ok(())
}

#[tokio::test]
async fn other_methods_are_not_allowed() -> anyhow::Result<()> {
    for method in [Method::PUT, Method::PATCH, Method::HEAD, Method::TRACE] {
        let (status, _) = send(method.clone(), "/v1/usersave", Some("abc")).await?;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{method}");
    }
    let (_, body) = send(Method::PUT, "/v1/usersave", None).await?;
    assert_eq!(body, "invalid method");
    Ok(())
}

#[tokio::test]
async fn preflight_needs_no_token() -> anyhow::Result<()> {
    let req = Request::builder()
        .method(Method::OPTIONS)
        .uri("/v1/usersave")
        .body(Body::empty())?;
    let res = app().oneshot(req).await?;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let headers = res.headers();
    assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
    let methods = headers.get(header::ACCESS_CONTROL_ALLOW_METHODS).unwrap().to_str()?;
    for m in ["GET", "POST", "DELETE"] {
        assert!(methods.contains(m));
    }
    let allowed = headers.get(header::ACCESS_CONTROL_ALLOW_HEADERS).unwrap().to_str()?;
    assert!(allowed.contains("Token"));
    assert!(allowed.contains("Content-Type"));
    assert!(headers.get(header::ACCESS_CONTROL_MAX_AGE).is_some());

    let body = to_bytes(res.into_body(), usize::MAX).await?;
    assert!(body.is_empty());
    Ok(())
}

#[tokio::test]
async fn authenticated_methods_without_token_are_forbidden() -> anyhow::Result<()> {
    for method in [Method::GET, Method::POST, Method::DELETE] {
        let (status, body) = send(method.clone(), "/v1/usersave", None).await?;
        assert_eq!(status, StatusCode::FORBIDDEN, "{method}");
        assert_eq!(body, "no token provided");
    }
    Ok(())
}

#[tokio::test]
async fn delete_is_reserved() -> anyhow::Result<()> {
    let (status, body) = send(Method::DELETE, "/v1/usersave", Some("abc")).await?;
    assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(body, "not implemented");

    let (status, _) = send(Method::DELETE, "/v1/usersave", Some("bad")).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}
