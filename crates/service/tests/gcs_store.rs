use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use models::UserId;
use service::storage::{gcs::GcsConfig, GcsStore, StoreError, UserSaveStore};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::{net::TcpListener, sync::Mutex};

const BUCKET: &str = "user-saves-1";
const TOKEN: &str = "test-access-token";

#[derive(Clone, Default)]
struct FakeGcs {
    objects: Arc<Mutex<HashMap<String, Bytes>>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    let expected = format!("Bearer {TOKEN}");
    headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) == Some(expected.as_str())
}

async fn bucket(Path(bucket): Path<String>, headers: HeaderMap) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    if bucket == BUCKET { StatusCode::OK } else { StatusCode::NOT_FOUND }
}

async fn download(
    State(fake): State<FakeGcs>,
    Path((bucket, object)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Bytes, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    if bucket != BUCKET || query.get("alt").map(String::as_str) != Some("media") {
        return Err(StatusCode::BAD_REQUEST);
    }
    fake.objects.lock().await.get(&object).cloned().ok_or(StatusCode::NOT_FOUND)
}

async fn upload(
    State(fake): State<FakeGcs>,
    Path(bucket): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    if bucket != BUCKET || query.get("uploadType").map(String::as_str) != Some("media") {
        return StatusCode::BAD_REQUEST;
    }
    if headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) != Some("application/json") {
        return StatusCode::UNSUPPORTED_MEDIA_TYPE;
    }
    let Some(name) = query.get("name") else { return StatusCode::BAD_REQUEST };
    fake.objects.lock().await.insert(name.clone(), body);
    StatusCode::OK
}

async fn start_fake() -> anyhow::Result<(String, FakeGcs)> {
    let fake = FakeGcs::default();
    let app = Router::new()
        .route("/storage/v1/b/:bucket", get(bucket))
        .route("/storage/v1/b/:bucket/o/:object", get(download))
        .route("/upload/storage/v1/b/:bucket/o", post(upload))
        .with_state(fake.clone());
    let listener = TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await { eprintln!("fake gcs error: {}", e); }
    });
    Ok((format!("http://{}", addr), fake))
}

fn config(endpoint: &str, bucket: &str) -> GcsConfig {
    GcsConfig {
        bucket: bucket.into(),
        endpoint: endpoint.into(),
        access_token: Some(TOKEN.into()),
        request_timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn save_then_fetch_round_trips() -> anyhow::Result<()> {
    let (endpoint, fake) = start_fake().await?;
    let store = GcsStore::connect(config(&endpoint, BUCKET)).await?;
    let user = UserId::parse("u1")?;

    let mut sink = store.save(&user).await?;
    sink.write_all(br#"{"income":{"cents":1}}"#).await?;
    sink.commit().await?;
    assert!(fake.objects.lock().await.contains_key("u1"));

    let mut out = String::new();
    store.fetch(&user).await?.read_to_string(&mut out).await?;
    assert_eq!(out, r#"{"income":{"cents":1}}"#);

    store.close().await?;
    Ok(())
}

#[tokio::test]
async fn missing_object_is_not_found() -> anyhow::Result<()> {
    let (endpoint, _fake) = start_fake().await?;
    let store = GcsStore::connect(config(&endpoint, BUCKET)).await?;
    let err = store.fetch(&UserId::parse("ghost")?).await.err().unwrap();
    assert!(err.is_not_found(), "{err}");
    Ok(())
}

#[tokio::test]
async fn uncommitted_sink_uploads_nothing() -> anyhow::Result<()> {
    let (endpoint, fake) = start_fake().await?;
    let store = GcsStore::connect(config(&endpoint, BUCKET)).await?;
    let mut sink = store.save(&UserId::parse("u2")?).await?;
    sink.write_all(b"{}").await?;
    drop(sink);
    assert!(fake.objects.lock().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn connect_fails_for_unknown_bucket() -> anyhow::Result<()> {
    let (endpoint, _fake) = start_fake().await?;
    let err = GcsStore::connect(config(&endpoint, "other-bucket")).await.unwrap_err();
    assert!(matches!(err, StoreError::Backend(_)), "{err}");
    Ok(())
}

#[tokio::test]
async fn close_releases_the_client_once() -> anyhow::Result<()> {
    let (endpoint, _fake) = start_fake().await?;
    let store = GcsStore::connect(config(&endpoint, BUCKET)).await?;
    store.close().await?;
    assert!(store.close().await.is_err());
    assert!(store.fetch(&UserId::parse("u1")?).await.is_err());
    Ok(())
}
