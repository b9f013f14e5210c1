#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderName, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use gridsync_core::schema::TableSchema;
use gridsync_core::schema::TypedValue;
use gridsync_db::repositories::{ColumnAssignment, DataRowRepo};
use gridsync_events::{BroadcastHub, ChangeFeedListener, ListenerConfig};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::PgPool;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use gridsync_api::config::ServerConfig;
use gridsync_api::routes;
use gridsync_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults.
///
/// No database URLs are set, so the change-feed listener never connects.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        database_url: None,
        direct_database_url: None,
        sse_heartbeat_secs: 30,
        page_size: 3,
        notification_retention_days: 7,
    }
}

/// Application state over `pool` with an unconnected listener.
pub fn build_test_state(pool: PgPool) -> AppState {
    build_test_state_with_listener(pool, ListenerConfig::new(None, None))
}

/// Application state whose change-feed listener uses `listener_config`.
pub fn build_test_state_with_listener(pool: PgPool, listener_config: ListenerConfig) -> AppState {
    let config = test_config();
    let hub = Arc::new(BroadcastHub::new());
    let listener = Arc::new(ChangeFeedListener::new(
        listener_config,
        pool.clone(),
        Arc::clone(&hub),
    ));

    AppState {
        pool,
        config: Arc::new(config),
        schema: Arc::new(TableSchema::default()),
        hub,
        listener,
    }
}

/// Build the full application router with all middleware layers, using the
/// given database pool.
///
/// This mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack production uses.
pub fn build_test_app(pool: PgPool) -> Router {
    build_app(build_test_state(pool))
}

pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT, CACHE_CONTROL])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    Router::new()
        .merge(routes::health::router())
        .nest("/api", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn patch_json(app: Router, uri: &str, body: Value) -> Response {
    send_json(app, Method::PATCH, uri, body).await
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response {
    send_json(app, Method::POST, uri, body).await
}

async fn send_json(app: Router, method: Method, uri: &str, body: Value) -> Response {
    app.oneshot(
        Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Insert `count` rows with `col_s_01 = "row-{n}"` and return their ids.
pub async fn seed_rows(pool: &PgPool, count: usize) -> Vec<i64> {
    let mut ids = Vec::with_capacity(count);
    for n in 0..count {
        let id = DataRowRepo::insert(
            pool,
            &[ColumnAssignment::new(
                "col_s_01",
                TypedValue::Text(Some(format!("row-{n}"))),
            )],
        )
        .await
        .unwrap();
        ids.push(id);
    }
    ids
}
