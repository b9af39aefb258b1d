//! Axum server and routes.

use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use kad_lifecycle::{compute_diff_from_str, LifecycleError, LifecycleService};
use kad_store::decode_event_list;
use kad_types::{
    filter_read_only, AuditListOptions, AuditPage, EventStore, LifecycleEvent, ResourceDiff,
    ResourceIdentifier,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;

const LIFECYCLE_PREFIX: &str = "/api/lifecycle/";

/// Response envelope shared by every JSON route. The HTTP status mirrors `code`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            code: StatusCode::OK.as_u16(),
            message: "Success".to_string(),
            data: Some(data),
        }
    }

    fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code: status.as_u16(),
            message: message.into(),
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub lifecycle: LifecycleService,
}

impl AppState {
    pub fn new(store: Arc<dyn EventStore>, fetch_timeout: Option<Duration>) -> Self {
        let mut lifecycle = LifecycleService::new(Arc::clone(&store));
        if let Some(timeout) = fetch_timeout {
            lifecycle = lifecycle.with_fetch_timeout(timeout);
        }
        Self { store, lifecycle }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/audit-webhook", post(handle_audit_webhook))
        .route("/api/audit-events", get(handle_audit_events))
        .route("/api/lifecycle", get(handle_lifecycle_query))
        .route(
            "/api/lifecycle/:gvk/:namespace/:name",
            get(handle_lifecycle_path),
        )
        .route("/api/diff", post(handle_diff))
        .route("/health", get(handle_health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct IngestSummary {
    pub ingested: usize,
}

async fn handle_audit_webhook(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResponse<IngestSummary> {
    let records = match decode_event_list(&body) {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(error = %e, "rejected audit webhook body");
            return ApiResponse::error(StatusCode::BAD_REQUEST, e.to_string());
        }
    };
    match state.store.append_batch(&records).await {
        Ok(ingested) => {
            tracing::info!(ingested, "audit events ingested");
            ApiResponse::ok(IngestSummary { ingested })
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to store audit events");
            ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEventsQuery {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

async fn handle_audit_events(
    State(state): State<Arc<AppState>>,
    query: Result<Query<AuditEventsQuery>, QueryRejection>,
) -> ApiResponse<AuditPage> {
    let Query(q) = match query {
        Ok(q) => q,
        Err(rejection) => return ApiResponse::error(rejection.status(), rejection.body_text()),
    };
    let opts = AuditListOptions::completed_request_response(q.page, q.page_size);
    match state.store.list(&opts).await {
        Ok(page) => ApiResponse::ok(page),
        Err(e) => ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HideReadOnlyQuery {
    #[serde(default)]
    pub hide_read_only: bool,
}

/// `GET /api/lifecycle/{gvk}/{namespace}/{name}`. Segments are taken from the raw path so
/// that the identifier parser sees (and decodes) them exactly once.
async fn handle_lifecycle_path(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    query: Result<Query<HideReadOnlyQuery>, QueryRejection>,
) -> ApiResponse<Vec<LifecycleEvent>> {
    let Query(q) = match query {
        Ok(q) => q,
        Err(rejection) => return ApiResponse::error(rejection.status(), rejection.body_text()),
    };
    let Some([gvk, namespace, name]) = raw_lifecycle_segments(uri.path()) else {
        return ApiResponse::error(StatusCode::BAD_REQUEST, "invalid lifecycle path");
    };
    let id = match ResourceIdentifier::parse_from_url(gvk, namespace, name) {
        Ok(id) => id,
        Err(e) => return ApiResponse::error(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let result = state.lifecycle.resource_lifecycle(&id).await;
    lifecycle_response(result, q.hide_read_only)
}

fn raw_lifecycle_segments(path: &str) -> Option<[&str; 3]> {
    let mut parts = path.strip_prefix(LIFECYCLE_PREFIX)?.split('/');
    let segments = [parts.next()?, parts.next()?, parts.next()?];
    match parts.next() {
        None => Some(segments),
        Some(_) => None,
    }
}

/// Arguments of the dashboard's `resourceLifecycle` query.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleArgs {
    #[serde(default)]
    pub api_group: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub hide_read_only: bool,
}

async fn handle_lifecycle_query(
    State(state): State<Arc<AppState>>,
    query: Result<Query<LifecycleArgs>, QueryRejection>,
) -> ApiResponse<Vec<LifecycleEvent>> {
    let Query(args) = match query {
        Ok(args) => args,
        Err(rejection) => return ApiResponse::error(rejection.status(), rejection.body_text()),
    };
    let result = state
        .lifecycle
        .resource_lifecycle_parts(
            &args.api_group,
            &args.version,
            &args.kind,
            args.namespace.as_deref(),
            &args.name,
        )
        .await;
    lifecycle_response(result, args.hide_read_only)
}

fn lifecycle_response(
    result: Result<Vec<LifecycleEvent>, LifecycleError>,
    hide_read_only: bool,
) -> ApiResponse<Vec<LifecycleEvent>> {
    match result {
        Ok(events) => ApiResponse::ok(filter_read_only(events, hide_read_only)),
        Err(e @ LifecycleError::Identifier(_)) => {
            ApiResponse::error(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e @ LifecycleError::Store { .. }) => {
            tracing::error!(error = %e, "lifecycle query failed");
            ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DiffRequest {
    #[serde(default)]
    pub old: String,
    #[serde(default)]
    pub new: String,
}

async fn handle_diff(body: Result<Json<DiffRequest>, JsonRejection>) -> ApiResponse<ResourceDiff> {
    let Json(req) = match body {
        Ok(req) => req,
        Err(rejection) => return ApiResponse::error(rejection.status(), rejection.body_text()),
    };
    match compute_diff_from_str(&req.old, &req.new) {
        Ok(diff) => ApiResponse::ok(diff),
        Err(e) => ApiResponse::error(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

async fn handle_health() -> &'static str {
    "ok"
}
