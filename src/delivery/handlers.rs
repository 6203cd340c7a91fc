use std::time::Instant;

use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use tracing::{debug, error, warn};

use crate::core::error::MapError;
use crate::mapping::extra::query_param;
use crate::mapping::prefix::{normalize_request_prefix, strip_map_prefix};
use crate::observability::metrics as obs;
use crate::storage::{ObjectLister, UrlSigner};

use super::router::AppState;

// ---------------------------------------------------------------------------
// Map endpoint
// ---------------------------------------------------------------------------

/// Map handler, installed as the router fallback.
///
/// Anything under the configured map prefix is answered with a manifest
/// (or a plain-text error). Every other unmatched path is a 404.
pub async fn map_request<L, S>(
    State(state): State<AppState<L, S>>,
    method: Method,
    uri: Uri,
) -> Response
where
    L: ObjectLister + 'static,
    S: UrlSigner + 'static,
{
    let Some(rest) = strip_map_prefix(uri.path(), &state.map_prefix) else {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    };

    let start = Instant::now();
    let prefix = normalize_request_prefix(rest);
    let result = if method != Method::GET {
        Err(MapError::MethodNotAllowed)
    } else {
        let extra = state
            .engine
            .extra_resources_param()
            .and_then(|name| query_param(uri.query(), name));
        state.engine.build_manifest(&prefix, extra.as_deref()).await
    };
    obs::record_map_request_duration(start.elapsed().as_secs_f64());

    match result {
        Ok(manifest) => {
            obs::inc_map_request(StatusCode::OK.as_u16());
            obs::record_manifest_sequences(manifest.len());
            debug!(prefix = %prefix, sequences = manifest.len(), "manifest served");
            Json(manifest).into_response()
        }
        Err(e) => {
            let status =
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            obs::inc_map_request(status.as_u16());
            if status.is_server_error() {
                error!(prefix = %prefix, kind = e.kind(), error = %e, "map request failed");
            } else {
                warn!(prefix = %prefix, method = %method, kind = e.kind(), "map request rejected");
            }
            (status, e.to_string()).into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Health and metrics
// ---------------------------------------------------------------------------

/// `GET /` - bare health check, empty 200.
pub async fn root_health() -> StatusCode {
    StatusCode::OK
}

/// `GET /healthz` - liveness probe.
pub async fn healthz<L, S>(State(state): State<AppState<L, S>>) -> Json<serde_json::Value>
where
    L: ObjectLister + 'static,
    S: UrlSigner + 'static,
{
    let uptime = state.start_time.elapsed().as_secs();
    Json(serde_json::json!({
        "status": "healthy",
        "uptime_secs": uptime,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /metrics` - Prometheus text exposition.
pub async fn metrics_handler<L, S>(State(state): State<AppState<L, S>>) -> Response
where
    L: ObjectLister + 'static,
    S: UrlSigner + 'static,
{
    let Some(handle) = state.metrics_handle.as_ref() else {
        return (StatusCode::NOT_FOUND, "metrics disabled").into_response();
    };
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        handle.render(),
    )
        .into_response()
}
