use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::Request;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

use crate::mapping::prefix::strip_map_prefix;
use crate::mapping::MapEngine;
use crate::storage::{ObjectLister, UrlSigner};

use super::handlers;
use super::middleware::{request_id_of, RequestIdLayer};

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// State shared by all handlers.
pub struct AppState<L, S> {
    pub engine: Arc<MapEngine<L, S>>,
    /// Path prefix routed to the map handler, e.g. `/map/`.
    pub map_prefix: Arc<str>,
    pub start_time: Instant,
    /// `None` when metrics are disabled.
    pub metrics_handle: Option<PrometheusHandle>,
}

impl<L, S> Clone for AppState<L, S> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            map_prefix: self.map_prefix.clone(),
            start_time: self.start_time,
            metrics_handle: self.metrics_handle.clone(),
        }
    }
}

impl<L, S> AppState<L, S> {
    pub fn new(engine: MapEngine<L, S>, map_prefix: &str) -> Self {
        Self {
            engine: Arc::new(engine),
            map_prefix: Arc::from(map_prefix),
            start_time: Instant::now(),
            metrics_handle: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the HTTP router.
///
/// - `GET /healthz`  liveness JSON
/// - `GET /metrics`  Prometheus metrics
/// - `GET /`         empty 200, unless `/` itself falls under the map prefix
/// - `<map_prefix>*` manifest for the remainder of the path (fallback)
/// - anything else   404
pub fn build_router<L, S>(state: AppState<L, S>) -> Router
where
    L: ObjectLister + 'static,
    S: UrlSigner + 'static,
{
    let mut router = Router::new()
        .route("/healthz", get(handlers::healthz::<L, S>))
        .route("/metrics", get(handlers::metrics_handler::<L, S>));

    if strip_map_prefix("/", &state.map_prefix).is_none() {
        router = router.route("/", get(handlers::root_health));
    }

    tracing::info!(map_prefix = %state.map_prefix, "routes configured");

    router
        .fallback(handlers::map_request::<L, S>)
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                tracing::info_span!(
                    "http_request",
                    method = %req.method(),
                    path = %req.uri().path(),
                    request_id = %request_id_of(req),
                )
            }),
        )
        .layer(RequestIdLayer)
        .with_state(state)
}
