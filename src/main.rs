use std::net::SocketAddr;
use std::process::ExitCode;

use tracing::{error, info, warn};

use clipmap::core::config::AppConfig;
use clipmap::core::shutdown::{ShutdownCoordinator, HTTP_DRAIN_TIMEOUT};
use clipmap::delivery::router::{self, AppState};
use clipmap::mapping::MapEngine;
use clipmap::observability::logging::init_tracing;
use clipmap::observability::metrics as obs_metrics;
use clipmap::storage::local_signer::LocalUrlSigner;
use clipmap::storage::memory::InMemoryObjectStore;
use clipmap::storage::{ObjectLister, UrlSigner};

#[tokio::main]
async fn main() -> ExitCode {
    // Install panic hook: log panics with full backtrace and increment counter.
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        obs_metrics::inc_panic_total();
        let backtrace = std::backtrace::Backtrace::force_capture();
        eprintln!("PANIC: {info}\nBacktrace:\n{backtrace}");
        default_hook(info);
    }));

    // Load configuration (layered: default.toml → {env}.toml → env vars)
    let config = match AppConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    info!(version = env!("CARGO_PKG_VERSION"), "clipmap starting");

    // Metrics recorder must be installed before anything is recorded.
    let metrics_handle = if config.observability.metrics_enabled {
        match obs_metrics::install_prometheus_recorder() {
            Ok(handle) => {
                obs_metrics::describe_all_metrics();
                Some(handle)
            }
            Err(e) => {
                warn!(error = %e, "failed to install Prometheus recorder, metrics disabled");
                None
            }
        }
    } else {
        None
    };

    let result = match config.storage.backend.as_str() {
        #[cfg(feature = "s3")]
        "s3" => {
            let lister = clipmap::storage::s3::S3ObjectStore::new(&config.storage, &config.mapping.bucket);
            let signer = clipmap::storage::s3::S3UrlSigner::new(&config.storage);
            serve(&config, lister, signer, metrics_handle).await
        }
        "memory" => {
            warn!("using in-memory object store; listings will be empty until populated");
            let lister = InMemoryObjectStore::new(config.mapping.bucket.clone());
            let signer = LocalUrlSigner::new(&config.storage.endpoint);
            serve(&config, lister, signer, metrics_handle).await
        }
        other => Err(anyhow::anyhow!(
            "storage backend {other:?} is not available in this build"
        )),
    };

    match result {
        Ok(()) => {
            info!("graceful shutdown completed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "clipmap exited with error");
            ExitCode::FAILURE
        }
    }
}

/// Build the engine over the chosen backend and run the HTTP server until a
/// shutdown signal arrives.
async fn serve<L, S>(
    config: &AppConfig,
    lister: L,
    signer: S,
    metrics_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
) -> anyhow::Result<()>
where
    L: ObjectLister + 'static,
    S: UrlSigner + 'static,
{
    let engine = MapEngine::new(config, lister, signer)?;
    let mut state = AppState::new(engine, &config.mapping.map_prefix);
    if let Some(handle) = metrics_handle {
        state = state.with_metrics(handle);
    }
    let start_time = state.start_time;
    let app = router::build_router(state);

    let shutdown = ShutdownCoordinator::new();

    let uptime_cancel = shutdown.token();
    tokio::spawn(async move {
        obs_metrics::run_uptime_task(start_time, uptime_cancel).await;
    });

    let http_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    info!(
        %http_addr,
        map_prefix = %config.mapping.map_prefix,
        backend = %config.storage.backend,
        "HTTP server listening"
    );

    let shutdown_token = shutdown.token();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_token.cancelled().await;
            })
            .await
    });

    shutdown.wait_for_signal_and_shutdown().await;

    info!(timeout_secs = HTTP_DRAIN_TIMEOUT.as_secs(), "draining HTTP server");
    match tokio::time::timeout(HTTP_DRAIN_TIMEOUT, server).await {
        Ok(joined) => joined??,
        Err(_) => anyhow::bail!(
            "shutdown timed out after {}s, forcing exit",
            HTTP_DRAIN_TIMEOUT.as_secs()
        ),
    }
    Ok(())
}
