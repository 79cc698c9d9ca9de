//! Benchmark service binary.
//!
//! Wires the collaborators together (job store, worker pool, result
//! cache, reference oracle, progress broadcast, metrics) and serves
//! the HTTP/WebSocket surface.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    middleware as axum_mw,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seizeval_backend::api::{routes, ws, AppState};
use seizeval_backend::cache::ResultCache;
use seizeval_backend::jobs::{
    run_worker, ConnectionManager, JobManager, ProcessorContext, ProgressTracker,
};
use seizeval_backend::middleware::rate_limit::{rate_limit_middleware, RateLimiter};
use seizeval_backend::middleware::logging::request_logging;
use seizeval_backend::models::Config;
use seizeval_backend::monitoring::{MetricsSink, NoopSink, PrometheusSink};
use seizeval_backend::orchestration::{
    AsyncOrchestrator, DualOrchestrator, InProcessOracle, ReferenceScorer, SubprocessOracle,
};
use seizeval_backend::params::ScoringParams;
use seizeval_backend::validation::parity::DEFAULT_TOLERANCE;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    info!(port = config.port, workers = config.max_workers, "starting seizeval backend");

    // Scoring parameters: configured TOML or defaults
    let params = match &config.scoring_params {
        Some(path) => ScoringParams::from_toml_file(Path::new(path))
            .with_context(|| format!("loading scoring params from {path}"))?,
        None => ScoringParams::default(),
    };
    info!(
        epoch_duration = params.epoch_duration,
        null_class = %params.null_class,
        mapped_labels = params.label_map.len(),
        "scoring parameters loaded"
    );

    // Metrics recorder; the service runs without one if install fails
    let (prometheus, metrics): (Option<Arc<PrometheusSink>>, Arc<dyn MetricsSink>) =
        match PrometheusSink::install() {
            Ok(sink) => {
                let sink = Arc::new(sink);
                (Some(sink.clone()), sink)
            }
            Err(err) => {
                warn!(%err, "metrics recorder unavailable, using no-op sink");
                (None, Arc::new(NoopSink))
            }
        };

    // Reference oracle: external command when configured, otherwise
    // the in-process mirror
    let oracle: Arc<dyn ReferenceScorer> = match &config.oracle_cmd {
        Some(cmd) => {
            info!(command = %cmd, "using subprocess reference oracle");
            Arc::new(SubprocessOracle::new(cmd.clone()))
        }
        None => {
            info!("ORACLE_CMD not set, using in-process reference oracle");
            Arc::new(InProcessOracle::new(params.clone()))
        }
    };

    let cache = Arc::new(
        ResultCache::connect(&config.redis_url, config.cache_ttl_seconds).await,
    );
    if cache.ping().await {
        info!(url = %config.redis_url, "result cache connected");
    }

    let dual = Arc::new(DualOrchestrator::new(oracle, params, DEFAULT_TOLERANCE));
    let orchestrator = Arc::new(AsyncOrchestrator::new(
        dual,
        cache.clone(),
        metrics.clone(),
    ));

    let jobs = Arc::new(JobManager::new());
    let progress = Arc::new(ProgressTracker::new());
    let broadcaster = Arc::new(ConnectionManager::new());

    let scratch_dir = PathBuf::from(&config.scratch_dir);
    tokio::fs::create_dir_all(&scratch_dir)
        .await
        .with_context(|| format!("creating scratch dir {}", scratch_dir.display()))?;

    // Worker pool with graceful shutdown at the next dequeue
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ctx = Arc::new(ProcessorContext {
        jobs: jobs.clone(),
        orchestrator: orchestrator.clone(),
        progress: progress.clone(),
        broadcaster: broadcaster.clone(),
    });
    let mut workers = Vec::with_capacity(config.max_workers);
    for worker_id in 0..config.max_workers {
        workers.push(tokio::spawn(run_worker(
            ctx.clone(),
            worker_id,
            shutdown_rx.clone(),
        )));
    }

    // Rate limiter with periodic pruning of idle clients
    let rate_limiter = RateLimiter::new(config.rate_limit_rpm);
    let cleanup_limiter = rate_limiter.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(300));
        loop {
            ticker.tick().await;
            cleanup_limiter.cleanup();
        }
    });

    let state = AppState {
        jobs,
        orchestrator,
        progress,
        broadcaster,
        cache,
        prometheus,
        scratch_dir,
    };

    let api_routes = Router::new()
        .route(
            "/api/v1/evaluate",
            get(routes::list_evaluations).post(routes::submit_evaluation),
        )
        .route("/api/v1/evaluate/:job_id", get(routes::get_evaluation))
        .route_layer(axum_mw::from_fn_with_state(
            rate_limiter.clone(),
            rate_limit_middleware,
        ));

    let app = Router::new()
        .merge(api_routes)
        .route("/api/v1/health", get(routes::health_check))
        .route("/api/v1/ready", get(routes::readiness_check))
        .route("/metrics", get(routes::metrics_endpoint))
        .route("/ws/:job_id", get(ws::ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(axum_mw::from_fn(request_logging));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "API server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    // Drain workers: they exit at their next dequeue
    info!("shutting down, draining workers");
    let _ = shutdown_tx.send(true);
    for worker in workers {
        let _ = worker.await;
    }

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seizeval_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
