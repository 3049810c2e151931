//! Axum API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use camcount_api::{bootstrap, create_router, metrics, ApiConfig, AppState, AutoRefresh};
use camcount_media::{DetectorSettings, FrameBackend, ObjectDetect, OnnxObjectDetector};
use camcount_worker::{Pipeline, WorkerConfig};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("camcount-api failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Install rustls crypto provider (required for rustls 0.23+)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    init_tracing()?;

    info!("Starting camcount-api");

    let config = ApiConfig::from_env();
    let worker_config = WorkerConfig::from_env();
    let detector_settings = DetectorSettings::from_env();
    info!("API config: host={}, port={}", config.host, config.port);

    let provisioned = bootstrap::prepare(&worker_config, &detector_settings)
        .await
        .context("startup provisioning failed")?;
    info!(
        groups = provisioned.group_count,
        cameras = provisioned.camera_count,
        "Camera registry loaded"
    );

    let detector = OnnxObjectDetector::new(detector_settings).context("failed to load detector")?;
    let detector: Arc<dyn ObjectDetect> = Arc::new(detector);
    let pipeline = build_pipeline(&worker_config, detector)?;

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("failed to install Prometheus recorder")?)
    } else {
        None
    };

    let state = AppState::new(config.clone(), pipeline);

    if let Some(interval) = config.auto_refresh_interval {
        let refresher = AutoRefresh::new(
            Arc::clone(&state.pipeline),
            interval,
            config.auto_refresh_groups.clone(),
        );
        tokio::spawn(refresher.run());
    }

    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid bind address")?;

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Colored output for dev, JSON when `LOG_FORMAT=json`.
fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("camcount=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

/// OpenCV frame I/O by default; FFmpeg pipes when built without it.
fn build_pipeline(config: &WorkerConfig, detector: Arc<dyn ObjectDetect>) -> anyhow::Result<Pipeline> {
    #[cfg(feature = "opencv")]
    let backend: Arc<dyn FrameBackend> = Arc::new(camcount_media::OpencvFrameBackend);
    #[cfg(not(feature = "opencv"))]
    let backend: Arc<dyn FrameBackend> = Arc::new(camcount_media::FfmpegFrameBackend::new());

    Ok(Pipeline::from_config(config, detector, backend)?)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
