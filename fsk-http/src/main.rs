use std::env;

use fskhttp::{
    ARTIFACT_MAX_AGE, ReaperConfig, ServiceConfig, SharedState, build_app, init_logging,
    spawn_temp_reaper,
};
use tracing::{info, warn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if wants_version_flag() {
        println!("{}", binary_version_text());
        return Ok(());
    }

    let config = ServiceConfig::from_env()?;
    init_logging(config.log_filter())?;
    info!("{}", binary_version_text());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.max_workers)
        .thread_name("fsk-worker")
        .enable_all()
        .build()?;
    runtime.block_on(serve(config))
}

async fn serve(config: ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    tokio::fs::create_dir_all(&config.temp_dir).await?;
    let bind_host = config.host.clone();
    let port = config.port;

    info!(
        "starting with {} workers, max {} concurrent requests, {}s process timeout",
        config.max_workers,
        config.max_concurrent_requests,
        config.request_timeout.as_secs()
    );
    if !config.health_check_enabled {
        info!("health endpoint disabled");
    }

    spawn_temp_reaper(ReaperConfig {
        dir: config.temp_dir.clone(),
        interval: config.cleanup_interval,
        max_age: ARTIFACT_MAX_AGE,
    });

    let app = build_app(SharedState::new(config));
    let listener = tokio::net::TcpListener::bind((bind_host.as_str(), port)).await?;
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("could not listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested; draining in-flight requests");
}

fn wants_version_flag() -> bool {
    env::args()
        .skip(1)
        .any(|arg| matches!(arg.as_str(), "-V" | "--version"))
}

fn binary_version_text() -> String {
    format!(
        "{} {} ({})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("FSK_BUILD_DESCRIBE")
    )
}
