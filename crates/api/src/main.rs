use anyhow::Context;

use tethercap_api::{app, config::ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tethercap_observability::init();

    let config = ServerConfig::from_env();
    let controller = app::build_controller(&config);
    let router = app::build_router(controller.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        max_frames_per_job = config.jobs.limits.max_frames_per_job,
        "listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    controller.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
