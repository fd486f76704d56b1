use tmf_server::{bootstrap, build_router, config, observability};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    observability::init_tracing();

    let cfg = config::load()?;
    let addr = cfg.addr();

    let state = bootstrap::build_state(&cfg).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
