use companion_api::{build_app, AppState};
use companion_policy::{PolicyKind, ServiceConfig};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = ServiceConfig::from_env();
    let addr = cfg.listen_addr()?;
    let state = AppState::from_config(&cfg);

    info!(
        policy = PolicyKind::parse(cfg.policy.as_deref()).as_str(),
        model = %cfg.generative.model,
        endpoint = %cfg.generative.endpoint,
        feedback_log = %cfg.feedback_log_path().display(),
        "starting companion api"
    );

    let app = build_app(state.clone());
    let listener = TcpListener::bind(addr).await?;
    state.set_ready();
    info!(%addr, "companion api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
}
