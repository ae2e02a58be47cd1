use std::net::SocketAddr;

use theday_web::{config::ServerConfig, state::AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "theday_web=debug,theday_core=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    let port = config.port;
    let state = AppState::new(config);

    // Connect eagerly so a bad database URL fails at startup
    state.storage().await?;

    let app = theday_web::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Starting theday on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
