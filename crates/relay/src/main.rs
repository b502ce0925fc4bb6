use std::sync::Arc;

use anyhow::Context;
use relay::{build_router, load_settings, RelayState};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let config = settings.validate().map_err(|error| {
        error!(%error, "relay configuration is incomplete; set API_KEY and HOST");
        error
    })?;

    let state = RelayState::new(reqwest::Client::new(), &config);
    let app = build_router(Arc::new(state));

    info!(addr = %config.bind_addr, directory = %config.directory_url, "relay listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}
