//! quota-rs server
//!
//! Serves the quota HTTP API backed by SQLite.

use quota_rs::api::{ApiServer, AppState, JwtConfig};
use quota_rs::config::Config;
use quota_rs::quota::QuotaService;
use quota_rs::{db, logging};
use std::path::Path;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref().map(Path::new))?;

    logging::init(&config.logging);

    info!("Starting quota-rs v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Configuration loaded from {}", path),
        None => info!("No config file specified, using defaults and environment"),
    }
    if config.auth.jwt_secret == "change-me-in-production" {
        warn!("Using the default JWT secret, set QUOTA__AUTH__JWT_SECRET");
    }

    let pool = db::connect(&config.database).await?;
    db::init_schema(&pool).await?;

    let state = AppState {
        quota: QuotaService::new(pool),
        jwt_config: JwtConfig::new(config.auth.jwt_secret.clone(), config.auth.token_ttl_hours),
    };

    let server = ApiServer::new(state, config.server.listen_addr.clone());
    server.run().await?;

    Ok(())
}
