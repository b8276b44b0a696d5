use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{info, warn};

use bridge_audit::api::{self, AppState};
use bridge_audit::audit::{AuditLogger, Secp256k1Signer, Signer};
use bridge_audit::config::AppConfig;
use bridge_audit::database::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    // Initialize tracing
    config.logging.init()?;
    info!("Starting bridge audit service");

    // Initialize database
    let database =
        Database::with_max_connections(&config.database.url, config.database.max_connections)
            .await
            .context("Failed to connect to audit store")?;
    info!("Database connected");

    // Run migrations
    database.run_migrations().await?;
    info!("Database migrations completed");

    // Load the signing authority
    let signer = load_signer(&config)?;

    let logger = AuditLogger::new(database, signer)
        .with_max_append_retries(config.chain.max_append_retries)
        .with_signature_checks(config.signing.verify_signatures);
    info!(
        entries = logger.entry_count().await?,
        "Audit logger initialized"
    );

    let addr = config.bind_address();
    let app = api::router(AppState::new(config, logger));

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn load_signer(config: &AppConfig) -> anyhow::Result<Arc<dyn Signer>> {
    if let Some(path) = &config.signing.key_path {
        let signer = Secp256k1Signer::from_key_file(path)?;
        info!(public_key = %signer.public_key_hex(), "Signing key loaded");
        return Ok(Arc::new(signer));
    }

    if !config.signing.allow_ephemeral_key {
        bail!("signing.key_path is not set and ephemeral keys are not allowed");
    }

    let signer = Secp256k1Signer::generate();
    warn!(
        public_key = %signer.public_key_hex(),
        "Using an ephemeral signing key; signatures will not verify after restart"
    );
    Ok(Arc::new(signer))
}
