/// YachtLife backend bootstrap
///
/// Loads configuration, sets up logging, migrates the database and warms
/// the Apple key cache. HTTP handlers mount on the resulting context.
use yachtlife::{config::AppConfig, telemetry, AppContext, AppResult};

#[tokio::main]
async fn main() -> AppResult<()> {
    let config = AppConfig::from_env()?;
    telemetry::init_tracing(&config.logging)?;

    tracing::info!("YachtLife backend v{} starting", env!("CARGO_PKG_VERSION"));

    let ctx = AppContext::new(config).await?;

    // Not fatal: verification fetches on demand if this fails
    if let Err(e) = ctx.apple_verifier.refresh_keys().await {
        tracing::warn!("Could not warm Apple key cache: {}", e);
    }

    tracing::info!(
        "Database ready at {}",
        ctx.config.database.path.display()
    );

    Ok(())
}
