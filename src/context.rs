/// Application context and dependency injection
use crate::{
    account::{AppleSignInService, SessionTokenIssuer, SqliteUserStore},
    apple::AppleTokenVerifier,
    config::AppConfig,
    db,
    error::AppResult,
    logbook::{LogbookService, SqliteLogbookStore},
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub db: SqlitePool,
    pub apple_verifier: Arc<AppleTokenVerifier>,
    pub sessions: Arc<SessionTokenIssuer>,
    pub users: Arc<SqliteUserStore>,
    pub sign_in: Arc<AppleSignInService>,
    pub logbook_store: Arc<SqliteLogbookStore>,
    pub logbook: Arc<LogbookService<SqliteLogbookStore>>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;

        let db = db::open(&config.database).await?;

        let apple_verifier = Arc::new(AppleTokenVerifier::from_config(&config.apple)?);
        Self::assemble(config, db, apple_verifier)
    }

    /// Wire services over an existing pool and verifier
    pub fn assemble(
        config: AppConfig,
        db: SqlitePool,
        apple_verifier: Arc<AppleTokenVerifier>,
    ) -> AppResult<Self> {
        let sessions = Arc::new(SessionTokenIssuer::from_config(&config.session));
        let users = Arc::new(SqliteUserStore::new(db.clone()));
        let sign_in = Arc::new(AppleSignInService::new(
            Arc::clone(&apple_verifier),
            users.clone(),
            Arc::clone(&sessions),
        ));

        let logbook_store = Arc::new(SqliteLogbookStore::new(db.clone()));
        let logbook = Arc::new(LogbookService::new(Arc::clone(&logbook_store)));

        tracing::info!(
            "Application context ready (Apple client {}, key cache TTL {}s)",
            apple_verifier.client_id(),
            apple_verifier.key_cache().ttl().num_seconds()
        );

        Ok(Self {
            config: Arc::new(config),
            db,
            apple_verifier,
            sessions,
            users,
            sign_in,
            logbook_store,
            logbook,
        })
    }
}
