/// SQLite store for users, bookings and logbook entries
///
/// The schema lives in `migrations/` and is compiled into the binary.
use crate::{
    config::DatabaseConfig,
    error::{AppError, AppResult},
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::time::Duration;

/// Writers wait this long on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open the file-backed store named by `config`, bring its schema up to
/// date and confirm it answers.
pub async fn open(config: &DatabaseConfig) -> AppResult<SqlitePool> {
    if let Some(dir) = config.path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir).await?;
    }

    let options = connect_options(SqliteConnectOptions::new().filename(&config.path))
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    migrate(&pool).await?;
    ping(&pool).await?;

    tracing::info!(
        "Opened logbook database at {} ({} connections max)",
        config.path.display(),
        config.max_connections
    );

    Ok(pool)
}

/// Single-connection in-memory store with the schema applied.
///
/// An in-memory SQLite database lives and dies with its connection, so
/// the pool is pinned to one connection that is never recycled.
pub async fn connect_in_memory() -> AppResult<SqlitePool> {
    let options = connect_options("sqlite::memory:".parse::<SqliteConnectOptions>()?);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    migrate(&pool).await?;

    Ok(pool)
}

/// `logbook_entries.booking_id` references `bookings`; enforced per connection
fn connect_options(base: SqliteConnectOptions) -> SqliteConnectOptions {
    base.foreign_keys(true)
}

/// Apply pending schema migrations
async fn migrate(pool: &SqlitePool) -> AppResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| AppError::Internal(format!("Schema migration failed: {}", e)))
}

/// Round-trip a trivial query
async fn ping(pool: &SqlitePool) -> AppResult<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
