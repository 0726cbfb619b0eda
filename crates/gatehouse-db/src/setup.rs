//! Connection setup and logging bootstrap.
//!
//! Entry points call these with resolved paths; nothing here knows about
//! gateways or schemas.

use anyhow::Result;
use sqlx::{SqlitePool, sqlite::SqliteConnectOptions};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Open (creating if needed) the `SQLite` database at `db_path`.
///
/// The parent directory is created first. Tables are not created here:
/// gateways create their own through the provider at init.
///
/// # Example
///
/// ```rust,no_run
/// use gatehouse_db::setup::connect_sqlite;
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// let pool = connect_sqlite(Path::new("/var/lib/gatehouse/settings.db")).await?;
/// # Ok(())
/// # }
/// ```
pub async fn connect_sqlite(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let pool = SqlitePool::connect_with(
        SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true),
    )
    .await?;

    tracing::info!(path = %db_path.display(), "Opened SQLite settings database");
    Ok(pool)
}

/// An in-memory `SQLite` pool.
///
/// Limited to one connection so every query sees the same database.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    Ok(pool)
}

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Does nothing if a global subscriber is already set, so tests may call
/// it repeatedly.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
