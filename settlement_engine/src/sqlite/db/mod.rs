pub mod auth;
pub mod orders;
pub mod releases;
pub mod returns;
pub mod stores;
pub mod wallets;
pub mod withdrawals;

use std::time::Duration;

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub const SQLITE_DB_URL: &str = "sqlite://data/settlement_ledger.db";

pub fn db_url() -> String {
    std::env::var("MSL_DATABASE_URL").unwrap_or_else(|_| {
        info!("MSL_DATABASE_URL not set. Using the default, {SQLITE_DB_URL}");
        SQLITE_DB_URL.to_string()
    })
}

/// Connects with WAL journalling and a busy timeout so concurrent writers queue instead of
/// failing immediately. Contended statements that still time out surface as BUSY errors, which
/// the error types upstream translate into retryable concurrency conflicts.
pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = url
        .parse::<SqliteConnectOptions>()?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqlxError> {
    sqlx::migrate!("./src/sqlite/migrations").run(pool).await?;
    Ok(())
}
