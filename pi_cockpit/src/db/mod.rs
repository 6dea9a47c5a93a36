//! Database module providing SQLite connection pooling and schema bootstrap.
//!
//! Credentials, access requests and system settings live in one SQLite file.
//! The schema is created idempotently on startup, so a fresh device needs no
//! migration step.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

pub mod config;

pub use config::DatabaseConfig;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    salt TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS user_requests (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    salt TEXT NOT NULL,
    name TEXT NOT NULL,
    requested_at TEXT NOT NULL,
    status TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_user_requests_email_status
    ON user_requests (email, status);
UPDATE user_requests SET status = 'rejected'
    WHERE status = 'pending'
      AND rowid NOT IN (
          SELECT MIN(rowid) FROM user_requests WHERE status = 'pending' GROUP BY email
      );
CREATE UNIQUE INDEX IF NOT EXISTS idx_user_requests_pending_email
    ON user_requests (email) WHERE status = 'pending';
CREATE TABLE IF NOT EXISTS system_settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the connection pool and make sure the schema exists
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use pi_cockpit::db::{Database, DatabaseConfig};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), sqlx::Error> {
    ///     let db = Database::new(&DatabaseConfig::from_env()).await?;
    ///     db.health_check().await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs));

        // An in-memory database disappears with its last connection.
        if config.is_in_memory() {
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options.connect_with(options).await?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Fresh in-memory database with the schema applied
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        Self::new(&DatabaseConfig::in_memory()).await
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;

        let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        if user_count == 0 {
            log::info!("Database initialized (empty)");
        } else {
            log::info!("Database initialized with {} user(s)", user_count);
        }
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check if the database connection is healthy
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the database connection pool
    pub async fn close(self) {
        self.pool.close().await;
    }
}
