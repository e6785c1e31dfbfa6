//! Postgres handle for the pgmq broker.
//!
//! pgmq runs inside Postgres, so the pool owned here is the broker
//! connection for the whole process.

pub mod pgmq;

use crate::broker::declare_queues;
use crate::config::Config;
use crate::error::{Error, Result};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Pool size. A process runs at most a handful of workers, and each one
/// holds a connection only for the length of a single pgmq call.
const MAX_CONNECTIONS: u32 = 10;

/// Broker handle. Acquired once at startup; [`Db::close`] releases it.
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Connect, enable pgmq, and declare the todo and done queues.
    ///
    /// Declaring is idempotent, so every process can call this on start
    /// whatever order they are launched in.
    pub async fn open(config: &Config) -> Result<Self> {
        let db = Self::connect(config.database_url.expose_secret()).await?;
        db.migrate().await?;
        declare_queues(&db, &[config.todo_queue.as_str(), config.done_queue.as_str()]).await?;
        Ok(db)
    }

    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Apply `migrations/`, which creates the pgmq extension.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Other(format!("migration failed: {e}")))
    }

    /// Fails if Postgres is unreachable.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close every pooled connection and wait for them to finish.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
