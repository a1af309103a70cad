//! Relational store: connection pool, schema migrations, and the record
//! indexer (spec §3.3, §5). Grounded in the teacher's
//! `database::DatabaseManager`.

pub mod indexer;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::config::{mask_database_url, DatabaseConfig};

pub struct EngineStore {
    pool: PgPool,
}

impl EngineStore {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        info!(
            url = %mask_database_url(&config.database_url),
            "connecting to bibliographic store"
        );

        let mut pool_options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connection_timeout);

        if let Some(idle_timeout) = config.idle_timeout {
            pool_options = pool_options.idle_timeout(idle_timeout);
        }
        if let Some(max_lifetime) = config.max_lifetime {
            pool_options = pool_options.max_lifetime(max_lifetime);
        }

        let pool = pool_options
            .connect(&config.database_url)
            .await
            .map_err(|e| {
                warn!(error = %e, "failed to connect to bibliographic store");
                e
            })?;

        info!("bibliographic store connection pool ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("running store migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    pub fn connection_stats(&self) -> ConnectionStats {
        ConnectionStats {
            size: self.pool.size(),
            num_idle: self.pool.num_idle() as u32,
        }
    }

    pub async fn close(self) {
        info!("closing bibliographic store connection pool");
        self.pool.close().await;
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionStats {
    pub size: u32,
    pub num_idle: u32,
}

impl std::fmt::Display for ConnectionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pool size: {}, idle: {}", self.size, self.num_idle)
    }
}
