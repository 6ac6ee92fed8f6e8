use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::config::DatabaseConfig;

const CREATE_USER_DETAILS: &str =
    include_str!("../../migrations/20240601000000_create_user_details.sql");

/// Bounded Postgres pool shared by every batch processor.
#[derive(Debug, Clone)]
pub struct DatabaseConnection {
    pool: PgPool,
}

impl DatabaseConnection {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(&config.url)
            .await?;

        info!(
            max_connections = config.max_connections,
            "💾 DATABASE: Connection pool established"
        );

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `user_details` table when it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(CREATE_USER_DETAILS).execute(&self.pool).await?;
        info!("💾 DATABASE: user_details schema ready");
        Ok(())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
