use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

/// Registered API key of a project, as managed by the project admin surface.
#[async_trait]
pub trait ProjectKeyStore: Send + Sync {
    async fn api_key(&self, project_id: &str) -> Result<Option<String>, sqlx::Error>;
}

pub async fn connect_postgres(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await
        .context("connecting to the project database")
}

pub struct PgProjectKeyStore {
    pool: PgPool,
}

impl PgProjectKeyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectKeyStore for PgProjectKeyStore {
    async fn api_key(&self, project_id: &str) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>("SELECT api_key FROM projects WHERE id = $1")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await
    }
}
