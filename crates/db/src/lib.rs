//! Persistence layer for the Tavola notification pipeline.
//!
//! Exposes a [`DbPool`] alias, connection helpers, row models under
//! [`models`] and zero-sized repository structs under [`repositories`].
//! Schema lives in `migrations/` and is applied with [`migrate`].

pub mod models;
pub mod repositories;

/// Shared PostgreSQL connection pool.
pub type DbPool = sqlx::PgPool;

/// Connect to PostgreSQL using `DATABASE_URL`.
pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Apply all pending migrations from `crates/db/migrations`.
pub async fn migrate(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Cheap liveness probe used by the worker on startup.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
