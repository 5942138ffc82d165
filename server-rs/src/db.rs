use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::Config;

/// Connects and brings the schema up to date.
pub async fn create_pool(config: &Config) -> Result<PgPool, sqlx::Error> {
    let url = config.database_url();
    let pool = PgPoolOptions::new()
        .min_connections(config.db.pool_min)
        .max_connections(config.db.pool_max)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!(
        pool_min = config.db.pool_min,
        pool_max = config.db.pool_max,
        "database ready"
    );
    Ok(pool)
}
