use anyhow::Result;
use sqlx::PgPool;

use pulse_pricing::db::Database;

pub async fn execute(pool: PgPool) -> Result<()> {
    Database { pool }.run_migrations().await?;

    println!("Database migrations completed successfully");
    Ok(())
}
