use std::time::Duration;

use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use crate::error::Result;

pub async fn db_connect(url: &str) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(url.to_string());

    // In-memory SQLite lives inside a single connection.
    if url.contains(":memory:") {
        options.max_connections(1);
        options.min_connections(1);
    } else {
        options.max_connections(8);
        options.min_connections(1);
    }
    options.connect_timeout(Duration::from_secs(5));
    options.acquire_timeout(Duration::from_secs(5));
    options.idle_timeout(Duration::from_secs(300));
    options.sqlx_logging(false);

    Ok(Database::connect(options).await?)
}

/// Connect and bring the schema up to date.
pub async fn db_connect_and_migrate(url: &str) -> Result<DatabaseConnection> {
    let db = db_connect(url).await?;
    Migrator::up(&db, None).await?;
    tracing::debug!("database migrations applied");
    Ok(db)
}
