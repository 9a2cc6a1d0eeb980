//! Persistence layer: SeaORM entities, schema bootstrap and the services that
//! implement the tag and VM registries on top of them.

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use tracing::info;

pub mod entities;
pub mod enums;
pub mod schema;
pub mod services;

/// Opens a connection pool for `database_url` (PostgreSQL or SQLite).
///
/// An in-memory SQLite database only lives as long as its connection, so the
/// pool is pinned to a single connection in that case.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(database_url.to_owned());
    opt.max_connections(max_connections).sqlx_logging(false);

    if database_url.starts_with("sqlite::memory:") {
        opt.max_connections(1).min_connections(1);
    }

    let db = Database::connect(opt).await?;
    info!(backend = ?db.get_database_backend(), "Database connection established.");
    Ok(db)
}
