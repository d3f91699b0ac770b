//! Database configuration module.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with
//! `Schema::create_table_from_entity`, so the schema always matches the Rust
//! structs without hand-written SQL.

use crate::entities::{SystemInfo, User};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr, Schema};
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

/// Default database location when `DATABASE_URL` is not set.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/local_llm.sqlite?mode=rwc";

const CONNECT_ATTEMPTS: u32 = 10;
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Establishes a connection to the database at `database_url`.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    Database::connect(database_url).await.map_err(Into::into)
}

/// Directory that must exist before `SQLite` can create the file at `database_url`.
fn sqlite_parent_dir(database_url: &str) -> Option<&Path> {
    let path = database_url.strip_prefix("sqlite://")?;
    let path = path.split('?').next().unwrap_or(path);
    Path::new(path)
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
}

/// Connects to the database, retrying connection-level failures.
///
/// Makes up to ten attempts two seconds apart. Any error that is not a
/// connection failure is returned immediately.
pub async fn connect_with_retry(database_url: &str) -> Result<DatabaseConnection> {
    if let Some(dir) = sqlite_parent_dir(database_url) {
        tokio::fs::create_dir_all(dir).await?;
    }

    let mut attempt = 1;
    loop {
        match Database::connect(database_url).await {
            Ok(db) => return Ok(db),
            Err(DbErr::Conn(e)) if attempt < CONNECT_ATTEMPTS => {
                warn!(
                    "Database connection failed ({e}). Retrying in {}s... ({attempt}/{CONNECT_ATTEMPTS})",
                    CONNECT_RETRY_DELAY.as_secs()
                );
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                attempt += 1;
            }
            Err(e) => {
                error!("Could not connect to the database at {database_url}: {e}");
                return Err(e.into());
            }
        }
    }
}

/// Creates all necessary database tables if they do not already exist.
///
/// `users` holds account records and `system_info` holds the key/value
/// metadata used by the update subsystem.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut user_table = schema.create_table_from_entity(User);
    user_table.if_not_exists();
    let mut system_info_table = schema.create_table_from_entity(SystemInfo);
    system_info_table.if_not_exists();

    db.execute(builder.build(&user_table)).await?;
    db.execute(builder.build(&system_info_table)).await?;

    info!("Database tables ensured.");
    Ok(())
}
