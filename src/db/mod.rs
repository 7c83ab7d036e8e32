pub mod members;
pub mod notifications;
pub mod packages;
pub mod ratings;
pub mod sessions;
pub mod trainers;
pub mod users;

pub use members::*;
pub use notifications::*;
pub use packages::*;
pub use ratings::*;
pub use sessions::*;
pub use trainers::*;
pub use users::*;

use std::str::FromStr;

use anyhow::Context;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

/// Opens the pool with foreign keys enforced; the schema relies on cascades.
pub async fn connect_pool(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("Invalid DATABASE_URL: {}", database_url))?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("Failed to connect to SQLite database")
}
