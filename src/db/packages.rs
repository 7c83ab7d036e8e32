use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::models::Package;

#[derive(Debug, Clone)]
pub struct NewPackage {
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub sessions_per_month: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PackagePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub sessions_per_month: Option<i64>,
    pub is_active: Option<bool>,
}

#[instrument]
pub async fn get_package(pool: &Pool<Sqlite>, id: i64) -> Result<Package, AppError> {
    info!("Fetching package");
    sqlx::query_as::<_, Package>("SELECT * FROM packages WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Package", id))
}

#[instrument]
pub async fn list_packages(pool: &Pool<Sqlite>, only_active: bool) -> Result<Vec<Package>, AppError> {
    info!(only_active = %only_active, "Listing packages");
    let query = if only_active {
        "SELECT * FROM packages WHERE is_active = TRUE ORDER BY price, name"
    } else {
        "SELECT * FROM packages ORDER BY price, name"
    };

    let rows = sqlx::query_as::<_, Package>(query).fetch_all(pool).await?;

    Ok(rows)
}

#[instrument]
pub async fn create_package(pool: &Pool<Sqlite>, package: NewPackage) -> Result<Package, AppError> {
    info!("Creating package");
    let res = sqlx::query(
        "INSERT INTO packages (name, description, price, sessions_per_month, is_active)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&package.name)
    .bind(&package.description)
    .bind(package.price)
    .bind(package.sessions_per_month)
    .bind(package.is_active)
    .execute(pool)
    .await?;

    get_package(pool, res.last_insert_rowid()).await
}

#[instrument]
pub async fn update_package(
    pool: &Pool<Sqlite>,
    id: i64,
    patch: PackagePatch,
) -> Result<Package, AppError> {
    info!("Updating package");
    let current = get_package(pool, id).await?;

    sqlx::query(
        "UPDATE packages
         SET name = ?, description = ?, price = ?, sessions_per_month = ?, is_active = ?
         WHERE id = ?",
    )
    .bind(patch.name.unwrap_or(current.name))
    .bind(patch.description.or(current.description))
    .bind(patch.price.unwrap_or(current.price))
    .bind(patch.sessions_per_month.unwrap_or(current.sessions_per_month))
    .bind(patch.is_active.unwrap_or(current.is_active))
    .bind(id)
    .execute(pool)
    .await?;

    get_package(pool, id).await
}

/// Deletes a package. Members holding it lose the package and with it their
/// active status; pending requests for it are dropped.
#[instrument]
pub async fn delete_package(pool: &Pool<Sqlite>, id: i64) -> Result<u64, AppError> {
    info!("Deleting package");
    get_package(pool, id).await?;

    let mut tx = pool.begin().await?;

    let affected = sqlx::query(
        "UPDATE members SET package_id = NULL, is_active = FALSE, package_expires_at = NULL
         WHERE package_id = ?",
    )
    .bind(id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE members SET pending_package_id = NULL WHERE pending_package_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM packages WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(members = affected.rows_affected(), "Package deleted");
    Ok(affected.rows_affected())
}
