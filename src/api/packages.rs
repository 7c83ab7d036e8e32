use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use crate::auth::{Permission, User};
use crate::db::{
    NewPackage, PackagePatch, create_package, delete_package, get_package, list_packages,
    update_package,
};
use crate::error::AppError;
use crate::models::Package;
use crate::validation::JsonValidateExt;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PackageCreateRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(range(min = 0.0, message = "Price cannot be negative"))]
    pub price: f64,
    #[validate(range(min = 0, message = "Sessions per month cannot be negative"))]
    #[serde(default)]
    pub sessions_per_month: i64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PackageUpdateRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 0.0, message = "Price cannot be negative"))]
    pub price: Option<f64>,
    #[validate(range(min = 0, message = "Sessions per month cannot be negative"))]
    pub sessions_per_month: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDeletedResponse {
    pub message: String,
    pub members_affected: u64,
}

/// The catalog is public. Administrators also see withdrawn packages.
#[get("/packages")]
pub async fn api_get_packages(
    user: Option<User>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Package>>, AppError> {
    let show_all = user.is_some_and(|u| u.has_permission(Permission::ManagePackages));
    Ok(Json(list_packages(db, !show_all).await?))
}

#[get("/packages/<id>")]
pub async fn api_get_package(id: i64, db: &State<Pool<Sqlite>>) -> Result<Json<Package>, AppError> {
    Ok(Json(get_package(db, id).await?))
}

#[post("/packages", data = "<request>")]
pub async fn api_create_package(
    request: Json<PackageCreateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<Package>>, AppError> {
    user.require_permission(Permission::ManagePackages)?;
    let request = request.validate_custom()?;

    let package = create_package(
        db,
        NewPackage {
            name: request.name,
            description: request.description,
            price: request.price,
            sessions_per_month: request.sessions_per_month,
            is_active: request.is_active,
        },
    )
    .await?;

    Ok(Custom(Status::Created, Json(package)))
}

#[put("/packages/<id>", data = "<request>")]
pub async fn api_update_package(
    id: i64,
    request: Json<PackageUpdateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Package>, AppError> {
    user.require_permission(Permission::ManagePackages)?;
    let request = request.validate_custom()?;

    let patch = PackagePatch {
        name: request.name,
        description: request.description,
        price: request.price,
        sessions_per_month: request.sessions_per_month,
        is_active: request.is_active,
    };

    Ok(Json(update_package(db, id, patch).await?))
}

#[delete("/packages/<id>")]
pub async fn api_delete_package(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<PackageDeletedResponse>, AppError> {
    user.require_permission(Permission::ManagePackages)?;
    let members_affected = delete_package(db, id).await?;

    Ok(Json(PackageDeletedResponse {
        message: "Package deleted".to_string(),
        members_affected,
    }))
}
