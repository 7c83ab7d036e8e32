use chrono::NaiveDate;
use rocket::State;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use super::double_option;
use crate::auth::{Permission, User};
use crate::db::{
    TrainerPatch, delete_trainer, get_trainer_details, list_trainers, require_trainer_for_user,
    update_trainer,
};
use crate::error::AppError;
use crate::models::{Trainer, TrainerDetails};
use crate::validation::JsonValidateExt;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TrainerUpdateRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Specialty cannot be empty"))]
    pub specialty: Option<String>,
    #[validate(range(min = 0, max = 80, message = "Experience must be between 0 and 80 years"))]
    #[serde(default, deserialize_with = "double_option")]
    pub experience_years: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub gender: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub date_of_birth: Option<Option<NaiveDate>>,
}

impl From<TrainerUpdateRequest> for TrainerPatch {
    fn from(request: TrainerUpdateRequest) -> Self {
        Self {
            name: request.name,
            specialty: request.specialty,
            experience_years: request.experience_years,
            gender: request.gender,
            date_of_birth: request.date_of_birth,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainerDeletedResponse {
    pub message: String,
    pub sessions_removed: u64,
}

#[get("/trainers")]
pub async fn api_get_trainers(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<TrainerDetails>>, AppError> {
    user.require_permission(Permission::ViewCatalog)?;
    Ok(Json(list_trainers(db).await?))
}

#[get("/trainers/me")]
pub async fn api_get_own_trainer(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<TrainerDetails>, AppError> {
    let trainer = require_trainer_for_user(db, user.id).await?;
    Ok(Json(get_trainer_details(db, trainer.id).await?))
}

#[put("/trainers/me", data = "<request>")]
pub async fn api_update_own_trainer(
    request: Json<TrainerUpdateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Trainer>, AppError> {
    user.require_permission(Permission::EditOwnProfile)?;
    let request = request.validate_custom()?;
    let trainer = require_trainer_for_user(db, user.id).await?;

    Ok(Json(update_trainer(db, trainer.id, request.into()).await?))
}

#[get("/trainers/<id>")]
pub async fn api_get_trainer(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<TrainerDetails>, AppError> {
    user.require_permission(Permission::ViewCatalog)?;
    Ok(Json(get_trainer_details(db, id).await?))
}

#[put("/trainers/<id>", data = "<request>")]
pub async fn api_update_trainer(
    id: i64,
    request: Json<TrainerUpdateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Trainer>, AppError> {
    user.require_permission(Permission::ManageTrainers)?;
    let request = request.validate_custom()?;

    Ok(Json(update_trainer(db, id, request.into()).await?))
}

#[delete("/trainers/<id>")]
pub async fn api_delete_trainer(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<TrainerDeletedResponse>, AppError> {
    user.require_permission(Permission::ManageTrainers)?;
    let sessions_removed = delete_trainer(db, id).await?;

    Ok(Json(TrainerDeletedResponse {
        message: "Trainer deleted".to_string(),
        sessions_removed,
    }))
}
