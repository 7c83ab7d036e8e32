use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use super::MessageResponse;
use crate::auth::{Permission, User};
use crate::db::{
    average_rating, create_rating, delete_rating, get_member_rating, get_rating,
    get_ratings_for_trainer, get_trainer, require_member_for_user, update_rating,
};
use crate::error::AppError;
use crate::models::{Rating, RatingWithMember};
use crate::validation::JsonValidateExt;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RatingRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i64,
    #[validate(length(max = 1000, message = "Comment cannot exceed 1000 characters"))]
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AverageRatingResponse {
    pub trainer_id: i64,
    /// `0` when the trainer has no ratings; check `count`.
    pub average: f64,
    pub count: i64,
}

#[get("/trainers/<trainer_id>/ratings")]
pub async fn api_get_ratings(
    trainer_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<RatingWithMember>>, AppError> {
    user.require_permission(Permission::ViewCatalog)?;
    Ok(Json(get_ratings_for_trainer(db, trainer_id).await?))
}

#[get("/trainers/<trainer_id>/ratings/average")]
pub async fn api_get_average_rating(
    trainer_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<AverageRatingResponse>, AppError> {
    user.require_permission(Permission::ViewCatalog)?;
    let summary = average_rating(db, trainer_id).await?;

    Ok(Json(AverageRatingResponse {
        trainer_id,
        average: summary.average.unwrap_or(0.0),
        count: summary.count,
    }))
}

/// `null` when the caller has not rated this trainer yet.
#[get("/trainers/<trainer_id>/ratings/my-rating")]
pub async fn api_get_my_rating(
    trainer_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Option<Rating>>, AppError> {
    user.require_permission(Permission::RateTrainers)?;
    get_trainer(db, trainer_id).await?;
    let member = require_member_for_user(db, user.id).await?;

    Ok(Json(get_member_rating(db, trainer_id, member.id).await?))
}

#[post("/trainers/<trainer_id>/ratings", data = "<request>")]
pub async fn api_create_rating(
    trainer_id: i64,
    request: Json<RatingRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<Rating>>, AppError> {
    user.require_permission(Permission::RateTrainers)?;
    let request = request.validate_custom()?;
    let member = require_member_for_user(db, user.id).await?;

    let rating = create_rating(db, trainer_id, member.id, request.rating, request.comment).await?;
    Ok(Custom(Status::Created, Json(rating)))
}

#[put("/trainers/<trainer_id>/ratings", data = "<request>")]
pub async fn api_update_rating(
    trainer_id: i64,
    request: Json<RatingRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Rating>, AppError> {
    user.require_permission(Permission::RateTrainers)?;
    let request = request.validate_custom()?;
    let member = require_member_for_user(db, user.id).await?;

    Ok(Json(
        update_rating(db, trainer_id, member.id, request.rating, request.comment).await?,
    ))
}

#[delete("/trainers/<trainer_id>/ratings/<rating_id>")]
pub async fn api_delete_rating(
    trainer_id: i64,
    rating_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, AppError> {
    let rating = get_rating(db, rating_id).await?;

    if !user.is_admin() {
        let member = require_member_for_user(db, user.id).await?;
        if rating.member_id != member.id {
            return Err(AppError::Authorization(
                "You can only delete your own ratings".to_string(),
            ));
        }
    }

    delete_rating(db, trainer_id, rating_id).await?;
    Ok(MessageResponse::json("Rating deleted"))
}
