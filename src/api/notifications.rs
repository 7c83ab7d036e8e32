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
    create_notification, delete_all_notifications, delete_notification,
    get_notifications_for_member, get_unread_count, mark_all_as_read, mark_as_read,
    require_member_for_user,
};
use crate::error::AppError;
use crate::models::Notification;
use crate::validation::JsonValidateExt;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendNotificationRequest {
    pub member_id: i64,
    #[validate(length(min = 1, max = 1000, message = "Message must be between 1 and 1000 characters"))]
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkUpdateResponse {
    pub message: String,
    pub affected: u64,
}

// Every route below is scoped to the caller's own member profile.

#[get("/notifications")]
pub async fn api_get_notifications(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let member = require_member_for_user(db, user.id).await?;
    Ok(Json(get_notifications_for_member(db, member.id).await?))
}

#[get("/notifications/unread-count")]
pub async fn api_get_unread_count(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<UnreadCountResponse>, AppError> {
    let member = require_member_for_user(db, user.id).await?;
    Ok(Json(UnreadCountResponse {
        count: get_unread_count(db, member.id).await?,
    }))
}

#[put("/notifications/<id>/read")]
pub async fn api_mark_as_read(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Notification>, AppError> {
    let member = require_member_for_user(db, user.id).await?;
    Ok(Json(mark_as_read(db, member.id, id).await?))
}

#[put("/notifications/read-all")]
pub async fn api_mark_all_as_read(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<BulkUpdateResponse>, AppError> {
    let member = require_member_for_user(db, user.id).await?;
    let affected = mark_all_as_read(db, member.id).await?;

    Ok(Json(BulkUpdateResponse {
        message: "Notifications marked as read".to_string(),
        affected,
    }))
}

#[delete("/notifications/<id>")]
pub async fn api_delete_notification(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, AppError> {
    let member = require_member_for_user(db, user.id).await?;
    delete_notification(db, member.id, id).await?;
    Ok(MessageResponse::json("Notification deleted"))
}

#[delete("/notifications")]
pub async fn api_delete_all_notifications(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<BulkUpdateResponse>, AppError> {
    let member = require_member_for_user(db, user.id).await?;
    let affected = delete_all_notifications(db, member.id).await?;

    Ok(Json(BulkUpdateResponse {
        message: "Notifications deleted".to_string(),
        affected,
    }))
}

#[post("/notifications", data = "<request>")]
pub async fn api_send_notification(
    request: Json<SendNotificationRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<Notification>>, AppError> {
    user.require_permission(Permission::SendNotifications)?;
    let request = request.validate_custom()?;

    let notification = create_notification(db, request.member_id, &request.message).await?;
    Ok(Custom(Status::Created, Json(notification)))
}
