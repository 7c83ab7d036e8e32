use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::Deserialize;
use sqlx::{Pool, Sqlite};
use validator::Validate;

use super::MessageResponse;
use super::auth::{ProfileResponse, RegisterRequest, RegisterResponse, profile_for};
use crate::auth::{AccountStatus, Permission, Role, User};
use crate::db::{
    NewAccount, approve_user, authenticate_user, create_account, get_user, get_users,
    reject_user, soft_delete_user, update_user_password,
};
use crate::env::AppConfig;
use crate::error::AppError;
use crate::validation::JsonValidateExt;

#[derive(FromForm)]
pub struct UsersQueryParams {
    status: Option<String>,
    role: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub new_password: String,
}

#[get("/users?<params..>")]
pub async fn api_get_users(
    params: UsersQueryParams,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<User>>, AppError> {
    user.require_permission(Permission::ManageUsers)?;

    let status = params.status.as_deref().map(AccountStatus::parse).transpose()?;
    let role = params
        .role
        .as_deref()
        .map(|r| {
            Role::parse(r).map_err(|_| AppError::BadRequest(format!("Unknown role: {}", r)))
        })
        .transpose()?;

    Ok(Json(get_users(db, status, role).await?))
}

/// Accounts created by an administrator skip the approval queue.
#[post("/users", data = "<request>")]
pub async fn api_create_user(
    request: Json<RegisterRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Custom<Json<RegisterResponse>>, AppError> {
    user.require_permission(Permission::ManageUsers)?;

    let request = request.into_inner();
    request.validate_all()?;

    let created = create_account(
        db,
        NewAccount {
            email: request.email,
            password: request.password,
            status: AccountStatus::Approved,
            profile: request.account.into_profile(),
        },
        config.membership_term_days,
    )
    .await?;

    Ok(Custom(
        Status::Created,
        Json(RegisterResponse {
            message: "Account created".to_string(),
            user: get_user(db, created.user_id).await?,
            profile_id: created.profile_id,
        }),
    ))
}

#[get("/users/me")]
pub async fn api_get_own_account(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<ProfileResponse>, AppError> {
    Ok(Json(profile_for(db, user).await?))
}

#[put("/users/me/password", data = "<request>")]
pub async fn api_change_password(
    request: Json<ChangePasswordRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, AppError> {
    let request = request.validate_custom()?;

    if authenticate_user(db, &user.email, &request.current_password)
        .await?
        .is_none()
    {
        return Err(AppError::Authentication(
            "Current password is incorrect".to_string(),
        ));
    }

    update_user_password(db, user.id, &request.new_password).await?;
    Ok(MessageResponse::json("Password updated"))
}

#[get("/users/<id>")]
pub async fn api_get_user(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<User>, AppError> {
    if user.id != id {
        user.require_permission(Permission::ManageUsers)?;
    }

    Ok(Json(get_user(db, id).await?))
}

#[put("/users/<id>/approve")]
pub async fn api_approve_user(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<User>, AppError> {
    user.require_permission(Permission::ManageUsers)?;
    Ok(Json(approve_user(db, id).await?))
}

#[put("/users/<id>/reject")]
pub async fn api_reject_user(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<User>, AppError> {
    user.require_permission(Permission::ManageUsers)?;
    Ok(Json(reject_user(db, id).await?))
}

#[delete("/users/<id>")]
pub async fn api_delete_user(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_permission(Permission::ManageUsers)?;

    if user.id == id {
        return Err(AppError::BadRequest(
            "You cannot delete your own account".to_string(),
        ));
    }

    soft_delete_user(db, id).await?;
    Ok(MessageResponse::json("Account deleted"))
}
