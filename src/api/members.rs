use chrono::NaiveDate;
use rocket::State;
use rocket::serde::json::Json;
use serde::Deserialize;
use sqlx::{Pool, Sqlite};
use validator::Validate;

use super::{MessageResponse, double_option};
use crate::auth::{Permission, User};
use crate::db::{
    MemberPatch, approve_package, delete_member, get_member_details,
    get_member_details_by_user_id, list_members, reject_package, request_package,
    require_member_for_user, update_member,
};
use crate::env::AppConfig;
use crate::error::AppError;
use crate::models::{Level, Member, MemberDetails};
use crate::validation::JsonValidateExt;

/// What a member may change about themselves.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OwnMemberUpdateRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: Option<String>,
    pub level: Option<Level>,
    #[serde(default, deserialize_with = "double_option")]
    pub gender: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub date_of_birth: Option<Option<NaiveDate>>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MemberUpdateRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: Option<String>,
    pub level: Option<Level>,
    #[serde(default, deserialize_with = "double_option")]
    pub gender: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub date_of_birth: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "double_option")]
    pub package_id: Option<Option<i64>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRequest {
    pub package_id: i64,
}

#[get("/members")]
pub async fn api_get_members(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<MemberDetails>>, AppError> {
    user.require_permission(Permission::ViewMembers)?;
    Ok(Json(list_members(db).await?))
}

#[get("/members/me")]
pub async fn api_get_own_member(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MemberDetails>, AppError> {
    user.require_permission(Permission::ViewOwnProfile)?;

    get_member_details_by_user_id(db, user.id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::Authorization("This account has no member profile".to_string()))
}

#[put("/members/me", data = "<request>")]
pub async fn api_update_own_member(
    request: Json<OwnMemberUpdateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<Member>, AppError> {
    user.require_permission(Permission::EditOwnProfile)?;
    let request = request.validate_custom()?;
    let member = require_member_for_user(db, user.id).await?;

    let patch = MemberPatch {
        name: request.name,
        level: request.level,
        gender: request.gender,
        date_of_birth: request.date_of_birth,
        ..Default::default()
    };

    Ok(Json(
        update_member(db, member.id, patch, config.membership_term_days).await?,
    ))
}

#[post("/members/me/package-request", data = "<request>")]
pub async fn api_request_package(
    request: Json<PackageRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Member>, AppError> {
    user.require_permission(Permission::RequestPackage)?;
    let member = require_member_for_user(db, user.id).await?;

    Ok(Json(request_package(db, member.id, request.package_id).await?))
}

#[get("/members/<id>")]
pub async fn api_get_member(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MemberDetails>, AppError> {
    let details = get_member_details(db, id).await?;

    if details.member.user_id != user.id {
        user.require_permission(Permission::ViewMembers)?;
    }

    Ok(Json(details))
}

#[put("/members/<id>", data = "<request>")]
pub async fn api_update_member(
    id: i64,
    request: Json<MemberUpdateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<Member>, AppError> {
    user.require_permission(Permission::ManageMembers)?;
    let request = request.validate_custom()?;

    let patch = MemberPatch {
        name: request.name,
        level: request.level,
        gender: request.gender,
        date_of_birth: request.date_of_birth,
        package_id: request.package_id,
        is_active: request.is_active,
    };

    Ok(Json(
        update_member(db, id, patch, config.membership_term_days).await?,
    ))
}

#[delete("/members/<id>")]
pub async fn api_delete_member(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_permission(Permission::ManageMembers)?;
    delete_member(db, id).await?;
    Ok(MessageResponse::json("Member deleted"))
}

#[put("/members/<id>/approve-package")]
pub async fn api_approve_package(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Json<Member>, AppError> {
    user.require_permission(Permission::ManageMembers)?;
    Ok(Json(
        approve_package(db, id, config.membership_term_days).await?,
    ))
}

#[put("/members/<id>/reject-package")]
pub async fn api_reject_package(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Member>, AppError> {
    user.require_permission(Permission::ManageMembers)?;
    Ok(Json(reject_package(db, id).await?))
}
