use chrono::NaiveDate;
use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use validator::Validate;

use super::{MessageResponse, TIME_PATTERN};
use crate::auth::{Permission, Role, User};
use crate::db::{
    NewSession, SessionFilter, SessionPatch, create_session, delete_session, get_registered_members,
    get_session, get_session_summary, list_sessions, register_member, require_member_for_user,
    require_trainer_for_user, unregister_member, update_session,
};
use crate::error::AppError;
use crate::models::{RegisteredMember, SessionRegistration, SessionSummary};
use crate::validation::JsonValidateExt;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    #[serde(flatten)]
    pub summary: SessionSummary,
    pub available_spots: i64,
    pub is_full: bool,
}

impl From<SessionSummary> for SessionResponse {
    fn from(summary: SessionSummary) -> Self {
        Self {
            available_spots: summary.available_spots(),
            is_full: summary.is_full(),
            summary,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdateResponse {
    pub session: SessionResponse,
    pub changes: Vec<String>,
    pub notified: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDeletedResponse {
    pub message: String,
    pub notified: usize,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreateRequest {
    pub date: NaiveDate,
    #[validate(regex(path = *TIME_PATTERN, message = "Time must be in HH:MM format"))]
    pub time: String,
    #[serde(rename = "type")]
    #[validate(length(min = 1, max = 50, message = "Session type must be between 1 and 50 characters"))]
    pub session_type: String,
    #[validate(range(min = 1, max = 500, message = "Capacity must be between 1 and 500"))]
    pub max_participants: i64,
    /// Required when an administrator creates a session; trainers always own
    /// the sessions they create.
    pub trainer_id: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SessionUpdateRequest {
    pub date: Option<NaiveDate>,
    #[validate(regex(path = *TIME_PATTERN, message = "Time must be in HH:MM format"))]
    pub time: Option<String>,
    #[serde(rename = "type")]
    #[validate(length(min = 1, max = 50, message = "Session type must be between 1 and 50 characters"))]
    pub session_type: Option<String>,
    #[validate(range(min = 1, max = 500, message = "Capacity must be between 1 and 500"))]
    pub max_participants: Option<i64>,
    pub trainer_id: Option<i64>,
}

#[derive(FromForm)]
pub struct SessionsQueryParams {
    #[field(name = "trainerId")]
    trainer_id: Option<i64>,
    date: Option<String>,
}

fn parse_date(value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        AppError::BadRequest(format!("Invalid date '{}', expected YYYY-MM-DD", value))
    })
}

/// Administrators manage every session; trainers only the ones they own.
async fn authorize_session_management(
    db: &Pool<Sqlite>,
    user: &User,
    trainer_id: i64,
) -> Result<(), AppError> {
    if user.has_permission(Permission::ManageAllSessions) {
        return Ok(());
    }
    user.require_permission(Permission::ManageOwnSessions)?;

    let trainer = require_trainer_for_user(db, user.id).await?;
    if trainer.id != trainer_id {
        tracing::warn!(user_id = %user.id, trainer_id = %trainer_id, "Trainer tried to manage another trainer's session");
        return Err(AppError::Authorization(
            "You can only manage your own sessions".to_string(),
        ));
    }
    Ok(())
}

async fn session_response(db: &Pool<Sqlite>, id: i64) -> Result<SessionResponse, AppError> {
    Ok(SessionResponse::from(get_session_summary(db, id).await?))
}

async fn insert_session(
    db: &Pool<Sqlite>,
    request: SessionCreateRequest,
    trainer_id: i64,
) -> Result<Custom<Json<SessionResponse>>, AppError> {
    let session = create_session(
        db,
        NewSession {
            date: request.date,
            time: request.time,
            session_type: request.session_type,
            max_participants: request.max_participants,
            trainer_id,
        },
    )
    .await?;

    Ok(Custom(
        Status::Created,
        Json(session_response(db, session.id).await?),
    ))
}

#[get("/sessions?<params..>")]
pub async fn api_get_sessions(
    params: SessionsQueryParams,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<SessionResponse>>, AppError> {
    user.require_permission(Permission::ViewCatalog)?;

    let filter = SessionFilter {
        trainer_id: params.trainer_id,
        date: params.date.as_deref().map(parse_date).transpose()?,
        member_id: None,
    };

    let sessions = list_sessions(db, filter).await?;
    Ok(Json(sessions.into_iter().map(SessionResponse::from).collect()))
}

/// A trainer's own sessions, or the sessions a member is registered to.
#[get("/sessions/me")]
pub async fn api_get_own_sessions(
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<SessionResponse>>, AppError> {
    let filter = match user.role {
        Role::Trainer => SessionFilter {
            trainer_id: Some(require_trainer_for_user(db, user.id).await?.id),
            ..Default::default()
        },
        Role::Member => SessionFilter {
            member_id: Some(require_member_for_user(db, user.id).await?.id),
            ..Default::default()
        },
        Role::Admin => {
            return Err(AppError::Authorization(
                "This account has no member or trainer profile".to_string(),
            ));
        }
    };

    let sessions = list_sessions(db, filter).await?;
    Ok(Json(sessions.into_iter().map(SessionResponse::from).collect()))
}

#[post("/sessions/me", data = "<request>")]
pub async fn api_create_own_session(
    request: Json<SessionCreateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<SessionResponse>>, AppError> {
    user.require_permission(Permission::ManageOwnSessions)?;
    let request = request.validate_custom()?;
    let trainer = require_trainer_for_user(db, user.id).await?;

    insert_session(db, request, trainer.id).await
}

#[get("/sessions/<id>")]
pub async fn api_get_session(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SessionResponse>, AppError> {
    user.require_permission(Permission::ViewCatalog)?;
    Ok(Json(session_response(db, id).await?))
}

#[post("/sessions", data = "<request>")]
pub async fn api_create_session(
    request: Json<SessionCreateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<SessionResponse>>, AppError> {
    let request = request.validate_custom()?;

    let trainer_id = match request.trainer_id {
        Some(trainer_id) => trainer_id,
        None if user.role == Role::Trainer => require_trainer_for_user(db, user.id).await?.id,
        None => {
            return Err(AppError::BadRequest(
                "trainerId is required when creating a session".to_string(),
            ));
        }
    };
    authorize_session_management(db, &user, trainer_id).await?;

    insert_session(db, request, trainer_id).await
}

/// Registered members are told what changed.
#[put("/sessions/<id>", data = "<request>")]
pub async fn api_update_session(
    id: i64,
    request: Json<SessionUpdateRequest>,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SessionUpdateResponse>, AppError> {
    let request = request.validate_custom()?;
    let session = get_session(db, id).await?;
    authorize_session_management(db, &user, session.trainer_id).await?;

    if let Some(trainer_id) = request.trainer_id {
        if trainer_id != session.trainer_id && !user.has_permission(Permission::ManageAllSessions)
        {
            return Err(AppError::Authorization(
                "Only an administrator can reassign a session to another trainer".to_string(),
            ));
        }
    }

    let update = update_session(
        db,
        id,
        SessionPatch {
            date: request.date,
            time: request.time,
            session_type: request.session_type,
            max_participants: request.max_participants,
            trainer_id: request.trainer_id,
        },
    )
    .await?;

    Ok(Json(SessionUpdateResponse {
        session: session_response(db, update.session.id).await?,
        changes: update.changes,
        notified: update.notified,
    }))
}

/// Registered members receive a cancellation notice.
#[delete("/sessions/<id>")]
pub async fn api_delete_session(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SessionDeletedResponse>, AppError> {
    let session = get_session(db, id).await?;
    authorize_session_management(db, &user, session.trainer_id).await?;

    let notified = delete_session(db, id).await?;

    Ok(Json(SessionDeletedResponse {
        message: "Session deleted".to_string(),
        notified,
    }))
}

#[post("/sessions/<id>/register")]
pub async fn api_register_self(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<SessionRegistration>>, AppError> {
    user.require_permission(Permission::RegisterForSessions)?;
    let member = require_member_for_user(db, user.id).await?;

    let registration = register_member(db, id, member.id).await?;
    Ok(Custom(Status::Created, Json(registration)))
}

#[delete("/sessions/<id>/register")]
pub async fn api_unregister_self(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, AppError> {
    user.require_permission(Permission::RegisterForSessions)?;
    let member = require_member_for_user(db, user.id).await?;

    unregister_member(db, id, member.id).await?;
    Ok(MessageResponse::json("Registration cancelled"))
}

#[post("/sessions/<id>/register/<member_id>")]
pub async fn api_register_member(
    id: i64,
    member_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<SessionRegistration>>, AppError> {
    let session = get_session(db, id).await?;
    authorize_session_management(db, &user, session.trainer_id).await?;

    let registration = register_member(db, id, member_id).await?;
    Ok(Custom(Status::Created, Json(registration)))
}

#[delete("/sessions/<id>/register/<member_id>")]
pub async fn api_unregister_member(
    id: i64,
    member_id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MessageResponse>, AppError> {
    let session = get_session(db, id).await?;
    authorize_session_management(db, &user, session.trainer_id).await?;

    unregister_member(db, id, member_id).await?;
    Ok(MessageResponse::json("Registration cancelled"))
}

#[get("/sessions/<id>/members")]
pub async fn api_get_session_members(
    id: i64,
    user: User,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<Vec<RegisteredMember>>, AppError> {
    let session = get_session(db, id).await?;
    authorize_session_management(db, &user, session.trainer_id).await?;

    Ok(Json(get_registered_members(db, id).await?))
}
