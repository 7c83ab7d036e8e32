use chrono::NaiveDate;
use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::{info, warn};
use validator::Validate;

use crate::auth::{AccountStatus, Role, TokenService, User};
use crate::db::{
    AccountProfile, NewAccount, NewMember, NewTrainer, authenticate_user, create_account,
    get_member_details_by_user_id, get_trainer_details, find_trainer_by_user_id, get_user,
    request_package,
};
use crate::env::AppConfig;
use crate::error::AppError;
use crate::models::{Level, MemberDetails, TrainerDetails};
use crate::validation::JsonValidateExt;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MemberProfileRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,
    #[serde(default)]
    pub level: Level,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub package_id: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TrainerProfileRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 100, message = "Specialty is required"))]
    pub specialty: String,
    #[validate(range(min = 0, max = 80, message = "Experience must be between 0 and 80 years"))]
    pub experience_years: Option<i64>,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

/// Role and role-specific profile, sent as `"role": ..., "profile": {...}`.
#[derive(Debug, Deserialize)]
#[serde(tag = "role", content = "profile", rename_all = "lowercase")]
pub enum ProfileRequest {
    Member(MemberProfileRequest),
    Trainer(TrainerProfileRequest),
    Admin,
}

impl ProfileRequest {
    pub fn role(&self) -> Role {
        match self {
            ProfileRequest::Member(_) => Role::Member,
            ProfileRequest::Trainer(_) => Role::Trainer,
            ProfileRequest::Admin => Role::Admin,
        }
    }

    pub fn validate_profile(&self) -> Result<(), AppError> {
        match self {
            ProfileRequest::Member(profile) => profile.validate()?,
            ProfileRequest::Trainer(profile) => profile.validate()?,
            ProfileRequest::Admin => {}
        }
        Ok(())
    }

    pub fn into_profile(self) -> AccountProfile {
        match self {
            ProfileRequest::Member(p) => AccountProfile::Member(NewMember {
                name: p.name,
                level: p.level,
                gender: p.gender,
                date_of_birth: p.date_of_birth,
                package_id: p.package_id,
                is_active: p.is_active,
            }),
            ProfileRequest::Trainer(p) => AccountProfile::Trainer(NewTrainer {
                name: p.name,
                specialty: p.specialty,
                experience_years: Some(p.experience_years),
                gender: Some(p.gender),
                date_of_birth: Some(p.date_of_birth),
            }),
            ProfileRequest::Admin => AccountProfile::None,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[serde(flatten)]
    pub account: ProfileRequest,
}

impl RegisterRequest {
    pub fn validate_all(&self) -> Result<(), AppError> {
        self.validate()?;
        self.account.validate_profile()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub message: String,
    pub user: User,
    pub profile_id: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: User,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub user: User,
    pub member: Option<MemberDetails>,
    pub trainer: Option<TrainerDetails>,
}

pub async fn profile_for(db: &Pool<Sqlite>, user: User) -> Result<ProfileResponse, AppError> {
    let member = match user.role {
        Role::Member => get_member_details_by_user_id(db, user.id).await?,
        _ => None,
    };

    let trainer = match user.role {
        Role::Trainer => match find_trainer_by_user_id(db, user.id).await? {
            Some(trainer) => Some(get_trainer_details(db, trainer.id).await?),
            None => None,
        },
        _ => None,
    };

    Ok(ProfileResponse {
        user,
        member,
        trainer,
    })
}

/// Public sign-up. The account starts out pending; a package chosen at sign-up
/// is filed as a request for an administrator to approve.
#[post("/auth/register", data = "<request>")]
pub async fn api_register(
    request: Json<RegisterRequest>,
    db: &State<Pool<Sqlite>>,
    config: &State<AppConfig>,
) -> Result<Custom<Json<RegisterResponse>>, AppError> {
    let request = request.into_inner();
    request.validate_all()?;

    if request.account.role() == Role::Admin {
        return Err(AppError::BadRequest(
            "Administrator accounts cannot be self-registered".to_string(),
        ));
    }

    let mut profile = request.account.into_profile();
    let mut requested_package = None;
    if let AccountProfile::Member(member) = &mut profile {
        requested_package = member.package_id.take();
        member.is_active = None;
    }

    let created = create_account(
        db,
        NewAccount {
            email: request.email,
            password: request.password,
            status: AccountStatus::Pending,
            profile,
        },
        config.membership_term_days,
    )
    .await?;

    if let (Some(member_id), Some(package_id)) = (created.profile_id, requested_package) {
        if let Err(e) = request_package(db, member_id, package_id).await {
            warn!(member_id = %member_id, package_id = %package_id, error = %e, "Package chosen at sign-up was not filed");
        }
    }

    let user = get_user(db, created.user_id).await?;
    info!(user_id = %user.id, "Registration received");

    Ok(Custom(
        Status::Created,
        Json(RegisterResponse {
            message: "Registration received, awaiting administrator approval".to_string(),
            user,
            profile_id: created.profile_id,
        }),
    ))
}

#[post("/auth/login", data = "<login>")]
pub async fn api_login(
    login: Json<LoginRequest>,
    db: &State<Pool<Sqlite>>,
    tokens: &State<TokenService>,
) -> Result<Json<LoginResponse>, AppError> {
    let login = login.validate_custom()?;

    let user = authenticate_user(db, &login.email, &login.password)
        .await?
        .ok_or_else(|| AppError::Authentication("Invalid email or password".to_string()))?;

    if !user.can_sign_in() {
        let reason = match user.status {
            AccountStatus::Pending => "Your account is awaiting administrator approval",
            AccountStatus::Rejected => "Your registration was rejected",
            _ => "This account is no longer active",
        };
        return Err(AppError::Authentication(reason.to_string()));
    }

    let access_token = tokens.issue(&user)?;
    info!(user_id = %user.id, "User signed in");

    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer",
        expires_in: tokens.ttl().num_seconds(),
        user,
    }))
}

#[get("/auth/me")]
pub async fn api_me(user: User, db: &State<Pool<Sqlite>>) -> Result<Json<ProfileResponse>, AppError> {
    Ok(Json(profile_for(db, user).await?))
}
