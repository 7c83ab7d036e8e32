use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use sqlx::SqlitePool;

use super::{TokenService, User};
use crate::db::get_user;
use crate::validation::ValidationResponse;

fn bearer_token<'a>(request: &'a Request<'_>) -> Option<&'a str> {
    request
        .headers()
        .get_one("Authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for User {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let auth_span = tracing::info_span!("user_auth_guard");
        let _guard = auth_span.enter();

        let Some(token) = bearer_token(request) else {
            return Outcome::Error((Status::Unauthorized, ()));
        };

        let (Some(db), Some(tokens)) = (
            request.rocket().state::<SqlitePool>(),
            request.rocket().state::<TokenService>(),
        ) else {
            tracing::error!("Database pool or token service not found in managed state");
            return Outcome::Error((Status::InternalServerError, ()));
        };

        let claims = match tokens.verify(token) {
            Ok(claims) => claims,
            Err(err) => {
                tracing::warn!(error = %err, "Rejected bearer token");
                return Outcome::Error((Status::Unauthorized, ()));
            }
        };

        let Ok(user_id) = claims.user_id() else {
            return Outcome::Error((Status::Unauthorized, ()));
        };

        match get_user(db, user_id).await {
            Ok(user) if user.can_sign_in() => {
                tracing::info!(user_id = %user.id, role = %user.role.as_str(), "User authenticated via bearer token");
                Outcome::Success(user)
            }
            Ok(user) => {
                tracing::warn!(user_id = %user.id, status = %user.status, "Token presented for an account that may not sign in");
                Outcome::Error((Status::Unauthorized, ()))
            }
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = ?err, "Token subject no longer resolves to a user");
                Outcome::Error((Status::Unauthorized, ()))
            }
        }
    }
}

fn json_error(status: Status, field: &str, message: &str) -> Custom<Json<ValidationResponse>> {
    Custom(status, Json(ValidationResponse::with_error(field, message)))
}

#[catch(400)]
pub fn bad_request_api(_req: &Request) -> Custom<Json<ValidationResponse>> {
    json_error(Status::BadRequest, "request", "Malformed request")
}

#[catch(401)]
pub fn unauthorized_api(_req: &Request) -> Custom<Json<ValidationResponse>> {
    json_error(Status::Unauthorized, "authentication", "Authentication required")
}

#[catch(403)]
pub fn forbidden_api(_req: &Request) -> Custom<Json<ValidationResponse>> {
    tracing::warn!("Forbidden access attempt");
    json_error(
        Status::Forbidden,
        "permission",
        "You don't have permission to perform this action",
    )
}

#[catch(404)]
pub fn not_found_api(_req: &Request) -> Custom<Json<ValidationResponse>> {
    json_error(Status::NotFound, "resource", "Resource not found")
}

#[catch(422)]
pub fn unprocessable_api(_req: &Request) -> Custom<Json<ValidationResponse>> {
    json_error(Status::BadRequest, "request", "Request body could not be parsed")
}
