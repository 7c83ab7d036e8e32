pub mod auth;
pub mod members;
pub mod notifications;
pub mod packages;
pub mod ratings;
pub mod sessions;
pub mod trainers;
pub mod users;

use once_cell::sync::Lazy;
use regex::Regex;
use rocket::Route;
use rocket::serde::json::Json;
use serde::{Deserialize, Deserializer, Serialize};

/// `HH:MM` with optional seconds.
pub static TIME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([01]\d|2[0-3]):[0-5]\d(:[0-5]\d)?$").expect("time pattern compiles")
});

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn json(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

/// Tells an absent field (`None`) apart from an explicit `null` (`Some(None)`).
/// Use together with `#[serde(default)]`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[get("/health")]
pub fn health() -> &'static str {
    "OK"
}

pub fn routes() -> Vec<Route> {
    routes![
        health,
        auth::api_register,
        auth::api_login,
        auth::api_me,
        users::api_get_users,
        users::api_create_user,
        users::api_get_own_account,
        users::api_change_password,
        users::api_get_user,
        users::api_approve_user,
        users::api_reject_user,
        users::api_delete_user,
        members::api_get_members,
        members::api_get_own_member,
        members::api_update_own_member,
        members::api_request_package,
        members::api_get_member,
        members::api_update_member,
        members::api_delete_member,
        members::api_approve_package,
        members::api_reject_package,
        trainers::api_get_trainers,
        trainers::api_get_own_trainer,
        trainers::api_update_own_trainer,
        trainers::api_get_trainer,
        trainers::api_update_trainer,
        trainers::api_delete_trainer,
        packages::api_get_packages,
        packages::api_get_package,
        packages::api_create_package,
        packages::api_update_package,
        packages::api_delete_package,
        sessions::api_get_sessions,
        sessions::api_get_own_sessions,
        sessions::api_create_own_session,
        sessions::api_get_session,
        sessions::api_create_session,
        sessions::api_update_session,
        sessions::api_delete_session,
        sessions::api_register_self,
        sessions::api_unregister_self,
        sessions::api_register_member,
        sessions::api_unregister_member,
        sessions::api_get_session_members,
        notifications::api_get_notifications,
        notifications::api_get_unread_count,
        notifications::api_mark_as_read,
        notifications::api_mark_all_as_read,
        notifications::api_delete_notification,
        notifications::api_delete_all_notifications,
        notifications::api_send_notification,
        ratings::api_get_ratings,
        ratings::api_get_average_rating,
        ratings::api_get_my_rating,
        ratings::api_create_rating,
        ratings::api_update_rating,
        ratings::api_delete_rating,
    ]
}
