use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Beginner,
    Medium,
    Expert,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    /// Zero means unlimited.
    pub sessions_per_month: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub level: Level,
    pub is_active: bool,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub package_id: Option<i64>,
    pub pending_package_id: Option<i64>,
    pub package_expires_at: Option<NaiveDateTime>,
}

/// Member as returned to clients: the owning account's email and the assigned
/// package are inlined instead of linked back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDetails {
    #[serde(flatten)]
    pub member: Member,
    pub email: Option<String>,
    pub package: Option<Package>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Trainer {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub specialty: String,
    pub experience_years: Option<i64>,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TrainerDetails {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub trainer: Trainer,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TrainingSession {
    pub id: i64,
    pub date: NaiveDate,
    /// Always `HH:MM`.
    pub time: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub session_type: String,
    pub max_participants: i64,
    pub trainer_id: i64,
    pub created_at: NaiveDateTime,
}

/// A session with its occupancy, recomputed from the registration rows on
/// every read.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub session: TrainingSession,
    pub trainer_name: String,
    pub registered_count: i64,
}

impl SessionSummary {
    pub fn available_spots(&self) -> i64 {
        (self.session.max_participants - self.registered_count).max(0)
    }

    pub fn is_full(&self) -> bool {
        self.registered_count >= self.session.max_participants
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SessionRegistration {
    pub id: i64,
    pub session_id: i64,
    pub member_id: i64,
    pub registered_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredMember {
    pub registration_id: i64,
    pub member_id: i64,
    pub name: String,
    pub level: Level,
    pub registered_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub member_id: i64,
    pub message: String,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub id: i64,
    pub member_id: i64,
    pub trainer_id: i64,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RatingWithMember {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub rating: Rating,
    pub member_name: String,
}
