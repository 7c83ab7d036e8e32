use chrono::{NaiveDate, Utc};
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument, warn};

use super::members::get_member;
use super::notifications::notify_members;
use super::trainers::get_trainer;
use crate::auth::AccountStatus;
use crate::error::{AppError, on_unique_violation};
use crate::models::{RegisteredMember, SessionRegistration, SessionSummary, TrainingSession};
use crate::validation::normalize_time;

const SUMMARY_SELECT: &str = "SELECT s.id, s.date, s.time, s.type, s.max_participants,
            s.trainer_id, s.created_at, t.name AS trainer_name,
            (SELECT COUNT(*) FROM session_registrations r WHERE r.session_id = s.id)
                AS registered_count
     FROM training_sessions s
     JOIN trainers t ON t.id = s.trainer_id";

#[derive(Debug, Clone)]
pub struct NewSession {
    pub date: NaiveDate,
    pub time: String,
    pub session_type: String,
    pub max_participants: i64,
    pub trainer_id: i64,
}

#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub date: Option<NaiveDate>,
    pub time: Option<String>,
    pub session_type: Option<String>,
    pub max_participants: Option<i64>,
    pub trainer_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub trainer_id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub member_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct SessionUpdate {
    pub session: TrainingSession,
    pub changes: Vec<String>,
    pub notified: usize,
}

#[instrument]
pub async fn get_session(pool: &Pool<Sqlite>, id: i64) -> Result<TrainingSession, AppError> {
    sqlx::query_as::<_, TrainingSession>(
        "SELECT id, date, time, type, max_participants, trainer_id, created_at
         FROM training_sessions WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Session", id))
}

#[instrument]
pub async fn get_session_summary(pool: &Pool<Sqlite>, id: i64) -> Result<SessionSummary, AppError> {
    info!("Fetching session");
    sqlx::query_as::<_, SessionSummary>(&format!("{} WHERE s.id = ?", SUMMARY_SELECT))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Session", id))
}

#[instrument]
pub async fn list_sessions(
    pool: &Pool<Sqlite>,
    filter: SessionFilter,
) -> Result<Vec<SessionSummary>, AppError> {
    info!("Listing sessions");
    let rows = sqlx::query_as::<_, SessionSummary>(&format!(
        "{}
         WHERE (?1 IS NULL OR s.trainer_id = ?1)
           AND (?2 IS NULL OR s.date = ?2)
           AND (?3 IS NULL OR EXISTS (
                SELECT 1 FROM session_registrations r
                WHERE r.session_id = s.id AND r.member_id = ?3))
         ORDER BY s.date, s.time, s.id",
        SUMMARY_SELECT
    ))
    .bind(filter.trainer_id)
    .bind(filter.date)
    .bind(filter.member_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[instrument]
pub async fn create_session(
    pool: &Pool<Sqlite>,
    session: NewSession,
) -> Result<TrainingSession, AppError> {
    info!("Creating session");
    if session.max_participants < 1 {
        return Err(AppError::BadRequest(
            "A session needs room for at least one participant".to_string(),
        ));
    }
    get_trainer(pool, session.trainer_id).await?;

    let time = normalize_time(&session.time)?;

    let res = sqlx::query(
        "INSERT INTO training_sessions (date, time, type, max_participants, trainer_id, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(session.date)
    .bind(time)
    .bind(&session.session_type)
    .bind(session.max_participants)
    .bind(session.trainer_id)
    .bind(Utc::now().naive_utc())
    .execute(pool)
    .await?;

    get_session(pool, res.last_insert_rowid()).await
}

#[instrument]
pub async fn registered_member_ids(
    pool: &Pool<Sqlite>,
    session_id: i64,
) -> Result<Vec<i64>, AppError> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT member_id FROM session_registrations WHERE session_id = ? ORDER BY id",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

#[instrument]
pub async fn get_registered_members(
    pool: &Pool<Sqlite>,
    session_id: i64,
) -> Result<Vec<RegisteredMember>, AppError> {
    info!("Listing session members");
    get_session(pool, session_id).await?;

    let rows = sqlx::query_as::<_, RegisteredMember>(
        "SELECT r.id AS registration_id, m.id AS member_id, m.name, m.level, r.registered_at
         FROM session_registrations r
         JOIN members m ON m.id = r.member_id
         WHERE r.session_id = ?
         ORDER BY r.registered_at, r.id",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Human-readable list of what differs between two versions of a session.
/// Times are compared on `HH:MM`, so a difference in seconds alone is no change.
pub fn describe_changes(
    old: &TrainingSession,
    new: &TrainingSession,
    old_trainer: &str,
    new_trainer: &str,
) -> Vec<String> {
    let mut changes = Vec::new();

    if old.date != new.date {
        changes.push(format!("date changed from {} to {}", old.date, new.date));
    }

    let old_time = normalize_time(&old.time).unwrap_or_else(|_| old.time.clone());
    let new_time = normalize_time(&new.time).unwrap_or_else(|_| new.time.clone());
    if old_time != new_time {
        changes.push(format!("time changed from {} to {}", old_time, new_time));
    }

    if old.session_type != new.session_type {
        changes.push(format!(
            "type changed from {} to {}",
            old.session_type, new.session_type
        ));
    }

    if old.max_participants != new.max_participants {
        changes.push(format!(
            "capacity changed from {} to {}",
            old.max_participants, new.max_participants
        ));
    }

    if old.trainer_id != new.trainer_id {
        changes.push(format!(
            "trainer changed from {} to {}",
            old_trainer, new_trainer
        ));
    }

    changes
}

struct SessionRow {
    date: NaiveDate,
    time: String,
    session_type: String,
    max_participants: i64,
    trainer_id: i64,
}

fn capacity_below_registrations(registered: usize) -> AppError {
    AppError::BadRequest(format!(
        "Capacity cannot be lower than the {} members already registered",
        registered
    ))
}

/// Overwrites a session row unless the new capacity is below the registrations
/// counted in the same statement. Returns whether the row was written.
async fn write_session_row(
    pool: &Pool<Sqlite>,
    id: i64,
    row: &SessionRow,
) -> Result<bool, AppError> {
    let res = sqlx::query(
        "UPDATE training_sessions
         SET date = ?1, time = ?2, type = ?3, max_participants = ?4, trainer_id = ?5
         WHERE id = ?6
           AND (SELECT COUNT(*) FROM session_registrations WHERE session_id = ?6) <= ?4",
    )
    .bind(row.date)
    .bind(&row.time)
    .bind(&row.session_type)
    .bind(row.max_participants)
    .bind(row.trainer_id)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(res.rows_affected() > 0)
}

/// Applies a patch, then tells every registered member what changed. Capacity
/// may not drop below the current number of registrations.
#[instrument]
pub async fn update_session(
    pool: &Pool<Sqlite>,
    id: i64,
    patch: SessionPatch,
) -> Result<SessionUpdate, AppError> {
    info!("Updating session");
    let old = get_session(pool, id).await?;
    let old_trainer = get_trainer(pool, old.trainer_id).await?;

    let new_trainer = match patch.trainer_id {
        Some(trainer_id) if trainer_id != old.trainer_id => get_trainer(pool, trainer_id).await?,
        _ => old_trainer.clone(),
    };

    let time = match &patch.time {
        Some(t) => normalize_time(t)?,
        None => normalize_time(&old.time).unwrap_or_else(|_| old.time.clone()),
    };

    let max_participants = patch.max_participants.unwrap_or(old.max_participants);
    if max_participants < 1 {
        return Err(AppError::BadRequest(
            "A session needs room for at least one participant".to_string(),
        ));
    }

    let registered = registered_member_ids(pool, id).await?.len();
    if (registered as i64) > max_participants {
        return Err(capacity_below_registrations(registered));
    }

    let applied = write_session_row(
        pool,
        id,
        &SessionRow {
            date: patch.date.unwrap_or(old.date),
            time,
            session_type: patch
                .session_type
                .clone()
                .unwrap_or_else(|| old.session_type.clone()),
            max_participants,
            trainer_id: new_trainer.id,
        },
    )
    .await?;

    if !applied {
        get_session(pool, id).await?;
        let registered = registered_member_ids(pool, id).await?.len();
        warn!(registered, max_participants, "Registrations grew past the new capacity");
        return Err(capacity_below_registrations(registered));
    }

    let member_ids = registered_member_ids(pool, id).await?;
    let session = get_session(pool, id).await?;
    let changes = describe_changes(&old, &session, &old_trainer.name, &new_trainer.name);

    let notified = if changes.is_empty() || member_ids.is_empty() {
        0
    } else {
        let message = format!(
            "Your {} session on {} at {} has been updated: {}.",
            old.session_type,
            old.date,
            normalize_time(&old.time).unwrap_or_else(|_| old.time.clone()),
            changes.join("; ")
        );
        notify_members(pool, &member_ids, &message).await
    };

    Ok(SessionUpdate {
        session,
        changes,
        notified,
    })
}

/// Notifies every registered member of the cancellation, then removes the
/// session (registrations cascade). Returns how many members were notified.
#[instrument]
pub async fn delete_session(pool: &Pool<Sqlite>, id: i64) -> Result<usize, AppError> {
    info!("Deleting session");
    let session = get_session(pool, id).await?;
    let member_ids = registered_member_ids(pool, id).await?;

    let notified = if member_ids.is_empty() {
        0
    } else {
        let message = format!(
            "Your {} session on {} at {} has been cancelled.",
            session.session_type, session.date, session.time
        );
        notify_members(pool, &member_ids, &message).await
    };

    sqlx::query("DELETE FROM training_sessions WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(notified)
}

/// Registers a member for a session.
///
/// Checks run in order: session exists, member exists, account is approved,
/// membership is active, not already registered, session not full. The insert itself re-checks
/// capacity in the same statement and relies on the unique `(session, member)`
/// constraint, so concurrent calls can neither overfill nor duplicate.
#[instrument]
pub async fn register_member(
    pool: &Pool<Sqlite>,
    session_id: i64,
    member_id: i64,
) -> Result<SessionRegistration, AppError> {
    info!("Registering member for session");
    let session = get_session(pool, session_id).await?;
    let member = get_member(pool, member_id).await?;

    let account_status = sqlx::query_scalar::<_, String>("SELECT status FROM users WHERE id = ?")
        .bind(member.user_id)
        .fetch_one(pool)
        .await?;
    if account_status != AccountStatus::Approved.as_str() {
        return Err(AppError::BadRequest(
            "Cannot reserve a session for an account that is not approved".to_string(),
        ));
    }

    if !member.is_active {
        return Err(AppError::BadRequest(
            "Cannot reserve a session without an active membership".to_string(),
        ));
    }

    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT id FROM session_registrations WHERE session_id = ? AND member_id = ?",
    )
    .bind(session_id)
    .bind(member_id)
    .fetch_optional(pool)
    .await?;

    if existing.is_some() {
        return Err(AppError::BadRequest(
            "Member is already registered for this session".to_string(),
        ));
    }

    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM session_registrations WHERE session_id = ?",
    )
    .bind(session_id)
    .fetch_one(pool)
    .await?;

    if count >= session.max_participants {
        return Err(AppError::BadRequest("Session is full".to_string()));
    }

    let res = sqlx::query(
        "INSERT INTO session_registrations (session_id, member_id, registered_at)
         SELECT ?1, ?2, ?3
         WHERE (SELECT COUNT(*) FROM session_registrations WHERE session_id = ?1)
             < (SELECT max_participants FROM training_sessions WHERE id = ?1)",
    )
    .bind(session_id)
    .bind(member_id)
    .bind(Utc::now().naive_utc())
    .execute(pool)
    .await
    .map_err(|e| on_unique_violation(e, "Member is already registered for this session"))?;

    if res.rows_affected() == 0 {
        warn!("Session filled up between the capacity check and the insert");
        return Err(AppError::BadRequest("Session is full".to_string()));
    }

    let registration = sqlx::query_as::<_, SessionRegistration>(
        "SELECT * FROM session_registrations WHERE id = ?",
    )
    .bind(res.last_insert_rowid())
    .fetch_one(pool)
    .await?;

    Ok(registration)
}

/// Removes a registration. No notification is sent.
#[instrument]
pub async fn unregister_member(
    pool: &Pool<Sqlite>,
    session_id: i64,
    member_id: i64,
) -> Result<(), AppError> {
    info!("Unregistering member from session");
    let res =
        sqlx::query("DELETE FROM session_registrations WHERE session_id = ? AND member_id = ?")
            .bind(session_id)
            .bind(member_id)
            .execute(pool)
            .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "Member {} is not registered for session {}",
            member_id, session_id
        )));
    }

    Ok(())
}
