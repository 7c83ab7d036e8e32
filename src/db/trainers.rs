use chrono::NaiveDate;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument};

use crate::error::{AppError, on_foreign_key_violation};
use crate::models::{Trainer, TrainerDetails};

const TRAINER_COLUMNS: &str =
    "t.id, t.user_id, t.name, t.specialty, t.experience_years, t.gender, t.date_of_birth";

#[derive(Debug, Clone, Default)]
pub struct NewTrainer {
    pub name: String,
    pub specialty: String,
    pub experience_years: Option<Option<i64>>,
    pub gender: Option<Option<String>>,
    pub date_of_birth: Option<Option<NaiveDate>>,
}

#[derive(Debug, Clone, Default)]
pub struct TrainerPatch {
    pub name: Option<String>,
    pub specialty: Option<String>,
    pub experience_years: Option<Option<i64>>,
    pub gender: Option<Option<String>>,
    pub date_of_birth: Option<Option<NaiveDate>>,
}

pub(crate) async fn insert_trainer(
    conn: &mut SqliteConnection,
    user_id: i64,
    trainer: &NewTrainer,
) -> Result<i64, AppError> {
    let res = sqlx::query(
        "INSERT INTO trainers (user_id, name, specialty, experience_years, gender, date_of_birth)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(&trainer.name)
    .bind(&trainer.specialty)
    .bind(trainer.experience_years)
    .bind(&trainer.gender)
    .bind(trainer.date_of_birth)
    .execute(conn)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument]
pub async fn get_trainer(pool: &Pool<Sqlite>, id: i64) -> Result<Trainer, AppError> {
    info!("Fetching trainer by ID");
    let row = sqlx::query_as::<_, Trainer>(&format!(
        "SELECT {} FROM trainers t WHERE t.id = ?",
        TRAINER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.ok_or_else(|| AppError::not_found("Trainer", id))
}

#[instrument]
pub async fn find_trainer_by_user_id(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Option<Trainer>, AppError> {
    info!("Fetching trainer by user ID");
    let row = sqlx::query_as::<_, Trainer>(&format!(
        "SELECT {} FROM trainers t WHERE t.user_id = ?",
        TRAINER_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

#[instrument]
pub async fn require_trainer_for_user(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Trainer, AppError> {
    find_trainer_by_user_id(pool, user_id).await?.ok_or_else(|| {
        AppError::Authorization("This account has no trainer profile".to_string())
    })
}

#[instrument]
pub async fn get_trainer_details(pool: &Pool<Sqlite>, id: i64) -> Result<TrainerDetails, AppError> {
    info!("Fetching trainer details");
    let row = sqlx::query_as::<_, TrainerDetails>(&format!(
        "SELECT {}, u.email AS email FROM trainers t JOIN users u ON u.id = t.user_id WHERE t.id = ?",
        TRAINER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.ok_or_else(|| AppError::not_found("Trainer", id))
}

#[instrument]
pub async fn list_trainers(pool: &Pool<Sqlite>) -> Result<Vec<TrainerDetails>, AppError> {
    info!("Listing trainers");
    let rows = sqlx::query_as::<_, TrainerDetails>(&format!(
        "SELECT {}, u.email AS email FROM trainers t
         JOIN users u ON u.id = t.user_id
         WHERE u.status = 'approved'
         ORDER BY t.name",
        TRAINER_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[instrument]
pub async fn update_trainer(
    pool: &Pool<Sqlite>,
    id: i64,
    patch: TrainerPatch,
) -> Result<Trainer, AppError> {
    info!("Updating trainer");
    let current = get_trainer(pool, id).await?;

    sqlx::query(
        "UPDATE trainers
         SET name = ?, specialty = ?, experience_years = ?, gender = ?, date_of_birth = ?
         WHERE id = ?",
    )
    .bind(patch.name.unwrap_or(current.name))
    .bind(patch.specialty.unwrap_or(current.specialty))
    .bind(patch.experience_years.unwrap_or(current.experience_years))
    .bind(patch.gender.unwrap_or(current.gender))
    .bind(patch.date_of_birth.unwrap_or(current.date_of_birth))
    .bind(id)
    .execute(pool)
    .await?;

    get_trainer(pool, id).await
}

/// Removes the trainer, every session they own (with its registrations) and
/// the trainer's account row. Returns the number of sessions removed.
#[instrument]
pub async fn delete_trainer(pool: &Pool<Sqlite>, id: i64) -> Result<u64, AppError> {
    info!("Deleting trainer");
    let trainer = get_trainer(pool, id).await?;

    let mut tx = pool.begin().await?;

    let sessions = sqlx::query("DELETE FROM training_sessions WHERE trainer_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM trainers WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(trainer.user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            on_foreign_key_violation(
                e,
                "Trainer account is still referenced by other records and cannot be deleted",
            )
        })?;

    tx.commit().await?;

    info!(sessions = sessions.rows_affected(), "Trainer deleted");
    Ok(sessions.rows_affected())
}
