use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};

use super::members::get_member;
use super::trainers::get_trainer;
use crate::error::{AppError, on_unique_violation};
use crate::models::{Rating, RatingWithMember};

const DUPLICATE_RATING: &str = "You have already rated this trainer";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingSummary {
    /// `None` when the trainer has no ratings yet.
    pub average: Option<f64>,
    pub count: i64,
}

/// Mean of `count` ratings summing to `sum`, rounded half-up to one decimal.
/// Integer arithmetic keeps `3.45`-style midpoints from drifting.
pub fn rounded_average(sum: i64, count: i64) -> Option<f64> {
    if count <= 0 {
        return None;
    }
    let tenths = (sum * 20 + count) / (2 * count);
    Some(tenths as f64 / 10.0)
}

fn check_score(rating: i64) -> Result<(), AppError> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::BadRequest(
            "Rating must be between 1 and 5".to_string(),
        ));
    }
    Ok(())
}

#[instrument]
pub async fn get_rating(pool: &Pool<Sqlite>, id: i64) -> Result<Rating, AppError> {
    sqlx::query_as::<_, Rating>("SELECT * FROM ratings WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Rating", id))
}

#[instrument(skip(pool, comment))]
pub async fn create_rating(
    pool: &Pool<Sqlite>,
    trainer_id: i64,
    member_id: i64,
    rating: i64,
    comment: Option<String>,
) -> Result<Rating, AppError> {
    info!("Creating rating");
    get_trainer(pool, trainer_id).await?;
    get_member(pool, member_id).await?;
    check_score(rating)?;

    if get_member_rating(pool, trainer_id, member_id).await?.is_some() {
        return Err(AppError::BadRequest(DUPLICATE_RATING.to_string()));
    }

    let res = sqlx::query(
        "INSERT INTO ratings (member_id, trainer_id, rating, comment) VALUES (?, ?, ?, ?)",
    )
    .bind(member_id)
    .bind(trainer_id)
    .bind(rating)
    .bind(comment)
    .execute(pool)
    .await
    .map_err(|e| on_unique_violation(e, DUPLICATE_RATING))?;

    get_rating(pool, res.last_insert_rowid()).await
}

#[instrument]
pub async fn get_ratings_for_trainer(
    pool: &Pool<Sqlite>,
    trainer_id: i64,
) -> Result<Vec<RatingWithMember>, AppError> {
    info!("Listing trainer ratings");
    get_trainer(pool, trainer_id).await?;

    let rows = sqlx::query_as::<_, RatingWithMember>(
        "SELECT r.id, r.member_id, r.trainer_id, r.rating, r.comment, r.created_at,
                m.name AS member_name
         FROM ratings r
         JOIN members m ON m.id = r.member_id
         WHERE r.trainer_id = ?
         ORDER BY r.created_at DESC, r.id DESC",
    )
    .bind(trainer_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[instrument]
pub async fn average_rating(pool: &Pool<Sqlite>, trainer_id: i64) -> Result<RatingSummary, AppError> {
    get_trainer(pool, trainer_id).await?;

    let (sum, count) = sqlx::query_as::<_, (i64, i64)>(
        "SELECT COALESCE(SUM(rating), 0), COUNT(*) FROM ratings WHERE trainer_id = ?",
    )
    .bind(trainer_id)
    .fetch_one(pool)
    .await?;

    Ok(RatingSummary {
        average: rounded_average(sum, count),
        count,
    })
}

#[instrument]
pub async fn get_member_rating(
    pool: &Pool<Sqlite>,
    trainer_id: i64,
    member_id: i64,
) -> Result<Option<Rating>, AppError> {
    let row = sqlx::query_as::<_, Rating>(
        "SELECT * FROM ratings WHERE trainer_id = ? AND member_id = ?",
    )
    .bind(trainer_id)
    .bind(member_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Replaces the score and comment of the member's existing rating.
#[instrument(skip(pool, comment))]
pub async fn update_rating(
    pool: &Pool<Sqlite>,
    trainer_id: i64,
    member_id: i64,
    rating: i64,
    comment: Option<String>,
) -> Result<Rating, AppError> {
    info!("Updating rating");
    check_score(rating)?;

    let existing = get_member_rating(pool, trainer_id, member_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "No rating for trainer with id {} from this member",
                trainer_id
            ))
        })?;

    sqlx::query("UPDATE ratings SET rating = ?, comment = ? WHERE id = ?")
        .bind(rating)
        .bind(comment)
        .bind(existing.id)
        .execute(pool)
        .await?;

    get_rating(pool, existing.id).await
}

#[instrument]
pub async fn delete_rating(pool: &Pool<Sqlite>, trainer_id: i64, id: i64) -> Result<(), AppError> {
    info!("Deleting rating");
    let res = sqlx::query("DELETE FROM ratings WHERE id = ? AND trainer_id = ?")
        .bind(id)
        .bind(trainer_id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("Rating", id));
    }

    Ok(())
}
