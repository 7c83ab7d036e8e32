use sqlx::{Pool, Sqlite};
use tracing::{info, instrument, warn};

use super::members::get_member;
use crate::error::AppError;
use crate::models::Notification;

#[instrument(skip(pool, message))]
pub async fn create_notification(
    pool: &Pool<Sqlite>,
    member_id: i64,
    message: &str,
) -> Result<Notification, AppError> {
    info!("Creating notification");
    get_member(pool, member_id).await?;

    let res = sqlx::query("INSERT INTO notifications (member_id, message) VALUES (?, ?)")
        .bind(member_id)
        .bind(message)
        .execute(pool)
        .await?;

    get_notification(pool, member_id, res.last_insert_rowid()).await
}

/// Queues `message` for every member listed. Failures are logged and skipped:
/// the change that triggered the fan-out has already been committed. Returns
/// the number of notifications written.
#[instrument(skip(pool, message))]
pub async fn notify_members(pool: &Pool<Sqlite>, member_ids: &[i64], message: &str) -> usize {
    let mut delivered = 0;

    for member_id in member_ids {
        match create_notification(pool, *member_id, message).await {
            Ok(_) => delivered += 1,
            Err(e) => {
                warn!(member_id = %member_id, error = %e, "Failed to queue notification");
            }
        }
    }

    info!(delivered, requested = member_ids.len(), "Notification fan-out finished");
    delivered
}

#[instrument]
pub async fn get_notification(
    pool: &Pool<Sqlite>,
    member_id: i64,
    id: i64,
) -> Result<Notification, AppError> {
    sqlx::query_as::<_, Notification>(
        "SELECT * FROM notifications WHERE id = ? AND member_id = ?",
    )
    .bind(id)
    .bind(member_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found("Notification", id))
}

#[instrument]
pub async fn get_notifications_for_member(
    pool: &Pool<Sqlite>,
    member_id: i64,
) -> Result<Vec<Notification>, AppError> {
    info!("Listing notifications");
    let rows = sqlx::query_as::<_, Notification>(
        "SELECT * FROM notifications WHERE member_id = ? ORDER BY created_at DESC, id DESC",
    )
    .bind(member_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

#[instrument]
pub async fn get_unread_count(pool: &Pool<Sqlite>, member_id: i64) -> Result<i64, AppError> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notifications WHERE member_id = ? AND is_read = FALSE",
    )
    .bind(member_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

#[instrument]
pub async fn mark_as_read(
    pool: &Pool<Sqlite>,
    member_id: i64,
    id: i64,
) -> Result<Notification, AppError> {
    info!("Marking notification as read");
    let res = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = ? AND member_id = ?")
        .bind(id)
        .bind(member_id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("Notification", id));
    }

    get_notification(pool, member_id, id).await
}

#[instrument]
pub async fn mark_all_as_read(pool: &Pool<Sqlite>, member_id: i64) -> Result<u64, AppError> {
    info!("Marking all notifications as read");
    let res = sqlx::query(
        "UPDATE notifications SET is_read = TRUE WHERE member_id = ? AND is_read = FALSE",
    )
    .bind(member_id)
    .execute(pool)
    .await?;

    Ok(res.rows_affected())
}

#[instrument]
pub async fn delete_notification(pool: &Pool<Sqlite>, member_id: i64, id: i64) -> Result<(), AppError> {
    info!("Deleting notification");
    let res = sqlx::query("DELETE FROM notifications WHERE id = ? AND member_id = ?")
        .bind(id)
        .bind(member_id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("Notification", id));
    }

    Ok(())
}

#[instrument]
pub async fn delete_all_notifications(pool: &Pool<Sqlite>, member_id: i64) -> Result<u64, AppError> {
    info!("Deleting all notifications");
    let res = sqlx::query("DELETE FROM notifications WHERE member_id = ?")
        .bind(member_id)
        .execute(pool)
        .await?;

    Ok(res.rows_affected())
}
