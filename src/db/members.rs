use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument, warn};

use crate::error::{AppError, on_foreign_key_violation};
use crate::models::{Level, Member, MemberDetails, Package};

const MEMBER_COLUMNS: &str = "m.id, m.user_id, m.name, m.level, m.is_active, m.gender, \
     m.date_of_birth, m.package_id, m.pending_package_id, m.package_expires_at";

#[derive(Debug, Clone, Default)]
pub struct NewMember {
    pub name: String,
    pub level: Level,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub package_id: Option<i64>,
    /// Derived from `package_id` when not given.
    pub is_active: Option<bool>,
}

/// Partial update. `package_id: Some(None)` clears the package.
#[derive(Debug, Clone, Default)]
pub struct MemberPatch {
    pub name: Option<String>,
    pub level: Option<Level>,
    pub gender: Option<Option<String>>,
    pub date_of_birth: Option<Option<NaiveDate>>,
    pub package_id: Option<Option<i64>>,
    pub is_active: Option<bool>,
}

#[derive(sqlx::FromRow)]
struct DbMemberRow {
    #[sqlx(flatten)]
    member: Member,
    email: String,
    p_id: Option<i64>,
    p_name: Option<String>,
    p_description: Option<String>,
    p_price: Option<f64>,
    p_sessions_per_month: Option<i64>,
    p_is_active: Option<bool>,
}

impl From<DbMemberRow> for MemberDetails {
    fn from(row: DbMemberRow) -> Self {
        let package = match (row.p_id, row.p_name) {
            (Some(id), Some(name)) => Some(Package {
                id,
                name,
                description: row.p_description,
                price: row.p_price.unwrap_or_default(),
                sessions_per_month: row.p_sessions_per_month.unwrap_or_default(),
                is_active: row.p_is_active.unwrap_or_default(),
            }),
            _ => None,
        };

        Self {
            member: row.member,
            email: Some(row.email),
            package,
        }
    }
}

fn joined_select(filter: &str) -> String {
    format!(
        "SELECT {}, u.email AS email,
                p.id AS p_id, p.name AS p_name, p.description AS p_description,
                p.price AS p_price, p.sessions_per_month AS p_sessions_per_month,
                p.is_active AS p_is_active
         FROM members m
         JOIN users u ON u.id = m.user_id
         LEFT JOIN packages p ON p.id = m.package_id
         {}",
        MEMBER_COLUMNS, filter
    )
}

pub fn term_end(term_days: i64) -> NaiveDateTime {
    (Utc::now() + Duration::days(term_days)).naive_utc()
}

async fn ensure_package_exists(conn: &mut SqliteConnection, package_id: i64) -> Result<(), AppError> {
    let exists = sqlx::query_scalar::<_, i64>("SELECT id FROM packages WHERE id = ?")
        .bind(package_id)
        .fetch_optional(conn)
        .await?;

    match exists {
        Some(_) => Ok(()),
        None => Err(AppError::not_found("Package", package_id)),
    }
}

pub(crate) async fn insert_member(
    conn: &mut SqliteConnection,
    user_id: i64,
    member: &NewMember,
    term_days: i64,
) -> Result<i64, AppError> {
    if let Some(package_id) = member.package_id {
        ensure_package_exists(&mut *conn, package_id).await?;
    }

    let is_active = member.is_active.unwrap_or(member.package_id.is_some());
    let expires_at = member.package_id.map(|_| term_end(term_days));

    let res = sqlx::query(
        "INSERT INTO members
         (user_id, name, level, is_active, gender, date_of_birth, package_id, package_expires_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(&member.name)
    .bind(member.level)
    .bind(is_active)
    .bind(&member.gender)
    .bind(member.date_of_birth)
    .bind(member.package_id)
    .bind(expires_at)
    .execute(conn)
    .await?;

    Ok(res.last_insert_rowid())
}

#[instrument]
pub async fn get_member(pool: &Pool<Sqlite>, id: i64) -> Result<Member, AppError> {
    info!("Fetching member by ID");
    let row = sqlx::query_as::<_, Member>(&format!(
        "SELECT {} FROM members m WHERE m.id = ?",
        MEMBER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.ok_or_else(|| AppError::not_found("Member", id))
}

#[instrument]
pub async fn find_member_by_user_id(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Option<Member>, AppError> {
    info!("Fetching member by user ID");
    let row = sqlx::query_as::<_, Member>(&format!(
        "SELECT {} FROM members m WHERE m.user_id = ?",
        MEMBER_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Resolves the member profile owned by an account, failing with `Forbidden`
/// when the account has none.
#[instrument]
pub async fn require_member_for_user(pool: &Pool<Sqlite>, user_id: i64) -> Result<Member, AppError> {
    find_member_by_user_id(pool, user_id).await?.ok_or_else(|| {
        AppError::Authorization("This account has no member profile".to_string())
    })
}

/// Reads a member with its account email and package. When the joined read
/// fails, falls back to the bare member row rather than failing the request.
#[instrument]
pub async fn get_member_details(pool: &Pool<Sqlite>, id: i64) -> Result<MemberDetails, AppError> {
    info!("Fetching member details");
    let joined = sqlx::query_as::<_, DbMemberRow>(&joined_select("WHERE m.id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await;

    match joined {
        Ok(Some(row)) => Ok(MemberDetails::from(row)),
        Ok(None) => Err(AppError::not_found("Member", id)),
        Err(e) => {
            warn!(error = %e, "Joined member read failed, returning member without relations");
            let member = get_member(pool, id).await?;
            Ok(MemberDetails {
                member,
                email: None,
                package: None,
            })
        }
    }
}

/// Absence of a profile, package or sessions is not an error here.
#[instrument]
pub async fn get_member_details_by_user_id(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Option<MemberDetails>, AppError> {
    info!("Fetching member details by user ID");
    let joined = sqlx::query_as::<_, DbMemberRow>(&joined_select("WHERE m.user_id = ?"))
        .bind(user_id)
        .fetch_optional(pool)
        .await;

    match joined {
        Ok(row) => Ok(row.map(MemberDetails::from)),
        Err(e) => {
            warn!(error = %e, "Joined member read failed, returning member without relations");
            Ok(find_member_by_user_id(pool, user_id)
                .await?
                .map(|member| MemberDetails {
                    member,
                    email: None,
                    package: None,
                }))
        }
    }
}

#[instrument]
pub async fn list_members(pool: &Pool<Sqlite>) -> Result<Vec<MemberDetails>, AppError> {
    info!("Listing members");
    let rows = sqlx::query_as::<_, DbMemberRow>(&joined_select(
        "WHERE u.status != 'deleted' ORDER BY m.name",
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(MemberDetails::from).collect())
}

#[instrument]
pub async fn update_member(
    pool: &Pool<Sqlite>,
    id: i64,
    patch: MemberPatch,
    term_days: i64,
) -> Result<Member, AppError> {
    info!("Updating member");
    let current = get_member(pool, id).await?;

    let mut conn = pool.acquire().await?;
    if let Some(Some(package_id)) = patch.package_id {
        ensure_package_exists(&mut conn, package_id).await?;
    }

    let package_id = patch.package_id.unwrap_or(current.package_id);

    // Activity follows the package only when the package is part of the patch,
    // so a lapsed member does not reactivate on an unrelated edit.
    let is_active = match (patch.is_active, patch.package_id) {
        (Some(explicit), _) => explicit,
        (None, Some(new_package)) => new_package.is_some(),
        (None, None) => current.is_active,
    };

    let expires_at = match patch.package_id {
        Some(Some(new_package)) if Some(new_package) != current.package_id => {
            Some(term_end(term_days))
        }
        Some(None) => None,
        _ => current.package_expires_at,
    };

    sqlx::query(
        "UPDATE members
         SET name = ?, level = ?, gender = ?, date_of_birth = ?,
             package_id = ?, is_active = ?, package_expires_at = ?
         WHERE id = ?",
    )
    .bind(patch.name.unwrap_or(current.name))
    .bind(patch.level.unwrap_or(current.level))
    .bind(patch.gender.unwrap_or(current.gender))
    .bind(patch.date_of_birth.unwrap_or(current.date_of_birth))
    .bind(package_id)
    .bind(is_active)
    .bind(expires_at)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    drop(conn);

    get_member(pool, id).await
}

/// Removes the member's registrations, the member and its account row. Fails
/// with `BadRequest` if the account is still referenced elsewhere.
#[instrument]
pub async fn delete_member(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Deleting member");
    let member = get_member(pool, id).await?;

    let mut tx = pool.begin().await?;

    let removed = sqlx::query("DELETE FROM session_registrations WHERE member_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM members WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(member.user_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            on_foreign_key_violation(
                e,
                "Member account is still referenced by other records and cannot be deleted",
            )
        })?;

    tx.commit().await?;

    info!(registrations = removed.rows_affected(), "Member deleted");
    Ok(())
}

#[instrument]
pub async fn request_package(
    pool: &Pool<Sqlite>,
    member_id: i64,
    package_id: i64,
) -> Result<Member, AppError> {
    info!("Filing package request");
    get_member(pool, member_id).await?;

    let active = sqlx::query_scalar::<_, bool>("SELECT is_active FROM packages WHERE id = ?")
        .bind(package_id)
        .fetch_optional(pool)
        .await?;

    match active {
        None => return Err(AppError::not_found("Package", package_id)),
        Some(false) => {
            return Err(AppError::BadRequest(
                "This package is no longer offered".to_string(),
            ));
        }
        Some(true) => {}
    }

    sqlx::query("UPDATE members SET pending_package_id = ? WHERE id = ?")
        .bind(package_id)
        .bind(member_id)
        .execute(pool)
        .await?;

    get_member(pool, member_id).await
}

#[instrument]
pub async fn approve_package(
    pool: &Pool<Sqlite>,
    member_id: i64,
    term_days: i64,
) -> Result<Member, AppError> {
    info!("Approving package request");
    let res = sqlx::query(
        "UPDATE members
         SET package_id = pending_package_id, pending_package_id = NULL,
             is_active = TRUE, package_expires_at = ?
         WHERE id = ? AND pending_package_id IS NOT NULL",
    )
    .bind(term_end(term_days))
    .bind(member_id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        get_member(pool, member_id).await?;
        return Err(AppError::BadRequest(
            "Member has no pending package request".to_string(),
        ));
    }

    get_member(pool, member_id).await
}

#[instrument]
pub async fn reject_package(pool: &Pool<Sqlite>, member_id: i64) -> Result<Member, AppError> {
    info!("Rejecting package request");
    let res = sqlx::query(
        "UPDATE members SET pending_package_id = NULL
         WHERE id = ? AND pending_package_id IS NOT NULL",
    )
    .bind(member_id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        get_member(pool, member_id).await?;
        return Err(AppError::BadRequest(
            "Member has no pending package request".to_string(),
        ));
    }

    get_member(pool, member_id).await
}

#[instrument(skip(pool))]
pub async fn deactivate_expired_memberships(
    pool: &Pool<Sqlite>,
    now: NaiveDateTime,
) -> Result<u64, AppError> {
    info!("Deactivating lapsed memberships");
    let res = sqlx::query(
        "UPDATE members SET is_active = FALSE
         WHERE is_active = TRUE AND package_expires_at IS NOT NULL AND package_expires_at < ?",
    )
    .bind(now)
    .execute(pool)
    .await?;

    Ok(res.rows_affected())
}
