use chrono::Utc;
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::members::{NewMember, insert_member};
use super::trainers::{NewTrainer, insert_trainer};
use crate::auth::{AccountStatus, DbUser, Role, User};
use crate::error::{AppError, on_unique_violation};

#[cfg(not(test))]
const HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const HASH_COST: u32 = 4;

const USER_COLUMNS: &str = "id, email, role, status, created_at";

/// Role-specific profile created together with an account.
#[derive(Debug, Clone)]
pub enum AccountProfile {
    Member(NewMember),
    Trainer(NewTrainer),
    None,
}

impl AccountProfile {
    pub fn role(&self) -> Role {
        match self {
            AccountProfile::Member(_) => Role::Member,
            AccountProfile::Trainer(_) => Role::Trainer,
            AccountProfile::None => Role::Admin,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub status: AccountStatus,
    pub profile: AccountProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedAccount {
    pub user_id: i64,
    pub profile_id: Option<i64>,
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    Ok(bcrypt::hash(password, HASH_COST)?)
}

/// Placeholder written over the email of rejected and deleted accounts, so the
/// original address can register again.
fn anonymized_email(user_id: i64, reason: &str) -> String {
    format!(
        "{}-{}-{}@removed.invalid",
        reason,
        user_id,
        Uuid::new_v4().simple()
    )
}

#[instrument]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Fetching user by ID");
    let row = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {} FROM users WHERE id = ?",
        USER_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(user) => User::try_from(user),
        None => Err(AppError::not_found("User", id)),
    }
}

#[instrument]
pub async fn find_user_by_email(pool: &Pool<Sqlite>, email: &str) -> Result<Option<User>, AppError> {
    info!("Looking up user by email");
    let row = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {} FROM users WHERE email = ?",
        USER_COLUMNS
    ))
    .bind(email)
    .fetch_optional(pool)
    .await?;

    row.map(User::try_from).transpose()
}

#[instrument]
pub async fn get_users(
    pool: &Pool<Sqlite>,
    status: Option<AccountStatus>,
    role: Option<Role>,
) -> Result<Vec<User>, AppError> {
    info!("Listing users");
    let rows = sqlx::query_as::<_, DbUser>(&format!(
        "SELECT {} FROM users
         WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR role = ?2)
         ORDER BY created_at DESC, id DESC",
        USER_COLUMNS
    ))
    .bind(status.map(|s| s.as_str()))
    .bind(role.map(|r| r.as_str()))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(User::try_from).collect()
}

/// Returns the user when the password matches. Whether the account may sign in
/// is left to the caller.
#[instrument(skip_all, fields(email = %email))]
pub async fn authenticate_user(
    pool: &Pool<Sqlite>,
    email: &str,
    password: &str,
) -> Result<Option<User>, AppError> {
    info!("Authenticating user");
    let row = sqlx::query_as::<_, (i64, String)>("SELECT id, password FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    let Some((id, hash)) = row else {
        return Ok(None);
    };

    match bcrypt::verify(password, &hash) {
        Ok(true) => Ok(Some(get_user(pool, id).await?)),
        Ok(false) => Ok(None),
        Err(e) => {
            warn!(user_id = %id, error = %e, "Stored password hash could not be verified");
            Ok(None)
        }
    }
}

async fn insert_user(
    conn: &mut SqliteConnection,
    email: &str,
    password_hash: &str,
    role: Role,
    status: AccountStatus,
) -> Result<i64, AppError> {
    let res = sqlx::query(
        "INSERT INTO users (email, password, role, status, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(email)
    .bind(password_hash)
    .bind(role.as_str())
    .bind(status.as_str())
    .bind(Utc::now().naive_utc())
    .execute(conn)
    .await
    .map_err(|e| on_unique_violation(e, "Email is already registered"))?;

    Ok(res.last_insert_rowid())
}

/// Creates the identity and its role profile in one transaction.
/// `membership_term_days` sets the term of a package assigned at creation.
#[instrument(skip_all, fields(email = %account.email, role = %account.profile.role()))]
pub async fn create_account(
    pool: &Pool<Sqlite>,
    account: NewAccount,
    membership_term_days: i64,
) -> Result<CreatedAccount, AppError> {
    info!("Creating new account");

    if find_user_by_email(pool, &account.email).await?.is_some() {
        return Err(AppError::BadRequest(
            "Email is already registered".to_string(),
        ));
    }

    let hashed_password = hash_password(&account.password)?;
    let role = account.profile.role();

    let mut tx = pool.begin().await?;
    let user_id = insert_user(&mut tx, &account.email, &hashed_password, role, account.status).await?;

    let profile_id = match &account.profile {
        AccountProfile::Member(member) => {
            Some(insert_member(&mut tx, user_id, member, membership_term_days).await?)
        }
        AccountProfile::Trainer(trainer) => Some(insert_trainer(&mut tx, user_id, trainer).await?),
        AccountProfile::None => None,
    };

    tx.commit().await?;

    info!(user_id = %user_id, "Account created");
    Ok(CreatedAccount {
        user_id,
        profile_id,
    })
}

#[instrument(skip_all, fields(email = %email))]
pub async fn ensure_admin(pool: &Pool<Sqlite>, email: &str, password: &str) -> Result<bool, AppError> {
    if find_user_by_email(pool, email).await?.is_some() {
        info!("Bootstrap admin already present");
        return Ok(false);
    }

    create_account(
        pool,
        NewAccount {
            email: email.to_string(),
            password: password.to_string(),
            status: AccountStatus::Approved,
            profile: AccountProfile::None,
        },
        0,
    )
    .await?;

    info!("Bootstrap admin created");
    Ok(true)
}

#[instrument]
pub async fn approve_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Approving user");
    let res = sqlx::query("UPDATE users SET status = 'approved' WHERE id = ? AND status = 'pending'")
        .bind(id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        let user = get_user(pool, id).await?;
        return Err(AppError::BadRequest(format!(
            "Only pending accounts can be approved (account is {})",
            user.status
        )));
    }

    get_user(pool, id).await
}

#[instrument]
pub async fn reject_user(pool: &Pool<Sqlite>, id: i64) -> Result<User, AppError> {
    info!("Rejecting user");
    let res = sqlx::query(
        "UPDATE users SET status = 'rejected', email = ? WHERE id = ? AND status = 'pending'",
    )
    .bind(anonymized_email(id, "rejected"))
    .bind(id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        let user = get_user(pool, id).await?;
        return Err(AppError::BadRequest(format!(
            "Only pending accounts can be rejected (account is {})",
            user.status
        )));
    }

    get_user(pool, id).await
}

/// Account soft delete. The row and its profile stay; the email is freed and
/// the account can no longer sign in.
#[instrument]
pub async fn soft_delete_user(pool: &Pool<Sqlite>, id: i64) -> Result<(), AppError> {
    info!("Soft-deleting user");
    let res = sqlx::query(
        "UPDATE users SET status = 'deleted', email = ? WHERE id = ? AND status != 'deleted'",
    )
    .bind(anonymized_email(id, "deleted"))
    .bind(id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        get_user(pool, id).await?;
        return Err(AppError::BadRequest("Account is already deleted".to_string()));
    }

    Ok(())
}

#[instrument(skip_all, fields(user_id = %user_id))]
pub async fn update_user_password(
    pool: &Pool<Sqlite>,
    user_id: i64,
    new_password: &str,
) -> Result<(), AppError> {
    info!("Updating user password");
    let hashed_password = hash_password(new_password)?;

    let res = sqlx::query("UPDATE users SET password = ? WHERE id = ?")
        .bind(hashed_password)
        .bind(user_id)
        .execute(pool)
        .await?;

    if res.rows_affected() == 0 {
        return Err(AppError::not_found("User", user_id));
    }

    Ok(())
}
