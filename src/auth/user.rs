use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::{AccountStatus, Permission, Role};
use crate::error::AppError;

/// An identity record. The password hash never leaves the data layer.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    pub role: Role,
    pub status: AccountStatus,
    pub created_at: NaiveDateTime,
}

#[derive(sqlx::FromRow, Clone)]
pub struct DbUser {
    pub id: i64,
    pub email: String,
    pub role: String,
    pub status: String,
    pub created_at: NaiveDateTime,
}

impl TryFrom<DbUser> for User {
    type Error = AppError;

    fn try_from(user: DbUser) -> Result<Self, Self::Error> {
        Ok(Self {
            id: user.id,
            email: user.email,
            role: Role::parse(&user.role)?,
            status: AccountStatus::parse(&user.status)?,
            created_at: user.created_at,
        })
    }
}

impl User {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.role.has_permission(permission)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn can_sign_in(&self) -> bool {
        self.status == AccountStatus::Approved
    }

    pub fn require_permission(&self, permission: Permission) -> Result<(), AppError> {
        if self.role.has_permission(permission) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = %self.id,
                role = %self.role.as_str(),
                permission = ?permission,
                "Permission denied"
            );
            Err(AppError::Authorization(
                "You don't have permission to perform this action".to_string(),
            ))
        }
    }
}
