use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewOwnProfile,
    EditOwnProfile,
    ViewCatalog,
    RegisterForSessions,
    RateTrainers,
    RequestPackage,

    ViewMembers,
    ManageOwnSessions,

    ManageUsers,
    ManageMembers,
    ManageTrainers,
    ManagePackages,
    ManageAllSessions,
    SendNotifications,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Trainer,
    Admin,
}

static MEMBER_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ViewOwnProfile);
    permissions.insert(Permission::EditOwnProfile);
    permissions.insert(Permission::ViewCatalog);
    permissions.insert(Permission::RegisterForSessions);
    permissions.insert(Permission::RateTrainers);
    permissions.insert(Permission::RequestPackage);

    permissions
});

static TRAINER_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ViewOwnProfile);
    permissions.insert(Permission::EditOwnProfile);
    permissions.insert(Permission::ViewCatalog);
    permissions.insert(Permission::ViewMembers);
    permissions.insert(Permission::ManageOwnSessions);

    permissions
});

// Admins manage everything but do not act as members (no registering, rating
// or package requests).
static ADMIN_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ViewOwnProfile);
    permissions.insert(Permission::ViewCatalog);
    permissions.insert(Permission::ViewMembers);
    permissions.insert(Permission::ManageOwnSessions);

    permissions.insert(Permission::ManageUsers);
    permissions.insert(Permission::ManageMembers);
    permissions.insert(Permission::ManageTrainers);
    permissions.insert(Permission::ManagePackages);
    permissions.insert(Permission::ManageAllSessions);
    permissions.insert(Permission::SendNotifications);

    permissions
});

impl Role {
    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            Role::Member => &MEMBER_PERMISSIONS,
            Role::Trainer => &TRAINER_PERMISSIONS,
            Role::Admin => &ADMIN_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Trainer => "trainer",
            Role::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "member" => Ok(Role::Member),
            "trainer" => Ok(Role::Trainer),
            "admin" => Ok(Role::Admin),
            _ => Err(AppError::Internal(format!("Unknown role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Approval state of an account.
///
/// `pending -> approved | rejected` through the admin endpoints, `deleted` is
/// reached only through the account soft-delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Pending,
    Approved,
    Rejected,
    Deleted,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Pending => "pending",
            AccountStatus::Approved => "approved",
            AccountStatus::Rejected => "rejected",
            AccountStatus::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "pending" => Ok(AccountStatus::Pending),
            "approved" => Ok(AccountStatus::Approved),
            "rejected" => Ok(AccountStatus::Rejected),
            "deleted" => Ok(AccountStatus::Deleted),
            _ => Err(AppError::BadRequest(format!("Unknown account status: {}", s))),
        }
    }

    /// Status an account starts in. Admins skip the approval queue.
    pub fn initial_for(role: Role) -> Self {
        match role {
            Role::Admin => AccountStatus::Approved,
            Role::Member | Role::Trainer => AccountStatus::Pending,
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
