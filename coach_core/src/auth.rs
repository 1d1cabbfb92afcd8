//! Roles, permissions and the authorization seam used by every use case.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::OrganizationContext;
use crate::{Error, Result};

/// Member role within an organization
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Admin,
    #[default]
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            "member" => Ok(Role::Member),
            other => Err(Error::Other(format!("Unknown role: {}", other))),
        }
    }
}

/// Capability required by a use case
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Permission {
    #[serde(rename = "programs:read")]
    ProgramsRead,
    #[serde(rename = "programs:write")]
    ProgramsWrite,
    #[serde(rename = "programs:delete")]
    ProgramsDelete,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ProgramsRead => "programs:read",
            Permission::ProgramsWrite => "programs:write",
            Permission::ProgramsDelete => "programs:delete",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "programs:read" => Ok(Permission::ProgramsRead),
            "programs:write" => Ok(Permission::ProgramsWrite),
            "programs:delete" => Ok(Permission::ProgramsDelete),
            other => Err(Error::Other(format!("Unknown permission: {}", other))),
        }
    }
}

/// Decides whether a caller may perform an action.
///
/// Checked before any repository access.
pub trait AuthorizationChecker: Send + Sync {
    fn has_permission(&self, ctx: &OrganizationContext, permission: Permission) -> bool;

    /// `Ok(())` when allowed, [`Error::Forbidden`] otherwise.
    fn require(&self, ctx: &OrganizationContext, permission: Permission) -> Result<()> {
        if self.has_permission(ctx, permission) {
            Ok(())
        } else {
            tracing::warn!(
                "Denied {} to user {} ({}) in organization {}",
                permission,
                ctx.user_id,
                ctx.member_role,
                ctx.organization_id
            );
            Err(Error::Forbidden(format!("Missing permission {}", permission)))
        }
    }
}

/// Static role → permission table.
///
/// Owners and admins get read, write and delete; members get read and write.
#[derive(Clone, Copy, Debug, Default)]
pub struct RolePermissions;

impl RolePermissions {
    pub fn permissions_for(role: Role) -> &'static [Permission] {
        match role {
            Role::Owner | Role::Admin => &[
                Permission::ProgramsRead,
                Permission::ProgramsWrite,
                Permission::ProgramsDelete,
            ],
            Role::Member => &[Permission::ProgramsRead, Permission::ProgramsWrite],
        }
    }
}

impl AuthorizationChecker for RolePermissions {
    fn has_permission(&self, ctx: &OrganizationContext, permission: Permission) -> bool {
        Self::permissions_for(ctx.member_role).contains(&permission)
    }
}
