//! Permission catalog.
//!
//! The catalog is built once and passed by reference; it is never mutated.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

pub const SCOPE_SYSTEM: &str = "system_scope";
pub const SCOPE_TEAM: &str = "team_scope";
pub const SCOPE_CHANNEL: &str = "channel_scope";

pub const MANAGE_SYSTEM: &str = "manage_system";

/// System console areas with read and write permissions.
pub const SYSCONSOLE_AREAS: &[&str] = &[
    "about",
    "reporting",
    "user_management_users",
    "user_management_groups",
    "user_management_teams",
    "user_management_channels",
    "user_management_permissions",
    "environment",
    "site",
    "authentication",
    "plugins",
    "integrations",
    "compliance",
    "experimental",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Permission {
    pub id: String,
    pub scope: String,
}

impl Permission {
    pub fn new(id: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            scope: scope.into(),
        }
    }
}

/// Direction of access to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessType {
    Read,
    Write,
}

impl AccessType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessType::Read => "read",
            AccessType::Write => "write",
        }
    }

    /// `sysconsole_<direction>_<area>`.
    pub fn sysconsole_permission(&self, area: &str) -> String {
        format!("sysconsole_{}_{}", self.as_str(), area)
    }
}

impl fmt::Display for AccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every permission the system knows, by id.
#[derive(Debug, Clone)]
pub struct PermissionCatalog {
    by_id: HashMap<String, Permission>,
}

impl PermissionCatalog {
    /// `manage_system` plus a read and a write permission per console area.
    pub fn new() -> Self {
        let mut permissions = vec![
            Permission::new(MANAGE_SYSTEM, SCOPE_SYSTEM),
            Permission::new("manage_team", SCOPE_TEAM),
            Permission::new("manage_public_channel_properties", SCOPE_CHANNEL),
        ];
        for access in [AccessType::Read, AccessType::Write] {
            for area in SYSCONSOLE_AREAS {
                permissions.push(Permission::new(access.sysconsole_permission(area), SCOPE_SYSTEM));
            }
        }
        Self::from_permissions(permissions)
    }

    pub fn from_permissions<I>(permissions: I) -> Self
    where
        I: IntoIterator<Item = Permission>,
    {
        Self {
            by_id: permissions.into_iter().map(|p| (p.id.clone(), p)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Permission> {
        self.by_id.get(id)
    }

    pub fn manage_system(&self) -> Option<&Permission> {
        self.get(MANAGE_SYSTEM)
    }

    /// All `sysconsole_<direction>_*` permissions, sorted by id.
    pub fn sysconsole(&self, access: AccessType) -> Vec<&Permission> {
        let prefix = format!("sysconsole_{}_", access.as_str());
        let mut out: Vec<&Permission> = self
            .by_id
            .values()
            .filter(|p| p.id.starts_with(&prefix))
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// All permissions, sorted by id.
    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        let mut all: Vec<&Permission> = self.by_id.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all.into_iter()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl Default for PermissionCatalog {
    fn default() -> Self {
        Self::new()
    }
}
