//! Answering "does this caller hold that permission".

use std::collections::HashSet;

use dashmap::DashMap;

use crate::security::permissions::{AccessType, Permission, PermissionCatalog, MANAGE_SYSTEM};

pub const ROLE_SYSTEM_ADMIN: &str = "system_admin";
pub const ROLE_SYSTEM_READ_ONLY_ADMIN: &str = "system_read_only_admin";
pub const ROLE_SYSTEM_USER: &str = "system_user";

/// The caller on whose behalf the filter runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub roles: Vec<String>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, roles: &[&str]) -> Self {
        Self {
            user_id: user_id.into(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }
}

pub trait PermissionResolver: Send + Sync {
    fn has_permission(&self, session: &Session, permission: &Permission) -> bool;
}

impl<F> PermissionResolver for F
where
    F: Fn(&Session, &Permission) -> bool + Send + Sync,
{
    fn has_permission(&self, session: &Session, permission: &Permission) -> bool {
        self(session, permission)
    }
}

/// Role name → granted permission ids.
#[derive(Debug, Default)]
pub struct RolePermissions {
    roles: DashMap<String, HashSet<String>>,
}

impl RolePermissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// `system_admin` holds everything, `system_read_only_admin` every
    /// console read permission, `system_user` nothing.
    pub fn with_builtin_roles(catalog: &PermissionCatalog) -> Self {
        let roles = Self::new();
        for permission in catalog.iter() {
            roles.grant(ROLE_SYSTEM_ADMIN, &permission.id);
        }
        for permission in catalog.sysconsole(AccessType::Read) {
            roles.grant(ROLE_SYSTEM_READ_ONLY_ADMIN, &permission.id);
        }
        roles.roles.entry(ROLE_SYSTEM_USER.to_string()).or_default();
        roles
    }

    pub fn grant(&self, role: &str, permission_id: &str) {
        self.roles
            .entry(role.to_string())
            .or_default()
            .insert(permission_id.to_string());
    }

    pub fn revoke(&self, role: &str, permission_id: &str) -> bool {
        self.roles
            .get_mut(role)
            .is_some_and(|mut granted| granted.remove(permission_id))
    }

    pub fn is_admin(&self, session: &Session) -> bool {
        session.roles.iter().any(|role| {
            self.roles
                .get(role)
                .is_some_and(|granted| granted.contains(MANAGE_SYSTEM))
        })
    }
}

impl PermissionResolver for RolePermissions {
    fn has_permission(&self, session: &Session, permission: &Permission) -> bool {
        session.roles.iter().any(|role| {
            self.roles
                .get(role)
                .is_some_and(|granted| granted.contains(&permission.id))
        })
    }
}
