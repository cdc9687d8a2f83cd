//! Permission-scoped views of and changes to the settings document.
//!
//! Each leaf's access tag decides who may see or change it:
//! 1. `write_restrictable` denies every write while the document has
//!    "restrict system admin" enabled. Reads are unaffected.
//! 2. Any other token `t` allows the caller if they hold
//!    `sysconsole_<read|write>_t`.
//! 3. Failing that, `manage_system` allows everything.
//!
//! Sections are always present in a read projection, even when empty.

use serde_json::{Map, Value};

use crate::config::fields::{self, FieldKind, FieldSpec, FAKE_SETTING, FIELDS, WRITE_RESTRICTABLE};
use crate::config::{Config, ValidationError};
use crate::error::{StoreError, StoreResult};
use crate::security::permissions::{AccessType, PermissionCatalog, MANAGE_SYSTEM};
use crate::security::resolver::{PermissionResolver, Session};

/// Stateless filter over a catalog and a resolver.
pub struct ConfigFilter<'a> {
    catalog: &'a PermissionCatalog,
    resolver: &'a dyn PermissionResolver,
}

impl<'a> ConfigFilter<'a> {
    pub fn new(catalog: &'a PermissionCatalog, resolver: &'a dyn PermissionResolver) -> Self {
        Self { catalog, resolver }
    }

    /// Whether `session` may access `field` in direction `access`.
    ///
    /// `restrict_system_admin` comes from the active document.
    pub fn is_allowed(
        &self,
        session: &Session,
        field: &FieldSpec,
        access: AccessType,
        restrict_system_admin: bool,
    ) -> bool {
        if access == AccessType::Write
            && restrict_system_admin
            && field.is_write_restrictable()
        {
            return false;
        }

        for token in field.access_tokens().filter(|t| *t != WRITE_RESTRICTABLE) {
            let id = access.sysconsole_permission(token);
            match self.catalog.get(&id) {
                Some(permission) => {
                    if self.resolver.has_permission(session, permission) {
                        return true;
                    }
                }
                None => tracing::warn!(tag_value = %id, "Unrecognized config permissions tag value"),
            }
        }

        self.holds(session, MANAGE_SYSTEM)
    }

    /// The parts of `config` the caller may read, as a JSON object.
    ///
    /// Secrets come out as [`FAKE_SETTING`].
    pub fn read_projection(&self, config: &Config, session: &Session) -> StoreResult<Value> {
        let mut sanitized = config.clone();
        sanitized.sanitize();
        let doc = to_value(&sanitized)?;
        let restrict = config.restrict_system_admin();

        let mut out = Value::Object(Map::new());
        if let Value::Object(map) = &mut out {
            for section in fields::sections() {
                map.insert(section.to_string(), Value::Object(Map::new()));
            }
        }
        for field in FIELDS {
            if !self.is_allowed(session, field, AccessType::Read, restrict) {
                continue;
            }
            if let Some(value) = field.get(&doc) {
                field.set(&mut out, value.clone());
            }
        }
        Ok(out)
    }

    /// Merge `patch` onto `base`, allowing only changes the caller may write.
    ///
    /// Leaves equal to `base`, and secrets still holding the sanitized
    /// placeholder, are not changes. `base` should be the active document:
    /// its "restrict system admin" flag governs the veto.
    pub fn apply_patch(&self, base: &Config, patch: &Value, session: &Session) -> StoreResult<Config> {
        let Value::Object(sections) = patch else {
            return Err(StoreError::Validation(vec![ValidationError {
                field: "config",
                message: "patch must be a JSON object".to_string(),
            }]));
        };

        let mut doc = to_value(base)?;
        let restrict = base.restrict_system_admin();
        let mut leaves = Vec::new();
        collect_leaves("", sections, &mut leaves)?;

        for (path, value) in leaves {
            let field = fields::lookup(&path).ok_or_else(|| StoreError::UnknownSetting { path: path.clone() })?;

            if field.secret && value.as_str() == Some(FAKE_SETTING) {
                continue;
            }
            if field.get(&doc) == Some(value) {
                continue;
            }
            if !accepts(field.kind, value) {
                return Err(StoreError::Validation(vec![ValidationError {
                    field: field.path,
                    message: format!("unexpected value {}", value),
                }]));
            }
            if !self.is_allowed(session, field, AccessType::Write, restrict) {
                return Err(StoreError::PermissionDenied { path });
            }
            field.set(&mut doc, value.clone());
        }

        serde_json::from_value(doc).map_err(|e| {
            StoreError::Validation(vec![ValidationError {
                field: "config",
                message: e.to_string(),
            }])
        })
    }

    /// Whether the caller holds any console read permission.
    pub fn can_read_any(&self, session: &Session) -> bool {
        self.holds_any(session, AccessType::Read)
    }

    /// Whether the caller holds any console write permission.
    pub fn can_write_any(&self, session: &Session) -> bool {
        self.holds_any(session, AccessType::Write)
    }

    fn holds_any(&self, session: &Session, access: AccessType) -> bool {
        self.holds(session, MANAGE_SYSTEM)
            || self
                .catalog
                .sysconsole(access)
                .into_iter()
                .any(|p| self.resolver.has_permission(session, p))
    }

    fn holds(&self, session: &Session, id: &str) -> bool {
        self.catalog
            .get(id)
            .is_some_and(|permission| self.resolver.has_permission(session, permission))
    }
}

/// Flatten nested objects into `(dotted path, leaf)` pairs. Objects are
/// descended into only where the schema has a section of that name.
fn collect_leaves<'v>(
    prefix: &str,
    map: &'v Map<String, Value>,
    out: &mut Vec<(String, &'v Value)>,
) -> StoreResult<()> {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            Value::Object(inner) if fields::lookup(&path).is_none() => {
                if !is_section(&path) {
                    return Err(StoreError::UnknownSetting { path });
                }
                collect_leaves(&path, inner, out)?;
            }
            _ => out.push((path, value)),
        }
    }
    Ok(())
}

fn is_section(path: &str) -> bool {
    let prefix = format!("{}.", path);
    FIELDS.iter().any(|f| f.path.starts_with(&prefix))
}

fn accepts(kind: FieldKind, value: &Value) -> bool {
    match kind {
        FieldKind::Str => value.is_string(),
        FieldKind::OptionalStr => value.is_string() || value.is_null(),
        FieldKind::Bool => value.is_boolean(),
        FieldKind::Int => value.is_i64() || value.is_u64(),
        FieldKind::StrList => value
            .as_array()
            .is_some_and(|items| items.iter().all(Value::is_string)),
    }
}

fn to_value(config: &Config) -> StoreResult<Value> {
    serde_json::to_value(config).map_err(|e| {
        StoreError::Validation(vec![ValidationError {
            field: "config",
            message: e.to_string(),
        }])
    })
}
