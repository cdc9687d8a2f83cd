//! Environment variable overrides.
//!
//! A variable named `<PREFIX>_<SECTION>_<FIELD>` (uppercase) replaces the
//! loaded value of that field. Overrides are applied to the active document
//! only; what gets persisted keeps the values the medium had.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::config::fields::FIELDS;
use crate::config::schema::Config;
use crate::config::validation::ValidationError;

pub const DEFAULT_ENV_PREFIX: &str = "CS";

/// Snapshot of environment variables consulted for overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Capture the current process environment.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Fields whose active value came from the environment.
pub type OverriddenFields = BTreeSet<&'static str>;

/// Apply every override present in `env`, returning the new document and the
/// paths that were overridden.
pub fn apply_environment_overrides(
    config: &Config,
    env: &Environment,
    prefix: &str,
) -> Result<(Config, OverriddenFields), Vec<ValidationError>> {
    let mut overridden = OverriddenFields::new();
    if env.is_empty() {
        return Ok((config.clone(), overridden));
    }

    let mut doc = to_value(config)?;
    let mut errors = Vec::new();

    for field in FIELDS {
        let var = field.env_var(prefix);
        let Some(raw) = env.get(&var) else { continue };

        match field.parse_env(raw) {
            Ok(value) => {
                // Reject values the schema type cannot hold (e.g. negative into u32).
                let mut probe = doc.clone();
                field.set(&mut probe, value.clone());
                if let Err(e) = serde_json::from_value::<Config>(probe) {
                    errors.push(ValidationError {
                        field: field.path,
                        message: format!("{}: {}", var, e),
                    });
                    continue;
                }
                field.set(&mut doc, value);
                overridden.insert(field.path);
            }
            Err(message) => errors.push(ValidationError {
                field: field.path,
                message: format!("{}: {}", var, message),
            }),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    if overridden.is_empty() {
        return Ok((config.clone(), overridden));
    }

    let config = from_value(doc)?;
    tracing::debug!(fields = ?overridden, "Applied environment overrides");
    Ok((config, overridden))
}

/// Put back the pre-override values of `overridden` fields, taken from `persisted`.
pub fn remove_environment_overrides(
    config: &Config,
    persisted: &Config,
    overridden: &OverriddenFields,
) -> Result<Config, Vec<ValidationError>> {
    if overridden.is_empty() {
        return Ok(config.clone());
    }

    let mut doc = to_value(config)?;
    let source = to_value(persisted)?;
    for field in FIELDS.iter().filter(|f| overridden.contains(f.path)) {
        if let Some(original) = field.get(&source) {
            field.set(&mut doc, original.clone());
        }
    }
    from_value(doc)
}

fn to_value(config: &Config) -> Result<Value, Vec<ValidationError>> {
    serde_json::to_value(config).map_err(|e| {
        vec![ValidationError {
            field: "config",
            message: e.to_string(),
        }]
    })
}

fn from_value(doc: Value) -> Result<Config, Vec<ValidationError>> {
    serde_json::from_value(doc).map_err(|e| {
        vec![ValidationError {
            field: "config",
            message: e.to_string(),
        }]
    })
}
