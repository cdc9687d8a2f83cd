//! Idempotent repairs and secret masking.

use serde_json::Value;

use crate::config::fields::{FieldKind, FAKE_SETTING, FIELDS};
use crate::config::schema::{Config, DEFAULT_LOCALE, FILE_DRIVER_LOCAL, SUPPORTED_LOCALES};

/// Patch invalid or missing data in place, returning true if anything changed.
pub fn fix_config(config: &mut Config) -> bool {
    let mut changed = false;

    let site_url = &mut config.service_settings.site_url;
    if site_url.ends_with('/') {
        let trimmed = site_url.trim_end_matches('/').len();
        site_url.truncate(trimmed);
        changed = true;
    }

    let files = &mut config.file_settings;
    if files.driver_name == FILE_DRIVER_LOCAL && !files.directory.ends_with('/') {
        files.directory.push('/');
        changed = true;
    }

    if fix_invalid_locales(config) {
        changed = true;
    }

    changed
}

fn is_supported(locale: &str) -> bool {
    SUPPORTED_LOCALES.contains(&locale)
}

fn fix_invalid_locales(config: &mut Config) -> bool {
    let mut changed = false;
    let s = &mut config.localization_settings;

    for locale in [&mut s.default_server_locale, &mut s.default_client_locale] {
        if let Some(value) = locale {
            if !is_supported(value) {
                tracing::warn!(locale = %value, "Unsupported locale, falling back to default");
                *value = DEFAULT_LOCALE.to_string();
                changed = true;
            }
        }
    }

    let available: Vec<&str> = s
        .available_locales
        .split(',')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if !available.is_empty() {
        if let Some(client) = s.default_client_locale.as_deref() {
            if !available.contains(&client) {
                s.available_locales = format!("{},{}", available.join(","), client);
                changed = true;
            }
        }
    }

    changed
}

impl Config {
    /// Replace every non-empty secret with [`FAKE_SETTING`].
    pub fn sanitize(&mut self) {
        let Ok(mut doc) = serde_json::to_value(&*self) else {
            return;
        };
        for field in FIELDS.iter().filter(|f| f.secret) {
            let masked = match field.get(&doc) {
                Some(Value::String(s)) if !s.is_empty() => Value::String(FAKE_SETTING.to_string()),
                Some(Value::Array(items)) => Value::Array(
                    items
                        .iter()
                        .map(|_| Value::String(FAKE_SETTING.to_string()))
                        .collect(),
                ),
                _ => continue,
            };
            field.set(&mut doc, masked);
        }
        if let Ok(sanitized) = serde_json::from_value(doc) {
            *self = sanitized;
        }
    }

    /// Restore secrets that `target` carries as [`FAKE_SETTING`] from `actual`.
    pub fn desanitize(&mut self, actual: &Config) {
        let (Ok(mut doc), Ok(source)) = (serde_json::to_value(&*self), serde_json::to_value(actual))
        else {
            return;
        };
        let mut restored = false;
        for field in FIELDS.iter().filter(|f| f.secret) {
            let is_fake = match (field.kind, field.get(&doc)) {
                (FieldKind::StrList, Some(Value::Array(items))) => {
                    !items.is_empty() && items.iter().all(|v| v.as_str() == Some(FAKE_SETTING))
                }
                (_, Some(Value::String(s))) => s == FAKE_SETTING,
                _ => false,
            };
            if is_fake {
                if let Some(original) = field.get(&source).cloned() {
                    field.set(&mut doc, original);
                    restored = true;
                }
            }
        }
        if restored {
            if let Ok(desanitized) = serde_json::from_value(doc) {
                *self = desanitized;
            }
        }
    }
}
