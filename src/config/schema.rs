//! Configuration schema definitions.
//!
//! This module defines the complete settings tree managed by the store.
//! All types derive Serde traits; field declaration order is the canonical
//! serialization order, so two documents serialize to identical bytes iff
//! they are equal.
//!
//! Fields typed `Option<T>` are filled by [`Config::set_defaults`] rather than
//! by `Default`, either because the default is generated (salts) or because
//! it depends on the medium the document was loaded from.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PASSWORD_MINIMUM_LENGTH: u32 = 5;
pub const PASSWORD_MAXIMUM_LENGTH: u32 = 64;

pub const SQL_DRIVER_SQLITE: &str = "sqlite";
pub const SQL_DRIVER_POSTGRES: &str = "postgres";
pub const SQL_DRIVER_MYSQL: &str = "mysql";

pub const FILE_DRIVER_LOCAL: &str = "local";
pub const FILE_DRIVER_S3: &str = "amazons3";

pub const DEFAULT_LOCALE: &str = "en";

/// Locales the application ships translations for.
pub const SUPPORTED_LOCALES: &[&str] = &[
    "de", "en", "es", "fr", "it", "ja", "ko", "nl", "pl", "pt-BR", "ro", "ru", "tr", "uk",
    "zh-CN", "zh-TW",
];

/// Root settings document.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    pub service_settings: ServiceSettings,
    pub sql_settings: SqlSettings,
    pub password_settings: PasswordSettings,
    pub file_settings: FileSettings,
    pub email_settings: EmailSettings,
    pub localization_settings: LocalizationSettings,
    pub rate_limit_settings: RateLimitSettings,
    pub log_settings: LogSettings,
    pub experimental_settings: ExperimentalSettings,
    pub plugin_settings: PluginSettings,
}

impl Config {
    /// Fill every unset optional field.
    pub fn set_defaults(&mut self) {
        self.sql_settings.set_defaults();
        self.file_settings.set_defaults();
        self.localization_settings.set_defaults();
    }

    /// Take values generated by `set_defaults` from `previous` where unset,
    /// so repeated loads of the same document agree.
    pub fn inherit_generated(&mut self, previous: &Config) {
        if self.file_settings.public_link_salt.is_none() {
            self.file_settings.public_link_salt = previous.file_settings.public_link_salt.clone();
        }
    }

    /// Whether system admins are barred from changing `write_restrictable` fields.
    pub fn restrict_system_admin(&self) -> bool {
        self.experimental_settings.restrict_system_admin
    }
}

/// Core service behaviour.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Public URL of the site, without a trailing slash.
    pub site_url: String,

    /// Address the HTTP server binds to.
    pub listen_address: String,

    pub enable_developer: bool,

    pub allow_cookies_for_subdomains: bool,

    pub maximum_login_attempts: u32,

    pub session_length_web_in_days: u32,

    /// Headers consulted, in order, for the client IP behind a proxy.
    pub trusted_proxy_ip_header: Vec<String>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            site_url: String::new(),
            listen_address: ":8065".to_string(),
            enable_developer: false,
            allow_cookies_for_subdomains: false,
            maximum_login_attempts: 10,
            session_length_web_in_days: 30,
            trusted_proxy_ip_header: Vec::new(),
        }
    }
}

/// Application database connection settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SqlSettings {
    pub driver_name: String,

    /// Connection string. Defaults depend on the store the document came from.
    pub data_source: Option<String>,

    pub data_source_replicas: Vec<String>,

    pub max_idle_conns: u32,

    pub max_open_conns: u32,

    /// Query timeout in seconds.
    pub query_timeout: u32,
}

impl Default for SqlSettings {
    fn default() -> Self {
        Self {
            driver_name: SQL_DRIVER_SQLITE.to_string(),
            data_source: None,
            data_source_replicas: Vec::new(),
            max_idle_conns: 20,
            max_open_conns: 300,
            query_timeout: 30,
        }
    }
}

impl SqlSettings {
    fn set_defaults(&mut self) {
        if self.data_source.is_none() {
            self.data_source = Some("app.db".to_string());
        }
    }
}

/// Password complexity policy.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PasswordSettings {
    pub minimum_length: u32,
    pub lowercase: bool,
    pub number: bool,
    pub uppercase: bool,
    pub symbol: bool,
}

impl Default for PasswordSettings {
    fn default() -> Self {
        Self {
            minimum_length: 10,
            lowercase: true,
            number: true,
            uppercase: true,
            symbol: true,
        }
    }
}

/// Uploaded file storage.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FileSettings {
    pub driver_name: String,

    /// Root directory for the local driver. Always ends with `/`.
    pub directory: String,

    /// Maximum upload size in bytes.
    pub max_file_size: i64,

    /// Salt for public file links, generated on first start.
    pub public_link_salt: Option<String>,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            driver_name: FILE_DRIVER_LOCAL.to_string(),
            directory: "./data/".to_string(),
            max_file_size: 100 * 1024 * 1024,
            public_link_salt: None,
        }
    }
}

impl FileSettings {
    fn set_defaults(&mut self) {
        if self.public_link_salt.is_none() {
            self.public_link_salt = Some(Uuid::new_v4().simple().to_string());
        }
    }
}

/// Outgoing mail.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EmailSettings {
    pub enable_sign_up_with_email: bool,
    pub feedback_name: String,
    pub smtp_server: String,
    pub smtp_port: String,
    pub smtp_password: String,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            enable_sign_up_with_email: true,
            feedback_name: String::new(),
            smtp_server: "localhost".to_string(),
            smtp_port: "10025".to_string(),
            smtp_password: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LocalizationSettings {
    pub default_server_locale: Option<String>,
    pub default_client_locale: Option<String>,

    /// Comma separated list of locales offered to users. Empty means all.
    pub available_locales: String,
}

impl LocalizationSettings {
    fn set_defaults(&mut self) {
        if self.default_server_locale.is_none() {
            self.default_server_locale = Some(DEFAULT_LOCALE.to_string());
        }
        if self.default_client_locale.is_none() {
            self.default_client_locale = Some(DEFAULT_LOCALE.to_string());
        }
    }
}

/// API rate limiting.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub enable: bool,
    pub per_sec: u32,
    pub max_burst: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enable: false,
            per_sec: 10,
            max_burst: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LogSettings {
    pub enable_console: bool,

    /// One of DEBUG, INFO, WARN, ERROR.
    pub console_level: String,

    pub file_location: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            enable_console: true,
            console_level: "INFO".to_string(),
            file_location: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ExperimentalSettings {
    /// Bars system admins from editing fields tagged `write_restrictable`.
    pub restrict_system_admin: bool,
    pub client_side_cert_enable: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PluginSettings {
    pub enable: bool,
    pub enable_uploads: bool,
    pub directory: String,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            enable: true,
            enable_uploads: false,
            directory: "./plugins".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_defaults_fills_optionals() {
        let mut cfg = Config::default();
        assert!(cfg.sql_settings.data_source.is_none());

        cfg.set_defaults();
        assert_eq!(cfg.sql_settings.data_source.as_deref(), Some("app.db"));
        assert!(cfg.file_settings.public_link_salt.is_some());
        assert_eq!(cfg.localization_settings.default_server_locale.as_deref(), Some("en"));
        assert_eq!(cfg.localization_settings.default_client_locale.as_deref(), Some("en"));
    }

    #[test]
    fn test_set_defaults_keeps_existing_values() {
        let mut cfg = Config::default();
        cfg.sql_settings.data_source = Some("postgres://db".into());
        cfg.file_settings.public_link_salt = Some("salt".into());

        cfg.set_defaults();
        assert_eq!(cfg.sql_settings.data_source.as_deref(), Some("postgres://db"));
        assert_eq!(cfg.file_settings.public_link_salt.as_deref(), Some("salt"));
    }

    #[test]
    fn test_inherit_generated_only_fills_unset() {
        let mut previous = Config::default();
        previous.set_defaults();

        let mut cfg = Config::default();
        cfg.inherit_generated(&previous);
        assert_eq!(cfg.file_settings.public_link_salt, previous.file_settings.public_link_salt);

        cfg.file_settings.public_link_salt = Some("mine".into());
        cfg.inherit_generated(&previous);
        assert_eq!(cfg.file_settings.public_link_salt.as_deref(), Some("mine"));
    }

    #[test]
    fn test_partial_document_deserializes() {
        let cfg: Config = serde_json::from_str(r#"{"service_settings":{"site_url":"http://a"}}"#).unwrap();
        assert_eq!(cfg.service_settings.site_url, "http://a");
        assert_eq!(cfg.service_settings.maximum_login_attempts, 10);
        assert_eq!(cfg.log_settings, LogSettings::default());
    }
}
