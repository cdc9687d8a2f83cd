//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (lengths, pool sizes, ports)
//! - Reject mutually exclusive flag combinations
//! - Check enumerated values (drivers, log levels, locales)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: Config → Result<(), Vec<ValidationError>>
//! - Runs before a document is accepted into the store

use thiserror::Error;
use url::Url;

use crate::config::schema::{
    Config, FILE_DRIVER_LOCAL, FILE_DRIVER_S3, PASSWORD_MAXIMUM_LENGTH, PASSWORD_MINIMUM_LENGTH,
    SQL_DRIVER_MYSQL, SQL_DRIVER_POSTGRES, SQL_DRIVER_SQLITE, SUPPORTED_LOCALES,
};

/// A violated invariant, naming the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Signature of the validation hook run by the store pipeline.
pub type Validator = fn(&Config) -> Result<(), Vec<ValidationError>>;

const LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARN", "ERROR"];

/// Validate a complete document.
pub fn validate_config(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_service(config, &mut errors);
    validate_sql(config, &mut errors);
    validate_password(config, &mut errors);
    validate_files(config, &mut errors);
    validate_email(config, &mut errors);
    validate_localization(config, &mut errors);
    validate_rate_limit(config, &mut errors);
    validate_logs(config, &mut errors);
    validate_plugins(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_service(config: &Config, errors: &mut Vec<ValidationError>) {
    let s = &config.service_settings;

    if !s.site_url.is_empty() {
        match Url::parse(&s.site_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => errors.push(ValidationError::new(
                "service_settings.site_url",
                format!("unsupported scheme {:?}", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new(
                "service_settings.site_url",
                format!("invalid URL: {}", e),
            )),
        }
    }

    if s.maximum_login_attempts == 0 {
        errors.push(ValidationError::new(
            "service_settings.maximum_login_attempts",
            "must be greater than 0",
        ));
    }

    if s.session_length_web_in_days == 0 {
        errors.push(ValidationError::new(
            "service_settings.session_length_web_in_days",
            "must be greater than 0",
        ));
    }
}

fn validate_sql(config: &Config, errors: &mut Vec<ValidationError>) {
    let s = &config.sql_settings;

    if ![SQL_DRIVER_SQLITE, SQL_DRIVER_POSTGRES, SQL_DRIVER_MYSQL].contains(&s.driver_name.as_str()) {
        errors.push(ValidationError::new(
            "sql_settings.driver_name",
            format!("unknown driver {:?}", s.driver_name),
        ));
    }

    if s.data_source.as_deref().map_or(true, str::is_empty) {
        errors.push(ValidationError::new("sql_settings.data_source", "must be set"));
    }

    if s.max_open_conns == 0 {
        errors.push(ValidationError::new("sql_settings.max_open_conns", "must be greater than 0"));
    }

    if s.max_idle_conns > s.max_open_conns {
        errors.push(ValidationError::new(
            "sql_settings.max_idle_conns",
            format!(
                "{} exceeds max_open_conns ({})",
                s.max_idle_conns, s.max_open_conns
            ),
        ));
    }

    if s.query_timeout == 0 {
        errors.push(ValidationError::new("sql_settings.query_timeout", "must be greater than 0"));
    }
}

fn validate_password(config: &Config, errors: &mut Vec<ValidationError>) {
    let len = config.password_settings.minimum_length;
    if !(PASSWORD_MINIMUM_LENGTH..=PASSWORD_MAXIMUM_LENGTH).contains(&len) {
        errors.push(ValidationError::new(
            "password_settings.minimum_length",
            format!(
                "{} is outside {}..={}",
                len, PASSWORD_MINIMUM_LENGTH, PASSWORD_MAXIMUM_LENGTH
            ),
        ));
    }
}

fn validate_files(config: &Config, errors: &mut Vec<ValidationError>) {
    let s = &config.file_settings;

    if ![FILE_DRIVER_LOCAL, FILE_DRIVER_S3].contains(&s.driver_name.as_str()) {
        errors.push(ValidationError::new(
            "file_settings.driver_name",
            format!("unknown driver {:?}", s.driver_name),
        ));
    }

    if s.max_file_size <= 0 {
        errors.push(ValidationError::new("file_settings.max_file_size", "must be greater than 0"));
    }

    if s.public_link_salt.as_deref().is_some_and(|salt| salt.len() < 32) {
        errors.push(ValidationError::new(
            "file_settings.public_link_salt",
            "must be at least 32 characters",
        ));
    }
}

fn validate_email(config: &Config, errors: &mut Vec<ValidationError>) {
    let port = &config.email_settings.smtp_port;
    if !port.is_empty() && port.parse::<u16>().is_err() {
        errors.push(ValidationError::new(
            "email_settings.smtp_port",
            format!("{:?} is not a valid port", port),
        ));
    }
}

fn validate_localization(config: &Config, errors: &mut Vec<ValidationError>) {
    let s = &config.localization_settings;
    for locale in s.available_locales.split(',').map(str::trim).filter(|l| !l.is_empty()) {
        if !SUPPORTED_LOCALES.contains(&locale) {
            errors.push(ValidationError::new(
                "localization_settings.available_locales",
                format!("unsupported locale {:?}", locale),
            ));
        }
    }
}

fn validate_rate_limit(config: &Config, errors: &mut Vec<ValidationError>) {
    let s = &config.rate_limit_settings;
    if !s.enable {
        return;
    }
    if s.per_sec == 0 {
        errors.push(ValidationError::new("rate_limit_settings.per_sec", "must be greater than 0"));
    }
    if s.max_burst == 0 {
        errors.push(ValidationError::new("rate_limit_settings.max_burst", "must be greater than 0"));
    }
}

fn validate_logs(config: &Config, errors: &mut Vec<ValidationError>) {
    let level = &config.log_settings.console_level;
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "log_settings.console_level",
            format!("unknown level {:?}", level),
        ));
    }
}

fn validate_plugins(config: &Config, errors: &mut Vec<ValidationError>) {
    let s = &config.plugin_settings;
    if s.enable_uploads && !s.enable {
        errors.push(ValidationError::new(
            "plugin_settings.enable_uploads",
            "plugin uploads require plugins to be enabled",
        ));
    }
}
