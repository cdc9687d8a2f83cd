//! Static field table for the settings tree.
//!
//! Every leaf of [`Config`](crate::config::Config) is listed here with its
//! dotted path, access tag, value kind and whether it holds a secret. The
//! permission filter, environment overrides and sanitization all walk this
//! table instead of inspecting the document at runtime.

use serde_json::{Map, Value};

/// Access tag token that vetoes writes while "restrict system admin" is on.
pub const WRITE_RESTRICTABLE: &str = "write_restrictable";

/// Placeholder written over secrets before a document leaves the process.
pub const FAKE_SETTING: &str = "********";

/// JSON shape of a leaf value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Str,
    /// A string that is `null` until defaults are applied.
    OptionalStr,
    Bool,
    Int,
    /// Whitespace separated when read from the environment.
    StrList,
}

/// A single leaf of the settings tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Dotted path, e.g. `service_settings.site_url`.
    pub path: &'static str,
    /// Comma separated access scopes.
    pub access: &'static str,
    pub kind: FieldKind,
    pub secret: bool,
}

const fn field(path: &'static str, access: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        path,
        access,
        kind,
        secret: false,
    }
}

const fn secret(path: &'static str, access: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        path,
        access,
        kind,
        secret: true,
    }
}

use FieldKind::{Bool, Int, OptionalStr, Str, StrList};

/// All leaves in declaration order.
pub static FIELDS: &[FieldSpec] = &[
    field("service_settings.site_url", "environment,authentication,write_restrictable", Str),
    field("service_settings.listen_address", "environment,write_restrictable", Str),
    field("service_settings.enable_developer", "environment", Bool),
    field("service_settings.allow_cookies_for_subdomains", "write_restrictable", Bool),
    field("service_settings.maximum_login_attempts", "authentication", Int),
    field("service_settings.session_length_web_in_days", "environment", Int),
    field("service_settings.trusted_proxy_ip_header", "environment,write_restrictable", StrList),
    field("sql_settings.driver_name", "environment,write_restrictable", Str),
    secret("sql_settings.data_source", "environment,write_restrictable", OptionalStr),
    secret("sql_settings.data_source_replicas", "environment,write_restrictable", StrList),
    field("sql_settings.max_idle_conns", "environment,write_restrictable", Int),
    field("sql_settings.max_open_conns", "environment,write_restrictable", Int),
    field("sql_settings.query_timeout", "environment,write_restrictable", Int),
    field("password_settings.minimum_length", "authentication", Int),
    field("password_settings.lowercase", "authentication", Bool),
    field("password_settings.number", "authentication", Bool),
    field("password_settings.uppercase", "authentication", Bool),
    field("password_settings.symbol", "authentication", Bool),
    field("file_settings.driver_name", "environment,write_restrictable", Str),
    field("file_settings.directory", "environment,write_restrictable", Str),
    field("file_settings.max_file_size", "environment", Int),
    secret("file_settings.public_link_salt", "site", OptionalStr),
    field("email_settings.enable_sign_up_with_email", "authentication", Bool),
    field("email_settings.feedback_name", "site", Str),
    field("email_settings.smtp_server", "environment", Str),
    field("email_settings.smtp_port", "environment", Str),
    secret("email_settings.smtp_password", "environment", Str),
    field("localization_settings.default_server_locale", "site", OptionalStr),
    field("localization_settings.default_client_locale", "site", OptionalStr),
    field("localization_settings.available_locales", "site", Str),
    field("rate_limit_settings.enable", "environment", Bool),
    field("rate_limit_settings.per_sec", "environment", Int),
    field("rate_limit_settings.max_burst", "environment", Int),
    field("log_settings.enable_console", "environment,write_restrictable", Bool),
    field("log_settings.console_level", "environment,write_restrictable", Str),
    field("log_settings.file_location", "environment,write_restrictable", Str),
    field("experimental_settings.restrict_system_admin", "experimental,write_restrictable", Bool),
    field("experimental_settings.client_side_cert_enable", "experimental", Bool),
    field("plugin_settings.enable", "plugins,write_restrictable", Bool),
    field("plugin_settings.enable_uploads", "plugins,write_restrictable", Bool),
    field("plugin_settings.directory", "", Str),
];

/// Look up a leaf by its dotted path.
pub fn lookup(path: &str) -> Option<&'static FieldSpec> {
    FIELDS.iter().find(|f| f.path == path)
}

/// Top-level section names in declaration order.
pub fn sections() -> Vec<&'static str> {
    let mut out: Vec<&'static str> = Vec::new();
    for f in FIELDS {
        let section = f.section();
        if out.last() != Some(&section) {
            out.push(section);
        }
    }
    out
}

/// Paths whose values differ between two documents, in declaration order.
pub fn changed_fields(old: &Value, new: &Value) -> Vec<&'static str> {
    FIELDS
        .iter()
        .filter(|f| f.get(old) != f.get(new))
        .map(|f| f.path)
        .collect()
}

impl FieldSpec {
    pub fn section(&self) -> &'static str {
        self.path.split('.').next().unwrap_or(self.path)
    }

    /// Trimmed, non-empty tokens of the access tag.
    pub fn access_tokens(&self) -> impl Iterator<Item = &'static str> {
        self.access.split(',').map(str::trim).filter(|t| !t.is_empty())
    }

    pub fn is_write_restrictable(&self) -> bool {
        self.access_tokens().any(|t| t == WRITE_RESTRICTABLE)
    }

    /// Environment variable overriding this field, e.g. `CS_SQL_SETTINGS_DRIVER_NAME`.
    pub fn env_var(&self, prefix: &str) -> String {
        format!("{}_{}", prefix, self.path.replace('.', "_")).to_uppercase()
    }

    /// Read this leaf out of a serialized document.
    pub fn get<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        self.path.split('.').try_fold(doc, |node, key| node.get(key))
    }

    /// Write this leaf into a serialized document, creating parent objects.
    pub fn set(&self, doc: &mut Value, value: Value) {
        let mut node = doc;
        let mut segments = self.path.split('.').peekable();
        while let Some(key) = segments.next() {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            let Value::Object(map) = node else { return };
            if segments.peek().is_none() {
                map.insert(key.to_string(), value);
                return;
            }
            node = map
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
    }

    /// Convert a raw environment value into this leaf's JSON shape.
    pub fn parse_env(&self, raw: &str) -> Result<Value, String> {
        match self.kind {
            FieldKind::Str | FieldKind::OptionalStr => Ok(Value::String(raw.to_string())),
            FieldKind::Bool => raw
                .trim()
                .parse::<bool>()
                .map(Value::Bool)
                .map_err(|_| format!("expected true or false, got {:?}", raw)),
            FieldKind::Int => raw
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("expected an integer, got {:?}", raw)),
            FieldKind::StrList => Ok(Value::Array(
                raw.split_whitespace()
                    .map(|s| Value::String(s.to_string()))
                    .collect(),
            )),
        }
    }
}
