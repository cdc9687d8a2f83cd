//! Serialization of settings documents.
//!
//! JSON is the canonical form used by the memory and database stores; file
//! stores pick TOML or JSON from the file extension. Output is stable for a
//! given document, which the stores rely on to detect unchanged content.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::normalize::fix_config;
use crate::config::schema::Config;
use crate::config::validation::{validate_config, ValidationError};

/// On-medium encoding of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Codec {
    #[default]
    Json,
    Toml,
}

impl Codec {
    /// `.toml` files are TOML, everything else is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Codec::Toml,
            _ => Codec::Json,
        }
    }
}

/// Error encoding or decoding a document.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("TOML parse error: {0}")]
    TomlDecode(#[from] toml::de::Error),
    #[error("TOML encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),
    #[error("document is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Encode a document.
pub fn marshal_config(config: &Config, codec: Codec) -> Result<Vec<u8>, CodecError> {
    match codec {
        Codec::Json => Ok(serde_json::to_vec_pretty(config)?),
        Codec::Toml => Ok(toml::to_string(config)?.into_bytes()),
    }
}

/// Decode a document. Missing fields take their `Default` values.
pub fn unmarshal_config(bytes: &[u8], codec: Codec) -> Result<Config, CodecError> {
    match codec {
        Codec::Json => Ok(serde_json::from_slice(bytes)?),
        Codec::Toml => Ok(toml::from_str(std::str::from_utf8(bytes)?)?),
    }
}

/// Error type for one-shot loading from disk.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] CodecError),
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

pub(crate) fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Read, default, normalize and validate a document without opening a store.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read(path)?;
    let mut config = unmarshal_config(&content, Codec::from_path(path))?;
    config.set_defaults();
    fix_config(&mut config);

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}
