//! Store location strings.
//!
//! ```text
//! memory:                     in-process store
//! sqlite::memory:             in-memory SQLite database
//! sqlite:///var/lib/cs.db     SQLite database file (absolute)
//! sqlite://cs.db              SQLite database file (relative)
//! file:///etc/cs/config.json  file store
//! config.json                 file store, path as given
//! ```

use std::path::PathBuf;

use url::Url;

use crate::error::{StoreError, StoreResult};
use crate::store::database::SqliteTarget;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreDsn {
    Memory,
    File(PathBuf),
    Sqlite(SqliteTarget),
}

impl StoreDsn {
    pub fn parse(dsn: &str) -> StoreResult<Self> {
        let dsn = dsn.trim();
        let invalid = |reason: &str| StoreError::InvalidDsn {
            dsn: dsn.to_string(),
            reason: reason.to_string(),
        };

        if dsn.is_empty() {
            return Err(invalid("empty"));
        }
        if dsn == "memory:" || dsn == "memory://" {
            return Ok(StoreDsn::Memory);
        }
        if dsn == "sqlite::memory:" || dsn == "sqlite://:memory:" {
            return Ok(StoreDsn::Sqlite(SqliteTarget::Memory));
        }
        if !dsn.contains("://") && !dsn.starts_with("sqlite:") {
            return Ok(StoreDsn::File(PathBuf::from(dsn)));
        }

        let url = Url::parse(dsn).map_err(|e| invalid(&e.to_string()))?;
        match url.scheme() {
            "sqlite" => {
                // sqlite://relative.db parses the first segment as a host.
                let path = match url.host_str() {
                    Some(host) if !host.is_empty() => format!("{}{}", host, url.path()),
                    _ => url.path().to_string(),
                };
                if path.is_empty() {
                    return Err(invalid("missing database path"));
                }
                Ok(StoreDsn::Sqlite(SqliteTarget::Path(PathBuf::from(path))))
            }
            "file" => url
                .to_file_path()
                .map(StoreDsn::File)
                .map_err(|_| invalid("not a local file path")),
            other => Err(invalid(&format!("unsupported scheme {:?}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_paths_are_files() {
        assert_eq!(
            StoreDsn::parse("config.json").unwrap(),
            StoreDsn::File(PathBuf::from("config.json"))
        );
        assert_eq!(
            StoreDsn::parse("/etc/cs/config.toml").unwrap(),
            StoreDsn::File(PathBuf::from("/etc/cs/config.toml"))
        );
        assert_eq!(
            StoreDsn::parse("file:///etc/cs/config.json").unwrap(),
            StoreDsn::File(PathBuf::from("/etc/cs/config.json"))
        );
    }

    #[test]
    fn test_sqlite() {
        assert_eq!(
            StoreDsn::parse("sqlite::memory:").unwrap(),
            StoreDsn::Sqlite(SqliteTarget::Memory)
        );
        assert_eq!(
            StoreDsn::parse("sqlite:///var/lib/cs.db").unwrap(),
            StoreDsn::Sqlite(SqliteTarget::Path(PathBuf::from("/var/lib/cs.db")))
        );
        assert_eq!(
            StoreDsn::parse("sqlite://cs.db").unwrap(),
            StoreDsn::Sqlite(SqliteTarget::Path(PathBuf::from("cs.db")))
        );
    }

    #[test]
    fn test_memory() {
        assert_eq!(StoreDsn::parse("memory:").unwrap(), StoreDsn::Memory);
    }

    #[test]
    fn test_rejects_unknown_scheme() {
        let err = StoreDsn::parse("postgres://user@db/config").unwrap_err();
        assert!(matches!(err, StoreError::InvalidDsn { .. }));
        assert!(StoreDsn::parse("  ").is_err());
    }
}
