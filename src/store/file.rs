//! Single-file backend with atomic replacement.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::loader::marshal_config;
use crate::config::{Codec, Config};
use crate::error::PersistenceError;
use crate::store::backend::Backend;

/// Stores the document in one file. Auxiliary files live next to it.
pub struct FileBackend {
    path: PathBuf,
    codec: Codec,
}

impl FileBackend {
    /// Relative paths are resolved against the working directory.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let path = if path.is_absolute() {
            path
        } else {
            std::env::current_dir()?.join(path)
        };
        let codec = Codec::from_path(&path);
        Ok(Self { path, codec })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    /// Absolute names are used as given, others are relative to the config directory.
    fn resolve(&self, name: &str) -> PathBuf {
        let name = Path::new(name);
        if name.is_absolute() {
            name.to_path_buf()
        } else {
            self.dir().join(name)
        }
    }
}

/// Write through a temporary file in the same directory, then rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|err| err.error)?;
    #[cfg(unix)]
    {
        if let Ok(dir) = fs::File::open(dir) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

impl Backend for FileBackend {
    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }

    fn codec(&self) -> Codec {
        self.codec
    }

    fn load(&self) -> Result<Option<Vec<u8>>, PersistenceError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn persist(&self, config: &Config) -> Result<Vec<u8>, PersistenceError> {
        let bytes = marshal_config(config, self.codec)?;
        write_atomic(&self.path, &bytes)?;
        Ok(bytes)
    }

    fn watch_path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn get_file(&self, name: &str) -> Result<Vec<u8>, PersistenceError> {
        match fs::read(self.resolve(name)) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(PersistenceError::FileNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn set_file(&self, name: &str, data: &[u8]) -> Result<(), PersistenceError> {
        Ok(write_atomic(&self.resolve(name), data)?)
    }

    fn has_file(&self, name: &str) -> Result<bool, PersistenceError> {
        match fs::metadata(self.resolve(name)) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn remove_file(&self, name: &str) -> Result<(), PersistenceError> {
        match fs::remove_file(self.resolve(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("config.json")).unwrap();
        assert!(backend.load().unwrap().is_none());
        assert_eq!(backend.codec(), Codec::Json);
    }

    #[test]
    fn test_persist_writes_exact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("config.toml")).unwrap();
        assert_eq!(backend.codec(), Codec::Toml);

        let written = backend.persist(&Config::default()).unwrap();
        assert_eq!(fs::read(backend.path()).unwrap(), written);
        assert_eq!(backend.load().unwrap(), Some(written));

        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_files_are_relative_to_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::new(dir.path().join("config.json")).unwrap();

        backend.set_file("saml-idp.crt", b"-----BEGIN CERTIFICATE-----").unwrap();
        assert!(dir.path().join("saml-idp.crt").exists());
        assert!(backend.has_file("saml-idp.crt").unwrap());
        assert_eq!(backend.get_file("saml-idp.crt").unwrap(), b"-----BEGIN CERTIFICATE-----");

        backend.remove_file("saml-idp.crt").unwrap();
        backend.remove_file("saml-idp.crt").unwrap();
        assert!(!backend.has_file("saml-idp.crt").unwrap());
        assert!(matches!(
            backend.get_file("saml-idp.crt"),
            Err(PersistenceError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_relative_path_is_made_absolute() {
        let backend = FileBackend::new("config.json").unwrap();
        assert!(backend.path().is_absolute());
        assert!(backend.describe().starts_with("file:"));
    }
}
