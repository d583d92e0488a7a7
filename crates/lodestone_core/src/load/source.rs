//! External source collaborators.
//!
//! # Responsibility
//! - Define the two capabilities the orchestrator needs from a source.
//! - Provide the local-file source keyed by modification time.
//!
//! # Invariants
//! - `identifier` is stable across runs; it keys the freshness record.
//! - Equal tokens across runs mean the source did not change.

use super::BoxError;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::Debug;
use std::path::{Path, PathBuf};

/// Something whose state change triggers a reload of dependent loaders.
pub trait Source: Debug {
    /// Stable freshness record key.
    fn identifier(&self) -> String;

    /// Opaque token describing the current state; recomputed on every call.
    fn freshness_token(&self) -> Result<String, BoxError>;
}

/// A file on local disk; its token is the last modification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileSource {
    path: PathBuf,
}

impl LocalFileSource {
    /// # Errors
    /// - `NotFound` when `path` does not exist.
    pub fn new(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("file does not exist `{}`", path.display()),
            ));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Source for LocalFileSource {
    fn identifier(&self) -> String {
        self.path.display().to_string()
    }

    fn freshness_token(&self) -> Result<String, BoxError> {
        let modified = std::fs::metadata(&self.path)?.modified()?;
        Ok(DateTime::<Utc>::from(modified).to_rfc3339_opts(SecondsFormat::Nanos, true))
    }
}

#[cfg(test)]
mod tests {
    use super::{LocalFileSource, Source};

    #[test]
    fn missing_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LocalFileSource::new(dir.path().join("absent.csv")).is_err());
    }

    #[test]
    fn token_is_stable_while_file_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "a,b\n").unwrap();

        let source = LocalFileSource::new(&path).unwrap();
        let first = source.freshness_token().unwrap();
        assert_eq!(first, source.freshness_token().unwrap());
        assert!(first.ends_with('Z'));
        assert_eq!(source.identifier(), path.display().to_string());
    }
}
