//! Sentinel file used as an out-of-band shutdown trigger.
//!
//! Only the existence of the file matters. This crate creates it on request
//! and never deletes it; removing it before the next start is up to the
//! operator or deployment tooling.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::errors::SentinelError;

/// Default sentinel file name, relative to the working directory.
pub const DEFAULT_SENTINEL: &str = "shutdown";

/// Handle on the sentinel file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelFile {
    path: PathBuf,
}

impl SentinelFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the sentinel file currently exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Create the file with a single blank line unless it already exists.
    ///
    /// Creation is atomic: when several writers race, exactly one creates the
    /// file and the others see `Ok(false)`.
    pub fn create_if_absent(&self) -> Result<bool, SentinelError> {
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(source) => {
                return Err(SentinelError::CreateFailed {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        file.write_all(b"\n")
            .map_err(|source| SentinelError::CreateFailed {
                path: self.path.clone(),
                source,
            })?;
        Ok(true)
    }

    /// Best-effort variant of [`create_if_absent`](Self::create_if_absent)
    /// that logs instead of returning the error.
    pub fn ensure_created(&self) {
        match self.create_if_absent() {
            Ok(true) => info!(path = %self.path.display(), "created shutdown file"),
            Ok(false) => {}
            Err(e) => error!(error = %e, "failed to create shutdown file"),
        }
    }
}

impl Default for SentinelFile {
    fn default() -> Self {
        Self::new(DEFAULT_SENTINEL)
    }
}
