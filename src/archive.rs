//! Archive sources.
//!
//! Archives hold recorded values but no help text; contexts over them only
//! record where the archive lives.

use std::path::{Path, PathBuf};

use crate::types::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSource {
    path: PathBuf,
}

impl ArchiveSource {
    /// Fails with `LogFile` if nothing exists at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("archive {} not found", path.display());
            return Err(Error::LogFile);
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
