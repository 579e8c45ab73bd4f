//! Save a finished artifact to disk.
//!
//! [`DownloadTrigger::save`] is fire-and-forget: it writes the spreadsheet
//! into the output directory under its suggested name, logs the result, and
//! never retries. [`DownloadTrigger::try_save`] is the same operation with the
//! error handed back, for callers (like the CLI) that need an exit code.
//!
//! Writes are atomic: the bytes go to a temp file in the target directory
//! first, then the temp file is persisted over the final name, so an
//! interrupted save never leaves a truncated `.xlsx` behind.

use crate::blob::BlobStore;
use crate::error::Pdf2XlsxError;
use crate::state::Artifact;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Writes artifacts from a [`BlobStore`] into a directory.
#[derive(Debug, Clone)]
pub struct DownloadTrigger {
    store: BlobStore,
    output_dir: PathBuf,
}

impl DownloadTrigger {
    pub fn new(store: BlobStore, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Where `artifact` would be written.
    pub fn target_path(&self, artifact: &Artifact) -> PathBuf {
        self.output_dir.join(&artifact.suggested_file_name)
    }

    /// Save `artifact` if there is one. Does nothing for `None`.
    pub fn save(&self, artifact: Option<&Artifact>) {
        let Some(artifact) = artifact else {
            warn!("Download requested with no converted file; ignoring");
            return;
        };
        match self.try_save(artifact) {
            Ok(path) => info!("Saved {}", path.display()),
            Err(e) => error!("Download of '{}' failed: {}", artifact.suggested_file_name, e),
        }
    }

    /// Save `artifact` and return the written path.
    pub fn try_save(&self, artifact: &Artifact) -> Result<PathBuf, Pdf2XlsxError> {
        let bytes = self
            .store
            .read(&artifact.blob)
            .ok_or_else(|| Pdf2XlsxError::ArtifactReleased {
                name: artifact.suggested_file_name.clone(),
            })?;
        let path = self.target_path(artifact);
        let write_failed = |source: std::io::Error| Pdf2XlsxError::OutputWriteFailed {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(&self.output_dir).map_err(write_failed)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.output_dir).map_err(write_failed)?;
        tmp.write_all(&bytes).map_err(write_failed)?;
        tmp.as_file().sync_all().map_err(write_failed)?;
        tmp.persist(&path).map_err(|e| write_failed(e.error))?;

        Ok(path)
    }
}
