use crate::error::LayerDigestError;
use crate::Result;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const PREFIX: &str = ".layer-digest-";
const EXPORT_FILE: &str = "image.tar";
const LAYER_FILE: &str = "layer.tar";
const COMPRESSED_LAYER_FILE: &str = "layer.tar.gz";

/// A private directory holding the intermediate files of one conversion.
///
/// The exported image, the extracted layer and its compressed form each have
/// a fixed name inside the directory and are overwritten layer after layer.
/// The directory and everything in it is removed when the area is dropped.
#[derive(Debug)]
pub struct ScratchArea {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl ScratchArea {
    /// Create a uniquely named directory below `base`, or below the current
    /// working directory when `base` is `None`.
    pub fn new(base: Option<&Path>) -> Result<Self> {
        let base = match base {
            Some(base) => base.to_path_buf(),
            None => std::env::current_dir().map_err(|source| LayerDigestError::Scratch {
                path: PathBuf::from("."),
                source,
            })?,
        };
        let dir = tempfile::Builder::new()
            .prefix(PREFIX)
            .tempdir_in(&base)
            .map_err(|source| LayerDigestError::Scratch { path: base, source })?;
        Ok(Self {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.path
    }

    /// Where the engine's image export is written.
    pub fn export_path(&self) -> PathBuf {
        self.path.join(EXPORT_FILE)
    }

    /// Where each uncompressed layer tarball is extracted.
    pub fn layer_path(&self) -> PathBuf {
        self.path.join(LAYER_FILE)
    }

    /// Where each recompressed layer is written before hashing.
    pub fn compressed_layer_path(&self) -> PathBuf {
        self.path.join(COMPRESSED_LAYER_FILE)
    }

    /// Remove the directory now, reporting a failure instead of logging it.
    pub fn close(mut self) -> Result<()> {
        match self.dir.take() {
            Some(dir) => dir.close().map_err(|source| LayerDigestError::Scratch {
                path: self.path.clone(),
                source,
            }),
            None => Ok(()),
        }
    }
}

impl Drop for ScratchArea {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            dir.close().unwrap_or_else(|e| {
                log::error!(
                    "Failed to remove scratch directory {}: {}",
                    self.path.display(),
                    e
                )
            });
        }
    }
}
