use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LayerDigestError {
    #[error("cannot open image archive {path:?}: {source}")]
    ArchiveUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("corrupt image archive {path:?}: {source}")]
    ArchiveCorrupt {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("entry not found in image archive: {0}")]
    EntryNotFound(String),
    #[error("could not find image manifest")]
    ManifestMissing,
    #[error("malformed image manifest: {0}")]
    ManifestMalformed(#[source] serde_json::Error),
    #[error("image manifest is empty")]
    IndexOutOfRange,
    #[error("no layer found in image manifest")]
    MissingLayer,
    #[error("failed to extract layer {layer}: {source}")]
    LayerExtractFailed {
        layer: String,
        source: Box<LayerDigestError>,
    },
    #[error("failed to compress layer {layer}: {source}")]
    LayerCompressFailed {
        layer: String,
        source: std::io::Error,
    },
    #[error("failed to hash compressed layer {layer}: {source}")]
    HashComputeFailed {
        layer: String,
        source: std::io::Error,
    },
    #[error("container engine `{operation}` failed: {reason}")]
    EngineCallFailed { operation: String, reason: String },
    #[error("neither docker nor podman could be found: {0}")]
    EngineNotFound(#[from] which::Error),
    #[error("scratch area {path:?}: {source}")]
    Scratch {
        path: PathBuf,
        source: std::io::Error,
    },
}
