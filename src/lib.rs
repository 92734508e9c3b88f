//! Work out the digests a registry would assign to the layers of a local image.
//!
//! `docker save` exports each layer as an uncompressed tarball, but a V2
//! registry stores (and addresses) layers as gzip blobs. This crate exports
//! an image through the container engine, recompresses every layer the way a
//! push does, and returns the SHA-256 of each blob in manifest order.
//!
//! ```no_run
//! use docker_layer_digest::{extract_registry_layer_digests, CliEngine};
//!
//! let engine = CliEngine::detect()?;
//! for digest in extract_registry_layer_digests(&engine, "redis:7", None)? {
//!     println!("{}", digest.to_registry_digest());
//! }
//! # Ok::<(), docker_layer_digest::LayerDigestError>(())
//! ```

pub mod archive;
mod compress;
mod digest;
mod engine;
mod error;
pub mod manifest;
pub mod pipeline;
mod scratch;

pub use archive::{read_entry_to_file, read_entry_to_memory, ArchiveReader};
pub use compress::CompressionProfile;
pub use digest::LayerDigest;
pub use engine::{CliEngine, ImageEngine};
pub use error::LayerDigestError;
pub use manifest::{decode_manifests, ExportManifest};
pub use pipeline::compute_layer_digests;
pub use scratch::ScratchArea;

use manifest::{first_manifest, MANIFEST_ENTRY};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, LayerDigestError>;

/// Knobs shared by every entry point.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Directory under which the scratch area is created, the current
    /// working directory when unset.
    pub scratch_dir: Option<PathBuf>,
    pub compression: CompressionProfile,
}

/// Export `image` through `engine` and digest its layers.
pub fn extract_registry_layer_digests<E: ImageEngine + ?Sized>(
    engine: &E,
    image: &str,
    scratch_dir: Option<&Path>,
) -> Result<Vec<LayerDigest>> {
    let options = Options {
        scratch_dir: scratch_dir.map(Path::to_path_buf),
        ..Default::default()
    };
    extract_registry_layer_digests_with(engine, image, &options)
}

pub fn extract_registry_layer_digests_with<E: ImageEngine + ?Sized>(
    engine: &E,
    image: &str,
    options: &Options,
) -> Result<Vec<LayerDigest>> {
    let mut scratch = ScratchArea::new(options.scratch_dir.as_deref())?;
    let export = scratch.export_path();
    export_image(engine, image, &export)?;
    let digests = digests_in_archive(&export, &mut scratch, &options.compression)?;
    scratch.close()?;
    Ok(digests)
}

/// Pull `image` first, then export and digest it.
pub fn pull_and_extract_registry_layer_digests<E: ImageEngine + ?Sized>(
    engine: &E,
    image: &str,
    platform: Option<&str>,
    options: &Options,
) -> Result<Vec<LayerDigest>> {
    engine.pull_image(image, platform)?;
    extract_registry_layer_digests_with(engine, image, options)
}

/// Digest the layers of an image already exported to `archive`.
pub fn layer_digests_from_archive<P: AsRef<Path>>(
    archive: P,
    options: &Options,
) -> Result<Vec<LayerDigest>> {
    let mut scratch = ScratchArea::new(options.scratch_dir.as_deref())?;
    let digests = digests_in_archive(archive.as_ref(), &mut scratch, &options.compression)?;
    scratch.close()?;
    Ok(digests)
}

fn export_image<E: ImageEngine + ?Sized>(engine: &E, image: &str, dest: &Path) -> Result<()> {
    let scratch_failed = |source| LayerDigestError::Scratch {
        path: dest.to_path_buf(),
        source,
    };
    let file = OpenOptions::new()
        .write(true)
        .truncate(true)
        .create(true)
        .open(dest)
        .map_err(scratch_failed)?;
    let mut out = BufWriter::new(file);
    engine.save_image(image, &mut out)?;
    out.flush().map_err(scratch_failed)
}

fn digests_in_archive(
    archive: &Path,
    scratch: &mut ScratchArea,
    profile: &CompressionProfile,
) -> Result<Vec<LayerDigest>> {
    let manifest_json = ArchiveReader::new(archive)
        .extract_to_memory(MANIFEST_ENTRY)?
        .ok_or(LayerDigestError::ManifestMissing)?;
    let manifests = decode_manifests(&manifest_json)?;
    if manifests.len() > 1 {
        log::warn!(
            "{:?} holds {} images, only the first is digested",
            archive,
            manifests.len()
        );
    }
    let manifest = first_manifest(manifests)?;
    if manifest.layer_tar_paths.is_empty() {
        return Err(LayerDigestError::MissingLayer);
    }
    log::info!(
        "digesting {} layers of {}",
        manifest.layer_tar_paths.len(),
        manifest
            .repo_tags
            .first()
            .unwrap_or(&manifest.config_path)
    );
    let digests = compute_layer_digests(&manifest, archive, scratch, profile)?;
    for (layer, digest) in manifest.layer_tar_paths.iter().zip(&digests) {
        log::debug!("{} -> {}", layer, digest.to_registry_digest());
    }
    Ok(digests)
}
