//! Recompress and hash each layer of an exported image.
//!
//! Registries address a layer by the SHA-256 of the gzip blob they store,
//! while `docker save` hands out the uncompressed tarball. Each layer is
//! therefore pulled out of the export, gzipped again and hashed.

use crate::archive::ArchiveReader;
use crate::compress::CompressionProfile;
use crate::digest::{self, LayerDigest};
use crate::error::LayerDigestError;
use crate::manifest::ExportManifest;
use crate::scratch::ScratchArea;
use crate::Result;
use std::path::Path;

/// Digest every layer of `manifest`, in manifest order.
///
/// The layers share the two scratch files of `scratch`, so they are handled
/// strictly one after another. The first failure aborts the whole run.
pub fn compute_layer_digests(
    manifest: &ExportManifest,
    source_archive: &Path,
    scratch: &mut ScratchArea,
    profile: &CompressionProfile,
) -> Result<Vec<LayerDigest>> {
    let archive = ArchiveReader::new(source_archive);
    let extracted = scratch.layer_path();
    let compressed = scratch.compressed_layer_path();
    manifest
        .layer_tar_paths
        .iter()
        .map(|layer| {
            archive
                .extract_to_file(layer, &extracted)
                .and_then(|found| {
                    found.ok_or_else(|| LayerDigestError::EntryNotFound(layer.clone()))
                })
                .map_err(|e| LayerDigestError::LayerExtractFailed {
                    layer: layer.clone(),
                    source: Box::new(e),
                })?;
            profile.compress_file(&extracted, &compressed, layer)?;
            digest::hash_file(&compressed, layer)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{gzip_digest, write_archive, Fixture, TestResult};

    fn manifest(layers: &[&str]) -> ExportManifest {
        ExportManifest {
            config_path: "c.json".to_string(),
            repo_tags: vec!["x:latest".to_string()],
            layer_tar_paths: layers.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn one_digest_per_layer_in_order() -> TestResult {
        let dir = tempfile::tempdir()?;
        let layers = [
            ("c/layer.tar", b"third".repeat(900)),
            ("a/layer.tar", b"first".repeat(10)),
            ("b/layer.tar", vec![0u8; 4096]),
        ];
        let fixtures = layers
            .iter()
            .map(|(name, data)| Fixture::file(*name, data.clone()))
            .collect::<Vec<_>>();
        let archive = write_archive(dir.path(), "image.tar", &fixtures)?;
        // manifest order differs from archive order
        let order = ["a/layer.tar", "b/layer.tar", "c/layer.tar", "a/layer.tar"];
        let mut scratch = ScratchArea::new(Some(dir.path()))?;
        let profile = CompressionProfile::default();
        let digests = compute_layer_digests(&manifest(&order), &archive, &mut scratch, &profile)?;

        let expected = order
            .iter()
            .map(|name| {
                let data = &layers.iter().find(|(n, _)| n == name).unwrap().1;
                gzip_digest(data, &profile)
            })
            .collect::<Vec<_>>();
        assert_eq!(digests, expected);
        assert_eq!(digests[0], digests[3]);
        for d in &digests {
            assert_eq!(d.as_str().len(), 64);
            assert!(d.as_str().bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')));
        }
        Ok(())
    }

    #[test]
    fn differs_from_uncompressed_digest() -> TestResult {
        let dir = tempfile::tempdir()?;
        let data = b"layer".repeat(100);
        let archive = write_archive(
            dir.path(),
            "image.tar",
            &[Fixture::file("a/layer.tar", data.clone())],
        )?;
        let mut scratch = ScratchArea::new(Some(dir.path()))?;
        let digests = compute_layer_digests(
            &manifest(&["a/layer.tar"]),
            &archive,
            &mut scratch,
            &CompressionProfile::default(),
        )?;
        assert_ne!(digests[0], LayerDigest::from_reader(&data[..])?);
        Ok(())
    }

    #[test]
    fn deterministic() -> TestResult {
        let dir = tempfile::tempdir()?;
        let archive = write_archive(
            dir.path(),
            "image.tar",
            &[
                Fixture::file("a/layer.tar", b"aaaa".repeat(1000)),
                Fixture::file("b/layer.tar", b"bbbb".repeat(1000)),
            ],
        )?;
        let m = manifest(&["a/layer.tar", "b/layer.tar"]);
        let profile = CompressionProfile::default();
        let mut scratch = ScratchArea::new(Some(dir.path()))?;
        let first = compute_layer_digests(&m, &archive, &mut scratch, &profile)?;
        let mut scratch = ScratchArea::new(Some(dir.path()))?;
        let second = compute_layer_digests(&m, &archive, &mut scratch, &profile)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn missing_layer_aborts() -> TestResult {
        let dir = tempfile::tempdir()?;
        let archive = write_archive(
            dir.path(),
            "image.tar",
            &[Fixture::file("a/layer.tar", b"a".to_vec())],
        )?;
        let mut scratch = ScratchArea::new(Some(dir.path()))?;
        let err = compute_layer_digests(
            &manifest(&["a/layer.tar", "gone/layer.tar"]),
            &archive,
            &mut scratch,
            &CompressionProfile::default(),
        )
        .unwrap_err();
        match err {
            LayerDigestError::LayerExtractFailed { layer, source } => {
                assert_eq!(layer, "gone/layer.tar");
                assert!(matches!(*source, LayerDigestError::EntryNotFound(_)));
            }
            other => panic!("unexpected error: {}", other),
        }
        Ok(())
    }

    #[test]
    fn corrupt_archive_aborts() -> TestResult {
        let dir = tempfile::tempdir()?;
        let archive = write_archive(
            dir.path(),
            "image.tar",
            &[
                Fixture::file("a/layer.tar", vec![1; 10]),
                Fixture::file("b/layer.tar", vec![2; 10]),
            ],
        )?;
        let bytes = std::fs::read(&archive)?;
        std::fs::write(&archive, &bytes[..1024 + 200])?;
        let mut scratch = ScratchArea::new(Some(dir.path()))?;
        let err = compute_layer_digests(
            &manifest(&["a/layer.tar", "b/layer.tar"]),
            &archive,
            &mut scratch,
            &CompressionProfile::default(),
        )
        .unwrap_err();
        match err {
            LayerDigestError::LayerExtractFailed { source, .. } => {
                assert!(matches!(*source, LayerDigestError::ArchiveCorrupt { .. }));
            }
            other => panic!("unexpected error: {}", other),
        }
        Ok(())
    }
}
