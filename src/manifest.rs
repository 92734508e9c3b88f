use crate::error::LayerDigestError;
use crate::Result;
use serde::{Deserialize, Deserializer, Serialize};

/// Name of the manifest entry `docker save` places at the archive root.
pub const MANIFEST_ENTRY: &str = "manifest.json";

/// One image of a `docker save` archive, as listed in `manifest.json`.
///
/// When you export several image/tag pairs at once there is one of these per
/// image in the JSON array.
#[derive(Default, Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExportManifest {
    #[serde(rename = "Config")]
    pub config_path: String,
    // untagged images are exported with `"RepoTags": null`
    #[serde(rename = "RepoTags", deserialize_with = "null_as_empty")]
    pub repo_tags: Vec<String>,
    // layers of this image in order (oldest -> newest)
    #[serde(rename = "Layers")]
    pub layer_tar_paths: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

pub fn decode_manifests(json: &[u8]) -> Result<Vec<ExportManifest>> {
    serde_json::from_slice(json).map_err(LayerDigestError::ManifestMalformed)
}

/// Pick the first image of the archive.
pub fn first_manifest(manifests: Vec<ExportManifest>) -> Result<ExportManifest> {
    manifests
        .into_iter()
        .next()
        .ok_or(LayerDigestError::IndexOutOfRange)
}
