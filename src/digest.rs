use crate::error::LayerDigestError;
use crate::Result;
use serde::Serialize;
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// SHA-256 of a gzip-compressed layer blob, as 64 lowercase hex characters.
///
/// This is the value a registry reports as a layer's `digest`, minus the
/// `sha256:` algorithm prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayerDigest(String);

impl LayerDigest {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The digest in registry notation, e.g. `sha256:4f4f...`
    pub fn to_registry_digest(&self) -> String {
        format!("sha256:{}", self.0)
    }

    /// Hash everything `reader` yields without buffering it whole.
    pub fn from_reader<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut hasher = Sha256::new();
        io::copy(&mut reader, &mut hasher)?;
        Ok(Self(base16ct::lower::encode_string(&hasher.finalize())))
    }
}

impl fmt::Display for LayerDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for LayerDigest {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

/// Stream a compressed layer file through SHA-256.
pub fn hash_file(path: &Path, layer: &str) -> Result<LayerDigest> {
    let hash_failed = |source| LayerDigestError::HashComputeFailed {
        layer: layer.to_string(),
        source,
    };
    let file = File::open(path).map_err(hash_failed)?;
    LayerDigest::from_reader(BufReader::new(file)).map_err(hash_failed)
}
