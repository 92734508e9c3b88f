use crate::error::LayerDigestError;
use crate::Result;
use flate2::{Compression, GzBuilder};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

/// Parameters shaping the gzip stream a layer is recompressed into.
///
/// The digest of a layer depends on every byte of the compressed blob, so
/// these must match whatever produced the blobs a registry holds. The
/// default is a single gzip member at level 6 with a zeroed mtime and the
/// "unknown" OS byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionProfile {
    pub level: u32,
    pub mtime: u32,
    pub operating_system: u8,
}

impl Default for CompressionProfile {
    fn default() -> Self {
        Self {
            level: Compression::default().level(),
            mtime: 0,
            operating_system: 255,
        }
    }
}

impl CompressionProfile {
    /// Wrap `out` in a gzip encoder following this profile.
    pub fn encoder<W: Write>(&self, out: W) -> flate2::write::GzEncoder<W> {
        GzBuilder::new()
            .mtime(self.mtime)
            .operating_system(self.operating_system)
            .write(out, Compression::new(self.level))
    }

    /// Compress the whole of `src` into `dest` as one gzip member.
    pub fn compress_file(&self, src: &Path, dest: &Path, layer: &str) -> Result<u64> {
        let compress_failed = |source| LayerDigestError::LayerCompressFailed {
            layer: layer.to_string(),
            source,
        };
        let mut input = BufReader::new(File::open(src).map_err(compress_failed)?);
        let output = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(dest)
            .map_err(compress_failed)?;
        let mut encoder = self.encoder(BufWriter::new(output));
        let size = io::copy(&mut input, &mut encoder).map_err(compress_failed)?;
        encoder
            .finish()
            .and_then(|mut out| out.flush())
            .map_err(compress_failed)?;
        Ok(size)
    }
}
