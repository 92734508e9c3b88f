//! Sequential lookup of named entries inside a `docker save` tarball.
//!
//! Every lookup rescans the archive from its first header. The scan always
//! runs to the end-of-archive marker so that a damaged stream is reported even
//! when the requested entry was already found.

use crate::error::LayerDigestError;
use crate::Result;
use path_clean::clean;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tar::Archive;

// symlinked layer tarballs may point at other symlinks
const MAX_LINK_HOPS: usize = 8;

/// Read-only view over an image archive on disk.
#[derive(Debug, Clone)]
pub struct ArchiveReader {
    path: PathBuf,
}

enum Destination<'a> {
    Memory,
    File(&'a Path),
}

enum Sink<'a> {
    Memory(Vec<u8>),
    File(&'a Path, BufWriter<File>),
}

enum Extracted {
    Memory(Vec<u8>),
    File,
}

enum Found {
    Data(Extracted, u64),
    Link(String),
}

impl<'a> Destination<'a> {
    fn open(&self) -> Result<Sink<'a>> {
        match *self {
            Destination::Memory => Ok(Sink::Memory(vec![])),
            Destination::File(path) => {
                let file = OpenOptions::new()
                    .write(true)
                    .truncate(true)
                    .create(true)
                    .open(path)
                    .map_err(|source| LayerDigestError::Scratch {
                        path: path.to_path_buf(),
                        source,
                    })?;
                Ok(Sink::File(path, BufWriter::new(file)))
            }
        }
    }
}

impl<'a> Sink<'a> {
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        match self {
            Sink::Memory(data) => {
                data.extend_from_slice(buf);
                Ok(())
            }
            Sink::File(path, out) => out.write_all(buf).map_err(|source| LayerDigestError::Scratch {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn finish(self) -> Result<Extracted> {
        match self {
            Sink::Memory(data) => Ok(Extracted::Memory(data)),
            Sink::File(path, mut out) => {
                out.flush().map_err(|source| LayerDigestError::Scratch {
                    path: path.to_path_buf(),
                    source,
                })?;
                Ok(Extracted::File)
            }
        }
    }
}

impl ArchiveReader {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Copy the body of `name` into memory.
    ///
    /// Returns `Ok(None)` when the archive holds no entry with that name.
    pub fn extract_to_memory(&self, name: &str) -> Result<Option<Vec<u8>>> {
        match self.extract(name, Destination::Memory)? {
            Some((Extracted::Memory(data), _)) => Ok(Some(data)),
            _ => Ok(None),
        }
    }

    /// Stream the body of `name` into `dest`, returning the number of bytes written.
    ///
    /// `dest` is created (or truncated) only once a matching entry is reached, so
    /// a miss leaves the filesystem untouched and returns `Ok(None)`.
    pub fn extract_to_file<P: AsRef<Path>>(&self, name: &str, dest: P) -> Result<Option<u64>> {
        Ok(self
            .extract(name, Destination::File(dest.as_ref()))?
            .map(|(_, size)| size))
    }

    fn extract(&self, name: &str, dest: Destination) -> Result<Option<(Extracted, u64)>> {
        let mut target = name.to_string();
        for _ in 0..=MAX_LINK_HOPS {
            match self.scan(&target, &dest)? {
                None => return Ok(None),
                Some(Found::Data(extracted, size)) => return Ok(Some((extracted, size))),
                Some(Found::Link(next)) => target = next,
            }
        }
        Err(self.corrupt(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("too many levels of links resolving {}", name),
        )))
    }

    fn open(&self) -> Result<Archive<BufReader<File>>> {
        let file = OpenOptions::new()
            .read(true)
            .open(&self.path)
            .map_err(|source| LayerDigestError::ArchiveUnavailable {
                path: self.path.clone(),
                source,
            })?;
        Ok(Archive::new(BufReader::new(file)))
    }

    fn scan(&self, name: &str, dest: &Destination) -> Result<Option<Found>> {
        let mut ar = self.open()?;
        let mut found = None;
        for entry in ar.entries().map_err(|e| self.corrupt(e))? {
            let mut e = entry.map_err(|e| self.corrupt(e))?;
            if &*e.path_bytes() != name.as_bytes() {
                continue;
            }
            let entry_type = e.header().entry_type();
            if entry_type.is_symlink() || entry_type.is_hard_link() {
                let link = e.link_name().map_err(|e| self.corrupt(e))?.ok_or_else(|| {
                    self.corrupt(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("link entry {} has no target", name),
                    ))
                })?;
                found = Some(Found::Link(resolve_link(name, &link, entry_type.is_hard_link())));
                continue;
            }
            // later entries with the same name replace earlier ones, as on extraction
            let mut sink = dest.open()?;
            let copied = self.copy_body(&mut e, &mut sink)?;
            if copied != e.size() {
                return Err(self.corrupt(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("entry {} ends after {} of {} bytes", name, copied, e.size()),
                )));
            }
            found = Some(Found::Data(sink.finish()?, copied));
        }
        Ok(found)
    }

    fn copy_body<R: Read>(&self, body: &mut R, sink: &mut Sink) -> Result<u64> {
        let mut buf = [0u8; 64 * 1024];
        let mut copied = 0u64;
        loop {
            let n = match body.read(&mut buf) {
                Ok(0) => return Ok(copied),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(self.corrupt(e)),
            };
            sink.write_all(&buf[..n])?;
            copied += n as u64;
        }
    }

    fn corrupt(&self, source: io::Error) -> LayerDigestError {
        LayerDigestError::ArchiveCorrupt {
            path: self.path.clone(),
            source,
        }
    }
}

// symlink targets are relative to the entry's directory, hard link targets to the archive root
fn resolve_link(name: &str, link: &Path, hard: bool) -> String {
    if hard {
        return clean(&link.to_string_lossy());
    }
    match Path::new(name).parent() {
        Some(parent) => clean(&parent.join(link).to_string_lossy()),
        None => clean(&link.to_string_lossy()),
    }
}

/// Read the entry `name` into memory, yielding an empty buffer if it is absent.
pub fn read_entry_to_memory<P: AsRef<Path>>(archive: P, name: &str) -> Result<Vec<u8>> {
    Ok(ArchiveReader::new(archive)
        .extract_to_memory(name)?
        .unwrap_or_default())
}

/// Stream the entry `name` into `dest`. Nothing is written if it is absent.
pub fn read_entry_to_file<P: AsRef<Path>, Q: AsRef<Path>>(
    archive: P,
    name: &str,
    dest: Q,
) -> Result<()> {
    ArchiveReader::new(archive).extract_to_file(name, dest)?;
    Ok(())
}
