//! The container engine that owns the local image store.

use crate::error::LayerDigestError;
use crate::Result;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use which::which;

/// Operations the digest conversion needs from a container engine.
pub trait ImageEngine {
    /// Write the `docker save` tarball of `image` to `out`.
    fn save_image(&self, image: &str, out: &mut dyn Write) -> Result<()>;

    /// Fetch `image` from its registry into the local store.
    fn pull_image(&self, image: &str, platform: Option<&str>) -> Result<()>;
}

/// Drives the `docker` (or `podman`) command line client.
#[derive(Debug, Clone)]
pub struct CliEngine {
    executable: PathBuf,
}

impl CliEngine {
    /// Locate `docker` on `PATH`, falling back to `podman`.
    pub fn detect() -> Result<Self> {
        let executable = which("docker").map_or_else(|_| which("podman"), Ok)?;
        Ok(Self { executable })
    }

    pub fn with_executable<P: AsRef<Path>>(executable: P) -> Self {
        Self {
            executable: executable.as_ref().to_path_buf(),
        }
    }

    fn run<F>(&self, operation: &str, args: &[&str], mut handle_stdout: F) -> Result<()>
    where
        F: FnMut(&mut dyn Read) -> io::Result<()>,
    {
        let failed = |reason: String| LayerDigestError::EngineCallFailed {
            operation: operation.to_string(),
            reason,
        };
        log::info!("{} {}", self.executable.display(), args.join(" "));
        let mut child = Command::new(&self.executable)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| failed(e.to_string()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| failed("stdout of engine process is not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| failed("stderr of engine process is not captured".to_string()))?;
        // stderr is drained on its own thread while stdout streams
        let stderr_reader = thread::spawn(move || {
            let mut buf = vec![];
            stderr.read_to_end(&mut buf).map(|_| buf)
        });
        let streamed = handle_stdout(&mut stdout);
        drop(stdout);
        let status = child.wait().map_err(|e| failed(e.to_string()))?;
        let stderr = stderr_reader
            .join()
            .map_err(|_| failed("stderr reader panicked".to_string()))?
            .map_err(|e| failed(e.to_string()))?;
        streamed.map_err(|e| failed(e.to_string()))?;
        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(failed(format!("{}: {}", status, stderr.trim())));
        }
        Ok(())
    }
}

impl ImageEngine for CliEngine {
    fn save_image(&self, image: &str, out: &mut dyn Write) -> Result<()> {
        self.run("image save", &["image", "save", image], |stdout| {
            let size = io::copy(stdout, &mut *out)?;
            out.flush()?;
            log::debug!("exported {} bytes of {}", size, image);
            Ok(())
        })
    }

    fn pull_image(&self, image: &str, platform: Option<&str>) -> Result<()> {
        let mut args = vec!["image", "pull"];
        if let Some(platform) = platform {
            args.extend(["--platform", platform]);
        }
        args.push(image);
        self.run("image pull", &args, |stdout| {
            for line in BufReader::new(stdout).lines() {
                log::debug!("{}", line?);
            }
            Ok(())
        })
    }
}
