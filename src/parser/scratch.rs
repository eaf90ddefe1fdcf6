//! Scoped scratch file used to hand raw bytes to path-based decoders.
use std::io::Write;
use std::path::Path;

use tempfile::TempPath;
use tracing::{debug, warn};

/// A temporary file that is deleted when the guard goes out of scope.
///
/// Deletion runs on every exit path: normal return, decoder error, panic
/// unwinding, or the owning job being abandoned. A failed deletion is logged
/// and never turned into an error.
pub struct ScratchFile {
    path: Option<TempPath>,
}

impl ScratchFile {
    /// Write `bytes` to a fresh file in `dir` (or the system temp dir).
    ///
    /// `suffix` keeps the extension decoders sniff on (e.g. `.xlsx`).
    pub fn create(dir: Option<&Path>, suffix: &str, bytes: &[u8]) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("askdocs-").suffix(suffix);
        let mut file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(bytes)?;
        file.flush()?;

        let path = file.into_temp_path();
        debug!("Wrote scratch file {}", path.display());
        Ok(Self { path: Some(path) })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        // Only `Drop` takes the path out.
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let shown = path.display().to_string();
            match path.close() {
                Ok(()) => debug!("Removed scratch file {shown}"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove scratch file {shown}: {e}"),
            }
        }
    }
}
