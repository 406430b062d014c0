//! Private scratch storage of a collector instance.

use std::io;
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, warn};

/// Temporary directory removed when the owning collector is dropped.
#[derive(Debug)]
pub struct ScratchDir {
    owner: &'static str,
    dir: Option<TempDir>,
}

impl ScratchDir {
    pub fn new(owner: &'static str) -> io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("paw-{owner}-"))
            .tempdir()?;
        debug!(collector = owner, dir = %dir.path().display(), "Created scratch directory");
        Ok(Self {
            owner,
            dir: Some(dir),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.as_ref().map_or(Path::new(""), TempDir::path)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        let path = dir.path().to_path_buf();
        match dir.close() {
            Ok(()) => debug!(collector = self.owner, dir = %path.display(), "Removed scratch directory"),
            Err(e) => warn!(
                collector = self.owner,
                dir = %path.display(),
                error = %e,
                "Failed to remove scratch directory"
            ),
        }
    }
}
