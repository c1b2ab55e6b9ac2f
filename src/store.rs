//! Idempotent persistence of generated units
//!
//! Layout: `<root>/<module>_turbo/{__init__.py, <unit>.pyx, <unit>.pyxbld}`.
//! A file is rewritten only when its text differs from what is on disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;
use serde::Serialize;

use crate::error::{TurboError, TurboResult};

/// Where a unit's files ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistOutcome {
    pub source_path: PathBuf,
    pub build_path: PathBuf,
    /// Whether any file was (re)written
    pub written: bool,
}

#[derive(Debug)]
pub struct ArtifactStore {
    root: PathBuf,
    writes: AtomicUsize,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Package directory for a (possibly dotted) module name
    pub fn module_dir(&self, module: &str) -> PathBuf {
        let leaf = module.rsplit('.').next().unwrap_or(module);
        self.root.join(format!("{}_turbo", leaf))
    }

    pub fn persist(&self, module: &str, unit: &str, source: &str, build: &str) -> TurboResult<PersistOutcome> {
        let dir = self.module_dir(module);
        fs::create_dir_all(&dir).map_err(|e| TurboError::io(&dir, e))?;

        let source_path = dir.join(format!("{}.pyx", unit));
        let build_path = dir.join(format!("{}.pyxbld", unit));
        let mut written = self.write_if_changed(&dir.join("__init__.py"), "")?;
        written |= self.write_if_changed(&source_path, source)?;
        written |= self.write_if_changed(&build_path, build)?;

        Ok(PersistOutcome {
            source_path,
            build_path,
            written,
        })
    }

    /// Number of file writes performed so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn write_if_changed(&self, path: &Path, text: &str) -> TurboResult<bool> {
        match fs::read_to_string(path) {
            Ok(existing) if existing == text => {
                debug!("Unchanged: {}", path.display());
                return Ok(false);
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(TurboError::io(path, e)),
        }
        debug!("Writing: {}", path.display());
        fs::write(path, text).map_err(|e| TurboError::io(path, e))?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}
