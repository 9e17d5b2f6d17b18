//! Scratch directories owned by a context.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// A scratch directory removed exactly once.
///
/// Removal happens on [`TempResource::release`] or, failing that, when the
/// resource is dropped, so an abandoned ingestion never leaves files behind.
#[derive(Debug)]
pub struct TempResource {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl TempResource {
    pub fn new(dir: TempDir) -> Self {
        Self {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_released(&self) -> bool {
        self.dir.is_none()
    }

    /// Remove the directory. Never fails: a path that is already gone counts
    /// as released, anything else is logged. Later calls are no-ops.
    pub fn release(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        match dir.close() {
            Ok(()) => debug!("Released temp resource {:?}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Temp resource {:?} was already gone", self.path)
            }
            Err(e) => warn!("Failed to release temp resource {:?}: {}", self.path, e),
        }
    }
}

/// The set of temp resources held by one context.
#[derive(Debug, Default)]
pub struct TempResources {
    items: Vec<TempResource>,
}

impl TempResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, resource: TempResource) {
        self.items.push(resource);
    }

    /// Release everything; continues past individual failures.
    pub fn release_all(&mut self) {
        for mut resource in self.items.drain(..) {
            resource.release();
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
