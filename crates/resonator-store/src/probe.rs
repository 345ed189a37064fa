// ABOUTME: Filesystem existence checks used to decide whether a song row is orphaned.
// ABOUTME: OutputDir resolves artifact filenames against the configured output directory.

use std::io;
use std::path::{Path, PathBuf};

/// Answers whether a song's artifact is still present.
///
/// `Ok(false)` means the artifact is cleanly absent. An `Err` means the check
/// itself could not be completed and says nothing about the artifact.
pub trait ArtifactProbe {
    fn exists(&self, filename: &str) -> io::Result<bool>;
}

impl<F> ArtifactProbe for F
where
    F: Fn(&str) -> io::Result<bool>,
{
    fn exists(&self, filename: &str) -> io::Result<bool> {
        self(filename)
    }
}

/// The directory holding the database and every audio artifact.
#[derive(Debug, Clone)]
pub struct OutputDir {
    root: PathBuf,
}

impl OutputDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of an artifact inside the output directory.
    pub fn path_of(&self, filename: &str) -> PathBuf {
        self.root.join(filename)
    }
}

impl ArtifactProbe for OutputDir {
    fn exists(&self, filename: &str) -> io::Result<bool> {
        self.path_of(filename).try_exists()
    }
}
