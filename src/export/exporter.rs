use crate::export::mime::ArtifactMime;
use crate::export::result_error::error::Error;
use crate::export::result_error::result::Result;
use getset::{CopyGetters, Getters};
use std::path::{Path, PathBuf};

/// Produces one export artifact per call
pub trait Exporter {
    fn export(&self) -> ExportResult;
}

/// Outcome of a single `Exporter::export` call
///
/// Path, content type and captured output are filled in whether or not the
/// dump utility succeeded. A failed export only differs by its `outcome`.
#[derive(Debug, Getters, CopyGetters)]
pub struct ExportResult {
    path: PathBuf,
    #[getset(get_copy = "pub")]
    mime: ArtifactMime,
    #[getset(get = "pub")]
    stdout: String,
    outcome: Result<()>,
}

impl ExportResult {
    pub(crate) fn new(path: PathBuf, mime: ArtifactMime, stdout: String, outcome: Result<()>) -> Self {
        Self {
            path,
            mime,
            stdout,
            outcome,
        }
    }

    /// Artifact location, without extension
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn error(&self) -> Option<&Error> {
        self.outcome.as_ref().err()
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn into_parts(self) -> (PathBuf, ArtifactMime, String, Result<()>) {
        (self.path, self.mime, self.stdout, self.outcome)
    }
}
