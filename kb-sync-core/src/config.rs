use std::path::PathBuf;

use tracing::{debug, info};

/// Default number of files uploaded concurrently.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Everything the core needs to know about a run, passed in explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Folder the requested files are resolved against.
    pub folder: PathBuf,
    /// Name of the knowledge base whose file data source is updated.
    pub kb_name: String,
    /// Upper bound on files in flight during the upload phase.
    pub concurrency: usize,
}

impl SyncConfig {
    pub fn new(kb_name: impl Into<String>) -> Self {
        Self {
            folder: PathBuf::from("."),
            kb_name: kb_name.into(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            folder = %self.folder.display(),
            kb_name = %self.kb_name,
            concurrency = self.concurrency,
            "Loaded SyncConfig"
        );
        debug!(?self, "SyncConfig loaded (full debug)");
    }
}
