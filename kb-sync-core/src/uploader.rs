//! Upload phase: bring every requested local file into remote storage.
//!
//! For each requested file, in request order:
//!   1. check whether a record with the same base name already exists (skip if so)
//!   2. otherwise stage and finalize it through [`RemoteFileRegistry`]
//!
//! Files are independent, so up to `concurrency` of them are in flight at once.
//! Results are always reported in request order. One file failing does not stop the
//! others; only a fatal transport fault ([`ApiError::is_fatal`]) ends the phase.

use std::fmt;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{error, info, warn};

use crate::contract::{ApiError, DataFileRecord, KnowledgeBaseApi};
use crate::file_set::FileNameSet;
use crate::registry::{LocalFile, RemoteFileRegistry, UploadError};

/// What happened to one requested file.
#[derive(Debug)]
pub enum UploadOutcome {
    /// A record with this name already existed remotely.
    Skipped,
    Uploaded(DataFileRecord),
    Failed(UploadError),
}

impl UploadOutcome {
    /// True when the name is available remotely after the phase.
    pub fn is_available(&self) -> bool {
        matches!(self, UploadOutcome::Skipped | UploadOutcome::Uploaded(_))
    }
}

#[derive(Debug)]
pub struct FileUploadReport {
    /// Remote name (base name), or the raw argument if no name could be derived.
    pub name: String,
    pub outcome: UploadOutcome,
}

/// Per-file outcomes of the upload phase, in request order.
#[derive(Debug, Default)]
pub struct UploadReport {
    pub files: Vec<FileUploadReport>,
}

impl UploadReport {
    pub fn uploaded(&self) -> usize {
        self.count(|o| matches!(o, UploadOutcome::Uploaded(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, UploadOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, UploadOutcome::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&UploadOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.outcome)).count()
    }

    /// Names that exist remotely after the phase (skipped or uploaded), in request order.
    pub fn available_names(&self) -> FileNameSet {
        self.files
            .iter()
            .filter(|f| f.outcome.is_available())
            .map(|f| f.name.clone())
            .collect()
    }
}

impl fmt::Display for UploadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for file in &self.files {
            match &file.outcome {
                UploadOutcome::Skipped => writeln!(f, "{} : Already exists. Skipping.", file.name)?,
                UploadOutcome::Uploaded(record) => {
                    writeln!(f, "{} : Uploaded (id {}).", file.name, record.id)?
                }
                UploadOutcome::Failed(e) => writeln!(f, "{} : FAILED {}", file.name, e)?,
            }
        }
        write!(
            f,
            "{} uploaded, {} skipped, {} failed",
            self.uploaded(),
            self.skipped(),
            self.failed()
        )
    }
}

/// Run the upload phase for `files` (resolved against `folder`).
///
/// Duplicate base names are collapsed to their first occurrence. Returns `Err`
/// only for a fatal transport fault; every other failure is in the report.
pub async fn sync_uploads<A>(
    api: &A,
    folder: &Path,
    files: &[PathBuf],
    concurrency: usize,
) -> Result<UploadReport, ApiError>
where
    A: KnowledgeBaseApi + ?Sized,
{
    let registry = RemoteFileRegistry::new(api);
    let mut requested = FileNameSet::new();
    let mut jobs: Vec<Result<LocalFile, FileUploadReport>> = Vec::new();

    for arg in files {
        match LocalFile::resolve(folder, arg) {
            Ok(file) => {
                if requested.insert(file.name.clone()) {
                    jobs.push(Ok(file));
                } else {
                    warn!(file = %file.name, path = %arg.display(), "[UPLOAD] Duplicate file name requested, ignoring");
                }
            }
            Err(e) => {
                error!(path = %arg.display(), error = %e, "[UPLOAD][ERROR] Cannot derive remote name");
                jobs.push(Err(FileUploadReport {
                    name: arg.display().to_string(),
                    outcome: UploadOutcome::Failed(e),
                }));
            }
        }
    }

    info!(files = requested.len(), concurrency, "[UPLOAD] Starting upload phase");

    let registry = &registry;
    let files: Vec<FileUploadReport> = stream::iter(jobs)
        .map(|job| async move {
            match job {
                Ok(file) => upload_one(registry, file).await,
                Err(report) => Ok(report),
            }
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    let report = UploadReport { files };
    info!(
        uploaded = report.uploaded(),
        skipped = report.skipped(),
        failed = report.failed(),
        "[UPLOAD] Upload phase complete"
    );
    Ok(report)
}

async fn upload_one<A>(
    registry: &RemoteFileRegistry<'_, A>,
    file: LocalFile,
) -> Result<FileUploadReport, ApiError>
where
    A: KnowledgeBaseApi + ?Sized,
{
    let outcome = match registry.exists(&file.name).await {
        Ok(true) => {
            info!(file = %file.name, "[UPLOAD] Already exists, skipping");
            UploadOutcome::Skipped
        }
        Ok(false) => match registry.upload(&file).await {
            Ok(record) => UploadOutcome::Uploaded(record),
            Err(UploadError::Staging(e)) if e.is_fatal() => return Err(fatal(&file, e)),
            Err(UploadError::Finalize { source, .. }) if source.is_fatal() => {
                return Err(fatal(&file, source))
            }
            Err(e) => UploadOutcome::Failed(e),
        },
        Err(e) if e.is_fatal() => return Err(fatal(&file, e)),
        Err(e) => {
            error!(file = %file.name, error = %e, "[UPLOAD][ERROR] Existence check failed");
            UploadOutcome::Failed(UploadError::Existence(e))
        }
    };

    Ok(FileUploadReport {
        name: file.name,
        outcome,
    })
}

fn fatal(file: &LocalFile, e: ApiError) -> ApiError {
    error!(file = %file.name, error = %e, "[UPLOAD][ERROR] Fatal transport fault, aborting upload phase");
    e
}
