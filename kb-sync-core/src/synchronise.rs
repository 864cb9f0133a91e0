//! High-level workflow: upload phase, then knowledge-base phase.
//!
//! This module provides the top-level orchestration of a run:
//!   - Uploads every requested local file that is missing remotely (see [`crate::uploader`])
//!   - Resolves the configured knowledge base by name and locates its file data source
//!   - Appends the newly available file names to the data source's registered list
//!   - Persists the whole data source and triggers reprocessing
//!
//! # Major Types
//! - [`SynchroniseReport`]: per-file upload outcomes plus the knowledge-base outcome
//! - [`KbSyncOutcome`] / [`KbSyncError`]: successful results (including no-ops) vs reported errors
//!
//! # Ordering
//! The knowledge-base phase only starts once the upload phase has finished, because it
//! needs the complete list of names that are available remotely.
//!
//! # Concurrency caveat
//! Reading the registered files and writing the merged list back is a plain
//! read-modify-write of the whole entity. The service exposes no version check, so a
//! concurrent writer between the two calls is overwritten (last writer wins).
//!
//! # Error Handling
//! Missing or ambiguous knowledge bases, a missing file data source and non-fatal API
//! errors end up in the report. Only fatal transport faults ([`ApiError::is_fatal`]) are
//! returned as `Err`.

use std::fmt;
use std::path::PathBuf;

use tracing::{error, info};

use crate::config::SyncConfig;
use crate::contract::{ApiError, DataSource, KnowledgeBaseApi};
use crate::file_set::{merge_file_lists, FileNameSet};
use crate::uploader::{sync_uploads, UploadReport};

/// Successful knowledge-base phase results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KbSyncOutcome {
    /// Every requested name was already registered; nothing was written.
    NoNewFiles,
    /// The data source was updated and reprocessing was triggered.
    Updated { added: usize, total: usize },
}

/// Reported knowledge-base phase failures.
#[derive(Debug, thiserror::Error)]
pub enum KbSyncError {
    #[error("no knowledge base named {name:?}")]
    NotFound { name: String },

    #[error("found {matches} knowledge bases named {name:?}")]
    AmbiguousName { name: String, matches: usize },

    #[error("knowledge base {kb_id} has {file_sources} data sources of type \"file\", expected exactly one")]
    NoFileDataSource { kb_id: String, file_sources: usize },

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl KbSyncError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, KbSyncError::Api(e) if e.is_fatal())
    }
}

/// Reconcile the knowledge base's file data source with `file_names`.
///
/// Steps: resolve the knowledge base by exact name, pick its single "file" data
/// source, append the names it does not list yet, write the whole entity back, then
/// trigger reprocessing. Running it twice with the same names yields `NoNewFiles`.
pub async fn synchronise_knowledge_base<A>(
    api: &A,
    kb_name: &str,
    file_names: &FileNameSet,
) -> Result<KbSyncOutcome, KbSyncError>
where
    A: KnowledgeBaseApi + ?Sized,
{
    let matches: Vec<_> = api
        .list_knowledge_bases()
        .await?
        .into_iter()
        .filter(|kb| kb.name == kb_name)
        .collect();

    let kb_id = match matches.as_slice() {
        [kb] => kb.id.clone(),
        [] => {
            error!(kb_name, "[KB][ERROR] Knowledge base not found");
            return Err(KbSyncError::NotFound {
                name: kb_name.to_string(),
            });
        }
        many => {
            error!(kb_name, matches = many.len(), "[KB][ERROR] Knowledge base name is ambiguous");
            return Err(KbSyncError::AmbiguousName {
                name: kb_name.to_string(),
                matches: many.len(),
            });
        }
    };
    info!(kb_name, kb_id = %kb_id, "[KB] Resolved knowledge base");

    let kb = api.get_knowledge_base(&kb_id).await?;
    let mut file_sources: Vec<DataSource> = kb
        .data_sources
        .into_iter()
        .filter(DataSource::is_file_source)
        .collect();
    if file_sources.len() != 1 {
        error!(kb_id = %kb_id, file_sources = file_sources.len(), "[KB][ERROR] Expected exactly one file data source");
        return Err(KbSyncError::NoFileDataSource {
            kb_id,
            file_sources: file_sources.len(),
        });
    }
    let mut data_source = file_sources.remove(0);

    let merge = merge_file_lists(data_source.files(), file_names);
    info!(
        kb_id = %kb_id,
        data_source_id = %data_source.id,
        old_files = ?data_source.files(),
        new_files = ?merge.new_files,
        "[KB] Computed file list merge"
    );
    if merge.is_noop() {
        info!(kb_id = %kb_id, "[KB] No new files added. Nothing to do.");
        return Ok(KbSyncOutcome::NoNewFiles);
    }

    let added = merge.new_files.len();
    let total = merge.all_files.len();
    data_source.set_files(merge.all_files);

    info!(kb_id = %kb_id, data_source_id = %data_source.id, total, "[KB] Updating data source");
    api.update_data_source(&kb_id, &data_source).await?;

    info!(kb_id = %kb_id, data_source_id = %data_source.id, "[KB] Triggering reprocessing");
    api.trigger_reprocessing(&kb_id, &data_source.id).await?;

    info!(kb_id = %kb_id, added, total, "[KB] Update complete");
    Ok(KbSyncOutcome::Updated { added, total })
}

/// Output of a full run.
#[derive(Debug)]
pub struct SynchroniseReport {
    pub kb_name: String,
    pub uploads: UploadReport,
    pub knowledge_base: Result<KbSyncOutcome, KbSyncError>,
}

impl SynchroniseReport {
    /// True when every file is available remotely and the knowledge base phase succeeded.
    pub fn is_clean(&self) -> bool {
        self.uploads.failed() == 0 && self.knowledge_base.is_ok()
    }
}

impl fmt::Display for SynchroniseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.uploads)?;
        write!(f, "Knowledge base {:?}: ", self.kb_name)?;
        match &self.knowledge_base {
            Ok(KbSyncOutcome::NoNewFiles) => write!(f, "no new files added, nothing to do."),
            Ok(KbSyncOutcome::Updated { added, total }) => write!(
                f,
                "added {added} file(s), {total} registered in total; reprocessing triggered."
            ),
            Err(e) => write!(f, "ERROR {e}"),
        }
    }
}

/// Run both phases for `files`.
///
/// The knowledge-base phase receives the names that are available remotely after
/// the upload phase (skipped plus uploaded), in request order.
pub async fn synchronise<A>(
    api: &A,
    config: &SyncConfig,
    files: &[PathBuf],
) -> Result<SynchroniseReport, ApiError>
where
    A: KnowledgeBaseApi + ?Sized,
{
    info!(files = files.len(), kb_name = %config.kb_name, "[SYNC] Starting synchronisation");

    let uploads = sync_uploads(api, &config.folder, files, config.concurrency).await?;
    let available = uploads.available_names();

    let knowledge_base = match synchronise_knowledge_base(api, &config.kb_name, &available).await
    {
        Err(KbSyncError::Api(e)) if e.is_fatal() => {
            error!(error = %e, "[SYNC][ERROR] Fatal transport fault during knowledge base phase");
            return Err(e);
        }
        other => other,
    };

    match &knowledge_base {
        Ok(outcome) => info!(?outcome, "[SYNC] Synchronisation complete"),
        Err(e) => error!(error = %e, "[SYNC][ERROR] Knowledge base phase failed"),
    }

    Ok(SynchroniseReport {
        kb_name: config.kb_name.clone(),
        uploads,
        knowledge_base,
    })
}
