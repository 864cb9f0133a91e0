//! Remote file registry: existence checks and the two-phase upload.
//!
//! Large files cannot be posted to the file-record endpoint directly. Instead the
//! raw bytes are first streamed to temporary storage, and the staging id from the
//! returned location is then used to create the permanent record.
//!
//! A failed finalize leaves the staged object behind; the service garbage-collects
//! temporary content, so it is not cleaned up here.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::contract::{
    ApiError, DataFileRecord, KnowledgeBaseApi, NewDataFile, NewTempContent,
};

/// A file on disk and the base name it is known by remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub name: String,
}

impl LocalFile {
    /// Resolve `arg` against `folder` and derive its remote name.
    pub fn resolve(folder: &Path, arg: &Path) -> Result<Self, UploadError> {
        let name = arg
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| UploadError::InvalidFileName {
                path: arg.to_path_buf(),
            })?;
        Ok(LocalFile {
            path: folder.join(arg),
            name: name.to_string(),
        })
    }
}

/// Why a single file could not be brought into remote storage.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("no usable file name in {}", path.display())]
    InvalidFileName { path: PathBuf },

    #[error("existence check failed: {0}")]
    Existence(#[source] ApiError),

    #[error("staging to temp-contents failed: {0}")]
    Staging(#[source] ApiError),

    #[error("finalizing temp content {temp_content_file_id} failed: {source}")]
    Finalize {
        temp_content_file_id: String,
        #[source]
        source: ApiError,
    },
}

impl UploadError {
    /// The transport error underneath, if any.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            UploadError::InvalidFileName { .. } => None,
            UploadError::Existence(e) | UploadError::Staging(e) => Some(e),
            UploadError::Finalize { source, .. } => Some(source),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.api_error().is_some_and(ApiError::is_fatal)
    }
}

/// Derive the staging id from a location reference: its trailing path segment.
///
/// `https://t.example/api/v1/temp-contents/abc123?x=1` yields `abc123`.
pub fn staging_id_from_location(location: &str) -> Option<&str> {
    let path = location.split(['?', '#']).next().unwrap_or(location);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
}

/// Existence checks and uploads against remote file storage.
pub struct RemoteFileRegistry<'a, A: KnowledgeBaseApi + ?Sized> {
    api: &'a A,
}

impl<'a, A: KnowledgeBaseApi + ?Sized> RemoteFileRegistry<'a, A> {
    pub fn new(api: &'a A) -> Self {
        Self { api }
    }

    /// True iff remote storage holds a file record with exactly this name.
    pub async fn exists(&self, name: &str) -> Result<bool, ApiError> {
        let records = self.api.find_data_files(name).await?;
        let found = records.iter().any(|r| r.name == name);
        debug!(file = name, candidates = records.len(), found, "[UPLOAD] Existence check");
        Ok(found)
    }

    /// Stage the file's bytes, then finalize them into a permanent record.
    pub async fn upload(&self, file: &LocalFile) -> Result<DataFileRecord, UploadError> {
        info!(file = %file.name, path = %file.path.display(), "[UPLOAD] Staging file content");
        let handle = self
            .api
            .create_temp_content(NewTempContent {
                file_name: file.name.clone(),
                path: file.path.clone(),
            })
            .await
            .map_err(|e| {
                error!(file = %file.name, error = %e, "[UPLOAD][ERROR] Staging failed");
                UploadError::Staging(e)
            })?;

        let temp_content_file_id = staging_id_from_location(&handle.location)
            .ok_or_else(|| {
                error!(file = %file.name, location = %handle.location, "[UPLOAD][ERROR] No staging id in location");
                UploadError::Staging(ApiError::InvalidResponse {
                    endpoint: "temp-contents".into(),
                    reason: format!("no staging id in location {:?}", handle.location),
                })
            })?
            .to_string();
        debug!(file = %file.name, temp_content_file_id = %temp_content_file_id, "[UPLOAD] Content staged");

        let record = self
            .api
            .create_data_file(NewDataFile {
                name: file.name.clone(),
                temp_content_file_id: temp_content_file_id.clone(),
            })
            .await
            .map_err(|source| {
                error!(
                    file = %file.name,
                    temp_content_file_id = %temp_content_file_id,
                    error = %source,
                    "[UPLOAD][ERROR] Finalize failed, staged content left for the service to collect"
                );
                UploadError::Finalize {
                    temp_content_file_id: temp_content_file_id.clone(),
                    source,
                }
            })?;

        info!(file = %file.name, id = %record.id, "[UPLOAD] File record created");
        Ok(record)
    }
}
