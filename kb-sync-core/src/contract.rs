//! # contract: the remote knowledge-base service, as seen by the core
//!
//! This module defines a single trait ([`KnowledgeBaseApi`]) and the plain data
//! types that flow across it. Everything the synchronisation logic needs from the
//! remote service goes through this trait; the HTTP client lives in the CLI crate.
//!
//! ## Interface
//! - One async method per remote operation (list/get knowledge bases, query and
//!   create file records, stage temp content, update a data source, trigger
//!   reprocessing).
//! - Staging raw bytes ([`KnowledgeBaseApi::create_temp_content`]) and finalizing a
//!   file record ([`KnowledgeBaseApi::create_data_file`]) are two distinct calls so
//!   each phase of an upload can be mocked and asserted on its own.
//! - All methods return [`ApiError`]; [`ApiError::is_fatal`] separates faults that
//!   must end the run from ones that are reported and survived.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`; `MockKnowledgeBaseApi` is exported
//!   under the default `test-export-mocks` feature for integration tests.

use std::path::PathBuf;

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Errors raised by a [`KnowledgeBaseApi`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The remote service could not be reached at all.
    #[error("remote service unreachable: {0}")]
    Unreachable(String),

    /// The API key was rejected.
    #[error("authentication rejected by {endpoint} (HTTP {status})")]
    Unauthorized { endpoint: String, status: u16 },

    /// Any other transport failure (timeouts, broken bodies, ...).
    #[error("request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("unexpected response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    /// A local file could not be opened for streaming.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    /// True for faults that make every further call pointless: the service is
    /// unreachable or our credentials are rejected.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ApiError::Unreachable(_) | ApiError::Unauthorized { .. })
    }
}

/// A knowledge base as returned by the listing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBaseSummary {
    pub id: String,
    pub name: String,
}

/// Full knowledge base detail, including its data sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeBase {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "datasources", alias = "dataSources", default)]
    pub data_sources: Vec<DataSource>,
}

/// The data source type tag for file-backed sources.
pub const FILE_DATA_SOURCE: &str = "file";

/// A typed configuration unit within a knowledge base.
///
/// Only `id`, `type` and `fileConfig.files` are interpreted. Every other field is
/// kept in `extra` so the entity can be sent back whole on update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "fileConfig", default, skip_serializing_if = "Option::is_none")]
    pub file_config: Option<FileConfig>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DataSource {
    pub fn is_file_source(&self) -> bool {
        self.kind == FILE_DATA_SOURCE
    }

    /// Registered file names, in the order the service holds them.
    pub fn files(&self) -> &[String] {
        self.file_config
            .as_ref()
            .map(|c| c.files.as_slice())
            .unwrap_or(&[])
    }

    /// Replace the registered file list, leaving every other field untouched.
    pub fn set_files(&mut self, files: Vec<String>) {
        match &mut self.file_config {
            Some(config) => config.files = files,
            None => {
                self.file_config = Some(FileConfig {
                    files,
                    extra: Map::new(),
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub files: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `"files": null` reads the same as a missing list.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A permanent file record in remote storage. Identified by `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFileRecord {
    pub id: String,
    pub name: String,
}

/// Request to stream a local file into temporary storage.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTempContent {
    /// Base name the content is tagged with.
    pub file_name: String,
    /// Local path the bytes are streamed from.
    pub path: PathBuf,
}

/// Opaque staging reference returned by the temp-content endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct TempUploadHandle {
    /// The location reference, e.g. `/api/v1/temp-contents/<id>`.
    pub location: String,
}

/// Finalize request turning staged content into a permanent file record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewDataFile {
    pub name: String,
    #[serde(rename = "tempContentFileId")]
    pub temp_content_file_id: String,
}

/// Trait for the remote knowledge-base service.
/// The implementor owns the base URL, authentication and wire format.
///
/// The trait is `Send` + `Sync` and intended for async/await usage.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait KnowledgeBaseApi: Send + Sync {
    /// Enumerate all knowledge bases visible to the caller.
    async fn list_knowledge_bases(&self) -> Result<Vec<KnowledgeBaseSummary>, ApiError>;

    /// Fetch one knowledge base including its data sources.
    async fn get_knowledge_base(&self, kb_id: &str) -> Result<KnowledgeBase, ApiError>;

    /// Query file records by name. An empty result means "not found".
    async fn find_data_files(&self, name: &str) -> Result<Vec<DataFileRecord>, ApiError>;

    /// Stream raw bytes into temporary storage (upload phase 1).
    async fn create_temp_content(&self, req: NewTempContent)
        -> Result<TempUploadHandle, ApiError>;

    /// Finalize staged content into a permanent file record (upload phase 2).
    async fn create_data_file(&self, req: NewDataFile) -> Result<DataFileRecord, ApiError>;

    /// Persist a whole data source entity.
    async fn update_data_source(
        &self,
        kb_id: &str,
        data_source: &DataSource,
    ) -> Result<(), ApiError>;

    /// Ask the service to re-ingest a data source. The response is not inspected.
    async fn trigger_reprocessing(&self, kb_id: &str, data_source_id: &str)
        -> Result<(), ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_source_round_trips_unknown_fields() {
        let raw = serde_json::json!({
            "id": "ds-1",
            "type": "file",
            "name": "Docs",
            "spaceId": "space-9",
            "fileConfig": { "files": ["a.pdf"], "recursive": true }
        });
        let mut ds: DataSource = serde_json::from_value(raw).unwrap();
        assert!(ds.is_file_source());
        assert_eq!(ds.files(), ["a.pdf".to_string()]);

        ds.set_files(vec!["a.pdf".into(), "b.pdf".into()]);
        let back = serde_json::to_value(&ds).unwrap();
        assert_eq!(back["name"], "Docs");
        assert_eq!(back["spaceId"], "space-9");
        assert_eq!(back["fileConfig"]["recursive"], true);
        assert_eq!(back["fileConfig"]["files"], serde_json::json!(["a.pdf", "b.pdf"]));
    }

    #[test]
    fn missing_file_config_reads_as_empty_and_is_created_on_write() {
        let mut ds: DataSource =
            serde_json::from_value(serde_json::json!({ "id": "ds-2", "type": "file" })).unwrap();
        assert!(ds.files().is_empty());
        ds.set_files(vec!["x.txt".into()]);
        let back = serde_json::to_value(&ds).unwrap();
        assert_eq!(back["fileConfig"]["files"], serde_json::json!(["x.txt"]));
    }

    #[test]
    fn null_file_list_reads_as_empty() {
        let kb: KnowledgeBase = serde_json::from_value(serde_json::json!({
            "id": "kb",
            "name": "n",
            "datasources": [{ "id": "d", "type": "file", "fileConfig": { "files": null } }]
        }))
        .unwrap();
        assert!(kb.data_sources[0].files().is_empty());
    }

    #[test]
    fn knowledge_base_accepts_both_data_source_spellings() {
        let lower: KnowledgeBase = serde_json::from_value(serde_json::json!({
            "id": "kb", "name": "n", "datasources": [{ "id": "d", "type": "web" }]
        }))
        .unwrap();
        let camel: KnowledgeBase = serde_json::from_value(serde_json::json!({
            "id": "kb", "name": "n", "dataSources": [{ "id": "d", "type": "web" }]
        }))
        .unwrap();
        assert_eq!(lower.data_sources.len(), 1);
        assert_eq!(camel.data_sources.len(), 1);
    }

    #[test]
    fn only_connectivity_and_auth_failures_are_fatal() {
        assert!(ApiError::Unreachable("refused".into()).is_fatal());
        assert!(ApiError::Unauthorized { endpoint: "/x".into(), status: 401 }.is_fatal());
        assert!(!ApiError::Status { endpoint: "/x".into(), status: 500, body: String::new() }
            .is_fatal());
        assert!(!ApiError::Request { endpoint: "/x".into(), reason: "timeout".into() }.is_fatal());
    }
}
