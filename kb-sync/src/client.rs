#![doc = "REST client for the knowledge base service: implements the core's `KnowledgeBaseApi` over HTTP."]
//
//! # Knowledge base client (CLI <-> Core)
//!
//! This module provides the bridge between the CLI workflow and the transport
//! abstraction in [`kb_sync_core::contract`]. [`KbClient`] talks to a tenant's REST
//! API with an API key sent as a bearer token.
//!
//! - Construct [`KbClient`] from the tenant URL and API key in the loaded config.
//! - Status codes 401/403 map to [`ApiError::Unauthorized`], connection failures to
//!   [`ApiError::Unreachable`]; both are fatal for a run. Everything else is reported
//!   per operation.
//! - Temp content is streamed from disk, never buffered whole in memory.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use kb_sync_core::contract::{
    ApiError, DataFileRecord, DataSource, KnowledgeBase, KnowledgeBaseApi, KnowledgeBaseSummary,
    NewDataFile, NewTempContent, TempUploadHandle,
};

const KNOWLEDGE_BASES: &str = "/api/v1/knowledgebases";
const DATA_FILES: &str = "/api/v1/data-files";
const TEMP_CONTENTS: &str = "/api/v1/temp-contents";

/// One page of a list endpoint.
#[derive(Debug, Deserialize)]
struct ListPage<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    #[serde(default)]
    links: Option<PageLinks>,
}

#[derive(Debug, Deserialize)]
struct PageLinks {
    next: Option<PageLink>,
}

#[derive(Debug, Deserialize)]
struct PageLink {
    href: String,
}

pub struct KbClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl KbClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("kb-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Request {
                endpoint: base_url.to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        tracing::info!(
            base_url,
            api_key_set = !api_key.is_empty(),
            "[CLIENT] Initialized knowledge base client"
        );
        Ok(KbClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Absolute URL for a paging link, which may be relative to the tenant.
    fn resolve_link(&self, endpoint: &str, href: &str) -> Result<String, ApiError> {
        Url::parse(&format!("{}/", self.base_url))
            .and_then(|base| base.join(href))
            .map(String::from)
            .map_err(|e| ApiError::InvalidResponse {
                endpoint: endpoint.to_string(),
                reason: format!("bad paging link {href:?}: {e}"),
            })
    }

    /// Send with credentials and turn non-success statuses into errors.
    async fn send(&self, endpoint: &str, req: RequestBuilder) -> Result<Response, ApiError> {
        let response = req
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| transport_error(endpoint, e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::error!(endpoint, status = status.as_u16(), "[CLIENT][ERROR] Credentials rejected");
            return Err(ApiError::Unauthorized {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(endpoint, status = status.as_u16(), body = %body, "[CLIENT][ERROR] Request failed");
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        tracing::debug!(endpoint, status = status.as_u16(), "[CLIENT] Request succeeded");
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        req: RequestBuilder,
    ) -> Result<T, ApiError> {
        self.send(endpoint, req)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ApiError::InvalidResponse {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })
    }
}

fn transport_error(endpoint: &str, e: reqwest::Error) -> ApiError {
    if e.is_connect() {
        tracing::error!(endpoint, error = ?e, "[CLIENT][ERROR] Service unreachable");
        ApiError::Unreachable(format!("{endpoint}: {e}"))
    } else {
        tracing::error!(endpoint, error = ?e, "[CLIENT][ERROR] Transport failure");
        ApiError::Request {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        }
    }
}

#[async_trait]
impl KnowledgeBaseApi for KbClient {
    async fn list_knowledge_bases(&self) -> Result<Vec<KnowledgeBaseSummary>, ApiError> {
        let mut all = Vec::new();
        let mut visited = HashSet::new();
        let mut next = Some(self.url(KNOWLEDGE_BASES));
        while let Some(url) = next.take() {
            let page: ListPage<KnowledgeBaseSummary> =
                self.send_json(KNOWLEDGE_BASES, self.http.get(&url)).await?;
            all.extend(page.data);
            visited.insert(url);
            next = match page.links.and_then(|l| l.next) {
                Some(link) => {
                    let resolved = self.resolve_link(KNOWLEDGE_BASES, &link.href)?;
                    if visited.contains(&resolved) {
                        tracing::warn!(next = %resolved, "[CLIENT] Next page link was already visited, stopping");
                        None
                    } else {
                        Some(resolved)
                    }
                }
                None => None,
            };
        }
        tracing::info!(count = all.len(), "[CLIENT] Listed knowledge bases");
        Ok(all)
    }

    async fn get_knowledge_base(&self, kb_id: &str) -> Result<KnowledgeBase, ApiError> {
        let endpoint = format!("{KNOWLEDGE_BASES}/{kb_id}");
        let kb: KnowledgeBase = self
            .send_json(&endpoint, self.http.get(self.url(&endpoint)))
            .await?;
        tracing::info!(
            kb_id,
            data_sources = kb.data_sources.len(),
            "[CLIENT] Fetched knowledge base"
        );
        Ok(kb)
    }

    async fn find_data_files(&self, name: &str) -> Result<Vec<DataFileRecord>, ApiError> {
        let req = self.http.get(self.url(DATA_FILES)).query(&[("name", name)]);
        let page: ListPage<DataFileRecord> = self.send_json(DATA_FILES, req).await?;
        Ok(page.data)
    }

    async fn create_temp_content(
        &self,
        req: NewTempContent,
    ) -> Result<TempUploadHandle, ApiError> {
        let io_error = |source| ApiError::Io {
            path: req.path.clone(),
            source,
        };
        let file = tokio::fs::File::open(&req.path).await.map_err(io_error)?;
        let len = file.metadata().await.map_err(io_error)?.len();
        tracing::info!(file = %req.file_name, bytes = len, "[CLIENT] Streaming file to temp-contents");

        let request = self
            .http
            .post(self.url(TEMP_CONTENTS))
            .query(&[("filename", req.file_name.as_str())])
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, len)
            .body(reqwest::Body::from(file));
        let response = self.send(TEMP_CONTENTS, request).await?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::InvalidResponse {
                endpoint: TEMP_CONTENTS.to_string(),
                reason: "missing Location header".to_string(),
            })?
            .to_string();
        tracing::info!(file = %req.file_name, location = %location, "[CLIENT] Temp content created");
        Ok(TempUploadHandle { location })
    }

    async fn create_data_file(&self, req: NewDataFile) -> Result<DataFileRecord, ApiError> {
        let json = serde_json::to_string(&req).map_err(|e| ApiError::InvalidResponse {
            endpoint: DATA_FILES.to_string(),
            reason: format!("failed to encode request: {e}"),
        })?;
        let form = reqwest::multipart::Form::new().text("Json", json);
        let record: DataFileRecord = self
            .send_json(DATA_FILES, self.http.post(self.url(DATA_FILES)).multipart(form))
            .await?;
        tracing::info!(name = %record.name, id = %record.id, "[CLIENT] Data file created");
        Ok(record)
    }

    async fn update_data_source(
        &self,
        kb_id: &str,
        data_source: &DataSource,
    ) -> Result<(), ApiError> {
        let endpoint = format!("{KNOWLEDGE_BASES}/{kb_id}/datasources/{}", data_source.id);
        tracing::info!(endpoint = %endpoint, files = data_source.files().len(), "[CLIENT] PUT data source");
        self.send(&endpoint, self.http.put(self.url(&endpoint)).json(data_source))
            .await?;
        Ok(())
    }

    async fn trigger_reprocessing(
        &self,
        kb_id: &str,
        data_source_id: &str,
    ) -> Result<(), ApiError> {
        let endpoint =
            format!("{KNOWLEDGE_BASES}/{kb_id}/datasources/{data_source_id}/actions/dryruns");
        tracing::info!(endpoint = %endpoint, "[CLIENT] Triggering reprocessing");
        self.send(&endpoint, self.http.post(self.url(&endpoint))).await?;
        Ok(())
    }
}
