use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{FilePage, FileUpload, GatewayError, VectorStoreGateway};
use crate::models::api::SearchHit;
use crate::models::status::{
    BatchStatus, FileCounts, FileStatus, ProcessingStatus, StoreLifecycle, VectorStore,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Vector store gateway backed by the OpenAI files and vector stores API.
pub struct OpenAiGateway {
    base_url: String,
    api_key: String,
    http_client: reqwest::Client,
}

#[derive(Serialize)]
struct CreateStoreRequest<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct CreateBatchRequest<'a> {
    file_ids: &'a [String],
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    max_num_results: u32,
}

#[derive(Deserialize)]
struct StoreObject {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    file_counts: Option<FileCounts>,
}

#[derive(Deserialize)]
struct FileObject {
    id: String,
}

#[derive(Deserialize)]
struct BatchObject {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    file_counts: Option<FileCounts>,
}

#[derive(Deserialize)]
struct StoreFileObject {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    last_error: Option<LastError>,
}

#[derive(Deserialize)]
struct LastError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct ListObject {
    #[serde(default)]
    data: Vec<StoreFileObject>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    last_id: Option<String>,
}

#[derive(Deserialize)]
struct SearchPage {
    #[serde(default)]
    data: Vec<SearchResultObject>,
}

#[derive(Deserialize)]
struct SearchResultObject {
    file_id: String,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Deserialize)]
struct ContentPart {
    #[serde(default)]
    text: Option<String>,
}

impl From<StoreObject> for VectorStore {
    fn from(obj: StoreObject) -> Self {
        Self {
            id: obj.id,
            name: obj.name,
            lifecycle: StoreLifecycle::from_vendor(obj.status.as_deref()),
            file_counts: obj.file_counts.unwrap_or_default(),
        }
    }
}

impl From<BatchObject> for BatchStatus {
    fn from(obj: BatchObject) -> Self {
        Self {
            batch_id: obj.id,
            status: ProcessingStatus::from_vendor(obj.status.as_deref()),
            file_counts: obj.file_counts.unwrap_or_default(),
        }
    }
}

impl From<StoreFileObject> for FileStatus {
    fn from(obj: StoreFileObject) -> Self {
        let error = obj.last_error.and_then(|e| match (e.code, e.message) {
            (Some(code), Some(msg)) => Some(format!("{code}: {msg}")),
            (None, Some(msg)) => Some(msg),
            (Some(code), None) => Some(code),
            (None, None) => None,
        });
        Self {
            id: obj.id,
            status: ProcessingStatus::from_vendor(obj.status.as_deref()),
            error,
        }
    }
}

impl OpenAiGateway {
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http_client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Base URL plus `segments`, each percent-encoded as a single path segment.
    fn url(&self, segments: &[&str]) -> Result<reqwest::Url, GatewayError> {
        if let Some(bad) = segments.iter().find(|s| matches!(**s, "" | "." | "..")) {
            return Err(GatewayError::InvalidRequest(format!(
                "invalid path segment {bad:?}"
            )));
        }
        let mut url = reqwest::Url::parse(&self.base_url).map_err(|e| {
            GatewayError::InvalidRequest(format!("base url {}: {e}", self.base_url))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                GatewayError::InvalidRequest(format!("base url {} has no path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(
        &self,
        method: reqwest::Method,
        segments: &[&str],
    ) -> Result<reqwest::RequestBuilder, GatewayError> {
        Ok(self
            .http_client
            .request(method, self.url(segments)?)
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2"))
    }

    async fn send(
        &self,
        req: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<reqwest::Response, GatewayError> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::NotFound(what.to_string()));
        }
        Err(GatewayError::Api {
            status: status.as_u16(),
            body,
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T, GatewayError> {
        let resp = self.send(req, what).await?;
        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|e| GatewayError::Decode(format!("{what}: {e}")))
    }
}

#[async_trait]
impl VectorStoreGateway for OpenAiGateway {
    async fn retrieve_store(&self, store_id: &str) -> Result<VectorStore, GatewayError> {
        let req = self.request(reqwest::Method::GET, &["vector_stores", store_id])?;
        let obj: StoreObject = self
            .send_json(req, &format!("vector store {store_id}"))
            .await?;
        Ok(obj.into())
    }

    async fn create_store(&self, name: &str) -> Result<VectorStore, GatewayError> {
        let req = self
            .request(reqwest::Method::POST, &["vector_stores"])?
            .json(&CreateStoreRequest { name });
        let obj: StoreObject = self.send_json(req, "create vector store").await?;
        Ok(obj.into())
    }

    async fn upload_file(&self, file: &FileUpload) -> Result<String, GatewayError> {
        let part = reqwest::multipart::Part::bytes(file.data.clone())
            .file_name(file.filename.clone())
            .mime_str(&file.content_type)?;
        let form = reqwest::multipart::Form::new()
            .text("purpose", "assistants")
            .part("file", part);

        let req = self
            .request(reqwest::Method::POST, &["files"])?
            .multipart(form);
        let obj: FileObject = self
            .send_json(req, &format!("upload {}", file.filename))
            .await?;
        debug!("Uploaded {} as {}", file.filename, obj.id);
        Ok(obj.id)
    }

    async fn create_file_batch(
        &self,
        store_id: &str,
        file_ids: &[String],
    ) -> Result<BatchStatus, GatewayError> {
        let req = self
            .request(
                reqwest::Method::POST,
                &["vector_stores", store_id, "file_batches"],
            )?
            .json(&CreateBatchRequest { file_ids });
        let obj: BatchObject = self
            .send_json(req, &format!("vector store {store_id}"))
            .await?;
        Ok(obj.into())
    }

    async fn retrieve_batch(
        &self,
        store_id: &str,
        batch_id: &str,
    ) -> Result<BatchStatus, GatewayError> {
        let req = self.request(
            reqwest::Method::GET,
            &["vector_stores", store_id, "file_batches", batch_id],
        )?;
        let obj: BatchObject = self.send_json(req, &format!("batch {batch_id}")).await?;
        Ok(obj.into())
    }

    async fn retrieve_store_file(
        &self,
        store_id: &str,
        file_id: &str,
    ) -> Result<FileStatus, GatewayError> {
        let req = self.request(
            reqwest::Method::GET,
            &["vector_stores", store_id, "files", file_id],
        )?;
        let obj: StoreFileObject = self.send_json(req, &format!("file {file_id}")).await?;
        Ok(obj.into())
    }

    async fn list_store_files(
        &self,
        store_id: &str,
        after: Option<&str>,
        limit: u32,
    ) -> Result<FilePage, GatewayError> {
        let mut query: Vec<(&str, String)> = vec![("limit", limit.to_string())];
        if let Some(cursor) = after {
            query.push(("after", cursor.to_string()));
        }
        let req = self
            .request(reqwest::Method::GET, &["vector_stores", store_id, "files"])?
            .query(&query);
        let list: ListObject = self
            .send_json(req, &format!("vector store {store_id}"))
            .await?;

        Ok(FilePage {
            files: list.data.into_iter().map(FileStatus::from).collect(),
            has_more: list.has_more,
            last_id: list.last_id,
        })
    }

    async fn delete_store_file(&self, store_id: &str, file_id: &str) -> Result<(), GatewayError> {
        let req = self.request(
            reqwest::Method::DELETE,
            &["vector_stores", store_id, "files", file_id],
        )?;
        self.send(req, &format!("file {file_id} in vector store {store_id}"))
            .await?;
        Ok(())
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), GatewayError> {
        let req = self.request(reqwest::Method::DELETE, &["files", file_id])?;
        self.send(req, &format!("file {file_id}")).await?;
        Ok(())
    }

    async fn search(
        &self,
        store_id: &str,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<SearchHit>, GatewayError> {
        let req = self
            .request(
                reqwest::Method::POST,
                &["vector_stores", store_id, "search"],
            )?
            .json(&SearchRequest {
                query,
                max_num_results: max_results,
            });
        let page: SearchPage = self
            .send_json(req, &format!("vector store {store_id}"))
            .await?;

        Ok(page
            .data
            .into_iter()
            .map(|r| SearchHit {
                file_id: r.file_id,
                filename: r.filename,
                score: r.score,
                text: r
                    .content
                    .into_iter()
                    .filter_map(|c| c.text)
                    .collect::<Vec<_>>()
                    .join("\n"),
            })
            .collect())
    }
}
