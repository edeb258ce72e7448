use crate::error::{deps, PipelineError};
use crate::secrets::{self, SecretStore};
use anyhow::Context;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;

const DEFAULT_UPLOAD_BASE_URL: &str = "https://storage.googleapis.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Object-storage seam: store bytes at a path, get a stable URI back.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, PipelineError>;
}

/// GCS JSON-API media upload. Auth is a bearer token resolved through the
/// secret store (`GCS_ACCESS_TOKEN`).
#[derive(Debug, Clone)]
pub struct GcsObjectStore {
    http: reqwest::Client,
    bucket: String,
    base_url: String,
    access_token: String,
}

impl GcsObjectStore {
    pub async fn from_secrets(bucket: String, store: &dyn SecretStore) -> anyhow::Result<Self> {
        let access_token = secrets::resolve(store, "GCS_ACCESS_TOKEN").await?;
        let base_url = std::env::var("GCS_UPLOAD_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_UPLOAD_BASE_URL.to_string());
        let timeout_secs = std::env::var("GCS_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build object storage http client")?;

        Ok(Self {
            http,
            bucket,
            base_url,
            access_token,
        })
    }
}

#[async_trait::async_trait]
impl ObjectStore for GcsObjectStore {
    async fn put_object(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, PipelineError> {
        let url = format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.base_url.trim_end_matches('/'),
            self.bucket,
            urlencoding::encode(path)
        );

        let res = self
            .http
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.access_token))
            .header(CONTENT_TYPE, content_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| PipelineError::from_reqwest(deps::STORAGE_WRITE, e))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(PipelineError::from_status(
                deps::STORAGE_WRITE,
                status.as_u16(),
                body,
            ));
        }

        Ok(format!("gs://{}/{}", self.bucket, path))
    }
}
