use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ChartError;

/// Destination for rendered chart bytes. Returns the URL a caller can later
/// dereference.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, key: &str, bytes: &[u8]) -> Result<String, ChartError>;
}

pub struct HttpObjectStore {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpObjectStore {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .expect("object store http client builds"),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn upload(&self, key: &str, bytes: &[u8]) -> Result<String, ChartError> {
        let url = format!("{}/{}", self.endpoint.trim_end_matches('/'), key);
        let resp = self
            .http
            .put(&url)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| ChartError::UploadFailed(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ChartError::UploadFailed(format!("status {}", resp.status())));
        }
        Ok(url)
    }
}

/// Last-resort store used when the object store is unreachable: writes the
/// bytes under a local directory and returns a `file://` URL.
pub struct LocalFileStore {
    base_dir: PathBuf,
}

impl LocalFileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalFileStore {
    async fn upload(&self, key: &str, bytes: &[u8]) -> Result<String, ChartError> {
        let path = self.base_dir.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ChartError::UploadFailed(e.to_string()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ChartError::UploadFailed(e.to_string()))?;
        Ok(format!("file://{}", path.display()))
    }
}
