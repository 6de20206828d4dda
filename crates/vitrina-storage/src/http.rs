//! HTTP client for an ImageKit-compatible remote media store.

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use std::time::Duration;

use crate::remote::{RemoteFile, RemoteMediaStore, RemoteStoreError, RemoteStoreResult};
use vitrina_core::config::RemoteStoreConfig;
use vitrina_core::transform::{build_transformed_url, TransformOptions};

const UPLOAD_TIMEOUT_SECS: u64 = 120;

/// Upload response body. The store returns more fields; only the URL and
/// file id are recorded.
#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: Option<String>,
    #[serde(rename = "filePath")]
    file_path: Option<String>,
    #[serde(rename = "fileId")]
    file_id: Option<String>,
}

/// Remote media store client speaking the ImageKit upload API:
/// multipart POST authenticated with the private key, JSON response
/// carrying `url` and `fileId`.
pub struct HttpRemoteStore {
    client: reqwest::Client,
    upload_url: String,
    private_key: String,
    url_endpoint: Option<String>,
}

impl HttpRemoteStore {
    /// Build the client from configuration. Requires the upload endpoint and
    /// private key; the URL-rewrite endpoint stays optional.
    pub fn from_config(config: &RemoteStoreConfig) -> RemoteStoreResult<Self> {
        let upload_url = config.upload_url.clone().ok_or_else(|| {
            RemoteStoreError::NotConfigured("REMOTE_STORE_UPLOAD_URL not set".to_string())
        })?;
        let private_key = config.private_key.clone().ok_or_else(|| {
            RemoteStoreError::NotConfigured("REMOTE_STORE_PRIVATE_KEY not set".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(UPLOAD_TIMEOUT_SECS))
            .build()
            .map_err(|e| RemoteStoreError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            upload_url,
            private_key,
            url_endpoint: config.url_endpoint.clone(),
        })
    }
}

#[async_trait]
impl RemoteMediaStore for HttpRemoteStore {
    async fn upload(
        &self,
        data: Vec<u8>,
        filename: &str,
        folder: &str,
    ) -> RemoteStoreResult<RemoteFile> {
        let size = data.len();
        let start = std::time::Instant::now();

        let form = multipart::Form::new()
            .part(
                "file",
                multipart::Part::bytes(data).file_name(filename.to_string()),
            )
            .text("fileName", filename.to_string())
            .text("folder", folder.to_string());

        let response = self
            .client
            .post(&self.upload_url)
            .basic_auth(&self.private_key, Some(""))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RemoteStoreError::Timeout(e.to_string())
                } else {
                    RemoteStoreError::UploadFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteStoreError::UploadFailed(format!(
                "remote store returned {}: {}",
                status, body
            )));
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| RemoteStoreError::InvalidResponse(e.to_string()))?;

        let url = body.url.or(body.file_path).ok_or_else(|| {
            RemoteStoreError::InvalidResponse("response missing url/filePath".to_string())
        })?;
        let id = body.file_id.ok_or_else(|| {
            RemoteStoreError::InvalidResponse("response missing fileId".to_string())
        })?;

        tracing::info!(
            filename = %filename,
            folder = %folder,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Remote store upload successful"
        );

        Ok(RemoteFile { url, id })
    }

    fn transform_url(&self, src: &str, options: &TransformOptions) -> Option<String> {
        self.url_endpoint
            .as_deref()
            .map(|endpoint| build_transformed_url(endpoint, src, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url_endpoint: Option<&str>) -> RemoteStoreConfig {
        RemoteStoreConfig {
            upload_url: Some("https://upload.example.com/api/v1/files/upload".to_string()),
            private_key: Some("private_key".to_string()),
            url_endpoint: url_endpoint.map(String::from),
        }
    }

    #[test]
    fn from_config_requires_upload_url_and_key() {
        let mut cfg = config(None);
        cfg.upload_url = None;
        assert!(matches!(
            HttpRemoteStore::from_config(&cfg),
            Err(RemoteStoreError::NotConfigured(_))
        ));

        let mut cfg = config(None);
        cfg.private_key = None;
        assert!(matches!(
            HttpRemoteStore::from_config(&cfg),
            Err(RemoteStoreError::NotConfigured(_))
        ));

        assert!(HttpRemoteStore::from_config(&config(None)).is_ok());
    }

    #[test]
    fn transform_url_requires_endpoint() {
        let store = HttpRemoteStore::from_config(&config(None)).unwrap();
        let opts = TransformOptions::new().width(300);
        assert_eq!(store.transform_url("https://x/y.jpg", &opts), None);

        let store =
            HttpRemoteStore::from_config(&config(Some("https://ik.example.com/v"))).unwrap();
        let url = store
            .transform_url("https://ik.example.com/v/y.jpg", &opts)
            .unwrap();
        assert_eq!(url, "https://ik.example.com/v/tr:w-300/y.jpg");
    }

    #[test]
    fn upload_response_accepts_file_path_fallback() {
        let body = r#"{"filePath": "/catalog/x/images/a.jpg", "fileId": "f1"}"#;
        let parsed: UploadResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.url, None);
        assert_eq!(parsed.file_path.as_deref(), Some("/catalog/x/images/a.jpg"));
        assert_eq!(parsed.file_id.as_deref(), Some("f1"));
    }
}
