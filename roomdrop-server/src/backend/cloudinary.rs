//! Cloudinary REST client, the prefix-keyspace provider.
//!
//! Uploads are signed multipart POSTs to the `auto` resource endpoint.
//! Listing uses the Admin API with HTTP basic auth, one call per resource
//! type.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use roomdrop_common::backend::UploadFile;
use roomdrop_common::error::StorageError;

use super::prefix::{PrefixResource, PrefixStoreApi, ResourceCategory};
use crate::config::CloudinaryConfig;

/// Context metadata key that carries the uploader's filename.
const FILENAME_CONTEXT_KEY: &str = "original_filename";

pub struct CloudinaryApi {
    config: CloudinaryConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct Resource {
    public_id: Option<String>,
    secure_url: Option<String>,
    original_filename: Option<String>,
    format: Option<String>,
    #[serde(default)]
    bytes: u64,
    created_at: Option<DateTime<Utc>>,
    context: Option<ResourceContext>,
}

#[derive(Debug, Deserialize)]
struct ResourceContext {
    #[serde(default)]
    custom: std::collections::HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ResourceList {
    #[serde(default)]
    resources: Vec<Resource>,
}

impl From<Resource> for PrefixResource {
    fn from(r: Resource) -> Self {
        // Cloudinary's own original_filename drops the extension, so the
        // context copy wins when present.
        let original_filename = r
            .context
            .and_then(|mut c| c.custom.remove(FILENAME_CONTEXT_KEY))
            .or(r.original_filename);
        PrefixResource {
            public_id: r.public_id,
            secure_url: r.secure_url,
            original_filename,
            format: r.format,
            bytes: r.bytes,
            created_at: r.created_at,
        }
    }
}

impl CloudinaryApi {
    pub fn new(config: CloudinaryConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn base(&self) -> String {
        format!(
            "{}/v1_1/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.cloud_name
        )
    }

    /// Sign upload parameters: sorted `k=v` pairs joined by `&`, followed by
    /// the API secret, hashed with SHA-256.
    fn sign(&self, params: &[(&str, String)]) -> String {
        let mut sorted: Vec<&(&str, String)> = params.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let to_sign = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        hex::encode(Sha256::digest(format!("{}{}", to_sign, self.config.api_secret).as_bytes()))
    }
}

/// Escape a context value: `=` and `|` are structural in the context string.
fn escape_context_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('=', "\\=").replace('|', "\\|")
}

fn error_for(status: StatusCode, body: String, on_failure: fn(String) -> StorageError) -> StorageError {
    let msg = format!("Cloudinary request failed: HTTP {} - {}", status, body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StorageError::BackendUnavailable(msg),
        s if s.is_server_error() => StorageError::BackendUnavailable(msg),
        _ => on_failure(msg),
    }
}

#[async_trait]
impl PrefixStoreApi for CloudinaryApi {
    async fn upload_to_folder(&self, file: UploadFile, folder: &str) -> Result<PrefixResource, StorageError> {
        let timestamp = Utc::now().timestamp().to_string();
        let mut params: Vec<(&str, String)> = vec![
            ("folder", folder.to_string()),
            (
                "context",
                format!("{}={}", FILENAME_CONTEXT_KEY, escape_context_value(&file.filename)),
            ),
            ("timestamp", timestamp),
        ];
        if let Some(preset) = &self.config.upload_preset {
            params.push(("upload_preset", preset.clone()));
        }
        let signature = self.sign(&params);

        let part = reqwest::multipart::Part::bytes(file.bytes.to_vec())
            .file_name(file.filename.clone())
            .mime_str(&file.mime_type)
            .map_err(|e| StorageError::validation(format!("Invalid content type: {e}")))?;
        let mut form = reqwest::multipart::Form::new();
        for (k, v) in params {
            form = form.text(k, v);
        }
        form = form
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256")
            .part("file", part);

        let url = format!("{}/auto/upload", self.base());
        let resp = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| StorageError::BackendUnavailable(format!("Cloudinary upload request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, folder, "Cloudinary upload rejected");
            return Err(error_for(status, body, StorageError::UploadFailed));
        }

        let resource: Resource = resp
            .json()
            .await
            .map_err(|e| StorageError::UploadFailed(format!("Cloudinary upload response malformed: {e}")))?;
        debug!(public_id = ?resource.public_id, "Cloudinary upload complete");
        Ok(resource.into())
    }

    async fn list_resources(
        &self,
        category: ResourceCategory,
        prefix: &str,
        max_results: usize,
    ) -> Result<Vec<PrefixResource>, StorageError> {
        let url = format!(
            "{}/resources/{}/upload?prefix={}&max_results={}&context=true",
            self.base(),
            category.as_str(),
            urlencoding::encode(prefix),
            max_results
        );

        let resp = self
            .client
            .get(&url)
            .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
            .send()
            .await
            .map_err(|e| StorageError::BackendUnavailable(format!("Cloudinary list request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(status = %status, category = category.as_str(), "Cloudinary listing rejected");
            return Err(error_for(status, body, StorageError::ListPartial));
        }

        let list: ResourceList = resp
            .json()
            .await
            .map_err(|e| StorageError::ListPartial(format!("Cloudinary list response malformed: {e}")))?;
        Ok(list.resources.into_iter().map(PrefixResource::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> CloudinaryApi {
        CloudinaryApi::new(CloudinaryConfig {
            cloud_name: "demo".into(),
            api_key: "1234".into(),
            api_secret: "s3cret".into(),
            upload_preset: Some("roomdrop".into()),
            api_url: "https://api.cloudinary.com".into(),
        })
    }

    #[test]
    fn test_sign_sorts_params() {
        let a = api().sign(&[("timestamp", "1".into()), ("folder", "rooms/x".into())]);
        let b = api().sign(&[("folder", "rooms/x".into()), ("timestamp", "1".into())]);
        assert_eq!(a, b);
        let expected = hex::encode(Sha256::digest(b"folder=rooms/x&timestamp=1s3cret"));
        assert_eq!(a, expected);
    }

    #[test]
    fn test_escape_context_value() {
        assert_eq!(escape_context_value("a=b|c.txt"), "a\\=b\\|c.txt");
        assert_eq!(escape_context_value("plain.pdf"), "plain.pdf");
    }

    #[test]
    fn test_resource_prefers_context_filename() {
        let json = r#"{
            "public_id": "rooms/r1/x7k2",
            "secure_url": "https://res.cloudinary.com/demo/raw/upload/rooms/r1/x7k2",
            "original_filename": "notes",
            "bytes": 2048,
            "created_at": "2025-01-01T00:00:00Z",
            "context": {"custom": {"original_filename": "notes.pdf"}}
        }"#;
        let r: PrefixResource = serde_json::from_str::<Resource>(json).unwrap().into();
        assert_eq!(r.original_filename.as_deref(), Some("notes.pdf"));
        assert_eq!(r.bytes, 2048);
        assert!(r.format.is_none());
    }

    #[test]
    fn test_resource_without_context() {
        let json = r#"{"public_id": "rooms/r1/img", "format": "png", "bytes": 5,
                       "created_at": "2025-01-01T00:00:00Z", "original_filename": "img"}"#;
        let r: PrefixResource = serde_json::from_str::<Resource>(json).unwrap().into();
        assert_eq!(r.original_filename.as_deref(), Some("img"));
        assert_eq!(r.format.as_deref(), Some("png"));
        assert!(r.secure_url.is_none());
    }

    #[test]
    fn test_base_url() {
        assert_eq!(api().base(), "https://api.cloudinary.com/v1_1/demo");
    }
}
