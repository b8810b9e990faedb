//! UploadThing REST client, the flat-keyspace provider.
//!
//! Uploads are two-step: the API hands out a presigned URL for the file
//! (tagged with our custom identifier), then the bytes go straight to that
//! URL. Listing and URL resolution are plain JSON POSTs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use roomdrop_common::backend::UploadFile;
use roomdrop_common::error::StorageError;

use super::flat::{FlatObject, FlatPage, FlatStoreApi, FlatUploaded};
use crate::config::UploadThingConfig;

const API_VERSION_HEADER: &str = "x-uploadthing-version";
const API_VERSION: &str = "6.4.0";
const API_KEY_HEADER: &str = "x-uploadthing-api-key";

pub struct UploadThingApi {
    config: UploadThingConfig,
    client: Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadFilesRequest<'a> {
    files: Vec<UploadFileSpec<'a>>,
    acl: &'static str,
    content_disposition: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadFileSpec<'a> {
    name: &'a str,
    size: usize,
    #[serde(rename = "type")]
    mime_type: &'a str,
    custom_id: &'a str,
}

#[derive(Deserialize)]
struct UploadFilesResponse {
    #[serde(default)]
    data: Vec<PresignedUpload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PresignedUpload {
    key: Option<String>,
    url: Option<String>,
    file_url: Option<String>,
    file_name: Option<String>,
    #[serde(default)]
    fields: HashMap<String, String>,
}

#[derive(Serialize)]
struct ListFilesRequest {
    limit: usize,
    offset: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListFilesResponse {
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    files: Vec<ListedFile>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListedFile {
    key: String,
    custom_id: Option<String>,
    name: String,
    #[serde(default)]
    size: u64,
    /// Milliseconds since the epoch.
    uploaded_at: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileUrlsRequest<'a> {
    file_keys: &'a [String],
}

#[derive(Deserialize)]
struct FileUrlsResponse {
    #[serde(default)]
    data: Vec<FileUrlEntry>,
}

#[derive(Deserialize)]
struct FileUrlEntry {
    key: String,
    url: String,
}

impl UploadThingApi {
    pub fn new(config: UploadThingConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v6/{}", self.config.api_url.trim_end_matches('/'), path)
    }

    /// POST a JSON body to an API route and decode the JSON answer.
    /// Provider-side failures are reported through `on_failure`.
    async fn post_json<B, R>(
        &self,
        path: &str,
        body: &B,
        on_failure: fn(String) -> StorageError,
    ) -> Result<R, StorageError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let resp = self
            .client
            .post(self.endpoint(path))
            .header(API_KEY_HEADER, &self.config.api_key)
            .header(API_VERSION_HEADER, API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| StorageError::BackendUnavailable(format!("UploadThing {path} request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_failure(path, status, &text, on_failure));
        }

        resp.json::<R>()
            .await
            .map_err(|e| on_failure(format!("UploadThing {path} response malformed: {e}")))
    }
}

fn classify_failure(
    path: &str,
    status: StatusCode,
    body: &str,
    on_failure: fn(String) -> StorageError,
) -> StorageError {
    let msg = format!("UploadThing {path} failed: HTTP {status} - {body}");
    warn!(path, status = %status, "UploadThing request rejected");
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StorageError::BackendUnavailable(msg),
        s if s.is_server_error() => StorageError::BackendUnavailable(msg),
        _ => on_failure(msg),
    }
}

fn millis_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Convert a listing response, dropping items with an unusable upload time.
/// `scanned` keeps the provider's own count so paging stays aligned.
fn into_page(resp: ListFilesResponse) -> FlatPage {
    let scanned = resp.files.len();
    let files = resp
        .files
        .into_iter()
        .filter_map(|f| {
            let Some(uploaded_at) = millis_to_utc(f.uploaded_at) else {
                warn!(key = %f.key, "Listed file has invalid upload time");
                return None;
            };
            Some(FlatObject {
                key: f.key,
                custom_id: f.custom_id,
                name: f.name,
                size: f.size,
                uploaded_at,
            })
        })
        .collect();

    FlatPage {
        files,
        scanned,
        has_more: resp.has_more,
    }
}

#[async_trait]
impl FlatStoreApi for UploadThingApi {
    async fn upload_file(&self, file: UploadFile, custom_id: &str) -> Result<FlatUploaded, StorageError> {
        let request = UploadFilesRequest {
            files: vec![UploadFileSpec {
                name: &file.filename,
                size: file.bytes.len(),
                mime_type: &file.mime_type,
                custom_id,
            }],
            acl: "public-read",
            content_disposition: "inline",
        };
        let presigned: UploadFilesResponse =
            self.post_json("uploadFiles", &request, StorageError::UploadFailed).await?;

        let target = presigned
            .data
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::UploadFailed("UploadThing returned no upload slot".into()))?;
        let upload_url = target
            .url
            .clone()
            .ok_or_else(|| StorageError::UploadFailed("UploadThing upload slot has no URL".into()))?;

        let size = file.bytes.len() as u64;
        let part = reqwest::multipart::Part::bytes(file.bytes.to_vec())
            .file_name(file.filename.clone())
            .mime_str(&file.mime_type)
            .map_err(|e| StorageError::validation(format!("Invalid content type: {e}")))?;
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in target.fields {
            form = form.text(name, value);
        }
        form = form.part("file", part);

        let resp = self
            .client
            .post(&upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| StorageError::BackendUnavailable(format!("UploadThing transfer failed: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(classify_failure("transfer", status, &text, StorageError::UploadFailed));
        }

        debug!(key = ?target.key, custom_id, "UploadThing transfer complete");

        Ok(FlatUploaded {
            url: target
                .file_url
                .or_else(|| target.key.as_deref().map(|k| self.fallback_url(k))),
            key: target.key,
            name: target.file_name,
            size: Some(size),
            uploaded_at: None,
        })
    }

    async fn list_files(&self, limit: usize, offset: usize) -> Result<FlatPage, StorageError> {
        let resp: ListFilesResponse = self
            .post_json("listFiles", &ListFilesRequest { limit, offset }, StorageError::ListPartial)
            .await?;
        Ok(into_page(resp))
    }

    async fn file_urls(&self, keys: &[String]) -> Result<HashMap<String, String>, StorageError> {
        let resp: FileUrlsResponse = self
            .post_json("getFileUrl", &FileUrlsRequest { file_keys: keys }, StorageError::ListPartial)
            .await?;
        Ok(resp.data.into_iter().map(|e| (e.key, e.url)).collect())
    }

    fn fallback_url(&self, key: &str) -> String {
        format!(
            "{}/f/{}",
            self.config.file_url_base.trim_end_matches('/'),
            urlencoding::encode(key)
        )
    }
}
