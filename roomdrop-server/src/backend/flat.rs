//! Flat-keyspace storage adapter.
//!
//! The provider stores every object in one global keyspace and lets the
//! uploader attach a custom identifier. Room membership is encoded in that
//! identifier (`{room_id}__{nonce}`), and since the provider cannot filter
//! its listing by it, listing a room means paging through the whole store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use roomdrop_common::backend::{StorageAdapter, UploadFile};
use roomdrop_common::error::StorageError;
use roomdrop_common::record::{infer_format, FileRecord};
use roomdrop_common::room::{Keyspace, RoomId};

/// Page size requested from the provider's list-all capability.
pub const LIST_PAGE_SIZE: usize = 200;

/// An object as reported by the provider's listing.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatObject {
    /// Provider-native key, used for URL resolution.
    pub key: String,
    pub custom_id: Option<String>,
    pub name: String,
    pub size: u64,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct FlatPage {
    pub files: Vec<FlatObject>,
    /// Items the provider returned for this page, including any the client
    /// could not decode and left out of `files`. Paging advances by this.
    pub scanned: usize,
    pub has_more: bool,
}

/// Provider response to a successful upload. Every field the provider may
/// omit is optional so the adapter can reject malformed payloads itself.
#[derive(Debug, Clone, Default)]
pub struct FlatUploaded {
    pub key: Option<String>,
    pub url: Option<String>,
    pub name: Option<String>,
    pub size: Option<u64>,
    pub uploaded_at: Option<DateTime<Utc>>,
}

/// Raw provider calls behind the flat-keyspace adapter.
#[async_trait]
pub trait FlatStoreApi: Send + Sync {
    async fn upload_file(&self, file: UploadFile, custom_id: &str) -> Result<FlatUploaded, StorageError>;

    async fn list_files(&self, limit: usize, offset: usize) -> Result<FlatPage, StorageError>;

    /// Resolve download URLs for a batch of native keys. Keys the provider
    /// does not know are simply absent from the result.
    async fn file_urls(&self, keys: &[String]) -> Result<HashMap<String, String>, StorageError>;

    /// URL derived from the key alone, used when resolution returns nothing.
    fn fallback_url(&self, key: &str) -> String;
}

#[async_trait]
impl<T: FlatStoreApi + ?Sized> FlatStoreApi for Arc<T> {
    async fn upload_file(&self, file: UploadFile, custom_id: &str) -> Result<FlatUploaded, StorageError> {
        (**self).upload_file(file, custom_id).await
    }

    async fn list_files(&self, limit: usize, offset: usize) -> Result<FlatPage, StorageError> {
        (**self).list_files(limit, offset).await
    }

    async fn file_urls(&self, keys: &[String]) -> Result<HashMap<String, String>, StorageError> {
        (**self).file_urls(keys).await
    }

    fn fallback_url(&self, key: &str) -> String {
        (**self).fallback_url(key)
    }
}

pub struct FlatKeyspaceAdapter<A> {
    api: A,
}

impl<A: FlatStoreApi> FlatKeyspaceAdapter<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    async fn list_all(&self) -> Result<Vec<FlatObject>, StorageError> {
        let mut collected = Vec::new();
        let mut offset = 0;

        loop {
            let page = self.api.list_files(LIST_PAGE_SIZE, offset).await?;
            if page.scanned > page.files.len() {
                warn!(
                    offset,
                    skipped = page.scanned - page.files.len(),
                    "Flat store page had undecodable items"
                );
            }
            collected.extend(page.files);
            offset += page.scanned;

            // An empty page ends the walk even if has_more says otherwise
            if !page.has_more || page.scanned == 0 {
                break;
            }
        }

        debug!(total = collected.len(), "Flat store listing complete");
        Ok(collected)
    }
}

#[async_trait]
impl<A: FlatStoreApi> StorageAdapter for FlatKeyspaceAdapter<A> {
    fn keyspace(&self) -> Keyspace {
        Keyspace::Flat
    }

    async fn upload(&self, file: UploadFile, room: &RoomId) -> Result<FileRecord, StorageError> {
        let nonce = Uuid::new_v4().to_string();
        let custom_id = Keyspace::Flat.derive_storage_key(room, &nonce);
        let filename = file.filename.clone();
        let sent_size = file.bytes.len() as u64;

        let uploaded = self.api.upload_file(file, &custom_id).await?;

        let key = uploaded
            .key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| StorageError::UploadFailed("provider response has no file key".into()))?;
        let download_url = uploaded.url.unwrap_or_else(|| self.api.fallback_url(&key));
        let name = uploaded.name.filter(|n| !n.is_empty()).unwrap_or(filename);

        debug!(key = %key, custom_id = %custom_id, "Flat store upload complete");

        Ok(FileRecord {
            storage_key: custom_id,
            download_url,
            format: infer_format(&name),
            original_filename: Some(name),
            byte_size: uploaded.size.unwrap_or(sent_size),
            created_at: uploaded.uploaded_at.unwrap_or_else(Utc::now),
            room_id: room.clone(),
        })
    }

    async fn list_by_room(&self, room: &RoomId) -> Result<Vec<FileRecord>, StorageError> {
        let all = self.list_all().await?;
        let scanned = all.len();

        let relevant: Vec<(String, FlatObject)> = all
            .into_iter()
            .filter_map(|obj| {
                let custom_id = obj.custom_id.clone()?;
                room.owns_flat_key(&custom_id).then_some((custom_id, obj))
            })
            .collect();

        debug!(room_id = %room, scanned, matched = relevant.len(), "Filtered flat store listing");

        if relevant.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = relevant.iter().map(|(_, obj)| obj.key.clone()).collect();
        let urls = self.api.file_urls(&keys).await?;
        if urls.len() < keys.len() {
            warn!(
                requested = keys.len(),
                resolved = urls.len(),
                "Some download URLs unresolved, using fallback URLs"
            );
        }

        Ok(relevant
            .into_iter()
            .map(|(custom_id, obj)| FileRecord {
                download_url: urls
                    .get(&obj.key)
                    .cloned()
                    .unwrap_or_else(|| self.api.fallback_url(&obj.key)),
                storage_key: custom_id,
                format: infer_format(&obj.name),
                original_filename: Some(obj.name),
                byte_size: obj.size,
                created_at: obj.uploaded_at,
                room_id: room.clone(),
            })
            .collect())
    }
}
