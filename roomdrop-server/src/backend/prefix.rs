//! Prefix-keyspace storage adapter.
//!
//! The provider organizes objects in folders and can filter its listing by
//! path prefix, so a room is simply the folder `rooms/{room_id}/`. Objects
//! are partitioned by content category on the provider side, which means a
//! room listing is one query per category.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use roomdrop_common::backend::{StorageAdapter, UploadFile};
use roomdrop_common::error::StorageError;
use roomdrop_common::record::{infer_format, FileRecord};
use roomdrop_common::room::{Keyspace, RoomId};

/// Results requested per category. Listing does not page past this.
pub const CATEGORY_PAGE_CAP: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceCategory {
    Raw,
    Image,
    Video,
}

impl ResourceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceCategory::Raw => "raw",
            ResourceCategory::Image => "image",
            ResourceCategory::Video => "video",
        }
    }
}

/// A stored resource as the provider reports it, after upload or in a
/// listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrefixResource {
    pub public_id: Option<String>,
    pub secure_url: Option<String>,
    /// Filename recovered from upload metadata, if the provider kept it.
    pub original_filename: Option<String>,
    pub format: Option<String>,
    pub bytes: u64,
    pub created_at: Option<DateTime<Utc>>,
}

/// Raw provider calls behind the prefix-keyspace adapter.
#[async_trait]
pub trait PrefixStoreApi: Send + Sync {
    /// Upload into `folder`, letting the provider name the object. The
    /// original filename is attached as metadata.
    async fn upload_to_folder(&self, file: UploadFile, folder: &str) -> Result<PrefixResource, StorageError>;

    async fn list_resources(
        &self,
        category: ResourceCategory,
        prefix: &str,
        max_results: usize,
    ) -> Result<Vec<PrefixResource>, StorageError>;
}

#[async_trait]
impl<T: PrefixStoreApi + ?Sized> PrefixStoreApi for Arc<T> {
    async fn upload_to_folder(&self, file: UploadFile, folder: &str) -> Result<PrefixResource, StorageError> {
        (**self).upload_to_folder(file, folder).await
    }

    async fn list_resources(
        &self,
        category: ResourceCategory,
        prefix: &str,
        max_results: usize,
    ) -> Result<Vec<PrefixResource>, StorageError> {
        (**self).list_resources(category, prefix, max_results).await
    }
}

pub struct PrefixKeyspaceAdapter<A> {
    api: A,
}

impl<A: PrefixStoreApi> PrefixKeyspaceAdapter<A> {
    pub fn new(api: A) -> Self {
        Self { api }
    }

    async fn list_category(
        &self,
        category: ResourceCategory,
        prefix: &str,
    ) -> Result<CategoryListing, StorageError> {
        let resources = self.api.list_resources(category, prefix, CATEGORY_PAGE_CAP).await?;
        let capped = resources.len() >= CATEGORY_PAGE_CAP;
        if capped {
            warn!(
                category = category.as_str(),
                prefix = %prefix,
                cap = CATEGORY_PAGE_CAP,
                "Category listing hit page cap, older files are not listed"
            );
        }
        Ok(CategoryListing { resources, capped })
    }
}

/// One category's listing. `capped` is set when the provider returned a
/// full page, meaning more resources may exist than were listed.
struct CategoryListing {
    resources: Vec<PrefixResource>,
    capped: bool,
}

/// Normalize a provider resource. Returns `None` when a required field is
/// missing.
fn normalize(resource: PrefixResource, room: &RoomId) -> Option<FileRecord> {
    let storage_key = resource.public_id.filter(|id| !id.is_empty())?;
    let download_url = resource.secure_url.filter(|u| !u.is_empty())?;
    let created_at = resource.created_at?;
    let format = resource
        .format
        .filter(|f| !f.is_empty())
        .or_else(|| resource.original_filename.as_deref().and_then(infer_format));

    Some(FileRecord {
        storage_key,
        download_url,
        original_filename: resource.original_filename,
        format,
        byte_size: resource.bytes,
        created_at,
        room_id: room.clone(),
    })
}

#[async_trait]
impl<A: PrefixStoreApi> StorageAdapter for PrefixKeyspaceAdapter<A> {
    fn keyspace(&self) -> Keyspace {
        Keyspace::Prefix
    }

    async fn upload(&self, file: UploadFile, room: &RoomId) -> Result<FileRecord, StorageError> {
        let prefix = Keyspace::Prefix.derive_storage_key(room, "");
        let folder = prefix.trim_end_matches('/');
        let filename = file.filename.clone();

        let mut resource = self.api.upload_to_folder(file, folder).await?;
        // The provider may report a shortened name; the uploaded one is exact
        resource.original_filename = Some(filename);
        if resource.created_at.is_none() {
            resource.created_at = Some(Utc::now());
        }

        let record = normalize(resource, room).ok_or_else(|| {
            StorageError::UploadFailed("provider response lacks public_id or secure_url".into())
        })?;

        debug!(public_id = %record.storage_key, "Prefix store upload complete");
        Ok(record)
    }

    async fn list_by_room(&self, room: &RoomId) -> Result<Vec<FileRecord>, StorageError> {
        let prefix = Keyspace::Prefix.derive_storage_key(room, "");

        let (raw, image, video) = tokio::try_join!(
            self.list_category(ResourceCategory::Raw, &prefix),
            self.list_category(ResourceCategory::Image, &prefix),
            self.list_category(ResourceCategory::Video, &prefix),
        )?;

        let capped = [&raw, &image, &video].iter().filter(|l| l.capped).count();

        let records: Vec<FileRecord> = raw
            .resources
            .into_iter()
            .chain(image.resources)
            .chain(video.resources)
            .filter(|r| r.public_id.as_deref().is_some_and(|id| id.starts_with(&prefix)))
            .filter_map(|r| {
                let id = r.public_id.clone();
                let rec = normalize(r, room);
                if rec.is_none() {
                    warn!(public_id = ?id, "Skipping malformed resource in listing");
                }
                rec
            })
            .collect();

        debug!(
            room_id = %room,
            count = records.len(),
            capped_categories = capped,
            "Prefix store listing complete"
        );
        Ok(records)
    }
}
