pub mod cloudinary;
pub mod flat;
pub mod prefix;
pub mod uploadthing;

use std::sync::Arc;

use roomdrop_common::backend::StorageAdapter;

use self::cloudinary::CloudinaryApi;
use self::flat::FlatKeyspaceAdapter;
use self::prefix::PrefixKeyspaceAdapter;
use self::uploadthing::UploadThingApi;
use crate::config::BackendConfig;

/// Construct the process-wide storage adapter from the startup config.
pub fn from_config(config: &BackendConfig) -> Arc<dyn StorageAdapter> {
    match config {
        BackendConfig::UploadThing(cfg) => {
            Arc::new(FlatKeyspaceAdapter::new(UploadThingApi::new(cfg.clone())))
        }
        BackendConfig::Cloudinary(cfg) => {
            Arc::new(PrefixKeyspaceAdapter::new(CloudinaryApi::new(cfg.clone())))
        }
    }
}

/// In-memory stand-ins for the provider APIs.
#[cfg(test)]
pub mod testing {
    use std::collections::HashMap;
    use std::ops::Range;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{Duration, TimeZone, Utc};

    use roomdrop_common::backend::UploadFile;
    use roomdrop_common::error::StorageError;

    use super::flat::{FlatObject, FlatPage, FlatStoreApi, FlatUploaded};
    use super::prefix::{PrefixResource, PrefixStoreApi, ResourceCategory};

    #[derive(Default)]
    struct FlatState {
        objects: Vec<FlatObject>,
        list_calls: Vec<(usize, usize)>,
        url_requests: Vec<Vec<String>>,
        upload_count: usize,
        drop_upload_keys: bool,
        force_has_more: bool,
        withhold_urls: bool,
        fail_listing: bool,
        fail_upload: bool,
        undecodable: Range<usize>,
    }

    #[derive(Default)]
    pub struct FakeFlatStore {
        state: Mutex<FlatState>,
    }

    impl FakeFlatStore {
        /// Add `count` objects belonging to `room`, each one minute newer
        /// than the previous object in the store.
        pub fn seed(&self, room: &str, count: usize) {
            let mut state = self.state.lock().unwrap();
            for i in 0..count {
                let n = state.objects.len();
                state.objects.push(FlatObject {
                    key: format!("key{n}"),
                    custom_id: Some(format!("{room}__nonce{i}")),
                    name: format!("file{i}.bin"),
                    size: 100 + i as u64,
                    uploaded_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
                        + Duration::minutes(n as i64),
                });
            }
        }

        pub fn drop_upload_keys(&self) {
            self.state.lock().unwrap().drop_upload_keys = true;
        }

        pub fn force_has_more(&self) {
            self.state.lock().unwrap().force_has_more = true;
        }

        pub fn withhold_urls(&self) {
            self.state.lock().unwrap().withhold_urls = true;
        }

        pub fn fail_listing(&self) {
            self.state.lock().unwrap().fail_listing = true;
        }

        /// Objects at these store positions are counted in a page but not
        /// returned, as when the client cannot decode them.
        pub fn mark_undecodable(&self, positions: Range<usize>) {
            self.state.lock().unwrap().undecodable = positions;
        }

        pub fn fail_upload(&self) {
            self.state.lock().unwrap().fail_upload = true;
        }

        pub fn list_calls(&self) -> Vec<(usize, usize)> {
            self.state.lock().unwrap().list_calls.clone()
        }

        pub fn url_requests(&self) -> Vec<Vec<String>> {
            self.state.lock().unwrap().url_requests.clone()
        }

        pub fn upload_count(&self) -> usize {
            self.state.lock().unwrap().upload_count
        }
    }

    #[async_trait]
    impl FlatStoreApi for FakeFlatStore {
        async fn upload_file(&self, file: UploadFile, custom_id: &str) -> Result<FlatUploaded, StorageError> {
            let mut state = self.state.lock().unwrap();
            state.upload_count += 1;
            if state.fail_upload {
                return Err(StorageError::BackendUnavailable("quota exceeded".into()));
            }
            let key = format!("key{}", state.objects.len());
            let uploaded_at = Utc::now();
            state.objects.push(FlatObject {
                key: key.clone(),
                custom_id: Some(custom_id.to_string()),
                name: file.filename.clone(),
                size: file.bytes.len() as u64,
                uploaded_at,
            });
            Ok(FlatUploaded {
                key: (!state.drop_upload_keys).then_some(key.clone()),
                url: Some(format!("https://files.test/f/{key}")),
                name: Some(file.filename),
                size: Some(file.bytes.len() as u64),
                uploaded_at: Some(uploaded_at),
            })
        }

        async fn list_files(&self, limit: usize, offset: usize) -> Result<FlatPage, StorageError> {
            let mut state = self.state.lock().unwrap();
            state.list_calls.push((limit, offset));
            if state.fail_listing {
                return Err(StorageError::ListPartial("listing unavailable".into()));
            }
            let page: Vec<(usize, &FlatObject)> =
                state.objects.iter().enumerate().skip(offset).take(limit).collect();
            let scanned = page.len();
            let files: Vec<FlatObject> = page
                .into_iter()
                .filter(|(i, _)| !state.undecodable.contains(i))
                .map(|(_, obj)| obj.clone())
                .collect();
            let has_more = state.force_has_more || offset + scanned < state.objects.len();
            Ok(FlatPage {
                files,
                scanned,
                has_more,
            })
        }

        async fn file_urls(&self, keys: &[String]) -> Result<HashMap<String, String>, StorageError> {
            let mut state = self.state.lock().unwrap();
            state.url_requests.push(keys.to_vec());
            if state.withhold_urls {
                return Ok(HashMap::new());
            }
            Ok(keys
                .iter()
                .map(|k| (k.clone(), format!("https://files.test/f/{k}")))
                .collect())
        }

        fn fallback_url(&self, key: &str) -> String {
            format!("https://fallback.test/f/{key}")
        }
    }

    #[derive(Default)]
    struct PrefixState {
        resources: Vec<(ResourceCategory, PrefixResource)>,
        upload_folders: Vec<String>,
        listed: Vec<(ResourceCategory, usize)>,
        failing: Vec<ResourceCategory>,
        drop_public_ids: bool,
        upload_filename: Option<String>,
    }

    #[derive(Default)]
    pub struct FakePrefixStore {
        state: Mutex<PrefixState>,
    }

    impl FakePrefixStore {
        pub fn insert(
            &self,
            category: ResourceCategory,
            public_id: &str,
            original_filename: Option<&str>,
            format: Option<&str>,
        ) {
            let mut state = self.state.lock().unwrap();
            let n = state.resources.len() as i64;
            state.resources.push((
                category,
                PrefixResource {
                    public_id: Some(public_id.to_string()),
                    secure_url: Some(format!("https://res.test/{public_id}")),
                    original_filename: original_filename.map(str::to_string),
                    format: format.map(str::to_string),
                    bytes: 512,
                    created_at: Some(
                        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(n),
                    ),
                },
            ));
        }

        pub fn fail_category(&self, category: ResourceCategory) {
            self.state.lock().unwrap().failing.push(category);
        }

        pub fn drop_public_ids(&self) {
            self.state.lock().unwrap().drop_public_ids = true;
        }

        pub fn upload_folders(&self) -> Vec<String> {
            self.state.lock().unwrap().upload_folders.clone()
        }

        /// Report this name on upload instead of none, as the provider does
        /// when it strips the extension.
        pub fn report_upload_filename(&self, name: &str) {
            self.state.lock().unwrap().upload_filename = Some(name.to_string());
        }

        pub fn listed_categories(&self) -> Vec<ResourceCategory> {
            self.state.lock().unwrap().listed.iter().map(|(c, _)| *c).collect()
        }

        pub fn requested_limits(&self) -> Vec<usize> {
            self.state.lock().unwrap().listed.iter().map(|(_, n)| *n).collect()
        }
    }

    #[async_trait]
    impl PrefixStoreApi for FakePrefixStore {
        async fn upload_to_folder(&self, file: UploadFile, folder: &str) -> Result<PrefixResource, StorageError> {
            let mut state = self.state.lock().unwrap();
            state.upload_folders.push(folder.to_string());
            let public_id = format!("{folder}/gen{}", state.resources.len());
            let resource = PrefixResource {
                public_id: (!state.drop_public_ids).then_some(public_id.clone()),
                secure_url: Some(format!("https://res.test/{public_id}")),
                original_filename: state.upload_filename.clone(),
                format: None,
                bytes: file.bytes.len() as u64,
                created_at: Some(Utc::now()),
            };
            state.resources.push((ResourceCategory::Raw, resource.clone()));
            Ok(resource)
        }

        async fn list_resources(
            &self,
            category: ResourceCategory,
            prefix: &str,
            max_results: usize,
        ) -> Result<Vec<PrefixResource>, StorageError> {
            let mut state = self.state.lock().unwrap();
            state.listed.push((category, max_results));
            if state.failing.contains(&category) {
                return Err(StorageError::ListPartial(format!("{} listing failed", category.as_str())));
            }
            Ok(state
                .resources
                .iter()
                .filter(|(c, r)| {
                    *c == category && r.public_id.as_deref().is_some_and(|id| id.starts_with(prefix))
                })
                .map(|(_, r)| r.clone())
                .take(max_results)
                .collect())
        }
    }
}
