use anyhow::{bail, Context};
use base64::Engine;
use serde::Deserialize;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;
const DEFAULT_UPLOADTHING_API_URL: &str = "https://api.uploadthing.com";
const DEFAULT_UPLOADTHING_FILE_URL: &str = "https://utfs.io";
const DEFAULT_CLOUDINARY_API_URL: &str = "https://api.cloudinary.com";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub max_upload_bytes: usize,
    pub backend: BackendConfig,
}

/// Which storage provider backs this process. Chosen once at startup: the
/// presence of an UploadThing token selects the flat-keyspace provider,
/// otherwise Cloudinary credentials are required.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    UploadThing(UploadThingConfig),
    Cloudinary(CloudinaryConfig),
}

impl BackendConfig {
    pub fn name(&self) -> &'static str {
        match self {
            BackendConfig::UploadThing(_) => "uploadthing",
            BackendConfig::Cloudinary(_) => "cloudinary",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadThingConfig {
    pub api_key: String,
    pub api_url: String,
    pub file_url_base: String,
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub upload_preset: Option<String>,
    pub api_url: String,
}

/// Decoded form of an `UPLOADTHING_TOKEN` (base64 JSON).
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadThingToken {
    api_key: String,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from a variable lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get("ROOMDROP_PORT") {
            Some(p) => p.parse().with_context(|| format!("Invalid ROOMDROP_PORT: {p}"))?,
            None => DEFAULT_PORT,
        };
        let max_upload_bytes = match get("ROOMDROP_MAX_UPLOAD_BYTES") {
            Some(v) => v
                .parse()
                .with_context(|| format!("Invalid ROOMDROP_MAX_UPLOAD_BYTES: {v}"))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let backend = if let Some(token) = get("UPLOADTHING_TOKEN") {
            BackendConfig::UploadThing(UploadThingConfig {
                api_key: api_key_from_token(&token),
                api_url: get("UPLOADTHING_API_URL")
                    .unwrap_or_else(|| DEFAULT_UPLOADTHING_API_URL.to_string()),
                file_url_base: get("UPLOADTHING_FILE_URL")
                    .unwrap_or_else(|| DEFAULT_UPLOADTHING_FILE_URL.to_string()),
            })
        } else {
            let (Some(cloud_name), Some(api_key), Some(api_secret)) = (
                get("CLOUDINARY_CLOUD_NAME"),
                get("CLOUDINARY_API_KEY"),
                get("CLOUDINARY_API_SECRET"),
            ) else {
                bail!(
                    "No storage backend configured: set UPLOADTHING_TOKEN, or \
                     CLOUDINARY_CLOUD_NAME, CLOUDINARY_API_KEY and CLOUDINARY_API_SECRET"
                );
            };
            BackendConfig::Cloudinary(CloudinaryConfig {
                cloud_name,
                api_key,
                api_secret,
                upload_preset: get("CLOUDINARY_UPLOAD_PRESET"),
                api_url: get("CLOUDINARY_API_URL")
                    .unwrap_or_else(|| DEFAULT_CLOUDINARY_API_URL.to_string()),
            })
        };

        Ok(Self {
            port,
            max_upload_bytes,
            backend,
        })
    }
}

/// Extract the API key from an UploadThing token. Tokens are base64 JSON
/// carrying `apiKey`; a bare secret key is accepted as-is.
fn api_key_from_token(token: &str) -> String {
    base64::engine::general_purpose::STANDARD
        .decode(token)
        .ok()
        .and_then(|raw| serde_json::from_slice::<UploadThingToken>(&raw).ok())
        .map(|t| t.api_key)
        .unwrap_or_else(|| token.to_string())
}
