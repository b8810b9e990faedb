use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::room::RoomId;

/// Generic name some providers report when the upload carried no filename.
const GENERIC_FILENAME: &str = "file";

/// Canonical description of one stored file, whichever backend holds it.
///
/// Created once when an upload completes and never mutated afterwards.
/// Serialized with the field names the HTTP API exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Backend-native key, unique across the whole backend.
    #[serde(rename = "public_id")]
    pub storage_key: String,
    #[serde(rename = "secure_url")]
    pub download_url: String,
    #[serde(rename = "original_filename", default)]
    pub original_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(rename = "bytes")]
    pub byte_size: u64,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "roomId")]
    pub room_id: RoomId,
}

impl FileRecord {
    /// Human-readable name: the original filename unless it is missing or
    /// generic, otherwise the last path segment of the storage key.
    pub fn display_name(&self) -> &str {
        match self.original_filename.as_deref() {
            Some(name) if !name.is_empty() && name != GENERIC_FILENAME => name,
            _ => self
                .storage_key
                .rsplit('/')
                .next()
                .filter(|s| !s.is_empty())
                .unwrap_or("Unnamed File"),
        }
    }

    /// Size in KiB with two decimals, as shown in listings.
    pub fn display_size(&self) -> String {
        format!("{:.2} KB", self.byte_size as f64 / 1024.0)
    }
}

/// Infer a format from a filename extension: the text after the last `.`.
pub fn infer_format(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_string())
    }
}
