//! Room identifiers and the namespace policy that maps a room onto
//! backend storage keys.
//!
//! Two keyspace shapes exist:
//!
//! - **Flat**: every object carries a custom identifier of the form
//!   `{room_id}__{nonce}`. The `__` separator is the only thing tying an
//!   object back to its room, so room identifiers may never contain it.
//! - **Prefix**: objects live under the folder `rooms/{room_id}/` and the
//!   provider names the object itself.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Separator between the room identifier and the per-upload nonce in
/// flat-keyspace storage keys.
pub const FLAT_KEY_SEPARATOR: &str = "__";

/// Root folder for prefix-keyspace rooms.
pub const ROOMS_FOLDER: &str = "rooms";

pub const MAX_ROOM_ID_LEN: usize = 128;

/// Opaque, validated room identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    pub fn parse(raw: &str) -> Result<Self, StorageError> {
        validate_room_id(raw)?;
        Ok(RoomId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key prefix shared by every flat-keyspace object in this room.
    pub fn flat_key_prefix(&self) -> String {
        format!("{}{}", self.0, FLAT_KEY_SEPARATOR)
    }

    /// Folder holding every prefix-keyspace object in this room, without
    /// trailing slash (the form providers take as an upload folder).
    pub fn folder(&self) -> String {
        format!("{}/{}", ROOMS_FOLDER, self.0)
    }

    /// Whether a flat-keyspace custom identifier belongs to this room.
    pub fn owns_flat_key(&self, key: &str) -> bool {
        key.strip_prefix(self.0.as_str())
            .is_some_and(|rest| rest.starts_with(FLAT_KEY_SEPARATOR))
    }
}

fn validate_room_id(raw: &str) -> Result<(), StorageError> {
    if raw.is_empty() {
        return Err(StorageError::validation("Missing room identifier"));
    }
    if raw.len() > MAX_ROOM_ID_LEN {
        return Err(StorageError::validation(format!(
            "Room identifier longer than {} characters",
            MAX_ROOM_ID_LEN
        )));
    }
    if let Some(c) = raw
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(StorageError::validation(format!(
            "Room identifier contains invalid character {:?}",
            c
        )));
    }
    // "ab_" would otherwise produce keys starting with "ab__"
    if raw.contains(FLAT_KEY_SEPARATOR) || raw.ends_with('_') {
        return Err(StorageError::validation(
            "Room identifier may not contain \"__\" or end with '_'",
        ));
    }
    Ok(())
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomId {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoomId::parse(s)
    }
}

impl TryFrom<String> for RoomId {
    type Error = StorageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_room_id(&value)?;
        Ok(RoomId(value))
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0
    }
}

impl AsRef<str> for RoomId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The two storage keyspace shapes a backend can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyspace {
    Flat,
    Prefix,
}

impl Keyspace {
    /// Derive the storage key (flat) or folder prefix (prefix) for one upload.
    ///
    /// Flat: `{room_id}__{nonce}`. The nonce must be fresh per upload, which
    /// keeps concurrent uploads of identically named files apart.
    /// Prefix: `rooms/{room_id}/`, the provider picks the object name.
    pub fn derive_storage_key(&self, room: &RoomId, upload_nonce: &str) -> String {
        match self {
            Keyspace::Flat => format!("{}{}", room.flat_key_prefix(), upload_nonce),
            Keyspace::Prefix => format!("{}/", room.folder()),
        }
    }
}
