use bytes::Bytes;

use crate::error::StorageError;
use crate::record::FileRecord;
use crate::room::{Keyspace, RoomId};

/// One file handed to a storage adapter for upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub bytes: Bytes,
    pub filename: String,
    pub mime_type: String,
}

/// Trait implemented by every storage backend adapter.
///
/// An adapter owns the provider-specific calls and the namespace policy for
/// its keyspace; it hands back normalized [`FileRecord`]s. Exactly one
/// adapter is active per process, chosen at startup.
#[async_trait::async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Which keyspace shape this adapter stores into.
    fn keyspace(&self) -> Keyspace;

    /// Store a file under the room's namespace.
    async fn upload(&self, file: UploadFile, room: &RoomId) -> Result<FileRecord, StorageError>;

    /// List every file stored in the room. An empty room is `Ok(vec![])`.
    async fn list_by_room(&self, room: &RoomId) -> Result<Vec<FileRecord>, StorageError>;
}
