//! Upload orchestration: validate the request, hand the file to the active
//! storage adapter, stamp the caller's room on the result.

use tracing::{info, warn};

use roomdrop_common::backend::{StorageAdapter, UploadFile};
use roomdrop_common::error::StorageError;
use roomdrop_common::record::FileRecord;
use roomdrop_common::room::RoomId;

/// Submit one file to a room.
///
/// Both inputs are validated before the backend is touched. Any backend
/// failure fails the whole upload with [`StorageError::UploadFailed`]; there
/// is no retry, the caller resubmits.
pub async fn submit_upload(
    storage: &dyn StorageAdapter,
    file: Option<UploadFile>,
    room_id: Option<&str>,
) -> Result<FileRecord, StorageError> {
    let file = file.ok_or_else(|| StorageError::validation("Missing file"))?;
    if file.bytes.is_empty() {
        return Err(StorageError::validation("File is empty"));
    }
    let room = RoomId::parse(room_id.unwrap_or_default())?;

    info!(room_id = %room, filename = %file.filename, size = file.bytes.len(), "Uploading file to room");

    let mut record = storage.upload(file, &room).await.map_err(|e| {
        warn!(room_id = %room, error = %e, "Upload failed");
        match e {
            StorageError::Validation(_) | StorageError::UploadFailed(_) => e,
            other => StorageError::UploadFailed(other.to_string()),
        }
    })?;

    // The caller's room is authoritative for the returned record
    record.room_id = room;
    info!(storage_key = %record.storage_key, "Upload complete");
    Ok(record)
}
