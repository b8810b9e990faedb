//! Room session: one device's lifecycle in a room.
//!
//! A session starts in the lobby. Creating or joining a room moves it to
//! `Active`, which owns the room's [`ListingReconciler`]. Leaving, joining
//! another room, or dropping the session releases the reconciler, which
//! stops its poll loop.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use tokio::sync::watch;
use tracing::{info, warn};

use roomdrop_common::backend::UploadFile;
use roomdrop_common::error::StorageError;
use roomdrop_common::record::FileRecord;
use roomdrop_common::room::RoomId;

use crate::api::RoomTransport;
use crate::error::ClientError;
use crate::reconciler::{ListingReconciler, RoomView};

const SHARE_PATH: &str = "CreateRoom";
const SHARE_QUERY_KEY: &str = "roomId";

pub enum SessionState {
    Lobby,
    Active(ListingReconciler),
}

pub struct RoomSession {
    transport: Arc<dyn RoomTransport>,
    poll_interval: Duration,
    share_base_url: Option<String>,
    state: SessionState,
}

impl RoomSession {
    pub fn new(transport: Arc<dyn RoomTransport>, poll_interval: Duration) -> Self {
        Self {
            transport,
            poll_interval,
            share_base_url: None,
            state: SessionState::Lobby,
        }
    }

    pub fn with_share_base_url(mut self, base: impl Into<String>) -> Self {
        self.share_base_url = Some(base.into().trim_end_matches('/').to_string());
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn room_id(&self) -> Option<&RoomId> {
        match &self.state {
            SessionState::Lobby => None,
            SessionState::Active(reconciler) => Some(reconciler.room_id()),
        }
    }

    /// Ask the server for a fresh room and enter it.
    pub async fn create_room(&mut self) -> Result<RoomId, ClientError> {
        let room = self.transport.create_room().await?;
        info!(room_id = %room, "Created room");
        self.enter(room.clone());
        Ok(room)
    }

    /// Enter an existing room by identifier. Any previously joined room is
    /// left first.
    pub fn join(&mut self, raw_room_id: &str) -> Result<RoomId, ClientError> {
        let room = RoomId::parse(raw_room_id.trim())?;
        info!(room_id = %room, "Joining room");
        self.enter(room.clone());
        Ok(room)
    }

    /// Enter the room named by a share link's `roomId` query parameter.
    pub fn join_from_link(&mut self, link: &str) -> Result<RoomId, ClientError> {
        let room = room_id_from_link(link)?;
        self.enter(room.clone());
        Ok(room)
    }

    /// Upload a file into the current room. On success the record is merged
    /// into the file set right away and a fresh poll is requested, since
    /// the backend listing may not show the object yet.
    pub async fn upload(&self, file: UploadFile) -> Result<FileRecord, ClientError> {
        let reconciler = self.active()?;
        let record = upload_to_room(self.transport.as_ref(), reconciler.room_id(), file).await?;
        reconciler.insert(record.clone());
        reconciler.refresh();
        Ok(record)
    }

    pub fn refresh(&self) -> Result<(), ClientError> {
        self.active()?.refresh();
        Ok(())
    }

    pub fn view(&self) -> Result<watch::Receiver<RoomView>, ClientError> {
        Ok(self.active()?.view())
    }

    /// Link another device can open to join this room. Requires a share base
    /// URL to be configured.
    pub fn share_link(&self) -> Result<String, ClientError> {
        let room = self.active()?.room_id();
        let Some(base) = &self.share_base_url else {
            return Err(ClientError::InvalidLink("no share base URL configured".into()));
        };
        Ok(share_link(base, room))
    }

    /// Return to the lobby, stopping the room's poll loop.
    pub fn leave(&mut self) {
        if let SessionState::Active(reconciler) = &self.state {
            info!(room_id = %reconciler.room_id(), "Leaving room");
        }
        self.state = SessionState::Lobby;
    }

    fn enter(&mut self, room: RoomId) {
        if let Some(current) = self.room_id() {
            if *current != room {
                warn!(from = %current, to = %room, "Switching rooms");
            }
        }
        // Drop the old reconciler before starting the new one.
        self.state = SessionState::Lobby;
        let reconciler = ListingReconciler::spawn(self.transport.clone(), room, self.poll_interval);
        self.state = SessionState::Active(reconciler);
    }

    fn active(&self) -> Result<&ListingReconciler, ClientError> {
        match &self.state {
            SessionState::Active(reconciler) => Ok(reconciler),
            SessionState::Lobby => Err(ClientError::NoRoom),
        }
    }
}

/// Upload one file without joining the room, so no listing is polled.
/// Empty payloads are rejected before the transport is called.
pub async fn upload_to_room(
    transport: &dyn RoomTransport,
    room: &RoomId,
    file: UploadFile,
) -> Result<FileRecord, ClientError> {
    if file.bytes.is_empty() {
        return Err(StorageError::validation("File is empty").into());
    }
    let record = transport.upload(room, file).await?;
    info!(
        room_id = %room,
        storage_key = %record.storage_key,
        bytes = record.byte_size,
        "Uploaded file"
    );
    Ok(record)
}

/// Render `<base>/CreateRoom?roomId=<id>`.
pub fn share_link(base: &str, room: &RoomId) -> String {
    format!(
        "{}/{}?{}={}",
        base.trim_end_matches('/'),
        SHARE_PATH,
        SHARE_QUERY_KEY,
        urlencoding::encode(room.as_str())
    )
}

/// Extract and validate the `roomId` query parameter from a share link.
pub fn room_id_from_link(link: &str) -> Result<RoomId, ClientError> {
    let url = Url::parse(link.trim()).map_err(|e| ClientError::InvalidLink(e.to_string()))?;
    let raw = url
        .query_pairs()
        .find(|(k, _)| k == SHARE_QUERY_KEY)
        .map(|(_, v)| v.into_owned())
        .ok_or_else(|| ClientError::InvalidLink(format!("missing {} parameter", SHARE_QUERY_KEY)))?;
    Ok(RoomId::parse(&raw)?)
}
