use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use roomdrop_common::backend::UploadFile;
use roomdrop_common::record::FileRecord;
use roomdrop_common::room::RoomId;

use crate::error::ClientError;

/// The room operations a client device performs against the server.
#[async_trait]
pub trait RoomTransport: Send + Sync {
    async fn create_room(&self) -> Result<RoomId, ClientError>;

    async fn upload(&self, room: &RoomId, file: UploadFile) -> Result<FileRecord, ClientError>;

    async fn list_files(&self, room: &RoomId) -> Result<Vec<FileRecord>, ClientError>;
}

/// [`RoomTransport`] over the server's HTTP API.
#[derive(Clone)]
pub struct HttpRoomClient {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct CreateRoomResponse {
    #[serde(rename = "roomId")]
    room_id: RoomId,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl HttpRoomClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Decode a JSON success body, or turn an error status into
/// [`ClientError::Server`] carrying the server's message.
async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|b| b.error)
            .unwrap_or(text);
        return Err(ClientError::Server {
            status: status.as_u16(),
            message,
        });
    }
    Ok(resp.json().await?)
}

#[async_trait]
impl RoomTransport for HttpRoomClient {
    async fn create_room(&self) -> Result<RoomId, ClientError> {
        let resp = self.client.post(self.url("/api/room/create")).send().await?;
        let body: CreateRoomResponse = decode(resp).await?;
        debug!(room_id = %body.room_id, "Room created");
        Ok(body.room_id)
    }

    async fn upload(&self, room: &RoomId, file: UploadFile) -> Result<FileRecord, ClientError> {
        let part = reqwest::multipart::Part::bytes(file.bytes.to_vec())
            .file_name(file.filename)
            .mime_str(&file.mime_type)?;
        let form = reqwest::multipart::Form::new()
            .text("roomId", room.to_string())
            .part("file", part);

        let resp = self
            .client
            .post(self.url("/api/upload"))
            .multipart(form)
            .send()
            .await?;
        decode(resp).await
    }

    async fn list_files(&self, room: &RoomId) -> Result<Vec<FileRecord>, ClientError> {
        let path = format!("/api/files/{}", urlencoding::encode(room.as_str()));
        let resp = self.client.get(self.url(&path)).send().await?;
        decode(resp).await
    }
}
