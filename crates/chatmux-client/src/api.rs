//! Backend collaborators reached over REST.
//!
//! The engine only consumes the results of these calls as plain data. Every
//! method returns an owned `'static` future so the multiplexer can keep a
//! history fetch in flight while it goes on handling frames.

use std::path::Path;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use tracing::debug;
use url::Url;

use chatmux_shared::{ChatMessage, ConversationDescriptor, Identity, MessageFrame, Room, UploadedFile};
use chatmux_store::FetchError;

use crate::error::ClientError;

/// A local file to upload as an attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    /// Read a file from disk, guessing its MIME type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self, ClientError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let mime_type = mime_guess::from_path(path).first().map(|m| m.to_string());
        Ok(Self {
            file_name,
            mime_type,
            bytes,
        })
    }
}

pub trait ChatApi: Send + Sync {
    /// Ordered history of a conversation as seen by `me`.
    fn fetch_history(
        &self,
        me: &Identity,
        conversation: &ConversationDescriptor,
    ) -> BoxFuture<'static, Result<Vec<ChatMessage>, FetchError>>;

    fn upload(&self, file: FileUpload) -> BoxFuture<'static, Result<UploadedFile, ClientError>>;

    /// Delete a DM or room for `me` on the backend.
    fn delete_conversation(
        &self,
        me: &Identity,
        conversation: &ConversationDescriptor,
    ) -> BoxFuture<'static, Result<(), ClientError>>;

    fn create_room(
        &self,
        name: &str,
        members: &[Identity],
    ) -> BoxFuture<'static, Result<Room, ClientError>>;

    /// Rooms `me` is a member of.
    fn list_rooms(&self, me: &Identity) -> BoxFuture<'static, Result<Vec<Room>, ClientError>>;

    /// Every registered username.
    fn list_users(&self) -> BoxFuture<'static, Result<Vec<Identity>, ClientError>>;

    /// Remove the account of `me`. The backend anonymizes its messages and
    /// drops it from every room.
    fn delete_account(&self, me: &Identity) -> BoxFuture<'static, Result<(), ClientError>>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base: Url,
}

#[derive(Serialize)]
struct CreateRoomRequest<'a> {
    name: &'a str,
    members: &'a [Identity],
}

impl HttpApi {
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self, ClientError> {
        let base = Url::parse(api_base)?;
        if base.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase.into());
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    /// `path` appended to the path of the base URL; any base query is
    /// dropped.
    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        url.set_query(None);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(path.split('/').filter(|s| !s.is_empty()));
        }
        url
    }

    /// `GET /api/history` with the query that selects `conversation`.
    pub fn history_url(&self, me: &Identity, conversation: &ConversationDescriptor) -> Url {
        let mut url = self.endpoint("/api/history");
        {
            let mut query = url.query_pairs_mut();
            match conversation {
                ConversationDescriptor::Room { room_id, .. } => {
                    query.append_pair("roomId", room_id.as_str());
                }
                ConversationDescriptor::Broadcast => {
                    query.append_pair("me", me.as_str()).append_pair("with", "ALL");
                }
                ConversationDescriptor::DirectMessage { peer } => {
                    query.append_pair("me", me.as_str()).append_pair("with", peer.as_str());
                }
            }
        }
        url
    }

    /// `POST /api/chat/delete`, or `None` for the broadcast channel.
    pub fn delete_url(&self, me: &Identity, conversation: &ConversationDescriptor) -> Option<Url> {
        let mut url = self.endpoint("/api/chat/delete");
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("me", me.as_str());
            match conversation {
                ConversationDescriptor::Room { room_id, .. } => {
                    query.append_pair("roomId", room_id.as_str());
                }
                ConversationDescriptor::DirectMessage { peer } => {
                    query.append_pair("withUser", peer.as_str());
                }
                ConversationDescriptor::Broadcast => return None,
            }
        }
        Some(url)
    }

    /// `DELETE /api/user?username=<me>`.
    pub fn account_url(&self, me: &Identity) -> Url {
        let mut url = self.endpoint("/api/user");
        url.query_pairs_mut().append_pair("username", me.as_str());
        url
    }
}

/// Turn a non-success response into its body text.
async fn failure_text(response: reqwest::Response) -> String {
    let status = response.status();
    match response.text().await {
        Ok(body) if !body.trim().is_empty() => format!("{status}: {body}"),
        _ => status.to_string(),
    }
}

impl ChatApi for HttpApi {
    fn fetch_history(
        &self,
        me: &Identity,
        conversation: &ConversationDescriptor,
    ) -> BoxFuture<'static, Result<Vec<ChatMessage>, FetchError>> {
        let client = self.client.clone();
        let url = self.history_url(me, conversation);

        async move {
            debug!(url = %url, "Fetching history");
            let response = client
                .get(url)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| FetchError::Request(e.to_string()))?;

            let frames: Vec<MessageFrame> = response
                .json()
                .await
                .map_err(|e| FetchError::Decode(e.to_string()))?;

            Ok(frames
                .into_iter()
                .map(MessageFrame::into_message_lossy)
                .collect())
        }
        .boxed()
    }

    fn upload(&self, file: FileUpload) -> BoxFuture<'static, Result<UploadedFile, ClientError>> {
        let client = self.client.clone();
        let url = self.endpoint("/api/upload");

        async move {
            let size = file.bytes.len();
            let mut part = reqwest::multipart::Part::bytes(file.bytes).file_name(file.file_name);
            if let Some(mime) = file.mime_type.as_deref() {
                part = part.mime_str(mime)?;
            }
            let form = reqwest::multipart::Form::new().part("file", part);

            debug!(url = %url, size, "Uploading attachment");
            let response = client.post(url).multipart(form).send().await?;
            if !response.status().is_success() {
                return Err(ClientError::UploadFailed(failure_text(response).await));
            }
            Ok(response.json::<UploadedFile>().await?)
        }
        .boxed()
    }

    fn delete_conversation(
        &self,
        me: &Identity,
        conversation: &ConversationDescriptor,
    ) -> BoxFuture<'static, Result<(), ClientError>> {
        let client = self.client.clone();
        let url = self.delete_url(me, conversation);

        async move {
            let url = url.ok_or(ClientError::BroadcastNotDeletable)?;
            let response = client.post(url).send().await?;
            if !response.status().is_success() {
                return Err(ClientError::DeleteFailed(failure_text(response).await));
            }
            Ok(())
        }
        .boxed()
    }

    fn create_room(
        &self,
        name: &str,
        members: &[Identity],
    ) -> BoxFuture<'static, Result<Room, ClientError>> {
        let client = self.client.clone();
        let url = self.endpoint("/api/rooms");
        let body = serde_json::to_value(CreateRoomRequest { name, members });

        async move {
            let body = body.map_err(|e| ClientError::RoomCreationFailed(e.to_string()))?;
            let response = client.post(url).json(&body).send().await?;
            if !response.status().is_success() {
                return Err(ClientError::RoomCreationFailed(failure_text(response).await));
            }
            Ok(response.json::<Room>().await?)
        }
        .boxed()
    }

    fn list_rooms(&self, me: &Identity) -> BoxFuture<'static, Result<Vec<Room>, ClientError>> {
        let client = self.client.clone();
        let mut url = self.endpoint("/api/rooms");
        url.query_pairs_mut().append_pair("me", me.as_str());

        async move {
            let rooms = client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .json::<Vec<Room>>()
                .await?;
            Ok(rooms)
        }
        .boxed()
    }

    fn list_users(&self) -> BoxFuture<'static, Result<Vec<Identity>, ClientError>> {
        let client = self.client.clone();
        let url = self.endpoint("/api/users");

        async move {
            let users = client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .json::<Vec<Identity>>()
                .await?;
            Ok(users)
        }
        .boxed()
    }

    fn delete_account(&self, me: &Identity) -> BoxFuture<'static, Result<(), ClientError>> {
        let client = self.client.clone();
        let url = self.account_url(me);

        async move {
            debug!(url = %url, "Deleting account");
            let response = client.delete(url).send().await?;
            if !response.status().is_success() {
                return Err(ClientError::AccountDeletionFailed(failure_text(response).await));
            }
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn api() -> HttpApi {
        HttpApi::new("http://localhost:8080", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_history_urls() {
        let api = api();
        let me = Identity::new("alice");

        let room = api.history_url(&me, &ConversationDescriptor::room("R1", "Team"));
        assert_eq!(room.as_str(), "http://localhost:8080/api/history?roomId=R1");

        let all = api.history_url(&me, &ConversationDescriptor::Broadcast);
        assert_eq!(all.as_str(), "http://localhost:8080/api/history?me=alice&with=ALL");

        let dm = api.history_url(&me, &ConversationDescriptor::direct("bob b"));
        assert_eq!(dm.as_str(), "http://localhost:8080/api/history?me=alice&with=bob+b");
    }

    #[test]
    fn test_delete_urls() {
        let api = api();
        let me = Identity::new("alice");

        let dm = api.delete_url(&me, &ConversationDescriptor::direct("bob")).unwrap();
        assert_eq!(dm.as_str(), "http://localhost:8080/api/chat/delete?me=alice&withUser=bob");

        let room = api.delete_url(&me, &ConversationDescriptor::room("R1", "Team")).unwrap();
        assert_eq!(room.as_str(), "http://localhost:8080/api/chat/delete?me=alice&roomId=R1");

        assert!(api.delete_url(&me, &ConversationDescriptor::Broadcast).is_none());
    }

    #[test]
    fn test_account_url() {
        let url = api().account_url(&Identity::new("alice smith"));
        assert_eq!(url.as_str(), "http://localhost:8080/api/user?username=alice+smith");
    }

    #[test]
    fn test_base_path_is_kept() {
        let api = HttpApi::new("https://example.com/chat-backend/", Duration::from_secs(5)).unwrap();
        let me = Identity::new("alice");

        let all = api.history_url(&me, &ConversationDescriptor::Broadcast);
        assert_eq!(
            all.as_str(),
            "https://example.com/chat-backend/api/history?me=alice&with=ALL"
        );
        assert_eq!(
            api.endpoint("/api/upload").as_str(),
            "https://example.com/chat-backend/api/upload"
        );

        let api = HttpApi::new("https://example.com/prefix?x=1", Duration::from_secs(5)).unwrap();
        assert_eq!(
            api.account_url(&me).as_str(),
            "https://example.com/prefix/api/user?username=alice"
        );
    }

    #[test]
    fn test_unusable_base_is_rejected() {
        assert!(matches!(
            HttpApi::new("mailto:ops@example.com", Duration::from_secs(5)),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_file_upload_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cat.png");
        std::fs::File::create(&path).unwrap().write_all(b"png").unwrap();

        let upload = FileUpload::from_path(&path).await.unwrap();
        assert_eq!(upload.file_name, "cat.png");
        assert_eq!(upload.mime_type.as_deref(), Some("image/png"));
        assert_eq!(upload.bytes, b"png");
    }

    #[tokio::test]
    async fn test_delete_broadcast_is_rejected_locally() {
        let result = api()
            .delete_conversation(&Identity::new("alice"), &ConversationDescriptor::Broadcast)
            .await;
        assert!(matches!(result, Err(ClientError::BroadcastNotDeletable)));
    }
}
