//! The engine facade.
//!
//! A [`Multiplexer`] owns everything one signed-in user needs: the websocket
//! session, the conversation cache, the presence set and the currently
//! selected conversation. It is driven through `&mut self` from a single
//! task. [`Multiplexer::next_event`] is the only place where transport
//! notifications and completed history fetches are applied, so all state
//! transitions happen on the caller's task.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use chatmux_net::{
    ConnectionManager, ConnectionNotification, Connector, Dispatched, PresenceTracker,
    SessionId, WsConnector,
};
use chatmux_shared::{
    key_for_descriptor, ChatMessage, ConnectionState, ConversationDescriptor, ConversationKey,
    Identity, MessageFrame, Room, UploadedFile,
};
use chatmux_store::{FetchError, FetchTicket, HistoryStore, LoadState};

use crate::api::{ChatApi, FileUpload, HttpApi};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::events::ClientEvent;

type PendingFetch = BoxFuture<'static, (FetchTicket, Result<Vec<ChatMessage>, FetchError>)>;

pub struct Multiplexer {
    me: Identity,
    api: Arc<dyn ChatApi>,
    connection: ConnectionManager,
    notif_rx: mpsc::Receiver<ConnectionNotification>,
    history: HistoryStore,
    presence: PresenceTracker,
    active: ConversationDescriptor,
    active_key: ConversationKey,
    pending: FuturesUnordered<PendingFetch>,
}

impl Multiplexer {
    /// Create a disconnected engine for `me` with the broadcast channel
    /// selected. Its history is requested right away and arrives through
    /// [`next_event`](Self::next_event).
    pub fn new(
        me: Identity,
        connector: Arc<dyn Connector>,
        api: Arc<dyn ChatApi>,
        channel_capacity: usize,
    ) -> Self {
        let (connection, notif_rx) = ConnectionManager::new(connector, channel_capacity);
        let mut mux = Self {
            me,
            api,
            connection,
            notif_rx,
            history: HistoryStore::new(),
            presence: PresenceTracker::new(),
            active: ConversationDescriptor::Broadcast,
            active_key: ConversationKey::broadcast(),
            pending: FuturesUnordered::new(),
        };
        mux.ensure_active_loaded();
        mux
    }

    /// Engine backed by the real websocket transport and REST API.
    pub fn from_config(me: Identity, config: &ClientConfig) -> Result<Self, ClientError> {
        let api = HttpApi::new(&config.api_base, config.http_timeout)?;
        let connector = WsConnector::new(config.ws_base.clone(), config.channel_capacity);
        Ok(Self::new(
            me,
            Arc::new(connector),
            Arc::new(api),
            config.channel_capacity,
        ))
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn me(&self) -> &Identity {
        &self.me
    }

    pub fn active(&self) -> &ConversationDescriptor {
        &self.active
    }

    pub fn active_key(&self) -> &ConversationKey {
        &self.active_key
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Messages of the selected conversation, in arrival order.
    pub fn messages(&self) -> &[ChatMessage] {
        self.history.messages(&self.active_key)
    }

    pub fn active_load_state(&self) -> LoadState {
        self.history.state(&self.active_key)
    }

    /// Online users, self excluded.
    pub fn online(&self) -> &BTreeSet<Identity> {
        self.presence.online()
    }

    pub fn is_online(&self, identity: &Identity) -> bool {
        self.presence.is_online(identity)
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Open a websocket session for the current identity, replacing any
    /// existing one. The cache is kept.
    pub fn connect(&mut self) -> SessionId {
        self.connection.open(self.me.clone())
    }

    /// Sign in as someone else. The current session is closed, every cached
    /// conversation and the presence set are forgotten, in-flight fetches
    /// are abandoned and a new session is opened with broadcast selected.
    /// Does nothing if `identity` is already signed in with a session.
    pub fn switch_identity(&mut self, identity: Identity) {
        if identity == self.me && self.connection.session_id().is_some() {
            debug!(user = %identity, "Identity unchanged, keeping session");
            return;
        }

        info!(from = %self.me, to = %identity, "Switching identity");
        self.connection.close();
        self.history.clear();
        self.presence.clear();
        self.pending = FuturesUnordered::new();

        self.me = identity;
        self.active = ConversationDescriptor::Broadcast;
        self.active_key = ConversationKey::broadcast();

        self.connection.open(self.me.clone());
        self.ensure_active_loaded();
    }

    pub fn shutdown(&mut self) {
        self.connection.close();
        self.pending = FuturesUnordered::new();
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Make `descriptor` the active conversation. Returns `false` if it
    /// resolves to the key already selected; no fetch is issued then.
    pub fn select_conversation(&mut self, descriptor: ConversationDescriptor) -> bool {
        let key = key_for_descriptor(&descriptor, &self.me);
        if key == self.active_key {
            // A room may be reselected under a newer display name.
            self.active = descriptor;
            return false;
        }

        debug!(key = %key, title = descriptor.title(), "Selecting conversation");
        self.active = descriptor;
        self.active_key = key;
        self.ensure_active_loaded();
        true
    }

    /// Fetch the selected conversation again, merging the result with what
    /// is held.
    pub fn refresh_active(&mut self) {
        self.history.invalidate(&self.active_key);
        self.ensure_active_loaded();
    }

    fn ensure_active_loaded(&mut self) {
        let api = &self.api;
        let me = &self.me;
        let descriptor = &self.active;
        let pending = &mut self.pending;

        self.history.ensure_loaded(&self.active_key, |ticket| {
            let fetch = api.fetch_history(me, descriptor);
            pending.push(async move { (ticket, fetch.await) }.boxed());
        });
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    /// Send text to the active conversation. Surrounding whitespace is
    /// trimmed; returns `Ok(false)` without sending if nothing is left.
    ///
    /// Nothing is appended locally: the backend echoes the message back and
    /// it is routed like any inbound frame.
    pub async fn send(&self, text: &str) -> Result<bool, ClientError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(false);
        }

        let frame = MessageFrame::text(&self.me, &self.active, text);
        self.connection.send(&frame).await?;
        debug!(key = %self.active_key, "Message sent");
        Ok(true)
    }

    /// Send an already uploaded file to the active conversation.
    pub async fn send_attachment(&self, file: &UploadedFile) -> Result<(), ClientError> {
        let frame = MessageFrame::attachment(&self.me, &self.active, file);
        self.connection.send(&frame).await?;
        debug!(key = %self.active_key, file = %file.file_name, "Attachment sent");
        Ok(())
    }

    /// Upload `file`, then send it to the active conversation. Rejected
    /// before uploading if the connection is not open.
    pub async fn upload_and_send(&self, file: FileUpload) -> Result<UploadedFile, ClientError> {
        let state = self.connection.state();
        if state != ConnectionState::Open {
            return Err(ClientError::SendRejected(state));
        }

        let uploaded = self.api.upload(file).await?;
        info!(file = %uploaded.file_name, kind = ?uploaded.kind(), "File uploaded");
        self.send_attachment(&uploaded).await?;
        Ok(uploaded)
    }

    // ------------------------------------------------------------------
    // Collaborators
    // ------------------------------------------------------------------

    /// Delete the active DM or room on the backend, then drop it from the
    /// cache and fetch it again. The broadcast channel cannot be deleted.
    pub async fn delete_active_conversation(&mut self) -> Result<(), ClientError> {
        if self.active_key.is_broadcast() {
            return Err(ClientError::BroadcastNotDeletable);
        }

        self.api
            .delete_conversation(&self.me, &self.active)
            .await?;

        info!(key = %self.active_key, "Conversation deleted");
        self.history.drop(&self.active_key);
        self.ensure_active_loaded();
        Ok(())
    }

    /// Create a room with `members` (self is always added) and select it.
    pub async fn create_room(
        &mut self,
        name: &str,
        members: impl IntoIterator<Item = Identity>,
    ) -> Result<Room, ClientError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ClientError::RoomCreationFailed("Room name is empty".into()));
        }

        let mut members: Vec<Identity> = members
            .into_iter()
            .filter(|m| !m.as_str().trim().is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if !members.contains(&self.me) {
            members.push(self.me.clone());
        }

        let room = self.api.create_room(name, &members).await?;
        info!(room = %room.id, name = %room.name, members = room.members.len(), "Room created");

        self.select_conversation(room.descriptor());
        Ok(room)
    }

    /// Delete the signed-in account on the backend. On success the session
    /// is closed for good and the cache, presence set and in-flight fetches
    /// are dropped; nothing reconnects until [`connect`](Self::connect) or
    /// [`switch_identity`](Self::switch_identity) is called. On failure
    /// nothing changes.
    pub async fn delete_account(&mut self) -> Result<(), ClientError> {
        self.api.delete_account(&self.me).await?;

        info!(user = %self.me, "Account deleted, signing out");
        self.connection.close();
        self.history.clear();
        self.presence.clear();
        self.pending = FuturesUnordered::new();
        self.active = ConversationDescriptor::Broadcast;
        self.active_key = ConversationKey::broadcast();
        Ok(())
    }

    /// Every registered user except self.
    pub async fn list_users(&self) -> Result<Vec<Identity>, ClientError> {
        let mut users = self.api.list_users().await?;
        users.retain(|u| u != &self.me);
        Ok(users)
    }

    /// Rooms self is a member of.
    pub async fn list_rooms(&self) -> Result<Vec<Room>, ClientError> {
        self.api.list_rooms(&self.me).await
    }

    // ------------------------------------------------------------------
    // Event pump
    // ------------------------------------------------------------------

    /// Wait for the next notification or completed history fetch, apply it
    /// and report what changed. Inputs with no visible effect are absorbed.
    ///
    /// The connection manager owned by the multiplexer holds a sender of the
    /// notification channel, so events never run out while the multiplexer
    /// lives. With nothing to report the future simply stays pending, even
    /// after the session closed. `None` is only possible if that channel
    /// were closed with no fetch in flight.
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        loop {
            tokio::select! {
                Some(notification) = self.notif_rx.recv() => {
                    if let Some(event) = self.handle_notification(notification) {
                        return Some(event);
                    }
                }

                Some((ticket, result)) = self.pending.next(), if !self.pending.is_empty() => {
                    if let Some(event) = self.handle_history(ticket, result) {
                        return Some(event);
                    }
                }

                else => return None,
            }
        }
    }

    fn handle_notification(&mut self, notification: ConnectionNotification) -> Option<ClientEvent> {
        let dispatched =
            self.connection
                .handle_notification(notification, &mut self.presence, &mut self.history)?;

        Some(match dispatched {
            Dispatched::StateChanged(state) => ClientEvent::ConnectionChanged { state },
            Dispatched::PresenceChanged => ClientEvent::PresenceChanged {
                online: self.presence.online_count(),
            },
            Dispatched::MessageRouted { key } => ClientEvent::ConversationUpdated {
                active: key == self.active_key,
                key,
            },
            Dispatched::TransportError(message) => ClientEvent::TransportError { message },
        })
    }

    fn handle_history(
        &mut self,
        ticket: FetchTicket,
        result: Result<Vec<ChatMessage>, FetchError>,
    ) -> Option<ClientEvent> {
        let key = ticket.key.clone();
        let error = result.as_ref().err().map(|e| e.to_string());

        if !self.history.complete_load(ticket, result) {
            return None;
        }
        if let Some(error) = &error {
            warn!(key = %key, error = %error, "Showing live messages only");
        }

        Some(ClientEvent::HistoryLoaded {
            active: key == self.active_key,
            key,
            error,
        })
    }
}
