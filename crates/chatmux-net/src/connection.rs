//! Connection state machine with a tokio mpsc command/notification pattern.
//!
//! The socket itself lives in a transport task (see [`crate::transport`]).
//! The [`ConnectionManager`] talks to it through typed channels and owns the
//! `Closed -> Connecting -> Open -> Closed` state. Every notification carries
//! the [`SessionId`] of the session that produced it, so late events from a
//! torn-down session are ignored once a new one has started.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use chatmux_shared::{key_for_message, ConnectionState, ConversationKey, Identity, MessageFrame};
use chatmux_store::HistoryStore;

use crate::error::ConnectionError;
use crate::frames::{classify_frame, InboundFrame};
use crate::presence::PresenceTracker;

// ---------------------------------------------------------------------------
// Command / notification types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Commands sent *into* the transport task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionCommand {
    /// Write one text frame.
    Send(String),
    /// Close the socket and end the task.
    Close,
}

/// Events reported *from* the transport task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The handshake completed.
    Opened,
    /// A text frame was received.
    Frame(String),
    /// A transport or protocol error occurred.
    Error(String),
    /// The socket is gone. Always the last event of a session.
    Closed { reason: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionNotification {
    pub session: SessionId,
    pub event: ConnectionEvent,
}

/// Starts the transport for one session.
///
/// Implementations spawn whatever task drives the socket, forward its events
/// to `notif_tx` tagged with `session`, and return the command sender. The
/// task must end when the command channel closes.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        session: SessionId,
        identity: &Identity,
        notif_tx: mpsc::Sender<ConnectionNotification>,
    ) -> mpsc::Sender<ConnectionCommand>;
}

/// What handling a notification did, for the layer above to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    StateChanged(ConnectionState),
    PresenceChanged,
    MessageRouted { key: ConversationKey },
    TransportError(String),
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

struct ActiveSession {
    id: SessionId,
    identity: Identity,
    cmd_tx: mpsc::Sender<ConnectionCommand>,
}

pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    notif_tx: mpsc::Sender<ConnectionNotification>,
    session: Option<ActiveSession>,
    state: ConnectionState,
}

impl ConnectionManager {
    /// Create a closed manager. The returned receiver yields the
    /// notifications of every session this manager opens; feed them back
    /// through [`handle_notification`](Self::handle_notification).
    pub fn new(
        connector: Arc<dyn Connector>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<ConnectionNotification>) {
        let (notif_tx, notif_rx) = mpsc::channel(capacity);
        let manager = Self {
            connector,
            notif_tx,
            session: None,
            state: ConnectionState::Closed,
        };
        (manager, notif_rx)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.session.as_ref().map(|s| &s.identity)
    }

    /// Start a session for `identity`, closing the current one first.
    pub fn open(&mut self, identity: Identity) -> SessionId {
        self.close();

        let id = SessionId::new();
        let cmd_tx = self
            .connector
            .connect(id, &identity, self.notif_tx.clone());

        info!(session = %id, user = %identity, "Opening session");

        self.session = Some(ActiveSession {
            id,
            identity,
            cmd_tx,
        });
        self.state = ConnectionState::Connecting;
        id
    }

    /// Close the current session. Safe to call repeatedly or before any
    /// session was opened.
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            info!(session = %session.id, user = %session.identity, "Closing session");
            // Dropping the sender also ends the task if the channel is full.
            let _ = session.cmd_tx.try_send(ConnectionCommand::Close);
        }
        self.state = ConnectionState::Closed;
    }

    /// Transmit a frame. Only valid while open: in any other state the call
    /// fails with [`ConnectionError::NotConnected`] and nothing is sent.
    pub async fn send(&self, frame: &MessageFrame) -> Result<(), ConnectionError> {
        let session = match (&self.session, self.state) {
            (Some(session), ConnectionState::Open) => session,
            (_, state) => return Err(ConnectionError::NotConnected { state }),
        };

        let json = frame.to_json()?;
        debug!(session = %session.id, len = json.len(), "Sending frame");

        session
            .cmd_tx
            .send(ConnectionCommand::Send(json))
            .await
            .map_err(|_| ConnectionError::Transport("Connection task has stopped".into()))
    }

    /// Apply one notification from the transport.
    ///
    /// Presence snapshots go to `presence`; every other frame is resolved to
    /// a conversation key and appended to `history`. Returns `None` when the
    /// notification had no visible effect (stale session, unchanged presence,
    /// frame outside the open state).
    pub fn handle_notification(
        &mut self,
        notification: ConnectionNotification,
        presence: &mut PresenceTracker,
        history: &mut HistoryStore,
    ) -> Option<Dispatched> {
        let current = self.session.as_ref()?;
        if current.id != notification.session {
            debug!(
                session = %notification.session,
                "Ignoring event from a previous session"
            );
            return None;
        }

        match notification.event {
            ConnectionEvent::Opened => {
                if self.state != ConnectionState::Connecting {
                    return None;
                }
                info!(session = %current.id, "Session open");
                self.state = ConnectionState::Open;
                Some(Dispatched::StateChanged(self.state))
            }

            ConnectionEvent::Frame(text) => {
                if self.state != ConnectionState::Open {
                    debug!(session = %current.id, "Dropping frame received before open");
                    return None;
                }
                let me = current.identity.clone();
                self.route_frame(&text, &me, presence, history)
            }

            ConnectionEvent::Error(error) => {
                warn!(session = %current.id, error = %error, "Transport error");
                Some(Dispatched::TransportError(error))
            }

            ConnectionEvent::Closed { reason } => {
                info!(session = %current.id, reason = ?reason, "Session closed by transport");
                // Terminal for this session; a new one must be opened
                // explicitly.
                self.session = None;
                self.state = ConnectionState::Closed;
                Some(Dispatched::StateChanged(self.state))
            }
        }
    }

    fn route_frame(
        &self,
        text: &str,
        me: &Identity,
        presence: &mut PresenceTracker,
        history: &mut HistoryStore,
    ) -> Option<Dispatched> {
        match classify_frame(text) {
            Ok(InboundFrame::Presence(online)) => presence
                .apply_snapshot(online, me)
                .then_some(Dispatched::PresenceChanged),

            Ok(InboundFrame::Message(message)) => {
                let key = key_for_message(&message);
                debug!(key = %key, sender = %message.sender, "Routing message");
                history.append_live(key.clone(), message);
                Some(Dispatched::MessageRouted { key })
            }

            Ok(InboundFrame::Malformed(message)) => {
                let key = ConversationKey::broadcast();
                warn!(
                    sender = %message.sender,
                    "Frame without sender or routing fields, delivering to broadcast"
                );
                history.append_live(key.clone(), message);
                Some(Dispatched::MessageRouted { key })
            }

            Err(e) => {
                warn!(error = %e, len = text.len(), "Undecodable frame");
                Some(Dispatched::TransportError(format!("Undecodable frame: {e}")))
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Connector that keeps the command receivers for inspection instead of
    /// opening sockets.
    #[derive(Default)]
    struct RecordingConnector {
        sessions: Mutex<Vec<(SessionId, mpsc::Receiver<ConnectionCommand>)>>,
    }

    impl Connector for RecordingConnector {
        fn connect(
            &self,
            session: SessionId,
            _identity: &Identity,
            _notif_tx: mpsc::Sender<ConnectionNotification>,
        ) -> mpsc::Sender<ConnectionCommand> {
            let (tx, rx) = mpsc::channel(16);
            self.sessions.lock().unwrap().push((session, rx));
            tx
        }
    }

    fn setup() -> (ConnectionManager, Arc<RecordingConnector>) {
        let connector = Arc::new(RecordingConnector::default());
        let (manager, _rx) = ConnectionManager::new(connector.clone(), 16);
        (manager, connector)
    }

    fn event(session: SessionId, event: ConnectionEvent) -> ConnectionNotification {
        ConnectionNotification { session, event }
    }

    fn frame() -> MessageFrame {
        MessageFrame::text(
            &Identity::new("alice"),
            &chatmux_shared::ConversationDescriptor::Broadcast,
            "hello",
        )
    }

    #[tokio::test]
    async fn test_send_rejected_while_connecting() {
        let (mut manager, connector) = setup();
        manager.open(Identity::new("alice"));
        assert_eq!(manager.state(), ConnectionState::Connecting);

        let err = manager.send(&frame()).await.unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::NotConnected {
                state: ConnectionState::Connecting
            }
        ));

        let mut sessions = connector.sessions.lock().unwrap();
        assert!(sessions[0].1.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_rejected_while_closed() {
        let (manager, _connector) = setup();
        let err = manager.send(&frame()).await.unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::NotConnected {
                state: ConnectionState::Closed
            }
        ));
    }

    #[tokio::test]
    async fn test_send_after_open() {
        let (mut manager, connector) = setup();
        let mut presence = PresenceTracker::new();
        let mut history = HistoryStore::new();
        let id = manager.open(Identity::new("alice"));

        let dispatched =
            manager.handle_notification(event(id, ConnectionEvent::Opened), &mut presence, &mut history);
        assert_eq!(dispatched, Some(Dispatched::StateChanged(ConnectionState::Open)));

        manager.send(&frame()).await.unwrap();
        let mut sessions = connector.sessions.lock().unwrap();
        match sessions[0].1.try_recv().unwrap() {
            ConnectionCommand::Send(json) => assert!(json.contains("\"receiver\":\"ALL\"")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut manager, connector) = setup();
        manager.close();
        assert_eq!(manager.state(), ConnectionState::Closed);

        manager.open(Identity::new("alice"));
        manager.close();
        manager.close();
        assert_eq!(manager.state(), ConnectionState::Closed);

        let mut sessions = connector.sessions.lock().unwrap();
        let rx = &mut sessions[0].1;
        assert_eq!(rx.try_recv().unwrap(), ConnectionCommand::Close);
        // Sender dropped after the single close.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_reopen_closes_previous_and_ignores_its_events() {
        let (mut manager, connector) = setup();
        let mut presence = PresenceTracker::new();
        let mut history = HistoryStore::new();

        let first = manager.open(Identity::new("alice"));
        let second = manager.open(Identity::new("bob"));
        assert_ne!(first, second);
        assert_eq!(manager.identity(), Some(&Identity::new("bob")));

        {
            let mut sessions = connector.sessions.lock().unwrap();
            assert_eq!(sessions[0].1.try_recv().unwrap(), ConnectionCommand::Close);
        }

        let stale = manager.handle_notification(
            event(first, ConnectionEvent::Opened),
            &mut presence,
            &mut history,
        );
        assert_eq!(stale, None);
        assert_eq!(manager.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_frames_are_demultiplexed() {
        let (mut manager, _connector) = setup();
        let mut presence = PresenceTracker::new();
        let mut history = HistoryStore::new();
        let id = manager.open(Identity::new("alice"));

        // Not open yet: dropped, not buffered.
        let early = manager.handle_notification(
            event(id, ConnectionEvent::Frame(r#"{"sender":"bob","receiver":"ALL","content":"early"}"#.into())),
            &mut presence,
            &mut history,
        );
        assert_eq!(early, None);
        assert!(history.is_empty());

        manager.handle_notification(event(id, ConnectionEvent::Opened), &mut presence, &mut history);

        let p = manager.handle_notification(
            event(id, ConnectionEvent::Frame(r#"{"type":"PRESENCE","online":["alice","bob"]}"#.into())),
            &mut presence,
            &mut history,
        );
        assert_eq!(p, Some(Dispatched::PresenceChanged));
        assert!(presence.is_online(&Identity::new("bob")));
        assert!(!presence.is_online(&Identity::new("alice")));

        let dm = manager.handle_notification(
            event(id, ConnectionEvent::Frame(r#"{"sender":"bob","receiver":"alice","content":"hi"}"#.into())),
            &mut presence,
            &mut history,
        );
        let dm_key = ConversationKey::direct(&Identity::new("alice"), &Identity::new("bob"));
        assert_eq!(dm, Some(Dispatched::MessageRouted { key: dm_key.clone() }));
        assert_eq!(history.messages(&dm_key).len(), 1);

        let malformed = manager.handle_notification(
            event(id, ConnectionEvent::Frame(r#"{"sender":"bob","content":"where"}"#.into())),
            &mut presence,
            &mut history,
        );
        assert_eq!(
            malformed,
            Some(Dispatched::MessageRouted {
                key: ConversationKey::broadcast()
            })
        );

        let garbage = manager.handle_notification(
            event(id, ConnectionEvent::Frame("<html>".into())),
            &mut presence,
            &mut history,
        );
        assert!(matches!(garbage, Some(Dispatched::TransportError(_))));
    }

    #[test]
    fn test_room_frame_without_sender_reaches_its_room() {
        let (mut manager, _connector) = setup();
        let mut presence = PresenceTracker::new();
        let mut history = HistoryStore::new();
        let id = manager.open(Identity::new("alice"));
        manager.handle_notification(event(id, ConnectionEvent::Opened), &mut presence, &mut history);

        let routed = manager.handle_notification(
            event(id, ConnectionEvent::Frame(r#"{"roomId":"R1","content":"x"}"#.into())),
            &mut presence,
            &mut history,
        );
        let room_key = ConversationKey::room(&chatmux_shared::RoomId::new("R1"));
        assert_eq!(room_key.as_str(), "ROOM__R1");
        assert_eq!(routed, Some(Dispatched::MessageRouted { key: room_key.clone() }));
        assert_eq!(history.messages(&room_key).len(), 1);
        assert!(history.messages(&ConversationKey::broadcast()).is_empty());
    }

    #[test]
    fn test_transport_close_is_terminal() {
        let (mut manager, _connector) = setup();
        let mut presence = PresenceTracker::new();
        let mut history = HistoryStore::new();
        let id = manager.open(Identity::new("alice"));
        manager.handle_notification(event(id, ConnectionEvent::Opened), &mut presence, &mut history);

        let err = manager.handle_notification(
            event(id, ConnectionEvent::Error("connection reset".into())),
            &mut presence,
            &mut history,
        );
        assert_eq!(err, Some(Dispatched::TransportError("connection reset".into())));

        let closed = manager.handle_notification(
            event(id, ConnectionEvent::Closed { reason: None }),
            &mut presence,
            &mut history,
        );
        assert_eq!(closed, Some(Dispatched::StateChanged(ConnectionState::Closed)));
        assert_eq!(manager.session_id(), None);

        // No auto-reconnect.
        assert_eq!(manager.state(), ConnectionState::Closed);
        manager.close();
    }
}
