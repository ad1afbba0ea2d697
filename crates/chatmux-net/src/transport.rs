//! Websocket transport.
//!
//! Each session runs in a dedicated tokio task that owns the socket. The task
//! reports `Opened` only once the handshake completed, forwards every text
//! frame as it arrives, and always finishes with `Closed`. It never
//! reconnects.

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};
use url::Url;

use chatmux_shared::constants::CHAT_ENDPOINT_PATH;
use chatmux_shared::Identity;

use crate::connection::{
    ConnectionCommand, ConnectionEvent, ConnectionNotification, Connector, SessionId,
};
use crate::error::ConnectionError;

/// Build the websocket URL of a session: `<ws base>/chat?username=<identity>`.
/// A path on the base is kept, so `wss://host/app` yields `/app/chat`.
pub fn session_url(ws_base: &str, identity: &Identity) -> Result<Url, ConnectionError> {
    let mut url = Url::parse(ws_base)?;
    url.path_segments_mut()
        .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .pop_if_empty()
        .push(CHAT_ENDPOINT_PATH);
    url.query_pairs_mut()
        .clear()
        .append_pair("username", identity.as_str());
    Ok(url)
}

/// [`Connector`] that opens a real websocket per session.
///
/// `connect` spawns onto the current tokio runtime and must be called from
/// within one.
#[derive(Debug, Clone)]
pub struct WsConnector {
    ws_base: String,
    capacity: usize,
}

impl WsConnector {
    pub fn new(ws_base: impl Into<String>, capacity: usize) -> Self {
        Self {
            ws_base: ws_base.into(),
            capacity,
        }
    }
}

impl Connector for WsConnector {
    fn connect(
        &self,
        session: SessionId,
        identity: &Identity,
        notif_tx: mpsc::Sender<ConnectionNotification>,
    ) -> mpsc::Sender<ConnectionCommand> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<ConnectionCommand>(self.capacity);

        match session_url(&self.ws_base, identity) {
            Ok(url) => {
                tokio::spawn(run_session(session, url, cmd_rx, notif_tx));
            }
            Err(e) => {
                error!(base = %self.ws_base, error = %e, "Cannot build session URL");
                tokio::spawn(async move {
                    let notify = Notifier { session, notif_tx };
                    notify.send(ConnectionEvent::Error(e.to_string())).await;
                    notify
                        .send(ConnectionEvent::Closed {
                            reason: Some("invalid endpoint".into()),
                        })
                        .await;
                });
            }
        }

        cmd_tx
    }
}

struct Notifier {
    session: SessionId,
    notif_tx: mpsc::Sender<ConnectionNotification>,
}

impl Notifier {
    async fn send(&self, event: ConnectionEvent) {
        let _ = self
            .notif_tx
            .send(ConnectionNotification {
                session: self.session,
                event,
            })
            .await;
    }
}

async fn run_session(
    session: SessionId,
    url: Url,
    mut cmd_rx: mpsc::Receiver<ConnectionCommand>,
    notif_tx: mpsc::Sender<ConnectionNotification>,
) {
    let notify = Notifier { session, notif_tx };

    debug!(session = %session, url = %url, "Connecting");

    // --- Handshake, abandoned if the session is closed meanwhile ---
    let connect = tokio_tungstenite::connect_async(url.as_str());
    tokio::pin!(connect);

    let stream = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok((stream, _)) => break stream,
                Err(e) => {
                    warn!(session = %session, error = %e, "Websocket handshake failed");
                    notify.send(ConnectionEvent::Error(e.to_string())).await;
                    notify
                        .send(ConnectionEvent::Closed {
                            reason: Some("handshake failed".into()),
                        })
                        .await;
                    return;
                }
            },

            cmd = cmd_rx.recv() => match cmd {
                Some(ConnectionCommand::Send(_)) => {
                    debug!(session = %session, "Discarding send issued before open");
                }
                Some(ConnectionCommand::Close) | None => {
                    info!(session = %session, "Session closed while connecting");
                    notify.send(ConnectionEvent::Closed { reason: None }).await;
                    return;
                }
            },
        }
    };

    info!(session = %session, "Websocket connected");
    notify.send(ConnectionEvent::Opened).await;

    let (mut ws_write, mut ws_read) = stream.split();

    let reason = loop {
        tokio::select! {
            // --- Outgoing commands ---
            cmd = cmd_rx.recv() => match cmd {
                Some(ConnectionCommand::Send(text)) => {
                    if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                        error!(session = %session, error = %e, "Websocket write failed");
                        notify.send(ConnectionEvent::Error(e.to_string())).await;
                        break Some("write failed".to_string());
                    }
                }
                Some(ConnectionCommand::Close) | None => {
                    let _ = ws_write.send(Message::Close(None)).await;
                    break None;
                }
            },

            // --- Incoming frames ---
            frame = ws_read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    notify
                        .send(ConnectionEvent::Frame(text.as_str().to_owned()))
                        .await;
                }
                Some(Ok(Message::Close(close))) => {
                    break Some(
                        close
                            .map(|c| c.reason.as_str().to_owned())
                            .filter(|r| !r.is_empty())
                            .unwrap_or_else(|| "closed by server".to_string()),
                    );
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(session = %session, error = %e, "Websocket read failed");
                    notify.send(ConnectionEvent::Error(e.to_string())).await;
                    break Some("read failed".to_string());
                }
                None => break Some("stream ended".to_string()),
            },
        }
    };

    info!(session = %session, reason = ?reason, "Websocket session ended");
    notify.send(ConnectionEvent::Closed { reason }).await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::WebSocketStream;

    use super::*;

    #[test]
    fn test_session_url() {
        let url = session_url("ws://localhost:8080", &Identity::new("alice smith")).unwrap();
        assert_eq!(url.as_str(), "ws://localhost:8080/chat?username=alice+smith");
    }

    #[test]
    fn test_session_url_keeps_base_path() {
        let url = session_url("wss://chat.example.com/app/", &Identity::new("bob")).unwrap();
        assert_eq!(url.as_str(), "wss://chat.example.com/app/chat?username=bob");

        let url = session_url("wss://chat.example.com/app?x=1", &Identity::new("bob")).unwrap();
        assert_eq!(url.as_str(), "wss://chat.example.com/app/chat?username=bob");
    }

    #[test]
    fn test_session_url_rejects_garbage() {
        assert!(session_url("not a url", &Identity::new("bob")).is_err());
        assert!(session_url("mailto:bob@example.com", &Identity::new("bob")).is_err());
    }

    async fn next_event(notif_rx: &mut mpsc::Receiver<ConnectionNotification>) -> ConnectionEvent {
        tokio::time::timeout(Duration::from_secs(5), notif_rx.recv())
            .await
            .expect("timed out waiting for the transport")
            .expect("notification channel closed")
            .event
    }

    /// Accept one websocket on a local port and hand the socket plus the
    /// requested URI to `serve`.
    async fn local_server<F, Fut>(serve: F) -> String
    where
        F: FnOnce(WebSocketStream<TcpStream>, String) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let (uri_tx, uri_rx) = std::sync::mpsc::channel();
            let record_uri = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                let _ = uri_tx.send(req.uri().to_string());
                Ok(resp)
            };
            let ws = tokio_tungstenite::accept_hdr_async(tcp, record_uri).await.unwrap();
            let uri = uri_rx.recv().unwrap();
            serve(ws, uri).await;
        });

        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn test_frames_flow_both_ways_until_server_closes() {
        let (sent_tx, sent_rx) = oneshot::channel();
        let base = local_server(|mut ws, uri| async move {
            assert_eq!(uri, "/chat?username=alice");
            ws.send(Message::Text("hello".into())).await.unwrap();

            let Some(Ok(Message::Text(text))) = ws.next().await else {
                panic!("expected a text frame from the client");
            };
            let _ = sent_tx.send(text.as_str().to_owned());

            ws.send(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "bye".into(),
            })))
            .await
            .unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let connector = WsConnector::new(base, 4);
        let (notif_tx, mut notif_rx) = mpsc::channel(8);
        let cmd_tx = connector.connect(SessionId::new(), &Identity::new("alice"), notif_tx);

        assert_eq!(next_event(&mut notif_rx).await, ConnectionEvent::Opened);
        assert_eq!(
            next_event(&mut notif_rx).await,
            ConnectionEvent::Frame("hello".into())
        );

        let outbound = r#"{"sender":"alice","receiver":"ALL","content":"hi"}"#;
        cmd_tx
            .send(ConnectionCommand::Send(outbound.to_string()))
            .await
            .unwrap();
        assert_eq!(sent_rx.await.unwrap(), outbound);

        assert_eq!(
            next_event(&mut notif_rx).await,
            ConnectionEvent::Closed {
                reason: Some("bye".into())
            }
        );
    }

    #[tokio::test]
    async fn test_local_close_sends_close_frame() {
        let (seen_tx, seen_rx) = oneshot::channel();
        let base = local_server(|mut ws, _uri| async move {
            let first = ws.next().await;
            let _ = seen_tx.send(matches!(first, Some(Ok(Message::Close(None)))));
        })
        .await;

        let connector = WsConnector::new(base, 4);
        let (notif_tx, mut notif_rx) = mpsc::channel(8);
        let cmd_tx = connector.connect(SessionId::new(), &Identity::new("alice"), notif_tx);

        assert_eq!(next_event(&mut notif_rx).await, ConnectionEvent::Opened);
        cmd_tx.send(ConnectionCommand::Close).await.unwrap();

        assert_eq!(
            next_event(&mut notif_rx).await,
            ConnectionEvent::Closed { reason: None }
        );
        assert!(seen_rx.await.unwrap(), "server did not see a close frame");
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_error_then_closed() {
        let connector = WsConnector::new("ws://127.0.0.1:1", 4);
        let (notif_tx, mut notif_rx) = mpsc::channel(8);
        let session = SessionId::new();
        let _cmd_tx = connector.connect(session, &Identity::new("alice"), notif_tx);

        let first = notif_rx.recv().await.unwrap();
        assert_eq!(first.session, session);
        assert!(matches!(first.event, ConnectionEvent::Error(_)));

        let second = notif_rx.recv().await.unwrap();
        assert!(matches!(second.event, ConnectionEvent::Closed { .. }));
    }
}
