#![allow(dead_code)]
// Shared fixtures for the integration tests: canned users/messages, a mock
// STOMP relay speaking the real wire protocol over a local WebSocket, and
// a minimal HTTP responder standing in for the REST backend.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

use cruitchat::models::{Contact, CurrentUser, Message, MessageKind};
use cruitchat::relay::stomp::Frame;
use cruitchat::relay::{ConnectionState, RelayClient, RelayConfig};

/// Relay config with a reconnect delay short enough for tests but wide
/// enough to reliably queue work while the link is down.
pub fn test_config(ws_url: String) -> RelayConfig {
    RelayConfig {
        ws_url,
        reconnect_delay: Duration::from_millis(400),
    }
}

pub async fn wait_for_state(client: &RelayClient, target: ConnectionState) {
    let mut watch = client.state_changes();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if *watch.borrow_and_update() == target {
                return;
            }
            watch.changed().await.expect("state channel closed");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {:?}", target));
}

pub fn test_user() -> CurrentUser {
    CurrentUser {
        user_id: "42".to_string(),
        display_name: "Alice".to_string(),
        profile_picture_url: Some("http://cdn.local/42.png".to_string()),
    }
}

pub fn contact(user_id: &str, name: &str) -> Contact {
    Contact {
        user_id: user_id.to_string(),
        name: name.to_string(),
        last_message: None,
        last_timestamp: None,
        profile_picture_url: None,
    }
}

pub fn text_message(
    sender_id: &str,
    sender_name: &str,
    recipient_id: &str,
    content: &str,
) -> Message {
    Message {
        sender_id: sender_id.to_string(),
        sender_name: sender_name.to_string(),
        recipient_id: recipient_id.to_string(),
        content: content.to_string(),
        timestamp: "2024-03-01T10:00:00.000Z".to_string(),
        kind: MessageKind::Text,
    }
}

// ---------------------------------------------------------------------------
// Mock relay

/// What the relay observed, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    Connected { authorization: Option<String> },
    Subscribed { id: String, destination: String },
    Sent { destination: String, body: String },
    Disconnected,
}

#[derive(Clone)]
enum Command {
    Push(String),
    DropClients,
}

/// A STOMP relay good enough for the client under test: answers CONNECT
/// with CONNECTED, records SUBSCRIBE and SEND frames, and can push
/// MESSAGE frames or drop its clients on demand.
pub struct MockRelay {
    addr: SocketAddr,
    events: mpsc::UnboundedReceiver<RelayEvent>,
    command_tx: broadcast::Sender<Command>,
}

impl MockRelay {
    pub async fn start() -> MockRelay {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock relay");
        let addr = listener.local_addr().expect("mock relay addr");
        let (event_tx, events) = mpsc::unbounded_channel();
        let (command_tx, _) = broadcast::channel(16);
        let accept_commands = command_tx.clone();
        tokio::spawn(async move {
            loop {
                let socket = match listener.accept().await {
                    Ok((socket, _)) => socket,
                    Err(_) => break,
                };
                tokio::spawn(serve_relay_connection(
                    socket,
                    event_tx.clone(),
                    accept_commands.subscribe(),
                ));
            }
        });
        MockRelay {
            addr,
            events,
            command_tx,
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Push `message` to the connected client as a MESSAGE frame on its
    /// recipient's inbox topic.
    pub fn push_message(&self, message: &Message) {
        let mut frame = Frame::new("MESSAGE")
            .with_header("subscription", &format!("sub-{}", message.recipient_id))
            .with_header("message-id", "m-1")
            .with_header(
                "destination",
                &format!("/topic/messages/{}", message.recipient_id),
            );
        frame.body = serde_json::to_string(message).expect("encode pushed message");
        let _ = self.command_tx.send(Command::Push(frame.encode()));
    }

    /// Close every live client socket, forcing a reconnect.
    pub fn drop_clients(&self) {
        let _ = self.command_tx.send(Command::DropClients);
    }

    pub async fn next_event(&mut self) -> RelayEvent {
        tokio::time::timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("timed out waiting for a relay event")
            .expect("relay event channel closed")
    }

    /// Skip events until one matches `predicate`, failing on timeout.
    pub async fn wait_for_event(&mut self, predicate: impl Fn(&RelayEvent) -> bool) -> RelayEvent {
        loop {
            let event = self.next_event().await;
            if predicate(&event) {
                return event;
            }
        }
    }

    pub async fn expect_no_event(&mut self, wait: Duration) {
        match tokio::time::timeout(wait, self.events.recv()).await {
            Err(_) => {}
            Ok(event) => panic!("unexpected relay event: {:?}", event),
        }
    }

    /// Collect whatever events arrive within `wait`.
    pub async fn drain_events(&mut self, wait: Duration) -> Vec<RelayEvent> {
        let mut collected = Vec::new();
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let now = tokio::time::Instant::now();
            if now >= deadline {
                break;
            }
            match tokio::time::timeout(deadline - now, self.events.recv()).await {
                Ok(Some(event)) => collected.push(event),
                _ => break,
            }
        }
        collected
    }
}

async fn serve_relay_connection(
    socket: TcpStream,
    events: mpsc::UnboundedSender<RelayEvent>,
    mut commands: broadcast::Receiver<Command>,
) {
    let mut authorization: Option<String> = None;
    let header_capture =
        |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            authorization = request
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            Ok(response)
        };
    let ws = match tokio_tungstenite::accept_hdr_async(socket, header_capture).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    let (mut sink, mut read) = ws.split();

    loop {
        tokio::select! {
            incoming = read.next() => {
                let text = match incoming {
                    Some(Ok(WsMessage::Text(text))) => text,
                    Some(Ok(WsMessage::Close(_))) | None => {
                        let _ = events.send(RelayEvent::Disconnected);
                        return;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => {
                        let _ = events.send(RelayEvent::Disconnected);
                        return;
                    }
                };
                if text.trim().is_empty() {
                    continue;
                }
                let frame = match Frame::parse(&text) {
                    Ok(frame) => frame,
                    Err(_) => continue,
                };
                match frame.command.as_str() {
                    "CONNECT" => {
                        let reply = "CONNECTED\nversion:1.2\n\n\0".to_string();
                        let _ = sink.send(WsMessage::Text(reply)).await;
                        let _ = events.send(RelayEvent::Connected {
                            authorization: authorization.clone(),
                        });
                    }
                    "SUBSCRIBE" => {
                        let _ = events.send(RelayEvent::Subscribed {
                            id: frame.header("id").unwrap_or_default().to_string(),
                            destination: frame
                                .header("destination")
                                .unwrap_or_default()
                                .to_string(),
                        });
                    }
                    "SEND" => {
                        let _ = events.send(RelayEvent::Sent {
                            destination: frame
                                .header("destination")
                                .unwrap_or_default()
                                .to_string(),
                            body: frame.body.clone(),
                        });
                    }
                    _ => {}
                }
            }
            command = commands.recv() => {
                match command {
                    Ok(Command::Push(frame)) => {
                        let _ = sink.send(WsMessage::Text(frame)).await;
                    }
                    Ok(Command::DropClients) => {
                        let _ = sink.send(WsMessage::Close(None)).await;
                        let _ = events.send(RelayEvent::Disconnected);
                        return;
                    }
                    Err(_) => return,
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Mock REST backend

pub struct ApiRoute {
    pub method: &'static str,
    pub path: String,
    pub body: String,
}

impl ApiRoute {
    pub fn get(path: &str, body: &str) -> ApiRoute {
        ApiRoute {
            method: "GET",
            path: path.to_string(),
            body: body.to_string(),
        }
    }

    pub fn post(path: &str, body: &str) -> ApiRoute {
        ApiRoute {
            method: "POST",
            path: path.to_string(),
            body: body.to_string(),
        }
    }
}

/// A one-shot HTTP/1.1 responder with a fixed route table. Unknown paths
/// get a 404 so failure paths are exercisable too.
pub struct MockApi {
    addr: SocketAddr,
}

impl MockApi {
    pub async fn start(routes: Vec<ApiRoute>) -> MockApi {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock api");
        let addr = listener.local_addr().expect("mock api addr");
        let routes = Arc::new(routes);
        tokio::spawn(async move {
            loop {
                let socket = match listener.accept().await {
                    Ok((socket, _)) => socket,
                    Err(_) => break,
                };
                tokio::spawn(serve_api_connection(socket, routes.clone()));
            }
        });
        MockApi { addr }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

async fn serve_api_connection(mut socket: TcpStream, routes: Arc<Vec<ApiRoute>>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    // Read up to the end of the request headers.
    let header_end = loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
            break pos;
        }
        if buf.len() > 1 << 20 {
            return;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    // Consume the body so the client finishes writing before the response.
    let body_received = buf.len() - header_end - 4;
    let mut remaining = content_length.saturating_sub(body_received);
    while remaining > 0 {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        remaining = remaining.saturating_sub(n);
    }

    let (status, body) = match routes
        .iter()
        .find(|route| route.method == method && route.path == path)
    {
        Some(route) => ("200 OK", route.body.clone()),
        None => ("404 Not Found", "{}".to_string()),
    };
    let response = format!(
        "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.flush().await;
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
