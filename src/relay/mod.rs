// Relay client for the platform's real-time chat
// Entry point for all transport-related functionality: connection
// management, offline buffering, and the inbound fan-out.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::SinkExt;
use log::{debug, error, warn};
use tokio::sync::{watch, Mutex as TokioMutex};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

pub mod buffer;
pub mod connection;
pub mod dispatcher;
pub mod stomp;

pub use self::connection::ConnectionState;
pub use self::dispatcher::{MessageDispatcher, MessageStream};

use crate::models::Message;
use self::buffer::OutboundBuffer;
use self::connection::WsSink;
use self::stomp::Frame;

/// Raw-WebSocket endpoint the SockJS layer exposes on the backend.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8089/SmartCruit/ws-chat/websocket";

/// Shared destination every client publishes chat messages to.
pub const SEND_DESTINATION: &str = "/app/chat.send";

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Per-user inbox topic on the relay.
pub fn inbox_topic(user_id: &str) -> String {
    format!("/topic/messages/{}", user_id)
}

fn subscription_id(user_id: &str) -> String {
    format!("sub-{}", user_id)
}

pub(crate) fn subscribe_frame(user_id: &str) -> Frame {
    Frame::subscribe(&subscription_id(user_id), &inbox_topic(user_id))
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub ws_url: String,
    /// Fixed delay between reconnection attempts. Retries never stop.
    pub reconnect_delay: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            ws_url: DEFAULT_WS_URL.to_string(),
            reconnect_delay: RECONNECT_DELAY,
        }
    }
}

/// Client for the chat relay. One instance per logged-in user, shared by
/// every open conversation; cloning shares the same connection, buffers,
/// and fan-out.
///
/// Work issued while the link is down is queued, never dropped, and
/// replayed in order on the next successful connect. Consumers only ever
/// observe "connected" or "not yet connected"; transport failures are
/// logged and retried internally.
#[derive(Clone)]
pub struct RelayClient {
    config: RelayConfig,
    token: Option<String>,
    buffer: Arc<TokioMutex<OutboundBuffer>>,
    dispatcher: MessageDispatcher,
    writer: Arc<TokioMutex<Option<WsSink>>>,
    /// Topic keys ever requested, for caller-level idempotency.
    requested: Arc<TokioMutex<HashSet<String>>>,
    /// Topic keys live on the current connection, in registration order.
    active: Arc<TokioMutex<Vec<String>>>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    state_rx: watch::Receiver<ConnectionState>,
    started: Arc<AtomicBool>,
}

impl RelayClient {
    pub fn new(config: RelayConfig, token: Option<String>) -> RelayClient {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        RelayClient {
            config,
            token,
            buffer: Arc::new(TokioMutex::new(OutboundBuffer::new())),
            dispatcher: MessageDispatcher::new(),
            writer: Arc::new(TokioMutex::new(None)),
            requested: Arc::new(TokioMutex::new(HashSet::new())),
            active: Arc::new(TokioMutex::new(Vec::new())),
            state_tx: Arc::new(state_tx),
            state_rx,
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the connection task. Safe to call more than once; only the
    /// first call spawns anything.
    pub fn activate(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Relay client already active");
            return;
        }
        tokio::spawn(connection::run(self.clone()));
    }

    /// Ensure a subscription exists for `user_id`'s inbox topic. At most
    /// one transport-level subscribe is issued per topic key; repeated
    /// calls are no-ops. While the link is down the subscription is queued
    /// and registered on the next connect.
    pub async fn subscribe_to_messages(&self, user_id: &str) {
        {
            let mut requested = self.requested.lock().await;
            if !requested.insert(user_id.to_string()) {
                debug!("Inbox topic for {} already requested", user_id);
                return;
            }
        }
        if self.try_send_frame(subscribe_frame(user_id)).await {
            self.active.lock().await.push(user_id.to_string());
            debug!("Subscribed to inbox topic for {}", user_id);
        } else {
            warn!("Relay not connected; subscription for {} queued", user_id);
            self.buffer
                .lock()
                .await
                .queue_subscription(user_id.to_string());
        }
    }

    /// Hand a message to the transport, or queue it if the link is down.
    /// Never fails from the caller's point of view.
    pub async fn send_message(&self, message: Message) {
        let frame = match message_frame(&message) {
            Some(frame) => frame,
            None => return,
        };
        if !self.try_send_frame(frame).await {
            warn!(
                "Relay not connected; message for {} queued",
                message.recipient_id
            );
            self.buffer.lock().await.queue_message(message);
        }
    }

    /// Attach a listener to the inbound fan-out. Every listener receives
    /// every pushed message; filtering happens in the session layer.
    pub fn messages(&self) -> MessageStream {
        self.dispatcher.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch connection-state transitions, e.g. to wait for the first
    /// successful connect.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Counts of queued (subscriptions, messages) awaiting the next drain.
    pub async fn pending_work(&self) -> (usize, usize) {
        self.buffer.lock().await.counts()
    }

    /// Write a frame to the live socket. Returns false when there is no
    /// usable link, in which case the caller queues the work instead. A
    /// write failure tears the writer down; the read loop notices the dead
    /// socket and drives the reconnect.
    pub(crate) async fn try_send_frame(&self, frame: Frame) -> bool {
        let mut writer = self.writer.lock().await;
        let sink = match writer.as_mut() {
            Some(sink) => sink,
            None => return false,
        };
        match sink.send(WsMessage::Text(frame.encode())).await {
            Ok(()) => true,
            Err(e) => {
                error!("Relay send failed: {}", e);
                *writer = None;
                false
            }
        }
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        let _ = self.state_tx.send(state);
    }
}

pub(crate) fn message_frame(message: &Message) -> Option<Frame> {
    match serde_json::to_string(message) {
        Ok(body) => Some(Frame::send(SEND_DESTINATION, body)),
        Err(e) => {
            error!("Failed to encode outbound message: {}", e);
            None
        }
    }
}
