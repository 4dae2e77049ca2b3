// Relay connection management
// Owns the WebSocket link, the STOMP handshake, and the reconnect loop.

use anyhow::{anyhow, Result};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::stomp::{commands, Frame};
use super::{message_frame, subscribe_frame, RelayClient};

pub(crate) type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Observable state of the relay link. Owned by the connection task;
/// everyone else reads it through the client's watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// The connection task. Dials, performs the STOMP handshake, replays
/// buffered work, then pumps inbound frames until the link dies; repeats
/// forever with a fixed delay between attempts. Failures are logged, never
/// surfaced to consumers.
pub(crate) async fn run(client: RelayClient) {
    info!("Relay connection task started");
    loop {
        client.set_state(ConnectionState::Connecting);
        match connect_once(&client).await {
            Ok(()) => info!("Relay connection closed"),
            Err(e) => error!("Relay connection failed: {}", e),
        }
        client.set_state(ConnectionState::Disconnected);
        debug!(
            "Retrying relay connection in {:?}",
            client.config.reconnect_delay
        );
        tokio::time::sleep(client.config.reconnect_delay).await;
    }
}

async fn connect_once(client: &RelayClient) -> Result<()> {
    let mut request = client.config.ws_url.as_str().into_client_request()?;
    let host = request
        .uri()
        .host()
        .unwrap_or("localhost")
        .to_string();
    if let Some(token) = &client.token {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))?;
        request.headers_mut().insert(header::AUTHORIZATION, value);
    }

    info!("Connecting to relay at {}", client.config.ws_url);
    let (stream, _) = connect_async(request).await?;
    let (mut sink, mut read) = stream.split();

    let connect = Frame::connect(&host, client.token.as_deref());
    sink.send(WsMessage::Text(connect.encode())).await?;
    tokio::time::timeout(HANDSHAKE_TIMEOUT, await_connected(&mut read))
        .await
        .map_err(|_| anyhow!("timed out waiting for the relay handshake"))??;

    // Install the writer before replaying so work arriving from now on
    // goes straight to the socket instead of the queues.
    *client.writer.lock().await = Some(sink);
    client.set_state(ConnectionState::Connected);
    info!("Relay connected");

    replay_buffered(client).await;

    let result = read_loop(client, &mut read).await;
    *client.writer.lock().await = None;
    result
}

async fn await_connected(read: &mut WsSource) -> Result<()> {
    while let Some(message) = read.next().await {
        match message? {
            WsMessage::Text(text) => {
                if text.trim().is_empty() {
                    continue;
                }
                let frame =
                    Frame::parse(&text).map_err(|e| anyhow!("handshake frame: {}", e))?;
                return match frame.command.as_str() {
                    commands::CONNECTED => Ok(()),
                    commands::ERROR => Err(anyhow!(
                        "relay refused the session: {}",
                        error_detail(&frame)
                    )),
                    other => Err(anyhow!("unexpected {} frame during handshake", other)),
                };
            }
            WsMessage::Close(_) => {
                return Err(anyhow!("relay closed the connection during the handshake"))
            }
            _ => continue,
        }
    }
    Err(anyhow!("connection ended during the handshake"))
}

/// Restore subscriptions from the previous connection, then drain the
/// pending queues: subscriptions first, then messages, both FIFO. The
/// drain works on a snapshot; anything the link fails to take is put back
/// for the next connect, so nothing is lost or sent twice.
async fn replay_buffered(client: &RelayClient) {
    // A STOMP subscription dies with its connection, so topics registered
    // on an earlier link are re-issued on this one.
    let previously_active = client.active.lock().await.clone();
    for user_id in &previously_active {
        if !client.try_send_frame(subscribe_frame(user_id)).await {
            warn!("Link dropped while restoring subscriptions");
            return;
        }
    }

    let (subscriptions, messages) = client.buffer.lock().await.take_pending();
    if subscriptions.is_empty() && messages.is_empty() {
        return;
    }
    info!(
        "Replaying {} queued subscription(s) and {} queued message(s)",
        subscriptions.len(),
        messages.len()
    );

    for (index, user_id) in subscriptions.iter().enumerate() {
        if client.try_send_frame(subscribe_frame(user_id)).await {
            client.active.lock().await.push(user_id.clone());
        } else {
            warn!("Link dropped mid-drain; keeping the remainder queued");
            client
                .buffer
                .lock()
                .await
                .restore(subscriptions[index..].to_vec(), messages);
            return;
        }
    }

    for (index, message) in messages.iter().enumerate() {
        let frame = match message_frame(message) {
            Some(frame) => frame,
            None => continue,
        };
        if !client.try_send_frame(frame).await {
            warn!("Link dropped mid-drain; keeping the remainder queued");
            client
                .buffer
                .lock()
                .await
                .restore(Vec::new(), messages[index..].to_vec());
            return;
        }
    }
}

async fn read_loop(client: &RelayClient, read: &mut WsSource) -> Result<()> {
    while let Some(message) = read.next().await {
        match message {
            Ok(WsMessage::Text(text)) => handle_text(client, &text),
            Ok(WsMessage::Close(_)) => {
                info!("Relay closed the connection");
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn handle_text(client: &RelayClient, text: &str) {
    // A bare EOL is the STOMP heartbeat.
    if text.trim().is_empty() {
        return;
    }
    match Frame::parse(text) {
        Ok(frame) => match frame.command.as_str() {
            commands::MESSAGE => client.dispatcher.publish(&frame.body),
            commands::ERROR => warn!("Relay error: {}", error_detail(&frame)),
            other => debug!("Ignoring {} frame from relay", other),
        },
        Err(e) => warn!("Undecodable relay frame: {}", e),
    }
}

fn error_detail(frame: &Frame) -> String {
    frame
        .header("message")
        .map(str::to_string)
        .unwrap_or_else(|| frame.body.clone())
}
