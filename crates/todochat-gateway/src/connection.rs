use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, trace, warn};

use crate::registry::{ChannelId, Registry};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Lifecycle of one websocket subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgrade requested, handshake not yet complete.
    Pending,
    /// Handshake done and registered for broadcasts.
    Connected,
    /// Closed for good. A reconnect is a new channel.
    Disconnected,
}

impl ConnectionState {
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Pending, Connected) | (Pending, Disconnected) | (Connected, Disconnected)
        )
    }

    /// Move to `next` if allowed. Returns whether the state changed.
    pub fn advance(&mut self, next: ConnectionState) -> bool {
        if self.can_transition_to(next) {
            *self = next;
            true
        } else {
            warn!("Rejected connection state change {:?} -> {:?}", self, next);
            false
        }
    }
}

/// Drive one upgraded websocket until it closes.
///
/// The socket is registered for broadcasts for as long as it is connected.
/// Client frames carry no meaning and are only read to notice disconnects.
pub async fn handle_connection(socket: WebSocket, registry: Registry) {
    let mut state = ConnectionState::Pending;
    state.advance(ConnectionState::Connected);

    let mut subscriber = registry.register().await;
    let channel_id: ChannelId = subscriber.id();
    info!("Channel {} connected ({} live)", channel_id, registry.len().await);

    let (mut sender, mut receiver) = socket.split();

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Forward broadcast payloads -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                frame = subscriber.recv() => {
                    let Some(text) = frame else {
                        // Registry let go of us (shutdown)
                        let _ = sender.send(Message::Close(None)).await;
                        break;
                    };
                    if let Err(e) = sender.send(Message::Text(text.into())).await {
                        debug!("Channel {} write failed: {}", channel_id, e);
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Channel {} heartbeat timeout (missed {} pongs), dropping connection", channel_id, missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Default::default())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Drain client frames to detect close / read errors
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Pong(_)) => pong_flag_recv.store(true, Ordering::Release),
                Ok(Message::Close(_)) => break,
                Ok(other) => trace!("Channel {} ignoring client frame {:?}", channel_id, other),
                Err(e) => {
                    debug!("Channel {} read failed: {}", channel_id, e);
                    break;
                }
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    registry.unregister(channel_id).await;
    state.advance(ConnectionState::Disconnected);
    info!("Channel {} disconnected ({} live)", channel_id, registry.len().await);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_moves_forward_only() {
        let mut state = ConnectionState::Pending;
        assert!(state.advance(ConnectionState::Connected));
        assert!(!state.advance(ConnectionState::Pending));
        assert!(state.advance(ConnectionState::Disconnected));
        assert!(!state.advance(ConnectionState::Connected));
        assert_eq!(state, ConnectionState::Disconnected);
    }

    #[test]
    fn failed_handshake_goes_straight_to_disconnected() {
        let mut state = ConnectionState::Pending;
        assert!(state.advance(ConnectionState::Disconnected));
        assert!(!state.can_transition_to(ConnectionState::Connected));
    }
}
