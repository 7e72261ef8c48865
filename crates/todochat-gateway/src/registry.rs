use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use todochat_types::events::GatewayEvent;

/// Identifies one websocket subscription. A reconnecting client gets a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(Uuid);

impl ChannelId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Receiving half of a registered channel, owned by the connection task.
///
/// Dropping it makes the next delivery to this channel fail, which prunes it
/// from the registry.
pub struct Subscriber {
    id: ChannelId,
    rx: mpsc::UnboundedReceiver<String>,
}

impl Subscriber {
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Next payload, or `None` once the registry has let go of this channel.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

/// Result of a fan-out. Informational only; a broadcast never fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Live set of push-notification channels.
///
/// Constructed once at start-up and handed to whoever needs it; clones share
/// the same membership.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    channels: RwLock<HashMap<ChannelId, mpsc::UnboundedSender<String>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fresh channel to the live set.
    pub async fn register(&self) -> Subscriber {
        let id = ChannelId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.attach(id, tx).await;
        Subscriber { id, rx }
    }

    async fn attach(&self, id: ChannelId, tx: mpsc::UnboundedSender<String>) {
        self.inner.channels.write().await.insert(id, tx);
    }

    /// Remove a channel. Absent ids are ignored.
    pub async fn unregister(&self, id: ChannelId) {
        self.inner.channels.write().await.remove(&id);
    }

    /// Deliver `payload` to every channel present when the broadcast starts.
    ///
    /// Channels that fail to accept the payload are removed and the rest
    /// still get it. Channels registered or removed while delivery is in
    /// progress may or may not see this payload.
    pub async fn broadcast(&self, payload: &str) -> BroadcastReport {
        let snapshot: Vec<(ChannelId, mpsc::UnboundedSender<String>)> = self
            .inner
            .channels
            .read()
            .await
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut failed = Vec::new();
        for (id, tx) in &snapshot {
            if tx.send(payload.to_owned()).is_err() {
                debug!("Delivery to channel {} failed, dropping it", id);
                failed.push(*id);
            }
        }

        if !failed.is_empty() {
            let mut channels = self.inner.channels.write().await;
            for id in &failed {
                channels.remove(id);
            }
        }

        BroadcastReport {
            delivered: snapshot.len() - failed.len(),
            dropped: failed.len(),
        }
    }

    /// Best-effort notification of all subscribers.
    ///
    /// Serialization and delivery failures are logged and dropped; callers
    /// must not depend on anyone having received the event.
    pub async fn notify(&self, event: &GatewayEvent) {
        let payload = match event.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize {} event: {}", event.kind(), e);
                return;
            }
        };

        let report = self.broadcast(&payload).await;
        debug!(
            "Broadcast {} to {} channels ({} dropped)",
            event.kind(),
            report.delivered,
            report.dropped
        );
    }

    pub async fn len(&self) -> usize {
        self.inner.channels.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.channels.read().await.is_empty()
    }

    pub async fn contains(&self, id: ChannelId) -> bool {
        self.inner.channels.read().await.contains_key(&id)
    }

    /// Drop every channel. Subscribers see `recv()` return `None`, which ends
    /// their connection loops.
    pub async fn shutdown(&self) {
        let mut channels = self.inner.channels.write().await;
        let count = channels.len();
        channels.clear();
        debug!("Registry shut down, closed {} channels", count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_with_no_channels_succeeds() {
        let registry = Registry::new();
        let report = registry.broadcast("hello").await;
        assert_eq!(report, BroadcastReport { delivered: 0, dropped: 0 });
    }

    #[tokio::test]
    async fn failing_channel_is_pruned_and_others_still_receive() {
        let registry = Registry::new();
        let mut first = registry.register().await;
        let broken = registry.register().await;
        let mut third = registry.register().await;
        let broken_id = broken.id();
        drop(broken);

        let report = registry.broadcast("payload").await;
        assert_eq!(report, BroadcastReport { delivered: 2, dropped: 1 });

        assert_eq!(first.recv().await.as_deref(), Some("payload"));
        assert_eq!(third.recv().await.as_deref(), Some("payload"));
        assert!(!registry.contains(broken_id).await);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn broadcast_failing_everywhere_still_returns() {
        let registry = Registry::new();
        for _ in 0..3 {
            drop(registry.register().await);
        }

        let report = registry.broadcast("payload").await;
        assert_eq!(report.dropped, 3);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let registry = Registry::new();
        let sub = registry.register().await;

        registry.unregister(sub.id()).await;
        registry.unregister(sub.id()).await;
        registry.unregister(ChannelId::new()).await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn registered_channel_is_live_until_unregistered() {
        let registry = Registry::new();
        let mut sub = registry.register().await;
        assert!(registry.contains(sub.id()).await);

        registry.notify(&GatewayEvent::MessageCreated(todochat_types::api::MessageResponse {
            id: 1,
            conversation_id: 1,
            user_id: 1,
            text: "hi".into(),
            created_at: Default::default(),
        }))
        .await;
        assert!(sub.try_recv().unwrap().contains("\"conversation_id\":1"));

        registry.unregister(sub.id()).await;
        assert!(!registry.contains(sub.id()).await);
    }

    #[tokio::test]
    async fn attached_channel_receives() {
        let registry = Registry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.attach(ChannelId::new(), tx).await;

        registry.broadcast("one").await;
        assert_eq!(rx.recv().await.as_deref(), Some("one"));
    }

    #[tokio::test]
    async fn shutdown_closes_subscribers() {
        let registry = Registry::new();
        let mut sub = registry.register().await;

        registry.shutdown().await;
        assert!(registry.is_empty().await);
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_membership_changes_during_broadcast() {
        let registry = Registry::new();
        let mut stable = registry.register().await;

        let churn = {
            let registry = registry.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let sub = registry.register().await;
                    registry.unregister(sub.id()).await;
                }
            })
        };
        let sender = {
            let registry = registry.clone();
            tokio::spawn(async move {
                for i in 0..200 {
                    registry.broadcast(&i.to_string()).await;
                }
            })
        };
        churn.await.unwrap();
        sender.await.unwrap();

        let mut received = 0;
        while stable.try_recv().is_some() {
            received += 1;
        }
        assert_eq!(received, 200);
        assert_eq!(registry.len().await, 1);
    }
}
