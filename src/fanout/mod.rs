pub mod ws;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::model::{ChannelTag, ProgressEvent};

const SUBSCRIBER_BUFFER: usize = 64;

/// One connected client's outbound half. The same `tx`/`id` pair is shared
/// across every channel set the client belongs to, so disconnecting it from
/// one channel never touches its membership in another.
#[derive(Clone)]
pub struct Subscriber {
    pub id: Uuid,
    tx: mpsc::Sender<ProgressEvent>,
}

/// Fan-out bus for backup/restore progress, server health, logs, and other
/// broadcast events. Maintains a channel-tag -> subscriber-set mapping and a
/// user-id -> subscriber-set mapping. Publishing never blocks on a slow
/// subscriber: a full channel just drops that event for that subscriber, and
/// subscribers whose receiver has gone away are swept out on the next send.
#[derive(Clone, Default)]
pub struct FanOutBus {
    channels: Arc<RwLock<HashMap<ChannelTag, Vec<Subscriber>>>>,
    users: Arc<RwLock<HashMap<String, Vec<Subscriber>>>>,
}

impl FanOutBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a subscriber identity and its receiving half without joining
    /// any channel yet. Used by the WebSocket handler, which starts a
    /// connection with no channel membership until the client sends a
    /// `subscribe` control frame.
    pub fn connect_detached(&self) -> (Subscriber, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        (Subscriber { id: Uuid::new_v4(), tx }, rx)
    }

    /// Accepts a new connection onto `channel` (and, if given, the user's
    /// subscriber set), returning its identity and the receiving half it
    /// should poll.
    pub async fn connect(&self, channel: ChannelTag, user_id: Option<&str>) -> (Subscriber, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let subscriber = Subscriber { id: Uuid::new_v4(), tx };
        self.channels.write().await.entry(channel).or_default().push(subscriber.clone());
        if let Some(user_id) = user_id {
            self.users.write().await.entry(user_id.to_string()).or_default().push(subscriber.clone());
        }
        (subscriber, rx)
    }

    /// Moves an already-connected subscriber onto an additional channel,
    /// without opening a new receiver. Idempotent.
    pub async fn subscribe(&self, subscriber: &Subscriber, channel: ChannelTag) {
        let mut channels = self.channels.write().await;
        let set = channels.entry(channel).or_default();
        if !set.iter().any(|s| s.id == subscriber.id) {
            set.push(subscriber.clone());
        }
    }

    /// Removes a subscriber from one channel set. Idempotent.
    pub async fn unsubscribe(&self, subscriber: &Subscriber, channel: ChannelTag) {
        if let Some(set) = self.channels.write().await.get_mut(&channel) {
            set.retain(|s| s.id != subscriber.id);
        }
    }

    /// Removes a subscriber from every channel and user set it belongs to.
    /// Called once a connection closes.
    pub async fn disconnect(&self, subscriber: &Subscriber) {
        let mut channels = self.channels.write().await;
        for set in channels.values_mut() {
            set.retain(|s| s.id != subscriber.id);
        }
        channels.retain(|_, set| !set.is_empty());
        drop(channels);

        let mut users = self.users.write().await;
        for set in users.values_mut() {
            set.retain(|s| s.id != subscriber.id);
        }
        users.retain(|_, set| !set.is_empty());
    }

    /// Broadcasts to every subscriber on the event's own channel tag, and
    /// additionally to `All` when the event's tag isn't already `All` — a
    /// client subscribed to `all` sees everything regardless of its tag.
    pub async fn publish(&self, event: ProgressEvent) {
        let tag = event.channel_tag();
        self.broadcast(&event, tag).await;
        if tag != ChannelTag::All {
            self.broadcast(&event, ChannelTag::All).await;
        }
    }

    async fn broadcast(&self, event: &ProgressEvent, channel: ChannelTag) {
        let mut channels = self.channels.write().await;
        if let Some(subscribers) = channels.get_mut(&channel) {
            subscribers.retain(|s| s.tx.try_send(event.clone()).is_ok() || !s.tx.is_closed());
            if subscribers.is_empty() {
                channels.remove(&channel);
            }
        }
    }

    pub async fn broadcast_to_user(&self, event: ProgressEvent, user_id: &str) {
        let mut users = self.users.write().await;
        if let Some(subscribers) = users.get_mut(user_id) {
            subscribers.retain(|s| s.tx.try_send(event.clone()).is_ok() || !s.tx.is_closed());
            if subscribers.is_empty() {
                users.remove(user_id);
            }
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.channels.read().await.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn started(backup_id: Uuid) -> ProgressEvent {
        ProgressEvent::Started {
            backup_id,
            server_id: Uuid::new_v4(),
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn publish_reaches_subscriber_on_its_own_channel() {
        let bus = FanOutBus::new();
        let (_subscriber, mut rx) = bus.connect(ChannelTag::Backups, None).await;

        bus.publish(started(Uuid::new_v4())).await;

        let event = rx.recv().await.expect("event delivered");
        assert_eq!(event.channel_tag(), ChannelTag::Backups);
    }

    #[tokio::test]
    async fn all_channel_subscriber_receives_scoped_events_too() {
        let bus = FanOutBus::new();
        let (_subscriber, mut rx) = bus.connect(ChannelTag::All, None).await;

        bus.publish(started(Uuid::new_v4())).await;

        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery_without_touching_other_channels() {
        let bus = FanOutBus::new();
        let (subscriber, mut rx) = bus.connect(ChannelTag::Backups, None).await;
        bus.subscribe(&subscriber, ChannelTag::Servers).await;
        bus.unsubscribe(&subscriber, ChannelTag::Backups).await;

        bus.publish(started(Uuid::new_v4())).await;
        assert!(rx.try_recv().is_err());

        bus.publish(ProgressEvent::ServerHealth {
            server_id: Uuid::new_v4(),
            state: crate::model::HealthState::Healthy,
            message: "ok".to_string(),
            at: Utc::now(),
        })
        .await;
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn broadcast_to_user_only_reaches_that_users_subscribers() {
        let bus = FanOutBus::new();
        let (_a, mut rx_a) = bus.connect(ChannelTag::All, Some("user-a")).await;
        let (_b, mut rx_b) = bus.connect(ChannelTag::All, Some("user-b")).await;

        bus.broadcast_to_user(
            ProgressEvent::Notification { message: "hi".to_string(), at: Utc::now() },
            "user-a",
        )
        .await;

        assert!(rx_a.recv().await.is_some());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_receiver_is_swept_on_next_publish() {
        let bus = FanOutBus::new();
        let (_subscriber, rx) = bus.connect(ChannelTag::Backups, None).await;
        drop(rx);

        bus.publish(started(Uuid::new_v4())).await;

        assert_eq!(bus.subscriber_count().await, 0);
    }
}
