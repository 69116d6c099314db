//! In-memory event bus implementation using tokio broadcast channels.
//!
//! Events are only broadcast within a single process.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use geogate_events::{EventBus, EventBusError, EventStream, InvitationEvent};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

const CHANNEL_CAPACITY: usize = 100;
const FIREHOSE_CAPACITY: usize = 1024;

/// In-memory event bus: one channel per invitation number plus a firehose.
pub struct MemoryEventBus {
    channels: Arc<DashMap<String, broadcast::Sender<InvitationEvent>>>,
    firehose: broadcast::Sender<InvitationEvent>,
}

impl MemoryEventBus {
    pub fn new() -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            firehose: broadcast::channel(FIREHOSE_CAPACITY).0,
        }
    }

    fn get_or_create_channel(&self, number: &str) -> broadcast::Sender<InvitationEvent> {
        self.channels
            .entry(number.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for MemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn into_stream(rx: broadcast::Receiver<InvitationEvent>) -> EventStream {
    // Lagged receivers skip what they missed.
    Box::pin(BroadcastStream::new(rx).filter_map(|result| result.ok()))
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(&self, event: InvitationEvent) -> Result<(), EventBusError> {
        if let Some(tx) = self.channels.get(&event.invitation_number) {
            let _ = tx.send(event.clone());
        }
        let _ = self.firehose.send(event);
        Ok(())
    }

    async fn subscribe_all(&self) -> Result<EventStream, EventBusError> {
        Ok(into_stream(self.firehose.subscribe()))
    }

    async fn subscribe(&self, invitation_number: &str) -> Result<EventStream, EventBusError> {
        let tx = self.get_or_create_channel(invitation_number);
        Ok(into_stream(tx.subscribe()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use futures::StreamExt;
    use geogate_events::EventKind;
    use geogate_storage::InvitationStatus;
    use std::time::Duration;

    fn event(number: &str) -> InvitationEvent {
        InvitationEvent::new(
            number,
            EventKind::StatusChanged {
                from: InvitationStatus::Created,
                to: InvitationStatus::Sent,
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn publish_and_subscribe() {
        let bus = MemoryEventBus::new();
        let mut stream = bus.subscribe("HTL-000001").await.unwrap();

        bus.publish(event("HTL-000001")).await.unwrap();

        let received = tokio::time::timeout(Duration::from_millis(100), stream.next())
            .await
            .expect("timeout")
            .expect("stream ended");
        assert_eq!(received.invitation_number, "HTL-000001");
    }

    #[tokio::test]
    async fn firehose_sees_every_invitation() {
        let bus = MemoryEventBus::new();
        let mut all = bus.subscribe_all().await.unwrap();

        bus.publish(event("HTL-000001")).await.unwrap();
        bus.publish(event("RST-000001")).await.unwrap();

        assert_eq!(all.next().await.unwrap().invitation_number, "HTL-000001");
        assert_eq!(all.next().await.unwrap().invitation_number, "RST-000001");
    }

    #[tokio::test]
    async fn per_invitation_streams_are_isolated() {
        let bus = MemoryEventBus::new();
        let mut stream_a = bus.subscribe("HTL-000001").await.unwrap();

        bus.publish(event("HTL-000002")).await.unwrap();
        bus.publish(event("HTL-000001")).await.unwrap();

        let received = tokio::time::timeout(Duration::from_millis(100), stream_a.next())
            .await
            .expect("timeout")
            .expect("stream ended");
        assert_eq!(received.invitation_number, "HTL-000001");
    }

    #[tokio::test]
    async fn publish_before_subscribe_is_lost() {
        let bus = MemoryEventBus::new();
        bus.publish(event("HTL-000001")).await.unwrap();

        let mut stream = bus.subscribe("HTL-000001").await.unwrap();
        let result = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(result.is_err(), "old event must not be replayed");
    }

    #[tokio::test]
    async fn publishing_does_not_create_channels() {
        let bus = MemoryEventBus::default();
        bus.publish(event("HTL-000001")).await.unwrap();
        assert!(bus.channels.is_empty());
    }
}
