use dashmap::DashMap;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::BoardEvent;

const CHANNEL_CAPACITY: usize = 256;

/// Broadcast hub for board events: one channel per container plus a
/// firehose that sees everything (resize commits and persistence failures
/// only go there).
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<BoardEvent>>,
    all: broadcast::Sender<BoardEvent>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            all: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Subscribe to events touching one container. Creates the channel if needed.
    pub fn subscribe(&self, container_id: Ulid) -> broadcast::Receiver<BoardEvent> {
        let sender = self
            .channels
            .entry(container_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    pub fn subscribe_all(&self) -> broadcast::Receiver<BoardEvent> {
        self.all.subscribe()
    }

    /// Publish an event. No-op for channels nobody is listening on.
    pub fn send(&self, event: &BoardEvent) {
        for container_id in event.container_ids() {
            if let Some(sender) = self.channels.get(&container_id) {
                let _ = sender.send(event.clone());
            }
        }
        let _ = self.all.send(event.clone());
    }

    /// Remove a container's channel (e.g. when the container is deleted).
    pub fn remove(&self, container_id: &Ulid) {
        self.channels.remove(container_id);
    }
}
