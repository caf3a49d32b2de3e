use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub type ItemId = Ulid;
pub type ContainerId = Ulid;

/// Position of an item within its container. Only the relative order matters.
pub type OrderKey = f64;

/// An orderable item. The payload is opaque to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Item<P> {
    pub id: ItemId,
    pub container_id: ContainerId,
    /// Cache of the item's sequence position, kept in agreement with
    /// `Container::item_ids` after every completed operation.
    pub order: OrderKey,
    pub payload: P,
}

/// A named ordered collection. The sequence is authoritative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub id: ContainerId,
    pub item_ids: Vec<ItemId>,
}

impl Container {
    pub fn new(id: ContainerId) -> Self {
        Self {
            id,
            item_ids: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.item_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }

    pub fn position(&self, item_id: &ItemId) -> Option<usize> {
        self.item_ids.iter().position(|id| id == item_id)
    }
}

/// A container/index pair: where an item sits, or where it would land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub container_id: ContainerId,
    pub index: usize,
}

impl Slot {
    pub fn new(container_id: ContainerId, index: usize) -> Self {
        Self {
            container_id,
            index,
        }
    }
}

/// Absolute order assignment for one item. This is the persistence record:
/// never a delta, so batches may land in any order and still be self-consistent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub id: ItemId,
    pub order: OrderKey,
    pub container_id: ContainerId,
}

/// Initial state of one container as fetched from storage. Items may arrive
/// in any order; hydration sorts them by `order`.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSnapshot<P> {
    pub id: ContainerId,
    pub items: Vec<SnapshotItem<P>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotItem<P> {
    pub id: ItemId,
    pub order: OrderKey,
    pub payload: P,
}

/// Notifications published after the engine changes something.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoardEvent {
    Reordered {
        container_id: ContainerId,
        item_ids: Vec<ItemId>,
    },
    MovedAcross {
        item_id: ItemId,
        from_container_id: ContainerId,
        to_container_id: ContainerId,
        new_index: usize,
    },
    ResizeCommitted {
        item_id: ItemId,
        end: NaiveTime,
    },
    Rescheduled {
        item_id: ItemId,
        start: NaiveTime,
        end: NaiveTime,
    },
    PersistFailed {
        ticket: u64,
        item_ids: Vec<ItemId>,
        error: String,
    },
    RolledBack {
        ticket: u64,
        container_ids: Vec<ContainerId>,
    },
}

impl BoardEvent {
    /// Containers whose subscribers should receive this event.
    pub fn container_ids(&self) -> Vec<ContainerId> {
        match self {
            BoardEvent::Reordered { container_id, .. } => vec![*container_id],
            BoardEvent::MovedAcross {
                from_container_id,
                to_container_id,
                ..
            } => vec![*from_container_id, *to_container_id],
            BoardEvent::RolledBack { container_ids, .. } => container_ids.clone(),
            BoardEvent::ResizeCommitted { .. }
            | BoardEvent::Rescheduled { .. }
            | BoardEvent::PersistFailed { .. } => Vec::new(),
        }
    }
}

/// The journal record: one persisted batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBatch {
    pub updates: Vec<OrderUpdate>,
}
