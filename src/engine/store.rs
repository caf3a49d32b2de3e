use std::collections::{HashMap, HashSet};

use crate::limits::*;
use crate::model::*;
use crate::order::{self, RenormalizePolicy};

use super::BoardError;

/// The container model: an arena of items keyed by id plus containers holding
/// ordered id lists into that arena. Items and containers are created and
/// destroyed only through the CRUD methods below; the move operations in
/// `mover.rs` never add or drop an id.
#[derive(Debug, Clone, PartialEq)]
pub struct Board<P> {
    pub(super) items: HashMap<ItemId, Item<P>>,
    pub(super) containers: HashMap<ContainerId, Container>,
    /// Containers in display order. Keyboard left/right moves follow it.
    pub(super) document_order: Vec<ContainerId>,
    pub(super) policy: RenormalizePolicy,
}

/// Sequences and keys of a set of containers at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Checkpoint {
    pub containers: Vec<(ContainerId, Vec<(ItemId, OrderKey)>)>,
}

impl Checkpoint {
    pub fn container_ids(&self) -> Vec<ContainerId> {
        self.containers.iter().map(|(id, _)| *id).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }
}

impl<P> Default for Board<P> {
    fn default() -> Self {
        Self::new(RenormalizePolicy::default())
    }
}

impl<P> Board<P> {
    pub fn new(policy: RenormalizePolicy) -> Self {
        Self {
            items: HashMap::new(),
            containers: HashMap::new(),
            document_order: Vec::new(),
            policy,
        }
    }

    /// Build a board from fetched container snapshots, in the order given.
    pub fn from_snapshots(
        snapshots: impl IntoIterator<Item = ContainerSnapshot<P>>,
        policy: RenormalizePolicy,
    ) -> Result<Self, BoardError> {
        let mut board = Self::new(policy);
        for snapshot in snapshots {
            board.hydrate(snapshot)?;
        }
        Ok(board)
    }

    // ── Containers ───────────────────────────────────────────

    pub fn add_container(&mut self, id: ContainerId) -> Result<(), BoardError> {
        if self.containers.len() >= MAX_CONTAINERS {
            return Err(BoardError::LimitExceeded("too many containers"));
        }
        if self.containers.contains_key(&id) {
            return Err(BoardError::DuplicateContainer(id));
        }
        self.containers.insert(id, Container::new(id));
        self.document_order.push(id);
        Ok(())
    }

    /// Remove a container and every item in it, returning the items in
    /// sequence order.
    pub fn remove_container(&mut self, id: ContainerId) -> Result<Vec<Item<P>>, BoardError> {
        let container = self
            .containers
            .remove(&id)
            .ok_or(BoardError::UnknownContainer(id))?;
        self.document_order.retain(|c| c != &id);
        Ok(container
            .item_ids
            .iter()
            .filter_map(|item_id| self.items.remove(item_id))
            .collect())
    }

    /// Hydrate one container from storage. Items are sorted by their stored
    /// order; a stored order that is not strictly increasing is rewritten.
    pub fn hydrate(&mut self, snapshot: ContainerSnapshot<P>) -> Result<(), BoardError> {
        let ContainerSnapshot { id, mut items } = snapshot;
        if items.len() > MAX_ITEMS_PER_CONTAINER {
            return Err(BoardError::LimitExceeded("too many items in container"));
        }
        let mut seen = HashSet::with_capacity(items.len());
        for item in &items {
            if self.items.contains_key(&item.id) || !seen.insert(item.id) {
                return Err(BoardError::DuplicateItem(item.id));
            }
        }
        self.add_container(id)?;

        items.sort_by(|a, b| a.order.total_cmp(&b.order));
        let keys: Vec<OrderKey> = items.iter().map(|i| i.order).collect();
        let rewrite = order::needs_renormalize(&keys);

        let container = self
            .containers
            .get_mut(&id)
            .ok_or(BoardError::UnknownContainer(id))?;
        for (index, item) in items.into_iter().enumerate() {
            container.item_ids.push(item.id);
            let order = if rewrite { index as OrderKey } else { item.order };
            self.items.insert(
                item.id,
                Item {
                    id: item.id,
                    container_id: id,
                    order,
                    payload: item.payload,
                },
            );
        }
        if rewrite {
            tracing::debug!("hydrate {id}: stored order not strictly increasing, renormalized");
        }
        Ok(())
    }

    // ── Items ────────────────────────────────────────────────

    /// Insert a new item at `index` (clamped to the container length).
    /// Returns the order updates the caller should store: the new item, plus
    /// any neighbors rewritten because the key space ran out.
    pub fn insert_item(
        &mut self,
        container_id: ContainerId,
        index: usize,
        id: ItemId,
        payload: P,
    ) -> Result<Vec<OrderUpdate>, BoardError> {
        if self.items.contains_key(&id) {
            return Err(BoardError::DuplicateItem(id));
        }
        let container = self
            .containers
            .get(&container_id)
            .ok_or(BoardError::UnknownContainer(container_id))?;
        if container.len() >= MAX_ITEMS_PER_CONTAINER {
            return Err(BoardError::LimitExceeded("too many items in container"));
        }

        let before = self.checkpoint(&[container_id]);
        let index = index.min(container.len());
        let keys = self.keys_of(container_id);
        let order = order::assign(&keys, index);

        self.items.insert(
            id,
            Item {
                id,
                container_id,
                order,
                payload,
            },
        );
        if let Some(container) = self.containers.get_mut(&container_id) {
            container.item_ids.insert(index, id);
        }
        if order::needs_renormalize(&self.keys_of(container_id)) {
            self.renormalize(container_id);
        }
        Ok(self.changed_since(&before))
    }

    /// Remove an item. The remaining keys stay strictly increasing, so no
    /// other item changes.
    pub fn remove_item(&mut self, id: ItemId) -> Result<Item<P>, BoardError> {
        let item = self.items.remove(&id).ok_or(BoardError::UnknownItem(id))?;
        if let Some(container) = self.containers.get_mut(&item.container_id) {
            container.item_ids.retain(|i| i != &id);
        }
        Ok(item)
    }

    pub fn payload_mut(&mut self, id: ItemId) -> Result<&mut P, BoardError> {
        self.items
            .get_mut(&id)
            .map(|item| &mut item.payload)
            .ok_or(BoardError::UnknownItem(id))
    }

    // ── Checkpoints ──────────────────────────────────────────

    /// Capture sequences and keys of `container_ids`. Unknown ids are skipped.
    pub fn checkpoint(&self, container_ids: &[ContainerId]) -> Checkpoint {
        let containers = container_ids
            .iter()
            .filter_map(|cid| self.containers.get(cid))
            .map(|c| {
                let entries = c
                    .item_ids
                    .iter()
                    .map(|id| (*id, self.items[id].order))
                    .collect();
                (c.id, entries)
            })
            .collect();
        Checkpoint { containers }
    }

    /// Put the checkpointed containers back exactly as captured. The
    /// checkpoint must cover the same items those containers hold now.
    pub fn restore(&mut self, checkpoint: &Checkpoint) -> Result<(), BoardError> {
        let mut current = HashSet::new();
        let mut captured = HashSet::new();
        for (cid, entries) in &checkpoint.containers {
            let container = self
                .containers
                .get(cid)
                .ok_or(BoardError::UnknownContainer(*cid))?;
            current.extend(container.item_ids.iter().copied());
            captured.extend(entries.iter().map(|(id, _)| *id));
        }
        if current != captured {
            return Err(BoardError::InvariantViolated(
                "checkpoint does not cover the items currently in its containers".into(),
            ));
        }

        for (cid, entries) in &checkpoint.containers {
            for (id, order) in entries {
                if let Some(item) = self.items.get_mut(id) {
                    item.order = *order;
                    item.container_id = *cid;
                }
            }
            if let Some(container) = self.containers.get_mut(cid) {
                container.item_ids = entries.iter().map(|(id, _)| *id).collect();
            }
        }
        Ok(())
    }

    // ── Key helpers ──────────────────────────────────────────

    /// Keys of a container in sequence order.
    pub(super) fn keys_of(&self, container_id: ContainerId) -> Vec<OrderKey> {
        self.containers
            .get(&container_id)
            .map(|c| c.item_ids.iter().map(|id| self.items[id].order).collect())
            .unwrap_or_default()
    }

    pub(super) fn renormalize(&mut self, container_id: ContainerId) {
        let Some(container) = self.containers.get(&container_id) else {
            return;
        };
        for (id, key) in container.item_ids.iter().zip(order::normalize(container.len())) {
            if let Some(item) = self.items.get_mut(id) {
                item.order = key;
            }
        }
    }

    /// Items in the checkpointed containers whose key or container differs
    /// from the checkpoint, in sequence order.
    pub(super) fn changed_since(&self, before: &Checkpoint) -> Vec<OrderUpdate> {
        let prior: HashMap<ItemId, (ContainerId, OrderKey)> = before
            .containers
            .iter()
            .flat_map(|(cid, entries)| entries.iter().map(move |(id, order)| (*id, (*cid, *order))))
            .collect();

        let mut updates = Vec::new();
        for cid in before.container_ids() {
            let Some(container) = self.containers.get(&cid) else {
                continue;
            };
            for id in &container.item_ids {
                let item = &self.items[id];
                let unchanged = prior
                    .get(id)
                    .is_some_and(|(pc, po)| *pc == item.container_id && *po == item.order);
                if !unchanged {
                    updates.push(OrderUpdate {
                        id: *id,
                        order: item.order,
                        container_id: item.container_id,
                    });
                }
            }
        }
        updates
    }
}
