use std::collections::HashSet;

use crate::model::*;
use crate::order::RenormalizePolicy;

use super::store::Board;
use super::BoardError;

impl<P> Board<P> {
    pub fn policy(&self) -> RenormalizePolicy {
        self.policy
    }

    pub fn item(&self, id: &ItemId) -> Option<&Item<P>> {
        self.items.get(id)
    }

    pub fn container(&self, id: &ContainerId) -> Option<&Container> {
        self.containers.get(id)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Containers in display order.
    pub fn container_ids(&self) -> &[ContainerId] {
        &self.document_order
    }

    pub fn sequence(&self, container_id: &ContainerId) -> Result<&[ItemId], BoardError> {
        self.containers
            .get(container_id)
            .map(|c| c.item_ids.as_slice())
            .ok_or(BoardError::UnknownContainer(*container_id))
    }

    pub fn orders(&self, container_id: &ContainerId) -> Result<Vec<OrderKey>, BoardError> {
        if !self.containers.contains_key(container_id) {
            return Err(BoardError::UnknownContainer(*container_id));
        }
        Ok(self.keys_of(*container_id))
    }

    /// Items of a container in sequence order.
    pub fn items_in(&self, container_id: &ContainerId) -> Result<Vec<&Item<P>>, BoardError> {
        Ok(self
            .sequence(container_id)?
            .iter()
            .filter_map(|id| self.items.get(id))
            .collect())
    }

    pub fn position_of(&self, item_id: &ItemId) -> Result<Slot, BoardError> {
        let item = self
            .items
            .get(item_id)
            .ok_or(BoardError::UnknownItem(*item_id))?;
        let index = self
            .containers
            .get(&item.container_id)
            .and_then(|c| c.position(item_id))
            .ok_or_else(|| {
                BoardError::InvariantViolated(format!("item {item_id} missing from its container"))
            })?;
        Ok(Slot::new(item.container_id, index))
    }

    /// The container `offset` steps away in display order, if any.
    pub fn adjacent_container(&self, container_id: &ContainerId, offset: isize) -> Option<ContainerId> {
        let pos = self.document_order.iter().position(|c| c == container_id)?;
        let target = pos.checked_add_signed(offset)?;
        self.document_order.get(target).copied()
    }

    /// Verify the total-order invariants:
    /// every item sits in exactly one container, that container's sequence
    /// agrees with the item's `container_id`, and keys strictly increase.
    pub fn check_invariants(&self) -> Result<(), BoardError> {
        let mut seen = HashSet::with_capacity(self.items.len());
        for container in self.containers.values() {
            let mut prev: Option<OrderKey> = None;
            for id in &container.item_ids {
                if !seen.insert(*id) {
                    return Err(BoardError::InvariantViolated(format!(
                        "item {id} appears more than once"
                    )));
                }
                let item = self.items.get(id).ok_or_else(|| {
                    BoardError::InvariantViolated(format!("sequence references missing item {id}"))
                })?;
                if item.container_id != container.id {
                    return Err(BoardError::InvariantViolated(format!(
                        "item {id} listed in {} but claims {}",
                        container.id, item.container_id
                    )));
                }
                if let Some(p) = prev
                    && item.order <= p
                {
                    return Err(BoardError::InvariantViolated(format!(
                        "order not strictly increasing at item {id} in {}",
                        container.id
                    )));
                }
                prev = Some(item.order);
            }
        }
        if seen.len() != self.items.len() {
            return Err(BoardError::InvariantViolated(format!(
                "{} items not in any container",
                self.items.len() - seen.len()
            )));
        }
        Ok(())
    }
}
