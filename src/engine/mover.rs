use std::ops::Range;

use crate::limits::*;
use crate::model::*;
use crate::order::{self, RenormalizePolicy};

use super::store::{Board, Checkpoint};
use super::BoardError;

/// The logical change a move performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Nothing moved (`from == to`).
    Noop,
    Within {
        container_id: ContainerId,
        from_index: usize,
        to_index: usize,
    },
    Across {
        item_id: ItemId,
        from_container_id: ContainerId,
        to_container_id: ContainerId,
        to_index: usize,
    },
}

/// Result of a completed move.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub change: Change,
    /// Exactly the items whose order or container changed.
    pub updates: Vec<OrderUpdate>,
    /// Affected containers before and after the move.
    pub before: Checkpoint,
    pub after: Checkpoint,
    /// Renumbering rewrote a key outside the slots the move itself
    /// shifted, i.e. the container's keys were not already dense.
    pub renormalized: bool,
}

impl Applied {
    pub fn noop() -> Self {
        Self {
            change: Change::Noop,
            updates: Vec::new(),
            before: Checkpoint::default(),
            after: Checkpoint::default(),
            renormalized: false,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.change == Change::Noop
    }
}

impl<P> Board<P> {
    /// Array-move within one container: remove at `from_index`, reinsert at
    /// `to_index` of the shortened sequence (clamped to its last slot).
    pub fn move_within_container(
        &mut self,
        container_id: ContainerId,
        from_index: usize,
        to_index: usize,
    ) -> Result<Applied, BoardError> {
        let container = self
            .containers
            .get(&container_id)
            .ok_or(BoardError::UnknownContainer(container_id))?;
        let len = container.len();
        if from_index >= len {
            return Err(BoardError::IndexOutOfRange {
                container_id,
                index: from_index,
                len,
            });
        }
        let to_index = to_index.min(len - 1);
        if from_index == to_index {
            return Ok(Applied::noop());
        }

        let before = self.checkpoint(&[container_id]);
        let moved = {
            let seq = &mut self
                .containers
                .get_mut(&container_id)
                .ok_or(BoardError::UnknownContainer(container_id))?
                .item_ids;
            let id = seq.remove(from_index);
            seq.insert(to_index, id);
            id
        };
        let shifted = from_index.min(to_index)..from_index.max(to_index) + 1;
        let renormalized = self.rekey(container_id, Some(moved), shifted);

        self.finish(
            Change::Within {
                container_id,
                from_index,
                to_index,
            },
            before,
            &[container_id],
            renormalized,
        )
    }

    /// Move an item into another container at `to_index`, clamped to
    /// `[0, destination length]`. Moving "across" into the item's own
    /// container is a within-container move.
    pub fn move_across_containers(
        &mut self,
        item_id: ItemId,
        from_container_id: ContainerId,
        to_container_id: ContainerId,
        to_index: usize,
    ) -> Result<Applied, BoardError> {
        let item = self
            .items
            .get(&item_id)
            .ok_or(BoardError::UnknownItem(item_id))?;
        let source = self
            .containers
            .get(&from_container_id)
            .ok_or(BoardError::UnknownContainer(from_container_id))?;
        let dest_len = self
            .containers
            .get(&to_container_id)
            .ok_or(BoardError::UnknownContainer(to_container_id))?
            .len();
        if item.container_id != from_container_id {
            return Err(BoardError::NotInContainer {
                item_id,
                container_id: from_container_id,
            });
        }
        let from_index = source.position(&item_id).ok_or_else(|| {
            BoardError::InvariantViolated(format!(
                "item {item_id} claims container {from_container_id} but is not in its sequence"
            ))
        })?;

        if from_container_id == to_container_id {
            return self.move_within_container(from_container_id, from_index, to_index);
        }
        if dest_len >= MAX_ITEMS_PER_CONTAINER {
            return Err(BoardError::LimitExceeded("too many items in container"));
        }
        let to_index = to_index.min(dest_len);

        let affected = [from_container_id, to_container_id];
        let before = self.checkpoint(&affected);
        if let Some(source) = self.containers.get_mut(&from_container_id) {
            source.item_ids.remove(from_index);
        }
        if let Some(dest) = self.containers.get_mut(&to_container_id) {
            dest.item_ids.insert(to_index, item_id);
        }
        if let Some(item) = self.items.get_mut(&item_id) {
            item.container_id = to_container_id;
        }
        let source_rekeyed = self.rekey(from_container_id, None, from_index..usize::MAX);
        let dest_rekeyed = self.rekey(to_container_id, Some(item_id), to_index..usize::MAX);

        self.finish(
            Change::Across {
                item_id,
                from_container_id,
                to_container_id,
                to_index,
            },
            before,
            &affected,
            source_rekeyed || dest_rekeyed,
        )
    }

    /// Recompute keys of a container after its sequence changed. `moved` is
    /// the item that was just inserted, if it belongs to this container, and
    /// `shifted` the positions the move displaced. Returns whether keys had
    /// to be rewritten beyond what the move itself implies.
    fn rekey(
        &mut self,
        container_id: ContainerId,
        moved: Option<ItemId>,
        shifted: Range<usize>,
    ) -> bool {
        match self.policy {
            RenormalizePolicy::OnEveryMove => {
                let prior = self.keys_of(container_id);
                self.renormalize(container_id);
                prior
                    .iter()
                    .zip(self.keys_of(container_id))
                    .enumerate()
                    .any(|(i, (old, new))| !shifted.contains(&i) && *old != new)
            }
            RenormalizePolicy::OnGapExhausted => {
                if let Some(moved) = moved
                    && let Some(container) = self.containers.get(&container_id)
                    && let Some(pos) = container.position(&moved)
                {
                    let neighbors: Vec<OrderKey> = container
                        .item_ids
                        .iter()
                        .filter(|id| **id != moved)
                        .map(|id| self.items[id].order)
                        .collect();
                    let key = order::assign(&neighbors, pos);
                    if let Some(item) = self.items.get_mut(&moved) {
                        item.order = key;
                    }
                }
                if order::needs_renormalize(&self.keys_of(container_id)) {
                    self.renormalize(container_id);
                    true
                } else {
                    false
                }
            }
        }
    }

    fn finish(
        &self,
        change: Change,
        before: Checkpoint,
        affected: &[ContainerId],
        renormalized: bool,
    ) -> Result<Applied, BoardError> {
        debug_assert!(
            self.check_invariants().is_ok(),
            "board invariants broken after {change:?}"
        );
        Ok(Applied {
            change,
            updates: self.changed_since(&before),
            before,
            after: self.checkpoint(affected),
            renormalized,
        })
    }
}
