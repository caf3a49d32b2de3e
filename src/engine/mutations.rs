use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::model::*;
use crate::observability::{self, change_label};
use crate::persist::WritePolicy;

use super::{Applied, BoardError, Change, Engine, PendingWrite, PersistReport};

impl<P> Engine<P> {
    /// Reorder within one container, then persist and notify.
    pub fn move_within(
        &mut self,
        container_id: ContainerId,
        from_index: usize,
        to_index: usize,
    ) -> Result<Applied, BoardError> {
        let applied = self
            .board
            .move_within_container(container_id, from_index, to_index)?;
        self.dispatch(&applied);
        Ok(applied)
    }

    /// Move an item to another container, then persist and notify.
    pub fn move_across(
        &mut self,
        item_id: ItemId,
        from_container_id: ContainerId,
        to_container_id: ContainerId,
        to_index: usize,
    ) -> Result<Applied, BoardError> {
        let applied = self.board.move_across_containers(
            item_id,
            from_container_id,
            to_container_id,
            to_index,
        )?;
        self.dispatch(&applied);
        Ok(applied)
    }

    // ── Keyboard ─────────────────────────────────────────────

    /// One slot earlier. No-op at the top.
    pub fn move_up(&mut self, item_id: ItemId) -> Result<Applied, BoardError> {
        let slot = self.board.position_of(&item_id)?;
        if slot.index == 0 {
            return Ok(Applied::noop());
        }
        self.move_within(slot.container_id, slot.index, slot.index - 1)
    }

    /// One slot later. No-op at the bottom.
    pub fn move_down(&mut self, item_id: ItemId) -> Result<Applied, BoardError> {
        let slot = self.board.position_of(&item_id)?;
        self.move_within(slot.container_id, slot.index, slot.index + 1)
    }

    /// Same index in the previous container. No-op in the first one.
    pub fn move_left(&mut self, item_id: ItemId) -> Result<Applied, BoardError> {
        self.move_sideways(item_id, -1)
    }

    /// Same index in the next container. No-op in the last one.
    pub fn move_right(&mut self, item_id: ItemId) -> Result<Applied, BoardError> {
        self.move_sideways(item_id, 1)
    }

    fn move_sideways(&mut self, item_id: ItemId, offset: isize) -> Result<Applied, BoardError> {
        let slot = self.board.position_of(&item_id)?;
        let Some(target) = self.board.adjacent_container(&slot.container_id, offset) else {
            return Ok(Applied::noop());
        };
        self.move_across(item_id, slot.container_id, target, slot.index)
    }

    // ── Dispatch ─────────────────────────────────────────────

    /// Everything that follows a completed move: metrics, subscribers, and a
    /// spawned write of exactly the changed items.
    pub(super) fn dispatch(&mut self, applied: &Applied) {
        if applied.is_noop() {
            return;
        }
        metrics::counter!(observability::MOVES_TOTAL, "kind" => change_label(&applied.change))
            .increment(1);
        if applied.renormalized {
            metrics::counter!(observability::RENORMALIZATIONS_TOTAL).increment(1);
        }

        match applied.change {
            Change::Within {
                container_id,
                from_index,
                to_index,
            } => {
                info!("reorder {container_id}: {from_index} -> {to_index}");
                let item_ids = self
                    .board
                    .sequence(&container_id)
                    .map(<[ItemId]>::to_vec)
                    .unwrap_or_default();
                self.notify.send(&BoardEvent::Reordered {
                    container_id,
                    item_ids,
                });
            }
            Change::Across {
                item_id,
                from_container_id,
                to_container_id,
                to_index,
            } => {
                info!("move {item_id}: {from_container_id} -> {to_container_id}@{to_index}");
                self.notify.send(&BoardEvent::MovedAcross {
                    item_id,
                    from_container_id,
                    to_container_id,
                    new_index: to_index,
                });
            }
            Change::Noop => {}
        }

        if !applied.updates.is_empty() {
            self.spawn_persist(applied);
        }
    }

    fn spawn_persist(&mut self, applied: &Applied) {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let rollback = (self.config.write_policy == WritePolicy::WriteThroughWithRollback)
            .then(|| (applied.before.clone(), applied.after.clone()));
        self.pending.insert(ticket, PendingWrite { rollback });

        let updates = applied.updates.clone();
        let item_ids: Vec<ItemId> = updates.iter().map(|u| u.id).collect();
        metrics::histogram!(observability::PERSIST_BATCH_SIZE).record(updates.len() as f64);
        let persistence = Arc::clone(&self.persistence);
        let notify = Arc::clone(&self.notify);
        let reports = self.reports_tx.clone();
        tokio::spawn(async move {
            let start = Instant::now();
            let result = persistence.persist_order(updates).await;
            metrics::histogram!(observability::PERSIST_DURATION_SECONDS)
                .record(start.elapsed().as_secs_f64());
            if let Err(e) = &result {
                warn!("persist #{ticket} of {} items failed: {e}", item_ids.len());
                metrics::counter!(observability::PERSIST_FAILURES_TOTAL).increment(1);
                notify.send(&BoardEvent::PersistFailed {
                    ticket,
                    item_ids,
                    error: e.to_string(),
                });
            }
            // The engine may already be gone; nothing left to reconcile.
            let _ = reports.send(PersistReport { ticket, result });
        });
    }
}
