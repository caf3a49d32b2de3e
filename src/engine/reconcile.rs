use tracing::{debug, error, info, warn};

use crate::model::*;
use crate::observability;
use crate::resize::{RescheduleCommit, RescheduleGesture, ResizeCommit, ResizeController, ResizeGesture};

use super::{Checkpoint, Engine, PersistReport};

impl<P> Engine<P> {
    /// Writes spawned but not yet reconciled.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Reconcile every report that has already arrived. Never blocks.
    pub fn poll_persistence(&mut self) -> Vec<PersistReport> {
        let mut reports = Vec::new();
        while let Ok(report) = self.reports_rx.try_recv() {
            self.reconcile(&report);
            reports.push(report);
        }
        reports
    }

    /// Wait until every write spawned so far has reported back.
    pub async fn settle(&mut self) -> Vec<PersistReport> {
        let mut reports = self.poll_persistence();
        while !self.pending.is_empty() {
            // The engine holds a sender, so the channel never closes here.
            let Some(report) = self.reports_rx.recv().await else {
                break;
            };
            self.reconcile(&report);
            reports.push(report);
        }
        reports
    }

    /// Failures were already reported by the write task; what is left is
    /// the rollback, which needs the board.
    fn reconcile(&mut self, report: &PersistReport) {
        let Some(write) = self.pending.remove(&report.ticket) else {
            return;
        };
        if report.result.is_err()
            && let Some((before, after)) = &write.rollback
        {
            self.roll_back(report.ticket, before, after);
        }
    }

    /// Undo a failed move, but only if its containers still look exactly as
    /// the move left them.
    fn roll_back(&mut self, ticket: u64, before: &Checkpoint, after: &Checkpoint) {
        let container_ids = after.container_ids();
        if &self.board.checkpoint(&container_ids) != after {
            warn!("persist #{ticket}: containers changed since the move, rollback skipped");
            return;
        }
        if let Err(e) = self.board.restore(before) {
            error!("persist #{ticket}: rollback failed: {e}");
            return;
        }
        // A gesture armed on the old layout would resolve against stale slots.
        self.session.reset();
        info!("persist #{ticket}: rolled back {} containers", container_ids.len());
        metrics::counter!(observability::ROLLBACKS_TOTAL).increment(1);

        self.notify.send(&BoardEvent::RolledBack {
            ticket,
            container_ids: container_ids.clone(),
        });
        for container_id in container_ids {
            if let Ok(seq) = self.board.sequence(&container_id) {
                let item_ids = seq.to_vec();
                self.notify.send(&BoardEvent::Reordered {
                    container_id,
                    item_ids,
                });
            }
        }
    }

    // ── Resize ───────────────────────────────────────────────

    pub fn resize_controller(&self) -> &ResizeController {
        &self.resize
    }

    /// Finish a resize and tell subscribers. Storing the new end is up to
    /// the caller. A resize that changed nothing is not announced.
    pub fn commit_resize(&self, gesture: ResizeGesture) -> ResizeCommit {
        let commit = gesture.commit();
        if !commit.changed {
            debug!("resize {}: unchanged", commit.event_id);
            return commit;
        }
        info!(
            "resize {}: {} min, ends {}",
            commit.event_id,
            commit.duration.num_minutes(),
            commit.end
        );
        self.notify.send(&BoardEvent::ResizeCommitted {
            item_id: commit.event_id,
            end: commit.end,
        });
        commit
    }

    pub fn commit_reschedule(&self, gesture: RescheduleGesture) -> RescheduleCommit {
        let commit = gesture.commit();
        info!("reschedule {}: {} - {}", commit.event_id, commit.start, commit.end);
        self.notify.send(&BoardEvent::Rescheduled {
            item_id: commit.event_id,
            start: commit.start,
            end: commit.end,
        });
        commit
    }
}
