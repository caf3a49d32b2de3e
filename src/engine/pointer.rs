use tracing::{debug, error};

use crate::drag::{DragPhase, DragState, DragStep, DropZone, PointerEvent};
use crate::limits::MAX_DROP_ZONES;
use crate::model::*;
use crate::observability;

use super::{Applied, BoardError, Engine};

impl<P> Engine<P> {
    /// Replace the drop zones for the current layout, in document order.
    pub fn set_drop_zones(&mut self, zones: Vec<DropZone>) -> Result<(), BoardError> {
        if zones.len() > MAX_DROP_ZONES {
            return Err(BoardError::LimitExceeded("too many drop zones"));
        }
        self.zones = zones;
        Ok(())
    }

    pub fn drop_zones(&self) -> &[DropZone] {
        &self.zones
    }

    pub fn drag_phase(&self) -> DragPhase {
        self.session.phase()
    }

    pub fn drag_state(&self) -> Option<&DragState> {
        self.session.drag_state()
    }

    /// Feed one pointer event. A drop onto a new slot is applied to the board
    /// before this returns; its write runs in the background.
    pub fn pointer(&mut self, event: &PointerEvent) -> Result<DragStep, BoardError> {
        let step = self.session.handle(event, &self.zones, &self.board);
        match step {
            DragStep::Drop {
                item_id, target, ..
            } => {
                let result = self.resolve_drop(item_id, target);
                self.session.finish();
                if let Err(e) = &result {
                    error!("drop of {item_id} on {target:?} failed: {e}");
                }
                result?;
            }
            DragStep::Cancelled { item_id } => {
                debug!("drag {item_id} ended without a move");
                metrics::counter!(observability::DRAGS_CANCELLED_TOTAL).increment(1);
            }
            _ => {}
        }
        Ok(step)
    }

    /// Abandon any gesture in progress. The board is untouched.
    pub fn cancel_drag(&mut self) -> Result<DragStep, BoardError> {
        self.pointer(&PointerEvent::cancel())
    }

    /// The item's current position is looked up again: a rollback may have
    /// moved it since the press.
    fn resolve_drop(&mut self, item_id: ItemId, target: Slot) -> Result<Applied, BoardError> {
        let from = self.board.position_of(&item_id)?;
        if from.container_id == target.container_id {
            self.move_within(from.container_id, from.index, target.index)
        } else {
            self.move_across(item_id, from.container_id, target.container_id, target.index)
        }
    }
}
