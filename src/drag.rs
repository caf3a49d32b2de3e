//! Pointer-driven drag session.
//!
//! [`DragSession`] consumes a neutral pointer stream (position + phase) and a
//! set of [`DropZone`]s supplied by the layout, and decides what the user is
//! dragging and where it would land.
//!
//! # State Machine
//!
//! ```text
//! Idle ──down on item──▶ (armed) ──moved ≥ activation──▶ Dragging
//!   ▲                      │ up: Click                      │ move: recompute target
//!   │                      ▼                                │
//!   ├──────────────────── Idle ◀── up, no target / cancel ──┤
//!   │                                                       │ up, target ≠ origin
//!   └────────────── finish() ◀──────── Resolving ◀──────────┘
//! ```
//!
//! # Invariants
//!
//! 1. A press that never travels `activation_distance` is a click, never a
//!    zero-length drag.
//! 2. The session never touches the board; it only reads positions. The
//!    mutation belongs to whoever handles [`DragStep::Drop`].
//! 3. Collision detection is pure geometry: nearest zone center, ties broken
//!    by zone order.

use serde::{Deserialize, Serialize};

use crate::engine::Board;
use crate::model::*;

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_sq(&self, other: Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.x + self.width && p.y >= self.y && p.y < self.y + self.height
    }
}

// ---------------------------------------------------------------------------
// Drop zones
// ---------------------------------------------------------------------------

/// What a zone stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropTarget {
    /// A rendered item. Dropping here takes that item's index.
    Item {
        container_id: ContainerId,
        item_id: ItemId,
    },
    /// A container's own area. Dropping here appends.
    Container { container_id: ContainerId },
}

/// A droppable rectangle as laid out by the UI, in document order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DropZone {
    pub target: DropTarget,
    pub rect: Rect,
}

/// Nearest zone by center distance. Ties go to the earlier zone.
pub fn closest_center(zones: &[DropZone], point: Point) -> Option<&DropZone> {
    let mut best: Option<(&DropZone, f64)> = None;
    for zone in zones {
        let d = zone.rect.center().distance_sq(point);
        if best.is_none_or(|(_, best_d)| d < best_d) {
            best = Some((zone, d));
        }
    }
    best.map(|(zone, _)| zone)
}

// ---------------------------------------------------------------------------
// Pointer input
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointerPhase {
    Down,
    Move,
    Up,
    /// Explicit cancellation (Escape, focus loss).
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    pub phase: PointerPhase,
    pub position: Point,
}

impl PointerEvent {
    pub fn down(x: f64, y: f64) -> Self {
        Self::at(PointerPhase::Down, x, y)
    }

    pub fn moved(x: f64, y: f64) -> Self {
        Self::at(PointerPhase::Move, x, y)
    }

    pub fn up(x: f64, y: f64) -> Self {
        Self::at(PointerPhase::Up, x, y)
    }

    pub fn cancel() -> Self {
        Self::at(PointerPhase::Cancel, 0.0, 0.0)
    }

    fn at(phase: PointerPhase, x: f64, y: f64) -> Self {
        Self {
            phase,
            position: Point::new(x, y),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DragPhase {
    Idle,
    Dragging,
    Resolving,
}

/// State of one drag gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragState {
    pub active_item_id: ItemId,
    pub origin: Slot,
    pub over_target: Option<Slot>,
}

/// What a pointer event did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragStep {
    /// Nothing relevant happened.
    Ignored,
    /// Pointer went down on an item; not a drag yet.
    Pressed { item_id: ItemId },
    /// Pointer went up without crossing the activation distance.
    Click { item_id: ItemId },
    Started {
        item_id: ItemId,
        origin: Slot,
        over: Option<Slot>,
    },
    Over { target: Option<Slot> },
    /// Dropped on a new slot. The session is `Resolving` until `finish()`.
    Drop {
        item_id: ItemId,
        origin: Slot,
        target: Slot,
    },
    /// Dropped back on its own slot.
    Unchanged { item_id: ItemId },
    Cancelled { item_id: ItemId },
}

#[derive(Debug, Clone, Copy)]
struct Press {
    item_id: ItemId,
    origin: Slot,
    start: Point,
}

#[derive(Debug, Clone, Copy)]
enum SessionState {
    Idle,
    Armed(Press),
    Dragging(DragState),
    Resolving(DragState),
}

#[derive(Debug, Clone)]
pub struct DragSession {
    activation_distance: f64,
    state: SessionState,
}

impl DragSession {
    pub fn new(activation_distance: f64) -> Self {
        Self {
            activation_distance: activation_distance.max(0.0),
            state: SessionState::Idle,
        }
    }

    /// Externally visible phase. An armed press is still `Idle`.
    pub fn phase(&self) -> DragPhase {
        match self.state {
            SessionState::Idle | SessionState::Armed(_) => DragPhase::Idle,
            SessionState::Dragging(_) => DragPhase::Dragging,
            SessionState::Resolving(_) => DragPhase::Resolving,
        }
    }

    pub fn drag_state(&self) -> Option<&DragState> {
        match &self.state {
            SessionState::Dragging(s) | SessionState::Resolving(s) => Some(s),
            SessionState::Idle | SessionState::Armed(_) => None,
        }
    }

    /// Advance the state machine by one pointer event.
    pub fn handle<P>(&mut self, event: &PointerEvent, zones: &[DropZone], board: &Board<P>) -> DragStep {
        let point = event.position;
        match (self.state, event.phase) {
            (SessionState::Idle, PointerPhase::Down) => {
                let Some((item_id, origin)) = press_target(zones, point, board) else {
                    return DragStep::Ignored;
                };
                self.state = SessionState::Armed(Press {
                    item_id,
                    origin,
                    start: point,
                });
                DragStep::Pressed { item_id }
            }
            (SessionState::Armed(press), PointerPhase::Move) => {
                let threshold = self.activation_distance * self.activation_distance;
                if press.start.distance_sq(point) < threshold {
                    return DragStep::Ignored;
                }
                let over = over_target(zones, point, press.origin, board);
                self.state = SessionState::Dragging(DragState {
                    active_item_id: press.item_id,
                    origin: press.origin,
                    over_target: over,
                });
                tracing::debug!("drag start {} from {:?}", press.item_id, press.origin);
                DragStep::Started {
                    item_id: press.item_id,
                    origin: press.origin,
                    over,
                }
            }
            (SessionState::Armed(press), PointerPhase::Up) => {
                self.state = SessionState::Idle;
                DragStep::Click {
                    item_id: press.item_id,
                }
            }
            (SessionState::Armed(_), PointerPhase::Cancel) => {
                self.state = SessionState::Idle;
                DragStep::Ignored
            }
            (SessionState::Dragging(mut drag), PointerPhase::Move) => {
                drag.over_target = over_target(zones, point, drag.origin, board);
                self.state = SessionState::Dragging(drag);
                DragStep::Over {
                    target: drag.over_target,
                }
            }
            (SessionState::Dragging(mut drag), PointerPhase::Up) => {
                drag.over_target = over_target(zones, point, drag.origin, board);
                match drag.over_target {
                    None => {
                        self.state = SessionState::Idle;
                        tracing::debug!("drag {} released outside any target", drag.active_item_id);
                        DragStep::Cancelled {
                            item_id: drag.active_item_id,
                        }
                    }
                    Some(target) if target == drag.origin => {
                        self.state = SessionState::Idle;
                        DragStep::Unchanged {
                            item_id: drag.active_item_id,
                        }
                    }
                    Some(target) => {
                        self.state = SessionState::Resolving(drag);
                        DragStep::Drop {
                            item_id: drag.active_item_id,
                            origin: drag.origin,
                            target,
                        }
                    }
                }
            }
            (SessionState::Dragging(drag), PointerPhase::Cancel) => {
                self.state = SessionState::Idle;
                tracing::debug!("drag {} cancelled", drag.active_item_id);
                DragStep::Cancelled {
                    item_id: drag.active_item_id,
                }
            }
            _ => DragStep::Ignored,
        }
    }

    /// Leave `Resolving` once the drop has been applied.
    pub fn finish(&mut self) {
        if let SessionState::Resolving(_) = self.state {
            self.state = SessionState::Idle;
        }
    }

    /// Drop any gesture state without emitting anything (e.g. the board was
    /// replaced underneath the gesture).
    pub fn reset(&mut self) {
        self.state = SessionState::Idle;
    }
}

/// The item zone under the pointer, first in document order.
fn press_target<P>(zones: &[DropZone], point: Point, board: &Board<P>) -> Option<(ItemId, Slot)> {
    zones.iter().find_map(|zone| match zone.target {
        DropTarget::Item { item_id, .. } if zone.rect.contains(point) => {
            board.position_of(&item_id).ok().map(|slot| (item_id, slot))
        }
        _ => None,
    })
}

/// Slot the dragged item would land in. The pointer must be inside at least
/// one zone; among all zones the nearest center wins.
fn over_target<P>(zones: &[DropZone], point: Point, origin: Slot, board: &Board<P>) -> Option<Slot> {
    if !zones.iter().any(|z| z.rect.contains(point)) {
        return None;
    }
    let zone = closest_center(zones, point)?;
    match zone.target {
        DropTarget::Item {
            container_id,
            item_id,
        } => {
            let index = board.container(&container_id)?.position(&item_id)?;
            Some(Slot::new(container_id, index))
        }
        DropTarget::Container { container_id } => {
            let len = board.container(&container_id)?.len();
            // The origin container shrinks by one when the item is lifted out.
            let index = if container_id == origin.container_id {
                len.saturating_sub(1)
            } else {
                len
            };
            Some(Slot::new(container_id, index))
        }
    }
}
