mod error;
mod mover;
mod mutations;
mod pointer;
mod queries;
mod reconcile;
mod store;
#[cfg(test)]
mod tests;

pub use error::BoardError;
pub use mover::{Applied, Change};
pub use store::{Board, Checkpoint};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::EngineConfig;
use crate::drag::{DragSession, DropZone};
use crate::model::*;
use crate::notify::NotifyHub;
use crate::persist::{load_board, LoadError, OrderPersistence, PersistError, StateSource};
use crate::resize::ResizeController;

/// Outcome of one `persist_order` call, delivered back to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistReport {
    pub ticket: u64,
    pub result: Result<(), PersistError>,
}

/// A write that has been handed to storage but has not been reconciled.
/// The checkpoints are only kept when a failure would be rolled back.
#[derive(Debug, Clone)]
pub(super) struct PendingWrite {
    pub(super) rollback: Option<(Checkpoint, Checkpoint)>,
}

/// Owns the board and everything that changes it: the drag session, the
/// resize controller, fire-and-forget persistence and the notify hub.
///
/// Driven from one event loop through `&mut self`. Every move is applied to
/// the board before its write is spawned. A failed write is logged, counted
/// and broadcast as [`BoardEvent::PersistFailed`] by the write task itself.
/// Completion reports still queue on a channel, and `pending` only shrinks
/// when the host calls `poll_persistence` or `settle`; a rollback happens
/// there, since it needs the board.
pub struct Engine<P> {
    pub(super) board: Board<P>,
    pub(super) session: DragSession,
    pub(super) zones: Vec<DropZone>,
    pub(super) persistence: Arc<dyn OrderPersistence>,
    pub notify: Arc<NotifyHub>,
    pub(super) config: EngineConfig,
    pub(super) resize: ResizeController,
    pub(super) reports_tx: mpsc::UnboundedSender<PersistReport>,
    pub(super) reports_rx: mpsc::UnboundedReceiver<PersistReport>,
    pub(super) pending: HashMap<u64, PendingWrite>,
    pub(super) next_ticket: u64,
}

impl<P> Engine<P> {
    /// Wrap an already hydrated board. The board adopts the configured
    /// renormalize policy.
    pub fn new(
        mut board: Board<P>,
        persistence: Arc<dyn OrderPersistence>,
        config: EngineConfig,
    ) -> Self {
        board.policy = config.renormalize;
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        Self {
            board,
            session: DragSession::new(config.activation_distance),
            zones: Vec::new(),
            persistence,
            notify: Arc::new(NotifyHub::new()),
            config,
            resize: ResizeController::new(config.resize),
            reports_tx,
            reports_rx,
            pending: HashMap::new(),
            next_ticket: 0,
        }
    }

    /// Fetch every container's initial state and build an engine over it.
    pub async fn load<S>(
        source: &S,
        container_ids: &[ContainerId],
        persistence: Arc<dyn OrderPersistence>,
        config: EngineConfig,
    ) -> Result<Self, LoadError>
    where
        S: StateSource<P> + ?Sized,
    {
        let board = load_board(source, container_ids, config.renormalize).await?;
        tracing::info!(
            "loaded {} containers, {} items",
            board.container_ids().len(),
            board.item_count()
        );
        Ok(Self::new(board, persistence, config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn board(&self) -> &Board<P> {
        &self.board
    }

    /// Direct access for collaborators that create or delete items and
    /// containers. Any gesture in progress is dropped, since its slots may
    /// no longer exist.
    pub fn board_mut(&mut self) -> &mut Board<P> {
        self.session.reset();
        &mut self.board
    }
}
