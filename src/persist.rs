//! Storage collaborator contracts.
//!
//! The engine never owns storage. It hands each completed move's
//! [`OrderUpdate`]s to an [`OrderPersistence`] and hydrates from a
//! [`StateSource`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::engine::{Board, BoardError};
use crate::model::*;
use crate::order::RenormalizePolicy;

#[derive(Debug, Clone, PartialEq)]
pub enum PersistError {
    Io(String),
    Rejected(String),
    /// The storage task is gone.
    Closed,
}

impl std::fmt::Display for PersistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistError::Io(e) => write!(f, "storage I/O error: {e}"),
            PersistError::Rejected(e) => write!(f, "storage rejected write: {e}"),
            PersistError::Closed => write!(f, "storage closed"),
        }
    }
}

impl std::error::Error for PersistError {}

/// Durable storage of order keys. Each call carries absolute values for
/// exactly the items a move changed. Calls may complete in any order.
#[async_trait]
pub trait OrderPersistence: Send + Sync {
    async fn persist_order(&self, items: Vec<OrderUpdate>) -> Result<(), PersistError>;
}

/// Source of a container's stored state, fetched once before any drag.
#[async_trait]
pub trait StateSource<P>: Send + Sync {
    async fn fetch_initial_state(
        &self,
        container_id: ContainerId,
    ) -> Result<ContainerSnapshot<P>, PersistError>;
}

/// What the engine does to its optimistic state when a write fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WritePolicy {
    /// Keep the local order; memory and storage diverge until the next
    /// successful write or a reload.
    #[default]
    WriteThroughNoRollback,
    /// Put the affected containers back as they were before the move, as
    /// long as nothing else has touched them since.
    WriteThroughWithRollback,
}

#[derive(Debug)]
pub enum LoadError {
    Fetch(PersistError),
    Board(BoardError),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Fetch(e) => write!(f, "fetch failed: {e}"),
            LoadError::Board(e) => write!(f, "hydrate failed: {e}"),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<PersistError> for LoadError {
    fn from(e: PersistError) -> Self {
        LoadError::Fetch(e)
    }
}

impl From<BoardError> for LoadError {
    fn from(e: BoardError) -> Self {
        LoadError::Board(e)
    }
}

/// Fetch every container concurrently and hydrate a board in the given
/// display order.
pub async fn load_board<P, S>(
    source: &S,
    container_ids: &[ContainerId],
    policy: RenormalizePolicy,
) -> Result<Board<P>, LoadError>
where
    S: StateSource<P> + ?Sized,
{
    let snapshots = futures::future::try_join_all(
        container_ids
            .iter()
            .map(|id| source.fetch_initial_state(*id)),
    )
    .await?;
    Ok(Board::from_snapshots(snapshots, policy)?)
}

// ── In-memory adapter ────────────────────────────────────────────

/// Keeps every batch it receives. Can be switched to fail or to delay.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    batches: Mutex<Vec<Vec<OrderUpdate>>>,
    latest: Mutex<HashMap<ItemId, OrderUpdate>>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every subsequent write until switched back.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Sleep before completing each write.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    /// Batches accepted so far, in completion order.
    pub fn batches(&self) -> Vec<Vec<OrderUpdate>> {
        self.batches.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Last stored value per item.
    pub fn latest(&self) -> HashMap<ItemId, OrderUpdate> {
        self.latest.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl OrderPersistence for MemoryPersistence {
    async fn persist_order(&self, items: Vec<OrderUpdate>) -> Result<(), PersistError> {
        let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(PersistError::Io("simulated write failure".into()));
        }
        {
            let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
            for update in &items {
                latest.insert(update.id, *update);
            }
        }
        self.batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(items);
        Ok(())
    }
}
