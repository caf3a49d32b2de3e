//! Order key assignment.
//!
//! A container's sequence is authoritative; order keys are a cache of it that
//! storage can sort by. Keys are assigned either densely (`0, 1, 2, …` after
//! every move) or sparsely (midpoint between neighbors), and a sparse container
//! is re-densified once two neighbors get closer than [`MIN_GAP`].

use serde::{Deserialize, Serialize};

use crate::model::OrderKey;

/// Smallest tolerated distance between neighboring keys.
pub const MIN_GAP: OrderKey = 1e-6;

/// Distance used past either end of a container.
pub const STEP: OrderKey = 1.0;

/// When to reassign a clean, evenly spaced sequence of keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenormalizePolicy {
    /// Every completed move rewrites the affected containers as `0, 1, 2, …`.
    #[default]
    OnEveryMove,
    /// Moves take the midpoint between neighbors; the container is only
    /// rewritten when that midpoint would violate [`MIN_GAP`].
    OnGapExhausted,
}

/// Key strictly between `prev` and `next`. Missing neighbors are replaced by
/// a fixed [`STEP`] past the existing one.
pub fn key_between(prev: Option<OrderKey>, next: Option<OrderKey>) -> OrderKey {
    match (prev, next) {
        (None, None) => 0.0,
        (Some(p), None) => p + STEP,
        (None, Some(n)) => n - STEP,
        (Some(p), Some(n)) => p + (n - p) / 2.0,
    }
}

/// Key for an item inserted at `target_index` into a container whose current
/// keys (moved item excluded) are `keys`. The index is clamped to `keys.len()`.
pub fn assign(keys: &[OrderKey], target_index: usize) -> OrderKey {
    let i = target_index.min(keys.len());
    let prev = i.checked_sub(1).map(|p| keys[p]);
    let next = keys.get(i).copied();
    key_between(prev, next)
}

/// A clean sequence of `len` evenly spaced keys.
pub fn normalize(len: usize) -> Vec<OrderKey> {
    (0..len).map(|i| i as OrderKey).collect()
}

/// True when `keys` is no longer a usable strictly increasing sequence.
pub fn needs_renormalize(keys: &[OrderKey]) -> bool {
    keys.iter().any(|k| !k.is_finite())
        || keys.windows(2).any(|w| w[1] - w[0] < MIN_GAP)
}
