use crate::engine::Change;

// ── Moves ───────────────────────────────────────────────────────

/// Counter: completed moves that changed something. Labels: kind.
pub const MOVES_TOTAL: &str = "shuffleboard_moves_total";

/// Counter: drags that ended without a mutation (cancel or released outside).
pub const DRAGS_CANCELLED_TOTAL: &str = "shuffleboard_drags_cancelled_total";

/// Counter: moves that rewrote a whole container as `0, 1, 2, …`.
pub const RENORMALIZATIONS_TOTAL: &str = "shuffleboard_renormalizations_total";

// ── Persistence ─────────────────────────────────────────────────

/// Histogram: persist_order round trip in seconds.
pub const PERSIST_DURATION_SECONDS: &str = "shuffleboard_persist_duration_seconds";

/// Histogram: order updates per persist_order call.
pub const PERSIST_BATCH_SIZE: &str = "shuffleboard_persist_batch_size";

/// Counter: failed persist_order calls.
pub const PERSIST_FAILURES_TOTAL: &str = "shuffleboard_persist_failures_total";

/// Counter: optimistic moves undone after a failed write.
pub const ROLLBACKS_TOTAL: &str = "shuffleboard_rollbacks_total";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "shuffleboard_journal_flush_duration_seconds";

/// Histogram: journal group-commit size (batches per fsync).
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "shuffleboard_journal_flush_batch_size";

/// Map a move to a short label for metrics.
pub fn change_label(change: &Change) -> &'static str {
    match change {
        Change::Noop => "noop",
        Change::Within { .. } => "within",
        Change::Across { .. } => "across",
    }
}
