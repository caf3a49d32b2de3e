pub const MAX_CONTAINERS: usize = 10_000;
pub const MAX_ITEMS_PER_CONTAINER: usize = 100_000;
/// Drop zones registered for one layout pass.
pub const MAX_DROP_ZONES: usize = 200_000;
/// Upper bound on a single persisted batch. A dense renormalization of the
/// largest allowed container still fits.
pub const MAX_BATCH_SIZE: usize = MAX_ITEMS_PER_CONTAINER * 2;
