use super::*;
use std::collections::HashSet;
use std::time::Duration;

use chrono::NaiveTime;
use proptest::prelude::*;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::drag::{DragPhase, DragStep, DropTarget, PointerEvent, Rect};
use crate::limits::*;
use crate::order::RenormalizePolicy;
use crate::persist::{MemoryPersistence, WritePolicy};

/// A board with one container per entry of `columns`, each holding that
/// many items. Payloads count up from zero across the board.
fn board_with(
    policy: RenormalizePolicy,
    columns: &[usize],
) -> (Board<u32>, Vec<ContainerId>, Vec<Vec<ItemId>>) {
    let mut board = Board::new(policy);
    let mut cids = Vec::new();
    let mut items = Vec::new();
    let mut n = 0;
    for &len in columns {
        let cid = Ulid::new();
        board.add_container(cid).unwrap();
        let mut ids = Vec::new();
        for i in 0..len {
            let id = Ulid::new();
            board.insert_item(cid, i, id, n).unwrap();
            ids.push(id);
            n += 1;
        }
        cids.push(cid);
        items.push(ids);
    }
    (board, cids, items)
}

type Fixture = (
    Engine<u32>,
    Arc<MemoryPersistence>,
    Vec<ContainerId>,
    Vec<Vec<ItemId>>,
);

fn engine_with(config: EngineConfig, columns: &[usize]) -> Fixture {
    let (board, cids, items) = board_with(config.renormalize, columns);
    let store = Arc::new(MemoryPersistence::new());
    let persistence: Arc<dyn OrderPersistence> = store.clone();
    let mut engine = Engine::new(board, persistence, config);
    engine.set_drop_zones(layout(engine.board())).unwrap();
    (engine, store, cids, items)
}

fn rollback_config() -> EngineConfig {
    EngineConfig {
        write_policy: WritePolicy::WriteThroughWithRollback,
        ..EngineConfig::default()
    }
}

/// Columns 200px apart, 40px rows, 100px wide. Each column's container zone
/// follows its item zones.
fn layout<P>(board: &Board<P>) -> Vec<DropZone> {
    let mut zones = Vec::new();
    for (col, cid) in board.container_ids().iter().enumerate() {
        let x = col as f64 * 200.0;
        for (row, item_id) in board.sequence(cid).unwrap().iter().enumerate() {
            zones.push(DropZone {
                target: DropTarget::Item {
                    container_id: *cid,
                    item_id: *item_id,
                },
                rect: Rect::new(x, row as f64 * 40.0, 100.0, 40.0),
            });
        }
        zones.push(DropZone {
            target: DropTarget::Container { container_id: *cid },
            rect: Rect::new(x, 0.0, 100.0, 400.0),
        });
    }
    zones
}

fn drag(engine: &mut Engine<u32>, path: &[(f64, f64)]) -> DragStep {
    let (first, rest) = path.split_first().unwrap();
    let (last, middle) = rest.split_last().unwrap();
    engine.pointer(&PointerEvent::down(first.0, first.1)).unwrap();
    for (x, y) in middle {
        engine.pointer(&PointerEvent::moved(*x, *y)).unwrap();
    }
    engine.pointer(&PointerEvent::up(last.0, last.1)).unwrap()
}

fn ids(updates: &[OrderUpdate]) -> HashSet<ItemId> {
    updates.iter().map(|u| u.id).collect()
}

fn drain(rx: &mut broadcast::Receiver<BoardEvent>) -> Vec<BoardEvent> {
    let mut events = Vec::new();
    while let Ok(e) = rx.try_recv() {
        events.push(e);
    }
    events
}

// ── Board: moves ─────────────────────────────────────────

#[test]
fn reorder_first_to_last_renumbers_densely() {
    let (mut board, cids, items) = board_with(RenormalizePolicy::OnEveryMove, &[3]);
    let (c, [a, b, d]) = (cids[0], [items[0][0], items[0][1], items[0][2]]);
    assert_eq!(board.orders(&c).unwrap(), vec![0.0, 1.0, 2.0]);

    let applied = board.move_within_container(c, 0, 2).unwrap();
    assert_eq!(board.sequence(&c).unwrap(), &[b, d, a]);
    assert_eq!(board.orders(&c).unwrap(), vec![0.0, 1.0, 2.0]);
    assert_eq!(ids(&applied.updates), HashSet::from([a, b, d]));
    assert_eq!(
        applied.change,
        Change::Within {
            container_id: c,
            from_index: 0,
            to_index: 2
        }
    );
    // Keys were already dense; only the displaced slots moved.
    assert!(!applied.renormalized);
}

#[test]
fn dense_policy_reports_repairing_sparse_keys() {
    let (mut board, cids, items) = board_with(RenormalizePolicy::OnEveryMove, &[3]);
    let c = cids[0];
    let head = Ulid::new();
    board.insert_item(c, 0, head, 99).unwrap();
    assert_eq!(board.orders(&c).unwrap(), vec![-1.0, 0.0, 1.0, 2.0]);

    // Swapping the last two also shifts `head` and items[0][0] to 0 and 1.
    let applied = board.move_within_container(c, 3, 2).unwrap();
    assert!(applied.renormalized);
    assert_eq!(board.orders(&c).unwrap(), vec![0.0, 1.0, 2.0, 3.0]);
    assert!(ids(&applied.updates).contains(&head));
    assert!(ids(&applied.updates).contains(&items[0][0]));

    // Dense again, so the next move is an ordinary one.
    let applied = board.move_within_container(c, 0, 1).unwrap();
    assert!(!applied.renormalized);
}

#[test]
fn dense_migration_is_not_a_renormalization() {
    let (mut board, cids, items) = board_with(RenormalizePolicy::OnEveryMove, &[3, 2]);
    let applied = board
        .move_across_containers(items[0][1], cids[0], cids[1], 1)
        .unwrap();
    assert!(!applied.renormalized);
    assert_eq!(board.orders(&cids[0]).unwrap(), vec![0.0, 1.0]);
    assert_eq!(board.orders(&cids[1]).unwrap(), vec![0.0, 1.0, 2.0]);
}

#[test]
fn move_to_other_list_front() {
    let (mut board, cids, items) = board_with(RenormalizePolicy::OnEveryMove, &[2, 1]);
    let (l1, l2) = (cids[0], cids[1]);
    let (p, q, r) = (items[0][0], items[0][1], items[1][0]);

    let applied = board.move_across_containers(q, l1, l2, 0).unwrap();
    assert_eq!(board.sequence(&l1).unwrap(), &[p]);
    assert_eq!(board.sequence(&l2).unwrap(), &[q, r]);
    assert_eq!(board.item(&q).unwrap().container_id, l2);
    assert_eq!(board.orders(&l2).unwrap(), vec![0.0, 1.0]);
    // p keeps key 0 and is not rewritten.
    assert_eq!(ids(&applied.updates), HashSet::from([q, r]));
    let q_update = applied.updates.iter().find(|u| u.id == q).unwrap();
    assert_eq!(q_update.container_id, l2);
    board.check_invariants().unwrap();
}

#[test]
fn move_within_same_index_is_noop() {
    let (mut board, cids, _) = board_with(RenormalizePolicy::OnGapExhausted, &[4]);
    let before = board.clone();
    let applied = board.move_within_container(cids[0], 2, 2).unwrap();
    assert!(applied.is_noop());
    assert!(applied.updates.is_empty());
    assert_eq!(board, before);
}

#[test]
fn move_within_clamps_destination() {
    let (mut board, cids, items) = board_with(RenormalizePolicy::OnEveryMove, &[3]);
    board.move_within_container(cids[0], 0, 99).unwrap();
    assert_eq!(board.sequence(&cids[0]).unwrap().last(), Some(&items[0][0]));
}

#[test]
fn move_across_clamps_to_append() {
    let (mut board, cids, items) = board_with(RenormalizePolicy::OnEveryMove, &[2, 2]);
    let applied = board
        .move_across_containers(items[0][0], cids[0], cids[1], 50)
        .unwrap();
    assert_eq!(board.sequence(&cids[1]).unwrap(), &[items[1][0], items[1][1], items[0][0]]);
    assert!(matches!(applied.change, Change::Across { to_index: 2, .. }));
}

#[test]
fn move_across_same_container_delegates() {
    let (mut board, cids, items) = board_with(RenormalizePolicy::OnEveryMove, &[3]);
    let applied = board
        .move_across_containers(items[0][2], cids[0], cids[0], 0)
        .unwrap();
    assert!(matches!(applied.change, Change::Within { from_index: 2, to_index: 0, .. }));
    assert_eq!(board.sequence(&cids[0]).unwrap()[0], items[0][2]);
}

#[test]
fn move_across_into_empty_container() {
    let (mut board, cids, items) = board_with(RenormalizePolicy::OnGapExhausted, &[2, 0]);
    let applied = board
        .move_across_containers(items[0][1], cids[0], cids[1], 0)
        .unwrap();
    assert_eq!(board.sequence(&cids[1]).unwrap(), &[items[0][1]]);
    assert_eq!(board.orders(&cids[1]).unwrap(), vec![0.0]);
    assert_eq!(applied.updates.len(), 1);
}

#[test]
fn sparse_policy_writes_only_the_moved_item() {
    let (mut board, cids, items) = board_with(RenormalizePolicy::OnGapExhausted, &[3]);
    let applied = board.move_within_container(cids[0], 2, 1).unwrap();
    assert_eq!(applied.updates.len(), 1);
    assert_eq!(applied.updates[0].id, items[0][2]);
    assert_eq!(applied.updates[0].order, 0.5);
    assert!(!applied.renormalized);
}

#[test]
fn sparse_policy_renormalizes_when_gap_collapses() {
    let (mut board, cids, _) = board_with(RenormalizePolicy::OnGapExhausted, &[3]);
    let c = cids[0];
    let mut renormalized = false;
    for _ in 0..60 {
        let applied = board.move_within_container(c, 2, 1).unwrap();
        board.check_invariants().unwrap();
        renormalized |= applied.renormalized;
    }
    assert!(renormalized);
}

#[test]
fn unknown_ids_are_errors() {
    let (mut board, cids, items) = board_with(RenormalizePolicy::OnEveryMove, &[2, 1]);
    let ghost = Ulid::new();
    assert_eq!(
        board.move_within_container(ghost, 0, 1),
        Err(BoardError::UnknownContainer(ghost))
    );
    assert_eq!(
        board.move_across_containers(ghost, cids[0], cids[1], 0),
        Err(BoardError::UnknownItem(ghost))
    );
    assert_eq!(
        board.move_across_containers(items[0][0], cids[0], ghost, 0),
        Err(BoardError::UnknownContainer(ghost))
    );
    assert_eq!(
        board.move_across_containers(items[1][0], cids[0], cids[1], 0),
        Err(BoardError::NotInContainer {
            item_id: items[1][0],
            container_id: cids[0]
        })
    );
    assert_eq!(
        board.move_within_container(cids[1], 1, 0),
        Err(BoardError::IndexOutOfRange {
            container_id: cids[1],
            index: 1,
            len: 1
        })
    );
}

// ── Board: CRUD ──────────────────────────────────────────

#[test]
fn insert_between_neighbors() {
    let (mut board, cids, items) = board_with(RenormalizePolicy::OnGapExhausted, &[2]);
    let id = Ulid::new();
    let updates = board.insert_item(cids[0], 1, id, 7).unwrap();
    assert_eq!(board.sequence(&cids[0]).unwrap(), &[items[0][0], id, items[0][1]]);
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].order, 0.5);
}

#[test]
fn duplicate_ids_rejected() {
    let (mut board, cids, items) = board_with(RenormalizePolicy::OnEveryMove, &[1]);
    assert_eq!(
        board.insert_item(cids[0], 0, items[0][0], 0),
        Err(BoardError::DuplicateItem(items[0][0]))
    );
    assert_eq!(
        board.add_container(cids[0]),
        Err(BoardError::DuplicateContainer(cids[0]))
    );
}

#[test]
fn remove_container_returns_items_in_order() {
    let (mut board, cids, items) = board_with(RenormalizePolicy::OnEveryMove, &[3, 1]);
    let removed = board.remove_container(cids[0]).unwrap();
    let removed_ids: Vec<ItemId> = removed.iter().map(|i| i.id).collect();
    assert_eq!(removed_ids, items[0]);
    assert_eq!(board.item_count(), 1);
    assert_eq!(board.container_ids(), &[cids[1]]);
    board.check_invariants().unwrap();
}

#[test]
fn remove_item_keeps_neighbors() {
    let (mut board, cids, items) = board_with(RenormalizePolicy::OnEveryMove, &[3]);
    let removed = board.remove_item(items[0][1]).unwrap();
    assert_eq!(removed.payload, 1);
    assert_eq!(board.orders(&cids[0]).unwrap(), vec![0.0, 2.0]);
    board.check_invariants().unwrap();
}

#[test]
fn container_limit_enforced() {
    let mut board: Board<()> = Board::default();
    for _ in 0..MAX_CONTAINERS {
        board.add_container(Ulid::new()).unwrap();
    }
    assert!(matches!(
        board.add_container(Ulid::new()),
        Err(BoardError::LimitExceeded(_))
    ));
}

#[test]
fn restore_rejects_foreign_checkpoint() {
    let (mut board, cids, items) = board_with(RenormalizePolicy::OnEveryMove, &[2, 1]);
    let checkpoint = board.checkpoint(&[cids[0]]);
    board
        .move_across_containers(items[0][0], cids[0], cids[1], 0)
        .unwrap();
    assert!(matches!(
        board.restore(&checkpoint),
        Err(BoardError::InvariantViolated(_))
    ));
}

#[test]
fn adjacent_container_follows_document_order() {
    let (board, cids, _) = board_with(RenormalizePolicy::OnEveryMove, &[0, 0, 0]);
    assert_eq!(board.adjacent_container(&cids[1], -1), Some(cids[0]));
    assert_eq!(board.adjacent_container(&cids[1], 1), Some(cids[2]));
    assert_eq!(board.adjacent_container(&cids[0], -1), None);
    assert_eq!(board.adjacent_container(&cids[2], 1), None);
}

// ── Board: properties ────────────────────────────────────

fn policy_strategy() -> impl Strategy<Value = RenormalizePolicy> {
    prop_oneof![
        Just(RenormalizePolicy::OnEveryMove),
        Just(RenormalizePolicy::OnGapExhausted),
    ]
}

proptest! {
    #[test]
    fn reorders_are_permutations(
        policy in policy_strategy(),
        moves in prop::collection::vec((0usize..8, 0usize..12), 1..80),
    ) {
        let (mut board, cids, items) = board_with(policy, &[8]);
        let c = cids[0];
        let expected: HashSet<ItemId> = items[0].iter().copied().collect();
        for (from, to) in moves {
            board.move_within_container(c, from, to).unwrap();
            let seq = board.sequence(&c).unwrap();
            prop_assert_eq!(seq.len(), 8);
            prop_assert_eq!(seq.iter().copied().collect::<HashSet<_>>(), expected.clone());
            prop_assert!(board.check_invariants().is_ok());
        }
    }

    #[test]
    fn migrations_conserve_items(
        policy in policy_strategy(),
        moves in prop::collection::vec((0usize..3, 0usize..16, 0usize..3, 0usize..16, any::<bool>()), 1..80),
    ) {
        let (mut board, cids, items) = board_with(policy, &[4, 3, 0]);
        let all: HashSet<ItemId> = items.iter().flatten().copied().collect();
        for (src, pick, dst, to, within) in moves {
            let from_cid = cids[src];
            let len = board.sequence(&from_cid).unwrap().len();
            if len == 0 {
                continue;
            }
            if within {
                board.move_within_container(from_cid, pick % len, to).unwrap();
            } else {
                let item_id = board.sequence(&from_cid).unwrap()[pick % len];
                let dest_len = board.sequence(&cids[dst]).unwrap().len();
                let applied = board.move_across_containers(item_id, from_cid, cids[dst], to).unwrap();
                if from_cid != cids[dst] {
                    prop_assert_eq!(board.sequence(&from_cid).unwrap().len(), len - 1);
                    prop_assert_eq!(board.sequence(&cids[dst]).unwrap().len(), dest_len + 1);
                    prop_assert!(applied.updates.iter().any(|u| u.id == item_id));
                }
            }
            let now: HashSet<ItemId> = cids
                .iter()
                .flat_map(|c| board.sequence(c).unwrap().iter().copied())
                .collect();
            prop_assert_eq!(now, all.clone());
            prop_assert_eq!(board.item_count(), all.len());
            prop_assert!(board.check_invariants().is_ok());
        }
    }
}

// ── Engine: direct and keyboard moves ────────────────────

#[tokio::test]
async fn move_persists_exactly_the_changed_items() {
    let (mut engine, store, cids, items) = engine_with(EngineConfig::default(), &[3]);
    let applied = engine.move_within(cids[0], 0, 1).unwrap();
    // [a, b, c] -> [b, a, c]: c keeps key 2.
    assert_eq!(ids(&applied.updates), HashSet::from([items[0][0], items[0][1]]));

    let reports = engine.settle().await;
    assert_eq!(reports.len(), 1);
    assert!(reports[0].result.is_ok());
    assert_eq!(store.batches(), vec![applied.updates.clone()]);
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test]
async fn noop_move_is_not_persisted() {
    let (mut engine, store, cids, _) = engine_with(EngineConfig::default(), &[3]);
    let mut rx = engine.notify.subscribe(cids[0]);
    let applied = engine.move_within(cids[0], 1, 1).unwrap();
    assert!(applied.is_noop());
    assert_eq!(engine.in_flight(), 0);
    engine.settle().await;
    assert!(store.batches().is_empty());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn keyboard_moves_stop_at_edges() {
    let (mut engine, _store, cids, items) = engine_with(EngineConfig::default(), &[2, 2]);
    let top = items[0][0];
    let bottom = items[1][1];
    assert!(engine.move_up(top).unwrap().is_noop());
    assert!(engine.move_down(bottom).unwrap().is_noop());
    assert!(engine.move_left(top).unwrap().is_noop());
    assert!(engine.move_right(bottom).unwrap().is_noop());
    assert_eq!(engine.in_flight(), 0);
    assert_eq!(engine.board().sequence(&cids[0]).unwrap(), items[0].as_slice());
}

#[tokio::test]
async fn move_right_keeps_index() {
    let (mut engine, _store, cids, items) = engine_with(EngineConfig::default(), &[2, 3]);
    engine.move_right(items[0][1]).unwrap();
    assert_eq!(
        engine.board().position_of(&items[0][1]).unwrap(),
        Slot::new(cids[1], 1)
    );
    engine.move_left(items[0][1]).unwrap();
    assert_eq!(
        engine.board().position_of(&items[0][1]).unwrap(),
        Slot::new(cids[0], 1)
    );
    engine.settle().await;
}

#[tokio::test]
async fn keyboard_errors_on_unknown_item() {
    let (mut engine, _store, _cids, _items) = engine_with(EngineConfig::default(), &[2]);
    let ghost = Ulid::new();
    assert_eq!(engine.move_up(ghost), Err(BoardError::UnknownItem(ghost)));
    assert_eq!(engine.move_right(ghost), Err(BoardError::UnknownItem(ghost)));
}

// ── Engine: pointer ──────────────────────────────────────

#[tokio::test]
async fn pointer_drop_reorders_and_persists() {
    let (mut engine, store, cids, items) = engine_with(EngineConfig::default(), &[3]);
    let mut rx = engine.notify.subscribe(cids[0]);

    let step = drag(&mut engine, &[(50.0, 20.0), (50.0, 60.0), (50.0, 100.0)]);
    assert!(matches!(step, DragStep::Drop { target, .. } if target == Slot::new(cids[0], 2)));
    assert_eq!(engine.drag_phase(), DragPhase::Idle);
    let (a, b, c) = (items[0][0], items[0][1], items[0][2]);
    assert_eq!(engine.board().sequence(&cids[0]).unwrap(), &[b, c, a]);

    assert_eq!(
        drain(&mut rx),
        vec![BoardEvent::Reordered {
            container_id: cids[0],
            item_ids: vec![b, c, a],
        }]
    );
    engine.settle().await;
    let latest = store.latest();
    assert_eq!(latest[&a].order, 2.0);
    assert_eq!(latest[&b].order, 0.0);
}

#[tokio::test]
async fn pointer_and_keyboard_paths_agree() {
    let (mut by_pointer, _s1, cids, items) = engine_with(EngineConfig::default(), &[3]);
    let store = Arc::new(MemoryPersistence::new());
    let mut by_keyboard = Engine::new(by_pointer.board().clone(), store, EngineConfig::default());

    drag(&mut by_pointer, &[(50.0, 20.0), (50.0, 60.0), (50.0, 100.0)]);
    by_keyboard.move_down(items[0][0]).unwrap();
    by_keyboard.move_down(items[0][0]).unwrap();

    assert_eq!(by_pointer.board(), by_keyboard.board());
    assert_eq!(
        by_pointer.board().orders(&cids[0]).unwrap(),
        by_keyboard.board().orders(&cids[0]).unwrap()
    );
    by_pointer.settle().await;
    by_keyboard.settle().await;
}

#[tokio::test]
async fn pointer_drop_onto_other_list() {
    let (mut engine, store, cids, items) = engine_with(EngineConfig::default(), &[2, 1]);
    let mut rx_from = engine.notify.subscribe(cids[0]);
    let mut rx_to = engine.notify.subscribe(cids[1]);
    let (p, q, r) = (items[0][0], items[0][1], items[1][0]);

    // q's center is (50, 60); r's is (250, 20).
    drag(&mut engine, &[(50.0, 60.0), (150.0, 40.0), (250.0, 20.0)]);
    assert_eq!(engine.board().sequence(&cids[0]).unwrap(), &[p]);
    assert_eq!(engine.board().sequence(&cids[1]).unwrap(), &[q, r]);

    let expected = BoardEvent::MovedAcross {
        item_id: q,
        from_container_id: cids[0],
        to_container_id: cids[1],
        new_index: 0,
    };
    assert_eq!(drain(&mut rx_from), vec![expected.clone()]);
    assert_eq!(drain(&mut rx_to), vec![expected]);

    engine.settle().await;
    let batches = store.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(ids(&batches[0]), HashSet::from([q, r]));
}

#[tokio::test]
async fn pointer_drop_on_empty_column_appends() {
    let (mut engine, _store, cids, items) = engine_with(EngineConfig::default(), &[2, 0]);
    drag(&mut engine, &[(50.0, 20.0), (150.0, 20.0), (250.0, 200.0)]);
    assert_eq!(engine.board().sequence(&cids[1]).unwrap(), &[items[0][0]]);
    engine.settle().await;
}

#[tokio::test]
async fn cancelled_drag_leaves_board_identical() {
    let (mut engine, store, _cids, _items) = engine_with(EngineConfig::default(), &[3, 2]);
    let before = engine.board().clone();

    engine.pointer(&PointerEvent::down(50.0, 20.0)).unwrap();
    engine.pointer(&PointerEvent::moved(250.0, 20.0)).unwrap();
    assert_eq!(engine.drag_phase(), DragPhase::Dragging);
    let step = engine.cancel_drag().unwrap();
    assert!(matches!(step, DragStep::Cancelled { .. }));
    assert_eq!(engine.board(), &before);

    // Released outside every zone.
    let step = drag(&mut engine, &[(50.0, 20.0), (50.0, 60.0), (900.0, 900.0)]);
    assert!(matches!(step, DragStep::Cancelled { .. }));
    assert_eq!(engine.board(), &before);

    assert_eq!(engine.in_flight(), 0);
    engine.settle().await;
    assert!(store.batches().is_empty());
}

#[tokio::test]
async fn click_is_not_a_drag() {
    let (mut engine, _store, _cids, items) = engine_with(EngineConfig::default(), &[3]);
    let before = engine.board().clone();
    let step = drag(&mut engine, &[(50.0, 20.0), (52.0, 22.0), (52.0, 22.0)]);
    assert_eq!(step, DragStep::Click { item_id: items[0][0] });
    assert_eq!(engine.board(), &before);
}

#[tokio::test]
async fn drop_on_origin_changes_nothing() {
    let (mut engine, _store, _cids, _items) = engine_with(EngineConfig::default(), &[3]);
    let before = engine.board().clone();
    let step = drag(&mut engine, &[(50.0, 60.0), (80.0, 60.0), (50.0, 60.0)]);
    assert!(matches!(step, DragStep::Unchanged { .. }));
    assert_eq!(engine.board(), &before);
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test]
async fn too_many_drop_zones_rejected() {
    let (mut engine, _store, cids, _items) = engine_with(EngineConfig::default(), &[0]);
    let zone = DropZone {
        target: DropTarget::Container { container_id: cids[0] },
        rect: Rect::new(0.0, 0.0, 1.0, 1.0),
    };
    let result = engine.set_drop_zones(vec![zone; MAX_DROP_ZONES + 1]);
    assert!(matches!(result, Err(BoardError::LimitExceeded(_))));
}

// ── Engine: persistence failures ─────────────────────────

#[tokio::test]
async fn failed_write_keeps_optimistic_state() {
    let (mut engine, store, cids, items) = engine_with(EngineConfig::default(), &[3]);
    let mut all = engine.notify.subscribe_all();
    store.set_failing(true);

    engine.move_within(cids[0], 0, 2).unwrap();
    let reports = engine.settle().await;
    assert_eq!(reports.len(), 1);
    assert!(reports[0].result.is_err());

    let (a, b, c) = (items[0][0], items[0][1], items[0][2]);
    assert_eq!(engine.board().sequence(&cids[0]).unwrap(), &[b, c, a]);
    let events = drain(&mut all);
    assert!(matches!(events.last(), Some(BoardEvent::PersistFailed { .. })));
    assert!(!events.iter().any(|e| matches!(e, BoardEvent::RolledBack { .. })));
}

#[tokio::test]
async fn failed_write_rolls_back_when_configured() {
    let (mut engine, store, cids, items) = engine_with(rollback_config(), &[2, 1]);
    let before = engine.board().clone();
    let mut all = engine.notify.subscribe_all();
    store.set_failing(true);

    engine
        .move_across(items[0][1], cids[0], cids[1], 0)
        .unwrap();
    assert_ne!(engine.board(), &before);
    engine.settle().await;

    assert_eq!(engine.board(), &before);
    engine.board().check_invariants().unwrap();
    let events = drain(&mut all);
    assert!(matches!(events[0], BoardEvent::MovedAcross { .. }));
    assert!(matches!(events[1], BoardEvent::PersistFailed { .. }));
    assert_eq!(
        events[2],
        BoardEvent::RolledBack {
            ticket: 0,
            container_ids: vec![cids[0], cids[1]],
        }
    );
    assert_eq!(events.len(), 5);
}

#[tokio::test]
async fn rollback_skipped_after_later_edit() {
    let (mut engine, store, cids, items) = engine_with(rollback_config(), &[3]);
    store.set_failing(true);
    store.set_delay(Some(Duration::from_millis(20)));

    engine.move_within(cids[0], 0, 2).unwrap();
    assert!(engine.poll_persistence().is_empty());
    assert_eq!(engine.in_flight(), 1);
    let extra = Ulid::new();
    engine.board_mut().insert_item(cids[0], 0, extra, 99).unwrap();
    let edited = engine.board().clone();

    engine.settle().await;
    assert_eq!(engine.board(), &edited);
    assert_eq!(engine.board().sequence(&cids[0]).unwrap()[0], extra);
    assert_eq!(engine.board().sequence(&cids[0]).unwrap()[3], items[0][0]);
}

#[tokio::test]
async fn failures_surface_without_polling() {
    let (mut engine, store, cids, _items) = engine_with(EngineConfig::default(), &[3]);
    let mut all = engine.notify.subscribe_all();
    store.set_failing(true);

    for _ in 0..5 {
        engine.move_within(cids[0], 0, 2).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    let events = drain(&mut all);
    let mut failed: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            BoardEvent::PersistFailed { ticket, item_ids, .. } => {
                assert!(!item_ids.is_empty());
                Some(*ticket)
            }
            _ => None,
        })
        .collect();
    failed.sort_unstable();
    assert_eq!(failed, vec![0, 1, 2, 3, 4]);
    // Nothing was reconciled, so the writes are still tracked.
    assert_eq!(engine.in_flight(), 5);
    assert_eq!(engine.poll_persistence().len(), 5);
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test]
async fn successful_write_is_not_rolled_back() {
    let (mut engine, store, cids, _items) = engine_with(rollback_config(), &[3]);
    engine.move_within(cids[0], 0, 2).unwrap();
    let moved = engine.board().clone();
    engine.settle().await;
    assert_eq!(engine.board(), &moved);
    assert_eq!(store.batches().len(), 1);
}

#[tokio::test]
async fn poll_is_non_blocking() {
    let (mut engine, store, cids, _items) = engine_with(EngineConfig::default(), &[3]);
    store.set_delay(Some(Duration::from_millis(20)));
    engine.move_within(cids[0], 0, 1).unwrap();
    engine.move_within(cids[0], 2, 0).unwrap();
    assert!(engine.poll_persistence().is_empty());
    assert_eq!(engine.in_flight(), 2);

    let reports = engine.settle().await;
    let tickets: HashSet<u64> = reports.iter().map(|r| r.ticket).collect();
    assert_eq!(tickets, HashSet::from([0, 1]));
    assert_eq!(store.batches().len(), 2);
}

// ── Engine: resize ───────────────────────────────────────

#[tokio::test]
async fn resize_commit_notifies() {
    let (engine, _store, _cids, items) = engine_with(EngineConfig::default(), &[1]);
    let mut all = engine.notify.subscribe_all();
    let start = NaiveTime::from_hms_opt(23, 30, 0).unwrap();
    let mut gesture = engine.resize_controller().begin(
        items[0][0],
        start,
        chrono::Duration::minutes(60),
        100.0,
    );
    assert_eq!(gesture.update(140.0), chrono::Duration::minutes(90));

    let commit = engine.commit_resize(gesture);
    assert_eq!(commit.end, NaiveTime::from_hms_opt(1, 0, 0).unwrap());
    assert!(commit.wraps_midnight());
    assert_eq!(
        drain(&mut all),
        vec![BoardEvent::ResizeCommitted {
            item_id: items[0][0],
            end: commit.end,
        }]
    );
}

#[tokio::test]
async fn untouched_resize_is_silent() {
    let (engine, _store, _cids, items) = engine_with(EngineConfig::default(), &[1]);
    let mut all = engine.notify.subscribe_all();
    let start = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
    let gesture = engine.resize_controller().begin(
        items[0][0],
        start,
        chrono::Duration::minutes(45),
        0.0,
    );
    let commit = engine.commit_resize(gesture);
    assert!(!commit.changed);
    assert_eq!(commit.duration, chrono::Duration::minutes(45));
    assert!(drain(&mut all).is_empty());
}

#[tokio::test]
async fn reschedule_commit_notifies() {
    let (engine, _store, _cids, items) = engine_with(EngineConfig::default(), &[1]);
    let mut all = engine.notify.subscribe_all();
    let start = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
    let mut gesture = engine.resize_controller().begin_reschedule(
        items[0][0],
        start,
        chrono::Duration::minutes(45),
        0.0,
    );
    gesture.update(-58.0);
    let commit = engine.commit_reschedule(gesture);
    assert_eq!(commit.start, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
    assert_eq!(commit.end, NaiveTime::from_hms_opt(8, 45, 0).unwrap());
    assert!(matches!(
        drain(&mut all).as_slice(),
        [BoardEvent::Rescheduled { .. }]
    ));
}
