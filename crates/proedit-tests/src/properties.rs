//! Randomized request sequences.
//!
//! Any sequence of requests, successful or not, leaves the model
//! consistent, and undoing everything returns it to the empty timeline.

use proedit_core::ItemId;
use proedit_timeline::{EditOptions, GroupType};
use proptest::prelude::*;

use crate::fixture::{fixture, Fixture};

#[derive(Debug, Clone)]
enum Op {
    Insert { bin: usize, length: i64, track: usize, position: i64 },
    Compose { track: usize, position: i64, length: i64 },
    Move { item: usize, track: usize, position: i64 },
    GroupMove { item: usize, delta_track: isize, delta_pos: i64 },
    Resize { item: usize, size: i64, right: bool, snap: i64 },
    Group { first: usize, second: usize },
    Ungroup { item: usize },
    Select { first: usize, second: usize },
    Delete { item: usize },
    Undo,
    Redo,
}

const BINS: [&str; 4] = ["av", "v", "a", "still"];

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..BINS.len(), 1i64..60, 0usize..4, 0i64..300)
            .prop_map(|(bin, length, track, position)| Op::Insert { bin, length, track, position }),
        1 => (2usize..4, 0i64..300, 1i64..40)
            .prop_map(|(track, position, length)| Op::Compose { track, position, length }),
        3 => (any::<usize>(), 0usize..4, 0i64..300)
            .prop_map(|(item, track, position)| Op::Move { item, track, position }),
        2 => (any::<usize>(), -2isize..=2, -60i64..60)
            .prop_map(|(item, delta_track, delta_pos)| Op::GroupMove {
                item,
                delta_track,
                delta_pos,
            }),
        2 => (any::<usize>(), 1i64..80, any::<bool>(), 0i64..8)
            .prop_map(|(item, size, right, snap)| Op::Resize { item, size, right, snap }),
        1 => (any::<usize>(), any::<usize>())
            .prop_map(|(first, second)| Op::Group { first, second }),
        1 => any::<usize>().prop_map(|item| Op::Ungroup { item }),
        1 => (any::<usize>(), any::<usize>())
            .prop_map(|(first, second)| Op::Select { first, second }),
        1 => any::<usize>().prop_map(|item| Op::Delete { item }),
        2 => Just(Op::Undo),
        1 => Just(Op::Redo),
    ]
}

// ── Helpers ────────────────────────────────────────────────────

fn items(f: &Fixture) -> Vec<ItemId> {
    let mut items: Vec<ItemId> = f.model.clip_ids().chain(f.model.composition_ids()).collect();
    items.sort();
    items
}

fn pick(items: &[ItemId], index: usize) -> Option<ItemId> {
    (!items.is_empty()).then(|| items[index % items.len()])
}

/// Run one request; a failed request must not touch the history.
fn run(f: &mut Fixture, tracks: &[ItemId; 4], op: &Op) {
    let items = items(f);
    let before = f.model.undo_stack().undo_count();
    let outcome = match *op {
        Op::Insert { bin, length, track, position } => f
            .model
            .request_clip_insertion(
                &format!("{}/0/{}", BINS[bin], length - 1),
                tracks[track],
                position,
                EditOptions::default(),
            )
            .map(|_| ()),
        Op::Compose { track, position, length } => f
            .model
            .request_composition_insertion("dissolve", tracks[track], position, length, None)
            .map(|_| ()),
        Op::Move { item, track, position } => match pick(&items, item) {
            Some(id) if id.is_clip() => {
                f.model
                    .request_clip_move(id, tracks[track], position, EditOptions::default())
            }
            Some(id) => f
                .model
                .request_composition_move(id, tracks[track], position, EditOptions::default()),
            None => return,
        },
        Op::GroupMove { item, delta_track, delta_pos } => match pick(&items, item) {
            Some(id) => {
                let root = f.model.groups().root_id(id);
                if root == id {
                    return;
                }
                f.model
                    .request_group_move(id, root, delta_track, delta_pos, EditOptions::default())
            }
            None => return,
        },
        Op::Resize { item, size, right, snap } => match pick(&items, item) {
            Some(id) => f.model.request_item_resize(id, size, right, true, snap, false).map(|_| ()),
            None => return,
        },
        Op::Group { first, second } => match (pick(&items, first), pick(&items, second)) {
            (Some(a), Some(b)) => {
                f.model.request_clips_group(&[a, b], GroupType::Normal).map(|_| ())
            }
            _ => return,
        },
        Op::Ungroup { item } => match pick(&items, item) {
            Some(id) => f.model.request_clip_ungroup(id),
            None => return,
        },
        Op::Select { first, second } => match (pick(&items, first), pick(&items, second)) {
            (Some(a), Some(b)) => f.model.request_set_selection(&[a, b]),
            _ => return,
        },
        Op::Delete { item } => match pick(&items, item) {
            Some(id) => f.model.request_item_deletion(id, true),
            None => return,
        },
        Op::Undo => {
            f.model.undo().unwrap();
            return;
        }
        Op::Redo => {
            f.model.redo().unwrap();
            return;
        }
    };
    if outcome.is_err() {
        assert_eq!(f.model.undo_stack().undo_count(), before, "{op:?} failed but left history");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn random_requests_keep_model_consistent(ops in prop::collection::vec(op(), 1..40)) {
        let mut f = fixture();
        let tracks = f.standard_tracks();
        for op in &ops {
            run(&mut f, &tracks, op);
            let check = f.model.check_consistency();
            prop_assert!(check.is_ok(), "after {:?}: {:?}", op, check);
        }
        while f.model.undo().unwrap() {
            prop_assert!(f.model.check_consistency().is_ok());
        }
        prop_assert_eq!(f.model.tracks_count(), 0);
        prop_assert_eq!(f.engine.live_producers(), 0);
        prop_assert_eq!(f.engine.live_transitions(), 0);
    }

    #[test]
    fn group_move_undo_restores_positions(
        lengths in prop::collection::vec(1i64..50, 2..6),
        delta_track in -1isize..=1,
        delta_pos in -100i64..100,
    ) {
        let mut f = fixture();
        let [_, _, v1, v2] = f.standard_tracks();
        let clips: Vec<ItemId> = lengths
            .iter()
            .enumerate()
            .map(|(i, length)| {
                let track = if i % 2 == 0 { v1 } else { v2 };
                f.insert("v", *length, track, 100 + 60 * i as i64)
            })
            .collect();
        let group = f.model.request_clips_group(&clips, GroupType::Normal).unwrap();
        let before: Vec<_> = clips
            .iter()
            .map(|c| (f.model.item_track(*c), f.model.item_position(*c)))
            .collect();

        let moved = f
            .model
            .request_group_move(clips[0], group, delta_track, delta_pos, EditOptions::default())
            .is_ok();
        f.check();
        if moved && (delta_track, delta_pos) != (0, 0) {
            f.model.undo().unwrap();
        }
        let after: Vec<_> = clips
            .iter()
            .map(|c| (f.model.item_track(*c), f.model.item_position(*c)))
            .collect();
        prop_assert_eq!(before, after);
        f.check();
    }
}
