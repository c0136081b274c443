//! Native engine objects follow the model's lifetime.

use proedit_core::ProEditError;
use proedit_timeline::{ATrack, EditOptions, GroupType, MediaEngine};

use crate::fixture::fixture;

#[test]
fn undo_redo_cycles_do_not_leak() {
    let mut f = fixture();
    let [_, _, v1, v2] = f.standard_tracks();
    let clip = f.insert("av", 40, v1, 0);
    f.insert("v", 40, v2, 20);
    f.model.request_composition_insertion("dissolve", v2, 20, 20, None).unwrap();
    assert_eq!(f.engine.live_producers(), 3);
    assert_eq!(f.engine.live_transitions(), 1);

    for _ in 0..5 {
        f.model.request_item_deletion(clip, true).unwrap();
        assert_eq!(f.engine.live_producers(), 1);
        f.model.undo().unwrap();
        f.model.redo().unwrap();
        f.model.undo().unwrap();
        assert_eq!(f.engine.live_producers(), 3);
        f.check();
    }
    assert_eq!(f.engine.track_count(), 5);
    f.unwind();
    assert_eq!(f.engine.track_count(), 1);
}

#[test]
fn dropping_the_model_releases_everything() {
    let mut f = fixture();
    let [_, a1, v1, v2] = f.standard_tracks();
    f.insert("av", 40, v1, 0);
    f.insert("a", 10, a1, 100);
    f.model
        .request_composition_insertion("wipe", v2, 0, 10, Some(ATrack::Background))
        .unwrap();
    let engine = f.engine.clone();
    assert!(engine.live_producers() > 0);

    drop(f);
    assert_eq!(engine.live_producers(), 0);
    assert_eq!(engine.live_transitions(), 0);
    assert_eq!(engine.track_count(), 1);
    assert!(engine.planted_transitions().is_empty());
}

#[test]
fn failed_plant_during_track_insertion_unwinds() {
    let mut f = fixture();
    let [_, _, v1, v2] = f.standard_tracks();
    f.insert("v", 20, v1, 0);
    f.model.request_composition_insertion("dissolve", v2, 0, 20, None).unwrap();
    let history = f.model.undo_stack().undo_count();

    f.engine.fail_next_plant();
    let err = f.model.request_track_insertion(Some(3), "V1b", false).unwrap_err();
    assert!(matches!(err, ProEditError::Engine(_)));
    assert_eq!(f.model.tracks_count(), 4);
    assert_eq!(f.engine.track_count(), 5);
    assert_eq!(f.model.undo_stack().undo_count(), history);
    assert_eq!(f.engine.planted_transitions().len(), 1);
    f.check();

    f.model.request_track_insertion(Some(3), "V1b", false).unwrap();
    f.check();
    f.unwind();
}

#[test]
fn failed_replant_after_a_refused_step_is_reported() {
    let mut f = fixture();
    let [_, _, v1, v2] = f.standard_tracks();
    f.insert("v", 20, v1, 0);
    f.model.request_composition_insertion("dissolve", v2, 0, 20, None).unwrap();
    let history = f.model.undo_stack().undo_count();

    f.engine.fail_plants(2);
    let err = f.model.request_track_insertion(Some(3), "V1b", false).unwrap_err();
    assert!(matches!(&err, ProEditError::Engine(msg) if msg.contains("replanting failed")));
    assert_eq!(f.model.tracks_count(), 4);
    assert_eq!(f.engine.track_count(), 5);
    assert_eq!(f.model.undo_stack().undo_count(), history);
    assert!(f.engine.planted_transitions().is_empty());

    // The next structural edit rebuilds the field.
    f.model.request_track_insertion(None, "V3", false).unwrap();
    assert_eq!(f.engine.planted_transitions().len(), 1);
    f.check();
    f.unwind();
}

#[test]
fn grouping_requests_own_no_native_objects() {
    let mut f = fixture();
    let [_, _, v1, v2] = f.standard_tracks();
    let a = f.insert("v", 10, v1, 0);
    let b = f.insert("v", 10, v2, 0);
    let producers = f.engine.live_producers();

    let group = f.model.request_clips_group(&[a, b], GroupType::Normal).unwrap();
    f.model.request_group_move(a, group, 0, 30, EditOptions::default()).unwrap();
    f.model.request_clip_ungroup(a).unwrap();
    assert_eq!(f.engine.live_producers(), producers);
    assert_eq!(f.engine.field_lock_depth(), 0);
    f.check();
    f.unwind();
}
