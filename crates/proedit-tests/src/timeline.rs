//! Editing scenarios across tracks, groups, compositions and persistence.

use proedit_core::{ItemId, ProEditError};
use proedit_timeline::{
    ATrack, EditOptions, GroupType, HistoryFile, MarkerListModel, MediaEngine, ModelChange,
    TimelineConfig, TimelineModel,
};

use crate::fixture::{fixture, Fixture};

// ── Helpers ────────────────────────────────────────────────────

/// Three video clips and one AV clip on the standard tracks.
fn layout(f: &mut Fixture) -> ([ItemId; 4], Vec<ItemId>) {
    let tracks = f.standard_tracks();
    let [_, _, v1, v2] = tracks;
    let clips = vec![
        f.insert("v", 20, v1, 0),
        f.insert("v", 20, v1, 40),
        f.insert("v", 20, v2, 10),
        f.insert("av", 30, v1, 100),
    ];
    (tracks, clips)
}

// ── AV split ───────────────────────────────────────────────────

#[test]
fn av_insertion_lands_on_mirror_track() {
    let mut f = fixture();
    let [a2, a1, v1, v2] = f.standard_tracks();
    let video = f.insert("av", 50, v1, 100);
    let audio = f.model.groups().split_partner(video).unwrap();
    assert_eq!(f.model.item_track(audio), Some(a1));
    assert_eq!(f.model.item_position(audio), Some(100));
    assert_eq!(f.model.groups().kind(f.model.groups().root_id(video)), GroupType::AvSplit);
    assert_eq!(f.context.usage_count("av"), 2);

    let upper = f.insert("av", 50, v2, 0);
    let upper_audio = f.model.groups().split_partner(upper).unwrap();
    assert_eq!(f.model.item_track(upper_audio), Some(a2));
    f.check();
    f.unwind();
}

#[test]
fn av_halves_move_in_opposite_directions() {
    let mut f = fixture();
    let [a2, a1, v1, v2] = f.standard_tracks();
    let video = f.insert("av", 50, v1, 100);
    let audio = f.model.groups().split_partner(video).unwrap();

    f.model.request_clip_move(video, v2, 110, EditOptions::default()).unwrap();
    assert_eq!(f.model.item_track(video), Some(v2));
    assert_eq!(f.model.item_track(audio), Some(a2));
    assert_eq!(f.model.item_position(audio), Some(110));
    f.check();

    // No track above V2: the vertical part is dropped, the shift stays.
    f.model.request_clip_move(video, v2, 130, EditOptions::default()).unwrap();
    f.model
        .request_group_move(video, f.model.groups().root_id(video), 1, 5, EditOptions::default())
        .unwrap();
    assert_eq!(f.model.item_track(video), Some(v2));
    assert_eq!(f.model.item_position(audio), Some(135));
    f.check();

    f.model.undo().unwrap();
    f.model.undo().unwrap();
    f.model.undo().unwrap();
    assert_eq!(f.model.item_track(audio), Some(a1));
    assert_eq!(f.model.item_position(video), Some(100));
    f.check();
}

#[test]
fn av_resize_drags_partner_unless_locked() {
    let mut f = fixture();
    let [_, a1, v1, _] = f.standard_tracks();
    let video = f.insert("av", 50, v1, 100);
    let audio = f.model.groups().split_partner(video).unwrap();

    f.model.request_item_resize(video, 30, true, true, 0, false).unwrap();
    assert_eq!(f.model.item_playtime(audio), Some(30));

    f.model.set_track_locked_state(a1, true).unwrap();
    f.model.request_item_resize(video, 20, true, true, 0, false).unwrap();
    assert_eq!(f.model.item_playtime(video), Some(20));
    assert_eq!(f.model.item_playtime(audio), Some(30));
    f.check();
}

// ── Groups ─────────────────────────────────────────────────────

#[test]
fn deleting_grouped_clip_deletes_group_and_undo_restores_it() {
    let mut f = fixture();
    let (_, clips) = layout(&mut f);
    let inner = f.model.request_clips_group(&clips[..2], GroupType::Normal).unwrap();
    let outer = f.model.request_clips_group(&[inner, clips[2]], GroupType::Normal).unwrap();

    f.model.request_item_deletion(clips[0], true).unwrap();
    assert_eq!(f.model.undo_stack().undo_label(), Some("Delete group"));
    assert!(clips[..3].iter().all(|c| !f.model.is_clip(*c)));
    assert!(f.model.is_clip(clips[3]));
    assert_eq!(f.context.usage_count("v"), 0);
    f.check();

    f.model.undo().unwrap();
    assert_eq!(f.model.groups().root_id(clips[0]), outer);
    assert_eq!(f.model.groups().direct_ancestor(clips[1]), Some(inner));
    assert_eq!(f.model.item_position(clips[1]), Some(40));
    assert_eq!(f.context.usage_count("v"), 3);
    f.check();
    f.unwind();
}

#[test]
fn groups_json_rebuilds_structure_on_another_timeline() {
    let mut f = fixture();
    let (_, clips) = layout(&mut f);
    let inner = f.model.request_clips_group(&clips[..2], GroupType::Normal).unwrap();
    f.model.request_clips_group(&[inner, clips[2]], GroupType::Normal).unwrap();
    // Selections are not persisted.
    f.model.request_set_selection(&[clips[0], clips[3]]).unwrap();
    let json = f.model.groups_to_json().unwrap();
    assert!(json.contains("AVSplit"));
    assert!(!json.contains("Selection"));

    let mut other = fixture();
    let (_, copies) = layout(&mut other);
    other.model.request_clip_ungroup(copies[3]).unwrap();
    other.model.groups_from_json(&json).unwrap();
    let groups = other.model.groups();
    assert_eq!(groups.root_id(copies[0]), groups.root_id(copies[2]));
    assert_eq!(groups.direct_ancestor(copies[0]), groups.direct_ancestor(copies[1]));
    assert_ne!(groups.direct_ancestor(copies[0]), groups.direct_ancestor(copies[2]));
    assert!(groups.split_partner(copies[3]).is_some());
    other.check();

    // V1 has no clip starting at 7.
    let bad = json.replace("\"2:0\"", "\"2:7\"");
    let mut third = fixture();
    let (_, thirds) = layout(&mut third);
    third.model.request_clip_ungroup(thirds[3]).unwrap();
    let before = third.model.groups().group_count();
    assert!(third.model.groups_from_json(&bad).is_err());
    assert_eq!(third.model.groups().group_count(), before);
    third.check();
}

#[test]
fn selection_moves_as_one_and_is_never_logged() {
    let mut f = fixture();
    let (_, clips) = layout(&mut f);
    let history = f.model.undo_stack().undo_count();
    f.model.request_set_selection(&[clips[0], clips[2]]).unwrap();
    assert_eq!(f.model.undo_stack().undo_count(), history);

    let track = f.model.item_track(clips[0]).unwrap();
    f.model
        .request_clip_move(clips[0], track, 5, EditOptions::default())
        .unwrap();
    assert_eq!(f.model.item_position(clips[2]), Some(15));
    assert!(f.model.is_selected(clips[2]));
    f.check();

    f.model.undo().unwrap();
    assert!(f.model.selection().is_empty());
    assert_eq!(f.model.groups().group_count(), 1);
    f.check();
}

// ── Compositions ───────────────────────────────────────────────

#[test]
fn composition_follows_track_deletion() {
    let mut f = fixture();
    let [_, _, v1, v2] = f.standard_tracks();
    f.insert("v", 20, v1, 0);
    let compo = f
        .model
        .request_composition_insertion("dissolve", v2, 0, 20, None)
        .unwrap();
    let transition = f.model.composition(compo).unwrap().transition();
    let planted = |f: &Fixture| {
        f.engine
            .planted_transitions()
            .into_iter()
            .find(|p| p.transition == transition)
            .map(|p| (p.a_track, p.b_track))
    };
    assert_eq!(planted(&f), Some((3, 4)));

    f.model.request_track_deletion(v1).unwrap();
    assert_eq!(planted(&f), Some((0, 3)));
    f.check();

    f.model.undo().unwrap();
    assert_eq!(planted(&f), Some((3, 4)));
    assert_eq!(f.model.composition_a_track(compo), Some(ATrack::Auto));
    f.check();
    f.unwind();
}

#[test]
fn composition_cannot_overlap_composition() {
    let mut f = fixture();
    let [_, _, _, v2] = f.standard_tracks();
    f.model.request_composition_insertion("wipe", v2, 0, 20, None).unwrap();
    let err = f
        .model
        .request_composition_insertion("wipe", v2, 10, 20, None)
        .unwrap_err();
    assert!(err.is_infeasible());
    assert_eq!(f.model.composition_ids().count(), 1);
    f.check();
}

// ── View notifications ─────────────────────────────────────────

#[test]
fn views_hear_about_rows_and_duration() {
    let mut f = fixture();
    let [_, _, v1, _] = f.standard_tracks();
    let rx = f.model.subscribe();
    let clip = f.insert("v", 20, v1, 30);
    let parent = f.model.track_index(v1);
    let events: Vec<ModelChange> = rx.try_iter().collect();
    assert!(events.iter().any(|e| matches!(
        e,
        ModelChange::RowsInserted { parent: p, first: 0, last: 0 } if *p == parent
    )));
    assert!(events.contains(&ModelChange::DurationChanged { duration: 50 }));

    f.model.request_clip_move(clip, v1, 60, EditOptions::default()).unwrap();
    let events: Vec<ModelChange> = rx.try_iter().collect();
    assert!(events.iter().any(|e| matches!(e, ModelChange::RowsRemoved { .. })));
    assert!(events.contains(&ModelChange::DurationChanged { duration: 80 }));
}

// ── Markers and history ────────────────────────────────────────

#[test]
fn markers_act_as_snap_guides() {
    let mut f = fixture();
    let [_, _, v1, _] = f.standard_tracks();
    let clip = f.insert("v", 20, v1, 0);
    let mut markers = MarkerListModel::new([0, 1]);
    let data = r#"[{"pos": 97, "comment": "beat"}, {"pos": 200, "type": 1, "duration": 24}]"#;
    markers.import_json(data, false).unwrap();
    let guides = markers.snap_positions();
    for guide in &guides {
        f.model.add_snap(*guide);
    }
    f.model.check_consistency_with_guides(&guides).unwrap();

    let (position, _) = f.model.suggest_clip_move(clip, v1, 75, None, 5).unwrap();
    assert_eq!(position, 77);
    let (position, _) = f.model.suggest_clip_move(clip, v1, 222, None, 5).unwrap();
    assert_eq!(position, 224);
    f.model.check_consistency_with_guides(&guides).unwrap();
}

#[test]
fn history_file_rebuilds_timeline() {
    let mut f = fixture();
    let (tracks, clips) = layout(&mut f);
    f.model.request_clips_group(&clips[..2], GroupType::Normal).unwrap();
    f.model.request_item_resize(clips[2], 15, false, true, 0, false).unwrap();
    f.model
        .request_composition_insertion("luma", tracks[3], 40, 10, Some(ATrack::Background))
        .unwrap();

    let path = std::env::temp_dir().join(format!("proedit-history-{}.json", f.model.uuid()));
    f.model.export_history().unwrap().save_to_file(&path).unwrap();
    let history = HistoryFile::load_from_file(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    let mut copy = fixture();
    copy.model = TimelineModel::with_uuid(
        history.timeline,
        copy.engine.clone(),
        copy.context.clone(),
        TimelineConfig::default(),
    );
    copy.model.replay_history(&history).unwrap();
    copy.check();
    assert_eq!(copy.model.item_bounds(clips[2]), f.model.item_bounds(clips[2]));
    assert_eq!(copy.model.groups().root_id(clips[0]), f.model.groups().root_id(clips[1]));
    assert_eq!(copy.model.duration(), f.model.duration());
    assert_eq!(copy.engine.planted_transitions().len(), 1);
    copy.unwind();
}

#[test]
fn failed_requests_are_invisible() {
    let mut f = fixture();
    let (tracks, clips) = layout(&mut f);
    let history = f.model.undo_stack().undo_count();
    let duration = f.model.duration();

    assert!(matches!(
        f.model.request_clip_insertion("nope/0/9", tracks[2], 500, EditOptions::default()),
        Err(ProEditError::Media(_))
    ));
    assert!(f.model.request_clip_move(clips[0], tracks[2], 45, EditOptions::default()).is_err());
    assert!(f.model.request_clip_move(clips[0], tracks[0], 0, EditOptions::default()).is_err());
    // Nothing left of the first clip to grow into.
    assert!(f.model.request_item_resize(clips[0], 30, false, true, 0, false).is_err());
    assert!(matches!(
        f.model.request_clip_move(ItemId::Clip(u64::MAX), tracks[2], 0, EditOptions::default()),
        Err(ProEditError::NotFound(_))
    ));

    assert_eq!(f.model.undo_stack().undo_count(), history);
    assert_eq!(f.model.duration(), duration);
    assert_eq!(f.model.item_position(clips[0]), Some(0));
    f.check();
}
