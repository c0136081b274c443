//! Views reading a timeline while another thread edits it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use proedit_timeline::{EditOptions, ModelChange, Role, RoleValue, SharedTimeline};

use crate::fixture::fixture;

#[test]
fn readers_never_observe_half_applied_requests() {
    let mut f = fixture();
    let [_, _, v1, v2] = f.standard_tracks();
    let engine = f.engine.clone();
    let timeline = SharedTimeline::new(f.model);
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let timeline = timeline.clone();
            let done = done.clone();
            thread::spawn(move || {
                let mut checks = 0;
                while !done.load(Ordering::Acquire) {
                    let model = timeline.read();
                    model.check_consistency().unwrap();
                    let rows: usize = model.tracks().iter().map(|t| t.row_count()).sum();
                    assert_eq!(rows, model.clip_ids().count() + model.composition_ids().count());
                    checks += 1;
                }
                checks
            })
        })
        .collect();

    for i in 0..30 {
        let mut model = timeline.write();
        let clip = model
            .request_clip_insertion("av/0/9", v1, i * 20, EditOptions::default())
            .unwrap();
        if i % 3 == 0 {
            model.request_clip_move(clip, v2, i * 20 + 5, EditOptions::default()).unwrap();
        }
    }
    while timeline.undo().unwrap() {}
    done.store(true, Ordering::Release);

    for reader in readers {
        reader.join().unwrap();
    }
    let model = timeline.read();
    assert_eq!(model.tracks_count(), 0);
    model.check_consistency().unwrap();
    assert_eq!(engine.live_producers(), 0);
}

#[test]
fn notifications_cross_threads() {
    let mut f = fixture();
    let [_, _, v1, _] = f.standard_tracks();
    let timeline = SharedTimeline::new(f.model);
    let rx = timeline.subscribe();

    let listener = thread::spawn(move || {
        let mut inserted = 0;
        let mut last_duration = 0;
        for change in rx.iter() {
            match change {
                ModelChange::RowsInserted { parent: Some(_), .. } => inserted += 1,
                ModelChange::DurationChanged { duration } => {
                    assert!(duration > last_duration);
                    last_duration = duration;
                    if duration == 100 {
                        break;
                    }
                }
                _ => {}
            }
        }
        (inserted, last_duration)
    });

    for i in 0..5 {
        timeline
            .write()
            .request_clip_insertion("v/0/19", v1, i * 20, EditOptions::default())
            .unwrap();
    }

    let (inserted, duration) = listener.join().unwrap();
    assert_eq!(inserted, 5);
    assert_eq!(duration, 100);

    let model = timeline.read();
    let clip = model.clip_by_position(v1, 40).unwrap();
    let index = model.item_index(clip).unwrap();
    assert_eq!(model.data(&index, Role::Start), Some(RoleValue::Int(40)));
}
