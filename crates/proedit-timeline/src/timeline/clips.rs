//! Clip creation and insertion.

use std::fmt;
use std::str::FromStr;

use proedit_core::{ItemId, ProEditError, Result};
use tracing::debug;

use super::{EditOptions, TimelineModel};
use crate::clip::{ClipKind, ClipSnapshot, PlaylistState};
use crate::context::BinClipInfo;
use crate::edit::{EditCommand, Transaction};
use crate::groups::GroupType;
use crate::item::ItemBounds;

/// Reference to (a cropped part of) a bin clip: `"[A|V]<bin>[/<in>/<out>]"`.
///
/// The `A`/`V` prefix forces the audio or video part and is only recognised
/// when a digit follows it, so bin ids starting with a letter parse as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinRef {
    pub bin_id: String,
    /// Inclusive source range.
    pub range: Option<(i64, i64)>,
    pub state: Option<PlaylistState>,
}

impl FromStr for BinRef {
    type Err = ProEditError;

    fn from_str(s: &str) -> Result<Self> {
        let mut rest = s.trim();
        let mut state = None;
        let mut chars = rest.chars();
        if let (Some(prefix @ ('A' | 'V')), Some(next)) = (chars.next(), chars.next()) {
            if next.is_ascii_digit() {
                state = Some(if prefix == 'A' {
                    PlaylistState::AudioOnly
                } else {
                    PlaylistState::VideoOnly
                });
                rest = &rest[1..];
            }
        }
        let mut parts = rest.split('/');
        let bin_id = parts.next().unwrap_or_default().to_string();
        if bin_id.is_empty() {
            return Err(ProEditError::InvalidParameter(format!("empty bin reference {s:?}")));
        }
        let range = match (parts.next(), parts.next(), parts.next()) {
            (None, None, None) => None,
            (Some(in_point), Some(out_point), None) => {
                let parse = |v: &str| {
                    v.trim().parse::<i64>().map_err(|_| {
                        ProEditError::InvalidParameter(format!("bad frame {v:?} in {s:?}"))
                    })
                };
                Some((parse(in_point)?, parse(out_point)?))
            }
            _ => {
                let msg = format!("malformed bin reference {s:?}");
                return Err(ProEditError::InvalidParameter(msg));
            }
        };
        Ok(Self { bin_id, range, state })
    }
}

impl fmt::Display for BinRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            Some(PlaylistState::AudioOnly) => write!(f, "A")?,
            Some(PlaylistState::VideoOnly) => write!(f, "V")?,
            _ => {}
        }
        write!(f, "{}", self.bin_id)?;
        if let Some((in_point, out_point)) = self.range {
            write!(f, "/{in_point}/{out_point}")?;
        }
        Ok(())
    }
}

/// Stream a clip of `kind` plays when nothing forces one.
fn default_state(kind: ClipKind, audio_track: bool) -> PlaylistState {
    match kind {
        ClipKind::Audio => PlaylistState::AudioOnly,
        ClipKind::AudioVideo if audio_track => PlaylistState::AudioOnly,
        _ => PlaylistState::VideoOnly,
    }
}

fn opposite(state: PlaylistState) -> PlaylistState {
    match state {
        PlaylistState::AudioOnly => PlaylistState::VideoOnly,
        _ => PlaylistState::AudioOnly,
    }
}

impl TimelineModel {
    fn bin_clip_info(&self, bin_id: &str) -> Result<BinClipInfo> {
        let info = self
            .context
            .bin_clip(bin_id)
            .ok_or_else(|| ProEditError::Media(format!("no bin clip {bin_id}")))?;
        if !info.ready {
            return Err(ProEditError::Media(format!("bin clip {bin_id} is not ready")));
        }
        Ok(info)
    }

    /// Register a floating clip for `bin_ref` playing `state`.
    fn create_clip(
        &mut self,
        tx: &mut Transaction,
        bin_ref: &BinRef,
        info: &BinClipInfo,
        state: PlaylistState,
    ) -> Result<ItemId> {
        let compatible = match state {
            PlaylistState::AudioOnly => info.kind.can_be_audio(),
            PlaylistState::VideoOnly => info.kind.can_be_video(),
            PlaylistState::Disabled => true,
        };
        if !compatible {
            return Err(ProEditError::Media(format!(
                "bin clip {} ({:?}) cannot play {state:?}",
                bin_ref.bin_id, info.kind
            )));
        }
        let (in_point, out_point) = bin_ref.range.unwrap_or((0, info.length - 1));
        let in_source = in_point >= 0
            && out_point >= in_point
            && (info.kind.is_endless() || out_point < info.length);
        if !in_source {
            return Err(ProEditError::InvalidParameter(format!(
                "range [{in_point}, {out_point}] is outside bin clip {}",
                bin_ref.bin_id
            )));
        }
        let snapshot = ClipSnapshot {
            id: ItemId::new_clip(),
            bin_id: bin_ref.bin_id.clone(),
            name: info.name.clone(),
            resource: info.resource.clone(),
            kind: info.kind,
            state,
            bounds: ItemBounds::new(0, in_point, out_point),
            max_duration: info.length,
            speed: 1.0,
            effects: Vec::new(),
        };
        let id = snapshot.id;
        self.exec(tx, EditCommand::RegisterClip { clip: snapshot })?;
        Ok(id)
    }

    /// Create a clip that is not on any track yet.
    pub fn request_clip_creation(&mut self, bin_ref: &str, state: PlaylistState) -> Result<ItemId> {
        let parsed: BinRef = bin_ref.parse()?;
        debug!(bin = %parsed, ?state, "request_clip_creation");
        let info = self.bin_clip_info(&parsed.bin_id)?;
        let state = parsed.state.unwrap_or(state);
        self.transact("Create clip", EditOptions::default(), |model, tx| {
            model.create_clip(tx, &parsed, &info, state)
        })
    }

    /// Create a clip from the bin and put it on `track` at `position`.
    ///
    /// An audio+video source without an `A`/`V` prefix also lands on the
    /// mirror track, and both parts are grouped as an AV split.
    pub fn request_clip_insertion(
        &mut self,
        bin_ref: &str,
        track: ItemId,
        position: i64,
        options: EditOptions,
    ) -> Result<ItemId> {
        let parsed: BinRef = bin_ref.parse()?;
        debug!(bin = %parsed, track = %track, position, "request_clip_insertion");
        self.require_track(track)?;
        let info = self.bin_clip_info(&parsed.bin_id)?;
        let audio_track = self.is_audio_track(track);
        match parsed.state {
            Some(PlaylistState::AudioOnly) if !audio_track => {
                let msg = format!("audio part requested on video track {track}");
                return Err(ProEditError::InvalidParameter(msg));
            }
            Some(PlaylistState::VideoOnly) if audio_track => {
                let msg = format!("video part requested on audio track {track}");
                return Err(ProEditError::InvalidParameter(msg));
            }
            _ => {}
        }
        self.transact("Insert clip", options, |model, tx| {
            model.clear_selection_silently();
            let state = parsed.state.unwrap_or_else(|| default_state(info.kind, audio_track));
            let id = model.create_clip(tx, &parsed, &info, state)?;
            model.exec(tx, EditCommand::InsertItem { track, item: id, position })?;
            if parsed.state.is_none() && info.kind == ClipKind::AudioVideo {
                if let Some(mirror) = model.mirror_track(track) {
                    let partner = model.create_clip(tx, &parsed, &info, opposite(state))?;
                    model.exec(
                        tx,
                        EditCommand::InsertItem {
                            track: mirror,
                            item: partner,
                            position,
                        },
                    )?;
                    model.group_in(tx, &[id, partner], GroupType::AvSplit)?;
                }
            }
            Ok(id)
        })
    }

    // ── Speed ───────────────────────────────────────────────────

    /// Retime one clip in place: off its track, new producer, back on.
    fn set_speed_in(&mut self, tx: &mut Transaction, clip: ItemId, speed: f64) -> Result<()> {
        let current = self
            .clip(clip)
            .ok_or_else(|| ProEditError::NotFound(format!("no clip {clip}")))?;
        if current.kind().is_endless() {
            return Err(ProEditError::Timeline(format!("{clip} has no source rate to change")));
        }
        let from = current.timing();
        let to = current.timing_at(speed);
        let placement = self.item_track(clip).map(|track| (track, from.bounds.position));
        if let Some((track, position)) = placement {
            self.exec(tx, EditCommand::RemoveItem { track, item: clip, position })?;
        }
        self.exec(tx, EditCommand::SetClipSpeed { clip, from, to })?;
        if let Some((track, position)) = placement {
            self.exec(tx, EditCommand::InsertItem { track, item: clip, position })?;
        }
        Ok(())
    }

    /// Play `clip` at `speed` times its source rate, together with its AV
    /// split partner. The clip keeps its start and its duration scales by
    /// the inverse ratio, limited by what the source provides.
    pub fn request_clip_speed_change(&mut self, clip: ItemId, speed: f64) -> Result<()> {
        debug!(clip = %clip, speed, "request_clip_speed_change");
        let current = self
            .clip(clip)
            .ok_or_else(|| ProEditError::NotFound(format!("no clip {clip}")))?;
        if !speed.is_finite() || speed <= 0.0 {
            return Err(ProEditError::InvalidParameter(format!("bad clip speed {speed}")));
        }
        if (current.speed() - speed).abs() < f64::EPSILON {
            return Ok(());
        }
        let partner = self.groups.split_partner(clip);
        self.transact("Change clip speed", EditOptions::default(), |model, tx| {
            if let Some(partner) = partner {
                model.set_speed_in(tx, partner, speed)?;
            }
            model.set_speed_in(tx, clip, speed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Resizable;
    use crate::timeline::tests::harness;
    use crate::view::{Role, RoleValue};

    #[test]
    fn test_parse_bin_ref() {
        let plain: BinRef = "12".parse().unwrap();
        assert_eq!(plain.bin_id, "12");
        assert_eq!(plain.range, None);
        assert_eq!(plain.state, None);

        let cropped: BinRef = "A12/5/24".parse().unwrap();
        assert_eq!(cropped.bin_id, "12");
        assert_eq!(cropped.range, Some((5, 24)));
        assert_eq!(cropped.state, Some(PlaylistState::AudioOnly));
        assert_eq!(cropped.to_string(), "A12/5/24");

        let lettered: BinRef = "Vid".parse().unwrap();
        assert_eq!(lettered.bin_id, "Vid");
        assert_eq!(lettered.state, None);

        assert!("".parse::<BinRef>().is_err());
        assert!("12/5".parse::<BinRef>().is_err());
        assert!("12/a/b".parse::<BinRef>().is_err());
    }

    #[test]
    fn test_creation_crops_and_floats() {
        let mut h = harness();
        let id = h.model.request_clip_creation("v/10/29", PlaylistState::VideoOnly).unwrap();
        let clip = h.model.clip(id).unwrap();
        assert_eq!(clip.bounds(), ItemBounds::new(0, 10, 29));
        assert!(h.model.item_track(id).is_none());
        assert_eq!(h.context.usage_count("v"), 1);
    }

    #[test]
    fn test_creation_rejects_bad_sources() {
        let mut h = harness();
        h.context.set_ready("v", false);
        assert!(matches!(
            h.model.request_clip_creation("v", PlaylistState::VideoOnly),
            Err(ProEditError::Media(_))
        ));
        assert!(matches!(
            h.model.request_clip_creation("a", PlaylistState::VideoOnly),
            Err(ProEditError::Media(_))
        ));
        assert!(matches!(
            h.model.request_clip_creation("a/0/100", PlaylistState::AudioOnly),
            Err(ProEditError::InvalidParameter(_))
        ));
        assert_eq!(h.model.clip_ids().count(), 0);
        assert_eq!(h.engine.live_producers(), 0);
    }

    #[test]
    fn test_av_clip_splits_onto_mirror_track() {
        let mut h = harness();
        let a1 = h.track(true);
        let v1 = h.track(false);
        let video = h.clip("av", 20, v1, 10);
        let audio = h.model.clip_by_position(a1, 10).unwrap();
        assert_eq!(h.model.clip(video).unwrap().state(), PlaylistState::VideoOnly);
        assert_eq!(h.model.clip(audio).unwrap().state(), PlaylistState::AudioOnly);
        assert_eq!(h.model.groups().split_partner(video), Some(audio));
        assert_eq!(h.model.undo_stack().undo_label(), Some("Insert clip"));
        h.check();

        h.model.undo().unwrap();
        assert_eq!(h.model.clip_ids().count(), 0);
        assert_eq!(h.model.groups().group_count(), 0);
        h.check();
    }

    #[test]
    fn test_av_clip_without_mirror_inserts_one_part() {
        let mut h = harness();
        let v1 = h.track(false);
        let id = h.clip("av", 20, v1, 0);
        assert_eq!(h.model.clip_ids().count(), 1);
        assert!(!h.model.groups().is_in_group(id));
    }

    #[test]
    fn test_forced_part_must_match_track() {
        let mut h = harness();
        h.context.add_bin_clip("7", BinClipInfo::new("take", ClipKind::AudioVideo, 50));
        let a1 = h.track(true);
        let v1 = h.track(false);
        assert!(matches!(
            h.model.request_clip_insertion("A7", v1, 0, EditOptions::default()),
            Err(ProEditError::InvalidParameter(_))
        ));
        assert!(matches!(
            h.model.request_clip_insertion("V7", a1, 0, EditOptions::default()),
            Err(ProEditError::InvalidParameter(_))
        ));
        let audio = h
            .model
            .request_clip_insertion("A7/0/9", a1, 0, EditOptions::default())
            .unwrap();
        assert!(h.model.clip(audio).unwrap().is_audio_only());
        assert!(h.model.clip_by_position(v1, 0).is_none());
        h.check();
    }

    #[test]
    fn test_overlapping_insertion_rolls_back_both_parts() {
        let mut h = harness();
        let a1 = h.track(true);
        let v1 = h.track(false);
        h.clip("a", 10, a1, 5);
        let err = h
            .model
            .request_clip_insertion("av/0/19", v1, 0, EditOptions::default())
            .unwrap_err();
        assert!(err.is_infeasible());
        assert!(h.model.clip_by_position(v1, 0).is_none());
        assert_eq!(h.model.clip_ids().count(), 1);
        assert_eq!(h.engine.live_producers(), 1);
        h.check();
    }

    #[test]
    fn test_insertion_past_frame_scale_is_refused() {
        let mut h = harness();
        let v1 = h.track(false);
        let history = h.model.undo_stack().undo_count();
        let err = h
            .model
            .request_clip_insertion("v/0/9", v1, i64::MAX - 3, EditOptions::default())
            .unwrap_err();
        assert!(err.is_infeasible());
        assert_eq!(h.model.clip_ids().count(), 0);
        assert_eq!(h.model.undo_stack().undo_count(), history);
        assert_eq!(h.model.duration(), 0);
        assert_eq!(h.engine.live_producers(), 0);
        h.check();
    }

    #[test]
    fn test_speed_change_scales_both_parts_and_undoes() {
        let mut h = harness();
        let a1 = h.track(true);
        let v1 = h.track(false);
        let video = h
            .model
            .request_clip_insertion("av/10/49", v1, 0, EditOptions::default())
            .unwrap();
        let audio = h.model.clip_by_position(a1, 0).unwrap();
        let producers = h.engine.live_producers();

        h.model.request_clip_speed_change(video, 2.0).unwrap();
        for id in [video, audio] {
            assert_eq!(h.model.item_bounds(id), Some(ItemBounds::new(0, 5, 24)));
            assert_eq!(h.model.clip(id).unwrap().speed(), 2.0);
        }
        let index = h.model.item_index(video).unwrap();
        assert_eq!(h.model.data(&index, Role::Speed), Some(RoleValue::Float(2.0)));
        assert_eq!(h.model.data(&index, Role::MaxDuration), Some(RoleValue::Int(50)));
        assert_eq!(h.model.duration(), 20);
        assert_eq!(h.engine.live_producers(), producers);
        assert_eq!(h.model.undo_stack().undo_label(), Some("Change clip speed"));
        h.check();

        h.model.undo().unwrap();
        assert_eq!(h.model.item_bounds(video), Some(ItemBounds::new(0, 10, 49)));
        assert_eq!(h.model.clip(audio).unwrap().speed(), 1.0);
        h.check();
        h.model.redo().unwrap();
        assert_eq!(h.model.item_playtime(audio), Some(20));
        h.check();
    }

    #[test]
    fn test_speed_change_refused_without_room() {
        let mut h = harness();
        let v1 = h.track(false);
        let first = h.clip("v", 10, v1, 0);
        h.clip("v", 10, v1, 15);
        let still = h.clip("img", 10, v1, 40);
        let history = h.model.undo_stack().undo_count();

        let err = h.model.request_clip_speed_change(first, 0.5).unwrap_err();
        assert!(err.is_infeasible());
        assert_eq!(h.model.clip(first).unwrap().speed(), 1.0);
        assert_eq!(h.model.item_bounds(first), Some(ItemBounds::new(0, 0, 9)));
        assert!(h.model.request_clip_speed_change(still, 2.0).unwrap_err().is_infeasible());
        assert!(matches!(
            h.model.request_clip_speed_change(first, 0.0),
            Err(ProEditError::InvalidParameter(_))
        ));
        assert_eq!(h.model.undo_stack().undo_count(), history);
        h.check();
    }
}
