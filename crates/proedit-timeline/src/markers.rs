//! Timeline guides and clip markers.
//!
//! A marker is a point (or, with a duration, a range) tagged with a comment
//! and a category. At most one marker exists per position. Marker positions
//! feed the snap index as guides; they are not part of the undo history.

use std::collections::{BTreeMap, BTreeSet};

use proedit_core::{ProEditError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Comment given to imported markers that have none.
pub const DEFAULT_COMMENT: &str = "Marker";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    #[serde(rename = "pos")]
    pub position: i64,
    pub comment: String,
    #[serde(rename = "type")]
    pub category: u32,
    /// Zero for a point marker.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub duration: i64,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl Marker {
    pub fn point(position: i64, comment: impl Into<String>, category: u32) -> Self {
        Self {
            position,
            comment: comment.into(),
            category,
            duration: 0,
        }
    }

    pub fn range(position: i64, duration: i64, comment: impl Into<String>, category: u32) -> Self {
        Self {
            duration,
            ..Self::point(position, comment, category)
        }
    }

    pub fn is_range(&self) -> bool {
        self.duration > 0
    }

    pub fn end(&self) -> i64 {
        self.position.saturating_add(self.duration)
    }
}

#[derive(Debug, Clone)]
pub struct MarkerListModel {
    markers: BTreeMap<i64, Marker>,
    categories: BTreeSet<u32>,
}

impl Default for MarkerListModel {
    fn default() -> Self {
        Self::new([0])
    }
}

impl MarkerListModel {
    /// Empty list accepting the given categories. Category 0 always exists.
    pub fn new(categories: impl IntoIterator<Item = u32>) -> Self {
        let mut categories: BTreeSet<u32> = categories.into_iter().collect();
        categories.insert(0);
        Self {
            markers: BTreeMap::new(),
            categories,
        }
    }

    pub fn categories(&self) -> &BTreeSet<u32> {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn markers(&self) -> impl Iterator<Item = &Marker> + '_ {
        self.markers.values()
    }

    pub fn marker_at(&self, position: i64) -> Option<&Marker> {
        self.markers.get(&position)
    }

    /// Markers of one category, in position order.
    pub fn markers_of(&self, category: u32) -> Vec<&Marker> {
        self.markers.values().filter(|m| m.category == category).collect()
    }

    /// Markers overlapping `[start, end)`.
    pub fn markers_in_range(&self, start: i64, end: i64) -> Vec<&Marker> {
        self.markers
            .values()
            .filter(|m| m.position < end && m.end().max(m.position + 1) > start)
            .collect()
    }

    fn validate(&self, marker: &Marker) -> Result<()> {
        if marker.position < 0
            || marker.duration < 0
            || marker.position.checked_add(marker.duration).is_none()
        {
            return Err(ProEditError::InvalidParameter(format!(
                "invalid marker at {} lasting {}",
                marker.position, marker.duration
            )));
        }
        if !self.categories.contains(&marker.category) {
            return Err(ProEditError::InvalidParameter(format!(
                "unknown marker category {}",
                marker.category
            )));
        }
        Ok(())
    }

    /// Add a marker. A marker already at that position takes the new
    /// comment, category and duration.
    pub fn add_marker(&mut self, marker: Marker) -> Result<()> {
        self.validate(&marker)?;
        debug!(position = marker.position, category = marker.category, "add_marker");
        self.markers.insert(marker.position, marker);
        Ok(())
    }

    /// Replace the marker at `old_position`; the new one may sit elsewhere
    /// as long as that position is free.
    pub fn edit_marker(&mut self, old_position: i64, marker: Marker) -> Result<()> {
        if !self.markers.contains_key(&old_position) {
            return Err(ProEditError::NotFound(format!("no marker at {old_position}")));
        }
        self.validate(&marker)?;
        if marker.position != old_position && self.markers.contains_key(&marker.position) {
            return Err(ProEditError::InvalidParameter(format!(
                "a marker already exists at {}",
                marker.position
            )));
        }
        self.markers.remove(&old_position);
        self.markers.insert(marker.position, marker);
        Ok(())
    }

    pub fn remove_marker(&mut self, position: i64) -> Result<Marker> {
        self.markers
            .remove(&position)
            .ok_or_else(|| ProEditError::NotFound(format!("no marker at {position}")))
    }

    pub fn clear(&mut self) {
        self.markers.clear();
    }

    /// Guide points for the snap index: every start, plus the end of range
    /// markers.
    pub fn snap_positions(&self) -> Vec<i64> {
        let mut points = Vec::with_capacity(self.markers.len());
        for marker in self.markers.values() {
            points.push(marker.position);
            if marker.is_range() {
                points.push(marker.end());
            }
        }
        points
    }

    /// Import markers from a JSON array.
    ///
    /// Entries without a position are skipped and unknown categories fall
    /// back to 0. Unless `ignore_conflicts` is set, an entry landing on an
    /// existing marker with a different comment or category aborts the whole
    /// import and leaves the list untouched. Returns how many markers were
    /// imported.
    pub fn import_json(&mut self, data: &str, ignore_conflicts: bool) -> Result<usize> {
        let value: Value = serde_json::from_str(data)
            .map_err(|e| ProEditError::Serialization(format!("Invalid marker JSON: {e}")))?;
        let Value::Array(entries) = value else {
            return Err(ProEditError::Serialization("marker JSON must be an array".into()));
        };

        let mut staged = self.markers.clone();
        let mut imported = 0;
        for entry in &entries {
            let Some(object) = entry.as_object() else {
                warn!("skipping marker entry that is not an object");
                continue;
            };
            let Some(position) = object.get("pos").and_then(Value::as_i64) else {
                warn!("skipping marker entry without a position");
                continue;
            };
            let comment = object
                .get("comment")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_COMMENT)
                .to_string();
            let mut category = object
                .get("type")
                .and_then(Value::as_u64)
                .and_then(|t| u32::try_from(t).ok())
                .unwrap_or(0);
            if !self.categories.contains(&category) {
                warn!(category, "unknown marker category, using 0");
                category = 0;
            }
            let duration = object.get("duration").and_then(Value::as_i64).unwrap_or(0);
            let marker = Marker {
                position,
                comment,
                category,
                duration,
            };
            self.validate(&marker)?;
            if let Some(existing) = staged.get(&position) {
                let same =
                    existing.comment == marker.comment && existing.category == marker.category;
                if !ignore_conflicts && !same {
                    return Err(ProEditError::InvalidParameter(format!(
                        "imported marker conflicts with the one at {position}"
                    )));
                }
            }
            staged.insert(position, marker);
            imported += 1;
        }
        self.markers = staged;
        debug!(imported, "markers imported");
        Ok(imported)
    }

    /// Export markers of `categories` (all of them when empty) as a JSON
    /// array.
    pub fn export_json(&self, categories: &[u32]) -> Result<String> {
        let selected: Vec<&Marker> = self
            .markers
            .values()
            .filter(|m| categories.is_empty() || categories.contains(&m.category))
            .collect();
        serde_json::to_string_pretty(&selected)
            .map_err(|e| ProEditError::Serialization(format!("Failed to serialize markers: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> MarkerListModel {
        MarkerListModel::new([0, 1, 2])
    }

    #[test]
    fn test_add_updates_existing_position() {
        let mut markers = model();
        markers.add_marker(Marker::point(10, "intro", 0)).unwrap();
        markers.add_marker(Marker::point(10, "chorus", 2)).unwrap();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers.marker_at(10).unwrap().comment, "chorus");
        assert_eq!(markers.marker_at(10).unwrap().category, 2);
        assert!(markers.add_marker(Marker::point(5, "x", 9)).is_err());
        assert!(markers.add_marker(Marker::point(-1, "x", 0)).is_err());
    }

    #[test]
    fn test_range_past_frame_scale_is_refused() {
        let mut markers = model();
        let marker = Marker::range(i64::MAX - 3, 10, "tail", 0);
        assert!(matches!(
            markers.add_marker(marker),
            Err(ProEditError::InvalidParameter(_))
        ));
        assert!(markers.is_empty());
        markers.add_marker(Marker::range(i64::MAX - 10, 10, "tail", 0)).unwrap();
        assert_eq!(markers.snap_positions(), vec![i64::MAX - 10, i64::MAX]);
    }

    #[test]
    fn test_edit_and_remove() {
        let mut markers = model();
        markers.add_marker(Marker::point(10, "a", 0)).unwrap();
        markers.add_marker(Marker::point(20, "b", 0)).unwrap();
        assert!(markers.edit_marker(10, Marker::point(20, "a", 0)).is_err());
        markers.edit_marker(10, Marker::point(15, "a2", 1)).unwrap();
        assert!(markers.marker_at(10).is_none());
        assert_eq!(markers.marker_at(15).unwrap().comment, "a2");
        assert!(matches!(
            markers.edit_marker(99, Marker::point(1, "", 0)),
            Err(ProEditError::NotFound(_))
        ));
        assert_eq!(markers.remove_marker(20).unwrap().comment, "b");
        assert!(markers.remove_marker(20).is_err());
    }

    #[test]
    fn test_range_markers_snap_at_both_ends() {
        let mut markers = model();
        markers.add_marker(Marker::point(5, "cut", 0)).unwrap();
        markers.add_marker(Marker::range(30, 10, "verse", 1)).unwrap();
        assert_eq!(markers.snap_positions(), vec![5, 30, 40]);
        assert_eq!(markers.markers_in_range(35, 36).len(), 1);
        assert_eq!(markers.markers_in_range(5, 6).len(), 1);
        assert!(markers.markers_in_range(6, 30).is_empty());
    }

    #[test]
    fn test_import_defaults_and_skips() {
        let mut markers = model();
        let data = r#"[
            {"pos": 10},
            {"pos": 20, "comment": "drop", "type": 7},
            {"comment": "no position"},
            42,
            {"pos": 30, "comment": "bridge", "type": 2, "duration": 12}
        ]"#;
        assert_eq!(markers.import_json(data, false).unwrap(), 3);
        assert_eq!(markers.marker_at(10).unwrap().comment, DEFAULT_COMMENT);
        assert_eq!(markers.marker_at(20).unwrap().category, 0);
        assert_eq!(markers.marker_at(30).unwrap().duration, 12);
    }

    #[test]
    fn test_import_conflict_is_atomic() {
        let mut markers = model();
        markers.add_marker(Marker::point(20, "verse", 1)).unwrap();
        let data = r#"[{"pos": 5, "comment": "new"}, {"pos": 20, "comment": "chorus", "type": 1}]"#;
        assert!(markers.import_json(data, false).is_err());
        assert!(markers.marker_at(5).is_none());
        assert_eq!(markers.marker_at(20).unwrap().comment, "verse");

        assert_eq!(markers.import_json(data, true).unwrap(), 2);
        assert_eq!(markers.marker_at(20).unwrap().comment, "chorus");

        let same = r#"[{"pos": 20, "comment": "chorus", "type": 1}]"#;
        assert_eq!(markers.import_json(same, false).unwrap(), 1);
    }

    #[test]
    fn test_import_rejects_non_array() {
        let mut markers = model();
        assert!(matches!(
            markers.import_json(r#"{"pos": 1}"#, false),
            Err(ProEditError::Serialization(_))
        ));
        assert!(markers.import_json("not json", false).is_err());
    }

    #[test]
    fn test_export_filters_categories() {
        let mut markers = model();
        markers.add_marker(Marker::point(1, "a", 0)).unwrap();
        markers.add_marker(Marker::range(2, 3, "b", 1)).unwrap();
        let all: Vec<Marker> = serde_json::from_str(&markers.export_json(&[]).unwrap()).unwrap();
        assert_eq!(all.len(), 2);
        let json = markers.export_json(&[1]).unwrap();
        assert!(json.contains("\"duration\": 3"));
        assert!(!json.contains("\"a\""));
        let point = markers.export_json(&[0]).unwrap();
        assert!(!point.contains("duration"));

        let mut copy = model();
        copy.import_json(&markers.export_json(&[]).unwrap(), false).unwrap();
        assert_eq!(copy.markers().collect::<Vec<_>>(), markers.markers().collect::<Vec<_>>());
    }
}
