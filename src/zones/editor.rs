use crate::Point;

use super::{default_zone_name, Polygon, Zone};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditorState {
    /// No active polygon.
    Idle,
    /// At least one point has been placed.
    Building,
}

/// Builds new zones one vertex at a time.
///
/// Default names are `Zone {n}`. The counter starts at the number of zones
/// present when the editor is created and only grows, so a name is never
/// handed out twice in a session even after reloads or deletions.
#[derive(Clone, Debug, Default)]
pub struct ZoneEditor {
    active: Polygon,
    counter: usize,
}

impl ZoneEditor {
    pub fn new(existing_zones: usize) -> Self {
        Self {
            active: Vec::new(),
            counter: existing_zones,
        }
    }

    pub fn state(&self) -> EditorState {
        if self.active.is_empty() {
            EditorState::Idle
        } else {
            EditorState::Building
        }
    }

    pub fn active(&self) -> &[Point] {
        &self.active
    }

    pub fn add_point(&mut self, point: Point) {
        self.active.push(point);
    }

    /// Remove the most recent point. No-op when idle.
    pub fn undo_point(&mut self) -> Option<Point> {
        self.active.pop()
    }

    /// Close the active polygon into a new zone appended to `zones`.
    ///
    /// With fewer than three points the active polygon is discarded and
    /// nothing is created.
    pub fn finalize<'a>(&mut self, zones: &'a mut Vec<Zone>) -> Option<&'a Zone> {
        let points = std::mem::take(&mut self.active);
        if points.len() < 3 {
            return None;
        }
        self.counter += 1;
        zones.push(Zone {
            name: default_zone_name(self.counter),
            points,
        });
        zones.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle(editor: &mut ZoneEditor) {
        editor.add_point(Point::new(0, 0));
        editor.add_point(Point::new(10, 0));
        editor.add_point(Point::new(5, 8));
    }

    #[test]
    fn finalize_names_zones_sequentially() {
        let mut zones = Vec::new();
        let mut editor = ZoneEditor::new(0);
        triangle(&mut editor);
        assert_eq!(editor.state(), EditorState::Building);
        let zone = editor.finalize(&mut zones).unwrap();
        assert_eq!(zone.name, "Zone 1");
        assert_eq!(
            zone.points,
            vec![Point::new(0, 0), Point::new(10, 0), Point::new(5, 8)]
        );
        assert_eq!(editor.state(), EditorState::Idle);

        triangle(&mut editor);
        editor.finalize(&mut zones);
        assert_eq!(zones[1].name, "Zone 2");
    }

    #[test]
    fn counter_starts_from_existing_zone_count() {
        let mut zones = vec![Zone::new("A", []), Zone::new("B", [])];
        let mut editor = ZoneEditor::new(zones.len());
        triangle(&mut editor);
        assert_eq!(editor.finalize(&mut zones).unwrap().name, "Zone 3");
    }

    #[test]
    fn counter_is_not_rebased_when_zones_shrink() {
        let mut zones = Vec::new();
        let mut editor = ZoneEditor::new(0);
        triangle(&mut editor);
        editor.finalize(&mut zones);
        zones.clear();
        triangle(&mut editor);
        assert_eq!(editor.finalize(&mut zones).unwrap().name, "Zone 2");
    }

    #[test]
    fn short_polygon_is_discarded_silently() {
        let mut zones = Vec::new();
        let mut editor = ZoneEditor::new(0);
        editor.add_point(Point::new(1, 1));
        editor.add_point(Point::new(2, 2));
        assert!(editor.finalize(&mut zones).is_none());
        assert!(zones.is_empty());
        assert_eq!(editor.state(), EditorState::Idle);

        triangle(&mut editor);
        assert_eq!(editor.finalize(&mut zones).unwrap().name, "Zone 1");
    }

    #[test]
    fn undo_pops_last_point_and_is_noop_when_idle() {
        let mut editor = ZoneEditor::new(0);
        assert_eq!(editor.undo_point(), None);
        editor.add_point(Point::new(1, 2));
        editor.add_point(Point::new(3, 4));
        assert_eq!(editor.undo_point(), Some(Point::new(3, 4)));
        assert_eq!(editor.active(), &[Point::new(1, 2)]);
        editor.undo_point();
        assert_eq!(editor.state(), EditorState::Idle);
    }
}
