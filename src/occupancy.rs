//! Point-in-polygon occupancy tallies.
//!
//! A detection is attributed to every zone containing its box centroid.
//! Zones may overlap, so the per-zone counts can sum to more than the number
//! of detections.

use crate::detect::Detection;
use crate::zones::Zone;
use crate::{BoundingBox, Point};

/// Added to each edge's vertical extent so horizontal edges never divide by zero.
const EDGE_EPSILON: f64 = 1e-9;

/// Even-odd ray casting towards +x.
///
/// Boundary points follow the strict comparisons below: on an axis-aligned
/// square the left and top edges are inside, the right and bottom edges
/// are outside. Polygons with fewer than three vertices contain nothing.
pub fn point_in_polygon(point: Point, polygon: &[Point]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let (x, y) = (point.x as f64, point.y as f64);
    let mut inside = false;
    let mut prev = polygon[polygon.len() - 1];
    for &vertex in polygon {
        let (x1, y1) = (prev.x as f64, prev.y as f64);
        let (x2, y2) = (vertex.x as f64, vertex.y as f64);
        if (y1 > y) != (y2 > y) {
            let x_cross = (x2 - x1) * (y - y1) / (y2 - y1 + EDGE_EPSILON) + x1;
            if x < x_cross {
                inside = !inside;
            }
        }
        prev = vertex;
    }
    inside
}

/// Box center, truncated toward zero.
pub fn centroid(bbox: &BoundingBox) -> Point {
    let cx = bbox.x as f64 + bbox.width as f64 / 2.0;
    let cy = bbox.y as f64 + bbox.height as f64 / 2.0;
    Point::new(cx as i32, cy as i32)
}

/// Per-zone people counts for one frame, in zone order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OccupancyTally {
    entries: Vec<(String, u32)>,
}

impl OccupancyTally {
    /// Combined count of every zone called `name`, or `None` when no zone
    /// has that name.
    pub fn get(&self, name: &str) -> Option<u32> {
        self.entries
            .iter()
            .filter(|(zone, _)| zone == name)
            .map(|&(_, count)| count)
            .reduce(|a, b| a.saturating_add(b))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries.iter().map(|(name, count)| (name.as_str(), *count))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, u32)> for OccupancyTally {
    fn from_iter<T: IntoIterator<Item = (String, u32)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct OccupancyEngine;

impl OccupancyEngine {
    pub fn compute(&self, detections: &[Detection], zones: &[Zone]) -> OccupancyTally {
        let centers: Vec<Point> = detections.iter().map(|d| centroid(&d.bbox)).collect();
        zones
            .iter()
            .map(|zone| {
                let count = centers
                    .iter()
                    .filter(|&&c| point_in_polygon(c, &zone.points))
                    .count() as u32;
                (zone.name.clone(), count)
            })
            .collect()
    }
}
