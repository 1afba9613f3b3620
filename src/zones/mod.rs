//! Zone model, JSON persistence and the interactive authoring state machine.

mod editor;
mod store;

use serde::{Deserialize, Serialize};

use crate::Point;

pub use editor::{EditorState, ZoneEditor};
pub use store::{ZoneStore, ZoneStoreError};

/// Ordered polygon vertices, implicitly closed.
pub type Polygon = Vec<Point>;

/// A named polygonal region in frame pixel coordinates.
///
/// Polygons with fewer than three points are allowed in memory but never
/// contain any point.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    pub points: Polygon,
}

impl Zone {
    pub fn new(name: impl Into<String>, points: impl IntoIterator<Item = Point>) -> Self {
        Self {
            name: name.into(),
            points: points.into_iter().collect(),
        }
    }
}

/// Name given to the `n`-th zone (1-based) when none was provided.
pub fn default_zone_name(n: usize) -> String {
    format!("Zone {}", n)
}
