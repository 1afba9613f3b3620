use crate::BoundingBox;

/// One detected person: an axis-aligned box in frame pixels and a score.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
}

impl Detection {
    pub fn new(x: i32, y: i32, width: i32, height: i32, confidence: f32) -> Self {
        Self {
            bbox: BoundingBox::new(x, y, width, height),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}
