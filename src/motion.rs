//! Background-model motion estimation.
//!
//! - `BackgroundModel`: per-pixel adaptive Gaussian over the grayscale scene.
//! - `MotionEstimator`: classifies each frame against the model, then reports
//!   the share of moving pixels inside every detection box.
//!
//! The model learns with rate `1 / min(frames_seen, history)`, so it settles
//! quickly on startup and then forgets the scene over roughly `history`
//! frames. A pixel is foreground when its squared distance to the mean exceeds
//! `var_threshold` times its variance. Callers must not feed frames while the
//! pipeline is paused; every `compute` call is one model update.

use image::{GrayImage, Luma};

use crate::detect::Detection;

const VAR_INIT: f32 = 15.0;
const VAR_MIN: f32 = 4.0;
const VAR_MAX: f32 = 5.0 * VAR_INIT;
const FOREGROUND: u8 = 255;

#[derive(Clone, Debug, PartialEq)]
pub struct MotionSettings {
    /// Number of frames the background model effectively remembers.
    pub history: u32,
    /// Squared-distance threshold, in variances, for foreground pixels.
    pub var_threshold: f32,
    /// Mask values strictly above this count as moving (0-255).
    pub motion_threshold: u8,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            history: 300,
            var_threshold: 16.0,
            motion_threshold: 25,
        }
    }
}

/// Statistical model of the static scene.
#[derive(Clone, Debug)]
pub struct BackgroundModel {
    width: u32,
    height: u32,
    mean: Vec<f32>,
    variance: Vec<f32>,
    frames_seen: u64,
    history: u32,
    var_threshold: f32,
}

impl BackgroundModel {
    pub fn new(history: u32, var_threshold: f32) -> Self {
        Self {
            width: 0,
            height: 0,
            mean: Vec::new(),
            variance: Vec::new(),
            frames_seen: 0,
            history: history.max(1),
            var_threshold,
        }
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    pub fn reset(&mut self) {
        self.width = 0;
        self.height = 0;
        self.mean.clear();
        self.variance.clear();
        self.frames_seen = 0;
    }

    /// Classify `gray` against the model, then fold it into the model.
    /// Returns a 0/255 foreground mask of the same size.
    pub fn apply(&mut self, gray: &GrayImage) -> GrayImage {
        let (width, height) = gray.dimensions();
        if self.frames_seen > 0 && (width, height) != (self.width, self.height) {
            log::info!(
                "frame size changed from {}x{} to {}x{}; resetting background model",
                self.width,
                self.height,
                width,
                height
            );
            self.reset();
        }

        let mut mask = GrayImage::new(width, height);
        if self.frames_seen == 0 {
            self.width = width;
            self.height = height;
            self.mean = gray.pixels().map(|p| p[0] as f32).collect();
            self.variance = vec![VAR_INIT; self.mean.len()];
            self.frames_seen = 1;
            return mask;
        }

        self.frames_seen += 1;
        let alpha = 1.0 / self.frames_seen.min(self.history as u64) as f32;
        for ((pixel, out), (mean, var)) in gray
            .pixels()
            .zip(mask.pixels_mut())
            .zip(self.mean.iter_mut().zip(self.variance.iter_mut()))
        {
            let value = pixel[0] as f32;
            let diff = value - *mean;
            let dist2 = diff * diff;
            if dist2 > self.var_threshold * *var {
                *out = Luma([FOREGROUND]);
            }
            *mean += alpha * diff;
            *var = (*var + alpha * (dist2 - *var)).clamp(VAR_MIN, VAR_MAX);
        }
        mask
    }
}

/// Result of one motion computation.
#[derive(Clone, Debug)]
pub struct MotionReport {
    /// Mean of `per_detection`, or 0.0 when there are no detections.
    pub avg_motion: f32,
    /// Percentage (0-100) of moving pixels inside each detection, in input order.
    pub per_detection: Vec<f32>,
    pub mask: GrayImage,
}

pub struct MotionEstimator {
    model: BackgroundModel,
    motion_threshold: u8,
}

impl MotionEstimator {
    pub fn new(settings: &MotionSettings) -> Self {
        Self {
            model: BackgroundModel::new(settings.history, settings.var_threshold),
            motion_threshold: settings.motion_threshold,
        }
    }

    pub fn frames_seen(&self) -> u64 {
        self.model.frames_seen()
    }

    pub fn reset(&mut self) {
        self.model.reset();
    }

    pub fn compute(&mut self, gray: &GrayImage, detections: &[Detection]) -> MotionReport {
        let mask = self.model.apply(gray);
        let per_detection: Vec<f32> = detections
            .iter()
            .map(|d| moving_percent(&mask, d, self.motion_threshold))
            .collect();
        let avg_motion = if per_detection.is_empty() {
            0.0
        } else {
            per_detection.iter().sum::<f32>() / per_detection.len() as f32
        };
        MotionReport {
            avg_motion,
            per_detection,
            mask,
        }
    }
}

fn moving_percent(mask: &GrayImage, detection: &Detection, threshold: u8) -> f32 {
    let Some((x1, y1, x2, y2)) = detection.bbox.clip(mask.width(), mask.height()) else {
        return 0.0;
    };
    let mut moving = 0u64;
    for y in y1..y2 {
        for x in x1..x2 {
            if mask.get_pixel(x, y)[0] > threshold {
                moving += 1;
            }
        }
    }
    let total = (x2 - x1) as u64 * (y2 - y1) as u64;
    100.0 * moving as f32 / total as f32
}
