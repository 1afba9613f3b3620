//! Histogram-of-oriented-gradients people detector.
//!
//! Classic Dalal-Triggs pipeline on the grayscale frame:
//!
//! - 8x8 pixel cells, 9 unsigned orientation bins over [0, 180) degrees
//! - 16x16 blocks (2x2 cells) with an 8 pixel block stride, L2-Hys normalized
//! - 64x128 detection window, 105 blocks, 3780 features
//! - multi-scale sliding window: window stride 8x8, padding 8x8, scale step 1.05
//!
//! Each window is scored by a linear SVM, either loaded from disk or the
//! built-in people model (`LinearSvm::default_people`). Every window above the
//! hit threshold is reported as-is; there is no grouping or suppression, so
//! one person usually yields several overlapping boxes.

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::GrayImage;
use std::path::Path;
use std::sync::OnceLock;

use crate::detect::backend::PeopleDetector;
use crate::detect::result::Detection;
use crate::frame::Frame;

use super::hog_model;

const CELL: usize = 8;
const NBINS: usize = 9;
const BIN_WIDTH_DEG: f32 = 180.0 / NBINS as f32;
pub(super) const WIN_W: usize = 64;
pub(super) const WIN_H: usize = 128;
const WIN_CELLS_X: usize = WIN_W / CELL;
const WIN_CELLS_Y: usize = WIN_H / CELL;
const BLOCKS_X: usize = WIN_CELLS_X - 1;
const BLOCKS_Y: usize = WIN_CELLS_Y - 1;
const BLOCK_LEN: usize = 4 * NBINS;
const L2HYS_CLIP: f32 = 0.2;

/// Length of one window descriptor.
pub const DESCRIPTOR_LEN: usize = BLOCKS_X * BLOCKS_Y * BLOCK_LEN;

/// Sliding-window scan parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct HogParams {
    pub win_stride: (u32, u32),
    pub padding: (u32, u32),
    pub scale_step: f32,
    pub hit_threshold: f32,
    pub max_levels: usize,
}

impl Default for HogParams {
    fn default() -> Self {
        Self {
            win_stride: (8, 8),
            padding: (8, 8),
            scale_step: 1.05,
            hit_threshold: 0.0,
            max_levels: 64,
        }
    }
}

impl HogParams {
    fn validate(&self) -> Result<()> {
        let (sx, sy) = self.win_stride;
        let (px, py) = self.padding;
        if sx == 0 || sy == 0 {
            return Err(anyhow!("HOG window stride must be non-zero"));
        }
        for v in [sx, sy, px, py] {
            if v as usize % CELL != 0 {
                return Err(anyhow!(
                    "HOG window stride and padding must be multiples of {} pixels",
                    CELL
                ));
            }
        }
        if !self.scale_step.is_finite() || self.scale_step < 1.0 {
            return Err(anyhow!("HOG scale step must be >= 1.0"));
        }
        Ok(())
    }
}

/// Linear SVM over HOG window descriptors.
///
/// Coefficient files hold `3780` weights optionally followed by the bias term,
/// either as a JSON array or as whitespace/comma separated numbers. Weight
/// order is block-column major: blocks run down each column of the window,
/// cells within a block likewise, bins innermost.
#[derive(Clone, Debug)]
pub struct LinearSvm {
    weights: Vec<f32>,
    bias: f32,
}

impl LinearSvm {
    pub fn new(weights: Vec<f32>, bias: f32) -> Result<Self> {
        if weights.len() != DESCRIPTOR_LEN {
            return Err(anyhow!(
                "expected {} SVM weights, got {}",
                DESCRIPTOR_LEN,
                weights.len()
            ));
        }
        Ok(Self { weights, bias })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read SVM coefficients {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid SVM coefficients {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let mut values: Vec<f32> = if trimmed.starts_with('[') {
            serde_json::from_str(trimmed)?
        } else {
            trimmed
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|t| !t.is_empty())
                .map(|t| t.parse::<f32>().with_context(|| format!("bad coefficient '{}'", t)))
                .collect::<Result<_>>()?
        };
        let bias = match values.len() {
            n if n == DESCRIPTOR_LEN + 1 => values.pop().unwrap_or_default(),
            n if n == DESCRIPTOR_LEN => 0.0,
            n => {
                return Err(anyhow!(
                    "expected {} or {} coefficients, got {}",
                    DESCRIPTOR_LEN,
                    DESCRIPTOR_LEN + 1,
                    n
                ))
            }
        };
        Self::new(values, bias)
    }

    /// Upright-person model fitted once per process on rendered windows.
    pub fn default_people() -> Self {
        static MODEL: OnceLock<LinearSvm> = OnceLock::new();
        MODEL
            .get_or_init(|| {
                let (weights, bias) = hog_model::train(descriptor);
                LinearSvm { weights, bias }
            })
            .clone()
    }
}

/// HOG + linear SVM sliding-window detector.
pub struct HogDetector {
    params: HogParams,
    svm: LinearSvm,
}

impl HogDetector {
    pub fn new(params: HogParams, svm: LinearSvm) -> Result<Self> {
        params.validate()?;
        Ok(Self { params, svm })
    }

    /// Detector with the default scan parameters, which are always valid.
    pub fn with_default_params(svm: LinearSvm) -> Self {
        Self {
            params: HogParams::default(),
            svm,
        }
    }

    fn scan(&self, gray: &GrayImage) -> Vec<Detection> {
        let svm = &self.svm;
        let mut detections = Vec::new();
        let (width, height) = gray.dimensions();
        let (pad_x, pad_y) = self.params.padding;
        let step_x = self.params.win_stride.0 as usize / CELL;
        let step_y = self.params.win_stride.1 as usize / CELL;

        let mut scale = 1.0f32;
        for _ in 0..self.params.max_levels.max(1) {
            let level_w = (width as f32 / scale).round() as u32;
            let level_h = (height as f32 / scale).round() as u32;
            if (level_w as usize) < WIN_W || (level_h as usize) < WIN_H {
                break;
            }
            let level = if scale == 1.0 {
                gray.clone()
            } else {
                imageops::resize(gray, level_w, level_h, FilterType::Triangle)
            };
            let blocks = BlockGrid::compute(&level, pad_x as usize, pad_y as usize);

            if blocks.cols >= BLOCKS_X && blocks.rows >= BLOCKS_Y {
                for oy in (0..=blocks.rows - BLOCKS_Y).step_by(step_y) {
                    for ox in (0..=blocks.cols - BLOCKS_X).step_by(step_x) {
                        let score = blocks.window_score(ox, oy, svm);
                        if score > self.params.hit_threshold {
                            let x = ((ox * CELL) as f32 - pad_x as f32) * scale;
                            let y = ((oy * CELL) as f32 - pad_y as f32) * scale;
                            detections.push(Detection::new(
                                x.round() as i32,
                                y.round() as i32,
                                (WIN_W as f32 * scale).round() as i32,
                                (WIN_H as f32 * scale).round() as i32,
                                score,
                            ));
                        }
                    }
                }
            }

            if self.params.scale_step <= 1.0 {
                break;
            }
            scale *= self.params.scale_step;
        }
        detections
    }
}

impl PeopleDetector for HogDetector {
    fn name(&self) -> &'static str {
        "hog"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        Ok(self.scan(frame.gray()))
    }
}

/// Compute the descriptor of an image that is exactly one window in size.
pub fn window_descriptor(window: &GrayImage) -> Result<Vec<f32>> {
    if window.dimensions() != (WIN_W as u32, WIN_H as u32) {
        return Err(anyhow!(
            "window must be {}x{}, got {}x{}",
            WIN_W,
            WIN_H,
            window.width(),
            window.height()
        ));
    }
    Ok(descriptor(window))
}

fn descriptor(window: &GrayImage) -> Vec<f32> {
    let blocks = BlockGrid::compute(window, 0, 0);
    let mut descriptor = Vec::with_capacity(DESCRIPTOR_LEN);
    for bx in 0..BLOCKS_X {
        for by in 0..BLOCKS_Y {
            descriptor.extend_from_slice(blocks.block(bx, by));
        }
    }
    descriptor
}

/// Normalized block features for one pyramid level.
struct BlockGrid {
    cols: usize,
    rows: usize,
    values: Vec<f32>,
}

impl BlockGrid {
    fn compute(image: &GrayImage, pad_x: usize, pad_y: usize) -> Self {
        let cells = cell_histograms(image, pad_x, pad_y);
        let cols = cells.cols.saturating_sub(1);
        let rows = cells.rows.saturating_sub(1);
        let mut values = vec![0.0f32; cols * rows * BLOCK_LEN];

        for by in 0..rows {
            for bx in 0..cols {
                let block = &mut values[(by * cols + bx) * BLOCK_LEN..][..BLOCK_LEN];
                // column-major cell order inside the block
                let cell_order = [(bx, by), (bx, by + 1), (bx + 1, by), (bx + 1, by + 1)];
                for (slot, (cx, cy)) in cell_order.into_iter().enumerate() {
                    block[slot * NBINS..][..NBINS].copy_from_slice(cells.cell(cx, cy));
                }
                l2_hys(block);
            }
        }
        Self { cols, rows, values }
    }

    fn block(&self, bx: usize, by: usize) -> &[f32] {
        &self.values[(by * self.cols + bx) * BLOCK_LEN..][..BLOCK_LEN]
    }

    fn window_score(&self, ox: usize, oy: usize, svm: &LinearSvm) -> f32 {
        let mut score = svm.bias;
        let mut weights = svm.weights.chunks_exact(BLOCK_LEN);
        for bx in 0..BLOCKS_X {
            for by in 0..BLOCKS_Y {
                let Some(w) = weights.next() else {
                    return score;
                };
                let block = self.block(ox + bx, oy + by);
                score += block.iter().zip(w).map(|(a, b)| a * b).sum::<f32>();
            }
        }
        score
    }
}

struct CellGrid {
    cols: usize,
    rows: usize,
    hist: Vec<f32>,
}

impl CellGrid {
    fn cell(&self, cx: usize, cy: usize) -> &[f32] {
        &self.hist[(cy * self.cols + cx) * NBINS..][..NBINS]
    }
}

/// Orientation histograms over the padded image; padding replicates edges.
fn cell_histograms(image: &GrayImage, pad_x: usize, pad_y: usize) -> CellGrid {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let cols = (image.width() as usize + 2 * pad_x) / CELL;
    let rows = (image.height() as usize + 2 * pad_y) / CELL;
    let mut hist = vec![0.0f32; cols * rows * NBINS];

    let luma = |x: i64, y: i64| -> f32 {
        image.get_pixel(x.clamp(0, w - 1) as u32, y.clamp(0, h - 1) as u32)[0] as f32
    };

    for cy in 0..rows {
        for cx in 0..cols {
            let cell = &mut hist[(cy * cols + cx) * NBINS..][..NBINS];
            for yy in 0..CELL {
                for xx in 0..CELL {
                    let x = (cx * CELL + xx) as i64 - pad_x as i64;
                    let y = (cy * CELL + yy) as i64 - pad_y as i64;
                    let dx = luma(x + 1, y) - luma(x - 1, y);
                    let dy = luma(x, y + 1) - luma(x, y - 1);
                    let magnitude = (dx * dx + dy * dy).sqrt();
                    if magnitude == 0.0 {
                        continue;
                    }
                    let mut angle = dy.atan2(dx).to_degrees();
                    if angle < 0.0 {
                        angle += 180.0;
                    }
                    if angle >= 180.0 {
                        angle -= 180.0;
                    }
                    let pos = angle / BIN_WIDTH_DEG - 0.5;
                    let lower = pos.floor();
                    let frac = pos - lower;
                    let b0 = (lower as i64).rem_euclid(NBINS as i64) as usize;
                    let b1 = (b0 + 1) % NBINS;
                    cell[b0] += magnitude * (1.0 - frac);
                    cell[b1] += magnitude * frac;
                }
            }
        }
    }
    CellGrid { cols, rows, hist }
}

fn l2_hys(block: &mut [f32]) {
    let eps = 0.1 * block.len() as f32;
    let norm = |b: &[f32]| (b.iter().map(|v| v * v).sum::<f32>() + eps * eps).sqrt();
    let n = norm(block);
    for v in block.iter_mut() {
        *v = (*v / n).min(L2HYS_CLIP);
    }
    let n = norm(block);
    for v in block.iter_mut() {
        *v /= n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    fn constant_svm(bias: f32) -> LinearSvm {
        LinearSvm::new(vec![0.0; DESCRIPTOR_LEN], bias).unwrap()
    }

    #[test]
    fn descriptor_has_expected_length() -> Result<()> {
        let window = GrayImage::from_fn(64, 128, |x, y| Luma([((x * 3 + y) % 256) as u8]));
        let descriptor = window_descriptor(&window)?;
        assert_eq!(descriptor.len(), 3780);
        assert!(descriptor.iter().all(|v| v.is_finite() && *v >= 0.0));
        Ok(())
    }

    #[test]
    fn window_descriptor_rejects_wrong_size() {
        assert!(window_descriptor(&GrayImage::new(64, 64)).is_err());
    }

    #[test]
    fn every_window_above_threshold_is_reported() -> Result<()> {
        // 64x128 frame padded by 8 on each side: 3x3 window positions, one pyramid level.
        let mut detector = HogDetector::new(HogParams::default(), constant_svm(1.0))?;
        let frame = Frame::new(RgbImage::new(64, 128), 0);
        let detections = detector.detect(&frame)?;
        assert_eq!(detections.len(), 9);
        assert!(detections.iter().all(|d| d.confidence == 1.0));
        assert!(detections
            .iter()
            .any(|d| d.bbox.x == -8 && d.bbox.y == -8 && d.bbox.width == 64));
        Ok(())
    }

    #[test]
    fn windows_below_threshold_are_dropped() -> Result<()> {
        let mut detector = HogDetector::new(HogParams::default(), constant_svm(-1.0))?;
        let frame = Frame::new(RgbImage::new(128, 256), 0);
        assert!(detector.detect(&frame)?.is_empty());
        Ok(())
    }

    #[test]
    fn frames_smaller_than_window_yield_nothing() -> Result<()> {
        let mut detector = HogDetector::new(HogParams::default(), constant_svm(1.0))?;
        let frame = Frame::new(RgbImage::new(40, 60), 0);
        assert!(detector.detect(&frame)?.is_empty());
        Ok(())
    }

    /// 64x128 frame: mid-gray background with a dark upright block
    /// roughly where a standing person would be.
    fn person_like_frame() -> Frame {
        let mut image = RgbImage::from_pixel(64, 128, Rgb([150, 150, 150]));
        for y in 22..106 {
            for x in 18..46 {
                image.put_pixel(x, y, Rgb([30, 30, 30]));
            }
        }
        Frame::new(image, 0)
    }

    #[test]
    fn default_model_fires_on_upright_figure() -> Result<()> {
        let mut detector = HogDetector::new(HogParams::default(), LinearSvm::default_people())?;
        let detections = detector.detect(&person_like_frame())?;
        assert!(!detections.is_empty());
        assert!(detections.iter().all(|d| d.confidence > 0.0));
        Ok(())
    }

    #[test]
    fn default_model_ignores_empty_scene() -> Result<()> {
        let mut detector = HogDetector::new(HogParams::default(), LinearSvm::default_people())?;
        let frame = Frame::new(RgbImage::from_pixel(64, 128, Rgb([150, 150, 150])), 0);
        assert!(detector.detect(&frame)?.is_empty());
        Ok(())
    }

    #[test]
    fn default_model_is_deterministic() {
        let a = LinearSvm::default_people();
        let b = LinearSvm::default_people();
        assert_eq!(a.weights.len(), DESCRIPTOR_LEN);
        assert_eq!(a.weights, b.weights);
        assert_eq!(a.bias, b.bias);
    }

    #[test]
    fn parses_text_and_json_coefficients() -> Result<()> {
        let mut text = vec!["0.5"; DESCRIPTOR_LEN].join(" ");
        text.push_str("\n-2.5\n");
        let svm = LinearSvm::parse(&text)?;
        assert_eq!(svm.bias, -2.5);

        let json = serde_json::to_string(&vec![0.25f32; DESCRIPTOR_LEN])?;
        let svm = LinearSvm::parse(&json)?;
        assert_eq!(svm.bias, 0.0);

        assert!(LinearSvm::parse("1 2 3").is_err());
        Ok(())
    }

    #[test]
    fn rejects_unaligned_stride() {
        let params = HogParams {
            win_stride: (4, 8),
            ..HogParams::default()
        };
        assert!(HogDetector::new(params, constant_svm(0.0)).is_err());
    }
}
