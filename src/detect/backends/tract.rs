#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectorError, PeopleDetector};
use crate::detect::result::Detection;
use crate::frame::Frame;

/// COCO class index of "person".
const PERSON_CLASS: usize = 0;

/// Tract-based backend for YOLO-style ONNX person detection.
///
/// The frame is resized to the square model input without letterboxing and
/// normalized to `[0, 1]` RGB. Two output layouts are understood:
///
/// - raw heads `[1, 4 + classes, anchors]`: `cx, cy, w, h` then class scores
/// - end-to-end `[1, N, 6]`: `x1, y1, x2, y2, score, class`
///
/// Only person boxes at or above the confidence threshold are returned.
/// Overlapping boxes are passed through untouched.
pub struct TractDetector {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    confidence_threshold: f32,
}

impl TractDetector {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self, DetectorError> {
        let model_path = model_path.as_ref();
        Self::load(model_path, input_size)
            .map_err(|e| DetectorError::unavailable("tract", format!("{:#}", e)))
    }

    fn load(model_path: &Path, input_size: u32) -> Result<Self> {
        if input_size == 0 {
            return Err(anyhow!("model input size must be non-zero"));
        }
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(0, f32::fact([1, 3, side, side]).into())
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            confidence_threshold: 0.25,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Tensor {
        let side = self.input_size;
        let resized = imageops::resize(frame.image(), side, side, FilterType::Triangle);
        let side = side as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        input.into_tensor()
    }

}

/// Turn a model output into person detections in frame coordinates.
fn decode(
    output: &Tensor,
    input_size: u32,
    threshold: f32,
    frame_width: u32,
    frame_height: u32,
) -> Result<Vec<Detection>> {
    let view = output
        .to_array_view::<f32>()
        .context("model output tensor was not f32")?;
    let shape = view.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 {
        return Err(anyhow!("unsupported model output shape {:?}", shape));
    }
    let sx = frame_width as f32 / input_size as f32;
    let sy = frame_height as f32 / input_size as f32;
    let mut detections = Vec::new();

    if shape[2] == 6 {
        for row in 0..shape[1] {
            let score = view[[0, row, 4]];
            let class = view[[0, row, 5]];
            if class.round() as usize != PERSON_CLASS || score < threshold {
                continue;
            }
            detections.push(to_detection(
                view[[0, row, 0]] * sx,
                view[[0, row, 1]] * sy,
                view[[0, row, 2]] * sx,
                view[[0, row, 3]] * sy,
                score,
            ));
        }
    } else {
        let channels = shape[1];
        if channels <= 4 {
            return Err(anyhow!("model output has no class scores: {:?}", shape));
        }
        for anchor in 0..shape[2] {
            let (mut best_class, mut best_score) = (0usize, f32::NEG_INFINITY);
            for class in 0..channels - 4 {
                let score = view[[0, 4 + class, anchor]];
                if score > best_score {
                    best_class = class;
                    best_score = score;
                }
            }
            if best_class != PERSON_CLASS || best_score < threshold {
                continue;
            }
            let (cx, cy) = (view[[0, 0, anchor]], view[[0, 1, anchor]]);
            let (w, h) = (view[[0, 2, anchor]], view[[0, 3, anchor]]);
            detections.push(to_detection(
                (cx - w / 2.0) * sx,
                (cy - h / 2.0) * sy,
                (cx + w / 2.0) * sx,
                (cy + h / 2.0) * sy,
                best_score,
            ));
        }
    }
    Ok(detections)
}

fn to_detection(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Detection {
    Detection::new(
        x1 as i32,
        y1 as i32,
        (x2 - x1) as i32,
        (y2 - y1) as i32,
        score,
    )
}

impl PeopleDetector for TractDetector {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        decode(
            output,
            self.input_size,
            self.confidence_threshold,
            frame.width(),
            frame.height(),
        )
    }

    fn warm_up(&mut self) -> Result<()> {
        let side = self.input_size as usize;
        let input = tract_ndarray::Array4::<f32>::zeros((1, 3, side, side)).into_tensor();
        self.model
            .run(tvec!(input.into()))
            .context("ONNX warm-up inference failed")?;
        Ok(())
    }
}
