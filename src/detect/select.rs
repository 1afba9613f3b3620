use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;

use super::backend::{DetectorError, PeopleDetector};
use super::backends::{HogDetector, HogParams, LinearSvm, ReplayDetector};

/// Detector strategy requested by configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    #[default]
    Hog,
    Yolo,
    Replay,
}

impl FromStr for DetectorKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hog" => Ok(DetectorKind::Hog),
            "yolo" | "onnx" => Ok(DetectorKind::Yolo),
            "replay" => Ok(DetectorKind::Replay),
            other => Err(anyhow!(
                "unknown detector '{}' (expected hog, yolo or replay)",
                other
            )),
        }
    }
}

/// Everything needed to build any detector variant.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectorSettings {
    pub kind: DetectorKind,
    /// Linear SVM coefficients for the HOG detector.
    pub hog_svm_path: Option<PathBuf>,
    pub hog: HogParams,
    /// ONNX model for the learned detector.
    pub model_path: PathBuf,
    pub confidence: f32,
    pub input_size: u32,
    /// JSON Lines file for the replay detector.
    pub replay_path: Option<PathBuf>,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            kind: DetectorKind::Hog,
            hog_svm_path: None,
            hog: HogParams::default(),
            model_path: PathBuf::from("yolov8n.onnx"),
            confidence: 0.25,
            input_size: 640,
            replay_path: None,
        }
    }
}

/// Build the configured detector once at startup.
///
/// A learned or replay detector that cannot be initialized is replaced by the
/// HOG detector; selection itself never fails.
pub fn select_detector(settings: &DetectorSettings) -> Box<dyn PeopleDetector> {
    let selected = match settings.kind {
        DetectorKind::Hog => Ok(build_hog(settings)),
        DetectorKind::Yolo => build_learned(settings),
        DetectorKind::Replay => build_replay(settings),
    };
    let mut detector = match selected {
        Ok(detector) => detector,
        Err(e) => {
            log::warn!("{}", e);
            log::warn!("falling back to HOG detector");
            build_hog(settings)
        }
    };
    if let Err(e) = detector.warm_up() {
        log::warn!("detector '{}' warm-up failed: {:#}", detector.name(), e);
    }
    log::info!("people detector: {}", detector.name());
    detector
}

fn build_hog(settings: &DetectorSettings) -> Box<dyn PeopleDetector> {
    let loaded = settings
        .hog_svm_path
        .as_ref()
        .and_then(|path| match LinearSvm::from_path(path) {
            Ok(svm) => Some(svm),
            Err(e) => {
                log::warn!("ignoring HOG coefficients: {:#}", e);
                None
            }
        });
    let svm = loaded.unwrap_or_else(|| {
        log::info!("hog detector using the built-in people model");
        LinearSvm::default_people()
    });
    match HogDetector::new(settings.hog.clone(), svm.clone()) {
        Ok(detector) => Box::new(detector),
        Err(e) => {
            log::warn!("invalid HOG parameters ({:#}); using defaults", e);
            Box::new(HogDetector::with_default_params(svm))
        }
    }
}

#[cfg(feature = "backend-tract")]
fn build_learned(settings: &DetectorSettings) -> Result<Box<dyn PeopleDetector>, DetectorError> {
    let detector = super::backends::TractDetector::new(&settings.model_path, settings.input_size)?
        .with_threshold(settings.confidence);
    Ok(Box::new(detector))
}

#[cfg(not(feature = "backend-tract"))]
fn build_learned(settings: &DetectorSettings) -> Result<Box<dyn PeopleDetector>, DetectorError> {
    Err(DetectorError::unavailable(
        "tract",
        format!(
            "cannot load {}: built without the backend-tract feature",
            settings.model_path.display()
        ),
    ))
}

fn build_replay(settings: &DetectorSettings) -> Result<Box<dyn PeopleDetector>, DetectorError> {
    let path = settings
        .replay_path
        .as_ref()
        .ok_or_else(|| DetectorError::unavailable("replay", "no replay file configured"))?;
    let detector = ReplayDetector::from_path(path)
        .map_err(|e| DetectorError::unavailable("replay", format!("{:#}", e)))?;
    Ok(Box::new(detector))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_detector_kinds() {
        assert_eq!("hog".parse::<DetectorKind>().unwrap(), DetectorKind::Hog);
        assert_eq!("YOLO".parse::<DetectorKind>().unwrap(), DetectorKind::Yolo);
        assert_eq!("replay".parse::<DetectorKind>().unwrap(), DetectorKind::Replay);
        assert!("ssd".parse::<DetectorKind>().is_err());
    }

    #[test]
    fn unavailable_model_falls_back_to_hog() {
        let settings = DetectorSettings {
            kind: DetectorKind::Yolo,
            model_path: PathBuf::from("does-not-exist.onnx"),
            ..DetectorSettings::default()
        };
        let detector = select_detector(&settings);
        assert_eq!(detector.name(), "hog");
    }

    #[test]
    fn missing_replay_file_falls_back_to_hog() {
        let settings = DetectorSettings {
            kind: DetectorKind::Replay,
            replay_path: Some(PathBuf::from("does-not-exist.jsonl")),
            ..DetectorSettings::default()
        };
        assert_eq!(select_detector(&settings).name(), "hog");
    }

    #[test]
    fn default_hog_detector_finds_synthetic_figures() -> Result<()> {
        use crate::ingest::{FrameSource, SyntheticConfig, SyntheticSource};

        let mut source = SyntheticSource::new(SyntheticConfig::from_uri(
            "stub://x?frames=1&width=320&height=240&figures=2",
        )?);
        let figures = source.figure_boxes(0);
        let frame = source.next_frame()?.ok_or_else(|| anyhow!("no frame"))?;
        let mut detector = select_detector(&DetectorSettings::default());
        let detections = detector.detect(&frame)?;
        assert!(!detections.is_empty());
        let hits_a_figure = detections.iter().any(|d| {
            let c = crate::occupancy::centroid(&d.bbox);
            figures.iter().any(|f| {
                c.x >= f.x - 16 && c.x <= f.x + f.width + 16 && c.y >= f.y - 16 && c.y <= f.y + f.height + 16
            })
        });
        assert!(hits_a_figure);
        Ok(())
    }

    #[test]
    fn replay_file_selects_replay_detector() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("r.jsonl");
        std::fs::write(&path, "{\"frame\": 0, \"detections\": []}\n")?;
        let settings = DetectorSettings {
            kind: DetectorKind::Replay,
            replay_path: Some(path),
            ..DetectorSettings::default()
        };
        assert_eq!(select_detector(&settings).name(), "replay");
        Ok(())
    }
}
