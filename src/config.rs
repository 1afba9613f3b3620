use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::{DetectorKind, DetectorSettings};
use crate::motion::MotionSettings;
use crate::telemetry::{OscTarget, TelemetrySettings};

const DEFAULT_SOURCE: &str = "stub://camera";
const DEFAULT_ZONES_PATH: &str = "zones.json";
const DEFAULT_OSC_HOST: &str = "127.0.0.1";
const DEFAULT_OSC_PORT: u16 = 9000;
const DEFAULT_SNAPSHOT_EVERY: u64 = 30;

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    source: Option<String>,
    scale: Option<f32>,
    zones_path: Option<PathBuf>,
    csv_path: Option<PathBuf>,
    motion: Option<MotionConfigFile>,
    detector: Option<DetectorConfigFile>,
    osc: Option<OscConfigFile>,
    snapshots: Option<SnapshotConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct MotionConfigFile {
    history: Option<u32>,
    threshold: Option<u8>,
    var_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    kind: Option<DetectorKind>,
    hog_svm: Option<PathBuf>,
    hit_threshold: Option<f32>,
    scale_step: Option<f32>,
    model: Option<PathBuf>,
    confidence: Option<f32>,
    input_size: Option<u32>,
    replay: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct OscConfigFile {
    enabled: Option<bool>,
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
struct SnapshotConfigFile {
    dir: Option<PathBuf>,
    every: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OscSettings {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for OscSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            host: DEFAULT_OSC_HOST.to_string(),
            port: DEFAULT_OSC_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotSettings {
    pub dir: PathBuf,
    pub every: u64,
}

/// Runtime configuration of the zone counter.
///
/// Layers, lowest precedence first: built-in defaults, the JSON file named
/// by the `path` argument or `ZONE_COUNTER_CONFIG`, then `ZONE_COUNTER_*`
/// environment variables. Binaries apply their command-line flags on top and
/// call `validate` again.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub source: String,
    pub scale: f32,
    pub zones_path: PathBuf,
    pub csv_path: Option<PathBuf>,
    pub motion: MotionSettings,
    pub detector: DetectorSettings,
    pub osc: OscSettings,
    pub snapshots: Option<SnapshotSettings>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE.to_string(),
            scale: 1.0,
            zones_path: PathBuf::from(DEFAULT_ZONES_PATH),
            csv_path: None,
            motion: MotionSettings::default(),
            detector: DetectorSettings::default(),
            osc: OscSettings::default(),
            snapshots: None,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("ZONE_COUNTER_CONFIG")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        let file_cfg = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Some(read_config_file(&path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Self {
        let defaults = Self::default();
        let motion = file.motion.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let osc = file.osc.unwrap_or_default();

        let mut hog = defaults.detector.hog.clone();
        if let Some(hit_threshold) = detector.hit_threshold {
            hog.hit_threshold = hit_threshold;
        }
        if let Some(scale_step) = detector.scale_step {
            hog.scale_step = scale_step;
        }

        Self {
            source: file.source.unwrap_or(defaults.source),
            scale: file.scale.unwrap_or(defaults.scale),
            zones_path: file.zones_path.unwrap_or(defaults.zones_path),
            csv_path: file.csv_path,
            motion: MotionSettings {
                history: motion.history.unwrap_or(defaults.motion.history),
                var_threshold: motion
                    .var_threshold
                    .unwrap_or(defaults.motion.var_threshold),
                motion_threshold: motion
                    .threshold
                    .unwrap_or(defaults.motion.motion_threshold),
            },
            detector: DetectorSettings {
                kind: detector.kind.unwrap_or(defaults.detector.kind),
                hog_svm_path: detector.hog_svm,
                hog,
                model_path: detector.model.unwrap_or(defaults.detector.model_path),
                confidence: detector.confidence.unwrap_or(defaults.detector.confidence),
                input_size: detector.input_size.unwrap_or(defaults.detector.input_size),
                replay_path: detector.replay,
            },
            osc: OscSettings {
                enabled: osc.enabled.unwrap_or(defaults.osc.enabled),
                host: osc.host.unwrap_or(defaults.osc.host),
                port: osc.port.unwrap_or(defaults.osc.port),
            },
            snapshots: file.snapshots.and_then(|s| {
                s.dir.map(|dir| SnapshotSettings {
                    dir,
                    every: s.every.unwrap_or(DEFAULT_SNAPSHOT_EVERY),
                })
            }),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(source) = std::env::var("ZONE_COUNTER_SOURCE") {
            if !source.trim().is_empty() {
                self.source = source;
            }
        }
        if let Ok(path) = std::env::var("ZONE_COUNTER_ZONES") {
            if !path.trim().is_empty() {
                self.zones_path = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("ZONE_COUNTER_CSV") {
            if !path.trim().is_empty() {
                self.csv_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(target) = std::env::var("ZONE_COUNTER_OSC") {
            if !target.trim().is_empty() {
                let (host, port) = parse_host_port(&target).context("ZONE_COUNTER_OSC")?;
                self.osc = OscSettings {
                    enabled: true,
                    host,
                    port,
                };
            }
        }
        if let Ok(kind) = std::env::var("ZONE_COUNTER_DETECTOR") {
            if !kind.trim().is_empty() {
                self.detector.kind = kind
                    .parse()
                    .map_err(|e| anyhow!("ZONE_COUNTER_DETECTOR: {}", e))?;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            return Err(anyhow!("source must not be empty"));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(anyhow!("scale must be greater than zero"));
        }
        if self.motion.history == 0 {
            return Err(anyhow!("background history must be greater than zero"));
        }
        if !self.motion.var_threshold.is_finite() || self.motion.var_threshold <= 0.0 {
            return Err(anyhow!("variance threshold must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.detector.confidence) {
            return Err(anyhow!("detector confidence must be within [0, 1]"));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("model input size must be greater than zero"));
        }
        if self.osc.port == 0 {
            return Err(anyhow!("OSC port must be greater than zero"));
        }
        if let Some(snapshots) = &self.snapshots {
            if snapshots.every == 0 {
                return Err(anyhow!("snapshot interval must be greater than zero"));
            }
        }
        Ok(())
    }

    pub fn telemetry_settings(&self) -> TelemetrySettings {
        TelemetrySettings {
            csv_path: self.csv_path.clone(),
            osc: self.osc.enabled.then(|| OscTarget {
                host: self.osc.host.clone(),
                port: self.osc.port,
            }),
        }
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

/// Split an OSC target such as `127.0.0.1:9000` or `[::1]:9000`.
pub fn parse_host_port(value: &str) -> Result<(String, u16)> {
    let (host, port) = value
        .trim()
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("OSC target must be HOST:PORT, got '{}'", value))?;
    let port: u16 = port
        .parse()
        .map_err(|_| anyhow!("OSC port must be an integer, got '{}'", port))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(anyhow!("OSC target host must not be empty"));
    }
    Ok((host.to_string(), port))
}
