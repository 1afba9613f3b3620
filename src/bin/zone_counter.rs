//! zone_counter - people motion and zone occupancy counter
//!
//! This binary:
//! 1. Loads configuration (defaults, JSON file, environment, flags)
//! 2. Opens the frame source; failure here is fatal
//! 3. Selects the people detector, falling back to HOG
//! 4. Processes frames until end-of-stream, `quit` or Ctrl-C
//! 5. Reads zone-editing commands from stdin (type `help`)

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use zone_counter::config::SnapshotSettings;
use zone_counter::detect::DetectorKind;
use zone_counter::input::StdinCommands;
use zone_counter::render::{FanoutRenderer, LogRenderer, OverlayRenderer, Renderer};
use zone_counter::{open_source, Pipeline, PipelineConfig};

#[derive(Parser, Debug)]
#[command(author, version, about = "People motion + zone counter")]
struct Args {
    /// JSON config file.
    #[arg(long, env = "ZONE_COUNTER_CONFIG")]
    config: Option<PathBuf>,
    /// Frame source: stub://name, a camera index or /dev/video* path, an image
    /// directory or a video file.
    #[arg(long)]
    source: Option<String>,
    /// Path to the zones JSON file.
    #[arg(long)]
    zones: Option<PathBuf>,
    /// Optional CSV output path.
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Resize factor applied to every frame.
    #[arg(long)]
    scale: Option<f32>,
    /// Background model history in frames.
    #[arg(long)]
    bs_history: Option<u32>,
    /// Motion threshold (0-255).
    #[arg(long)]
    bs_thresh: Option<u8>,
    /// People detector: hog, yolo or replay.
    #[arg(long)]
    detector: Option<DetectorKind>,
    /// ONNX model for the yolo detector.
    #[arg(long)]
    yolo_model: Option<PathBuf>,
    /// Confidence threshold for the yolo detector.
    #[arg(long)]
    yolo_conf: Option<f32>,
    /// Model input size for the yolo detector.
    #[arg(long)]
    yolo_imgsz: Option<u32>,
    /// Linear SVM coefficients for the HOG detector.
    #[arg(long)]
    hog_svm: Option<PathBuf>,
    /// JSON Lines detections for the replay detector.
    #[arg(long)]
    replay: Option<PathBuf>,
    /// Enable OSC output of zone counts.
    #[arg(long)]
    osc: bool,
    /// OSC target host.
    #[arg(long)]
    osc_host: Option<String>,
    /// OSC target port.
    #[arg(long)]
    osc_port: Option<u16>,
    /// Write annotated PNG snapshots into this directory.
    #[arg(long)]
    snapshots: Option<PathBuf>,
    /// Snapshot every N-th frame.
    #[arg(long, default_value_t = 30)]
    snapshot_every: u64,
}

impl Args {
    fn apply(self, cfg: &mut PipelineConfig) {
        if let Some(source) = self.source {
            cfg.source = source;
        }
        if let Some(zones) = self.zones {
            cfg.zones_path = zones;
        }
        if self.csv.is_some() {
            cfg.csv_path = self.csv;
        }
        if let Some(scale) = self.scale {
            cfg.scale = scale;
        }
        if let Some(history) = self.bs_history {
            cfg.motion.history = history;
        }
        if let Some(threshold) = self.bs_thresh {
            cfg.motion.motion_threshold = threshold;
        }
        if let Some(kind) = self.detector {
            cfg.detector.kind = kind;
        }
        if let Some(model) = self.yolo_model {
            cfg.detector.model_path = model;
        }
        if let Some(conf) = self.yolo_conf {
            cfg.detector.confidence = conf;
        }
        if let Some(imgsz) = self.yolo_imgsz {
            cfg.detector.input_size = imgsz;
        }
        if self.hog_svm.is_some() {
            cfg.detector.hog_svm_path = self.hog_svm;
        }
        if self.replay.is_some() {
            cfg.detector.replay_path = self.replay;
        }
        if self.osc {
            cfg.osc.enabled = true;
        }
        if let Some(host) = self.osc_host {
            cfg.osc.host = host;
        }
        if let Some(port) = self.osc_port {
            cfg.osc.port = port;
        }
        if let Some(dir) = self.snapshots {
            cfg.snapshots = Some(SnapshotSettings {
                dir,
                every: self.snapshot_every,
            });
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = PipelineConfig::load(args.config.as_deref())?;
    args.apply(&mut cfg);
    cfg.validate()?;
    log::info!(
        "zone_counter {} starting: source={} zones={} detector={:?}",
        env!("CARGO_PKG_VERSION"),
        cfg.source,
        cfg.zones_path.display(),
        cfg.detector.kind
    );

    let mut source = open_source(&cfg.source, cfg.scale)?;
    let mut pipeline = Pipeline::from_config(&cfg);

    let mut renderer: Box<dyn Renderer> = match &cfg.snapshots {
        Some(snapshots) => match OverlayRenderer::new(&snapshots.dir, snapshots.every) {
            Ok(overlay) => Box::new(FanoutRenderer::new(vec![
                Box::new(LogRenderer::new()),
                Box::new(overlay),
            ])),
            Err(e) => {
                log::warn!("snapshots disabled: {:#}", e);
                Box::new(LogRenderer::new())
            }
        },
        None => Box::new(LogRenderer::new()),
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handler = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_handler.store(true, Ordering::SeqCst);
    })
    .expect("error setting Ctrl-C handler");

    let mut commands = StdinCommands::spawn();
    let summary = pipeline.run(
        source.as_mut(),
        &mut commands,
        renderer.as_mut(),
        &shutdown,
    );
    log::info!(
        "source {} delivered {} frame(s)",
        summary.source.source,
        summary.source.frames_captured
    );
    Ok(())
}
