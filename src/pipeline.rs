//! Pipeline controller: owns the run state and drives the per-frame flow.
//!
//! One loop iteration:
//!
//! 1. unless paused, read a frame and run detect, motion, occupancy and
//!    telemetry on it (`process_frame`);
//! 2. apply every pending operator command;
//! 3. render the most recent processed frame.
//!
//! Everything that changes during a run lives in `PipelineState` and is only
//! touched from the loop's thread. Only a source that cannot be opened is
//! fatal, and that happens before `run` is called; inside the loop detector
//! errors, sink failures, zone file errors and render errors are logged and
//! absorbed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::config::PipelineConfig;
use crate::detect::{select_detector, Detection, PeopleDetector};
use crate::frame::Frame;
use crate::ingest::{FrameSource, SourceStats};
use crate::input::{Command, CommandSource};
use crate::motion::{MotionEstimator, MotionReport, MotionSettings};
use crate::occupancy::{OccupancyEngine, OccupancyTally};
use crate::render::Renderer;
use crate::telemetry::{FrameMetrics, TelemetryEmitter};
use crate::zones::{Zone, ZoneEditor, ZoneStore};
use crate::Point;

/// Sleep between loop iterations while paused.
const PAUSED_POLL_INTERVAL: Duration = Duration::from_millis(30);

/// Mutable state of one run.
#[derive(Debug)]
pub struct PipelineState {
    pub zones: Vec<Zone>,
    pub editor: ZoneEditor,
    pub paused: bool,
    pub help_visible: bool,
    pub running: bool,
    /// Number of frames processed so far; also the index of the next row.
    pub frame_index: u64,
    pub zone_store: ZoneStore,
}

impl PipelineState {
    /// State with no zones.
    pub fn new(zone_store: ZoneStore) -> Self {
        Self::with_zones(zone_store, Vec::new())
    }

    /// State seeded from the zone file. A malformed file is logged and
    /// treated as empty.
    pub fn load(zone_store: ZoneStore) -> Self {
        let zones = match zone_store.load() {
            Ok(zones) => {
                log::info!(
                    "loaded {} zone(s) from {}",
                    zones.len(),
                    zone_store.path().display()
                );
                zones
            }
            Err(e) => {
                log::warn!("{}; starting with no zones", e);
                Vec::new()
            }
        };
        Self::with_zones(zone_store, zones)
    }

    pub fn with_zones(zone_store: ZoneStore, zones: Vec<Zone>) -> Self {
        Self {
            editor: ZoneEditor::new(zones.len()),
            zones,
            paused: false,
            help_visible: true,
            running: true,
            frame_index: 0,
            zone_store,
        }
    }

    pub fn zone_names(&self) -> Vec<String> {
        self.zones.iter().map(|z| z.name.clone()).collect()
    }

    pub fn apply(&mut self, command: Command) {
        match command {
            Command::AddPoint { x, y } => self.editor.add_point(Point::new(x, y)),
            Command::UndoLastPoint => {
                self.editor.undo_point();
            }
            Command::FinalizeZone => {
                if let Some(zone) = self.editor.finalize(&mut self.zones) {
                    log::info!("created {} with {} points", zone.name, zone.points.len());
                } else {
                    log::debug!("discarded polygon with fewer than 3 points");
                }
            }
            Command::TogglePause => {
                self.paused = !self.paused;
                log::info!("{}", if self.paused { "paused" } else { "resumed" });
            }
            Command::ToggleHelp => self.help_visible = !self.help_visible,
            Command::SaveZones => match self.zone_store.save(&self.zones) {
                Ok(()) => log::info!(
                    "saved {} zone(s) to {}",
                    self.zones.len(),
                    self.zone_store.path().display()
                ),
                Err(e) => log::warn!("{}", e),
            },
            Command::LoadZones => match self.zone_store.load() {
                Ok(zones) => {
                    log::info!(
                        "loaded {} zone(s) from {}",
                        zones.len(),
                        self.zone_store.path().display()
                    );
                    self.zones = zones;
                }
                Err(e) => {
                    log::warn!("{}; continuing with no zones", e);
                    self.zones.clear();
                }
            },
            Command::Quit => self.running = false,
        }
    }
}

/// Everything computed for one processed frame.
#[derive(Clone, Debug)]
pub struct FrameReport {
    pub frame_index: u64,
    pub detections: Vec<Detection>,
    pub motion: MotionReport,
    pub tally: OccupancyTally,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    Quit,
    Shutdown,
    SourceFailed,
}

#[derive(Clone, Debug)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub total_detections: u64,
    pub peak_people: usize,
    /// Mean of the per-frame average motion.
    pub mean_motion: f32,
    pub zones: usize,
    pub stop: StopReason,
    pub elapsed: Duration,
    pub source: SourceStats,
}

impl RunSummary {
    fn log(&self) {
        log::info!(
            "run finished ({:?}): {} frames in {:.1}s, {} detections, peak {} people, mean motion {:.2}%, {} zone(s)",
            self.stop,
            self.frames_processed,
            self.elapsed.as_secs_f32(),
            self.total_detections,
            self.peak_people,
            self.mean_motion,
            self.zones
        );
    }
}

pub struct Pipeline {
    detector: Box<dyn PeopleDetector>,
    motion: MotionEstimator,
    occupancy: OccupancyEngine,
    telemetry: TelemetryEmitter,
    state: PipelineState,
}

impl Pipeline {
    pub fn new(
        detector: Box<dyn PeopleDetector>,
        motion: &MotionSettings,
        telemetry: TelemetryEmitter,
        state: PipelineState,
    ) -> Self {
        Self {
            detector,
            motion: MotionEstimator::new(motion),
            occupancy: OccupancyEngine,
            telemetry,
            state,
        }
    }

    /// Load zones, select the detector and open the telemetry sinks.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let state = PipelineState::load(ZoneStore::new(&config.zones_path));
        let telemetry = TelemetryEmitter::open(&config.telemetry_settings(), state.zone_names());
        let detector = select_detector(&config.detector);
        Self::new(detector, &config.motion, telemetry, state)
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut PipelineState {
        &mut self.state
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    /// Frames folded into the background model so far.
    pub fn frames_modeled(&self) -> u64 {
        self.motion.frames_seen()
    }

    pub fn apply(&mut self, command: Command) {
        self.state.apply(command);
    }

    /// Detect, estimate motion, tally zones and emit telemetry for one frame.
    pub fn process_frame(&mut self, frame: &Frame) -> FrameReport {
        let detections = match self.detector.detect(frame) {
            Ok(detections) => detections,
            Err(e) => {
                log::warn!(
                    "detector '{}' failed on frame {}: {:#}",
                    self.detector.name(),
                    frame.index,
                    e
                );
                Vec::new()
            }
        };
        let motion = self.motion.compute(frame.gray(), &detections);
        let tally = self.occupancy.compute(&detections, &self.state.zones);

        let frame_index = self.state.frame_index;
        self.telemetry.emit(&FrameMetrics {
            frame_index,
            total: detections.len(),
            avg_motion: motion.avg_motion,
            tally: tally.clone(),
        });
        self.state.frame_index += 1;

        FrameReport {
            frame_index,
            detections,
            motion,
            tally,
        }
    }

    /// Run until end-of-stream, a quit command or `shutdown` being set.
    ///
    /// The source is released and the telemetry sinks are closed on every
    /// exit path.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        commands: &mut dyn CommandSource,
        renderer: &mut dyn Renderer,
        shutdown: &AtomicBool,
    ) -> RunSummary {
        let started = Instant::now();
        let first_frame = self.state.frame_index;
        let mut total_detections = 0u64;
        let mut peak_people = 0usize;
        let mut motion_sum = 0.0f64;
        let mut last: Option<(Frame, FrameReport)> = None;
        self.state.running = true;
        log::info!(
            "processing {} with detector '{}'",
            source.describe(),
            self.detector.name()
        );

        let stop = loop {
            if shutdown.load(Ordering::SeqCst) {
                break StopReason::Shutdown;
            }
            if !self.state.paused {
                match source.next_frame() {
                    Ok(Some(frame)) => {
                        let report = self.process_frame(&frame);
                        total_detections += report.detections.len() as u64;
                        peak_people = peak_people.max(report.detections.len());
                        motion_sum += report.motion.avg_motion as f64;
                        last = Some((frame, report));
                    }
                    Ok(None) => break StopReason::EndOfStream,
                    Err(e) => {
                        log::error!("frame source {} failed: {:#}", source.describe(), e);
                        break StopReason::SourceFailed;
                    }
                }
            }

            for command in commands.poll() {
                self.apply(command);
            }
            if !self.state.running {
                break StopReason::Quit;
            }

            if let Some((frame, report)) = &last {
                if let Err(e) = renderer.render(frame, Some(report), &self.state) {
                    log::warn!("render failed: {:#}", e);
                }
            }
            if self.state.paused {
                std::thread::sleep(PAUSED_POLL_INTERVAL);
            }
        };

        source.release();
        self.telemetry.close();
        self.state.running = false;

        let frames_processed = self.state.frame_index - first_frame;
        let summary = RunSummary {
            frames_processed,
            total_detections,
            peak_people,
            mean_motion: if frames_processed == 0 {
                0.0
            } else {
                (motion_sum / frames_processed as f64) as f32
            },
            zones: self.state.zones.len(),
            stop,
            elapsed: started.elapsed(),
            source: source.stats(),
        };
        summary.log();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{ReplayDetector, ReplayRecord};
    use crate::input::ScriptedCommands;
    use crate::render::LogRenderer;
    use anyhow::Result;
    use image::RgbImage;

    /// Serves `count` blank frames and counts releases.
    struct BlankSource {
        next: u64,
        count: u64,
        released: u32,
    }

    impl BlankSource {
        fn new(count: u64) -> Self {
            Self {
                next: 0,
                count,
                released: 0,
            }
        }
    }

    impl FrameSource for BlankSource {
        fn describe(&self) -> String {
            "blank".into()
        }

        fn next_frame(&mut self) -> Result<Option<Frame>> {
            if self.next >= self.count {
                return Ok(None);
            }
            let frame = Frame::new(RgbImage::new(40, 40), self.next);
            self.next += 1;
            Ok(Some(frame))
        }

        fn release(&mut self) {
            self.released += 1;
        }

        fn stats(&self) -> SourceStats {
            SourceStats {
                frames_captured: self.next,
                source: self.describe(),
            }
        }
    }

    struct FailingDetector;

    impl PeopleDetector for FailingDetector {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            Err(anyhow::anyhow!("boom"))
        }
    }

    fn replay_all(frames: u64, detections: &[Detection]) -> Box<dyn PeopleDetector> {
        let records = (0..frames).map(|i| ReplayRecord::new(i, detections));
        Box::new(ReplayDetector::from_records(records))
    }

    fn pipeline(dir: &std::path::Path, detector: Box<dyn PeopleDetector>) -> Pipeline {
        let state = PipelineState::new(ZoneStore::new(dir.join("zones.json")));
        Pipeline::new(
            detector,
            &MotionSettings::default(),
            TelemetryEmitter::default(),
            state,
        )
    }

    #[test]
    fn runs_to_end_of_stream_and_releases_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path(), replay_all(5, &[Detection::new(5, 5, 10, 10, 0.9)]));
        let mut source = BlankSource::new(5);
        let summary = pipeline.run(
            &mut source,
            &mut ScriptedCommands::default(),
            &mut LogRenderer::new(),
            &AtomicBool::new(false),
        );
        assert_eq!(summary.stop, StopReason::EndOfStream);
        assert_eq!(summary.frames_processed, 5);
        assert_eq!(summary.total_detections, 5);
        assert_eq!(source.released, 1);
    }

    #[test]
    fn detector_errors_count_as_empty_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path(), Box::new(FailingDetector));
        let report = pipeline.process_frame(&Frame::new(RgbImage::new(8, 8), 0));
        assert!(report.detections.is_empty());
        assert_eq!(report.motion.avg_motion, 0.0);
        assert_eq!(pipeline.state().frame_index, 1);
    }

    #[test]
    fn drawn_zone_is_counted_on_following_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path(), replay_all(3, &[Detection::new(10, 10, 4, 4, 0.8)]));
        let frame = Frame::new(RgbImage::new(40, 40), 0);
        assert!(pipeline.process_frame(&frame).tally.is_empty());

        for (x, y) in [(0, 0), (30, 0), (30, 30), (0, 30)] {
            pipeline.apply(Command::AddPoint { x, y });
        }
        pipeline.apply(Command::FinalizeZone);
        let frame = Frame::new(RgbImage::new(40, 40), 1);
        let report = pipeline.process_frame(&frame);
        assert_eq!(report.tally.get("Zone 1"), Some(1));
    }

    #[test]
    fn quit_command_stops_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path(), replay_all(0, &[]));
        let mut source = BlankSource::new(100);
        let mut commands = ScriptedCommands::new(vec![(2, Command::Quit)]);
        let summary = pipeline.run(
            &mut source,
            &mut commands,
            &mut LogRenderer::new(),
            &AtomicBool::new(false),
        );
        assert_eq!(summary.stop, StopReason::Quit);
        assert_eq!(summary.frames_processed, 3);
        assert_eq!(source.released, 1);
    }

    #[test]
    fn shutdown_flag_stops_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path(), replay_all(0, &[]));
        let mut source = BlankSource::new(10);
        let summary = pipeline.run(
            &mut source,
            &mut ScriptedCommands::default(),
            &mut LogRenderer::new(),
            &AtomicBool::new(true),
        );
        assert_eq!(summary.stop, StopReason::Shutdown);
        assert_eq!(summary.frames_processed, 0);
        assert_eq!(source.released, 1);
    }

    #[test]
    fn paused_pipeline_reads_no_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path(), replay_all(0, &[]));
        let mut source = BlankSource::new(10);
        let mut commands = ScriptedCommands::new(vec![
            (1, Command::TogglePause),
            (4, Command::Quit),
        ]);
        let summary = pipeline.run(
            &mut source,
            &mut commands,
            &mut LogRenderer::new(),
            &AtomicBool::new(false),
        );
        assert_eq!(summary.frames_processed, 2);
        assert_eq!(source.next, 2);
    }

    #[test]
    fn malformed_reload_clears_zones() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path(), replay_all(0, &[]));
        pipeline.state_mut().zones.push(Zone::new(
            "A",
            [Point::new(0, 0), Point::new(1, 0), Point::new(1, 1)],
        ));
        std::fs::write(dir.path().join("zones.json"), "{broken").unwrap();
        pipeline.apply(Command::LoadZones);
        assert!(pipeline.state().zones.is_empty());
        assert!(pipeline.state().running);
    }

    #[test]
    fn reload_keeps_active_polygon() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path(), replay_all(0, &[]));
        pipeline.apply(Command::AddPoint { x: 4, y: 4 });
        pipeline.apply(Command::LoadZones);
        assert_eq!(pipeline.state().editor.active(), &[Point::new(4, 4)]);
    }

    #[test]
    fn toggles_flip_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = pipeline(dir.path(), replay_all(0, &[]));
        pipeline.apply(Command::ToggleHelp);
        pipeline.apply(Command::TogglePause);
        assert!(!pipeline.state().help_visible);
        assert!(pipeline.state().paused);
        pipeline.apply(Command::TogglePause);
        assert!(!pipeline.state().paused);
    }
}
