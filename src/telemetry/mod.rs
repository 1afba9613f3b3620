//! Per-frame metrics fan-out to the row log and the OSC sink.
//!
//! Both sinks are optional and best-effort: a sink that cannot be opened is
//! left out with a warning, and write or send failures never stop the
//! pipeline.

mod osc;
mod rowlog;

use std::path::PathBuf;

use crate::occupancy::OccupancyTally;

pub use osc::{
    avg_motion_message, zone_amount_message, OscSink, AVG_MOTION_ADDRESS, ZONE_AMOUNT_ADDRESS,
};
pub use rowlog::RowLogSink;

/// What gets reported for one processed frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameMetrics {
    pub frame_index: u64,
    /// Number of detections in the frame.
    pub total: usize,
    pub avg_motion: f32,
    pub tally: OccupancyTally,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OscTarget {
    pub host: String,
    pub port: u16,
}

#[derive(Clone, Debug, Default)]
pub struct TelemetrySettings {
    pub csv_path: Option<PathBuf>,
    pub osc: Option<OscTarget>,
}

#[derive(Default)]
pub struct TelemetryEmitter {
    row_log: Option<RowLogSink>,
    osc: Option<OscSink>,
    row_log_failed: bool,
}

impl TelemetryEmitter {
    pub fn new(row_log: Option<RowLogSink>, osc: Option<OscSink>) -> Self {
        Self {
            row_log,
            osc,
            row_log_failed: false,
        }
    }

    /// Open the configured sinks. The row log header uses `zone_names`.
    pub fn open(settings: &TelemetrySettings, zone_names: Vec<String>) -> Self {
        let row_log = settings.csv_path.as_ref().and_then(|path| {
            match RowLogSink::create(path, zone_names) {
                Ok(sink) => {
                    log::info!(
                        "row log -> {} ({} zone columns)",
                        path.display(),
                        sink.zone_names().len()
                    );
                    Some(sink)
                }
                Err(e) => {
                    log::warn!("row log disabled: {:#}", e);
                    None
                }
            }
        });
        let osc = settings.osc.as_ref().and_then(|target| {
            match OscSink::connect(&target.host, target.port) {
                Ok(sink) => {
                    log::info!("OSC enabled -> {}", sink.target());
                    Some(sink)
                }
                Err(e) => {
                    log::warn!("OSC disabled: {:#}", e);
                    None
                }
            }
        });
        Self::new(row_log, osc)
    }

    pub fn has_row_log(&self) -> bool {
        self.row_log.is_some()
    }

    pub fn has_osc(&self) -> bool {
        self.osc.is_some()
    }

    pub fn emit(&mut self, metrics: &FrameMetrics) {
        if let Some(osc) = &self.osc {
            osc.send_frame(metrics.avg_motion, &metrics.tally);
        }
        if let Some(sink) = self.row_log.as_mut() {
            let written = sink.write_row(
                metrics.frame_index,
                metrics.total,
                metrics.avg_motion,
                &metrics.tally,
            );
            if let Err(e) = written {
                if !self.row_log_failed {
                    log::warn!("row log write failed: {:#}", e);
                    self.row_log_failed = true;
                }
            }
        }
    }

    /// Flush and drop all sinks. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(mut sink) = self.row_log.take() {
            if let Err(e) = sink.flush() {
                log::warn!("{:#}", e);
            }
        }
        self.osc = None;
    }
}

impl Drop for TelemetryEmitter {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unopenable_csv_leaves_sink_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let settings = TelemetrySettings {
            csv_path: Some(dir.path().join("missing").join("log.csv")),
            osc: None,
        };
        let mut emitter = TelemetryEmitter::open(&settings, vec!["A".into()]);
        assert!(!emitter.has_row_log());
        emitter.emit(&FrameMetrics {
            frame_index: 0,
            total: 0,
            avg_motion: 0.0,
            tally: OccupancyTally::default(),
        });
        emitter.close();
    }

    #[test]
    fn emits_rows_until_closed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let settings = TelemetrySettings {
            csv_path: Some(path.clone()),
            osc: None,
        };
        let mut emitter = TelemetryEmitter::open(&settings, vec!["A".into()]);
        let tally: OccupancyTally = vec![("A".to_string(), 1)].into_iter().collect();
        emitter.emit(&FrameMetrics {
            frame_index: 7,
            total: 1,
            avg_motion: 3.0,
            tally,
        });
        emitter.close();
        emitter.close();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "frame,count_total,avg_motion,A\n7,1,3.00,1\n");
    }
}
