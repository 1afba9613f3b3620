use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::occupancy::OccupancyTally;

/// Append-only CSV log, one row per processed frame.
///
/// The zone columns are fixed when the file is created. Zones added later
/// are not logged and zones that disappear are written as 0.
pub struct RowLogSink {
    path: PathBuf,
    writer: BufWriter<File>,
    zone_names: Vec<String>,
}

impl RowLogSink {
    pub fn create(path: impl AsRef<Path>, zone_names: Vec<String>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .with_context(|| format!("failed to create row log {}", path.display()))?;
        let mut sink = Self {
            path,
            writer: BufWriter::new(file),
            zone_names,
        };
        let mut header = vec!["frame".to_string(), "count_total".into(), "avg_motion".into()];
        header.extend(sink.zone_names.iter().map(|n| escape(n)));
        sink.write_line(&header)?;
        Ok(sink)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn zone_names(&self) -> &[String] {
        &self.zone_names
    }

    pub fn write_row(
        &mut self,
        frame_index: u64,
        total: usize,
        avg_motion: f32,
        tally: &OccupancyTally,
    ) -> Result<()> {
        let mut row = vec![
            frame_index.to_string(),
            total.to_string(),
            format!("{:.2}", avg_motion),
        ];
        row.extend(
            self.zone_names
                .iter()
                .map(|name| tally.get(name).unwrap_or(0).to_string()),
        );
        self.write_line(&row)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("failed to flush row log {}", self.path.display()))
    }

    fn write_line(&mut self, fields: &[String]) -> Result<()> {
        writeln!(self.writer, "{}", fields.join(","))
            .with_context(|| format!("failed to write row log {}", self.path.display()))?;
        self.flush()
    }
}

/// Quote a field containing a separator, quote or line break.
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(entries: &[(&str, u32)]) -> OccupancyTally {
        entries.iter().map(|(n, c)| (n.to_string(), *c)).collect()
    }

    #[test]
    fn header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut sink = RowLogSink::create(&path, vec!["A".into(), "B".into()]).unwrap();
        sink.write_row(0, 3, 12.5, &tally(&[("A", 1), ("B", 2)])).unwrap();
        sink.write_row(1, 0, 0.0, &tally(&[("A", 0), ("B", 0)])).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "frame,count_total,avg_motion,A,B\n0,3,12.50,1,2\n1,0,0.00,0,0\n"
        );
    }

    #[test]
    fn header_is_fixed_at_creation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut sink = RowLogSink::create(&path, vec!["A".into()]).unwrap();
        sink.write_row(0, 2, 50.0, &tally(&[("A", 1), ("Zone 2", 1)])).unwrap();
        sink.write_row(1, 2, 50.0, &tally(&[("Zone 2", 1)])).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "frame,count_total,avg_motion,A");
        assert_eq!(lines[1], "0,2,50.00,1");
        assert_eq!(lines[2], "1,2,50.00,0");
    }

    #[test]
    fn shared_zone_names_report_the_combined_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");
        let mut sink = RowLogSink::create(&path, vec!["Dup".into(), "Dup".into()]).unwrap();
        sink.write_row(0, 2, 0.0, &tally(&[("Dup", 1), ("Dup", 1)])).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().nth(1), Some("0,2,0.00,2,2"));
    }

    #[test]
    fn names_with_commas_are_quoted() {
        assert_eq!(escape("Bar, north"), "\"Bar, north\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape("Door"), "Door");
    }
}
