use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{default_zone_name, Polygon, Zone};

/// Failures of zone persistence.
#[derive(Debug, thiserror::Error)]
pub enum ZoneStoreError {
    #[error("zone file {} is malformed: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("zone file {} could not be accessed: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Deserialize)]
struct StoredZone {
    #[serde(default)]
    name: Option<String>,
    points: Polygon,
}

/// JSON file holding the zone collection.
///
/// The file is an array of `{"name": ..., "points": [[x, y], ...]}` objects.
/// Saves replace the file atomically through a sibling temporary file, so a
/// crash mid-save leaves the previous collection intact.
#[derive(Clone, Debug)]
pub struct ZoneStore {
    path: PathBuf,
}

impl ZoneStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all zones. A missing file is an empty collection.
    pub fn load(&self) -> Result<Vec<Zone>, ZoneStoreError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(self.io_error(source)),
        };
        let stored: Vec<StoredZone> =
            serde_json::from_slice(&data).map_err(|source| ZoneStoreError::Malformed {
                path: self.path.clone(),
                source,
            })?;
        Ok(stored
            .into_iter()
            .enumerate()
            .map(|(i, zone)| Zone {
                name: zone.name.unwrap_or_else(|| default_zone_name(i + 1)),
                points: zone.points,
            })
            .collect())
    }

    /// Persist `zones` in order, replacing any previous file.
    pub fn save(&self, zones: &[Zone]) -> Result<(), ZoneStoreError> {
        let json = serde_json::to_vec_pretty(zones).map_err(|e| self.io_error(e.into()))?;
        let tmp = self.temp_path();
        let written = fs::File::create(&tmp).and_then(|mut file| {
            file.write_all(&json)?;
            file.write_all(b"\n")?;
            file.sync_all()
        });
        if let Err(source) = written.and_then(|_| fs::rename(&tmp, &self.path)) {
            let _ = fs::remove_file(&tmp);
            return Err(self.io_error(source));
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "zones.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> ZoneStoreError {
        ZoneStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
