//! CSV session recorder for captured readings.
//!
//! T080: Implement SessionRecorder with one CSV file per sensor
//!
//! The recorder is a collaborator of the pipeline, not part of it: the
//! pipeline forwards individual readings through [`ReadingSink`] and learns
//! about session boundaries via its `recording_started`/`recording_stopped`/
//! `recording_failed` acknowledgements. Recorder failures therefore never
//! touch the connection or the batching path.

use chrono::{DateTime, Utc};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::sensors::types::{SensorReading, SensorType};

/// Receives the stream of readings selected for recording.
///
/// `Send` so the pipeline holding the sink can live on any consumer thread.
pub trait ReadingSink: Send {
    fn record(&mut self, reading: &SensorReading) -> Result<(), RecorderError>;
}

/// Errors from the session recorder.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// Session directory or file could not be created
    #[error("failed to create session file: {0}")]
    CreateFailed(String),

    /// Appending a row failed
    #[error("write failed: {0}")]
    WriteFailed(String),
}

/// Writes one CSV file per sensor into a timestamped session directory.
///
/// Files are created lazily on the first reading of each sensor, so a session
/// only contains files for sensors that actually produced data.
pub struct SessionRecorder {
    session_dir: PathBuf,
    started_at: DateTime<Utc>,
    writers: HashMap<SensorType, BufWriter<File>>,
    files: Vec<PathBuf>,
}

impl SessionRecorder {
    /// Start a session under `base_dir`.
    pub fn start(base_dir: &Path) -> Result<Self, RecorderError> {
        let started_at = Utc::now();
        let session_dir = base_dir.join(format!(
            "NeuroBand_{}",
            started_at.format("%Y%m%d_%H%M%S")
        ));

        std::fs::create_dir_all(&session_dir)
            .map_err(|e| RecorderError::CreateFailed(e.to_string()))?;

        tracing::info!("recording session at {}", session_dir.display());

        Ok(Self {
            session_dir,
            started_at,
            writers: HashMap::new(),
            files: Vec::new(),
        })
    }

    /// When the session started.
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// The session directory.
    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    fn file_stem(sensor: SensorType) -> &'static str {
        match sensor {
            SensorType::Eeg => "eeg",
            SensorType::Ppg => "ppg",
            SensorType::Accelerometer => "accelerometer",
            SensorType::Battery => "battery",
        }
    }

    fn header(sensor: SensorType) -> &'static str {
        match sensor {
            SensorType::Eeg => "timestamp,channel1_uv,channel2_uv,channel1_raw,channel2_raw,lead_off",
            SensorType::Ppg => "timestamp,red,infrared",
            SensorType::Accelerometer => "timestamp,x,y,z",
            SensorType::Battery => "timestamp,level_percent",
        }
    }

    fn writer(&mut self, sensor: SensorType) -> Result<&mut BufWriter<File>, RecorderError> {
        match self.writers.entry(sensor) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let path = self
                    .session_dir
                    .join(format!("{}.csv", Self::file_stem(sensor)));

                let file =
                    File::create(&path).map_err(|e| RecorderError::CreateFailed(e.to_string()))?;
                let mut writer = BufWriter::new(file);

                writeln!(writer, "{}", Self::header(sensor))
                    .map_err(|e| RecorderError::WriteFailed(e.to_string()))?;

                self.files.push(path);
                Ok(entry.insert(writer))
            }
        }
    }

    /// Append one reading to its sensor's file.
    pub fn record(&mut self, reading: &SensorReading) -> Result<(), RecorderError> {
        let writer = self.writer(reading.sensor_type())?;

        let row = match reading {
            SensorReading::Eeg {
                channel1_uv,
                channel2_uv,
                channel1_raw,
                channel2_raw,
                lead_off,
                timestamp,
            } => format!(
                "{:.6},{:.4},{:.4},{},{},{}",
                timestamp, channel1_uv, channel2_uv, channel1_raw, channel2_raw, lead_off
            ),
            SensorReading::Ppg {
                red,
                infrared,
                timestamp,
            } => format!("{:.6},{},{}", timestamp, red, infrared),
            SensorReading::Accelerometer { x, y, z, timestamp } => {
                format!("{:.6},{},{},{}", timestamp, x, y, z)
            }
            SensorReading::Battery {
                level_percent,
                timestamp,
            } => format!("{:.6},{}", timestamp, level_percent),
        };

        writeln!(writer, "{}", row).map_err(|e| RecorderError::WriteFailed(e.to_string()))
    }

    /// Flush everything and return the list of files written.
    pub fn finish(mut self) -> Result<Vec<PathBuf>, RecorderError> {
        for writer in self.writers.values_mut() {
            writer
                .flush()
                .map_err(|e| RecorderError::WriteFailed(e.to_string()))?;
        }

        tracing::info!("recording finished, {} files", self.files.len());
        Ok(self.files)
    }
}

impl ReadingSink for SessionRecorder {
    fn record(&mut self, reading: &SensorReading) -> Result<(), RecorderError> {
        SessionRecorder::record(self, reading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eeg(timestamp: f64) -> SensorReading {
        SensorReading::Eeg {
            channel1_uv: 0.6412,
            channel2_uv: -0.6412,
            channel1_raw: 16,
            channel2_raw: -16,
            lead_off: false,
            timestamp,
        }
    }

    #[test]
    fn test_session_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = SessionRecorder::start(dir.path()).unwrap();

        assert!(recorder.session_dir().exists());
        assert!(recorder
            .session_dir()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("NeuroBand_"));
    }

    #[test]
    fn test_records_one_file_per_sensor() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = SessionRecorder::start(dir.path()).unwrap();

        recorder.record(&eeg(1.0)).unwrap();
        recorder.record(&eeg(1.004)).unwrap();
        recorder
            .record(&SensorReading::Battery {
                level_percent: 88,
                timestamp: 2.0,
            })
            .unwrap();

        let files = recorder.finish().unwrap();
        assert_eq!(files.len(), 2);

        let eeg_path = files.iter().find(|p| p.ends_with("eeg.csv")).unwrap();
        let content = std::fs::read_to_string(eeg_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        // Header + 2 rows
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("timestamp,channel1_uv"));
        assert!(lines[1].starts_with("1.000000,0.6412,-0.6412,16,-16,false"));
    }

    #[test]
    fn test_no_file_for_silent_sensor() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = SessionRecorder::start(dir.path()).unwrap();

        recorder.record(&eeg(1.0)).unwrap();
        let files = recorder.finish().unwrap();

        assert_eq!(files.len(), 1);
        assert!(!files.iter().any(|p| p.ends_with("ppg.csv")));
    }

    #[test]
    fn test_ppg_and_accelerometer_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = SessionRecorder::start(dir.path()).unwrap();

        recorder
            .record(&SensorReading::Ppg {
                red: 4096,
                infrared: 8192,
                timestamp: 1.5,
            })
            .unwrap();
        recorder
            .record(&SensorReading::Accelerometer {
                x: 10,
                y: 20,
                z: 64,
                timestamp: 1.5,
            })
            .unwrap();

        let files = recorder.finish().unwrap();

        let ppg = std::fs::read_to_string(files.iter().find(|p| p.ends_with("ppg.csv")).unwrap())
            .unwrap();
        assert!(ppg.contains("1.500000,4096,8192"));

        let accel = std::fs::read_to_string(
            files
                .iter()
                .find(|p| p.ends_with("accelerometer.csv"))
                .unwrap(),
        )
        .unwrap();
        assert!(accel.contains("1.500000,10,20,64"));
    }

    #[test]
    fn test_start_in_unwritable_location_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocking_file = dir.path().join("blocked");
        std::fs::write(&blocking_file, b"x").unwrap();

        // A file where the session directory should go.
        let result = SessionRecorder::start(&blocking_file);
        assert!(matches!(result, Err(RecorderError::CreateFailed(_))));
    }
}
