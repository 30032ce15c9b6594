//! Sensor types and enums for the NeuroBand headband.
//!
//! T010: Define SensorType and ConnectionState enums
//! T011: Define SensorReading variants with physical units
//! T013: Define SensorError and ParseError enums

use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;

use crate::sensors::batch::Timestamped;

/// Type of biosignal sensor on the headband.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    /// Two-channel EEG front-end
    Eeg,
    /// Photoplethysmography (red + infrared)
    Ppg,
    /// Three-axis accelerometer
    Accelerometer,
    /// Battery gauge
    Battery,
}

impl SensorType {
    /// All sensor types, in characteristic-dispatch order.
    pub const ALL: [SensorType; 4] = [
        SensorType::Eeg,
        SensorType::Ppg,
        SensorType::Accelerometer,
        SensorType::Battery,
    ];
}

impl std::fmt::Display for SensorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensorType::Eeg => write!(f, "EEG"),
            SensorType::Ppg => write!(f, "PPG"),
            SensorType::Accelerometer => write!(f, "Accelerometer"),
            SensorType::Battery => write!(f, "Battery"),
        }
    }
}

/// A single decoded reading from the headband.
///
/// Timestamps are in seconds. EEG/PPG/accelerometer timestamps are
/// reconstructed from the on-device counter in the packet header; battery
/// packets carry no counter, so their timestamp is wall-clock receipt time.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorReading {
    /// Two-channel EEG sample in microvolts, with raw ADC values retained.
    Eeg {
        channel1_uv: f64,
        channel2_uv: f64,
        channel1_raw: i32,
        channel2_raw: i32,
        /// Electrode has lost skin contact
        lead_off: bool,
        timestamp: f64,
    },
    /// PPG sample: raw ADC counts for the red and infrared LEDs.
    Ppg {
        red: i32,
        infrared: i32,
        timestamp: f64,
    },
    /// Accelerometer sample, raw axis counts.
    Accelerometer {
        x: i16,
        y: i16,
        z: i16,
        timestamp: f64,
    },
    /// Battery charge level.
    Battery { level_percent: u8, timestamp: f64 },
}

impl SensorReading {
    /// The sensor this reading came from.
    pub fn sensor_type(&self) -> SensorType {
        match self {
            SensorReading::Eeg { .. } => SensorType::Eeg,
            SensorReading::Ppg { .. } => SensorType::Ppg,
            SensorReading::Accelerometer { .. } => SensorType::Accelerometer,
            SensorReading::Battery { .. } => SensorType::Battery,
        }
    }
}

impl Timestamped for SensorReading {
    fn timestamp(&self) -> f64 {
        match self {
            SensorReading::Eeg { timestamp, .. }
            | SensorReading::Ppg { timestamp, .. }
            | SensorReading::Accelerometer { timestamp, .. }
            | SensorReading::Battery { timestamp, .. } => *timestamp,
        }
    }
}

/// Connection state of the headband link.
///
/// Exactly one state is active at a time. The state is owned by
/// [`crate::sensors::link::ConnectionStateMachine`]; everything else reads
/// snapshots.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ConnectionState {
    /// Not connected
    #[default]
    Disconnected,
    /// Scanning for headbands
    Scanning,
    /// Connection in progress
    Connecting(String),
    /// Active connection
    Connected(String),
    /// Auto-reconnect in progress after an unexpected drop
    Reconnecting(String),
    /// Link-level failure; recoverable once the cause clears
    Failed(SensorError),
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Scanning => write!(f, "Scanning..."),
            ConnectionState::Connecting(id) => write!(f, "Connecting to {}", id),
            ConnectionState::Connected(id) => write!(f, "Connected to {}", id),
            ConnectionState::Reconnecting(id) => write!(f, "Reconnecting to {}", id),
            ConnectionState::Failed(err) => write!(f, "Failed: {}", err),
        }
    }
}

/// A headband discovered during BLE scanning.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    /// BLE device address/identifier
    pub device_id: String,
    /// Advertised local name
    pub name: String,
    /// Signal strength (RSSI)
    pub rssi: Option<i16>,
    /// When the device was last seen
    pub last_seen: Instant,
}

/// Events published by the monitoring pipeline.
///
/// Consumers receive owned copies over a crossbeam channel; nothing here
/// references live pipeline state.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// A headband matching the name filter was discovered
    DeviceDiscovered(DiscoveredDevice),
    /// The link state changed
    ConnectionChanged(ConnectionState),
    /// A sensor's latest reading was updated
    ReadingUpdated(SensorReading),
    /// A batch window flushed
    BatchReady {
        sensor: SensorType,
        readings: Vec<SensorReading>,
    },
    /// Recording started or stopped
    RecordingChanged(bool),
    /// A non-fatal error occurred
    Error(SensorError),
}

/// Errors from packet decoding.
///
/// Always a typed failure, never a panic: the pipeline drops the offending
/// payload and keeps processing subsequent ones.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// Payload too short to hold the header and at least one sample
    #[error("packet too short: got {actual} bytes, need at least {expected}")]
    PacketTooShort { expected: usize, actual: usize },

    /// A decoded value fell outside the configured hardware bounds
    #[error("{sensor} sample out of bounds: {value}")]
    InvalidSampleBounds { sensor: SensorType, value: f64 },
}

/// Errors that can occur in the sensor system.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    /// Bluetooth is powered off, unauthorized, or unsupported
    #[error("Bluetooth is unavailable")]
    BluetoothUnavailable,

    /// No device found with the given identifier
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Connection to the headband failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A characteristic payload could not be decoded
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Recording could not continue; connection and batching are unaffected
    #[error("Recording failed: {0}")]
    RecordingFailed(String),

    /// A file operation in the recorder failed
    #[error("File operation failed: {0}")]
    FileOperationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_sensor_type() {
        let eeg = SensorReading::Eeg {
            channel1_uv: 1.0,
            channel2_uv: -1.0,
            channel1_raw: 100,
            channel2_raw: -100,
            lead_off: false,
            timestamp: 0.5,
        };
        assert_eq!(eeg.sensor_type(), SensorType::Eeg);

        let battery = SensorReading::Battery {
            level_percent: 80,
            timestamp: 1.0,
        };
        assert_eq!(battery.sensor_type(), SensorType::Battery);
    }

    #[test]
    fn test_reading_timestamp_accessor() {
        let ppg = SensorReading::Ppg {
            red: 4096,
            infrared: 8192,
            timestamp: 1.5258789,
        };
        assert!((ppg.timestamp() - 1.5258789).abs() < 1e-9);
    }

    #[test]
    fn test_connection_state_default() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_failed_state_carries_error() {
        let state = ConnectionState::Failed(SensorError::BluetoothUnavailable);
        assert_eq!(
            state,
            ConnectionState::Failed(SensorError::BluetoothUnavailable)
        );
        assert!(state.to_string().contains("Bluetooth"));
    }
}
