//! Application configuration and hardware constants.
//!
//! T020: Define SensorConfiguration with per-revision hardware constants
//! T021: Implement AppConfig loading from TOML

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Hardware constants and decode parameters for one headband revision.
///
/// Every numeric decode formula in [`crate::sensors::packet`] is parameterized
/// by this struct, so a new hardware revision is a config change, not a code
/// change. The `Default` impl matches the shipped NeuroBand rev B board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfiguration {
    /// EEG sample rate in Hz
    pub eeg_sample_rate_hz: f64,
    /// PPG sample rate in Hz
    pub ppg_sample_rate_hz: f64,
    /// Accelerometer sample rate in Hz
    pub accelerometer_sample_rate_hz: f64,
    /// Advertised-name prefix used to filter scan results
    pub device_name_prefix: String,
    /// Auto-reconnect after an unexpected disconnect
    pub auto_reconnect: bool,
    /// ADC voltage reference in volts
    pub voltage_reference: f64,
    /// Analog front-end amplifier gain
    pub amplifier_gain: f64,
    /// ADC full-scale count (2^23 - 1 for the 24-bit front-end)
    pub adc_resolution: f64,
    /// Volts-to-microvolts multiplier
    pub microvolt_multiplier: f64,
    /// Counter header length in bytes, shared by all timestamped packets
    pub packet_header_len: usize,
    /// EEG sample length in bytes (lead-off flag + two 24-bit channels)
    pub eeg_sample_len: usize,
    /// PPG sample length in bytes (two 24-bit channels)
    pub ppg_sample_len: usize,
    /// Accelerometer sample slot length in bytes
    pub accelerometer_sample_len: usize,
    /// Ticks per millisecond of the on-device timestamp counter
    pub timestamp_divisor: f64,
    /// Milliseconds per second, applied after the divisor
    pub ms_per_second: f64,
    /// Largest EEG magnitude in microvolts accepted as a valid sample
    pub eeg_max_microvolts: f64,
    /// Largest PPG ADC count accepted as a valid sample (18-bit full scale)
    pub ppg_max_value: i32,
}

impl Default for SensorConfiguration {
    fn default() -> Self {
        Self {
            eeg_sample_rate_hz: 250.0,
            ppg_sample_rate_hz: 50.0,
            accelerometer_sample_rate_hz: 50.0,
            device_name_prefix: "NeuroBand".to_string(),
            auto_reconnect: true,
            voltage_reference: 4.033,
            amplifier_gain: 12.0,
            adc_resolution: 8_388_607.0,
            microvolt_multiplier: 1e6,
            packet_header_len: 4,
            eeg_sample_len: 7,
            ppg_sample_len: 6,
            accelerometer_sample_len: 6,
            timestamp_divisor: 32.768,
            ms_per_second: 1000.0,
            eeg_max_microvolts: 400_000.0,
            ppg_max_value: 262_143,
        }
    }
}

/// Recording-related settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSettings {
    /// Directory for session CSV files; empty means the platform data dir
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self { output_dir: None }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Data directory path
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Headband hardware constants
    pub sensors: SensorConfiguration,
    /// Recording settings
    pub recording: RecordingSettings,
}

/// Get the application data directory.
pub fn get_data_dir() -> PathBuf {
    directories::ProjectDirs::from("io", "neuroband", "NeuroBand")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the configuration file path.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.toml")
}

/// Load application configuration from file.
///
/// A missing file is not an error; defaults are returned so first launch
/// works without any setup.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let path = get_config_path();

    if !path.exists() {
        let config = AppConfig {
            data_dir: get_data_dir(),
            ..Default::default()
        };
        return Ok(config);
    }

    let content =
        std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    let mut config: AppConfig =
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.data_dir = get_data_dir();

    Ok(config)
}

/// Save application configuration to file.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    let path = get_config_path();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
    }

    let content =
        toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

    Ok(())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
