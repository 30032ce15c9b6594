//! Binary packet decoding for NeuroBand characteristic payloads.
//!
//! T030: Implement EEG packet parsing with 24-bit sign extension
//! T031: Implement PPG packet parsing
//! T032: Implement accelerometer packet parsing
//! T033: Implement battery level parsing
//!
//! Every decoder here is a pure function of `(bytes, SensorConfiguration)`:
//! no hidden state, no I/O, bounded time over bounded input. Packets for the
//! timestamped sensors (EEG/PPG/accelerometer) start with a 4-byte
//! little-endian counter from which the base timestamp is reconstructed;
//! battery packets are a single level byte stamped with receipt time by the
//! caller.

use uuid::Uuid;

use crate::config::SensorConfiguration;
use crate::sensors::types::{ParseError, SensorReading, SensorType};

/// NeuroBand telemetry service UUID
pub const TELEMETRY_SERVICE_UUID: Uuid = Uuid::from_u128(0x7a5c_0001_b5a3_f393_e0a9_e50e24dcca9e);

/// EEG stream characteristic UUID
pub const EEG_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x7a5c_0002_b5a3_f393_e0a9_e50e24dcca9e);

/// PPG stream characteristic UUID
pub const PPG_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x7a5c_0003_b5a3_f393_e0a9_e50e24dcca9e);

/// Accelerometer stream characteristic UUID
pub const ACCELEROMETER_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x7a5c_0004_b5a3_f393_e0a9_e50e24dcca9e);

/// Battery level characteristic UUID
pub const BATTERY_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x7a5c_0005_b5a3_f393_e0a9_e50e24dcca9e);

/// Map a characteristic UUID to the sensor that owns it.
pub fn sensor_for_characteristic(uuid: Uuid) -> Option<SensorType> {
    if uuid == EEG_CHARACTERISTIC_UUID {
        Some(SensorType::Eeg)
    } else if uuid == PPG_CHARACTERISTIC_UUID {
        Some(SensorType::Ppg)
    } else if uuid == ACCELEROMETER_CHARACTERISTIC_UUID {
        Some(SensorType::Accelerometer)
    } else if uuid == BATTERY_CHARACTERISTIC_UUID {
        Some(SensorType::Battery)
    } else {
        None
    }
}

/// The notify characteristic carrying a sensor's stream.
pub fn characteristic_for_sensor(sensor: SensorType) -> Uuid {
    match sensor {
        SensorType::Eeg => EEG_CHARACTERISTIC_UUID,
        SensorType::Ppg => PPG_CHARACTERISTIC_UUID,
        SensorType::Accelerometer => ACCELEROMETER_CHARACTERISTIC_UUID,
        SensorType::Battery => BATTERY_CHARACTERISTIC_UUID,
    }
}

/// Parse one characteristic payload into ordered readings.
///
/// `received_at` is the wall-clock receipt time in seconds; it is only used
/// for battery packets, which the device does not timestamp.
///
/// A payload carrying fewer whole samples than the nominal packet size
/// implies is decoded up to the last whole sample; a trailing partial sample
/// is silently ignored. A payload without room for the header and one whole
/// sample is rejected with [`ParseError::PacketTooShort`].
pub fn parse(
    sensor: SensorType,
    data: &[u8],
    config: &SensorConfiguration,
    received_at: f64,
) -> Result<Vec<SensorReading>, ParseError> {
    match sensor {
        SensorType::Eeg => parse_eeg(data, config),
        SensorType::Ppg => parse_ppg(data, config),
        SensorType::Accelerometer => parse_accelerometer(data, config),
        SensorType::Battery => parse_battery(data, received_at),
    }
}

/// Reconstruct the base timestamp from the 4-byte counter header.
fn base_timestamp(data: &[u8], config: &SensorConfiguration) -> f64 {
    let counter = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    counter as f64 / config.timestamp_divisor / config.ms_per_second
}

/// Ensure the payload holds the header plus at least one whole sample.
fn check_len(data: &[u8], config: &SensorConfiguration, sample_len: usize) -> Result<(), ParseError> {
    let expected = config.packet_header_len + sample_len;
    if data.len() < expected {
        return Err(ParseError::PacketTooShort {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Read a 24-bit big-endian two's-complement integer.
fn read_i24_be(bytes: &[u8]) -> i32 {
    let mut value = ((bytes[0] as i32) << 16) | ((bytes[1] as i32) << 8) | (bytes[2] as i32);
    if value & 0x80_0000 != 0 {
        value -= 1 << 24;
    }
    value
}

/// Read a 24-bit big-endian unsigned integer.
fn read_u24_be(bytes: &[u8]) -> i32 {
    ((bytes[0] as i32) << 16) | ((bytes[1] as i32) << 8) | (bytes[2] as i32)
}

fn parse_eeg(data: &[u8], config: &SensorConfiguration) -> Result<Vec<SensorReading>, ParseError> {
    check_len(data, config, config.eeg_sample_len)?;

    let base = base_timestamp(data, config);
    let body = &data[config.packet_header_len..];
    let sample_count = body.len() / config.eeg_sample_len;

    let to_microvolts = |raw: i32| {
        raw as f64 * config.voltage_reference / config.amplifier_gain / config.adc_resolution
            * config.microvolt_multiplier
    };

    let mut readings = Vec::with_capacity(sample_count);
    for i in 0..sample_count {
        let sample = &body[i * config.eeg_sample_len..(i + 1) * config.eeg_sample_len];

        let lead_off = sample[0] != 0;
        let channel1_raw = read_i24_be(&sample[1..4]);
        let channel2_raw = read_i24_be(&sample[4..7]);
        let channel1_uv = to_microvolts(channel1_raw);
        let channel2_uv = to_microvolts(channel2_raw);

        for &uv in &[channel1_uv, channel2_uv] {
            if uv.abs() > config.eeg_max_microvolts {
                return Err(ParseError::InvalidSampleBounds {
                    sensor: SensorType::Eeg,
                    value: uv,
                });
            }
        }

        readings.push(SensorReading::Eeg {
            channel1_uv,
            channel2_uv,
            channel1_raw,
            channel2_raw,
            lead_off,
            timestamp: base + i as f64 / config.eeg_sample_rate_hz,
        });
    }

    Ok(readings)
}

fn parse_ppg(data: &[u8], config: &SensorConfiguration) -> Result<Vec<SensorReading>, ParseError> {
    check_len(data, config, config.ppg_sample_len)?;

    let base = base_timestamp(data, config);
    let body = &data[config.packet_header_len..];
    let sample_count = body.len() / config.ppg_sample_len;

    let mut readings = Vec::with_capacity(sample_count);
    for i in 0..sample_count {
        let sample = &body[i * config.ppg_sample_len..(i + 1) * config.ppg_sample_len];

        let red = read_u24_be(&sample[0..3]);
        let infrared = read_u24_be(&sample[3..6]);

        for &value in &[red, infrared] {
            if value > config.ppg_max_value {
                return Err(ParseError::InvalidSampleBounds {
                    sensor: SensorType::Ppg,
                    value: value as f64,
                });
            }
        }

        readings.push(SensorReading::Ppg {
            red,
            infrared,
            timestamp: base + i as f64 / config.ppg_sample_rate_hz,
        });
    }

    Ok(readings)
}

fn parse_accelerometer(
    data: &[u8],
    config: &SensorConfiguration,
) -> Result<Vec<SensorReading>, ParseError> {
    check_len(data, config, config.accelerometer_sample_len)?;

    let base = base_timestamp(data, config);
    let body = &data[config.packet_header_len..];
    let sample_count = body.len() / config.accelerometer_sample_len;

    let mut readings = Vec::with_capacity(sample_count);
    for i in 0..sample_count {
        let sample =
            &body[i * config.accelerometer_sample_len..(i + 1) * config.accelerometer_sample_len];

        // Firmware packs one unsigned byte per axis at even offsets of the
        // 6-byte slot. Pending confirmation from the vendor datasheet whether
        // the odd offsets carry high bytes; do not widen without it.
        readings.push(SensorReading::Accelerometer {
            x: sample[0] as i16,
            y: sample[2] as i16,
            z: sample[4] as i16,
            timestamp: base + i as f64 / config.accelerometer_sample_rate_hz,
        });
    }

    Ok(readings)
}

fn parse_battery(data: &[u8], received_at: f64) -> Result<Vec<SensorReading>, ParseError> {
    if data.is_empty() {
        return Err(ParseError::PacketTooShort {
            expected: 1,
            actual: 0,
        });
    }

    Ok(vec![SensorReading::Battery {
        level_percent: data[0].min(100),
        timestamp: received_at,
    }])
}
