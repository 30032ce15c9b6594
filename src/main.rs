//! NeuroBand - BLE Biosignal Headband Client
//!
//! Headless entry point: scans for the first headband matching the name
//! filter, connects, and prints one-second batches for every sensor until
//! interrupted.

use std::collections::HashSet;
use std::time::Duration;

use crossbeam::channel::RecvTimeoutError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use neuroband::sensors::batch::CollectionMode;
use neuroband::sensors::manager::BleTransport;
use neuroband::sensors::pipeline::Pipeline;
use neuroband::sensors::types::{ConnectionState, MonitorEvent, SensorType};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting NeuroBand client v{}", env!("CARGO_PKG_VERSION"));

    let app_config = neuroband::config::load_config()?;

    let (transport_tx, transport_rx) = crossbeam::channel::unbounded();
    let transport = BleTransport::spawn(transport_tx);

    let mut pipeline = Pipeline::new(app_config.sensors.clone(), Box::new(transport));
    let monitor_rx = pipeline.event_receiver();

    let selected: HashSet<SensorType> = [
        SensorType::Eeg,
        SensorType::Ppg,
        SensorType::Accelerometer,
    ]
    .into_iter()
    .collect();
    pipeline.select_sensors(selected.clone());
    for sensor in selected {
        pipeline.set_collection(sensor, CollectionMode::ByTimeInterval(1.0));
    }
    pipeline.start_monitoring();

    // Single consumer context: every transport event is marshaled onto this
    // blocking task before it touches pipeline state.
    let pump = tokio::task::spawn_blocking(move || loop {
        match transport_rx.recv_timeout(Duration::from_millis(500)) {
            Ok(event) => pipeline.handle_transport_event(event),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if matches!(pipeline.connection_state(), ConnectionState::Disconnected) {
            pipeline.start_scan();
        }

        for event in monitor_rx.try_iter() {
            match event {
                MonitorEvent::DeviceDiscovered(device) => {
                    tracing::info!(
                        "found {} ({}) rssi {:?}",
                        device.name,
                        device.device_id,
                        device.rssi
                    );
                    pipeline.connect(&device.device_id);
                }
                MonitorEvent::ConnectionChanged(state) => {
                    tracing::info!("connection: {}", state);
                }
                MonitorEvent::BatchReady { sensor, readings } => {
                    println!("{}: batch of {} readings", sensor, readings.len());
                }
                MonitorEvent::ReadingUpdated(reading) => {
                    if let neuroband::SensorReading::Battery { level_percent, .. } = reading {
                        println!("Battery: {}%", level_percent);
                    }
                }
                MonitorEvent::RecordingChanged(active) => {
                    tracing::info!("recording: {}", active);
                }
                MonitorEvent::Error(err) => {
                    tracing::warn!("{}", err);
                }
            }
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
        }
        result = pump => {
            result?;
        }
    }

    Ok(())
}
