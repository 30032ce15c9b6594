//! Monitoring pipeline: payload ingestion, caching, batching, recording fan-out.
//!
//! T060: Implement Pipeline orchestration over parser/batcher/state machine
//! T061: Implement selection gating with the battery exception
//! T063: Implement batch fan-out through the event channel
//!
//! The pipeline owns all mutable core state and is strictly single-threaded:
//! the embedding application must funnel every [`TransportEvent`] through
//! [`Pipeline::handle_transport_event`] from one serialized context (thread,
//! actor, or event-loop tick). Nothing here blocks, suspends, or locks.
//! External consumers get owned copies over the event channel, never a
//! reference into live state.

use crossbeam::channel::{Receiver, Sender};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::config::SensorConfiguration;
use crate::recording::ReadingSink;
use crate::sensors::batch::{BatchWindow, CollectionMode};
use crate::sensors::link::{ConnectionStateMachine, LinkCommand};
use crate::sensors::motion::{GravityFilter, MotionEstimate, Vector3};
use crate::sensors::packet::{characteristic_for_sensor, sensor_for_characteristic, parse};
use crate::sensors::transport::{Transport, TransportEvent};
use crate::sensors::types::{
    ConnectionState, DiscoveredDevice, MonitorEvent, SensorError, SensorReading, SensorType,
};

/// Orchestrates the headband data path from raw payloads to consumers.
pub struct Pipeline {
    config: SensorConfiguration,
    link: ConnectionStateMachine,
    transport: Box<dyn Transport>,
    /// Sensors the user is monitoring; battery bypasses this gate
    selected: HashSet<SensorType>,
    monitoring: bool,
    /// Batch configuration per sensor; absence means latest-value only
    collection: HashMap<SensorType, CollectionMode>,
    windows: HashMap<SensorType, BatchWindow<SensorReading>>,
    latest: HashMap<SensorType, SensorReading>,
    discovered: HashMap<String, DiscoveredDevice>,
    gravity: GravityFilter,
    latest_motion: Option<MotionEstimate>,
    recorder: Option<Box<dyn ReadingSink>>,
    is_recording: bool,
    event_tx: Option<Sender<MonitorEvent>>,
}

impl Pipeline {
    /// Create a pipeline over the given transport.
    pub fn new(config: SensorConfiguration, transport: Box<dyn Transport>) -> Self {
        let auto_reconnect = config.auto_reconnect;
        Self {
            config,
            link: ConnectionStateMachine::new(auto_reconnect),
            transport,
            selected: HashSet::new(),
            monitoring: false,
            collection: HashMap::new(),
            windows: HashMap::new(),
            latest: HashMap::new(),
            discovered: HashMap::new(),
            gravity: GravityFilter::default(),
            latest_motion: None,
            recorder: None,
            is_recording: false,
            event_tx: None,
        }
    }

    /// Get a receiver for pipeline events.
    pub fn event_receiver(&mut self) -> Receiver<MonitorEvent> {
        let (tx, rx) = crossbeam::channel::unbounded();
        self.event_tx = Some(tx);
        rx
    }

    fn send_event(&self, event: MonitorEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    // ── Snapshots ────────────────────────────────────────────────────────

    /// Current link state.
    pub fn connection_state(&self) -> ConnectionState {
        self.link.state().clone()
    }

    /// Latest reading for a sensor, if any arrived since the last teardown.
    pub fn latest_reading(&self, sensor: SensorType) -> Option<SensorReading> {
        self.latest.get(&sensor).cloned()
    }

    /// Devices seen during the current scan.
    pub fn discovered_devices(&self) -> Vec<DiscoveredDevice> {
        self.discovered.values().cloned().collect()
    }

    /// Latest gravity/motion split of the accelerometer stream.
    pub fn motion(&self) -> Option<MotionEstimate> {
        self.latest_motion
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring
    }

    // ── Link control ─────────────────────────────────────────────────────

    /// Start scanning for headbands.
    pub fn start_scan(&mut self) {
        self.discovered.clear();
        self.drive_link(ConnectionStateMachine::request_scan);
    }

    /// Stop scanning without connecting.
    pub fn stop_scan(&mut self) {
        self.drive_link(ConnectionStateMachine::request_stop_scan);
    }

    /// Connect to a previously discovered headband.
    pub fn connect(&mut self, device_id: &str) {
        if !self.discovered.contains_key(device_id) {
            self.send_event(MonitorEvent::Error(SensorError::DeviceNotFound(
                device_id.to_string(),
            )));
            return;
        }
        let device_id = device_id.to_string();
        self.drive_link(move |link| link.request_connect(&device_id));
    }

    /// Disconnect at the user's request.
    pub fn disconnect(&mut self) {
        self.drive_link(ConnectionStateMachine::request_disconnect);
    }

    /// Toggle auto-reconnect.
    pub fn enable_auto_reconnect(&mut self, enabled: bool) {
        self.drive_link(move |link| link.set_auto_reconnect(enabled));
    }

    /// Run a state-machine interaction: relay its commands to the transport
    /// and publish the state change, arming notifications on a fresh
    /// connection.
    fn drive_link<F>(&mut self, interact: F)
    where
        F: FnOnce(&mut ConnectionStateMachine) -> Vec<LinkCommand>,
    {
        let previous = self.link.state().clone();
        let commands = interact(&mut self.link);

        for command in commands {
            match command {
                LinkCommand::StartScan => self.transport.start_scan(),
                LinkCommand::StopScan => self.transport.stop_scan(),
                LinkCommand::Connect(id) => self.transport.connect(&id),
                LinkCommand::Disconnect(id) => self.transport.disconnect(&id),
            }
        }

        let current = self.link.state().clone();
        if current != previous {
            if matches!(current, ConnectionState::Connected(_)) {
                self.arm_notifications();
            }
            self.send_event(MonitorEvent::ConnectionChanged(current));
        }
    }

    /// Subscribe the notify characteristics for selected sensors. Battery is
    /// always armed regardless of selection.
    fn arm_notifications(&mut self) {
        for sensor in SensorType::ALL {
            if sensor == SensorType::Battery || self.selected.contains(&sensor) {
                self.transport
                    .set_notify(characteristic_for_sensor(sensor), true);
            }
        }
    }

    // ── Monitoring configuration ─────────────────────────────────────────

    /// Begin monitoring the currently selected sensors.
    pub fn start_monitoring(&mut self) {
        self.monitoring = true;
    }

    /// Stop monitoring: clears latest values (battery kept), drops every
    /// batch window, and tears down all collection configs.
    pub fn stop_monitoring(&mut self) {
        self.monitoring = false;
        self.latest.retain(|sensor, _| *sensor == SensorType::Battery);
        self.windows.clear();
        self.collection.clear();
        self.gravity.reset();
        self.latest_motion = None;

        if let ConnectionState::Connected(_) = self.link.state() {
            for sensor in SensorType::ALL {
                if sensor != SensorType::Battery {
                    self.transport
                        .set_notify(characteristic_for_sensor(sensor), false);
                }
            }
        }
    }

    /// Replace the selected-sensor set.
    ///
    /// Deselected sensors lose their cached value and batch window
    /// immediately so no stale reading outlives the selection change.
    pub fn select_sensors(&mut self, sensors: HashSet<SensorType>) {
        let connected = matches!(self.link.state(), ConnectionState::Connected(_));

        for sensor in SensorType::ALL {
            if sensor == SensorType::Battery {
                continue;
            }
            let was = self.selected.contains(&sensor);
            let now = sensors.contains(&sensor);

            if was && !now {
                self.latest.remove(&sensor);
                self.windows.remove(&sensor);
                self.collection.remove(&sensor);
                if sensor == SensorType::Accelerometer {
                    self.gravity.reset();
                    self.latest_motion = None;
                }
                if connected {
                    self.transport
                        .set_notify(characteristic_for_sensor(sensor), false);
                }
            } else if !was && now && connected {
                self.transport
                    .set_notify(characteristic_for_sensor(sensor), true);
            }
        }

        self.selected = sensors;
    }

    /// Set how a sensor's readings are batched.
    ///
    /// The sensor's window is rebuilt from scratch so no partially-filled
    /// buffer crosses the configuration boundary.
    pub fn set_collection(&mut self, sensor: SensorType, mode: CollectionMode) {
        match mode {
            CollectionMode::Disabled => {
                self.collection.remove(&sensor);
                self.windows.remove(&sensor);
            }
            _ => {
                self.collection.insert(sensor, mode);
                self.windows.insert(sensor, BatchWindow::new(mode));
            }
        }
    }

    // ── Recording collaborator ───────────────────────────────────────────

    /// Attach the reading sink that receives recorded samples.
    pub fn attach_recorder(&mut self, recorder: Box<dyn ReadingSink>) {
        self.recorder = Some(recorder);
    }

    /// Detach and return the current reading sink.
    pub fn detach_recorder(&mut self) -> Option<Box<dyn ReadingSink>> {
        self.recorder.take()
    }

    /// Acknowledge that the recorder started a session.
    pub fn recording_started(&mut self, at: DateTime<Utc>) {
        tracing::info!("recording started at {}", at);
        self.is_recording = true;
        self.send_event(MonitorEvent::RecordingChanged(true));
    }

    /// Acknowledge that the recorder finished a session.
    pub fn recording_stopped(&mut self, at: DateTime<Utc>, files: Vec<PathBuf>) {
        tracing::info!("recording stopped at {} ({} files)", at, files.len());
        self.is_recording = false;
        self.send_event(MonitorEvent::RecordingChanged(false));
    }

    /// Acknowledge that the recorder failed; connection and batching continue.
    pub fn recording_failed(&mut self, error: SensorError) {
        tracing::warn!("recording failed: {}", error);
        self.is_recording = false;
        self.send_event(MonitorEvent::Error(error));
        self.send_event(MonitorEvent::RecordingChanged(false));
    }

    // ── Ingestion ────────────────────────────────────────────────────────

    /// Single ingestion point for transport events.
    ///
    /// Must be called from the embedding application's one serialized
    /// context; this is the only synchronization boundary in the system.
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::AdapterAvailable => {
                self.drive_link(|link| link.on_transport_availability(true));
            }
            TransportEvent::AdapterUnavailable => {
                self.drive_link(|link| link.on_transport_availability(false));
            }
            TransportEvent::DeviceDiscovered {
                device_id,
                name,
                rssi,
            } => {
                self.handle_discovery(device_id, name, rssi);
            }
            TransportEvent::Connected { device_id } => {
                self.drive_link(move |link| link.on_connected(&device_id));
            }
            TransportEvent::ConnectFailed { device_id, reason } => {
                self.drive_link(move |link| link.on_connect_failed(&device_id, &reason));
            }
            TransportEvent::Disconnected { device_id, reason } => {
                if let Some(reason) = reason {
                    tracing::debug!("disconnect from {}: {}", device_id, reason);
                }
                self.drive_link(move |link| link.on_disconnected(&device_id));
            }
            TransportEvent::CharacteristicValue {
                characteristic,
                data,
            } => {
                self.handle_payload(characteristic, &data);
            }
        }
    }

    fn handle_discovery(&mut self, device_id: String, name: String, rssi: Option<i16>) {
        if !name.starts_with(&self.config.device_name_prefix) {
            return;
        }

        let device = DiscoveredDevice {
            device_id: device_id.clone(),
            name,
            rssi,
            last_seen: Instant::now(),
        };
        self.discovered.insert(device_id, device.clone());
        self.send_event(MonitorEvent::DeviceDiscovered(device));
    }

    fn handle_payload(&mut self, characteristic: uuid::Uuid, data: &[u8]) {
        let Some(sensor) = sensor_for_characteristic(characteristic) else {
            tracing::debug!("payload on unknown characteristic {}", characteristic);
            return;
        };

        // Battery is always processed; everything else requires monitoring
        // to be on and the sensor to be selected.
        if sensor != SensorType::Battery && (!self.monitoring || !self.selected.contains(&sensor)) {
            return;
        }

        let received_at = Utc::now().timestamp_millis() as f64 / 1000.0;
        let readings = match parse(sensor, data, &self.config, received_at) {
            Ok(readings) => readings,
            Err(err) => {
                // Local, non-fatal: drop this payload, keep the stream alive.
                tracing::warn!("dropping {} payload: {}", sensor, err);
                return;
            }
        };

        for reading in readings {
            self.process_reading(reading);
        }
    }

    fn process_reading(&mut self, reading: SensorReading) {
        let sensor = reading.sensor_type();

        if let SensorReading::Accelerometer { x, y, z, .. } = reading {
            self.latest_motion = Some(
                self.gravity
                    .update(Vector3::new(x as f64, y as f64, z as f64)),
            );
        }

        self.latest.insert(sensor, reading.clone());

        if self.is_recording
            && (sensor == SensorType::Battery || self.collection.contains_key(&sensor))
        {
            let failure = self
                .recorder
                .as_mut()
                .and_then(|recorder| recorder.record(&reading).err());
            if let Some(err) = failure {
                self.recording_failed(SensorError::RecordingFailed(err.to_string()));
            }
        }

        if let Some(window) = self.windows.get_mut(&sensor) {
            if let Some(batch) = window.push(reading.clone()) {
                self.send_event(MonitorEvent::BatchReady {
                    sensor,
                    readings: batch,
                });
            }
        }

        self.send_event(MonitorEvent::ReadingUpdated(reading));
    }
}
