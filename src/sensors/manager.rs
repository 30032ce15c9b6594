//! BLE transport adapter built on btleplug.
//!
//! T070: Implement BleTransport task with btleplug adapter initialization
//! T071: Forward notification streams as transport events
//!
//! The adapter runs as a single tokio task owning all btleplug state. The
//! [`BleTransportHandle`] implements [`Transport`] by enqueuing commands on an
//! unbounded channel, so pipeline calls never block; every outcome travels
//! back as a [`TransportEvent`] on the crossbeam channel the embedding
//! application drains into the pipeline.

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use crossbeam::channel::Sender;
use futures::stream::StreamExt;
use std::collections::HashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::sensors::packet::TELEMETRY_SERVICE_UUID;
use crate::sensors::transport::{Transport, TransportEvent};

/// Command queued from the pipeline to the BLE task.
#[derive(Debug)]
enum TransportCommand {
    StartScan,
    StopScan,
    Connect(String),
    Disconnect(String),
    SetNotify(Uuid, bool),
}

/// Cheap cloneable handle; the pipeline's side of the transport.
#[derive(Clone)]
pub struct BleTransportHandle {
    cmd_tx: mpsc::UnboundedSender<TransportCommand>,
}

impl Transport for BleTransportHandle {
    fn start_scan(&mut self) {
        let _ = self.cmd_tx.send(TransportCommand::StartScan);
    }

    fn stop_scan(&mut self) {
        let _ = self.cmd_tx.send(TransportCommand::StopScan);
    }

    fn connect(&mut self, device_id: &str) {
        let _ = self
            .cmd_tx
            .send(TransportCommand::Connect(device_id.to_string()));
    }

    fn disconnect(&mut self, device_id: &str) {
        let _ = self
            .cmd_tx
            .send(TransportCommand::Disconnect(device_id.to_string()));
    }

    fn set_notify(&mut self, characteristic: Uuid, enabled: bool) {
        let _ = self
            .cmd_tx
            .send(TransportCommand::SetNotify(characteristic, enabled));
    }
}

/// The btleplug-backed transport task.
pub struct BleTransport;

impl BleTransport {
    /// Spawn the transport task on the current tokio runtime.
    pub fn spawn(event_tx: Sender<TransportEvent>) -> BleTransportHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            run(cmd_rx, event_tx).await;
        });

        BleTransportHandle { cmd_tx }
    }
}

async fn run(
    mut cmd_rx: mpsc::UnboundedReceiver<TransportCommand>,
    event_tx: Sender<TransportEvent>,
) {
    let adapter = match initialize_adapter().await {
        Ok(adapter) => {
            let _ = event_tx.send(TransportEvent::AdapterAvailable);
            adapter
        }
        Err(err) => {
            tracing::error!("BLE adapter unavailable: {}", err);
            let _ = event_tx.send(TransportEvent::AdapterUnavailable);
            return;
        }
    };

    // Discovery events flow independently of the command loop.
    {
        let adapter = adapter.clone();
        let event_tx = event_tx.clone();
        tokio::spawn(async move {
            process_central_events(adapter, event_tx).await;
        });
    }

    let mut connected: HashMap<String, Peripheral> = HashMap::new();

    while let Some(command) = cmd_rx.recv().await {
        match command {
            TransportCommand::StartScan => {
                let filter = ScanFilter {
                    services: vec![TELEMETRY_SERVICE_UUID],
                };
                if let Err(err) = adapter.start_scan(filter).await {
                    tracing::warn!("failed to start scan: {}", err);
                    let _ = event_tx.send(TransportEvent::AdapterUnavailable);
                }
            }
            TransportCommand::StopScan => {
                if let Err(err) = adapter.stop_scan().await {
                    tracing::warn!("failed to stop scan: {}", err);
                }
            }
            TransportCommand::Connect(device_id) => {
                match connect_peripheral(&adapter, &device_id).await {
                    Ok(peripheral) => {
                        spawn_notification_forwarder(
                            peripheral.clone(),
                            device_id.clone(),
                            event_tx.clone(),
                        );
                        connected.insert(device_id.clone(), peripheral);
                        let _ = event_tx.send(TransportEvent::Connected { device_id });
                    }
                    Err(reason) => {
                        let _ = event_tx.send(TransportEvent::ConnectFailed { device_id, reason });
                    }
                }
            }
            TransportCommand::Disconnect(device_id) => {
                if let Some(peripheral) = connected.remove(&device_id) {
                    if let Err(err) = peripheral.disconnect().await {
                        tracing::warn!("disconnect from {} failed: {}", device_id, err);
                    }
                } else if let Some(peripheral) = find_peripheral(&adapter, &device_id).await {
                    // A pending connect being cancelled before it completed.
                    let _ = peripheral.disconnect().await;
                }
            }
            TransportCommand::SetNotify(characteristic, enabled) => {
                for peripheral in connected.values() {
                    set_notify(peripheral, characteristic, enabled).await;
                }
            }
        }
    }
}

async fn initialize_adapter() -> Result<Adapter, btleplug::Error> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters
        .into_iter()
        .next()
        .ok_or(btleplug::Error::DeviceNotFound)
}

/// Forward discovery and adapter-state events from btleplug.
async fn process_central_events(adapter: Adapter, event_tx: Sender<TransportEvent>) {
    let mut events = match adapter.events().await {
        Ok(events) => events,
        Err(err) => {
            tracing::error!("failed to get adapter events: {}", err);
            return;
        }
    };

    while let Some(event) = events.next().await {
        if let CentralEvent::DeviceDiscovered(id) = event {
            let Some(peripheral) = find_peripheral(&adapter, &id.to_string()).await else {
                continue;
            };
            let Ok(Some(properties)) = peripheral.properties().await else {
                continue;
            };
            let Some(name) = properties.local_name else {
                // Anonymous advertisements can't match the name filter.
                continue;
            };

            let _ = event_tx.send(TransportEvent::DeviceDiscovered {
                device_id: id.to_string(),
                name,
                rssi: properties.rssi,
            });
        }
    }
}

async fn find_peripheral(adapter: &Adapter, device_id: &str) -> Option<Peripheral> {
    let peripherals = adapter.peripherals().await.ok()?;
    peripherals
        .into_iter()
        .find(|p| p.id().to_string() == device_id)
}

async fn connect_peripheral(adapter: &Adapter, device_id: &str) -> Result<Peripheral, String> {
    let peripheral = find_peripheral(adapter, device_id)
        .await
        .ok_or_else(|| format!("no peripheral with id {}", device_id))?;

    peripheral.connect().await.map_err(|e| e.to_string())?;
    peripheral
        .discover_services()
        .await
        .map_err(|e| e.to_string())?;

    Ok(peripheral)
}

async fn set_notify(peripheral: &Peripheral, characteristic: Uuid, enabled: bool) {
    let Some(target) = peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == characteristic)
    else {
        tracing::debug!("characteristic {} not present on peripheral", characteristic);
        return;
    };

    let result = if enabled {
        peripheral.subscribe(&target).await
    } else {
        peripheral.unsubscribe(&target).await
    };

    if let Err(err) = result {
        tracing::warn!(
            "set_notify({}, {}) failed: {}",
            characteristic,
            enabled,
            err
        );
    } else {
        tracing::debug!("set_notify({}, {})", characteristic, enabled);
    }
}

/// Forward the peripheral's notification stream; its end means the link dropped.
fn spawn_notification_forwarder(
    peripheral: Peripheral,
    device_id: String,
    event_tx: Sender<TransportEvent>,
) {
    tokio::spawn(async move {
        let mut notifications = match peripheral.notifications().await {
            Ok(stream) => stream,
            Err(err) => {
                tracing::error!("failed to get notification stream: {}", err);
                let _ = event_tx.send(TransportEvent::Disconnected {
                    device_id,
                    reason: Some(err.to_string()),
                });
                return;
            }
        };

        while let Some(notification) = notifications.next().await {
            let _ = event_tx.send(TransportEvent::CharacteristicValue {
                characteristic: notification.uuid,
                data: notification.value,
            });
        }

        // Stream ended: the peripheral is gone.
        let _ = event_tx.send(TransportEvent::Disconnected {
            device_id,
            reason: None,
        });
    });
}
