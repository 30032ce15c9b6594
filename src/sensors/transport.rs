//! Transport seam between the core and the BLE layer.
//!
//! The core never talks to btleplug directly. Inbound, the transport layer
//! produces [`TransportEvent`]s which the embedding application marshals onto
//! its single consumer context and feeds to
//! [`crate::sensors::pipeline::Pipeline::handle_transport_event`]. Outbound,
//! the pipeline issues fire-and-forget calls on the [`Transport`] trait;
//! outcomes come back as events, never as return values, so the core stays
//! synchronous and lock-free.

use uuid::Uuid;

/// An event produced by the transport layer.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The BLE adapter is powered and authorized
    AdapterAvailable,
    /// The BLE adapter became unavailable (powered off, unauthorized)
    AdapterUnavailable,
    /// A peripheral was discovered during scanning
    DeviceDiscovered {
        device_id: String,
        name: String,
        rssi: Option<i16>,
    },
    /// A connect request completed
    Connected { device_id: String },
    /// A connect request failed
    ConnectFailed { device_id: String, reason: String },
    /// The peripheral disconnected (expected or not)
    Disconnected {
        device_id: String,
        reason: Option<String>,
    },
    /// Raw bytes arrived on a notify characteristic
    CharacteristicValue { characteristic: Uuid, data: Vec<u8> },
}

/// Outbound command surface of the transport layer.
///
/// Implementations must not block: queue the work and report the outcome as a
/// [`TransportEvent`]. `Send` because the pipeline that owns the handle lives
/// on whatever thread the embedding application picks as its consumer.
pub trait Transport: Send {
    fn start_scan(&mut self);
    fn stop_scan(&mut self);
    fn connect(&mut self, device_id: &str);
    fn disconnect(&mut self, device_id: &str);
    fn set_notify(&mut self, characteristic: Uuid, enabled: bool);
}
