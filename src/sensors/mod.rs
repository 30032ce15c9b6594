//! Sensor module for BLE headband communication.

pub mod batch;
pub mod link;
pub mod manager;
pub mod motion;
pub mod packet;
pub mod pipeline;
pub mod transport;
pub mod types;

pub use batch::{BatchWindow, CollectionMode, Timestamped};
pub use link::{ConnectionStateMachine, LinkCommand};
pub use manager::{BleTransport, BleTransportHandle};
pub use motion::{GravityFilter, MotionEstimate, Vector3};
pub use pipeline::Pipeline;
pub use transport::{Transport, TransportEvent};
pub use types::{
    ConnectionState, DiscoveredDevice, MonitorEvent, ParseError, SensorError, SensorReading,
    SensorType,
};
