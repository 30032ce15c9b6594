//! Connection lifecycle state machine for the headband link.
//!
//! T050: Implement ConnectionStateMachine transition table
//! T051: Implement auto-reconnect to the last known device
//! T052: Track user-initiated disconnects with an explicit latch
//!
//! The machine is pure and synchronous: user intents and transport events go
//! in, a new [`ConnectionState`] plus a list of [`LinkCommand`]s comes out.
//! The pipeline relays commands to the transport; nothing here touches BLE
//! directly, so every transition is unit-testable without a scheduler.
//!
//! Undefined (state, event) pairs are deliberate no-ops: the transport can
//! deliver stale events around a transition and the machine must shrug them
//! off rather than panic.

use crate::sensors::types::{ConnectionState, SensorError};

/// Outbound request for the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCommand {
    StartScan,
    StopScan,
    Connect(String),
    Disconnect(String),
}

/// Owns the current link state and decides when to (re)issue connect requests.
#[derive(Debug)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
    /// Whether the BLE adapter is powered and authorized
    transport_ready: bool,
    auto_reconnect: bool,
    /// Last device a connection was established to; reconnect target
    last_device: Option<String>,
    /// Set before issuing a manual disconnect, cleared when the disconnect
    /// event arrives. A disconnect without the latch is "unexpected"; the
    /// transport event alone cannot make that distinction.
    manual_disconnect_pending: bool,
}

impl ConnectionStateMachine {
    pub fn new(auto_reconnect: bool) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            transport_ready: false,
            auto_reconnect,
            last_device: None,
            manual_disconnect_pending: false,
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect
    }

    /// Device identifier of the last successful connection.
    pub fn last_device(&self) -> Option<&str> {
        self.last_device.as_deref()
    }

    fn transition(&mut self, next: ConnectionState) {
        if next != self.state {
            tracing::info!("link: {} -> {}", self.state, next);
            self.state = next;
        }
    }

    // ── User intents ─────────────────────────────────────────────────────

    /// Start scanning for headbands.
    ///
    /// Also the recovery path out of a `Failed` state: no state is terminal.
    pub fn request_scan(&mut self) -> Vec<LinkCommand> {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Failed(_) => {
                if self.transport_ready {
                    self.transition(ConnectionState::Scanning);
                    vec![LinkCommand::StartScan]
                } else {
                    self.transition(ConnectionState::Failed(SensorError::BluetoothUnavailable));
                    vec![]
                }
            }
            _ => vec![],
        }
    }

    /// Stop an active scan without connecting.
    pub fn request_stop_scan(&mut self) -> Vec<LinkCommand> {
        match self.state {
            ConnectionState::Scanning => {
                self.transition(ConnectionState::Disconnected);
                vec![LinkCommand::StopScan]
            }
            _ => vec![],
        }
    }

    /// Connect to a discovered headband.
    pub fn request_connect(&mut self, device_id: &str) -> Vec<LinkCommand> {
        match self.state {
            ConnectionState::Scanning => {
                self.transition(ConnectionState::Connecting(device_id.to_string()));
                vec![
                    LinkCommand::StopScan,
                    LinkCommand::Connect(device_id.to_string()),
                ]
            }
            _ => vec![],
        }
    }

    /// Disconnect at the user's request.
    pub fn request_disconnect(&mut self) -> Vec<LinkCommand> {
        match &self.state {
            ConnectionState::Connected(device_id) => {
                let device_id = device_id.clone();
                self.manual_disconnect_pending = true;
                self.transition(ConnectionState::Disconnected);
                vec![LinkCommand::Disconnect(device_id)]
            }
            _ => vec![],
        }
    }

    /// Toggle the auto-reconnect policy.
    ///
    /// Turning it off while reconnecting cancels the in-flight attempt;
    /// turning it on while disconnected with a remembered device immediately
    /// retries that device if the transport is ready.
    pub fn set_auto_reconnect(&mut self, enabled: bool) -> Vec<LinkCommand> {
        self.auto_reconnect = enabled;

        if !enabled {
            if let ConnectionState::Reconnecting(device_id) = &self.state {
                let device_id = device_id.clone();
                self.transition(ConnectionState::Disconnected);
                return vec![LinkCommand::Disconnect(device_id)];
            }
            return vec![];
        }

        if self.state == ConnectionState::Disconnected && self.transport_ready {
            if let Some(device_id) = self.last_device.clone() {
                self.transition(ConnectionState::Reconnecting(device_id.clone()));
                return vec![LinkCommand::Connect(device_id)];
            }
        }
        vec![]
    }

    // ── Transport events ─────────────────────────────────────────────────

    /// The adapter became available or unavailable.
    pub fn on_transport_availability(&mut self, available: bool) -> Vec<LinkCommand> {
        self.transport_ready = available;

        if !available {
            self.transition(ConnectionState::Failed(SensorError::BluetoothUnavailable));
            return vec![];
        }

        if self.state == ConnectionState::Failed(SensorError::BluetoothUnavailable) {
            self.transition(ConnectionState::Disconnected);
        }
        vec![]
    }

    /// The transport reports a connection was established.
    pub fn on_connected(&mut self, device_id: &str) -> Vec<LinkCommand> {
        match &self.state {
            ConnectionState::Connecting(pending) | ConnectionState::Reconnecting(pending)
                if pending == device_id =>
            {
                self.last_device = Some(device_id.to_string());
                self.transition(ConnectionState::Connected(device_id.to_string()));
            }
            _ => {}
        }
        vec![]
    }

    /// The transport reports a connect attempt failed.
    pub fn on_connect_failed(&mut self, device_id: &str, reason: &str) -> Vec<LinkCommand> {
        match &self.state {
            ConnectionState::Connecting(pending) | ConnectionState::Reconnecting(pending)
                if pending == device_id =>
            {
                self.transition(ConnectionState::Failed(SensorError::ConnectionFailed(
                    reason.to_string(),
                )));
            }
            _ => {}
        }
        vec![]
    }

    /// The transport reports the peripheral disconnected.
    pub fn on_disconnected(&mut self, device_id: &str) -> Vec<LinkCommand> {
        if self.manual_disconnect_pending {
            // The disconnect the user asked for; the state already moved.
            self.manual_disconnect_pending = false;
            return vec![];
        }

        match &self.state {
            ConnectionState::Connected(connected) if connected == device_id => {
                if self.auto_reconnect {
                    self.transition(ConnectionState::Reconnecting(device_id.to_string()));
                    vec![LinkCommand::Connect(device_id.to_string())]
                } else {
                    self.transition(ConnectionState::Disconnected);
                    vec![]
                }
            }
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_machine(auto_reconnect: bool) -> ConnectionStateMachine {
        let mut machine = ConnectionStateMachine::new(auto_reconnect);
        machine.on_transport_availability(true);
        machine
    }

    fn connected_machine(auto_reconnect: bool) -> ConnectionStateMachine {
        let mut machine = ready_machine(auto_reconnect);
        machine.request_scan();
        machine.request_connect("band-1");
        machine.on_connected("band-1");
        machine
    }

    #[test]
    fn test_scan_requires_transport() {
        let mut machine = ConnectionStateMachine::new(true);

        let commands = machine.request_scan();
        assert!(commands.is_empty());
        assert_eq!(
            *machine.state(),
            ConnectionState::Failed(SensorError::BluetoothUnavailable)
        );
    }

    #[test]
    fn test_scan_connect_flow() {
        let mut machine = ready_machine(true);

        assert_eq!(machine.request_scan(), vec![LinkCommand::StartScan]);
        assert_eq!(*machine.state(), ConnectionState::Scanning);

        let commands = machine.request_connect("band-1");
        assert_eq!(
            commands,
            vec![
                LinkCommand::StopScan,
                LinkCommand::Connect("band-1".to_string())
            ]
        );
        assert_eq!(
            *machine.state(),
            ConnectionState::Connecting("band-1".to_string())
        );

        machine.on_connected("band-1");
        assert_eq!(
            *machine.state(),
            ConnectionState::Connected("band-1".to_string())
        );
        assert_eq!(machine.last_device(), Some("band-1"));
    }

    #[test]
    fn test_connect_failure() {
        let mut machine = ready_machine(true);
        machine.request_scan();
        machine.request_connect("band-1");

        machine.on_connect_failed("band-1", "gatt timeout");
        assert_eq!(
            *machine.state(),
            ConnectionState::Failed(SensorError::ConnectionFailed("gatt timeout".to_string()))
        );
    }

    #[test]
    fn test_unexpected_disconnect_with_auto_reconnect() {
        let mut machine = connected_machine(true);

        let commands = machine.on_disconnected("band-1");
        assert_eq!(commands, vec![LinkCommand::Connect("band-1".to_string())]);
        assert_eq!(
            *machine.state(),
            ConnectionState::Reconnecting("band-1".to_string())
        );

        machine.on_connected("band-1");
        assert_eq!(
            *machine.state(),
            ConnectionState::Connected("band-1".to_string())
        );
    }

    #[test]
    fn test_unexpected_disconnect_without_auto_reconnect() {
        let mut machine = connected_machine(false);

        let commands = machine.on_disconnected("band-1");
        assert!(commands.is_empty());
        assert_eq!(*machine.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_manual_disconnect_never_reconnects() {
        let mut machine = connected_machine(true);

        let commands = machine.request_disconnect();
        assert_eq!(commands, vec![LinkCommand::Disconnect("band-1".to_string())]);
        assert_eq!(*machine.state(), ConnectionState::Disconnected);

        // The transport's echo of the disconnect must not trigger reconnect
        // even with auto-reconnect enabled.
        let commands = machine.on_disconnected("band-1");
        assert!(commands.is_empty());
        assert_eq!(*machine.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_latch_only_absorbs_one_disconnect() {
        let mut machine = connected_machine(true);
        machine.request_disconnect();
        machine.on_disconnected("band-1");

        // Reconnect, then drop unexpectedly: the old latch must be long gone.
        machine.request_scan();
        machine.request_connect("band-1");
        machine.on_connected("band-1");

        let commands = machine.on_disconnected("band-1");
        assert_eq!(commands, vec![LinkCommand::Connect("band-1".to_string())]);
        assert_eq!(
            *machine.state(),
            ConnectionState::Reconnecting("band-1".to_string())
        );
    }

    #[test]
    fn test_disable_auto_reconnect_cancels_pending_attempt() {
        let mut machine = connected_machine(true);
        machine.on_disconnected("band-1");
        assert_eq!(
            *machine.state(),
            ConnectionState::Reconnecting("band-1".to_string())
        );

        let commands = machine.set_auto_reconnect(false);
        assert_eq!(commands, vec![LinkCommand::Disconnect("band-1".to_string())]);
        assert_eq!(*machine.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_enable_auto_reconnect_retries_last_device() {
        let mut machine = connected_machine(false);
        machine.on_disconnected("band-1");
        assert_eq!(*machine.state(), ConnectionState::Disconnected);

        let commands = machine.set_auto_reconnect(true);
        assert_eq!(commands, vec![LinkCommand::Connect("band-1".to_string())]);
        assert_eq!(
            *machine.state(),
            ConnectionState::Reconnecting("band-1".to_string())
        );
    }

    #[test]
    fn test_enable_auto_reconnect_without_history_is_noop() {
        let mut machine = ready_machine(false);

        let commands = machine.set_auto_reconnect(true);
        assert!(commands.is_empty());
        assert_eq!(*machine.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_transport_loss_fails_any_state() {
        let mut machine = connected_machine(true);

        machine.on_transport_availability(false);
        assert_eq!(
            *machine.state(),
            ConnectionState::Failed(SensorError::BluetoothUnavailable)
        );

        // Recovery lands in Disconnected, not back in Connected.
        machine.on_transport_availability(true);
        assert_eq!(*machine.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_transport_recovery_leaves_other_failures() {
        let mut machine = ready_machine(true);
        machine.request_scan();
        machine.request_connect("band-1");
        machine.on_connect_failed("band-1", "refused");

        // Availability toggles must not clear a connect failure.
        machine.on_transport_availability(true);
        assert_eq!(
            *machine.state(),
            ConnectionState::Failed(SensorError::ConnectionFailed("refused".to_string()))
        );
    }

    #[test]
    fn test_undefined_transitions_are_noops() {
        let mut machine = ready_machine(true);

        // Connect without scanning, disconnect without a connection, stray
        // transport events: all ignored.
        assert!(machine.request_connect("band-1").is_empty());
        assert!(machine.request_disconnect().is_empty());
        assert!(machine.on_connected("band-9").is_empty());
        assert!(machine.on_disconnected("band-9").is_empty());
        assert!(machine.on_connect_failed("band-9", "x").is_empty());
        assert_eq!(*machine.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_scan_recovers_from_connect_failure() {
        let mut machine = ready_machine(true);
        machine.request_scan();
        machine.request_connect("band-1");
        machine.on_connect_failed("band-1", "refused");

        // A failed connect is not a dead end.
        assert_eq!(machine.request_scan(), vec![LinkCommand::StartScan]);
        assert_eq!(*machine.state(), ConnectionState::Scanning);
    }

    #[test]
    fn test_events_for_other_devices_ignored() {
        let mut machine = ready_machine(true);
        machine.request_scan();
        machine.request_connect("band-1");

        machine.on_connected("band-2");
        assert_eq!(
            *machine.state(),
            ConnectionState::Connecting("band-1".to_string())
        );
    }
}
