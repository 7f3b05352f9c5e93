//! Room handler: one room slot's state and setpoint commands.

use parking_lot::RwLock;
use tracing::{debug, trace, warn};

use crate::core::packet::Packet;
use crate::error::{BridgeError, Result};
use crate::protocol::codes::{room_class, MsgCode, ROOM_CONTROL_MANUAL};
use crate::protocol::connection::ConnectionManager;
use crate::protocol::state::{RoomMode, RoomState};
use crate::protocol::PacketHandler;

/// State machine for one room slot.
///
/// All fields sit behind one fair reader-writer lock, so a snapshot never mixes
/// values from before and after a packet.
pub struct RoomHandler {
    room_number: u8,
    state: RwLock<RoomState>,
    connector: ConnectionManager,
}

impl RoomHandler {
    pub fn new(room_number: u8, connector: ConnectionManager) -> Self {
        Self {
            room_number,
            state: RwLock::new(RoomState::new(room_number)),
            connector,
        }
    }

    pub fn room_number(&self) -> u8 {
        self.room_number
    }

    /// Current room name, empty until the controller reports one
    pub fn name_or_empty(&self) -> String {
        self.state.read().room_name.clone()
    }

    pub fn snapshot(&self) -> RoomState {
        self.state.read().clone()
    }

    /// Ask the controller for the current room temperature
    pub fn refresh(&self) {
        self.connector
            .send_packet(&Packet::query(self.class(), MsgCode::RoomTemperature.as_u16()));
    }

    /// Send a new home setpoint and record it locally whether or not it was sent
    pub fn set_home_temperature(&self, value: f64) {
        if let Some(sent) = self.send_setpoint(MsgCode::SetpointAtHome, value) {
            self.state.write().setpoint_home = sent;
        }
    }

    /// Send a new away setpoint and record it locally whether or not it was sent
    pub fn set_away_temperature(&self, value: f64) {
        if let Some(sent) = self.send_setpoint(MsgCode::SetpointAway, value) {
            self.state.write().setpoint_away = sent;
        }
    }

    /// Send a new sleep setpoint and record it locally whether or not it was sent
    pub fn set_sleep_temperature(&self, value: f64) {
        if let Some(sent) = self.send_setpoint(MsgCode::SetpointAsleep, value) {
            self.state.write().setpoint_sleep = sent;
        }
    }

    /// Apply the house-wide cooling flag
    pub fn set_cooling_enabled(&self, enabled: bool) {
        let mut state = self.state.write();
        state.cooling_enabled = enabled;
        state.recompute_heating_state();
    }

    fn class(&self) -> u16 {
        room_class(self.room_number)
    }

    /// Returns the value as encoded on the wire, or `None` when it cannot be sent
    fn send_setpoint(&self, code: MsgCode, value: f64) -> Option<f64> {
        if !value.is_finite() {
            let error = BridgeError::InvalidSetpoint(value);
            warn!(room = self.room_number, ?code, error = %error, "Ignoring setpoint");
            return None;
        }
        let packet = Packet::decimal(self.class(), code.as_u16(), value);
        let sent = packet.get_decimal().ok()?;
        if sent != value {
            debug!(room = self.room_number, value, sent, "Setpoint quantized");
        }
        self.connector.send_packet(&packet);
        Some(sent)
    }

    // Payloads are decoded before the lock is taken
    fn apply(&self, packet: &Packet) -> Result<()> {
        let Some(code) = MsgCode::from_u16(packet.msg_code) else {
            trace!(room = self.room_number, code = packet.msg_code, "Unknown room code");
            return Ok(());
        };

        match code {
            MsgCode::RoomTemperature => {
                let value = packet.get_decimal()?;
                self.state.write().temperature = value;
            }
            MsgCode::FloorTemperature => {
                let value = packet.get_decimal()?;
                self.state.write().temperature_floor = value;
            }
            MsgCode::FloorTemperatureMinimum => {
                let value = packet.get_decimal()?;
                self.state.write().temperature_floor_min = value;
            }
            MsgCode::FloorTemperatureMaximum => {
                let value = packet.get_decimal()?;
                self.state.write().temperature_floor_max = value;
            }
            MsgCode::SetpointAtHome => {
                let value = packet.get_decimal()?;
                self.state.write().setpoint_home = value;
            }
            MsgCode::SetpointAway => {
                let value = packet.get_decimal()?;
                self.state.write().setpoint_away = value;
            }
            MsgCode::SetpointAsleep => {
                let value = packet.get_decimal()?;
                self.state.write().setpoint_sleep = value;
            }
            MsgCode::SetpointMaximum => {
                let value = packet.get_decimal()?;
                self.state.write().setpoint_high = value;
            }
            MsgCode::SetpointMinimum => {
                let value = packet.get_decimal()?;
                self.state.write().setpoint_low = value;
            }
            MsgCode::BatteryIndicationPercent => {
                let value = packet.get_byte()?;
                self.state.write().battery_percent = value;
            }
            MsgCode::RoomMode => {
                let raw = packet.get_byte()?;
                match RoomMode::from_byte(raw) {
                    Some(mode) => self.state.write().room_mode = Some(mode),
                    None => debug!(room = self.room_number, mode = raw, "Ignoring unknown room mode"),
                }
            }
            MsgCode::RoomControl => {
                let manual = packet.get_byte()? == ROOM_CONTROL_MANUAL;
                self.state.write().manual_control = manual;
            }
            MsgCode::RoomName => {
                let name = packet.get_string();
                if !name.is_empty() {
                    let mut state = self.state.write();
                    state.room_name = name;
                    debug!(room = self.room_number, name = %state.room_name, "Room named");
                }
            }
            MsgCode::HeatingCoolingState => {
                let on = packet.get_boolean()?;
                let mut state = self.state.write();
                state.heating_cooling_on = on;
                state.recompute_heating_state();
            }
            MsgCode::CoolingEnabled => {
                self.set_cooling_enabled(packet.get_boolean()?);
            }
            MsgCode::HardwareRevision
            | MsgCode::SoftwareRevision
            | MsgCode::SoftwareBuildRevision
            | MsgCode::SerialNumber
            | MsgCode::ProductionDate
            | MsgCode::HouseName
            | MsgCode::VacationSetpoint
            | MsgCode::PauseSetpoint
            | MsgCode::MdgConnectionCount
            | MsgCode::RailInputHeatOrCool => {
                trace!(room = self.room_number, ?code, "House code on room slot");
            }
        }
        Ok(())
    }
}

impl PacketHandler for RoomHandler {
    fn handle_packet(&self, packet: &Packet) {
        if let Err(e) = self.apply(packet) {
            debug!(room = self.room_number, error = %e, "Ignoring undecodable room packet");
        }
    }

    fn ping(&self) {
        debug!(room = self.room_number, "Room ping");
    }
}
