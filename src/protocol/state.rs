//! Snapshot types for house and room state.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Derived heating/cooling activity of a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HeatingState {
    #[default]
    Off,
    Heat,
    Cool,
}

impl HeatingState {
    /// Activity implied by the heating/cooling-on flag and the cooling flag
    pub fn from_flags(on: bool, cooling: bool) -> Self {
        match (on, cooling) {
            (false, _) => HeatingState::Off,
            (true, false) => HeatingState::Heat,
            (true, true) => HeatingState::Cool,
        }
    }
}

/// Operating mode reported by a room thermostat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomMode {
    Home,
    Away,
    Sleep,
    Fatal,
}

impl RoomMode {
    /// Decode the room-mode byte; unknown values yield `None`
    pub fn from_byte(mode: u8) -> Option<Self> {
        match mode {
            0 => Some(RoomMode::Home),
            1 => Some(RoomMode::Away),
            2 => Some(RoomMode::Sleep),
            3 => Some(RoomMode::Fatal),
            _ => None,
        }
    }
}

/// House-wide controller state
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterState {
    pub house_name: String,
    pub vacation_setpoint: f64,
    pub pause_setpoint: f64,
    pub hardware_revision: String,
    pub software_revision: String,
    pub serial_number: String,
    pub software_build_revision: u16,
    pub connection_count: u8,
    pub production_date: Option<DateTime<Utc>>,
}

/// State of one room slot
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    pub room_number: u8,
    pub room_name: String,
    pub temperature: f64,
    pub temperature_floor: f64,
    pub temperature_floor_min: f64,
    pub temperature_floor_max: f64,
    pub setpoint_home: f64,
    pub setpoint_away: f64,
    pub setpoint_sleep: f64,
    pub setpoint_high: f64,
    pub setpoint_low: f64,
    pub battery_percent: u8,
    pub room_mode: Option<RoomMode>,
    pub manual_control: bool,
    pub heating_cooling_on: bool,
    pub cooling_enabled: bool,
    pub heating_state: HeatingState,
}

impl RoomState {
    pub fn new(room_number: u8) -> Self {
        Self {
            room_number,
            ..Self::default()
        }
    }

    pub(crate) fn recompute_heating_state(&mut self) {
        self.heating_state = HeatingState::from_flags(self.heating_cooling_on, self.cooling_enabled);
    }
}
