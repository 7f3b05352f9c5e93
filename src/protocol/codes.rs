//! Dominion message classes and codes.
//!
//! Values are little-endian on the wire. Every code the bridge understands is
//! listed in [`MsgCode`]; anything else is ignored by the handlers.

/// Class addressing every room at once; also carries house-wide fields
pub const ALL_ROOMS: u16 = 0x0F;

/// Class of room slot 0
pub const ROOM_FIRST: u16 = 0x10;

/// Number of room slots on a controller
pub const MAX_ROOMS: usize = 45;

/// Class of the last room slot
pub const ROOM_LAST: u16 = ROOM_FIRST + MAX_ROOMS as u16 - 1;

/// Room-control byte meaning the room is under manual control
pub const ROOM_CONTROL_MANUAL: u8 = 0;

/// Class addressing room slot `room`
pub const fn room_class(room: u8) -> u16 {
    ROOM_FIRST + room as u16
}

/// Room slot addressed by `msg_class`, if it is a room class
pub fn room_slot(msg_class: u16) -> Option<u8> {
    (ROOM_FIRST..=ROOM_LAST)
        .contains(&msg_class)
        .then(|| (msg_class - ROOM_FIRST) as u8)
}

/// Known message codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MsgCode {
    HardwareRevision = 0x0002,
    SoftwareRevision = 0x0003,
    SoftwareBuildRevision = 0x0004,
    SerialNumber = 0x0005,
    ProductionDate = 0x0006,
    RoomName = 0x0301,
    HouseName = 0x0302,
    VacationSetpoint = 0x0A01,
    PauseSetpoint = 0x0A02,
    MdgConnectionCount = 0x0B01,
    RailInputHeatOrCool = 0x0C01,
    RoomTemperature = 0x1802,
    FloorTemperature = 0x1803,
    SetpointAtHome = 0x1810,
    SetpointAway = 0x1811,
    SetpointAsleep = 0x1812,
    SetpointMinimum = 0x1813,
    SetpointMaximum = 0x1814,
    FloorTemperatureMinimum = 0x1815,
    FloorTemperatureMaximum = 0x1816,
    RoomMode = 0x1820,
    RoomControl = 0x1821,
    HeatingCoolingState = 0x1822,
    CoolingEnabled = 0x1823,
    BatteryIndicationPercent = 0x1830,
}

impl MsgCode {
    pub const ALL: [MsgCode; 25] = [
        MsgCode::HardwareRevision,
        MsgCode::SoftwareRevision,
        MsgCode::SoftwareBuildRevision,
        MsgCode::SerialNumber,
        MsgCode::ProductionDate,
        MsgCode::RoomName,
        MsgCode::HouseName,
        MsgCode::VacationSetpoint,
        MsgCode::PauseSetpoint,
        MsgCode::MdgConnectionCount,
        MsgCode::RailInputHeatOrCool,
        MsgCode::RoomTemperature,
        MsgCode::FloorTemperature,
        MsgCode::SetpointAtHome,
        MsgCode::SetpointAway,
        MsgCode::SetpointAsleep,
        MsgCode::SetpointMinimum,
        MsgCode::SetpointMaximum,
        MsgCode::FloorTemperatureMinimum,
        MsgCode::FloorTemperatureMaximum,
        MsgCode::RoomMode,
        MsgCode::RoomControl,
        MsgCode::HeatingCoolingState,
        MsgCode::CoolingEnabled,
        MsgCode::BatteryIndicationPercent,
    ];

    pub fn from_u16(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|known| *known as u16 == code)
    }

    pub const fn as_u16(self) -> u16 {
        self as u16
    }
}
