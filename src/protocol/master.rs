//! # Master Handler
//!
//! Aggregates house-wide state and owns every room slot of one controller.
//!
//! Room packets are routed by class to a fixed arena of [`RoomHandler`]s. A
//! room becomes visible (listed, addressable by name or number) once the
//! controller reports a non-empty name for it. The first name seen for a slot
//! registers it for good: later renames update the room but not the lookup,
//! and a name already taken by another slot does not register.
//!
//! House fields share one lock. Listing rooms takes each room's lock in turn,
//! so the list is not a single point-in-time view across rooms.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::ConnectionConfig;
use crate::core::packet::Packet;
use crate::error::{BridgeError, Result};
use crate::protocol::codes::{room_class, room_slot, MsgCode, ALL_ROOMS, MAX_ROOMS};
use crate::protocol::command::{Command, CommandKind};
use crate::protocol::connection::ConnectionManager;
use crate::protocol::room::RoomHandler;
use crate::protocol::state::{MasterState, RoomState};
use crate::protocol::PacketHandler;
use crate::transport::ChannelFactory;

/// State machine for a house controller
pub struct MasterHandler {
    rooms: Box<[RoomHandler]>,
    rooms_by_name: RwLock<HashMap<String, u8>>,
    state: RwLock<MasterState>,
    connector: ConnectionManager,
}

impl MasterHandler {
    /// Build the handler and its connection manager; nothing connects until
    /// [`scan_rooms`](Self::scan_rooms).
    pub fn new(
        factory: Arc<dyn ChannelFactory>,
        config: ConnectionConfig,
        runtime: Handle,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<MasterHandler>| {
            let handler: Weak<dyn PacketHandler> = me.clone() as Weak<dyn PacketHandler>;
            let connector = ConnectionManager::new(factory, config, handler, runtime);
            let rooms = (0..MAX_ROOMS as u8)
                .map(|number| RoomHandler::new(number, connector.clone()))
                .collect();
            Self {
                rooms,
                rooms_by_name: RwLock::new(HashMap::with_capacity(MAX_ROOMS * 2)),
                state: RwLock::new(MasterState::default()),
                connector,
            }
        })
    }

    /// Connect to `house_peer_id` and ask every room slot for its name
    #[instrument(skip(self))]
    pub fn scan_rooms(&self, house_peer_id: &str) {
        self.connector.initialize(house_peer_id);
        self.request_room_names();
    }

    /// Query the name of every room slot; dropped while the link is down
    pub fn request_room_names(&self) {
        for room in 0..MAX_ROOMS as u8 {
            self.connector
                .send_packet(&Packet::query(room_class(room), MsgCode::RoomName.as_u16()));
        }
    }

    /// Snapshots of the registered rooms, ordered by room number
    pub fn list_rooms(&self) -> Vec<RoomState> {
        let mut numbers: Vec<u8> = self.rooms_by_name.read().values().copied().collect();
        numbers.sort_unstable();
        numbers
            .into_iter()
            .filter_map(|n| self.rooms.get(n as usize))
            .map(RoomHandler::snapshot)
            .collect()
    }

    /// Consistent snapshot of the house-wide fields
    pub fn snapshot(&self) -> MasterState {
        self.state.read().clone()
    }

    /// Registered room with this number
    pub fn room_by_number(&self, number: u8) -> Option<&RoomHandler> {
        if self.is_registered(number) {
            self.rooms.get(number as usize)
        } else {
            None
        }
    }

    pub fn room_by_name(&self, name: &str) -> Option<&RoomHandler> {
        let number = self.rooms_by_name.read().get(name).copied()?;
        self.rooms.get(number as usize)
    }

    /// Route a command to a room. Unknown rooms are logged and ignored.
    pub fn execute_command(&self, room_number: u8, kind: CommandKind, value: f64) {
        let Some(room) = self.room_by_number(room_number) else {
            let error = BridgeError::UnknownRoom(room_number);
            warn!(%kind, error = %error, "Ignoring command");
            return;
        };
        info!(room = room_number, %kind, value, "Executing command");
        match kind {
            CommandKind::SetHomeTemperature => room.set_home_temperature(value),
            CommandKind::SetAwayTemperature => room.set_away_temperature(value),
            CommandKind::SetSleepTemperature => room.set_sleep_temperature(value),
        }
    }

    /// Route a parsed command line. Unknown commands are logged and ignored.
    pub fn execute(&self, command: &Command) {
        match command.kind() {
            Ok(kind) => self.execute_command(command.room_number, kind, command.value),
            Err(e) => warn!(room = command.room_number, error = %e, "Ignoring command"),
        }
    }

    /// Connection manager driving this controller's link
    pub fn connector(&self) -> &ConnectionManager {
        &self.connector
    }

    fn handle_room_packet(&self, slot: u8, packet: &Packet) {
        let Some(room) = self.rooms.get(slot as usize) else {
            return;
        };
        room.handle_packet(packet);

        let name = room.name_or_empty();
        if name.is_empty() || self.is_registered(slot) {
            return;
        }
        let mut by_name = self.rooms_by_name.write();
        if by_name.values().any(|&n| n == slot) {
            return;
        }
        match by_name.get(&name) {
            Some(&owner) => {
                debug!(room = slot, owner, %name, "Room name already registered");
            }
            None => {
                info!(room = slot, %name, "Room registered");
                by_name.insert(name, slot);
            }
        }
    }

    fn is_registered(&self, slot: u8) -> bool {
        self.rooms_by_name.read().values().any(|&n| n == slot)
    }

    fn apply(&self, packet: &Packet) -> Result<()> {
        let Some(code) = MsgCode::from_u16(packet.msg_code) else {
            trace!(class = packet.msg_class, code = packet.msg_code, "Unknown house code");
            return Ok(());
        };

        match code {
            MsgCode::HouseName => {
                let name = packet.get_string();
                self.state.write().house_name = name;
            }
            MsgCode::VacationSetpoint => {
                let value = packet.get_decimal()?;
                self.state.write().vacation_setpoint = value;
            }
            MsgCode::PauseSetpoint => {
                let value = packet.get_decimal()?;
                self.state.write().pause_setpoint = value;
            }
            MsgCode::HardwareRevision => {
                let version = packet.get_version()?.to_string();
                self.state.write().hardware_revision = version;
            }
            MsgCode::SoftwareRevision => {
                let version = packet.get_version()?.to_string();
                self.state.write().software_revision = version;
            }
            MsgCode::SoftwareBuildRevision => {
                let build = packet.get_short()?;
                self.state.write().software_build_revision = build;
            }
            MsgCode::SerialNumber => {
                let serial = packet.get_int()?.to_string();
                self.state.write().serial_number = serial;
            }
            MsgCode::ProductionDate => {
                let date = packet.get_date(0)?;
                self.state.write().production_date = Some(date);
            }
            MsgCode::MdgConnectionCount => {
                let count = packet.get_byte()?;
                self.state.write().connection_count = count;
            }
            MsgCode::RailInputHeatOrCool => {
                let cooling = packet.get_boolean()?;
                // Independent update per known room
                let known: Vec<u8> = self.rooms_by_name.read().values().copied().collect();
                for number in known {
                    if let Some(room) = self.rooms.get(number as usize) {
                        room.set_cooling_enabled(cooling);
                    }
                }
                debug!(cooling, "Cooling flag broadcast to rooms");
            }
            MsgCode::RoomName
            | MsgCode::RoomTemperature
            | MsgCode::FloorTemperature
            | MsgCode::SetpointAtHome
            | MsgCode::SetpointAway
            | MsgCode::SetpointAsleep
            | MsgCode::SetpointMinimum
            | MsgCode::SetpointMaximum
            | MsgCode::FloorTemperatureMinimum
            | MsgCode::FloorTemperatureMaximum
            | MsgCode::RoomMode
            | MsgCode::RoomControl
            | MsgCode::HeatingCoolingState
            | MsgCode::CoolingEnabled
            | MsgCode::BatteryIndicationPercent => {
                trace!(class = packet.msg_class, ?code, "Room code outside room slots");
            }
        }
        Ok(())
    }
}

impl PacketHandler for MasterHandler {
    fn handle_packet(&self, packet: &Packet) {
        if let Some(slot) = room_slot(packet.msg_class) {
            self.handle_room_packet(slot, packet);
            return;
        }
        if let Err(e) = self.apply(packet) {
            debug!(code = packet.msg_code, error = %e, "Ignoring undecodable house packet");
        }
    }

    fn ping(&self) {
        self.connector
            .send_packet(&Packet::query(ALL_ROOMS, MsgCode::VacationSetpoint.as_u16()));
    }

    fn on_connected(&self) {
        self.request_room_names();
    }
}
