//! Master and room state machines fed through the master handler.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::Bytes;
use chrono::{TimeZone, Utc};
use dominion_bridge::config::ConnectionConfig;
use dominion_bridge::core::packet::Packet;
use dominion_bridge::protocol::codes::{room_class, MsgCode, ALL_ROOMS, MAX_ROOMS};
use dominion_bridge::protocol::command::{Command, CommandKind};
use dominion_bridge::protocol::state::HeatingState;
use dominion_bridge::protocol::PacketHandler;
use dominion_bridge::transport::loopback::LoopbackNetwork;
use dominion_bridge::transport::PeerId;
use dominion_bridge::{ConnectionState, MasterHandler};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

fn local() -> PeerId {
    PeerId::from_bytes([0x31; 32])
}

fn house() -> PeerId {
    PeerId::from_bytes([0x42; 32])
}

fn config() -> ConnectionConfig {
    ConnectionConfig {
        rendezvous: vec!["127.0.0.1:443".to_string()],
        watchdog_interval: Duration::from_secs(3600),
        ..ConnectionConfig::default()
    }
}

fn offline_master() -> Arc<MasterHandler> {
    MasterHandler::new(LoopbackNetwork::new(local()), config(), Handle::current())
}

fn room(slot: u8, code: MsgCode, payload: &[u8]) -> Packet {
    Packet::new(room_class(slot), code.as_u16(), Bytes::copy_from_slice(payload))
}

fn house_packet(code: MsgCode, payload: &[u8]) -> Packet {
    Packet::new(ALL_ROOMS, code.as_u16(), Bytes::copy_from_slice(payload))
}

fn name(master: &MasterHandler, slot: u8, name: &str) {
    master.handle_packet(&room(slot, MsgCode::RoomName, name.as_bytes()));
}

async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn rooms_stay_hidden_until_named() {
    let master = offline_master();
    master.handle_packet(&Packet::decimal(
        room_class(4),
        MsgCode::RoomTemperature.as_u16(),
        19.5,
    ));
    assert!(master.list_rooms().is_empty());
    assert!(master.room_by_number(4).is_none());

    // An empty name does not register either
    master.handle_packet(&room(4, MsgCode::RoomName, &[0]));
    assert!(master.list_rooms().is_empty());

    name(&master, 4, "Kitchen\0");
    let rooms = master.list_rooms();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].room_number, 4);
    assert_eq!(rooms[0].room_name, "Kitchen");
    assert_eq!(rooms[0].temperature, 19.5);
    assert_eq!(master.room_by_name("Kitchen").unwrap().room_number(), 4);
    assert_eq!(master.room_by_number(4).unwrap().room_number(), 4);
}

#[tokio::test]
async fn first_name_registers_a_slot_for_good() {
    let master = offline_master();
    name(&master, 3, "Bath");
    name(&master, 3, "Bathroom");

    // Renamed, but still filed under its first name and listed once
    assert_eq!(master.list_rooms().len(), 1);
    assert_eq!(master.list_rooms()[0].room_name, "Bathroom");
    assert_eq!(master.room_by_name("Bath").unwrap().room_number(), 3);
    assert!(master.room_by_name("Bathroom").is_none());

    // A second slot reporting a taken name stays unregistered
    name(&master, 7, "Bath");
    assert_eq!(master.room_by_name("Bath").unwrap().room_number(), 3);
    assert!(master.room_by_number(7).is_none());
    assert_eq!(master.list_rooms().len(), 1);
}

#[tokio::test]
async fn rooms_are_listed_by_number() {
    let master = offline_master();
    for (slot, label) in [(9, "Attic"), (0, "Hall"), (44, "Garage"), (2, "Den")] {
        name(&master, slot, label);
    }
    let numbers: Vec<u8> = master.list_rooms().iter().map(|r| r.room_number).collect();
    assert_eq!(numbers, vec![0, 2, 9, 44]);
}

#[tokio::test]
async fn house_fields_are_decoded() {
    let master = offline_master();
    master.handle_packet(&house_packet(MsgCode::HouseName, b"Lakeside\0junk"));
    master.handle_packet(&Packet::decimal(
        ALL_ROOMS,
        MsgCode::VacationSetpoint.as_u16(),
        12.0,
    ));
    master.handle_packet(&Packet::decimal(
        ALL_ROOMS,
        MsgCode::PauseSetpoint.as_u16(),
        7.5,
    ));
    master.handle_packet(&house_packet(MsgCode::HardwareRevision, &[3, 1]));
    master.handle_packet(&house_packet(MsgCode::SoftwareRevision, &[12, 2]));
    master.handle_packet(&house_packet(
        MsgCode::SoftwareBuildRevision,
        &517u16.to_le_bytes(),
    ));
    master.handle_packet(&house_packet(
        MsgCode::SerialNumber,
        &123_456u32.to_le_bytes(),
    ));
    master.handle_packet(&house_packet(
        MsgCode::ProductionDate,
        &86_400u32.to_le_bytes(),
    ));
    master.handle_packet(&house_packet(MsgCode::MdgConnectionCount, &[2]));

    let state = master.snapshot();
    assert_eq!(state.house_name, "Lakeside");
    assert_eq!(state.vacation_setpoint, 12.0);
    assert_eq!(state.pause_setpoint, 7.5);
    assert_eq!(state.hardware_revision, "1.3");
    assert_eq!(state.software_revision, "2.12");
    assert_eq!(state.software_build_revision, 517);
    assert_eq!(state.serial_number, "123456");
    assert_eq!(
        state.production_date,
        Some(Utc.with_ymd_and_hms(2000, 1, 2, 0, 0, 0).unwrap())
    );
    assert_eq!(state.connection_count, 2);
}

#[tokio::test]
async fn short_house_payload_keeps_previous_value() {
    let master = offline_master();
    master.handle_packet(&house_packet(MsgCode::SerialNumber, &77u32.to_le_bytes()));
    master.handle_packet(&house_packet(MsgCode::SerialNumber, &[1, 2]));
    assert_eq!(master.snapshot().serial_number, "77");
}

#[tokio::test]
async fn cooling_broadcast_reaches_known_rooms() {
    let master = offline_master();
    name(&master, 0, "Lounge");
    name(&master, 1, "Study");
    master.handle_packet(&room(0, MsgCode::HeatingCoolingState, &[1]));
    assert_eq!(
        master.room_by_number(0).unwrap().snapshot().heating_state,
        HeatingState::Heat
    );

    master.handle_packet(&house_packet(MsgCode::RailInputHeatOrCool, &[1]));

    let lounge = master.room_by_number(0).unwrap().snapshot();
    assert!(lounge.cooling_enabled);
    assert_eq!(lounge.heating_state, HeatingState::Cool);

    let study = master.room_by_number(1).unwrap().snapshot();
    assert!(study.cooling_enabled);
    assert_eq!(study.heating_state, HeatingState::Off);

    master.handle_packet(&house_packet(MsgCode::RailInputHeatOrCool, &[0]));
    assert_eq!(
        master.room_by_number(0).unwrap().snapshot().heating_state,
        HeatingState::Heat
    );
}

#[tokio::test]
async fn commands_update_known_rooms_and_skip_the_rest() {
    let master = offline_master();
    name(&master, 5, "Nursery");

    let line = r#"{"command":"setHomeTemperature","roomNumber":5,"value":22.5}"#;
    master.execute(&Command::from_json(line).unwrap());
    master.execute_command(5, CommandKind::SetAwayTemperature, 16.0);
    master.execute_command(5, CommandKind::SetSleepTemperature, 18.5);

    let nursery = master.room_by_number(5).unwrap().snapshot();
    assert_eq!(nursery.setpoint_home, 22.5);
    assert_eq!(nursery.setpoint_away, 16.0);
    assert_eq!(nursery.setpoint_sleep, 18.5);

    // Unknown command and unknown room are ignored
    master.execute(&Command::from_json(
        r#"{"command":"setPartyMode","roomNumber":5,"value":30.0}"#,
    )
    .unwrap());
    master.execute_command(6, CommandKind::SetHomeTemperature, 30.0);
    assert_eq!(master.room_by_number(5).unwrap().snapshot().setpoint_home, 22.5);
    assert!(master.room_by_number(6).is_none());
    assert_eq!(master.connector().metrics().snapshot().sends_dropped, 3);
}

#[tokio::test(start_paused = true)]
async fn connecting_asks_every_slot_for_its_name() {
    let network = LoopbackNetwork::new(local());
    let master = MasterHandler::new(network.clone(), config(), Handle::current());

    master.scan_rooms(&house().to_hex());
    settle().await;
    assert_eq!(master.connector().state(), ConnectionState::Connected);

    let sent = network.latest().unwrap().sent();
    assert_eq!(sent.len(), MAX_ROOMS);
    assert_eq!(sent[0], Packet::query(room_class(0), MsgCode::RoomName.as_u16()).to_bytes());
    assert_eq!(
        sent[MAX_ROOMS - 1],
        Packet::query(room_class(MAX_ROOMS as u8 - 1), MsgCode::RoomName.as_u16()).to_bytes()
    );
}

#[tokio::test(start_paused = true)]
async fn live_link_carries_pings_refreshes_and_setpoints() {
    let network = LoopbackNetwork::new(local());
    let master = MasterHandler::new(network.clone(), config(), Handle::current());
    master.scan_rooms(&house().to_hex());
    settle().await;
    let channel = network.latest().unwrap();

    channel.deliver(room(2, MsgCode::RoomName, b"Office\0").to_bytes());
    settle().await;
    assert_eq!(master.room_by_name("Office").unwrap().room_number(), 2);

    let before = channel.sent().len();
    master.ping();
    master.room_by_number(2).unwrap().refresh();
    master.execute_command(2, CommandKind::SetHomeTemperature, 21.0);
    settle().await;

    let sent = channel.sent();
    assert_eq!(
        &sent[before..],
        &[
            Packet::query(ALL_ROOMS, MsgCode::VacationSetpoint.as_u16()).to_bytes(),
            Packet::query(room_class(2), MsgCode::RoomTemperature.as_u16()).to_bytes(),
            Packet::decimal(room_class(2), MsgCode::SetpointAtHome.as_u16(), 21.0).to_bytes(),
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn snapshots_never_mix_flag_updates() {
    let master = offline_master();
    name(&master, 1, "Workshop");
    let done = AtomicBool::new(false);

    std::thread::scope(|scope| {
        scope.spawn(|| {
            for i in 0..2_000u32 {
                let on = u8::from(i % 2 == 0);
                let cooling = u8::from(i % 3 == 0);
                master.handle_packet(&room(1, MsgCode::HeatingCoolingState, &[on]));
                master.handle_packet(&room(1, MsgCode::CoolingEnabled, &[cooling]));
            }
            done.store(true, Ordering::SeqCst);
        });

        scope.spawn(|| {
            let workshop = master.room_by_number(1).unwrap();
            while !done.load(Ordering::SeqCst) {
                let state = workshop.snapshot();
                assert_eq!(
                    state.heating_state,
                    HeatingState::from_flags(state.heating_cooling_on, state.cooling_enabled)
                );
            }
        });
    });
}

#[tokio::test(start_paused = true)]
async fn setpoints_sent_match_what_is_recorded() {
    let network = LoopbackNetwork::new(local());
    let master = MasterHandler::new(network.clone(), config(), Handle::current());
    master.scan_rooms(&house().to_hex());
    settle().await;
    let channel = network.latest().unwrap();
    channel.deliver(room(0, MsgCode::RoomName, b"Lounge\0").to_bytes());
    settle().await;

    let before = channel.sent().len();
    master.execute_command(0, CommandKind::SetHomeTemperature, f64::NAN);
    master.execute_command(0, CommandKind::SetSleepTemperature, f64::INFINITY);
    master.execute_command(0, CommandKind::SetAwayTemperature, 21.555);
    settle().await;

    // Non-finite values never reach the controller
    let sent = channel.sent();
    assert_eq!(
        &sent[before..],
        &[Packet::decimal(room_class(0), MsgCode::SetpointAway.as_u16(), 21.56).to_bytes()]
    );

    let lounge = master.room_by_number(0).unwrap().snapshot();
    assert_eq!(lounge.setpoint_away, 21.56);
    assert_eq!(lounge.setpoint_home, 0.0);
    assert_eq!(lounge.setpoint_sleep, 0.0);
}
