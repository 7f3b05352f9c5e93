//! # Dominion Bridge
//!
//! Talks to Danfoss Icon house controllers over the Dominion protocol.
//!
//! The secure peer-to-peer channel is supplied by the embedder through
//! [`transport::ChannelFactory`]. On top of it the crate provides the packet
//! codec, a self-healing connection manager, house and room state machines
//! with setpoint commands, and the one-time-code discovery flow.
//!
//! ## Layers
//! - [`core`]: packet layout and framing
//! - [`transport`]: secure channel contract, adapter and loopback channel
//! - [`protocol`]: connection lifecycle, state machines, commands, discovery
//! - [`config`], [`error`], [`utils`]: configuration, errors, logging, metrics
//!
//! ## Example
//! ```no_run
//! use dominion_bridge::config::BridgeConfig;
//! use dominion_bridge::protocol::master::MasterHandler;
//! use dominion_bridge::transport::loopback::LoopbackNetwork;
//! use dominion_bridge::transport::PeerId;
//!
//! # #[tokio::main]
//! # async fn main() -> dominion_bridge::error::Result<()> {
//! let config = BridgeConfig::from_file("dominion.toml")?;
//! dominion_bridge::utils::logging::init_logging(&config.logging)?;
//!
//! let network = LoopbackNetwork::new(PeerId::from_bytes([7; 32]));
//! let master = MasterHandler::new(network, config.connection.clone(), tokio::runtime::Handle::current());
//! if let Some(house) = config.house.house_peer_id.as_deref() {
//!     master.scan_rooms(house);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use crate::config::BridgeConfig;
pub use crate::core::packet::Packet;
pub use crate::error::{BridgeError, Result};
pub use crate::protocol::connection::ConnectionManager;
pub use crate::protocol::discovery::{DiscoveryFlow, DiscoveryResponse};
pub use crate::protocol::master::MasterHandler;
pub use crate::protocol::room::RoomHandler;
pub use crate::transport::{ChannelFactory, ConnectionState, PeerId, SecureChannel};
