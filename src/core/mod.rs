//! # Core Protocol Components
//!
//! Low-level packet handling for the Dominion protocol.
//!
//! This module provides the foundation for the bridge: packet layout, typed
//! payload accessors and splitting of merged reads.
//!
//! ## Components
//! - **Packet**: fixed header plus typed payload
//! - **Codec**: tokio codec and per-read demultiplexing
//!
//! ## Wire Format
//! ```text
//! [Class(2)] [Code(2)] [Length(1)] [Payload(N)]
//! ```
//!
//! ## Robustness
//! - A declared length is checked against the bytes available before any copy
//! - Malformed tails are dropped, never fatal

pub mod codec;
pub mod packet;
