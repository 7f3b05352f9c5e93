//! # Utility Modules
//!
//! Supporting utilities shared by the transport and protocol layers.
//!
//! ## Components
//! - **Logging**: Structured logging configuration
//! - **Metrics**: Lock-free link counters
//! - **Timeout**: Async timeout wrappers

pub mod logging;
pub mod metrics;
pub mod timeout;
