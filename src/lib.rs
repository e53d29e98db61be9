//! APRS packet gateway.
//!
//! aprsgate relays APRS frames between radio interfaces (a KISS TNC or an
//! APRS-IS server) and a publish/subscribe bus. Relays move frames between a
//! radio and its `GateIn_<callsign>_<tag>` / `GateOut_<callsign>_<tag>`
//! channels; routing workers filter what is heard, stamp it with the identity
//! of every outbound gateway and refuse to re-gate their own traffic; beacons
//! publish fixed frames on a timer, optionally only while a satellite is
//! overhead.
//!
//! # Features
//!
//! - **Relays**: ingress (radio to bus) and egress (bus to radio) workers
//! - **Routing**: reject policy, path stamping and loop suppression
//! - **Beacons**: periodic and satellite-pass-gated
//! - **Buses**: Redis pub/sub or an in-process bus
//!
//! ## Example (in-process routing)
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use aprsgate::bus::MemoryBus;
//! use aprsgate::supervisor::Supervisor;
//! use aprsgate::worker::GateWorker;
//!
//! #[tokio::main]
//! async fn main() -> aprsgate::Result<()> {
//!     let bus = Arc::new(MemoryBus::new());
//!     let mut supervisor = Supervisor::new();
//!     supervisor.add(GateWorker::new(
//!         bus,
//!         vec!["GateIn_W2GMD_RF".into()],
//!         vec!["GateOut_W2GMD_IGATE".into()],
//!     )?);
//!
//!     let report = supervisor.run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     }).await;
//!     println!("{:?}", report.cause);
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
pub mod policy;
pub mod types;

// Collaborators
pub mod bus;
pub mod predict;
pub mod radio;

// Workers and their lifecycle
pub mod supervisor;
pub mod worker;

// Process setup
pub mod config;
pub mod gateway;
pub mod logging;

#[cfg(test)]
mod test_utils;

pub use error::*;
pub use types::{ChannelName, Direction, Frame};
