//! Core types shared by every worker.
//!
//! - [`Frame`] is the packet that flows through the gateway
//! - [`ChannelName`] and [`gate_id`] implement the bus channel naming convention
//!
//! ## Usage Example
//!
//! ```rust
//! use aprsgate::types::{ChannelName, Frame, gate_id};
//!
//! let frame: Frame = "W2GMD-9>APRS,WIDE1-1:>on the air".parse().unwrap();
//! assert_eq!(frame.path(), ["WIDE1-1"]);
//!
//! let out = ChannelName::gate_out("W2GMD", Some("IGATE")).to_string();
//! assert_eq!(out, "GateOut_W2GMD_IGATE");
//! assert_eq!(gate_id(&out).unwrap(), "W2GMD");
//! ```

mod channel;
mod frame;

pub use channel::{CHANNEL_DELIMITER, ChannelName, Direction, gate_id};
pub use frame::Frame;
