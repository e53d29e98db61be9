//! Bus channel naming
//!
//! Channels follow `<Direction>_<callsign>_<tag>`. The callsign segment is the
//! gateway identity; the routing worker recovers it from outbound channel names
//! to stamp frames and to detect frames it has already gated.

use std::fmt;
use std::str::FromStr;

use crate::{GateError, Result};

/// Delimiter between channel name segments.
pub const CHANNEL_DELIMITER: char = '_';

/// Which way a channel carries frames relative to the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Frames heard on the radio, waiting for routing
    GateIn,
    /// Frames queued for transmission on the radio
    GateOut,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::GateIn => "GateIn",
            Direction::GateOut => "GateOut",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured `<Direction>_<callsign>_<tag>` channel name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelName {
    pub direction: Direction,
    pub callsign: String,
    pub tag: Option<String>,
}

impl ChannelName {
    pub fn new(direction: Direction, callsign: impl Into<String>, tag: Option<&str>) -> Self {
        Self { direction, callsign: callsign.into(), tag: tag.map(str::to_string) }
    }

    /// `GateIn_<callsign>[_<tag>]`
    pub fn gate_in(callsign: impl Into<String>, tag: Option<&str>) -> Self {
        Self::new(Direction::GateIn, callsign, tag)
    }

    /// `GateOut_<callsign>[_<tag>]`
    pub fn gate_out(callsign: impl Into<String>, tag: Option<&str>) -> Self {
        Self::new(Direction::GateOut, callsign, tag)
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.direction, CHANNEL_DELIMITER, self.callsign)?;
        if let Some(tag) = &self.tag {
            write!(f, "{}{}", CHANNEL_DELIMITER, tag)?;
        }
        Ok(())
    }
}

impl FromStr for ChannelName {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        let mut segments = s.splitn(3, CHANNEL_DELIMITER);
        let direction = match segments.next() {
            Some("GateIn") => Direction::GateIn,
            Some("GateOut") => Direction::GateOut,
            _ => return Err(GateError::invalid_channel(s, "direction must be GateIn or GateOut")),
        };
        let callsign = gate_id(s)?;
        segments.next();
        let tag = segments.next().filter(|t| !t.is_empty());
        Ok(Self::new(direction, callsign, tag))
    }
}

/// Extract the gateway identity (the middle segment) from a channel name.
///
/// Only the first two delimiters are significant, so tags may contain `_`.
pub fn gate_id(channel: &str) -> Result<&str> {
    match channel.splitn(3, CHANNEL_DELIMITER).nth(1) {
        Some(id) if !id.is_empty() => Ok(id),
        Some(_) => Err(GateError::invalid_channel(channel, "empty callsign segment")),
        None => Err(GateError::invalid_channel(channel, "missing callsign segment")),
    }
}
