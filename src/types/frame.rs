//! APRS frame type shared by relays, the routing worker and beacons

use std::fmt;
use std::str::FromStr;

use crate::{GateError, Result};

/// One APRS packet: addressing, digipeater path and payload text.
///
/// Frames travel across the bus in TNC2 text form (`SRC>DST,PATH1,PATH2:text`).
/// The path only ever grows: relays append their own marker and never remove or
/// reorder existing elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Frame {
    source: String,
    destination: String,
    path: Vec<String>,
    text: String,
}

impl Frame {
    /// Create a new frame
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        path: Vec<String>,
        text: impl Into<String>,
    ) -> Self {
        Self { source: source.into(), destination: destination.into(), path, text: text.into() }
    }

    /// Originating station callsign
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Destination (tocall) field
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Digipeater path, oldest hop first
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Payload text (information field)
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Append an element to the end of the path.
    pub fn push_path(&mut self, element: impl Into<String>) {
        self.path.push(element.into());
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}>{}", self.source, self.destination)?;
        for element in &self.path {
            write!(f, ",{}", element)?;
        }
        write!(f, ":{}", self.text)
    }
}

impl FromStr for Frame {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim_end_matches(['\r', '\n']);
        let (header, text) =
            s.split_once(':').ok_or_else(|| GateError::decode("frame", "missing ':' separator"))?;
        let (source, addresses) = header
            .split_once('>')
            .ok_or_else(|| GateError::decode("frame", "missing '>' after source"))?;

        if source.is_empty() {
            return Err(GateError::decode("frame", "empty source callsign"));
        }

        let mut parts = addresses.split(',');
        let destination = parts.next().unwrap_or_default();
        if destination.is_empty() {
            return Err(GateError::decode("frame", "empty destination"));
        }

        let mut path = Vec::new();
        for element in parts {
            if element.is_empty() {
                return Err(GateError::decode("frame", format!("empty path element in '{}'", header)));
            }
            path.push(element.to_string());
        }

        Ok(Self::new(source, destination, path, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tnc2_with_path() {
        let frame: Frame = "W2GMD-9>APRS,WIDE1-1,WIDE2-1:>hello".parse().unwrap();
        assert_eq!(frame.source(), "W2GMD-9");
        assert_eq!(frame.destination(), "APRS");
        assert_eq!(frame.path(), ["WIDE1-1", "WIDE2-1"]);
        assert_eq!(frame.text(), ">hello");
    }

    #[test]
    fn parses_without_path_and_keeps_colons_in_text() {
        let frame: Frame = "N0CALL>APZ001::BLN1     :note\r\n".parse().unwrap();
        assert!(frame.path().is_empty());
        assert_eq!(frame.text(), ":BLN1     :note");
    }

    #[test]
    fn display_matches_input() {
        let line = "SUNSET>CQ,ARISS:!3745.60N/12229.85W`beacon";
        let frame: Frame = line.parse().unwrap();
        assert_eq!(frame.to_string(), line);
    }

    #[test]
    fn rejects_malformed_headers() {
        assert!("no separator here".parse::<Frame>().is_err());
        assert!("NOARROW:text".parse::<Frame>().is_err());
        assert!(">APRS:text".parse::<Frame>().is_err());
        assert!("N0CALL>:text".parse::<Frame>().is_err());
        assert!("N0CALL>APRS,,WIDE1-1:text".parse::<Frame>().is_err());
    }

    #[test]
    fn push_path_appends() {
        let mut frame = Frame::new("A", "B", vec!["WIDE1-1".into()], "x");
        frame.push_path("W2GMD");
        assert_eq!(frame.path(), ["WIDE1-1", "W2GMD"]);
    }
}
