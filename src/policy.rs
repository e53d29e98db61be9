//! Reject policy: frames that must never be gated again

use std::fmt;

use tracing::debug;

use crate::types::Frame;

/// Path tokens marking a frame as already gated to the internet or flagged
/// as not to be forwarded.
pub const REJECT_PATHS: [&str; 4] = ["TCPIP", "TCPIP*", "NOGATE", "RFONLY"];

/// Which rule rejected a frame, with the offending value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Path contains one of [`REJECT_PATHS`]
    Path(String),
    /// Payload is third-party traffic (`}` prefix)
    ThirdParty(String),
    /// Path carries a q-construct
    QConstruct(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Path(element) => write!(f, "reject path \"{}\"", element),
            Rejection::ThirdParty(text) => write!(f, "third-party payload \"{}\"", text),
            Rejection::QConstruct(element) => write!(f, "q-construct \"{}\"", element),
        }
    }
}

/// Evaluate the reject rules in order and return the first one that matches.
pub fn evaluate(frame: &Frame) -> Option<Rejection> {
    if let Some(element) = frame.path().iter().find(|e| REJECT_PATHS.contains(&e.as_str())) {
        return Some(Rejection::Path(element.clone()));
    }

    if frame.text().starts_with('}') {
        return Some(Rejection::ThirdParty(frame.text().to_string()));
    }

    // Lowercase only: `qAR`, `qAC`, ... Uppercase Q is an ordinary callsign.
    frame
        .path()
        .iter()
        .find(|e| e.starts_with('q'))
        .map(|element| Rejection::QConstruct(element.clone()))
}

/// Returns `true` when the frame must not be gated.
pub fn reject(frame: &Frame) -> bool {
    match evaluate(frame) {
        Some(rejection) => {
            debug!("Rejecting frame {}: {}", frame, rejection);
            true
        }
        None => false,
    }
}
