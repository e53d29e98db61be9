//! Radio interfaces
//!
//! A radio is split into a receiving half ([`FrameSource`]) feeding the ingress
//! relay and a transmitting half ([`FrameSink`]) fed by the egress relay, so
//! both relays can run concurrently over one connection.
//!
//! Transports:
//! - [`aprsis`]: APRS-IS over TCP (TNC2 text lines)
//! - [`kiss`]: KISS framed AX.25 over TCP or a serial port
//! - [`channel`]: in-process radio backed by tokio channels

pub mod aprsis;
pub mod ax25;
pub mod channel;
pub mod kiss;

use crate::Result;
use crate::types::Frame;

/// Receiving half of a radio interface
#[async_trait::async_trait]
pub trait FrameSource: Send + 'static {
    /// Wait for the next frame heard on the interface
    ///
    /// Returns:
    /// - `Ok(Some(frame))` - Frame received
    /// - `Ok(None)` - Link closed (normal termination)
    /// - `Err(e)` - I/O error on the link
    ///
    /// Undecodable traffic is logged and skipped by the implementation.
    async fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Transmitting half of a radio interface
#[async_trait::async_trait]
pub trait FrameSink: Send + 'static {
    /// Transmit one frame.
    async fn send(&mut self, frame: &Frame) -> Result<()>;

    /// Path elements this transport appends before transmission.
    fn annotation(&self) -> PathAnnotation {
        PathAnnotation::none()
    }
}

/// Elements appended to a frame's path by a transport before transmission
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathAnnotation {
    elements: Vec<String>,
}

impl PathAnnotation {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(elements: Vec<String>) -> Self {
        Self { elements }
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn apply(&self, frame: &mut Frame) {
        for element in &self.elements {
            frame.push_path(element.clone());
        }
    }
}

/// A connected radio, both halves boxed.
pub struct Radio {
    pub source: Box<dyn FrameSource>,
    pub sink: Box<dyn FrameSink>,
}

impl Radio {
    pub fn new(source: impl FrameSource, sink: impl FrameSink) -> Self {
        Self { source: Box::new(source), sink: Box::new(sink) }
    }
}
