//! Ingress relay: radio to bus

use std::sync::Arc;

use tracing::trace;

use super::{Worker, publish_all};
use crate::Result;
use crate::bus::Bus;
use crate::radio::{FrameSink, FrameSource};
use crate::types::Frame;

/// Republishes every frame heard on a radio, unmodified, to its channels.
///
/// No filtering happens here; deciding what to gate is the routing worker's job.
pub struct GateIn {
    source: Box<dyn FrameSource>,
    bus: Arc<dyn Bus>,
    channels: Vec<String>,
    /// Unused transmitting half; dropping it would close the link.
    _idle_sink: Option<Box<dyn FrameSink>>,
}

impl GateIn {
    pub fn new(source: Box<dyn FrameSource>, bus: Arc<dyn Bus>, channels: Vec<String>) -> Self {
        Self { source, bus, channels, _idle_sink: None }
    }

    /// Keep the radio's transmitting half open for as long as this relay runs.
    ///
    /// Needed when a radio is relayed in one direction only: dropping a TCP
    /// write half sends FIN and the peer hangs up.
    pub fn holding(mut self, sink: Box<dyn FrameSink>) -> Self {
        self._idle_sink = Some(sink);
        self
    }
}

#[async_trait::async_trait]
impl Worker for GateIn {
    type Event = Frame;

    fn name(&self) -> String {
        format!("GateIn{:?}", self.channels)
    }

    async fn next_event(&mut self) -> Result<Option<Frame>> {
        self.source.next_frame().await
    }

    async fn handle(&mut self, frame: Frame) -> Result<()> {
        trace!("Heard {}", frame);
        publish_all(&self.bus, &self.channels, &frame).await
    }
}
