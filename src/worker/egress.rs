//! Egress relay: bus to radio

use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::Worker;
use crate::bus::{Bus, BusMessage, Subscription};
use crate::radio::{FrameSink, PathAnnotation};
use crate::{GateError, Result};

/// Transmits every frame published on its channels.
///
/// The sink's [`PathAnnotation`] is applied before transmission.
pub struct GateOut {
    sink: Box<dyn FrameSink>,
    bus: Arc<dyn Bus>,
    channels: Vec<String>,
    annotation: PathAnnotation,
    subscription: Option<Box<dyn Subscription>>,
}

impl GateOut {
    pub fn new(sink: Box<dyn FrameSink>, bus: Arc<dyn Bus>, channels: Vec<String>) -> Self {
        let annotation = sink.annotation();
        Self { sink, bus, channels, annotation, subscription: None }
    }
}

#[async_trait::async_trait]
impl Worker for GateOut {
    type Event = BusMessage;

    fn name(&self) -> String {
        format!("GateOut{:?}", self.channels)
    }

    async fn start(&mut self) -> Result<()> {
        self.subscription = Some(self.bus.subscribe(&self.channels).await?);
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<BusMessage>> {
        match self.subscription.as_mut() {
            Some(subscription) => subscription.next_message().await,
            None => Err(GateError::bus(self.channels.join(","), "not subscribed")),
        }
    }

    async fn handle(&mut self, message: BusMessage) -> Result<()> {
        let mut frame = match message.frame() {
            None => {
                trace!("Ignoring {:?} on {}", message.kind, message.channel);
                return Ok(());
            }
            Some(Err(e)) => {
                warn!("Dropping undecodable message on {}: {}", message.channel, e);
                return Ok(());
            }
            Some(Ok(frame)) => frame,
        };

        self.annotation.apply(&mut frame);
        debug!("Gating \"{}\"", frame);

        match self.sink.send(&frame).await {
            // Frames the transport cannot represent are not link failures
            Err(e) if !e.is_retryable() => {
                warn!("Cannot transmit \"{}\": {}", frame, e);
                Ok(())
            }
            result => result,
        }
    }
}
