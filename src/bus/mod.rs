//! Publish/subscribe bus connecting relays, routing workers and beacons
//!
//! The bus is addressed by channel name and carries frames in TNC2 text form.
//! Two transports are provided:
//!
//! - [`MemoryBus`]: in-process, for single-process deployments and tests
//! - [`RedisBus`]: Redis pub/sub, for gateways split across processes or hosts

mod memory;
mod redis;
mod resp;

use std::sync::Arc;

use tracing::info;

use crate::types::Frame;
use crate::{GateError, Result};

pub use memory::{MemoryBus, MemorySubscription};
pub use redis::{RedisBus, RedisSubscription};

/// Kind of a message delivered by a [`Subscription`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Subscription confirmation for one channel
    Subscribe,
    /// Unsubscription confirmation for one channel
    Unsubscribe,
    /// Data published to a channel
    Message,
    /// Anything else the transport reports
    Other,
}

/// A message delivered by the bus: `{type, channel, data}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub kind: MessageKind,
    pub channel: String,
    pub data: Option<String>,
}

impl BusMessage {
    /// A data message carrying `data` on `channel`
    pub fn message(channel: impl Into<String>, data: impl Into<String>) -> Self {
        Self { kind: MessageKind::Message, channel: channel.into(), data: Some(data.into()) }
    }

    /// A control message with no payload
    pub fn control(kind: MessageKind, channel: impl Into<String>) -> Self {
        Self { kind, channel: channel.into(), data: None }
    }

    /// Only `Message` kinds with a non-empty payload carry a frame.
    pub fn is_data(&self) -> bool {
        self.kind == MessageKind::Message && self.data.as_deref().is_some_and(|d| !d.is_empty())
    }

    /// Decode the carried frame.
    ///
    /// Returns `None` for control messages and empty payloads.
    pub fn frame(&self) -> Option<Result<Frame>> {
        if !self.is_data() {
            return None;
        }
        self.data.as_deref().map(str::parse)
    }
}

/// Publishing side of the bus
///
/// Implementations must be safe to share between workers; publishing is
/// fire-and-forget from the caller's point of view.
#[async_trait::async_trait]
pub trait Bus: Send + Sync + 'static {
    /// Publish a frame, returning how many subscribers received it.
    async fn publish(&self, channel: &str, frame: &Frame) -> Result<usize>;

    /// Subscribe to a set of channels on a dedicated subscription.
    async fn subscribe(&self, channels: &[String]) -> Result<Box<dyn Subscription>>;
}

/// A live subscription to one or more channels
///
/// `Sync` so that workers owning one can be borrowed across an await.
#[async_trait::async_trait]
pub trait Subscription: Send + Sync {
    /// Wait for the next message.
    ///
    /// Returns:
    /// - `Ok(Some(message))` - Data or control message
    /// - `Ok(None)` - Subscription closed by the bus
    /// - `Err(e)` - Transport error
    async fn next_message(&mut self) -> Result<Option<BusMessage>>;
}

/// Open a bus from its address.
///
/// `memory://` gives a fresh in-process bus, `redis://host[:port]` (or a bare
/// `host:port`) connects to Redis.
pub async fn connect(address: &str) -> Result<Arc<dyn Bus>> {
    if address.starts_with("memory://") {
        info!("Using in-process bus");
        return Ok(Arc::new(MemoryBus::new()));
    }

    if address.contains("://") && !address.starts_with("redis://") {
        return Err(GateError::Config(format!("Unsupported bus address: {}", address)));
    }

    Ok(Arc::new(RedisBus::connect(address).await?))
}
