//! Test utilities shared by the worker tests
//!
//! Bus helpers that skip subscription confirmations and bound every wait, plus a
//! [`RecordingBus`] that remembers every publish in order.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::Result;
use crate::bus::{Bus, MemoryBus, Subscription};
use crate::types::Frame;

/// How long helpers wait before declaring a frame missing.
pub const FRAME_TIMEOUT: Duration = Duration::from_secs(2);

/// Next frame on a subscription, skipping control messages.
///
/// Panics if none arrives within [`FRAME_TIMEOUT`].
pub async fn next_frame(sub: &mut Box<dyn Subscription>) -> Frame {
    tokio::time::timeout(FRAME_TIMEOUT, async {
        loop {
            let message = sub.next_message().await.unwrap().expect("subscription closed");
            if let Some(frame) = message.frame() {
                return frame.expect("undecodable frame on bus");
            }
        }
    })
    .await
    .expect("timed out waiting for a frame")
}

/// Returns `true` if no data message arrives within `wait`.
pub async fn stays_quiet(sub: &mut Box<dyn Subscription>, wait: Duration) -> bool {
    tokio::time::timeout(wait, async {
        loop {
            match sub.next_message().await {
                Ok(Some(message)) if message.is_data() => return,
                Ok(Some(_)) => continue,
                _ => std::future::pending::<()>().await,
            }
        }
    })
    .await
    .is_err()
}

/// Bus that records every publish and forwards it to an in-memory bus.
#[derive(Clone, Default)]
pub struct RecordingBus {
    inner: MemoryBus,
    published: Arc<Mutex<Vec<(String, Frame)>>>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, in order
    pub fn published(&self) -> Vec<(String, Frame)> {
        self.published.lock().unwrap().clone()
    }

    /// Live subscribers on a channel
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner.subscriber_count(channel)
    }

    /// Frames published to one channel, in order
    pub fn published_to(&self, channel: &str) -> Vec<Frame> {
        self.published()
            .into_iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, frame)| frame)
            .collect()
    }
}

#[async_trait::async_trait]
impl Bus for RecordingBus {
    async fn publish(&self, channel: &str, frame: &Frame) -> Result<usize> {
        self.published.lock().unwrap().push((channel.to_string(), frame.clone()));
        self.inner.publish(channel, frame).await
    }

    async fn subscribe(&self, channels: &[String]) -> Result<Box<dyn Subscription>> {
        self.inner.subscribe(channels).await
    }
}
