//! In-process bus

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::trace;

use super::{Bus, BusMessage, MessageKind, Subscription};
use crate::Result;
use crate::types::Frame;

type Subscribers = HashMap<String, Vec<mpsc::UnboundedSender<BusMessage>>>;

/// In-process bus
///
/// Each subscription owns an unbounded queue; publishing pushes one copy of the
/// message into the queue of every subscriber of the channel, so messages from
/// one publisher arrive in order.
#[derive(Clone, Default)]
pub struct MemoryBus {
    subscribers: Arc<Mutex<Subscribers>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscribers on a channel
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.lock().get(channel).map_or(0, |subs| subs.iter().filter(|s| !s.is_closed()).count())
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl Bus for MemoryBus {
    async fn publish(&self, channel: &str, frame: &Frame) -> Result<usize> {
        let message = BusMessage::message(channel, frame.to_string());
        let mut subscribers = self.lock();
        let Some(subs) = subscribers.get_mut(channel) else {
            trace!("No subscribers on {}", channel);
            return Ok(0);
        };

        // Dropped subscriptions are pruned here rather than on drop
        subs.retain(|tx| tx.send(message.clone()).is_ok());
        Ok(subs.len())
    }

    async fn subscribe(&self, channels: &[String]) -> Result<Box<dyn Subscription>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut subscribers = self.lock();

        for channel in channels {
            subscribers.entry(channel.clone()).or_default().push(tx.clone());
            let _ = tx.send(BusMessage::control(MessageKind::Subscribe, channel.clone()));
        }

        Ok(Box::new(MemorySubscription { rx }))
    }
}

/// Subscription handed out by [`MemoryBus`]
pub struct MemorySubscription {
    rx: mpsc::UnboundedReceiver<BusMessage>,
}

#[async_trait::async_trait]
impl Subscription for MemorySubscription {
    async fn next_message(&mut self) -> Result<Option<BusMessage>> {
        Ok(self.rx.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(text: &str) -> Frame {
        Frame::new("N0CALL", "APRS", vec![], text)
    }

    #[tokio::test]
    async fn subscribe_confirms_each_channel_first() {
        let bus = MemoryBus::new();
        let mut sub = bus.subscribe(&["a".into(), "b".into()]).await.unwrap();

        let first = sub.next_message().await.unwrap().unwrap();
        let second = sub.next_message().await.unwrap().unwrap();
        assert_eq!(first, BusMessage::control(MessageKind::Subscribe, "a"));
        assert_eq!(second, BusMessage::control(MessageKind::Subscribe, "b"));
    }

    #[tokio::test]
    async fn publish_fans_out_in_order() {
        let bus = MemoryBus::new();
        let mut one = bus.subscribe(&["chan".into()]).await.unwrap();
        let mut two = bus.subscribe(&["chan".into()]).await.unwrap();

        assert_eq!(bus.publish("chan", &frame("1")).await.unwrap(), 2);
        assert_eq!(bus.publish("chan", &frame("2")).await.unwrap(), 2);
        assert_eq!(bus.publish("other", &frame("x")).await.unwrap(), 0);

        for sub in [&mut one, &mut two] {
            sub.next_message().await.unwrap();
            let texts: Vec<String> = vec![
                sub.next_message().await.unwrap().unwrap().frame().unwrap().unwrap().text().into(),
                sub.next_message().await.unwrap().unwrap().frame().unwrap().unwrap().text().into(),
            ];
            assert_eq!(texts, ["1", "2"]);
        }
    }

    #[tokio::test]
    async fn dropped_subscriptions_are_pruned() {
        let bus = MemoryBus::new();
        let sub = bus.subscribe(&["chan".into()]).await.unwrap();
        assert_eq!(bus.subscriber_count("chan"), 1);

        drop(sub);
        assert_eq!(bus.publish("chan", &frame("x")).await.unwrap(), 0);
        assert_eq!(bus.subscriber_count("chan"), 0);
    }
}
