//! Routing worker: the gating decision
//!
//! For every frame arriving on the inbound channels:
//!
//! 1. Frames matching the reject policy are dropped.
//! 2. Outbound channels are visited in order. Each channel's gateway identity
//!    (the middle segment of its name) is checked against the path; if any path
//!    element contains it, the frame has already been gated by that gateway and
//!    processing stops for all remaining channels.
//! 3. Otherwise the identity is appended to the path and the frame is published.
//!
//! The path grows across the loop: with outbound gateways `A` then `B`, channel
//! `A` receives `path + [A]` and channel `B` receives `path + [A, B]`.
//!
//! The loop check is a substring match, so an identity that is a substring of an
//! unrelated element (`K6AB` inside `K6ABC-1`) also suppresses the frame.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::Worker;
use crate::bus::{Bus, BusMessage, Subscription};
use crate::policy::{self, Rejection};
use crate::types::{Frame, gate_id};
use crate::{GateError, Result};

/// An outbound channel and the gateway identity taken from its name.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Outbound {
    channel: String,
    gate_id: String,
}

/// A path element showing the frame already passed through a gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopDetected {
    pub gate_id: String,
    pub element: String,
}

/// The publishes to perform for one accepted frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoutePlan {
    /// `(channel, frame)` in outbound order
    pub deliveries: Vec<(String, Frame)>,
    /// Set when a loop cut the fan-out short
    pub halted: Option<LoopDetected>,
}

/// Outcome of routing one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Rejected(Rejection),
    Forward(RoutePlan),
}

/// Routes frames from inbound to outbound channels.
pub struct GateWorker {
    bus: Arc<dyn Bus>,
    in_channels: Vec<String>,
    outbound: Vec<Outbound>,
    subscription: Option<Box<dyn Subscription>>,
}

impl GateWorker {
    /// Create a routing worker.
    ///
    /// Fails if an outbound channel name carries no gateway identity.
    pub fn new(bus: Arc<dyn Bus>, in_channels: Vec<String>, out_channels: Vec<String>) -> Result<Self> {
        if in_channels.is_empty() {
            return Err(GateError::Config("routing worker needs at least one inbound channel".into()));
        }

        let outbound = out_channels
            .into_iter()
            .map(|channel| -> Result<Outbound> {
                let gate_id = gate_id(&channel)?.to_string();
                Ok(Outbound { channel, gate_id })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { bus, in_channels, outbound, subscription: None })
    }

    /// Decide what to publish for a frame.
    pub fn route(&self, frame: Frame) -> Decision {
        if let Some(rejection) = policy::evaluate(&frame) {
            return Decision::Rejected(rejection);
        }

        let mut frame = frame;
        let mut plan = RoutePlan::default();

        for outbound in &self.outbound {
            if let Some(element) = gated_by(&frame, &outbound.gate_id) {
                plan.halted =
                    Some(LoopDetected { gate_id: outbound.gate_id.clone(), element: element.to_string() });
                break;
            }

            frame.push_path(outbound.gate_id.clone());
            plan.deliveries.push((outbound.channel.clone(), frame.clone()));
        }

        Decision::Forward(plan)
    }

    async fn handle_message(&self, message: BusMessage) -> Result<()> {
        let frame = match message.frame() {
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
        debug!("Handling frame=\"{}\" from {}", frame, message.channel);

        let plan = match self.route(frame) {
            Decision::Rejected(rejection) => {
                debug!("Rejected: {}", rejection);
                return Ok(());
            }
            Decision::Forward(plan) => plan,
        };

        for (channel, frame) in &plan.deliveries {
            debug!("Sending to channel={} frame=\"{}\"", channel, frame);
            self.bus.publish(channel, frame).await?;
        }

        if let Some(hit) = plan.halted {
            debug!("Already gated by {} (path element \"{}\"), not forwarding", hit.gate_id, hit.element);
        }
        Ok(())
    }
}

/// First path element containing `gate_id`.
fn gated_by<'a>(frame: &'a Frame, gate_id: &str) -> Option<&'a str> {
    frame.path().iter().map(String::as_str).find(|element| element.contains(gate_id))
}

#[async_trait::async_trait]
impl Worker for GateWorker {
    type Event = BusMessage;

    fn name(&self) -> String {
        format!("GateWorker{:?}", self.in_channels)
    }

    async fn start(&mut self) -> Result<()> {
        self.subscription = Some(self.bus.subscribe(&self.in_channels).await?);
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<BusMessage>> {
        match self.subscription.as_mut() {
            Some(subscription) => subscription.next_message().await,
            None => Err(GateError::bus(self.in_channels.join(","), "not subscribed")),
        }
    }

    async fn handle(&mut self, message: BusMessage) -> Result<()> {
        self.handle_message(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;
    use crate::test_utils::{RecordingBus, next_frame, stays_quiet};
    use crate::worker::{WorkerExit, spawn};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn worker(out: &[&str]) -> GateWorker {
        GateWorker::new(
            Arc::new(MemoryBus::new()),
            vec!["GateIn_X_T".into()],
            out.iter().map(|s| s.to_string()).collect(),
        )
        .unwrap()
    }

    fn frame(path: &[&str]) -> Frame {
        Frame::new("K6ABC", "APRS", path.iter().map(|s| s.to_string()).collect(), ">test")
    }

    fn plan(decision: Decision) -> RoutePlan {
        match decision {
            Decision::Forward(plan) => plan,
            Decision::Rejected(r) => panic!("unexpected rejection: {}", r),
        }
    }

    #[test]
    fn outbound_channels_need_an_identity() {
        let bus: Arc<dyn Bus> = Arc::new(MemoryBus::new());
        assert!(GateWorker::new(bus.clone(), vec!["in".into()], vec!["GateOut".into()]).is_err());
        assert!(GateWorker::new(bus, vec![], vec!["GateOut_A_T".into()]).is_err());
    }

    #[test]
    fn path_grows_cumulatively_across_channels() {
        let router = worker(&["GateOut_A_T", "GateOut_B_T"]);
        let plan = plan(router.route(frame(&["WIDE1-1"])));

        assert_eq!(plan.deliveries.len(), 2);
        assert_eq!(plan.deliveries[0].0, "GateOut_A_T");
        assert_eq!(plan.deliveries[0].1.path(), ["WIDE1-1", "A"]);
        assert_eq!(plan.deliveries[1].0, "GateOut_B_T");
        assert_eq!(plan.deliveries[1].1.path(), ["WIDE1-1", "A", "B"]);
        assert_eq!(plan.halted, None);
    }

    #[test]
    fn own_identity_in_path_stops_everything() {
        let router = worker(&["GateOut_W2GMD_IGATE", "GateOut_K6ABC_IGATE"]);
        let plan = plan(router.route(frame(&["WIDE1-1", "W2GMD-10*"])));

        assert!(plan.deliveries.is_empty());
        assert_eq!(
            plan.halted,
            Some(LoopDetected { gate_id: "W2GMD".into(), element: "W2GMD-10*".into() })
        );
    }

    #[test]
    fn loop_later_in_the_list_keeps_earlier_deliveries() {
        let router = worker(&["GateOut_A_T", "GateOut_W2GMD_T", "GateOut_B_T"]);
        let plan = plan(router.route(frame(&["W2GMD"])));

        // A is visited first and only then does the W2GMD check fail
        assert_eq!(plan.deliveries.len(), 1);
        assert_eq!(plan.deliveries[0].1.path(), ["W2GMD", "A"]);
        assert_eq!(plan.halted.unwrap().gate_id, "W2GMD");
    }

    #[test]
    fn repeated_identity_halts_at_second_visit() {
        let router = worker(&["GateOut_A_T1", "GateOut_A_T2"]);
        let plan = plan(router.route(frame(&[])));
        assert_eq!(plan.deliveries.len(), 1);
        assert_eq!(plan.halted.unwrap().element, "A");
    }

    #[test]
    fn substring_match_suppresses() {
        let router = worker(&["GateOut_K6AB_T"]);
        let plan = plan(router.route(frame(&["K6ABC-1"])));
        assert!(plan.deliveries.is_empty());
        assert!(plan.halted.is_some());
    }

    #[test]
    fn rejected_frames_go_nowhere() {
        let router = worker(&["GateOut_A_T"]);
        assert!(matches!(router.route(frame(&["TCPIP*"])), Decision::Rejected(Rejection::Path(_))));
        assert!(matches!(
            router.route(frame(&["WIDE1-1", "qAR", "K6ABC"])),
            Decision::Rejected(Rejection::QConstruct(_))
        ));
    }

    #[tokio::test]
    async fn worker_publishes_routed_frames() {
        let bus = RecordingBus::new();
        let mut out_a = bus.subscribe(&["GateOut_A_T".into()]).await.unwrap();
        let mut out_b = bus.subscribe(&["GateOut_B_T".into()]).await.unwrap();

        let router = GateWorker::new(
            Arc::new(bus.clone()),
            vec!["GateIn_X_T".into()],
            vec!["GateOut_A_T".into(), "GateOut_B_T".into()],
        )
        .unwrap();
        let handle = spawn(router, CancellationToken::new());
        // Let the worker subscribe before publishing
        while bus.subscriber_count("GateIn_X_T") == 0 {
            tokio::task::yield_now().await;
        }

        bus.publish("GateIn_X_T", &frame(&["WIDE1-1"])).await.unwrap();
        assert_eq!(next_frame(&mut out_a).await.path(), ["WIDE1-1", "A"]);
        assert_eq!(next_frame(&mut out_b).await.path(), ["WIDE1-1", "A", "B"]);

        assert_eq!(handle.stop().await, WorkerExit::Cancelled);
    }

    #[tokio::test]
    async fn looped_frame_is_not_published_anywhere() {
        let bus = MemoryBus::new();
        let mut out = bus.subscribe(&["GateOut_W2GMD_IGATE".into()]).await.unwrap();

        let router = GateWorker::new(
            Arc::new(bus.clone()),
            vec!["GateIn_W2GMD_IGATE".into()],
            vec!["GateOut_W2GMD_IGATE".into()],
        )
        .unwrap();
        let handle = spawn(router, CancellationToken::new());
        while bus.subscriber_count("GateIn_W2GMD_IGATE") == 0 {
            tokio::task::yield_now().await;
        }

        bus.publish("GateIn_W2GMD_IGATE", &frame(&["WIDE1-1", "W2GMD"])).await.unwrap();
        bus.publish("GateIn_W2GMD_IGATE", &frame(&["WIDE1-1", "NOGATE"])).await.unwrap();
        assert!(stays_quiet(&mut out, Duration::from_millis(100)).await);

        assert_eq!(handle.stop().await, WorkerExit::Cancelled);
    }

    #[tokio::test]
    async fn undecodable_and_control_messages_are_skipped() {
        let bus = RecordingBus::new();
        let router =
            GateWorker::new(Arc::new(bus.clone()), vec!["GateIn_X_T".into()], vec!["GateOut_X_T".into()])
                .unwrap();

        router.handle_message(BusMessage::message("GateIn_X_T", "garbage")).await.unwrap();
        router
            .handle_message(BusMessage::control(crate::bus::MessageKind::Subscribe, "GateIn_X_T"))
            .await
            .unwrap();
        assert!(bus.published().is_empty());

        router.handle_message(BusMessage::message("GateIn_X_T", "K6ABC>APRS:hi")).await.unwrap();
        assert_eq!(bus.published_to("GateOut_X_T")[0].path(), ["X"]);
    }
}
