//! Long-running gateway workers
//!
//! Every worker (relays, routing worker, beacons) implements [`Worker`]: a
//! cancellable wait for the next unit of work plus a handler that processes it.
//! [`run`] drives the loop: the wait is raced against the cancellation token,
//! the handler always runs to completion, so a stop request takes effect at the
//! next iteration boundary without waiting for more traffic.

mod beacon;
mod egress;
mod ingress;
mod router;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::Result;
use crate::bus::Bus;
use crate::types::Frame;

pub use beacon::{BEACON_INTERVAL, Beacon, PassGate, SAT_BEACON_INTERVAL};
pub use egress::GateOut;
pub use ingress::GateIn;
pub use router::{Decision, GateWorker, LoopDetected, RoutePlan};

/// Consecutive failures after which a worker gives up.
pub const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Lifecycle of a worker task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Running,
    Stopping,
    Stopped,
}

/// How a worker task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Its source ran dry (link or subscription closed)
    Finished,
    /// Stopped on request
    Cancelled,
    /// Gave up after an error
    Failed(String),
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerExit::Finished => f.write_str("finished"),
            WorkerExit::Cancelled => f.write_str("cancelled"),
            WorkerExit::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// A unit of long-running gateway work
#[async_trait::async_trait]
pub trait Worker: Send + 'static {
    /// One unit of work, e.g. a frame heard or a bus message
    type Event: Send;

    /// Human readable name used in logs
    fn name(&self) -> String;

    /// Called once before the loop starts (subscribe, arm timers).
    async fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Wait for the next event.
    ///
    /// Returns `Ok(None)` when the worker has nothing more to do. This future
    /// is dropped when a stop is requested, so it must be cancel safe.
    async fn next_event(&mut self) -> Result<Option<Self::Event>>;

    /// Process one event. Never interrupted by a stop request.
    async fn handle(&mut self, event: Self::Event) -> Result<()>;
}

/// Handle to a worker spawned with [`spawn`]
pub struct WorkerHandle {
    pub name: String,
    pub state: watch::Receiver<WorkerState>,
    pub cancel: CancellationToken,
    pub join: JoinHandle<WorkerExit>,
}

impl WorkerHandle {
    /// Current lifecycle state
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Request a stop and wait for the task to end.
    pub async fn stop(self) -> WorkerExit {
        self.cancel.cancel();
        self.join.await.unwrap_or_else(|e| WorkerExit::Failed(format!("task panicked: {}", e)))
    }
}

/// Spawn a worker on the current runtime.
pub fn spawn<W: Worker>(worker: W, cancel: CancellationToken) -> WorkerHandle {
    let (state_tx, state_rx) = watch::channel(WorkerState::Created);
    let name = worker.name();
    let span = info_span!("worker", name = %name);
    let join = tokio::spawn(run(worker, cancel.clone(), state_tx).instrument(span));
    WorkerHandle { name, state: state_rx, cancel, join }
}

/// Drive a worker until it finishes, fails or is cancelled.
pub async fn run<W: Worker>(
    mut worker: W,
    cancel: CancellationToken,
    state: watch::Sender<WorkerState>,
) -> WorkerExit {
    let name = worker.name();
    let _ = state.send(WorkerState::Running);
    info!("Running {}", name);

    let exit = tokio::select! {
        _ = cancel.cancelled() => Some(WorkerExit::Cancelled),
        result = worker.start() => result.err().map(|e| {
            error!("{} failed to start: {}", name, e);
            WorkerExit::Failed(e.to_string())
        }),
    };

    let exit = match exit {
        Some(exit) => exit,
        None => event_loop(&mut worker, &name, &cancel, &state).await,
    };

    let _ = state.send(WorkerState::Stopping);
    info!("{} stopped ({})", name, exit);
    let _ = state.send(WorkerState::Stopped);
    exit
}

async fn event_loop<W: Worker>(
    worker: &mut W,
    name: &str,
    cancel: &CancellationToken,
    state: &watch::Sender<WorkerState>,
) -> WorkerExit {
    let mut error_count = 0u32;

    loop {
        if cancel.is_cancelled() {
            return WorkerExit::Cancelled;
        }

        let event = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("{} cancelled while waiting", name);
                return WorkerExit::Cancelled;
            }
            event = worker.next_event() => event,
        };

        let result = match event {
            Ok(Some(event)) => {
                // A stop request is noted but the handler runs to completion
                let handling = worker.handle(event);
                tokio::pin!(handling);
                tokio::select! {
                    result = &mut handling => result,
                    _ = cancel.cancelled() => {
                        debug!("{} stopping after the current event", name);
                        let _ = state.send(WorkerState::Stopping);
                        handling.await
                    }
                }
            }
            Ok(None) => {
                info!("{} has no more work", name);
                return WorkerExit::Finished;
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => error_count = 0,
            Err(e) => {
                error_count += 1;
                error!("{} error ({}/{}): {}", name, error_count, MAX_CONSECUTIVE_ERRORS, e);

                if error_count >= MAX_CONSECUTIVE_ERRORS {
                    error!("Too many errors in {}, giving up", name);
                    return WorkerExit::Failed(e.to_string());
                }

                // Exponential backoff: 100ms, 200ms, 400ms, ... capped at 1.6s
                let backoff = Duration::from_millis(50 * (1 << error_count.min(5)));
                tokio::select! {
                    _ = cancel.cancelled() => return WorkerExit::Cancelled,
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }
    }
}

/// Publish a frame to every channel, attempting all of them even if some fail.
///
/// Returns the first failure.
pub(crate) async fn publish_all(bus: &Arc<dyn Bus>, channels: &[String], frame: &Frame) -> Result<()> {
    let mut first_error = None;
    for channel in channels {
        debug!("Sending to channel={} frame=\"{}\"", channel, frame);
        if let Err(e) = bus.publish(channel, frame).await {
            warn!("Publish to {} failed: {}", channel, e);
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GateError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Notify;

    /// Yields `events` then waits forever; fails on event values of zero.
    struct Scripted {
        events: Vec<u32>,
        handled: Arc<AtomicU32>,
    }

    #[async_trait::async_trait]
    impl Worker for Scripted {
        type Event = u32;

        fn name(&self) -> String {
            "Scripted".into()
        }

        async fn next_event(&mut self) -> Result<Option<u32>> {
            match self.events.pop() {
                Some(event) => Ok(Some(event)),
                None => std::future::pending().await,
            }
        }

        async fn handle(&mut self, event: u32) -> Result<()> {
            if event == 0 {
                return Err(GateError::protocol("zero"));
            }
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Finishes immediately.
    struct Empty;

    #[async_trait::async_trait]
    impl Worker for Empty {
        type Event = ();

        fn name(&self) -> String {
            "Empty".into()
        }

        async fn next_event(&mut self) -> Result<Option<()>> {
            Ok(None)
        }

        async fn handle(&mut self, _: ()) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn stop_interrupts_an_idle_wait() {
        let handled = Arc::new(AtomicU32::new(0));
        let worker = Scripted { events: vec![3, 2, 1], handled: handled.clone() };
        let handle = spawn(worker, CancellationToken::new());

        let mut state = handle.state.clone();
        state.wait_for(|s| *s == WorkerState::Running).await.unwrap();
        while handled.load(Ordering::SeqCst) < 3 {
            tokio::task::yield_now().await;
        }

        let exit = tokio::time::timeout(Duration::from_secs(1), handle.stop()).await.unwrap();
        assert_eq!(exit, WorkerExit::Cancelled);
        assert_eq!(*state.borrow(), WorkerState::Stopped);
    }

    /// Handles a single event, parked until released.
    struct Parked {
        entered: Arc<Notify>,
        release: Arc<Notify>,
        delivered: bool,
    }

    #[async_trait::async_trait]
    impl Worker for Parked {
        type Event = ();

        fn name(&self) -> String {
            "Parked".into()
        }

        async fn next_event(&mut self) -> Result<Option<()>> {
            if self.delivered {
                return std::future::pending().await;
            }
            self.delivered = true;
            Ok(Some(()))
        }

        async fn handle(&mut self, _: ()) -> Result<()> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn stopping_is_visible_while_an_event_is_in_flight() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let worker = Parked { entered: entered.clone(), release: release.clone(), delivered: false };
        let handle = spawn(worker, CancellationToken::new());
        let mut state = handle.state.clone();

        entered.notified().await;
        handle.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), state.wait_for(|s| *s == WorkerState::Stopping))
            .await
            .unwrap()
            .unwrap();
        assert!(!handle.join.is_finished());

        release.notify_one();
        assert_eq!(handle.join.await.unwrap(), WorkerExit::Cancelled);
        assert_eq!(*state.borrow(), WorkerState::Stopped);
    }

    #[tokio::test]
    async fn exhausted_source_finishes() {
        let handle = spawn(Empty, CancellationToken::new());
        assert_eq!(handle.join.await.unwrap(), WorkerExit::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_errors_fail_the_worker() {
        let handled = Arc::new(AtomicU32::new(0));
        let events = vec![0; MAX_CONSECUTIVE_ERRORS as usize];
        let handle = spawn(Scripted { events, handled }, CancellationToken::new());
        assert!(matches!(handle.join.await.unwrap(), WorkerExit::Failed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_the_error_count() {
        let handled = Arc::new(AtomicU32::new(0));
        let mut events = vec![0; MAX_CONSECUTIVE_ERRORS as usize - 1];
        events.push(7);
        events.extend(vec![0; MAX_CONSECUTIVE_ERRORS as usize - 1]);
        let handle = spawn(Scripted { events, handled: handled.clone() }, CancellationToken::new());

        // Both error runs stay below the limit, so the worker ends up idle
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(handled.load(Ordering::SeqCst), 1);
        assert!(!handle.join.is_finished());
        handle.cancel.cancel();
        assert_eq!(handle.join.await.unwrap(), WorkerExit::Cancelled);
    }
}
