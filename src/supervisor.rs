//! Lifecycle supervisor
//!
//! Starts every worker in one [`JoinSet`], waits until either the shutdown
//! future resolves (Ctrl+C in the binary) or any worker exits, then cancels the
//! rest and waits for them to finish their current iteration.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};

use crate::worker::{self, Worker, WorkerExit, WorkerState};

/// How long stopped workers get to finish before being aborted.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

type WorkerFuture = Pin<Box<dyn Future<Output = WorkerExit> + Send>>;

struct Pending {
    name: String,
    future: WorkerFuture,
}

/// Why the supervisor started shutting down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownCause {
    /// The shutdown future resolved (operator interrupt)
    Requested,
    /// A worker exited on its own
    WorkerExited(String),
    /// Nothing was registered
    NoWorkers,
}

/// Outcome of a supervised run
#[derive(Debug, Clone)]
pub struct SupervisorReport {
    pub cause: ShutdownCause,
    /// `(worker name, exit)` in registration order; `None` if the task
    /// panicked or had to be aborted
    pub exits: Vec<(String, Option<WorkerExit>)>,
}

impl SupervisorReport {
    /// Whether every worker ended by cancellation or a clean finish.
    pub fn is_clean(&self) -> bool {
        self.exits.iter().all(|(_, exit)| matches!(exit, Some(WorkerExit::Cancelled | WorkerExit::Finished)))
    }
}

/// Runs a set of workers as one unit.
pub struct Supervisor {
    cancel: CancellationToken,
    pending: Vec<Pending>,
    states: Vec<watch::Receiver<WorkerState>>,
    grace: Duration,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            pending: Vec::new(),
            states: Vec::new(),
            grace: DEFAULT_GRACE,
        }
    }

    /// Set the shutdown grace period.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Register a worker. Nothing runs until [`Supervisor::run_until`].
    pub fn add<W: Worker>(&mut self, worker: W) -> watch::Receiver<WorkerState> {
        let (state_tx, state_rx) = watch::channel(WorkerState::Created);
        let name = worker.name();
        let cancel = self.cancel.child_token();
        self.pending.push(Pending { name, future: Box::pin(worker::run(worker, cancel, state_tx)) });
        self.states.push(state_rx.clone());
        state_rx
    }

    /// Number of registered workers
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Run all workers until `shutdown` resolves or one of them exits.
    pub async fn run_until<F>(self, shutdown: F) -> SupervisorReport
    where
        F: Future<Output = ()> + Send,
    {
        let names: Vec<String> = self.pending.iter().map(|p| p.name.clone()).collect();
        let mut exits: Vec<Option<WorkerExit>> = vec![None; names.len()];

        if names.is_empty() {
            warn!("No workers to run");
            return SupervisorReport { cause: ShutdownCause::NoWorkers, exits: Vec::new() };
        }

        let mut set = JoinSet::new();
        for (index, pending) in self.pending.into_iter().enumerate() {
            let span = info_span!("worker", name = %pending.name);
            set.spawn(async move { (index, pending.future.await) }.instrument(span));
        }
        info!("Started {} workers", names.len());

        tokio::pin!(shutdown);
        let cause = tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                ShutdownCause::Requested
            }
            Some(joined) = set.join_next() => {
                let name = match joined {
                    Ok((index, exit)) => {
                        warn!("{} exited unexpectedly ({})", names[index], exit);
                        let name = names[index].clone();
                        exits[index] = Some(exit);
                        name
                    }
                    Err(e) => {
                        warn!("Worker task ended abnormally: {}", e);
                        "unknown".to_string()
                    }
                };
                ShutdownCause::WorkerExited(name)
            }
        };

        info!("Stopping all workers");
        self.cancel.cancel();

        let drained = tokio::time::timeout(self.grace, async {
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((index, exit)) => exits[index] = Some(exit),
                    Err(e) => warn!("Worker task ended abnormally: {}", e),
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!("Workers still running after {:?}, aborting", self.grace);
            set.abort_all();
            while set.join_next().await.is_some() {}
        }

        for (name, state) in names.iter().zip(&self.states) {
            if *state.borrow() != WorkerState::Stopped {
                warn!("{} did not stop cleanly", name);
            }
        }

        let exits = names.into_iter().zip(exits).collect();
        SupervisorReport { cause, exits }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;
    use crate::test_utils::RecordingBus;
    use crate::types::Frame;
    use crate::worker::{Beacon, GateIn, GateWorker};
    use crate::{Result, radio::channel};
    use std::sync::Arc;

    /// Never produces anything and ignores nothing: only cancellation ends it.
    struct Idle;

    #[async_trait::async_trait]
    impl Worker for Idle {
        type Event = ();

        fn name(&self) -> String {
            "Idle".into()
        }

        async fn next_event(&mut self) -> Result<Option<()>> {
            std::future::pending().await
        }

        async fn handle(&mut self, _: ()) -> Result<()> {
            Ok(())
        }
    }

    /// Blocks in its handler far longer than any grace period.
    struct Stuck;

    #[async_trait::async_trait]
    impl Worker for Stuck {
        type Event = ();

        fn name(&self) -> String {
            "Stuck".into()
        }

        async fn next_event(&mut self) -> Result<Option<()>> {
            Ok(Some(()))
        }

        async fn handle(&mut self, _: ()) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn interrupt_stops_idle_workers() {
        let mut supervisor = Supervisor::new();
        let bus = Arc::new(MemoryBus::new());
        supervisor.add(Idle);
        supervisor.add(GateWorker::new(bus, vec!["GateIn_X_T".into()], vec!["GateOut_X_T".into()]).unwrap());
        let state = supervisor.add(Idle);

        let report = supervisor.run_until(tokio::time::sleep(Duration::from_millis(20))).await;

        assert_eq!(report.cause, ShutdownCause::Requested);
        assert_eq!(report.exits.len(), 3);
        assert!(report.exits.iter().all(|(_, exit)| *exit == Some(WorkerExit::Cancelled)));
        assert!(report.is_clean());
        assert_eq!(*state.borrow(), WorkerState::Stopped);
    }

    #[tokio::test]
    async fn worker_exit_brings_everything_down() {
        let bus = RecordingBus::new();
        let (radio, heard, _sent) = channel::pair(4);
        drop(heard);

        let mut supervisor = Supervisor::new();
        supervisor.add(GateIn::new(radio.source, Arc::new(bus.clone()), vec!["GateIn_X_T".into()]));
        supervisor.add(Idle);

        let report = supervisor.run_until(std::future::pending()).await;

        assert!(matches!(report.cause, ShutdownCause::WorkerExited(ref name) if name.starts_with("GateIn")));
        assert_eq!(report.exits[0].1, Some(WorkerExit::Finished));
        assert_eq!(report.exits[1].1, Some(WorkerExit::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_workers_are_aborted_after_grace() {
        let bus = Arc::new(RecordingBus::new());
        let frame: Frame = "A>B:beacon".parse().unwrap();

        let mut supervisor = Supervisor::new().with_grace(Duration::from_secs(1));
        supervisor.add(Stuck);
        supervisor.add(Beacon::new(bus, vec!["GateOut_X_T".into()], frame, Duration::from_secs(10)).unwrap());

        let report = supervisor.run_until(tokio::time::sleep(Duration::from_millis(10))).await;

        assert_eq!(report.exits[0].1, None);
        assert_eq!(report.exits[1].1, Some(WorkerExit::Cancelled));
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn empty_supervisor_returns_immediately() {
        let report = Supervisor::new().run_until(std::future::pending()).await;
        assert_eq!(report.cause, ShutdownCause::NoWorkers);
    }
}
