//! Beacon scheduler: plain and satellite-pass-gated beacons

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{debug, info};

use super::{Worker, publish_all};
use crate::bus::Bus;
use crate::predict::{PassPredictor, Qth, Tle};
use crate::types::Frame;
use crate::{GateError, Result};

/// Default interval between plain beacons.
pub const BEACON_INTERVAL: Duration = Duration::from_secs(600);

/// Default interval between satellite beacon checks.
pub const SAT_BEACON_INTERVAL: Duration = Duration::from_secs(60);

/// Restricts a beacon to predicted satellite passes.
pub struct PassGate {
    pub predictor: Arc<dyn PassPredictor>,
    pub tle: Tle,
    pub qth: Qth,
}

impl PassGate {
    /// Whether a pass is in progress at `now`.
    pub fn is_open(&self, now: SystemTime) -> Result<bool> {
        match self.predictor.next_pass(&self.tle, &self.qth, now)? {
            Some(pass) if pass.contains(now) => Ok(true),
            Some(pass) => {
                let wait = pass.start.duration_since(now).unwrap_or_default();
                debug!("Outside pass window, next pass in {}s", wait.as_secs());
                Ok(false)
            }
            None => {
                debug!("No upcoming pass predicted");
                Ok(false)
            }
        }
    }
}

/// Publishes a fixed frame to fixed channels on a timer.
///
/// The first tick fires immediately, later ones after a plain sleep of the
/// period (drift is not corrected). With a [`PassGate`] the frame is only
/// published while a pass is in progress; ticks outside the window are skipped.
pub struct Beacon {
    bus: Arc<dyn Bus>,
    channels: Vec<String>,
    frame: Frame,
    period: Duration,
    gate: Option<PassGate>,
    armed: bool,
}

impl Beacon {
    /// Unconditional beacon.
    pub fn new(bus: Arc<dyn Bus>, channels: Vec<String>, frame: Frame, period: Duration) -> Result<Self> {
        if period.is_zero() {
            return Err(GateError::Config("beacon interval must be positive".into()));
        }
        Ok(Self { bus, channels, frame, period, gate: None, armed: false })
    }

    /// Beacon that only transmits during predicted passes.
    pub fn satellite(
        bus: Arc<dyn Bus>,
        channels: Vec<String>,
        frame: Frame,
        period: Duration,
        gate: PassGate,
    ) -> Result<Self> {
        let mut beacon = Self::new(bus, channels, frame, period)?;
        beacon.gate = Some(gate);
        Ok(beacon)
    }
}

#[async_trait::async_trait]
impl Worker for Beacon {
    type Event = ();

    fn name(&self) -> String {
        let kind = if self.gate.is_some() { "SatBeacon" } else { "GateBeacon" };
        format!("{}{:?}", kind, self.channels)
    }

    async fn next_event(&mut self) -> Result<Option<()>> {
        if self.armed {
            tokio::time::sleep(self.period).await;
        }
        self.armed = true;
        Ok(Some(()))
    }

    async fn handle(&mut self, _: ()) -> Result<()> {
        if let Some(gate) = &self.gate {
            if !gate.is_open(SystemTime::now())? {
                return Ok(());
            }
        }

        info!("Putting frame=\"{}\"", self.frame);
        publish_all(&self.bus, &self.channels, &self.frame).await
    }
}
