//! Gateway assembly
//!
//! Turns a [`GatewayConfig`] into a [`Supervisor`] loaded with every relay,
//! routing worker and beacon it describes.

use std::sync::Arc;

use tracing::info;

use crate::bus::{self, Bus};
use crate::config::{BeaconConfig, GatewayConfig, RadioConfig, RadioEntry};
use crate::predict::{ScheduledPasses, Tle};
use crate::radio::{Radio, aprsis, kiss};
use crate::supervisor::Supervisor;
use crate::types::{Direction, Frame};
use crate::worker::{Beacon, GateIn, GateOut, GateWorker, PassGate};
use crate::{GateError, Result};

/// Connect to the configured bus and build every worker.
pub async fn assemble(config: &GatewayConfig) -> Result<Supervisor> {
    config.validate()?;
    let bus = bus::connect(&config.bus.address).await?;
    assemble_on(config, bus).await
}

/// Build every worker on an already connected bus.
pub async fn assemble_on(config: &GatewayConfig, bus: Arc<dyn Bus>) -> Result<Supervisor> {
    let mut supervisor = Supervisor::new();

    for entry in &config.radios {
        let radio = open_radio(config, entry).await?;
        let heard = config.radio_channel(entry, Direction::GateIn);
        let queued = config.radio_channel(entry, Direction::GateOut);
        if entry.ingress {
            info!("{} relays heard frames to {}", entry.transport.describe(), heard);
        }
        if entry.egress {
            info!("{} transmits frames from {}", entry.transport.describe(), queued);
        }

        match (entry.ingress, entry.egress) {
            (true, true) => {
                supervisor.add(GateIn::new(radio.source, bus.clone(), vec![heard]));
                supervisor.add(GateOut::new(radio.sink, bus.clone(), vec![queued]));
            }
            (true, false) => {
                supervisor.add(GateIn::new(radio.source, bus.clone(), vec![heard]).holding(radio.sink));
            }
            (false, true) => {
                supervisor.add(GateOut::new(radio.sink, bus.clone(), vec![queued]));
            }
            (false, false) => {}
        }
    }

    for worker in &config.workers {
        supervisor.add(GateWorker::new(bus.clone(), worker.inbound.clone(), worker.outbound.clone())?);
    }

    for beacon in &config.beacons {
        supervisor.add(build_beacon(beacon, bus.clone())?);
    }

    Ok(supervisor)
}

/// Open the transport a radio entry describes.
pub async fn open_radio(config: &GatewayConfig, entry: &RadioEntry) -> Result<Radio> {
    match &entry.transport {
        RadioConfig::AprsIs { host, port, passcode, filter } => {
            let settings = aprsis::AprsIsSettings {
                host: host.clone(),
                port: *port,
                callsign: config.callsign.clone(),
                passcode: passcode.clone(),
                filter: filter.clone(),
            };
            aprsis::connect(&settings).await
        }
        RadioConfig::KissTcp { host, port } => kiss::connect_tcp(host, *port).await,
        RadioConfig::KissSerial { device, speed } => kiss::open_serial(device, *speed).await,
    }
}

fn build_beacon(config: &BeaconConfig, bus: Arc<dyn Bus>) -> Result<Beacon> {
    let frame: Frame = config.frame.parse()?;
    let channels = config.channels.clone();

    match &config.satellite {
        None => Beacon::new(bus, channels, frame, config.interval()),
        Some(satellite) => {
            let tle: Tle = satellite.tle.parse()?;
            if satellite.passes.is_empty() {
                return Err(GateError::Config(format!(
                    "satellite beacon for {} has no passes scheduled",
                    tle.catalog_number()
                )));
            }
            let gate = PassGate {
                predictor: Arc::new(ScheduledPasses::from_specs(&satellite.passes)),
                tle,
                qth: satellite.qth,
            };
            Beacon::satellite(bus, channels, frame, config.interval(), gate)
        }
    }
}
