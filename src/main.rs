//! aprsgate CLI
//!
//! One subcommand per gateway role; every role builds a [`GatewayConfig`] and
//! runs it until Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! # Relay a KISS TNC to and from the bus
//! aprsgate kiss-serial --callsign W2GMD --device /dev/ttyUSB0 --speed 9600 --tag RF
//!
//! # Transmit frames queued for APRS-IS
//! aprsgate tcp --callsign W2GMD --passcode 12345 --tag IGATE --direction out
//!
//! # Route RF traffic to APRS-IS
//! aprsgate worker --inbound GateIn_W2GMD_RF --outbound GateOut_W2GMD_IGATE
//!
//! # Everything from one file
//! aprsgate run --config aprsgate.toml
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use tracing::{info, warn};

use aprsgate::config::{BeaconConfig, GatewayConfig, RadioConfig, RadioEntry, SatelliteConfig, WorkerConfig};
use aprsgate::predict::{DEFAULT_QTH, ISS_TLE, PassSpec, Qth};
use aprsgate::radio::{aprsis, kiss};
use aprsgate::{gateway, logging};

/// APRS packet gateway
#[derive(Parser, Debug)]
#[command(name = "aprsgate")]
#[command(about = "APRS gateway relaying packets between radios and a pub/sub bus")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides it
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Common {
    /// Gateway callsign
    #[arg(short, long)]
    callsign: String,

    /// Bus address (redis://host:port or memory://)
    #[arg(short, long, default_value = "redis://127.0.0.1:6379")]
    bus: String,

    /// Channel tag
    #[arg(short, long)]
    tag: Option<String>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RelayDirection {
    /// Heard frames to the bus and bus frames to the radio
    Both,
    /// Heard frames to the bus only
    In,
    /// Bus frames to the radio only
    Out,
}

impl RelayDirection {
    fn flags(self) -> (bool, bool) {
        match self {
            RelayDirection::Both => (true, true),
            RelayDirection::In => (true, false),
            RelayDirection::Out => (false, true),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Relay an APRS-IS connection
    Tcp {
        #[command(flatten)]
        common: Common,
        #[arg(short, long)]
        passcode: String,
        #[arg(long, default_value = aprsis::DEFAULT_HOST)]
        host: String,
        #[arg(short = 'P', long, default_value_t = aprsis::DEFAULT_PORT)]
        port: u16,
        /// Server side filter
        #[arg(long)]
        filter: Option<String>,
        #[arg(long, value_enum, default_value = "both")]
        direction: RelayDirection,
    },

    /// Relay a KISS TNC on a serial port
    KissSerial {
        #[command(flatten)]
        common: Common,
        #[arg(short, long)]
        device: String,
        /// Line speed in baud
        #[arg(short, long)]
        speed: u32,
        #[arg(long, value_enum, default_value = "both")]
        direction: RelayDirection,
    },

    /// Relay a KISS TNC reachable over TCP
    KissTcp {
        #[command(flatten)]
        common: Common,
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(short = 'P', long, default_value_t = kiss::DEFAULT_TCP_PORT)]
        port: u16,
        #[arg(long, value_enum, default_value = "both")]
        direction: RelayDirection,
    },

    /// Route frames from inbound to outbound channels
    Worker {
        /// Bus address (redis://host:port or memory://)
        #[arg(short, long, default_value = "redis://127.0.0.1:6379")]
        bus: String,
        /// Inbound channels (comma-separated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        inbound: Vec<String>,
        /// Outbound channels (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        outbound: Vec<String>,
    },

    /// Publish a fixed frame periodically
    Beacon {
        #[command(flatten)]
        beacon: BeaconArgs,
    },

    /// Publish a fixed frame periodically during satellite passes
    Satbeacon {
        #[command(flatten)]
        beacon: BeaconArgs,
        /// TOML file with `passes = [{ start = <unix secs>, duration_secs = <n> }]`
        #[arg(long)]
        passes: PathBuf,
        /// Element set file (defaults to the ISS)
        #[arg(long)]
        tle: Option<PathBuf>,
        #[arg(long, default_value_t = DEFAULT_QTH.latitude)]
        latitude: f64,
        #[arg(long, default_value_t = DEFAULT_QTH.longitude)]
        longitude: f64,
        #[arg(long, default_value_t = DEFAULT_QTH.altitude_m)]
        altitude: f64,
    },

    /// Run everything a configuration file describes
    Run {
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Generate an example configuration file
    GenConfig {
        #[arg(short, long, default_value = "aprsgate.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Args, Debug)]
struct BeaconArgs {
    /// Bus address (redis://host:port or memory://)
    #[arg(short, long, default_value = "redis://127.0.0.1:6379")]
    bus: String,
    /// Frame in SRC>DST,PATH:text form
    #[arg(short, long)]
    frame: String,
    /// Channels to publish on (comma-separated)
    #[arg(long, value_delimiter = ',', required = true)]
    channels: Vec<String>,
    /// Seconds between beacons
    #[arg(short, long)]
    interval: Option<u64>,
}

#[derive(Deserialize)]
struct PassFile {
    passes: Vec<PassSpec>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.command {
        Command::GenConfig { output } => {
            logging::init(cli.log_level.as_deref().unwrap_or("info"));
            return gen_config(output);
        }
        Command::Validate { config } => {
            logging::init(cli.log_level.as_deref().unwrap_or("info"));
            let config = GatewayConfig::from_file(&config)
                .with_context(|| format!("{} is not a valid configuration", config.display()))?;
            println!(
                "Configuration valid: {} radios, {} workers, {} beacons",
                config.radios.len(),
                config.workers.len(),
                config.beacons.len()
            );
            return Ok(());
        }
        command => build_config(command)?,
    };

    logging::init(cli.log_level.as_deref().unwrap_or(&config.log_level));
    info!("aprsgate v{} for {}", env!("CARGO_PKG_VERSION"), config.callsign);

    let supervisor = gateway::assemble(&config).await.context("failed to start gateway")?;
    let report = supervisor
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Cannot listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("Gateway stopped ({:?})", report.cause);
    for (name, exit) in &report.exits {
        match exit {
            Some(exit) => info!("  {}: {}", name, exit),
            None => warn!("  {}: aborted", name),
        }
    }

    Ok(())
}

fn build_config(command: Command) -> anyhow::Result<GatewayConfig> {
    let config = match command {
        Command::Tcp { common, passcode, host, port, filter, direction } => {
            radio_config(common, direction, RadioConfig::AprsIs { host, port, passcode, filter })
        }
        Command::KissSerial { common, device, speed, direction } => {
            radio_config(common, direction, RadioConfig::KissSerial { device, speed })
        }
        Command::KissTcp { common, host, port, direction } => {
            radio_config(common, direction, RadioConfig::KissTcp { host, port })
        }
        Command::Worker { bus, inbound, outbound } => {
            let callsign = identity(&inbound)?;
            let mut config = GatewayConfig::new(callsign);
            config.bus.address = bus;
            config.workers.push(WorkerConfig { inbound, outbound });
            config
        }
        Command::Beacon { beacon } => beacon_config(beacon, None)?,
        Command::Satbeacon { beacon, passes, tle, latitude, longitude, altitude } => {
            let passes: PassFile = toml::from_str(
                &std::fs::read_to_string(&passes)
                    .with_context(|| format!("cannot read {}", passes.display()))?,
            )?;
            let tle = match tle {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("cannot read {}", path.display()))?,
                None => ISS_TLE.to_string(),
            };
            let satellite = SatelliteConfig {
                tle,
                qth: Qth { latitude, longitude, altitude_m: altitude },
                passes: passes.passes,
            };
            beacon_config(beacon, Some(satellite))?
        }
        Command::Run { config } => GatewayConfig::from_file(&config)
            .with_context(|| format!("cannot load {}", config.display()))?,
        Command::GenConfig { .. } | Command::Validate { .. } => anyhow::bail!("not a gateway role"),
    };

    config.validate()?;
    Ok(config)
}

fn radio_config(common: Common, direction: RelayDirection, transport: RadioConfig) -> GatewayConfig {
    let (ingress, egress) = direction.flags();
    let mut config = GatewayConfig::new(common.callsign);
    config.bus.address = common.bus;
    config.tag = common.tag;
    config.radios.push(RadioEntry { ingress, egress, tag: None, transport });
    config
}

fn beacon_config(args: BeaconArgs, satellite: Option<SatelliteConfig>) -> anyhow::Result<GatewayConfig> {
    let callsign = identity(&args.channels)?;
    let mut config = GatewayConfig::new(callsign);
    config.bus.address = args.bus;
    config.beacons.push(BeaconConfig {
        frame: args.frame,
        channels: args.channels,
        interval_secs: args.interval,
        satellite,
    });
    Ok(config)
}

/// Gateway identity for roles that are not bound to one radio.
fn identity(channels: &[String]) -> anyhow::Result<String> {
    let first = channels.first().context("at least one channel is required")?;
    Ok(aprsgate::types::gate_id(first)?.to_string())
}

fn gen_config(output: PathBuf) -> anyhow::Result<()> {
    let toml_str = GatewayConfig::example().to_toml()?;
    let content = format!("# aprsgate configuration\n# Generated by aprsgate gen-config\n\n{}", toml_str);
    std::fs::write(&output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}
