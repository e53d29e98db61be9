//! APRS-IS client over TCP

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, info, trace, warn};

use super::{FrameSink, FrameSource, PathAnnotation, Radio};
use crate::types::Frame;
use crate::{GateError, Result};

/// Default APRS-IS filtered port
pub const DEFAULT_PORT: u16 = 14580;

/// Default APRS-IS server rotation
pub const DEFAULT_HOST: &str = "rotate.aprs2.net";

/// q-construct for packets gated from RF by a verified station
pub const GATED_FROM_RF: &str = "qAR";

/// APRS-IS connection parameters
#[derive(Debug, Clone)]
pub struct AprsIsSettings {
    pub host: String,
    pub port: u16,
    pub callsign: String,
    pub passcode: String,
    /// Server side filter, e.g. `r/37.76/-122.49/50`
    pub filter: Option<String>,
}

impl AprsIsSettings {
    pub fn new(callsign: impl Into<String>, passcode: impl Into<String>) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            callsign: callsign.into(),
            passcode: passcode.into(),
            filter: None,
        }
    }

    /// The `user ... pass ... vers ...` login line
    pub fn login_line(&self) -> String {
        let mut line = format!(
            "user {} pass {} vers aprsgate {}",
            self.callsign,
            self.passcode,
            env!("CARGO_PKG_VERSION")
        );
        if let Some(filter) = &self.filter {
            line.push_str(" filter ");
            line.push_str(filter);
        }
        line.push_str("\r\n");
        line
    }
}

/// Connect and log in, returning both halves.
pub async fn connect(settings: &AprsIsSettings) -> Result<Radio> {
    let endpoint = format!("{}:{}", settings.host, settings.port);
    info!("Connecting to APRS-IS at {}", endpoint);

    let stream =
        TcpStream::connect(&endpoint).await.map_err(|e| GateError::connection_to(&endpoint, e))?;
    let (read, mut write) = stream.into_split();

    write.write_all(settings.login_line().as_bytes()).await?;
    debug!("Sent APRS-IS login for {}", settings.callsign);

    Ok(Radio::new(
        AprsIsSource { reader: BufReader::new(read) },
        AprsIsSink { writer: write, callsign: settings.callsign.clone() },
    ))
}

/// Receiving half of an APRS-IS connection
pub struct AprsIsSource {
    reader: BufReader<OwnedReadHalf>,
}

#[async_trait::async_trait]
impl FrameSource for AprsIsSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut raw = Vec::new();
        loop {
            raw.clear();
            if self.reader.read_until(b'\n', &mut raw).await? == 0 {
                info!("APRS-IS server closed the connection");
                return Ok(None);
            }

            // Latin-1 and other non UTF-8 payloads are common on APRS-IS
            let line = String::from_utf8_lossy(&raw);
            let text = line.trim_end_matches(['\r', '\n']);
            if text.is_empty() {
                continue;
            }
            if text.starts_with('#') {
                trace!("Server: {}", text);
                continue;
            }

            match text.parse::<Frame>() {
                Ok(frame) => return Ok(Some(frame)),
                Err(e) => warn!("Dropping undecodable APRS-IS line \"{}\": {}", text, e),
            }
        }
    }
}

/// Transmitting half of an APRS-IS connection
pub struct AprsIsSink {
    writer: OwnedWriteHalf,
    callsign: String,
}

#[async_trait::async_trait]
impl FrameSink for AprsIsSink {
    async fn send(&mut self, frame: &Frame) -> Result<()> {
        let line = format!("{}\r\n", frame);
        self.writer.write_all(line.as_bytes()).await?;
        Ok(())
    }

    fn annotation(&self) -> PathAnnotation {
        PathAnnotation::new(vec![GATED_FROM_RF.to_string(), self.callsign.clone()])
    }
}
