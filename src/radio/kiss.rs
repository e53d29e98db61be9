//! KISS TNC transport over TCP or a serial port

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, StopBits};
use tracing::{debug, info, trace, warn};

use super::{FrameSink, FrameSource, Radio, ax25};
use crate::types::Frame;
use crate::{GateError, Result};

/// Default TCP port of software TNCs (Dire Wolf, soundmodem)
pub const DEFAULT_TCP_PORT: u16 = 8001;

pub const FEND: u8 = 0xC0;
pub const FESC: u8 = 0xDB;
pub const TFEND: u8 = 0xDC;
pub const TFESC: u8 = 0xDD;

/// Data frame on TNC port 0
const CMD_DATA: u8 = 0x00;

/// Longest escaped frame accepted between two FENDs.
///
/// An AX.25 UI frame is at most 330 bytes; escaping can double that.
pub const MAX_FRAME_LEN: usize = 1024;

/// Wrap a payload in a KISS data frame.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.push(FEND);
    out.push(CMD_DATA);
    for &b in payload {
        match b {
            FEND => out.extend_from_slice(&[FESC, TFEND]),
            FESC => out.extend_from_slice(&[FESC, TFESC]),
            b => out.push(b),
        }
    }
    out.push(FEND);
    out
}

/// Undo KISS escaping on the bytes between two FENDs.
pub fn unescape(raw: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(raw.len());
    let mut bytes = raw.iter();
    while let Some(&b) = bytes.next() {
        if b != FESC {
            out.push(b);
            continue;
        }
        match bytes.next() {
            Some(&TFEND) => out.push(FEND),
            Some(&TFESC) => out.push(FESC),
            other => {
                return Err(GateError::protocol(format!("invalid KISS escape {:?}", other)));
            }
        }
    }
    Ok(out)
}

/// Connect to a KISS TNC listening on TCP.
pub async fn connect_tcp(host: &str, port: u16) -> Result<Radio> {
    let endpoint = format!("{}:{}", host, port);
    info!("Connecting to KISS TNC at {}", endpoint);
    let stream =
        TcpStream::connect(&endpoint).await.map_err(|e| GateError::connection_to(&endpoint, e))?;
    let (read, write) = stream.into_split();
    Ok(Radio::new(KissSource::new(read), KissSink::new(write)))
}

/// Open a KISS TNC on a serial port at `speed` baud, 8N1 without flow control.
pub async fn open_serial(device: &str, speed: u32) -> Result<Radio> {
    info!("Opening KISS TNC on {} at {} baud", device, speed);
    let port = tokio_serial::new(device, speed)
        .data_bits(DataBits::Eight)
        .stop_bits(StopBits::One)
        .parity(Parity::None)
        .flow_control(FlowControl::None)
        .open_native_async()
        .map_err(|e| GateError::Connection {
            endpoint: device.to_string(),
            reason: e.to_string(),
            source: Some(Box::new(e)),
        })?;
    let (read, write) = tokio::io::split(port);
    Ok(Radio::new(KissSource::new(read), KissSink::new(write)))
}

/// Receiving half of a KISS link
pub struct KissSource<R> {
    reader: BufReader<R>,
    /// Bytes of the frame being assembled, kept across cancelled reads
    pending: Vec<u8>,
    /// The frame being assembled exceeded [`MAX_FRAME_LEN`]
    oversized: bool,
}

impl<R: AsyncRead + Unpin + Send + 'static> KissSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader: BufReader::new(reader), pending: Vec::new(), oversized: false }
    }

    /// Read the next KISS data frame payload; `None` at end of stream.
    async fn read_payload(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                return Ok(None);
            }
            let end = available.iter().position(|&b| b == FEND);
            let chunk = &available[..end.unwrap_or(available.len())];
            if self.pending.len() + chunk.len() > MAX_FRAME_LEN {
                self.oversized = true;
                self.pending.clear();
            } else if !self.oversized {
                self.pending.extend_from_slice(chunk);
            }
            let consumed = end.map_or(available.len(), |i| i + 1);
            self.reader.consume(consumed);

            if end.is_none() {
                continue;
            }
            if std::mem::take(&mut self.oversized) {
                warn!("Dropping KISS frame longer than {} bytes", MAX_FRAME_LEN);
                self.pending.clear();
                continue;
            }
            let raw = std::mem::take(&mut self.pending);

            // Back-to-back FENDs delimit nothing
            let Some((&command, body)) = raw.split_first() else { continue };

            if command & 0x0F != CMD_DATA {
                trace!("Ignoring KISS command {:#04x}", command);
                continue;
            }
            match unescape(body) {
                Ok(payload) => return Ok(Some(payload)),
                Err(e) => warn!("Dropping KISS frame: {}", e),
            }
        }
    }
}

#[async_trait::async_trait]
impl<R: AsyncRead + Unpin + Send + 'static> FrameSource for KissSource<R> {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            let Some(payload) = self.read_payload().await? else {
                info!("KISS link closed");
                return Ok(None);
            };
            match ax25::decode(&payload) {
                Ok(frame) => return Ok(Some(frame)),
                Err(e) => debug!("Dropping undecodable AX.25 frame ({} bytes): {}", payload.len(), e),
            }
        }
    }
}

/// Transmitting half of a KISS link
pub struct KissSink<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin + Send + 'static> KissSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

#[async_trait::async_trait]
impl<W: AsyncWrite + Unpin + Send + 'static> FrameSink for KissSink<W> {
    async fn send(&mut self, frame: &Frame) -> Result<()> {
        let payload = ax25::encode(frame)?;
        self.writer.write_all(&encode(&payload)).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_special_bytes() {
        let framed = encode(&[0x01, FEND, FESC, 0x02]);
        assert_eq!(framed, vec![FEND, 0x00, 0x01, FESC, TFEND, FESC, TFESC, 0x02, FEND]);
        assert_eq!(unescape(&framed[2..framed.len() - 1]).unwrap(), vec![0x01, FEND, FESC, 0x02]);
    }

    #[test]
    fn bad_escape_is_an_error() {
        assert!(unescape(&[FESC, 0x01]).is_err());
        assert!(unescape(&[0x01, FESC]).is_err());
    }

    #[tokio::test]
    async fn frames_cross_a_duplex_link() {
        let (tnc, host) = tokio::io::duplex(1024);
        let (host_read, host_write) = tokio::io::split(host);
        let (tnc_read, tnc_write) = tokio::io::split(tnc);

        let mut sink = KissSink::new(tnc_write);
        let mut source = KissSource::new(host_read);
        drop((tnc_read, host_write));

        let frame = Frame::new("W2GMD-9", "APRS", vec!["WIDE1-1".into()], ">kiss test");
        sink.send(&frame).await.unwrap();
        assert_eq!(source.next_frame().await.unwrap(), Some(frame));
    }

    #[tokio::test]
    async fn skips_non_data_commands_and_garbage() {
        let frame = Frame::new("K6ABC", "APRS", vec![], "ok");
        let mut stream = vec![FEND, FEND, 0x06, 0x10, FEND];
        stream.extend(encode(b"\x00\x01not ax25"));
        stream.extend(encode(&ax25::encode(&frame).unwrap()));

        let mut source = KissSource::new(std::io::Cursor::new(stream));
        assert_eq!(source.next_frame().await.unwrap(), Some(frame));
        assert_eq!(source.next_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn noise_without_fend_is_bounded_and_discarded() {
        let frame = Frame::new("K6ABC", "APRS", vec![], "after noise");
        let mut stream = vec![FEND];
        stream.extend(std::iter::repeat_n(0x41, MAX_FRAME_LEN * 20));
        stream.extend(encode(&ax25::encode(&frame).unwrap()));

        let mut source = KissSource::new(std::io::Cursor::new(stream));
        assert_eq!(source.next_frame().await.unwrap(), Some(frame));
        assert!(source.pending.is_empty());
        assert_eq!(source.next_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn missing_serial_port_is_a_connection_error() {
        let err = open_serial("/dev/aprsgate-no-such-tty", 9600).await.err().unwrap();
        assert!(matches!(err, GateError::Connection { .. }));
        assert!(err.to_string().contains("/dev/aprsgate-no-such-tty"));
    }
}
