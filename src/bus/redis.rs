//! Redis pub/sub bus

use tokio::io::{AsyncWriteExt, BufReader, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::resp::{RespValue, encode_command, read_value};
use super::{Bus, BusMessage, MessageKind, Subscription};
use crate::types::Frame;
use crate::{GateError, Result};

const DEFAULT_PORT: u16 = 6379;

/// Redis-backed bus
///
/// Publishing shares one connection, reconnecting after a failure. Each
/// subscription gets its own connection since Redis puts a subscribed
/// connection into push mode.
pub struct RedisBus {
    addr: String,
    publisher: Mutex<Option<BufStream<TcpStream>>>,
}

impl RedisBus {
    /// Connect to `redis://host[:port]` or `host[:port]`.
    pub async fn connect(address: &str) -> Result<Self> {
        let addr = parse_address(address)?;
        let stream = open(&addr).await?;
        info!("Connected to Redis bus at {}", addr);
        Ok(Self { addr, publisher: Mutex::new(Some(BufStream::new(stream))) })
    }

    /// Resolved `host:port` of the server
    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn publish_on(
        conn: &mut BufStream<TcpStream>,
        channel: &str,
        payload: &str,
    ) -> Result<usize> {
        let cmd = encode_command(&[b"PUBLISH", channel.as_bytes(), payload.as_bytes()]);
        conn.write_all(&cmd).await?;
        conn.flush().await?;

        match read_value(conn).await? {
            Some(RespValue::Integer(n)) => Ok(n.max(0) as usize),
            Some(RespValue::Error(e)) => Err(GateError::bus(channel, e)),
            Some(other) => Err(GateError::protocol(format!("unexpected PUBLISH reply {:?}", other))),
            None => Err(GateError::bus(channel, "connection closed")),
        }
    }
}

#[async_trait::async_trait]
impl Bus for RedisBus {
    async fn publish(&self, channel: &str, frame: &Frame) -> Result<usize> {
        let payload = frame.to_string();
        let mut guard = self.publisher.lock().await;

        if guard.is_none() {
            debug!("Reconnecting publisher to {}", self.addr);
            *guard = Some(BufStream::new(open(&self.addr).await?));
        }

        let Some(conn) = guard.as_mut() else {
            return Err(GateError::bus(channel, "no publisher connection"));
        };
        let result = Self::publish_on(conn, channel, &payload).await;
        if let Err(e) = &result {
            if e.is_retryable() {
                warn!("Dropping Redis publisher connection: {}", e);
                *guard = None;
            }
        }
        result
    }

    async fn subscribe(&self, channels: &[String]) -> Result<Box<dyn Subscription>> {
        let mut stream = open(&self.addr).await?;

        let mut args: Vec<&[u8]> = vec![b"SUBSCRIBE"];
        args.extend(channels.iter().map(|c| c.as_bytes()));
        stream.write_all(&encode_command(&args)).await?;

        debug!("Subscribed to {:?} on {}", channels, self.addr);
        Ok(Box::new(RedisSubscription { reader: BufReader::new(stream) }))
    }
}

/// Subscription connection to Redis
pub struct RedisSubscription {
    reader: BufReader<TcpStream>,
}

#[async_trait::async_trait]
impl Subscription for RedisSubscription {
    async fn next_message(&mut self) -> Result<Option<BusMessage>> {
        match read_value(&mut self.reader).await? {
            Some(value) => push_to_message(value).map(Some),
            None => Ok(None),
        }
    }
}

/// Map a pub/sub push (`[kind, channel, payload]`) to a [`BusMessage`].
fn push_to_message(value: RespValue) -> Result<BusMessage> {
    let items = match value {
        RespValue::Array(Some(items)) if items.len() >= 3 => items,
        RespValue::Error(e) => return Err(GateError::protocol(e)),
        other => return Err(GateError::protocol(format!("unexpected push {:?}", other))),
    };

    let kind = match items[0].as_text().as_deref() {
        Some("message") => MessageKind::Message,
        Some("subscribe") => MessageKind::Subscribe,
        Some("unsubscribe") => MessageKind::Unsubscribe,
        _ => MessageKind::Other,
    };
    let channel = items[1].as_text().unwrap_or_default();
    let data = match kind {
        MessageKind::Message => items[2].as_text(),
        _ => None,
    };

    Ok(BusMessage { kind, channel, data })
}

fn parse_address(address: &str) -> Result<String> {
    let host_port = address.strip_prefix("redis://").unwrap_or(address).trim_end_matches('/');
    if host_port.is_empty() {
        return Err(GateError::Config(format!("Empty Redis address: '{}'", address)));
    }
    if host_port.rsplit_once(':').is_some_and(|(_, port)| port.parse::<u16>().is_ok()) {
        Ok(host_port.to_string())
    } else {
        Ok(format!("{}:{}", host_port, DEFAULT_PORT))
    }
}

async fn open(addr: &str) -> Result<TcpStream> {
    TcpStream::connect(addr).await.map_err(|e| GateError::connection_to(addr, e))
}
