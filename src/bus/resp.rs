//! Minimal RESP2 encoding and decoding for the Redis bus

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::{GateError, Result};

/// Upper bound on a bulk string; frames are a few hundred bytes at most.
const MAX_BULK_LEN: usize = 512 * 1024;

/// Upper bound on an array; pub/sub pushes carry three or four items.
const MAX_ARRAY_LEN: usize = 1024;

/// A RESP2 value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
    Array(Option<Vec<RespValue>>),
}

impl RespValue {
    /// Text of a simple or bulk string
    pub fn as_text(&self) -> Option<String> {
        match self {
            RespValue::Simple(s) => Some(s.clone()),
            RespValue::Bulk(Some(bytes)) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }
}

/// Encode a command as an array of bulk strings.
pub fn encode_command(args: &[&[u8]]) -> Vec<u8> {
    let mut out = format!("*{}\r\n", args.len()).into_bytes();
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
    out
}

type ReadFuture<'a> = Pin<Box<dyn Future<Output = Result<Option<RespValue>>> + Send + 'a>>;

/// Read one value. `Ok(None)` means the connection closed cleanly between values.
pub fn read_value<R>(reader: &mut R) -> ReadFuture<'_>
where
    R: AsyncBufRead + Unpin + Send,
{
    Box::pin(async move {
        let mut line = Vec::new();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(None);
        }
        if !line.ends_with(b"\r\n") {
            return Err(GateError::protocol("RESP line not terminated by CRLF"));
        }
        line.truncate(line.len() - 2);

        let (&prefix, rest) =
            line.split_first().ok_or_else(|| GateError::protocol("empty RESP line"))?;
        let rest = String::from_utf8_lossy(rest).into_owned();

        let value = match prefix {
            b'+' => RespValue::Simple(rest),
            b'-' => RespValue::Error(rest),
            b':' => RespValue::Integer(parse_int(&rest)?),
            b'$' => {
                let len = parse_int(&rest)?;
                if len < 0 {
                    RespValue::Bulk(None)
                } else {
                    let len = len as usize;
                    if len > MAX_BULK_LEN {
                        return Err(GateError::protocol(format!("bulk string too large: {}", len)));
                    }
                    let mut buf = vec![0u8; len + 2];
                    reader.read_exact(&mut buf).await?;
                    buf.truncate(len);
                    RespValue::Bulk(Some(buf))
                }
            }
            b'*' => {
                let len = parse_int(&rest)?;
                if len < 0 {
                    RespValue::Array(None)
                } else {
                    let len = len as usize;
                    if len > MAX_ARRAY_LEN {
                        return Err(GateError::protocol(format!("array too large: {}", len)));
                    }
                    let mut items = Vec::with_capacity(len);
                    for _ in 0..len {
                        match read_value(reader).await? {
                            Some(item) => items.push(item),
                            None => return Err(GateError::protocol("connection closed inside array")),
                        }
                    }
                    RespValue::Array(Some(items))
                }
            }
            other => {
                return Err(GateError::protocol(format!("unknown RESP prefix {:?}", other as char)));
            }
        };

        Ok(Some(value))
    })
}

fn parse_int(s: &str) -> Result<i64> {
    s.parse().map_err(|_| GateError::protocol(format!("invalid RESP integer '{}'", s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    async fn decode(input: &[u8]) -> Result<Option<RespValue>> {
        let mut reader = BufReader::new(input);
        read_value(&mut reader).await
    }

    #[test]
    fn encodes_publish() {
        let cmd = encode_command(&[b"PUBLISH", b"GateOut_X_T", b"A>B:hi"]);
        assert_eq!(cmd, b"*3\r\n$7\r\nPUBLISH\r\n$11\r\nGateOut_X_T\r\n$6\r\nA>B:hi\r\n".to_vec());
    }

    #[tokio::test]
    async fn decodes_pubsub_push() {
        let value = decode(b"*3\r\n$7\r\nmessage\r\n$3\r\nchn\r\n$6\r\nA>B:hi\r\n")
            .await
            .unwrap()
            .unwrap();
        let RespValue::Array(Some(items)) = value else { panic!("expected array") };
        assert_eq!(items[0].as_text().as_deref(), Some("message"));
        assert_eq!(items[2], RespValue::Bulk(Some(b"A>B:hi".to_vec())));
    }

    #[tokio::test]
    async fn decodes_scalars() {
        assert_eq!(decode(b":2\r\n").await.unwrap(), Some(RespValue::Integer(2)));
        assert_eq!(decode(b"+OK\r\n").await.unwrap(), Some(RespValue::Simple("OK".into())));
        assert_eq!(decode(b"-ERR bad\r\n").await.unwrap(), Some(RespValue::Error("ERR bad".into())));
        assert_eq!(decode(b"$-1\r\n").await.unwrap(), Some(RespValue::Bulk(None)));
        assert_eq!(decode(b"").await.unwrap(), None);
    }

    #[tokio::test]
    async fn rejects_garbage() {
        assert!(decode(b"?what\r\n").await.is_err());
        assert!(decode(b":notanumber\r\n").await.is_err());
        assert!(decode(b"*2\r\n:1\r\n").await.is_err());
    }

    #[tokio::test]
    async fn oversized_lengths_are_refused_before_allocating() {
        let err = decode(b"*99999999999999\r\n").await.unwrap_err();
        assert!(err.to_string().contains("array too large"));
        let err = decode(b"$99999999999999\r\n").await.unwrap_err();
        assert!(err.to_string().contains("bulk string too large"));
    }
}
