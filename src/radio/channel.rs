//! In-process radio backed by tokio channels
//!
//! Lets an embedding application (or a test) act as the radio: frames pushed
//! into the returned sender are "heard", frames transmitted by the gateway come
//! out of the returned receiver.

use tokio::sync::mpsc;

use super::{FrameSink, FrameSource, PathAnnotation, Radio};
use crate::types::Frame;
use crate::{GateError, Result};

/// Create an in-process radio.
///
/// Returns the radio plus the far ends: a sender for frames to be received and
/// a receiver for frames transmitted.
pub fn pair(capacity: usize) -> (Radio, mpsc::Sender<Frame>, mpsc::Receiver<Frame>) {
    let (heard_tx, heard_rx) = mpsc::channel(capacity);
    let (sent_tx, sent_rx) = mpsc::channel(capacity);
    let radio = Radio::new(
        ChannelSource { rx: heard_rx },
        ChannelSink { tx: sent_tx, annotation: PathAnnotation::none() },
    );
    (radio, heard_tx, sent_rx)
}

/// Receiving half of an in-process radio
pub struct ChannelSource {
    rx: mpsc::Receiver<Frame>,
}

#[async_trait::async_trait]
impl FrameSource for ChannelSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.rx.recv().await)
    }
}

/// Transmitting half of an in-process radio
pub struct ChannelSink {
    tx: mpsc::Sender<Frame>,
    annotation: PathAnnotation,
}

impl ChannelSink {
    /// Create a sink directly, with a transport annotation.
    pub fn new(tx: mpsc::Sender<Frame>, annotation: PathAnnotation) -> Self {
        Self { tx, annotation }
    }
}

#[async_trait::async_trait]
impl FrameSink for ChannelSink {
    async fn send(&mut self, frame: &Frame) -> Result<()> {
        self.tx.send(frame.clone()).await.map_err(|_| {
            GateError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "radio receiver dropped"))
        })
    }

    fn annotation(&self) -> PathAnnotation {
        self.annotation.clone()
    }
}
