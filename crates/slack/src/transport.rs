use async_trait::async_trait;
use herald_core::OutboundSend;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport send failed: {0}")]
    Send(String),
    #[error("transport rejected the payload: {0}")]
    Rejected(String),
}

/// Opaque reference to a delivered message. The real client returns the
/// channel and timestamp the platform assigned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageRef {
    pub channel: String,
    pub ts: Option<String>,
}

/// Outbound boundary of the engine. The HTTP client behind it is the
/// caller's business; the engine only ever issues these two calls.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(
        &self,
        channel: &str,
        text: &str,
        blocks: Option<&[Value]>,
        thread_id: Option<&str>,
    ) -> Result<MessageRef, TransportError>;

    async fn send_ephemeral(
        &self,
        channel: &str,
        user: &str,
        text: &str,
        blocks: Option<&[Value]>,
    ) -> Result<MessageRef, TransportError>;
}

/// Swallows sends. Stands in wherever no real chat client is wired up.
#[derive(Default)]
pub struct NoopTransport;

#[async_trait]
impl ChatTransport for NoopTransport {
    async fn send_message(
        &self,
        channel: &str,
        _text: &str,
        _blocks: Option<&[Value]>,
        _thread_id: Option<&str>,
    ) -> Result<MessageRef, TransportError> {
        Ok(MessageRef { channel: channel.to_owned(), ts: None })
    }

    async fn send_ephemeral(
        &self,
        channel: &str,
        _user: &str,
        _text: &str,
        _blocks: Option<&[Value]>,
    ) -> Result<MessageRef, TransportError> {
        Ok(MessageRef { channel: channel.to_owned(), ts: None })
    }
}

/// Records every send instead of delivering it, in order.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<OutboundSend>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<OutboundSend> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_message(
        &self,
        channel: &str,
        text: &str,
        blocks: Option<&[Value]>,
        thread_id: Option<&str>,
    ) -> Result<MessageRef, TransportError> {
        let mut sent = self.sent.lock().await;
        sent.push(OutboundSend::Message {
            channel: channel.to_owned(),
            text: text.to_owned(),
            blocks: blocks.map(<[Value]>::to_vec),
            thread_id: thread_id.map(str::to_owned),
        });
        Ok(MessageRef { channel: channel.to_owned(), ts: Some(format!("{}.000000", sent.len())) })
    }

    async fn send_ephemeral(
        &self,
        channel: &str,
        user: &str,
        text: &str,
        blocks: Option<&[Value]>,
    ) -> Result<MessageRef, TransportError> {
        let mut sent = self.sent.lock().await;
        sent.push(OutboundSend::Ephemeral {
            channel: channel.to_owned(),
            user: user.to_owned(),
            text: text.to_owned(),
            blocks: blocks.map(<[Value]>::to_vec),
        });
        Ok(MessageRef { channel: channel.to_owned(), ts: Some(format!("{}.000000", sent.len())) })
    }
}
