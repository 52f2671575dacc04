use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::runtime_paths;

/// Which backend the process ended up bound to. Picked once at startup and
/// never rebound afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    NativeBridge,
    ControlPlane,
    Mock,
}

impl TransportKind {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::NativeBridge => "native-bridge",
            Self::ControlPlane => "control-plane",
            Self::Mock => "mock",
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// No viable transport at resolution time. Resolution itself degrades to
    /// the mock transport instead of surfacing this; it exists for callers
    /// that probe endpoints directly.
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    /// The operation failed at the bridge/network level.
    #[error("transport failure: {0}")]
    Io(String),
    /// The backend answered, but rejected the operation. Carries the original
    /// response body or status text.
    #[error("backend rejected command: {0}")]
    Rejected(String),
    /// The active transport has no mapping for this command.
    #[error("command '{command}' is not supported on the {kind} transport")]
    Unsupported { kind: &'static str, command: String },
    /// The backend answered with a payload this layer cannot make sense of.
    #[error("malformed transport payload: {0}")]
    Protocol(String),
}

/// Handle for one named backend event stream. Dropping the handle
/// unsubscribes. Transports without a push channel hand out an inert
/// subscription whose [`EventSubscription::next`] never resolves, so
/// listener tasks park instead of spinning on errors.
pub struct EventSubscription {
    event: String,
    receiver: Option<broadcast::Receiver<(String, Value)>>,
}

impl EventSubscription {
    pub fn inert(event: &str) -> Self {
        Self {
            event: event.to_string(),
            receiver: None,
        }
    }

    pub(crate) fn new(event: &str, receiver: broadcast::Receiver<(String, Value)>) -> Self {
        Self {
            event: event.to_string(),
            receiver: Some(receiver),
        }
    }

    pub fn event_name(&self) -> &str {
        &self.event
    }

    /// Next payload pushed for the subscribed event; `None` once the
    /// transport's event channel is gone (bridge connection closed). Skips
    /// payloads for other event names and anything dropped by channel lag.
    pub async fn next(&mut self) -> Option<Value> {
        let receiver = match self.receiver.as_mut() {
            Some(receiver) => receiver,
            None => return std::future::pending().await,
        };

        loop {
            match receiver.recv().await {
                Ok((name, payload)) if name == self.event => return Some(payload),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(event = %self.event, skipped, "event subscription lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Uniform call surface over the native command bridge, the HTTP control
/// plane and the inert mock. Exactly one implementation is active per
/// process; the facade owns it and every operation goes through `invoke`.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Issues one named command with a stable argument object and returns the
    /// backend's raw payload. The payload stays untyped here on purpose: the
    /// status parser is the single boundary where raw data becomes typed.
    async fn invoke(&self, command: &str, args: Value) -> Result<Value, TransportError>;

    fn subscribe(&self, event: &str) -> EventSubscription;

    /// Path-resolution capability of the transport surface.
    fn data_dir(&self) -> PathBuf {
        runtime_paths::panel_data_dir()
    }
}
