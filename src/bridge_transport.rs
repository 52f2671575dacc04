use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::{broadcast, oneshot},
};

use crate::transport::{EventSubscription, Transport, TransportError, TransportKind};

const EVENT_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    id: u64,
    command: &'a str,
    args: &'a Value,
}

/// One line from the shell: either a reply (`id` + `ok`/`error`) or an
/// unsolicited event frame (`event` + `payload`).
#[derive(Debug, Deserialize)]
struct BridgeFrame {
    id: Option<u64>,
    ok: Option<Value>,
    error: Option<String>,
    event: Option<String>,
    payload: Option<Value>,
}

type PendingReply = oneshot::Sender<Result<Value, TransportError>>;

struct BridgeShared {
    pending: Mutex<HashMap<u64, PendingReply>>,
    events: broadcast::Sender<(String, Value)>,
    closed: AtomicBool,
}

impl BridgeShared {
    fn take_waiter(&self, id: u64) -> Option<PendingReply> {
        match self.pending.lock() {
            Ok(mut guard) => guard.remove(&id),
            Err(poisoned) => poisoned.into_inner().remove(&id),
        }
    }

    fn fail_all_waiters(&self, reason: &str) {
        let waiters: Vec<(u64, PendingReply)> = match self.pending.lock() {
            Ok(mut guard) => guard.drain().collect(),
            Err(poisoned) => poisoned.into_inner().drain().collect(),
        };
        for (_, waiter) in waiters {
            let _ = waiter.send(Err(TransportError::Io(reason.to_string())));
        }
    }
}

/// The desktop shell's command bridge, spoken as JSON lines over a loopback
/// TCP stream. Requests carry a monotonically assigned id; a reader task
/// routes replies to their waiters and event frames to subscribers.
pub struct BridgeTransport {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    shared: Arc<BridgeShared>,
    next_id: AtomicU64,
    invoke_timeout: Duration,
}

impl BridgeTransport {
    pub async fn connect(
        addr: &str,
        probe_timeout_ms: u64,
        invoke_timeout_ms: u64,
    ) -> Result<Self, TransportError> {
        let connect = TcpStream::connect(addr);
        let stream = tokio::time::timeout(Duration::from_millis(probe_timeout_ms), connect)
            .await
            .map_err(|_| {
                TransportError::Unavailable(format!(
                    "bridge endpoint {addr} did not answer within {probe_timeout_ms}ms"
                ))
            })?
            .map_err(|error| {
                TransportError::Unavailable(format!("bridge endpoint {addr} refused: {error}"))
            })?;

        let (read_half, write_half) = stream.into_split();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let shared = Arc::new(BridgeShared {
            pending: Mutex::new(HashMap::new()),
            events,
            closed: AtomicBool::new(false),
        });
        tokio::spawn(read_frames(BufReader::new(read_half), Arc::clone(&shared)));

        Ok(Self {
            writer: tokio::sync::Mutex::new(write_half),
            shared,
            next_id: AtomicU64::new(1),
            invoke_timeout: Duration::from_millis(invoke_timeout_ms),
        })
    }

    fn register_waiter(&self, id: u64) -> oneshot::Receiver<Result<Value, TransportError>> {
        let (sender, receiver) = oneshot::channel();
        match self.shared.pending.lock() {
            Ok(mut guard) => {
                guard.insert(id, sender);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(id, sender);
            }
        }
        receiver
    }
}

#[async_trait]
impl Transport for BridgeTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::NativeBridge
    }

    async fn invoke(&self, command: &str, args: Value) -> Result<Value, TransportError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(TransportError::Io("bridge connection closed".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let reply = self.register_waiter(id);

        let request = BridgeRequest {
            id,
            command,
            args: &args,
        };
        let mut frame = serde_json::to_string(&request)
            .map_err(|error| TransportError::Protocol(format!("unencodable request: {error}")))?;
        frame.push('\n');

        {
            let mut writer = self.writer.lock().await;
            if let Err(error) = writer.write_all(frame.as_bytes()).await {
                self.shared.take_waiter(id);
                return Err(TransportError::Io(format!(
                    "failed to send '{command}': {error}"
                )));
            }
        }

        match tokio::time::timeout(self.invoke_timeout, reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::Io(format!(
                "bridge dropped the reply for '{command}'"
            ))),
            Err(_) => {
                self.shared.take_waiter(id);
                Err(TransportError::Io(format!(
                    "'{command}' timed out after {}ms",
                    self.invoke_timeout.as_millis()
                )))
            }
        }
    }

    fn subscribe(&self, event: &str) -> EventSubscription {
        EventSubscription::new(event, self.shared.events.subscribe())
    }
}

async fn read_frames(mut reader: BufReader<OwnedReadHalf>, shared: Arc<BridgeShared>) {
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => dispatch_frame(line.trim(), &shared),
            Err(error) => {
                tracing::warn!(%error, "bridge read failed");
                break;
            }
        }
    }

    shared.closed.store(true, Ordering::Release);
    shared.fail_all_waiters("bridge connection closed");
}

fn dispatch_frame(line: &str, shared: &BridgeShared) {
    if line.is_empty() {
        return;
    }
    let frame: BridgeFrame = match serde_json::from_str(line) {
        Ok(frame) => frame,
        Err(error) => {
            tracing::warn!(%error, line, "unparseable bridge frame");
            return;
        }
    };

    if let Some(id) = frame.id {
        let result = match frame.error {
            Some(message) => Err(TransportError::Rejected(message)),
            None => Ok(frame.ok.unwrap_or(Value::Null)),
        };
        match shared.take_waiter(id) {
            Some(waiter) => {
                let _ = waiter.send(result);
            }
            // Reply after the caller timed out and walked away.
            None => tracing::debug!(id, "bridge reply without waiter"),
        }
        return;
    }

    if let Some(event) = frame.event {
        let payload = frame.payload.unwrap_or(Value::Null);
        let _ = shared.events.send((event, payload));
        return;
    }

    tracing::debug!(line, "bridge frame carries neither id nor event");
}
