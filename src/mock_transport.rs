use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    command_catalog,
    transport::{EventSubscription, Transport, TransportError, TransportKind},
};

const MOCK_VERSION: &str = "1.0.0";

/// Inert last-resort transport for static preview/demo mode. Every call is
/// logged and answered from a canned, non-authoritative catalog so the rest
/// of the panel stays operable for inspection when neither the bridge nor
/// the control plane is reachable.
#[derive(Default)]
pub struct MockTransport {
    invoked: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands invoked so far, in order.
    pub fn invoked_commands(&self) -> Vec<String> {
        match self.invoked.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn canned_response(command: &str) -> Value {
        use command_catalog as cmd;
        match command {
            cmd::PROCESS_STATUS_TEXT => json!("未运行"),
            cmd::ONEBOT_STATUS_TEXT => json!("未连接"),
            cmd::SUBS_SUMMARY_TEXT => json!("0/0"),
            cmd::CALL_ONEBOT_STATUS_API => json!({
                "connected": false,
                "online": false,
                "good": false,
            }),
            cmd::CALL_SUBS_SUMMARY_API => json!({
                "total": 0,
                "active": 0,
                "paused": 0,
                "bySite": {},
            }),
            cmd::HEALTH_CHECK => json!({"status": "healthy", "version": MOCK_VERSION}),
            cmd::READ_CONFIG_FILE => json!(
                "bot:\n  autoReconnect: true\nnotify:\n  interval: 25s\nlogLevel: info\n"
            ),
            cmd::READ_LOGS_TAIL => json!([
                "[INFO] panel backend started",
                "[INFO] loading configuration...",
                "[INFO] ready to accept connections",
            ]),
            cmd::LIST_CONFIG_BACKUPS => json!([]),
            cmd::CHECK_FIREWALL_RULE => json!(true),
            cmd::GET_CURRENT_VERSION => json!(MOCK_VERSION),
            cmd::INSTALLED_VERSION_TEXT => json!("not installed"),
            cmd::GET_ADMIN_PASSWORD => json!("admin123"),
            cmd::UPDATE_CHECK => json!({
                "available": false,
                "latest_version": MOCK_VERSION,
                "release_notes": "",
                "assets": [],
            }),
            _ => Value::Null,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Mock
    }

    async fn invoke(&self, command: &str, args: Value) -> Result<Value, TransportError> {
        tracing::debug!(command, %args, "mock transport invoke");
        match self.invoked.lock() {
            Ok(mut guard) => guard.push(command.to_string()),
            Err(poisoned) => poisoned.into_inner().push(command.to_string()),
        }
        Ok(Self::canned_response(command))
    }

    fn subscribe(&self, event: &str) -> EventSubscription {
        tracing::debug!(event, "mock transport subscribe");
        EventSubscription::inert(event)
    }
}
