use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use url::Url;

use crate::{
    command_catalog as cmd,
    transport::{EventSubscription, Transport, TransportError, TransportKind},
};

/// The local HTTP control plane, spoken when no native bridge is offered.
/// Every supported command maps 1:1 onto one endpoint; commands that only
/// exist on the desktop shell fail with `Unsupported`, which callers treat
/// as a tolerated partial failure.
pub struct ControlPlaneTransport {
    base: Url,
    client: Client,
}

impl ControlPlaneTransport {
    pub fn new(base: Url, invoke_timeout_ms: u64) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(invoke_timeout_ms))
            .build()
            .map_err(|error| {
                TransportError::Unavailable(format!("control plane client: {error}"))
            })?;
        Ok(Self { base, client })
    }

    fn endpoint(&self, path: &str, query: &[(&str, String)]) -> Result<Url, TransportError> {
        let mut url = self.base.join(path).map_err(|error| {
            TransportError::Protocol(format!("invalid control plane path '{path}': {error}"))
        })?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, TransportError> {
        let url = self.endpoint(path, query)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|error| TransportError::Io(error.to_string()))?;
        read_json_response(response).await
    }

    async fn post_json(&self, path: &str, body: Value) -> Result<Value, TransportError> {
        let url = self.endpoint(path, &[])?;
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|error| TransportError::Io(error.to_string()))?;
        read_json_response(response).await
    }
}

async fn read_json_response(response: reqwest::Response) -> Result<Value, TransportError> {
    let status = response.status();
    if !status.is_success() {
        let reason = response
            .text()
            .await
            .ok()
            .filter(|body| !body.trim().is_empty())
            .unwrap_or_else(|| status.to_string());
        return Err(TransportError::Rejected(reason));
    }

    response
        .json::<Value>()
        .await
        .map_err(|error| TransportError::Protocol(format!("invalid JSON response: {error}")))
}

fn required_string_arg(command: &str, args: &Value, field: &str) -> Result<String, TransportError> {
    args[field]
        .as_str()
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            TransportError::Protocol(format!("'{command}' requires a string '{field}' argument"))
        })
}

#[async_trait]
impl Transport for ControlPlaneTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::ControlPlane
    }

    async fn invoke(&self, command: &str, args: Value) -> Result<Value, TransportError> {
        match command {
            cmd::PROCESS_STATUS_TEXT => self.get_json("process/status", &[]).await,
            cmd::ONEBOT_STATUS_TEXT | cmd::CALL_ONEBOT_STATUS_API => {
                self.get_json("onebot/status", &[]).await
            }
            cmd::SUBS_SUMMARY_TEXT | cmd::CALL_SUBS_SUMMARY_API => {
                self.get_json("subs/summary", &[]).await
            }
            cmd::HEALTH_CHECK => self.get_json("health", &[]).await,
            cmd::PROCESS_START => {
                self.post_json("process/control", json!({"action": "start"})).await
            }
            cmd::PROCESS_STOP => {
                self.post_json("process/control", json!({"action": "stop"})).await
            }
            cmd::PROCESS_RESTART => {
                self.post_json("process/control", json!({"action": "restart"})).await
            }
            cmd::INSTALL_RUNTIME => self.post_json("install", json!({})).await,
            cmd::READ_CONFIG_FILE => {
                let filename = required_string_arg(command, &args, "filename")?;
                self.get_json("config", &[("filename", filename)]).await
            }
            cmd::WRITE_CONFIG_FILE => self.post_json("config", args).await,
            cmd::LIST_CONFIG_BACKUPS => {
                let filename = required_string_arg(command, &args, "filename")?;
                self.get_json("config/backups", &[("filename", filename)]).await
            }
            cmd::RESTORE_CONFIG_BACKUP => self.post_json("config/restore", args).await,
            cmd::READ_LOGS_TAIL => {
                let query = match args["lines"].as_u64() {
                    Some(lines) => vec![("lines", lines.to_string())],
                    None => Vec::new(),
                };
                self.get_json("logs", &query).await
            }
            other => Err(TransportError::Unsupported {
                kind: TransportKind::ControlPlane.as_label(),
                command: other.to_string(),
            }),
        }
    }

    fn subscribe(&self, event: &str) -> EventSubscription {
        // The control plane has no push channel; polling covers status and
        // update checks in this mode.
        EventSubscription::inert(event)
    }
}
