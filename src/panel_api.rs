use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use serde_json::{json, Value};

use crate::{
    command_catalog as cmd,
    transport::{EventSubscription, Transport, TransportError, TransportKind},
};

/// Stable operation surface over the active transport. Pure adapter
/// boundary: every method shapes strongly-typed arguments into the fixed
/// argument object for its catalog command, forwards one `invoke`, and types
/// the result. Side effects behind the commands are opaque here; a returned
/// `Ok` guarantees only that the call was issued and awaited to completion.
pub struct PanelApi {
    transport: Arc<dyn Transport>,
}

impl PanelApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.transport.kind()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.transport.data_dir()
    }

    pub fn subscribe_background_updates(&self) -> EventSubscription {
        self.transport.subscribe(cmd::BACKGROUND_UPDATE_EVENT)
    }

    async fn invoke(&self, command: &str, args: Value) -> Result<Value, TransportError> {
        self.transport.invoke(command, args).await
    }

    // --- Process lifecycle ---

    pub async fn process_start(&self) -> Result<(), TransportError> {
        self.invoke(cmd::PROCESS_START, Value::Null).await.map(drop)
    }

    pub async fn process_stop(&self) -> Result<(), TransportError> {
        self.invoke(cmd::PROCESS_STOP, Value::Null).await.map(drop)
    }

    pub async fn process_restart(&self) -> Result<(), TransportError> {
        self.invoke(cmd::PROCESS_RESTART, Value::Null).await.map(drop)
    }

    /// Raw process-status payload: a structured object on the control-plane
    /// path, an opaque status line on the bridge path. The status parser is
    /// the one place that turns this into the canonical model.
    pub async fn process_status(&self) -> Result<Value, TransportError> {
        self.invoke(cmd::PROCESS_STATUS_TEXT, Value::Null).await
    }

    pub async fn connectivity_status(&self) -> Result<Value, TransportError> {
        self.invoke(cmd::ONEBOT_STATUS_TEXT, Value::Null).await
    }

    pub async fn subscription_summary(&self) -> Result<Value, TransportError> {
        self.invoke(cmd::SUBS_SUMMARY_TEXT, Value::Null).await
    }

    /// Structured connectivity query; on the bridge path this asks the
    /// shell's admin-API proxy instead of the display text.
    pub async fn connectivity_status_structured(&self) -> Result<Value, TransportError> {
        self.invoke(cmd::CALL_ONEBOT_STATUS_API, Value::Null).await
    }

    pub async fn subscription_summary_structured(&self) -> Result<Value, TransportError> {
        self.invoke(cmd::CALL_SUBS_SUMMARY_API, Value::Null).await
    }

    pub async fn health(&self) -> Result<Value, TransportError> {
        self.invoke(cmd::HEALTH_CHECK, Value::Null).await
    }

    // --- Configuration ---

    pub async fn read_config_file(&self, filename: &str) -> Result<String, TransportError> {
        let payload = self
            .invoke(cmd::READ_CONFIG_FILE, json!({ "filename": filename }))
            .await?;
        into_string(cmd::READ_CONFIG_FILE, payload, Some("content"))
    }

    pub async fn write_config_file(
        &self,
        filename: &str,
        content: &str,
    ) -> Result<(), TransportError> {
        self.invoke(
            cmd::WRITE_CONFIG_FILE,
            json!({ "filename": filename, "content": content }),
        )
        .await
        .map(drop)
    }

    pub async fn list_config_backups(&self, filename: &str) -> Result<Vec<String>, TransportError> {
        let payload = self
            .invoke(cmd::LIST_CONFIG_BACKUPS, json!({ "filename": filename }))
            .await?;
        into_string_list(cmd::LIST_CONFIG_BACKUPS, payload, "backups")
    }

    pub async fn restore_config_backup(&self, backup_name: &str) -> Result<(), TransportError> {
        self.invoke(
            cmd::RESTORE_CONFIG_BACKUP,
            json!({ "backup_name": backup_name }),
        )
        .await
        .map(drop)
    }

    // --- Logs and admin credential ---

    pub async fn read_logs_tail(&self, lines: u32) -> Result<Vec<String>, TransportError> {
        let payload = self
            .invoke(cmd::READ_LOGS_TAIL, json!({ "lines": lines }))
            .await?;
        into_string_list(cmd::READ_LOGS_TAIL, payload, "logs")
    }

    pub async fn clear_logs(&self, source: Option<&str>) -> Result<(), TransportError> {
        self.invoke(cmd::CLEAR_LOGS, json!({ "source": source }))
            .await
            .map(drop)
    }

    pub async fn admin_password(&self) -> Result<String, TransportError> {
        let payload = self.invoke(cmd::GET_ADMIN_PASSWORD, Value::Null).await?;
        into_string(cmd::GET_ADMIN_PASSWORD, payload, None)
    }

    pub async fn set_admin_password(&self, password: &str) -> Result<String, TransportError> {
        let payload = self
            .invoke(cmd::SET_ADMIN_PASSWORD, json!({ "password": password }))
            .await?;
        into_string(cmd::SET_ADMIN_PASSWORD, payload, None)
    }

    pub async fn reset_admin_password(&self) -> Result<String, TransportError> {
        let payload = self.invoke(cmd::RESET_ADMIN_PASSWORD, Value::Null).await?;
        into_string(cmd::RESET_ADMIN_PASSWORD, payload, None)
    }

    // --- Panel update lifecycle ---

    /// Raw update descriptor; typed and held by the update flow.
    pub async fn update_check(&self) -> Result<Value, TransportError> {
        self.invoke(cmd::UPDATE_CHECK, Value::Null).await
    }

    pub async fn current_version(&self) -> Result<String, TransportError> {
        let payload = self.invoke(cmd::GET_CURRENT_VERSION, Value::Null).await?;
        into_string(cmd::GET_CURRENT_VERSION, payload, Some("version"))
    }

    /// Returns the path the payload was saved to.
    pub async fn download_file(
        &self,
        url: &str,
        save_path: &Path,
        filename: &str,
    ) -> Result<String, TransportError> {
        let payload = self
            .invoke(
                cmd::DOWNLOAD_FILE,
                json!({
                    "url": url,
                    "save_path": save_path.display().to_string(),
                    "filename": filename,
                }),
            )
            .await?;
        into_string(cmd::DOWNLOAD_FILE, payload, Some("path"))
    }

    pub async fn relaunch(&self) -> Result<(), TransportError> {
        self.invoke(cmd::RELAUNCH, Value::Null).await.map(drop)
    }

    // --- Managed runtime install and versions ---

    pub async fn install_runtime(&self) -> Result<(), TransportError> {
        self.invoke(cmd::INSTALL_RUNTIME, Value::Null).await.map(drop)
    }

    pub async fn installed_version_text(&self) -> Result<String, TransportError> {
        let payload = self.invoke(cmd::INSTALLED_VERSION_TEXT, Value::Null).await?;
        into_string(cmd::INSTALLED_VERSION_TEXT, payload, None)
    }

    pub async fn binary_version(&self, binary_name: &str) -> Result<String, TransportError> {
        let payload = self
            .invoke(cmd::GET_BINARY_VERSION, json!({ "binary_name": binary_name }))
            .await?;
        into_string(cmd::GET_BINARY_VERSION, payload, Some("version"))
    }

    // --- Firewall ---

    pub async fn check_firewall_rule(&self) -> Result<bool, TransportError> {
        let payload = self.invoke(cmd::CHECK_FIREWALL_RULE, Value::Null).await?;
        into_bool(cmd::CHECK_FIREWALL_RULE, payload)
    }

    pub async fn add_firewall_rule(&self) -> Result<bool, TransportError> {
        let payload = self.invoke(cmd::ADD_FIREWALL_RULE, Value::Null).await?;
        into_bool(cmd::ADD_FIREWALL_RULE, payload)
    }

    pub async fn remove_firewall_rule(&self) -> Result<bool, TransportError> {
        let payload = self.invoke(cmd::REMOVE_FIREWALL_RULE, Value::Null).await?;
        into_bool(cmd::REMOVE_FIREWALL_RULE, payload)
    }

    // --- Openers ---

    pub async fn open_file(&self, path: &str) -> Result<(), TransportError> {
        self.invoke(cmd::OPEN_FILE, json!({ "path": path })).await.map(drop)
    }

    pub async fn open_folder(&self, path: &str) -> Result<(), TransportError> {
        self.invoke(cmd::OPEN_FOLDER, json!({ "path": path })).await.map(drop)
    }

    pub async fn open_url_in_browser(&self, url: &str) -> Result<(), TransportError> {
        self.invoke(cmd::OPEN_URL_IN_BROWSER, json!({ "url": url }))
            .await
            .map(drop)
    }

    pub async fn open_data_dir(&self) -> Result<(), TransportError> {
        self.invoke(cmd::OPEN_DATA_DIR, Value::Null).await.map(drop)
    }

    pub async fn open_logs_directory(&self) -> Result<(), TransportError> {
        self.invoke(cmd::OPEN_LOGS_DIRECTORY, Value::Null).await.map(drop)
    }
}

/// Accepts the bridge's bare string or the control plane's single-field
/// object wrapper for the same operation.
fn into_string(
    command: &str,
    payload: Value,
    object_field: Option<&str>,
) -> Result<String, TransportError> {
    match payload {
        Value::String(value) => Ok(value),
        Value::Object(ref fields) => object_field
            .and_then(|field| fields.get(field))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| unexpected_shape(command, &payload)),
        other => Err(unexpected_shape(command, &other)),
    }
}

fn into_bool(command: &str, payload: Value) -> Result<bool, TransportError> {
    match payload {
        Value::Bool(value) => Ok(value),
        Value::Object(ref fields) => fields
            .get("success")
            .and_then(Value::as_bool)
            .ok_or_else(|| unexpected_shape(command, &payload)),
        other => Err(unexpected_shape(command, &other)),
    }
}

fn into_string_list(
    command: &str,
    payload: Value,
    object_field: &str,
) -> Result<Vec<String>, TransportError> {
    let entries = match &payload {
        Value::Array(entries) => entries,
        Value::Object(fields) => match fields.get(object_field).and_then(Value::as_array) {
            Some(entries) => entries,
            None => return Err(unexpected_shape(command, &payload)),
        },
        _ => return Err(unexpected_shape(command, &payload)),
    };
    Ok(entries
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect())
}

fn unexpected_shape(command: &str, payload: &Value) -> TransportError {
    TransportError::Protocol(format!("unexpected '{command}' result shape: {payload}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_transport::MockTransport;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct CannedTransport {
        responses: HashMap<&'static str, Value>,
    }

    #[async_trait]
    impl Transport for CannedTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::ControlPlane
        }

        async fn invoke(&self, command: &str, _args: Value) -> Result<Value, TransportError> {
            Ok(self.responses.get(command).cloned().unwrap_or(Value::Null))
        }

        fn subscribe(&self, event: &str) -> EventSubscription {
            EventSubscription::inert(event)
        }
    }

    #[tokio::test]
    async fn facade_types_bridge_shaped_results() {
        let api = PanelApi::new(Arc::new(MockTransport::new()));

        let config = api
            .read_config_file("application.yaml")
            .await
            .expect("mock config read");
        assert!(config.contains("logLevel"));

        let backups = api
            .list_config_backups("application.yaml")
            .await
            .expect("mock backup list");
        assert!(backups.is_empty());

        assert!(api.check_firewall_rule().await.expect("mock firewall check"));
        assert_eq!(
            api.current_version().await.expect("mock current version"),
            "1.0.0"
        );
    }

    #[tokio::test]
    async fn facade_types_control_plane_shaped_results() {
        let responses = HashMap::from([
            (cmd::READ_CONFIG_FILE, serde_json::json!({"content": "logLevel: info"})),
            (
                cmd::LIST_CONFIG_BACKUPS,
                serde_json::json!({"backups": ["application.yaml.20260101_120000.bak"]}),
            ),
            (
                cmd::READ_LOGS_TAIL,
                serde_json::json!({"logs": ["[INFO] ready"]}),
            ),
        ]);
        let api = PanelApi::new(Arc::new(CannedTransport { responses }));

        assert_eq!(
            api.read_config_file("application.yaml")
                .await
                .expect("wrapped config read"),
            "logLevel: info"
        );
        assert_eq!(
            api.list_config_backups("application.yaml")
                .await
                .expect("wrapped backup list"),
            vec!["application.yaml.20260101_120000.bak".to_string()]
        );
        assert_eq!(
            api.read_logs_tail(100).await.expect("wrapped logs tail"),
            vec!["[INFO] ready".to_string()]
        );
    }

    #[tokio::test]
    async fn facade_rejects_unexpected_result_shapes() {
        let responses = HashMap::from([(cmd::GET_CURRENT_VERSION, serde_json::json!(42))]);
        let api = PanelApi::new(Arc::new(CannedTransport { responses }));

        let failure = api
            .current_version()
            .await
            .expect_err("numbers are not version strings");
        assert!(matches!(failure, TransportError::Protocol(_)));
    }
}
