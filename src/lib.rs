//! Transport abstraction and status synchronization core for the bot desktop
//! panel. The panel UI runs either embedded in a native desktop shell (which
//! exposes a command bridge) or as a plain web page talking to a local HTTP
//! control plane; this crate hides that difference behind a single
//! [`Transport`], normalizes both backends' heterogeneous status payloads
//! into one canonical model, and drives the panel-update lifecycle and the
//! polled status store on top of whichever transport is live.

mod bridge_transport;
mod command_catalog;
mod control_plane_transport;
mod logging;
mod mock_transport;
mod panel_api;
mod panel_config;
mod runtime_paths;
mod status_model;
mod status_parse;
mod sync_store;
mod transport;
mod transport_select;
mod update_flow;

use std::sync::Arc;

pub use bridge_transport::BridgeTransport;
pub use command_catalog::BACKGROUND_UPDATE_EVENT;
pub use control_plane_transport::ControlPlaneTransport;
pub use logging::init_tracing;
pub use mock_transport::MockTransport;
pub use panel_api::PanelApi;
pub use panel_config::PanelConfig;
pub use runtime_paths::{logs_dir, managed_runtime_dir, panel_data_dir, updates_dir};
pub use status_model::{ConnectivityStatus, ProcessStatus, SubscriptionSummary};
pub use status_parse::{parse_connectivity, parse_process_status, parse_subscription_summary};
pub use sync_store::{SyncState, SyncStore};
pub use transport::{EventSubscription, Transport, TransportError, TransportKind};
pub use transport_select::{resolve_transport, HostEnvironment, ResolvedTransport};
pub use update_flow::{
    DownloadProgress, UpdateAsset, UpdateError, UpdateFlow, UpdateInfo, UpdatePhase,
};

pub(crate) const DEFAULT_CONTROL_PLANE_URL: &str = "http://127.0.0.1:3000/api/";
pub(crate) const BRIDGE_ADDR_ENV: &str = "BOTPANEL_BRIDGE_ADDR";
pub(crate) const CONTROL_PLANE_URL_ENV: &str = "BOTPANEL_CONTROL_PLANE_URL";
pub(crate) const DATA_DIR_ENV: &str = "BOTPANEL_DATA_DIR";
pub(crate) const INVOKE_TIMEOUT_ENV: &str = "BOTPANEL_INVOKE_TIMEOUT_MS";
pub(crate) const DEFAULT_INVOKE_TIMEOUT_MS: u64 = 10_000;
pub(crate) const INVOKE_TIMEOUT_MIN_MS: u64 = 100;
pub(crate) const INVOKE_TIMEOUT_MAX_MS: u64 = 120_000;
pub(crate) const PROBE_TIMEOUT_ENV: &str = "BOTPANEL_PROBE_TIMEOUT_MS";
pub(crate) const DEFAULT_PROBE_TIMEOUT_MS: u64 = 800;
pub(crate) const PROBE_TIMEOUT_MIN_MS: u64 = 50;
pub(crate) const PROBE_TIMEOUT_MAX_MS: u64 = 30_000;
pub(crate) const DOWNLOAD_PROGRESS_TICK_MS: u64 = 500;
pub(crate) const DOWNLOAD_FALLBACK_TOTAL_BYTES: u64 = 1_000_000;

/// The wired-up panel core: one facade, one store and one update flow, all
/// bound to the transport picked once at bootstrap.
pub struct Panel {
    pub api: Arc<PanelApi>,
    pub store: Arc<SyncStore>,
    pub updates: Arc<UpdateFlow>,
}

impl Panel {
    pub fn transport_kind(&self) -> TransportKind {
        self.api.transport_kind()
    }
}

/// Resolves the transport for this process and wires the facade, the sync
/// store and the update flow around it. Call once at application start; the
/// transport choice is immutable for the process lifetime. The store's
/// [`SyncStore::init`] bootstrap is left to the caller so hosts control when
/// the first status round-trip happens.
pub async fn bootstrap_panel(config: PanelConfig) -> Panel {
    let resolved = resolve_transport(&config).await;
    tracing::info!(
        transport = resolved.transport.kind().as_label(),
        environment = resolved.environment.as_label(),
        "panel transport resolved"
    );

    let api = Arc::new(PanelApi::new(resolved.transport));
    let store = Arc::new(SyncStore::new(Arc::clone(&api)));
    let updates = Arc::new(UpdateFlow::new(Arc::clone(&api), &config));
    Panel { api, store, updates }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_degrades_to_mock_when_nothing_is_reachable() {
        let config = PanelConfig {
            control_plane_url: url::Url::parse("http://127.0.0.1:1/api/").expect("test url"),
            probe_timeout_ms: 100,
            ..PanelConfig::default()
        };
        let panel = bootstrap_panel(config).await;
        assert_eq!(panel.transport_kind(), TransportKind::Mock);

        panel.store.init().await;
        let state = panel.store.snapshot();
        assert!(!state.is_running());
        assert!(!state.connectivity.connected);
        assert_eq!(state.version.as_deref(), Some("1.0.0"));
        assert!(state.firewall_rule_present, "mock answers its canned firewall rule");
        assert_eq!(state.uptime_text(), "-");

        // Preview mode has no update to offer.
        let info = panel.updates.check_for_update().await.expect("mock check");
        assert!(!info.available);
        assert_eq!(panel.updates.phase(), UpdatePhase::CheckedUpToDate);
    }
}
