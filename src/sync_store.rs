use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::{
    panel_api::PanelApi,
    status_model::{ConnectivityStatus, ProcessStatus, SubscriptionSummary},
    status_parse,
    transport::{EventSubscription, TransportError},
    update_flow::UpdateInfo,
};

/// The canonical panel view of the managed backend. Owned exclusively by the
/// store: mutated only by its refresh routine and lifecycle operations,
/// read-only to every observer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncState {
    pub process: ProcessStatus,
    pub connectivity: ConnectivityStatus,
    pub subscriptions: SubscriptionSummary,
    /// Backend version, from the health query.
    pub version: Option<String>,
    pub firewall_rule_present: bool,
    pub data_dir: Option<PathBuf>,
    pub update_available: bool,
    pub latest_version: Option<String>,
    pub loading: bool,
    pub error: Option<String>,
}

impl SyncState {
    pub fn is_running(&self) -> bool {
        self.process.running
    }

    /// Formatted uptime like `"2h 17m"`, or `"-"` when no start has been
    /// observed. On the bridge path `started_at` is the observed transition
    /// time, so this is approximate there.
    pub fn uptime_text(&self) -> String {
        self.uptime_text_at(Utc::now())
    }

    pub fn uptime_text_at(&self, now: DateTime<Utc>) -> String {
        match self.process.started_at {
            Some(started) => {
                let seconds = (now - started).num_seconds().max(0);
                let hours = seconds / 3600;
                let minutes = (seconds % 3600) / 60;
                if hours > 0 {
                    format!("{hours}h {minutes}m")
                } else {
                    format!("{minutes}m")
                }
            }
            None => "-".to_string(),
        }
    }
}

/// Holds `loading` for exactly the guarded scope; the drop side runs on
/// every exit path, success or failure.
struct LoadingGuard<'a> {
    state: &'a watch::Sender<SyncState>,
}

impl<'a> LoadingGuard<'a> {
    fn begin(state: &'a watch::Sender<SyncState>) -> Self {
        state.send_modify(|state| {
            state.loading = true;
            state.error = None;
        });
        Self { state }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.state.send_modify(|state| state.loading = false);
    }
}

/// Process-wide observable status store. Polls the facade on demand,
/// normalizes results through the status parser, and publishes every change
/// over a watch channel. Single writer: only this type's methods touch the
/// state.
pub struct SyncStore {
    api: Arc<PanelApi>,
    state: watch::Sender<SyncState>,
    initialized: AtomicBool,
}

impl SyncStore {
    pub fn new(api: Arc<PanelApi>) -> Self {
        let (state, _) = watch::channel(SyncState::default());
        Self {
            api,
            state,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SyncState {
        self.state.borrow().clone()
    }

    /// One-time bootstrap: first status round-trip, firewall flag, data
    /// directory, and the background-update listener. Idempotent; a second
    /// call is a no-op.
    pub async fn init(self: &Arc<Self>) {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        self.refresh_status().await;

        let firewall_rule_present = match self.api.check_firewall_rule().await {
            Ok(present) => present,
            Err(error) => {
                tracing::warn!(%error, "firewall query failed, assuming no rule");
                false
            }
        };
        let data_dir = self.api.data_dir();
        self.state.send_modify(|state| {
            state.firewall_rule_present = firewall_rule_present;
            state.data_dir = Some(data_dir);
        });

        // Subscribe before spawning so no event can slip past the listener.
        let subscription = self.api.subscribe_background_updates();
        let store = Arc::clone(self);
        tokio::spawn(async move {
            store.listen_for_background_updates(subscription).await;
        });
    }

    async fn listen_for_background_updates(&self, mut subscription: EventSubscription) {
        while let Some(payload) = subscription.next().await {
            match UpdateInfo::from_event_payload(&payload) {
                Some(info) => {
                    tracing::info!(latest = %info.latest_version, "background update announced");
                    self.state.send_modify(|state| {
                        state.update_available = info.available;
                        state.latest_version = Some(info.latest_version.clone());
                    });
                }
                None => tracing::debug!(%payload, "unusable background update payload"),
            }
        }
    }

    /// Queries process, connectivity, subscription and health state
    /// concurrently. Failures are isolated per query: a failing sub-query is
    /// logged and its field keeps the previous value while the others still
    /// update.
    pub async fn refresh_status(&self) {
        let _loading = LoadingGuard::begin(&self.state);

        let (process, connectivity, subscriptions, health) = tokio::join!(
            self.api.process_status(),
            self.api.connectivity_status(),
            self.api.subscription_summary(),
            self.api.health(),
        );
        let observed_at = Utc::now();

        self.state.send_modify(|state| {
            match process {
                Ok(raw) => apply_process_payload(state, &raw, observed_at),
                Err(error) => {
                    tracing::warn!(%error, "process status query failed, keeping previous value")
                }
            }
            match connectivity {
                Ok(raw) => state.connectivity = status_parse::parse_connectivity(&raw),
                Err(error) => {
                    tracing::warn!(%error, "connectivity query failed, keeping previous value")
                }
            }
            match subscriptions {
                Ok(raw) => state.subscriptions = status_parse::parse_subscription_summary(&raw),
                Err(error) => {
                    tracing::warn!(%error, "subscription query failed, keeping previous value")
                }
            }
            match health {
                Ok(raw) => {
                    if let Some(version) = raw["version"].as_str() {
                        state.version = Some(version.to_string());
                    }
                }
                Err(error) => tracing::debug!(%error, "health query failed"),
            }
        });
    }

    pub async fn start(&self) -> Result<(), TransportError> {
        let _loading = LoadingGuard::begin(&self.state);
        if let Err(error) = self.api.process_start().await {
            self.record_error("start failed", &error);
            return Err(error);
        }
        self.refresh_status().await;
        Ok(())
    }

    /// Forces the local view to not-running/disconnected instead of
    /// re-querying: the backend may not answer once stopped.
    pub async fn stop(&self) -> Result<(), TransportError> {
        let _loading = LoadingGuard::begin(&self.state);
        if let Err(error) = self.api.process_stop().await {
            self.record_error("stop failed", &error);
            return Err(error);
        }
        self.state.send_modify(|state| {
            state.process = ProcessStatus::default();
            state.connectivity = ConnectivityStatus::default();
        });
        Ok(())
    }

    pub async fn restart(&self) -> Result<(), TransportError> {
        let _loading = LoadingGuard::begin(&self.state);
        if let Err(error) = self.api.process_restart().await {
            self.record_error("restart failed", &error);
            return Err(error);
        }
        self.refresh_status().await;
        Ok(())
    }

    /// Installs the managed runtime, then re-queries status.
    pub async fn install_runtime(&self) -> Result<(), TransportError> {
        let _loading = LoadingGuard::begin(&self.state);
        if let Err(error) = self.api.install_runtime().await {
            self.record_error("install failed", &error);
            return Err(error);
        }
        self.refresh_status().await;
        Ok(())
    }

    fn record_error(&self, context: &str, error: &TransportError) {
        tracing::warn!(%error, context, "lifecycle operation failed");
        self.state
            .send_modify(|state| state.error = Some(format!("{context}: {error}")));
    }
}

fn apply_process_payload(state: &mut SyncState, raw: &Value, observed_at: DateTime<Utc>) {
    let mut parsed = status_parse::parse_process_status(raw);
    // The bridge reports no historical start time, so the store keeps the
    // instant a refresh first observed the running transition.
    parsed.started_at = match (parsed.running, state.process.running) {
        (true, true) => state.process.started_at.or(Some(observed_at)),
        (true, false) => Some(observed_at),
        (false, _) => None,
    };
    state.process = parsed;
}
