use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};

use crate::{
    panel_api::PanelApi, panel_config::PanelConfig, transport::TransportError,
    DOWNLOAD_FALLBACK_TOTAL_BYTES,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateAsset {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub size: Option<u64>,
}

/// One panel-update descriptor. At most one of these is pending at a time;
/// pending state clears on successful install, explicit cancel or relaunch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateInfo {
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub current_version: String,
    #[serde(default)]
    pub latest_version: String,
    #[serde(default)]
    pub release_notes: String,
    #[serde(default)]
    pub assets: Vec<UpdateAsset>,
}

impl UpdateInfo {
    /// Types a raw check payload. The descriptor only counts as available
    /// when it says so and its version is strictly newer than the installed
    /// one.
    fn from_check_payload(payload: &Value, current_version: &str) -> Self {
        let mut info: UpdateInfo = serde_json::from_value(payload.clone()).unwrap_or_default();
        info.current_version = current_version.to_string();
        info.available = info.available && version_is_newer(&info.latest_version, current_version);
        info
    }

    /// Types a pushed `background-update-available` payload; `None` when the
    /// payload has no usable shape.
    pub(crate) fn from_event_payload(payload: &Value) -> Option<Self> {
        let info: UpdateInfo = serde_json::from_value(payload.clone()).ok()?;
        if info.latest_version.is_empty() {
            return None;
        }
        Some(info)
    }
}

/// Dotted numeric comparison, tolerant of a leading `v` and a pre-release
/// suffix. Unparseable tags count as newer when they differ at all, so a
/// backend that ships non-numeric tags still surfaces its updates.
fn version_is_newer(latest: &str, current: &str) -> bool {
    match (parse_version(latest), parse_version(current)) {
        (Some(latest_parts), Some(current_parts)) => latest_parts > current_parts,
        _ => {
            let latest = latest.trim();
            !latest.is_empty() && latest != current.trim()
        }
    }
}

fn parse_version(raw: &str) -> Option<Vec<u64>> {
    let trimmed = raw.trim().trim_start_matches(['v', 'V']);
    let numeric = trimmed.split(['-', '+']).next()?;
    if numeric.is_empty() {
        return None;
    }
    numeric
        .split('.')
        .map(|piece| piece.parse::<u64>().ok())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DownloadProgress {
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    pub percent: u8,
    pub bytes_per_second: f64,
}

#[derive(Debug, Error)]
pub enum UpdateError {
    /// Operation invoked outside its required state.
    #[error("update precondition not met: {0}")]
    Precondition(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdatePhase {
    #[default]
    Idle,
    /// A check ran and found nothing newer.
    CheckedUpToDate,
    /// A check found a newer version; its descriptor is the pending update.
    UpdatePending,
    /// Locking state: no transition may begin while a download runs.
    Downloading,
    ReadyToRelaunch,
}

#[derive(Debug, Default)]
struct UpdateMachine {
    phase: UpdatePhase,
    pending: Option<UpdateInfo>,
}

impl UpdateMachine {
    fn record_check(&mut self, info: UpdateInfo) {
        if info.available {
            self.pending = Some(info);
            self.phase = UpdatePhase::UpdatePending;
        } else {
            self.pending = None;
            self.phase = UpdatePhase::CheckedUpToDate;
        }
    }

    fn try_begin_download(&mut self) -> Result<UpdateInfo, UpdateError> {
        if self.phase == UpdatePhase::Downloading {
            return Err(UpdateError::Precondition(
                "a download is already in progress".to_string(),
            ));
        }
        match self.pending.clone() {
            Some(pending) => {
                self.phase = UpdatePhase::Downloading;
                Ok(pending)
            }
            None => Err(UpdateError::Precondition(
                "no pending update; run a check first".to_string(),
            )),
        }
    }

    /// Failed download: back to pending, descriptor untouched.
    fn abort_download(&mut self) {
        if self.phase == UpdatePhase::Downloading {
            self.phase = UpdatePhase::UpdatePending;
        }
    }

    fn complete_download(&mut self) {
        self.pending = None;
        self.phase = UpdatePhase::ReadyToRelaunch;
    }

    fn reset(&mut self) {
        self.pending = None;
        self.phase = UpdatePhase::Idle;
    }
}

/// Drives the panel-update lifecycle
/// (idle → checked → downloading → ready-to-relaunch) over the facade.
pub struct UpdateFlow {
    api: Arc<PanelApi>,
    machine: Mutex<UpdateMachine>,
    progress_tick: Duration,
}

impl UpdateFlow {
    pub fn new(api: Arc<PanelApi>, config: &PanelConfig) -> Self {
        Self {
            api,
            machine: Mutex::new(UpdateMachine::default()),
            progress_tick: Duration::from_millis(config.progress_tick_ms.max(1)),
        }
    }

    fn machine(&self) -> MutexGuard<'_, UpdateMachine> {
        match self.machine.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn phase(&self) -> UpdatePhase {
        self.machine().phase
    }

    pub fn pending_update(&self) -> Option<UpdateInfo> {
        self.machine().pending.clone()
    }

    pub fn has_pending_update(&self) -> bool {
        self.machine().pending.is_some()
    }

    /// Operator-initiated cancellation: back to idle from any state,
    /// discarding the pending descriptor.
    pub fn clear_pending_update(&self) {
        self.machine().reset();
    }

    /// Queries the backend's update descriptor and the installed version; a
    /// strictly newer version becomes the single pending update (replacing
    /// any previous one). Facade errors leave the machine untouched.
    pub async fn check_for_update(&self) -> Result<UpdateInfo, UpdateError> {
        if self.phase() == UpdatePhase::Downloading {
            return Err(UpdateError::Precondition(
                "cannot re-check while a download is in progress".to_string(),
            ));
        }

        let current_version = self.api.current_version().await?;
        let payload = self.api.update_check().await?;
        let info = UpdateInfo::from_check_payload(&payload, &current_version);

        let mut machine = self.machine();
        // A download may have started while the queries were in flight.
        if machine.phase == UpdatePhase::Downloading {
            return Err(UpdateError::Precondition(
                "cannot re-check while a download is in progress".to_string(),
            ));
        }
        machine.record_check(info.clone());
        Ok(info)
    }

    /// Downloads and installs the pending update, reporting progress through
    /// the callback: monotonically non-decreasing byte counts ending at
    /// exactly 100% before the machine moves to ready-to-relaunch. The
    /// transfer itself runs on a spawned task, so a caller that stops
    /// awaiting does not cancel it; `clear_pending_update` is the escape
    /// hatch for a machine left mid-download that way.
    pub async fn download_and_install<F>(&self, mut on_progress: F) -> Result<(), UpdateError>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        let info = self.machine().try_begin_download()?;
        let total_bytes = info
            .assets
            .first()
            .and_then(|asset| asset.size)
            .filter(|size| *size > 0)
            .unwrap_or(DOWNLOAD_FALLBACK_TOTAL_BYTES);

        let api = Arc::clone(&self.api);
        let transfer_info = info.clone();
        let mut transfer =
            tokio::spawn(async move { run_transfer(&api, &transfer_info).await });

        let started = Instant::now();
        let mut downloaded: u64 = 0;
        on_progress(progress_at(0, total_bytes, Duration::ZERO));

        let mut ticker = tokio::time::interval(self.progress_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let outcome = loop {
            tokio::select! {
                joined = &mut transfer => break joined,
                _ = ticker.tick() => {
                    // Estimated advance while the transfer is in flight,
                    // capped below completion until the backend confirms it.
                    let ceiling = total_bytes.saturating_mul(95) / 100;
                    downloaded = downloaded
                        .saturating_add(total_bytes / 10)
                        .min(ceiling)
                        .max(downloaded);
                    on_progress(progress_at(downloaded, total_bytes, started.elapsed()));
                }
            }
        };

        match outcome {
            Ok(Ok(())) => {
                on_progress(progress_at(total_bytes, total_bytes, started.elapsed()));
                self.machine().complete_download();
                Ok(())
            }
            Ok(Err(error)) => {
                self.machine().abort_download();
                Err(error.into())
            }
            Err(join_error) => {
                self.machine().abort_download();
                Err(UpdateError::Transport(TransportError::Io(format!(
                    "download task failed: {join_error}"
                ))))
            }
        }
    }

    /// Asks the backend to relaunch the panel. A no-op restart request when
    /// nothing is pending; the machine returns to idle either way.
    pub async fn relaunch(&self) -> Result<(), UpdateError> {
        self.api.relaunch().await?;
        self.machine().reset();
        Ok(())
    }
}

async fn run_transfer(api: &PanelApi, info: &UpdateInfo) -> Result<(), TransportError> {
    match info.assets.first() {
        Some(asset) if !asset.url.is_empty() => {
            let save_dir = api.data_dir().join("updates");
            match api.download_file(&asset.url, &save_dir, &asset.name).await {
                Ok(_saved_path) => Ok(()),
                // Transports without a file-download primitive install
                // server-side instead.
                Err(TransportError::Unsupported { .. }) => api.install_runtime().await,
                Err(error) => Err(error),
            }
        }
        _ => api.install_runtime().await,
    }
}

fn progress_at(downloaded_bytes: u64, total_bytes: u64, elapsed: Duration) -> DownloadProgress {
    let percent = if total_bytes == 0 {
        100
    } else {
        (downloaded_bytes.saturating_mul(100) / total_bytes).min(100) as u8
    };
    let seconds = elapsed.as_secs_f64();
    let bytes_per_second = if seconds > 0.0 {
        downloaded_bytes as f64 / seconds
    } else {
        0.0
    };
    DownloadProgress {
        downloaded_bytes,
        total_bytes,
        percent,
        bytes_per_second,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        command_catalog as cmd,
        transport::{EventSubscription, Transport, TransportKind},
    };
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Notify;

    struct ScriptedTransport {
        update_payload: Mutex<Value>,
        download_gate: Option<Arc<Notify>>,
        fail_download: bool,
    }

    impl ScriptedTransport {
        fn with_update(payload: Value) -> Self {
            Self {
                update_payload: Mutex::new(payload),
                download_gate: None,
                fail_download: false,
            }
        }

        fn set_update(&self, payload: Value) {
            match self.update_payload.lock() {
                Ok(mut guard) => *guard = payload,
                Err(poisoned) => *poisoned.into_inner() = payload,
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::NativeBridge
        }

        async fn invoke(&self, command: &str, _args: Value) -> Result<Value, TransportError> {
            match command {
                cmd::UPDATE_CHECK => Ok(match self.update_payload.lock() {
                    Ok(guard) => guard.clone(),
                    Err(poisoned) => poisoned.into_inner().clone(),
                }),
                cmd::GET_CURRENT_VERSION => Ok(json!("1.0.0")),
                cmd::DOWNLOAD_FILE | cmd::INSTALL_RUNTIME => {
                    if let Some(gate) = &self.download_gate {
                        gate.notified().await;
                    }
                    if self.fail_download {
                        Err(TransportError::Rejected("disk full".to_string()))
                    } else {
                        Ok(json!("/tmp/panel-update.zip"))
                    }
                }
                _ => Ok(Value::Null),
            }
        }

        fn subscribe(&self, event: &str) -> EventSubscription {
            EventSubscription::inert(event)
        }
    }

    fn pending_descriptor(version: &str) -> Value {
        json!({
            "available": true,
            "latest_version": version,
            "release_notes": "fixes",
            "assets": [
                {"name": "panel.zip", "url": "https://example.invalid/panel.zip", "size": 2048}
            ],
        })
    }

    fn flow_over(transport: ScriptedTransport, tick_ms: u64) -> Arc<UpdateFlow> {
        let api = Arc::new(PanelApi::new(Arc::new(transport)));
        let config = PanelConfig {
            progress_tick_ms: tick_ms,
            ..PanelConfig::default()
        };
        Arc::new(UpdateFlow::new(api, &config))
    }

    async fn wait_for_phase(flow: &UpdateFlow, phase: UpdatePhase) {
        for _ in 0..200 {
            if flow.phase() == phase {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("flow never reached {phase:?}");
    }

    #[test]
    fn version_is_newer_compares_dotted_numbers() {
        assert!(version_is_newer("1.0.1", "1.0.0"));
        assert!(version_is_newer("v2.0", "1.9.9"));
        assert!(version_is_newer("1.0.0.1", "1.0.0"));
        assert!(!version_is_newer("1.0.0", "1.0.0"));
        assert!(!version_is_newer("0.9.9", "1.0.0"));
        // Non-numeric tags: any different tag counts as newer.
        assert!(version_is_newer("fix_A042", "fix_A041"));
        assert!(!version_is_newer("fix_A041", "fix_A041"));
        assert!(!version_is_newer("", "1.0.0"));
    }

    #[tokio::test]
    async fn second_check_fully_replaces_pending_update() {
        let transport = Arc::new(ScriptedTransport::with_update(pending_descriptor("2.0.0")));
        let api = Arc::new(PanelApi::new(
            Arc::clone(&transport) as Arc<dyn Transport>
        ));
        let flow = UpdateFlow::new(api, &PanelConfig::default());

        let first = flow.check_for_update().await.expect("first check");
        assert!(first.available);
        assert_eq!(flow.phase(), UpdatePhase::UpdatePending);
        assert_eq!(
            flow.pending_update().expect("pending after first check").latest_version,
            "2.0.0"
        );

        transport.set_update(pending_descriptor("3.0.0"));
        let second = flow.check_for_update().await.expect("second check");
        assert_eq!(second.latest_version, "3.0.0");
        assert_eq!(
            flow.pending_update().expect("single pending update").latest_version,
            "3.0.0"
        );
    }

    #[tokio::test]
    async fn check_against_same_version_clears_pending() {
        let transport = Arc::new(ScriptedTransport::with_update(pending_descriptor("2.0.0")));
        let api = Arc::new(PanelApi::new(
            Arc::clone(&transport) as Arc<dyn Transport>
        ));
        let flow = UpdateFlow::new(api, &PanelConfig::default());

        flow.check_for_update().await.expect("first check");
        assert!(flow.has_pending_update());

        // Backend now reports the installed version itself.
        transport.set_update(json!({"available": true, "latest_version": "1.0.0", "assets": []}));
        let info = flow.check_for_update().await.expect("same-version check");
        assert!(!info.available);
        assert_eq!(flow.phase(), UpdatePhase::CheckedUpToDate);
        assert!(!flow.has_pending_update());
    }

    #[tokio::test]
    async fn download_without_pending_update_is_a_precondition_error() {
        let flow = flow_over(ScriptedTransport::with_update(Value::Null), 500);
        let failure = flow
            .download_and_install(|_| {})
            .await
            .expect_err("no pending update");
        assert!(matches!(failure, UpdateError::Precondition(_)));
    }

    #[tokio::test]
    async fn concurrent_second_download_is_rejected() {
        let gate = Arc::new(Notify::new());
        let mut transport = ScriptedTransport::with_update(pending_descriptor("2.0.0"));
        transport.download_gate = Some(Arc::clone(&gate));
        let flow = flow_over(transport, 5);

        flow.check_for_update().await.expect("check");

        let first = tokio::spawn({
            let flow = Arc::clone(&flow);
            async move { flow.download_and_install(|_| {}).await }
        });
        wait_for_phase(&flow, UpdatePhase::Downloading).await;

        let second = flow
            .download_and_install(|_| {})
            .await
            .expect_err("downloading is a locking state");
        assert!(matches!(second, UpdateError::Precondition(_)));

        let recheck = flow.check_for_update().await.expect_err("check locked too");
        assert!(matches!(recheck, UpdateError::Precondition(_)));

        gate.notify_one();
        first
            .await
            .expect("join first download")
            .expect("first download succeeds");
        assert_eq!(flow.phase(), UpdatePhase::ReadyToRelaunch);
        assert!(!flow.has_pending_update());
    }

    #[tokio::test]
    async fn progress_is_monotone_and_ends_at_exactly_one_hundred() {
        let gate = Arc::new(Notify::new());
        let mut transport = ScriptedTransport::with_update(pending_descriptor("2.0.0"));
        transport.download_gate = Some(Arc::clone(&gate));
        let flow = flow_over(transport, 3);

        flow.check_for_update().await.expect("check");

        let progress: Arc<Mutex<Vec<DownloadProgress>>> = Arc::new(Mutex::new(Vec::new()));
        let first = tokio::spawn({
            let flow = Arc::clone(&flow);
            let progress = Arc::clone(&progress);
            async move {
                flow.download_and_install(move |event| {
                    progress.lock().expect("progress lock").push(event);
                })
                .await
            }
        });

        // Let several estimation ticks land before the transfer completes.
        tokio::time::sleep(Duration::from_millis(30)).await;
        gate.notify_one();
        first
            .await
            .expect("join download")
            .expect("download succeeds");

        let events = progress.lock().expect("progress lock").clone();
        assert!(events.len() >= 3, "expected start, ticks and completion");
        assert_eq!(events[0].downloaded_bytes, 0);
        for pair in events.windows(2) {
            assert!(pair[1].downloaded_bytes >= pair[0].downloaded_bytes);
        }
        let last = events.last().expect("final event");
        assert_eq!(last.percent, 100);
        assert_eq!(last.downloaded_bytes, last.total_bytes);
        assert_eq!(last.total_bytes, 2048);
        assert!(events[..events.len() - 1]
            .iter()
            .all(|event| event.percent <= 95));
    }

    #[tokio::test]
    async fn failed_transfer_restores_the_pending_update() {
        let mut transport = ScriptedTransport::with_update(pending_descriptor("2.0.0"));
        transport.fail_download = true;
        let flow = flow_over(transport, 3);

        flow.check_for_update().await.expect("check");
        let failure = flow
            .download_and_install(|_| {})
            .await
            .expect_err("transfer fails");
        assert!(matches!(
            failure,
            UpdateError::Transport(TransportError::Rejected(_))
        ));
        assert_eq!(flow.phase(), UpdatePhase::UpdatePending);
        assert_eq!(
            flow.pending_update().expect("pending survives failure").latest_version,
            "2.0.0"
        );
    }

    #[tokio::test]
    async fn clear_pending_update_forces_idle_and_relaunch_is_idempotent() {
        let flow = flow_over(ScriptedTransport::with_update(pending_descriptor("2.0.0")), 500);

        flow.check_for_update().await.expect("check");
        assert!(flow.has_pending_update());
        flow.clear_pending_update();
        assert_eq!(flow.phase(), UpdatePhase::Idle);
        assert!(!flow.has_pending_update());

        // Relaunch with nothing pending: plain restart request, still idle.
        flow.relaunch().await.expect("relaunch");
        assert_eq!(flow.phase(), UpdatePhase::Idle);
    }
}
