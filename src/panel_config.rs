use std::env;

use url::Url;

use crate::{
    BRIDGE_ADDR_ENV, CONTROL_PLANE_URL_ENV, DEFAULT_CONTROL_PLANE_URL, DEFAULT_INVOKE_TIMEOUT_MS,
    DEFAULT_PROBE_TIMEOUT_MS, DOWNLOAD_PROGRESS_TICK_MS, INVOKE_TIMEOUT_ENV, INVOKE_TIMEOUT_MAX_MS,
    INVOKE_TIMEOUT_MIN_MS, PROBE_TIMEOUT_ENV, PROBE_TIMEOUT_MAX_MS, PROBE_TIMEOUT_MIN_MS,
};

/// Resolved once at startup from the hosting environment and handed by value
/// into [`crate::bootstrap_panel`]; nothing in the crate re-reads the
/// environment after this point.
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Loopback endpoint of the desktop shell's command bridge. `Some` is the
    /// native-bridge marker; absence means no bridge is offered.
    pub bridge_addr: Option<String>,
    /// Base address of the local HTTP control plane.
    pub control_plane_url: Url,
    pub invoke_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    pub progress_tick_ms: u64,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            bridge_addr: None,
            control_plane_url: Url::parse(DEFAULT_CONTROL_PLANE_URL)
                .unwrap_or_else(|_| unreachable!("default control plane url is valid")),
            invoke_timeout_ms: DEFAULT_INVOKE_TIMEOUT_MS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            progress_tick_ms: DOWNLOAD_PROGRESS_TICK_MS,
        }
    }
}

impl PanelConfig {
    pub fn from_env() -> Self {
        Self::from_env_with(|message| tracing::warn!("{message}"))
    }

    fn from_env_with<F>(mut log: F) -> Self
    where
        F: FnMut(String),
    {
        let defaults = Self::default();

        let bridge_addr = env::var(BRIDGE_ADDR_ENV)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let control_plane_url = match env::var(CONTROL_PLANE_URL_ENV) {
            Ok(raw) => resolve_control_plane_url(&raw, &defaults.control_plane_url, &mut log),
            Err(_) => defaults.control_plane_url.clone(),
        };

        let invoke_timeout_ms = match env::var(INVOKE_TIMEOUT_ENV) {
            Ok(raw) => parse_clamped_ms(
                &raw,
                INVOKE_TIMEOUT_ENV,
                DEFAULT_INVOKE_TIMEOUT_MS,
                INVOKE_TIMEOUT_MIN_MS,
                INVOKE_TIMEOUT_MAX_MS,
                &mut log,
            ),
            Err(_) => DEFAULT_INVOKE_TIMEOUT_MS,
        };

        let probe_timeout_ms = match env::var(PROBE_TIMEOUT_ENV) {
            Ok(raw) => parse_clamped_ms(
                &raw,
                PROBE_TIMEOUT_ENV,
                DEFAULT_PROBE_TIMEOUT_MS,
                PROBE_TIMEOUT_MIN_MS,
                PROBE_TIMEOUT_MAX_MS,
                &mut log,
            ),
            Err(_) => DEFAULT_PROBE_TIMEOUT_MS,
        };

        Self {
            bridge_addr,
            control_plane_url,
            invoke_timeout_ms,
            probe_timeout_ms,
            progress_tick_ms: defaults.progress_tick_ms,
        }
    }
}

fn resolve_control_plane_url<F>(raw: &str, fallback: &Url, log: &mut F) -> Url
where
    F: FnMut(String),
{
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        log(format!(
            "{CONTROL_PLANE_URL_ENV} is empty/whitespace, fallback to default '{fallback}'"
        ));
        return fallback.clone();
    }

    // Url::join treats a base without a trailing slash as a file, dropping
    // the last path segment, so normalize before parsing.
    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    match Url::parse(&normalized) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => url,
        Ok(url) => {
            log(format!(
                "{CONTROL_PLANE_URL_ENV} has unsupported scheme '{}', fallback to default '{fallback}'",
                url.scheme()
            ));
            fallback.clone()
        }
        Err(error) => {
            log(format!(
                "invalid {CONTROL_PLANE_URL_ENV}='{trimmed}': {error}, fallback to default '{fallback}'"
            ));
            fallback.clone()
        }
    }
}

fn parse_clamped_ms<F>(
    raw: &str,
    env_name: &str,
    fallback_ms: u64,
    min_ms: u64,
    max_ms: u64,
    log: &mut F,
) -> u64
where
    F: FnMut(String),
{
    match raw.trim().parse::<u128>() {
        Ok(parsed) if parsed > 0 => {
            if parsed < min_ms as u128 {
                log(format!(
                    "{env_name}='{raw}' is below minimum {min_ms}ms, clamped to {min_ms}ms"
                ));
                min_ms
            } else if parsed > max_ms as u128 {
                log(format!(
                    "{env_name}='{raw}' is above maximum {max_ms}ms, clamped to {max_ms}ms"
                ));
                max_ms
            } else {
                parsed as u64
            }
        }
        _ => {
            log(format!("invalid {env_name}='{raw}', fallback to {fallback_ms}ms"));
            fallback_ms
        }
    }
}
