use std::{sync::Arc, time::Duration};

use tokio::net::TcpStream;
use url::Url;

use crate::{
    bridge_transport::BridgeTransport, control_plane_transport::ControlPlaneTransport,
    mock_transport::MockTransport, panel_config::PanelConfig, transport::Transport,
};

/// Explicit classification of the hosting environment, decided once at
/// startup. Selection never sniffs object shapes at call time; it probes the
/// candidate endpoints here and binds exactly one transport from the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEnvironment {
    /// A desktop shell advertises its command bridge and the endpoint
    /// answers.
    NativeBridge,
    /// No bridge is offered but the local HTTP control plane answers.
    ControlPlane,
    /// Neither backend is reachable: static preview/demo hosting.
    Preview,
}

impl HostEnvironment {
    pub fn as_label(self) -> &'static str {
        match self {
            Self::NativeBridge => "native-bridge",
            Self::ControlPlane => "control-plane",
            Self::Preview => "preview",
        }
    }
}

/// What detection concluded and what actually got bound. The two can differ
/// in one direction only: a detected bridge that fails during binding
/// degrades to the mock transport rather than failing resolution.
pub struct ResolvedTransport {
    pub environment: HostEnvironment,
    pub transport: Arc<dyn Transport>,
}

/// An advertised bridge whose endpoint does not answer is treated as
/// preview hosting, not as a reason to try the control plane: the marker
/// says a shell owns this process, so a reachable control plane would
/// belong to somebody else.
fn classify_host_environment(
    bridge_marker_present: bool,
    bridge_endpoint_answers: bool,
    control_plane_answers: bool,
) -> HostEnvironment {
    if bridge_marker_present {
        if bridge_endpoint_answers {
            HostEnvironment::NativeBridge
        } else {
            HostEnvironment::Preview
        }
    } else if control_plane_answers {
        HostEnvironment::ControlPlane
    } else {
        HostEnvironment::Preview
    }
}

async fn endpoint_answers(addr: &str, timeout_ms: u64) -> bool {
    let timeout = Duration::from_millis(timeout_ms.max(50));
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect(addr)).await,
        Ok(Ok(_))
    )
}

async fn control_plane_answers(base: &Url, timeout_ms: u64) -> bool {
    let host = match base.host_str() {
        Some(host) => host.to_string(),
        None => return false,
    };
    let port = base.port_or_known_default().unwrap_or(80);
    endpoint_answers(&format!("{host}:{port}"), timeout_ms).await
}

pub async fn detect_host_environment(config: &PanelConfig) -> HostEnvironment {
    let bridge_endpoint_answers = match config.bridge_addr.as_deref() {
        Some(addr) => endpoint_answers(addr, config.probe_timeout_ms).await,
        None => false,
    };
    // Only probe the control plane when no bridge is advertised; the
    // classification cannot use it otherwise.
    let control_plane_reachable = if config.bridge_addr.is_none() {
        control_plane_answers(&config.control_plane_url, config.probe_timeout_ms).await
    } else {
        false
    };

    classify_host_environment(
        config.bridge_addr.is_some(),
        bridge_endpoint_answers,
        control_plane_reachable,
    )
}

/// Resolves the one transport this process will use. Never fails: bridge
/// probing or binding errors log and degrade transparently to the mock
/// transport so the panel stays operable for inspection.
pub async fn resolve_transport(config: &PanelConfig) -> ResolvedTransport {
    let environment = detect_host_environment(config).await;

    let transport: Arc<dyn Transport> = match environment {
        HostEnvironment::NativeBridge => {
            let addr = config
                .bridge_addr
                .as_deref()
                .unwrap_or_default()
                .to_string();
            match BridgeTransport::connect(
                &addr,
                config.probe_timeout_ms,
                config.invoke_timeout_ms,
            )
            .await
            {
                Ok(bridge) => Arc::new(bridge),
                Err(error) => {
                    tracing::warn!(%error, addr, "bridge bind failed, falling back to mock");
                    Arc::new(MockTransport::new())
                }
            }
        }
        HostEnvironment::ControlPlane => {
            match ControlPlaneTransport::new(
                config.control_plane_url.clone(),
                config.invoke_timeout_ms,
            ) {
                Ok(control_plane) => Arc::new(control_plane),
                Err(error) => {
                    tracing::warn!(%error, "control plane bind failed, falling back to mock");
                    Arc::new(MockTransport::new())
                }
            }
        }
        HostEnvironment::Preview => {
            tracing::info!("no backend reachable, serving canned preview responses");
            Arc::new(MockTransport::new())
        }
    };

    ResolvedTransport {
        environment,
        transport,
    }
}
