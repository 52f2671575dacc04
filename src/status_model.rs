//! Canonical, transport-independent status model. Both the structured
//! control-plane payloads and the bridge's human-readable status lines
//! converge onto these types, so the sync store never needs to know which
//! transport produced a value.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessStatus {
    pub running: bool,
    pub pid: Option<String>,
    /// Bridge-path backends report no historical start timestamp; the store
    /// stamps this with the time a refresh first observed the process
    /// running, so uptime derived from it is approximate in that mode.
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectivityStatus {
    pub connected: bool,
    pub online: bool,
    pub healthy: bool,
    pub protocol_label: Option<String>,
    pub self_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubscriptionSummary {
    pub total: u32,
    pub active: u32,
    pub paused: u32,
    pub per_source: HashMap<String, u32>,
}
