//! The single boundary where raw transport payloads become typed status.
//! Structured objects (control-plane path) only get field renaming and
//! defaulting; single human-readable lines (bridge path) go through keyword
//! and pattern matching. Parsing never fails: sentinel or unrecognized input
//! degrades to the all-default value and is logged, not raised.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::status_model::{ConnectivityStatus, ProcessStatus, SubscriptionSummary};

fn pid_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)pid\s*[=:]\s*(\d+)").unwrap_or_else(|_| unreachable!("pid pattern is valid"))
    })
}

fn ratio_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\d+)\s*/\s*(\d+)")
            .unwrap_or_else(|_| unreachable!("ratio pattern is valid"))
    })
}

fn protocol_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\(([^)]+)\)")
            .unwrap_or_else(|_| unreachable!("protocol pattern is valid"))
    })
}

fn self_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // Requires whitespace before the dash so hyphenated protocol labels
        // are not mistaken for a trailing self id.
        Regex::new(r"\s-\s*(\S+)\s*$")
            .unwrap_or_else(|_| unreachable!("self id pattern is valid"))
    })
}

/// Sentinel lines the bridge emits when a query has no real answer.
fn is_sentinel_text(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered.contains("not implemented")
        || lowered.contains("unavailable")
        || text.contains("未实现")
        || text.contains("无法获取")
}

pub fn parse_process_status(raw: &Value) -> ProcessStatus {
    match raw {
        Value::String(text) => parse_process_status_text(text),
        Value::Object(_) => parse_process_status_object(raw),
        _ => {
            log_parse_fallback("process status", raw);
            ProcessStatus::default()
        }
    }
}

fn parse_process_status_object(raw: &Value) -> ProcessStatus {
    let running = raw["running"].as_bool().unwrap_or(false);
    let pid = match &raw["pid"] {
        Value::String(pid) if !pid.is_empty() => Some(pid.clone()),
        Value::Number(pid) => Some(pid.to_string()),
        _ => None,
    };
    ProcessStatus {
        running,
        pid,
        started_at: None,
    }
}

fn parse_process_status_text(text: &str) -> ProcessStatus {
    if is_sentinel_text(text) {
        log_text_fallback("process status", text);
        return ProcessStatus::default();
    }

    let lowered = text.to_lowercase();
    let stopped_marker = lowered.contains("not running")
        || lowered.contains("stopped")
        || lowered.contains("exited")
        || text.contains("未运行")
        || text.contains("已退出");
    let running_marker = lowered.contains("running") || text.contains("运行中");
    let running = running_marker && !stopped_marker;

    let pid = if running {
        pid_pattern()
            .captures(text)
            .and_then(|captures| captures.get(1))
            .map(|digits| digits.as_str().to_string())
    } else {
        None
    };

    ProcessStatus {
        running,
        pid,
        started_at: None,
    }
}

pub fn parse_connectivity(raw: &Value) -> ConnectivityStatus {
    match raw {
        Value::String(text) => parse_connectivity_text(text),
        Value::Object(_) => parse_connectivity_object(raw),
        _ => {
            log_parse_fallback("connectivity", raw);
            ConnectivityStatus::default()
        }
    }
}

fn parse_connectivity_object(raw: &Value) -> ConnectivityStatus {
    ConnectivityStatus {
        connected: raw["connected"].as_bool().unwrap_or(false),
        online: raw["online"].as_bool().unwrap_or(false),
        // The control plane calls this field "good"; accept the canonical
        // name as well so structured bridge payloads round-trip.
        healthy: raw["good"]
            .as_bool()
            .or_else(|| raw["healthy"].as_bool())
            .unwrap_or(false),
        protocol_label: raw["protocol"].as_str().map(str::to_string),
        self_id: match &raw["self_id"] {
            Value::String(id) if !id.is_empty() => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        },
    }
}

fn parse_connectivity_text(text: &str) -> ConnectivityStatus {
    if is_sentinel_text(text) {
        log_text_fallback("connectivity", text);
        return ConnectivityStatus::default();
    }

    let lowered = text.to_lowercase();
    let disconnected_marker = lowered.contains("not connected")
        || lowered.contains("disconnected")
        || lowered.contains("offline")
        || text.contains("未连接")
        || text.contains("离线");
    let connected_marker = lowered.contains("connected")
        || lowered.contains("online")
        || text.contains("已连接")
        || text.contains("在线");
    let connected = connected_marker && !disconnected_marker;

    if !connected {
        return ConnectivityStatus::default();
    }

    // The text form only carries one bit of health, so online/healthy follow
    // the connected marker. Label and self id ride along when present, e.g.
    // "已连接 (OneBot v11) - 12345".
    let protocol_label = protocol_pattern()
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|label| label.as_str().trim().to_string());
    let self_id = self_id_pattern()
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string());

    ConnectivityStatus {
        connected: true,
        online: true,
        healthy: true,
        protocol_label,
        self_id,
    }
}

pub fn parse_subscription_summary(raw: &Value) -> SubscriptionSummary {
    match raw {
        Value::String(text) => parse_subscription_summary_text(text),
        Value::Object(_) => parse_subscription_summary_object(raw),
        _ => {
            log_parse_fallback("subscription summary", raw);
            SubscriptionSummary::default()
        }
    }
}

fn parse_subscription_summary_object(raw: &Value) -> SubscriptionSummary {
    let per_source = raw["bySite"]
        .as_object()
        .or_else(|| raw["per_source"].as_object())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|(source, count)| {
                    count
                        .as_u64()
                        .map(|count| (source.clone(), count.min(u32::MAX as u64) as u32))
                })
                .collect()
        })
        .unwrap_or_default();

    SubscriptionSummary {
        total: count_field(raw, "total"),
        active: count_field(raw, "active"),
        paused: count_field(raw, "paused"),
        per_source,
    }
}

fn count_field(raw: &Value, field: &str) -> u32 {
    raw[field]
        .as_u64()
        .map(|count| count.min(u32::MAX as u64) as u32)
        .unwrap_or(0)
}

fn parse_subscription_summary_text(text: &str) -> SubscriptionSummary {
    if is_sentinel_text(text) {
        log_text_fallback("subscription summary", text);
        return SubscriptionSummary::default();
    }

    // The bridge format is "active/total"; it carries no paused count.
    match ratio_pattern().captures(text) {
        Some(captures) => {
            let active = captures
                .get(1)
                .and_then(|digits| digits.as_str().parse::<u32>().ok())
                .unwrap_or(0);
            let total = captures
                .get(2)
                .and_then(|digits| digits.as_str().parse::<u32>().ok())
                .unwrap_or(0);
            SubscriptionSummary {
                total,
                active,
                paused: 0,
                per_source: Default::default(),
            }
        }
        None => {
            log_text_fallback("subscription summary", text);
            SubscriptionSummary::default()
        }
    }
}

fn log_parse_fallback(what: &str, raw: &Value) {
    tracing::debug!(payload = %raw, "unrecognized {what} payload shape, using defaults");
}

fn log_text_fallback(what: &str, text: &str) {
    tracing::debug!(text, "unmatched {what} text, using defaults");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn process_text_with_running_marker_and_pid_is_captured() {
        let status = parse_process_status(&json!("运行中 pid=4821"));
        assert_eq!(
            status,
            ProcessStatus {
                running: true,
                pid: Some("4821".to_string()),
                started_at: None,
            }
        );
    }

    #[test]
    fn process_text_with_parenthesized_pid_is_captured() {
        let status = parse_process_status(&json!("运行中 (pid=772)"));
        assert!(status.running);
        assert_eq!(status.pid.as_deref(), Some("772"));
    }

    #[test]
    fn process_text_without_running_marker_has_no_pid() {
        let status = parse_process_status(&json!("已退出 (code=1) pid=4821"));
        assert!(!status.running);
        assert_eq!(status.pid, None);
    }

    #[test]
    fn process_text_not_running_beats_running_substring() {
        assert!(!parse_process_status(&json!("not running")).running);
        assert!(!parse_process_status(&json!("未运行")).running);
    }

    #[test]
    fn process_object_accepts_numeric_and_string_pids() {
        let numeric = parse_process_status(&json!({"running": true, "pid": 4821}));
        assert_eq!(numeric.pid.as_deref(), Some("4821"));

        let string = parse_process_status(&json!({"running": true, "pid": "4821"}));
        assert_eq!(string.pid.as_deref(), Some("4821"));
    }

    #[test]
    fn process_sentinel_text_parses_to_default() {
        assert_eq!(
            parse_process_status(&json!("not implemented")),
            ProcessStatus::default()
        );
        assert_eq!(parse_process_status(&json!("未知")), ProcessStatus::default());
    }

    #[test]
    fn connectivity_text_extracts_protocol_and_self_id() {
        let status = parse_connectivity(&json!("已连接 (OneBot v11) - 12345"));
        assert!(status.connected && status.online && status.healthy);
        assert_eq!(status.protocol_label.as_deref(), Some("OneBot v11"));
        assert_eq!(status.self_id.as_deref(), Some("12345"));
    }

    #[test]
    fn connectivity_text_disconnected_markers_win() {
        assert!(!parse_connectivity(&json!("disconnected")).connected);
        assert!(!parse_connectivity(&json!("未连接")).connected);
        assert!(!parse_connectivity(&json!("offline but online soon")).connected);
    }

    #[test]
    fn connectivity_object_maps_good_to_healthy() {
        let status = parse_connectivity(&json!({
            "connected": true,
            "online": true,
            "good": true,
            "protocol": "OneBot v11",
            "self_id": 9876
        }));
        assert!(status.healthy);
        assert_eq!(status.self_id.as_deref(), Some("9876"));
    }

    #[test]
    fn subscription_ratio_text_maps_to_active_and_total() {
        let summary = parse_subscription_summary(&json!("3/10"));
        assert_eq!(
            summary,
            SubscriptionSummary {
                total: 10,
                active: 3,
                paused: 0,
                per_source: Default::default(),
            }
        );
    }

    #[test]
    fn subscription_sentinel_and_unmatched_text_yield_zeroes() {
        assert_eq!(
            parse_subscription_summary(&json!("无法获取状态")),
            SubscriptionSummary::default()
        );
        assert_eq!(
            parse_subscription_summary(&json!("42 (offline)")),
            SubscriptionSummary::default(),
        );
    }

    #[test]
    fn subscription_object_maps_by_site_to_per_source() {
        let summary = parse_subscription_summary(&json!({
            "total": 12,
            "active": 9,
            "paused": 3,
            "bySite": {"bilibili": 8, "douyu": 4}
        }));
        assert_eq!(summary.total, 12);
        assert_eq!(summary.active, 9);
        assert_eq!(summary.paused, 3);
        assert_eq!(summary.per_source.get("bilibili"), Some(&8));
        assert_eq!(summary.per_source.get("douyu"), Some(&4));
    }
}
