//! Bridge counters for monitoring and observability.
//!
//! Every non-fatal drop path (stale response, missing handler, malformed
//! message) is counted here in addition to being logged.

use crate::bridge::LifecycleState;
use crate::error::ErrorCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a bridge's counters and state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStats {
    /// Bridge instance id
    pub bridge_id: String,

    /// Lifecycle state at snapshot time
    pub state: LifecycleState,

    /// Outbound calls delivered to the runtime
    pub calls_sent: u64,

    /// Responses that resolved a pending call
    pub responses_resolved: u64,

    /// Responses whose id had no pending entry
    pub stale_responses: u64,

    /// Inbound calls dispatched to a handler
    pub inbound_calls: u64,

    /// Responses sent back for inbound calls
    pub responses_sent: u64,

    /// Calls currently awaiting a response
    pub pending_calls: usize,

    /// Registered handlers
    pub registered_handlers: usize,

    /// When the bridge was created
    pub created_at: DateTime<Utc>,

    /// When the peer signalled readiness
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_at: Option<DateTime<Utc>>,
}

/// Metrics collector for aggregating bridge activity
pub struct MetricsCollector {
    calls_sent: AtomicU64,
    responses_resolved: AtomicU64,
    stale_responses: AtomicU64,
    cancelled_calls: AtomicU64,
    abandoned_calls: AtomicU64,
    inbound_calls: AtomicU64,
    responses_sent: AtomicU64,
    console_lines: AtomicU64,
    console_dropped: AtomicU64,
    handler_calls: parking_lot::Mutex<HashMap<String, u64>>,
    error_counts: parking_lot::Mutex<HashMap<ErrorCode, u64>>,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            calls_sent: AtomicU64::new(0),
            responses_resolved: AtomicU64::new(0),
            stale_responses: AtomicU64::new(0),
            cancelled_calls: AtomicU64::new(0),
            abandoned_calls: AtomicU64::new(0),
            inbound_calls: AtomicU64::new(0),
            responses_sent: AtomicU64::new(0),
            console_lines: AtomicU64::new(0),
            console_dropped: AtomicU64::new(0),
            handler_calls: parking_lot::Mutex::new(HashMap::new()),
            error_counts: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Record an outbound call
    pub fn record_call_sent(&self) {
        self.calls_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a response that resolved (or missed) a pending call
    pub fn record_response(&self, resolved: bool) {
        if resolved {
            self.responses_resolved.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stale_responses.fetch_add(1, Ordering::Relaxed);
            self.record_error(ErrorCode::StaleResponse);
        }
    }

    /// Record a call cancelled by its caller
    pub fn record_cancelled(&self) {
        self.cancelled_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Record calls abandoned by reset or teardown
    pub fn record_abandoned(&self, count: usize) {
        self.abandoned_calls
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Record an inbound call dispatched to a handler
    pub fn record_inbound(&self, handler_name: &str) {
        self.inbound_calls.fetch_add(1, Ordering::Relaxed);
        let mut calls = self.handler_calls.lock();
        *calls.entry(handler_name.to_string()).or_insert(0) += 1;
    }

    /// Record a response sent for an inbound call
    pub fn record_response_sent(&self) {
        self.responses_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a console line, delivered or dropped
    pub fn record_console(&self, delivered: bool) {
        if delivered {
            self.console_lines.fetch_add(1, Ordering::Relaxed);
        } else {
            self.console_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record an error
    pub fn record_error(&self, code: ErrorCode) {
        let mut counts = self.error_counts.lock();
        *counts.entry(code).or_insert(0) += 1;
    }

    /// Get outbound calls
    pub fn calls_sent(&self) -> u64 {
        self.calls_sent.load(Ordering::Relaxed)
    }

    /// Get resolved responses
    pub fn responses_resolved(&self) -> u64 {
        self.responses_resolved.load(Ordering::Relaxed)
    }

    /// Get stale responses
    pub fn stale_responses(&self) -> u64 {
        self.stale_responses.load(Ordering::Relaxed)
    }

    /// Get cancelled calls
    pub fn cancelled_calls(&self) -> u64 {
        self.cancelled_calls.load(Ordering::Relaxed)
    }

    /// Get abandoned calls
    pub fn abandoned_calls(&self) -> u64 {
        self.abandoned_calls.load(Ordering::Relaxed)
    }

    /// Get inbound calls
    pub fn inbound_calls(&self) -> u64 {
        self.inbound_calls.load(Ordering::Relaxed)
    }

    /// Get responses sent
    pub fn responses_sent(&self) -> u64 {
        self.responses_sent.load(Ordering::Relaxed)
    }

    /// Get delivered console lines
    pub fn console_lines(&self) -> u64 {
        self.console_lines.load(Ordering::Relaxed)
    }

    /// Get dropped console lines
    pub fn console_dropped(&self) -> u64 {
        self.console_dropped.load(Ordering::Relaxed)
    }

    /// Get per-handler inbound call counts
    pub fn handler_calls(&self) -> HashMap<String, u64> {
        self.handler_calls.lock().clone()
    }

    /// Get the count for one error code
    pub fn error_count(&self, code: ErrorCode) -> u64 {
        self.error_counts.lock().get(&code).copied().unwrap_or(0)
    }

    /// Get error counts
    pub fn error_counts(&self) -> HashMap<ErrorCode, u64> {
        self.error_counts.lock().clone()
    }

    /// Reset all metrics
    pub fn reset(&self) {
        self.calls_sent.store(0, Ordering::Relaxed);
        self.responses_resolved.store(0, Ordering::Relaxed);
        self.stale_responses.store(0, Ordering::Relaxed);
        self.cancelled_calls.store(0, Ordering::Relaxed);
        self.abandoned_calls.store(0, Ordering::Relaxed);
        self.inbound_calls.store(0, Ordering::Relaxed);
        self.responses_sent.store(0, Ordering::Relaxed);
        self.console_lines.store(0, Ordering::Relaxed);
        self.console_dropped.store(0, Ordering::Relaxed);
        self.handler_calls.lock().clear();
        self.error_counts.lock().clear();
    }

    /// Export Prometheus-format metrics
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP etherweb_bridge_calls_total Outbound calls sent to the runtime\n");
        output.push_str("# TYPE etherweb_bridge_calls_total counter\n");
        output.push_str(&format!("etherweb_bridge_calls_total {}\n", self.calls_sent()));

        output.push_str("\n# HELP etherweb_bridge_responses_total Responses received by outcome\n");
        output.push_str("# TYPE etherweb_bridge_responses_total counter\n");
        output.push_str(&format!(
            "etherweb_bridge_responses_total{{outcome=\"resolved\"}} {}\n",
            self.responses_resolved()
        ));
        output.push_str(&format!(
            "etherweb_bridge_responses_total{{outcome=\"stale\"}} {}\n",
            self.stale_responses()
        ));

        output.push_str("\n# HELP etherweb_bridge_unanswered_calls_total Calls that never completed\n");
        output.push_str("# TYPE etherweb_bridge_unanswered_calls_total counter\n");
        output.push_str(&format!(
            "etherweb_bridge_unanswered_calls_total{{reason=\"cancelled\"}} {}\n",
            self.cancelled_calls()
        ));
        output.push_str(&format!(
            "etherweb_bridge_unanswered_calls_total{{reason=\"abandoned\"}} {}\n",
            self.abandoned_calls()
        ));

        output.push_str("\n# HELP etherweb_bridge_inbound_calls_total Inbound calls by handler\n");
        output.push_str("# TYPE etherweb_bridge_inbound_calls_total counter\n");
        for (name, count) in self.handler_calls() {
            output.push_str(&format!(
                "etherweb_bridge_inbound_calls_total{{handler=\"{}\"}} {}\n",
                escape_label_value(&name),
                count
            ));
        }

        output.push_str("\n# HELP etherweb_bridge_console_lines_total Console lines by outcome\n");
        output.push_str("# TYPE etherweb_bridge_console_lines_total counter\n");
        output.push_str(&format!(
            "etherweb_bridge_console_lines_total{{outcome=\"delivered\"}} {}\n",
            self.console_lines()
        ));
        output.push_str(&format!(
            "etherweb_bridge_console_lines_total{{outcome=\"dropped\"}} {}\n",
            self.console_dropped()
        ));

        output.push_str("\n# HELP etherweb_bridge_errors_total Error counts by code\n");
        output.push_str("# TYPE etherweb_bridge_errors_total counter\n");
        for (code, count) in self.error_counts() {
            output.push_str(&format!(
                "etherweb_bridge_errors_total{{code=\"{}\"}} {}\n",
                escape_label_value(&code.to_string()),
                count
            ));
        }

        output
    }
}

/// Escape a Prometheus label value
fn escape_label_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_starts_empty() {
        let collector = MetricsCollector::new();
        assert_eq!(collector.calls_sent(), 0);
        assert!(collector.error_counts().is_empty());
    }

    #[test]
    fn test_stale_response_counts_as_error() {
        let collector = MetricsCollector::new();
        collector.record_response(true);
        collector.record_response(false);
        collector.record_response(false);

        assert_eq!(collector.responses_resolved(), 1);
        assert_eq!(collector.stale_responses(), 2);
        assert_eq!(collector.error_count(ErrorCode::StaleResponse), 2);
    }

    #[test]
    fn test_handler_call_counts() {
        let collector = MetricsCollector::new();
        collector.record_inbound("FinishLoad");
        collector.record_inbound("echo");
        collector.record_inbound("echo");

        let calls = collector.handler_calls();
        assert_eq!(calls.get("echo"), Some(&2));
        assert_eq!(collector.inbound_calls(), 3);
    }

    #[test]
    fn test_reset() {
        let collector = MetricsCollector::new();
        collector.record_call_sent();
        collector.record_abandoned(4);
        collector.record_error(ErrorCode::NoHandler);
        collector.reset();

        assert_eq!(collector.calls_sent(), 0);
        assert_eq!(collector.abandoned_calls(), 0);
        assert_eq!(collector.error_count(ErrorCode::NoHandler), 0);
    }

    #[test]
    fn test_prometheus_label_values_are_escaped() {
        let collector = MetricsCollector::new();
        collector.record_inbound("say \"hi\"\\now\nplease");

        let output = collector.to_prometheus();
        assert!(output.contains(
            r#"etherweb_bridge_inbound_calls_total{handler="say \"hi\"\\now\nplease"} 1"#
        ));
        assert!(output
            .lines()
            .all(|line| line.is_empty() || line.starts_with('#') || line.starts_with("etherweb_bridge_")));
    }

    #[test]
    fn test_prometheus_output() {
        let collector = MetricsCollector::new();
        collector.record_call_sent();
        collector.record_error(ErrorCode::DecodeError);
        collector.record_inbound("echo");

        let output = collector.to_prometheus();
        assert!(output.contains("etherweb_bridge_calls_total 1"));
        assert!(output.contains("etherweb_bridge_errors_total{code=\"DECODE_ERROR\"} 1"));
        assert!(output.contains("handler=\"echo\""));
    }
}
