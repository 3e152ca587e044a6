//! Observation and Metrics
//!
//! Fire-and-forget instrumentation for the dispatcher. Sinks return nothing
//! and cannot fail, so they never change a dispatch outcome.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::AgentError;

/// Lifecycle phase of one agent run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    PreProcess,
    Process,
    PostProcess,
}

impl Phase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreProcess => "pre_process",
            Self::Process => "process",
            Self::PostProcess => "post_process",
        }
    }
}

/// Diagnostic hooks called by the dispatcher
pub trait DispatchObserver: Send + Sync {
    fn observe_can_handle(&self, _agent: &str, _eligible: bool) {}

    fn observe_selection(&self, _agent: Option<&str>) {}

    fn observe_process(&self, _agent: &str, _phase: Phase, _elapsed: Duration) {}

    fn observe_error(&self, _agent: &str, _error: &AgentError) {}

    fn observe_delegation(&self, _from: &str, _to: &str, _depth: usize) {}
}

/// Observer that ignores everything
pub struct NoopObserver;

impl DispatchObserver for NoopObserver {}

/// Observer that writes every observation to `tracing`
pub struct TracingObserver;

impl DispatchObserver for TracingObserver {
    fn observe_can_handle(&self, agent: &str, eligible: bool) {
        debug!(agent, eligible, "can_handle evaluated");
    }

    fn observe_selection(&self, agent: Option<&str>) {
        debug!(agent = agent.unwrap_or("<none>"), "Agent selected");
    }

    fn observe_process(&self, agent: &str, phase: Phase, elapsed: Duration) {
        debug!(agent, phase = phase.as_str(), elapsed_ms = elapsed.as_millis(), "Phase finished");
    }

    fn observe_error(&self, agent: &str, error: &AgentError) {
        warn!(agent, error = %error, "Agent failed");
    }

    fn observe_delegation(&self, from: &str, to: &str, depth: usize) {
        debug!(from, to, depth, "Delegating");
    }
}

/// Receives one record per agent run, success or failure
pub trait MetricsSink: Send + Sync {
    fn record_call(&self, agent: &str, success: bool, duration: Duration, tools_used: &[String]);
}

/// Aggregated counters for one agent
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AgentStats {
    pub calls: u64,
    pub failures: u64,
    pub total_duration_ms: u64,
    pub tool_usage: BTreeMap<String, u64>,
}

impl AgentStats {
    pub fn average_duration_ms(&self) -> u64 {
        self.total_duration_ms.checked_div(self.calls).unwrap_or(0)
    }
}

/// In-process metrics store
#[derive(Default)]
pub struct InMemoryMetrics {
    stats: Mutex<HashMap<String, AgentStats>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current counters, keyed by agent name
    pub fn snapshot(&self) -> BTreeMap<String, AgentStats> {
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn get(&self, agent: &str) -> Option<AgentStats> {
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.get(agent).cloned()
    }
}

impl MetricsSink for InMemoryMetrics {
    fn record_call(&self, agent: &str, success: bool, duration: Duration, tools_used: &[String]) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = stats.entry(agent.to_string()).or_default();
        entry.calls += 1;
        if !success {
            entry.failures += 1;
        }
        entry.total_duration_ms += u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        for tool in tools_used {
            *entry.tool_usage.entry(tool.clone()).or_default() += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_aggregate() {
        let metrics = InMemoryMetrics::new();
        metrics.record_call("files", true, Duration::from_millis(10), &["read_file".into()]);
        metrics.record_call(
            "files",
            false,
            Duration::from_millis(30),
            &["read_file".into(), "write_file".into()],
        );

        let stats = metrics.get("files").unwrap();
        assert_eq!(stats.calls, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.average_duration_ms(), 20);
        assert_eq!(stats.tool_usage["read_file"], 2);
        assert!(metrics.get("shell").is_none());
        assert_eq!(metrics.snapshot().len(), 1);
    }
}
