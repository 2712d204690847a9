//! Per-project tool metrics with Prometheus-style export.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

/// Recent-error ring capacity per project.
const MAX_RECENT_ERRORS: usize = 10;

#[derive(Debug, Clone, Default, Serialize)]
struct ToolMetrics {
    calls_total: u64,
    calls_success: u64,
    calls_error: u64,
    latency_ms_total: f64,
}

impl ToolMetrics {
    fn latency_avg(&self) -> f64 {
        if self.calls_total == 0 {
            0.0
        } else {
            self.latency_ms_total / self.calls_total as f64
        }
    }

    fn error_rate(&self) -> f64 {
        if self.calls_total == 0 {
            0.0
        } else {
            self.calls_error as f64 / self.calls_total as f64 * 100.0
        }
    }
}

/// One retained error sample.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorSample {
    pub request_id: String,
    pub tool: String,
    pub project_id: String,
    pub message: String,
    pub latency_ms: f64,
    pub timestamp: DateTime<Utc>,
}

struct Pending {
    project_id: String,
    tool: String,
    started: Instant,
}

#[derive(Default)]
struct Inner {
    /// project → tool → counters
    metrics: HashMap<String, BTreeMap<String, ToolMetrics>>,
    pending: HashMap<String, Pending>,
    recent_errors: HashMap<String, VecDeque<ErrorSample>>,
    request_counter: u64,
}

/// Process-wide registry of per-project tool-call metrics.
///
/// For every tool call, `record_tool_call` opens a sample and returns a
/// request id; `record_tool_completion` closes it. The two are always
/// recorded in that order for a given request id.
pub struct MetricsRegistry {
    inner: Mutex<Inner>,
    metrics_dir: PathBuf,
}

impl MetricsRegistry {
    #[must_use]
    pub fn new(data_dir: &std::path::Path) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            metrics_dir: data_dir.join("metrics"),
        }
    }

    /// Open a sample for a tool call. Returns the request id.
    pub fn record_tool_call(&self, project_id: &str, tool: &str) -> String {
        let mut inner = self.inner.lock();
        let request_id = format!("req_{}", inner.request_counter);
        inner.request_counter += 1;
        inner.pending.insert(
            request_id.clone(),
            Pending {
                project_id: project_id.to_string(),
                tool: tool.to_string(),
                started: Instant::now(),
            },
        );
        debug!(request_id, tool, project_id, "tool call started");
        request_id
    }

    /// Close a sample. Returns the measured latency, or `None` for an
    /// unknown request id.
    pub fn record_tool_completion(
        &self,
        request_id: &str,
        is_error: bool,
        message: &str,
    ) -> Option<f64> {
        let mut inner = self.inner.lock();
        let Some(pending) = inner.pending.remove(request_id) else {
            warn!(request_id, "completion recorded for unknown request");
            return None;
        };

        let latency_ms = pending.started.elapsed().as_secs_f64() * 1_000.0;
        let tool_metrics = inner
            .metrics
            .entry(pending.project_id.clone())
            .or_default()
            .entry(pending.tool.clone())
            .or_default();

        tool_metrics.calls_total += 1;
        tool_metrics.latency_ms_total += latency_ms;
        if is_error {
            tool_metrics.calls_error += 1;
        } else {
            tool_metrics.calls_success += 1;
        }

        if is_error {
            error!(tool = %pending.tool, message, "tool error");
            let ring = inner
                .recent_errors
                .entry(pending.project_id.clone())
                .or_default();
            if ring.len() == MAX_RECENT_ERRORS {
                ring.pop_front();
            }
            ring.push_back(ErrorSample {
                request_id: request_id.to_string(),
                tool: pending.tool.clone(),
                project_id: pending.project_id.clone(),
                message: message.to_string(),
                latency_ms,
                timestamp: Utc::now(),
            });
        }

        debug!(request_id, latency_ms, is_error, "tool call completed");
        Some(latency_ms)
    }

    /// Prometheus text exposition for one project, labels
    /// `{project_id, tool}`.
    #[must_use]
    pub fn to_prometheus(&self, project_id: &str) -> String {
        let inner = self.inner.lock();
        let mut out = String::new();
        let _ = writeln!(out, "# TYPE tool_calls_total counter");
        let _ = writeln!(out, "# Metrics for project {project_id}");

        if let Some(tools) = inner.metrics.get(project_id) {
            for (tool, m) in tools {
                let labels = format!("{{project_id=\"{project_id}\",tool=\"{tool}\"}}");
                let _ = writeln!(out, "tool_calls_total{labels} {}", m.calls_total);
                let _ = writeln!(out, "tool_calls_success{labels} {}", m.calls_success);
                let _ = writeln!(out, "tool_calls_error{labels} {}", m.calls_error);
                let _ = writeln!(out, "tool_error_rate{labels} {:.2}", m.error_rate());
                let _ = writeln!(out, "tool_latency_ms_total{labels} {:.2}", m.latency_ms_total);
                let _ = writeln!(out, "tool_latency_ms_avg{labels} {:.2}", m.latency_avg());
            }
        }

        if let Some(errors) = inner.recent_errors.get(project_id) {
            if !errors.is_empty() {
                let _ = writeln!(out, "# Recent errors: {}", errors.len());
                for sample in errors {
                    let _ = writeln!(
                        out,
                        "# [{}] {}: {}",
                        sample.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
                        sample.tool,
                        sample.message
                    );
                }
            }
        }

        out
    }

    /// JSON summary for one project.
    #[must_use]
    pub fn to_json(&self, project_id: &str) -> serde_json::Value {
        let inner = self.inner.lock();
        let empty = BTreeMap::new();
        let tools = inner.metrics.get(project_id).unwrap_or(&empty);

        let mut total_calls = 0u64;
        let mut total_errors = 0u64;
        let mut by_tool = serde_json::Map::new();
        for (tool, m) in tools {
            total_calls += m.calls_total;
            total_errors += m.calls_error;
            by_tool.insert(
                tool.clone(),
                json!({
                    "calls": m.calls_total,
                    "success": m.calls_success,
                    "errors": m.calls_error,
                    "latency_avg_ms": m.latency_avg(),
                    "latency_total_ms": m.latency_ms_total,
                }),
            );
        }

        let success_rate = if total_calls > 0 {
            (total_calls - total_errors) as f64 / total_calls as f64 * 100.0
        } else {
            0.0
        };

        json!({
            "project_id": project_id,
            "total_calls": total_calls,
            "total_errors": total_errors,
            "success_rate": success_rate,
            "by_tool": by_tool,
            "recent_errors": inner
                .recent_errors
                .get(project_id)
                .map(VecDeque::len)
                .unwrap_or(0),
        })
    }

    /// Projects with recorded metrics.
    #[must_use]
    pub fn project_ids(&self) -> Vec<String> {
        self.inner.lock().metrics.keys().cloned().collect()
    }

    /// Recent error samples for a project, oldest first.
    #[must_use]
    pub fn recent_errors(&self, project_id: &str) -> Vec<ErrorSample> {
        self.inner
            .lock()
            .recent_errors
            .get(project_id)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Restore persisted counters from the metrics directory.
    ///
    /// Best effort: unreadable files are skipped. Only the per-tool
    /// counters and latency totals are restored; pending samples and the
    /// error ring start fresh.
    pub fn load(&self) {
        let Ok(entries) = std::fs::read_dir(&self.metrics_dir) else {
            debug!("no existing metrics directory");
            return;
        };

        let mut inner = self.inner.lock();
        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            let Some(project_id) = name.strip_suffix("_metrics.json") else { continue };

            let Ok(payload) = std::fs::read(&path) else { continue };
            let Ok(value) = serde_json::from_slice::<serde_json::Value>(&payload) else {
                warn!(path = %path.display(), "skipping unreadable metrics file");
                continue;
            };

            let Some(by_tool) = value["stats"]["by_tool"].as_object() else { continue };
            let tools = inner.metrics.entry(project_id.to_string()).or_default();
            for (tool, counters) in by_tool {
                let metrics = tools.entry(tool.clone()).or_default();
                metrics.calls_total = counters["calls"].as_u64().unwrap_or(0);
                metrics.calls_success = counters["success"].as_u64().unwrap_or(0);
                metrics.calls_error = counters["errors"].as_u64().unwrap_or(0);
                metrics.latency_ms_total = counters["latency_total_ms"].as_f64().unwrap_or(0.0);
            }
            info!(project_id, "restored persisted metrics");
        }
    }

    /// Persist one project's metrics to
    /// `<data_dir>/metrics/<project_id>_metrics.json`.
    pub fn save(&self, project_id: &str) -> Result<()> {
        std::fs::create_dir_all(&self.metrics_dir)?;
        let path = self.metrics_dir.join(format!("{project_id}_metrics.json"));
        let payload = json!({
            "stats": self.to_json(project_id),
            "prometheus": self.to_prometheus(project_id),
        });
        std::fs::write(&path, serde_json::to_vec_pretty(&payload)?)
            .map_err(|e| Error::storage_at(&path, e))?;
        info!(project_id, path = %path.display(), "saved metrics");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn call_completion_round_trip_counts() {
        let dir = TempDir::new().unwrap();
        let registry = MetricsRegistry::new(dir.path());

        let req = registry.record_tool_call("demo", "add_fact");
        let latency = registry.record_tool_completion(&req, false, "");
        assert!(latency.is_some());

        let req = registry.record_tool_call("demo", "add_fact");
        registry.record_tool_completion(&req, true, "boom");

        let stats = registry.to_json("demo");
        assert_eq!(stats["total_calls"], 2);
        assert_eq!(stats["total_errors"], 1);
        assert_eq!(stats["by_tool"]["add_fact"]["success"], 1);
    }

    #[test]
    fn totals_are_monotonic_across_calls() {
        let dir = TempDir::new().unwrap();
        let registry = MetricsRegistry::new(dir.path());

        let mut last_total = 0u64;
        for i in 0..5 {
            let req = registry.record_tool_call("demo", "search");
            registry.record_tool_completion(&req, i % 2 == 0, "e");
            let total = registry.to_json("demo")["total_calls"].as_u64().unwrap();
            assert!(total > last_total);
            last_total = total;
        }
    }

    #[test]
    fn unknown_request_ids_are_ignored() {
        let dir = TempDir::new().unwrap();
        let registry = MetricsRegistry::new(dir.path());
        assert!(registry.record_tool_completion("req_999", false, "").is_none());
    }

    #[test]
    fn prometheus_exposition_carries_labels() {
        let dir = TempDir::new().unwrap();
        let registry = MetricsRegistry::new(dir.path());
        let req = registry.record_tool_call("demo", "search");
        registry.record_tool_completion(&req, false, "");

        let text = registry.to_prometheus("demo");
        assert!(text.contains("tool_calls_total{project_id=\"demo\",tool=\"search\"} 1"));
        assert!(text.contains("tool_error_rate{project_id=\"demo\",tool=\"search\"} 0.00"));
        assert!(text.contains("tool_latency_ms_avg"));
    }

    #[test]
    fn error_ring_is_bounded() {
        let dir = TempDir::new().unwrap();
        let registry = MetricsRegistry::new(dir.path());
        for i in 0..15 {
            let req = registry.record_tool_call("demo", "ingest_file");
            registry.record_tool_completion(&req, true, &format!("error {i}"));
        }
        let errors = registry.recent_errors("demo");
        assert_eq!(errors.len(), MAX_RECENT_ERRORS);
        assert_eq!(errors[0].message, "error 5");
    }

    #[test]
    fn saved_counters_restore_on_load() {
        let dir = TempDir::new().unwrap();
        let registry = MetricsRegistry::new(dir.path());
        for _ in 0..3 {
            let req = registry.record_tool_call("demo", "search");
            registry.record_tool_completion(&req, false, "");
        }
        registry.save("demo").unwrap();

        let restored = MetricsRegistry::new(dir.path());
        restored.load();
        let stats = restored.to_json("demo");
        assert_eq!(stats["total_calls"], 3);
        assert_eq!(stats["by_tool"]["search"]["success"], 3);

        // Counters continue monotonically from the restored values.
        let req = restored.record_tool_call("demo", "search");
        restored.record_tool_completion(&req, false, "");
        assert_eq!(restored.to_json("demo")["total_calls"], 4);
    }

    #[test]
    fn save_writes_metrics_file() {
        let dir = TempDir::new().unwrap();
        let registry = MetricsRegistry::new(dir.path());
        let req = registry.record_tool_call("demo", "search");
        registry.record_tool_completion(&req, false, "");

        registry.save("demo").unwrap();
        let path = dir.path().join("metrics/demo_metrics.json");
        assert!(path.exists());
        let payload: serde_json::Value =
            serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(payload["stats"]["total_calls"], 1);
    }
}
