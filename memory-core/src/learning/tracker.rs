//! Operation tracking and pattern/task detection.

use std::collections::{BTreeMap, VecDeque};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::{AutoLearningConfig, LearningMode};
use crate::types::OperationRecord;

/// Ring buffer capacity: the tracker keeps the last 100 operations.
const MAX_BUFFER_SIZE: usize = 100;

/// Window inspected by the pattern detectors.
const PATTERN_WINDOW: usize = 5;

/// What a detector fired on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    TaskCompletion,
    Pattern,
}

/// A detected candidate for episode extraction.
#[derive(Debug, Clone, Serialize)]
pub struct LearningCandidate {
    pub kind: CandidateKind,
    pub situation: String,
    pub action: String,
    pub outcome: String,
    pub confidence: f64,
}

/// Aggregate statistics over the operation buffer.
#[derive(Debug, Clone, Serialize)]
pub struct BufferStats {
    pub total_operations: usize,
    pub successful_operations: usize,
    pub failed_operations: usize,
    pub success_rate: f64,
    pub average_duration_ms: f64,
    pub unique_tools: usize,
    /// Top tools by call count, descending
    pub top_tools: Vec<(String, usize)>,
}

/// Tracks tool operations in a rolling buffer and detects completed tasks
/// and repeated patterns after every tracked op.
pub struct AutoLearningTracker {
    config: AutoLearningConfig,
    buffer: Mutex<VecDeque<OperationRecord>>,
}

impl AutoLearningTracker {
    #[must_use]
    pub fn new(config: AutoLearningConfig) -> Self {
        info!(enabled = config.enabled, mode = ?config.mode, "auto-learning tracker initialized");
        Self {
            config,
            buffer: Mutex::new(VecDeque::with_capacity(MAX_BUFFER_SIZE)),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Whether an operation should be tracked, honoring the per-call
    /// `auto_learn` override over the global flag.
    #[must_use]
    pub fn should_track(&self, operation: &OperationRecord) -> bool {
        if let Some(explicit) = operation.auto_learn_override() {
            return explicit && self.config.enabled;
        }
        self.config.enabled
    }

    /// Append an operation to the ring buffer (drop-oldest at capacity).
    pub fn track_operation(&self, operation: OperationRecord) {
        if !self.config.enabled {
            return;
        }
        let mut buffer = self.buffer.lock();
        if buffer.len() == MAX_BUFFER_SIZE {
            buffer.pop_front();
        }
        buffer.push_back(operation);
    }

    /// Detect a just-completed task from the last three operations.
    ///
    /// Fires when all three succeeded and either the window is a single
    /// repeated ingest tool, or it combines a search, a context read, and
    /// a write/edit operation; any other all-success window counts as a
    /// generic multi-step completion.
    #[must_use]
    pub fn detect_task_completion(&self) -> Option<LearningCandidate> {
        if !self.config.track_tasks {
            return None;
        }
        let buffer = self.buffer.lock();
        if buffer.len() < 3 {
            return None;
        }

        let last3: Vec<&OperationRecord> = buffer.iter().rev().take(3).collect();
        if !last3.iter().all(|op| op.result.is_success()) {
            return None;
        }

        let tools: Vec<&str> = last3.iter().map(|op| op.tool_name.as_str()).collect();

        if tools.iter().all(|t| *t == "ingest_file") {
            return Some(LearningCandidate {
                kind: CandidateKind::TaskCompletion,
                situation: "Multiple files needed to be ingested".to_string(),
                action: "File ingestion completed successfully for multiple files".to_string(),
                outcome: "success".to_string(),
                confidence: 0.8,
            });
        }

        let has_search = tools.contains(&"search");
        let has_context = tools.contains(&"get_context");
        let has_write = tools
            .iter()
            .any(|t| matches!(*t, "edit_file" | "write_file" | "edit" | "write"));
        if has_search && has_context && has_write {
            return Some(LearningCandidate {
                kind: CandidateKind::TaskCompletion,
                situation: "Search and code modification".to_string(),
                action: "Searched memory, retrieved context, and modified code".to_string(),
                outcome: "success".to_string(),
                confidence: 0.75,
            });
        }

        if !has_search && !has_context {
            let unique_tools = tools.iter().collect::<std::collections::HashSet<_>>().len();
            return Some(LearningCandidate {
                kind: CandidateKind::TaskCompletion,
                situation: format!("Multi-step operation using {unique_tools} different tools"),
                action: "Executed multiple operations successfully".to_string(),
                outcome: "success".to_string(),
                confidence: 0.7,
            });
        }

        None
    }

    /// Detect repeated failure/success patterns over the recent window.
    ///
    /// Two or more trailing consecutive errors on the same tool always
    /// fire; three same-tool successes fire only in aggressive mode with
    /// at least five buffered ops.
    #[must_use]
    pub fn detect_pattern(&self) -> Option<LearningCandidate> {
        if !self.config.track_operations {
            return None;
        }
        let buffer = self.buffer.lock();
        if buffer.len() < 2 {
            return None;
        }

        // Trailing consecutive errors on one tool.
        let mut trailing_errors = 0usize;
        let mut failed_tool: Option<&str> = None;
        for op in buffer.iter().rev() {
            if op.result.is_success() {
                break;
            }
            match failed_tool {
                None => failed_tool = Some(op.tool_name.as_str()),
                Some(tool) if tool == op.tool_name => {}
                Some(_) => break,
            }
            trailing_errors += 1;
        }
        if trailing_errors >= 2 {
            let tool = failed_tool.unwrap_or("unknown");
            debug!(tool, trailing_errors, "repeated failure pattern detected");
            return Some(LearningCandidate {
                kind: CandidateKind::Pattern,
                situation: format!("Repeated failures in {tool}"),
                action: format!(
                    "Attempted {tool} {trailing_errors} times consecutively without success"
                ),
                outcome: "failure".to_string(),
                confidence: 0.85,
            });
        }

        // Repeated successes, aggressive mode only.
        if self.config.mode == LearningMode::Aggressive && buffer.len() >= PATTERN_WINDOW {
            let recent: Vec<&OperationRecord> =
                buffer.iter().rev().take(PATTERN_WINDOW).collect();
            let successes: Vec<&str> = recent
                .iter()
                .filter(|op| op.result.is_success())
                .map(|op| op.tool_name.as_str())
                .collect();
            if successes.len() >= 3 {
                let first = successes[0];
                if successes.iter().all(|t| *t == first) {
                    return Some(LearningCandidate {
                        kind: CandidateKind::Pattern,
                        situation: format!("Repeated success with {first}"),
                        action: format!("Successfully used {first} {} times", successes.len()),
                        outcome: "success".to_string(),
                        confidence: 0.8,
                    });
                }
            }
        }

        None
    }

    /// Statistics over the current buffer contents.
    #[must_use]
    pub fn buffer_stats(&self) -> BufferStats {
        let buffer = self.buffer.lock();
        let total = buffer.len();
        let successes = buffer.iter().filter(|op| op.result.is_success()).count();

        let mut tool_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut duration_sum = 0u64;
        for op in buffer.iter() {
            *tool_counts.entry(op.tool_name.clone()).or_insert(0) += 1;
            duration_sum += op.duration_ms;
        }

        let mut top_tools: Vec<(String, usize)> = tool_counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
        top_tools.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_tools.truncate(5);

        BufferStats {
            total_operations: total,
            successful_operations: successes,
            failed_operations: total - successes,
            success_rate: if total > 0 { successes as f64 / total as f64 } else { 0.0 },
            average_duration_ms: if total > 0 { duration_sum as f64 / total as f64 } else { 0.0 },
            unique_tools: tool_counts.len(),
            top_tools,
        }
    }

    /// Clear the operation buffer.
    pub fn clear(&self) {
        self.buffer.lock().clear();
        info!("operation buffer cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OpResult;
    use chrono::Utc;
    use serde_json::json;

    fn enabled_config(mode: LearningMode) -> AutoLearningConfig {
        AutoLearningConfig {
            enabled: true,
            mode,
            ..AutoLearningConfig::default()
        }
    }

    fn op(tool: &str, result: OpResult) -> OperationRecord {
        OperationRecord {
            tool_name: tool.to_string(),
            project_id: "demo".to_string(),
            arguments: json!({}),
            result,
            outcome: "completed".to_string(),
            error: None,
            timestamp: Utc::now(),
            duration_ms: 5,
        }
    }

    #[test]
    fn buffer_caps_at_one_hundred() {
        let tracker = AutoLearningTracker::new(enabled_config(LearningMode::Moderate));
        for _ in 0..150 {
            tracker.track_operation(op("search", OpResult::Success));
        }
        assert_eq!(tracker.buffer_stats().total_operations, 100);
    }

    #[test]
    fn ingest_run_detects_task_completion() {
        let tracker = AutoLearningTracker::new(enabled_config(LearningMode::Moderate));
        for _ in 0..3 {
            tracker.track_operation(op("ingest_file", OpResult::Success));
        }
        let candidate = tracker.detect_task_completion().unwrap();
        assert_eq!(candidate.kind, CandidateKind::TaskCompletion);
        assert_eq!(candidate.confidence, 0.8);
    }

    #[test]
    fn search_context_write_window_detects_completion() {
        let tracker = AutoLearningTracker::new(enabled_config(LearningMode::Moderate));
        tracker.track_operation(op("search", OpResult::Success));
        tracker.track_operation(op("get_context", OpResult::Success));
        tracker.track_operation(op("edit_file", OpResult::Success));

        let candidate = tracker.detect_task_completion().unwrap();
        assert_eq!(candidate.confidence, 0.75);
        assert!(candidate.situation.contains("Search and code modification"));
    }

    #[test]
    fn consecutive_same_tool_errors_detect_pattern() {
        let tracker = AutoLearningTracker::new(enabled_config(LearningMode::Moderate));
        tracker.track_operation(op("ingest_file", OpResult::Error));
        tracker.track_operation(op("ingest_file", OpResult::Error));

        let candidate = tracker.detect_pattern().unwrap();
        assert_eq!(candidate.kind, CandidateKind::Pattern);
        assert_eq!(candidate.confidence, 0.85);
        assert_eq!(candidate.outcome, "failure");
    }

    #[test]
    fn mixed_tool_errors_do_not_fire() {
        let tracker = AutoLearningTracker::new(enabled_config(LearningMode::Moderate));
        tracker.track_operation(op("search", OpResult::Error));
        tracker.track_operation(op("ingest_file", OpResult::Error));
        assert!(tracker.detect_pattern().is_none());
    }

    #[test]
    fn success_patterns_need_aggressive_mode() {
        let moderate = AutoLearningTracker::new(enabled_config(LearningMode::Moderate));
        let aggressive = AutoLearningTracker::new(enabled_config(LearningMode::Aggressive));
        for tracker in [&moderate, &aggressive] {
            for _ in 0..5 {
                tracker.track_operation(op("add_fact", OpResult::Success));
            }
        }

        assert!(moderate.detect_pattern().is_none());
        let candidate = aggressive.detect_pattern().unwrap();
        assert_eq!(candidate.confidence, 0.8);
        assert_eq!(candidate.outcome, "success");
    }

    #[test]
    fn auto_learn_override_gates_tracking() {
        let tracker = AutoLearningTracker::new(enabled_config(LearningMode::Moderate));

        let mut opted_out = op("search", OpResult::Success);
        opted_out.arguments = json!({"auto_learn": false});
        assert!(!tracker.should_track(&opted_out));

        let default_op = op("search", OpResult::Success);
        assert!(tracker.should_track(&default_op));

        let disabled = AutoLearningTracker::new(AutoLearningConfig::default());
        assert!(!disabled.should_track(&default_op));
    }

    #[test]
    fn stats_summarize_buffer() {
        let tracker = AutoLearningTracker::new(enabled_config(LearningMode::Moderate));
        tracker.track_operation(op("search", OpResult::Success));
        tracker.track_operation(op("search", OpResult::Success));
        tracker.track_operation(op("add_fact", OpResult::Error));

        let stats = tracker.buffer_stats();
        assert_eq!(stats.total_operations, 3);
        assert_eq!(stats.failed_operations, 1);
        assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.top_tools[0], ("search".to_string(), 2));
    }
}
