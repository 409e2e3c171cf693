//! Per-stage and total token accounting for a run.

use super::{TokenUsage, UsageCounts};
use crate::errors::InvalidUsageValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Usage recorded for one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageUsage {
    /// The stage name.
    pub stage: String,
    /// The stage's token usage.
    pub usage: TokenUsage,
}

/// Snapshot of a tracker: per-stage usage in recording order plus the total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSummary {
    /// Usage per stage, in the order stages were first recorded.
    pub per_stage: Vec<StageUsage>,
    /// Sum of all per-stage usage.
    pub total: TokenUsage,
}

impl UsageSummary {
    /// Returns the usage recorded for a stage.
    #[must_use]
    pub fn get(&self, stage: &str) -> Option<&TokenUsage> {
        self.per_stage
            .iter()
            .find(|entry| entry.stage == stage)
            .map(|entry| &entry.usage)
    }
}

impl fmt::Display for UsageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .per_stage
            .iter()
            .map(|entry| entry.stage.len())
            .chain(std::iter::once("stage".len()))
            .max()
            .unwrap_or(5);

        writeln!(
            f,
            "{:<width$}  {:>10}  {:>10}  {:>10}",
            "stage", "prompt", "completion", "total"
        )?;
        for entry in &self.per_stage {
            writeln!(
                f,
                "{:<width$}  {:>10}  {:>10}  {:>10}",
                entry.stage,
                entry.usage.prompt_tokens,
                entry.usage.completion_tokens,
                entry.usage.total_tokens
            )?;
        }
        write!(
            f,
            "{:<width$}  {:>10}  {:>10}  {:>10}",
            "TOTAL", self.total.prompt_tokens, self.total.completion_tokens, self.total.total_tokens
        )
    }
}

/// Accumulates token usage across the stages of one run.
///
/// Each run owns its own tracker; nothing here is shared between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTracker {
    entries: Vec<StageUsage>,
    total: TokenUsage,
}

impl UsageTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the usage reported for a stage.
    ///
    /// Recording a stage again replaces its previous entry, so a rerun never
    /// double-counts.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidUsageValue`] if any counter is negative. The tracker
    /// is left unchanged in that case.
    pub fn record(
        &mut self,
        stage_name: &str,
        counts: UsageCounts,
    ) -> Result<TokenUsage, InvalidUsageValue> {
        let usage = TokenUsage::try_from(counts)?;

        if let Some(existing) = self.entries.iter_mut().find(|e| e.stage == stage_name) {
            existing.usage = usage;
            self.total = self.entries.iter().map(|e| e.usage).sum();
        } else {
            self.entries.push(StageUsage {
                stage: stage_name.to_string(),
                usage,
            });
            self.total += usage;
        }

        debug!(
            stage = stage_name,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.total_tokens,
            "Recorded stage usage"
        );

        Ok(usage)
    }

    /// Returns the running total.
    #[must_use]
    pub fn total(&self) -> TokenUsage {
        self.total
    }

    /// Returns the number of stages recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns a snapshot of per-stage and total usage.
    #[must_use]
    pub fn summary(&self) -> UsageSummary {
        UsageSummary {
            per_stage: self.entries.clone(),
            total: self.total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_total_is_componentwise_sum() {
        let mut tracker = UsageTracker::new();
        let reported = [
            UsageCounts::new(100, 50, 150),
            UsageCounts::new(20, 30, 50),
            UsageCounts::new(7, 0, 7),
        ];

        for (i, counts) in reported.iter().enumerate() {
            tracker.record(&format!("stage{i}"), *counts).unwrap();
        }

        let summary = tracker.summary();
        assert_eq!(summary.total, TokenUsage::new(127, 80, 207));
        assert_eq!(summary.per_stage.len(), 3);
        assert_eq!(summary.get("stage1"), Some(&TokenUsage::new(20, 30, 50)));
    }

    #[test]
    fn test_rerecording_stage_replaces_entry() {
        let mut tracker = UsageTracker::new();
        tracker.record("a", UsageCounts::new(10, 10, 20)).unwrap();
        tracker.record("b", UsageCounts::new(1, 1, 2)).unwrap();
        tracker.record("a", UsageCounts::new(5, 5, 10)).unwrap();

        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.total(), TokenUsage::new(6, 6, 12));
        assert_eq!(tracker.summary().per_stage[0].stage, "a");
    }

    #[test]
    fn test_negative_value_leaves_tracker_unchanged() {
        let mut tracker = UsageTracker::new();
        tracker.record("a", UsageCounts::new(1, 1, 2)).unwrap();

        let err = tracker.record("b", UsageCounts::new(-1, 1, 0)).unwrap_err();

        assert_eq!(err.field, "prompt_tokens");
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.total(), TokenUsage::new(1, 1, 2));
    }

    #[test]
    fn test_summary_display_has_total_row() {
        let mut tracker = UsageTracker::new();
        tracker.record("schema", UsageCounts::new(12, 3, 15)).unwrap();

        let rendered = tracker.summary().to_string();
        assert!(rendered.lines().next().unwrap().starts_with("stage"));
        assert!(rendered.contains("schema"));
        assert!(rendered.lines().last().unwrap().starts_with("TOTAL"));
    }

    #[test]
    fn test_empty_tracker() {
        let tracker = UsageTracker::new();
        assert!(tracker.is_empty());
        assert!(tracker.total().is_zero());
    }
}
