use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::shared::outcome::{Outcome, OutcomeResult};

/// Counters for one label (or the whole run).
///
/// `failure_count` always equals `rejected_count + mismatch_count + error_count`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LabelStats {
    pub success_count: usize,
    pub failure_count: usize,
    pub rejected_count: usize,
    pub mismatch_count: usize,
    pub error_count: usize,
}

impl LabelStats {
    pub fn total(&self) -> usize {
        self.success_count + self.failure_count
    }

    /// Share of successful items, `0.0` when nothing was recorded.
    pub fn accuracy(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.success_count as f64 / total as f64,
        }
    }

    fn add(&mut self, result: &OutcomeResult) {
        match result {
            OutcomeResult::Success => {
                self.success_count += 1;
                return;
            }
            OutcomeResult::Rejected { .. } => self.rejected_count += 1,
            OutcomeResult::Mismatched { .. } => self.mismatch_count += 1,
            OutcomeResult::Failed(_) => self.error_count += 1,
        }
        self.failure_count += 1;
    }

    fn merge(&mut self, other: &LabelStats) {
        self.success_count += other.success_count;
        self.failure_count += other.failure_count;
        self.rejected_count += other.rejected_count;
        self.mismatch_count += other.mismatch_count;
        self.error_count += other.error_count;
    }
}

/// One non-success item, as listed in the final report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub path: PathBuf,
    pub label: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl FailureRecord {
    fn from_outcome(outcome: &Outcome) -> Self {
        let (candidate, confidence) = match &outcome.result {
            OutcomeResult::Rejected {
                confidence,
                candidate,
            } => (candidate.clone(), candidate.as_ref().map(|_| *confidence)),
            OutcomeResult::Mismatched {
                confidence,
                candidate,
            } => (Some(candidate.clone()), Some(*confidence)),
            OutcomeResult::Success | OutcomeResult::Failed(_) => (None, None),
        };
        Self {
            path: outcome.item.path.clone(),
            label: outcome.item.label.clone(),
            reason: outcome.reason(),
            candidate,
            confidence,
        }
    }
}

/// Immutable snapshot of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStatistics {
    pub per_label: BTreeMap<String, LabelStats>,
    pub overall: LabelStats,
    pub failures: Vec<FailureRecord>,
}

impl RunStatistics {
    pub fn label(&self, label: &str) -> Option<&LabelStats> {
        self.per_label.get(label)
    }
}

impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .per_label
            .keys()
            .map(|label| label.chars().count())
            .chain(std::iter::once("overall".len()))
            .max()
            .unwrap_or(0);

        writeln!(
            f,
            "{:width$}  {:>7}  {:>7}  {:>8}  {:>8}  {:>6}  {:>8}",
            "label", "success", "failure", "rejected", "mismatch", "error", "accuracy"
        )?;
        let row = |f: &mut fmt::Formatter<'_>, name: &str, s: &LabelStats| {
            writeln!(
                f,
                "{name:width$}  {:>7}  {:>7}  {:>8}  {:>8}  {:>6}  {:>7.1}%",
                s.success_count,
                s.failure_count,
                s.rejected_count,
                s.mismatch_count,
                s.error_count,
                s.accuracy() * 100.0
            )
        };
        for (label, stats) in &self.per_label {
            row(f, label, stats)?;
        }
        row(f, "overall", &self.overall)?;

        if !self.failures.is_empty() {
            writeln!(f)?;
            writeln!(f, "Failures ({}):", self.failures.len())?;
            for failure in &self.failures {
                writeln!(f, "  {} [{}]: {}", failure.path.display(), failure.label, failure.reason)?;
            }
        }
        Ok(())
    }
}

/// Accumulates outcomes for a run. Owned by a single thread; concurrent
/// workers hand their outcomes over a channel instead of sharing it.
#[derive(Debug, Default)]
pub struct RunAggregator {
    per_label: BTreeMap<String, LabelStats>,
    failures: Vec<FailureRecord>,
    recorded: usize,
}

impl RunAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: &Outcome) {
        self.per_label
            .entry(outcome.item.label.clone())
            .or_default()
            .add(&outcome.result);
        if !outcome.is_success() {
            self.failures.push(FailureRecord::from_outcome(outcome));
        }
        self.recorded += 1;
    }

    pub fn recorded(&self) -> usize {
        self.recorded
    }

    pub fn finalize(self) -> RunStatistics {
        let mut overall = LabelStats::default();
        for stats in self.per_label.values() {
            overall.merge(stats);
        }
        RunStatistics {
            per_label: self.per_label,
            overall,
            failures: self.failures,
        }
    }
}
