use thiserror::Error;

use crate::shared::image_item::ImageItem;

/// Why a single image could not be processed.
///
/// These never abort a run; they travel inside [`OutcomeResult::Failed`]
/// to the error action handler and the aggregator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FailureKind {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rejected by backend: {0}")]
    BackendRejected(String),
    #[error("file is not inside a per-subject folder")]
    NoLabel,
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("filesystem error: {0}")]
    Filesystem(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeResult {
    Success,
    /// The decision policy refused the backend's best candidate (or there was none).
    Rejected {
        confidence: f64,
        candidate: Option<String>,
    },
    /// The policy accepted a candidate that is not the item's ground-truth label.
    Mismatched { confidence: f64, candidate: String },
    Failed(FailureKind),
}

/// Final result for one image. Created once, then only read.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub item: ImageItem,
    pub result: OutcomeResult,
}

impl Outcome {
    pub fn new(item: ImageItem, result: OutcomeResult) -> Self {
        Self { item, result }
    }

    pub fn success(item: ImageItem) -> Self {
        Self::new(item, OutcomeResult::Success)
    }

    pub fn failed(item: ImageItem, kind: FailureKind) -> Self {
        Self::new(item, OutcomeResult::Failed(kind))
    }

    pub fn is_success(&self) -> bool {
        matches!(self.result, OutcomeResult::Success)
    }

    /// Short human-readable reason for a non-success outcome.
    pub fn reason(&self) -> String {
        match &self.result {
            OutcomeResult::Success => "success".to_string(),
            OutcomeResult::Rejected {
                confidence,
                candidate: Some(candidate),
            } => format!("rejected: best candidate {candidate} at {confidence:.3}"),
            OutcomeResult::Rejected {
                candidate: None, ..
            } => "rejected: no match".to_string(),
            OutcomeResult::Mismatched {
                confidence,
                candidate,
            } => format!(
                "mismatch: recognized as {candidate} at {confidence:.3}, expected {}",
                self.item.label
            ),
            OutcomeResult::Failed(kind) => kind.to_string(),
        }
    }
}
