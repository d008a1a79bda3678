use crate::dataset::domain::batch_builder::Batch;
use crate::shared::image_item::ImageItem;
use crate::shared::outcome::{FailureKind, Outcome};

/// Best subject the backend proposed for an image.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub label: String,
    /// Normalized to `[0.0, 1.0]` regardless of the backend's native scale.
    pub confidence: f64,
}

impl Candidate {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Picks the highest-confidence candidate, keeping the first on ties.
    pub fn best(candidates: impl IntoIterator<Item = Candidate>) -> Option<Candidate> {
        candidates.into_iter().fold(None, |best, next| match best {
            Some(current) if current.confidence >= next.confidence => Some(current),
            _ => Some(next),
        })
    }
}

/// Raw classification for one image: `Ok(None)` means the backend saw no match.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub item: ImageItem,
    pub result: Result<Option<Candidate>, FailureKind>,
}

impl Classification {
    pub fn matched(item: ImageItem, candidate: Candidate) -> Self {
        Self {
            item,
            result: Ok(Some(candidate)),
        }
    }

    pub fn no_match(item: ImageItem) -> Self {
        Self { item, result: Ok(None) }
    }

    pub fn failed(item: ImageItem, kind: FailureKind) -> Self {
        Self {
            item,
            result: Err(kind),
        }
    }
}

/// Domain interface for a face-recognition service.
///
/// Both operations return exactly one element per batch item, in batch
/// order. A failure on one item never fails the others; if the whole
/// request could not be sent, every item carries its own `Transport` failure.
pub trait BackendClient: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports_enroll(&self) -> bool;

    /// Registers each image under its label.
    fn enroll(&self, batch: &Batch) -> Vec<Outcome>;

    /// Asks the backend who is in each image.
    fn classify(&self, batch: &Batch) -> Vec<Classification>;
}
