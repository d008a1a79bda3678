use crate::backend::domain::backend_client::Candidate;
use crate::shared::run_config::PostRecognizeStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected,
}

/// Turns the backend's best candidate into an accept/reject verdict.
///
/// Policies never see the ground-truth label; deciding whether an accepted
/// candidate is the right person is the caller's job.
pub trait DecisionPolicy: Send + Sync {
    fn decide(&self, candidate: Option<&Candidate>) -> Verdict;
}

/// Accepts a candidate whose confidence reaches a fixed threshold.
pub struct AboveThreshold {
    threshold: f64,
}

impl AboveThreshold {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

impl DecisionPolicy for AboveThreshold {
    fn decide(&self, candidate: Option<&Candidate>) -> Verdict {
        match candidate {
            Some(c) if c.confidence >= self.threshold => Verdict::Accepted,
            _ => Verdict::Rejected,
        }
    }
}

/// Takes the backend's best subject at face value, whatever its confidence.
pub struct MaxSimilarity;

impl DecisionPolicy for MaxSimilarity {
    fn decide(&self, candidate: Option<&Candidate>) -> Verdict {
        match candidate {
            Some(c) if c.confidence > 0.0 => Verdict::Accepted,
            _ => Verdict::Rejected,
        }
    }
}

pub fn create_policy(strategy: PostRecognizeStrategy, threshold: f64) -> Box<dyn DecisionPolicy> {
    log::info!("Post-recognize strategy: {strategy} (threshold={threshold})");
    match strategy {
        PostRecognizeStrategy::AboveThreshold => Box::new(AboveThreshold::new(threshold)),
        PostRecognizeStrategy::MaxSimilarity | PostRecognizeStrategy::KeepAsIs => {
            Box::new(MaxSimilarity)
        }
    }
}
