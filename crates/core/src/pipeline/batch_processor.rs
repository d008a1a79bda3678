use std::sync::Arc;

use crate::backend::domain::backend_client::{BackendClient, Classification};
use crate::dataset::domain::batch_builder::Batch;
use crate::pipeline::error_action_handler::ErrorActionHandler;
use crate::recognition::domain::decision_policy::{DecisionPolicy, Verdict};
use crate::shared::outcome::{Outcome, OutcomeResult};
use crate::shared::run_config::ClientMode;

/// Turns one batch into final outcomes: backend call, decision, then the
/// configured error action for anything that did not succeed.
///
/// Shared by every worker thread behind an `Arc`.
pub struct BatchProcessor {
    mode: ClientMode,
    client: Arc<dyn BackendClient>,
    policy: Box<dyn DecisionPolicy>,
    error_handler: ErrorActionHandler,
}

impl BatchProcessor {
    pub fn new(
        mode: ClientMode,
        client: Arc<dyn BackendClient>,
        policy: Box<dyn DecisionPolicy>,
        error_handler: ErrorActionHandler,
    ) -> Self {
        Self {
            mode,
            client,
            policy,
            error_handler,
        }
    }

    pub fn mode(&self) -> ClientMode {
        self.mode
    }

    pub fn client(&self) -> &dyn BackendClient {
        self.client.as_ref()
    }

    /// Returns one outcome per batch item, in batch order.
    pub fn process(&self, batch: &Batch) -> Vec<Outcome> {
        let outcomes = match self.mode {
            ClientMode::Train => self.client.enroll(batch),
            ClientMode::Recognize => self
                .client
                .classify(batch)
                .into_iter()
                .map(|classification| self.decide(classification))
                .collect(),
        };

        for outcome in &outcomes {
            self.settle(outcome);
        }
        outcomes
    }

    /// Applies the error action to a non-success outcome. Failures to copy
    /// or move are logged and never change the outcome.
    pub fn settle(&self, outcome: &Outcome) {
        if outcome.is_success() {
            return;
        }
        if let Err(e) = self.error_handler.handle(&outcome.item) {
            log::warn!(
                "Error action {} failed for {}: {e}",
                self.error_handler.behavior(),
                outcome.item.path.display()
            );
        }
    }

    fn decide(&self, classification: Classification) -> Outcome {
        let Classification { item, result } = classification;
        let candidate = match result {
            Ok(candidate) => candidate,
            Err(kind) => return Outcome::failed(item, kind),
        };

        let verdict = self.policy.decide(candidate.as_ref());
        let result = match (verdict, candidate) {
            (Verdict::Accepted, Some(c)) if c.label == item.label => OutcomeResult::Success,
            (Verdict::Accepted, Some(c)) => {
                log::debug!(
                    "{} recognized as {} ({:.3}), expected {}",
                    item.path.display(),
                    c.label,
                    c.confidence,
                    item.label
                );
                OutcomeResult::Mismatched {
                    confidence: c.confidence,
                    candidate: c.label,
                }
            }
            (_, Some(c)) => OutcomeResult::Rejected {
                confidence: c.confidence,
                candidate: Some(c.label),
            },
            (_, None) => OutcomeResult::Rejected {
                confidence: 0.0,
                candidate: None,
            },
        };
        Outcome::new(item, result)
    }
}
