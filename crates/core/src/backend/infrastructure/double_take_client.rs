use std::time::Duration;

use reqwest::blocking::{multipart::Form, Client};
use serde::Deserialize;

use crate::backend::domain::backend_client::{BackendClient, Candidate, Classification};
use crate::dataset::domain::batch_builder::Batch;
use crate::shared::constants::DOUBLETAKE_UNKNOWN_NAME;
use crate::shared::image_item::ImageItem;
use crate::shared::outcome::{FailureKind, Outcome};

use super::upload::{http_client, image_part, status_failure};

/// Client for the Double Take recognition proxy.
///
/// Double Take only classifies. A whole batch goes out as one multipart
/// upload and the response lists one result per file, in upload order.
/// Its confidences are percentages and are rescaled to `[0, 1]`.
pub struct DoubleTakeClient {
    http: Client,
    base_url: String,
}

impl DoubleTakeClient {
    pub fn new(base_url: &str, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Sends the readable items in one request; returns one result per sent item.
    fn upload(&self, items: &[&ImageItem], form: Form) -> Result<Vec<Option<Candidate>>, FailureKind> {
        let url = format!("{}/api/recognize/upload", self.base_url);
        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .map_err(|e| FailureKind::Transport(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| FailureKind::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(status_failure(status, &body));
        }

        let results: Vec<UploadResult> = serde_json::from_str(&body)
            .map_err(|e| FailureKind::Transport(format!("unreadable upload response: {e}")))?;
        if results.len() != items.len() {
            return Err(FailureKind::Transport(format!(
                "expected {} results, backend returned {}",
                items.len(),
                results.len()
            )));
        }
        Ok(results.into_iter().map(UploadResult::best_candidate).collect())
    }
}

impl BackendClient for DoubleTakeClient {
    fn name(&self) -> &'static str {
        "doubletake"
    }

    fn supports_enroll(&self) -> bool {
        false
    }

    fn enroll(&self, batch: &Batch) -> Vec<Outcome> {
        batch
            .items()
            .iter()
            .map(|item| {
                Outcome::failed(
                    item.clone(),
                    FailureKind::UnsupportedOperation("doubletake cannot enroll faces".into()),
                )
            })
            .collect()
    }

    fn classify(&self, batch: &Batch) -> Vec<Classification> {
        let mut results: Vec<Option<Classification>> = vec![None; batch.len()];
        let mut form = Form::new();
        let mut sent = Vec::new();

        for (index, item) in batch.items().iter().enumerate() {
            match image_part(&item.path) {
                Ok(part) => {
                    form = form.part("files[]", part);
                    sent.push(index);
                }
                Err(error) => {
                    log::error!("Cannot upload {}: {error}", item.path.display());
                    results[index] = Some(Classification::failed(item.clone(), error.into()));
                }
            }
        }

        if !sent.is_empty() {
            let sent_items: Vec<&ImageItem> = sent.iter().map(|&i| &batch.items()[i]).collect();
            match self.upload(&sent_items, form) {
                Ok(candidates) => {
                    for (&index, candidate) in sent.iter().zip(candidates) {
                        let item = batch.items()[index].clone();
                        results[index] = Some(Classification {
                            item,
                            result: Ok(candidate),
                        });
                    }
                }
                Err(kind) => {
                    log::error!("Batch of {} images failed: {kind}", sent.len());
                    for &index in &sent {
                        let item = batch.items()[index].clone();
                        results[index] = Some(Classification::failed(item, kind.clone()));
                    }
                }
            }
        }

        results.into_iter().flatten().collect()
    }
}

#[derive(Deserialize, Debug)]
struct UploadResult {
    #[serde(default)]
    results: Vec<DetectorResult>,
}

#[derive(Deserialize, Debug)]
struct DetectorResult {
    #[serde(default)]
    detector: String,
    #[serde(default)]
    results: Vec<DetectorMatch>,
}

#[derive(Deserialize, Debug)]
struct DetectorMatch {
    name: String,
    confidence: f64,
}

impl UploadResult {
    /// Highest-confidence named match over all detectors, rescaled from percent.
    fn best_candidate(self) -> Option<Candidate> {
        Candidate::best(
            self.results
                .into_iter()
                .inspect(|detector| {
                    log::trace!("{} returned {} matches", detector.detector, detector.results.len())
                })
                .flat_map(|detector| detector.results)
                .filter(|m| !m.name.eq_ignore_ascii_case(DOUBLETAKE_UNKNOWN_NAME))
                .map(|m| Candidate::new(m.name, m.confidence / 100.0)),
        )
    }
}
