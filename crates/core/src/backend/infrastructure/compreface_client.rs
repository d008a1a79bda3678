use std::time::Duration;

use reqwest::blocking::{multipart::Form, Client, Response};
use serde::Deserialize;

use crate::backend::domain::backend_client::{BackendClient, Candidate, Classification};
use crate::dataset::domain::batch_builder::Batch;
use crate::shared::constants::COMPREFACE_NO_FACE_CODE;
use crate::shared::image_item::ImageItem;
use crate::shared::outcome::{FailureKind, Outcome};

use super::upload::{error_details, http_client, image_part, status_failure};

const API_KEY_HEADER: &str = "x-api-key";

/// Client for the CompreFace recognition service.
///
/// CompreFace has no batch endpoint, so every image in a batch is sent in
/// its own request; the batch only bounds how much is in flight at once.
pub struct CompreFaceClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl CompreFaceClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> reqwest::Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn send(&self, url: &str, query: &[(&str, &str)], item: &ImageItem) -> Result<Response, FailureKind> {
        let part = image_part(&item.path)?;
        let form = Form::new().part("file", part);
        self.http
            .post(url)
            .query(query)
            .header(API_KEY_HEADER, &self.api_key)
            .multipart(form)
            .send()
            .map_err(|e| FailureKind::Transport(e.to_string()))
    }

    fn enroll_item(&self, item: &ImageItem) -> Result<(), FailureKind> {
        let url = format!("{}/api/v1/recognition/faces", self.base_url);
        let response = self.send(&url, &[("subject", item.label.as_str())], item)?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| FailureKind::Transport(e.to_string()))?;

        if status.is_success() {
            log::debug!("Enrolled {} as {}: {body}", item.path.display(), item.label);
            Ok(())
        } else {
            Err(status_failure(status, &body))
        }
    }

    fn classify_item(&self, item: &ImageItem) -> Result<Option<Candidate>, FailureKind> {
        let url = format!("{}/api/v1/recognition/recognize", self.base_url);
        let response = self.send(&url, &[("prediction_count", "1")], item)?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| FailureKind::Transport(e.to_string()))?;

        if status.is_success() {
            let parsed: RecognitionResponse = serde_json::from_str(&body).map_err(|e| {
                FailureKind::Transport(format!("unreadable recognition response: {e}"))
            })?;
            return Ok(parsed.best_candidate());
        }

        if status.is_client_error() && error_details(&body).code == Some(COMPREFACE_NO_FACE_CODE) {
            log::debug!("No face found in {}", item.path.display());
            return Ok(None);
        }
        Err(status_failure(status, &body))
    }
}

impl BackendClient for CompreFaceClient {
    fn name(&self) -> &'static str {
        "compreface"
    }

    fn supports_enroll(&self) -> bool {
        true
    }

    fn enroll(&self, batch: &Batch) -> Vec<Outcome> {
        batch
            .items()
            .iter()
            .map(|item| match self.enroll_item(item) {
                Ok(()) => Outcome::success(item.clone()),
                Err(kind) => {
                    log::error!(
                        "Failed to enroll {} as {}: {kind}",
                        item.path.display(),
                        item.label
                    );
                    Outcome::failed(item.clone(), kind)
                }
            })
            .collect()
    }

    fn classify(&self, batch: &Batch) -> Vec<Classification> {
        batch
            .items()
            .iter()
            .map(|item| {
                let result = self.classify_item(item);
                if let Err(kind) = &result {
                    log::error!("Failed to recognize {}: {kind}", item.path.display());
                }
                Classification {
                    item: item.clone(),
                    result,
                }
            })
            .collect()
    }
}

#[derive(Deserialize, Debug)]
struct RecognitionResponse {
    #[serde(default)]
    result: Vec<FaceResult>,
}

#[derive(Deserialize, Debug)]
struct FaceResult {
    #[serde(default)]
    subjects: Vec<SubjectMatch>,
}

#[derive(Deserialize, Debug)]
struct SubjectMatch {
    #[serde(alias = "name")]
    subject: String,
    similarity: f64,
}

impl RecognitionResponse {
    /// Highest similarity over every face and subject in the image.
    fn best_candidate(self) -> Option<Candidate> {
        Candidate::best(
            self.result
                .into_iter()
                .flat_map(|face| face.subjects)
                .map(|s| Candidate::new(s.subject, s.similarity)),
        )
    }
}
