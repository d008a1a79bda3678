use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::multipart::Part;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::shared::outcome::FailureKind;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid multipart part for {path}: {source}")]
    Part {
        path: PathBuf,
        #[source]
        source: reqwest::Error,
    },
}

impl From<UploadError> for FailureKind {
    fn from(error: UploadError) -> Self {
        match error {
            UploadError::Read { .. } => FailureKind::Filesystem(error.to_string()),
            UploadError::Part { .. } => FailureKind::Transport(error.to_string()),
        }
    }
}

/// Builds the blocking HTTP client shared by a backend adapter.
pub fn http_client(timeout: Duration) -> reqwest::Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder().timeout(timeout).build()
}

pub fn mime_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        "tif" | "tiff" => "image/tiff",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Reads an image into a multipart part carrying its file name and MIME type.
pub fn image_part(path: &Path) -> Result<Part, UploadError> {
    let bytes = fs::read(path).map_err(|source| UploadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(mime_for(path))
        .map_err(|source| UploadError::Part {
            path: path.to_path_buf(),
            source,
        })
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    code: Option<u32>,
}

/// Error details a backend put in a non-2xx response body.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorDetails {
    pub message: String,
    pub code: Option<u32>,
}

pub fn error_details(body: &str) -> ErrorDetails {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            message: Some(message),
            code,
        }) => ErrorDetails { message, code },
        Ok(ErrorBody { message: None, code }) => ErrorDetails {
            message: body.trim().to_string(),
            code,
        },
        Err(_) => ErrorDetails {
            message: body.trim().to_string(),
            code: None,
        },
    }
}

/// Maps a non-success status to a failure: client errors are the backend
/// refusing this image, everything else is a transport problem.
pub fn status_failure(status: StatusCode, body: &str) -> FailureKind {
    let details = error_details(body);
    if status.is_client_error() {
        FailureKind::BackendRejected(format!("{status}: {}", details.message))
    } else {
        FailureKind::Transport(format!("unexpected status {status}: {}", details.message))
    }
}
