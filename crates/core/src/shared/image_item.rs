use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::shared::constants::IMAGE_EXTENSIONS;

/// One image discovered in the dataset, with its ground-truth label.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ImageItem {
    pub path: PathBuf,
    pub label: String,
    pub byte_size: u64,
}

impl ImageItem {
    pub fn new(path: impl Into<PathBuf>, label: impl Into<String>, byte_size: u64) -> Self {
        Self {
            path: path.into(),
            label: label.into(),
            byte_size,
        }
    }

    /// File name used in multipart uploads and output copies.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Returns true if the path carries one of the allowed image extensions
/// (case-insensitive).
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
