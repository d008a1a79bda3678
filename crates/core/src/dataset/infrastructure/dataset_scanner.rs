use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::dataset::domain::label_extractor::label_for;
use crate::shared::constants::UNLABELED_LABEL;
use crate::shared::image_item::{is_image, ImageItem};
use crate::shared::outcome::{FailureKind, Outcome};

/// One step of a dataset scan: either an image ready for batching, or an
/// entry that already failed (unreadable directory, missing label, ...).
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEntry {
    Image(ImageItem),
    Failed(Outcome),
}

/// Recursively walks a dataset root and yields its images with labels.
///
/// The walk is depth-first with directory entries sorted by file name, so
/// an unchanged dataset always produces the same sequence. Every call to
/// [`DatasetScanner::scan`] starts a fresh walk.
pub struct DatasetScanner {
    root: PathBuf,
    label_override: Option<String>,
    follow_links: bool,
}

impl DatasetScanner {
    pub fn new(root: impl Into<PathBuf>, label_override: Option<String>) -> Self {
        Self {
            root: root.into(),
            label_override: label_override.filter(|name| !name.is_empty()),
            follow_links: false,
        }
    }

    pub fn with_follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn scan(&self) -> ScanIter {
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(self.follow_links)
            .sort_by_file_name()
            .into_iter();
        ScanIter {
            walker,
            root: self.root.clone(),
            label_override: self.label_override.clone(),
        }
    }
}

/// Lazy iterator over a single walk of the dataset.
pub struct ScanIter {
    walker: walkdir::IntoIter,
    root: PathBuf,
    label_override: Option<String>,
}

impl ScanIter {
    fn unreadable(&self, error: walkdir::Error) -> ScanEntry {
        let path = error
            .path()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        log::warn!("Cannot read {}: {error}", path.display());

        let label = match &self.label_override {
            Some(name) => name.clone(),
            None => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| UNLABELED_LABEL.to_string()),
        };
        ScanEntry::Failed(Outcome::failed(
            ImageItem::new(path, label, 0),
            FailureKind::Filesystem(error.to_string()),
        ))
    }

    fn image(&self, entry: walkdir::DirEntry) -> ScanEntry {
        let path = entry.path();
        let (label, no_label) = match label_for(path, &self.root, self.label_override.as_deref()) {
            Ok(label) => (label, None),
            Err(kind) => (UNLABELED_LABEL.to_string(), Some(kind)),
        };

        let byte_size = match entry.metadata() {
            Ok(metadata) => metadata.len(),
            Err(error) => {
                log::warn!("Cannot stat {}: {error}", path.display());
                return ScanEntry::Failed(Outcome::failed(
                    ImageItem::new(path, label, 0),
                    FailureKind::Filesystem(error.to_string()),
                ));
            }
        };

        let item = ImageItem::new(path, label, byte_size);
        match no_label {
            Some(kind) => {
                log::debug!("{} has no subject folder", item.path.display());
                ScanEntry::Failed(Outcome::failed(item, kind))
            }
            None => ScanEntry::Image(item),
        }
    }
}

impl Iterator for ScanIter {
    type Item = ScanEntry;

    fn next(&mut self) -> Option<ScanEntry> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(error) => return Some(self.unreadable(error)),
            };

            // Directories are only traversed; symlinks are only reached here
            // when not followed, and are skipped.
            if !entry.file_type().is_file() {
                continue;
            }
            if !is_image(entry.path()) {
                log::debug!("Skipping non-image file {}", entry.path().display());
                continue;
            }
            return Some(self.image(entry));
        }
    }
}
