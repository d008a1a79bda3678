use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::shared::image_item::ImageItem;
use crate::shared::run_config::ErrorBehavior;

#[derive(Error, Debug)]
pub enum ErrorActionError {
    #[error("error behavior {0} needs an output directory")]
    MissingOutputDir(ErrorBehavior),
    #[error("file name not found for {0}")]
    MissingFileName(PathBuf),
    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("copied to {to} but failed to remove {from}: {source}")]
    Remove {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Copies or moves the source file of a failed image into
/// `output_dir/<label>/`, never overwriting anything already there.
pub struct ErrorActionHandler {
    behavior: ErrorBehavior,
    output_dir: Option<PathBuf>,
}

impl ErrorActionHandler {
    pub fn new(behavior: ErrorBehavior, output_dir: Option<PathBuf>) -> Self {
        Self {
            behavior,
            output_dir,
        }
    }

    pub fn behavior(&self) -> ErrorBehavior {
        self.behavior
    }

    /// Applies the configured behavior. Returns where the file now lives in
    /// the output directory, or `None` when nothing was written (ignore, or
    /// the item is not a regular file such as an unreadable directory).
    pub fn handle(&self, item: &ImageItem) -> Result<Option<PathBuf>, ErrorActionError> {
        if self.behavior == ErrorBehavior::Ignore {
            return Ok(None);
        }
        if !item.path.is_file() {
            log::debug!(
                "Skipping {} for {}: not a file",
                self.behavior,
                item.path.display()
            );
            return Ok(None);
        }
        let output_dir = self
            .output_dir
            .as_deref()
            .ok_or(ErrorActionError::MissingOutputDir(self.behavior))?;

        let label_dir = output_dir.join(sanitize_label(&item.label));
        fs::create_dir_all(&label_dir).map_err(|source| ErrorActionError::CreateDir {
            path: label_dir.clone(),
            source,
        })?;

        let destination = claim_destination(&label_dir, &item.path)?;
        if let Err(source) = fs::copy(&item.path, &destination) {
            let _ = fs::remove_file(&destination);
            return Err(ErrorActionError::Copy {
                from: item.path.clone(),
                to: destination,
                source,
            });
        }

        if self.behavior == ErrorBehavior::Move {
            fs::remove_file(&item.path).map_err(|source| ErrorActionError::Remove {
                from: item.path.clone(),
                to: destination.clone(),
                source,
            })?;
        }

        log::debug!(
            "{} {} -> {}",
            self.behavior,
            item.path.display(),
            destination.display()
        );
        Ok(Some(destination))
    }
}

/// Keeps a label from escaping the output directory.
fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// Reserves a free name in `dir` for the original's file name: `name.ext`,
/// then `name_1.ext`, `name_2.ext`, ... The empty placeholder is created
/// with `create_new`, so two workers can never claim the same name.
fn claim_destination(dir: &Path, original: &Path) -> Result<PathBuf, ErrorActionError> {
    let file_name = original
        .file_name()
        .ok_or_else(|| ErrorActionError::MissingFileName(original.to_path_buf()))?;
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = original
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut attempt: u64 = 0;
    loop {
        let candidate = if attempt == 0 {
            dir.join(file_name)
        } else {
            dir.join(format!("{stem}_{attempt}{extension}"))
        };

        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(source) => {
                return Err(ErrorActionError::Copy {
                    from: original.to_path_buf(),
                    to: candidate,
                    source,
                })
            }
        }
    }
}
