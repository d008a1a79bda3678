use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::shared::constants::{
    DEFAULT_ABOVE_THRESHOLD, DEFAULT_COMPREFACE_URL, DEFAULT_DOUBLETAKE_URL,
    DEFAULT_MAX_REQUEST_SIZE, DEFAULT_QUEUE_CAPACITY, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_WORKERS,
};

/// Configuration problems detected before any work starts. Always fatal.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown {field} '{value}', expected one of: {expected}")]
    InvalidValue {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("dataset path {path} is not readable: {source}")]
    DatasetUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("dataset path {0} is not a directory")]
    DatasetNotDirectory(PathBuf),
    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),
    #[error("threshold must be between 0.0 and 1.0, got {0}")]
    ThresholdOutOfRange(f64),
    #[error("--compreface-api-key is required when the client type is compreface")]
    MissingApiKey,
    #[error("--output-dir is required when the error behavior is {0}")]
    MissingOutputDir(ErrorBehavior),
    #[error("output dir {output} is inside dataset path {dataset}; failed images would be scanned again")]
    OutputInsideDataset { output: PathBuf, dataset: PathBuf },
    #[error("{backend} does not support {mode}")]
    UnsupportedOperation {
        backend: ClientType,
        mode: ClientMode,
    },
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

fn invalid(field: &'static str, value: &str, expected: &'static str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        value: value.to_string(),
        expected,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    CompreFace,
    DoubleTake,
}

impl FromStr for ClientType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compreface" => Ok(Self::CompreFace),
            "doubletake" | "double-take" => Ok(Self::DoubleTake),
            _ => Err(invalid("client type", s, "compreface, doubletake")),
        }
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CompreFace => write!(f, "compreface"),
            Self::DoubleTake => write!(f, "doubletake"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientMode {
    Train,
    Recognize,
}

impl FromStr for ClientMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "train" => Ok(Self::Train),
            "recognize" => Ok(Self::Recognize),
            _ => Err(invalid("client mode", s, "train, recognize")),
        }
    }
}

impl fmt::Display for ClientMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Train => write!(f, "train"),
            Self::Recognize => write!(f, "recognize"),
        }
    }
}

/// What to do with the source file of a failed or rejected image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorBehavior {
    Copy,
    Move,
    Ignore,
}

impl FromStr for ErrorBehavior {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "copy" => Ok(Self::Copy),
            "move" => Ok(Self::Move),
            "ignore" => Ok(Self::Ignore),
            _ => Err(invalid("error behavior", s, "copy, move, ignore")),
        }
    }
}

impl fmt::Display for ErrorBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copy => write!(f, "copy"),
            Self::Move => write!(f, "move"),
            Self::Ignore => write!(f, "ignore"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PostRecognizeStrategy {
    AboveThreshold,
    MaxSimilarity,
    /// Same verdicts as `MaxSimilarity`; failed images keep their file name
    /// under `output_dir/<label>`.
    KeepAsIs,
}

impl FromStr for PostRecognizeStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "abovethreshold" => Ok(Self::AboveThreshold),
            "maxsimilarity" => Ok(Self::MaxSimilarity),
            "keepasis" => Ok(Self::KeepAsIs),
            _ => Err(invalid(
                "post recognize strategy",
                s,
                "abovethreshold, maxsimilarity, keepasis",
            )),
        }
    }
}

impl fmt::Display for PostRecognizeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AboveThreshold => write!(f, "abovethreshold"),
            Self::MaxSimilarity => write!(f, "maxsimilarity"),
            Self::KeepAsIs => write!(f, "keepasis"),
        }
    }
}

/// Connection settings for the backend services.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub compreface_url: String,
    pub compreface_api_key: Option<String>,
    pub doubletake_url: String,
    pub request_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            compreface_url: DEFAULT_COMPREFACE_URL.to_string(),
            compreface_api_key: None,
            doubletake_url: DEFAULT_DOUBLETAKE_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Everything a run needs. Built once before scanning and never mutated afterwards.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub client_type: ClientType,
    pub client_mode: ClientMode,
    pub dataset_path: PathBuf,
    pub max_request_size: u64,
    pub override_trained_name: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub error_behavior: ErrorBehavior,
    pub post_recognize_strategy: PostRecognizeStrategy,
    pub above_threshold: f64,
    pub backend: BackendConfig,
    pub workers: usize,
    pub queue_capacity: usize,
}

impl RunConfig {
    pub fn new(client_type: ClientType, client_mode: ClientMode, dataset_path: PathBuf) -> Self {
        Self {
            client_type,
            client_mode,
            dataset_path,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
            override_trained_name: None,
            output_dir: None,
            error_behavior: ErrorBehavior::Ignore,
            post_recognize_strategy: PostRecognizeStrategy::MaxSimilarity,
            above_threshold: DEFAULT_ABOVE_THRESHOLD,
            backend: BackendConfig::default(),
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn with_max_request_size(mut self, bytes: u64) -> Self {
        self.max_request_size = bytes;
        self
    }

    pub fn with_override_trained_name(mut self, name: Option<String>) -> Self {
        self.override_trained_name = name;
        self
    }

    pub fn with_error_behavior(mut self, behavior: ErrorBehavior, output_dir: Option<PathBuf>) -> Self {
        self.error_behavior = behavior;
        self.output_dir = output_dir;
        self
    }

    pub fn with_strategy(mut self, strategy: PostRecognizeStrategy, threshold: f64) -> Self {
        self.post_recognize_strategy = strategy;
        self.above_threshold = threshold;
        self
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_concurrency(mut self, workers: usize, queue_capacity: usize) -> Self {
        self.workers = workers;
        self.queue_capacity = queue_capacity;
        self
    }

    /// The override label, treating an empty string as unset.
    pub fn label_override(&self) -> Option<&str> {
        self.override_trained_name
            .as_deref()
            .filter(|name| !name.is_empty())
    }

    /// Checks every fatal condition that must be caught before scanning starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let metadata =
            fs::metadata(&self.dataset_path).map_err(|source| ConfigError::DatasetUnreadable {
                path: self.dataset_path.clone(),
                source,
            })?;
        if !metadata.is_dir() {
            return Err(ConfigError::DatasetNotDirectory(self.dataset_path.clone()));
        }
        fs::read_dir(&self.dataset_path).map_err(|source| ConfigError::DatasetUnreadable {
            path: self.dataset_path.clone(),
            source,
        })?;

        if self.max_request_size == 0 {
            return Err(ConfigError::NotPositive("max request size"));
        }
        if self.workers == 0 {
            return Err(ConfigError::NotPositive("workers"));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::NotPositive("queue capacity"));
        }
        if !(0.0..=1.0).contains(&self.above_threshold) {
            return Err(ConfigError::ThresholdOutOfRange(self.above_threshold));
        }
        if self.error_behavior != ErrorBehavior::Ignore {
            let output_dir = self
                .output_dir
                .as_deref()
                .ok_or(ConfigError::MissingOutputDir(self.error_behavior))?;
            // The walk is lazy, so copies landing under the root would be scanned again.
            let output = resolve(output_dir);
            let dataset = resolve(&self.dataset_path);
            if output.starts_with(&dataset) {
                return Err(ConfigError::OutputInsideDataset { output, dataset });
            }
        }

        match self.client_type {
            ClientType::CompreFace => {
                let has_key = self
                    .backend
                    .compreface_api_key
                    .as_deref()
                    .is_some_and(|key| !key.is_empty());
                if !has_key {
                    return Err(ConfigError::MissingApiKey);
                }
            }
            ClientType::DoubleTake => {
                if self.client_mode == ClientMode::Train {
                    return Err(ConfigError::UnsupportedOperation {
                        backend: self.client_type,
                        mode: self.client_mode,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Canonicalizes the longest existing prefix of `path` and appends the rest,
/// so directories that are created later still compare correctly.
fn resolve(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut missing = Vec::new();
    loop {
        if let Ok(resolved) = fs::canonicalize(&existing) {
            return missing
                .iter()
                .rev()
                .fold(resolved, |acc: PathBuf, name| acc.join(name));
        }
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                missing.push(name.to_os_string());
                existing = if parent.as_os_str().is_empty() {
                    PathBuf::from(".")
                } else {
                    parent.to_path_buf()
                };
            }
            _ => return path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn valid_config(dir: &TempDir) -> RunConfig {
        let mut backend = BackendConfig::default();
        backend.compreface_api_key = Some("key".into());
        RunConfig::new(
            ClientType::CompreFace,
            ClientMode::Train,
            dir.path().to_path_buf(),
        )
        .with_backend(backend)
    }

    #[rstest]
    #[case("compreface", ClientType::CompreFace)]
    #[case("CompreFace", ClientType::CompreFace)]
    #[case("doubletake", ClientType::DoubleTake)]
    #[case("double-take", ClientType::DoubleTake)]
    fn test_parse_client_type(#[case] input: &str, #[case] expected: ClientType) {
        assert_eq!(input.parse::<ClientType>().unwrap(), expected);
    }

    #[rstest]
    #[case("abovethreshold", PostRecognizeStrategy::AboveThreshold)]
    #[case("AboveThreshold", PostRecognizeStrategy::AboveThreshold)]
    #[case("above-threshold", PostRecognizeStrategy::AboveThreshold)]
    #[case("MaxSimilarity", PostRecognizeStrategy::MaxSimilarity)]
    #[case("KeepAsIs", PostRecognizeStrategy::KeepAsIs)]
    #[case("keep_as_is", PostRecognizeStrategy::KeepAsIs)]
    fn test_parse_strategy(#[case] input: &str, #[case] expected: PostRecognizeStrategy) {
        assert_eq!(input.parse::<PostRecognizeStrategy>().unwrap(), expected);
    }

    #[test]
    fn test_parse_invalid_value_lists_choices() {
        let err = "teleport".parse::<ErrorBehavior>().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("teleport"));
        assert!(message.contains("copy, move, ignore"));
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for mode in [ClientMode::Train, ClientMode::Recognize] {
            assert_eq!(mode.to_string().parse::<ClientMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_defaults() {
        let config = RunConfig::new(
            ClientType::DoubleTake,
            ClientMode::Recognize,
            PathBuf::from("/data"),
        );
        assert_eq!(config.max_request_size, 10_485_760);
        assert_eq!(config.error_behavior, ErrorBehavior::Ignore);
        assert_eq!(
            config.post_recognize_strategy,
            PostRecognizeStrategy::MaxSimilarity
        );
        assert!(config.label_override().is_none());
    }

    #[test]
    fn test_empty_override_is_unset() {
        let config = RunConfig::new(
            ClientType::DoubleTake,
            ClientMode::Recognize,
            PathBuf::from("/data"),
        )
        .with_override_trained_name(Some(String::new()));
        assert!(config.label_override().is_none());
    }

    #[test]
    fn test_valid_config_passes() {
        let dir = TempDir::new().unwrap();
        assert!(valid_config(&dir).validate().is_ok());
    }

    #[test]
    fn test_missing_dataset_is_fatal() {
        let dir = TempDir::new().unwrap();
        let mut config = valid_config(&dir);
        config.dataset_path = dir.path().join("missing");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DatasetUnreadable { .. })
        ));
    }

    #[test]
    fn test_dataset_file_is_fatal() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file.jpg");
        std::fs::write(&file, b"x").unwrap();
        let mut config = valid_config(&dir);
        config.dataset_path = file;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DatasetNotDirectory(_))
        ));
    }

    #[test]
    fn test_train_on_doubletake_is_fatal() {
        let dir = TempDir::new().unwrap();
        let config = RunConfig::new(
            ClientType::DoubleTake,
            ClientMode::Train,
            dir.path().to_path_buf(),
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn test_compreface_requires_api_key() {
        let dir = TempDir::new().unwrap();
        let config = RunConfig::new(
            ClientType::CompreFace,
            ClientMode::Recognize,
            dir.path().to_path_buf(),
        );
        assert!(matches!(config.validate(), Err(ConfigError::MissingApiKey)));
    }

    #[test]
    fn test_copy_requires_output_dir() {
        let dir = TempDir::new().unwrap();
        let config = valid_config(&dir).with_error_behavior(ErrorBehavior::Copy, None);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingOutputDir(ErrorBehavior::Copy))
        ));
    }

    #[rstest]
    #[case::root_itself("")]
    #[case::existing_subdir("zzz_failed")]
    #[case::not_yet_created("zzz_failed/nested")]
    #[case::dotted_path("alice/../zzz_failed")]
    fn test_output_inside_dataset_is_fatal(#[case] relative: &str) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("alice")).unwrap();
        std::fs::create_dir_all(dir.path().join("zzz_failed")).unwrap();
        let output = if relative.is_empty() {
            dir.path().to_path_buf()
        } else {
            dir.path().join(relative)
        };

        for behavior in [ErrorBehavior::Copy, ErrorBehavior::Move] {
            let config = valid_config(&dir).with_error_behavior(behavior, Some(output.clone()));
            assert!(matches!(
                config.validate(),
                Err(ConfigError::OutputInsideDataset { .. })
            ));
        }
    }

    #[test]
    fn test_output_beside_dataset_is_allowed() {
        let parent = TempDir::new().unwrap();
        let dataset = parent.path().join("dataset");
        std::fs::create_dir_all(&dataset).unwrap();
        let mut backend = BackendConfig::default();
        backend.compreface_api_key = Some("key".into());

        // Shares a name prefix with the dataset but is a sibling.
        let config = RunConfig::new(ClientType::CompreFace, ClientMode::Train, dataset)
            .with_backend(backend)
            .with_error_behavior(ErrorBehavior::Copy, Some(parent.path().join("dataset_failed")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ignore_does_not_check_output_location() {
        let dir = TempDir::new().unwrap();
        let config = valid_config(&dir)
            .with_error_behavior(ErrorBehavior::Ignore, Some(dir.path().join("failed")));
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case(-0.1)]
    #[case(1.5)]
    fn test_threshold_out_of_range(#[case] threshold: f64) {
        let dir = TempDir::new().unwrap();
        let config =
            valid_config(&dir).with_strategy(PostRecognizeStrategy::AboveThreshold, threshold);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ThresholdOutOfRange(_))
        ));
    }

    #[test]
    fn test_zero_sizes_are_fatal() {
        let dir = TempDir::new().unwrap();
        assert!(valid_config(&dir).with_max_request_size(0).validate().is_err());
        assert!(valid_config(&dir).with_concurrency(0, 4).validate().is_err());
        assert!(valid_config(&dir).with_concurrency(4, 0).validate().is_err());
    }
}
