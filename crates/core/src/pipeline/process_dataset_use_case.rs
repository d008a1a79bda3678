use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

use crate::backend::domain::backend_client::BackendClient;
use crate::dataset::domain::batch_builder::BatchBuilder;
use crate::dataset::infrastructure::dataset_scanner::DatasetScanner;
use crate::recognition::domain::decision_policy::DecisionPolicy;
use crate::shared::run_config::{ClientMode, ClientType, ConfigError, RunConfig};

use super::batch_processor::BatchProcessor;
use super::error_action_handler::ErrorActionHandler;
use super::pipeline_executor::{PipelineConfig, PipelineError, PipelineExecutor};
use super::pipeline_logger::PipelineLogger;
use super::run_aggregator::RunStatistics;

#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("run already executed")]
    AlreadyExecuted,
}

/// Everything known about a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub client_type: ClientType,
    pub client_mode: ClientMode,
    pub dataset_path: PathBuf,
    pub statistics: RunStatistics,
    pub cancelled: bool,
    pub elapsed_secs: f64,
}

impl RunReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {} of {} ({:.1}s){}",
            self.client_type,
            self.client_mode,
            self.dataset_path.display(),
            self.elapsed_secs,
            if self.cancelled { ", cancelled" } else { "" }
        )?;
        writeln!(f)?;
        write!(f, "{}", self.statistics)
    }
}

/// Trains or evaluates a backend against one labeled dataset.
///
/// Wires the scanner, batch builder, backend client and decision policy
/// together and delegates execution to a `PipelineExecutor`. Single-use:
/// `execute` consumes the policy and logger.
pub struct ProcessDatasetUseCase {
    config: RunConfig,
    client: Arc<dyn BackendClient>,
    policy: Option<Box<dyn DecisionPolicy>>,
    executor: Box<dyn PipelineExecutor>,
    logger: Option<Box<dyn PipelineLogger>>,
    on_progress: Option<Box<dyn Fn(usize) + Send>>,
}

impl ProcessDatasetUseCase {
    pub fn new(
        config: RunConfig,
        client: Arc<dyn BackendClient>,
        policy: Box<dyn DecisionPolicy>,
        executor: Box<dyn PipelineExecutor>,
        logger: Box<dyn PipelineLogger>,
    ) -> Self {
        Self {
            config,
            client,
            policy: Some(policy),
            executor,
            logger: Some(logger),
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, on_progress: Box<dyn Fn(usize) + Send>) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    /// Fails before touching the dataset if the configuration is unusable.
    fn check(&self) -> Result<(), ConfigError> {
        self.config.validate()?;
        if self.config.client_mode == ClientMode::Train && !self.client.supports_enroll() {
            return Err(ConfigError::UnsupportedOperation {
                backend: self.config.client_type,
                mode: self.config.client_mode,
            });
        }
        Ok(())
    }

    pub fn execute(&mut self, cancelled: Arc<AtomicBool>) -> Result<RunReport, RunError> {
        self.check()?;
        let policy = self.policy.take().ok_or(RunError::AlreadyExecuted)?;
        let mut logger = self.logger.take().ok_or(RunError::AlreadyExecuted)?;

        let config = &self.config;
        logger.info(&format!(
            "Starting {} on {} with {}",
            config.client_mode,
            config.dataset_path.display(),
            self.client.name()
        ));

        let scanner = DatasetScanner::new(
            config.dataset_path.clone(),
            config.label_override().map(str::to_string),
        );
        let processor = Arc::new(BatchProcessor::new(
            config.client_mode,
            self.client.clone(),
            policy,
            ErrorActionHandler::new(config.error_behavior, config.output_dir.clone()),
        ));
        let pipeline_config = PipelineConfig {
            on_progress: self.on_progress.take(),
            cancelled: cancelled.clone(),
        };

        let start = Instant::now();
        let statistics = self.executor.execute(
            Box::new(scanner.scan()),
            BatchBuilder::new(config.max_request_size),
            processor,
            logger.as_mut(),
            pipeline_config,
        )?;
        let elapsed_secs = start.elapsed().as_secs_f64();
        logger.summary();

        Ok(RunReport {
            client_type: config.client_type,
            client_mode: config.client_mode,
            dataset_path: config.dataset_path.clone(),
            statistics,
            cancelled: cancelled.load(Ordering::Relaxed),
            elapsed_secs,
        })
    }
}
