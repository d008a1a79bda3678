use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use thiserror::Error;

use crate::dataset::domain::batch_builder::BatchBuilder;
use crate::dataset::infrastructure::dataset_scanner::ScanEntry;
use crate::pipeline::batch_processor::BatchProcessor;
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::run_aggregator::RunStatistics;

/// Configuration for a pipeline execution run.
#[derive(Default)]
pub struct PipelineConfig {
    /// Called with the number of images that have a final outcome so far.
    pub on_progress: Option<Box<dyn Fn(usize) + Send>>,
    pub cancelled: Arc<AtomicBool>,
}

impl PipelineConfig {
    pub fn new(cancelled: Arc<AtomicBool>) -> Self {
        Self {
            on_progress: None,
            cancelled,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}

pub type ScanEntries = Box<dyn Iterator<Item = ScanEntry> + Send>;

/// Abstracts how the scan → batch → dispatch → aggregate pipeline runs.
///
/// This is a port (application-layer interface). Infrastructure provides
/// the concrete implementation.
pub trait PipelineExecutor: Send {
    fn execute(
        &self,
        entries: ScanEntries,
        builder: BatchBuilder,
        processor: Arc<BatchProcessor>,
        logger: &mut dyn PipelineLogger,
        config: PipelineConfig,
    ) -> Result<RunStatistics, PipelineError>;
}
