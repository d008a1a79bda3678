use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};

use crate::dataset::domain::batch_builder::{Batch, BatchBuilder};
use crate::dataset::infrastructure::dataset_scanner::ScanEntry;
use crate::pipeline::batch_processor::BatchProcessor;
use crate::pipeline::pipeline_executor::{
    PipelineConfig, PipelineError, PipelineExecutor, ScanEntries,
};
use crate::pipeline::pipeline_logger::PipelineLogger;
use crate::pipeline::run_aggregator::{RunAggregator, RunStatistics};
use crate::shared::constants::{DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};
use crate::shared::outcome::Outcome;

/// What flows back to the aggregating thread.
enum Report {
    /// Failed during the scan; never reached a backend.
    Scanned(Outcome),
    Processed {
        outcomes: Vec<Outcome>,
        dispatch_ms: f64,
        queue_depth: usize,
    },
}

/// Runs the pipeline on a pool of worker threads.
///
/// Layout: `producer [scan/batch] → workers [backend/decide/error action] → main [aggregate]`
///
/// The batch queue is bounded, so the producer blocks while every worker
/// is busy. Only the calling thread touches the aggregator.
pub struct ThreadedPipelineExecutor {
    workers: usize,
    channel_capacity: usize,
}

impl ThreadedPipelineExecutor {
    pub fn new(workers: usize, channel_capacity: usize) -> Self {
        Self {
            workers: workers.max(1),
            channel_capacity: channel_capacity.max(1),
        }
    }
}

impl Default for ThreadedPipelineExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS, DEFAULT_QUEUE_CAPACITY)
    }
}

impl PipelineExecutor for ThreadedPipelineExecutor {
    fn execute(
        &self,
        entries: ScanEntries,
        builder: BatchBuilder,
        processor: Arc<BatchProcessor>,
        logger: &mut dyn PipelineLogger,
        config: PipelineConfig,
    ) -> Result<RunStatistics, PipelineError> {
        let cap = self.channel_capacity;
        logger.info(&format!(
            "Dispatching with {} workers (queue capacity {cap}, max request size {} bytes)",
            self.workers,
            builder.max_request_size()
        ));

        let (batch_tx, batch_rx) = crossbeam_channel::bounded::<Batch>(cap);
        let (report_tx, report_rx) = crossbeam_channel::bounded::<Report>(cap * self.workers);

        let producer_handle = spawn_producer(
            entries,
            builder,
            processor.clone(),
            batch_tx,
            report_tx.clone(),
            config.cancelled.clone(),
        );
        let worker_handles: Vec<_> = (0..self.workers)
            .map(|_| {
                spawn_worker(
                    processor.clone(),
                    batch_rx.clone(),
                    report_tx.clone(),
                    config.cancelled.clone(),
                )
            })
            .collect();

        // The loop below ends once every sender is gone.
        drop(batch_rx);
        drop(report_tx);

        let aggregator = run_main_loop(report_rx, logger, &config);

        let dropped = join_threads(producer_handle, worker_handles)?;
        if dropped > 0 {
            logger.info(&format!("Cancelled: {dropped} queued images were not dispatched"));
        }

        Ok(aggregator.finalize())
    }
}

/// Scans, batches and enqueues. Returns how many scanned images were
/// discarded because of cancellation.
fn spawn_producer(
    entries: ScanEntries,
    mut builder: BatchBuilder,
    processor: Arc<BatchProcessor>,
    batch_tx: Sender<Batch>,
    report_tx: Sender<Report>,
    cancelled: Arc<AtomicBool>,
) -> JoinHandle<usize> {
    std::thread::spawn(move || {
        for entry in entries {
            if cancelled.load(Ordering::Relaxed) {
                break;
            }
            match entry {
                ScanEntry::Image(item) => {
                    if let Some(batch) = builder.push(item) {
                        if batch_tx.send(batch).is_err() {
                            return 0;
                        }
                    }
                }
                ScanEntry::Failed(outcome) => {
                    processor.settle(&outcome);
                    if report_tx.send(Report::Scanned(outcome)).is_err() {
                        return 0;
                    }
                }
            }
        }

        let pending = builder.finish();
        if cancelled.load(Ordering::Relaxed) {
            return pending.map_or(0, |batch| batch.len());
        }
        if let Some(batch) = pending {
            let _ = batch_tx.send(batch);
        }
        0
    })
}

/// Dispatches batches until the queue closes. Batches taken off the queue
/// after cancellation are dropped unsent; returns how many images that was.
fn spawn_worker(
    processor: Arc<BatchProcessor>,
    batch_rx: Receiver<Batch>,
    report_tx: Sender<Report>,
    cancelled: Arc<AtomicBool>,
) -> JoinHandle<usize> {
    std::thread::spawn(move || {
        let mut dropped = 0;
        for batch in batch_rx.iter() {
            if cancelled.load(Ordering::Relaxed) {
                dropped += batch.len();
                continue;
            }

            let queue_depth = batch_rx.len();
            let start = Instant::now();
            let outcomes = processor.process(&batch);
            let dispatch_ms = start.elapsed().as_secs_f64() * 1000.0;

            let report = Report::Processed {
                outcomes,
                dispatch_ms,
                queue_depth,
            };
            if report_tx.send(report).is_err() {
                break;
            }
        }
        dropped
    })
}

/// Records every reported outcome, in arrival order.
fn run_main_loop(
    report_rx: Receiver<Report>,
    logger: &mut dyn PipelineLogger,
    config: &PipelineConfig,
) -> RunAggregator {
    let mut aggregator = RunAggregator::new();

    for report in report_rx {
        match report {
            Report::Scanned(outcome) => aggregator.record(&outcome),
            Report::Processed {
                outcomes,
                dispatch_ms,
                queue_depth,
            } => {
                logger.timing("dispatch", dispatch_ms);
                logger.metric("batch_size", outcomes.len() as f64);
                logger.metric("queue_depth", queue_depth as f64);
                for outcome in &outcomes {
                    aggregator.record(outcome);
                }
            }
        }

        let processed = aggregator.recorded();
        logger.progress(processed);
        if let Some(ref callback) = config.on_progress {
            callback(processed);
        }
    }

    aggregator
}

/// Joins all pipeline threads and coalesces the first error encountered.
/// On success returns the number of images dropped by cancellation.
fn join_threads(
    producer_handle: JoinHandle<usize>,
    worker_handles: Vec<JoinHandle<usize>>,
) -> Result<usize, PipelineError> {
    fn set_if_none(slot: &mut Option<PipelineError>, err: PipelineError) {
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    let mut first_error = None;
    let mut dropped = 0;

    match producer_handle.join() {
        Ok(n) => dropped += n,
        Err(_) => set_if_none(&mut first_error, PipelineError::ThreadPanicked("producer")),
    }

    for handle in worker_handles {
        match handle.join() {
            Ok(n) => dropped += n,
            Err(_) => set_if_none(&mut first_error, PipelineError::ThreadPanicked("worker")),
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(dropped),
    }
}
