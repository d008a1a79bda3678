use std::collections::HashMap;
use std::time::Instant;

/// Cross-cutting logger for run orchestration events.
///
/// Keeps the executor independent of where progress ends up (stdout,
/// log crate, nothing at all).
pub trait PipelineLogger: Send {
    /// Report how many images have a final outcome so far.
    fn progress(&mut self, processed: usize);

    /// Record how long a named stage took for one batch.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. batch size).
    fn metric(&mut self, name: &str, value: f64);

    /// Log a human-readable status message.
    fn info(&mut self, message: &str);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events. Used by tests and embedders.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _processed: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// CLI-oriented logger that tracks per-stage timing and metrics and
/// prints a summary when the run completes.
///
/// Progress output is throttled to every `throttle_items` images so large
/// datasets don't flood the log.
pub struct StdoutPipelineLogger {
    throttle_items: usize,
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    start_time: Instant,
    processed: usize,
    last_logged: usize,
}

impl StdoutPipelineLogger {
    pub fn new(throttle_items: usize) -> Self {
        Self {
            throttle_items: throttle_items.max(1),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
            processed: 0,
            last_logged: 0,
        }
    }

    /// Returns the formatted summary string, or `None` if no data recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let items = self.processed;
        let mut lines = Vec::new();

        lines.push(format!(
            "Run summary ({items} images, {:.1}s total):",
            elapsed_ms / 1000.0
        ));

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = if durations.is_empty() {
                0.0
            } else {
                total_ms / durations.len() as f64
            };
            let max_ms = durations.iter().copied().fold(0.0, f64::max);
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:7.1}ms  max {max_ms:7.1}ms  ({} calls)",
                durations.len()
            ));
        }

        let mut metric_names: Vec<_> = self.metrics.keys().collect();
        metric_names.sort();
        for name in metric_names {
            let values = &self.metrics[name];
            let avg = if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            };
            lines.push(format!("  {name}: avg {avg:.1}"));
        }

        if items > 0 && elapsed_ms > 0.0 {
            let rate = items as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Throughput: {rate:.1} images/s"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(100)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn progress(&mut self, processed: usize) {
        self.processed = processed;
        if processed >= self.last_logged + self.throttle_items {
            self.last_logged = processed;
            log::info!("Processed {processed} images");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_null_logger_all_methods_are_noop() {
        let mut logger = NullPipelineLogger;
        logger.progress(1);
        logger.timing("dispatch", 5.0);
        logger.metric("batch_size", 3.0);
        logger.info("hello");
        logger.summary();
    }

    #[test]
    fn test_timing_records_values() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.timing("dispatch", 20.0);
        logger.timing("dispatch", 30.0);
        logger.timing("scan", 5.0);

        let dispatch = logger.timings_for("dispatch").unwrap();
        assert_eq!(dispatch.len(), 2);
        assert_relative_eq!(dispatch[0], 20.0);
        assert_relative_eq!(dispatch[1], 30.0);
        assert_eq!(logger.timings_for("scan").unwrap().len(), 1);
        assert!(logger.timings_for("missing").is_none());
    }

    #[test]
    fn test_metric_records_values() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.metric("batch_size", 3.0);
        logger.metric("batch_size", 4.0);

        let values = logger.metrics_for("batch_size").unwrap();
        let avg = values.iter().sum::<f64>() / values.len() as f64;
        assert_relative_eq!(avg, 3.5);
    }

    #[test]
    fn test_summary_includes_timing_and_metrics() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.progress(10);
        logger.timing("dispatch", 20.0);
        logger.timing("dispatch", 40.0);
        logger.metric("batch_size", 3.0);
        logger.metric("batch_size", 4.0);

        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("Run summary (10 images"));
        assert!(summary.contains("dispatch"));
        assert!(summary.contains("max    40.0ms"));
        assert!(summary.contains("(2 calls)"));
        assert!(summary.contains("batch_size: avg 3.5"));
        assert!(summary.contains("images/s"));
    }

    #[test]
    fn test_empty_summary_returns_none() {
        let logger = StdoutPipelineLogger::new(10);
        assert!(logger.summary_string().is_none());
    }

    #[test]
    fn test_progress_throttled() {
        let mut logger = StdoutPipelineLogger::new(10);
        for processed in [3, 7, 9] {
            logger.progress(processed);
        }
        assert_eq!(logger.last_logged, 0);

        logger.progress(12);
        assert_eq!(logger.last_logged, 12);
        logger.progress(15);
        assert_eq!(logger.last_logged, 12);
        assert_eq!(logger.processed, 15);
    }

    #[test]
    fn test_info_is_not_part_of_the_summary() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.info("hello world");
        assert!(logger.summary_string().is_none());

        logger.timing("dispatch", 1.0);
        assert!(!logger.summary_string().unwrap().contains("hello world"));
    }

    #[test]
    fn test_default_throttle() {
        let logger = StdoutPipelineLogger::default();
        assert_eq!(logger.throttle_items, 100);
    }
}
