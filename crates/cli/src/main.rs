use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use face_trainer_core::backend::infrastructure::client_factory::create_client;
use face_trainer_core::pipeline::infrastructure::threaded_pipeline_executor::ThreadedPipelineExecutor;
use face_trainer_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use face_trainer_core::pipeline::process_dataset_use_case::ProcessDatasetUseCase;
use face_trainer_core::recognition::domain::decision_policy::create_policy;
use face_trainer_core::shared::run_config::{
    BackendConfig, ClientMode, ClientType, ErrorBehavior, PostRecognizeStrategy, RunConfig,
};

/// Enroll a labeled face dataset into a recognition backend, or measure
/// how well the backend recognizes it.
#[derive(Parser, Debug)]
#[command(name = "face-trainer", version)]
struct Cli {
    /// Backend to talk to: compreface or doubletake.
    #[arg(long, env = "CLIENT_TYPE")]
    client_type: ClientType,

    /// train (enroll every image) or recognize (classify and score).
    #[arg(short = 'm', long, env = "CLIENT_MODE", default_value = "train")]
    client_mode: ClientMode,

    /// Dataset root; images live in one folder per subject.
    #[arg(long, env = "DATASET_PATH")]
    dataset_path: PathBuf,

    /// Upper bound on the bytes of images sent in one request.
    #[arg(long, env = "MAX_REQUEST_SIZE", default_value = "10485760")]
    max_request_size: u64,

    /// Use this label for every image instead of the folder names.
    #[arg(long, env = "OVERRIDE_TRAINED_NAME")]
    override_trained_name: Option<String>,

    /// Where failed images are copied or moved to, one folder per label.
    #[arg(long, env = "OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// What to do with failed images: copy, move or ignore.
    #[arg(long, env = "ERROR_BEHAVIOR", default_value = "ignore")]
    error_behavior: ErrorBehavior,

    /// How a recognition result is accepted: maxsimilarity, abovethreshold or keepasis.
    #[arg(long, env = "POST_RECOGNIZE_STRATEGY", default_value = "maxsimilarity")]
    post_recognize_strategy: PostRecognizeStrategy,

    /// Minimum confidence (0.0-1.0) for abovethreshold.
    #[arg(long, env = "ABOVE_THRESHOLD", default_value = "0.95")]
    above_threshold: f64,

    #[arg(long, env = "COMPREFACE_URL", default_value = "http://localhost:8080")]
    compreface_url: String,

    #[arg(long, env = "COMPREFACE_API_KEY", hide_env_values = true)]
    compreface_api_key: Option<String>,

    #[arg(long, env = "DOUBLE_TAKE_URL", default_value = "http://localhost:3000")]
    doubletake_url: String,

    /// Concurrent backend requests.
    #[arg(long, default_value = "4")]
    workers: usize,

    /// Batches scanned ahead of the workers.
    #[arg(long, default_value = "4")]
    queue_capacity: usize,

    /// Per-request timeout in seconds.
    #[arg(long, default_value = "30")]
    request_timeout: u64,

    /// Also write the report as JSON to this file.
    #[arg(long)]
    report_json: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let report_json = cli.report_json.clone();
    let config = build_config(cli);
    config.validate()?;

    let client = create_client(&config)?;
    let policy = create_policy(config.post_recognize_strategy, config.above_threshold);
    let executor = ThreadedPipelineExecutor::new(config.workers, config.queue_capacity);

    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = cancelled.clone();
    ctrlc::set_handler(move || {
        if !flag.swap(true, Ordering::SeqCst) {
            eprintln!("\nInterrupted: finishing in-flight requests...");
        }
    })?;

    let progress: Box<dyn Fn(usize) + Send> = Box::new(|processed| {
        eprint!("\rProcessed {processed} images");
    });

    let mut use_case = ProcessDatasetUseCase::new(
        config,
        client,
        policy,
        Box::new(executor),
        Box::new(StdoutPipelineLogger::default()),
    )
    .with_progress(progress);
    let report = use_case.execute(cancelled)?;
    eprintln!();

    println!("{report}");
    if let Some(path) = report_json {
        fs::write(&path, report.to_json()?)?;
        log::info!("Report written to {}", path.display());
    }
    Ok(())
}

fn build_config(cli: Cli) -> RunConfig {
    let backend = BackendConfig {
        compreface_url: cli.compreface_url,
        compreface_api_key: cli.compreface_api_key,
        doubletake_url: cli.doubletake_url,
        request_timeout: Duration::from_secs(cli.request_timeout),
    };

    RunConfig::new(cli.client_type, cli.client_mode, cli.dataset_path)
        .with_max_request_size(cli.max_request_size)
        .with_override_trained_name(cli.override_trained_name)
        .with_error_behavior(cli.error_behavior, cli.output_dir)
        .with_strategy(cli.post_recognize_strategy, cli.above_threshold)
        .with_backend(backend)
        .with_concurrency(cli.workers, cli.queue_capacity)
}
