use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gems_core::{retry_backoff_ms, Payload, SubmissionKind};
use gems_pipeline::{endpoint, HttpTransport, Orchestrator, PipelineConfig, RetryCoordinator, SubmissionOutcome};
use gems_queue::{QueueEvent, SubmissionQueue};
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "gems", version, about = "Background submission pipeline for restaurants, dishes, reviews and posts")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Stage, upload and persist one submission, retrying on failure
    Submit(SubmitArgs),

    /// Print the upload and create routes for every kind
    Routes {
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        base_url: String,
    },
}

#[derive(Debug, clap::Args)]
struct SubmitArgs {
    /// API base URL, e.g. https://api.example.com. Overrides the config file.
    #[arg(long)]
    base_url: Option<String>,

    /// TOML file with base_url, staging_dir, content_root, step_timeout_secs
    #[arg(long)]
    config: Option<PathBuf>,

    /// restaurant | dish | review | post
    #[arg(long)]
    kind: SubmissionKind,

    /// Form fields as a JSON object
    #[arg(long, conflicts_with = "payload_file")]
    payload: Option<String>,

    #[arg(long)]
    payload_file: Option<PathBuf>,

    /// Local image reference (file://, content:// or a path). Repeatable.
    #[arg(long = "image")]
    images: Vec<String>,

    #[arg(long)]
    staging_dir: Option<PathBuf>,

    #[arg(long)]
    content_root: Option<PathBuf>,

    /// Automatic retries after a failure.
    #[arg(long, default_value_t = 0)]
    retries: u32,
}

fn load_config(args: &SubmitArgs) -> Result<PipelineConfig> {
    let mut cfg = match (&args.config, &args.base_url) {
        (Some(path), _) => PipelineConfig::load_from(path)?,
        (None, Some(base)) => PipelineConfig::new(base.clone()),
        (None, None) => bail!("either --base-url or --config is required"),
    };
    if let Some(base) = &args.base_url {
        cfg.base_url = base.clone();
    }
    if let Some(dir) = &args.staging_dir {
        cfg.staging_dir = dir.clone();
    }
    if let Some(root) = &args.content_root {
        cfg.content_root = Some(root.clone());
    }
    Ok(cfg)
}

fn load_payload(args: &SubmitArgs) -> Result<Payload> {
    let raw = match (&args.payload, &args.payload_file) {
        (Some(s), _) => s.clone(),
        (None, Some(path)) => std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?,
        (None, None) => return Ok(Payload::new()),
    };
    let value: Value = serde_json::from_str(&raw).context("parse payload JSON")?;
    match value {
        Value::Object(map) => Ok(map),
        _ => bail!("payload must be a JSON object"),
    }
}

fn outcome_json(outcome: &SubmissionOutcome) -> Value {
    match outcome {
        SubmissionOutcome::Done { id, receipt } => json!({"id": id, "status": "done", "receipt": receipt}),
        SubmissionOutcome::Failed { id, failure } => json!({"id": id, "status": "failed", "error": failure}),
        SubmissionOutcome::Abandoned { id } => json!({"id": id, "status": "abandoned"}),
    }
}

async fn submit(args: SubmitArgs) -> Result<()> {
    let cfg = load_config(&args)?;
    let payload = load_payload(&args)?;
    info!(base_url = %cfg.base_url(), kind = %args.kind, images = args.images.len(), "submitting");

    let queue = SubmissionQueue::new();
    let orchestrator = Orchestrator::new(&cfg, Arc::new(HttpTransport::new()), queue.clone());
    let retries = RetryCoordinator::new(orchestrator.clone());

    let mut events = queue.events();
    let watcher = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(QueueEvent::Removed { id, .. }) => info!(submission_id = %id, "left queue"),
                Ok(ev) => info!(submission_id = %ev.id(), status = ?ev.status(), "queue"),
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "event feed lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let handle = orchestrator.submit(args.kind, payload, args.images.clone())?;
    let id = handle.id();
    let mut outcome = handle.settled().await;

    let mut left = args.retries;
    while let SubmissionOutcome::Failed { failure, .. } = &outcome {
        if left == 0 {
            break;
        }
        left -= 1;
        let attempt = queue.get(id).map(|s| s.attempts() + 1).unwrap_or(1);
        let delay = retry_backoff_ms(attempt);
        warn!(submission_id = %id, attempt, delay_ms = delay, error = %failure.display_message(), "retrying");
        tokio::time::sleep(Duration::from_millis(delay)).await;
        outcome = retries.retry(id, None)?.settled().await;
    }
    watcher.abort();

    let report = json!({
        "outcome": outcome_json(&outcome),
        "queue": queue.view(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    match outcome {
        SubmissionOutcome::Done { .. } => Ok(()),
        SubmissionOutcome::Failed { failure, .. } => bail!("submission {id} failed: {}", failure.display_message()),
        SubmissionOutcome::Abandoned { .. } => bail!("submission {id} was abandoned"),
    }
}

fn print_routes(base_url: &str) {
    let base = base_url.trim_end_matches('/');
    for kind in SubmissionKind::ALL {
        let ep = endpoint(kind);
        println!(
            "{:<10} upload {} (field {})  create {} (url field {})",
            kind,
            ep.upload_url(base),
            ep.image_field,
            ep.create_url(base),
            ep.url_field
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Submit(args) => submit(args).await,
        Command::Routes { base_url } => {
            print_routes(&base_url);
            Ok(())
        }
    }
}
