use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::unbounded;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use tex2icon::config::Config;
use tex2icon::event::AppMsg;
use tex2icon::pipeline::{BatchReport, CancelToken, CropPolicy, KtechSynthesizer};
use tex2icon::pipeline_worker::{CropJob, PipelineWorker};

/// Crop named icons out of Klei texture atlases.
#[derive(Parser, Debug)]
#[command(name = "tex2icon", version, about)]
struct Cli {
    /// Folder holding the atlas .xml/.png pairs
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Folder the cropped PNGs are written to
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Folder containing the ktech converter, used to rebuild missing atlas images
    #[arg(long)]
    ktech: Option<PathBuf>,

    /// Crop a fixed 64px square around each icon's center
    #[arg(long)]
    fixed: bool,

    /// Leave icons whose output PNG already exists untouched
    #[arg(long)]
    skip: bool,

    /// Read icon names from a file, one per line
    #[arg(short = 'f', long)]
    names_file: Option<PathBuf>,

    /// Use this config file instead of the per-user one
    #[arg(long)]
    config: Option<PathBuf>,

    /// Icon names, with or without the .tex extension
    names: Vec<String>,
}

fn main() {
    // Batch warnings already reach stderr as messages; RUST_LOG opts into the rest.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().or_else(Config::default_path);
    let mut config = match &config_path {
        Some(path) => Config::load_or_default(path).unwrap_or_else(|e| {
            eprintln!("Ignoring config {}: {}", path.display(), e);
            Config::default()
        }),
        None => Config::default(),
    };

    if let Some(source) = cli.source {
        config.source_dir = source;
    }
    if let Some(output) = cli.output {
        config.output_dir = output;
    }
    if cli.ktech.is_some() {
        config.ktech_dir = cli.ktech;
    }
    let policy = if cli.fixed { CropPolicy::fixed() } else { config.policy };
    let skip_existing = cli.skip || config.skip_existing;

    let mut names = cli.names;
    if let Some(file) = &cli.names_file {
        let content = fs::read_to_string(file)
            .with_context(|| format!("Failed to read names from {}", file.display()))?;
        names.extend(content.lines().map(str::to_string));
    }

    let mut job = CropJob::new(&config.source_dir, &config.output_dir, names)
        .with_policy(policy)
        .with_skip_existing(skip_existing);
    match KtechSynthesizer::locate(config.ktech_dir.as_deref()) {
        Ok(ktech) => job = job.with_ktech(ktech),
        Err(e) if config.ktech_dir.is_some() => eprintln!("Warning: {:#}", e),
        Err(_) => {}
    }

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    ctrlc::set_handler(move || on_interrupt.cancel())
        .context("Failed to install Ctrl-C handler")?;

    let (tx, rx) = unbounded();
    let worker = PipelineWorker::new(tx);
    let handle = worker.start_crop(job, cancel);
    drop(worker);

    let mut outcome: Result<()> = Ok(());
    for msg in rx.iter() {
        match msg {
            AppMsg::PipelineStarted { .. } | AppMsg::PipelineProgress(..) => {}
            AppMsg::ItemFinished(key, result) => println!("{}", result.status_line(&key)),
            AppMsg::LogMessage(line) => println!("{}", line),
            AppMsg::WarnMessage(line) => eprintln!("{}", line),
            AppMsg::PipelineCompleted(report) => print_summary("Cropping completed.", &report),
            AppMsg::PipelineCancelled(report) => print_summary("Cropping cancelled.", &report),
            AppMsg::PipelineFailed(e) => outcome = Err(anyhow::anyhow!(e)),
        }
    }

    if handle.join().is_err() {
        anyhow::bail!("crop worker panicked");
    }
    outcome?;

    if let Some(path) = &config_path {
        if let Err(e) = config.save_to_file(path) {
            eprintln!("Failed to save config {}: {}", path.display(), e);
        }
    }
    Ok(())
}

fn print_summary(headline: &str, report: &BatchReport) {
    let summary = report.summary();
    println!(
        "{} {} cropped, {} skipped, {} not found, {} failed ({} of {} processed)",
        headline,
        summary.succeeded,
        summary.skipped,
        summary.not_found,
        summary.failed,
        summary.total(),
        report.requested
    );
}
