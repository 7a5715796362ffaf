//! run_video - run the fish detector over a whole video.
//!
//! Detection mode samples every `--stride`-th frame; `--tracker` adds
//! persistent track ids. Detections can be collected into a Parquet log that
//! is written once when the run ends (normally, on `q` + Enter, or on Ctrl-C).

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use fishcount::config::{Defaults, RunConfig};
use fishcount::run::run_with_progress;
use fishcount::StopSignal;

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "run_video",
    about = "Run detections over an entire video, optionally track objects, and log detections to Parquet"
)]
struct Args {
    /// Video file to process (defaults to the configured source)
    #[arg(long, value_name = "PATH")]
    source: Option<PathBuf>,

    /// ONNX checkpoint to load (e.g. runs/detect/train/weights/best.onnx)
    #[arg(long, value_name = "PATH")]
    weights: Option<PathBuf>,

    /// Confidence threshold for keeping detections
    #[arg(long)]
    conf: Option<f32>,

    /// Write annotated frames to the preview image (type q + Enter to stop)
    #[arg(long)]
    display: bool,

    /// Skip everything before this timestamp (seconds)
    #[arg(long, default_value_t = 0.0)]
    start_seconds: f64,

    /// Stop once this timestamp (seconds) is reached
    #[arg(long)]
    end_seconds: Option<f64>,

    /// Run inference every N frames (30 gives ~1 FPS on 30 FPS video)
    #[arg(long, default_value_t = 1)]
    stride: u64,

    /// Enable multi-object tracking
    #[arg(long)]
    tracker: bool,

    /// Store detection records as Parquet; without a path, files go to the
    /// configured log directory
    #[arg(long, value_name = "PATH", num_args = 0..=1)]
    log_parquet: Option<Option<PathBuf>>,

    /// Report progress every N frames (0 disables)
    #[arg(long, default_value_t = 0)]
    progress_interval: u64,

    /// Directory for the live preview image
    #[arg(long, value_name = "DIR")]
    preview_dir: Option<PathBuf>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE", env = "FISHCOUNT_UI")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let defaults = {
        let _stage = ui.stage("Load defaults");
        Defaults::load()?
    };
    let cfg = build_config(args, &defaults);

    let stop = StopSignal::new();
    stop.install_handlers(cfg.display)?;

    let summary = run_with_progress(&cfg, &stop, ui.progress_sink())?;
    log::info!(
        "processed {} frames{}",
        summary.frames_processed,
        if summary.stopped_early { " (stopped early)" } else { "" }
    );
    match &summary.log_path {
        Some(path) => println!(
            "Saved {} detections to {}",
            summary.records_logged,
            path.display()
        ),
        None if summary.logging_enabled => println!("No detections collected; nothing to write."),
        None => {}
    }
    Ok(())
}

fn build_config(args: Args, defaults: &Defaults) -> RunConfig {
    let mut cfg = RunConfig::from_defaults(defaults);
    if let Some(source) = args.source {
        cfg.source = source;
    }
    if let Some(weights) = args.weights {
        cfg.weights = weights;
    }
    if let Some(conf) = args.conf {
        cfg.confidence = conf;
    }
    if let Some(dir) = args.preview_dir {
        cfg.preview_dir = dir;
    }
    cfg.display = args.display;
    cfg.start_seconds = args.start_seconds;
    cfg.end_seconds = args.end_seconds;
    cfg.stride = args.stride;
    cfg.tracker = args.tracker;
    cfg.progress_interval = args.progress_interval;
    cfg.log_destination = args
        .log_parquet
        .map(|path| path.unwrap_or_else(|| defaults.log_dir.clone()));
    cfg
}
