//! analyze_detections - report fish coverage from a Parquet detection log.

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use fishcount::analyze::{load_and_analyze, plot_histogram, resolve_plot_path};
use fishcount::config::Defaults;
use fishcount::labels::Labeler;

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "analyze_detections",
    about = "Inspect Parquet detection logs and report fish coverage"
)]
struct Args {
    /// Parquet file produced by run_video --log-parquet
    #[arg(value_name = "PARQUET")]
    parquet: PathBuf,

    /// Unique fish a frame needs to count as complete (defaults to the
    /// configured min_subjects)
    #[arg(long)]
    min_fish: Option<usize>,

    /// Save a bar chart; optionally pass a file or directory for the PNG
    #[arg(long, value_name = "PATH", num_args = 0..=1)]
    plot: Option<Option<PathBuf>>,

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

    let defaults = Defaults::load()?;
    let min_fish = args.min_fish.unwrap_or(defaults.min_subjects);
    let report = {
        let _stage = ui.stage("Load detections");
        load_and_analyze(&args.parquet, min_fish)?
    };
    let Some(report) = report else {
        println!("No detections found in the Parquet file.");
        return Ok(());
    };
    print!("{report}");

    if let Some(plot) = args.plot {
        let output = resolve_plot_path(plot.as_deref(), &args.parquet)?;
        let labels = Labeler::from_config(defaults.font.as_deref());
        plot_histogram(&report.histogram, &output, &labels)?;
        println!("Saved bar chart to {}", output.display());
    }
    Ok(())
}
