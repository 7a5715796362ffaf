//! extract_frames - sample evenly spaced frames for labeling and split them
//! into `images/train` and `images/val`.

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use fishcount::dataset::{extract_frames, ExtractOptions};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(name = "extract_frames", about = "Sample frames for labeling")]
struct Args {
    /// Source video
    #[arg(long, value_name = "PATH", default_value = "first_hour.mp4.webm")]
    video: PathBuf,

    /// Root output directory (images go under images/train|val)
    #[arg(long, value_name = "DIR", default_value = "dataset")]
    output: PathBuf,

    /// Seconds to skip between extracted frames
    #[arg(long, default_value_t = 3.0)]
    frame_gap: f64,

    /// Total number of frames to export
    #[arg(long, default_value_t = 60)]
    max_frames: usize,

    /// Fraction of frames routed to validation images (0-1)
    #[arg(long, default_value_t = 0.2)]
    val_ratio: f64,

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

    let opts = ExtractOptions {
        video: args.video,
        output: args.output,
        frame_gap: args.frame_gap,
        max_frames: args.max_frames,
        val_ratio: args.val_ratio,
    };
    let summary = {
        let _stage = ui.stage("Extract frames");
        extract_frames(&opts)?
    };
    println!("{summary}");
    Ok(())
}
