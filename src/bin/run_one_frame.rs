//! run_one_frame - detect fish on one image, or the first frame of a video,
//! and save an annotated copy.

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use fishcount::config::Defaults;
use fishcount::labels::Labeler;
use fishcount::single_frame::{describe_box, detect_single_frame};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "run_one_frame",
    about = "Run the detector on a single image or the first frame of a video and save an annotated copy"
)]
struct Args {
    /// Image or video; videos use their first frame
    #[arg(long, value_name = "PATH")]
    source: Option<PathBuf>,

    /// ONNX checkpoint to load
    #[arg(long, value_name = "PATH")]
    weights: Option<PathBuf>,

    /// Where to store the annotated frame
    #[arg(long, value_name = "PATH", default_value = "frame_with_boxes.jpg")]
    output: PathBuf,

    /// Confidence threshold for keeping detections
    #[arg(long)]
    conf: Option<f32>,

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
    let source = args.source.unwrap_or_else(|| defaults.source.clone());
    let weights = args.weights.unwrap_or_else(|| defaults.weights.clone());
    let confidence = args.conf.unwrap_or(defaults.confidence);

    let outcome = {
        let _stage = ui.stage("Detect");
        let labels = Labeler::from_config(defaults.font.as_deref());
        detect_single_frame(&source, &weights, &args.output, confidence, &labels)?
    };
    for det in &outcome.result.boxes {
        println!("{}", describe_box(det));
    }
    println!("Saved annotated frame to {}", outcome.output.display());
    Ok(())
}
