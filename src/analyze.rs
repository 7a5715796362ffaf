//! Offline coverage analysis of detection logs.
//!
//! For every logged frame the number of distinct subjects is counted (track
//! ids when the log has any, class ids otherwise). Frames reaching
//! `min_subjects` are "complete".

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use regex::Regex;

use crate::labels::Labeler;
use crate::parquet_log::read_records;
use crate::records::DetectionRecord;

const CHART_WIDTH: u32 = 640;
const CHART_HEIGHT: u32 = 480;
const MARGIN_LEFT: u32 = 64;
const MARGIN_RIGHT: u32 = 24;
const MARGIN_TOP: u32 = 44;
const MARGIN_BOTTOM: u32 = 60;
const BAR_COLOR: Rgb<u8> = Rgb([0x1f, 0x77, 0xb4]);
const AXIS_COLOR: Rgb<u8> = Rgb([40, 40, 40]);
const TEXT_COLOR: Rgb<u8> = Rgb([20, 20, 20]);
const TITLE_SCALE: f32 = 20.0;
const AXIS_TITLE_SCALE: f32 = 16.0;
const TICK_SCALE: f32 = 14.0;
const CHART_TITLE: &str = "Fish detections per frame";
const X_AXIS_TITLE: &str = "Unique fish per frame";
const Y_AXIS_TITLE: &str = "Frame count";

/// What the per-frame counts were taken over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupBy {
    Track,
    Class,
}

impl GroupBy {
    fn noun(self) -> &'static str {
        match self {
            GroupBy::Track => "tracks",
            GroupBy::Class => "classes",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CoverageReport {
    pub group_by: GroupBy,
    pub min_subjects: usize,
    pub total_frames: usize,
    pub complete_frames: usize,
    /// Unique-subject count → number of frames, ascending.
    pub histogram: BTreeMap<usize, usize>,
}

impl CoverageReport {
    pub fn coverage_percent(&self) -> f64 {
        percent(self.complete_frames, self.total_frames)
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

impl fmt::Display for CoverageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Frames analyzed: {}", self.total_frames)?;
        writeln!(
            f,
            "Frames with \u{2265}{} unique {}: {} ({:.2}%)",
            self.min_subjects,
            self.group_by.noun(),
            self.complete_frames,
            self.coverage_percent()
        )?;
        writeln!(f)?;
        writeln!(f, "Frames per unique-fish count:")?;
        for (count, frames) in &self.histogram {
            writeln!(
                f,
                "{} fish: {} frames ({:.2}%)",
                count,
                frames,
                percent(*frames, self.total_frames)
            )?;
        }
        Ok(())
    }
}

/// `None` for an empty log.
pub fn analyze_records(records: &[DetectionRecord], min_subjects: usize) -> Option<CoverageReport> {
    if records.is_empty() {
        return None;
    }
    let group_by = if records.iter().any(|r| r.track_id.is_some()) {
        GroupBy::Track
    } else {
        GroupBy::Class
    };

    let mut per_frame: BTreeMap<u64, BTreeSet<u64>> = BTreeMap::new();
    for record in records {
        let subjects = per_frame.entry(record.frame).or_default();
        let key = match group_by {
            GroupBy::Track => record.track_id,
            GroupBy::Class => Some(record.class_id as u64),
        };
        if let Some(key) = key {
            subjects.insert(key);
        }
    }

    let mut histogram = BTreeMap::new();
    let mut complete_frames = 0;
    for subjects in per_frame.values() {
        *histogram.entry(subjects.len()).or_insert(0) += 1;
        if subjects.len() >= min_subjects {
            complete_frames += 1;
        }
    }
    Some(CoverageReport {
        group_by,
        min_subjects,
        total_frames: per_frame.len(),
        complete_frames,
        histogram,
    })
}

pub fn load_and_analyze(log: &Path, min_subjects: usize) -> Result<Option<CoverageReport>> {
    if !log.exists() {
        return Err(anyhow!("parquet file not found: {}", log.display()));
    }
    let records = read_records(log)?;
    log::debug!("loaded {} records from {}", records.len(), log.display());
    Ok(analyze_records(&records, min_subjects))
}

fn timestamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(20\d{2}[01]\d[0-3]\d_[0-2]\d[0-5]\d[0-5]\d)").expect("static regex")
    })
}

/// The first `20YYMMDD_HHMMSS` stamp in the file stem, else the current time.
pub fn extract_timestamp(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    timestamp_regex()
        .captures(&stem)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(crate::timestamp_now)
}

/// Where to save the chart. No argument: next to the log. An argument with an
/// extension is a file; anything else is a directory. Directories are created.
pub fn resolve_plot_path(arg: Option<&Path>, log: &Path) -> Result<PathBuf> {
    let file_name = format!("fish_counts_{}.png", extract_timestamp(log));
    let Some(arg) = arg else {
        let dir = log.parent().unwrap_or_else(|| Path::new(""));
        return Ok(dir.join(file_name));
    };
    if arg.extension().is_some() {
        if let Some(parent) = arg.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        return Ok(arg.to_path_buf());
    }
    std::fs::create_dir_all(arg).with_context(|| format!("failed to create {}", arg.display()))?;
    Ok(arg.join(file_name))
}

/// Bar chart of frames per unique-subject count, one bar per histogram bucket,
/// with a title, axis titles and tick labels when the labeler has a font.
pub fn render_histogram(histogram: &BTreeMap<usize, usize>, labels: &Labeler) -> RgbImage {
    let mut chart = RgbImage::from_pixel(CHART_WIDTH, CHART_HEIGHT, Rgb([255, 255, 255]));
    let plot_left = MARGIN_LEFT;
    let plot_right = CHART_WIDTH - MARGIN_RIGHT;
    let plot_top = MARGIN_TOP;
    let baseline = CHART_HEIGHT - MARGIN_BOTTOM;
    let plot_width = plot_right - plot_left;
    let plot_height = baseline - plot_top;

    let tallest = histogram.values().copied().max().unwrap_or(0);
    if tallest > 0 {
        let slot = (plot_width / histogram.len() as u32).max(1);
        let bar_width = (slot * 3 / 4).max(1);
        for (i, (subjects, frames)) in histogram.iter().enumerate() {
            let slot_left = plot_left + i as u32 * slot;
            labels.draw_centered(
                &mut chart,
                TEXT_COLOR,
                (slot_left + slot / 2) as i32,
                (baseline + 6) as i32,
                TICK_SCALE,
                &subjects.to_string(),
            );
            let bar_height = ((*frames as f64 / tallest as f64) * plot_height as f64).round() as u32;
            if bar_height == 0 {
                continue;
            }
            let x = slot_left + slot.saturating_sub(bar_width) / 2;
            let y = baseline - bar_height;
            let rect = Rect::at(x as i32, y as i32).of_size(bar_width, bar_height);
            draw_filled_rect_mut(&mut chart, rect, BAR_COLOR);
        }
        draw_y_ticks(&mut chart, labels, tallest, plot_left, plot_top, baseline);
    }

    let (left, right) = (plot_left as f32, plot_right as f32);
    let (top, bottom) = (plot_top as f32, baseline as f32);
    draw_line_segment_mut(&mut chart, (left, bottom), (right, bottom), AXIS_COLOR);
    draw_line_segment_mut(&mut chart, (left, top), (left, bottom), AXIS_COLOR);

    let center_x = ((plot_left + plot_right) / 2) as i32;
    labels.draw_centered(&mut chart, TEXT_COLOR, center_x, 12, TITLE_SCALE, CHART_TITLE);
    labels.draw_centered(
        &mut chart,
        TEXT_COLOR,
        center_x,
        (CHART_HEIGHT - 26) as i32,
        AXIS_TITLE_SCALE,
        X_AXIS_TITLE,
    );
    labels.draw_vertical(
        &mut chart,
        TEXT_COLOR,
        6,
        ((plot_top + baseline) / 2) as i32,
        AXIS_TITLE_SCALE,
        Y_AXIS_TITLE,
    );
    chart
}

/// Frame-count ticks at zero, half and the tallest bar.
fn draw_y_ticks(
    chart: &mut RgbImage,
    labels: &Labeler,
    tallest: usize,
    plot_left: u32,
    plot_top: u32,
    baseline: u32,
) {
    let plot_height = (baseline - plot_top) as f64;
    let mut ticks = vec![0, tallest / 2, tallest];
    ticks.dedup();
    for value in ticks {
        let y = baseline as f64 - value as f64 / tallest as f64 * plot_height;
        let x = plot_left as f32;
        draw_line_segment_mut(chart, (x - 4.0, y as f32), (x, y as f32), AXIS_COLOR);
        let text = value.to_string();
        let (width, height) = labels.measure(TICK_SCALE, &text);
        labels.draw(
            chart,
            TEXT_COLOR,
            plot_left as i32 - 8 - width as i32,
            y as i32 - height as i32 / 2,
            TICK_SCALE,
            &text,
        );
    }
}

pub fn plot_histogram(
    histogram: &BTreeMap<usize, usize>,
    output: &Path,
    labels: &Labeler,
) -> Result<()> {
    render_histogram(histogram, labels)
        .save(output)
        .with_context(|| format!("failed to save chart {}", output.display()))?;
    log::info!("saved bar chart to {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracked(frame: u64, track_id: u64) -> DetectionRecord {
        DetectionRecord {
            frame,
            timestamp: None,
            track_id: Some(track_id),
            class_id: 0,
            confidence: 0.9,
            x1: 0.0,
            y1: 0.0,
            x2: 1.0,
            y2: 1.0,
        }
    }

    #[test]
    fn counts_distinct_tracks_per_frame() {
        let records = vec![
            tracked(1, 1),
            tracked(1, 2),
            tracked(1, 3),
            tracked(2, 1),
            tracked(2, 2),
            tracked(2, 2),
            tracked(3, 4),
        ];
        let report = analyze_records(&records, 2).unwrap();
        assert_eq!(report.group_by, GroupBy::Track);
        assert_eq!(report.total_frames, 3);
        assert_eq!(report.complete_frames, 2);
        assert_eq!(format!("{:.2}", report.coverage_percent()), "66.67");
        let expected: BTreeMap<usize, usize> = [(1, 1), (2, 1), (3, 1)].into_iter().collect();
        assert_eq!(report.histogram, expected);

        let text = report.to_string();
        assert!(text.contains("Frames analyzed: 3"));
        assert!(text.contains("unique tracks: 2 (66.67%)"));
        assert!(text.contains("3 fish: 1 frames (33.33%)"));
    }

    #[test]
    fn untracked_logs_group_by_class() {
        let mut a = tracked(0, 0);
        a.track_id = None;
        a.class_id = 1;
        let mut b = a.clone();
        b.class_id = 2;
        let mut c = a.clone();
        c.class_id = 1;
        let report = analyze_records(&[a, b, c], 3).unwrap();
        assert_eq!(report.group_by, GroupBy::Class);
        assert_eq!(report.histogram.get(&2), Some(&1));
        assert_eq!(report.complete_frames, 0);
    }

    #[test]
    fn empty_log_has_no_report() {
        assert!(analyze_records(&[], 3).is_none());
    }

    #[test]
    fn timestamp_comes_from_the_file_stem() {
        assert_eq!(
            extract_timestamp(Path::new("logs/detections_20240115_093000.parquet")),
            "20240115_093000"
        );
        let fallback = extract_timestamp(Path::new("logs/detections.parquet"));
        assert!(timestamp_regex().is_match(&fallback));
        assert_eq!(fallback.len(), 15);
    }

    #[test]
    fn plot_path_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("detections_20240115_093000.parquet");

        assert_eq!(
            resolve_plot_path(None, &log).unwrap(),
            dir.path().join("fish_counts_20240115_093000.png")
        );

        let file = dir.path().join("charts/a/out.png");
        assert_eq!(resolve_plot_path(Some(&file), &log).unwrap(), file);
        assert!(dir.path().join("charts/a").is_dir());

        let folder = dir.path().join("plots");
        assert_eq!(
            resolve_plot_path(Some(&folder), &log).unwrap(),
            folder.join("fish_counts_20240115_093000.png")
        );
        assert!(folder.is_dir());
    }

    #[test]
    fn chart_is_written_as_png() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("chart.png");
        let histogram: BTreeMap<usize, usize> = [(1, 4), (2, 1)].into_iter().collect();
        plot_histogram(&histogram, &out, &Labeler::plain()).unwrap();
        let chart = image::open(&out).unwrap().to_rgb8();
        assert_eq!(chart.dimensions(), (CHART_WIDTH, CHART_HEIGHT));
    }

    #[test]
    fn bars_scale_to_the_tallest_bucket() {
        let histogram: BTreeMap<usize, usize> = [(1, 4), (2, 2)].into_iter().collect();
        let chart = render_histogram(&histogram, &Labeler::plain());
        let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
        let slot = plot_width / 2;
        let baseline = CHART_HEIGHT - MARGIN_BOTTOM;
        let plot_height = baseline - MARGIN_TOP;
        let first = MARGIN_LEFT + slot / 2;
        let second = MARGIN_LEFT + slot + slot / 2;

        assert_eq!(*chart.get_pixel(first, MARGIN_TOP + 2), BAR_COLOR);
        assert_eq!(*chart.get_pixel(second, baseline - plot_height / 2 + 2), BAR_COLOR);
        assert_ne!(*chart.get_pixel(second, MARGIN_TOP + 2), BAR_COLOR);
    }

    // Exercised only on hosts with one of the system fonts installed.
    #[test]
    fn labelled_chart_has_text_outside_the_plot() {
        let Some(font) = crate::labels::find_font(None) else {
            return;
        };
        let histogram: BTreeMap<usize, usize> = [(1, 4), (3, 1)].into_iter().collect();
        let plain = render_histogram(&histogram, &Labeler::plain());
        let labelled = render_histogram(&histogram, &Labeler::new(Some(font)));

        let baseline = CHART_HEIGHT - MARGIN_BOTTOM;
        let differs = |x0: u32, y0: u32, x1: u32, y1: u32| {
            (x0..x1).any(|x| (y0..y1).any(|y| plain.get_pixel(x, y) != labelled.get_pixel(x, y)))
        };
        // title band, x tick row and y axis title column
        assert!(differs(0, 0, CHART_WIDTH, MARGIN_TOP));
        assert!(differs(MARGIN_LEFT, baseline + 2, CHART_WIDTH, baseline + 24));
        assert!(differs(0, MARGIN_TOP, 30, baseline));
    }
}
