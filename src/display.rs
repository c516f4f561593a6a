//! Text and chart geometry for frames and batch reports.

use crate::history::HISTORY_CAPACITY;
use crate::session::Frame;
use crate::stats::AggregateReport;

const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const FAILURE_TINT: (u8, u8, u8) = (255, 0, 0);

pub fn unset_title() -> String {
    "Set IP".to_string()
}

pub fn idle_title(target: &str) -> String {
    format!("Ping\n{}", target)
}

pub fn running_title(frame: &Frame) -> String {
    let latest = frame.latest.map(|s| s.to_string()).unwrap_or_default();
    format!("{}\nMax:{}", latest, frame.running_max)
}

pub fn batch_progress(successful: u32, total: u32) -> String {
    format!("Pinging...\n{}/{}", successful, total)
}

pub fn batch_report(report: &AggregateReport) -> String {
    format!(
        "Ping avg:\n{:.2}ms\nLoss:\n{:.2}%",
        report.average_latency_ms, report.loss_percent
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub height: f64,
    pub failed: bool,
}

/// Bar heights for a chart `height` units tall with one slot per history
/// entry. Failed probes fill the whole column.
pub fn bars(frame: &Frame, height: f64) -> Vec<Bar> {
    let scale = if frame.scale > 0.0 { frame.scale } else { 1.0 };
    frame
        .history
        .iter()
        .map(|sample| match sample.latency_ms() {
            Some(ms) => Bar {
                height: (((ms as f64) + 1.0) / scale * height).min(height),
                failed: false,
            },
            None => Bar { height, failed: true },
        })
        .collect()
}

/// One-line terminal chart of a frame.
#[derive(Debug, Clone)]
pub struct Sparkline {
    tint: Option<(u8, u8, u8)>,
}

impl Sparkline {
    /// `color` is the session's opaque chart color; only `#rrggbb` values
    /// produce colored output.
    pub fn new(color: &str) -> Self {
        Self { tint: parse_hex_color(color) }
    }

    pub fn plain() -> Self {
        Self { tint: None }
    }

    pub fn render(&self, frame: &Frame) -> String {
        let top = SPARK_LEVELS.len() as f64;
        let mut line = String::with_capacity(HISTORY_CAPACITY * 4);

        for bar in bars(frame, top) {
            let level = (bar.height.ceil() as usize).clamp(1, SPARK_LEVELS.len()) - 1;
            let glyph = SPARK_LEVELS[level];
            let tint = self.tint.map(|t| if bar.failed { FAILURE_TINT } else { t });
            match tint {
                Some((r, g, b)) => line.push_str(&format!("\x1b[38;2;{};{};{}m{}\x1b[0m", r, g, b, glyph)),
                None => line.push(if bar.failed { '!' } else { glyph }),
            }
        }
        line
    }

    /// Sparkline followed by the latest sample, window average and loss.
    pub fn status_line(&self, frame: &Frame) -> String {
        let window = frame.window();
        let latest = match frame.latest {
            Some(sample) if sample.is_failure() => describe_failure(sample.value()).to_string(),
            Some(sample) => format!("{}ms", sample),
            None => "-".to_string(),
        };
        format!(
            "{} {:>12}  avg {:.1}ms  max {}ms  loss {:.0}%",
            self.render(frame),
            latest,
            window.average_time(),
            frame.running_max,
            window.loss_percentage()
        )
    }
}

fn describe_failure(code: i64) -> &'static str {
    match code {
        -1 => "timeout",
        -2 => "unreachable",
        _ => "error",
    }
}

pub fn parse_hex_color(color: &str) -> Option<(u8, u8, u8)> {
    let hex = color.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}
