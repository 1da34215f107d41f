use crate::models::ScanCombination;
use crate::orchestrator::RunSummary;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Progress of a running scan, sent after every finished task.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub completed: usize,
    pub total: usize,
    pub municipality: String,
    pub combination: ScanCombination,
    pub elapsed: Duration,
    pub eta: Option<Duration>,
}

/// Sink for run progress. All methods default to no-ops.
pub trait ProgressReporter: Send + Sync {
    fn on_run_start(&self, _total: usize, _already_completed: usize) {}
    fn on_task_complete(&self, _update: &ProgressUpdate) {}
    fn on_task_failed(&self, _municipality: &str, _combination: &ScanCombination, _reason: &str) {}
    fn on_checkpoint(&self, _completed: usize, _records: usize) {}
    fn on_run_complete(&self, _summary: &RunSummary) {}
}

pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// Forwards every event to each reporter in order.
pub struct Reporters(pub Vec<Arc<dyn ProgressReporter>>);

impl ProgressReporter for Reporters {
    fn on_run_start(&self, total: usize, already_completed: usize) {
        self.0.iter().for_each(|r| r.on_run_start(total, already_completed));
    }

    fn on_task_complete(&self, update: &ProgressUpdate) {
        self.0.iter().for_each(|r| r.on_task_complete(update));
    }

    fn on_task_failed(&self, municipality: &str, combination: &ScanCombination, reason: &str) {
        self.0
            .iter()
            .for_each(|r| r.on_task_failed(municipality, combination, reason));
    }

    fn on_checkpoint(&self, completed: usize, records: usize) {
        self.0.iter().for_each(|r| r.on_checkpoint(completed, records));
    }

    fn on_run_complete(&self, summary: &RunSummary) {
        self.0.iter().for_each(|r| r.on_run_complete(summary));
    }
}

/// Terminal reporter: one indicatif bar for the run and a coloured summary.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self { bar: Mutex::new(None) }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(pb) = guard.as_ref() {
                f(pb);
            }
        }
    }

    fn finish_bar(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }
}

impl Default for CliReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn print_colored(color: Color, line: String) {
    let _ = execute!(
        io::stderr(),
        SetForegroundColor(color),
        Print(line),
        Print("\n"),
        ResetColor
    );
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}

impl ProgressReporter for CliReporter {
    fn on_run_start(&self, total: usize, already_completed: usize) {
        if already_completed > 0 {
            print_colored(
                Color::DarkGrey,
                format!("📁 Resuming: {} of {} scans already completed", already_completed, total),
            );
        }

        let pb = ProgressBar::new(total as u64);
        let style = ProgressStyle::with_template(
            "  {spinner:.cyan} Scanning [{bar:30.cyan/dim}] {pos}/{len} ({msg})",
        )
        .map(|s| s.progress_chars("━╸─").tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        pb.set_style(style);
        pb.set_position(already_completed as u64);
        pb.enable_steady_tick(Duration::from_millis(80));

        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.replace(pb) {
                old.finish_and_clear();
            }
        }
    }

    fn on_task_complete(&self, update: &ProgressUpdate) {
        self.with_bar(|pb| {
            pb.set_position(update.completed as u64);
            let eta = update
                .eta
                .map(|d| format!(", ~{} remaining", format_duration(d)))
                .unwrap_or_default();
            pb.set_message(format!(
                "{} {}{}",
                update.municipality,
                update.combination.key(),
                eta
            ));
        });
    }

    fn on_task_failed(&self, municipality: &str, combination: &ScanCombination, reason: &str) {
        self.with_bar(|pb| {
            pb.suspend(|| {
                print_colored(
                    Color::Red,
                    format!("  ✗ {} {} failed: {}", municipality, combination, reason),
                )
            })
        });
    }

    fn on_run_complete(&self, summary: &RunSummary) {
        self.finish_bar();
        let color = if summary.failed == 0 { Color::Green } else { Color::Yellow };
        print_colored(
            color,
            format!(
                "  ✓ Scan finished in {}: {} attempted, {} succeeded, {} failed, {} skipped",
                format_duration(summary.elapsed),
                summary.attempted,
                summary.succeeded,
                summary.failed,
                summary.skipped
            ),
        );
        print_colored(
            Color::White,
            format!(
                "    {} raw listings, {} unique after dedup, {} retained in boundary ({} rejected)",
                summary.raw_observed, summary.unique_after_dedup, summary.retained, summary.rejected
            ),
        );
        if summary.pending > 0 {
            print_colored(
                Color::DarkGrey,
                format!("    {} scans left pending; rerun to resume", summary.pending),
            );
        }
    }
}
