use crate::batch::BatchProgress;
use crate::ui::output::format_duration;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

const SCAN_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>5}/{len:5} scans {msg}";
const SPINNER_TEMPLATE: &str = "{spinner:.green} {msg} ({elapsed})";
const SPINNER_TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const TICK: Duration = Duration::from_millis(100);

/// Owns the terminal progress bars. When disabled every bar it hands out is
/// hidden, so callers never need to branch.
pub struct ProgressManager {
    multi_progress: MultiProgress,
    enabled: bool,
}

impl ProgressManager {
    pub fn new(enabled: bool) -> Self {
        Self {
            multi_progress: MultiProgress::new(),
            enabled,
        }
    }

    /// Bar counting processed scans. The length may be set later, once
    /// discovery has run.
    pub fn create_file_progress(&self, total_files: u64) -> ProgressBar {
        let style = ProgressStyle::with_template(SCAN_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        self.attach(ProgressBar::new(total_files), style, "Extracting...")
    }

    pub fn create_spinner(&self, message: &str) -> ProgressBar {
        let style = ProgressStyle::with_template(SPINNER_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER_TICKS);
        self.attach(ProgressBar::new_spinner(), style, message)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn attach(&self, bar: ProgressBar, style: ProgressStyle, message: &str) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }

        let pb = self.multi_progress.add(bar);
        pb.set_style(style);
        pb.set_message(message.to_string());
        pb.enable_steady_tick(TICK);
        pb
    }
}

/// Shows the last finished scan, the failure count and an ETA.
pub fn update_file_progress(pb: &ProgressBar, progress: &BatchProgress) {
    pb.set_position(progress.files_processed as u64);

    let Some(current) = progress.current_file.as_deref() else {
        pb.set_message("Extracting...");
        return;
    };

    let mut message = current.to_string();
    if progress.failed > 0 {
        message.push_str(&format!(", {} failed", progress.failed));
    }
    let remaining = progress.estimated_remaining();
    if remaining.as_secs() > 0 {
        message.push_str(&format!(" (ETA: {})", format_duration(remaining)));
    }
    pb.set_message(message);
}

pub fn finish_progress_with_summary(pb: &ProgressBar, message: &str, duration: Duration) {
    pb.finish_with_message(format!("{} (completed in {})", message, format_duration(duration)));
}
