use crate::batch::BatchReport;
use crate::concat::ConcatReport;
use crate::error::{ExtractError, UserFriendlyError};
use crate::extractor::RegionTimeSeries;
use console::{style, Emoji, StyledObject, Term};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputMode {
    Human,
    Json,
    Plain,
}

static CHECKMARK: Emoji = Emoji("✅ ", "+ ");
static CROSS: Emoji = Emoji("❌ ", "x ");
static INFO: Emoji = Emoji("ℹ️  ", "i ");
static WARNING: Emoji = Emoji("⚠️  ", "! ");
static BRAIN: Emoji = Emoji("🧠 ", "> ");

const RULE_WIDTH: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Level {
    Success,
    Error,
    Warning,
    Info,
}

impl Level {
    /// Lowest `-v` count at which the level is shown. Errors always are.
    fn min_verbosity(self) -> Option<u8> {
        match self {
            Level::Error => None,
            Level::Success | Level::Warning => Some(0),
            Level::Info => Some(1),
        }
    }

    fn emoji(self) -> &'static Emoji<'static, 'static> {
        match self {
            Level::Success => &CHECKMARK,
            Level::Error => &CROSS,
            Level::Warning => &WARNING,
            Level::Info => &INFO,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            Level::Success => "success",
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Info => "info",
        }
    }

    fn paint(self, message: &str) -> StyledObject<&str> {
        match self {
            Level::Success => style(message).green().bold(),
            Level::Error => style(message).red().bold(),
            Level::Warning => style(message).yellow().bold(),
            Level::Info => style(message).cyan(),
        }
    }
}

/// User-facing output on stdout/stderr in one of three formats. Diagnostics
/// go through `log`; this is only for results and errors the user asked for.
pub struct OutputFormatter {
    mode: OutputMode,
    use_colors: bool,
    verbose_level: u8,
    quiet: bool,
}

impl OutputFormatter {
    pub fn new(mode: OutputMode, verbose: u8, quiet: bool) -> Self {
        let use_colors =
            mode == OutputMode::Human && !quiet && Term::stdout().features().colors_supported();

        Self {
            mode,
            use_colors,
            verbose_level: if quiet { 0 } else { verbose },
            quiet,
        }
    }

    pub fn success(&self, message: &str) {
        self.emit(Level::Success, message);
    }

    pub fn error(&self, message: &str) {
        self.emit(Level::Error, message);
    }

    pub fn warning(&self, message: &str) {
        self.emit(Level::Warning, message);
    }

    pub fn info(&self, message: &str) {
        self.emit(Level::Info, message);
    }

    pub fn start_operation(&self, operation: &str) {
        if self.quiet {
            return;
        }
        match self.mode {
            OutputMode::Human if self.use_colors => {
                println!("{}{}", BRAIN, style(operation).bold())
            }
            OutputMode::Human => println!("> {}", operation),
            OutputMode::Json => self.print_json(&serde_json::json!({
                "type": "operation_start",
                "message": operation,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            })),
            OutputMode::Plain => println!("STARTING: {}", operation),
        }
    }

    pub fn print_user_friendly_error(&self, error: &ExtractError) {
        self.error(&error.user_message());

        let Some(suggestion) = error.suggestion() else {
            return;
        };

        match self.mode {
            OutputMode::Human if self.use_colors => eprintln!(
                "\n{}{}",
                INFO,
                style(format!("Suggestion: {}", suggestion)).cyan()
            ),
            OutputMode::Human => eprintln!("\nSuggestion: {}", suggestion),
            OutputMode::Json => self.print_json(&serde_json::json!({
                "type": "suggestion",
                "kind": error.kind(),
                "message": suggestion,
            })),
            OutputMode::Plain => eprintln!("SUGGESTION: {}", suggestion),
        }
    }

    /// Outcome of a single-file extraction.
    pub fn print_extraction_result(&self, series: &RegionTimeSeries, output: &Path) {
        if self.quiet {
            return;
        }

        let empty = series.empty_regions();
        match self.mode {
            OutputMode::Human => {
                self.success(&format!(
                    "Wrote {} time points x {} regions to {}",
                    series.n_timepoints(),
                    series.n_regions(),
                    output.display()
                ));
                if !empty.is_empty() {
                    self.warning(&format!(
                        "{} region(s) had no voxels after masking: {:?}",
                        empty.len(),
                        empty
                    ));
                }
            }
            OutputMode::Json => self.print_json(&serde_json::json!({
                "type": "result",
                "output": output.display().to_string(),
                "timepoints": series.n_timepoints(),
                "regions": series.labels,
                "empty_regions": empty,
            })),
            OutputMode::Plain => {
                println!("OUTPUT: {}", output.display());
                println!("Time points: {}", series.n_timepoints());
                println!("Regions: {}", series.n_regions());
            }
        }
    }

    pub fn print_batch_summary(&self, report: &BatchReport) {
        match self.mode {
            OutputMode::Json => self.print_json_pretty(report),
            OutputMode::Plain if !self.quiet => print!("{}", report.display_summary()),
            OutputMode::Plain => {}
            OutputMode::Human => self.print_human_batch_summary(report),
        }
    }

    pub fn print_concat_summary(&self, report: &ConcatReport) {
        match self.mode {
            OutputMode::Json => self.print_json_pretty(report),
            _ if !self.quiet => print!("{}", report.display_summary()),
            _ => {}
        }
    }

    pub fn print_separator(&self) {
        if self.quiet || self.mode == OutputMode::Json {
            return;
        }
        if self.use_colors {
            println!("{}", style("─".repeat(RULE_WIDTH)).dim());
        } else {
            println!("{}", "-".repeat(RULE_WIDTH));
        }
    }

    fn is_visible(&self, level: Level) -> bool {
        match level.min_verbosity() {
            None => true,
            Some(min) => !self.quiet && self.verbose_level >= min,
        }
    }

    fn emit(&self, level: Level, message: &str) {
        if !self.is_visible(level) {
            return;
        }

        let to_stderr = level == Level::Error;
        let line = match self.mode {
            OutputMode::Json => {
                self.print_json(&serde_json::json!({
                    "type": "message",
                    "level": level.tag(),
                    "message": message,
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                }));
                return;
            }
            OutputMode::Plain => format!("{}: {}", level.tag().to_uppercase(), message),
            OutputMode::Human if self.use_colors => {
                format!("{}{}", level.emoji(), level.paint(message))
            }
            OutputMode::Human => format!("{}{}", level.emoji(), message),
        };

        if to_stderr {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }

    fn print_json(&self, value: &serde_json::Value) {
        println!(
            "{}",
            serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
        );
    }

    fn print_json_pretty<T: Serialize>(&self, value: &T) {
        println!(
            "{}",
            serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
        );
    }

    fn field(&self, label: &str, value: impl ToString) {
        let value = value.to_string();
        if self.use_colors {
            println!("  {:<14} {}", label, style(value).cyan().bold());
        } else {
            println!("  {:<14} {}", label, value);
        }
    }

    fn print_human_batch_summary(&self, report: &BatchReport) {
        let failures = report.failures();

        if !self.quiet {
            println!();
            self.print_separator();

            let (headline, level) = if report.cancelled {
                ("Batch extraction interrupted", Level::Warning)
            } else if failures.is_empty() {
                ("Batch extraction completed", Level::Success)
            } else {
                ("Batch extraction completed with failures", Level::Warning)
            };
            if self.use_colors {
                println!("{}", level.paint(headline));
            } else {
                println!("{}", headline);
            }

            println!();
            self.field("Inputs found:", report.outcomes.len());
            self.field("Succeeded:", report.succeeded());
            self.field("Skipped:", report.skipped());
            self.field("Failed:", failures.len());
            self.field(
                "Time taken:",
                format_duration(Duration::from_secs_f64(report.duration_secs.max(0.0))),
            );
        }

        // printed even with --quiet
        for record in &failures {
            self.error(&format!(
                "{} [{}]: {}",
                record.input.display(),
                record.kind,
                record.message
            ));
        }

        self.print_separator();
    }
}

pub(crate) fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        0 => format!("{}ms", duration.as_millis()),
        1..=59 => format!("{}s", secs),
        _ => format!("{}m {}s", secs / 60, secs % 60),
    }
}
