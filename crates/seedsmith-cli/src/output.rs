//! Output formatting and progress reporting

use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};

/// Output format for reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Status mark leading a reporter line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Ok,
    Fail,
    Warn,
    Info,
}

impl Mark {
    fn render(self, use_color: bool) -> String {
        if !use_color {
            return match self {
                Self::Ok => "OK",
                Self::Fail => "FAIL",
                Self::Warn => "WARN",
                Self::Info => "INFO",
            }
            .to_string();
        }
        let (glyph, paint) = match self {
            Self::Ok => ("✓", Style::new().green()),
            Self::Fail => ("✗", Style::new().red()),
            Self::Warn => ("⚠", Style::new().yellow()),
            Self::Info => ("ℹ", Style::new().blue()),
        };
        paint.bold().apply_to(glyph).to_string()
    }
}

/// Status lines and exploration progress on stderr
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    rounds: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            rounds: None,
            use_color,
            quiet,
        }
    }

    /// Show a bar over the exploration round cap. No-op when quiet.
    pub fn start_rounds(&mut self, max_rounds: u64, library: &str) {
        if self.quiet {
            return;
        }
        let bar = ProgressBar::new(max_rounds);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:.bold} {bar:30} round {pos}/{len} {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_prefix(library.to_string());
        self.rounds = Some(bar);
    }

    /// Count one finished round and show its tally.
    pub fn advance(&self, message: &str) {
        if let Some(bar) = &self.rounds {
            bar.inc(1);
            bar.set_message(message.to_string());
        }
    }

    /// Stop the round bar, leaving `message` behind.
    pub fn finish(&self, message: &str) {
        if let Some(bar) = &self.rounds {
            bar.finish_with_message(message.to_string());
        }
    }

    fn line(&self, mark: Mark, message: &str) {
        if self.quiet && mark != Mark::Fail {
            return;
        }
        let _ = self
            .term
            .write_line(&format!("{} {message}", mark.render(self.use_color)));
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        self.line(Mark::Ok, message);
    }

    /// Print a failure message (shown even in quiet mode)
    pub fn failure(&self, message: &str) {
        self.line(Mark::Fail, message);
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        self.line(Mark::Warn, message);
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        self.line(Mark::Info, message);
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }
        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };
        let _ = self.term.write_line("");
        let _ = self.term.write_line(&styled);
    }

    /// Print the run tally
    pub fn summary(&self, accepted: usize, repaired: usize, rejected: usize, failed: usize) {
        let unhappy = rejected + failed;
        if self.quiet && unhappy == 0 {
            return;
        }
        let total = accepted + unhappy;

        if self.use_color {
            let good = Style::new().green().bold();
            let bad = Style::new().red().bold();
            let status = if accepted == 0 {
                bad.apply_to("FAILED")
            } else {
                good.apply_to("DONE")
            };
            let _ = self.term.write_line(&format!(
                "{status} {total} combinations ({} accepted, {repaired} repaired, {} rejected, {} failed)",
                good.apply_to(accepted),
                if rejected > 0 { bad.apply_to(rejected).to_string() } else { rejected.to_string() },
                if failed > 0 { bad.apply_to(failed).to_string() } else { failed.to_string() },
            ));
        } else {
            let status = if accepted == 0 { "FAILED" } else { "DONE" };
            let _ = self.term.write_line(&format!(
                "{status} {total} combinations ({accepted} accepted, {repaired} repaired, {rejected} rejected, {failed} failed)"
            ));
        }
    }
}
