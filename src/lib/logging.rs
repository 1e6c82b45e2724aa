//! Logging and summary-output utilities.
//!
//! Operational messages go through the `log` crate; the per-run statistics
//! summary is persisted separately by [`SummaryLog`], which writes to the
//! configured log file (or stderr for streamed outputs).

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Formats a count with thousands separators, e.g. `1234567` -> `"1,234,567"`.
#[must_use]
pub fn format_count(count: u64) -> String {
    let digits = count.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Formats a duration in human-readable form, e.g. `"2m 15s"`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        let mins = secs / 60;
        let remaining = secs % 60;
        if remaining == 0 { format!("{mins}m") } else { format!("{mins}m {remaining}s") }
    } else {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        if mins == 0 { format!("{hours}h") } else { format!("{hours}h {mins}m") }
    }
}

/// Formats a processing rate, e.g. `"1,234 records/s"`.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_rate(count: u64, duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 0.001 {
        return format!("{} records/s", format_count(count));
    }
    let rate = count as f64 / secs;
    if rate >= 1.0 {
        format!("{} records/s", format_count(rate as u64))
    } else {
        format!("{:.1} records/min", count as f64 / (secs / 60.0))
    }
}

/// Operation timing helper: logs the start on construction and a
/// count/duration/rate line on completion.
pub struct OperationTimer {
    operation: String,
    start_time: Instant,
}

impl OperationTimer {
    #[must_use]
    pub fn new(operation: &str) -> Self {
        log::info!("{operation} ...");
        Self { operation: operation.to_string(), start_time: Instant::now() }
    }

    /// Logs the completion with record count and rate.
    pub fn log_completion(&self, count: u64) {
        let duration = self.start_time.elapsed();
        log::info!(
            "{} completed: {} in {} ({})",
            self.operation,
            format_count(count),
            format_duration(duration),
            format_rate(count, duration)
        );
    }
}

/// Sink for the persisted run summary.
///
/// Resolution order for the destination: an explicit `--log` path, then
/// `<out>.log` next to the output, or stderr when the output path begins
/// with `-` (streamed output has nowhere to put a sibling file).
pub struct SummaryLog {
    dest: Box<dyn Write>,
}

impl SummaryLog {
    /// Opens the summary sink for the given log/output paths.
    ///
    /// # Errors
    ///
    /// Returns an error when the log file cannot be created.
    pub fn for_output(log: Option<&Path>, output: &Path) -> io::Result<Self> {
        match log {
            Some(path) => Self::create(path),
            None => {
                let name = output.to_string_lossy();
                if name.starts_with('-') {
                    Ok(Self::to_stderr())
                } else {
                    Self::create(&PathBuf::from(format!("{name}.log")))
                }
            }
        }
    }

    /// Opens a summary sink writing to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be created.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self { dest: Box::new(BufWriter::new(file)) })
    }

    /// Opens a summary sink writing to stderr.
    #[must_use]
    pub fn to_stderr() -> Self {
        Self { dest: Box::new(io::stderr()) }
    }

    /// Writes one summary line.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying sink fails.
    pub fn line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.dest, "{text}")
    }

    /// Writes a horizontal separator line.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying sink fails.
    pub fn rule(&mut self) -> io::Result<()> {
        self.line(&"-".repeat(74))
    }

    /// Flushes the sink.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying sink fails.
    pub fn flush(&mut self) -> io::Result<()> {
        self.dest.flush()
    }
}
