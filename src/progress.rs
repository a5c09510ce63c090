// src/progress.rs
//
// Part/byte progress of one upload, with an optional terminal progress bar.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Progress of a single multipart upload.
///
/// Counters are atomics so the tracker can sit behind an `Arc` shared with the CLI.
pub struct UploadProgress {
    bar: Option<ProgressBar>,
    parts_done: AtomicU64,
    parts_skipped: AtomicU64,
    bytes_done: AtomicU64,
    total_parts: AtomicU64,
    total_bytes: AtomicU64,
}

impl Default for UploadProgress {
    fn default() -> Self {
        Self::hidden()
    }
}

impl UploadProgress {
    /// Counters only, nothing drawn.
    pub fn hidden() -> Self {
        Self {
            bar: None,
            parts_done: AtomicU64::new(0),
            parts_skipped: AtomicU64::new(0),
            bytes_done: AtomicU64::new(0),
            total_parts: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
        }
    }

    /// Counters plus a warp-style byte progress bar on stderr.
    pub fn with_bar(operation: &str) -> Self {
        let pb = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template(&format!(
                "{}: {{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, ETA: {{eta}}) {{msg}}",
                operation
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ");
        pb.set_style(style);

        Self {
            bar: Some(pb),
            ..Self::hidden()
        }
    }

    /// Reset the totals at the start of a run.
    pub fn begin(&self, total_parts: u64, total_bytes: u64) {
        self.total_parts.store(total_parts, Ordering::Relaxed);
        self.total_bytes.store(total_bytes, Ordering::Relaxed);
        self.parts_done.store(0, Ordering::Relaxed);
        self.parts_skipped.store(0, Ordering::Relaxed);
        self.bytes_done.store(0, Ordering::Relaxed);
        if let Some(pb) = &self.bar {
            pb.set_length(total_bytes);
            pb.set_position(0);
            pb.set_message(format!("0/{} parts", total_parts));
        }
    }

    /// A part was uploaded and acknowledged during this run.
    pub fn part_done(&self, bytes: u64) {
        self.parts_done.fetch_add(1, Ordering::Relaxed);
        self.advance(bytes);
    }

    /// A part was already acknowledged by an earlier run.
    pub fn part_skipped(&self, bytes: u64) {
        self.parts_skipped.fetch_add(1, Ordering::Relaxed);
        self.advance(bytes);
    }

    fn advance(&self, bytes: u64) {
        let total_bytes = self.bytes_done.fetch_add(bytes, Ordering::Relaxed) + bytes;
        if let Some(pb) = &self.bar {
            pb.set_position(total_bytes);
            pb.set_message(format!("{}/{} parts", self.parts_completed(), self.total_parts()));
        }
    }

    pub fn parts_completed(&self) -> u64 {
        self.parts_done.load(Ordering::Relaxed) + self.parts_skipped.load(Ordering::Relaxed)
    }

    pub fn parts_uploaded(&self) -> u64 {
        self.parts_done.load(Ordering::Relaxed)
    }

    pub fn total_parts(&self) -> u64 {
        self.total_parts.load(Ordering::Relaxed)
    }

    pub fn bytes_completed(&self) -> u64 {
        self.bytes_done.load(Ordering::Relaxed)
    }

    /// Completed share of the total bytes, 0.0..=100.0.
    pub fn percent(&self) -> f64 {
        let total = self.total_bytes.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.bytes_completed() as f64 / total as f64 * 100.0
    }

    /// Finish the progress bar with a throughput message.
    pub fn finish(&self, operation: &str, duration: Duration) {
        if let Some(pb) = &self.bar {
            let total_bytes = self.bytes_completed();
            let secs = duration.as_secs_f64().max(f64::EPSILON);
            pb.finish_with_message(format!(
                "{} complete! {:.2} MB in {:.2}s ({:.2} MB/s)",
                operation,
                total_bytes as f64 / 1_048_576.0,
                duration.as_secs_f64(),
                (total_bytes as f64 / 1_048_576.0) / secs
            ));
        }
    }

    /// Leave the bar where it stopped, e.g. after a failed run.
    pub fn abandon(&self) {
        if let Some(pb) = &self.bar {
            pb.abandon();
        }
    }
}
