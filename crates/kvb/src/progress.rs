//! 📊 progress.rs: "Are we there yet?" asked once per document.
//!
//! 🚀 Two jobs, both cosmetic, both load-bearing for morale:
//! - `IngestProgress` drives an indicatif bar over the bytes of the input file while the
//!   ingest loop queues documents.
//! - `summary_table` turns the final `ProcessorStats` into a comfy-table you can paste
//!   into an incident channel without apologizing.
//!
//! ⚠️ Watching the bar will not make the cluster faster. We checked. 🦆

use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use indicatif::{ProgressBar, ProgressStyle};

use crate::processor::ProcessorStats;

// -- 📏 one mebibyte. not a megabyte. the hill remains occupied.
const MIB: u64 = 1024 * 1024;

/// 🔢 "1000000" → "1,000,000". Eyes everywhere say thanks.
pub(crate) fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut result = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS, or HH:MM:SS when the input file was a life decision.
pub(crate) fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📂 Progress over one input file. Bytes drive the bar, documents drive the message.
pub(crate) struct IngestProgress {
    progress_bar: ProgressBar,
    bytes_read: u64,
    docs_queued: u64,
    started: Instant,
}

// 🐛 ProgressBar has no Debug. The counters are the interesting part anyway.
impl std::fmt::Debug for IngestProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestProgress")
            .field("bytes_read", &self.bytes_read)
            .field("docs_queued", &self.docs_queued)
            .finish()
    }
}

impl IngestProgress {
    /// 🎨 A visible bar sized to the file. `total_size == 0` means "no idea", which still draws.
    pub(crate) fn new(source_name: &str, total_size: u64) -> Self {
        let progress_bar = ProgressBar::new(total_size);
        // -- 🎨 cyan/blue, as is tradition. A bad template just means a plainer bar.
        if let Ok(style) = ProgressStyle::default_bar().template("{prefix} [{bar:40.cyan/blue}] {msg}") {
            progress_bar.set_style(style.progress_chars("=>-"));
        }
        progress_bar.set_prefix(source_name.to_string());
        Self::with_bar(progress_bar)
    }

    /// 🙈 Same bookkeeping, nothing drawn. Tests and piped output use this.
    pub(crate) fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(progress_bar: ProgressBar) -> Self {
        Self {
            progress_bar,
            bytes_read: 0,
            docs_queued: 0,
            started: Instant::now(),
        }
    }

    /// 🔄 One line consumed. `queued` is false for blank lines, which still cost bytes.
    pub(crate) fn update(&mut self, bytes: u64, queued: bool) {
        self.bytes_read += bytes;
        if queued {
            self.docs_queued += 1;
        }
        self.progress_bar.set_position(self.bytes_read);
        self.progress_bar.set_message(self.message());
    }

    pub(crate) fn docs_queued(&self) -> u64 {
        self.docs_queued
    }

    fn message(&self) -> String {
        let elapsed = self.started.elapsed();
        let secs = elapsed.as_secs_f64();
        let docs_per_sec = if secs > 0.0 { self.docs_queued as f64 / secs } else { 0.0 };
        format!(
            "{} docs | {:.0} docs/s | {:.2} MiB | {}",
            format_number(self.docs_queued),
            docs_per_sec,
            self.bytes_read as f64 / MIB as f64,
            format_duration(elapsed)
        )
    }

    /// ✅ EOF. Ring the bell.
    pub(crate) fn finish(&self) {
        self.progress_bar.finish_with_message(self.message());
    }
}

/// 🍽️ The end-of-run report card. Two columns, right-aligned numbers, no surprises.
pub fn summary_table(stats: &ProcessorStats) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["📊 bulk", "count"]);

    let rows = [
        ("commits attempted", stats.flushed),
        ("commits completed", stats.committed),
        ("commit errors", stats.commit_errors),
        ("rejected on arrival", stats.rejected),
        ("indexed", stats.indexed),
        ("created", stats.created),
        ("updated", stats.updated),
        ("deleted", stats.deleted),
        ("succeeded", stats.succeeded),
        ("failed", stats.failed),
    ];
    for (label, count) in rows {
        table.add_row(vec![
            Cell::new(label),
            Cell::new(format_number(count)).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_big_numbers_get_commas() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn the_one_where_long_runs_grow_an_hours_column() {
        assert_eq!(format_duration(Duration::from_secs(65)), "01:05");
        assert_eq!(format_duration(Duration::from_secs(3_725)), "01:02:05");
    }

    #[test]
    fn the_one_where_blank_lines_cost_bytes_but_not_docs() {
        let mut progress = IngestProgress::hidden();
        progress.update(20, true);
        progress.update(1, false);
        progress.update(30, true);
        progress.finish();
        assert_eq!(progress.docs_queued(), 2);
        assert_eq!(progress.bytes_read, 51);
    }

    #[test]
    fn the_one_where_the_report_card_lists_every_counter() {
        let stats = ProcessorStats {
            flushed: 3,
            committed: 2,
            commit_errors: 1,
            created: 1_500,
            failed: 7,
            ..ProcessorStats::default()
        };
        let rendered = summary_table(&stats).to_string();
        assert!(rendered.contains("commit errors"));
        assert!(rendered.contains("1,500"));
        assert!(rendered.contains("rejected on arrival"));
        assert_eq!(summary_table(&stats).row_iter().count(), 10);
    }
}
