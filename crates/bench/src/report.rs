//! Run report.
//!
//! Summary lines are plain strings; [`BenchReport::log`] emits them on the
//! summary target so they show up without timestamps in the console and in
//! the run log file.

use crate::emitter::EmissionSummary;
use crate::ledger::LedgerSnapshot;
use crate::listener::{truncate_millis, StopReason};
use crate::logging::SUMMARY_TARGET;
use memobench_types::{RunId, Slot};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

/// Landing-time statistics over all confirmed transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LandingStats {
    pub min: Duration,
    pub max: Duration,
    pub mean: Duration,
    pub median: Duration,
    pub p90: Duration,
    pub p95: Duration,
    pub p99: Duration,
}

impl LandingStats {
    /// Compute statistics; `None` when nothing landed.
    pub fn from_deltas(deltas: &[Duration]) -> Option<Self> {
        let mut sorted = deltas.to_vec();
        sorted.sort_unstable();
        let min = *sorted.first()?;
        let max = *sorted.last()?;
        let total: Duration = sorted.iter().sum();
        let mean = total / sorted.len() as u32;

        Some(Self {
            min,
            max,
            mean,
            median: median(&sorted),
            p90: percentile(&sorted, 90.0),
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
        })
    }
}

/// Middle sample, or the mean of the two middle samples for an even count.
///
/// `sorted` must be non-empty.
fn median(sorted: &[Duration]) -> Duration {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2
    } else {
        sorted[mid]
    }
}

/// Sample at `percent` of a non-empty sorted slice.
///
/// The rank is `percent / 100 * len`. A whole rank selects that sample and a
/// fractional rank averages the samples either side of it. Ranks up to 1
/// select the smallest sample.
fn percentile(sorted: &[Duration], percent: f64) -> Duration {
    let rank = percent / 100.0 * sorted.len() as f64;
    if rank <= 1.0 {
        return sorted[0];
    }
    let i = rank as usize;
    if rank.fract() == 0.0 {
        sorted[i - 1]
    } else {
        (sorted[i - 1] + sorted[i]) / 2
    }
}

/// Final result of a run.
#[derive(Debug, Clone)]
pub struct BenchReport {
    pub run_id: RunId,
    pub stop_reason: StopReason,
    pub emission: EmissionSummary,
    pub ledger: LedgerSnapshot,
    pub stats: Option<LandingStats>,
    /// Wall time from subscription to stop.
    pub elapsed: Duration,
    /// Lines printed above the results, typically the config echo.
    header: Vec<String>,
}

impl BenchReport {
    pub fn new(
        run_id: RunId,
        stop_reason: StopReason,
        emission: EmissionSummary,
        ledger: LedgerSnapshot,
        elapsed: Duration,
    ) -> Self {
        let stats = LandingStats::from_deltas(&ledger.deltas);
        Self {
            run_id,
            stop_reason,
            emission,
            ledger,
            stats,
            elapsed,
            header: Vec::new(),
        }
    }

    /// Lines to print before the results.
    pub fn with_header(mut self, header: Vec<String>) -> Self {
        self.header = header;
        self
    }

    /// Landed share of sent transactions, in percent.
    pub fn landed_pct(&self) -> f64 {
        percent(self.ledger.processed, self.ledger.sent)
    }

    /// Render the summary block.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![String::new()];
        lines.extend(self.header.iter().cloned());

        lines.push(field(
            "Transactions Landed",
            format!(
                "{}/{} ({:.1}%)",
                self.ledger.processed,
                self.ledger.sent,
                self.landed_pct()
            ),
        ));
        lines.push(field("Send Failures", self.emission.failed));
        if self.emission.cancelled > 0 {
            lines.push(field("Sends Cancelled", self.emission.cancelled));
        }
        lines.push(field("Stopped", self.stop_reason));
        lines.push(field("Elapsed", format!("{:?}", truncate_millis(self.elapsed))));

        if let Some(stats) = &self.stats {
            let rows = [
                ("Min Tx Landing Time", stats.min),
                ("Max Tx Landing Time", stats.max),
                ("Avg Tx Landing Time", stats.mean),
                ("Median Tx Landing Time", stats.median),
                ("P90 Tx Landing Time", stats.p90),
                ("P95 Tx Landing Time", stats.p95),
                ("P99 Tx Landing Time", stats.p99),
            ];
            for (label, value) in rows {
                lines.push(field(label, format!("{:?}", truncate_millis(value))));
            }
            lines.push(String::new());
            lines.extend(render_block_histogram(
                &self.ledger.block_counts,
                self.ledger.processed,
            ));
        }

        lines
    }

    /// Emit the summary block on the summary target.
    pub fn log(&self) {
        for line in self.summary_lines() {
            info!(target: SUMMARY_TARGET, "{}", line);
        }
    }
}

/// Width of the label column in summary blocks.
pub const LABEL_WIDTH: usize = 22;

/// `Label<padding> : value`.
pub fn field(label: &str, value: impl std::fmt::Display) -> String {
    format!("{:<width$} : {}", label, value, width = LABEL_WIDTH)
}

fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// One line per slot from the first to the last landed slot inclusive.
pub fn render_block_histogram(block_counts: &BTreeMap<Slot, u64>, processed: u64) -> Vec<String> {
    let (Some((first, _)), Some((last, _))) =
        (block_counts.first_key_value(), block_counts.last_key_value())
    else {
        return Vec::new();
    };

    (first.0..=last.0)
        .map(|slot| {
            let label = group_thousands(slot);
            match block_counts.get(&Slot(slot)) {
                None | Some(0) => format!("Block {} : {:>3}", label, 0),
                Some(&count) => {
                    let pct = percent(count, processed);
                    let stars = pct.ceil() as usize;
                    format!(
                        "Block {} : {:>3} | {:>5.1}% | {}",
                        label,
                        count,
                        pct,
                        "*".repeat(stars)
                    )
                }
            }
        })
        .collect()
}

/// Format with `,` thousands separators.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
