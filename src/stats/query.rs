use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Result, anyhow};

use crate::network::types::ProcessId;
use crate::stats::aggregator::Shared;

/// Column the process table is ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortKey {
    Download,
    Upload,
    #[default]
    Total,
    Name,
}

impl SortKey {
    pub fn label(&self) -> &'static str {
        match self {
            SortKey::Download => "download",
            SortKey::Upload => "upload",
            SortKey::Total => "total",
            SortKey::Name => "name",
        }
    }

    /// Rates sort highest first, names alphabetically
    pub fn default_descending(&self) -> bool {
        !matches!(self, SortKey::Name)
    }

    /// Order two rows by this key. Ties break by pid so the order is stable
    /// between refreshes.
    pub fn compare(&self, a: &ProcessRow, b: &ProcessRow) -> Ordering {
        let primary = match self {
            SortKey::Download => b.rate_down.total_cmp(&a.rate_down),
            SortKey::Upload => b.rate_up.total_cmp(&a.rate_up),
            SortKey::Total => b.rate_total().total_cmp(&a.rate_total()),
            SortKey::Name => a
                .name
                .to_lowercase()
                .cmp(&b.name.to_lowercase()),
        };
        primary.then_with(|| a.pid.cmp(&b.pid))
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SortKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "download" | "down" | "d" => Ok(SortKey::Download),
            "upload" | "up" | "u" => Ok(SortKey::Upload),
            "total" | "t" => Ok(SortKey::Total),
            "name" | "n" => Ok(SortKey::Name),
            other => Err(anyhow!(
                "Invalid sort key '{}' (expected download, upload, total or name)",
                other
            )),
        }
    }
}

/// One line of the process table
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRow {
    pub pid: ProcessId,
    pub name: String,
    pub bytes_up: u64,
    pub bytes_down: u64,
    pub rate_up: f64,
    pub rate_down: f64,
    pub bytes_total: u64,
}

impl ProcessRow {
    pub fn rate_total(&self) -> f64 {
        self.rate_up + self.rate_down
    }
}

/// Sums across all rows, shown in the header
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Totals {
    pub bytes_up: u64,
    pub bytes_down: u64,
    pub rate_up: f64,
    pub rate_down: f64,
    pub processes: usize,
}

impl Totals {
    pub fn from_rows(rows: &[ProcessRow]) -> Self {
        rows.iter().fold(Totals::default(), |mut acc, row| {
            acc.bytes_up = acc.bytes_up.saturating_add(row.bytes_up);
            acc.bytes_down = acc.bytes_down.saturating_add(row.bytes_down);
            acc.rate_up += row.rate_up;
            acc.rate_down += row.rate_down;
            acc.processes += 1;
            acc
        })
    }

    pub fn rate_total(&self) -> f64 {
        self.rate_up + self.rate_down
    }
}

/// Read side of the aggregator
#[derive(Clone)]
pub struct StatsQuery {
    shared: Arc<Shared>,
}

impl StatsQuery {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub fn snapshot(&self, sort: SortKey) -> Vec<ProcessRow> {
        self.snapshot_at(sort, Instant::now())
    }

    /// Rows with rates evaluated at `now`.
    ///
    /// Expired samples are pruned while each entry is held, so idle
    /// processes read as zero even when no new events arrive.
    pub fn snapshot_at(&self, sort: SortKey, now: Instant) -> Vec<ProcessRow> {
        let mut rows: Vec<ProcessRow> = self
            .shared
            .stats
            .iter_mut()
            .map(|mut entry| {
                entry.prune(now);
                ProcessRow {
                    pid: entry.pid,
                    name: entry.name.clone(),
                    bytes_up: entry.bytes_sent,
                    bytes_down: entry.bytes_received,
                    rate_up: entry.upload_rate(now),
                    rate_down: entry.download_rate(now),
                    bytes_total: entry.total_bytes(),
                }
            })
            .collect();

        rows.sort_by(|a, b| sort.compare(a, b));
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pid: u32, name: &str, rate_up: f64, rate_down: f64) -> ProcessRow {
        ProcessRow {
            pid: ProcessId::Pid(pid),
            name: name.to_string(),
            bytes_up: (rate_up * 5.0) as u64,
            bytes_down: (rate_down * 5.0) as u64,
            rate_up,
            rate_down,
            bytes_total: ((rate_up + rate_down) * 5.0) as u64,
        }
    }

    fn sorted(mut rows: Vec<ProcessRow>, key: SortKey) -> Vec<u32> {
        rows.sort_by(|a, b| key.compare(a, b));
        rows.iter()
            .map(|r| match r.pid {
                ProcessId::Pid(pid) => pid,
                ProcessId::Unknown => 0,
            })
            .collect()
    }

    fn rows() -> Vec<ProcessRow> {
        vec![
            row(10, "firefox", 50.0, 900.0),
            row(20, "Chrome", 300.0, 100.0),
            row(30, "apt", 0.0, 500.0),
        ]
    }

    #[test]
    fn test_sort_by_rates_descending() {
        assert_eq!(sorted(rows(), SortKey::Download), vec![10, 30, 20]);
        assert_eq!(sorted(rows(), SortKey::Upload), vec![20, 10, 30]);
        assert_eq!(sorted(rows(), SortKey::Total), vec![10, 30, 20]);
    }

    #[test]
    fn test_sort_by_name_case_insensitive() {
        assert_eq!(sorted(rows(), SortKey::Name), vec![30, 20, 10]);
    }

    #[test]
    fn test_ties_break_by_pid() {
        let rows = vec![
            row(7, "b", 10.0, 10.0),
            row(3, "a", 10.0, 10.0),
            row(5, "c", 10.0, 10.0),
        ];
        assert_eq!(sorted(rows, SortKey::Total), vec![3, 5, 7]);
    }

    #[test]
    fn test_unknown_sorts_before_pids_on_tie() {
        let mut unknown = row(0, "(unknown)", 1.0, 1.0);
        unknown.pid = ProcessId::Unknown;
        let rows = vec![row(1, "a", 1.0, 1.0), unknown];
        assert_eq!(sorted(rows, SortKey::Total), vec![0, 1]);
    }

    #[test]
    fn test_parse_sort_key() {
        assert_eq!("download".parse::<SortKey>().unwrap(), SortKey::Download);
        assert_eq!(" UP ".parse::<SortKey>().unwrap(), SortKey::Upload);
        assert_eq!("t".parse::<SortKey>().unwrap(), SortKey::Total);
        assert_eq!("name".parse::<SortKey>().unwrap(), SortKey::Name);
        assert!("bytes".parse::<SortKey>().is_err());
    }

    #[test]
    fn test_totals_from_rows() {
        let totals = Totals::from_rows(&rows());
        assert_eq!(totals.processes, 3);
        assert_eq!(totals.rate_up, 350.0);
        assert_eq!(totals.rate_down, 1500.0);
        assert_eq!(totals.rate_total(), 1850.0);
        assert_eq!(totals.bytes_up, 1750);
        assert_eq!(totals.bytes_down, 7500);
    }

    #[test]
    fn test_totals_empty() {
        assert_eq!(Totals::from_rows(&[]), Totals::default());
    }
}
