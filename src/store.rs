use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use log::{debug, warn};
use thiserror::Error;

use crate::models::{History, Snapshot};

/// Absolute drop in lines added+deleted beyond which a snapshot is rejected.
pub const SUSPICIOUS_DROP_LINES: u64 = 50_000;
/// Relative drop (fraction of the previous total) beyond which a snapshot is rejected.
pub const SUSPICIOUS_DROP_RATIO: f64 = 0.10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error(
        "suspicious drop in line count: {previous} -> {current} (diff: {diff}), \
         upstream data is likely incomplete"
    )]
    SuspiciousDrop {
        previous: u64,
        current: u64,
        diff: u64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted {
        replaced: bool,
        previous_date: Option<NaiveDate>,
    },
    Rejected {
        rejection: Rejection,
        previous_date: NaiveDate,
    },
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted { .. })
    }

    pub fn reason(&self) -> String {
        match self {
            Verdict::Accepted {
                previous_date: None,
                ..
            } => "no previous snapshot to compare".to_string(),
            Verdict::Accepted { .. } => "validation passed".to_string(),
            Verdict::Rejected { rejection, .. } => rejection.to_string(),
        }
    }
}

/// Checks a candidate against the most recent earlier snapshot.
pub fn validate(candidate: &Snapshot, previous: Option<&Snapshot>) -> Result<(), Rejection> {
    let Some(previous) = previous else {
        return Ok(());
    };

    let current = candidate.lines_total();
    let prior = previous.lines_total();
    if current >= prior {
        return Ok(());
    }

    let diff = prior - current;
    let relative = prior > 0 && diff as f64 / prior as f64 > SUSPICIOUS_DROP_RATIO;
    if diff > SUSPICIOUS_DROP_LINES || relative {
        return Err(Rejection::SuspiciousDrop {
            previous: prior,
            current,
            diff,
        });
    }

    Ok(())
}

/// Validates `candidate` and, if it passes, stores it in place of any
/// snapshot with the same date. A rejected candidate leaves `history` as is.
pub fn upsert(history: &mut History, candidate: Snapshot) -> Verdict {
    let previous = history.previous_before(candidate.date);
    let previous_date = previous.map(|snapshot| snapshot.date);

    match (validate(&candidate, previous), previous_date) {
        (Err(rejection), Some(previous_date)) => Verdict::Rejected {
            rejection,
            previous_date,
        },
        (Err(_), None) | (Ok(()), _) => {
            let replaced = history.replace(candidate);
            Verdict::Accepted {
                replaced,
                previous_date,
            }
        }
    }
}

/// JSON file holding the full snapshot history.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored history. A missing or unreadable file yields an
    /// empty history.
    pub fn load(&self) -> History {
        if !self.path.is_file() {
            debug!("no history at {}, starting empty", self.path.display());
            return History::default();
        }

        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(
                    "could not read {}: {err}; starting fresh",
                    self.path.display()
                );
                return History::default();
            }
        };

        match serde_json::from_str::<Vec<Snapshot>>(&raw) {
            Ok(snapshots) => History::from_snapshots(snapshots),
            Err(err) => {
                warn!(
                    "could not parse {}: {err}; starting fresh",
                    self.path.display()
                );
                History::default()
            }
        }
    }

    pub fn save(&self, history: &History) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let raw = serde_json::to_string_pretty(history.snapshots())
            .context("failed to serialize history")?;
        fs::write(&self.path, raw)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        debug!(
            "saved {} snapshots to {}",
            history.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn snapshot(date: NaiveDate, added: u64, deleted: u64) -> Snapshot {
        let mut snapshot = Snapshot::empty(date);
        snapshot.lines_added = added;
        snapshot.lines_deleted = deleted;
        snapshot
    }

    #[test]
    fn first_snapshot_is_accepted_unconditionally() {
        let mut history = History::default();
        let verdict = upsert(&mut history, snapshot(day(2024, 1, 1), 0, 0));
        assert!(verdict.is_accepted());
        assert_eq!(verdict.reason(), "no previous snapshot to compare");
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn large_drop_is_rejected_and_history_kept() {
        let mut history = History::from_snapshots(vec![snapshot(day(2024, 1, 1), 80_000, 20_000)]);
        let before = history.clone();

        let verdict = upsert(&mut history, snapshot(day(2024, 2, 1), 30_000, 10_000));
        match verdict {
            Verdict::Rejected {
                rejection,
                previous_date,
            } => {
                assert_eq!(previous_date, day(2024, 1, 1));
                assert_eq!(
                    rejection,
                    Rejection::SuspiciousDrop {
                        previous: 100_000,
                        current: 40_000,
                        diff: 60_000,
                    }
                );
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(history, before);
    }

    #[test]
    fn small_drop_is_tolerated() {
        let mut history = History::from_snapshots(vec![snapshot(day(2024, 1, 1), 90_000, 10_000)]);
        let verdict = upsert(&mut history, snapshot(day(2024, 2, 1), 88_000, 7_000));
        assert!(verdict.is_accepted());
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn relative_threshold_applies_below_absolute_limit() {
        let previous = snapshot(day(2024, 1, 1), 1_000, 0);
        let exactly_ten_percent = snapshot(day(2024, 2, 1), 900, 0);
        let over_ten_percent = snapshot(day(2024, 2, 1), 899, 0);
        assert!(validate(&exactly_ten_percent, Some(&previous)).is_ok());
        assert!(validate(&over_ten_percent, Some(&previous)).is_err());
    }

    #[test]
    fn same_day_candidate_is_compared_to_earlier_day() {
        let mut history = History::from_snapshots(vec![
            snapshot(day(2024, 1, 1), 100, 0),
            snapshot(day(2024, 2, 1), 100_000, 0),
        ]);
        // The 2024-02-01 entry is being replaced, so the baseline is 2024-01-01.
        let verdict = upsert(&mut history, snapshot(day(2024, 2, 1), 150, 0));
        assert_eq!(
            verdict,
            Verdict::Accepted {
                replaced: true,
                previous_date: Some(day(2024, 1, 1)),
            }
        );
        assert_eq!(history.latest().unwrap().lines_added, 150);
    }

    #[test]
    fn upserting_same_snapshot_twice_is_idempotent() {
        let mut history = History::from_snapshots(vec![snapshot(day(2024, 1, 1), 10, 0)]);
        let candidate = snapshot(day(2024, 2, 1), 20, 5);
        upsert(&mut history, candidate.clone());
        let once = history.clone();
        upsert(&mut history, candidate);
        assert_eq!(history, once);
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("history.json"));
        assert!(store.load().is_empty());
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(SnapshotStore::new(&path).load().is_empty());

        fs::write(&path, r#"{"date": "2024-01-01"}"#).unwrap();
        assert!(SnapshotStore::new(&path).load().is_empty());
    }

    #[test]
    fn save_then_load_is_sorted_without_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nested").join("history.json"));

        let mut history = History::default();
        for (date, added) in [
            (day(2024, 3, 1), 300),
            (day(2024, 1, 1), 100),
            (day(2024, 2, 1), 200),
            (day(2024, 3, 1), 310),
        ] {
            upsert(&mut history, snapshot(date, added, 0));
        }
        store.save(&history).unwrap();

        let loaded = store.load();
        let dates: Vec<_> = loaded.snapshots().iter().map(|s| s.date).collect();
        assert_eq!(dates, vec![day(2024, 1, 1), day(2024, 2, 1), day(2024, 3, 1)]);
        assert_eq!(loaded.latest().unwrap().lines_added, 310);
        assert_eq!(loaded, history);
    }

    #[test]
    fn saved_file_is_indented_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("history.json"));
        let history = History::from_snapshots(vec![snapshot(day(2024, 1, 1), 1, 2)]);
        store.save(&history).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.starts_with("[\n  {"));
        assert!(raw.contains("\"lines_deleted\": 2"));
    }
}
