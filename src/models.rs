use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One dated record of account-wide activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub date: NaiveDate,
    #[serde(default)]
    pub synthetic: bool,
    #[serde(default)]
    pub stargazers: u64,
    #[serde(default)]
    pub forks: u64,
    #[serde(default)]
    pub total_contributions: u64,
    #[serde(default)]
    pub repo_count: u64,
    #[serde(default)]
    pub lines_added: u64,
    #[serde(default)]
    pub lines_deleted: u64,
    #[serde(default)]
    pub languages: BTreeMap<String, LanguageStat>,
    #[serde(default)]
    pub contributions_by_year: BTreeMap<i32, u64>,
    #[serde(default, deserialize_with = "lenient_weeks")]
    pub lines_changed_by_week: BTreeMap<NaiveDate, WeekChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageStat {
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub prop: f64,
    #[serde(default)]
    pub color: Option<String>,
}

/// Lines added and deleted during one week. Persisted as a `[adds, dels]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WeekChange {
    pub additions: u64,
    pub deletions: u64,
}

impl WeekChange {
    pub fn new(additions: u64, deletions: u64) -> Self {
        Self {
            additions,
            deletions,
        }
    }

    pub fn total(&self) -> u64 {
        self.additions.saturating_add(self.deletions)
    }
}

impl Serialize for WeekChange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.additions, self.deletions).serialize(serializer)
    }
}

// Entries that are not a date key mapped to at least two non-negative
// integers are dropped rather than failing the whole snapshot.
fn lenient_weeks<'de, D>(deserializer: D) -> Result<BTreeMap<NaiveDate, WeekChange>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, serde_json::Value>> = Option::deserialize(deserializer)?;
    let mut weeks = BTreeMap::new();

    for (key, value) in raw.unwrap_or_default() {
        let Ok(week) = NaiveDate::parse_from_str(&key, "%Y-%m-%d") else {
            continue;
        };
        let Some(items) = value.as_array() else {
            continue;
        };
        if items.len() < 2 {
            continue;
        }
        if let (Some(additions), Some(deletions)) = (items[0].as_u64(), items[1].as_u64()) {
            weeks.insert(week, WeekChange::new(additions, deletions));
        }
    }

    Ok(weeks)
}

impl Snapshot {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            synthetic: false,
            stargazers: 0,
            forks: 0,
            total_contributions: 0,
            repo_count: 0,
            lines_added: 0,
            lines_deleted: 0,
            languages: BTreeMap::new(),
            contributions_by_year: BTreeMap::new(),
            lines_changed_by_week: BTreeMap::new(),
        }
    }

    pub fn lines_total(&self) -> u64 {
        self.lines_added.saturating_add(self.lines_deleted)
    }

    /// Sum of the weekly pairs, `None` when the snapshot carries no weekly data.
    pub fn weekly_totals(&self) -> Option<WeekChange> {
        if self.lines_changed_by_week.is_empty() {
            return None;
        }
        Some(
            self.lines_changed_by_week
                .values()
                .fold(WeekChange::default(), |acc, week| {
                    WeekChange::new(
                        acc.additions.saturating_add(week.additions),
                        acc.deletions.saturating_add(week.deletions),
                    )
                }),
        )
    }

    /// Activity value charted for this snapshot: weekly data when present,
    /// otherwise the cumulative counters.
    pub fn activity(&self) -> WeekChange {
        self.weekly_totals()
            .unwrap_or_else(|| WeekChange::new(self.lines_added, self.lines_deleted))
    }

    pub fn has_languages(&self) -> bool {
        !self.languages.is_empty()
    }

    pub fn language_prop(&self, name: &str) -> f64 {
        self.languages.get(name).map(|stat| stat.prop).unwrap_or(0.0)
    }

    pub fn languages_by_size(&self) -> Vec<(&String, &LanguageStat)> {
        let mut languages: Vec<_> = self.languages.iter().collect();
        languages.sort_by(|a, b| b.1.size.cmp(&a.1.size).then_with(|| a.0.cmp(b.0)));
        languages
    }
}

/// Snapshots ordered ascending by date, at most one per date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct History {
    snapshots: Vec<Snapshot>,
}

impl History {
    /// Builds a history from arbitrary input. On duplicate dates the later
    /// entry wins.
    pub fn from_snapshots(snapshots: Vec<Snapshot>) -> Self {
        let mut by_date: BTreeMap<NaiveDate, Snapshot> = BTreeMap::new();
        for snapshot in snapshots {
            by_date.insert(snapshot.date, snapshot);
        }
        Self {
            snapshots: by_date.into_values().collect(),
        }
    }

    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.snapshots.last()
    }

    pub fn dates(&self) -> BTreeSet<NaiveDate> {
        self.snapshots.iter().map(|snapshot| snapshot.date).collect()
    }

    /// Newest measured snapshot. Backfilled months can be dated after it, so
    /// this falls back to the newest entry only when nothing was measured.
    pub fn latest_real(&self) -> Option<&Snapshot> {
        self.snapshots
            .iter()
            .rev()
            .find(|snapshot| !snapshot.synthetic)
            .or_else(|| self.latest())
    }

    /// Most recent snapshot dated strictly before `date`.
    pub fn previous_before(&self, date: NaiveDate) -> Option<&Snapshot> {
        self.snapshots.iter().rev().find(|snapshot| snapshot.date < date)
    }

    /// Inserts or replaces the snapshot for its date, keeping the order.
    /// Returns true when an existing entry was replaced.
    pub fn replace(&mut self, snapshot: Snapshot) -> bool {
        match self
            .snapshots
            .binary_search_by(|existing| existing.date.cmp(&snapshot.date))
        {
            Ok(index) => {
                self.snapshots[index] = snapshot;
                true
            }
            Err(index) => {
                self.snapshots.insert(index, snapshot);
                false
            }
        }
    }

    pub fn extend(&mut self, snapshots: impl IntoIterator<Item = Snapshot>) {
        for snapshot in snapshots {
            self.replace(snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn malformed_weekly_entries_are_dropped() {
        let raw = r#"{
            "date": "2024-03-01",
            "lines_added": 10,
            "lines_changed_by_week": {
                "2024-02-05": [5, 2],
                "2024-02-12": [7],
                "2024-02-19": "oops",
                "not-a-date": [1, 1],
                "2024-02-26": [3, 4, 9]
            }
        }"#;
        let snapshot: Snapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(snapshot.lines_changed_by_week.len(), 2);
        assert_eq!(
            snapshot.lines_changed_by_week[&day(2024, 2, 26)],
            WeekChange::new(3, 4)
        );
        assert!(!snapshot.synthetic);
        assert_eq!(snapshot.repo_count, 0);
    }

    #[test]
    fn weekly_pairs_serialize_as_arrays() {
        let mut snapshot = Snapshot::empty(day(2024, 1, 1));
        snapshot
            .lines_changed_by_week
            .insert(day(2023, 12, 25), WeekChange::new(4, 1));
        snapshot.contributions_by_year.insert(2023, 12);
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["lines_changed_by_week"]["2023-12-25"], serde_json::json!([4, 1]));
        assert_eq!(json["contributions_by_year"]["2023"], serde_json::json!(12));
        assert_eq!(json["date"], serde_json::json!("2024-01-01"));
    }

    #[test]
    fn activity_prefers_weekly_data() {
        let mut snapshot = Snapshot::empty(day(2024, 1, 1));
        snapshot.lines_added = 1_000;
        snapshot.lines_deleted = 200;
        assert_eq!(snapshot.activity(), WeekChange::new(1_000, 200));

        snapshot
            .lines_changed_by_week
            .insert(day(2023, 12, 18), WeekChange::new(30, 10));
        snapshot
            .lines_changed_by_week
            .insert(day(2023, 12, 25), WeekChange::new(20, 5));
        assert_eq!(snapshot.activity(), WeekChange::new(50, 15));
    }

    #[test]
    fn history_sorts_and_keeps_last_duplicate() {
        let mut first = Snapshot::empty(day(2024, 2, 1));
        first.stargazers = 1;
        let mut second = Snapshot::empty(day(2024, 2, 1));
        second.stargazers = 2;
        let earlier = Snapshot::empty(day(2024, 1, 1));

        let history = History::from_snapshots(vec![first, earlier, second]);
        assert_eq!(history.len(), 2);
        assert_eq!(history.snapshots()[0].date, day(2024, 1, 1));
        assert_eq!(history.snapshots()[1].stargazers, 2);
    }

    #[test]
    fn previous_before_skips_same_day_entry() {
        let history = History::from_snapshots(vec![
            Snapshot::empty(day(2024, 1, 1)),
            Snapshot::empty(day(2024, 2, 1)),
        ]);
        let previous = history.previous_before(day(2024, 2, 1)).unwrap();
        assert_eq!(previous.date, day(2024, 1, 1));
        assert!(history.previous_before(day(2024, 3, 1)).is_some());
        assert!(history.previous_before(day(2024, 1, 1)).is_none());
    }

    #[test]
    fn previous_before_ignores_later_backfilled_month() {
        let mut backfilled = Snapshot::empty(day(2024, 3, 28));
        backfilled.synthetic = true;
        let history = History::from_snapshots(vec![
            Snapshot::empty(day(2024, 2, 28)),
            Snapshot::empty(day(2024, 3, 10)),
            backfilled,
        ]);
        let previous = history.previous_before(day(2024, 3, 10)).unwrap();
        assert_eq!(previous.date, day(2024, 2, 28));
    }

    #[test]
    fn latest_real_skips_backfilled_entries() {
        let mut measured = Snapshot::empty(day(2024, 3, 10));
        measured.total_contributions = 490;
        let mut backfilled = Snapshot::empty(day(2024, 3, 28));
        backfilled.synthetic = true;
        backfilled.total_contributions = 90;

        let history = History::from_snapshots(vec![measured, backfilled.clone()]);
        assert_eq!(history.latest().unwrap().date, day(2024, 3, 28));
        assert_eq!(history.latest_real().unwrap().total_contributions, 490);

        let only_backfilled = History::from_snapshots(vec![backfilled]);
        assert_eq!(only_backfilled.latest_real().unwrap().date, day(2024, 3, 28));
        assert!(History::default().latest_real().is_none());
    }
}
