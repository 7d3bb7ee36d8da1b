use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, NaiveDate};

use crate::models::{Snapshot, WeekChange};

/// Day of month used for every synthetic snapshot.
const SYNTHETIC_DAY: u32 = 28;

/// Builds one synthetic snapshot per month covered by the weekly data of
/// `current`, so a first run already has a trend to draw.
///
/// Stars, forks and languages are not known historically and are copied from
/// `current`. The repository count ramps linearly from 1 to today's count.
/// Months whose synthetic date is already in `existing` are skipped.
pub fn synthesize(current: &Snapshot, existing: &BTreeSet<NaiveDate>) -> Vec<Snapshot> {
    let mut months: BTreeMap<(i32, u32), WeekChange> = BTreeMap::new();
    for (week, change) in &current.lines_changed_by_week {
        let bucket = months.entry((week.year(), week.month())).or_default();
        bucket.additions = bucket.additions.saturating_add(change.additions);
        bucket.deletions = bucket.deletions.saturating_add(change.deletions);
    }

    let month_count = months.len() as u64;
    let mut cumulative = WeekChange::default();
    let mut backfilled = Vec::with_capacity(months.len());

    for (index, ((year, month), change)) in months.into_iter().enumerate() {
        cumulative.additions = cumulative.additions.saturating_add(change.additions);
        cumulative.deletions = cumulative.deletions.saturating_add(change.deletions);

        let Some(date) = NaiveDate::from_ymd_opt(year, month, SYNTHETIC_DAY) else {
            continue;
        };
        if existing.contains(&date) {
            continue;
        }

        let repo_count = (current.repo_count * (index as u64 + 1) / month_count).max(1);

        backfilled.push(Snapshot {
            synthetic: true,
            stargazers: current.stargazers,
            forks: current.forks,
            total_contributions: current
                .contributions_by_year
                .get(&year)
                .copied()
                .unwrap_or(0),
            repo_count,
            lines_added: cumulative.additions,
            lines_deleted: cumulative.deletions,
            languages: current.languages.clone(),
            contributions_by_year: current
                .contributions_by_year
                .range(..=year)
                .map(|(year, count)| (*year, *count))
                .collect(),
            ..Snapshot::empty(date)
        });
    }

    backfilled
}
