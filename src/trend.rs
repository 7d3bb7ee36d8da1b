use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate};

use crate::models::{History, Snapshot};

pub const MAX_TRACKED_LANGUAGES: usize = 8;
const PER_SNAPSHOT_TOP: usize = 5;

pub const MIN_FORECAST_DAYS: f64 = 14.0;
pub const MAX_FORECAST_DAYS: f64 = 365.0;
/// Fraction of a metric's current value that counts as a visible change.
const MEANINGFUL_CHANGE: f64 = 0.10;

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedLanguage {
    pub name: String,
    pub color: Option<String>,
}

/// Real (measured or backfilled) values, one entry per snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    pub dates: Vec<NaiveDate>,
    pub additions: Vec<f64>,
    pub deletions: Vec<f64>,
    pub stars: Vec<f64>,
    /// Proportions per tracked language, in the order of `Projection::languages`.
    pub languages: Vec<Vec<f64>>,
    /// Index of the first snapshot carrying any language data.
    pub first_language_index: usize,
}

impl Series {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn has_language_data(&self) -> bool {
        self.languages
            .iter()
            .any(|values| values.iter().any(|value| *value != 0.0))
    }
}

/// Linear trend anchored at the last real value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Trend {
    pub base: f64,
    pub slope: f64,
}

impl Trend {
    /// Value `steps` snapshot intervals past the last real point.
    pub fn value_at(&self, steps: f64) -> f64 {
        self.base + steps * self.slope
    }

    pub fn count_at(&self, steps: f64) -> u64 {
        self.value_at(steps).max(0.0).floor() as u64
    }

    /// Snapshot steps until the metric moves by a meaningful fraction of its
    /// current value, if it moves at all.
    fn steps_to_meaningful_change(&self) -> Option<f64> {
        let slope = self.slope.abs();
        if slope > 0.0 && self.base > 0.0 {
            Some(MEANINGFUL_CHANGE * self.base / slope)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastPoint {
    pub date: NaiveDate,
    /// Multiple of the snapshot interval past the last real point.
    pub steps: f64,
    pub additions: u64,
    pub deletions: u64,
    pub stars: u64,
    pub languages: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub languages: Vec<TrackedLanguage>,
    pub series: Series,
    pub additions: Trend,
    pub deletions: Trend,
    pub stars: Trend,
    pub language_trends: Vec<Trend>,
    pub step_days: f64,
    pub horizon_days: f64,
    pub horizon_steps: f64,
    pub forecast: Vec<ForecastPoint>,
}

impl Projection {
    pub fn real_len(&self) -> usize {
        self.series.len()
    }

    /// Real dates followed by forecast dates.
    pub fn all_dates(&self) -> Vec<NaiveDate> {
        self.series
            .dates
            .iter()
            .copied()
            .chain(self.forecast.iter().map(|point| point.date))
            .collect()
    }
}

/// Ordinary least-squares slope of `ys` against `0..ys.len()`.
pub fn linreg_slope(ys: &[f64]) -> f64 {
    let m = ys.len();
    if m < 2 {
        return 0.0;
    }
    let m_f = m as f64;
    let sum_x = m_f * (m_f - 1.0) / 2.0;
    let sum_x2 = m_f * (m_f - 1.0) * (2.0 * m_f - 1.0) / 6.0;
    let sum_y: f64 = ys.iter().sum();
    let sum_xy: f64 = ys.iter().enumerate().map(|(i, y)| i as f64 * y).sum();
    let denom = m_f * sum_x2 - sum_x * sum_x;
    if denom == 0.0 {
        0.0
    } else {
        (m_f * sum_xy - sum_x * sum_y) / denom
    }
}

/// Languages shown in trend charts: the global top by summed size plus any
/// language that was ever in a single snapshot's top five, capped and ranked
/// by summed size.
pub fn tracked_languages(snapshots: &[Snapshot]) -> Vec<TrackedLanguage> {
    let mut totals: BTreeMap<&str, u64> = BTreeMap::new();
    let mut colors: BTreeMap<&str, &str> = BTreeMap::new();
    let mut ever_top: BTreeSet<&str> = BTreeSet::new();

    for snapshot in snapshots {
        for (name, stat) in &snapshot.languages {
            let total = totals.entry(name.as_str()).or_insert(0);
            *total = total.saturating_add(stat.size);
            if let Some(color) = stat.color.as_deref().filter(|c| !c.is_empty()) {
                colors.insert(name.as_str(), color);
            }
        }
        ever_top.extend(
            snapshot
                .languages_by_size()
                .into_iter()
                .take(PER_SNAPSHOT_TOP)
                .map(|(name, _)| name.as_str()),
        );
    }

    let mut ranked: Vec<(&str, u64)> = totals.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let mut candidates: BTreeSet<&str> = ranked
        .iter()
        .take(MAX_TRACKED_LANGUAGES)
        .map(|(name, _)| *name)
        .collect();
    candidates.extend(ever_top);

    ranked
        .into_iter()
        .filter(|(name, _)| candidates.contains(name))
        .take(MAX_TRACKED_LANGUAGES)
        .map(|(name, _)| TrackedLanguage {
            name: name.to_string(),
            color: colors.get(name).map(|color| color.to_string()),
        })
        .collect()
}

pub fn extract_series(snapshots: &[Snapshot], languages: &[TrackedLanguage]) -> Series {
    let mut series = Series {
        languages: vec![Vec::with_capacity(snapshots.len()); languages.len()],
        first_language_index: snapshots
            .iter()
            .position(Snapshot::has_languages)
            .unwrap_or(snapshots.len()),
        ..Series::default()
    };

    for snapshot in snapshots {
        let activity = snapshot.activity();
        series.dates.push(snapshot.date);
        series.additions.push(activity.additions as f64);
        series.deletions.push(activity.deletions as f64);
        series.stars.push(snapshot.stargazers as f64);
        for (values, language) in series.languages.iter_mut().zip(languages) {
            values.push(snapshot.language_prop(&language.name));
        }
    }

    series
}

/// Average number of days between consecutive snapshots, at least one.
fn average_step_days(dates: &[NaiveDate]) -> f64 {
    match (dates.first(), dates.last()) {
        (Some(first), Some(last)) if dates.len() > 1 => {
            let span = (*last - *first).num_days() as f64;
            (span / (dates.len() - 1) as f64).max(1.0)
        }
        _ => 1.0,
    }
}

fn trend_of(values: &[f64]) -> Trend {
    Trend {
        base: values.last().copied().unwrap_or(0.0),
        slope: linreg_slope(values),
    }
}

/// Rescales `raw` so it sums to `target`, when both sums are positive.
fn conserve_total(raw: &mut [f64], target: f64) {
    let raw_total: f64 = raw.iter().sum();
    if raw_total > 0.0 && target > 0.0 {
        let scale = target / raw_total;
        for value in raw.iter_mut() {
            *value *= scale;
        }
    }
}

/// Fits trends over the real history and extrapolates two forecast points
/// at one and two horizons past the last snapshot.
pub fn project(history: &History) -> Projection {
    let snapshots = history.snapshots();
    let languages = tracked_languages(snapshots);
    let series = extract_series(snapshots, &languages);

    let mut additions = trend_of(&series.additions);
    additions.slope = additions.slope.max(0.0);
    let mut deletions = trend_of(&series.deletions);
    deletions.slope = deletions.slope.max(0.0);
    let stars = trend_of(&series.stars);

    let language_trends: Vec<Trend> = series
        .languages
        .iter()
        .map(|values| Trend {
            base: values.last().copied().unwrap_or(0.0),
            slope: linreg_slope(values.get(series.first_language_index..).unwrap_or(&[])),
        })
        .collect();

    let step_days = average_step_days(&series.dates);
    let candidate_steps = additions
        .steps_to_meaningful_change()
        .into_iter()
        .chain(
            language_trends
                .iter()
                .filter_map(Trend::steps_to_meaningful_change),
        )
        .fold(None, |best: Option<f64>, steps| {
            Some(best.map_or(steps, |best| best.min(steps)))
        });
    let raw_steps = candidate_steps.unwrap_or(MIN_FORECAST_DAYS / step_days);
    let horizon_days = (raw_steps * step_days).clamp(MIN_FORECAST_DAYS, MAX_FORECAST_DAYS);
    let horizon_steps = horizon_days / step_days;

    let mut forecast = Vec::new();
    if let Some(last) = series.dates.last().copied() {
        let real_language_total: f64 = language_trends.iter().map(|trend| trend.base).sum();
        for multiple in [1.0, 2.0] {
            let steps = horizon_steps * multiple;
            let mut language_values: Vec<f64> = language_trends
                .iter()
                .map(|trend| trend.value_at(steps).max(0.0))
                .collect();
            conserve_total(&mut language_values, real_language_total);

            forecast.push(ForecastPoint {
                date: last + Duration::days((horizon_days * multiple) as i64),
                steps,
                additions: additions.count_at(steps),
                deletions: deletions.count_at(steps),
                stars: stars.count_at(steps),
                languages: language_values,
            });
        }
    }

    Projection {
        languages,
        series,
        additions,
        deletions,
        stars,
        language_trends,
        step_days,
        horizon_days,
        horizon_steps,
        forecast,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LanguageStat;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn snapshot(date: NaiveDate, added: u64, deleted: u64) -> Snapshot {
        let mut snapshot = Snapshot::empty(date);
        snapshot.lines_added = added;
        snapshot.lines_deleted = deleted;
        snapshot
    }

    fn with_languages(mut snapshot: Snapshot, languages: &[(&str, u64, f64)]) -> Snapshot {
        for (name, size, prop) in languages {
            snapshot.languages.insert(
                name.to_string(),
                LanguageStat {
                    size: *size,
                    prop: *prop,
                    color: None,
                },
            );
        }
        snapshot
    }

    #[test]
    fn slope_of_short_or_flat_series_is_zero() {
        assert_eq!(linreg_slope(&[]), 0.0);
        assert_eq!(linreg_slope(&[42.0]), 0.0);
        assert_eq!(linreg_slope(&[7.0, 7.0, 7.0, 7.0]), 0.0);
    }

    #[test]
    fn slope_matches_least_squares_fit() {
        assert!((linreg_slope(&[1.0, 3.0, 5.0, 7.0]) - 2.0).abs() < 1e-9);
        assert!((linreg_slope(&[0.0, 2.0, 1.0, 3.0]) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn two_point_history_projects_per_period_slope() {
        let history = History::from_snapshots(vec![
            snapshot(day(2024, 1, 1), 1_000, 200),
            snapshot(day(2024, 2, 1), 1_500, 250),
        ]);
        let projection = project(&history);

        assert!((projection.additions.slope - 500.0).abs() < 1e-9);
        assert!((projection.additions.value_at(1.0) - 2_000.0).abs() < 1e-9);
        assert!((projection.additions.value_at(2.0) - 2_500.0).abs() < 1e-9);

        // 10% of 1500 at 500/step is under the minimum horizon, so it clamps.
        assert_eq!(projection.horizon_days, MIN_FORECAST_DAYS);
        assert_eq!(projection.forecast.len(), 2);
        assert_eq!(projection.forecast[0].date, day(2024, 2, 15));
        assert_eq!(projection.forecast[1].date, day(2024, 2, 29));
        assert!(projection.forecast[0].additions >= 1_500);
        assert!(projection.forecast[1].additions >= projection.forecast[0].additions);
    }

    #[test]
    fn constant_series_forecasts_last_value() {
        let history = History::from_snapshots(vec![
            snapshot(day(2024, 1, 1), 800, 100),
            snapshot(day(2024, 1, 8), 800, 100),
            snapshot(day(2024, 1, 15), 800, 100),
        ]);
        let projection = project(&history);

        assert_eq!(projection.additions.slope, 0.0);
        assert_eq!(projection.horizon_days, MIN_FORECAST_DAYS);
        for point in &projection.forecast {
            assert_eq!(point.additions, 800);
            assert_eq!(point.deletions, 100);
        }
    }

    #[test]
    fn increasing_metric_forecast_is_monotonic() {
        let history = History::from_snapshots(vec![
            snapshot(day(2024, 1, 1), 100, 10),
            snapshot(day(2024, 2, 1), 900, 30),
            snapshot(day(2024, 3, 1), 1_400, 60),
            snapshot(day(2024, 4, 1), 4_000, 90),
        ]);
        let projection = project(&history);
        let [first, second] = projection.forecast.as_slice() else {
            panic!("expected two forecast points");
        };
        assert!(first.additions >= 4_000);
        assert!(second.additions >= first.additions);
        assert!(first.deletions >= 90);
        assert!(second.deletions >= first.deletions);
        assert!(projection.horizon_days >= MIN_FORECAST_DAYS);
        assert!(projection.horizon_days <= MAX_FORECAST_DAYS);
    }

    #[test]
    fn shrinking_activity_is_not_projected_downwards() {
        let history = History::from_snapshots(vec![
            snapshot(day(2024, 1, 1), 5_000, 500),
            snapshot(day(2024, 2, 1), 3_000, 300),
        ]);
        let projection = project(&history);
        assert_eq!(projection.additions.slope, 0.0);
        assert_eq!(projection.forecast[1].additions, 3_000);
    }

    #[test]
    fn language_forecast_conserves_total_proportion() {
        let history = History::from_snapshots(vec![
            with_languages(
                snapshot(day(2024, 1, 1), 10, 0),
                &[("Rust", 600, 60.0), ("Python", 300, 30.0), ("Shell", 100, 10.0)],
            ),
            with_languages(
                snapshot(day(2024, 2, 1), 20, 0),
                &[("Rust", 700, 70.0), ("Python", 250, 25.0), ("Shell", 50, 5.0)],
            ),
            with_languages(
                snapshot(day(2024, 3, 1), 30, 0),
                &[("Rust", 800, 80.0), ("Python", 180, 18.0), ("Shell", 20, 2.0)],
            ),
        ]);
        let projection = project(&history);
        let real_total: f64 = projection
            .series
            .languages
            .iter()
            .map(|values| values.last().copied().unwrap_or(0.0))
            .sum();

        for point in &projection.forecast {
            let forecast_total: f64 = point.languages.iter().sum();
            assert!((forecast_total - real_total).abs() < 1e-6);
            assert!(point.languages.iter().all(|value| *value >= 0.0));
        }
    }

    #[test]
    fn language_slope_ignores_snapshots_before_language_data() {
        let history = History::from_snapshots(vec![
            snapshot(day(2024, 1, 1), 10, 0),
            snapshot(day(2024, 2, 1), 10, 0),
            with_languages(snapshot(day(2024, 3, 1), 10, 0), &[("Rust", 100, 100.0)]),
            with_languages(snapshot(day(2024, 4, 1), 10, 0), &[("Rust", 100, 100.0)]),
        ]);
        let projection = project(&history);
        assert_eq!(projection.series.first_language_index, 2);
        assert_eq!(projection.language_trends[0].slope, 0.0);
    }

    #[test]
    fn tracked_set_keeps_past_top_five_languages() {
        let big = [
            ("A", 9_000, 0.0),
            ("B", 8_000, 0.0),
            ("C", 7_000, 0.0),
            ("D", 6_000, 0.0),
            ("E", 5_000, 0.0),
            ("F", 4_000, 0.0),
            ("G", 3_000, 0.0),
            ("H", 2_000, 0.0),
            ("I", 1_000, 0.0),
        ];
        let snapshots = vec![
            with_languages(Snapshot::empty(day(2024, 1, 1)), &big),
            with_languages(Snapshot::empty(day(2024, 2, 1)), &[("Spike", 500, 0.0)]),
        ];
        let names: Vec<_> = tracked_languages(&snapshots)
            .into_iter()
            .map(|language| language.name)
            .collect();
        assert_eq!(names.len(), MAX_TRACKED_LANGUAGES);
        assert!(!names.contains(&"Spike".to_string()));
        assert_eq!(names[0], "A");

        // A one-off top-five language is kept when the cap leaves room for it.
        let snapshots = vec![
            with_languages(Snapshot::empty(day(2024, 1, 1)), &big[..3]),
            with_languages(Snapshot::empty(day(2024, 2, 1)), &[("Spike", 500, 0.0)]),
        ];
        let names: Vec<_> = tracked_languages(&snapshots)
            .into_iter()
            .map(|language| language.name)
            .collect();
        assert_eq!(names, vec!["A", "B", "C", "Spike"]);
    }

    #[test]
    fn empty_history_has_no_forecast() {
        let projection = project(&History::default());
        assert!(projection.forecast.is_empty());
        assert!(projection.series.dates.is_empty());
        assert!(projection.languages.is_empty());
    }
}
