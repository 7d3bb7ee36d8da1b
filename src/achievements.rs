use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::{Datelike, NaiveDate};

use crate::models::{History, WeekChange};
use crate::svg::{self, BLUE, BRONZE, FONT, GOLD, GREEN, GRID, PURPLE, RED, SILVER, TEXT};

pub const WIDTH: u32 = 1000;
pub const HEIGHT: u32 = 760;
const HEADER_HEIGHT: u32 = 100;
const FOOTER_HEIGHT: u32 = 45;
const MAX_ROW_HEIGHT: u32 = 165;
const COLUMN_BADGE_X: [u32; 2] = [12, 512];
const COLUMN_TEXT_X: [u32; 2] = [34, 534];
const COLUMN_SEPARATOR_X: u32 = 500;
const RANKED_YEARS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct Achievement {
    pub icon: &'static str,
    pub label: String,
    pub value: String,
    pub color: &'static str,
}

impl Achievement {
    fn new(icon: &'static str, label: impl Into<String>, value: impl Into<String>, color: &'static str) -> Self {
        Self {
            icon,
            label: label.into(),
            value: value.into(),
            color,
        }
    }
}

fn by_value(a: &f64, b: &f64) -> Ordering {
    a.partial_cmp(b).unwrap_or(Ordering::Equal)
}

/// Superlatives derived from the whole history, in display order.
pub fn detect(history: &History) -> Vec<Achievement> {
    let snapshots = history.snapshots();
    let mut achievements = Vec::new();

    let mut contributions_by_year: BTreeMap<i32, u64> = BTreeMap::new();
    for snapshot in snapshots {
        for (year, count) in &snapshot.contributions_by_year {
            let best = contributions_by_year.entry(*year).or_insert(0);
            *best = (*best).max(*count);
        }
    }
    // Earliest year wins ties.
    if let Some((year, count)) = contributions_by_year
        .iter()
        .rev()
        .max_by_key(|(_, count)| **count)
    {
        achievements.push(Achievement::new(
            "🏆",
            format!("Most Active Year: {year}"),
            format!("{} contributions", svg::thousands(*count)),
            GOLD,
        ));
    }

    let mut languages_by_year: BTreeMap<i32, BTreeMap<&str, f64>> = BTreeMap::new();
    for snapshot in snapshots.iter().filter(|s| s.has_languages()) {
        let year = languages_by_year.entry(snapshot.date.year()).or_default();
        for (name, stat) in &snapshot.languages {
            let best = year.entry(name.as_str()).or_insert(0.0);
            *best = best.max(stat.prop);
        }
    }
    let rank_colors = [GOLD, SILVER, BRONZE];
    for (rank, (year, props)) in languages_by_year
        .iter()
        .rev()
        .take(RANKED_YEARS)
        .enumerate()
    {
        if let Some((name, prop)) = props.iter().rev().max_by(|a, b| by_value(a.1, b.1)) {
            achievements.push(Achievement::new(
                "💻",
                format!("Top Language {year}: {name}"),
                format!("{prop:.1}% of code"),
                rank_colors.get(rank).copied().unwrap_or(BLUE),
            ));
        }
    }

    let mut weeks: BTreeMap<NaiveDate, WeekChange> = BTreeMap::new();
    for snapshot in snapshots {
        for (week, change) in &snapshot.lines_changed_by_week {
            let best = weeks.entry(*week).or_default();
            if change.total() > best.total() {
                *best = *change;
            }
        }
    }
    if let Some((week, change)) = weeks.iter().rev().max_by_key(|(_, change)| change.total()) {
        achievements.push(Achievement::new(
            "🔥",
            format!("Peak Week: {week}"),
            format!(
                "+{} / -{} lines",
                svg::thousands(change.additions),
                svg::thousands(change.deletions)
            ),
            RED,
        ));
    }

    let added: u64 = weeks.values().map(|change| change.additions).sum();
    let deleted: u64 = weeks.values().map(|change| change.deletions).sum();
    if added > 0 {
        achievements.push(Achievement::new(
            "📝",
            "Total Lines Written (all-time)",
            format!(
                "+{} added / -{} deleted",
                svg::thousands(added),
                svg::thousands(deleted)
            ),
            GREEN,
        ));
    }
    if deleted > 0 {
        achievements.push(Achievement::new(
            "⚖️",
            "Add / Delete Ratio",
            format!(
                "{:.2}x (higher = more net new code)",
                added as f64 / deleted as f64
            ),
            BLUE,
        ));
    }

    let mut with_languages = snapshots.iter().filter(|s| s.has_languages());
    let earliest = with_languages.next();
    let latest = with_languages.last().or(earliest);
    if let (Some(earliest), Some(latest)) = (earliest, latest) {
        if earliest.languages != latest.languages {
            let growth: Vec<(&str, f64)> = latest
                .languages
                .iter()
                .map(|(name, stat)| (name.as_str(), stat.prop - earliest.language_prop(name)))
                .collect();
            if let Some((name, delta)) = growth
                .iter()
                .rev()
                .max_by(|a, b| by_value(&a.1, &b.1))
                .filter(|(_, delta)| *delta > 0.0)
            {
                achievements.push(Achievement::new(
                    "📈",
                    "Fastest Growing Language",
                    format!("{name} (+{delta:.1}pp)"),
                    GREEN,
                ));
            }
            if let Some((name, delta)) = growth
                .iter()
                .min_by(|a, b| by_value(&a.1, &b.1))
                .filter(|(_, delta)| *delta < 0.0)
            {
                achievements.push(Achievement::new(
                    "📉",
                    "Most Reduced Language",
                    format!("{name} ({delta:.1}pp)"),
                    RED,
                ));
            }
        }
    }

    let peak_stars = snapshots.iter().map(|s| s.stargazers).max().unwrap_or(0);
    if peak_stars > 0 {
        achievements.push(Achievement::new(
            "⭐",
            "Peak Stars",
            format!("{} stars across all repos", svg::thousands(peak_stars)),
            GOLD,
        ));
    }
    let peak_repos = snapshots.iter().map(|s| s.repo_count).max().unwrap_or(0);
    if peak_repos > 0 {
        achievements.push(Achievement::new(
            "📦",
            "Peak Repository Count",
            format!("{peak_repos} repos"),
            PURPLE,
        ));
    }

    achievements
}

pub fn render(achievements: &[Achievement], updated: Option<NaiveDate>) -> String {
    let mut out = String::new();
    svg::open(&mut out, WIDTH, HEIGHT);
    let _ = writeln!(
        out,
        r#"<style>
  .ach-title {{ font: bold 28px {FONT}; fill: {TEXT}; }}
  .ach-sub   {{ font: 600 20px {FONT}; fill: {TEXT}; opacity: 0.75; }}
  .ach-label {{ font: bold 22px {FONT}; fill: {TEXT}; }}
  .ach-value {{ font: 18px {FONT}; fill: {TEXT}; opacity: 0.75; }}
  .ach-note  {{ font: 18px {FONT}; fill: {TEXT}; opacity: 0.5; }}
  @keyframes popIn {{ from {{ opacity: 0; transform: scale(0.92); }}
                      to   {{ opacity: 1; transform: scale(1);    }} }}
  .ach-row {{ animation: popIn 0.35s ease forwards; opacity: 0; }}
</style>"#
    );
    svg::card_background(&mut out, WIDTH, HEIGHT);
    let _ = writeln!(
        out,
        r#"<text x="20" y="50" class="ach-title">🎖️ Top Rankings &amp; Records</text>"#
    );
    let _ = writeln!(
        out,
        r#"<text x="20" y="78" class="ach-sub">Highlights automatically derived from GitHub activity data</text>"#
    );

    if achievements.is_empty() {
        let _ = writeln!(
            out,
            r#"<text x="20" y="{}" class="ach-note">No achievements detected yet.</text>"#,
            HEADER_HEIGHT + 45
        );
    } else {
        let rows = (achievements.len() as u32).div_ceil(2).max(1);
        let row_height = MAX_ROW_HEIGHT.min((HEIGHT - HEADER_HEIGHT - FOOTER_HEIGHT) / rows);
        let _ = writeln!(
            out,
            r#"<line x1="{COLUMN_SEPARATOR_X}" y1="{}" x2="{COLUMN_SEPARATOR_X}" y2="{}" stroke="{GRID}" stroke-width="1" opacity="0.5"/>"#,
            HEADER_HEIGHT + 12,
            HEIGHT - FOOTER_HEIGHT - 12
        );

        for (index, achievement) in achievements.iter().enumerate() {
            let column = index % 2;
            let y = HEADER_HEIGHT + (index as u32 / 2) * row_height;
            let delay = index * 55;
            let _ = writeln!(
                out,
                r#"<rect x="{}" y="{}" width="6" height="{}" rx="2" fill="{}" opacity="0.9" class="ach-row" style="animation-delay:{delay}ms;"/>"#,
                COLUMN_BADGE_X[column],
                y + 10,
                row_height.saturating_sub(20),
                achievement.color
            );
            let _ = writeln!(
                out,
                r#"<g class="ach-row" style="animation-delay:{}ms;">"#,
                delay + 30
            );
            let _ = writeln!(
                out,
                r#"<text x="{}" y="{}" class="ach-label">{} {}</text>"#,
                COLUMN_TEXT_X[column],
                y + 38,
                achievement.icon,
                svg::escape(&achievement.label)
            );
            let _ = writeln!(
                out,
                r#"<text x="{}" y="{}" class="ach-value">{}</text>"#,
                COLUMN_TEXT_X[column],
                y + 64,
                svg::escape(&achievement.value)
            );
            out.push_str("</g>\n");
        }
    }

    let _ = writeln!(
        out,
        r#"<line x1="8" y1="{0}" x2="{1}" y2="{0}" stroke="{GRID}" stroke-width="1"/>"#,
        HEIGHT - FOOTER_HEIGHT,
        WIDTH - 8
    );
    if let Some(updated) = updated {
        let _ = writeln!(
            out,
            r#"<text x="{}" y="{}" text-anchor="end" class="ach-note">Updated {updated}</text>"#,
            WIDTH - 10,
            HEIGHT - 12
        );
    }
    svg::close(&mut out);
    out
}
