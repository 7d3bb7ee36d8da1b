use std::collections::BTreeSet;
use std::fmt::Write;

use chrono::NaiveDate;
use log::debug;

use crate::models::{History, Snapshot};
use crate::svg::{self, FONT, GOLD, GREEN, GRID, RED, TEXT};
use crate::trend::Projection;

pub const WIDTH: u32 = 1000;
pub const HEIGHT: u32 = 760;
const PLACEHOLDER_HEIGHT: u32 = 150;

const MARGIN_LEFT: f64 = 90.0;
const MARGIN_RIGHT: f64 = 220.0;
const CHART_WIDTH: f64 = WIDTH as f64 - MARGIN_LEFT - MARGIN_RIGHT;
const PANEL_HEIGHT: f64 = 240.0;
const PANEL_GAP: f64 = 70.0;
pub const ACTIVITY_TOP: f64 = 100.0;
pub const LANGUAGE_TOP: f64 = ACTIVITY_TOP + PANEL_HEIGHT + PANEL_GAP;

const MIN_LABEL_SPACING: f64 = 70.0;
const GRID_LINES: usize = 4;
const STAR_SCALE: f64 = 0.8;
const LEGEND_MAX_CHARS: usize = 22;
/// Smallest proportion change (percentage points) shown as `start%→end%`.
const LEGEND_CHANGE_THRESHOLD: f64 = 0.05;
const FALLBACK_LANGUAGE_COLOR: &str = "#888888";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub points: usize,
    pub step_x: f64,
}

impl Frame {
    pub fn new(points: usize) -> Self {
        Self {
            points,
            step_x: CHART_WIDTH / points.saturating_sub(1).max(1) as f64,
        }
    }

    pub fn x_at(&self, index: usize) -> f64 {
        MARGIN_LEFT + index as f64 * self.step_x
    }

    fn right(&self) -> f64 {
        self.x_at(self.points.saturating_sub(1))
    }
}

fn append(real: &[f64], forecast: impl Iterator<Item = f64>) -> Vec<f64> {
    real.iter().copied().chain(forecast).collect()
}

/// Series with the forecast appended after the real values.
struct Plotted {
    dates: Vec<NaiveDate>,
    real: usize,
    additions: Vec<f64>,
    deletions: Vec<f64>,
    stars: Vec<f64>,
    languages: Vec<Vec<f64>>,
}

impl Plotted {
    fn new(projection: &Projection) -> Self {
        let series = &projection.series;
        let forecast = &projection.forecast;

        let languages = series
            .languages
            .iter()
            .enumerate()
            .map(|(i, values)| {
                append(
                    values,
                    forecast
                        .iter()
                        .map(|point| point.languages.get(i).copied().unwrap_or(0.0)),
                )
            })
            .collect();

        Self {
            dates: projection.all_dates(),
            real: series.len(),
            additions: append(
                &series.additions,
                forecast.iter().map(|point| point.additions as f64),
            ),
            deletions: append(
                &series.deletions,
                forecast.iter().map(|point| point.deletions as f64),
            ),
            stars: append(&series.stars, forecast.iter().map(|point| point.stars as f64)),
            languages,
        }
    }

    fn len(&self) -> usize {
        self.dates.len()
    }

    fn has_forecast(&self) -> bool {
        self.len() > self.real
    }
}

/// Image written instead of the chart while there are fewer than two points.
pub fn render_placeholder() -> String {
    let mut out = String::new();
    svg::open(&mut out, WIDTH, PLACEHOLDER_HEIGHT);
    let _ = writeln!(
        out,
        r#"<text x="40" y="80" fill="{TEXT}" font-family="{FONT}" font-size="22">Not enough data yet – chart will appear after the next run.</text>"#
    );
    svg::close(&mut out);
    out
}

/// Indices that get an x-axis label: evenly decimated real points plus the
/// last real point and every forecast point.
pub fn label_indices(points: usize, real: usize, step_x: f64) -> Vec<usize> {
    if real == 0 {
        return Vec::new();
    }
    let mut step = (points / 10).max(1);
    while step > 1 && step as f64 * step_x < MIN_LABEL_SPACING {
        step += 1;
    }
    if step as f64 * step_x < MIN_LABEL_SPACING {
        step = ((MIN_LABEL_SPACING / step_x) as usize + 1).max(1);
    }

    let mut shown: BTreeSet<usize> = (0..real).step_by(step).collect();
    if points > real {
        shown.insert(real - 1);
        shown.extend(real..points);
    }
    shown.into_iter().collect()
}

fn forecast_label(date: NaiveDate) -> String {
    date.format("%b %d, %Y").to_string()
}

fn point_list(frame: &Frame, values: &[f64], y_of: impl Fn(f64) -> f64) -> Vec<String> {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| format!("{:.1},{:.1}", frame.x_at(i), y_of(*value)))
        .collect()
}

fn draw_grid(out: &mut String, top: f64, max_value: f64, label: impl Fn(f64) -> String) {
    for i in 0..=GRID_LINES {
        let fraction = i as f64 / GRID_LINES as f64;
        let y = top + PANEL_HEIGHT - fraction * PANEL_HEIGHT;
        let _ = writeln!(
            out,
            r#"<line x1="{MARGIN_LEFT}" y1="{y:.1}" x2="{}" y2="{y:.1}" stroke="{GRID}" stroke-width="1"/>"#,
            MARGIN_LEFT + CHART_WIDTH
        );
        let _ = writeln!(
            out,
            r#"<text x="{}" y="{:.1}" text-anchor="end" class="axis-label">{}</text>"#,
            MARGIN_LEFT - 8.0,
            y + 4.0,
            label(max_value * fraction)
        );
    }
}

struct Stroke<'a> {
    color: &'a str,
    width: f64,
    dash: Option<&'a str>,
    forecast_dash: &'a str,
    forecast_opacity: f64,
}

/// Solid line over the real points, dashed continuation over the forecast.
fn draw_line_with_forecast(
    out: &mut String,
    points: &[String],
    real: usize,
    stroke: &Stroke<'_>,
    delay_ms: u32,
) {
    let Stroke {
        color,
        width,
        dash,
        forecast_dash,
        forecast_opacity,
    } = *stroke;
    let dash = dash
        .map(|dash| format!(r#" stroke-dasharray="{dash}""#))
        .unwrap_or_default();
    let _ = writeln!(
        out,
        r#"<polyline points="{}" fill="none" stroke="{color}" stroke-width="{width}"{dash} stroke-linejoin="round" class="anim" style="animation-delay:{delay_ms}ms;"/>"#,
        points[..real].join(" ")
    );
    if points.len() > real {
        let _ = writeln!(
            out,
            r#"<polyline points="{}" fill="none" stroke="{color}" stroke-width="{}" stroke-dasharray="{forecast_dash}" stroke-linejoin="round" opacity="{forecast_opacity}" class="anim forecast" style="animation-delay:{delay_ms}ms;"/>"#,
            points[real - 1..].join(" "),
            (width - 0.5).max(1.0)
        );
    }
}

fn draw_area(out: &mut String, frame: &Frame, points: &[String], fill: &str, delay_ms: u32) {
    let bottom = ACTIVITY_TOP + PANEL_HEIGHT;
    let _ = writeln!(
        out,
        r#"<polygon points="{MARGIN_LEFT:.1},{bottom:.1} {} {:.1},{bottom:.1}" fill="url(#{fill})" class="anim" style="animation-delay:{delay_ms}ms;"/>"#,
        points.join(" "),
        frame.right()
    );
}

fn write_defs_and_style(out: &mut String) {
    let _ = writeln!(
        out,
        r#"<defs>
  <linearGradient id="addGrad" x1="0" y1="0" x2="0" y2="1">
    <stop offset="0%" stop-color="{GREEN}" stop-opacity="0.35"/>
    <stop offset="100%" stop-color="{GREEN}" stop-opacity="0.02"/>
  </linearGradient>
  <linearGradient id="delGrad" x1="0" y1="0" x2="0" y2="1">
    <stop offset="0%" stop-color="{RED}" stop-opacity="0.25"/>
    <stop offset="100%" stop-color="{RED}" stop-opacity="0.02"/>
  </linearGradient>
</defs>
<style>
  .title {{ font: bold 28px {FONT}; fill: {TEXT}; }}
  .subtitle {{ font: 600 20px {FONT}; fill: {TEXT}; opacity: 0.8; }}
  .axis-label {{ font: 18px {FONT}; fill: {TEXT}; opacity: 0.7; }}
  .legend-text {{ font: 14px {FONT}; fill: {TEXT}; }}
  @keyframes fadeIn {{ from {{ opacity: 0; }} to {{ opacity: 1; }} }}
  .anim {{ animation: fadeIn 0.6s ease-in-out forwards; opacity: 0; }}
</style>"#
    );
}

fn draw_activity_panel(out: &mut String, frame: &Frame, plotted: &Plotted) {
    let max_activity = plotted
        .additions
        .iter()
        .zip(&plotted.deletions)
        .map(|(a, d)| a + d)
        .fold(0.0_f64, f64::max);
    let max_activity = if max_activity > 0.0 { max_activity } else { 1.0 };

    let _ = writeln!(
        out,
        r#"<text x="{MARGIN_LEFT}" y="{}" class="subtitle">Lines Added vs Deleted (per snapshot)</text>"#,
        ACTIVITY_TOP - 10.0
    );
    draw_grid(out, ACTIVITY_TOP, max_activity, svg::compact_number);

    let y_of = |value: f64| ACTIVITY_TOP + PANEL_HEIGHT - value / max_activity * PANEL_HEIGHT;
    let add_points = point_list(frame, &plotted.additions, y_of);
    let del_points = point_list(frame, &plotted.deletions, y_of);

    draw_area(out, frame, &add_points, "addGrad", 200);
    let add_stroke = Stroke {
        color: GREEN,
        width: 2.0,
        dash: None,
        forecast_dash: "5,4",
        forecast_opacity: 0.6,
    };
    draw_line_with_forecast(out, &add_points, plotted.real, &add_stroke, 250);

    draw_area(out, frame, &del_points, "delGrad", 300);
    let del_stroke = Stroke {
        color: RED,
        width: 1.5,
        ..add_stroke
    };
    draw_line_with_forecast(out, &del_points, plotted.real, &del_stroke, 350);

    let max_stars = plotted.stars.iter().copied().fold(0.0_f64, f64::max);
    let min_stars = plotted.stars.iter().copied().fold(f64::INFINITY, f64::min);
    let min_stars = if min_stars.is_finite() { min_stars } else { 0.0 };
    let (star_base, star_range) = if max_stars - min_stars > 0.0 {
        (min_stars, max_stars - min_stars)
    } else {
        // Flat series: center the line vertically.
        let range = max_stars.max(1.0);
        (min_stars - range * 0.5, range)
    };
    let star_points = point_list(frame, &plotted.stars, |value| {
        ACTIVITY_TOP + PANEL_HEIGHT - (value - star_base) / star_range * PANEL_HEIGHT * STAR_SCALE
    });
    let star_stroke = Stroke {
        color: GOLD,
        width: 1.5,
        dash: Some("4,3"),
        forecast_dash: "3,5",
        forecast_opacity: 0.5,
    };
    draw_line_with_forecast(out, &star_points, plotted.real, &star_stroke, 400);
}

fn draw_language_panel(out: &mut String, frame: &Frame, plotted: &Plotted, projection: &Projection) {
    let _ = writeln!(
        out,
        r#"<text x="{MARGIN_LEFT}" y="{}" class="subtitle">Programming Language Development (%)</text>"#,
        LANGUAGE_TOP - 10.0
    );

    if projection.languages.is_empty() || !projection.series.has_language_data() {
        let _ = writeln!(
            out,
            r#"<text x="{}" y="{}" text-anchor="middle" class="subtitle" opacity="0.5">Language data will appear after repositories are analyzed</text>"#,
            MARGIN_LEFT + CHART_WIDTH / 2.0,
            LANGUAGE_TOP + PANEL_HEIGHT / 2.0
        );
        return;
    }

    draw_grid(out, LANGUAGE_TOP, 100.0, |value| format!("{value:.0}%"));

    let y_of = |percent: f64| LANGUAGE_TOP + PANEL_HEIGHT - percent / 100.0 * PANEL_HEIGHT;
    let mut stacked = vec![0.0_f64; plotted.len()];
    for (index, (language, values)) in projection
        .languages
        .iter()
        .zip(&plotted.languages)
        .enumerate()
    {
        let mut upper = Vec::with_capacity(values.len());
        let mut lower = Vec::with_capacity(values.len());
        for (i, value) in values.iter().enumerate() {
            let x = frame.x_at(i);
            lower.push(format!("{x:.1},{:.1}", y_of(stacked[i])));
            stacked[i] += value;
            upper.push(format!("{x:.1},{:.1}", y_of(stacked[i])));
        }
        lower.reverse();
        let color = language.color.as_deref().unwrap_or(FALLBACK_LANGUAGE_COLOR);
        let _ = writeln!(
            out,
            r#"<polygon points="{} {}" fill="{}" opacity="0.6" class="anim" style="animation-delay:{}ms;"/>"#,
            upper.join(" "),
            lower.join(" "),
            svg::escape(color),
            500 + index * 100
        );
    }
}

fn draw_forecast_boundary(out: &mut String, frame: &Frame, plotted: &Plotted) {
    if !plotted.has_forecast() {
        return;
    }
    let x = frame.x_at(plotted.real - 1);
    let _ = writeln!(
        out,
        r#"<line class="forecast-boundary" x1="{x:.1}" y1="{ACTIVITY_TOP}" x2="{x:.1}" y2="{}" stroke="{TEXT}" stroke-width="1" stroke-dasharray="4,3" opacity="0.35"/>"#,
        LANGUAGE_TOP + PANEL_HEIGHT
    );

    let mut last_x = f64::NEG_INFINITY;
    for (i, date) in plotted.dates.iter().enumerate().skip(plotted.real) {
        let x = frame.x_at(i);
        if x - last_x < MIN_LABEL_SPACING {
            continue;
        }
        let _ = writeln!(
            out,
            r#"<text x="{x:.1}" y="{}" text-anchor="middle" class="axis-label" opacity="0.6">{}</text>"#,
            ACTIVITY_TOP + 12.0,
            forecast_label(*date)
        );
        last_x = x;
    }
}

fn draw_x_labels(out: &mut String, frame: &Frame, plotted: &Plotted) {
    let months: BTreeSet<String> = plotted.dates[..plotted.real]
        .iter()
        .map(|date| date.format("%Y-%m").to_string())
        .collect();
    let full_dates = months.len() <= 1;
    let label_y = LANGUAGE_TOP + PANEL_HEIGHT + 18.0;

    let mut last_x = f64::NEG_INFINITY;
    let mut last_label = String::new();
    for i in label_indices(plotted.len(), plotted.real, frame.step_x) {
        let date = plotted.dates[i];
        let text = if i >= plotted.real {
            forecast_label(date)
        } else if full_dates {
            date.format("%Y-%m-%d").to_string()
        } else {
            date.format("%Y-%m").to_string()
        };

        // The last real point and the forecast points are never dropped.
        let forced = plotted.has_forecast() && i + 1 >= plotted.real;
        let x = frame.x_at(i);
        if !forced && !last_label.is_empty() && x - last_x < MIN_LABEL_SPACING {
            continue;
        }
        if text == last_label {
            continue;
        }
        let _ = writeln!(
            out,
            r#"<text x="{x:.1}" y="{label_y}" text-anchor="middle" class="axis-label" transform="rotate(-35 {x:.1} {label_y})">{text}</text>"#
        );
        last_x = x;
        last_label = text;
    }
}

fn legend_label(name: &str, current: f64, forecast: f64, has_forecast: bool) -> String {
    let label = if has_forecast && (forecast - current).abs() >= LEGEND_CHANGE_THRESHOLD {
        format!("{name} ({current:.0}%→{forecast:.0}%)")
    } else {
        format!("{name} ({current:.1}%)")
    };
    svg::truncate(&label, LEGEND_MAX_CHARS)
}

/// Legend, contributions table and statistics in the right-hand column.
fn draw_sidebar(out: &mut String, plotted: &Plotted, projection: &Projection, latest: &Snapshot) {
    let x = MARGIN_LEFT + CHART_WIDTH + 16.0;
    let top = ACTIVITY_TOP + 10.0;
    let max_y = HEIGHT as f64 - 40.0;

    for (offset, color, width, dash, text) in [
        (0.0, GREEN, 2.0, "", "Lines Added"),
        (30.0, RED, 1.5, "", "Lines Deleted"),
        (60.0, GOLD, 1.5, r#" stroke-dasharray="4,3""#, "&#x2605; Stars"),
    ] {
        let y = top + offset;
        let _ = writeln!(
            out,
            r#"<line x1="{x}" y1="{y}" x2="{}" y2="{y}" stroke="{color}" stroke-width="{width}"{dash}/>"#,
            x + 28.0
        );
        let _ = writeln!(
            out,
            r#"<text x="{}" y="{}" class="legend-text">{text}</text>"#,
            x + 36.0,
            y + 6.0
        );
    }

    let mut next_y = top + 72.0;
    if !projection.languages.is_empty() && projection.series.has_language_data() {
        let heading_y = top + 90.0;
        let _ = writeln!(out, r#"<text x="{x}" y="{heading_y}" class="subtitle">Languages</text>"#);
        for (i, (language, values)) in projection
            .languages
            .iter()
            .zip(&plotted.languages)
            .enumerate()
        {
            let y = heading_y + 22.0 + i as f64 * 22.0;
            let current = values.get(plotted.real - 1).copied().unwrap_or(0.0);
            let forecast = values.last().copied().unwrap_or(current);
            let color = language.color.as_deref().unwrap_or(FALLBACK_LANGUAGE_COLOR);
            let _ = writeln!(
                out,
                r#"<rect x="{x}" y="{}" width="12" height="12" rx="2" fill="{}" opacity="0.8" class="anim" style="animation-delay:{}ms;"/>"#,
                y - 10.0,
                svg::escape(color),
                800 + i * 80
            );
            let _ = writeln!(
                out,
                r#"<text x="{}" y="{}" class="legend-text">{}</text>"#,
                x + 18.0,
                y + 1.0,
                svg::escape(&legend_label(
                    &language.name,
                    current,
                    forecast,
                    plotted.has_forecast()
                ))
            );
        }
        next_y = heading_y + 22.0 + projection.languages.len() as f64 * 22.0 + 14.0;
    }

    if !latest.contributions_by_year.is_empty() && next_y < max_y {
        let _ = writeln!(out, r#"<text x="{x}" y="{next_y}" class="subtitle">Contributions</text>"#);
        for (i, (year, count)) in latest.contributions_by_year.iter().enumerate() {
            let y = next_y + 20.0 + i as f64 * 20.0;
            if y > max_y {
                break;
            }
            let _ = writeln!(
                out,
                r#"<text x="{x}" y="{y}" class="axis-label">{year}: {}</text>"#,
                svg::thousands(*count)
            );
        }
        next_y += 20.0 + latest.contributions_by_year.len() as f64 * 20.0 + 10.0;
    }

    if let Some(stats) = WeeklyStats::from_snapshot(latest) {
        if next_y < max_y {
            let _ = writeln!(out, r#"<text x="{x}" y="{next_y}" class="subtitle">Statistics</text>"#);
            for (i, line) in stats.lines().iter().enumerate() {
                let y = next_y + 20.0 + i as f64 * 20.0;
                if y > max_y {
                    break;
                }
                let _ = writeln!(out, r#"<text x="{x}" y="{y}" class="axis-label">{line}</text>"#);
            }
        }
    }
}

/// Derived statistics over a snapshot's weekly activity.
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyStats {
    pub active_weeks: usize,
    pub additions: u64,
    pub deletions: u64,
    pub peak_week: NaiveDate,
    pub peak_lines: u64,
}

impl WeeklyStats {
    pub fn from_snapshot(snapshot: &Snapshot) -> Option<Self> {
        let totals = snapshot.weekly_totals()?;
        // Earliest week wins ties.
        let (peak_week, peak) = snapshot
            .lines_changed_by_week
            .iter()
            .rev()
            .max_by_key(|(_, change)| change.total())?;
        Some(Self {
            active_weeks: snapshot
                .lines_changed_by_week
                .values()
                .filter(|change| change.total() > 0)
                .count(),
            additions: totals.additions,
            deletions: totals.deletions,
            peak_week: *peak_week,
            peak_lines: peak.total(),
        })
    }

    pub fn ratio(&self) -> Option<f64> {
        (self.deletions > 0).then(|| self.additions as f64 / self.deletions as f64)
    }

    pub fn average_per_week(&self) -> f64 {
        if self.active_weeks == 0 {
            0.0
        } else {
            (self.additions + self.deletions) as f64 / self.active_weeks as f64
        }
    }

    fn lines(&self) -> Vec<String> {
        vec![
            format!("Active weeks: {}", self.active_weeks),
            format!(
                "Add/Del ratio: {}",
                self.ratio()
                    .map(|ratio| format!("{ratio:.1}x"))
                    .unwrap_or_else(|| "N/A".to_string())
            ),
            format!("Avg lines/wk: {}", svg::compact_number(self.average_per_week())),
            format!("Peak: {}", self.peak_week),
            format!("  ({} lines)", svg::compact_number(self.peak_lines as f64)),
        ]
    }
}

fn draw_footer(out: &mut String, latest: &Snapshot) {
    let _ = writeln!(
        out,
        r#"<text x="{MARGIN_LEFT}" y="{}" class="axis-label">Total: +{} / -{} lines &#xb7; {} contributions &#xb7; {} repos &#xb7; &#x2605; {}</text>"#,
        HEIGHT - 18,
        svg::thousands(latest.lines_added),
        svg::thousands(latest.lines_deleted),
        svg::thousands(latest.total_contributions),
        latest.repo_count,
        svg::thousands(latest.stargazers)
    );
}

/// Renders the activity history chart with its forecast region.
pub fn render(history: &History, projection: &Projection) -> String {
    let latest = match history.latest_real() {
        Some(latest) if projection.real_len() >= 2 => latest,
        _ => return render_placeholder(),
    };

    let plotted = Plotted::new(projection);
    let frame = Frame::new(plotted.len());
    debug!(
        "charting {} real and {} forecast points",
        plotted.real,
        plotted.len() - plotted.real
    );

    let mut out = String::new();
    svg::open(&mut out, WIDTH, HEIGHT);
    write_defs_and_style(&mut out);
    svg::card_background(&mut out, WIDTH, HEIGHT);
    let _ = writeln!(
        out,
        r#"<text x="{MARGIN_LEFT}" y="45" class="title">Activity History</text>"#
    );
    let _ = writeln!(
        out,
        r#"<text x="{MARGIN_LEFT}" y="72" class="subtitle">Lines added vs deleted &amp; activity trends over time</text>"#
    );

    draw_activity_panel(&mut out, &frame, &plotted);
    draw_language_panel(&mut out, &frame, &plotted, projection);
    draw_forecast_boundary(&mut out, &frame, &plotted);
    draw_x_labels(&mut out, &frame, &plotted);
    draw_sidebar(&mut out, &plotted, projection, latest);
    draw_footer(&mut out, latest);

    svg::close(&mut out);
    out
}
