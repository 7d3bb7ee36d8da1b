use std::fmt::Write;

use crate::models::Snapshot;
use crate::svg::{self, FONT, TEXT};

const OVERVIEW_WIDTH: u32 = 360;
const OVERVIEW_HEIGHT: u32 = 210;
const LANGUAGES_WIDTH: u32 = 360;
const LANGUAGE_ROW_HEIGHT: u32 = 21;
const DEFAULT_LANGUAGE_COLOR: &str = "#000000";
const ITEM_DELAY_MS: usize = 150;

/// Summary card with account-wide totals.
pub fn render_overview(name: &str, snapshot: &Snapshot) -> String {
    let rows = [
        ("Stars", svg::thousands(snapshot.stargazers)),
        ("Forks", svg::thousands(snapshot.forks)),
        ("All-time contributions", svg::thousands(snapshot.total_contributions)),
        ("Lines of code changed", svg::thousands(snapshot.lines_total())),
        ("Repositories with contributions", svg::thousands(snapshot.repo_count)),
    ];

    let mut out = String::new();
    svg::open(&mut out, OVERVIEW_WIDTH, OVERVIEW_HEIGHT);
    let _ = writeln!(
        out,
        r#"<style>
  .header {{ font: 600 16px {FONT}; fill: {TEXT}; }}
  .stat {{ font: 13px {FONT}; fill: {TEXT}; }}
  @keyframes fadeIn {{ from {{ opacity: 0; }} to {{ opacity: 1; }} }}
  .row {{ animation: fadeIn 0.3s ease-in-out forwards; opacity: 0; }}
</style>"#
    );
    svg::card_background(&mut out, OVERVIEW_WIDTH, OVERVIEW_HEIGHT);
    let _ = writeln!(
        out,
        r#"<text x="20" y="32" class="header">{}'s GitHub Statistics</text>"#,
        svg::escape(name)
    );
    for (i, (label, value)) in rows.iter().enumerate() {
        let y = 62 + i as u32 * 30;
        let _ = writeln!(
            out,
            r#"<g class="row" style="animation-delay:{}ms;"><text x="20" y="{y}" class="stat">{label}</text><text x="{}" y="{y}" text-anchor="end" class="stat">{value}</text></g>"#,
            i * ITEM_DELAY_MS,
            OVERVIEW_WIDTH - 20
        );
    }
    svg::close(&mut out);
    out
}

/// Proportional bar and list of languages ordered by size.
pub fn render_languages(snapshot: &Snapshot) -> String {
    let languages = snapshot.languages_by_size();
    let height = 80 + languages.len().div_ceil(2) as u32 * LANGUAGE_ROW_HEIGHT;
    let bar_width = (LANGUAGES_WIDTH - 40) as f64;

    let mut out = String::new();
    svg::open(&mut out, LANGUAGES_WIDTH, height);
    let _ = writeln!(
        out,
        r#"<style>
  .header {{ font: 600 16px {FONT}; fill: {TEXT}; }}
  .lang {{ font: 12px {FONT}; fill: {TEXT}; }}
  @keyframes fadeIn {{ from {{ opacity: 0; }} to {{ opacity: 1; }} }}
  .item {{ animation: fadeIn 0.3s ease-in-out forwards; opacity: 0; }}
</style>"#
    );
    svg::card_background(&mut out, LANGUAGES_WIDTH, height);
    let _ = writeln!(out, r#"<text x="20" y="32" class="header">Languages Used</text>"#);

    let mut offset = 20.0;
    for (_, stat) in &languages {
        let width = bar_width * stat.prop.clamp(0.0, 100.0) / 100.0;
        let color = stat.color.as_deref().unwrap_or(DEFAULT_LANGUAGE_COLOR);
        let _ = writeln!(
            out,
            r#"<rect x="{offset:.3}" y="46" width="{width:.3}" height="8" fill="{}"/>"#,
            svg::escape(color)
        );
        offset += width;
    }

    for (i, (name, stat)) in languages.iter().enumerate() {
        let x = if i % 2 == 0 { 20 } else { 190 };
        let y = 80 + (i / 2) as u32 * LANGUAGE_ROW_HEIGHT;
        let color = stat.color.as_deref().unwrap_or(DEFAULT_LANGUAGE_COLOR);
        let _ = writeln!(
            out,
            r#"<g class="item" style="animation-delay:{}ms;"><circle cx="{}" cy="{}" r="5" fill="{}"/><text x="{}" y="{y}" class="lang">{} {:.2}%</text></g>"#,
            i * ITEM_DELAY_MS,
            x + 5,
            y - 4,
            svg::escape(color),
            x + 16,
            svg::escape(name),
            stat.prop
        );
    }
    svg::close(&mut out);
    out
}
