use std::collections::{BTreeMap, HashSet};
use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::History;
use crate::svg::{self, BLUE, FONT, GOLD, GRID, PURPLE, TEXT};

const CONTRIBUTION_LADDER: [u64; 7] = [100, 250, 500, 1_000, 1_500, 2_000, 2_500];
const STAR_LADDER: [u64; 6] = [1, 5, 10, 20, 30, 50];
const REPO_LADDER: [u64; 4] = [5, 10, 25, 50];

pub const WIDTH: u32 = 1000;
pub const HEIGHT: u32 = 760;
const HEADER_HEIGHT: u32 = 100;
const FOOTER_HEIGHT: u32 = 45;
const MAX_ROW_HEIGHT: u32 = 160;
const COLUMN_TIMELINE_X: [u32; 2] = [50, 550];
const COLUMN_SEPARATOR_X: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MilestoneKind {
    Contributions,
    Stars,
    Repos,
}

impl MilestoneKind {
    fn icon(self) -> &'static str {
        match self {
            Self::Contributions => "🎯",
            Self::Stars => "⭐",
            Self::Repos => "📁",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Self::Contributions => PURPLE,
            Self::Stars => GOLD,
            Self::Repos => BLUE,
        }
    }

    fn ladder(self) -> &'static [u64] {
        match self {
            Self::Contributions => &CONTRIBUTION_LADDER,
            Self::Stars => &STAR_LADDER,
            Self::Repos => &REPO_LADDER,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Milestone {
    pub date: NaiveDate,
    pub kind: MilestoneKind,
    pub threshold: u64,
    /// Metric value on the day the threshold was first met.
    pub observed: u64,
}

impl Milestone {
    pub fn label(&self) -> String {
        match self.kind {
            MilestoneKind::Contributions => {
                format!("{} Contributions", svg::thousands(self.threshold))
            }
            MilestoneKind::Stars => format!("{} Stars", self.threshold),
            MilestoneKind::Repos => format!("{} Repos", self.threshold),
        }
    }

    pub fn value(&self) -> String {
        match self.kind {
            MilestoneKind::Contributions => svg::thousands(self.observed),
            MilestoneKind::Stars => format!("{} stars", svg::thousands(self.observed)),
            MilestoneKind::Repos => format!("{} repos", self.observed),
        }
    }
}

/// Threshold ladder for one metric, consumed as values rise.
struct Ladder {
    kind: MilestoneKind,
    remaining: Vec<u64>,
}

impl Ladder {
    fn new(kind: MilestoneKind) -> Self {
        let mut remaining = kind.ladder().to_vec();
        remaining.sort_unstable();
        Self { kind, remaining }
    }

    fn check(&mut self, date: NaiveDate, observed: u64, found: &mut Vec<Milestone>) {
        let kind = self.kind;
        self.remaining.retain(|threshold| {
            if observed >= *threshold {
                found.push(Milestone {
                    date,
                    kind,
                    threshold: *threshold,
                    observed,
                });
                false
            } else {
                true
            }
        });
    }
}

/// First date each contribution, star and repository threshold was met.
///
/// Contribution totals are rebuilt from the highest count ever seen for
/// each year, so a later snapshot reporting less for a year cannot undo a
/// milestone.
pub fn detect(history: &History) -> Vec<Milestone> {
    let mut contributions = Ladder::new(MilestoneKind::Contributions);
    let mut stars = Ladder::new(MilestoneKind::Stars);
    let mut repos = Ladder::new(MilestoneKind::Repos);
    let mut best_by_year: BTreeMap<i32, u64> = BTreeMap::new();
    let mut found = Vec::new();

    for snapshot in history.snapshots() {
        for (year, count) in &snapshot.contributions_by_year {
            let best = best_by_year.entry(*year).or_insert(0);
            *best = (*best).max(*count);
        }
        let total: u64 = best_by_year.values().sum();

        contributions.check(snapshot.date, total, &mut found);
        stars.check(snapshot.date, snapshot.stargazers, &mut found);
        repos.check(snapshot.date, snapshot.repo_count, &mut found);
    }

    let mut seen = HashSet::new();
    found.retain(|milestone| seen.insert(milestone.label()));
    found
}

pub fn render(milestones: &[Milestone], updated: Option<NaiveDate>) -> String {
    let mut out = String::new();
    svg::open(&mut out, WIDTH, HEIGHT);
    let _ = writeln!(
        out,
        r#"<style>
  .ms-title {{ font: bold 28px {FONT}; fill: {TEXT}; }}
  .ms-sub   {{ font: 600 20px {FONT}; fill: {TEXT}; opacity: 0.75; }}
  .ms-label {{ font: bold 22px {FONT}; fill: {TEXT}; }}
  .ms-date  {{ font: 18px {FONT}; fill: {TEXT}; opacity: 0.6; }}
  @keyframes slideIn {{ from {{ opacity: 0; transform: translateX(-8px); }}
                        to   {{ opacity: 1; transform: translateX(0); }} }}
  .ms-row {{ animation: slideIn 0.4s ease forwards; opacity: 0; }}
</style>"#
    );
    svg::card_background(&mut out, WIDTH, HEIGHT);
    let _ = writeln!(out, r#"<text x="20" y="50" class="ms-title">🏆 Milestones</text>"#);
    let _ = writeln!(
        out,
        r#"<text x="20" y="78" class="ms-sub">Achievements automatically detected from activity data</text>"#
    );

    if milestones.is_empty() {
        let _ = writeln!(
            out,
            r#"<text x="20" y="{}" class="ms-date">No milestones detected yet – check back after more activity.</text>"#,
            HEADER_HEIGHT + 45
        );
    } else {
        draw_timeline(&mut out, milestones);
    }

    if let Some(updated) = updated {
        let _ = writeln!(
            out,
            r#"<text x="{}" y="{}" text-anchor="end" class="ms-date">Updated {updated}</text>"#,
            WIDTH - 10,
            HEIGHT - 12
        );
    }
    svg::close(&mut out);
    out
}

fn draw_timeline(out: &mut String, milestones: &[Milestone]) {
    let content_height = HEIGHT - HEADER_HEIGHT - FOOTER_HEIGHT;
    let count = milestones.len() as u32;
    let rows = count.div_ceil(2).max(1);
    let row_height = MAX_ROW_HEIGHT.min(content_height / rows);

    let _ = writeln!(
        out,
        r#"<line x1="{COLUMN_SEPARATOR_X}" y1="{}" x2="{COLUMN_SEPARATOR_X}" y2="{}" stroke="{GRID}" stroke-width="1" opacity="0.5"/>"#,
        HEADER_HEIGHT + 8,
        HEIGHT - FOOTER_HEIGHT - 8
    );
    for (column, timeline_x) in COLUMN_TIMELINE_X.iter().enumerate() {
        let in_column = (count + 1 - column as u32) / 2;
        if in_column == 0 {
            continue;
        }
        let _ = writeln!(
            out,
            r#"<line x1="{timeline_x}" y1="{}" x2="{timeline_x}" y2="{}" stroke="{GRID}" stroke-width="2"/>"#,
            HEADER_HEIGHT + 10,
            HEADER_HEIGHT + in_column * row_height - 10
        );
    }

    for (index, milestone) in milestones.iter().enumerate() {
        let timeline_x = COLUMN_TIMELINE_X[index % 2];
        let text_x = timeline_x + 44;
        let center_y = HEADER_HEIGHT + (index as u32 / 2) * row_height + row_height / 2;
        let color = milestone.kind.color();

        let _ = writeln!(
            out,
            r#"<g class="ms-row" style="animation-delay:{}ms;">"#,
            index * 60
        );
        let _ = writeln!(
            out,
            r#"<circle cx="{timeline_x}" cy="{center_y}" r="12" fill="{color}" opacity="0.85"/>"#
        );
        let _ = writeln!(
            out,
            r#"<line x1="{}" y1="{center_y}" x2="{}" y2="{center_y}" stroke="{color}" stroke-width="2" opacity="0.5"/>"#,
            timeline_x + 12,
            timeline_x + 38
        );
        let _ = writeln!(
            out,
            r#"<text x="{text_x}" y="{}" class="ms-label">{} {}</text>"#,
            center_y - 9,
            milestone.kind.icon(),
            milestone.label()
        );
        let _ = writeln!(
            out,
            r#"<text x="{text_x}" y="{}" class="ms-date">{}  ·  {}</text>"#,
            center_y + 20,
            milestone.date,
            milestone.value()
        );
        out.push_str("</g>\n");
    }
}
