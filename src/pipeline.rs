use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::{info, warn};

use crate::models::{History, Snapshot};
use crate::store::{self, SnapshotStore, Verdict};
use crate::{achievements, backfill, badges, chart, milestones, trend};

#[derive(Debug, Clone, PartialEq)]
pub struct RecordOutcome {
    pub backfilled: usize,
    pub verdict: Verdict,
    pub snapshots: usize,
}

fn backfill_if_empty(history: &mut History, current: &Snapshot) -> usize {
    if !history.is_empty() {
        return 0;
    }
    let synthetic = backfill::synthesize(current, &history.dates());
    let backfilled = synthetic.len();
    history.extend(synthetic);
    backfilled
}

/// Loads the history, backfills it on first use, validates and stores the
/// current snapshot, and persists the result. A rejected snapshot is logged
/// and leaves the stored history as it was.
pub fn record(store: &SnapshotStore, current: Snapshot) -> anyhow::Result<(History, RecordOutcome)> {
    let mut history = store.load();

    let backfilled = backfill_if_empty(&mut history, &current);
    if backfilled > 0 {
        info!("first run: backfilled {backfilled} monthly snapshots from weekly data");
    }

    let date = current.date;
    let verdict = store::upsert(&mut history, current);
    match &verdict {
        Verdict::Accepted { replaced, .. } => {
            info!(
                "snapshot for {date} accepted ({}){}",
                verdict.reason(),
                if *replaced { ", replacing same-day entry" } else { "" }
            );
        }
        Verdict::Rejected {
            rejection,
            previous_date,
        } => {
            warn!("snapshot for {date} rejected: {rejection}");
            warn!("keeping previous valid snapshot from {previous_date}");
        }
    }

    store.save(&history)?;
    let snapshots = history.len();
    Ok((
        history,
        RecordOutcome {
            backfilled,
            verdict,
            snapshots,
        },
    ))
}

/// Verdict `record` would reach for `current`, without writing anything.
pub fn check(store: &SnapshotStore, current: &Snapshot) -> Verdict {
    let mut history = store.load();
    backfill_if_empty(&mut history, current);
    store::upsert(&mut history, current.clone())
}

fn write_artifact(out_dir: &Path, name: &str, contents: &str) -> anyhow::Result<PathBuf> {
    let path = out_dir.join(name);
    fs::write(&path, contents).with_context(|| format!("failed to write {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(path)
}

/// Renders every image derived from `history` into `out_dir`.
pub fn render_all(history: &History, out_dir: &Path, name: &str) -> anyhow::Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let mut written = Vec::new();
    let latest = history.latest_real();
    let updated = latest.map(|snapshot| snapshot.date);

    if let Some(latest) = latest {
        written.push(write_artifact(
            out_dir,
            "overview.svg",
            &badges::render_overview(name, latest),
        )?);
        written.push(write_artifact(
            out_dir,
            "languages.svg",
            &badges::render_languages(latest),
        )?);
    }

    let projection = trend::project(history);
    if projection.real_len() < 2 {
        warn!("not enough data points for the history chart yet");
    }
    written.push(write_artifact(
        out_dir,
        "history.svg",
        &chart::render(history, &projection),
    )?);
    written.push(write_artifact(
        out_dir,
        "milestones.svg",
        &milestones::render(&milestones::detect(history), updated),
    )?);
    written.push(write_artifact(
        out_dir,
        "achievements.svg",
        &achievements::render(&achievements::detect(history), updated),
    )?);

    Ok(written)
}
