use std::io;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;

use crate::models::History;

#[derive(Debug, Serialize)]
struct HistoryRow<'a> {
    date: NaiveDate,
    synthetic: bool,
    stargazers: u64,
    forks: u64,
    repo_count: u64,
    total_contributions: u64,
    lines_added: u64,
    lines_deleted: u64,
    top_language: Option<&'a str>,
    top_language_prop: Option<f64>,
}

/// Writes one CSV row per snapshot and returns the number of rows.
pub fn write_csv<W: io::Write>(history: &History, writer: W) -> anyhow::Result<usize> {
    let mut writer = csv::Writer::from_writer(writer);

    for snapshot in history.snapshots() {
        let top = snapshot.languages_by_size().into_iter().next();
        writer.serialize(HistoryRow {
            date: snapshot.date,
            synthetic: snapshot.synthetic,
            stargazers: snapshot.stargazers,
            forks: snapshot.forks,
            repo_count: snapshot.repo_count,
            total_contributions: snapshot.total_contributions,
            lines_added: snapshot.lines_added,
            lines_deleted: snapshot.lines_deleted,
            top_language: top.map(|(name, _)| name.as_str()),
            top_language_prop: top.map(|(_, stat)| stat.prop),
        })?;
    }

    writer.flush()?;
    Ok(history.len())
}

pub fn export_csv(history: &History, path: &Path) -> anyhow::Result<usize> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    write_csv(history, file).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LanguageStat, Snapshot};

    #[test]
    fn rows_follow_history_order() {
        let mut first = Snapshot::empty(NaiveDate::from_ymd_opt(2024, 1, 28).unwrap());
        first.synthetic = true;
        first.lines_added = 10;
        let mut second = Snapshot::empty(NaiveDate::from_ymd_opt(2024, 2, 3).unwrap());
        second.stargazers = 5;
        second.languages.insert(
            "Rust".to_string(),
            LanguageStat {
                size: 10,
                prop: 100.0,
                color: None,
            },
        );
        let history = History::from_snapshots(vec![second, first]);

        let mut buffer = Vec::new();
        let rows = write_csv(&history, &mut buffer).unwrap();
        assert_eq!(rows, 2);

        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines[0],
            "date,synthetic,stargazers,forks,repo_count,total_contributions,lines_added,lines_deleted,top_language,top_language_prop"
        );
        assert_eq!(lines[1], "2024-01-28,true,0,0,0,0,10,0,,");
        assert_eq!(lines[2], "2024-02-03,false,5,0,0,0,0,0,Rust,100.0");
    }
}
