use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;

use anyhow::Context;
use log::debug;

use crate::models::Snapshot;

/// Produces the fully populated snapshot for the current run.
pub trait SnapshotSource {
    fn materialize(&self) -> impl Future<Output = anyhow::Result<Snapshot>> + Send;
}

/// Reads a snapshot written by the stats fetcher as a JSON document.
#[derive(Debug, Clone)]
pub struct JsonSnapshotSource {
    path: PathBuf,
    excluded_languages: HashSet<String>,
}

impl JsonSnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            excluded_languages: HashSet::new(),
        }
    }

    /// Languages to drop, matched case-insensitively.
    pub fn excluding_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.excluded_languages = languages
            .into_iter()
            .map(|name| name.as_ref().trim().to_lowercase())
            .filter(|name| !name.is_empty())
            .collect();
        self
    }
}

impl SnapshotSource for JsonSnapshotSource {
    async fn materialize(&self) -> anyhow::Result<Snapshot> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read snapshot {}", self.path.display()))?;
        let mut snapshot: Snapshot = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse snapshot {}", self.path.display()))?;

        if !self.excluded_languages.is_empty() {
            exclude_languages(&mut snapshot, &self.excluded_languages);
        }
        debug!(
            "materialized snapshot for {} with {} languages",
            snapshot.date,
            snapshot.languages.len()
        );
        Ok(snapshot)
    }
}

/// Removes excluded languages and recomputes the remaining proportions from
/// their byte sizes.
fn exclude_languages(snapshot: &mut Snapshot, excluded: &HashSet<String>) {
    snapshot
        .languages
        .retain(|name, _| !excluded.contains(&name.to_lowercase()));

    let total: u64 = snapshot.languages.values().map(|stat| stat.size).sum();
    if total == 0 {
        return;
    }
    for stat in snapshot.languages.values_mut() {
        stat.prop = stat.size as f64 / total as f64 * 100.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r##"{
        "date": "2024-05-01",
        "stargazers": 3,
        "lines_added": 100,
        "lines_deleted": 20,
        "languages": {
            "Rust": {"size": 600, "prop": 60.0, "color": "#dea584"},
            "HTML": {"size": 300, "prop": 30.0, "color": null},
            "Python": {"size": 100, "prop": 10.0, "color": "#3572A5"}
        },
        "contributions_by_year": {"2024": 42},
        "lines_changed_by_week": {"2024-04-29": [100, 20]}
    }"##;

    #[tokio::test]
    async fn reads_snapshot_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, SNAPSHOT).unwrap();

        let snapshot = JsonSnapshotSource::new(&path).materialize().await.unwrap();
        assert_eq!(snapshot.stargazers, 3);
        assert_eq!(snapshot.languages.len(), 3);
        assert_eq!(snapshot.contributions_by_year[&2024], 42);
        assert_eq!(snapshot.lines_changed_by_week.len(), 1);
        assert!(!snapshot.synthetic);
    }

    #[tokio::test]
    async fn excluded_languages_are_dropped_and_renormalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, SNAPSHOT).unwrap();

        let snapshot = JsonSnapshotSource::new(&path)
            .excluding_languages(["html ", ""])
            .materialize()
            .await
            .unwrap();
        assert!(!snapshot.languages.contains_key("HTML"));
        assert!((snapshot.languages["Rust"].prop - 85.714_285).abs() < 1e-4);
        let total: f64 = snapshot.languages.values().map(|stat| stat.prop).sum();
        assert!((total - 100.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = JsonSnapshotSource::new(dir.path().join("absent.json"))
            .materialize()
            .await;
        assert!(result.is_err());
    }
}
