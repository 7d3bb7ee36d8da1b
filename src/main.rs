use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::info;

mod achievements;
mod backfill;
mod badges;
mod chart;
mod export;
mod milestones;
mod models;
mod pipeline;
mod source;
mod store;
mod svg;
mod trend;

use source::{JsonSnapshotSource, SnapshotSource};
use store::{SnapshotStore, Verdict};

#[derive(Parser)]
#[command(name = "activity-history-badges")]
#[command(about = "Snapshot history, trend forecast and badge renderer for GitHub activity", long_about = None)]
struct Cli {
    /// Snapshot history file
    #[arg(long, global = true, env = "HISTORY_FILE", default_value = "generated/history.json")]
    history: PathBuf,
    /// Directory receiving the rendered images
    #[arg(long, global = true, env = "OUTPUT_DIR", default_value = "generated")]
    out_dir: PathBuf,
    /// Languages to leave out of snapshots, comma separated
    #[arg(long, global = true, env = "EXCLUDED_LANGS", value_delimiter = ',')]
    exclude_langs: Vec<String>,
    /// Display name for the overview badge
    #[arg(long, global = true, env = "GITHUB_ACTOR", default_value = "GitHub")]
    name: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a new snapshot and render every image
    Record {
        #[arg(long)]
        snapshot: PathBuf,
    },
    /// Render images from the stored history only
    Render,
    /// Validate a snapshot against the stored history without saving
    Check {
        #[arg(long)]
        snapshot: PathBuf,
    },
    /// Export the stored history to a CSV file
    Export {
        #[arg(long)]
        csv: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let store = SnapshotStore::new(&cli.history);

    match cli.command {
        Commands::Record { snapshot } => {
            let current = JsonSnapshotSource::new(snapshot)
                .excluding_languages(&cli.exclude_langs)
                .materialize()
                .await?;
            let (history, outcome) = pipeline::record(&store, current)?;
            if outcome.backfilled > 0 {
                println!("Backfilled {} monthly snapshots.", outcome.backfilled);
            }
            match &outcome.verdict {
                Verdict::Accepted { .. } => println!("Snapshot stored ({}).", outcome.verdict.reason()),
                Verdict::Rejected { previous_date, .. } => println!(
                    "Snapshot rejected ({}); kept data from {previous_date}.",
                    outcome.verdict.reason()
                ),
            }
            println!(
                "History holds {} snapshots at {}.",
                outcome.snapshots,
                store.path().display()
            );
            let written = pipeline::render_all(&history, &cli.out_dir, &cli.name)?;
            println!("Rendered {} images to {}.", written.len(), cli.out_dir.display());
        }
        Commands::Render => {
            let history = store.load();
            info!("loaded {} snapshots", history.len());
            let written = pipeline::render_all(&history, &cli.out_dir, &cli.name)?;
            println!("Rendered {} images to {}.", written.len(), cli.out_dir.display());
        }
        Commands::Check { snapshot } => {
            let current = JsonSnapshotSource::new(snapshot)
                .excluding_languages(&cli.exclude_langs)
                .materialize()
                .await?;
            let verdict = pipeline::check(&store, &current);
            if verdict.is_accepted() {
                println!("Snapshot for {} would be accepted.", current.date);
            } else {
                println!(
                    "Snapshot for {} would be rejected: {}",
                    current.date,
                    verdict.reason()
                );
            }
        }
        Commands::Export { csv } => {
            let history = store.load();
            let rows = export::export_csv(&history, &csv)?;
            println!("Exported {rows} snapshots to {}.", csv.display());
        }
    }

    Ok(())
}
