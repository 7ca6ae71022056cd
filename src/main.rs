mod docs;
mod llm;
mod research;
mod state;
mod writer;

#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use docs::ingest::{gather_evidence, ContentFetcher};
use docs::ReportStore;
use llm::{Inference, LlmClient};
use research::Researcher;
use state::PipelineConfig;
use writer::Writer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Stage {
    /// Retrieve evidence and build learning records.
    Research,
    /// Notes, synthesis, citations and the final report.
    Write,
    All,
}

/// Turn a report directory of scraped evidence into a cited report.
#[derive(Debug, Parser)]
#[command(name = "cited-report", version)]
struct Cli {
    /// Directory holding one subdirectory per report.
    #[arg(long, env = "REPORT_ROOT", default_value = "research")]
    root: PathBuf,

    /// Report to work on. A timestamp id is generated when omitted.
    report_id: Option<String>,

    #[arg(value_enum, default_value_t = Stage::All)]
    stage: Stage,

    /// Write goal.txt before running.
    #[arg(long)]
    goal: Option<String>,

    /// Write structure.txt before running, one section per value.
    #[arg(long = "section")]
    sections: Vec<String>,
}

/// `RUST_LOG` from the process or `.env`, else `info`.
fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load env first so RUST_LOG from .env reaches the filter
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let report_id = cli
        .report_id
        .clone()
        .unwrap_or_else(|| docs::generate_report_id(chrono::Local::now()));
    let store = ReportStore::new(&cli.root, &report_id);
    info!(report = %store.report_dir().display(), stage = ?cli.stage, "Starting report run");

    if let Some(goal) = &cli.goal {
        store.save_goal_and_structure(goal, &cli.sections).await?;
        info!(sections = cli.sections.len(), "Goal and structure written");
    } else if !cli.sections.is_empty() {
        warn!("--section given without --goal, ignored");
    }

    let config = Arc::new(PipelineConfig::from_env());
    let llm: Arc<dyn Inference> = Arc::new(LlmClient::from_env()?);
    info!(
        classification = %config.models.classification,
        inference = %config.models.inference,
        writer = %config.models.writer,
        "LLM client initialized"
    );

    if matches!(cli.stage, Stage::Research | Stage::All) {
        let mut arena = store.load_arena().await?;
        let fetcher = ContentFetcher::new()?;
        for name in arena.section_names() {
            if let Err(e) = gather_evidence(&fetcher, &store, &name, config.fetch_concurrency).await {
                warn!(section = %name, error = %e, "Evidence gathering failed");
            }
        }
        // pick up whatever was just fetched
        arena = store.load_arena().await?;
        Researcher::new(llm.clone(), config.clone()).run(&store, &mut arena).await;
    }

    if matches!(cli.stage, Stage::Write | Stage::All) {
        let mut arena = store.load_arena().await?;
        let path = Writer::new(llm, config).run(&store, &mut arena).await?;
        println!("{}", path.display());
    }

    Ok(())
}
