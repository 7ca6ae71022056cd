use anyhow::Result;
use tracing::{debug, info};

use crate::llm::Inference;
use crate::research::payload::strip_reasoning;
use crate::research::prompts;
use crate::state::PipelineConfig;

/// Merge every insight note of a section into one draft with a single
/// call. Returns `None` without calling the model when there are no notes.
///
/// The combined notes are sent whole; keeping them inside the model's
/// context window is the caller's concern.
pub async fn synthesize(
    llm: &dyn Inference,
    config: &PipelineConfig,
    insights: &[String],
    section: &str,
    goal: &str,
) -> Result<Option<String>> {
    let notes: Vec<&str> = insights
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if notes.is_empty() {
        debug!(section, "No insight notes, synthesis skipped");
        return Ok(None);
    }

    let combined = notes.join(prompts::INSIGHT_SEPARATOR);
    info!(section, notes = notes.len(), combined_len = combined.len(), "Synthesizing section");

    let prompt = prompts::synthesis(&combined, section, goal);
    let response = llm.complete(&config.models.writer, &prompt).await?;
    Ok(Some(strip_reasoning(&response)))
}
