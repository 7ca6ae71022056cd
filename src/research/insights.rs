use anyhow::Result;
use tracing::debug;

use super::payload::strip_reasoning;
use super::prompts;
use crate::llm::Inference;
use crate::state::PipelineConfig;

/// One technical analysis of a document for a section. No retry: errors
/// go back to the caller, which decides how to degrade.
pub async fn summarize(
    llm: &dyn Inference,
    config: &PipelineConfig,
    content: &str,
    section: &str,
) -> Result<String> {
    let prompt = prompts::insight(prompts::prefix(content, config.insight_prefix_chars), section);
    let response = llm.complete(&config.models.inference, &prompt).await?;
    let insight = strip_reasoning(&response);
    debug!(section, insight_len = insight.len(), "Insight generated");
    Ok(insight)
}
