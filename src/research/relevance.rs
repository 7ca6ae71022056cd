use tracing::{debug, warn};

use super::payload::parse_payload;
use super::prompts;
use crate::docs::types::RelevanceVerdict;
use crate::llm::Inference;
use crate::state::PipelineConfig;

/// Ask whether a document helps the section goal. Never fails: any call or
/// parse error yields a rejecting verdict with a diagnostic reason.
pub async fn assess(
    llm: &dyn Inference,
    config: &PipelineConfig,
    content: &str,
    section: &str,
    goal: &str,
) -> RelevanceVerdict {
    let prompt = prompts::relevance(
        prompts::prefix(content, config.relevance_prefix_chars),
        section,
        goal,
    );

    let response = match llm.complete(&config.models.classification, &prompt).await {
        Ok(r) => r,
        Err(e) => {
            warn!(section, error = %e, "Relevance call failed");
            return RelevanceVerdict::rejected(format!("Relevance call failed: {}", e));
        }
    };

    match parse_payload::<RelevanceVerdict>(&response) {
        Ok(mut verdict) => {
            verdict.confidence = verdict.confidence.clamp(0.0, 1.0);
            debug!(
                section,
                is_relevant = verdict.is_relevant,
                confidence = verdict.confidence,
                "Relevance verdict"
            );
            verdict
        }
        Err(e) => {
            warn!(section, error = %e, "Relevance verdict unparseable");
            RelevanceVerdict::rejected(format!("Failed to generate valid relevance check: {}", e))
        }
    }
}
