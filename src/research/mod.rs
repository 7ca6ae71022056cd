pub mod chunker;
pub mod insights;
pub mod payload;
pub mod prompts;
pub mod quotes;
pub mod relevance;

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::docs::arena::{ReportArena, SectionState};
use crate::docs::types::{EvidenceDocument, LearningRecord, SourceMeta};
use crate::docs::ReportStore;
use crate::llm::Inference;
use crate::state::PipelineConfig;

/// Counts for one section's evidence pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SectionOutcome {
    pub accepted: usize,
    pub rejected: usize,
    pub failed: usize,
}

/// Evidence side of the pipeline: relevance, chunking, quotes, insight.
pub struct Researcher {
    llm: Arc<dyn Inference>,
    config: Arc<PipelineConfig>,
}

impl Researcher {
    pub fn new(llm: Arc<dyn Inference>, config: Arc<PipelineConfig>) -> Self {
        Self { llm, config }
    }

    /// Sections strictly in declared order.
    pub async fn run(&self, store: &ReportStore, arena: &mut ReportArena) {
        let goal = arena.goal.clone();
        for section in arena.sections.iter_mut() {
            info!(section = %section.name, documents = section.evidence.len(), "Processing section evidence");
            let outcome = self.process_section(store, section, &goal).await;
            info!(
                section = %section.name,
                accepted = outcome.accepted,
                rejected = outcome.rejected,
                failed = outcome.failed,
                "Section evidence complete"
            );
        }
    }

    /// Documents one after another; a failing document never stops its
    /// siblings.
    pub async fn process_section(&self, store: &ReportStore, section: &mut SectionState, goal: &str) -> SectionOutcome {
        let mut outcome = SectionOutcome::default();
        let evidence = section.evidence.clone();

        for doc in &evidence {
            match self.interpret_document(store, doc, &section.name, goal).await {
                Ok(Some(record)) => {
                    outcome.accepted += 1;
                    section.upsert_learning(record);
                }
                Ok(None) => {
                    outcome.rejected += 1;
                    section.forget_document(&doc.id);
                }
                Err(e) => {
                    outcome.failed += 1;
                    warn!(section = %section.name, doc_id = %doc.id, error = %e, "Document processing failed");
                }
            }
        }

        outcome
    }

    /// Returns `None` when the relevance gate rejects the document. Nothing
    /// is written then, and any record or note left by an earlier run is
    /// removed.
    pub async fn interpret_document(
        &self,
        store: &ReportStore,
        doc: &EvidenceDocument,
        section: &str,
        goal: &str,
    ) -> Result<Option<LearningRecord>> {
        let llm = self.llm.as_ref();
        let config = self.config.as_ref();

        let verdict = relevance::assess(llm, config, &doc.raw_text, section, goal).await;
        if !verdict.accepts(config.relevance_threshold) {
            warn!(
                section,
                doc_id = %doc.id,
                confidence = verdict.confidence,
                reason = %verdict.reason,
                "Skipped irrelevant content"
            );
            store.remove_document_artifacts(section, &doc.id).await?;
            return Ok(None);
        }

        info!(section, doc_id = %doc.id, confidence = verdict.confidence, "Content is relevant");
        let mut record = LearningRecord::open(&doc.id, SourceMeta::new(&doc.title, &doc.url, &verdict));
        store.write_learning(section, &record).await?;

        let chunks = chunker::chunk_text(&doc.raw_text, config.chunk_size, config.chunk_overlap);
        let total = chunks.len();
        for (i, chunk) in chunks.iter().enumerate() {
            let progress = format!("{} of {}", i + 1, total);
            let found = quotes::extract(llm, config, &chunk.text, section, goal, &progress).await;
            if found.is_empty() {
                continue;
            }
            record.append_quotes(found);
            store.write_learning(section, &record).await?;
        }

        let insight = match insights::summarize(llm, config, &doc.raw_text, section).await {
            Ok(text) => text,
            Err(e) => {
                warn!(section, doc_id = %doc.id, error = %e, "Insight generation failed, leaving it empty");
                String::new()
            }
        };
        record.close(insight);
        store.write_learning(section, &record).await?;

        info!(section, doc_id = %doc.id, quotes = record.quotes.len(), "Learning record complete");
        Ok(Some(record))
    }
}
