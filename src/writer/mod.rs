pub mod citations;
pub mod report;
pub mod synthesis;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::docs::arena::{ReportArena, SectionState};
use crate::docs::format::render_learning_record;
use crate::docs::types::{InsightNote, SectionDraft};
use crate::docs::ReportStore;
use crate::llm::Inference;
use crate::research::insights;
use crate::state::PipelineConfig;

/// Writing side of the pipeline. Four passes, each over every section in
/// declared order: insight notes, synthesis, quote integration, final
/// assembly. Per-section failures are logged and the section moves on
/// with whatever it has.
pub struct Writer {
    llm: Arc<dyn Inference>,
    config: Arc<PipelineConfig>,
}

impl Writer {
    pub fn new(llm: Arc<dyn Inference>, config: Arc<PipelineConfig>) -> Self {
        Self { llm, config }
    }

    /// Run all passes and write the final report. Only a failure to write
    /// the report itself is returned.
    pub async fn run(&self, store: &ReportStore, arena: &mut ReportArena) -> Result<PathBuf> {
        let goal = arena.goal.clone();
        for section in arena.sections.iter_mut() {
            self.insights_pass(store, section).await;
        }
        for section in arena.sections.iter_mut() {
            self.synthesis_pass(store, section, &goal).await;
        }
        for section in arena.sections.iter_mut() {
            self.quotes_pass(store, section).await;
        }
        self.final_pass(store, arena).await
    }

    /// One note per learning record. The insight from research is reused
    /// when present; otherwise the rendered record is summarized.
    pub async fn insights_pass(&self, store: &ReportStore, section: &mut SectionState) {
        let records = section.learnings.clone();
        for record in &records {
            let text = match record.insight.as_deref().map(str::trim) {
                Some(insight) if !insight.is_empty() => insight.to_string(),
                _ => {
                    let rendered = render_learning_record(record);
                    match insights::summarize(self.llm.as_ref(), &self.config, &rendered, &section.name).await {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(section = %section.name, doc_id = %record.doc_id, error = %e, "Insight note failed");
                            continue;
                        }
                    }
                }
            };

            let note = InsightNote {
                doc_id: record.doc_id.clone(),
                text,
            };
            if let Err(e) = store.write_note(&section.name, &note).await {
                warn!(section = %section.name, doc_id = %note.doc_id, error = %e, "Failed to write insight note");
            }
            section.upsert_note(note);
        }
        info!(section = %section.name, notes = section.notes.len(), "Insight notes ready");
    }

    pub async fn synthesis_pass(&self, store: &ReportStore, section: &mut SectionState, goal: &str) {
        let notes: Vec<String> = section.notes.iter().map(|n| n.text.clone()).collect();
        let gist = match synthesis::synthesize(self.llm.as_ref(), &self.config, &notes, &section.name, goal).await {
            Ok(Some(gist)) => gist,
            Ok(None) => {
                info!(section = %section.name, "No notes to synthesize, section skipped");
                self.discard_drafts(store, section).await;
                return;
            }
            Err(e) => {
                warn!(section = %section.name, error = %e, "Synthesis failed");
                self.discard_drafts(store, section).await;
                return;
            }
        };

        if let Err(e) = store.write_gist(&section.name, &gist).await {
            warn!(section = %section.name, error = %e, "Failed to write section gist");
        }
        section.gist = Some(gist);
    }

    /// Weave the section's validated quotes into its gist. If the
    /// integration call fails the uncited gist is kept so the section still
    /// reaches the report.
    pub async fn quotes_pass(&self, store: &ReportStore, section: &mut SectionState) {
        let Some(gist) = section.gist.clone() else {
            self.discard_drafts(store, section).await;
            return;
        };
        let pool = section.quote_pool();

        let text = match citations::integrate(self.llm.as_ref(), &self.config, &gist, &pool).await {
            Ok(text) => text,
            Err(e) => {
                warn!(section = %section.name, error = %e, "Quote integration failed, keeping uncited draft");
                citations::append_sources(&gist, &[])
            }
        };

        let draft = SectionDraft {
            section: section.name.clone(),
            text,
        };
        if let Err(e) = store.write_draft(&draft).await {
            warn!(section = %section.name, error = %e, "Failed to write section draft");
        }
        section.draft = Some(draft);
    }

    /// A section with no fresh gist must not keep one from an earlier run.
    async fn discard_drafts(&self, store: &ReportStore, section: &mut SectionState) {
        section.gist = None;
        section.draft = None;
        if let Err(e) = store.remove_section_drafts(&section.name).await {
            warn!(section = %section.name, error = %e, "Failed to remove stale drafts");
        }
    }

    pub async fn final_pass(&self, store: &ReportStore, arena: &ReportArena) -> Result<PathBuf> {
        let report = report::assemble(arena);
        let path = store.write_final_report(&report).await?;
        info!(path = %path.display(), "Final report written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docs::types::{LearningRecord, Quote, RelevanceVerdict, SourceId, SourceMeta};
    use crate::research::Researcher;
    use crate::testing::{scratch_dir, ScriptedInference};
    use std::time::Duration;

    const RELEVANCE: &str = "Analyze whether the source contains information relevant";
    const QUOTES: &str = "Extract relevant DIRECT quotes";
    const INSIGHT: &str = "Provide a detailed technical analysis";
    const SYNTHESIS: &str = "Synthesize these individual analyses";
    const INTEGRATE: &str = "Re-write the given Content to integrate the Quotes";

    fn config() -> Arc<PipelineConfig> {
        Arc::new(PipelineConfig {
            quote_retry_backoff: Duration::ZERO,
            ..PipelineConfig::default()
        })
    }

    fn record(doc_id: &str, title: &str, insight: Option<&str>, quotes: &[&str]) -> LearningRecord {
        let verdict = RelevanceVerdict {
            is_relevant: true,
            confidence: 0.9,
            reason: "r".to_string(),
        };
        let mut r = LearningRecord::open(doc_id, SourceMeta::new(title, &format!("https://{}", doc_id), &verdict));
        r.append_quotes(quotes.iter().map(|q| Quote {
            text: q.to_string(),
            validated: true,
        }));
        if let Some(text) = insight {
            r.close(text.to_string());
        }
        r
    }

    #[tokio::test]
    async fn test_end_to_end_single_section() {
        let q3 = SourceId::from_title("Q3 Report");
        let outlook = SourceId::from_title("Outlook");
        let integrated = format!("Growth was strong: \"Revenue grew 40%.\" [src: {}]", q3);
        let llm = Arc::new(
            ScriptedInference::new()
                .on(&[RELEVANCE], "{\"is_relevant\": true, \"confidence\": 0.9, \"reason\": \"on topic\"}")
                .on(&[QUOTES, "Revenue grew"], "```json\n{\"quotes\": [\"Revenue grew 40%.\"]}\n```")
                .on(&[QUOTES], "```json\n{\"quotes\": []}\n```")
                .on(&[INSIGHT, "Revenue grew"], "Revenue is accelerating.")
                .on(&[INSIGHT], "Demand looks durable.")
                .on(&[SYNTHESIS], "Growth was strong.")
                .on(&[INTEGRATE], &integrated),
        );

        let store = ReportStore::new(&scratch_dir("e2e"), "r1");
        store
            .save_goal_and_structure("Understand revenue", &["Market".to_string()])
            .await
            .unwrap();
        store
            .write_evidence("Market", "01-Q3 Report", "Q3 Report", "https://q3", "In Q3 Revenue grew 40%. Margins held.")
            .await
            .unwrap();
        store
            .write_evidence("Market", "02-Outlook", "Outlook", "https://outlook", "Customers keep renewing their contracts.")
            .await
            .unwrap();

        let mut arena = store.load_arena().await.unwrap();
        Researcher::new(llm.clone(), config()).run(&store, &mut arena).await;
        let mut arena = store.load_arena().await.unwrap();
        assert_eq!(arena.sections[0].learnings.len(), 2);

        let path = Writer::new(llm.clone(), config()).run(&store, &mut arena).await.unwrap();
        let report = std::fs::read_to_string(path).unwrap();

        let synthesis_prompt = llm
            .calls()
            .into_iter()
            .find(|c| c.prompt.contains(SYNTHESIS))
            .unwrap()
            .prompt;
        assert!(synthesis_prompt.contains("Revenue is accelerating.\n\n===\n\nDemand looks durable."));

        assert_eq!(report.matches("# Market").count(), 1);
        assert!(report.starts_with("# Market\n\nGrowth was strong: \"Revenue grew 40%.\""));
        let (_, sources) = report.split_once("## Sources\n\n").unwrap();
        assert_eq!(sources, format!("- [{}] Q3 Report - https://q3\n", q3));
        assert!(!report.contains(outlook.as_str()));

        // research insights are reused, not regenerated
        assert_eq!(llm.calls_matching(INSIGHT), 2);
        assert!(store.section_dir("Market").join("section_gist.txt").exists());
        assert!(store.section_dir("Market").join("draft.txt").exists());
    }

    #[tokio::test]
    async fn test_failed_resynthesis_drops_stale_draft() {
        let store = ReportStore::new(&scratch_dir("stale-gist"), "r1");
        let mut arena = ReportArena::new("goal", &["Market".to_string()]);
        arena.sections[0].learnings.push(record("01-a", "A", Some("Note."), &[]));

        let first = Arc::new(ScriptedInference::new().on(&[SYNTHESIS], "OLD GIST."));
        Writer::new(first, config()).run(&store, &mut arena.clone()).await.unwrap();
        assert!(store.section_dir("Market").join("draft.txt").exists());

        let second = Arc::new(ScriptedInference::new().fail_on(&[SYNTHESIS], "timeout"));
        let mut arena = ReportArena::new("goal", &["Market".to_string()]);
        arena.sections[0].learnings.push(record("01-a", "A", Some("Note."), &[]));
        arena.sections[0].gist = Some("OLD GIST.".to_string());
        arena.sections[0].draft = Some(SectionDraft {
            section: "Market".to_string(),
            text: "OLD GIST.\n\nSources:\nNo sources cited.\n".to_string(),
        });
        let path = Writer::new(second, config()).run(&store, &mut arena).await.unwrap();

        let report = std::fs::read_to_string(path).unwrap();
        assert!(!report.contains("OLD GIST."));
        assert!(arena.sections[0].gist.is_none());
        assert!(arena.sections[0].draft.is_none());
        assert!(!store.section_dir("Market").join("section_gist.txt").exists());
        assert!(!store.section_dir("Market").join("draft.txt").exists());
    }

    #[tokio::test]
    async fn test_missing_insight_is_summarized_from_record() {
        let llm = Arc::new(ScriptedInference::new().on(&[INSIGHT], "Recovered note."));
        let store = ReportStore::new(&scratch_dir("notes"), "r1");
        let writer = Writer::new(llm.clone(), config());

        let mut section = SectionState::new("Market");
        section.learnings.push(record("01-a", "A", Some("Kept note."), &[]));
        section.learnings.push(record("02-b", "B", None, &["Quoted line."]));
        writer.insights_pass(&store, &mut section).await;

        let texts: Vec<_> = section.notes.iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, vec!["Kept note.", "Recovered note."]);
        assert_eq!(llm.calls_matching(INSIGHT), 1);
        assert!(llm.calls()[0].prompt.contains("> Quoted line."));
        assert_eq!(store.load_notes("Market").await.len(), 2);
    }

    #[tokio::test]
    async fn test_section_without_quotes_gets_no_sources_block() {
        let llm = Arc::new(ScriptedInference::new().on(&[SYNTHESIS], "Plain gist."));
        let store = ReportStore::new(&scratch_dir("no-quotes"), "r1");
        let writer = Writer::new(llm.clone(), config());

        let mut arena = ReportArena::new("goal", &["Market".to_string(), "Empty".to_string()]);
        arena.sections[0].learnings.push(record("01-a", "A", Some("Note."), &[]));
        let path = writer.run(&store, &mut arena).await.unwrap();

        assert_eq!(
            arena.sections[0].draft.as_ref().map(|d| d.text.as_str()),
            Some("Plain gist.\n\nSources:\nNo sources cited.\n")
        );
        assert!(arena.sections[1].draft.is_none());
        assert_eq!(llm.calls_matching(INTEGRATE), 0);

        let report = std::fs::read_to_string(path).unwrap();
        assert_eq!(report, "# Market\n\nPlain gist.\n\n## Sources\n\n");
    }

    #[tokio::test]
    async fn test_integration_failure_keeps_uncited_section() {
        let llm = Arc::new(
            ScriptedInference::new()
                .on(&[SYNTHESIS], "Gist text.")
                .fail_on(&[INTEGRATE], "writer down"),
        );
        let store = ReportStore::new(&scratch_dir("integrate-fail"), "r1");
        let writer = Writer::new(llm, config());

        let mut arena = ReportArena::new("goal", &["Market".to_string()]);
        arena.sections[0].learnings.push(record("01-a", "A", Some("Note."), &["Quoted."]));
        let path = writer.run(&store, &mut arena).await.unwrap();

        let report = std::fs::read_to_string(path).unwrap();
        assert!(report.starts_with("# Market\n\nGist text."));
        assert!(report.ends_with("## Sources\n\n"));
    }

    #[tokio::test]
    async fn test_synthesis_failure_drops_section_only() {
        let llm = Arc::new(
            ScriptedInference::new()
                .on(&[SYNTHESIS, "Good note"], "Good gist.")
                .fail_on(&[SYNTHESIS], "timeout"),
        );
        let store = ReportStore::new(&scratch_dir("synth-fail"), "r1");
        let writer = Writer::new(llm, config());

        let mut arena = ReportArena::new("goal", &["Broken".to_string(), "Fine".to_string()]);
        arena.sections[0].learnings.push(record("01-a", "A", Some("Bad note."), &[]));
        arena.sections[1].learnings.push(record("01-b", "B", Some("Good note."), &[]));
        let path = writer.run(&store, &mut arena).await.unwrap();

        let report = std::fs::read_to_string(path).unwrap();
        assert!(!report.contains("# Broken"));
        assert!(report.starts_with("# Fine\n\nGood gist."));
    }
}
