use std::collections::HashMap;

use tracing::warn;

use super::types::{
    EvidenceDocument, InsightNote, LearningRecord, SectionDraft, SourceId, SourcedQuote,
};

/// Everything tracked for one report section.
#[derive(Debug, Clone, Default)]
pub struct SectionState {
    pub name: String,
    pub evidence: Vec<EvidenceDocument>,
    pub learnings: Vec<LearningRecord>,
    pub notes: Vec<InsightNote>,
    /// Uncited synthesis.
    pub gist: Option<String>,
    pub draft: Option<SectionDraft>,
}

impl SectionState {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Validated quotes offered for citation, in record order then quote order.
    pub fn quote_pool(&self) -> Vec<SourcedQuote> {
        self.learnings
            .iter()
            .flat_map(|record| {
                record.validated_quotes().map(move |q| SourcedQuote {
                    quote: q.text.clone(),
                    source_id: record.meta.source_id.clone(),
                    source_title: record.meta.title.clone(),
                    source_url: record.meta.url.clone(),
                })
            })
            .collect()
    }

    /// Replace the record for a document, or add it.
    pub fn upsert_learning(&mut self, record: LearningRecord) {
        match self.learnings.iter_mut().find(|r| r.doc_id == record.doc_id) {
            Some(existing) => *existing = record,
            None => self.learnings.push(record),
        }
    }

    /// Forget everything derived from a document.
    pub fn forget_document(&mut self, doc_id: &str) {
        self.learnings.retain(|r| r.doc_id != doc_id);
        self.notes.retain(|n| n.doc_id != doc_id);
    }

    pub fn upsert_note(&mut self, note: InsightNote) {
        match self.notes.iter_mut().find(|n| n.doc_id == note.doc_id) {
            Some(existing) => *existing = note,
            None => self.notes.push(note),
        }
    }
}

/// Title and url for a cited source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceEntry {
    pub title: String,
    pub url: String,
}

/// All sections of one report, in declared order.
#[derive(Debug, Clone, Default)]
pub struct ReportArena {
    pub goal: String,
    pub sections: Vec<SectionState>,
}

impl ReportArena {
    pub fn new(goal: &str, structure: &[String]) -> Self {
        Self {
            goal: goal.to_string(),
            sections: structure.iter().map(|s| SectionState::new(s)).collect(),
        }
    }

    pub fn section_names(&self) -> Vec<String> {
        self.sections.iter().map(|s| s.name.clone()).collect()
    }

    /// Source table across the whole report. The id is recomputed from each
    /// record's title; on a collision the first record seen wins.
    pub fn source_table(&self) -> HashMap<SourceId, SourceEntry> {
        let mut table: HashMap<SourceId, SourceEntry> = HashMap::new();
        for section in &self.sections {
            for record in &section.learnings {
                let id = SourceId::from_title(&record.meta.title);
                match table.get(&id) {
                    Some(existing) if existing.url != record.meta.url => {
                        warn!(
                            source_id = %id,
                            title = %record.meta.title,
                            kept_url = %existing.url,
                            dropped_url = %record.meta.url,
                            "Source id collision: distinct documents share a title"
                        );
                    }
                    Some(_) => {}
                    None => {
                        table.insert(
                            id,
                            SourceEntry {
                                title: record.meta.title.clone(),
                                url: record.meta.url.clone(),
                            },
                        );
                    }
                }
            }
        }
        table
    }
}
