use std::fmt;

use serde::{Deserialize, Serialize};

/// Evidence document id: the evidence file stem, e.g. `03-Quarterly Results`.
pub type DocId = String;

/// Number of hex chars kept from the title digest.
const SOURCE_ID_LEN: usize = 15;

/// Citation key for a source. Derived from the title only, so it is stable
/// across runs and across sections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(String);

impl SourceId {
    pub fn from_title(title: &str) -> Self {
        let hex = blake3::hash(title.as_bytes()).to_hex();
        Self(hex[..SOURCE_ID_LEN].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.trim().to_string())
    }
}

/// A scraped document assigned to a section. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct EvidenceDocument {
    pub id: DocId,
    pub title: String,
    pub url: String,
    pub raw_text: String,
    /// Front-matter lines as found in the evidence file (without fences).
    pub metadata_header: String,
}

/// Structured verdict returned by the relevance filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceVerdict {
    pub is_relevant: bool,
    pub confidence: f64,
    pub reason: String,
}

impl RelevanceVerdict {
    /// Fail-closed verdict used whenever the model output cannot be trusted.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            is_relevant: false,
            confidence: 0.0,
            reason: reason.into(),
        }
    }

    /// Gate for all downstream processing of a document.
    pub fn accepts(&self, threshold: f64) -> bool {
        self.is_relevant && self.confidence > threshold
    }
}

/// A candidate quote. `validated` means it literally occurs in its chunk
/// (whitespace-insensitive); unvalidated quotes are kept as paraphrase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub text: String,
    pub validated: bool,
}

/// Metadata block at the head of a learning record.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMeta {
    pub title: String,
    pub url: String,
    pub source_id: SourceId,
    pub relevance_score: f64,
    pub relevance_reason: String,
}

impl SourceMeta {
    pub fn new(title: &str, url: &str, verdict: &RelevanceVerdict) -> Self {
        Self {
            title: title.to_string(),
            url: url.to_string(),
            source_id: SourceId::from_title(title),
            relevance_score: verdict.confidence,
            relevance_reason: verdict.reason.clone(),
        }
    }
}

/// Durable per-document artifact. Append-only while open; one writer.
#[derive(Debug, Clone)]
pub struct LearningRecord {
    pub doc_id: DocId,
    pub meta: SourceMeta,
    pub quotes: Vec<Quote>,
    pub insight: Option<String>,
    closed: bool,
}

impl LearningRecord {
    pub fn open(doc_id: &str, meta: SourceMeta) -> Self {
        Self {
            doc_id: doc_id.to_string(),
            meta,
            quotes: Vec::new(),
            insight: None,
            closed: false,
        }
    }

    /// A record read back from disk is already complete.
    pub fn restored(doc_id: &str, meta: SourceMeta, quotes: Vec<Quote>, insight: Option<String>) -> Self {
        Self {
            doc_id: doc_id.to_string(),
            meta,
            quotes,
            insight,
            closed: true,
        }
    }

    pub fn append_quotes(&mut self, quotes: impl IntoIterator<Item = Quote>) {
        if self.closed {
            tracing::warn!(doc_id = %self.doc_id, "append to closed learning record ignored");
            return;
        }
        self.quotes.extend(quotes);
    }

    pub fn close(&mut self, insight: String) {
        if !self.closed {
            self.insight = Some(insight);
            self.closed = true;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn validated_quotes(&self) -> impl Iterator<Item = &Quote> {
        self.quotes.iter().filter(|q| q.validated)
    }
}

/// A validated quote paired with the source it came from, as offered to the
/// citation integrator.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedQuote {
    pub quote: String,
    pub source_id: SourceId,
    pub source_title: String,
    pub source_url: String,
}

/// A per-document insight note consumed by section synthesis.
#[derive(Debug, Clone)]
pub struct InsightNote {
    pub doc_id: DocId,
    pub text: String,
}

/// The cited draft for one section: body plus trailing `Sources:` block.
#[derive(Debug, Clone)]
pub struct SectionDraft {
    pub section: String,
    pub text: String,
}
