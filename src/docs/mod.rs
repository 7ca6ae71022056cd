pub mod arena;
pub mod format;
pub mod ingest;
pub mod types;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone};
use serde::Serialize;
use tracing::{debug, warn};

use arena::{ReportArena, SectionState};
use types::{EvidenceDocument, InsightNote, LearningRecord, SectionDraft};

// Layout under <root>/<report_id>/
const GOAL_FILE: &str = "goal.txt";
const STRUCTURE_FILE: &str = "structure.txt";
const SECTIONS_DIR: &str = "structured_research";
const FINAL_REPORT_FILE: &str = "final_report.md";

// Layout under each section directory
const LINKS_FILE: &str = "links.txt";
const EVIDENCE_DIR: &str = "evidence";
const EVIDENCE_MANIFEST: &str = "evidence.meta.json";
const LEARNINGS_DIR: &str = "learnings";
const WRITINGS_DIR: &str = "writings";
const GIST_FILE: &str = "section_gist.txt";
const DRAFT_FILE: &str = "draft.txt";

/// Timestamp id for a new report, e.g. `2024_03_01_14_05_09`.
pub fn generate_report_id<Tz: TimeZone>(now: DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format("%Y_%m_%d_%H_%M_%S").to_string()
}

/// Filesystem boundary for one report. Typed records live in the
/// [`ReportArena`]; this only reads and writes their text form.
pub struct ReportStore {
    report_dir: PathBuf,
}

impl ReportStore {
    pub fn new(root: &Path, report_id: &str) -> Self {
        Self {
            report_dir: root.join(report_id),
        }
    }

    pub fn report_dir(&self) -> &Path {
        &self.report_dir
    }

    pub fn section_dir(&self, section: &str) -> PathBuf {
        self.report_dir.join(SECTIONS_DIR).join(dir_name(section))
    }

    pub fn final_report_path(&self) -> PathBuf {
        self.report_dir.join(FINAL_REPORT_FILE)
    }

    /// The goal is a required top-level artifact; a failure here halts the run.
    pub async fn load_goal(&self) -> Result<String> {
        let path = self.report_dir.join(GOAL_FILE);
        let goal = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read goal at {}", path.display()))?;
        Ok(goal.trim().to_string())
    }

    /// Section names, one per non-empty line. Required, like the goal.
    pub async fn load_structure(&self) -> Result<Vec<String>> {
        let path = self.report_dir.join(STRUCTURE_FILE);
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read structure at {}", path.display()))?;
        Ok(raw
            .lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(|l| l.to_string())
            .collect())
    }

    pub async fn save_goal_and_structure(&self, goal: &str, structure: &[String]) -> Result<()> {
        write_file(&self.report_dir.join(GOAL_FILE), goal).await?;
        write_file(&self.report_dir.join(STRUCTURE_FILE), &structure.join("\n")).await
    }

    /// Load goal, structure and whatever per-section artifacts already exist.
    pub async fn load_arena(&self) -> Result<ReportArena> {
        let goal = self.load_goal().await?;
        let structure = self.load_structure().await?;
        let mut arena = ReportArena::new(&goal, &structure);

        for section in arena.sections.iter_mut() {
            self.load_section(section).await;
        }

        debug!(
            report = %self.report_dir.display(),
            sections = arena.sections.len(),
            "Report arena loaded"
        );
        Ok(arena)
    }

    async fn load_section(&self, section: &mut SectionState) {
        let name = section.name.clone();
        section.evidence = self.load_evidence(&name).await;
        section.learnings = self.load_learnings(&name).await;
        section.notes = self.load_notes(&name).await;
        section.gist = self.read_optional(&self.section_dir(&name).join(GIST_FILE)).await;
        section.draft = self
            .read_optional(&self.section_dir(&name).join(DRAFT_FILE))
            .await
            .map(|text| SectionDraft {
                section: name.clone(),
                text,
            });
    }

    /// Raw `links.txt` for a section, if the search step produced one.
    pub async fn load_links(&self, section: &str) -> Option<String> {
        self.read_optional(&self.section_dir(section).join(LINKS_FILE)).await
    }

    /// Evidence documents in filename order. A missing directory means
    /// nothing to do.
    pub async fn load_evidence(&self, section: &str) -> Vec<EvidenceDocument> {
        let dir = self.section_dir(section).join(EVIDENCE_DIR);
        let mut docs = Vec::new();
        for path in list_files(&dir, "md").await {
            let Some(raw) = self.read_optional(&path).await else {
                continue;
            };
            let (front, body) = format::split_front_matter(&raw);
            docs.push(EvidenceDocument {
                id: file_stem(&path),
                title: front.get("title").unwrap_or("Unknown").to_string(),
                url: front.get("source").unwrap_or("Unknown").to_string(),
                raw_text: body.to_string(),
                metadata_header: front.header.clone(),
            });
        }
        docs
    }

    pub async fn load_learnings(&self, section: &str) -> Vec<LearningRecord> {
        let dir = self.section_dir(section).join(LEARNINGS_DIR);
        let mut records = Vec::new();
        for path in list_files(&dir, "md").await {
            let Some(raw) = self.read_optional(&path).await else {
                continue;
            };
            match format::parse_learning_record(&file_stem(&path), &raw) {
                Some(record) => records.push(record),
                None => warn!(path = %path.display(), "Learning record has no usable header, skipped"),
            }
        }
        records
    }

    pub async fn load_notes(&self, section: &str) -> Vec<InsightNote> {
        let dir = self.section_dir(section).join(WRITINGS_DIR);
        let mut notes = Vec::new();
        for path in list_files(&dir, "txt").await {
            if let Some(text) = self.read_optional(&path).await {
                notes.push(InsightNote {
                    doc_id: file_stem(&path),
                    text,
                });
            }
        }
        notes
    }

    pub async fn write_evidence(&self, section: &str, doc_id: &str, title: &str, url: &str, body: &str) -> Result<PathBuf> {
        let path = self
            .section_dir(section)
            .join(EVIDENCE_DIR)
            .join(format!("{}.md", doc_id));
        write_file(&path, &format::render_evidence(title, url, body)).await?;
        Ok(path)
    }

    pub async fn write_evidence_manifest<T: Serialize>(&self, section: &str, manifest: &T) -> Result<()> {
        let path = self
            .section_dir(section)
            .join(EVIDENCE_DIR)
            .join(EVIDENCE_MANIFEST);
        let json = serde_json::to_string_pretty(manifest).context("serialize evidence manifest")?;
        write_file(&path, &json).await
    }

    /// Overwrites the record file with its current state.
    pub async fn write_learning(&self, section: &str, record: &LearningRecord) -> Result<()> {
        let path = self
            .section_dir(section)
            .join(LEARNINGS_DIR)
            .join(format!("{}.md", record.doc_id));
        write_file(&path, &format::render_learning_record(record)).await
    }

    pub async fn write_note(&self, section: &str, note: &InsightNote) -> Result<()> {
        let path = self
            .section_dir(section)
            .join(WRITINGS_DIR)
            .join(format!("{}.txt", note.doc_id));
        write_file(&path, &note.text).await
    }

    pub async fn write_gist(&self, section: &str, gist: &str) -> Result<()> {
        write_file(&self.section_dir(section).join(GIST_FILE), gist).await
    }

    pub async fn write_draft(&self, draft: &SectionDraft) -> Result<()> {
        write_file(&self.section_dir(&draft.section).join(DRAFT_FILE), &draft.text).await
    }

    pub async fn write_final_report(&self, report: &str) -> Result<PathBuf> {
        let path = self.final_report_path();
        write_file(&path, report).await?;
        Ok(path)
    }

    /// Drop a document's learning record and insight note, e.g. after a
    /// later run rejected it.
    pub async fn remove_document_artifacts(&self, section: &str, doc_id: &str) -> Result<()> {
        let dir = self.section_dir(section);
        remove_file_if_exists(&dir.join(LEARNINGS_DIR).join(format!("{}.md", doc_id))).await?;
        remove_file_if_exists(&dir.join(WRITINGS_DIR).join(format!("{}.txt", doc_id))).await
    }

    /// Drop the section gist and cited draft so a stale one never reaches
    /// the report.
    pub async fn remove_section_drafts(&self, section: &str) -> Result<()> {
        let dir = self.section_dir(section);
        remove_file_if_exists(&dir.join(GIST_FILE)).await?;
        remove_file_if_exists(&dir.join(DRAFT_FILE)).await
    }

    async fn read_optional(&self, path: &Path) -> Option<String> {
        match tokio::fs::read_to_string(path).await {
            Ok(s) => Some(s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read artifact");
                None
            }
        }
    }
}

async fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

async fn remove_file_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed stale artifact");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

/// Files with the given extension, sorted by name. Missing dir yields none.
async fn list_files(dir: &Path, extension: &str) -> Vec<PathBuf> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(dir = %dir.display(), error = %e, "Failed to list directory");
            } else {
                debug!(dir = %dir.display(), "Directory absent, nothing to load");
            }
            return Vec::new();
        }
    };

    let mut paths = Vec::new();
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some(extension) {
                    paths.push(path);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Error reading directory entry");
                break;
            }
        }
    }
    paths.sort();
    paths
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Section names become directory names; keep them on one path level.
fn dir_name(section: &str) -> String {
    section
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '-' } else { c })
        .collect()
}
