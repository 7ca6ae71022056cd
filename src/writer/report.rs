use tracing::{info, warn};

use super::citations::{cited_ids, SOURCES_MARKER};
use crate::docs::arena::ReportArena;
use crate::docs::types::SourceId;

/// Body of a cited draft with its per-section `Sources:` block removed.
fn draft_body(text: &str) -> &str {
    match text.find(SOURCES_MARKER) {
        Some(pos) => text[..pos].trim_end(),
        None => text.trim_end(),
    }
}

/// Concatenate section drafts in declared order under `# <section>`
/// headings, then one global `## Sources` list.
///
/// Sections without a draft are omitted. Each cited source is listed once,
/// in order of first citation; title and url come from the learning
/// records, not from the per-section blocks.
pub fn assemble(arena: &ReportArena) -> String {
    let table = arena.source_table();
    let mut blocks = Vec::new();
    let mut cited: Vec<SourceId> = Vec::new();

    for section in &arena.sections {
        let Some(draft) = &section.draft else {
            continue;
        };
        let body = draft_body(&draft.text);
        for id in cited_ids(body) {
            if !cited.contains(&id) {
                cited.push(id);
            }
        }
        blocks.push(format!("# {}\n\n{}", section.name, body));
    }

    let mut lines = Vec::new();
    for id in &cited {
        match table.get(id) {
            Some(entry) => lines.push(format!("- [{}] {} - {}", id, entry.title, entry.url)),
            None => warn!(source_id = %id, "Cited source has no learning record, left out of report"),
        }
    }

    info!(sections = blocks.len(), sources = lines.len(), "Report assembled");

    let mut report = blocks.join("\n\n");
    report.push_str("\n\n## Sources\n\n");
    for line in lines {
        report.push_str(&line);
        report.push('\n');
    }
    report
}
