use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::Result;
use regex::{Captures, Regex};
use tracing::{debug, info, warn};

use crate::docs::types::{SourceId, SourcedQuote};
use crate::llm::Inference;
use crate::research::payload::strip_reasoning;
use crate::research::prompts;
use crate::state::PipelineConfig;

pub const SOURCES_MARKER: &str = "Sources:";

/// `[src: <id>]`, also tolerating `[src: a, b]`.
static CITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[src:\s*([^\]]+)\]").expect("valid regex"));

fn marker_ids(inner: &str) -> impl Iterator<Item = &str> {
    inner
        .split([',', ';'])
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Source ids cited in `text`, deduplicated, in order of first appearance.
pub fn cited_ids(text: &str) -> Vec<SourceId> {
    let mut seen = Vec::new();
    for caps in CITATION.captures_iter(text) {
        for id in marker_ids(&caps[1]) {
            let id = SourceId::from(id);
            if !seen.contains(&id) {
                seen.push(id);
            }
        }
    }
    seen
}

/// Title and url per source id, first occurrence wins.
fn source_map(pool: &[SourcedQuote]) -> HashMap<SourceId, (&str, &str)> {
    let mut map = HashMap::new();
    for q in pool {
        map.entry(q.source_id.clone())
            .or_insert((q.source_title.as_str(), q.source_url.as_str()));
    }
    map
}

/// Drop citation markers naming ids outside the pool; a marker left with no
/// known id is removed entirely.
fn remove_orphans(text: &str, known: &HashMap<SourceId, (&str, &str)>) -> String {
    CITATION
        .replace_all(text, |caps: &Captures| {
            let ids: Vec<&str> = marker_ids(&caps[1]).collect();
            let kept: Vec<&str> = ids
                .iter()
                .copied()
                .filter(|id| known.contains_key(&SourceId::from(*id)))
                .collect();
            if kept.len() < ids.len() {
                warn!(marker = &caps[0], "Dropping citation of unknown source");
            }
            if kept.is_empty() {
                String::new()
            } else {
                format!("[src: {}]", kept.join(", "))
            }
        })
        .into_owned()
}

/// Append a `Sources:` block listing exactly the sources cited inline.
/// Sources offered but never cited are left out.
pub fn append_sources(text: &str, pool: &[SourcedQuote]) -> String {
    let known = source_map(pool);
    let body = remove_orphans(text.trim_end(), &known);
    let cited = cited_ids(&body);

    let mut out = body;
    out.push_str("\n\n");
    out.push_str(SOURCES_MARKER);
    out.push('\n');
    if cited.is_empty() {
        out.push_str("No sources cited.\n");
    }
    for id in &cited {
        if let Some((title, url)) = known.get(id) {
            out.push_str(&format!("[{}] {}", id, title));
            if !url.is_empty() {
                out.push_str(&format!(" ({})", url));
            }
            out.push('\n');
        }
    }

    debug!(offered = known.len(), cited = cited.len(), "Sources reconciled");
    out
}

fn render_pool(pool: &[SourcedQuote]) -> String {
    pool.iter()
        .map(|q| format!("\"{}\"\n  - Source: {}\n\n", q.quote, q.source_id))
        .collect()
}

/// Rewrite a draft to weave in selected quotes with `[src: id]` markers,
/// then append the reconciled `Sources:` block.
///
/// With an empty pool there is nothing to weave in, so the model is not
/// called and the draft is returned with an empty sources block.
pub async fn integrate(
    llm: &dyn Inference,
    config: &PipelineConfig,
    draft: &str,
    pool: &[SourcedQuote],
) -> Result<String> {
    if pool.is_empty() {
        debug!("Empty quote pool, integration skipped");
        return Ok(append_sources(draft, pool));
    }

    info!(quotes = pool.len(), "Integrating quotes");
    let prompt = prompts::integrate_quotes(draft, &render_pool(pool));
    let response = llm.complete(&config.models.writer, &prompt).await?;
    let rewritten = strip_reasoning(&response);
    Ok(append_sources(&rewritten, pool))
}
