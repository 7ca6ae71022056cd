//! Content retrieval: fetch linked pages, clean them into plain sentences,
//! and write them out as evidence documents.

use std::sync::LazyLock;

use futures::StreamExt;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use super::ReportStore;

/// Why a document could not be retrieved. Recorded per document; never
/// propagated past the gatherer.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("no usable text at {url}")]
    Empty { url: String },
}

pub struct ContentFetcher {
    client: reqwest::Client,
}

impl ContentFetcher {
    pub fn new() -> Result<Self, RetrievalError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("cited-report/0.1")
            .build()?;
        Ok(Self { client })
    }

    /// Fetch a page and reduce it to complete sentences.
    pub async fn fetch(&self, url: &str) -> Result<String, RetrievalError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(RetrievalError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = resp.bytes().await?;

        // Convert HTML to text if applicable
        let text = if content_type.contains("html") {
            html2text::from_read(&body[..], 120)
                .unwrap_or_else(|_| String::from_utf8_lossy(&body).to_string())
        } else {
            String::from_utf8_lossy(&body).to_string()
        };

        let cleaned = clean_sentences(&text);
        if cleaned.is_empty() {
            return Err(RetrievalError::Empty {
                url: url.to_string(),
            });
        }
        Ok(cleaned)
    }
}

/// Drop link targets, reference-link lines and bare URLs; keep link text.
pub fn clean_markdown(content: &str) -> String {
    static INLINE_LINK: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").expect("valid regex"));
    static REFERENCE_LINK: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?m)^\[[^\]]+\]:\s*http.*$").expect("valid regex"));
    static BARE_URL: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"https?://\S+").expect("valid regex"));
    static BLANK_RUNS: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n\s*\n\s*\n").expect("valid regex"));

    let content = INLINE_LINK.replace_all(content, "$1");
    let content = REFERENCE_LINK.replace_all(&content, "");
    let content = BARE_URL.replace_all(&content, "");
    let content = BLANK_RUNS.replace_all(&content, "\n\n");
    content.trim().to_string()
}

/// Keep only complete sentences: capitalised, ending in `.`, `!` or `?`,
/// and longer than three words. One sentence per paragraph.
pub fn clean_sentences(content: &str) -> String {
    static SENTENCE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"[^.!?]+[.!?](?:\s|$)").expect("valid regex"));

    let content = clean_markdown(content);
    SENTENCE
        .find_iter(&content)
        .map(|m| m.as_str().trim())
        .filter(|s| {
            s.chars().next().is_some_and(|c| c.is_uppercase())
                && s.ends_with(['.', '!', '?'])
                && s.split_whitespace().count() > 3
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// A `(title, url)` pair from `links.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub title: String,
    pub url: String,
}

/// `links.txt` holds a title line followed by its URL line. A URL with no
/// preceding title is ignored.
pub fn parse_links(raw: &str) -> Vec<Link> {
    let mut links = Vec::new();
    let mut title: Option<&str> = None;
    for line in raw.lines().map(str::trim) {
        if line.starts_with("http") {
            if let Some(t) = title.take() {
                links.push(Link {
                    title: t.to_string(),
                    url: line.to_string(),
                });
            }
        } else if !line.is_empty() {
            title = Some(line);
        }
    }
    links
}

/// Filename-safe title, capped at 100 chars.
pub fn safe_title(title: &str) -> String {
    let safe: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    safe.trim().chars().take(100).collect::<String>().trim().to_string()
}

#[derive(Debug, Serialize)]
struct ManifestEntry {
    id: usize,
    title: String,
    url: String,
    file: String,
}

#[derive(Debug, Serialize)]
struct Manifest {
    total_sources: usize,
    sources: Vec<ManifestEntry>,
}

/// Fetch every link of a section's `links.txt` into its evidence folder.
/// Fetches run concurrently (bounded); files are written in link order.
/// Returns the number of documents written.
pub async fn gather_evidence(
    fetcher: &ContentFetcher,
    store: &ReportStore,
    section: &str,
    concurrency: usize,
) -> anyhow::Result<usize> {
    let Some(raw) = store.load_links(section).await else {
        info!(section, "No links file, skipping retrieval");
        return Ok(0);
    };
    let links = parse_links(&raw);
    info!(section, links = links.len(), "Retrieving linked content");

    let mut fetched: Vec<(usize, Link, Result<String, RetrievalError>)> =
        futures::stream::iter(links.into_iter().enumerate())
            .map(move |(i, link)| async move {
                let result = fetcher.fetch(&link.url).await;
                (i + 1, link, result)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;
    fetched.sort_by_key(|(idx, _, _)| *idx);

    let mut sources = Vec::new();
    for (idx, link, result) in fetched {
        match result {
            Ok(text) => {
                let doc_id = format!("{:02}-{}", idx, safe_title(&link.title));
                store
                    .write_evidence(section, &doc_id, &link.title, &link.url, &text)
                    .await?;
                sources.push(ManifestEntry {
                    id: idx,
                    title: link.title,
                    url: link.url,
                    file: format!("{}.md", doc_id),
                });
            }
            Err(e) => {
                warn!(section, title = %link.title, url = %link.url, error = %e, "Failed to retrieve document");
            }
        }
    }

    let written = sources.len();
    store
        .write_evidence_manifest(
            section,
            &Manifest {
                total_sources: written,
                sources,
            },
        )
        .await?;
    info!(section, written, "Evidence gathered");
    Ok(written)
}
