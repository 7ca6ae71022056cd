//! Text formats of the on-disk artifacts: evidence front matter and
//! learning records.

use std::collections::HashMap;

use super::types::{LearningRecord, Quote, SourceId, SourceMeta};

const FENCE: &str = "---";
const INSIGHTS_HEADER: &str = "## Insights";
const QUOTES_HEADER: &str = "## Supporting Quotes";
const VALIDATED_PREFIX: &str = "> ";
const SUMMARIZED_PREFIX: &str = "(summarized) ";

/// Front matter split off a Markdown artifact.
#[derive(Debug, Default)]
pub struct FrontMatter {
    pub fields: HashMap<String, String>,
    /// Raw header lines between the fences.
    pub header: String,
}

impl FrontMatter {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|s| s.as_str())
    }
}

/// Split `---\nkey: value\n---\n<body>` into front matter and body.
/// Text without a leading fence is all body.
pub fn split_front_matter(raw: &str) -> (FrontMatter, &str) {
    let Some(rest) = raw.strip_prefix(FENCE) else {
        return (FrontMatter::default(), raw);
    };
    let Some(end) = rest.find(&format!("\n{}", FENCE)) else {
        return (FrontMatter::default(), raw);
    };

    let header = rest[..end].trim_matches('\n');
    let body = rest[end + 1 + FENCE.len()..].trim();

    let fields = header
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .collect();

    (
        FrontMatter {
            fields,
            header: header.to_string(),
        },
        body,
    )
}

pub fn render_evidence(title: &str, url: &str, body: &str) -> String {
    format!("---\ntitle: {}\nsource: {}\n---\n\n{}\n", title, url, body)
}

/// One line per quote, marked by validation state.
pub fn render_quote(quote: &Quote) -> String {
    let prefix = if quote.validated {
        VALIDATED_PREFIX
    } else {
        SUMMARIZED_PREFIX
    };
    format!("{}{}", prefix, single_line(&quote.text))
}

pub fn render_learning_record(record: &LearningRecord) -> String {
    let meta = &record.meta;
    let mut out = String::new();
    out.push_str("---\n");
    out.push_str(&format!("source_title: {}\n", single_line(&meta.title)));
    out.push_str(&format!("source_url: {}\n", single_line(&meta.url)));
    out.push_str(&format!("source_id: {}\n", meta.source_id));
    out.push_str(&format!("relevance_score: {}\n", meta.relevance_score));
    out.push_str(&format!("relevance_reason: {}\n", single_line(&meta.relevance_reason)));
    out.push_str("---\n\n");

    if let Some(insight) = &record.insight {
        out.push_str(INSIGHTS_HEADER);
        out.push_str("\n\n");
        out.push_str(insight.trim());
        out.push_str("\n\n");
    }

    out.push_str(QUOTES_HEADER);
    out.push_str("\n\n");
    for quote in &record.quotes {
        out.push_str(&render_quote(quote));
        out.push('\n');
    }
    out
}

/// Read a learning record back. Returns `None` when the title or url field
/// is missing from the header.
pub fn parse_learning_record(doc_id: &str, text: &str) -> Option<LearningRecord> {
    let (front, body) = split_front_matter(text);
    let title = front.get("source_title")?;
    let url = front.get("source_url")?;
    let meta = SourceMeta {
        title: title.to_string(),
        url: url.to_string(),
        source_id: SourceId::from_title(title),
        relevance_score: front
            .get("relevance_score")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0),
        relevance_reason: front.get("relevance_reason").unwrap_or_default().to_string(),
    };

    let (before_quotes, quotes_block) = match body.rfind(QUOTES_HEADER) {
        Some(pos) => (&body[..pos], &body[pos + QUOTES_HEADER.len()..]),
        None => (body, ""),
    };

    let insight = before_quotes
        .find(INSIGHTS_HEADER)
        .map(|pos| before_quotes[pos + INSIGHTS_HEADER.len()..].trim().to_string())
        .filter(|s| !s.is_empty());

    let quotes = quotes_block
        .lines()
        .filter_map(|line| {
            let line = line.trim_end();
            if let Some(q) = line.strip_prefix(VALIDATED_PREFIX) {
                Some(Quote {
                    text: q.trim().to_string(),
                    validated: true,
                })
            } else {
                line.strip_prefix(SUMMARIZED_PREFIX).map(|q| Quote {
                    text: q.trim().to_string(),
                    validated: false,
                })
            }
        })
        .filter(|q| !q.text.is_empty())
        .collect();

    Some(LearningRecord::restored(doc_id, meta, quotes, insight))
}

/// Quotes are stored one per line.
fn single_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docs::types::RelevanceVerdict;

    fn sample_record() -> LearningRecord {
        let verdict = RelevanceVerdict {
            is_relevant: true,
            confidence: 0.85,
            reason: "covers revenue".to_string(),
        };
        let mut record = LearningRecord::open(
            "01-Q3 Report",
            SourceMeta::new("Q3 Report", "https://example.com/q3", &verdict),
        );
        record.append_quotes(vec![
            Quote {
                text: "Revenue grew 40%.".to_string(),
                validated: true,
            },
            Quote {
                text: "Margins were\nroughly flat".to_string(),
                validated: false,
            },
        ]);
        record.close("Growth is driven by new contracts.".to_string());
        record
    }

    #[test]
    fn test_split_front_matter() {
        let raw = "---\ntitle: Q3 Report\nsource: https://example.com/q3\n---\n\nBody text here.";
        let (front, body) = split_front_matter(raw);
        assert_eq!(front.get("title"), Some("Q3 Report"));
        assert_eq!(front.get("source"), Some("https://example.com/q3"));
        assert_eq!(body, "Body text here.");
    }

    #[test]
    fn test_no_front_matter_is_all_body() {
        let (front, body) = split_front_matter("Just text.\n");
        assert!(front.fields.is_empty());
        assert_eq!(body, "Just text.\n");
    }

    #[test]
    fn test_render_learning_record_layout() {
        let text = render_learning_record(&sample_record());
        assert!(text.starts_with("---\nsource_title: Q3 Report\nsource_url: https://example.com/q3\n"));
        assert!(text.contains(&format!("source_id: {}\n", SourceId::from_title("Q3 Report"))));
        let insights = text.find("## Insights").unwrap();
        let quotes = text.find("## Supporting Quotes").unwrap();
        assert!(insights < quotes);
        assert!(text.contains("> Revenue grew 40%.\n"));
        assert!(text.contains("(summarized) Margins were roughly flat\n"));
    }

    #[test]
    fn test_open_record_has_no_insights_section() {
        let verdict = RelevanceVerdict {
            is_relevant: true,
            confidence: 0.9,
            reason: "r".to_string(),
        };
        let record = LearningRecord::open("x", SourceMeta::new("T", "U", &verdict));
        assert!(!render_learning_record(&record).contains("## Insights"));
    }

    #[test]
    fn test_parse_learning_record_reads_back_rendered() {
        let text = render_learning_record(&sample_record());
        let parsed = parse_learning_record("01-Q3 Report", &text).unwrap();
        assert_eq!(parsed.meta.title, "Q3 Report");
        assert_eq!(parsed.meta.url, "https://example.com/q3");
        assert_eq!(parsed.meta.source_id, SourceId::from_title("Q3 Report"));
        assert_eq!(parsed.insight.as_deref(), Some("Growth is driven by new contracts."));
        assert_eq!(parsed.quotes.len(), 2);
        assert!(parsed.quotes[0].validated);
        assert!(!parsed.quotes[1].validated);
        assert!(parsed.is_closed());
    }

    #[test]
    fn test_parse_requires_title_and_url() {
        assert!(parse_learning_record("x", "---\nsource_title: T\n---\n\n## Supporting Quotes\n").is_none());
        assert!(parse_learning_record("x", "no header").is_none());
    }
}
