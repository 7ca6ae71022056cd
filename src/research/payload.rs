//! Structured payload extraction from free-form model output.
//!
//! Models wrap their answer in prose, emit `<think>` blocks, and sometimes
//! produce a draft block followed by a final one. The payload is the last
//! fenced block outside any reasoning block.

use serde::de::DeserializeOwned;
use thiserror::Error;

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";
const FENCE: &str = "```";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("response contained no payload")]
    Empty,

    #[error("payload is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),

    #[error("payload has unexpected shape: {0}")]
    Shape(#[source] serde_json::Error),
}

/// A fenced block: the info string after the opening fence and the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FencedBlock<'a> {
    pub info: &'a str,
    pub body: &'a str,
}

enum Tag {
    Open(usize),
    Close(usize),
}

/// Remove reasoning blocks. Nesting is honoured; an unclosed opening tag
/// drops the rest of the text; a closing tag with no opener drops
/// everything before it.
pub fn strip_reasoning(raw: &str) -> String {
    let mut out = String::new();
    let mut depth = 0usize;
    let mut rest = raw;

    loop {
        let tag = match (rest.find(THINK_OPEN), rest.find(THINK_CLOSE)) {
            (None, None) => {
                if depth == 0 {
                    out.push_str(rest);
                }
                break;
            }
            (Some(o), Some(c)) if c < o => Tag::Close(c),
            (Some(o), _) => Tag::Open(o),
            (None, Some(c)) => Tag::Close(c),
        };

        match tag {
            Tag::Open(o) => {
                if depth == 0 {
                    out.push_str(&rest[..o]);
                }
                depth += 1;
                rest = &rest[o + THINK_OPEN.len()..];
            }
            Tag::Close(c) => {
                if depth == 0 {
                    out.clear();
                } else {
                    depth -= 1;
                }
                rest = &rest[c + THINK_CLOSE.len()..];
            }
        }
    }

    out.trim().to_string()
}

/// All fenced blocks in order. An unterminated last fence runs to the end.
pub fn fenced_blocks(text: &str) -> Vec<FencedBlock<'_>> {
    let mut blocks = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find(FENCE) {
        let after = &rest[start + FENCE.len()..];
        let line_end = after.find('\n').unwrap_or(after.len());

        // ```json {"a": 1}``` on a single line
        if let Some(inline_end) = after[..line_end].find(FENCE) {
            let inner = after[..inline_end].trim();
            let (info, body) = split_inline_info(inner);
            blocks.push(FencedBlock { info, body });
            rest = &after[inline_end + FENCE.len()..];
            continue;
        }

        let info = after[..line_end].trim();
        let region = after.get(line_end + 1..).unwrap_or("");
        match region.find(FENCE) {
            Some(end) => {
                blocks.push(FencedBlock {
                    info,
                    body: region[..end].trim(),
                });
                rest = &region[end + FENCE.len()..];
            }
            None => {
                blocks.push(FencedBlock {
                    info,
                    body: region.trim(),
                });
                break;
            }
        }
    }

    blocks
}

fn split_inline_info(inner: &str) -> (&str, &str) {
    match inner.find(|c: char| c == '{' || c == '[') {
        Some(pos) if inner[..pos].chars().all(|c| c.is_ascii_alphanumeric() || c.is_whitespace()) => {
            (inner[..pos].trim(), inner[pos..].trim())
        }
        _ => ("", inner),
    }
}

/// Locate and parse the structured payload of a model response.
pub fn extract_structured_payload(raw: &str) -> Result<serde_json::Value, ParseError> {
    let text = strip_reasoning(raw);

    if let Some(block) = fenced_blocks(&text).pop() {
        if block.body.is_empty() {
            return Err(ParseError::Empty);
        }
        return serde_json::from_str(block.body).map_err(ParseError::Json);
    }

    let candidate = text.trim();
    if candidate.is_empty() {
        return Err(ParseError::Empty);
    }
    match serde_json::from_str(candidate) {
        Ok(value) => Ok(value),
        Err(e) => outermost_object(candidate)
            .and_then(|obj| serde_json::from_str(obj).ok())
            .ok_or(ParseError::Json(e)),
    }
}

/// Typed variant of [`extract_structured_payload`].
pub fn parse_payload<T: DeserializeOwned>(raw: &str) -> Result<T, ParseError> {
    let value = extract_structured_payload(raw)?;
    serde_json::from_value(value).map_err(ParseError::Shape)
}

/// Unfenced JSON surrounded by prose.
fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
