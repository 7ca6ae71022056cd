//! Overlapping fixed-size windows over document text.

use tracing::{debug, warn};

/// One window of a document. `start` is a char offset into the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub start: usize,
    pub text: String,
}

/// Split `text` into windows of `window` chars advancing by
/// `window - overlap`. The trailing remainder becomes the last chunk.
///
/// Always terminates: splitting stops as soon as the next start would not
/// move past the previous one (e.g. `overlap >= window`), and at most
/// `len / 100 + 100` chunks are produced. Both cases return the chunks
/// produced so far.
pub fn chunk_text(text: &str, window: usize, overlap: usize) -> Vec<Chunk> {
    if window == 0 {
        warn!("Zero chunk window, nothing to split");
        return Vec::new();
    }

    // Char offsets -> byte offsets, so windows never split a code point
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let len = boundaries.len() - 1;
    let ceiling = len / 100 + 100;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut last_start: Option<usize> = None;

    while start < len && last_start.map_or(true, |prev| start > prev) {
        last_start = Some(start);
        let end = (start + window).min(len);
        chunks.push(Chunk {
            start,
            text: text[boundaries[start]..boundaries[end]].to_string(),
        });
        debug!(chunk = chunks.len(), start, end, "Chunk cut");

        start = if end < len {
            end.saturating_sub(overlap)
        } else {
            len
        };

        if start < len && chunks.len() >= ceiling {
            warn!(chunks = chunks.len(), ceiling, "Chunk ceiling reached, truncating");
            break;
        }
    }

    if start < len && last_start.is_some_and(|prev| start <= prev) {
        warn!(start, chunks = chunks.len(), "Chunk cursor stalled, stopping early");
    }

    debug!(content_len = len, chunk_count = chunks.len(), "Chunking complete");
    chunks
}
