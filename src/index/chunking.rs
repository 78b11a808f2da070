//! Splitting document text into overlapping retrieval chunks.
//!
//! Budgets are expressed in characters. Semantic boundary selection is delegated to
//! `semchunk-rs`; this module only wires in the character counter and applies the sliding
//! overlap between adjacent chunks afterwards, trimming from the front when the combined
//! chunk would exceed the budget.

use semchunk_rs::Chunker;

use super::IndexError;

fn char_count(segment: &str) -> usize {
    segment.chars().count()
}

/// Chunk text into overlapping segments bounded by `chunk_size` characters.
///
/// Returns an empty vector when the input is all whitespace.
pub(crate) fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, IndexError> {
    if chunk_size == 0 {
        return Err(IndexError::InvalidChunkSize);
    }
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chunker = Chunker::new(chunk_size, Box::new(char_count));
    let base_chunks = chunker.chunk(text);
    Ok(apply_overlap(base_chunks, chunk_size, overlap))
}

/// Prepend a character-limited tail of each previous chunk to its successor.
fn apply_overlap(chunks: Vec<String>, chunk_size: usize, overlap: usize) -> Vec<String> {
    let effective_overlap = overlap.min(chunk_size.saturating_sub(1));
    if effective_overlap == 0 || chunks.is_empty() {
        return chunks;
    }

    let mut overlapped = Vec::with_capacity(chunks.len());
    let mut iter = chunks.into_iter();
    let mut previous = match iter.next() {
        Some(first) => first,
        None => return Vec::new(),
    };
    overlapped.push(previous.clone());

    for current in iter {
        let tail = tail_chars(&previous, effective_overlap);
        let mut combined = String::with_capacity(tail.len() + current.len() + 1);
        if !tail.is_empty() {
            combined.push_str(tail);
            if !tail.ends_with(char::is_whitespace) && !current.starts_with(char::is_whitespace) {
                combined.push(' ');
            }
        }
        combined.push_str(&current);
        overlapped.push(trim_to_budget(&combined, chunk_size));
        previous = current;
    }

    overlapped
}

/// Last `limit` characters of `text`, starting at a whitespace boundary when one exists.
fn tail_chars(text: &str, limit: usize) -> &str {
    let total = char_count(text);
    if total <= limit {
        return text.trim_start();
    }
    let skip = total - limit;
    let byte_start = text
        .char_indices()
        .nth(skip)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len());
    let candidate = &text[byte_start..];
    // Prefer starting after a whitespace so the overlap does not begin mid-word.
    match candidate.find(char::is_whitespace) {
        Some(ws) => candidate[ws..].trim_start(),
        None => candidate,
    }
}

fn trim_to_budget(text: &str, budget: usize) -> String {
    let total = char_count(text);
    if total <= budget {
        return text.to_string();
    }
    let skip = total - budget;
    let byte_start = text
        .char_indices()
        .nth(skip)
        .map(|(offset, _)| offset)
        .unwrap_or(text.len());
    text[byte_start..].trim_start().to_string()
}
