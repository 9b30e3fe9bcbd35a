use crate::models::{Chunk, ChunkMetadata, SegmenterOptions};
use roxmltree::Document;

const SECTION_SEPARATOR: &str = " > ";

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Walks a parsed regulation document in pre-order and closes overlapping
/// word-budgeted chunks.
///
/// `HD` elements drive a section stack of at most three entries keyed by
/// their `SOURCE` attribute (`HD1`/`HD2`/`HD3`); `P` elements accumulate
/// into the pending buffer. Documents without content yield no chunks.
pub fn segment_document(
    document: &Document<'_>,
    metadata: &ChunkMetadata,
    options: &SegmenterOptions,
) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut buffer: Vec<String> = Vec::new();
    let mut buffered_words = 0usize;
    let mut carry: Vec<String> = Vec::new();

    for node in document.root().descendants().filter(|node| node.is_element()) {
        if node.has_tag_name("HD") {
            let heading = normalize_whitespace(node.text().unwrap_or(""));
            if heading.is_empty() {
                continue;
            }
            let level = node.attribute("SOURCE").unwrap_or("");
            if level.starts_with("HD1") {
                stack = vec![heading];
            } else if level.starts_with("HD2") {
                stack.truncate(1);
                stack.push(heading);
            } else if level.starts_with("HD3") {
                stack.truncate(2);
                stack.push(heading);
            } else {
                stack = vec![heading];
            }
        } else if node.has_tag_name("P") {
            let paragraph = normalize_whitespace(node.text().unwrap_or(""));
            if paragraph.is_empty() {
                continue;
            }
            buffered_words += paragraph.split_whitespace().count();
            buffer.push(paragraph);
            if buffered_words >= options.chunk_words {
                let chunk_index = chunks.len() as u64;
                chunks.push(close_chunk(
                    &mut buffer,
                    &mut buffered_words,
                    &mut carry,
                    &stack,
                    chunk_index,
                    metadata,
                    options,
                ));
            }
        }
    }

    if !buffer.is_empty() {
        let chunk_index = chunks.len() as u64;
        chunks.push(close_chunk(
            &mut buffer,
            &mut buffered_words,
            &mut carry,
            &stack,
            chunk_index,
            metadata,
            options,
        ));
    }

    chunks
}

fn close_chunk(
    buffer: &mut Vec<String>,
    buffered_words: &mut usize,
    carry: &mut Vec<String>,
    stack: &[String],
    chunk_index: u64,
    metadata: &ChunkMetadata,
    options: &SegmenterOptions,
) -> Chunk {
    let mut text = buffer.join(" ");
    if !carry.is_empty() {
        text = format!("{} {}", carry.join(" "), text);
    }

    // The carry-over is taken from the final text, prefix included, so
    // overlap chains across consecutive chunks.
    *carry = overlap_tail(&text, options.overlap_sentences);
    buffer.clear();
    *buffered_words = 0;

    Chunk {
        hash: Chunk::content_hash(&text),
        section_header: stack.join(SECTION_SEPARATOR),
        chunk_index,
        metadata: metadata.clone(),
        text,
    }
}

/// Last `count` segments of `text` split on the literal `". "`.
fn overlap_tail(text: &str, count: usize) -> Vec<String> {
    if count == 0 {
        return Vec::new();
    }
    let sentences: Vec<&str> = text.split(". ").collect();
    let start = sentences.len().saturating_sub(count);
    sentences[start..]
        .iter()
        .map(|sentence| (*sentence).to_string())
        .collect()
}
