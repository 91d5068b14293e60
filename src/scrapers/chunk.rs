//! Paragraph chunking of extracted article text.

use crate::models::TextChunk;
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

/// Paragraphs must be longer than this (after trimming) to become chunks.
pub const MIN_PARAGRAPH_CHARS: usize = 80;

static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n").unwrap());

/// Split text on blank lines into paragraph chunks.
///
/// Sections are numbered from 1 over the kept paragraphs. Offsets are
/// character positions in the kept paragraphs joined by `"\n\n"`, so
/// `char_end - char_start` is always the chunk's length.
pub fn chunk_paragraphs(citation_id: &str, text: &str) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    let mut cursor = 0;

    for paragraph in PARAGRAPH_BREAK.split(text).map(str::trim) {
        let len = paragraph.chars().count();
        if len <= MIN_PARAGRAPH_CHARS {
            continue;
        }
        let start = cursor;
        let end = start + len;
        chunks.push(TextChunk {
            textchunk_id: Uuid::new_v4().to_string(),
            citation_id: citation_id.to_string(),
            text: paragraph.to_string(),
            section: chunks.len() as u32 + 1,
            char_start: Some(start),
            char_end: Some(end),
        });
        cursor = end + 2;
    }

    chunks
}
