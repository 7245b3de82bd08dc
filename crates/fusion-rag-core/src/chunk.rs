//! Markdown-aware text segmenter.
//!
//! Splits a document into [`Chunk`]s of at most `chunk_size` characters.
//! Headers (`#`, `##`, `###`) start a new section and are recorded on each
//! chunk as `header_1`..`header_3` metadata; header lines themselves are
//! not part of chunk content. Fenced code blocks are never treated as
//! headers.
//!
//! # Algorithm
//!
//! 1. Split the text into header-delimited sections.
//! 2. Split each section on `\n\n` paragraph boundaries.
//! 3. Paragraphs longer than `chunk_size` are hard-split at the last
//!    whitespace that leaves room for the overlap.
//! 4. Accumulate pieces into a buffer until the next one would exceed
//!    `chunk_size`, then flush.
//! 5. After a flush, the buffer restarts with the last `chunk_overlap`
//!    characters of the flushed chunk, snapped forward to a word boundary.
//!    The tail is dropped if the next piece would not fit alongside it.
//!
//! Sections never share a chunk, and overlap never crosses a section.
//!
//! # Example
//!
//! ```rust
//! use fusion_rag_core::capability::Segmenter;
//! use fusion_rag_core::chunk::MarkdownSegmenter;
//! use fusion_rag_core::models::{Metadata, MetadataValue};
//!
//! let mut meta = Metadata::new();
//! meta.insert("source".into(), MetadataValue::from("guide.md"));
//! let seg = MarkdownSegmenter::new(500, 50).unwrap();
//! let chunks = seg.segment("# Guide\n\nHello world.", &meta).unwrap();
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].content, "Hello world.");
//! ```

use crate::capability::Segmenter;
use crate::error::{Error, Result};
use crate::models::{Chunk, Metadata, MetadataValue};

const HEADER_KEYS: [&str; 3] = ["header_1", "header_2", "header_3"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkdownSegmenter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl MarkdownSegmenter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::invalid("chunk_size", "must be greater than 0"));
        }
        if chunk_overlap >= chunk_size {
            return Err(Error::invalid(
                "chunk_overlap",
                format!(
                    "must be smaller than chunk_size ({}), got {}",
                    chunk_size, chunk_overlap
                ),
            ));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into `(content, headers)` pairs without building chunks.
    pub fn split(&self, text: &str) -> Vec<(String, [Option<String>; 3])> {
        let mut out = Vec::new();
        for section in sections(text) {
            for piece in self.pack(&section.body) {
                out.push((piece, section.headers.clone()));
            }
        }
        out
    }

    fn pack(&self, body: &str) -> Vec<String> {
        // Room for a piece after an overlap tail and a one-char joiner.
        let piece_limit = self
            .chunk_size
            .saturating_sub(self.chunk_overlap + 1)
            .max(1);

        let mut packer = Packer::new(self.chunk_size, self.chunk_overlap);
        for para in body.split("\n\n") {
            let trimmed = para.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.chars().count() <= self.chunk_size {
                packer.push(trimmed, "\n\n");
                continue;
            }
            for (i, piece) in hard_split(trimmed, piece_limit).into_iter().enumerate() {
                packer.push(piece, if i == 0 { "\n\n" } else { " " });
            }
        }
        packer.finish()
    }
}

impl Segmenter for MarkdownSegmenter {
    fn segment(&self, text: &str, metadata: &Metadata) -> anyhow::Result<Vec<Chunk>> {
        let mut chunks = Vec::new();
        for (content, headers) in self.split(text) {
            let mut meta = metadata.clone();
            for (key, value) in HEADER_KEYS.iter().zip(headers) {
                if let Some(value) = value {
                    meta.insert((*key).to_string(), MetadataValue::Text(value));
                }
            }
            chunks.push(Chunk::new(content, meta)?);
        }
        Ok(chunks)
    }
}

struct Section {
    headers: [Option<String>; 3],
    body: String,
}

fn header_level(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if !(1..=3).contains(&hashes) {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(' ') {
        return None;
    }
    Some((hashes, rest.trim()))
}

fn sections(text: &str) -> Vec<Section> {
    let mut out = Vec::new();
    let mut headers: [Option<String>; 3] = [None, None, None];
    let mut body = String::new();
    let mut in_fence = false;

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        let header = if in_fence { None } else { header_level(line) };
        match header {
            Some((level, title)) => {
                if !body.trim().is_empty() {
                    out.push(Section {
                        headers: headers.clone(),
                        body: std::mem::take(&mut body),
                    });
                }
                body.clear();
                headers[level - 1] = Some(title.to_string());
                for deeper in headers.iter_mut().skip(level) {
                    *deeper = None;
                }
            }
            None => {
                body.push_str(line);
                body.push('\n');
            }
        }
    }
    if !body.trim().is_empty() {
        out.push(Section { headers, body });
    }
    out
}

/// Split `text` into pieces of at most `limit` characters, preferring whitespace.
fn hard_split(text: &str, limit: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut remaining = text.trim();
    while !remaining.is_empty() {
        let cut = byte_offset(remaining, limit);
        let split = if cut < remaining.len() {
            remaining[..cut]
                .rfind(char::is_whitespace)
                .filter(|&p| p > 0)
                .unwrap_or(cut)
        } else {
            cut
        };
        let piece = remaining[..split].trim();
        if !piece.is_empty() {
            pieces.push(piece);
        }
        remaining = remaining[split..].trim_start();
    }
    pieces
}

/// Byte offset of the `chars`-th character, or `s.len()`.
fn byte_offset(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map(|(i, _)| i).unwrap_or(s.len())
}

/// Last `n` characters of `s`, starting at a word boundary.
fn overlap_tail(s: &str, n: usize) -> String {
    if n == 0 {
        return String::new();
    }
    let total = s.chars().count();
    let start = byte_offset(s, total.saturating_sub(n));
    let tail = &s[start..];
    let mid_word = start > 0
        && !tail.starts_with(char::is_whitespace)
        && !s[..start].ends_with(char::is_whitespace);
    let tail = if mid_word {
        tail.find(char::is_whitespace).map(|p| &tail[p..]).unwrap_or("")
    } else {
        tail
    };
    tail.trim().to_string()
}

struct Packer {
    size: usize,
    overlap: usize,
    buf: String,
    buf_chars: usize,
    has_new: bool,
    out: Vec<String>,
}

impl Packer {
    fn new(size: usize, overlap: usize) -> Self {
        Self {
            size,
            overlap,
            buf: String::new(),
            buf_chars: 0,
            has_new: false,
            out: Vec::new(),
        }
    }

    fn fits(&self, joiner: &str, unit_chars: usize) -> bool {
        self.buf.is_empty() || self.buf_chars + joiner.chars().count() + unit_chars <= self.size
    }

    fn push(&mut self, unit: &str, joiner: &str) {
        let unit_chars = unit.chars().count();
        if !self.fits(joiner, unit_chars) {
            if self.has_new {
                self.flush();
            }
            if !self.fits(joiner, unit_chars) {
                self.buf.clear();
                self.buf_chars = 0;
            }
        }
        if !self.buf.is_empty() {
            self.buf.push_str(joiner);
            self.buf_chars += joiner.chars().count();
        }
        self.buf.push_str(unit);
        self.buf_chars += unit_chars;
        self.has_new = true;
    }

    fn flush(&mut self) {
        let chunk = std::mem::take(&mut self.buf);
        self.buf = overlap_tail(&chunk, self.overlap);
        self.buf_chars = self.buf.chars().count();
        self.out.push(chunk);
        self.has_new = false;
    }

    fn finish(mut self) -> Vec<String> {
        if self.has_new {
            self.out.push(self.buf);
        }
        self.out
    }
}
