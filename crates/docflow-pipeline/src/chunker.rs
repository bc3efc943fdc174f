//! Sentence-aware text chunking with overlap.
//!
//! Sentences are detected on punctuation followed by whitespace, with an
//! abbreviation exception list so "Dr. Smith" does not split. Sentences
//! accumulate into a buffer until the chunk size is reached; a trailing
//! run of sentences proportional to overlap/chunk_size is carried into
//! the next buffer as overlap seed.

use serde_json::json;
use uuid::Uuid;

use docflow_core::defaults;
use docflow_core::Chunk;

/// Abbreviations that end with a period but do not end a sentence.
const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "rev", "hon", "sr", "jr", "st",
    "ph.d", "m.d", "b.a", "m.a", "b.s", "m.s", "d.d.s", "j.d",
    "etc", "e.g", "i.e", "vs", "approx", "dept", "est", "fig", "no",
    "inc", "ltd", "co", "corp",
];

/// Chunking parameters.
#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Overlap carried between adjacent chunks, in characters.
    pub chunk_overlap: usize,
    /// Chunks shorter than this are merged into their predecessor.
    pub min_chunk_size: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: defaults::CHUNK_SIZE,
            chunk_overlap: defaults::CHUNK_OVERLAP,
            min_chunk_size: defaults::CHUNK_MIN_SIZE,
        }
    }
}

/// Sentence-aware chunker.
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split text into sentences.
    ///
    /// A boundary is sentence-ending punctuation followed by whitespace,
    /// unless the preceding word is a known abbreviation.
    pub fn split_sentences(text: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let chars: Vec<char> = text.chars().collect();
        let mut start = 0;

        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if matches!(c, '.' | '!' | '?') {
                // Absorb runs of punctuation ("?!", "...").
                let mut end = i + 1;
                while end < chars.len() && matches!(chars[end], '.' | '!' | '?') {
                    end += 1;
                }

                let followed_by_space = end >= chars.len() || chars[end].is_whitespace();
                if followed_by_space && !Self::ends_with_abbreviation(&chars[start..i]) {
                    let sentence: String = chars[start..end].iter().collect();
                    let sentence = sentence.trim().to_string();
                    if !sentence.is_empty() {
                        sentences.push(sentence);
                    }
                    start = end;
                }
                i = end;
            } else {
                i += 1;
            }
        }

        let tail: String = chars[start.min(chars.len())..].iter().collect();
        let tail = tail.trim().to_string();
        if !tail.is_empty() {
            sentences.push(tail);
        }

        sentences
    }

    fn ends_with_abbreviation(prefix: &[char]) -> bool {
        let text: String = prefix.iter().collect();
        let last_word = text
            .rsplit(|c: char| c.is_whitespace())
            .next()
            .unwrap_or("");
        if last_word.is_empty() {
            return false;
        }
        let normalized = last_word.trim_end_matches('.').to_lowercase();
        // Single letters ("A. Smith", middle initials) also stay joined.
        normalized.chars().count() == 1 && normalized.chars().all(char::is_alphabetic)
            || ABBREVIATIONS.contains(&normalized.as_str())
    }

    /// Chunk a full text without page information.
    pub fn chunk(&self, document_id: Uuid, text: &str) -> Vec<Chunk> {
        let pieces = self.chunk_text(text);
        self.into_chunks(document_id, pieces.into_iter().map(|t| (t, None)).collect())
    }

    /// Page-aware chunking: each page is chunked independently, indices
    /// are renumbered globally, and page_number is preserved per chunk.
    pub fn chunk_pages(&self, document_id: Uuid, pages: &[(i32, String)]) -> Vec<Chunk> {
        let mut pieces: Vec<(String, Option<i32>)> = Vec::new();
        for (page_number, page_text) in pages {
            for text in self.chunk_text(page_text) {
                pieces.push((text, Some(*page_number)));
            }
        }
        self.into_chunks(document_id, pieces)
    }

    fn into_chunks(&self, document_id: Uuid, pieces: Vec<(String, Option<i32>)>) -> Vec<Chunk> {
        pieces
            .into_iter()
            .enumerate()
            .map(|(index, (text, page_number))| Chunk {
                id: docflow_core::uuid_utils::new_v7(),
                document_id,
                chunk_index: index as i32,
                text,
                embedding: Vec::new(),
                page_number,
                metadata: json!({
                    "chunk_size": self.config.chunk_size,
                    "chunk_overlap": self.config.chunk_overlap,
                    "position": index,
                }),
            })
            .collect()
    }

    /// Core accumulation loop over sentences.
    fn chunk_text(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let sentences = Self::split_sentences(text);
        let mut chunks: Vec<String> = Vec::new();
        let mut buffer: Vec<String> = Vec::new();
        let mut buffer_len = 0;

        for sentence in sentences {
            if !buffer.is_empty() && buffer_len + sentence.len() + 1 > self.config.chunk_size {
                chunks.push(buffer.join(" "));

                // Carry trailing sentences as overlap seed.
                let overlap = Self::overlap_tail(&buffer, self.config.chunk_overlap);
                buffer = overlap;
                buffer_len = buffer.iter().map(|s| s.len() + 1).sum();
            }
            buffer_len += sentence.len() + 1;
            buffer.push(sentence);
        }

        if !buffer.is_empty() {
            let tail = buffer.join(" ");
            // Merge an undersized tail into the previous chunk rather than
            // emitting a fragment, unless the tail is pure overlap.
            match chunks.last_mut() {
                Some(last) if tail.len() < self.config.min_chunk_size => {
                    if !last.ends_with(&tail) {
                        last.push(' ');
                        last.push_str(&tail);
                    }
                }
                _ => {
                    if chunks.last().map(|l| l.ends_with(&tail)) != Some(true) {
                        chunks.push(tail);
                    }
                }
            }
        }

        chunks
    }

    fn overlap_tail(buffer: &[String], overlap: usize) -> Vec<String> {
        let mut tail: Vec<String> = Vec::new();
        let mut len = 0;
        for sentence in buffer.iter().rev() {
            if len >= overlap {
                break;
            }
            len += sentence.len() + 1;
            tail.push(sentence.clone());
        }
        // Never carry the whole buffer or overlap degenerates into
        // duplicate chunks.
        if tail.len() == buffer.len() {
            tail.pop();
        }
        tail.reverse();
        tail
    }
}
