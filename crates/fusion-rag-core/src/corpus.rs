//! Ordered chunk store for one index generation.
//!
//! The corpus owns the chunk content and metadata. The lexical and dense
//! indices only hold derived structures keyed by ordinal id, so every
//! candidate they return is resolved back to its text here.

use std::sync::Arc;

use crate::models::Chunk;

#[derive(Debug, Clone)]
pub struct CorpusStore {
    generation: u64,
    chunks: Arc<[Chunk]>,
}

impl CorpusStore {
    /// Take ownership of `chunks`, stamping each with its position as `ordinal_id`.
    pub fn build(generation: u64, chunks: Vec<Chunk>) -> Self {
        let chunks: Vec<Chunk> = chunks
            .into_iter()
            .enumerate()
            .map(|(ordinal_id, mut chunk)| {
                chunk.ordinal_id = ordinal_id;
                chunk
            })
            .collect();
        Self {
            generation,
            chunks: chunks.into(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, ordinal_id: usize) -> Option<&Chunk> {
        self.chunks.get(ordinal_id)
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
