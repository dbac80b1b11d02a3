use sha2::{Digest, Sha256};

use crate::core::config::CHUNK_SIZE;

/// Lowercase hex SHA-256 of `data`; the content address of a chunk.
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub hash: String,
    pub data: Vec<u8>,
}

impl Chunk {
    pub fn new(index: usize, data: Vec<u8>) -> Self {
        let hash = content_hash(&data);
        Self { index, hash, data }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn verify(&self) -> bool {
        content_hash(&self.data) == self.hash
    }
}

/// Split `content` into consecutive `CHUNK_SIZE` slices; the last one holds
/// the remainder. Empty input yields no chunks.
pub fn split_chunks(content: &[u8]) -> Vec<Chunk> {
    content
        .chunks(CHUNK_SIZE)
        .enumerate()
        .map(|(index, data)| Chunk::new(index, data.to_vec()))
        .collect()
}
