use crate::error::IngestError;
use crate::index::FlatIndex;
use crate::models::Chunk;
use std::fs;
use std::path::Path;
use tracing::warn;

/// The immutable serving unit: one vector index paired 1:1 with the chunk
/// store it was built from.
///
/// Queries hold an `Arc<Snapshot>`; re-ingestion builds a fresh snapshot
/// and swaps the reference, so a query can never read vectors from one
/// build and chunk records from another.
#[derive(Debug)]
pub struct Snapshot {
    pub index: FlatIndex,
    pub chunks: Vec<Chunk>,
}

impl Snapshot {
    pub fn new(index: FlatIndex, chunks: Vec<Chunk>) -> Self {
        Self { index, chunks }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk(&self, position: usize) -> Option<&Chunk> {
        self.chunks.get(position)
    }

    /// Warns when the index and the chunk store disagree in size. Non-fatal:
    /// lookups stay bounds-checked and queries proceed degraded.
    pub fn check_consistency(&self) -> bool {
        let vectors = self.index.ntotal();
        if vectors != self.chunks.len() {
            warn!(
                vectors,
                chunks = self.chunks.len(),
                "index size disagrees with chunk store; position lookups will be bounds-checked"
            );
            return false;
        }
        true
    }

    pub fn save(&self, index_path: &Path, chunks_path: &Path) -> Result<(), IngestError> {
        for path in [index_path, chunks_path] {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }
        self.index.save(index_path)?;
        let payload = serde_json::to_vec_pretty(&self.chunks)?;
        fs::write(chunks_path, payload)?;
        Ok(())
    }

    pub fn load(index_path: &Path, chunks_path: &Path) -> Result<Self, IngestError> {
        let index = FlatIndex::load(index_path)?;
        let raw = fs::read_to_string(chunks_path)?;
        let chunks: Vec<Chunk> = serde_json::from_str(&raw)?;

        let snapshot = Self::new(index, chunks);
        snapshot.check_consistency();
        Ok(snapshot)
    }
}
