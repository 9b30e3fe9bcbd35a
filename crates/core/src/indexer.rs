//! Builds a serving snapshot from segmented chunks: enforce the embedding
//! token ceiling, batch by token budget, embed, index.

use crate::embeddings::Embedder;
use crate::error::IngestError;
use crate::index::FlatIndex;
use crate::models::Chunk;
use crate::snapshot::Snapshot;
use crate::tokens::{split_for_embedding, ModelProfile, TokenCounter};

/// Re-splits any chunk whose text exceeds the embedding ceiling. Each
/// piece becomes a full chunk record with a recomputed hash, so the
/// persisted store stays 1:1 with the vectors the index will hold.
pub fn expand_for_embedding<C: TokenCounter>(
    chunks: Vec<Chunk>,
    counter: &C,
    profile: &ModelProfile,
) -> Vec<Chunk> {
    let mut records = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        let parts = split_for_embedding(&chunk.text, counter, profile);
        if parts.len() == 1 && parts[0] == chunk.text {
            records.push(chunk);
        } else {
            records.extend(parts.into_iter().map(|part| chunk.with_text(part)));
        }
    }
    records
}

/// Embeds all records under a per-request token budget and builds the
/// flat index. Parity `index.ntotal() == chunks.len()` holds by
/// construction, including for an empty corpus.
pub async fn build_snapshot<E, C>(
    chunks: Vec<Chunk>,
    embedder: &E,
    counter: &C,
    profile: &ModelProfile,
) -> Result<Snapshot, IngestError>
where
    E: Embedder,
    C: TokenCounter,
{
    let records = expand_for_embedding(chunks, counter, profile);
    let budget = profile.embedding_ceiling();

    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(records.len());
    let mut batch: Vec<String> = Vec::new();
    let mut batch_tokens = 0usize;

    for record in &records {
        let tokens = counter.count(&record.text);
        if !batch.is_empty() && batch_tokens + tokens > budget {
            let embedded = embedder
                .embed_batch(&batch)
                .await
                .map_err(|error| IngestError::Embedding(error.to_string()))?;
            vectors.extend(embedded);
            batch.clear();
            batch_tokens = 0;
        }
        batch.push(record.text.clone());
        batch_tokens += tokens;
    }
    if !batch.is_empty() {
        let embedded = embedder
            .embed_batch(&batch)
            .await
            .map_err(|error| IngestError::Embedding(error.to_string()))?;
        vectors.extend(embedded);
    }

    let index = FlatIndex::build(embedder.dimensions(), &vectors)?;
    Ok(Snapshot::new(index, records))
}
