use crate::error::SearchError;
use crate::index::FlatIndex;
use crate::metadata::{classify_program, classify_rule_type, extract_year};
use crate::models::{
    FilterStrategy, Program, QueryFilters, RetrievalMode, RetrievalOutcome, RetrieverOptions,
    RuleType, SearchHit,
};
use crate::snapshot::Snapshot;
use std::sync::Arc;
use tracing::warn;

/// Best-effort structured filters from free query text. Fields that cannot
/// be resolved stay unset, widening the search; this layer never fails.
pub fn infer_query_filters(query: &str) -> QueryFilters {
    let program = match classify_program(query) {
        Program::Unknown => None,
        program => Some(program),
    };
    let rule_type = match classify_rule_type(query) {
        RuleType::Unknown => None,
        rule_type => Some(rule_type),
    };
    QueryFilters {
        program,
        year: extract_year(query),
        rule_type,
        title_contains: None,
    }
}

/// Ranks chunks by vector distance, optionally restricted to a metadata
/// predicate, over one consistent snapshot.
pub struct FilteredRetriever {
    snapshot: Arc<Snapshot>,
    options: RetrieverOptions,
}

impl FilteredRetriever {
    pub fn new(snapshot: Arc<Snapshot>, options: RetrieverOptions) -> Self {
        Self { snapshot, options }
    }

    /// Filtered search with the documented fallback: a predicate that
    /// matches nothing triggers a logged unfiltered retry, flagged in the
    /// outcome as `FallbackUnfiltered`.
    pub fn search(
        &self,
        query_vector: &[f32],
        filters: &QueryFilters,
        k: usize,
    ) -> Result<RetrievalOutcome, SearchError> {
        if filters.is_empty() {
            return Ok(RetrievalOutcome {
                hits: self.search_unfiltered(query_vector, k)?,
                mode: RetrievalMode::Unfiltered,
            });
        }

        let hits = match self.options.strategy {
            FilterStrategy::OverFetch => self.overfetch_filtered(query_vector, filters, k)?,
            FilterStrategy::SubsetReindex => self.subset_filtered(query_vector, filters, k)?,
        };

        if hits.is_empty() {
            warn!(?filters, "metadata filters matched no chunks; retrying unfiltered");
            return Ok(RetrievalOutcome {
                hits: self.search_unfiltered(query_vector, k)?,
                mode: RetrievalMode::FallbackUnfiltered,
            });
        }

        Ok(RetrievalOutcome {
            hits,
            mode: RetrievalMode::Filtered,
        })
    }

    pub fn search_unfiltered(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let raw = self.snapshot.index.search(query_vector, k)?;
        Ok(self.resolve(raw))
    }

    /// Fetch `k * oversample_factor` candidates from the full index and
    /// keep the first k predicate-survivors in rank order. Fewer survivors
    /// than k are returned as-is, never padded.
    fn overfetch_filtered(
        &self,
        query_vector: &[f32],
        filters: &QueryFilters,
        k: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let ntotal = self.snapshot.index.ntotal();
        let search_k = k
            .saturating_mul(self.options.oversample_factor.max(1))
            .min(ntotal);
        let raw = self.snapshot.index.search(query_vector, search_k)?;

        let mut hits = Vec::new();
        for (position, distance) in raw {
            let Some(chunk) = self.snapshot.chunk(position) else {
                warn!(
                    position,
                    chunks = self.snapshot.chunks.len(),
                    "index position has no chunk record; skipping"
                );
                continue;
            };
            if filters.matches(&chunk.metadata) {
                hits.push(SearchHit {
                    chunk: chunk.clone(),
                    distance,
                });
                if hits.len() >= k {
                    break;
                }
            }
        }
        Ok(hits)
    }

    /// Restrict the store by predicate first, then search a temporary
    /// index over only the matching vectors.
    fn subset_filtered(
        &self,
        query_vector: &[f32],
        filters: &QueryFilters,
        k: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let ntotal = self.snapshot.index.ntotal();
        let positions: Vec<usize> = self
            .snapshot
            .chunks
            .iter()
            .enumerate()
            .take(ntotal)
            .filter(|(_, chunk)| filters.matches(&chunk.metadata))
            .map(|(position, _)| position)
            .collect();

        if positions.is_empty() {
            return Ok(Vec::new());
        }

        let vectors: Vec<Vec<f32>> = positions
            .iter()
            .filter_map(|&position| self.snapshot.index.vector(position).map(<[f32]>::to_vec))
            .collect();
        let subset = FlatIndex::build(self.snapshot.index.dimension(), &vectors)
            .map_err(|error| SearchError::Request(error.to_string()))?;

        let raw = subset.search(query_vector, k)?;
        Ok(raw
            .into_iter()
            .filter_map(|(subset_position, distance)| {
                let position = *positions.get(subset_position)?;
                let chunk = self.snapshot.chunk(position)?;
                Some(SearchHit {
                    chunk: chunk.clone(),
                    distance,
                })
            })
            .collect())
    }

    fn resolve(&self, raw: Vec<(usize, f32)>) -> Vec<SearchHit> {
        let mut hits = Vec::with_capacity(raw.len());
        for (position, distance) in raw {
            match self.snapshot.chunk(position) {
                Some(chunk) => hits.push(SearchHit {
                    chunk: chunk.clone(),
                    distance,
                }),
                None => warn!(
                    position,
                    chunks = self.snapshot.chunks.len(),
                    "index position has no chunk record; skipping"
                ),
            }
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, ChunkMetadata};

    fn chunk(text: &str, program: Program, year: u16) -> Chunk {
        Chunk {
            hash: Chunk::content_hash(text),
            text: text.to_string(),
            section_header: "I. Summary".to_string(),
            chunk_index: 0,
            metadata: ChunkMetadata {
                source_file: format!("{year}-{program}.xml"),
                program,
                rule_type: RuleType::Final,
                year: Some(year),
                ..ChunkMetadata::default()
            },
        }
    }

    // Four chunks on the unit axes of a 4-dim space, so rank order against
    // any query is obvious from the coordinates.
    fn snapshot() -> Arc<Snapshot> {
        let vectors = vec![
            vec![1.0, 0.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0, 0.0],
            vec![0.0, 0.0, 1.0, 0.0],
            vec![0.0, 0.0, 0.0, 1.0],
        ];
        let chunks = vec![
            chunk("hospice cap", Program::Hospice, 2023),
            chunk("snf rates", Program::Snf, 2023),
            chunk("snf quality", Program::Snf, 2024),
            chunk("mpfs conversion", Program::Mpfs, 2024),
        ];
        let index = FlatIndex::build(4, &vectors).expect("build should succeed");
        Arc::new(Snapshot::new(index, chunks))
    }

    fn retriever(strategy: FilterStrategy) -> FilteredRetriever {
        FilteredRetriever::new(
            snapshot(),
            RetrieverOptions {
                oversample_factor: 5,
                strategy,
            },
        )
    }

    #[test]
    fn every_filtered_hit_satisfies_the_predicate() {
        let filters = QueryFilters {
            program: Some(Program::Snf),
            ..QueryFilters::default()
        };
        let query = [0.9, 0.1, 0.0, 0.0];

        for strategy in [FilterStrategy::OverFetch, FilterStrategy::SubsetReindex] {
            let outcome = retriever(strategy)
                .search(&query, &filters, 2)
                .expect("search should succeed");

            assert_eq!(outcome.mode, RetrievalMode::Filtered);
            assert!(outcome.hits.len() <= 2);
            assert!(!outcome.hits.is_empty());
            assert!(outcome
                .hits
                .iter()
                .all(|hit| hit.chunk.metadata.program == Program::Snf));
        }
    }

    #[test]
    fn both_strategies_agree_on_a_selective_predicate() {
        let filters = QueryFilters {
            program: Some(Program::Snf),
            year: Some(2024),
            ..QueryFilters::default()
        };
        let query = [0.2, 0.2, 0.9, 0.1];

        let over = retriever(FilterStrategy::OverFetch)
            .search(&query, &filters, 3)
            .expect("search should succeed");
        let subset = retriever(FilterStrategy::SubsetReindex)
            .search(&query, &filters, 3)
            .expect("search should succeed");

        let over_hashes: Vec<&str> = over.hits.iter().map(|hit| hit.chunk.hash.as_str()).collect();
        let subset_hashes: Vec<&str> = subset
            .hits
            .iter()
            .map(|hit| hit.chunk.hash.as_str())
            .collect();
        assert_eq!(over_hashes, subset_hashes);
    }

    #[test]
    fn fewer_survivors_than_k_are_returned_unpadded() {
        let filters = QueryFilters {
            program: Some(Program::Hospice),
            ..QueryFilters::default()
        };
        let outcome = retriever(FilterStrategy::OverFetch)
            .search(&[0.0, 0.0, 0.0, 1.0], &filters, 3)
            .expect("search should succeed");

        assert_eq!(outcome.mode, RetrievalMode::Filtered);
        assert_eq!(outcome.hits.len(), 1);
    }

    #[test]
    fn exhausted_filters_fall_back_to_unfiltered_with_a_flag() {
        let filters = QueryFilters {
            program: Some(Program::Hospice),
            year: Some(2031),
            ..QueryFilters::default()
        };
        let outcome = retriever(FilterStrategy::OverFetch)
            .search(&[1.0, 0.0, 0.0, 0.0], &filters, 2)
            .expect("search should succeed");

        assert_eq!(outcome.mode, RetrievalMode::FallbackUnfiltered);
        assert_eq!(outcome.hits.len(), 2);
    }

    #[test]
    fn empty_filters_search_the_whole_corpus() {
        let outcome = retriever(FilterStrategy::OverFetch)
            .search(&[0.0, 1.0, 0.0, 0.0], &QueryFilters::default(), 10)
            .expect("search should succeed");

        assert_eq!(outcome.mode, RetrievalMode::Unfiltered);
        assert_eq!(outcome.hits.len(), 4);
        assert_eq!(outcome.hits[0].chunk.metadata.program, Program::Snf);
    }

    #[test]
    fn empty_index_returns_empty_hits() {
        let index = FlatIndex::new(4).expect("new should succeed");
        let retriever = FilteredRetriever::new(
            Arc::new(Snapshot::new(index, Vec::new())),
            RetrieverOptions::default(),
        );

        let outcome = retriever
            .search(&[0.0, 0.0, 0.0, 0.0], &QueryFilters::default(), 5)
            .expect("search should succeed");
        assert!(outcome.hits.is_empty());
    }

    #[test]
    fn positions_without_chunk_records_are_skipped() {
        // Simulates a store/index inconsistency: four vectors, two records.
        let vectors = vec![
            vec![1.0, 0.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0, 0.0],
            vec![0.0, 0.0, 1.0, 0.0],
            vec![0.0, 0.0, 0.0, 1.0],
        ];
        let chunks = vec![
            chunk("hospice cap", Program::Hospice, 2023),
            chunk("snf rates", Program::Snf, 2023),
        ];
        let index = FlatIndex::build(4, &vectors).expect("build should succeed");
        let retriever = FilteredRetriever::new(
            Arc::new(Snapshot::new(index, chunks)),
            RetrieverOptions::default(),
        );

        let hits = retriever
            .search_unfiltered(&[0.0, 0.0, 0.5, 0.5], 4)
            .expect("search should succeed");
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn query_filters_are_inferred_from_free_text() {
        let filters = infer_query_filters("What snf payment updates apply for 2023?");
        assert_eq!(filters.program, Some(Program::Snf));
        assert_eq!(filters.year, Some(2023));
        assert_eq!(filters.rule_type, None);

        let filters = infer_query_filters("hospice proposed rule wage index");
        assert_eq!(filters.program, Some(Program::Hospice));
        assert_eq!(filters.rule_type, Some(RuleType::Proposed));
        assert_eq!(filters.year, None);

        let filters = infer_query_filters("how are payment rates set?");
        assert!(filters.is_empty());
    }
}
