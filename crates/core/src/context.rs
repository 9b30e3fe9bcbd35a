use crate::models::{Chunk, SearchHit};
use crate::tokens::{HeuristicTokenCounter, ModelProfile, TokenCounter};

#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub token_limit: usize,
    pub profile: ModelProfile,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            token_limit: 4_000,
            profile: ModelProfile::GPT_4O_MINI,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssembledContext {
    pub text: String,
    pub used: Vec<SearchHit>,
}

/// Packs ranked chunks into a token-budgeted context string.
///
/// Chunks are taken strictly in the given order; the first candidate that
/// would push the context past the limit stops assembly, so `used` is
/// always a prefix of the input. Zero packed chunks is a valid outcome
/// meaning "no usable context".
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    counter: HeuristicTokenCounter,
    token_limit: usize,
}

impl ContextAssembler {
    pub fn new(options: &ContextOptions) -> Self {
        Self {
            counter: HeuristicTokenCounter::for_profile(&options.profile),
            token_limit: options.token_limit,
        }
    }

    pub fn assemble(&self, hits: &[SearchHit]) -> AssembledContext {
        let mut text = String::new();
        let mut used = Vec::new();

        for (position, hit) in hits.iter().enumerate() {
            let section = format_section(position + 1, &hit.chunk);
            let candidate = if text.is_empty() {
                section
            } else {
                format!("{text}\n\n{section}")
            };
            if self.counter.count(&candidate) > self.token_limit {
                break;
            }
            text = candidate;
            used.push(hit.clone());
        }

        AssembledContext { text, used }
    }
}

fn format_section(source_id: usize, chunk: &Chunk) -> String {
    if chunk.section_header.is_empty() {
        format!("[Source {source_id}] {}", chunk.text)
    } else {
        format!(
            "[Source {source_id}] {}\n{}",
            chunk.section_header, chunk.text
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, ChunkMetadata};
    use crate::tokens::HeuristicTokenCounter;

    const PROFILE: ModelProfile = ModelProfile {
        name: "tiny-test-profile",
        chars_per_token: 1.0,
        context_window: 1_000,
        max_embedding_tokens: 1_000,
        safety_margin: 0,
    };

    fn hit(text: &str, distance: f32) -> SearchHit {
        SearchHit {
            chunk: Chunk {
                hash: Chunk::content_hash(text),
                text: text.to_string(),
                section_header: "III. Rates".to_string(),
                chunk_index: 0,
                metadata: ChunkMetadata::default(),
            },
            distance,
        }
    }

    fn assembler(token_limit: usize) -> ContextAssembler {
        ContextAssembler::new(&ContextOptions {
            token_limit,
            profile: PROFILE,
        })
    }

    #[test]
    fn context_never_exceeds_the_token_limit() {
        let hits = vec![hit("aaaa aaaa", 0.1), hit("bbbb bbbb", 0.2), hit("cccc", 0.3)];
        let counter = HeuristicTokenCounter::for_profile(&PROFILE);

        for limit in [10, 40, 80, 500] {
            let assembled = assembler(limit).assemble(&hits);
            assert!(
                counter.count(&assembled.text) <= limit,
                "limit {limit} was exceeded"
            );
        }
    }

    #[test]
    fn used_chunks_are_a_strict_prefix_of_the_ranking() {
        // The second chunk alone blows the budget; the third would fit but
        // must not be pulled forward.
        let hits = vec![hit("small", 0.1), hit(&"x".repeat(300), 0.2), hit("tiny", 0.3)];
        let assembled = assembler(60).assemble(&hits);

        assert_eq!(assembled.used.len(), 1);
        assert_eq!(assembled.used[0].chunk.text, "small");
        assert!(!assembled.text.contains("tiny"));
    }

    #[test]
    fn an_oversized_first_chunk_yields_empty_context() {
        let hits = vec![hit(&"z".repeat(500), 0.1)];
        let assembled = assembler(50).assemble(&hits);

        assert!(assembled.text.is_empty());
        assert!(assembled.used.is_empty());
    }

    #[test]
    fn sections_are_labeled_in_rank_order() {
        let hits = vec![hit("first chunk", 0.1), hit("second chunk", 0.2)];
        let assembled = assembler(500).assemble(&hits);

        assert!(assembled.text.starts_with("[Source 1] III. Rates\nfirst chunk"));
        assert!(assembled.text.contains("[Source 2] III. Rates\nsecond chunk"));
        assert_eq!(assembled.used.len(), 2);
    }

    #[test]
    fn assembly_is_deterministic() {
        let hits = vec![hit("first chunk", 0.1), hit("second chunk", 0.2)];
        let first = assembler(500).assemble(&hits);
        let second = assembler(500).assemble(&hits);
        assert_eq!(first.text, second.text);
    }
}
