//! Token accounting for context budgets and the embedding-request ceiling.
//!
//! Structural segmentation is word-based and can under-estimate token
//! counts for dense text, so a second, token-aware stage runs before
//! embedding and enforces the per-request ceiling. The two stages stay
//! separate on purpose.

/// Static description of a model's token behavior.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelProfile {
    pub name: &'static str,
    pub chars_per_token: f32,
    pub context_window: usize,
    /// Hard per-request ceiling of the embedding API.
    pub max_embedding_tokens: usize,
    /// Headroom subtracted from every ceiling comparison.
    pub safety_margin: usize,
}

impl ModelProfile {
    pub const ADA_002: Self = Self {
        name: "text-embedding-ada-002",
        chars_per_token: 4.0,
        context_window: 8_191,
        max_embedding_tokens: 8_191,
        safety_margin: 50,
    };

    pub const GPT_4O_MINI: Self = Self {
        name: "gpt-4o-mini",
        chars_per_token: 4.0,
        context_window: 128_000,
        max_embedding_tokens: 8_191,
        safety_margin: 50,
    };

    pub fn embedding_ceiling(&self) -> usize {
        self.max_embedding_tokens.saturating_sub(self.safety_margin)
    }
}

/// Deterministic token accounting: identical input always yields an
/// identical count, so budget decisions are reproducible.
pub trait TokenCounter {
    fn count(&self, text: &str) -> usize;

    /// Longest prefix of `text` whose count stays within `max_tokens`.
    fn truncate(&self, text: &str, max_tokens: usize) -> String;
}

/// Character-ratio estimator over a model profile.
#[derive(Debug, Clone, Copy)]
pub struct HeuristicTokenCounter {
    chars_per_token: f32,
}

impl HeuristicTokenCounter {
    pub fn for_profile(profile: &ModelProfile) -> Self {
        Self {
            chars_per_token: profile.chars_per_token,
        }
    }
}

impl Default for HeuristicTokenCounter {
    fn default() -> Self {
        Self::for_profile(&ModelProfile::ADA_002)
    }
}

impl TokenCounter for HeuristicTokenCounter {
    fn count(&self, text: &str) -> usize {
        let chars = text.chars().count();
        if chars == 0 {
            return 0;
        }
        (chars as f32 / self.chars_per_token).ceil() as usize
    }

    fn truncate(&self, text: &str, max_tokens: usize) -> String {
        let max_chars = (max_tokens as f32 * self.chars_per_token).floor() as usize;
        text.chars().take(max_chars).collect()
    }
}

/// Splits one text into pieces that each fit under the embedding ceiling.
///
/// Sentence-greedy on the literal `". "` separator; a piece that still
/// exceeds the ceiling after splitting (one enormous sentence) is hard
/// truncated. Returns the input unchanged when it already fits.
pub fn split_for_embedding<C: TokenCounter>(
    text: &str,
    counter: &C,
    profile: &ModelProfile,
) -> Vec<String> {
    let ceiling = profile.embedding_ceiling();
    if counter.count(text) <= ceiling {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut current = String::new();
    for sentence in text.split(". ") {
        let mut candidate = current.clone();
        candidate.push_str(sentence);
        if counter.count(&candidate) < ceiling {
            current.push_str(sentence);
            current.push_str(". ");
        } else {
            if !current.trim().is_empty() {
                parts.push(current.trim().to_string());
            }
            current = format!("{sentence}. ");
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }

    parts
        .into_iter()
        .map(|part| {
            if counter.count(&part) > ceiling {
                counter.truncate(&part, ceiling)
            } else {
                part
            }
        })
        .filter(|part| !part.trim().is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TINY: ModelProfile = ModelProfile {
        name: "tiny-test-profile",
        chars_per_token: 1.0,
        context_window: 100,
        max_embedding_tokens: 30,
        safety_margin: 5,
    };

    #[test]
    fn counting_is_deterministic_and_monotone() {
        let counter = HeuristicTokenCounter::default();
        let text = "The hospice cap amount is updated annually.";
        assert_eq!(counter.count(text), counter.count(text));
        assert!(counter.count(text) > counter.count("short"));
        assert_eq!(counter.count(""), 0);
    }

    #[test]
    fn truncation_respects_the_token_limit() {
        let counter = HeuristicTokenCounter::for_profile(&TINY);
        let text = "x".repeat(200);
        let clipped = counter.truncate(&text, 10);
        assert!(counter.count(&clipped) <= 10);
        assert_eq!(clipped.chars().count(), 10);
    }

    #[test]
    fn short_text_passes_through_unsplit() {
        let counter = HeuristicTokenCounter::for_profile(&TINY);
        let parts = split_for_embedding("short text", &counter, &TINY);
        assert_eq!(parts, vec!["short text".to_string()]);
    }

    #[test]
    fn every_split_part_fits_under_the_ceiling() {
        let counter = HeuristicTokenCounter::for_profile(&TINY);
        let text = "aaaa aaaa. bbbb bbbb. cccc cccc. dddd dddd. eeee eeee. ffff ffff";
        let parts = split_for_embedding(text, &counter, &TINY);

        assert!(parts.len() > 1);
        for part in &parts {
            assert!(
                counter.count(part) <= TINY.embedding_ceiling(),
                "part exceeded ceiling: {part:?}"
            );
        }
    }

    #[test]
    fn a_single_giant_sentence_is_hard_truncated() {
        let counter = HeuristicTokenCounter::for_profile(&TINY);
        let text = "y".repeat(500);
        let parts = split_for_embedding(&text, &counter, &TINY);

        assert_eq!(parts.len(), 1);
        assert!(counter.count(&parts[0]) <= TINY.embedding_ceiling());
    }

    #[test]
    fn splitting_is_deterministic() {
        let counter = HeuristicTokenCounter::for_profile(&TINY);
        let text = "one two three. four five six. seven eight nine. ten eleven twelve";
        assert_eq!(
            split_for_embedding(text, &counter, &TINY),
            split_for_embedding(text, &counter, &TINY)
        );
    }
}
