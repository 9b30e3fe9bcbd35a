use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// CMS payment program a rule document belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Program {
    Mpfs,
    Hospice,
    Snf,
    #[default]
    Unknown,
}

impl fmt::Display for Program {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Program::Mpfs => "MPFS",
            Program::Hospice => "HOSPICE",
            Program::Snf => "SNF",
            Program::Unknown => "UNKNOWN",
        };
        formatter.write_str(label)
    }
}

impl FromStr for Program {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "mpfs" => Ok(Program::Mpfs),
            "hospice" => Ok(Program::Hospice),
            "snf" => Ok(Program::Snf),
            "unknown" => Ok(Program::Unknown),
            other => Err(format!("unrecognized program: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleType {
    Proposed,
    Final,
    #[default]
    Unknown,
}

impl fmt::Display for RuleType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RuleType::Proposed => "PROPOSED",
            RuleType::Final => "FINAL",
            RuleType::Unknown => "UNKNOWN",
        };
        formatter.write_str(label)
    }
}

impl FromStr for RuleType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "proposed" => Ok(RuleType::Proposed),
            "final" => Ok(RuleType::Final),
            "unknown" => Ok(RuleType::Unknown),
            other => Err(format!("unrecognized rule type: {other}")),
        }
    }
}

/// Structured tags carried by every chunk of a source document.
///
/// Filename-inferred fields act as defaults; preamble fields fill their own
/// slots only when the document actually provides them. An absent optional
/// field never satisfies a filter requirement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ChunkMetadata {
    pub source_file: String,
    pub program: Program,
    pub rule_type: RuleType,
    pub year: Option<u16>,
    pub title: Option<String>,
    pub document_id: Option<String>,
    pub cfr: Option<String>,
    pub effective_date: Option<String>,
    pub subfolder: Option<String>,
    pub full_path: Option<String>,
}

/// A contiguous span of regulatory text with its section context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub section_header: String,
    pub chunk_index: u64,
    pub hash: String,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Hex SHA-256 of the final chunk text. Identity and dedup key,
    /// never an ordering key.
    pub fn content_hash(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// A copy of this chunk carrying different text, with the hash
    /// recomputed. Used when a chunk is re-split before embedding.
    pub fn with_text(&self, text: String) -> Chunk {
        Chunk {
            hash: Chunk::content_hash(&text),
            text,
            section_header: self.section_header.clone(),
            chunk_index: self.chunk_index,
            metadata: self.metadata.clone(),
        }
    }
}

/// A chunk ranked against one query embedding. Constructed per query,
/// never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub distance: f32,
}

/// Conjunctive metadata predicate: a chunk matches iff every specified
/// field matches exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct QueryFilters {
    pub program: Option<Program>,
    pub year: Option<u16>,
    pub rule_type: Option<RuleType>,
    /// Legacy case-insensitive substring match against the preamble title.
    /// Prefer `program`; exact match on structured fields is the canonical
    /// contract.
    pub title_contains: Option<String>,
}

impl QueryFilters {
    pub fn is_empty(&self) -> bool {
        self.program.is_none()
            && self.year.is_none()
            && self.rule_type.is_none()
            && self.title_contains.is_none()
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        if let Some(program) = self.program {
            if metadata.program != program {
                return false;
            }
        }
        if let Some(year) = self.year {
            if metadata.year != Some(year) {
                return false;
            }
        }
        if let Some(rule_type) = self.rule_type {
            if metadata.rule_type != rule_type {
                return false;
            }
        }
        if let Some(needle) = &self.title_contains {
            let matched = metadata
                .title
                .as_ref()
                .is_some_and(|title| title.to_lowercase().contains(&needle.to_lowercase()));
            if !matched {
                return false;
            }
        }
        true
    }
}

/// How a result set was produced. `FallbackUnfiltered` marks the
/// documented retry after a predicate matched nothing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RetrievalMode {
    Unfiltered,
    Filtered,
    FallbackUnfiltered,
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RetrievalMode::Unfiltered => "unfiltered",
            RetrievalMode::Filtered => "filtered",
            RetrievalMode::FallbackUnfiltered => "fallback-unfiltered",
        };
        formatter.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalOutcome {
    pub hits: Vec<SearchHit>,
    pub mode: RetrievalMode,
}

/// Attribution for one chunk that made it into the generation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub source_id: usize,
    pub text_preview: String,
    pub distance: f32,
    pub metadata: ChunkMetadata,
}

impl SourceRef {
    const PREVIEW_CHARS: usize = 100;

    pub fn new(source_id: usize, hit: &SearchHit) -> Self {
        let text = &hit.chunk.text;
        let text_preview = if text.chars().count() > Self::PREVIEW_CHARS {
            let clipped: String = text.chars().take(Self::PREVIEW_CHARS).collect();
            format!("{clipped}...")
        } else {
            text.clone()
        };
        Self {
            source_id,
            text_preview,
            distance: hit.distance,
            metadata: hit.chunk.metadata.clone(),
        }
    }
}

/// Structured Q&A result. A failed upstream call degrades to a
/// zero-confidence answer instead of an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub confidence: f32,
    pub sources_used: Vec<SourceRef>,
    pub total_sources: usize,
    pub retrieval: RetrievalMode,
    pub query: String,
}

impl Answer {
    pub fn degraded(query: &str, answer: String, retrieval: RetrievalMode) -> Self {
        Self {
            answer,
            confidence: 0.0,
            sources_used: Vec::new(),
            total_sources: 0,
            retrieval,
            query: query.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SegmenterOptions {
    /// Running word count at which a buffer closes into a chunk.
    pub chunk_words: usize,
    /// Trailing `". "`-delimited segments of a closed chunk carried into
    /// the next one.
    pub overlap_sentences: usize,
}

impl Default for SegmenterOptions {
    fn default() -> Self {
        Self {
            chunk_words: 500,
            overlap_sentences: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterStrategy {
    /// Search the full index for `k * oversample_factor` candidates, then
    /// keep the first k that satisfy the predicate.
    #[default]
    OverFetch,
    /// Restrict the store by predicate first and search a temporary index
    /// built over only the matching vectors. Useful for very selective
    /// predicates.
    SubsetReindex,
}

#[derive(Debug, Clone)]
pub struct RetrieverOptions {
    pub oversample_factor: usize,
    pub strategy: FilterStrategy,
}

impl Default for RetrieverOptions {
    fn default() -> Self {
        Self {
            oversample_factor: 5,
            strategy: FilterStrategy::OverFetch,
        }
    }
}
