pub mod config;
pub mod context;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod index;
pub mod indexer;
pub mod ingest;
pub mod metadata;
pub mod models;
pub mod retriever;
pub mod segmenter;
pub mod snapshot;
pub mod tokens;

pub use config::OpenAiConfig;
pub use context::{AssembledContext, ContextAssembler, ContextOptions};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, OpenAiEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
    OPENAI_EMBEDDING_DIMENSIONS,
};
pub use engine::{AnswerEngine, ChatCompleter, OpenAiChatClient};
pub use error::{IngestError, SearchError};
pub use index::FlatIndex;
pub use indexer::{build_snapshot, expand_for_embedding};
pub use ingest::{
    discover_xml_files, ingest_folder_chunks, ingest_folder_chunks_best_effort, load_chunks,
    save_chunks, IngestionReport, SkippedDocument,
};
pub use metadata::{
    classify_program, classify_rule_type, document_metadata, extract_year, infer_from_filename,
};
pub use models::{
    Answer, Chunk, ChunkMetadata, FilterStrategy, Program, QueryFilters, RetrievalMode,
    RetrievalOutcome, RetrieverOptions, RuleType, SearchHit, SegmenterOptions, SourceRef,
};
pub use retriever::{infer_query_filters, FilteredRetriever};
pub use segmenter::{normalize_whitespace, segment_document};
pub use snapshot::Snapshot;
pub use tokens::{split_for_embedding, HeuristicTokenCounter, ModelProfile, TokenCounter};
