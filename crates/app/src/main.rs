use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use reg_search_core::{
    build_snapshot, infer_query_filters, ingest_folder_chunks_best_effort, AnswerEngine,
    CharacterNgramEmbedder, ContextOptions, Embedder, FilteredRetriever, HeuristicTokenCounter,
    ModelProfile, OpenAiChatClient, OpenAiConfig, OpenAiEmbedder, Program, QueryFilters,
    RetrieverOptions, RuleType, SegmenterOptions, Snapshot,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "reg-search-engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the persisted index and chunk store.
    #[arg(long, default_value = "./rag_data")]
    data_dir: PathBuf,

    /// Use the local deterministic embedder instead of the OpenAI API.
    #[arg(long, default_value_t = false)]
    offline: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Segment a folder of regulation XML and build the vector index.
    Ingest {
        /// Folder that contains regulation XML files recursively.
        #[arg(long)]
        folder: PathBuf,
        /// Word budget at which a chunk closes.
        #[arg(long, default_value = "500")]
        chunk_words: usize,
        /// Sentences carried over between consecutive chunks.
        #[arg(long, default_value = "1")]
        overlap_sentences: usize,
    },
    /// Retrieve ranked chunks for a query.
    Search {
        /// Search query.
        #[arg(long)]
        query: String,
        /// Number of chunks to return.
        #[arg(long, default_value = "10")]
        top_k: usize,
        /// Program filter (mpfs | hospice | snf).
        #[arg(long)]
        program: Option<String>,
        /// Rule year filter, e.g. 2023.
        #[arg(long)]
        year: Option<u16>,
        /// Rule type filter (proposed | final).
        #[arg(long)]
        rule_type: Option<String>,
    },
    /// Answer a question over retrieved context (requires OPENAI_API_KEY).
    Ask {
        /// User question.
        #[arg(long)]
        query: String,
        /// Number of chunks to retrieve.
        #[arg(long, default_value = "5")]
        top_k: usize,
        /// Program filter (mpfs | hospice | snf).
        #[arg(long)]
        program: Option<String>,
        /// Rule year filter, e.g. 2023.
        #[arg(long)]
        year: Option<u16>,
        /// Rule type filter (proposed | final).
        #[arg(long)]
        rule_type: Option<String>,
        /// Token budget for the assembled context.
        #[arg(long, default_value = "4000")]
        context_tokens: usize,
    },
    /// Print one chunk from the persisted store by position.
    Chunk {
        #[arg(long)]
        position: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let index_path = cli.data_dir.join("vectors.index");
    let chunks_path = cli.data_dir.join("chunks.json");

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "reg-search-engine boot"
    );

    match cli.command {
        Command::Ingest {
            folder,
            chunk_words,
            overlap_sentences,
        } => {
            let options = SegmenterOptions {
                chunk_words,
                overlap_sentences,
            };
            if cli.offline {
                let embedder = CharacterNgramEmbedder::default();
                run_ingest(&embedder, &folder, &options, &index_path, &chunks_path).await?;
            } else {
                let config = openai_config()?;
                let embedder = OpenAiEmbedder::new(&config)?;
                run_ingest(&embedder, &folder, &options, &index_path, &chunks_path).await?;
            }
        }
        Command::Search {
            query,
            top_k,
            program,
            year,
            rule_type,
        } => {
            let filters = parse_filters(program, year, rule_type)?;
            let snapshot = Arc::new(Snapshot::load(&index_path, &chunks_path)?);
            if cli.offline {
                let embedder = CharacterNgramEmbedder::default();
                run_search(&embedder, snapshot, &query, filters, top_k).await?;
            } else {
                let config = openai_config()?;
                let embedder = OpenAiEmbedder::new(&config)?;
                run_search(&embedder, snapshot, &query, filters, top_k).await?;
            }
        }
        Command::Ask {
            query,
            top_k,
            program,
            year,
            rule_type,
            context_tokens,
        } => {
            if cli.offline {
                bail!("ask needs the OpenAI chat API; drop --offline");
            }
            let filters = parse_filters(program, year, rule_type)?;
            let config = openai_config()?;
            let snapshot = Arc::new(Snapshot::load(&index_path, &chunks_path)?);
            let engine = AnswerEngine::new(
                snapshot,
                OpenAiEmbedder::new(&config)?,
                OpenAiChatClient::new(&config)?,
                RetrieverOptions::default(),
                ContextOptions {
                    token_limit: context_tokens,
                    profile: ModelProfile::GPT_4O_MINI,
                },
            );

            let answer = engine.ask(&query, filters, top_k).await;
            println!("question: {}", answer.query);
            println!("retrieval: {}", answer.retrieval);
            println!("confidence: {:.2}", answer.confidence);
            println!("answer:\n{}", answer.answer);
            println!(
                "sources used: {} of {} retrieved",
                answer.sources_used.len(),
                answer.total_sources
            );
            for source in answer.sources_used {
                println!(
                    "  [Source {}] distance={:.4} {}",
                    source.source_id, source.distance, source.text_preview
                );
            }
        }
        Command::Chunk { position } => {
            let snapshot = Snapshot::load(&index_path, &chunks_path)?;
            match snapshot.chunk(position) {
                Some(chunk) => println!("{}", serde_json::to_string_pretty(chunk)?),
                None => bail!(
                    "chunk position {} out of range for store of {}",
                    position,
                    snapshot.len()
                ),
            }
        }
    }

    Ok(())
}

async fn run_ingest<E: Embedder>(
    embedder: &E,
    folder: &Path,
    options: &SegmenterOptions,
    index_path: &Path,
    chunks_path: &Path,
) -> anyhow::Result<()> {
    let report = ingest_folder_chunks_best_effort(folder, options)?;

    if !report.skipped_files.is_empty() {
        warn!(
            "skipped_files={} for folder={}",
            report.skipped_files.len(),
            folder.display()
        );
        for skipped in &report.skipped_files {
            warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped document");
        }
    }
    info!(
        folder = %folder.display(),
        chunk_count = report.chunks.len(),
        "segmentation finished"
    );

    let profile = ModelProfile::ADA_002;
    let counter = HeuristicTokenCounter::for_profile(&profile);
    let snapshot = build_snapshot(report.chunks, embedder, &counter, &profile).await?;
    snapshot.save(index_path, chunks_path)?;

    println!(
        "{} chunks indexed at {}",
        snapshot.len(),
        Utc::now().to_rfc3339()
    );
    Ok(())
}

async fn run_search<E: Embedder>(
    embedder: &E,
    snapshot: Arc<Snapshot>,
    query: &str,
    filters: Option<QueryFilters>,
    top_k: usize,
) -> anyhow::Result<()> {
    let filters = filters.unwrap_or_else(|| infer_query_filters(query));
    let query_vector = embedder.embed(query).await?;
    let retriever = FilteredRetriever::new(snapshot, RetrieverOptions::default());
    let outcome = retriever.search(&query_vector, &filters, top_k)?;

    println!("query: {query}");
    println!("mode: {}", outcome.mode);
    for hit in outcome.hits {
        let metadata = &hit.chunk.metadata;
        let year = metadata
            .year
            .map(|year| year.to_string())
            .unwrap_or_else(|| "----".to_string());
        println!(
            "[{:.4}] {} {} {} | {}",
            hit.distance, metadata.program, metadata.rule_type, year, hit.chunk.section_header
        );
        println!("  {}", preview(&hit.chunk.text));
    }
    Ok(())
}

fn parse_filters(
    program: Option<String>,
    year: Option<u16>,
    rule_type: Option<String>,
) -> anyhow::Result<Option<QueryFilters>> {
    let program = program
        .map(|value| value.parse::<Program>().map_err(|error| anyhow::anyhow!(error)))
        .transpose()?;
    let rule_type = rule_type
        .map(|value| value.parse::<RuleType>().map_err(|error| anyhow::anyhow!(error)))
        .transpose()?;

    let filters = QueryFilters {
        program,
        year,
        rule_type,
        title_contains: None,
    };
    Ok((!filters.is_empty()).then_some(filters))
}

fn openai_config() -> anyhow::Result<OpenAiConfig> {
    OpenAiConfig::from_env()
        .context("OPENAI_API_KEY is not set; pass --offline to use the local embedder")
}

fn preview(text: &str) -> String {
    const PREVIEW_CHARS: usize = 200;
    if text.chars().count() > PREVIEW_CHARS {
        let clipped: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{clipped}...")
    } else {
        text.to_string()
    }
}
