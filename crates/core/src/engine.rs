use crate::config::OpenAiConfig;
use crate::context::{ContextAssembler, ContextOptions};
use crate::embeddings::{auth_headers, Embedder};
use crate::error::SearchError;
use crate::models::{
    Answer, Chunk, QueryFilters, RetrievalMode, RetrievalOutcome, RetrieverOptions, SearchHit,
    SourceRef,
};
use crate::retriever::{infer_query_filters, FilteredRetriever};
use crate::snapshot::Snapshot;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

const SYSTEM_PROMPT: &str = "You are a professional medical regulation assistant, specializing in helping users understand Medicare-related regulatory documents.";

const NO_INFORMATION_ANSWER: &str =
    "Sorry, I couldn't find relevant information to answer your question.";

#[async_trait]
pub trait ChatCompleter {
    async fn complete(&self, system: &str, user: &str) -> Result<String, SearchError>;
}

/// OpenAI chat-completions client used for answer generation.
pub struct OpenAiChatClient {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiChatClient {
    pub fn new(config: &OpenAiConfig) -> Result<Self, SearchError> {
        let endpoint = config.endpoint("chat/completions")?.to_string();
        let client = Client::builder()
            .timeout(config.timeout)
            .default_headers(auth_headers(&config.api_key)?)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            model: config.chat_model.clone(),
            temperature: 0.1,
            max_tokens: 1_000,
        })
    }
}

#[async_trait]
impl ChatCompleter for OpenAiChatClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, SearchError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: 0.9,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response = self.client.post(&self.endpoint).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let details = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(SearchError::Upstream {
                service: "openai-chat".to_string(),
                details: format!("{status}: {details}"),
            });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| SearchError::Upstream {
                service: "openai-chat".to_string(),
                details: "response carried no message content".to_string(),
            })
    }
}

/// Full question-answering pipeline over one snapshot: embed the query,
/// retrieve with inferred or explicit filters, pack the context, generate.
///
/// `ask` never propagates an error: upstream failures degrade to a
/// structured zero-confidence answer so one bad query cannot take down a
/// serving process.
pub struct AnswerEngine<E, C> {
    snapshot: Arc<Snapshot>,
    embedder: E,
    chat: C,
    retriever_options: RetrieverOptions,
    assembler: ContextAssembler,
}

impl<E, C> AnswerEngine<E, C>
where
    E: Embedder + Send + Sync,
    C: ChatCompleter + Send + Sync,
{
    pub fn new(
        snapshot: Arc<Snapshot>,
        embedder: E,
        chat: C,
        retriever_options: RetrieverOptions,
        context_options: ContextOptions,
    ) -> Self {
        Self {
            snapshot,
            embedder,
            chat,
            retriever_options,
            assembler: ContextAssembler::new(&context_options),
        }
    }

    /// Swaps in a freshly built snapshot. In-flight queries keep the
    /// snapshot they started with.
    pub fn replace_snapshot(&mut self, snapshot: Arc<Snapshot>) {
        self.snapshot = snapshot;
    }

    pub fn get_chunk(&self, position: usize) -> Result<&Chunk, SearchError> {
        self.snapshot.chunk(position).ok_or(SearchError::NotFound {
            position,
            len: self.snapshot.chunks.len(),
        })
    }

    /// Ranked retrieval. Explicit filters win; otherwise filters are
    /// inferred from the query text, and a query with nothing to infer
    /// searches the entire corpus.
    pub async fn search(
        &self,
        query: &str,
        filters: Option<QueryFilters>,
        top_k: usize,
    ) -> Result<RetrievalOutcome, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::Request("query is empty".to_string()));
        }

        let filters = filters.unwrap_or_else(|| infer_query_filters(query));
        let query_vector = self.embedder.embed(query).await?;
        let retriever =
            FilteredRetriever::new(Arc::clone(&self.snapshot), self.retriever_options.clone());
        retriever.search(&query_vector, &filters, top_k)
    }

    pub async fn ask(&self, query: &str, filters: Option<QueryFilters>, top_k: usize) -> Answer {
        let retrieval = match self.search(query, filters, top_k).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(%error, "retrieval failed; returning degraded answer");
                return Answer::degraded(
                    query,
                    format!("Sorry, I couldn't retrieve any document context: {error}"),
                    RetrievalMode::Unfiltered,
                );
            }
        };

        if retrieval.hits.is_empty() {
            return Answer::degraded(query, NO_INFORMATION_ANSWER.to_string(), retrieval.mode);
        }

        let assembled = self.assembler.assemble(&retrieval.hits);
        if assembled.used.is_empty() {
            return Answer::degraded(query, NO_INFORMATION_ANSWER.to_string(), retrieval.mode);
        }

        let sources_used: Vec<SourceRef> = assembled
            .used
            .iter()
            .enumerate()
            .map(|(position, hit)| SourceRef::new(position + 1, hit))
            .collect();
        let total_sources = retrieval.hits.len();
        let prompt = build_prompt(&assembled.text, query);

        match self.chat.complete(SYSTEM_PROMPT, &prompt).await {
            Ok(answer) => Answer {
                answer,
                confidence: confidence_from(&assembled.used),
                sources_used,
                total_sources,
                retrieval: retrieval.mode,
                query: query.to_string(),
            },
            Err(error) => {
                warn!(%error, "generation failed; returning degraded answer");
                Answer {
                    answer: format!(
                        "Sorry, encountered a technical issue while generating the answer: {error}"
                    ),
                    confidence: 0.0,
                    sources_used,
                    total_sources,
                    retrieval: retrieval.mode,
                    query: query.to_string(),
                }
            }
        }
    }
}

fn build_prompt(context: &str, query: &str) -> String {
    format!(
        "Based on the following medical regulation document content, please answer the user's question.\n\n\
         Please follow these rules:\n\
         1. Only answer based on the provided content, do not add external knowledge\n\
         2. If the provided content is insufficient to answer the question, please state this clearly\n\
         3. Cite relevant sources in your answer using the format [Source1], [Source2], etc.\n\
         4. Keep answers accurate, professional, and easy to understand\n\
         5. If there are multiple relevant pieces of information, organize them into a clear structure\n\n\
         Context content:\n{context}\n\n\
         User question: {query}\n\n\
         Answer:"
    )
}

// Confidence tracks how close the packed chunks sit to the query embedding.
fn confidence_from(used: &[SearchHit]) -> f32 {
    if used.is_empty() {
        return 0.0;
    }
    let average = used.iter().map(|hit| f64::from(hit.distance)).sum::<f64>() / used.len() as f64;
    let confidence = (1.0 - average / 2.0).clamp(0.0, 1.0);
    ((confidence * 100.0).round() / 100.0) as f32
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}
