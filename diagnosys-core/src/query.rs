//! Retrieval-augmented query engine.
//!
//! A query is embedded, the closest passages are pulled from the index, and
//! the provider is asked to answer from that context only.

use crate::config::Config;
use crate::index::{IndexHandle, ScoredPassage};
use crate::provider::{ChatRequest, Message, Provider, ProviderError, TokenStream};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Provider error: {0}")]
    Provider(ProviderError),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Query timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Retrieval failed: {0}")]
    Retrieval(String),
}

impl From<ProviderError> for QueryError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::Authentication(msg) => QueryError::Authentication(msg),
            other => QueryError::Provider(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;

/// A fully generated answer.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<ScoredPassage>,
}

/// An answer whose text is still being generated.
///
/// The provider has already accepted the request when this is returned.
pub struct StreamingAnswer {
    pub sources: Vec<ScoredPassage>,
    pub tokens: TokenStream,
}

#[derive(Clone)]
pub struct QueryEngine {
    index: IndexHandle,
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f64,
    top_k: usize,
    system_prompt: String,
}

impl QueryEngine {
    pub fn new(index: IndexHandle, provider: Arc<dyn Provider>, config: &Config) -> Self {
        Self {
            index,
            provider,
            model: config.llm.model.clone(),
            temperature: config.llm.temperature,
            top_k: config.rag.top_k,
            system_prompt: config.prompt.system_prompt.clone(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    /// Returns the passages most relevant to `query`.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredPassage>> {
        let embedding = self.provider.embed(query).await.map_err(|e| match e {
            ProviderError::Authentication(msg) => QueryError::Authentication(msg),
            other => QueryError::Retrieval(other.to_string()),
        })?;

        let sources = self.index.search(&embedding, self.top_k);
        debug!(
            "Retrieved {} passages: {:?}",
            sources.len(),
            sources.iter().map(|s| s.passage.id.as_str()).collect::<Vec<_>>()
        );
        Ok(sources)
    }

    /// Single-shot query: waits for the complete answer.
    pub async fn query(&self, query: &str, history: &[Message]) -> Result<Answer> {
        let sources = self.retrieve(query).await?;
        let request = self.build_request(query, history, &sources);
        let text = self.provider.chat(request).await?;
        Ok(Answer { text, sources })
    }

    /// Incremental query: returns once generation has started.
    pub async fn query_stream(&self, query: &str, history: &[Message]) -> Result<StreamingAnswer> {
        let sources = self.retrieve(query).await?;
        let request = self.build_request(query, history, &sources);
        let tokens = self.provider.chat_stream(request).await?;
        Ok(StreamingAnswer { sources, tokens })
    }

    fn build_request(&self, query: &str, history: &[Message], sources: &[ScoredPassage]) -> ChatRequest {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if !self.system_prompt.is_empty() {
            messages.push(Message::system(self.system_prompt.clone()));
        }
        messages.extend(history.iter().cloned());
        messages.push(Message::user(text_qa_prompt(query, sources)));

        ChatRequest::new(self.model.clone(), messages).with_temperature(self.temperature)
    }
}

/// Wraps `query` with the retrieved context.
pub fn text_qa_prompt(query: &str, sources: &[ScoredPassage]) -> String {
    let context = sources
        .iter()
        .map(|s| {
            let name = s
                .passage
                .metadata
                .get("file_name")
                .map(String::as_str)
                .unwrap_or(&s.passage.doc_id);
            format!("[{}]\n{}", name, s.passage.text.trim())
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Context information is below.\n\
         ---------------------\n\
         {}\n\
         ---------------------\n\
         Given the context information and not prior knowledge, answer the query.\n\
         Query: {}\n\
         Answer: ",
        context, query
    )
}
