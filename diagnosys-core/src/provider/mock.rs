//! Deterministic in-process provider.
//!
//! Embeddings are hashed bags of words, so texts that share vocabulary land
//! close to each other. Chat replies are scripted. Used by the test suites
//! and for running the server without network access.

use super::types::*;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

const DIMENSION: usize = 64;

/// How the mock answers chat requests.
#[derive(Debug, Clone)]
enum Script {
    /// Reply with these tokens, in order.
    Tokens(Vec<String>),
    /// Reply with "Answer: <last user message>".
    Echo,
}

#[derive(Debug)]
pub struct MockProvider {
    script: Script,
    fail_on_start: Option<String>,
    fail_after: Option<usize>,
    embedding_model: String,
    embed_calls: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            script: Script::Echo,
            fail_on_start: None,
            fail_after: None,
            embedding_model: "mock-embedding".to_string(),
            embed_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with a fixed list of tokens.
    pub fn with_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script = Script::Tokens(tokens.into_iter().map(Into::into).collect());
        self
    }

    /// Reply with `reply`, split after each whitespace run.
    pub fn with_reply(self, reply: &str) -> Self {
        let tokens: Vec<String> = reply.split_inclusive(' ').map(str::to_string).collect();
        self.with_tokens(tokens)
    }

    /// Reject every chat request before any token is produced.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_on_start = Some(message.into());
        self
    }

    /// Emit `count` tokens, then fail the stream.
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Number of texts embedded so far.
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    /// Chat requests received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn tokens_for(&self, request: &ChatRequest) -> Vec<String> {
        match &self.script {
            Script::Tokens(tokens) => tokens.clone(),
            Script::Echo => {
                let question = request
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == "user")
                    .map(|m| m.content.as_str())
                    .unwrap_or_default();
                vec!["Answer: ".to_string(), question.to_string()]
            }
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn chat_stream(&self, request: ChatRequest) -> Result<TokenStream> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(message) = &self.fail_on_start {
            return Err(ProviderError::Api(message.clone()));
        }

        let tokens = self.tokens_for(&request);
        let items: Vec<Result<String>> = match self.fail_after {
            Some(count) => tokens
                .into_iter()
                .take(count)
                .map(Ok)
                .chain(std::iter::once(Err(ProviderError::Other(
                    "stream interrupted".to_string(),
                ))))
                .collect(),
            None => tokens.into_iter().map(Ok).collect(),
        };

        Ok(Box::pin(futures::stream::iter(items)))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        Ok(hash_embedding(text))
    }

    fn embedding_model(&self) -> &str {
        &self.embedding_model
    }
}

/// Bag-of-words embedding using FNV-1a buckets.
pub fn hash_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; DIMENSION];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in word.to_lowercase().bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        vector[(hash % DIMENSION as u64) as usize] += 1.0;
    }
    vector
}
