//! Turns a normalized chat into an answer body.
//!
//! Everything that can fail before the first byte (retrieval, provider
//! request initiation, the optional deadline) happens in
//! [`AnswerPipeline::start`]. Once a body is returned the caller can commit
//! to a `200 OK`; later failures can only end the stream.

use crate::chat::NormalizedChat;
use crate::config::{ResponseMode, ServerConfig};
use crate::evaluation::Recorder;
use crate::provider::Message;
use crate::query::{QueryEngine, QueryError, Result};
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

/// Tokens buffered between the relay task and the response writer.
const CHANNEL_CAPACITY: usize = 32;

/// Answer text as it is handed to the transport.
pub enum AnswerBody {
    /// Tokens relayed from the provider as they are produced.
    Streaming(mpsc::Receiver<Result<String>>),
    /// A materialized answer, sent as one chunk.
    Complete(String),
}

impl AnswerBody {
    pub fn into_stream(self) -> BoxStream<'static, Result<String>> {
        match self {
            AnswerBody::Streaming(rx) => ReceiverStream::new(rx).boxed(),
            AnswerBody::Complete(text) => stream::once(async move { Ok(text) }).boxed(),
        }
    }

    /// Reads the body to the end.
    pub async fn collect_text(self) -> Result<String> {
        let mut text = String::new();
        let mut chunks = self.into_stream();
        while let Some(chunk) = chunks.next().await {
            text.push_str(&chunk?);
        }
        Ok(text)
    }
}

/// How a relay ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// All tokens were delivered.
    Completed { tokens: usize },
    /// The receiver went away; nothing more was sent.
    Disconnected { tokens: usize },
    /// The token stream failed; the error was forwarded as the last item.
    Failed { tokens: usize, error: String },
}

/// Forwards `tokens` into `sender` until the stream ends, fails, or the
/// receiving side is dropped.
///
/// The receiver is checked once per produced token. A disconnect is not an
/// error.
pub async fn relay_tokens<S, E>(mut tokens: S, sender: mpsc::Sender<Result<String>>) -> RelayOutcome
where
    S: Stream<Item = std::result::Result<String, E>> + Unpin,
    E: Into<QueryError>,
{
    let mut forwarded = 0;

    while let Some(item) = tokens.next().await {
        if sender.is_closed() {
            return RelayOutcome::Disconnected { tokens: forwarded };
        }

        match item {
            Ok(token) => {
                if sender.send(Ok(token)).await.is_err() {
                    return RelayOutcome::Disconnected { tokens: forwarded };
                }
                forwarded += 1;
            }
            Err(e) => {
                let error: QueryError = e.into();
                let message = error.to_string();
                let _ = sender.send(Err(error)).await;
                return RelayOutcome::Failed {
                    tokens: forwarded,
                    error: message,
                };
            }
        }
    }

    RelayOutcome::Completed { tokens: forwarded }
}

/// Request-to-answer pipeline shared by all request handlers.
pub struct AnswerPipeline {
    engine: QueryEngine,
    mode: ResponseMode,
    use_history: bool,
    timeout: Option<Duration>,
    recorder: Option<Recorder>,
}

impl AnswerPipeline {
    pub fn new(engine: QueryEngine, server: &ServerConfig) -> Self {
        Self {
            engine,
            mode: server.response_mode,
            use_history: server.use_history,
            timeout: server.query_timeout_secs.map(Duration::from_secs),
            recorder: None,
        }
    }

    pub fn with_mode(mut self, mode: ResponseMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Wraps single-shot queries with evaluation.
    pub fn with_recorder(mut self, recorder: Recorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    pub fn recorder(&self) -> Option<&Recorder> {
        self.recorder.as_ref()
    }

    /// Issues the query and returns the body once the answer has started.
    pub async fn start(&self, chat: NormalizedChat) -> Result<AnswerBody> {
        let history: &[Message] = if self.use_history { &chat.history } else { &[] };
        info!(mode = ?self.mode, history = history.len(), "Answering query");

        match self.mode {
            ResponseMode::Streaming => {
                let answer = self
                    .with_deadline(self.engine.query_stream(&chat.query, history))
                    .await?;
                debug!("Generation started with {} sources", answer.sources.len());

                let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
                tokio::spawn(async move {
                    match relay_tokens(answer.tokens, tx).await {
                        RelayOutcome::Completed { tokens } => debug!("Streamed {} tokens", tokens),
                        RelayOutcome::Disconnected { tokens } => {
                            warn!("Client disconnected after {} tokens", tokens)
                        }
                        RelayOutcome::Failed { tokens, error } => {
                            warn!("Answer stream failed after {} tokens: {}", tokens, error)
                        }
                    }
                });

                Ok(AnswerBody::Streaming(rx))
            }
            ResponseMode::EvaluatedSync => {
                let answer = match &self.recorder {
                    Some(recorder) => {
                        self.with_deadline(recorder.instrumented_query(&self.engine, &chat.query, history))
                            .await?
                    }
                    None => self.with_deadline(self.engine.query(&chat.query, history)).await?,
                };
                Ok(AnswerBody::Complete(format!("{}\n", answer.text)))
            }
        }
    }

    async fn with_deadline<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| QueryError::Timeout(limit))?,
            None => fut.await,
        }
    }
}
