//! Google Gemini provider implementation.
//!
//! Talks to the Generative Language REST API: chat completions are streamed
//! as server-sent events, embeddings go through `embedContent` and
//! `batchEmbedContents`.

use super::types::*;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const API_VERSION: &str = "v1beta";

/// Gemini HTTP API provider.
#[derive(Clone)]
pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    embedding_model: String,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("base_url", &self.base_url)
            .field("embedding_model", &self.embedding_model)
            .finish_non_exhaustive()
    }
}

impl GeminiProvider {
    /// Creates a provider reading the API key from the environment variable
    /// named by `llm.api_key_env`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Authentication`] when the variable is unset or empty.
    pub fn from_env(config: &crate::Config) -> Result<Self> {
        let api_key = std::env::var(&config.llm.api_key_env).unwrap_or_default();
        Self::new(config, api_key)
    }

    pub fn new(config: &crate::Config, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ProviderError::Authentication(format!(
                "{} is not set",
                config.llm.api_key_env
            )));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.llm.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            base_url: config.llm.base_url.trim_end_matches('/').to_string(),
            api_key,
            embedding_model: model_path(&config.rag.embedding_model),
            http_client: builder.build()?,
        })
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/{}/{}:{}", self.base_url, API_VERSION, model_path(model), method)
    }

    async fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<reqwest::Response> {
        let response = self
            .http_client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response.text().await?;
        Err(classify_error(status, error_text))
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    async fn chat_stream(&self, request: ChatRequest) -> Result<TokenStream> {
        let url = format!("{}?alt=sse", self.endpoint(&request.model, "streamGenerateContent"));
        let body = GenerateContentRequest::from_chat(&request);

        debug!(model = %request.model, messages = request.messages.len(), "Starting Gemini stream");
        let response = self.post(&url, &body).await?;

        Ok(Box::pin(sse_tokens(response)))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = self.endpoint(&self.embedding_model, "embedContent");
        let body = EmbedContentRequest {
            model: self.embedding_model.clone(),
            content: Content::text(None, text),
        };

        let response: EmbedContentResponse = self.post(&url, &body).await?.json().await?;
        Ok(response.embedding.values)
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let url = self.endpoint(&self.embedding_model, "batchEmbedContents");
        let body = BatchEmbedContentsRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: self.embedding_model.clone(),
                    content: Content::text(None, text),
                })
                .collect(),
        };

        let response: BatchEmbedContentsResponse = self.post(&url, &body).await?.json().await?;
        if response.embeddings.len() != texts.len() {
            return Err(ProviderError::Other(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                response.embeddings.len()
            )));
        }

        Ok(response.embeddings.into_iter().map(|e| e.values).collect())
    }

    fn embedding_model(&self) -> &str {
        &self.embedding_model
    }
}

/// Gemini addresses models as `models/<name>`.
fn model_path(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

fn classify_error(status: StatusCode, body: String) -> ProviderError {
    let rejected_key = body.contains("API_KEY_INVALID") || body.contains("API key not valid");
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN || rejected_key {
        ProviderError::Authentication(body)
    } else {
        ProviderError::Api(format!("{}: {}", status, body))
    }
}

/// Reads `data:` lines from the SSE body and yields the candidate text.
fn sse_tokens(response: reqwest::Response) -> impl Stream<Item = Result<String>> + Send + 'static {
    async_stream::try_stream! {
        let mut stream = response.bytes_stream();
        let mut buffer = Vec::new();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result?;
            buffer.extend_from_slice(&chunk);

            while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                let line = buffer.drain(..=newline_pos).collect::<Vec<_>>();
                if let Some(text) = parse_sse_line(&line)? {
                    yield text;
                }
            }
        }

        if let Some(text) = parse_sse_line(&buffer)? {
            yield text;
        }
    }
}

fn parse_sse_line(line: &[u8]) -> Result<Option<String>> {
    let line = String::from_utf8_lossy(line);
    let Some(data) = line.trim().strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }

    let response: GenerateContentResponse = serde_json::from_str(data)?;
    if let Some(error) = response.error {
        return Err(ProviderError::Api(error.message));
    }

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    Ok(Some(text).filter(|t| !t.is_empty()))
}

// Gemini-specific request/response types (internal)

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: Some(text.to_string()),
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

impl GenerateContentRequest {
    /// System messages become the system instruction; assistant turns use the `model` role.
    fn from_chat(request: &ChatRequest) -> Self {
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .collect();

        let contents = request
            .messages
            .iter()
            .filter(|m| m.role != "system")
            .map(|m| {
                let role = if m.role == "assistant" { "model" } else { "user" };
                Content::text(Some(role), &m.content)
            })
            .collect();

        Self {
            contents,
            system_instruction: (!system.is_empty()).then(|| Content::text(None, &system.join("\n\n"))),
            generation_config: GenerationConfig {
                temperature: request.temperature,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Clone, Serialize)]
struct EmbedContentRequest {
    model: String,
    content: Content,
}

#[derive(Debug, Clone, Serialize)]
struct BatchEmbedContentsRequest {
    requests: Vec<EmbedContentRequest>,
}

#[derive(Debug, Clone, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbedContentResponse {
    embedding: ContentEmbedding,
}

#[derive(Debug, Clone, Deserialize)]
struct BatchEmbedContentsResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}
