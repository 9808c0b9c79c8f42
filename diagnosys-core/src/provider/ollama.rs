//! Ollama provider implementation.
//!
//! This module provides an Ollama HTTP API client that implements the Provider trait.

use super::types::*;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Ollama HTTP API provider.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    base_url: String,
    embedding_model: String,
    http_client: reqwest::Client,
}

impl OllamaProvider {
    /// Creates a new Ollama provider with the specified config.
    pub fn new(config: &crate::Config) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.llm.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            base_url: config.llm.base_url.trim_end_matches('/').to_string(),
            embedding_model: config.rag.embedding_model.clone(),
            http_client: builder.build()?,
        })
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    async fn chat_stream(&self, request: ChatRequest) -> Result<TokenStream> {
        let url = format!("{}/api/chat", self.base_url);

        let ollama_request = OllamaChatRequest {
            model: request.model.clone(),
            messages: request
                .messages
                .iter()
                .map(|m| OllamaMessage {
                    role: m.role.clone(),
                    content: m.content.clone(),
                })
                .collect(),
            options: {
                let mut opts = HashMap::new();
                opts.insert("temperature".to_string(), serde_json::json!(request.temperature));
                Some(opts)
            },
            stream: true,
        };

        let response = self.http_client.post(&url).json(&ollama_request).send().await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(ProviderError::Api(error_text));
        }

        Ok(Box::pin(ndjson_tokens(response)))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Other("No embeddings returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url);

        let embed_request = OllamaEmbedRequest {
            model: self.embedding_model.clone(),
            input: texts.iter().map(|t| t.to_string()).collect(),
        };

        let response = self.http_client.post(&url).json(&embed_request).send().await?;

        if !response.status().is_success() {
            let error_text = response.text().await?;
            return Err(ProviderError::Api(error_text));
        }

        let embed_response = response.json::<OllamaEmbedResponse>().await?;
        if embed_response.embeddings.len() != texts.len() {
            return Err(ProviderError::Other(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                embed_response.embeddings.len()
            )));
        }

        Ok(embed_response.embeddings)
    }

    fn embedding_model(&self) -> &str {
        &self.embedding_model
    }
}

/// Splits the newline-delimited JSON body into message deltas.
fn ndjson_tokens(response: reqwest::Response) -> impl Stream<Item = Result<String>> + Send + 'static {
    async_stream::try_stream! {
        let mut stream = response.bytes_stream();
        let mut buffer = Vec::new();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result?;
            buffer.extend_from_slice(&chunk);

            while let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                let line = buffer.drain(..=newline_pos).collect::<Vec<_>>();
                if let Some(content) = parse_chat_line(&line)? {
                    yield content;
                }
            }
        }

        if let Some(content) = parse_chat_line(&buffer)? {
            yield content;
        }
    }
}

fn parse_chat_line(line: &[u8]) -> Result<Option<String>> {
    let line_str = String::from_utf8_lossy(line);
    let line_str = line_str.trim();
    if line_str.is_empty() {
        return Ok(None);
    }

    let response: OllamaChatResponse = serde_json::from_str(line_str)?;
    if let Some(error) = response.error {
        return Err(ProviderError::Api(error));
    }

    Ok(response
        .message
        .map(|m| m.content)
        .filter(|content| !content.is_empty()))
}

// Ollama-specific request/response types (internal)

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<HashMap<String, serde_json::Value>>,
    stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct OllamaChatResponse {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct OllamaEmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OllamaEmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_line_content() {
        let line = br#"{"model":"llama3.2","message":{"role":"assistant","content":"Hel"},"done":false}
"#;
        assert_eq!(parse_chat_line(line).unwrap(), Some("Hel".to_string()));
    }

    #[test]
    fn test_parse_chat_line_done_without_content() {
        let line = br#"{"model":"llama3.2","message":{"role":"assistant","content":""},"done":true}"#;
        assert_eq!(parse_chat_line(line).unwrap(), None);
    }

    #[test]
    fn test_parse_chat_line_error() {
        let line = br#"{"error":"model not found"}"#;
        assert!(matches!(parse_chat_line(line), Err(ProviderError::Api(msg)) if msg == "model not found"));
    }

    #[test]
    fn test_parse_blank_line() {
        assert_eq!(parse_chat_line(b"\n").unwrap(), None);
    }
}
