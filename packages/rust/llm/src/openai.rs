//! OpenAI-compatible client for embeddings and chat completions.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use chatscribe_shared::{ChatscribeError, ProviderConfig, Result, resolve_api_key};

use crate::sse::SseDecoder;
use crate::{Embedder, Generator, TextStream};

/// Marker payload closing a chat completion stream.
const DONE_MARKER: &str = "[DONE]";

/// Client for `/embeddings` and `/chat/completions` on an OpenAI-compatible API.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    embeddings_url: String,
    chat_url: String,
    chat_model: String,
    embedding_model: String,
    temperature: f32,
    max_retries: usize,
    batch_size: usize,
}

impl OpenAiClient {
    /// Build a client from the `[provider]` config, reading the key from its env var.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let api_key = resolve_api_key(config)?;
        Self::new(config, &api_key)
    }

    /// Build a client with an explicit API key.
    pub fn new(config: &ProviderConfig, api_key: &str) -> Result<Self> {
        if config.chat_model.trim().is_empty() || config.embedding_model.trim().is_empty() {
            return Err(ChatscribeError::config("provider model names must not be empty"));
        }

        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth)
                .map_err(|_| ChatscribeError::config("API key contains invalid characters"))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| ChatscribeError::config(format!("failed to build HTTP client: {e}")))?;

        let base = config.base_url.trim_end_matches('/');
        Ok(Self {
            client,
            embeddings_url: format!("{base}/embeddings"),
            chat_url: format!("{base}/chat/completions"),
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries.max(1),
            batch_size: config.embedding_batch_size.max(1),
        })
    }

    /// POST `body`, retrying rate limits, server errors and transport failures.
    async fn post_with_retry<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> std::result::Result<Response, String> {
        let mut attempt = 0usize;
        loop {
            match self.client.post(url).json(body).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp);
                    }
                    let text = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(%status, attempt, "provider request failed, retrying");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(format!("{status}: {text}"));
                }
                Err(err) => {
                    if is_retryable_error(&err) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        warn!(error = %err, attempt, "provider request failed, retrying");
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(err.to_string());
                }
            }
        }
    }

    async fn start_chat(&self, prompt: &str, stream: bool) -> Result<Response> {
        let body = ChatRequest {
            model: &self.chat_model,
            temperature: self.temperature,
            stream,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        self.post_with_retry(&self.chat_url, &body)
            .await
            .map_err(|e| ChatscribeError::Generation(format!("chat completion failed ({e})")))
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    #[instrument(skip_all, fields(inputs = inputs.len(), model = %self.embedding_model))]
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(inputs.len());

        for batch in inputs.chunks(self.batch_size) {
            let request = EmbeddingRequest {
                model: &self.embedding_model,
                input: batch,
            };
            let resp = self
                .post_with_retry(&self.embeddings_url, &request)
                .await
                .map_err(|e| ChatscribeError::Embedding(format!("embeddings request failed ({e})")))?;

            let mut parsed: EmbeddingResponse = resp.json().await.map_err(|e| {
                ChatscribeError::Embedding(format!("failed to parse embedding response: {e}"))
            })?;
            parsed.data.sort_by_key(|entry| entry.index);
            if parsed.data.len() != batch.len() {
                return Err(ChatscribeError::Embedding(format!(
                    "provider returned {} embeddings for {} inputs",
                    parsed.data.len(),
                    batch.len()
                )));
            }
            vectors.extend(parsed.data.into_iter().map(|entry| entry.embedding));
        }

        debug!(vectors = vectors.len(), "embeddings received");
        Ok(vectors)
    }
}

#[async_trait]
impl Generator for OpenAiClient {
    #[instrument(skip_all, fields(model = %self.chat_model, prompt_chars = prompt.len()))]
    async fn complete(&self, prompt: &str) -> Result<String> {
        let resp = self.start_chat(prompt, false).await?;
        let parsed: ChatResponse = resp.json().await.map_err(|e| {
            ChatscribeError::Generation(format!("failed to parse chat response: {e}"))
        })?;
        parsed
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| ChatscribeError::Generation("chat response had no content".into()))
    }

    #[instrument(skip_all, fields(model = %self.chat_model, prompt_chars = prompt.len()))]
    async fn stream(&self, prompt: &str) -> Result<TextStream> {
        let resp = self.start_chat(prompt, true).await?;
        let mut body = resp.bytes_stream();

        let increments = async_stream::stream! {
            let mut decoder = SseDecoder::new();
            let mut done = false;

            while !done {
                let Some(piece) = body.next().await else {
                    break;
                };
                let bytes = match piece {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(ChatscribeError::Generation(format!("stream read failed: {e}")));
                        return;
                    }
                };
                for payload in decoder.push(&bytes) {
                    match parse_stream_payload(&payload) {
                        Ok(StreamPayload::Done) => {
                            done = true;
                            break;
                        }
                        Ok(StreamPayload::Text(text)) => yield Ok(text),
                        Ok(StreamPayload::Empty) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }

            if !done {
                if let Some(payload) = decoder.finish() {
                    match parse_stream_payload(&payload) {
                        Ok(StreamPayload::Text(text)) => yield Ok(text),
                        Ok(_) => {}
                        Err(e) => yield Err(e),
                    }
                }
            }
        };

        Ok(Box::pin(increments))
    }
}

/// One decoded `data:` payload of a chat stream.
#[derive(Debug, PartialEq)]
enum StreamPayload {
    Text(String),
    Empty,
    Done,
}

fn parse_stream_payload(payload: &str) -> Result<StreamPayload> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Ok(StreamPayload::Empty);
    }
    if payload == DONE_MARKER {
        return Ok(StreamPayload::Done);
    }

    let chunk: StreamChunk = serde_json::from_str(payload).map_err(|e| {
        let preview: String = payload.chars().take(200).collect();
        ChatscribeError::Generation(format!("invalid stream chunk: {e} (got: {preview})"))
    })?;
    if let Some(err) = chunk.error {
        return Err(ChatscribeError::Generation(format!("provider stream error: {}", err.message)));
    }

    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|choice| choice.delta.and_then(|d| d.content))
        .collect();
    if text.is_empty() {
        Ok(StreamPayload::Empty)
    } else {
        Ok(StreamPayload::Text(text))
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    stream: bool,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}
