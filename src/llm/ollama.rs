//! Ollama-style HTTP backend
//!
//! Speaks `/api/chat` and `/api/tags` against a locally running server.
//! Streaming responses are newline-delimited JSON; each line is parsed
//! into a [`StreamChunk`] and its text content is yielded as one
//! fragment of the answer.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{FragmentStream, GatewayError, GenerationRequest, InferenceBackend};

/// Information about an available model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_at: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

/// One parsed line of a response
///
/// Accepts both the chat shape (`message.content`) and the generate
/// shape (`response`), so the client works against either endpoint
/// family.
#[derive(Debug, Deserialize)]
pub(crate) struct StreamChunk {
    pub message: Option<ChunkMessage>,
    pub response: Option<String>,
    #[serde(default)]
    pub done: bool,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChunkMessage {
    pub content: Option<String>,
}

impl StreamChunk {
    fn fragment(&self) -> &str {
        if let Some(content) = self.message.as_ref().and_then(|m| m.content.as_deref()) {
            return content;
        }
        self.response.as_deref().unwrap_or("")
    }
}

/// HTTP client for an Ollama-style server
pub struct OllamaBackend {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaBackend {
    /// Create a client for `address` (full URL or bare `host:port`)
    pub fn new(address: &str) -> Self {
        let base_url = if address.starts_with("http://") || address.starts_with("https://") {
            address.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", address.trim_end_matches('/'))
        };
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chat_body(request: &GenerationRequest, stream: bool) -> serde_json::Value {
        let mut body = json!({
            "model": request.model,
            "messages": request.messages,
            "stream": stream,
        });
        if let Some(seed) = request.seed {
            body["seed"] = json!(seed);
        }
        if let Some(think) = request.think {
            body["think"] = json!(think);
        }
        let mut options = serde_json::Map::new();
        if let Some(num_ctx) = request.num_ctx {
            options.insert("num_ctx".to_string(), json!(num_ctx));
        }
        if let Some(num_predict) = request.num_predict {
            options.insert("num_predict".to_string(), json!(num_predict));
        }
        if let Some(temperature) = request.temperature {
            options.insert("temperature".to_string(), json!(temperature));
        }
        if !options.is_empty() {
            body["options"] = serde_json::Value::Object(options);
        }
        body
    }

    async fn post_chat(&self, body: &serde_json::Value) -> Result<reqwest::Response, GatewayError> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Generation(format!(
                "{}: {}",
                status,
                text.trim()
            )));
        }
        Ok(response)
    }

    /// Parse one line of a streaming response
    pub(crate) fn parse_chunk(line: &str) -> Result<Option<StreamChunk>, GatewayError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(line)
            .map(Some)
            .map_err(|e| GatewayError::MalformedChunk(e.to_string()))
    }
}

struct StreamState {
    bytes: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    buf: String,
    pending: VecDeque<String>,
    done: bool,
}

/// Turn an NDJSON HTTP response into a pull-based fragment stream
///
/// The stream ends after the chunk carrying `done: true`. A connection
/// that closes before that marker is a transport error.
fn fragment_stream(response: reqwest::Response) -> FragmentStream {
    let bytes = response.bytes_stream().map(|r| r.map(|b| b.to_vec())).boxed();
    let state = StreamState {
        bytes,
        buf: String::new(),
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(stream::try_unfold(state, |mut state| async move {
        loop {
            if let Some(fragment) = state.pending.pop_front() {
                return Ok(Some((fragment, state)));
            }
            if state.done {
                return Ok(None);
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state.buf.push_str(&String::from_utf8_lossy(&chunk));
                    while let Some(pos) = state.buf.find('\n') {
                        let line: String = state.buf.drain(..=pos).collect();
                        if let Some(parsed) = OllamaBackend::parse_chunk(&line)? {
                            if let Some(error) = parsed.error {
                                return Err(GatewayError::Generation(error));
                            }
                            let fragment = parsed.fragment();
                            if !fragment.is_empty() {
                                state.pending.push_back(fragment.to_string());
                            }
                            if parsed.done {
                                state.done = true;
                            }
                        }
                    }
                }
                Some(Err(e)) => return Err(GatewayError::Transport(e.to_string())),
                None => {
                    return Err(GatewayError::Transport(
                        "stream ended before completion marker".to_string(),
                    ));
                }
            }
        }
    }))
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GatewayError> {
        let body = Self::chat_body(&request, false);
        let response = self.post_chat(&body).await?;
        let parsed: StreamChunk = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedChunk(e.to_string()))?;
        if let Some(error) = parsed.error {
            return Err(GatewayError::Generation(error));
        }
        Ok(parsed.fragment().to_string())
    }

    async fn stream(&self, request: GenerationRequest) -> Result<FragmentStream, GatewayError> {
        let body = Self::chat_body(&request, true);
        let response = self.post_chat(&body).await?;
        Ok(fragment_stream(response))
    }

    async fn models(&self) -> Result<Vec<ModelInfo>, GatewayError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GatewayError::Generation(response.status().to_string()));
        }
        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedChunk(e.to_string()))?;
        Ok(tags.models)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Message;

    #[test]
    fn test_parse_chunk_empty() {
        assert!(OllamaBackend::parse_chunk("").unwrap().is_none());
        assert!(OllamaBackend::parse_chunk("  \n").unwrap().is_none());
    }

    #[test]
    fn test_parse_chunk_chat_shape() {
        let line = r#"{"message":{"role":"assistant","content":"Hel"},"done":false}"#;
        let chunk = OllamaBackend::parse_chunk(line).unwrap().unwrap();
        assert!(!chunk.done);
        assert_eq!(chunk.fragment(), "Hel");
    }

    #[test]
    fn test_parse_chunk_generate_shape() {
        let line = r#"{"model":"gemma3","response":"lo","done":false}"#;
        let chunk = OllamaBackend::parse_chunk(line).unwrap().unwrap();
        assert_eq!(chunk.fragment(), "lo");
    }

    #[test]
    fn test_parse_chunk_done() {
        let line = r#"{"message":{"role":"assistant","content":""},"done":true,"total_duration":0,"eval_count":20}"#;
        let chunk = OllamaBackend::parse_chunk(line).unwrap().unwrap();
        assert!(chunk.done);
        assert_eq!(chunk.fragment(), "");
    }

    #[test]
    fn test_parse_chunk_malformed() {
        let err = OllamaBackend::parse_chunk("{not json").unwrap_err();
        assert!(matches!(err, GatewayError::MalformedChunk(_)));
    }

    #[test]
    fn test_chat_body_fields() {
        let request = GenerationRequest {
            model: "gemma3".to_string(),
            messages: vec![Message::user("hi")],
            seed: Some(42),
            stream: true,
            num_ctx: Some(4096),
            num_predict: None,
            temperature: None,
            think: None,
        };
        let body = OllamaBackend::chat_body(&request, true);
        assert_eq!(body["model"], "gemma3");
        assert_eq!(body["stream"], true);
        assert_eq!(body["seed"], 42);
        assert_eq!(body["options"]["num_ctx"], 4096);
        assert!(body["options"].get("num_predict").is_none());
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body.get("think").is_none());
    }

    #[test]
    fn test_chat_body_sampling_options() {
        let request = GenerationRequest {
            model: "gemma3".to_string(),
            messages: vec![Message::user("hi")],
            seed: None,
            stream: false,
            num_ctx: None,
            num_predict: Some(128),
            temperature: Some(0.8),
            think: None,
        };
        let body = OllamaBackend::chat_body(&request, false);
        assert_eq!(body["options"]["num_predict"], 128);
        assert_eq!(body["options"]["temperature"], 0.8);
        assert!(body["options"].get("num_ctx").is_none());
        assert!(body.get("seed").is_none());
    }

    #[test]
    fn test_base_url_normalization() {
        assert_eq!(
            OllamaBackend::new("localhost:11435").base_url(),
            "http://localhost:11435"
        );
        assert_eq!(
            OllamaBackend::new("http://localhost:11435/").base_url(),
            "http://localhost:11435"
        );
    }
}
