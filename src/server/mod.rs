//! HTTP server exposing the Ollama-compatible API
//!
//! Translates `/api/generate`, `/api/chat`, and `/api/tags` onto the
//! [`InferenceBackend`] trait. Streaming replies are newline-delimited
//! JSON; batch replies are a single JSON object. Each connection is
//! handled independently; the backend is a black box regarding how
//! simultaneous calls are serialized.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Body,
    extract::{Json, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{SecondsFormat, Utc};
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::llm::{FragmentStream, GatewayError, GenerationRequest, InferenceBackend, ModelInfo};
use crate::transcript::Message;

/// Configuration for the server, passed in explicitly
#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
    /// Model used when a request names none
    pub default_model: String,
    /// Alias -> upstream model name. Empty means pass-through.
    pub models: HashMap<String, String>,
}

#[derive(Clone)]
struct AppState {
    backend: Arc<dyn InferenceBackend>,
    config: Arc<ServeConfig>,
}

/// Start the server
pub async fn serve(config: ServeConfig, backend: Arc<dyn InferenceBackend>) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let app = create_router(AppState {
        backend,
        config: Arc::new(config),
    });

    tracing::info!("Starting vkllama server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/generate", post(generate))
        .route("/api/chat", post(chat))
        .route("/api/tags", get(tags))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Request / response types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct RequestOptions {
    num_ctx: Option<u32>,
    num_predict: Option<u32>,
    temperature: Option<f64>,
    seed: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateRequest {
    model: Option<String>,
    prompt: Option<String>,
    seed: Option<u32>,
    #[serde(default)]
    stream: bool,
    think: Option<bool>,
    #[serde(default)]
    options: RequestOptions,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    model: Option<String>,
    #[serde(default)]
    messages: Vec<Message>,
    seed: Option<u32>,
    #[serde(default)]
    stream: bool,
    think: Option<bool>,
    #[serde(default)]
    options: RequestOptions,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Which response family the reply uses
#[derive(Debug, Clone, Copy)]
enum Shape {
    /// `response` text field
    Generate,
    /// `message: {role, content}` object
    Chat,
}

// ============================================================================
// Handlers
// ============================================================================

async fn generate(State(state): State<AppState>, Json(req): Json<GenerateRequest>) -> Response {
    let prompt = match req.prompt {
        Some(p) if !p.is_empty() => p,
        _ => return error_response(StatusCode::BAD_REQUEST, "missing 'prompt' in request body"),
    };

    let requested = req.model.unwrap_or_else(|| state.config.default_model.clone());
    let upstream_model = match resolve_model(&state, &requested) {
        Ok(m) => m,
        Err(response) => return response,
    };

    let request = GenerationRequest {
        model: upstream_model,
        messages: vec![Message::user(prompt)],
        seed: req.seed.or(req.options.seed),
        stream: req.stream,
        num_ctx: req.options.num_ctx,
        num_predict: req.options.num_predict,
        temperature: req.options.temperature,
        think: req.think,
    };

    respond(&state, request, requested, Shape::Generate, req.stream).await
}

async fn chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> Response {
    if req.messages.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "missing 'messages' in request body");
    }

    let requested = req.model.unwrap_or_else(|| state.config.default_model.clone());
    let upstream_model = match resolve_model(&state, &requested) {
        Ok(m) => m,
        Err(response) => return response,
    };

    let request = GenerationRequest {
        model: upstream_model,
        messages: req.messages,
        seed: req.seed.or(req.options.seed),
        stream: req.stream,
        num_ctx: req.options.num_ctx,
        num_predict: req.options.num_predict,
        temperature: req.options.temperature,
        think: req.think,
    };

    respond(&state, request, requested, Shape::Chat, req.stream).await
}

async fn tags(State(state): State<AppState>) -> Response {
    match state.backend.models().await {
        Ok(upstream) => {
            let models: Vec<ModelInfo> = if state.config.models.is_empty() {
                upstream
            } else {
                // Report registered aliases, with upstream metadata when found
                state
                    .config
                    .models
                    .iter()
                    .map(|(alias, upstream_name)| {
                        match upstream.iter().find(|m| &m.name == upstream_name) {
                            Some(info) => ModelInfo {
                                name: alias.clone(),
                                ..info.clone()
                            },
                            None => ModelInfo {
                                name: alias.clone(),
                                digest: String::new(),
                                size: 0,
                                modified_at: String::new(),
                            },
                        }
                    })
                    .collect()
            };
            Json(json!({ "models": models })).into_response()
        }
        Err(e) => gateway_error_response(e),
    }
}

// ============================================================================
// Shared plumbing
// ============================================================================

/// Map a requested model name through the registry
fn resolve_model(state: &AppState, requested: &str) -> Result<String, Response> {
    if state.config.models.is_empty() {
        return Ok(requested.to_string());
    }
    match state.config.models.get(requested) {
        Some(upstream) => Ok(upstream.clone()),
        None => Err(error_response(
            StatusCode::NOT_FOUND,
            format!("model '{}' not found", requested),
        )),
    }
}

async fn respond(
    state: &AppState,
    request: GenerationRequest,
    model_name: String,
    shape: Shape,
    stream: bool,
) -> Response {
    if stream {
        match state.backend.stream(request).await {
            Ok(fragments) => ndjson_response(model_name, shape, fragments),
            Err(e) => gateway_error_response(e),
        }
    } else {
        match state.backend.generate(request).await {
            Ok(text) => Json(final_chunk(&model_name, shape, &text)).into_response(),
            Err(e) => gateway_error_response(e),
        }
    }
}

/// Stream fragments as newline-delimited JSON chunks
fn ndjson_response(model: String, shape: Shape, fragments: FragmentStream) -> Response {
    let body_stream = stream::unfold(
        (fragments, model, false),
        move |(mut fragments, model, finished)| async move {
            if finished {
                return None;
            }
            let (chunk, finished) = match fragments.next().await {
                Some(Ok(fragment)) => (content_chunk(&model, shape, &fragment), false),
                Some(Err(e)) => {
                    tracing::error!("generation failed mid-stream: {}", e);
                    (json!({ "error": e.to_string() }), true)
                }
                None => (final_chunk(&model, shape, ""), true),
            };
            let mut line = chunk.to_string();
            line.push('\n');
            Some((Ok::<_, Infallible>(line), (fragments, model, finished)))
        },
    );

    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(body_stream),
    )
        .into_response()
}

fn created_at() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn content_chunk(model: &str, shape: Shape, text: &str) -> serde_json::Value {
    match shape {
        Shape::Generate => json!({
            "model": model,
            "created_at": created_at(),
            "response": text,
            "done": false,
        }),
        Shape::Chat => json!({
            "model": model,
            "created_at": created_at(),
            "message": { "role": "assistant", "content": text },
            "done": false,
        }),
    }
}

/// Terminal chunk; also serves as the whole batch-mode reply
fn final_chunk(model: &str, shape: Shape, text: &str) -> serde_json::Value {
    let mut chunk = match shape {
        Shape::Generate => json!({
            "model": model,
            "created_at": created_at(),
            "response": text,
            "done": true,
        }),
        Shape::Chat => json!({
            "model": model,
            "created_at": created_at(),
            "message": { "role": "assistant", "content": text },
            "done": true,
        }),
    };
    // Duration/eval accounting lives in the wrapped runtime; report zeros
    chunk["total_duration"] = json!(0);
    chunk["load_duration"] = json!(0);
    chunk["prompt_eval_count"] = json!(0);
    chunk["eval_count"] = json!(0);
    chunk
}

fn gateway_error_response(error: GatewayError) -> Response {
    let status = match error {
        GatewayError::Transport(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::error!("backend call failed: {}", error);
    error_response(status, error.to_string())
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

// ============================================================================
// Tests
// ============================================================================
