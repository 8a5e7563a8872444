//! LLM collaborator seam.
//!
//! Defines the `CompletionProvider` trait the engine consumes for learning
//! extraction, sub-query generation, and (optionally) report writing, plus
//! best-effort structured JSON parsing. Concrete provider adapters live
//! outside this crate; `MockCompletionProvider` ships here for tests and
//! embedding callers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::error::LlmError;

/// The role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Token accounting for a completion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// A request to the LLM for completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: Option<usize>,
}

impl Default for CompletionRequest {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            temperature: 0.7,
            max_tokens: None,
        }
    }
}

impl CompletionRequest {
    /// Build a request from messages with default sampling parameters.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    /// Rough token estimate for budget reservation (4 bytes per token).
    pub fn estimate_tokens(&self) -> u64 {
        let bytes: usize = self.messages.iter().map(|m| m.content.len()).sum();
        (bytes / 4) as u64
    }
}

/// A completion returned by a provider.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub model: String,
}

/// Trait for LLM completion providers.
///
/// Retry policy, if any, belongs inside the implementation; the engine
/// treats a returned error as "this call produced nothing" and contains it
/// at the branch boundary.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Perform a full completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the model name.
    fn model_name(&self) -> &str;
}

/// Extract the first JSON object or array embedded in LLM output.
///
/// Providers frequently wrap JSON in prose or markdown fences; this scans
/// for the first balanced `{...}` or `[...]` block and parses it. Returns
/// `None` when nothing parses, which callers treat as an empty suggestion,
/// never as a run failure.
pub fn parse_json_block(text: &str) -> Option<serde_json::Value> {
    if let Ok(value) = serde_json::from_str(text.trim()) {
        return Some(value);
    }

    let bytes = text.as_bytes();
    for (start, &byte) in bytes.iter().enumerate() {
        let (open, close) = match byte {
            b'{' => (b'{', b'}'),
            b'[' => (b'[', b']'),
            _ => continue,
        };
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        for (offset, &b) in bytes[start..].iter().enumerate() {
            if in_string {
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == b'"' {
                    in_string = false;
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b if b == open => depth += 1,
                b if b == close => {
                    depth -= 1;
                    if depth == 0 {
                        let candidate = &text[start..=start + offset];
                        if let Ok(value) = serde_json::from_str(candidate) {
                            return Some(value);
                        }
                        break;
                    }
                }
                _ => {}
            }
        }
    }
    None
}

/// A mock completion provider for testing and development.
///
/// Returns queued responses in FIFO order; when the queue is empty it
/// returns a connection error, which the engine contains as an empty
/// result.
pub struct MockCompletionProvider {
    model: String,
    responses: Mutex<Vec<CompletionResponse>>,
}

impl MockCompletionProvider {
    pub fn new() -> Self {
        Self {
            model: "mock-model".to_string(),
            responses: Mutex::new(Vec::new()),
        }
    }

    /// Create a provider that always returns the given text.
    ///
    /// Queues many copies so it can serve every call in a run.
    pub fn with_response(text: &str) -> Self {
        let provider = Self::new();
        for _ in 0..64 {
            provider.queue_text(text);
        }
        provider
    }

    /// Queue a text response to be returned by the next `complete` call.
    pub fn queue_text(&self, text: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(0, Self::text_response(text));
    }

    /// Create a simple text response for testing.
    pub fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            content: text.to_string(),
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
            },
            model: "mock-model".to_string(),
        }
    }
}

impl Default for MockCompletionProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionProvider for MockCompletionProvider {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.responses
            .lock()
            .unwrap()
            .pop()
            .ok_or_else(|| LlmError::Connection {
                message: "mock provider has no queued responses".to_string(),
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
