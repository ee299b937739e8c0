//! The language-model seam.
//!
//! The orchestrator never talks to a provider directly; everything flows
//! through [`ModelClient`], which streams tokens into the caller's sink and
//! returns the consolidated output when the call finishes. Tests script this
//! trait with canned token sequences.

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::Message;
use crate::node::TokenSink;

/// A single request to a chat model.
#[derive(Clone, Debug, Default)]
pub struct ChatRequest {
    /// Agent on whose behalf the call is made (threaded into stream events).
    pub agent: String,
    /// Fully rendered prompt text.
    pub prompt: String,
    /// Prior conversation turns to include, oldest first.
    pub history: Vec<Message>,
}

impl ChatRequest {
    #[must_use]
    pub fn new(agent: &str, prompt: String) -> Self {
        Self {
            agent: agent.to_string(),
            prompt,
            history: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }
}

/// Why a model stopped emitting tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural completion.
    Stop,
    /// Output truncated at the provider's length limit.
    Length,
    /// The model handed off to a tool call.
    ToolUse,
}

/// One streamed token fragment. Fragment boundaries are provider-defined and
/// carry no meaning; downstream demultiplexing never assumes alignment with
/// words or sentinels.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenChunk {
    /// Raw fragment text, possibly empty.
    pub text: String,
    /// Set on the final fragment of the call.
    pub finish: Option<FinishReason>,
}

impl TokenChunk {
    #[must_use]
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            finish: None,
        }
    }

    #[must_use]
    pub fn finish(text: &str, reason: FinishReason) -> Self {
        Self {
            text: text.to_string(),
            finish: Some(reason),
        }
    }

    /// True when the provider reported natural completion on this fragment.
    #[must_use]
    pub fn is_natural_stop(&self) -> bool {
        self.finish == Some(FinishReason::Stop)
    }
}

/// Token accounting for one completed model call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    #[must_use]
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

/// Consolidated result of a finished model call.
#[derive(Clone, Debug, Default)]
pub struct ModelOutput {
    /// Full concatenated response text.
    pub text: String,
    /// Token accounting reported by the provider.
    pub usage: TokenUsage,
    /// Model identifier reported by the provider.
    pub model_name: String,
    /// Tool the model invoked, if any.
    pub tool_name: Option<String>,
    /// Provider-assigned id for this call.
    pub run_id: String,
}

/// Errors surfaced by model providers.
#[derive(Debug, Error, Diagnostic)]
pub enum ModelError {
    #[error("model provider error: {message}")]
    #[diagnostic(
        code(colloquy::model::provider),
        help("Check provider credentials and availability, then retry the turn.")
    )]
    Provider { message: String },

    #[error("model stream ended unexpectedly: {message}")]
    #[diagnostic(
        code(colloquy::model::stream),
        help("The token stream broke mid-call; the partial output was discarded.")
    )]
    Stream { message: String },

    #[error("token sink closed while streaming")]
    #[diagnostic(
        code(colloquy::model::sink_closed),
        help("The consuming run loop went away; nothing is listening for tokens.")
    )]
    SinkClosed,
}

/// Streaming chat model client.
///
/// Implementations must forward every fragment to `tokens` in provider order
/// before returning, and mark the last fragment with its finish reason.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn stream_chat(
        &self,
        request: ChatRequest,
        tokens: &TokenSink,
    ) -> Result<ModelOutput, ModelError>;
}

/// Defensively parses a structured model response.
///
/// Accepts raw JSON or JSON inside a ```json fenced block (models wrap their
/// output either way). Anything unparseable yields an empty map; the caller
/// decides which missing keys are fatal for its step.
#[must_use]
pub fn parse_structured(raw: &str) -> serde_json::Map<String, serde_json::Value> {
    let candidate = extract_fenced(raw).unwrap_or_else(|| raw.trim());
    match serde_json::from_str::<serde_json::Value>(candidate) {
        Ok(serde_json::Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            tracing::debug!(
                raw_len = raw.len(),
                "structured response did not parse as a JSON object"
            );
            serde_json::Map::new()
        }
    }
}

/// Pulls the body out of the first ```json (or bare ```) fenced block.
fn extract_fenced(raw: &str) -> Option<&str> {
    let open = raw.find("```")?;
    let after_fence = &raw[open + 3..];
    let body_start = after_fence
        .strip_prefix("json")
        .unwrap_or(after_fence)
        .trim_start_matches(['\r', '\n']);
    let close = body_start.find("```")?;
    Some(body_start[..close].trim())
}
