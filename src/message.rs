//! Transport-boundary message types.
//!
//! [`InboundMessage`] is what a connected client submits to a session;
//! [`OutboundMessage`] is what the orchestrator emits back. Both are plain
//! serde types so the surrounding server can frame them however it likes
//! (the wire framing itself is not this crate's concern).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::TokenUsage;
use crate::state::QueryKind;

/// A message in a conversation history, containing a role and text content.
///
/// # Examples
///
/// ```
/// use colloquy::message::Message;
///
/// let user_msg = Message::user("How many rows are in orders?");
/// let assistant_msg = Message::assistant("There are 42 rows.");
/// assert!(user_msg.has_role(Message::USER));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender (e.g., "user", "assistant", "system").
    pub role: String,
    /// The text content of the message.
    pub content: String,
}

impl Message {
    /// User input message role.
    pub const USER: &'static str = "user";
    /// AI assistant response message role.
    pub const ASSISTANT: &'static str = "assistant";
    /// System prompt or instruction message role.
    pub const SYSTEM: &'static str = "system";

    #[must_use]
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    #[must_use]
    pub fn user(content: &str) -> Self {
        Self::new(Self::USER, content)
    }

    #[must_use]
    pub fn assistant(content: &str) -> Self {
        Self::new(Self::ASSISTANT, content)
    }

    #[must_use]
    pub fn system(content: &str) -> Self {
        Self::new(Self::SYSTEM, content)
    }

    /// Returns true if this message has the specified role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }
}

/// Discriminant of an [`OutboundMessage`].
///
/// Wire names keep the event vocabulary existing clients already speak:
/// run starts, token display updates, query results, and usage reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// An agent is about to start producing output (placeholder message).
    #[serde(rename = "on_chain_start")]
    AgentStart,
    /// An incremental display update of the current visible answer segment.
    #[serde(rename = "on_chat_model_stream")]
    AnswerChunk,
    /// A terminal result for an agent: query echo plus rows or failure text.
    #[serde(rename = "on_query_stream")]
    QueryResult,
    /// Token usage metrics for one completed model call.
    #[serde(rename = "on_chat_model_end")]
    Usage,
}

impl EventKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AgentStart => "on_chain_start",
            EventKind::AnswerChunk => "on_chat_model_stream",
            EventKind::QueryResult => "on_query_stream",
            EventKind::Usage => "on_chat_model_end",
        }
    }
}

/// A message submitted by a connected client.
///
/// Besides the free text, the client may carry over structured fields from a
/// prior turn (query kind, generated queries) so a follow-up can continue
/// where the previous structured response left off.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Free-form user text.
    pub text: String,
    /// Active table context, if the message targets one.
    #[serde(default)]
    pub table_name: Option<String>,
    /// Active document context, if the message targets one.
    #[serde(default)]
    pub document_name: Option<String>,
    /// Carried-over query kind from a prior structured turn.
    #[serde(default)]
    pub query_kind: Option<QueryKind>,
    /// Carried-over retrieval query from a prior structured turn.
    #[serde(default)]
    pub retrieval_query: Option<String>,
    /// Carried-over visualization query from a prior structured turn.
    #[serde(default)]
    pub visualization_query: Option<String>,
    /// Carried-over visualization label from a prior structured turn.
    #[serde(default)]
    pub visualization_label: Option<String>,
    /// Whether the prior turn carried a tool call.
    #[serde(default)]
    pub has_function_call: bool,
    /// Name of the tool used in the prior turn, if any.
    #[serde(default)]
    pub tool_name: Option<String>,
}

impl InboundMessage {
    /// Convenience constructor for a plain-text message with no context.
    #[must_use]
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }

    /// Convenience constructor for a message addressed to a table context.
    #[must_use]
    pub fn for_table(text: &str, table: &str) -> Self {
        Self {
            text: text.to_string(),
            table_name: Some(table.to_string()),
            ..Default::default()
        }
    }

    /// Convenience constructor for a message addressed to a document context.
    #[must_use]
    pub fn for_document(text: &str, document: &str) -> Self {
        Self {
            text: text.to_string(),
            document_name: Some(document.to_string()),
            ..Default::default()
        }
    }
}

/// A typed progress/result event emitted to the connected client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Event discriminant.
    pub event: EventKind,
    /// Agent role that produced this event.
    pub role: String,
    /// Payload text (empty for placeholder events).
    pub message: String,
    /// Active table context at emission time.
    pub table_name: Option<String>,
    /// Active document context at emission time.
    pub document_name: Option<String>,
    /// Seconds elapsed since the producing agent started, ms precision.
    pub elapsed_seconds: f64,
    /// Visualization query accompanying a query result, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualization_query: Option<String>,
    /// Label describing the visualization query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualization_label: Option<String>,
    /// Kind of the query a result event refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_kind: Option<QueryKind>,
    /// Token usage for a completed model call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// Provider-assigned run id of the model call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Model that produced the tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    /// Tool invoked by the model call, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// Stable thread id grouping this session's history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Emission timestamp.
    pub timestamp: DateTime<Utc>,
}
