//! Conversation state shared by the workflow nodes.
//!
//! [`ConversationState`] is an explicit struct: every field the agents read
//! or write is named and typed here, so a reviewer can see the whole surface
//! at a glance instead of chasing string keys through the codebase.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::message::{InboundMessage, Message};

/// Identifies a node in a workflow graph.
///
/// `Start` and `End` are virtual endpoints: they carry no executable node and
/// exist only as edge anchors and as the terminal routing value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentId {
    /// Virtual entry point of a workflow.
    Start,
    /// Virtual exit point of a workflow.
    End,
    /// A named executable agent.
    Agent(String),
}

impl AgentId {
    /// The SQL-capable table agent.
    pub const SQL: &'static str = "sql_agent";
    /// The document retrieval/answer agent.
    pub const DOCUMENT: &'static str = "document_agent";
    /// The cross-source analyst that fronts combined runs.
    pub const ANALYST: &'static str = "data_analyst";
    /// The suspending human-in-the-loop node.
    pub const HUMAN: &'static str = "human_input";

    #[must_use]
    pub fn agent(name: &str) -> Self {
        AgentId::Agent(name.to_string())
    }

    #[must_use]
    pub fn sql() -> Self {
        Self::agent(Self::SQL)
    }

    #[must_use]
    pub fn document() -> Self {
        Self::agent(Self::DOCUMENT)
    }

    #[must_use]
    pub fn analyst() -> Self {
        Self::agent(Self::ANALYST)
    }

    #[must_use]
    pub fn human() -> Self {
        Self::agent(Self::HUMAN)
    }

    /// The display name used in outbound events.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            AgentId::Start => "__start__",
            AgentId::End => "__end__",
            AgentId::Agent(name) => name,
        }
    }

    #[must_use]
    pub fn is_virtual(&self) -> bool {
        matches!(self, AgentId::Start | AgentId::End)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&str> for AgentId {
    fn from(name: &str) -> Self {
        match name {
            "__start__" => AgentId::Start,
            "__end__" => AgentId::End,
            other => AgentId::Agent(other.to_string()),
        }
    }
}

/// Kind of database query a structured response asks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    /// Read-only data retrieval.
    Retrieval,
    /// Data manipulation (insert/update/delete).
    Manipulation,
}

impl QueryKind {
    /// Parses a model-produced kind string. Unknown values (including the
    /// sentinel a model emits when it wants the kind re-evaluated) map to
    /// `None` so the probe runs again next turn.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "retrieval" => Some(QueryKind::Retrieval),
            "manipulation" => Some(QueryKind::Manipulation),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Retrieval => "retrieval",
            QueryKind::Manipulation => "manipulation",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-conversation state threaded through a workflow run.
///
/// Created fresh on a context's first message, then persisted per
/// `(thread, context)` and updated in place on follow-up turns. `messages`
/// is append-only; structured fields are overwritten by whichever agent
/// produced them last.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Agent currently producing output.
    pub current_agent: Option<AgentId>,
    /// Agent routing hint: where the run goes after the current node.
    pub next_agent: Option<AgentId>,
    /// The user question driving this turn.
    pub question: String,
    /// Question rewritten with cross-source context, combined runs only.
    pub augmented_question: Option<String>,
    /// Last produced answer text.
    pub answer: Option<String>,
    /// Active table context name.
    pub table_name: Option<String>,
    /// Table facts gathered by the analyst for the SQL agent.
    pub table_relevant_data: Option<String>,
    /// Active document context name.
    pub document_name: Option<String>,
    /// Document facts gathered by the analyst for the SQL agent.
    pub document_relevant_data: Option<String>,
    /// Append-only conversation history.
    pub messages: Vec<Message>,
    /// Intermediate per-agent notes, append-only.
    pub agent_scratchpads: Vec<String>,
    /// Kind of query the current structured turn asks for.
    pub query_kind: Option<QueryKind>,
    /// Generated read-only query awaiting execution.
    pub retrieval_query: Option<String>,
    /// Generated visualization query, if the answer warrants a chart.
    pub visualization_query: Option<String>,
    /// Human-readable label for the visualization query.
    pub visualization_label: Option<String>,
    /// Generated manipulation query, surfaced but never auto-executed.
    pub manipulation_query: Option<String>,
    /// Human-readable label for the manipulation query.
    pub manipulation_label: Option<String>,
    /// Whether this run spans both a table and a document.
    pub is_multiagent: bool,
    /// Whether the latest turn produced an executable tool call.
    pub has_function_call: bool,
    /// Outcome of the latest query test: `Some(true)` failed,
    /// `Some(false)` succeeded, `None` not yet tested.
    pub query_failed: Option<bool>,
}

impl ConversationState {
    /// Builds the state for a context's first message. Carried-over
    /// structured fields from the client are seeded here so a follow-up to a
    /// prior structured answer does not start from nothing.
    #[must_use]
    pub fn from_inbound(msg: &InboundMessage, entry: AgentId) -> Self {
        Self {
            next_agent: Some(entry),
            question: msg.text.clone(),
            table_name: msg.table_name.clone(),
            document_name: msg.document_name.clone(),
            query_kind: msg.query_kind,
            retrieval_query: msg.retrieval_query.clone(),
            visualization_query: msg.visualization_query.clone(),
            visualization_label: msg.visualization_label.clone(),
            has_function_call: msg.has_function_call,
            messages: vec![Message::user(&msg.text)],
            ..Default::default()
        }
    }

    /// Applies a follow-up turn to existing state: new question, history
    /// appended, per-turn outcome fields cleared.
    pub fn begin_turn(&mut self, msg: &InboundMessage, entry: AgentId) {
        self.question = msg.text.clone();
        self.messages.push(Message::user(&msg.text));
        self.next_agent = Some(entry);
        self.has_function_call = false;
        self.query_failed = None;
        self.answer = None;
    }

    /// Records an answer: sets the field and appends to history.
    pub fn record_answer(&mut self, text: &str) {
        self.answer = Some(text.to_string());
        self.messages.push(Message::assistant(text));
    }

    /// Last assistant message in the history, if any.
    #[must_use]
    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.has_role(Message::ASSISTANT))
    }

    /// True when the routing hint points at the virtual exit.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.next_agent == Some(AgentId::End)
    }

    /// Folds a structured model response into the state.
    ///
    /// Only known keys are applied; everything else is ignored, which keeps a
    /// partially malformed response from corrupting unrelated fields. An
    /// `answer` key is recorded into the history as well.
    pub fn apply_model_fields(&mut self, fields: &serde_json::Map<String, serde_json::Value>) {
        for (key, value) in fields {
            let Some(text) = value.as_str() else {
                continue;
            };
            match key.as_str() {
                "answer" => self.record_answer(text),
                "next_agent" => self.next_agent = Some(AgentId::from(text)),
                "query_type" => self.query_kind = QueryKind::parse(text),
                "answer_retrieval_query" => self.retrieval_query = non_empty(text),
                "visualize_retrieval_query" => self.visualization_query = non_empty(text),
                "visualize_query_label" => self.visualization_label = non_empty(text),
                "perform_manipulation_query" => self.manipulation_query = non_empty(text),
                "manipulation_query_label" => self.manipulation_label = non_empty(text),
                "augmented_question" => self.augmented_question = non_empty(text),
                _ => {}
            }
        }
    }
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
