//! Typed events produced by a workflow run.

use crate::model::{TokenChunk, TokenUsage};
use crate::state::{AgentId, ConversationState, QueryKind};

/// Snapshot of the fields the run-loop handlers need from the state a node
/// is entered with. Kept small so `RunStart` stays cheap to clone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunEntry {
    pub current_agent: Option<AgentId>,
    pub next_agent: Option<AgentId>,
    pub has_function_call: bool,
    pub query_kind: Option<QueryKind>,
    pub query_failed: Option<bool>,
    pub table_name: Option<String>,
    pub retrieval_query: Option<String>,
    pub visualization_query: Option<String>,
    pub visualization_label: Option<String>,
    pub manipulation_query: Option<String>,
    pub manipulation_label: Option<String>,
}

impl RunEntry {
    #[must_use]
    pub fn from_state(state: &ConversationState) -> Self {
        Self {
            current_agent: state.current_agent.clone(),
            next_agent: state.next_agent.clone(),
            has_function_call: state.has_function_call,
            query_kind: state.query_kind,
            query_failed: state.query_failed,
            table_name: state.table_name.clone(),
            retrieval_query: state.retrieval_query.clone(),
            visualization_query: state.visualization_query.clone(),
            visualization_label: state.visualization_label.clone(),
            manipulation_query: state.manipulation_query.clone(),
            manipulation_label: state.manipulation_label.clone(),
        }
    }
}

/// One event on a run's ordered event stream.
///
/// The engine guarantees per-run ordering: a node's `RunStart` precedes all
/// of its `Token` and `ModelCallEnd` events, which precede its `RunEnd`.
#[derive(Clone, Debug)]
pub enum StreamEvent {
    /// A node is about to execute with the given entry state.
    RunStart { agent: AgentId, entry: RunEntry },
    /// A raw token fragment from a model call inside the node.
    Token { agent: AgentId, chunk: TokenChunk },
    /// A model call inside the node completed.
    ModelCallEnd {
        agent: AgentId,
        usage: TokenUsage,
        model_name: String,
        tool_name: Option<String>,
        run_id: String,
    },
    /// The node finished and produced this state.
    RunEnd {
        agent: AgentId,
        state: Box<ConversationState>,
    },
}

impl StreamEvent {
    /// Agent the event belongs to.
    #[must_use]
    pub fn agent(&self) -> &AgentId {
        match self {
            StreamEvent::RunStart { agent, .. }
            | StreamEvent::Token { agent, .. }
            | StreamEvent::ModelCallEnd { agent, .. }
            | StreamEvent::RunEnd { agent, .. } => agent,
        }
    }
}
