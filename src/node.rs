//! Agent node trait and execution context.
//!
//! A workflow is a set of [`AgentNode`] implementations wired together by a
//! graph. Nodes receive the conversation state by value, do their work
//! (usually one or more streamed model calls plus tool calls), and hand back
//! a [`NodeOutcome`] telling the engine how to proceed. Suspension and
//! redirection are ordinary return values, never control-flow exceptions.

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use crate::model::{ChatRequest, ModelClient, ModelError, ModelOutput, TokenChunk};
use crate::state::{AgentId, ConversationState};
use crate::stream::StreamEvent;
use crate::tools::QueryError;

/// What a node tells the engine after it ran.
#[derive(Debug)]
pub enum NodeOutcome {
    /// Normal completion: route onward from this node with the new state.
    Continue(ConversationState),
    /// Jump directly to another node, bypassing this node's edges.
    Redirect {
        to: AgentId,
        state: ConversationState,
    },
    /// Pause the run and wait for a human message. The state is checkpointed
    /// and the node re-runs with the resume value when one arrives.
    Suspend {
        reason: String,
        state: ConversationState,
    },
}

/// Errors produced by node execution.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    #[error("missing required field `{field}` in conversation state")]
    #[diagnostic(
        code(colloquy::node::missing_field),
        help("An upstream model response omitted a required key; the turn is aborted.")
    )]
    MissingField { field: &'static str },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Query(#[from] QueryError),

    #[error("run event channel closed while node `{agent}` was executing")]
    #[diagnostic(
        code(colloquy::node::channel_closed),
        help("The run consumer dropped its receiver; the session is gone.")
    )]
    ChannelClosed { agent: String },
}

/// Forwards raw token fragments from a model call onto the run's event
/// stream, tagged with the producing agent.
#[derive(Clone, Debug)]
pub struct TokenSink {
    agent: AgentId,
    events: flume::Sender<StreamEvent>,
}

impl TokenSink {
    pub fn send(&self, chunk: TokenChunk) -> Result<(), ModelError> {
        self.events
            .send(StreamEvent::Token {
                agent: self.agent.clone(),
                chunk,
            })
            .map_err(|_| ModelError::SinkClosed)
    }
}

/// Execution context handed to a node for one run.
#[derive(Clone, Debug)]
pub struct NodeContext {
    /// The node being executed.
    pub agent: AgentId,
    /// Session the run belongs to.
    pub session_id: String,
    /// Present only when this node is being re-run after a suspension: the
    /// text of the message that resumed it.
    pub resume: Option<String>,
    events: flume::Sender<StreamEvent>,
}

impl NodeContext {
    #[must_use]
    pub fn new(agent: AgentId, session_id: String, events: flume::Sender<StreamEvent>) -> Self {
        Self {
            agent,
            session_id,
            resume: None,
            events,
        }
    }

    #[must_use]
    pub fn with_resume(mut self, resume: Option<String>) -> Self {
        self.resume = resume;
        self
    }

    /// Sink for streaming model tokens attributed to this node.
    #[must_use]
    pub fn token_sink(&self) -> TokenSink {
        TokenSink {
            agent: self.agent.clone(),
            events: self.events.clone(),
        }
    }

    /// Runs one streamed model call: tokens flow to the run's event stream
    /// as they arrive, and a `ModelCallEnd` with usage metadata is emitted
    /// when the call completes.
    pub async fn stream_model(
        &self,
        model: &dyn ModelClient,
        request: ChatRequest,
    ) -> Result<ModelOutput, NodeError> {
        let sink = self.token_sink();
        let output = model.stream_chat(request, &sink).await?;
        self.events
            .send(StreamEvent::ModelCallEnd {
                agent: self.agent.clone(),
                usage: output.usage,
                model_name: output.model_name.clone(),
                tool_name: output.tool_name.clone(),
                run_id: output.run_id.clone(),
            })
            .map_err(|_| NodeError::ChannelClosed {
                agent: self.agent.name().to_string(),
            })?;
        Ok(output)
    }
}

/// An executable node in a workflow graph.
///
/// Implementations hold their collaborators (model client, query executor,
/// document store) as injected `Arc`s; nothing in this crate reaches for
/// globals.
#[async_trait]
pub trait AgentNode: Send + Sync {
    async fn run(
        &self,
        state: ConversationState,
        ctx: NodeContext,
    ) -> Result<NodeOutcome, NodeError>;
}
