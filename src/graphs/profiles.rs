//! The shipped workflow topologies.
//!
//! Three profiles cover the context combinations a message can carry. They
//! share one parameterized constructor instead of three hand-rolled graphs,
//! so the edge wiring differences are visible in one place.

use crate::agents::{
    Collaborators, DataAnalystNode, DocumentAgentNode, HumanInputNode, SqlAgentNode,
};
use crate::graphs::{GraphBuilder, GraphError, Workflow};
use crate::message::InboundMessage;
use crate::state::AgentId;

/// Which workflow topology a message runs through, decided by the contexts
/// it names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GraphProfile {
    /// Table only: the SQL agent answers directly.
    SingleContext,
    /// Document only: the document agent answers directly.
    DocumentOnly,
    /// Table and document: the analyst prepares, the SQL agent finishes.
    Combined,
}

impl GraphProfile {
    /// Selects the profile for a message, or `None` when it names no
    /// context at all.
    #[must_use]
    pub fn select(msg: &InboundMessage) -> Option<Self> {
        match (msg.table_name.is_some(), msg.document_name.is_some()) {
            (true, true) => Some(GraphProfile::Combined),
            (true, false) => Some(GraphProfile::SingleContext),
            (false, true) => Some(GraphProfile::DocumentOnly),
            (false, false) => None,
        }
    }

    /// First agent a fresh run enters.
    #[must_use]
    pub fn entry(&self) -> AgentId {
        match self {
            GraphProfile::SingleContext => AgentId::sql(),
            GraphProfile::DocumentOnly => AgentId::document(),
            GraphProfile::Combined => AgentId::analyst(),
        }
    }

    /// Where the human-input node routes after a resume.
    #[must_use]
    pub fn resume_target(&self) -> AgentId {
        match self {
            GraphProfile::DocumentOnly => AgentId::document(),
            GraphProfile::SingleContext | GraphProfile::Combined => AgentId::sql(),
        }
    }

    /// Builds and compiles the workflow for this profile.
    pub fn build(&self, deps: &Collaborators) -> Result<Workflow, GraphError> {
        let human = HumanInputNode::new(self.resume_target());
        match self {
            GraphProfile::SingleContext => GraphBuilder::new()
                .add_node(
                    AgentId::sql(),
                    SqlAgentNode::new(deps.model.clone(), deps.query.clone()),
                )
                .add_node(AgentId::human(), human)
                .add_edge(AgentId::Start, AgentId::sql())
                .add_edge(AgentId::sql(), AgentId::End)
                .add_edge(AgentId::human(), AgentId::sql())
                .compile(),
            GraphProfile::DocumentOnly => GraphBuilder::new()
                .add_node(
                    AgentId::document(),
                    DocumentAgentNode::new(deps.model.clone(), deps.documents.clone()),
                )
                .add_node(AgentId::human(), human)
                .add_edge(AgentId::Start, AgentId::document())
                .add_edge(AgentId::document(), AgentId::End)
                .add_edge(AgentId::human(), AgentId::document())
                .compile(),
            GraphProfile::Combined => GraphBuilder::new()
                .add_node(
                    AgentId::analyst(),
                    DataAnalystNode::new(
                        deps.model.clone(),
                        deps.query.clone(),
                        deps.documents.clone(),
                    ),
                )
                .add_node(
                    AgentId::sql(),
                    SqlAgentNode::new(deps.model.clone(), deps.query.clone()),
                )
                .add_node(AgentId::human(), human)
                .add_edge(AgentId::Start, AgentId::analyst())
                .add_conditional_edge(
                    AgentId::analyst(),
                    vec![AgentId::sql(), AgentId::End],
                    |state| state.next_agent.clone().unwrap_or(AgentId::End),
                )
                .add_edge(AgentId::sql(), AgentId::End)
                .add_edge(AgentId::human(), AgentId::sql())
                .compile(),
        }
    }
}
