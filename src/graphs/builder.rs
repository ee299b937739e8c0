//! Fluent workflow graph builder.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::graphs::compilation::{GraphError, Workflow};
use crate::graphs::edges::ConditionalEdge;
use crate::node::AgentNode;
use crate::state::{AgentId, ConversationState};

/// Builds a workflow graph node by node, edge by edge.
///
/// `AgentId::Start` and `AgentId::End` are always present as virtual
/// endpoints; registering a node under either is ignored with a warning.
///
/// # Examples
///
/// ```no_run
/// # use colloquy::graphs::GraphBuilder;
/// # use colloquy::state::AgentId;
/// # fn demo(node: impl colloquy::node::AgentNode + 'static) {
/// let workflow = GraphBuilder::new()
///     .add_node(AgentId::sql(), node)
///     .add_edge(AgentId::Start, AgentId::sql())
///     .add_edge(AgentId::sql(), AgentId::End)
///     .compile()
///     .unwrap();
/// # }
/// ```
#[derive(Default)]
pub struct GraphBuilder {
    nodes: FxHashMap<AgentId, Arc<dyn AgentNode>>,
    edges: FxHashMap<AgentId, Vec<AgentId>>,
    conditional: Vec<ConditionalEdge>,
}

impl GraphBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an executable node under `id`.
    #[must_use]
    pub fn add_node(mut self, id: AgentId, node: impl AgentNode + 'static) -> Self {
        if id.is_virtual() {
            warn!(node = %id, "ignoring attempt to register a virtual endpoint");
            return self;
        }
        self.nodes.insert(id, Arc::new(node));
        self
    }

    /// Adds an unconditional edge.
    #[must_use]
    pub fn add_edge(mut self, from: AgentId, to: AgentId) -> Self {
        self.edges.entry(from).or_default().push(to);
        self
    }

    /// Adds a conditional edge from `from`. The route function is consulted
    /// after `from` completes; `targets` declares every node it may name so
    /// compilation can validate them.
    #[must_use]
    pub fn add_conditional_edge(
        mut self,
        from: AgentId,
        targets: Vec<AgentId>,
        route: impl Fn(&ConversationState) -> AgentId + Send + Sync + 'static,
    ) -> Self {
        self.conditional.push(ConditionalEdge::new(from, targets, route));
        self
    }

    /// Validates the graph and freezes it into an executable [`Workflow`].
    pub fn compile(self) -> Result<Workflow, GraphError> {
        Workflow::compile(self.nodes, self.edges, self.conditional)
    }
}
