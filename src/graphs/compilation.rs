//! Graph validation and the compiled, executable workflow.

use std::sync::Arc;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::error;

use crate::graphs::edges::ConditionalEdge;
use crate::node::AgentNode;
use crate::state::{AgentId, ConversationState};

/// Structural errors caught when compiling a graph.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("graph has no edge out of the start endpoint")]
    #[diagnostic(
        code(colloquy::graph::no_entry),
        help("Add an edge from AgentId::Start to the first agent.")
    )]
    NoEntryEdge,

    #[error("edge `{from}` -> `{to}` references an unregistered node")]
    #[diagnostic(
        code(colloquy::graph::unknown_node),
        help("Register the node with add_node before wiring edges to it.")
    )]
    UnknownNode { from: String, to: String },

    #[error("conditional edge from `{from}` declares unregistered target `{target}`")]
    #[diagnostic(
        code(colloquy::graph::unknown_route_target),
        help("Every declared route target must be a registered node or AgentId::End.")
    )]
    UnknownRouteTarget { from: String, target: String },

    #[error("node `{from}` has more than one conditional edge")]
    #[diagnostic(
        code(colloquy::graph::duplicate_conditional),
        help("Fold the branching logic into a single route function per node.")
    )]
    DuplicateConditional { from: String },
}

/// A compiled, immutable workflow graph.
///
/// Produced by [`crate::graphs::GraphBuilder::compile`]; all structural
/// validation happened there, so lookups here are straightforward.
pub struct Workflow {
    nodes: FxHashMap<AgentId, Arc<dyn AgentNode>>,
    edges: FxHashMap<AgentId, Vec<AgentId>>,
    conditional: FxHashMap<AgentId, ConditionalEdge>,
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("edges", &self.edges)
            .field("conditional", &self.conditional)
            .finish()
    }
}

impl Workflow {
    pub(crate) fn compile(
        nodes: FxHashMap<AgentId, Arc<dyn AgentNode>>,
        edges: FxHashMap<AgentId, Vec<AgentId>>,
        conditional_list: Vec<ConditionalEdge>,
    ) -> Result<Self, GraphError> {
        let known = |id: &AgentId| *id == AgentId::End || nodes.contains_key(id);

        match edges.get(&AgentId::Start) {
            Some(targets) if !targets.is_empty() => {}
            _ => return Err(GraphError::NoEntryEdge),
        }

        for (from, targets) in &edges {
            if *from != AgentId::Start && !nodes.contains_key(from) {
                let to = targets.first().map(AgentId::name).unwrap_or_default();
                return Err(GraphError::UnknownNode {
                    from: from.name().to_string(),
                    to: to.to_string(),
                });
            }
            for to in targets {
                if !known(to) {
                    return Err(GraphError::UnknownNode {
                        from: from.name().to_string(),
                        to: to.name().to_string(),
                    });
                }
            }
        }

        let mut conditional = FxHashMap::default();
        for edge in conditional_list {
            if !nodes.contains_key(&edge.from) {
                return Err(GraphError::UnknownNode {
                    from: edge.from.name().to_string(),
                    to: String::new(),
                });
            }
            for target in &edge.targets {
                if !known(target) {
                    return Err(GraphError::UnknownRouteTarget {
                        from: edge.from.name().to_string(),
                        target: target.name().to_string(),
                    });
                }
            }
            if conditional.contains_key(&edge.from) {
                return Err(GraphError::DuplicateConditional {
                    from: edge.from.name().to_string(),
                });
            }
            conditional.insert(edge.from.clone(), edge);
        }

        Ok(Self {
            nodes,
            edges,
            conditional,
        })
    }

    /// First node a fresh run enters.
    #[must_use]
    pub fn entry(&self) -> AgentId {
        // Validated at compile time: a start edge exists.
        self.edges
            .get(&AgentId::Start)
            .and_then(|targets| targets.first())
            .cloned()
            .unwrap_or(AgentId::End)
    }

    /// The executable node registered under `id`.
    #[must_use]
    pub fn node(&self, id: &AgentId) -> Option<Arc<dyn AgentNode>> {
        self.nodes.get(id).cloned()
    }

    /// Resolves where the run goes after `from` completed with `state`.
    ///
    /// A conditional edge takes precedence; otherwise the state's own
    /// terminal hint, then the static edge, then the virtual exit.
    #[must_use]
    pub fn route(&self, from: &AgentId, state: &ConversationState) -> AgentId {
        if let Some(edge) = self.conditional.get(from) {
            let target = (edge.route)(state);
            if target != AgentId::End && !edge.targets.contains(&target) {
                error!(
                    from = %from,
                    target = %target,
                    "route function named an undeclared target, ending the run"
                );
                return AgentId::End;
            }
            return target;
        }
        if state.is_terminal() {
            return AgentId::End;
        }
        self.edges
            .get(from)
            .and_then(|targets| targets.first())
            .cloned()
            .unwrap_or(AgentId::End)
    }
}
