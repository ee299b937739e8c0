//! Edge types for workflow graphs.

use std::fmt;
use std::sync::Arc;

use crate::state::{AgentId, ConversationState};

/// A routing function for conditional edges. Reads the state a node just
/// produced and names the next node.
pub type RouteFn = Arc<dyn Fn(&ConversationState) -> AgentId + Send + Sync>;

/// A conditional edge: a route function plus its declared possible targets.
///
/// Declaring targets up front lets `compile()` validate them against the
/// registered nodes instead of discovering a dangling route at runtime.
#[derive(Clone)]
pub struct ConditionalEdge {
    pub from: AgentId,
    pub targets: Vec<AgentId>,
    pub route: RouteFn,
}

impl ConditionalEdge {
    #[must_use]
    pub fn new(
        from: AgentId,
        targets: Vec<AgentId>,
        route: impl Fn(&ConversationState) -> AgentId + Send + Sync + 'static,
    ) -> Self {
        Self {
            from,
            targets,
            route: Arc::new(route),
        }
    }
}

impl fmt::Debug for ConditionalEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionalEdge")
            .field("from", &self.from)
            .field("targets", &self.targets)
            .field("route", &"<fn>")
            .finish()
    }
}
